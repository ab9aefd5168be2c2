//! Storage trait definitions for hivesync
//!
//! These traits define the persistence abstractions for the federation
//! engine:
//! - `RepoStore`: governance configuration per federated repo
//! - `StreamStore`: review streams and their status transitions
//! - `ReviewStore`: individual reviews feeding consensus
//! - `ProposalStore`: council proposals (governance decisions)
//! - `SyncEventQueue`: durable, ordered queue of events awaiting the
//!   remote authority
//! - `MergeLedger`: append-only audit log of executed merge operations
//!
//! All traits are async and backend-agnostic. In-memory fakes are provided
//! for testing via the `fakes` module.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::error::StorageError;

/// Result type for storage operations
pub type StorageResult<T> = std::result::Result<T, StorageError>;

// ---------------------------------------------------------------------------
// Identifiers & digests
// ---------------------------------------------------------------------------

/// Identifier of a federated repo's governance configuration.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RepoId(pub String);

impl std::fmt::Display for RepoId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a review stream.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StreamId(pub String);

impl StreamId {
    /// Generate a new random StreamId
    pub fn new() -> Self {
        StreamId(uuid::Uuid::new_v4().to_string())
    }
}

impl Default for StreamId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for StreamId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a council proposal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProposalId(pub String);

impl ProposalId {
    /// Generate a new random ProposalId
    pub fn new() -> Self {
        ProposalId(uuid::Uuid::new_v4().to_string())
    }
}

impl Default for ProposalId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ProposalId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Content digest (SHA-256 hex string).
///
/// The inner field is private to guarantee the string is always valid
/// lowercase hex produced by `from_bytes` or validated via `TryFrom<String>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentDigest(String);

impl ContentDigest {
    /// Compute the SHA-256 digest of the given bytes.
    pub fn from_bytes(data: &[u8]) -> Self {
        use sha2::Digest;
        let mut hasher = Sha256::new();
        hasher.update(data);
        ContentDigest(hex::encode(hasher.finalize()))
    }

    /// Return the full hex string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short form (first 12 hex chars).
    pub fn short(&self) -> &str {
        &self.0[..12.min(self.0.len())]
    }
}

impl TryFrom<String> for ContentDigest {
    type Error = StorageError;

    fn try_from(s: String) -> std::result::Result<Self, Self::Error> {
        if s.len() != 64 || !s.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(StorageError::InvalidDigest { digest: s });
        }
        Ok(ContentDigest(s.to_ascii_lowercase()))
    }
}

impl std::fmt::Display for ContentDigest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// RepoStore — governance configuration
// ---------------------------------------------------------------------------

/// How merges into the buffer branch are authorized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeMode {
    /// No gating, no consensus — any stream may be proposed for merge.
    Swarm,
    /// Peer review consensus against the repo's quorum.
    Review,
    /// Elevated approval: maintainer standing locally, delegated to the
    /// remote authority when a federated session is present.
    Gated,
}

impl MergeMode {
    pub fn as_str(self) -> &'static str {
        match self {
            MergeMode::Swarm => "swarm",
            MergeMode::Review => "review",
            MergeMode::Gated => "gated",
        }
    }
}

/// Which engine executes merge operations for a repo.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GitBackendKind {
    /// Local cascading-merge engine operating directly on repository storage.
    Cascade,
    /// External code-hosting service's request model.
    RemoteApi,
}

impl GitBackendKind {
    pub fn as_str(self) -> &'static str {
        match self {
            GitBackendKind::Cascade => "cascade",
            GitBackendKind::RemoteApi => "remote_api",
        }
    }
}

/// A plugin declared by a repo, with the tier signal that matters to the
/// engine: whether the plugin's tier requires a remote authority session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginDeclaration {
    pub plugin_id: String,
    pub requires_remote: bool,
}

/// Governance configuration for one federated repo.
///
/// Immutable during a single proposal's lifecycle; owned by the repo's
/// administrator, read by every engine component.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepoRecord {
    pub repo_id: RepoId,
    pub merge_mode: MergeMode,
    pub git_backend: GitBackendKind,
    /// Staging branch streams merge into before promotion.
    pub buffer_branch: String,
    /// Branch the buffer fast-forwards into on promote.
    pub promote_target: String,
    /// When true, consensus requires at least one human-authored approval.
    pub require_human_approval: bool,
    /// Weight multiplier applied to reviews flagged as human-authored.
    pub human_review_weight: f64,
    /// Approving review weight required for consensus to pass.
    pub review_quorum: f64,
    /// Agent ids with maintainer standing (local gated check).
    pub maintainers: Vec<String>,
    /// Declared plugins, used only for compatibility signaling.
    pub plugins: Vec<PluginDeclaration>,
    pub created_at: DateTime<Utc>,
}

/// Repo governance configuration store.
#[async_trait]
pub trait RepoStore: Send + Sync {
    /// Insert or replace a repo configuration.
    async fn put_repo(&self, repo: RepoRecord) -> StorageResult<()>;

    /// Point lookup by id. Returns `StorageError::RepoNotFound` if absent.
    async fn get_repo(&self, repo_id: &RepoId) -> StorageResult<RepoRecord>;

    /// List all configured repos.
    async fn list_repos(&self) -> StorageResult<Vec<RepoRecord>>;
}

// ---------------------------------------------------------------------------
// StreamStore — review streams
// ---------------------------------------------------------------------------

/// Review lifecycle status of a stream.
///
/// Exactly one authoritative status exists at any time. Legal transitions:
///
/// ```text
/// Draft → Pending → Approved → { Merged | ApprovedPendingMerge | Reverted }
/// ApprovedPendingMerge → { Merged | Reverted }
/// Merged → Reverted
/// ```
///
/// No transition skips `Approved` en route to `Merged`.
/// `ApprovedPendingMerge` looks terminal but is not: it signals "approved,
/// merge not yet achieved" so a retry can resume without re-running
/// governance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewStatus {
    Draft,
    Pending,
    Approved,
    ApprovedPendingMerge,
    Merged,
    Reverted,
}

impl ReviewStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ReviewStatus::Draft => "draft",
            ReviewStatus::Pending => "pending",
            ReviewStatus::Approved => "approved",
            ReviewStatus::ApprovedPendingMerge => "approved_pending_merge",
            ReviewStatus::Merged => "merged",
            ReviewStatus::Reverted => "reverted",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "draft" => Some(ReviewStatus::Draft),
            "pending" => Some(ReviewStatus::Pending),
            "approved" => Some(ReviewStatus::Approved),
            "approved_pending_merge" => Some(ReviewStatus::ApprovedPendingMerge),
            "merged" => Some(ReviewStatus::Merged),
            "reverted" => Some(ReviewStatus::Reverted),
            _ => None,
        }
    }

    /// Whether `self → next` is a legal transition.
    ///
    /// A same-state transition is always allowed (idempotent set).
    pub fn can_transition_to(self, next: ReviewStatus) -> bool {
        use ReviewStatus::*;
        if self == next {
            return true;
        }
        matches!(
            (self, next),
            (Draft, Pending)
                | (Pending, Approved)
                | (Approved, Merged)
                | (Approved, ApprovedPendingMerge)
                | (Approved, Reverted)
                | (ApprovedPendingMerge, Merged)
                | (ApprovedPendingMerge, Reverted)
                | (Merged, Reverted)
        )
    }
}

impl std::fmt::Display for ReviewStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A unit of proposed change: a long-lived work branch under governance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamRecord {
    pub stream_id: StreamId,
    pub repo_id: RepoId,
    /// Branch name holding the proposed change.
    pub branch: String,
    pub title: String,
    /// Agent id that opened the stream.
    pub author: String,
    pub review_status: ReviewStatus,
    /// Merge commit ref recorded when the stream merged (used by revert).
    pub merge_ref: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Review stream store.
///
/// Guarantees:
/// - `update_status` rejects transitions not allowed by
///   [`ReviewStatus::can_transition_to`] with
///   `StorageError::IllegalTransition`.
/// - `update_status` is the only mutation path for `review_status`.
#[async_trait]
pub trait StreamStore: Send + Sync {
    /// Insert or replace a stream record.
    async fn put_stream(&self, stream: StreamRecord) -> StorageResult<()>;

    /// Point lookup by id. Returns `StorageError::StreamNotFound` if absent.
    async fn get_stream(&self, stream_id: &StreamId) -> StorageResult<StreamRecord>;

    /// Transition a stream's review status, validating the transition.
    /// Returns the updated record.
    async fn update_status(
        &self,
        stream_id: &StreamId,
        next: ReviewStatus,
    ) -> StorageResult<StreamRecord>;

    /// Record the merge commit ref produced when the stream merged.
    async fn set_merge_ref(&self, stream_id: &StreamId, merge_ref: &str) -> StorageResult<()>;

    /// List streams, optionally filtered by repo.
    async fn list_streams(&self, repo_id: Option<&RepoId>) -> StorageResult<Vec<StreamRecord>>;
}

// ---------------------------------------------------------------------------
// ReviewStore — reviews feeding consensus
// ---------------------------------------------------------------------------

/// One review cast on a stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewRecord {
    pub review_id: String,
    pub stream_id: StreamId,
    /// Reviewer identity (agent id or human account).
    pub reviewer: String,
    pub approved: bool,
    /// Whether this review is flagged as human-authored.
    pub human: bool,
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl ReviewRecord {
    pub fn new(
        stream_id: StreamId,
        reviewer: impl Into<String>,
        approved: bool,
        human: bool,
        comment: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            review_id: uuid::Uuid::new_v4().to_string(),
            stream_id,
            reviewer: reviewer.into(),
            approved,
            human,
            comment,
            created_at: now,
        }
    }
}

/// Review store.
#[async_trait]
pub trait ReviewStore: Send + Sync {
    /// Append a review.
    async fn put_review(&self, review: ReviewRecord) -> StorageResult<()>;

    /// All reviews cast on a stream, oldest first.
    async fn reviews_for_stream(&self, stream_id: &StreamId) -> StorageResult<Vec<ReviewRecord>>;
}

// ---------------------------------------------------------------------------
// ProposalStore — council proposals
// ---------------------------------------------------------------------------

/// What a council proposal asks the engine to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProposalKind {
    MergeStream,
    RevertStream,
    Promote,
}

impl ProposalKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ProposalKind::MergeStream => "merge_stream",
            ProposalKind::RevertStream => "revert_stream",
            ProposalKind::Promote => "promote",
        }
    }
}

/// Lifecycle of a council proposal.
///
/// `Open → Passed | Failed` is driven by voting (outside this engine);
/// `Passed → Executed` is driven by the proposal executor, idempotently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProposalStatus {
    Open,
    Passed,
    Failed,
    Executed,
}

impl ProposalStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ProposalStatus::Open => "open",
            ProposalStatus::Passed => "passed",
            ProposalStatus::Failed => "failed",
            ProposalStatus::Executed => "executed",
        }
    }
}

/// A governance decision request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProposalRecord {
    pub proposal_id: ProposalId,
    pub kind: ProposalKind,
    pub repo_id: RepoId,
    /// Target stream; `None` for `Promote`, which targets the repo's
    /// buffer/promote branches.
    pub stream_id: Option<StreamId>,
    pub votes_for: u32,
    pub votes_against: u32,
    pub status: ProposalStatus,
    pub created_at: DateTime<Utc>,
    pub decided_at: Option<DateTime<Utc>>,
}

/// Council proposal store.
#[async_trait]
pub trait ProposalStore: Send + Sync {
    /// Insert or replace a proposal.
    async fn put_proposal(&self, proposal: ProposalRecord) -> StorageResult<()>;

    /// Point lookup by id. Returns `StorageError::ProposalNotFound` if absent.
    async fn get_proposal(&self, proposal_id: &ProposalId) -> StorageResult<ProposalRecord>;

    /// Update a proposal's status.
    async fn set_status(
        &self,
        proposal_id: &ProposalId,
        status: ProposalStatus,
    ) -> StorageResult<()>;
}

// ---------------------------------------------------------------------------
// SyncEventQueue — ordered durable event log
// ---------------------------------------------------------------------------

/// One queued unit of local activity destined for the remote authority.
///
/// Created on local mutation, removed only on confirmed remote
/// acknowledgement. A failed delivery is marked (attempt count and last
/// error) but the event stays queued — never dropped silently.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncEvent {
    /// Monotonic local sequence number; delivery order is strict.
    pub seq: u64,
    /// Event kind, e.g. `review`, `submit_review`, `commit`, `activity`,
    /// `merge_request`.
    pub kind: String,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
    /// Delivery attempts that ended in failure.
    pub attempts: u32,
    pub last_error: Option<String>,
}

/// Durable, ordered sync event queue.
///
/// Guarantees:
/// - `enqueue` assigns strictly increasing sequence numbers.
/// - `pending` returns events in ascending seq order; no reordering.
/// - `ack` removes the event; `mark_failed` records the failure and keeps
///   the event queued.
#[async_trait]
pub trait SyncEventQueue: Send + Sync {
    /// Append an event to the queue, assigning its sequence number.
    async fn enqueue(&self, kind: &str, payload: serde_json::Value) -> StorageResult<SyncEvent>;

    /// All queued events, ascending by seq.
    async fn pending(&self) -> StorageResult<Vec<SyncEvent>>;

    /// Remove an event after confirmed remote acknowledgement.
    /// Returns `StorageError::EventNotFound` if absent.
    async fn ack(&self, seq: u64) -> StorageResult<()>;

    /// Record a failed delivery attempt; the event remains queued.
    async fn mark_failed(&self, seq: u64, error: &str) -> StorageResult<()>;
}

// ---------------------------------------------------------------------------
// MergeLedger — append-only merge audit log
// ---------------------------------------------------------------------------

/// Immutable audit entry written after any executed merge/revert/promote.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeRecord {
    pub record_id: String,
    pub proposal_id: ProposalId,
    pub repo_id: RepoId,
    pub stream_id: Option<StreamId>,
    /// Operation performed: `merge`, `revert` or `promote`.
    pub operation: String,
    /// Backend that executed (or deferred) the operation.
    pub backend: String,
    /// Whether the backend actually performed the git operation.
    pub executed: bool,
    /// Recorded outcome, e.g. `merged`, `approved_pending_merge`,
    /// `reverted`, `revert_delegated`, `promoted`, `promote_blocked`,
    /// `promote_recorded`.
    pub outcome: String,
    pub merge_ref: Option<String>,
    pub detail: Option<String>,
    /// Integrity digest over the record's identifying fields.
    pub digest: ContentDigest,
    pub created_at: DateTime<Utc>,
}

impl MergeRecord {
    /// Build a record, computing its integrity digest.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        proposal_id: ProposalId,
        repo_id: RepoId,
        stream_id: Option<StreamId>,
        operation: impl Into<String>,
        backend: impl Into<String>,
        executed: bool,
        outcome: impl Into<String>,
        merge_ref: Option<String>,
        detail: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        let operation = operation.into();
        let backend = backend.into();
        let outcome = outcome.into();
        let digest = ContentDigest::from_bytes(
            format!(
                "{}\0{}\0{}\0{}\0{}\0{}\0{}",
                proposal_id,
                repo_id,
                stream_id.as_ref().map(|s| s.0.as_str()).unwrap_or(""),
                operation,
                backend,
                executed,
                outcome,
            )
            .as_bytes(),
        );
        Self {
            record_id: uuid::Uuid::new_v4().to_string(),
            proposal_id,
            repo_id,
            stream_id,
            operation,
            backend,
            executed,
            outcome,
            merge_ref,
            detail,
            digest,
            created_at: now,
        }
    }
}

/// Append-only merge audit ledger.
///
/// Guarantees:
/// - At most one record per proposal (`DuplicateMergeRecord` otherwise) —
///   this is what makes proposal execution idempotent.
/// - Records are never updated or deleted.
#[async_trait]
pub trait MergeLedger: Send + Sync {
    /// Append a record. Fails with `DuplicateMergeRecord` if one already
    /// exists for the same proposal.
    async fn append(&self, record: MergeRecord) -> StorageResult<()>;

    /// The record written for a proposal, if any.
    async fn find_by_proposal(
        &self,
        proposal_id: &ProposalId,
    ) -> StorageResult<Option<MergeRecord>>;

    /// All records for a repo, oldest first.
    async fn history(&self, repo_id: &RepoId) -> StorageResult<Vec<MergeRecord>>;
}
