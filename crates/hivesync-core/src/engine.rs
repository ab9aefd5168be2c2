//! Federation engine facade.
//!
//! Wires the stores, the remote authority client, and the backend
//! registry into one entry point. Both governance paths converge here:
//! a council-passed proposal goes straight to the executor via
//! [`FederationEngine::execute_proposal`], and a per-stream merge attempt
//! goes through gating via [`FederationEngine::attempt_merge`], which
//! turns an allowed attempt into a passed proposal executed by the same
//! executor.

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use federated_state::{
    MergeLedger, ProposalId, ProposalKind, ProposalRecord, ProposalStatus, ProposalStore,
    RepoStore, ReviewRecord, ReviewStore, StreamId, StreamStore, SyncEvent, SyncEventQueue,
};

use crate::backend::BackendRegistry;
use crate::compat::{self, CompatDiagnostic};
use crate::error::Result;
use crate::executor::{ExecutionOutcome, ProposalExecutor};
use crate::gating::{GatingCoordinator, MergeClearance};
use crate::obs;
use crate::remote::RemoteAuthority;
use crate::session::AgentSession;
use crate::sync::{FlushReport, SyncFlusher};

/// Result of a per-stream merge attempt.
#[derive(Debug, Clone)]
pub enum MergeAttempt {
    /// Gating allowed the merge; the execution outcome follows.
    Executed(ExecutionOutcome),
    /// The merge request was queued for the remote authority.
    Queued { seq: u64 },
}

/// The stores the engine runs on. Grouping them keeps the engine
/// constructor readable; one `SurrealFederationStore` can back every
/// field.
pub struct EngineStores {
    pub repos: Arc<dyn RepoStore>,
    pub streams: Arc<dyn StreamStore>,
    pub reviews: Arc<dyn ReviewStore>,
    pub proposals: Arc<dyn ProposalStore>,
    pub queue: Arc<dyn SyncEventQueue>,
    pub ledger: Arc<dyn MergeLedger>,
}

/// Single entry point for merge coordination.
pub struct FederationEngine {
    stores: EngineStores,
    session: AgentSession,
    /// Plugin ids with a local handler registered.
    local_handlers: Vec<String>,
    gating: GatingCoordinator,
    executor: ProposalExecutor,
    flusher: SyncFlusher,
}

impl FederationEngine {
    pub fn new(
        stores: EngineStores,
        remote: Arc<dyn RemoteAuthority>,
        backends: Arc<BackendRegistry>,
        session: AgentSession,
        local_handlers: Vec<String>,
    ) -> Self {
        let gating = GatingCoordinator::new(
            Arc::clone(&stores.reviews),
            Arc::clone(&stores.queue),
            Arc::clone(&remote),
        );
        let executor = ProposalExecutor::new(
            Arc::clone(&stores.repos),
            Arc::clone(&stores.streams),
            Arc::clone(&stores.proposals),
            Arc::clone(&stores.ledger),
            backends,
        );
        let flusher = SyncFlusher::new(Arc::clone(&stores.queue), remote);

        Self {
            stores,
            session,
            local_handlers,
            gating,
            executor,
            flusher,
        }
    }

    /// Initialization hook: check plugin-tier compatibility for every
    /// configured repo and return the diagnostics. Non-fatal; warnings
    /// are also logged but the caller decides how to surface them.
    pub async fn open(&self) -> Result<Vec<CompatDiagnostic>> {
        let mut diagnostics = Vec::new();
        for repo in self.stores.repos.list_repos().await? {
            diagnostics.extend(compat::check_plugin_compat(
                &repo,
                self.session.mode,
                &self.local_handlers,
            ));
        }
        for diagnostic in &diagnostics {
            warn!(
                event = "compat.warning",
                plugin_id = %diagnostic.plugin_id,
                reason = %diagnostic.reason,
            );
        }
        info!(
            event = "engine.opened",
            agent_id = %self.session.agent_id,
            diagnostics = diagnostics.len(),
        );
        Ok(diagnostics)
    }

    /// Attempt to merge a stream under its repo's governance policy.
    ///
    /// Gating runs first; an allowed attempt becomes a passed
    /// `merge_stream` proposal executed immediately, so both governance
    /// entry points share the executor's recording and idempotency.
    pub async fn attempt_merge(&self, stream_id: &StreamId) -> Result<MergeAttempt> {
        let stream = self.stores.streams.get_stream(stream_id).await?;
        let repo = self.stores.repos.get_repo(&stream.repo_id).await?;

        match self
            .gating
            .clear_for_merge(&stream, &repo, &self.session)
            .await?
        {
            MergeClearance::Queued { seq } => Ok(MergeAttempt::Queued { seq }),
            MergeClearance::Allowed { .. } => {
                let proposal = ProposalRecord {
                    proposal_id: ProposalId::new(),
                    kind: ProposalKind::MergeStream,
                    repo_id: repo.repo_id.clone(),
                    stream_id: Some(stream_id.clone()),
                    votes_for: 0,
                    votes_against: 0,
                    status: ProposalStatus::Passed,
                    created_at: Utc::now(),
                    decided_at: Some(Utc::now()),
                };
                let proposal_id = proposal.proposal_id.clone();
                self.stores.proposals.put_proposal(proposal).await?;

                let outcome = self.executor.execute(&proposal_id).await?;
                Ok(MergeAttempt::Executed(outcome))
            }
        }
    }

    /// Execute a council proposal that voting has already passed.
    pub async fn execute_proposal(&self, proposal_id: &ProposalId) -> Result<ExecutionOutcome> {
        self.executor.execute(proposal_id).await
    }

    /// Flush the sync queue to the remote authority.
    pub async fn flush(&self) -> Result<FlushReport> {
        self.flusher.flush().await
    }

    /// Record local activity destined for the remote authority.
    pub async fn record_activity(
        &self,
        kind: &str,
        payload: serde_json::Value,
    ) -> Result<SyncEvent> {
        Ok(self.stores.queue.enqueue(kind, payload).await?)
    }

    /// Store a review locally and queue it for the remote authority.
    pub async fn submit_review(
        &self,
        stream_id: &StreamId,
        reviewer: &str,
        approved: bool,
        human: bool,
        comment: Option<String>,
    ) -> Result<ReviewRecord> {
        // The stream must exist before a review can attach to it.
        self.stores.streams.get_stream(stream_id).await?;

        let review = ReviewRecord::new(
            stream_id.clone(),
            reviewer,
            approved,
            human,
            comment,
            Utc::now(),
        );
        self.stores.reviews.put_review(review.clone()).await?;
        self.stores
            .queue
            .enqueue("submit_review", serde_json::to_value(&review)?)
            .await?;
        Ok(review)
    }

    /// Fire a plugin trigger. Declared plugins with no usable handler in
    /// the current session are logged (with the triggering event name)
    /// and skipped — never executed, never affecting merge behavior.
    /// Returns the skipped plugin ids.
    pub async fn fire_trigger(
        &self,
        repo_id: &federated_state::RepoId,
        event: &str,
    ) -> Result<Vec<String>> {
        let repo = self.stores.repos.get_repo(repo_id).await?;
        let skipped = compat::skipped_plugins(&repo, self.session.mode, &self.local_handlers);
        if !skipped.is_empty() {
            obs::emit_plugins_skipped(event, &skipped);
        }
        Ok(skipped)
    }

    pub fn session(&self) -> &AgentSession {
        &self.session
    }
}
