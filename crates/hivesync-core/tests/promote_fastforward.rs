//! Promote execution tests: fast-forward-only policy on the cascade
//! backend, intent recording on the remote-api backend, and the
//! distinct blocked outcome.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use federated_state::fakes::{
    MemoryMergeLedger, MemoryProposalStore, MemoryRepoStore, MemoryStreamStore,
};
use federated_state::{
    GitBackendKind, MergeLedger, MergeMode, ProposalId, ProposalKind, ProposalRecord,
    ProposalStatus, ProposalStore, RepoId, RepoRecord, RepoStore, StreamRecord,
};
use hivesync_core::{
    BackendOutcome, BackendRegistry, ExecutionStatus, HivesyncError, MergeBackend,
    ProposalExecutor, Result,
};

struct ScriptedBackend {
    kind: GitBackendKind,
    outcome: Mutex<BackendOutcome>,
    promote_calls: AtomicUsize,
}

impl ScriptedBackend {
    fn new(kind: GitBackendKind, outcome: BackendOutcome) -> Arc<Self> {
        Arc::new(Self {
            kind,
            outcome: Mutex::new(outcome),
            promote_calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl MergeBackend for ScriptedBackend {
    fn kind(&self) -> GitBackendKind {
        self.kind
    }

    async fn merge(&self, _stream: &StreamRecord, _repo: &RepoRecord) -> Result<BackendOutcome> {
        unreachable!("promote tests never merge")
    }

    async fn revert(&self, _stream: &StreamRecord, _repo: &RepoRecord) -> Result<BackendOutcome> {
        unreachable!("promote tests never revert")
    }

    async fn fast_forward_promote(&self, _repo: &RepoRecord) -> Result<BackendOutcome> {
        self.promote_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.outcome.lock().unwrap().clone())
    }
}

struct Fixture {
    repos: Arc<MemoryRepoStore>,
    proposals: Arc<MemoryProposalStore>,
    ledger: Arc<MemoryMergeLedger>,
    cascade: Arc<ScriptedBackend>,
    executor: ProposalExecutor,
}

fn fixture(cascade_outcome: BackendOutcome) -> Fixture {
    let repos = Arc::new(MemoryRepoStore::new());
    let streams = Arc::new(MemoryStreamStore::new());
    let proposals = Arc::new(MemoryProposalStore::new());
    let ledger = Arc::new(MemoryMergeLedger::new());
    let cascade = ScriptedBackend::new(GitBackendKind::Cascade, cascade_outcome);
    let remote_api = ScriptedBackend::new(
        GitBackendKind::RemoteApi,
        BackendOutcome::deferred("promote intent recorded; fast-forward happens remotely"),
    );
    let registry = Arc::new(BackendRegistry::new(
        cascade.clone() as Arc<dyn MergeBackend>,
        remote_api as Arc<dyn MergeBackend>,
    ));
    let executor = ProposalExecutor::new(
        repos.clone(),
        streams,
        proposals.clone(),
        ledger.clone(),
        registry,
    );
    Fixture {
        repos,
        proposals,
        ledger,
        cascade,
        executor,
    }
}

fn repo(backend: GitBackendKind, buffer: &str, target: &str) -> RepoRecord {
    RepoRecord {
        repo_id: RepoId("repo-1".to_string()),
        merge_mode: MergeMode::Gated,
        git_backend: backend,
        buffer_branch: buffer.to_string(),
        promote_target: target.to_string(),
        require_human_approval: false,
        human_review_weight: 1.0,
        review_quorum: 1.0,
        maintainers: vec![],
        plugins: vec![],
        created_at: Utc::now(),
    }
}

fn promote_proposal() -> ProposalRecord {
    ProposalRecord {
        proposal_id: ProposalId("p1".to_string()),
        kind: ProposalKind::Promote,
        repo_id: RepoId("repo-1".to_string()),
        stream_id: None,
        votes_for: 5,
        votes_against: 0,
        status: ProposalStatus::Passed,
        created_at: Utc::now(),
        decided_at: Some(Utc::now()),
    }
}

#[tokio::test]
async fn cascade_promote_fast_forwards() {
    let fx = fixture(BackendOutcome::completed(Some("ff0001".to_string())));
    fx.repos
        .put_repo(repo(GitBackendKind::Cascade, "buffer", "main"))
        .await
        .unwrap();
    fx.proposals.put_proposal(promote_proposal()).await.unwrap();

    let outcome = fx
        .executor
        .execute(&ProposalId("p1".to_string()))
        .await
        .unwrap();

    assert_eq!(outcome.status, ExecutionStatus::Promoted);
    let record = outcome.record.unwrap();
    assert!(record.executed);
    assert_eq!(record.operation, "promote");
    assert_eq!(record.merge_ref.as_deref(), Some("ff0001"));
    assert_eq!(fx.cascade.promote_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn cascade_promote_blocked_is_distinct_and_retryable() {
    let fx = fixture(BackendOutcome::conflicted(
        "main cannot fast-forward to buffer",
    ));
    fx.repos
        .put_repo(repo(GitBackendKind::Cascade, "buffer", "main"))
        .await
        .unwrap();
    fx.proposals.put_proposal(promote_proposal()).await.unwrap();

    let outcome = fx
        .executor
        .execute(&ProposalId("p1".to_string()))
        .await
        .unwrap();

    // Blocked, not promoted — and no record pretending otherwise.
    assert_eq!(outcome.status, ExecutionStatus::PromoteBlocked);
    assert!(outcome.record.is_none());
    assert!(outcome.detail.unwrap().contains("fast-forward"));

    let proposal = fx
        .proposals
        .get_proposal(&ProposalId("p1".to_string()))
        .await
        .unwrap();
    assert_eq!(proposal.status, ProposalStatus::Passed, "retryable");
    assert!(fx
        .ledger
        .find_by_proposal(&ProposalId("p1".to_string()))
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn remote_api_promote_records_intent_only() {
    let fx = fixture(BackendOutcome::completed(None));
    fx.repos
        .put_repo(repo(GitBackendKind::RemoteApi, "buffer", "main"))
        .await
        .unwrap();
    fx.proposals.put_proposal(promote_proposal()).await.unwrap();

    let outcome = fx
        .executor
        .execute(&ProposalId("p1".to_string()))
        .await
        .unwrap();

    assert_eq!(outcome.status, ExecutionStatus::PromoteRecorded);
    let record = outcome.record.unwrap();
    assert!(!record.executed);
    assert_eq!(record.outcome, "promote_recorded");
    // The cascade engine was never touched.
    assert_eq!(fx.cascade.promote_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn promote_without_branch_config_is_invalid() {
    let fx = fixture(BackendOutcome::completed(None));
    fx.repos
        .put_repo(repo(GitBackendKind::Cascade, "", "main"))
        .await
        .unwrap();
    fx.proposals.put_proposal(promote_proposal()).await.unwrap();

    let err = fx
        .executor
        .execute(&ProposalId("p1".to_string()))
        .await
        .unwrap_err();

    assert!(matches!(err, HivesyncError::InvalidRepoConfig { .. }));
    assert_eq!(fx.cascade.promote_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn promote_replay_returns_stored_outcome() {
    let fx = fixture(BackendOutcome::completed(Some("ff0001".to_string())));
    fx.repos
        .put_repo(repo(GitBackendKind::Cascade, "buffer", "main"))
        .await
        .unwrap();
    fx.proposals.put_proposal(promote_proposal()).await.unwrap();

    fx.executor
        .execute(&ProposalId("p1".to_string()))
        .await
        .unwrap();
    let replayed = fx
        .executor
        .execute(&ProposalId("p1".to_string()))
        .await
        .unwrap();

    assert!(replayed.replayed);
    assert_eq!(replayed.status, ExecutionStatus::Promoted);
    assert_eq!(fx.cascade.promote_calls.load(Ordering::SeqCst), 1);
}
