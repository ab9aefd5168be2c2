//! Trait contract tests for the hivesync storage traits.
//!
//! These tests verify the behavioral contracts of the storage traits
//! using in-memory fakes. Any conforming implementation must pass these.

use chrono::Utc;
use federated_state::fakes::{
    MemoryMergeLedger, MemoryProposalStore, MemoryRepoStore, MemoryReviewStore, MemoryStreamStore,
    MemorySyncQueue,
};
use federated_state::storage_traits::*;
use federated_state::StorageError;

fn sample_repo(id: &str) -> RepoRecord {
    RepoRecord {
        repo_id: RepoId(id.to_string()),
        merge_mode: MergeMode::Review,
        git_backend: GitBackendKind::Cascade,
        buffer_branch: "buffer".to_string(),
        promote_target: "main".to_string(),
        require_human_approval: false,
        human_review_weight: 2.0,
        review_quorum: 2.0,
        maintainers: vec!["maintainer-1".to_string()],
        plugins: vec![],
        created_at: Utc::now(),
    }
}

fn sample_stream(id: &str, repo: &str, status: ReviewStatus) -> StreamRecord {
    let now = Utc::now();
    StreamRecord {
        stream_id: StreamId(id.to_string()),
        repo_id: RepoId(repo.to_string()),
        branch: format!("stream/{id}"),
        title: "sample change".to_string(),
        author: "agent-1".to_string(),
        review_status: status,
        merge_ref: None,
        created_at: now,
        updated_at: now,
    }
}

fn sample_proposal(id: &str, kind: ProposalKind, status: ProposalStatus) -> ProposalRecord {
    ProposalRecord {
        proposal_id: ProposalId(id.to_string()),
        kind,
        repo_id: RepoId("repo-1".to_string()),
        stream_id: Some(StreamId("stream-1".to_string())),
        votes_for: 3,
        votes_against: 1,
        status,
        created_at: Utc::now(),
        decided_at: None,
    }
}

fn sample_merge_record(proposal: &str) -> MergeRecord {
    MergeRecord::new(
        ProposalId(proposal.to_string()),
        RepoId("repo-1".to_string()),
        Some(StreamId("stream-1".to_string())),
        "merge",
        "cascade",
        true,
        "merged",
        Some("deadbeef".to_string()),
        None,
        Utc::now(),
    )
}

// ===========================================================================
// RepoStore contract tests
// ===========================================================================

#[tokio::test]
async fn repo_put_get_round_trip() {
    let store = MemoryRepoStore::new();
    store.put_repo(sample_repo("repo-1")).await.unwrap();

    let repo = store.get_repo(&RepoId("repo-1".to_string())).await.unwrap();
    assert_eq!(repo.merge_mode, MergeMode::Review);
    assert_eq!(repo.buffer_branch, "buffer");
}

#[tokio::test]
async fn repo_get_missing_is_not_found() {
    let store = MemoryRepoStore::new();
    let err = store
        .get_repo(&RepoId("nope".to_string()))
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::RepoNotFound { .. }));
}

#[tokio::test]
async fn repo_put_replaces_existing() {
    let store = MemoryRepoStore::new();
    store.put_repo(sample_repo("repo-1")).await.unwrap();

    let mut updated = sample_repo("repo-1");
    updated.merge_mode = MergeMode::Gated;
    store.put_repo(updated).await.unwrap();

    let repo = store.get_repo(&RepoId("repo-1".to_string())).await.unwrap();
    assert_eq!(repo.merge_mode, MergeMode::Gated);
    assert_eq!(store.list_repos().await.unwrap().len(), 1);
}

// ===========================================================================
// StreamStore contract tests
// ===========================================================================

#[tokio::test]
async fn stream_status_walks_the_legal_path() {
    let store = MemoryStreamStore::new();
    store
        .put_stream(sample_stream("s1", "repo-1", ReviewStatus::Draft))
        .await
        .unwrap();

    let sid = StreamId("s1".to_string());
    store
        .update_status(&sid, ReviewStatus::Pending)
        .await
        .unwrap();
    store
        .update_status(&sid, ReviewStatus::Approved)
        .await
        .unwrap();
    let stream = store
        .update_status(&sid, ReviewStatus::Merged)
        .await
        .unwrap();
    assert_eq!(stream.review_status, ReviewStatus::Merged);
}

#[tokio::test]
async fn stream_draft_to_merged_is_rejected() {
    let store = MemoryStreamStore::new();
    store
        .put_stream(sample_stream("s1", "repo-1", ReviewStatus::Draft))
        .await
        .unwrap();

    let err = store
        .update_status(&StreamId("s1".to_string()), ReviewStatus::Merged)
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::IllegalTransition { .. }));
}

#[tokio::test]
async fn stream_pending_merge_resumes_to_merged() {
    let store = MemoryStreamStore::new();
    store
        .put_stream(sample_stream(
            "s1",
            "repo-1",
            ReviewStatus::ApprovedPendingMerge,
        ))
        .await
        .unwrap();

    let stream = store
        .update_status(&StreamId("s1".to_string()), ReviewStatus::Merged)
        .await
        .unwrap();
    assert_eq!(stream.review_status, ReviewStatus::Merged);
}

#[tokio::test]
async fn stream_merge_ref_is_recorded() {
    let store = MemoryStreamStore::new();
    store
        .put_stream(sample_stream("s1", "repo-1", ReviewStatus::Approved))
        .await
        .unwrap();

    let sid = StreamId("s1".to_string());
    store.set_merge_ref(&sid, "abc123").await.unwrap();
    let stream = store.get_stream(&sid).await.unwrap();
    assert_eq!(stream.merge_ref.as_deref(), Some("abc123"));
}

#[tokio::test]
async fn stream_list_filters_by_repo() {
    let store = MemoryStreamStore::new();
    store
        .put_stream(sample_stream("s1", "repo-1", ReviewStatus::Draft))
        .await
        .unwrap();
    store
        .put_stream(sample_stream("s2", "repo-2", ReviewStatus::Draft))
        .await
        .unwrap();

    let filtered = store
        .list_streams(Some(&RepoId("repo-1".to_string())))
        .await
        .unwrap();
    assert_eq!(filtered.len(), 1);
    assert_eq!(filtered[0].stream_id.0, "s1");

    assert_eq!(store.list_streams(None).await.unwrap().len(), 2);
}

// ===========================================================================
// ReviewStore contract tests
// ===========================================================================

#[tokio::test]
async fn reviews_are_scoped_to_stream() {
    let store = MemoryReviewStore::new();
    let s1 = StreamId("s1".to_string());
    let s2 = StreamId("s2".to_string());

    store
        .put_review(ReviewRecord::new(
            s1.clone(),
            "alice",
            true,
            true,
            None,
            Utc::now(),
        ))
        .await
        .unwrap();
    store
        .put_review(ReviewRecord::new(
            s2.clone(),
            "bob",
            false,
            false,
            None,
            Utc::now(),
        ))
        .await
        .unwrap();

    let reviews = store.reviews_for_stream(&s1).await.unwrap();
    assert_eq!(reviews.len(), 1);
    assert_eq!(reviews[0].reviewer, "alice");
    assert!(reviews[0].human);
}

// ===========================================================================
// ProposalStore contract tests
// ===========================================================================

#[tokio::test]
async fn proposal_put_get_round_trip() {
    let store = MemoryProposalStore::new();
    store
        .put_proposal(sample_proposal(
            "p1",
            ProposalKind::MergeStream,
            ProposalStatus::Open,
        ))
        .await
        .unwrap();

    let proposal = store
        .get_proposal(&ProposalId("p1".to_string()))
        .await
        .unwrap();
    assert_eq!(proposal.kind, ProposalKind::MergeStream);
    assert_eq!(proposal.status, ProposalStatus::Open);
}

#[tokio::test]
async fn proposal_status_update_records_decision_time() {
    let store = MemoryProposalStore::new();
    store
        .put_proposal(sample_proposal(
            "p1",
            ProposalKind::MergeStream,
            ProposalStatus::Open,
        ))
        .await
        .unwrap();

    let pid = ProposalId("p1".to_string());
    store.set_status(&pid, ProposalStatus::Passed).await.unwrap();
    let proposal = store.get_proposal(&pid).await.unwrap();
    assert_eq!(proposal.status, ProposalStatus::Passed);
    assert!(proposal.decided_at.is_some());
}

#[tokio::test]
async fn proposal_missing_is_not_found() {
    let store = MemoryProposalStore::new();
    let err = store
        .get_proposal(&ProposalId("nope".to_string()))
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::ProposalNotFound { .. }));
}

// ===========================================================================
// SyncEventQueue contract tests
// ===========================================================================

#[tokio::test]
async fn queue_assigns_increasing_seq() {
    let queue = MemorySyncQueue::new();
    let e1 = queue
        .enqueue("review", serde_json::json!({"n": 1}))
        .await
        .unwrap();
    let e2 = queue
        .enqueue("commit", serde_json::json!({"n": 2}))
        .await
        .unwrap();

    assert!(e2.seq > e1.seq);
}

#[tokio::test]
async fn queue_pending_is_ascending_by_seq() {
    let queue = MemorySyncQueue::new();
    for i in 0..5 {
        queue
            .enqueue("activity", serde_json::json!({ "i": i }))
            .await
            .unwrap();
    }

    let pending = queue.pending().await.unwrap();
    assert_eq!(pending.len(), 5);
    for window in pending.windows(2) {
        assert!(window[0].seq < window[1].seq);
    }
}

#[tokio::test]
async fn queue_ack_removes_event() {
    let queue = MemorySyncQueue::new();
    let event = queue
        .enqueue("review", serde_json::json!({}))
        .await
        .unwrap();

    queue.ack(event.seq).await.unwrap();
    assert!(queue.pending().await.unwrap().is_empty());
}

#[tokio::test]
async fn queue_ack_missing_is_not_found() {
    let queue = MemorySyncQueue::new();
    let err = queue.ack(42).await.unwrap_err();
    assert!(matches!(err, StorageError::EventNotFound { .. }));
}

#[tokio::test]
async fn queue_mark_failed_keeps_event_queued() {
    let queue = MemorySyncQueue::new();
    let event = queue
        .enqueue("submit_review", serde_json::json!({}))
        .await
        .unwrap();

    queue.mark_failed(event.seq, "connection reset").await.unwrap();

    let pending = queue.pending().await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].attempts, 1);
    assert_eq!(pending[0].last_error.as_deref(), Some("connection reset"));
}

// ===========================================================================
// MergeLedger contract tests
// ===========================================================================

#[tokio::test]
async fn ledger_append_and_find() {
    let ledger = MemoryMergeLedger::new();
    ledger.append(sample_merge_record("p1")).await.unwrap();

    let found = ledger
        .find_by_proposal(&ProposalId("p1".to_string()))
        .await
        .unwrap()
        .expect("record should exist");
    assert_eq!(found.outcome, "merged");
    assert!(found.executed);
}

#[tokio::test]
async fn ledger_rejects_second_record_for_proposal() {
    let ledger = MemoryMergeLedger::new();
    ledger.append(sample_merge_record("p1")).await.unwrap();

    let err = ledger.append(sample_merge_record("p1")).await.unwrap_err();
    assert!(matches!(err, StorageError::DuplicateMergeRecord { .. }));
}

#[tokio::test]
async fn ledger_find_missing_is_none() {
    let ledger = MemoryMergeLedger::new();
    let found = ledger
        .find_by_proposal(&ProposalId("nope".to_string()))
        .await
        .unwrap();
    assert!(found.is_none());
}

#[tokio::test]
async fn ledger_history_is_scoped_to_repo() {
    let ledger = MemoryMergeLedger::new();
    ledger.append(sample_merge_record("p1")).await.unwrap();

    let mut other = sample_merge_record("p2");
    other.repo_id = RepoId("repo-2".to_string());
    ledger.append(other).await.unwrap();

    let history = ledger
        .history(&RepoId("repo-1".to_string()))
        .await
        .unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].proposal_id.0, "p1");
}
