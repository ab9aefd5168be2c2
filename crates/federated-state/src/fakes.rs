//! In-memory fakes for storage traits (testing only)
//!
//! Provides `Memory*` implementations of every storage trait that satisfy
//! the trait contracts without any external dependencies.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;

use crate::error::StorageError;
use crate::storage_traits::*;

// ---------------------------------------------------------------------------
// MemoryRepoStore
// ---------------------------------------------------------------------------

/// In-memory repo configuration store.
#[derive(Debug, Default)]
pub struct MemoryRepoStore {
    repos: Mutex<HashMap<String, RepoRecord>>,
}

impl MemoryRepoStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RepoStore for MemoryRepoStore {
    async fn put_repo(&self, repo: RepoRecord) -> StorageResult<()> {
        let mut repos = self.repos.lock().unwrap();
        repos.insert(repo.repo_id.0.clone(), repo);
        Ok(())
    }

    async fn get_repo(&self, repo_id: &RepoId) -> StorageResult<RepoRecord> {
        let repos = self.repos.lock().unwrap();
        repos
            .get(&repo_id.0)
            .cloned()
            .ok_or_else(|| StorageError::RepoNotFound {
                repo_id: repo_id.0.clone(),
            })
    }

    async fn list_repos(&self) -> StorageResult<Vec<RepoRecord>> {
        let repos = self.repos.lock().unwrap();
        let mut all: Vec<RepoRecord> = repos.values().cloned().collect();
        all.sort_by(|a, b| a.repo_id.0.cmp(&b.repo_id.0));
        Ok(all)
    }
}

// ---------------------------------------------------------------------------
// MemoryStreamStore
// ---------------------------------------------------------------------------

/// In-memory stream store enforcing the review-status transition table.
#[derive(Debug, Default)]
pub struct MemoryStreamStore {
    streams: Mutex<HashMap<String, StreamRecord>>,
}

impl MemoryStreamStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StreamStore for MemoryStreamStore {
    async fn put_stream(&self, stream: StreamRecord) -> StorageResult<()> {
        let mut streams = self.streams.lock().unwrap();
        streams.insert(stream.stream_id.0.clone(), stream);
        Ok(())
    }

    async fn get_stream(&self, stream_id: &StreamId) -> StorageResult<StreamRecord> {
        let streams = self.streams.lock().unwrap();
        streams
            .get(&stream_id.0)
            .cloned()
            .ok_or_else(|| StorageError::StreamNotFound {
                stream_id: stream_id.0.clone(),
            })
    }

    async fn update_status(
        &self,
        stream_id: &StreamId,
        next: ReviewStatus,
    ) -> StorageResult<StreamRecord> {
        let mut streams = self.streams.lock().unwrap();
        let stream = streams
            .get_mut(&stream_id.0)
            .ok_or_else(|| StorageError::StreamNotFound {
                stream_id: stream_id.0.clone(),
            })?;
        if !stream.review_status.can_transition_to(next) {
            return Err(StorageError::IllegalTransition {
                stream_id: stream_id.0.clone(),
                from: stream.review_status.as_str().to_string(),
                to: next.as_str().to_string(),
            });
        }
        stream.review_status = next;
        stream.updated_at = Utc::now();
        Ok(stream.clone())
    }

    async fn set_merge_ref(&self, stream_id: &StreamId, merge_ref: &str) -> StorageResult<()> {
        let mut streams = self.streams.lock().unwrap();
        let stream = streams
            .get_mut(&stream_id.0)
            .ok_or_else(|| StorageError::StreamNotFound {
                stream_id: stream_id.0.clone(),
            })?;
        stream.merge_ref = Some(merge_ref.to_string());
        stream.updated_at = Utc::now();
        Ok(())
    }

    async fn list_streams(&self, repo_id: Option<&RepoId>) -> StorageResult<Vec<StreamRecord>> {
        let streams = self.streams.lock().unwrap();
        let mut all: Vec<StreamRecord> = streams
            .values()
            .filter(|s| repo_id.map_or(true, |r| &s.repo_id == r))
            .cloned()
            .collect();
        all.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(all)
    }
}

// ---------------------------------------------------------------------------
// MemoryReviewStore
// ---------------------------------------------------------------------------

/// In-memory review store.
#[derive(Debug, Default)]
pub struct MemoryReviewStore {
    reviews: Mutex<Vec<ReviewRecord>>,
}

impl MemoryReviewStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ReviewStore for MemoryReviewStore {
    async fn put_review(&self, review: ReviewRecord) -> StorageResult<()> {
        let mut reviews = self.reviews.lock().unwrap();
        reviews.push(review);
        Ok(())
    }

    async fn reviews_for_stream(&self, stream_id: &StreamId) -> StorageResult<Vec<ReviewRecord>> {
        let reviews = self.reviews.lock().unwrap();
        Ok(reviews
            .iter()
            .filter(|r| &r.stream_id == stream_id)
            .cloned()
            .collect())
    }
}

// ---------------------------------------------------------------------------
// MemoryProposalStore
// ---------------------------------------------------------------------------

/// In-memory council proposal store.
#[derive(Debug, Default)]
pub struct MemoryProposalStore {
    proposals: Mutex<HashMap<String, ProposalRecord>>,
}

impl MemoryProposalStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProposalStore for MemoryProposalStore {
    async fn put_proposal(&self, proposal: ProposalRecord) -> StorageResult<()> {
        let mut proposals = self.proposals.lock().unwrap();
        proposals.insert(proposal.proposal_id.0.clone(), proposal);
        Ok(())
    }

    async fn get_proposal(&self, proposal_id: &ProposalId) -> StorageResult<ProposalRecord> {
        let proposals = self.proposals.lock().unwrap();
        proposals
            .get(&proposal_id.0)
            .cloned()
            .ok_or_else(|| StorageError::ProposalNotFound {
                proposal_id: proposal_id.0.clone(),
            })
    }

    async fn set_status(
        &self,
        proposal_id: &ProposalId,
        status: ProposalStatus,
    ) -> StorageResult<()> {
        let mut proposals = self.proposals.lock().unwrap();
        let proposal =
            proposals
                .get_mut(&proposal_id.0)
                .ok_or_else(|| StorageError::ProposalNotFound {
                    proposal_id: proposal_id.0.clone(),
                })?;
        proposal.status = status;
        if proposal.decided_at.is_none()
            && matches!(status, ProposalStatus::Passed | ProposalStatus::Failed)
        {
            proposal.decided_at = Some(Utc::now());
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MemorySyncQueue
// ---------------------------------------------------------------------------

/// In-memory sync event queue with strict seq ordering.
#[derive(Debug, Default)]
pub struct MemorySyncQueue {
    inner: Mutex<SyncQueueState>,
}

#[derive(Debug, Default)]
struct SyncQueueState {
    next_seq: u64,
    events: BTreeMap<u64, SyncEvent>,
}

impl MemorySyncQueue {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SyncEventQueue for MemorySyncQueue {
    async fn enqueue(&self, kind: &str, payload: serde_json::Value) -> StorageResult<SyncEvent> {
        let mut inner = self.inner.lock().unwrap();
        inner.next_seq += 1;
        let event = SyncEvent {
            seq: inner.next_seq,
            kind: kind.to_string(),
            payload,
            created_at: Utc::now(),
            attempts: 0,
            last_error: None,
        };
        inner.events.insert(event.seq, event.clone());
        Ok(event)
    }

    async fn pending(&self) -> StorageResult<Vec<SyncEvent>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.events.values().cloned().collect())
    }

    async fn ack(&self, seq: u64) -> StorageResult<()> {
        let mut inner = self.inner.lock().unwrap();
        inner
            .events
            .remove(&seq)
            .map(|_| ())
            .ok_or(StorageError::EventNotFound { seq })
    }

    async fn mark_failed(&self, seq: u64, error: &str) -> StorageResult<()> {
        let mut inner = self.inner.lock().unwrap();
        let event = inner
            .events
            .get_mut(&seq)
            .ok_or(StorageError::EventNotFound { seq })?;
        event.attempts += 1;
        event.last_error = Some(error.to_string());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MemoryMergeLedger
// ---------------------------------------------------------------------------

/// In-memory append-only merge ledger.
#[derive(Debug, Default)]
pub struct MemoryMergeLedger {
    records: Mutex<Vec<MergeRecord>>,
}

impl MemoryMergeLedger {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MergeLedger for MemoryMergeLedger {
    async fn append(&self, record: MergeRecord) -> StorageResult<()> {
        let mut records = self.records.lock().unwrap();
        if records
            .iter()
            .any(|r| r.proposal_id == record.proposal_id)
        {
            return Err(StorageError::DuplicateMergeRecord {
                proposal_id: record.proposal_id.0.clone(),
            });
        }
        records.push(record);
        Ok(())
    }

    async fn find_by_proposal(
        &self,
        proposal_id: &ProposalId,
    ) -> StorageResult<Option<MergeRecord>> {
        let records = self.records.lock().unwrap();
        Ok(records
            .iter()
            .find(|r| &r.proposal_id == proposal_id)
            .cloned())
    }

    async fn history(&self, repo_id: &RepoId) -> StorageResult<Vec<MergeRecord>> {
        let records = self.records.lock().unwrap();
        Ok(records
            .iter()
            .filter(|r| &r.repo_id == repo_id)
            .cloned()
            .collect())
    }
}
