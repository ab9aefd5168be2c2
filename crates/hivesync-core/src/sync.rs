//! Sync queue flush protocol.
//!
//! Local activity queues as [`SyncEvent`]s and drains to the remote
//! authority in strict sequence order — later review events may be
//! causally dependent on earlier ones (a submission must precede its
//! review), so the flusher never skips ahead and never reorders.
//!
//! Every flush returns a structured [`FlushReport`]; call sites must
//! branch on its fields rather than rely on absence-of-exception.

use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::debug;

use federated_state::SyncEventQueue;

use crate::error::Result;
use crate::obs;
use crate::remote::RemoteAuthority;

/// Event kinds whose failed delivery must block dependent consensus
/// checks. Informational kinds (commit logs, activity records) do not.
pub const REVIEW_CRITICAL_KINDS: [&str; 2] = ["review", "submit_review"];

/// Whether a failed event of this kind blocks consensus evaluation.
pub fn is_review_critical(kind: &str) -> bool {
    REVIEW_CRITICAL_KINDS.contains(&kind)
}

/// Structured result of a flush.
///
/// `failed_kinds` deliberately over-reports: it contains the kind of the
/// event that actually failed **and** of every subsequent queued event,
/// since those were never attempted due to the ordering stop. A caller
/// cannot distinguish "failed" from "not attempted" and must treat both
/// as not yet reflected on the remote side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlushReport {
    /// Events acknowledged and removed from the queue.
    pub flushed: usize,
    /// Events still queued after the flush.
    pub remaining: usize,
    /// Kinds of the failed event and every event behind it.
    pub failed_kinds: BTreeSet<String>,
}

impl FlushReport {
    /// Whether every queued event reached the remote authority.
    pub fn is_clean(&self) -> bool {
        self.failed_kinds.is_empty() && self.remaining == 0
    }

    /// Whether any review-critical kind failed — dependent consensus
    /// checks must refuse to proceed.
    pub fn blocks_consensus(&self) -> bool {
        self.failed_kinds.iter().any(|k| is_review_critical(k))
    }

    /// Failed kinds as a sorted list (for error messages and logs).
    pub fn failed_kinds_vec(&self) -> Vec<String> {
        self.failed_kinds.iter().cloned().collect()
    }
}

/// Drains the local sync queue to the remote authority.
pub struct SyncFlusher {
    queue: Arc<dyn SyncEventQueue>,
    remote: Arc<dyn RemoteAuthority>,
}

impl SyncFlusher {
    pub fn new(queue: Arc<dyn SyncEventQueue>, remote: Arc<dyn RemoteAuthority>) -> Self {
        Self { queue, remote }
    }

    /// Flush pending events in ascending sequence order.
    ///
    /// Stops at the first event whose acknowledgement fails (nack,
    /// missing ack, or transport failure — a timeout is treated
    /// identically to a network failure). The failed event is marked
    /// with its error and stays queued; nothing behind it is attempted.
    pub async fn flush(&self) -> Result<FlushReport> {
        let pending = self.queue.pending().await?;
        let total = pending.len();

        let mut flushed = 0usize;
        let mut failed_kinds: BTreeSet<String> = BTreeSet::new();
        let mut stopped_at: Option<usize> = None;

        for (idx, event) in pending.iter().enumerate() {
            // Delivered one at a time: strict ordering means an event is
            // only offered once everything before it is acknowledged.
            let failure = match self.remote.ack_events(std::slice::from_ref(event)).await {
                Ok(acks) => match acks.first() {
                    Some(ack) if ack.accepted => None,
                    Some(ack) => Some(
                        ack.reason
                            .clone()
                            .unwrap_or_else(|| "rejected by remote authority".to_string()),
                    ),
                    None => Some("remote returned no acknowledgement".to_string()),
                },
                Err(err) => Some(err.to_string()),
            };

            match failure {
                None => {
                    self.queue.ack(event.seq).await?;
                    flushed += 1;
                    debug!(seq = event.seq, kind = %event.kind, "sync event acknowledged");
                }
                Some(error) => {
                    self.queue.mark_failed(event.seq, &error).await?;
                    debug!(seq = event.seq, kind = %event.kind, error = %error, "sync event failed; stopping flush");
                    stopped_at = Some(idx);
                    break;
                }
            }
        }

        if let Some(idx) = stopped_at {
            // The failed event plus everything behind it: none of these
            // are reflected on the remote side.
            for event in &pending[idx..] {
                failed_kinds.insert(event.kind.clone());
            }
        }

        let report = FlushReport {
            flushed,
            remaining: total - flushed,
            failed_kinds,
        };

        obs::emit_flush_completed(report.flushed, report.remaining, &report.failed_kinds_vec());
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use federated_state::fakes::MemorySyncQueue;
    use federated_state::{RepoId, StreamId, SyncEvent};
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::remote::{EventAck, MergeDecision, RemoteError};

    /// Remote that acks everything until a scripted seq, which it nacks.
    struct NackAfter {
        fail_seq: Option<u64>,
        calls: AtomicUsize,
    }

    impl NackAfter {
        fn new(fail_seq: Option<u64>) -> Self {
            Self {
                fail_seq,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl RemoteAuthority for NackAfter {
        async fn request_merge(
            &self,
            _repo_id: &RepoId,
            _stream_id: &StreamId,
        ) -> std::result::Result<MergeDecision, RemoteError> {
            unreachable!("flush tests never delegate merges")
        }

        async fn ack_events(
            &self,
            batch: &[SyncEvent],
        ) -> std::result::Result<Vec<EventAck>, RemoteError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(batch
                .iter()
                .map(|e| EventAck {
                    seq: e.seq,
                    accepted: Some(e.seq) != self.fail_seq,
                    reason: (Some(e.seq) == self.fail_seq)
                        .then(|| "scripted rejection".to_string()),
                })
                .collect())
        }
    }

    async fn queue_with(kinds: &[&str]) -> Arc<MemorySyncQueue> {
        let queue = Arc::new(MemorySyncQueue::new());
        for kind in kinds {
            queue
                .enqueue(kind, serde_json::json!({}))
                .await
                .unwrap();
        }
        queue
    }

    #[tokio::test]
    async fn clean_flush_drains_queue() {
        let queue = queue_with(&["commit", "review", "activity"]).await;
        let remote = Arc::new(NackAfter::new(None));
        let flusher = SyncFlusher::new(queue.clone(), remote);

        let report = flusher.flush().await.unwrap();
        assert!(report.is_clean());
        assert_eq!(report.flushed, 3);
        assert_eq!(report.remaining, 0);
        assert!(queue.pending().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn failure_stops_and_over_reports() {
        // seq: 1=commit 2=submit_review 3=review 4=activity; fail at 2.
        let queue = queue_with(&["commit", "submit_review", "review", "activity"]).await;
        let remote = Arc::new(NackAfter::new(Some(2)));
        let flusher = SyncFlusher::new(queue.clone(), remote.clone());

        let report = flusher.flush().await.unwrap();
        assert_eq!(report.flushed, 1);
        assert_eq!(report.remaining, 3);
        // Includes the failed kind and every kind behind it.
        assert!(report.failed_kinds.contains("submit_review"));
        assert!(report.failed_kinds.contains("review"));
        assert!(report.failed_kinds.contains("activity"));
        assert!(!report.failed_kinds.contains("commit"));
        // Events after the failure were never offered to the remote.
        assert_eq!(remote.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn failed_event_is_marked_not_dropped() {
        let queue = queue_with(&["review"]).await;
        let remote = Arc::new(NackAfter::new(Some(1)));
        let flusher = SyncFlusher::new(queue.clone(), remote);

        flusher.flush().await.unwrap();

        let pending = queue.pending().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].attempts, 1);
        assert_eq!(pending[0].last_error.as_deref(), Some("scripted rejection"));
    }

    #[tokio::test]
    async fn network_error_counts_as_failure() {
        struct Down;

        #[async_trait]
        impl RemoteAuthority for Down {
            async fn request_merge(
                &self,
                _repo_id: &RepoId,
                _stream_id: &StreamId,
            ) -> std::result::Result<MergeDecision, RemoteError> {
                Err(RemoteError::Network("down".to_string()))
            }

            async fn ack_events(
                &self,
                _batch: &[SyncEvent],
            ) -> std::result::Result<Vec<EventAck>, RemoteError> {
                Err(RemoteError::Timeout("deadline exceeded".to_string()))
            }
        }

        let queue = queue_with(&["commit", "review"]).await;
        let flusher = SyncFlusher::new(queue.clone(), Arc::new(Down));

        let report = flusher.flush().await.unwrap();
        assert_eq!(report.flushed, 0);
        assert_eq!(report.remaining, 2);
        assert!(report.blocks_consensus());

        let pending = queue.pending().await.unwrap();
        assert!(pending[0].last_error.as_deref().unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn informational_failures_do_not_block_consensus() {
        let queue = queue_with(&["commit", "activity"]).await;
        let remote = Arc::new(NackAfter::new(Some(1)));
        let flusher = SyncFlusher::new(queue, remote);

        let report = flusher.flush().await.unwrap();
        assert!(!report.failed_kinds.is_empty());
        assert!(!report.blocks_consensus());
    }

    #[tokio::test]
    async fn empty_queue_flush_is_clean() {
        let queue = Arc::new(MemorySyncQueue::new());
        let flusher = SyncFlusher::new(queue, Arc::new(NackAfter::new(None)));

        let report = flusher.flush().await.unwrap();
        assert!(report.is_clean());
        assert_eq!(report.flushed, 0);
    }

    #[test]
    fn review_critical_classification() {
        assert!(is_review_critical("review"));
        assert!(is_review_critical("submit_review"));
        assert!(!is_review_critical("commit"));
        assert!(!is_review_critical("activity"));
        assert!(!is_review_critical("merge_request"));
    }
}
