//! Gating coordination for stream merge attempts.
//!
//! Decides, per merge mode and per session mode, whether a merge attempt
//! is allowed locally, must be delegated to the remote authority, or has
//! to wait in the sync queue. The dispatch is a flat match over the
//! `(merge_mode, session_mode)` pair so every combination stays
//! exhaustively testable.
//!
//! Invariants enforced here:
//! - Consensus is never evaluated against review data that is not fully
//!   synchronized: a flush runs first and review-critical failures abort
//!   with [`HivesyncError::StaleReviewData`] before any evaluation.
//! - A delegated decision from the remote authority is authoritative;
//!   no local consensus re-check runs afterwards.
//! - When gated and federated but the authority is unreachable, the
//!   request is queued — never downgraded to the local maintainer check,
//!   which would let an agent bypass server-enforced gating by
//!   disconnecting.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use federated_state::{MergeMode, RepoRecord, ReviewStore, StreamRecord, SyncEventQueue};

use crate::consensus::{self, ConsensusOutcome};
use crate::error::{HivesyncError, Result};
use crate::obs;
use crate::remote::{MergeDecision, RemoteAuthority};
use crate::session::{AgentSession, SessionMode};
use crate::sync::SyncFlusher;

/// A positive gating outcome. Denials and stale-data conditions are
/// errors, so a returned clearance always means "safe to proceed" or
/// "safely queued".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MergeClearance {
    /// The merge may proceed now.
    Allowed {
        /// Local consensus evaluation, when one ran (review mode only).
        consensus: Option<ConsensusOutcome>,
        /// The remote authority's decision, when one was delegated.
        decision: Option<MergeDecision>,
    },
    /// The remote authority was unreachable; the merge request is queued
    /// for later delivery as a sync event.
    Queued { seq: u64 },
}

impl MergeClearance {
    pub fn is_allowed(&self) -> bool {
        matches!(self, MergeClearance::Allowed { .. })
    }
}

/// Coordinates gating for merge attempts.
pub struct GatingCoordinator {
    reviews: Arc<dyn ReviewStore>,
    queue: Arc<dyn SyncEventQueue>,
    remote: Arc<dyn RemoteAuthority>,
    flusher: SyncFlusher,
}

impl GatingCoordinator {
    pub fn new(
        reviews: Arc<dyn ReviewStore>,
        queue: Arc<dyn SyncEventQueue>,
        remote: Arc<dyn RemoteAuthority>,
    ) -> Self {
        let flusher = SyncFlusher::new(Arc::clone(&queue), Arc::clone(&remote));
        Self {
            reviews,
            queue,
            remote,
            flusher,
        }
    }

    /// Decide whether `stream` may merge under `repo`'s policy in the
    /// current session.
    ///
    /// # Errors
    ///
    /// - [`HivesyncError::StaleReviewData`] when review-critical sync
    ///   events failed to flush before a consensus evaluation.
    /// - [`HivesyncError::GatingDenied`] on any explicit negative
    ///   decision (quorum miss, failed maintainer check, remote denial).
    pub async fn clear_for_merge(
        &self,
        stream: &StreamRecord,
        repo: &RepoRecord,
        session: &AgentSession,
    ) -> Result<MergeClearance> {
        match (repo.merge_mode, session.mode) {
            // Swarm: no gating, no consensus, no flush.
            (MergeMode::Swarm, _) => {
                obs::emit_gating_decision(&stream.stream_id.0, "swarm", "allowed", "no gating");
                Ok(MergeClearance::Allowed {
                    consensus: None,
                    decision: None,
                })
            }

            // Review: flush, refuse on stale review data, then evaluate.
            (MergeMode::Review, _) => self.review_consensus(stream, repo).await,

            // Gated, disconnected: the local maintainer check is
            // sufficient and no remote call is made.
            (MergeMode::Gated, SessionMode::Local) => {
                if repo.maintainers.iter().any(|m| m == &session.agent_id) {
                    obs::emit_gating_decision(
                        &stream.stream_id.0,
                        "gated",
                        "allowed",
                        "local maintainer check passed",
                    );
                    Ok(MergeClearance::Allowed {
                        consensus: None,
                        decision: None,
                    })
                } else {
                    obs::emit_gating_decision(
                        &stream.stream_id.0,
                        "gated",
                        "denied",
                        "local maintainer check failed",
                    );
                    Err(HivesyncError::GatingDenied {
                        reason: format!(
                            "{} is not a maintainer of {}",
                            session.agent_id, repo.repo_id
                        ),
                    })
                }
            }

            // Gated, federated: the local maintainer check is not
            // trusted; delegate to the remote authority.
            (MergeMode::Gated, SessionMode::Federated) => {
                self.delegate_to_remote(stream, repo).await
            }
        }
    }

    async fn review_consensus(
        &self,
        stream: &StreamRecord,
        repo: &RepoRecord,
    ) -> Result<MergeClearance> {
        let report = self.flusher.flush().await?;
        if report.blocks_consensus() {
            // Evaluating consensus against known-incomplete review data
            // is worse than refusing to merge.
            obs::emit_gating_decision(
                &stream.stream_id.0,
                "review",
                "blocked",
                "review-critical sync events not delivered",
            );
            return Err(HivesyncError::StaleReviewData {
                kinds: report.failed_kinds_vec(),
            });
        }

        let reviews = self.reviews.reviews_for_stream(&stream.stream_id).await?;
        let outcome = consensus::evaluate(repo, &reviews);
        debug!(
            stream = %stream.stream_id,
            weight = outcome.approving_weight,
            quorum = outcome.quorum,
            passed = outcome.passed,
            "consensus evaluated"
        );

        if !outcome.passed {
            obs::emit_gating_decision(
                &stream.stream_id.0,
                "review",
                "denied",
                &outcome.failure_reason(),
            );
            return Err(HivesyncError::GatingDenied {
                reason: outcome.failure_reason(),
            });
        }

        obs::emit_gating_decision(&stream.stream_id.0, "review", "allowed", "quorum reached");
        Ok(MergeClearance::Allowed {
            consensus: Some(outcome),
            decision: None,
        })
    }

    async fn delegate_to_remote(
        &self,
        stream: &StreamRecord,
        repo: &RepoRecord,
    ) -> Result<MergeClearance> {
        match self
            .remote
            .request_merge(&repo.repo_id, &stream.stream_id)
            .await
        {
            Ok(decision) if decision.approved => {
                // The delegated decision already verified permission and
                // recomputed consensus server-side; a second local check
                // could contradict it.
                obs::emit_gating_decision(
                    &stream.stream_id.0,
                    "gated",
                    "allowed",
                    "remote authority approved",
                );
                Ok(MergeClearance::Allowed {
                    consensus: None,
                    decision: Some(decision),
                })
            }
            Ok(decision) => {
                let reason = decision
                    .reason
                    .unwrap_or_else(|| "remote authority denied merge request".to_string());
                obs::emit_gating_decision(&stream.stream_id.0, "gated", "denied", &reason);
                Err(HivesyncError::GatingDenied { reason })
            }
            Err(err) if err.is_unreachable() => {
                // Queue for later delivery rather than falling back to
                // the local maintainer check.
                let event = self
                    .queue
                    .enqueue(
                        "merge_request",
                        serde_json::json!({
                            "repo_id": repo.repo_id,
                            "stream_id": stream.stream_id,
                            "error": err.to_string(),
                        }),
                    )
                    .await?;
                obs::emit_merge_request_queued(&stream.stream_id.0, event.seq);
                Ok(MergeClearance::Queued { seq: event.seq })
            }
            Err(err) => {
                // An explicit rejection from the authority is a denial,
                // not a sync failure.
                obs::emit_gating_decision(&stream.stream_id.0, "gated", "denied", &err.to_string());
                Err(HivesyncError::GatingDenied {
                    reason: err.to_string(),
                })
            }
        }
    }
}
