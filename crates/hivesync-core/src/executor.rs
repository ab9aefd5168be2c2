//! Proposal execution.
//!
//! Turns a passed governance decision into an actual merge/revert/promote
//! action against the repo's configured backend, records the outcome in
//! the merge ledger, and transitions the stream.
//!
//! Execution is idempotent: a proposal already in `Executed` replays the
//! stored merge record without touching any backend. Backend failures
//! are soft — the proposal stays `Passed` and retryable, the failure is
//! captured in the returned outcome, and a transient conflict never
//! discards a passed vote.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::debug;

use federated_state::{
    GitBackendKind, MergeLedger, MergeRecord, ProposalId, ProposalKind, ProposalRecord,
    ProposalStatus, ProposalStore, RepoRecord, RepoStore, ReviewStatus, StreamId, StreamStore,
};

use crate::backend::{BackendOutcome, BackendRegistry, MergeBackend};
use crate::error::{HivesyncError, Result};
use crate::obs;

/// What a proposal execution concluded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    /// The stream merged.
    Merged,
    /// Governance passed but the merge did not complete; retryable
    /// without re-running governance.
    ApprovedPendingMerge,
    /// The stream was reverted in place.
    Reverted,
    /// The revert was delegated to the remote side; the governance
    /// status flag is authoritative.
    RevertDelegated,
    /// The revert was attempted and did not complete; retryable.
    RevertBlocked,
    /// The buffer fast-forwarded into the promote target.
    Promoted,
    /// The promote target could not fast-forward; no three-way merge was
    /// attempted. Retryable.
    PromoteBlocked,
    /// Promote intent was recorded; the fast-forward happens remotely.
    PromoteRecorded,
}

impl ExecutionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ExecutionStatus::Merged => "merged",
            ExecutionStatus::ApprovedPendingMerge => "approved_pending_merge",
            ExecutionStatus::Reverted => "reverted",
            ExecutionStatus::RevertDelegated => "revert_delegated",
            ExecutionStatus::RevertBlocked => "revert_blocked",
            ExecutionStatus::Promoted => "promoted",
            ExecutionStatus::PromoteBlocked => "promote_blocked",
            ExecutionStatus::PromoteRecorded => "promote_recorded",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "merged" => Some(ExecutionStatus::Merged),
            "approved_pending_merge" => Some(ExecutionStatus::ApprovedPendingMerge),
            "reverted" => Some(ExecutionStatus::Reverted),
            "revert_delegated" => Some(ExecutionStatus::RevertDelegated),
            "revert_blocked" => Some(ExecutionStatus::RevertBlocked),
            "promoted" => Some(ExecutionStatus::Promoted),
            "promote_blocked" => Some(ExecutionStatus::PromoteBlocked),
            "promote_recorded" => Some(ExecutionStatus::PromoteRecorded),
            _ => None,
        }
    }

    /// Whether the proposal is finished (a merge record exists and the
    /// proposal moved to `Executed`). Non-terminal statuses leave the
    /// proposal `Passed` and retryable.
    pub fn is_terminal(self) -> bool {
        !matches!(
            self,
            ExecutionStatus::ApprovedPendingMerge
                | ExecutionStatus::RevertBlocked
                | ExecutionStatus::PromoteBlocked
        )
    }
}

/// Structured result of executing a proposal.
#[derive(Debug, Clone)]
pub struct ExecutionOutcome {
    pub proposal_id: ProposalId,
    pub status: ExecutionStatus,
    /// The audit record, present when the execution was terminal.
    pub record: Option<MergeRecord>,
    /// Failure detail for non-terminal outcomes.
    pub detail: Option<String>,
    /// True when this call replayed a previously executed proposal.
    pub replayed: bool,
}

/// Executes passed council proposals against the configured backend.
///
/// The executor is the only writer of `review_status` and the merge
/// ledger.
pub struct ProposalExecutor {
    repos: Arc<dyn RepoStore>,
    streams: Arc<dyn StreamStore>,
    proposals: Arc<dyn ProposalStore>,
    ledger: Arc<dyn MergeLedger>,
    backends: Arc<BackendRegistry>,
}

impl ProposalExecutor {
    pub fn new(
        repos: Arc<dyn RepoStore>,
        streams: Arc<dyn StreamStore>,
        proposals: Arc<dyn ProposalStore>,
        ledger: Arc<dyn MergeLedger>,
        backends: Arc<BackendRegistry>,
    ) -> Self {
        Self {
            repos,
            streams,
            proposals,
            ledger,
            backends,
        }
    }

    /// Execute a passed proposal.
    ///
    /// # Errors
    ///
    /// - Missing repo configuration is a hard failure
    ///   (`StorageError::RepoNotFound` via `HivesyncError::Storage`).
    /// - A proposal that is not `Passed` (and not `Executed`) cannot be
    ///   executed.
    ///
    /// Backend failures are **not** errors: they come back as
    /// non-terminal [`ExecutionStatus`] values with the failure detail.
    pub async fn execute(&self, proposal_id: &ProposalId) -> Result<ExecutionOutcome> {
        let proposal = self.proposals.get_proposal(proposal_id).await?;

        // Idempotency: replay the stored outcome, no backend calls.
        if proposal.status == ProposalStatus::Executed {
            return self.replay(&proposal).await;
        }

        if proposal.status != ProposalStatus::Passed {
            return Err(HivesyncError::ProposalNotExecutable {
                proposal_id: proposal_id.0.clone(),
                reason: format!("status is {}, expected passed", proposal.status.as_str()),
            });
        }

        let repo = self.repos.get_repo(&proposal.repo_id).await?;
        let backend = self.backends.for_repo(&repo);

        let outcome = match proposal.kind {
            ProposalKind::MergeStream => self.merge_stream(&proposal, &repo, backend).await?,
            ProposalKind::RevertStream => self.revert_stream(&proposal, &repo, backend).await?,
            ProposalKind::Promote => self.promote(&proposal, &repo, backend).await?,
        };

        obs::emit_proposal_executed(
            &proposal_id.0,
            proposal.kind.as_str(),
            repo.git_backend.as_str(),
            outcome.status.as_str(),
            false,
        );
        Ok(outcome)
    }

    async fn replay(&self, proposal: &ProposalRecord) -> Result<ExecutionOutcome> {
        let record = self
            .ledger
            .find_by_proposal(&proposal.proposal_id)
            .await?
            .ok_or_else(|| HivesyncError::MissingMergeRecord {
                proposal_id: proposal.proposal_id.0.clone(),
            })?;

        let status = ExecutionStatus::parse(&record.outcome).ok_or_else(|| {
            HivesyncError::ProposalNotExecutable {
                proposal_id: proposal.proposal_id.0.clone(),
                reason: format!("stored outcome {} is not replayable", record.outcome),
            }
        })?;

        debug!(proposal = %proposal.proposal_id, outcome = %record.outcome, "replaying executed proposal");
        obs::emit_proposal_executed(
            &proposal.proposal_id.0,
            &record.operation,
            &record.backend,
            &record.outcome,
            true,
        );

        Ok(ExecutionOutcome {
            proposal_id: proposal.proposal_id.clone(),
            status,
            record: Some(record),
            detail: None,
            replayed: true,
        })
    }

    fn target_stream_id(proposal: &ProposalRecord) -> Result<&StreamId> {
        proposal
            .stream_id
            .as_ref()
            .ok_or_else(|| HivesyncError::ProposalNotExecutable {
                proposal_id: proposal.proposal_id.0.clone(),
                reason: format!("{} proposal has no target stream", proposal.kind.as_str()),
            })
    }

    /// Run a backend call, folding hard adapter errors into a deferred
    /// outcome so a transient failure never discards a passed vote.
    async fn soft<F>(proposal_id: &ProposalId, operation: &str, call: F) -> BackendOutcome
    where
        F: std::future::Future<Output = Result<BackendOutcome>>,
    {
        match call.await {
            Ok(outcome) => {
                if let Some(reason) = outcome.reason() {
                    obs::emit_backend_soft_failure(&proposal_id.0, operation, reason);
                }
                outcome
            }
            Err(err) => {
                obs::emit_backend_soft_failure(&proposal_id.0, operation, &err.to_string());
                BackendOutcome::deferred(format!("backend error: {err}"))
            }
        }
    }

    async fn merge_stream(
        &self,
        proposal: &ProposalRecord,
        repo: &RepoRecord,
        backend: Arc<dyn MergeBackend>,
    ) -> Result<ExecutionOutcome> {
        let stream_id = Self::target_stream_id(proposal)?.clone();

        // Record the governance decision first. A stream retrying from
        // ApprovedPendingMerge keeps its status; the state layer rejects
        // anything that would skip Approved.
        let stream = self.streams.get_stream(&stream_id).await?;
        let stream = if stream.review_status == ReviewStatus::ApprovedPendingMerge {
            stream
        } else {
            self.streams
                .update_status(&stream_id, ReviewStatus::Approved)
                .await?
        };

        let outcome =
            Self::soft(&proposal.proposal_id, "merge", backend.merge(&stream, repo)).await;

        if outcome.executed {
            if let Some(merge_ref) = &outcome.merge_ref {
                self.streams.set_merge_ref(&stream_id, merge_ref).await?;
            }
            self.streams
                .update_status(&stream_id, ReviewStatus::Merged)
                .await?;

            let record = MergeRecord::new(
                proposal.proposal_id.clone(),
                repo.repo_id.clone(),
                Some(stream_id),
                "merge",
                repo.git_backend.as_str(),
                true,
                ExecutionStatus::Merged.as_str(),
                outcome.merge_ref.clone(),
                None,
                Utc::now(),
            );
            self.ledger.append(record.clone()).await?;
            self.proposals
                .set_status(&proposal.proposal_id, ProposalStatus::Executed)
                .await?;

            return Ok(ExecutionOutcome {
                proposal_id: proposal.proposal_id.clone(),
                status: ExecutionStatus::Merged,
                record: Some(record),
                detail: None,
                replayed: false,
            });
        }

        // Soft failure: the vote stands, the merge is retryable.
        self.streams
            .update_status(&stream_id, ReviewStatus::ApprovedPendingMerge)
            .await?;

        Ok(ExecutionOutcome {
            proposal_id: proposal.proposal_id.clone(),
            status: ExecutionStatus::ApprovedPendingMerge,
            record: None,
            detail: outcome.reason().map(String::from),
            replayed: false,
        })
    }

    async fn revert_stream(
        &self,
        proposal: &ProposalRecord,
        repo: &RepoRecord,
        backend: Arc<dyn MergeBackend>,
    ) -> Result<ExecutionOutcome> {
        let stream_id = Self::target_stream_id(proposal)?.clone();
        let stream = self.streams.get_stream(&stream_id).await?;

        match repo.git_backend {
            // Direct revert; its result is reflected in review_status.
            GitBackendKind::Cascade => {
                let outcome = Self::soft(
                    &proposal.proposal_id,
                    "revert",
                    backend.revert(&stream, repo),
                )
                .await;

                if !outcome.executed {
                    return Ok(ExecutionOutcome {
                        proposal_id: proposal.proposal_id.clone(),
                        status: ExecutionStatus::RevertBlocked,
                        record: None,
                        detail: outcome.reason().map(String::from),
                        replayed: false,
                    });
                }

                self.streams
                    .update_status(&stream_id, ReviewStatus::Reverted)
                    .await?;

                let record = MergeRecord::new(
                    proposal.proposal_id.clone(),
                    repo.repo_id.clone(),
                    Some(stream_id),
                    "revert",
                    repo.git_backend.as_str(),
                    true,
                    ExecutionStatus::Reverted.as_str(),
                    outcome.merge_ref.clone(),
                    None,
                    Utc::now(),
                );
                self.ledger.append(record.clone()).await?;
                self.proposals
                    .set_status(&proposal.proposal_id, ProposalStatus::Executed)
                    .await?;

                Ok(ExecutionOutcome {
                    proposal_id: proposal.proposal_id.clone(),
                    status: ExecutionStatus::Reverted,
                    record: Some(record),
                    detail: None,
                    replayed: false,
                })
            }

            // The governance status flag is authoritative: a real revert
            // requires a follow-up request the remote side creates. The
            // record states explicitly that nothing executed here.
            GitBackendKind::RemoteApi => {
                let outcome = Self::soft(
                    &proposal.proposal_id,
                    "revert",
                    backend.revert(&stream, repo),
                )
                .await;

                self.streams
                    .update_status(&stream_id, ReviewStatus::Reverted)
                    .await?;

                let record = MergeRecord::new(
                    proposal.proposal_id.clone(),
                    repo.repo_id.clone(),
                    Some(stream_id),
                    "revert",
                    repo.git_backend.as_str(),
                    false,
                    ExecutionStatus::RevertDelegated.as_str(),
                    None,
                    outcome.reason().map(String::from),
                    Utc::now(),
                );
                self.ledger.append(record.clone()).await?;
                self.proposals
                    .set_status(&proposal.proposal_id, ProposalStatus::Executed)
                    .await?;

                Ok(ExecutionOutcome {
                    proposal_id: proposal.proposal_id.clone(),
                    status: ExecutionStatus::RevertDelegated,
                    record: Some(record),
                    detail: None,
                    replayed: false,
                })
            }
        }
    }

    async fn promote(
        &self,
        proposal: &ProposalRecord,
        repo: &RepoRecord,
        backend: Arc<dyn MergeBackend>,
    ) -> Result<ExecutionOutcome> {
        if repo.buffer_branch.is_empty() || repo.promote_target.is_empty() {
            return Err(HivesyncError::InvalidRepoConfig {
                repo_id: repo.repo_id.0.clone(),
                reason: "promote requires buffer_branch and promote_target".to_string(),
            });
        }

        let outcome = Self::soft(
            &proposal.proposal_id,
            "promote",
            backend.fast_forward_promote(repo),
        )
        .await;

        let status = match repo.git_backend {
            GitBackendKind::Cascade => {
                if outcome.executed {
                    ExecutionStatus::Promoted
                } else {
                    // The target could not fast-forward; no three-way
                    // merge happened and none will.
                    ExecutionStatus::PromoteBlocked
                }
            }
            // Intent recorded; the actual fast-forward happens remotely.
            GitBackendKind::RemoteApi => ExecutionStatus::PromoteRecorded,
        };

        if !status.is_terminal() {
            return Ok(ExecutionOutcome {
                proposal_id: proposal.proposal_id.clone(),
                status,
                record: None,
                detail: outcome.reason().map(String::from),
                replayed: false,
            });
        }

        let record = MergeRecord::new(
            proposal.proposal_id.clone(),
            repo.repo_id.clone(),
            None,
            "promote",
            repo.git_backend.as_str(),
            outcome.executed,
            status.as_str(),
            outcome.merge_ref.clone(),
            outcome.reason().map(String::from),
            Utc::now(),
        );
        self.ledger.append(record.clone()).await?;
        self.proposals
            .set_status(&proposal.proposal_id, ProposalStatus::Executed)
            .await?;

        Ok(ExecutionOutcome {
            proposal_id: proposal.proposal_id.clone(),
            status,
            record: Some(record),
            detail: None,
            replayed: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn execution_status_round_trip() {
        for status in [
            ExecutionStatus::Merged,
            ExecutionStatus::ApprovedPendingMerge,
            ExecutionStatus::Reverted,
            ExecutionStatus::RevertDelegated,
            ExecutionStatus::RevertBlocked,
            ExecutionStatus::Promoted,
            ExecutionStatus::PromoteBlocked,
            ExecutionStatus::PromoteRecorded,
        ] {
            assert_eq!(ExecutionStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(ExecutionStatus::parse("bogus"), None);
    }

    #[test]
    fn retryable_statuses_are_not_terminal() {
        assert!(!ExecutionStatus::ApprovedPendingMerge.is_terminal());
        assert!(!ExecutionStatus::RevertBlocked.is_terminal());
        assert!(!ExecutionStatus::PromoteBlocked.is_terminal());
        assert!(ExecutionStatus::Merged.is_terminal());
        assert!(ExecutionStatus::RevertDelegated.is_terminal());
        assert!(ExecutionStatus::PromoteRecorded.is_terminal());
    }
}
