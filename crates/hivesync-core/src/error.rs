//! Domain-level error taxonomy for hivesync.
//!
//! Hard failures (configuration, gating denials, stale review data) are
//! errors; backend execution failures and sync failures are structured
//! results (`BackendOutcome`, `ExecutionOutcome`, `FlushReport`) so the
//! caller can decide to retry. Nothing related to merge execution is
//! silently swallowed.

use federated_state::StorageError;

use crate::remote::RemoteError;

/// hivesync domain errors.
#[derive(Debug, thiserror::Error)]
pub enum HivesyncError {
    /// A repo's governance configuration is present but unusable.
    /// Fatal for the attempt, no retry.
    #[error("invalid repo config for {repo_id}: {reason}")]
    InvalidRepoConfig { repo_id: String, reason: String },

    /// The proposal is not in a state the executor can act on.
    #[error("proposal {proposal_id} not executable: {reason}")]
    ProposalNotExecutable { proposal_id: String, reason: String },

    /// A proposal is marked executed but its merge record is missing.
    #[error("proposal {proposal_id} is executed but has no merge record")]
    MissingMergeRecord { proposal_id: String },

    /// An explicit negative gating decision (maintainer check failed or
    /// the remote authority denied the merge). Distinct from a sync
    /// failure.
    #[error("merge denied: {reason}")]
    GatingDenied { reason: String },

    /// Review-critical sync events failed to reach the remote authority;
    /// consensus must not be evaluated against incomplete review data.
    #[error("review data not fully synchronized; failed event kinds: {}", kinds.join(", "))]
    StaleReviewData { kinds: Vec<String> },

    #[error("git error: {0}")]
    Git(String),

    #[error("remote authority error: {0}")]
    Remote(#[from] RemoteError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for hivesync domain operations.
pub type Result<T> = std::result::Result<T, HivesyncError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stale_review_data_lists_kinds() {
        let err = HivesyncError::StaleReviewData {
            kinds: vec!["review".to_string(), "submit_review".to_string()],
        };
        let msg = err.to_string();
        assert!(msg.contains("review, submit_review"));
    }

    #[test]
    fn gating_denied_display() {
        let err = HivesyncError::GatingDenied {
            reason: "agent-1 is not a maintainer".to_string(),
        };
        assert!(err.to_string().contains("merge denied"));
        assert!(err.to_string().contains("agent-1"));
    }

    #[test]
    fn storage_error_converts() {
        let err: HivesyncError = StorageError::RepoNotFound {
            repo_id: "r1".to_string(),
        }
        .into();
        assert!(matches!(err, HivesyncError::Storage(_)));
    }
}
