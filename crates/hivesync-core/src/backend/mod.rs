//! Merge backend abstraction.
//!
//! A backend is a capability set — `merge`, `revert`,
//! `fast_forward_promote` — that each engine implements, possibly
//! degrading an operation (the remote-api backend cannot revert in place;
//! it creates a revert request and defers to the remote status flag).
//! The proposal executor never branches on backend identity; it consumes
//! the capability interface and records whatever the backend reports.

mod cascade;
mod remote_api;

pub use cascade::CascadeBackend;
pub use remote_api::{HostingApi, HostingResponse, HttpHostingApi, RemoteApiBackend};

use std::sync::Arc;

use async_trait::async_trait;
use federated_state::{GitBackendKind, RepoRecord, StreamRecord};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// How a backend disposed of an operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BackendDisposition {
    /// The git operation completed.
    Completed,
    /// The operation was attempted and definitively could not complete
    /// (merge conflict, non-fast-forwardable target, missing ref).
    Conflicted { reason: String },
    /// The operation was not executed here; the authoritative signal is
    /// elsewhere (remote request created, intent recorded, transport
    /// failure on a retryable call).
    Deferred { reason: String },
}

/// Structured result of a backend operation.
///
/// `executed` is true only when the backend actually performed the git
/// operation. Soft failures are carried in `disposition`, never thrown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendOutcome {
    pub executed: bool,
    pub disposition: BackendDisposition,
    /// Resulting commit ref when the operation produced one.
    pub merge_ref: Option<String>,
}

impl BackendOutcome {
    pub fn completed(merge_ref: Option<String>) -> Self {
        Self {
            executed: true,
            disposition: BackendDisposition::Completed,
            merge_ref,
        }
    }

    pub fn conflicted(reason: impl Into<String>) -> Self {
        Self {
            executed: false,
            disposition: BackendDisposition::Conflicted {
                reason: reason.into(),
            },
            merge_ref: None,
        }
    }

    pub fn deferred(reason: impl Into<String>) -> Self {
        Self {
            executed: false,
            disposition: BackendDisposition::Deferred {
                reason: reason.into(),
            },
            merge_ref: None,
        }
    }

    /// Failure reason, when the operation did not complete.
    pub fn reason(&self) -> Option<&str> {
        match &self.disposition {
            BackendDisposition::Completed => None,
            BackendDisposition::Conflicted { reason } | BackendDisposition::Deferred { reason } => {
                Some(reason)
            }
        }
    }
}

/// Capability interface each merge engine implements.
#[async_trait]
pub trait MergeBackend: Send + Sync {
    /// Which backend kind this adapter drives.
    fn kind(&self) -> GitBackendKind;

    /// Merge the stream's branch into the repo's buffer branch.
    async fn merge(&self, stream: &StreamRecord, repo: &RepoRecord) -> Result<BackendOutcome>;

    /// Revert the stream's recorded merge.
    async fn revert(&self, stream: &StreamRecord, repo: &RepoRecord) -> Result<BackendOutcome>;

    /// Fast-forward the promote target to the buffer branch. Never a
    /// three-way merge — promotion policy requires a strictly linear
    /// history.
    async fn fast_forward_promote(&self, repo: &RepoRecord) -> Result<BackendOutcome>;
}

/// Resolves the backend for a repo's configured `git_backend`.
///
/// A flat dispatch table: the mode × backend combinations stay
/// exhaustively testable and no component branches on backend identity
/// anywhere else.
pub struct BackendRegistry {
    cascade: Arc<dyn MergeBackend>,
    remote_api: Arc<dyn MergeBackend>,
}

impl BackendRegistry {
    pub fn new(cascade: Arc<dyn MergeBackend>, remote_api: Arc<dyn MergeBackend>) -> Self {
        Self {
            cascade,
            remote_api,
        }
    }

    /// The backend configured for this repo.
    pub fn for_repo(&self, repo: &RepoRecord) -> Arc<dyn MergeBackend> {
        match repo.git_backend {
            GitBackendKind::Cascade => Arc::clone(&self.cascade),
            GitBackendKind::RemoteApi => Arc::clone(&self.remote_api),
        }
    }
}
