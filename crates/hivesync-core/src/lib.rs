//! hivesync Core Library
//!
//! Federation consensus and merge synchronization for agent hives:
//! the proposal executor, sync-queue flush protocol, consensus and
//! gating evaluation, and the merge backend abstraction.

pub mod backend;
pub mod compat;
pub mod consensus;
pub mod engine;
pub mod error;
pub mod executor;
pub mod gating;
pub mod obs;
pub mod remote;
pub mod session;
pub mod sync;
pub mod telemetry;

pub use backend::{
    BackendDisposition, BackendOutcome, BackendRegistry, CascadeBackend, HostingApi,
    HostingResponse, HttpHostingApi, MergeBackend, RemoteApiBackend,
};
pub use compat::{check_plugin_compat, skipped_plugins, CompatDiagnostic};
pub use consensus::{evaluate as evaluate_consensus, ConsensusOutcome};
pub use engine::{EngineStores, FederationEngine, MergeAttempt};
pub use error::{HivesyncError, Result};
pub use executor::{ExecutionOutcome, ExecutionStatus, ProposalExecutor};
pub use gating::{GatingCoordinator, MergeClearance};
pub use remote::{EventAck, HttpRemoteAuthority, MergeDecision, RemoteAuthority, RemoteError};
pub use session::{AgentSession, SessionMode};
pub use sync::{is_review_critical, FlushReport, SyncFlusher, REVIEW_CRITICAL_KINDS};
pub use telemetry::init_tracing;

pub use federated_state::{
    ContentDigest, GitBackendKind, MergeLedger, MergeMode, MergeRecord, PluginDeclaration,
    ProposalId, ProposalKind, ProposalRecord, ProposalStatus, ProposalStore, RepoId, RepoRecord,
    RepoStore, ReviewRecord, ReviewStatus, ReviewStore, StreamId, StreamRecord, StreamStore,
    SyncEvent, SyncEventQueue,
};

/// hivesync version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
