//! Federated-State: SurrealDB Backend for hivesync
//!
//! This crate provides the persistence layer for the federation engine.
//! It owns the record types shared across the workspace and all I/O with
//! SurrealDB.
//!
//! ## Layer 0 - Data/Persistence
//!
//! Focus: durability and ordering guarantees the engine depends on —
//! point lookup by id, append-only audit/queue tables, validated
//! update-in-place for streams and repos.
//!
//! ## Key Components
//!
//! - `storage_traits`: async store traits + record types
//! - `fakes`: in-memory implementations for tests
//! - `SurrealFederationStore`: one SurrealDB handle backing every trait

mod error;
pub mod fakes;
mod migrations;
mod schema;
pub mod storage_traits;
pub mod surreal_store;

pub use error::{StateError, StorageError};
pub use storage_traits::{
    ContentDigest, GitBackendKind, MergeLedger, MergeMode, MergeRecord, PluginDeclaration,
    ProposalId, ProposalKind, ProposalRecord, ProposalStatus, ProposalStore, RepoId, RepoRecord,
    RepoStore, ReviewRecord, ReviewStatus, ReviewStore, StorageResult, StreamId, StreamRecord,
    StreamStore, SyncEvent, SyncEventQueue,
};
pub use surreal_store::SurrealFederationStore;

/// Result type for federated-state operations
pub type Result<T> = std::result::Result<T, StateError>;
