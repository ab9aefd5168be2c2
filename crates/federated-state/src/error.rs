//! Error types for federated-state

use thiserror::Error;

/// Errors that can occur in the state persistence layer
#[derive(Error, Debug)]
pub enum StateError {
    /// Database connection error
    #[error("Database connection failed: {0}")]
    Connection(String),

    /// Database query error
    #[error("Database query failed: {0}")]
    Query(String),

    /// Serialization error
    #[error("Serialization failed: {0}")]
    Serialization(String),

    /// Schema setup error
    #[error("Schema setup failed: {0}")]
    SchemaSetup(String),
}

impl From<surrealdb::Error> for StateError {
    fn from(err: surrealdb::Error) -> Self {
        StateError::Query(err.to_string())
    }
}

impl From<serde_json::Error> for StateError {
    fn from(err: serde_json::Error) -> Self {
        StateError::Serialization(err.to_string())
    }
}

/// Errors surfaced through the storage traits.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("repo not found: {repo_id}")]
    RepoNotFound { repo_id: String },

    #[error("stream not found: {stream_id}")]
    StreamNotFound { stream_id: String },

    #[error("proposal not found: {proposal_id}")]
    ProposalNotFound { proposal_id: String },

    #[error("sync event not found: seq {seq}")]
    EventNotFound { seq: u64 },

    #[error("illegal review status transition for stream {stream_id}: {from} -> {to}")]
    IllegalTransition {
        stream_id: String,
        from: String,
        to: String,
    },

    #[error("merge record already exists for proposal: {proposal_id}")]
    DuplicateMergeRecord { proposal_id: String },

    #[error("invalid content digest: {digest}")]
    InvalidDigest { digest: String },

    #[error("storage backend error: {0}")]
    Backend(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}
