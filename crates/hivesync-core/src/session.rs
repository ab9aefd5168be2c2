//! Operational session model.
//!
//! An agent runs either disconnected (local-only) or with a session
//! against the remote authority. The two modes change who is trusted for
//! gating decisions: in [`SessionMode::Federated`] the remote authority is
//! the single writer of truth and the local copy is only a cache.

use serde::{Deserialize, Serialize};

/// Whether the agent currently holds a remote authority session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionMode {
    /// Disconnected local-only operation; local checks are sufficient.
    Local,
    /// Session-synchronized operation; gating decisions are delegated to
    /// the remote authority.
    Federated,
}

/// The executing agent's identity and session state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSession {
    pub agent_id: String,
    pub mode: SessionMode,
}

impl AgentSession {
    pub fn local(agent_id: impl Into<String>) -> Self {
        Self {
            agent_id: agent_id.into(),
            mode: SessionMode::Local,
        }
    }

    pub fn federated(agent_id: impl Into<String>) -> Self {
        Self {
            agent_id: agent_id.into(),
            mode: SessionMode::Federated,
        }
    }
}
