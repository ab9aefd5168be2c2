//! Plugin-tier compatibility signaling.
//!
//! Evaluates a repo's declared plugins against the current session and
//! the locally registered handlers, producing [`CompatDiagnostic`]s the
//! caller decides how to surface. This is an observability contract —
//! it never blocks or alters merge/consensus behavior.

use serde::{Deserialize, Serialize};

use federated_state::RepoRecord;

use crate::session::SessionMode;

/// A non-fatal compatibility warning produced at initialization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompatDiagnostic {
    pub plugin_id: String,
    pub reason: String,
}

/// Check declared plugin tiers against the session at initialization.
///
/// Returned rather than printed: the caller decides how to surface the
/// diagnostics.
///
/// Warnings are produced for:
/// - a plugin whose tier requires a remote authority while the session
///   is local (the plugin will never fire);
/// - a declared plugin with no local handler in local mode (its triggers
///   will be skipped).
pub fn check_plugin_compat(
    repo: &RepoRecord,
    session: SessionMode,
    local_handlers: &[String],
) -> Vec<CompatDiagnostic> {
    if session == SessionMode::Federated {
        return Vec::new();
    }

    let mut diagnostics = Vec::new();
    for plugin in &repo.plugins {
        if plugin.requires_remote {
            diagnostics.push(CompatDiagnostic {
                plugin_id: plugin.plugin_id.clone(),
                reason: "plugin tier requires a remote authority session".to_string(),
            });
        } else if !local_handlers.contains(&plugin.plugin_id) {
            diagnostics.push(CompatDiagnostic {
                plugin_id: plugin.plugin_id.clone(),
                reason: "no local handler registered; triggers will be skipped".to_string(),
            });
        }
    }
    diagnostics
}

/// Declared plugins that cannot run for a firing trigger in local mode.
///
/// The caller logs these (with the triggering event name) instead of
/// executing them, so operators can diagnose silent no-ops.
pub fn skipped_plugins(
    repo: &RepoRecord,
    session: SessionMode,
    local_handlers: &[String],
) -> Vec<String> {
    if session == SessionMode::Federated {
        return Vec::new();
    }

    repo.plugins
        .iter()
        .filter(|p| p.requires_remote || !local_handlers.contains(&p.plugin_id))
        .map(|p| p.plugin_id.clone())
        .collect()
}
