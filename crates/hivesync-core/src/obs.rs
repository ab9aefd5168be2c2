//! Structured observability hooks for federation engine events.
//!
//! Emission functions for the lifecycle events an external observability
//! surface consumes: flush results, gating decisions, proposal execution
//! outcomes, and skipped-plugin diagnostics. Each record is a flat
//! key-value `tracing` event.
//!
//! Events are emitted at `info!` level (configurable via `RUST_LOG`).
//! For JSON output, initialize telemetry with `json = true`.

use tracing::{info, warn};

/// Emit event: a sync queue flush completed.
pub fn emit_flush_completed(flushed: usize, remaining: usize, failed_kinds: &[String]) {
    info!(
        event = "sync.flush_completed",
        flushed = flushed,
        remaining = remaining,
        failed_kinds = %failed_kinds.join(","),
    );
}

/// Emit event: a gating decision was reached for a stream merge attempt.
pub fn emit_gating_decision(stream_id: &str, merge_mode: &str, decision: &str, detail: &str) {
    info!(
        event = "gating.decision",
        stream_id = %stream_id,
        merge_mode = %merge_mode,
        decision = %decision,
        detail = %detail,
    );
}

/// Emit event: a gated merge request was queued for later delivery
/// because the remote authority was unreachable.
pub fn emit_merge_request_queued(stream_id: &str, seq: u64) {
    info!(
        event = "gating.merge_request_queued",
        stream_id = %stream_id,
        seq = seq,
    );
}

/// Emit event: a proposal was executed (or replayed idempotently).
pub fn emit_proposal_executed(
    proposal_id: &str,
    operation: &str,
    backend: &str,
    outcome: &str,
    replayed: bool,
) {
    info!(
        event = "proposal.executed",
        proposal_id = %proposal_id,
        operation = %operation,
        backend = %backend,
        outcome = %outcome,
        replayed = replayed,
    );
}

/// Emit event: a backend operation did not complete (warning level).
pub fn emit_backend_soft_failure(proposal_id: &str, operation: &str, reason: &str) {
    warn!(
        event = "backend.soft_failure",
        proposal_id = %proposal_id,
        operation = %operation,
        reason = %reason,
    );
}

/// Emit event: declared plugins were skipped at trigger-firing time
/// because no local handler exists in local mode.
pub fn emit_plugins_skipped(trigger_event: &str, skipped: &[String]) {
    warn!(
        event = "compat.plugins_skipped",
        trigger = %trigger_event,
        skipped = %skipped.join(","),
        count = skipped.len(),
    );
}
