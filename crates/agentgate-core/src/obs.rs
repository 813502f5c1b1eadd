//! Structured observability hooks for policy engine lifecycle events.
//!
//! Emission functions for the key decision points: validation checks, gate
//! verdicts, batch lifecycle. Events are emitted at `info!` level and are
//! separate from the audit trail — these go to the log stream, the trail
//! goes to the append-only file.

use tracing::info;

/// Emit event: one agent validated, pass or fail.
pub fn emit_validation_checked(agent: &str, ok: bool, error_kind: Option<&str>) {
    info!(
        event = "validation.checked",
        agent = %agent,
        ok = ok,
        error_kind = error_kind.unwrap_or(""),
    );
}

/// Emit event: spawn gate verdict.
pub fn emit_gate_decided(subagent_type: &str, allow: bool, message: &str) {
    info!(
        event = "gate.decided",
        subagent_type = %subagent_type,
        allow = allow,
        message = %message,
    );
}

/// Emit event: batch dispatch started.
pub fn emit_batch_started(
    batch_id: &str,
    submitted: usize,
    concurrency_cap: usize,
    timeout_secs: u64,
) {
    info!(
        event = "batch.started",
        batch_id = %batch_id,
        submitted = submitted,
        concurrency_cap = concurrency_cap,
        per_task_timeout_secs = timeout_secs,
    );
}

/// Emit event: batch fully aggregated.
pub fn emit_batch_finished(batch_id: &str, submitted: usize, succeeded: usize, failed: usize) {
    info!(
        event = "batch.finished",
        batch_id = %batch_id,
        submitted = submitted,
        succeeded = succeeded,
        failed = failed,
    );
}
