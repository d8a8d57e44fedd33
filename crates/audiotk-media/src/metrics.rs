//! Metrics emitted by the engine.
//!
//! Recorded through the `metrics` facade; the embedding process decides
//! whether and how to export them.

use std::time::Duration;

use audiotk_models::OperationKind;
use metrics::{counter, histogram};

use crate::command::{CommandStrategy, Tool};
use crate::validation::ValidationKind;

/// Metric names as constants for consistency.
pub mod names {
    // Operation metrics
    pub const OPERATIONS_TOTAL: &str = "audiotk_operations_total";
    pub const OPERATION_DURATION_SECONDS: &str = "audiotk_operation_duration_seconds";
    pub const OUTPUT_BYTES_TOTAL: &str = "audiotk_output_bytes_total";

    // Process metrics
    pub const TRANSCODE_ATTEMPTS_TOTAL: &str = "audiotk_transcode_attempts_total";
    pub const TRANSCODE_DURATION_SECONDS: &str = "audiotk_transcode_duration_seconds";
    pub const FALLBACK_RETRIES_TOTAL: &str = "audiotk_fallback_retries_total";

    // Admission metrics
    pub const VALIDATION_REJECTIONS_TOTAL: &str = "audiotk_validation_rejections_total";
}

/// Outcome label of a single process run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    Success,
    Failed,
    TimedOut,
    Cancelled,
}

impl AttemptOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttemptOutcome::Success => "success",
            AttemptOutcome::Failed => "failed",
            AttemptOutcome::TimedOut => "timeout",
            AttemptOutcome::Cancelled => "cancelled",
        }
    }
}

/// Label for invocations not tied to an operation.
const NO_OPERATION: &str = "none";

/// Record one transcoder or probe invocation.
pub fn record_transcode_attempt(
    operation: Option<OperationKind>,
    tool: Tool,
    strategy: CommandStrategy,
    outcome: AttemptOutcome,
    elapsed: Duration,
) {
    let labels = [
        (
            "operation",
            operation.map_or(NO_OPERATION, |op| op.as_str()).to_string(),
        ),
        ("tool", tool.as_str().to_string()),
        ("strategy", strategy.as_str().to_string()),
        ("outcome", outcome.as_str().to_string()),
    ];
    counter!(names::TRANSCODE_ATTEMPTS_TOTAL, &labels).increment(1);
    histogram!(names::TRANSCODE_DURATION_SECONDS, &labels).record(elapsed.as_secs_f64());
}

/// Record a stream-copy failure retried with re-encoding.
pub fn record_fallback_retry(operation: OperationKind) {
    let labels = [("operation", operation.as_str().to_string())];
    counter!(names::FALLBACK_RETRIES_TOTAL, &labels).increment(1);
}

/// Record a payload or parameter rejected at admission.
pub fn record_validation_rejection(kind: ValidationKind) {
    let labels = [("kind", kind.as_str().to_string())];
    counter!(names::VALIDATION_REJECTIONS_TOTAL, &labels).increment(1);
}

/// Record a finished engine operation.
pub fn record_operation(operation: OperationKind, status: &str, duration: Duration, output_bytes: u64) {
    let labels = [
        ("operation", operation.as_str().to_string()),
        ("status", status.to_string()),
    ];
    counter!(names::OPERATIONS_TOTAL, &labels).increment(1);
    histogram!(names::OPERATION_DURATION_SECONDS, &labels).record(duration.as_secs_f64());

    if output_bytes > 0 {
        let labels = [("operation", operation.as_str().to_string())];
        counter!(names::OUTPUT_BYTES_TOTAL, &labels).increment(output_bytes);
    }
}
