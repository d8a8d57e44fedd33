//! Structured operation logging and subscriber setup.

use audiotk_models::OperationKind;
use tracing::{error, info, warn, Span};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::engine::RequestId;

/// Install the global tracing subscriber for a binary.
///
/// Honours `RUST_LOG`; emits JSON when `LOG_FORMAT=json`.
pub fn init_tracing() -> anyhow::Result<()> {
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,audiotk_media=info"));

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .try_init()?;
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .try_init()?;
    }

    Ok(())
}

/// Logger carrying the request correlation fields.
#[derive(Debug, Clone)]
pub struct OperationLogger {
    request_id: String,
    operation: OperationKind,
}

impl OperationLogger {
    pub fn new(request_id: &RequestId, operation: OperationKind) -> Self {
        Self {
            request_id: request_id.to_string(),
            operation,
        }
    }

    pub fn log_start(&self, message: &str) {
        info!(
            request_id = %self.request_id,
            operation = %self.operation,
            "Operation started: {}", message
        );
    }

    pub fn log_warning(&self, message: &str) {
        warn!(
            request_id = %self.request_id,
            operation = %self.operation,
            "Operation warning: {}", message
        );
    }

    pub fn log_error(&self, message: &str) {
        error!(
            request_id = %self.request_id,
            operation = %self.operation,
            "Operation error: {}", message
        );
    }

    pub fn log_completion(&self, message: &str) {
        info!(
            request_id = %self.request_id,
            operation = %self.operation,
            "Operation completed: {}", message
        );
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    pub fn operation(&self) -> OperationKind {
        self.operation
    }

    /// Span that correlates everything logged while it is entered.
    pub fn create_span(&self) -> Span {
        tracing::info_span!(
            "operation",
            request_id = %self.request_id,
            operation = %self.operation
        )
    }
}
