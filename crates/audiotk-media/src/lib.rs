//! Media processing execution engine.
//!
//! This crate provides:
//! - Admission validation of uploaded payloads (size, type, signature)
//! - Per-operation FFmpeg command builders
//! - A piped process runner with timeout and cancellation
//! - Orchestration of convert, trim, merge, compress, extract, split,
//!   volume and speed operations, with a re-encode fallback for trims
//! - Tool health checks, structured logging and metrics

pub mod builders;
pub mod command;
pub mod config;
pub mod engine;
pub mod error;
pub mod fallback;
pub mod filters;
pub mod logging;
pub mod metrics;
pub mod orchestrator;
pub mod probe;
pub mod signature;
pub mod tools;
pub mod validation;

pub use command::{
    truncate_diagnostics, CommandStrategy, FfmpegArgs, ProcessExecutor, ProcessOutcome, Tool,
    TranscodeCommand, TranscodeRunner,
};
pub use config::EngineConfig;
pub use engine::{EngineOutput, MediaEngine, RequestId};
pub use error::{ErrorCode, ErrorResponse, MediaError, MediaResult};
pub use fallback::FallbackPolicy;
pub use logging::{init_tracing, OperationLogger};
pub use orchestrator::{Orchestrator, ProcessedOutput};
pub use builders::{AudioSource, MergeInput};
pub use probe::{MediaInfo, ProbeOptions};
pub use tools::{check_transcoder, HealthReport, HealthStatus, ToolInfo};
pub use validation::{
    sanitize_filename, validate_file_count, validate_time_range, AdmissionValidator,
    ValidatedPayload, ValidationFailure, ValidationKind, ValidationVerdict,
};

pub use audiotk_models::parse_timestamp;
