//! Engine facade: admission, then orchestration.

use std::fmt;
use std::time::Instant;

use audiotk_models::{format_seconds, MediaKind, OperationRequest, UploadedPayload};
use serde::{Deserialize, Serialize};
use tracing::Instrument;
use uuid::Uuid;

use crate::command::{ProcessExecutor, TranscodeRunner};
use crate::config::EngineConfig;
use crate::error::{MediaError, MediaResult};
use crate::logging::OperationLogger;
use crate::metrics;
use crate::orchestrator::{Orchestrator, ProcessedOutput};
use crate::tools::{self, HealthReport};
use crate::validation::{self, AdmissionValidator, ValidatedPayload};

/// Correlation identifier of one engine call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(Uuid);

impl RequestId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What an operation produced.
#[derive(Debug, Clone)]
pub enum EngineOutput {
    Single(ProcessedOutput),
    /// Ordered pieces of a split
    Multiple(Vec<ProcessedOutput>),
}

impl EngineOutput {
    pub fn total_bytes(&self) -> u64 {
        match self {
            EngineOutput::Single(output) => output.len() as u64,
            EngineOutput::Multiple(outputs) => outputs.iter().map(|o| o.len() as u64).sum(),
        }
    }

    pub fn into_single(self) -> Option<ProcessedOutput> {
        match self {
            EngineOutput::Single(output) => Some(output),
            EngineOutput::Multiple(_) => None,
        }
    }

    pub fn into_outputs(self) -> Vec<ProcessedOutput> {
        match self {
            EngineOutput::Single(output) => vec![output],
            EngineOutput::Multiple(outputs) => outputs,
        }
    }
}

/// Validates requests and runs them through the orchestrator.
pub struct MediaEngine<E = TranscodeRunner> {
    config: EngineConfig,
    validator: AdmissionValidator,
    orchestrator: Orchestrator<E>,
}

impl MediaEngine<TranscodeRunner> {
    /// Engine backed by the configured FFmpeg binaries.
    pub fn new(config: EngineConfig) -> Self {
        let runner = TranscodeRunner::new(&config);
        Self::with_executor(config, runner)
    }
}

impl<E: ProcessExecutor> MediaEngine<E> {
    pub fn with_executor(config: EngineConfig, executor: E) -> Self {
        Self {
            validator: AdmissionValidator::new(&config),
            orchestrator: Orchestrator::new(executor, &config),
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn validator(&self) -> &AdmissionValidator {
        &self.validator
    }

    pub fn orchestrator(&self) -> &Orchestrator<E> {
        &self.orchestrator
    }

    /// Availability of the external binaries.
    pub async fn health(&self) -> HealthReport {
        tools::health_report(&self.config).await
    }

    /// Process one request under a fresh request id.
    pub async fn process(&self, request: OperationRequest) -> MediaResult<EngineOutput> {
        self.process_with_id(RequestId::new(), request).await
    }

    /// Process one request under a caller-supplied request id.
    pub async fn process_with_id(
        &self,
        request_id: RequestId,
        request: OperationRequest,
    ) -> MediaResult<EngineOutput> {
        let operation = request.kind();
        let logger = OperationLogger::new(&request_id, operation);
        let span = logger.create_span();

        async move {
            let started = Instant::now();
            logger.log_start(&describe(&request));

            let result = self.dispatch(request).await;
            let elapsed = started.elapsed();

            match &result {
                Ok(output) => {
                    metrics::record_operation(operation, "success", elapsed, output.total_bytes());
                    logger.log_completion(&format!(
                        "{} bytes in {} ms",
                        output.total_bytes(),
                        elapsed.as_millis()
                    ));
                }
                Err(e) => {
                    metrics::record_operation(operation, e.error_code().as_str(), elapsed, 0);
                    if e.is_client_error() {
                        logger.log_warning(&e.to_string());
                    } else {
                        logger.log_error(&e.to_string());
                    }
                }
            }
            result
        }
        .instrument(span)
        .await
    }

    async fn dispatch(&self, request: OperationRequest) -> MediaResult<EngineOutput> {
        match request {
            OperationRequest::Convert { payload, target } => {
                let payload = self.admit(payload, MediaKind::Audio)?;
                let output = self.orchestrator.convert(&payload, target).await?;
                Ok(EngineOutput::Single(output))
            }
            OperationRequest::Trim {
                payload,
                start,
                end,
                duration,
            } => {
                validation::validate_time_range(start, end, duration).map_err(rejected)?;
                let payload = self.admit(payload, MediaKind::Audio)?;
                let output = self.orchestrator.trim(&payload, start, end).await?;
                Ok(EngineOutput::Single(output))
            }
            OperationRequest::Merge { payloads, target } => {
                self.validator
                    .check_merge_count(payloads.len())
                    .map_err(rejected)?;
                let payloads = payloads
                    .into_iter()
                    .map(|p| self.admit(p, MediaKind::Audio))
                    .collect::<MediaResult<Vec<_>>>()?;
                let output = self.orchestrator.merge(&payloads, target).await?;
                Ok(EngineOutput::Single(output))
            }
            OperationRequest::Compress { payload, quality } => {
                validation::validate_compression(&quality).map_err(rejected)?;
                let payload = self.admit(payload, MediaKind::Audio)?;
                let output = self.orchestrator.compress(&payload, quality).await?;
                Ok(EngineOutput::Single(output))
            }
            OperationRequest::Extract { video, target } => {
                let video = self.admit(video, MediaKind::Video)?;
                let output = self.orchestrator.extract_audio(&video, target).await?;
                Ok(EngineOutput::Single(output))
            }
            OperationRequest::Split { payload, mode } => {
                validation::validate_split_mode(&mode).map_err(rejected)?;
                let payload = self.admit(payload, MediaKind::Audio)?;
                let outputs = self.orchestrator.split(&payload, &mode).await?;
                Ok(EngineOutput::Multiple(outputs))
            }
            OperationRequest::AdjustVolume {
                payload,
                adjustment,
            } => {
                validation::validate_volume(&adjustment).map_err(rejected)?;
                let payload = self.admit(payload, MediaKind::Audio)?;
                let output = self.orchestrator.adjust_volume(&payload, &adjustment).await?;
                Ok(EngineOutput::Single(output))
            }
            OperationRequest::ChangeSpeed {
                payload,
                speed,
                preserve_pitch,
            } => {
                validation::validate_speed(speed).map_err(rejected)?;
                let payload = self.admit(payload, MediaKind::Audio)?;
                let output = self
                    .orchestrator
                    .change_speed(&payload, speed, preserve_pitch)
                    .await?;
                Ok(EngineOutput::Single(output))
            }
        }
    }

    fn admit(&self, payload: UploadedPayload, kind: MediaKind) -> MediaResult<ValidatedPayload> {
        Ok(self.validator.validate_payload(payload, kind)?)
    }
}

/// Parameter rejections are counted here; payload rejections in the validator.
fn rejected(failure: validation::ValidationFailure) -> MediaError {
    metrics::record_validation_rejection(failure.kind);
    failure.into()
}

fn describe(request: &OperationRequest) -> String {
    match request {
        OperationRequest::Merge { payloads, target } => {
            format!("{} inputs to {}", payloads.len(), target)
        }
        OperationRequest::Convert { payload, target } => {
            format!("{} ({} bytes) to {}", payload.filename(), payload.len(), target)
        }
        OperationRequest::Extract { video, target } => {
            format!("{} ({} bytes) to {}", video.filename(), video.len(), target)
        }
        OperationRequest::Trim { payload, start, end, .. } => {
            format!(
                "{} ({} bytes) {}-{}",
                payload.filename(),
                payload.len(),
                format_seconds(*start),
                format_seconds(*end)
            )
        }
        OperationRequest::Compress { payload, .. }
        | OperationRequest::Split { payload, .. }
        | OperationRequest::AdjustVolume { payload, .. }
        | OperationRequest::ChangeSpeed { payload, .. } => {
            format!("{} ({} bytes)", payload.filename(), payload.len())
        }
    }
}
