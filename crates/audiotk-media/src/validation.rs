//! Admission checks for uploaded payloads and request parameters.
//!
//! Every payload passes through [`AdmissionValidator::validate_payload`]
//! before any process is spawned. Checks run cheapest first and stop at the
//! first failure: size, declared type, then content signature.

use std::fmt;

use audiotk_models::operation::{MAX_SPEED, MIN_SPEED};
use audiotk_models::{
    AudioFormat, CompressionQuality, MediaFormat, MediaKind, SplitMode, UploadedPayload,
    VideoFormat, VolumeAdjustment,
};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::metrics;
use crate::signature;

/// Outcome of a single admission check.
pub type ValidationVerdict = Result<(), ValidationFailure>;

/// Which admission rule rejected the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValidationKind {
    Size,
    UnsupportedType,
    Signature,
    Filename,
    TimeRange,
    FileCount,
    Parameter,
}

impl ValidationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValidationKind::Size => "size",
            ValidationKind::UnsupportedType => "unsupported_type",
            ValidationKind::Signature => "signature",
            ValidationKind::Filename => "filename",
            ValidationKind::TimeRange => "time_range",
            ValidationKind::FileCount => "file_count",
            ValidationKind::Parameter => "parameter",
        }
    }
}

impl fmt::Display for ValidationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A rejected admission check.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{reason}")]
pub struct ValidationFailure {
    pub kind: ValidationKind,
    pub reason: String,
}

impl ValidationFailure {
    pub fn new(kind: ValidationKind, reason: impl Into<String>) -> Self {
        Self {
            kind,
            reason: reason.into(),
        }
    }

    /// 413 for oversized payloads, 400 for everything else.
    pub fn status_code(&self) -> u16 {
        match self.kind {
            ValidationKind::Size => 413,
            _ => 400,
        }
    }
}

/// A payload that passed admission, tagged with its verified format.
///
/// Only [`AdmissionValidator`] can construct one.
#[derive(Debug, Clone)]
pub struct ValidatedPayload {
    payload: UploadedPayload,
    format: MediaFormat,
    detected: Option<MediaFormat>,
}

impl ValidatedPayload {
    /// Format admitted from the declared extension.
    pub fn format(&self) -> MediaFormat {
        self.format
    }

    /// Format recognised from the content itself, if any.
    pub fn detected_format(&self) -> Option<MediaFormat> {
        self.detected
    }

    pub fn data(&self) -> &[u8] {
        self.payload.data()
    }

    pub fn filename(&self) -> &str {
        self.payload.filename()
    }

    pub fn len(&self) -> u64 {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    /// Audio format used for processing: the detected one, else the declared one.
    pub fn audio_format(&self) -> Option<AudioFormat> {
        self.detected.unwrap_or(self.format).as_audio()
    }

    /// Sanitized stem of the declared filename, for naming outputs.
    pub fn safe_stem(&self) -> String {
        let sanitized = sanitize_filename(self.payload.filename());
        match sanitized.rsplit_once('.') {
            Some((stem, _)) if !stem.is_empty() => stem.to_string(),
            _ => sanitized,
        }
    }
}

/// Gatekeeper applied to every payload before processing.
#[derive(Debug, Clone)]
pub struct AdmissionValidator {
    max_upload_bytes: u64,
    allowed_audio: Vec<AudioFormat>,
    allowed_video: Vec<VideoFormat>,
    merge_min_files: usize,
    merge_max_files: usize,
}

impl AdmissionValidator {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            max_upload_bytes: config.max_upload_bytes,
            allowed_audio: config.allowed_audio.clone(),
            allowed_video: config.allowed_video.clone(),
            merge_min_files: config.merge_min_files,
            merge_max_files: config.merge_max_files,
        }
    }

    /// Admit a payload of the expected kind or explain why not.
    pub fn validate_payload(
        &self,
        payload: UploadedPayload,
        expected: MediaKind,
    ) -> Result<ValidatedPayload, ValidationFailure> {
        let result = self.check_payload(&payload, expected);
        match result {
            Ok((format, detected)) => {
                if let Some(actual) = detected.filter(|d| *d != format) {
                    info!(
                        filename = %payload.filename(),
                        declared = %format,
                        detected = %actual,
                        "Content does not match declared extension, using detected format"
                    );
                }
                debug!(
                    filename = %payload.filename(),
                    format = %format,
                    bytes = payload.len(),
                    "Payload admitted"
                );
                Ok(ValidatedPayload {
                    payload,
                    format,
                    detected,
                })
            }
            Err(failure) => {
                warn!(
                    filename = %payload.filename(),
                    kind = %failure.kind,
                    reason = %failure.reason,
                    "Payload rejected"
                );
                metrics::record_validation_rejection(failure.kind);
                Err(failure)
            }
        }
    }

    fn check_payload(
        &self,
        payload: &UploadedPayload,
        expected: MediaKind,
    ) -> Result<(MediaFormat, Option<MediaFormat>), ValidationFailure> {
        self.check_size(payload.len())?;
        let format = self.check_declared_type(payload, expected)?;
        check_signature(format, payload.data())?;
        let detected = self.detect_format(format, payload.data())?;
        Ok((format, detected))
    }

    /// Audio is sniffed from its content. A video container is taken as
    /// detected once its family signature matched, since each family maps
    /// to a single demuxer.
    fn detect_format(
        &self,
        declared: MediaFormat,
        data: &[u8],
    ) -> Result<Option<MediaFormat>, ValidationFailure> {
        match declared {
            MediaFormat::Video(_) => Ok(Some(declared)),
            MediaFormat::Audio(_) => match signature::sniff_audio_format(data) {
                Some(sniffed) if !self.allowed_audio.contains(&sniffed) => {
                    Err(ValidationFailure::new(
                        ValidationKind::UnsupportedType,
                        format!("Content is {} audio, which is not an allowed format", sniffed),
                    ))
                }
                Some(sniffed) => Ok(Some(MediaFormat::Audio(sniffed))),
                None => Ok(None),
            },
        }
    }

    /// Size is judged on the measured length alone; content is never read.
    pub fn check_size(&self, len: u64) -> ValidationVerdict {
        if len > self.max_upload_bytes {
            return Err(ValidationFailure::new(
                ValidationKind::Size,
                format!(
                    "File size {} bytes exceeds maximum {} bytes",
                    len, self.max_upload_bytes
                ),
            ));
        }
        Ok(())
    }

    fn check_declared_type(
        &self,
        payload: &UploadedPayload,
        expected: MediaKind,
    ) -> Result<MediaFormat, ValidationFailure> {
        let extension = payload.declared_extension().ok_or_else(|| {
            ValidationFailure::new(
                ValidationKind::UnsupportedType,
                format!("File has no extension: {}", payload.filename()),
            )
        })?;

        let format = MediaFormat::parse_as(expected, &extension)
            .map_err(|e| ValidationFailure::new(ValidationKind::UnsupportedType, e.to_string()))?;

        let allowed = match format {
            MediaFormat::Audio(f) => self.allowed_audio.contains(&f),
            MediaFormat::Video(f) => self.allowed_video.contains(&f),
        };
        if !allowed {
            return Err(ValidationFailure::new(
                ValidationKind::UnsupportedType,
                format!("Unsupported {} format: {}", expected, extension),
            ));
        }

        if let Some(content_type) = payload.content_type() {
            if !content_type_agrees(content_type, expected) {
                return Err(ValidationFailure::new(
                    ValidationKind::UnsupportedType,
                    format!(
                        "Content type {} does not match {} upload",
                        content_type, expected
                    ),
                ));
            }
        }

        Ok(format)
    }

    /// Check a merge file count against the configured bounds.
    pub fn check_merge_count(&self, count: usize) -> ValidationVerdict {
        validate_file_count(count, self.merge_min_files, self.merge_max_files)
    }
}

fn check_signature(format: MediaFormat, data: &[u8]) -> ValidationVerdict {
    if signature::matches_signature(format, data) {
        Ok(())
    } else {
        Err(ValidationFailure::new(
            ValidationKind::Signature,
            format!("File does not match declared format: {}", format),
        ))
    }
}

fn content_type_agrees(content_type: &str, expected: MediaKind) -> bool {
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_lowercase();

    if essence.is_empty() || essence == "application/octet-stream" || essence == "binary/octet-stream" {
        return true;
    }

    match expected {
        MediaKind::Audio => essence.starts_with("audio/") || essence == "application/ogg",
        MediaKind::Video => {
            essence.starts_with("video/") || essence == "application/x-matroska"
        }
    }
}

/// Reduce an untrusted filename to a safe single path component.
///
/// Total: every input yields a non-empty name.
pub fn sanitize_filename(name: &str) -> String {
    let last = name.rsplit(['/', '\\']).next().unwrap_or_default();

    let replaced: String = last
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.') || c.is_whitespace() {
                c
            } else {
                '_'
            }
        })
        .collect();

    let collapsed = replaced.split_whitespace().collect::<Vec<_>>().join(" ");
    let mut sanitized = collapsed
        .trim_matches(|c: char| c == '.' || c.is_whitespace())
        .to_string();

    while sanitized.contains("..") {
        sanitized = sanitized.replace("..", ".");
    }
    let sanitized = sanitized.trim_start_matches('.');

    if sanitized.trim().is_empty() {
        "file".to_string()
    } else {
        sanitized.to_string()
    }
}

/// Validate a trim range, optionally against a known duration.
pub fn validate_time_range(start: f64, end: f64, duration: Option<f64>) -> ValidationVerdict {
    let fail = |reason: String| Err(ValidationFailure::new(ValidationKind::TimeRange, reason));

    if !start.is_finite() || !end.is_finite() {
        return fail("Timestamps must be finite numbers".to_string());
    }
    if start < 0.0 {
        return fail("Start time must be non-negative".to_string());
    }
    if end <= start {
        return fail("End time must be greater than start time".to_string());
    }
    if let Some(duration) = duration {
        if end > duration {
            return fail(format!("End time exceeds audio duration ({}s)", duration));
        }
    }
    Ok(())
}

/// Validate a file count against an inclusive range.
pub fn validate_file_count(count: usize, min: usize, max: usize) -> ValidationVerdict {
    if count < min {
        return Err(ValidationFailure::new(
            ValidationKind::FileCount,
            format!("At least {} files required, got {}", min, count),
        ));
    }
    if count > max {
        return Err(ValidationFailure::new(
            ValidationKind::FileCount,
            format!("At most {} files allowed, got {}", max, count),
        ));
    }
    Ok(())
}

fn parameter(reason: impl Into<String>) -> ValidationVerdict {
    Err(ValidationFailure::new(ValidationKind::Parameter, reason))
}

pub fn validate_speed(speed: f64) -> ValidationVerdict {
    if !speed.is_finite() || !(MIN_SPEED..=MAX_SPEED).contains(&speed) {
        return parameter(format!(
            "Speed must be between {} and {}, got {}",
            MIN_SPEED, MAX_SPEED, speed
        ));
    }
    Ok(())
}

pub fn validate_volume(adjustment: &VolumeAdjustment) -> ValidationVerdict {
    match *adjustment {
        VolumeAdjustment::Percentage(pct) if pct > 500 => {
            parameter(format!("Volume percentage must be 0-500, got {}", pct))
        }
        VolumeAdjustment::Decibels(db) if !db.is_finite() || !(-30.0..=30.0).contains(&db) => {
            parameter(format!("Volume change must be -30 to 30 dB, got {}", db))
        }
        VolumeAdjustment::Normalize(target)
            if !target.is_finite() || !(-20.0..=0.0).contains(&target) =>
        {
            parameter(format!("Loudness target must be -20 to 0 LUFS, got {}", target))
        }
        _ => Ok(()),
    }
}

pub fn validate_split_mode(mode: &SplitMode) -> ValidationVerdict {
    match mode {
        SplitMode::Interval { seconds: 0 } => parameter("Split interval must be positive"),
        SplitMode::Segments { segments } if segments.is_empty() => {
            parameter("At least one segment is required")
        }
        SplitMode::Segments { segments } => {
            for segment in segments {
                if !segment.start.is_finite() || !segment.end.is_finite() || segment.start < 0.0 {
                    return parameter(format!(
                        "Invalid segment range {} - {}",
                        segment.start, segment.end
                    ));
                }
            }
            Ok(())
        }
        SplitMode::Interval { .. } => Ok(()),
    }
}

pub fn validate_compression(quality: &CompressionQuality) -> ValidationVerdict {
    let kbps = quality.bitrate_kbps();
    if !(8..=512).contains(&kbps) {
        return parameter(format!("Bitrate must be 8-512 kbps, got {}", kbps));
    }
    Ok(())
}
