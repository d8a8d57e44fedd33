//! Error types for media operations.

use std::time::Duration;

use audiotk_models::TimestampError;
use serde::Serialize;
use thiserror::Error;

use crate::validation::{ValidationFailure, ValidationKind};

/// Result type for media operations.
pub type MediaResult<T> = Result<T, MediaError>;

/// Errors that can occur during media processing.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("Validation failed: {0}")]
    ValidationFailed(#[from] ValidationFailure),

    #[error("{0}")]
    ParseFailed(#[from] TimestampError),

    #[error("Failed to start {binary}: {message}")]
    ProcessSpawnFailed { binary: String, message: String },

    #[error("Processing timed out after {:.1} seconds", .0.as_secs_f64())]
    ProcessingTimeout(Duration),

    #[error("Transcoder failed (exit code {}): {}", display_exit_code(*.exit_code), last_line(.diagnostics))]
    ProcessingFailed {
        exit_code: Option<i32>,
        diagnostics: String,
    },

    #[error("Video file contains no audio track to extract")]
    NoAudioTrack,

    #[error("Operation cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl MediaError {
    /// Create a processing failure from captured diagnostics.
    pub fn processing_failed(exit_code: Option<i32>, diagnostics: impl Into<String>) -> Self {
        Self::ProcessingFailed {
            exit_code,
            diagnostics: diagnostics.into(),
        }
    }

    /// Create a spawn failure error.
    pub fn spawn_failed(binary: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ProcessSpawnFailed {
            binary: binary.into(),
            message: message.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// HTTP-equivalent status the routing layer should answer with.
    pub fn status_code(&self) -> u16 {
        match self {
            MediaError::ValidationFailed(failure) => failure.status_code(),
            MediaError::ParseFailed(_)
            | MediaError::ProcessingFailed { .. }
            | MediaError::NoAudioTrack => 400,
            MediaError::ProcessingTimeout(_) => 504,
            MediaError::Cancelled => 499,
            MediaError::ProcessSpawnFailed { .. }
            | MediaError::Io(_)
            | MediaError::JsonParse(_)
            | MediaError::Internal(_) => 500,
        }
    }

    /// Stable machine-readable code.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            MediaError::ValidationFailed(failure) => match failure.kind {
                ValidationKind::Size => ErrorCode::FileTooLarge,
                ValidationKind::UnsupportedType => ErrorCode::UnsupportedFormat,
                ValidationKind::Signature => ErrorCode::CorruptedFile,
                ValidationKind::TimeRange => ErrorCode::InvalidTimeRange,
                ValidationKind::FileCount => ErrorCode::InvalidFileCount,
                ValidationKind::Filename | ValidationKind::Parameter => ErrorCode::MalformedRequest,
            },
            MediaError::ParseFailed(_) => ErrorCode::MalformedRequest,
            MediaError::NoAudioTrack => ErrorCode::NoAudioTrack,
            MediaError::ProcessingFailed { .. } => ErrorCode::FfmpegError,
            MediaError::ProcessingTimeout(_) => ErrorCode::Timeout,
            MediaError::Cancelled
            | MediaError::ProcessSpawnFailed { .. }
            | MediaError::Io(_)
            | MediaError::JsonParse(_)
            | MediaError::Internal(_) => ErrorCode::ProcessingFailed,
        }
    }

    /// Whether the failure is the caller's fault and worth reporting verbatim.
    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status_code())
    }

    /// Build the user-facing error body.
    pub fn to_response(&self) -> ErrorResponse {
        let code = self.error_code();
        // Spawn and IO details describe the host, not the request
        let details = match self {
            MediaError::ProcessSpawnFailed { .. }
            | MediaError::Io(_)
            | MediaError::JsonParse(_)
            | MediaError::Internal(_) => None,
            other => Some(other.to_string()),
        };
        ErrorResponse {
            error: code.title().to_string(),
            details,
            suggestion: code.suggestion().to_string(),
            code,
        }
    }
}

/// Machine-readable error codes shared with clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    FileTooLarge,
    UnsupportedFormat,
    InvalidTimeRange,
    CorruptedFile,
    NoAudioTrack,
    InvalidFileCount,
    MalformedRequest,
    ProcessingFailed,
    FfmpegError,
    Timeout,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::FileTooLarge => "FILE_TOO_LARGE",
            ErrorCode::UnsupportedFormat => "UNSUPPORTED_FORMAT",
            ErrorCode::InvalidTimeRange => "INVALID_TIME_RANGE",
            ErrorCode::CorruptedFile => "CORRUPTED_FILE",
            ErrorCode::NoAudioTrack => "NO_AUDIO_TRACK",
            ErrorCode::InvalidFileCount => "INVALID_FILE_COUNT",
            ErrorCode::MalformedRequest => "MALFORMED_REQUEST",
            ErrorCode::ProcessingFailed => "PROCESSING_FAILED",
            ErrorCode::FfmpegError => "FFMPEG_ERROR",
            ErrorCode::Timeout => "TIMEOUT",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            ErrorCode::FileTooLarge => "File too large",
            ErrorCode::UnsupportedFormat => "Unsupported format",
            ErrorCode::InvalidTimeRange => "Invalid time range",
            ErrorCode::CorruptedFile => "File appears to be corrupted",
            ErrorCode::NoAudioTrack => "No audio track found",
            ErrorCode::InvalidFileCount => "Invalid number of files",
            ErrorCode::MalformedRequest => "Malformed request",
            ErrorCode::ProcessingFailed => "Processing failed",
            ErrorCode::FfmpegError => "Audio processing error",
            ErrorCode::Timeout => "Processing timeout",
        }
    }

    pub fn suggestion(&self) -> &'static str {
        match self {
            ErrorCode::FileTooLarge => {
                "File exceeds the upload limit. Please use a smaller file or compress it first."
            }
            ErrorCode::UnsupportedFormat => {
                "Please use MP3, WAV, FLAC, AAC, OGG, or M4A for audio, or MP4, AVI, MKV, MOV, WEBM for video."
            }
            ErrorCode::InvalidTimeRange => {
                "End time must be greater than start time. Please check your timestamps."
            }
            ErrorCode::CorruptedFile => {
                "File appears to be corrupted or does not match its extension. Please try a different file."
            }
            ErrorCode::NoAudioTrack => "Video file contains no audio track to extract. Please use a video with audio.",
            ErrorCode::InvalidFileCount => "Please provide an allowed number of files for merging.",
            ErrorCode::MalformedRequest => {
                "Request parameters are invalid. Please check your input and try again."
            }
            ErrorCode::ProcessingFailed => "Processing failed. Please try again or use a different file.",
            ErrorCode::FfmpegError => {
                "An error occurred during audio processing. Please try again with a different file."
            }
            ErrorCode::Timeout => {
                "Processing took too long. Please try a smaller file or simpler operation."
            }
        }
    }
}

/// Error body handed to the routing layer.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    pub suggestion: String,
    pub code: ErrorCode,
}

fn display_exit_code(code: Option<i32>) -> String {
    code.map(|c| c.to_string())
        .unwrap_or_else(|| "none".to_string())
}

/// Last non-empty diagnostic line; FFmpeg prints the real cause last.
fn last_line(diagnostics: &str) -> &str {
    diagnostics
        .lines()
        .rev()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or("Unknown error")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        let size = MediaError::from(ValidationFailure::new(ValidationKind::Size, "too big"));
        assert_eq!(size.status_code(), 413);
        assert_eq!(size.error_code(), ErrorCode::FileTooLarge);

        let signature = MediaError::from(ValidationFailure::new(ValidationKind::Signature, "bad"));
        assert_eq!(signature.status_code(), 400);

        assert_eq!(MediaError::ProcessingTimeout(Duration::from_secs(300)).status_code(), 504);
        assert_eq!(MediaError::spawn_failed("ffmpeg", "not found").status_code(), 500);
        assert_eq!(MediaError::processing_failed(Some(1), "boom").status_code(), 400);
        assert_eq!(MediaError::from(TimestampError::Empty).status_code(), 400);
    }

    #[test]
    fn test_processing_failed_message_uses_last_line() {
        let err = MediaError::processing_failed(
            Some(234),
            "Input #0, mp3\n  Stream #0:0: Audio\npipe:1: Invalid argument\n\n",
        );
        assert_eq!(
            err.to_string(),
            "Transcoder failed (exit code 234): pipe:1: Invalid argument"
        );

        let killed = MediaError::processing_failed(None, "");
        assert_eq!(killed.to_string(), "Transcoder failed (exit code none): Unknown error");
    }

    #[test]
    fn test_response_hides_host_details() {
        let response = MediaError::spawn_failed("/opt/ffmpeg", "No such file").to_response();
        assert!(response.details.is_none());
        assert_eq!(response.code, ErrorCode::ProcessingFailed);

        let response = MediaError::NoAudioTrack.to_response();
        assert_eq!(response.code, ErrorCode::NoAudioTrack);
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["code"], "NO_AUDIO_TRACK");
    }
}
