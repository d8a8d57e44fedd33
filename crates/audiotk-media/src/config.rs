//! Engine configuration.

use std::str::FromStr;
use std::time::Duration;

use audiotk_models::{AudioFormat, VideoFormat};
use tracing::warn;

use crate::fallback::DEFAULT_FALLBACK_PATTERNS;

/// Default upload limit (100 MiB).
pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 100 * 1024 * 1024;

/// Engine configuration, passed explicitly at construction.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Maximum accepted payload size in bytes
    pub max_upload_bytes: u64,
    /// Wall-clock limit for a single transcoder invocation
    pub process_timeout: Duration,
    /// Wall-clock limit for a probe or version check
    pub probe_timeout: Duration,
    /// Transcoder binary (name on PATH or absolute path)
    pub ffmpeg_path: String,
    /// Probe binary (name on PATH or absolute path)
    pub ffprobe_path: String,
    /// Audio formats admitted for processing
    pub allowed_audio: Vec<AudioFormat>,
    /// Video formats admitted for extraction
    pub allowed_video: Vec<VideoFormat>,
    /// Minimum number of files a merge accepts
    pub merge_min_files: usize,
    /// Maximum number of files a merge accepts
    pub merge_max_files: usize,
    /// Maximum characters of stderr kept in a failure
    pub diagnostics_limit: usize,
    /// Case-insensitive stderr fragments that trigger the trim re-encode retry
    pub fallback_patterns: Vec<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            process_timeout: Duration::from_secs(300), // 5 minutes
            probe_timeout: Duration::from_secs(10),
            ffmpeg_path: "ffmpeg".to_string(),
            ffprobe_path: "ffprobe".to_string(),
            allowed_audio: AudioFormat::ALL.to_vec(),
            allowed_video: VideoFormat::ALL.to_vec(),
            merge_min_files: 2,
            merge_max_files: 10,
            diagnostics_limit: 2000,
            fallback_patterns: DEFAULT_FALLBACK_PATTERNS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl EngineConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            max_upload_bytes: std::env::var("AUDIOTK_MAX_UPLOAD_BYTES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_upload_bytes),
            process_timeout: parse_timeout(
                std::env::var("AUDIOTK_PROCESS_TIMEOUT_SECS").ok().as_deref(),
                defaults.process_timeout,
            ),
            probe_timeout: parse_timeout(
                std::env::var("AUDIOTK_PROBE_TIMEOUT_SECS").ok().as_deref(),
                defaults.probe_timeout,
            ),
            ffmpeg_path: std::env::var("AUDIOTK_FFMPEG_PATH").unwrap_or(defaults.ffmpeg_path),
            ffprobe_path: std::env::var("AUDIOTK_FFPROBE_PATH").unwrap_or(defaults.ffprobe_path),
            allowed_audio: std::env::var("AUDIOTK_ALLOWED_AUDIO")
                .ok()
                .map(|s| parse_format_list(&s))
                .filter(|formats| !formats.is_empty())
                .unwrap_or(defaults.allowed_audio),
            allowed_video: std::env::var("AUDIOTK_ALLOWED_VIDEO")
                .ok()
                .map(|s| parse_format_list(&s))
                .filter(|formats| !formats.is_empty())
                .unwrap_or(defaults.allowed_video),
            merge_min_files: std::env::var("AUDIOTK_MERGE_MIN_FILES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.merge_min_files),
            merge_max_files: std::env::var("AUDIOTK_MERGE_MAX_FILES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.merge_max_files),
            diagnostics_limit: std::env::var("AUDIOTK_DIAGNOSTICS_LIMIT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.diagnostics_limit),
            fallback_patterns: std::env::var("AUDIOTK_FALLBACK_PATTERNS")
                .ok()
                .map(|s| parse_pattern_list(&s))
                .filter(|patterns| !patterns.is_empty())
                .unwrap_or(defaults.fallback_patterns),
        }
    }

    /// Set the process timeout.
    pub fn with_process_timeout(mut self, timeout: Duration) -> Self {
        self.process_timeout = timeout;
        self
    }

    /// Set the transcoder binary.
    pub fn with_ffmpeg_path(mut self, path: impl Into<String>) -> Self {
        self.ffmpeg_path = path.into();
        self
    }

    /// Set the probe binary.
    pub fn with_ffprobe_path(mut self, path: impl Into<String>) -> Self {
        self.ffprobe_path = path.into();
        self
    }

    /// Set the upload limit.
    pub fn with_max_upload_bytes(mut self, bytes: u64) -> Self {
        self.max_upload_bytes = bytes;
        self
    }
}

/// Whole seconds; zero or unparsable values keep the default.
fn parse_timeout(value: Option<&str>, default: Duration) -> Duration {
    match value.map(|s| s.trim().parse::<u64>()) {
        Some(Ok(secs)) if secs > 0 => Duration::from_secs(secs),
        Some(_) => {
            warn!(?value, default_secs = default.as_secs(), "Ignoring invalid timeout");
            default
        }
        None => default,
    }
}

/// Comma-separated extensions. Unknown entries are skipped.
fn parse_format_list<T: FromStr>(value: &str) -> Vec<T> {
    let mut formats = Vec::new();
    for entry in value.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        match entry.parse() {
            Ok(format) => formats.push(format),
            Err(_) => warn!(entry, "Ignoring unknown format in allow-list"),
        }
    }
    formats
}

fn parse_pattern_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}
