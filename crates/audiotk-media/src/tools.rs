//! External tool detection and health reporting.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::config::EngineConfig;

/// Information about an external tool.
#[derive(Debug, Clone, Serialize)]
pub struct ToolInfo {
    /// Name or configured path of the tool
    pub name: String,
    /// Whether the tool answered its version query
    pub available: bool,
    /// First line of the version banner
    pub version: Option<String>,
    /// Resolved executable path
    pub path: Option<PathBuf>,
    /// How long the version query took
    pub response_time_ms: u64,
}

/// Run `<binary> -version` without transcoding anything.
pub async fn check_tool(binary: &str, timeout: Duration) -> ToolInfo {
    let started = Instant::now();

    let output = Command::new(binary)
        .arg("-version")
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .output();

    let result = tokio::time::timeout(timeout, output).await;
    let response_time_ms = started.elapsed().as_millis() as u64;

    match result {
        Ok(Ok(output)) if output.status.success() => {
            let version = String::from_utf8_lossy(&output.stdout)
                .lines()
                .next()
                .map(|s| s.trim().to_string());
            debug!(binary, ?version, response_time_ms, "Tool available");

            ToolInfo {
                name: binary.to_string(),
                available: true,
                version,
                path: which::which(binary).ok(),
                response_time_ms,
            }
        }
        Ok(Ok(output)) => {
            warn!(binary, status = ?output.status, "Tool version query failed");
            unavailable(binary, response_time_ms)
        }
        Ok(Err(e)) => {
            warn!(binary, error = %e, "Tool could not be started");
            unavailable(binary, response_time_ms)
        }
        Err(_) => {
            warn!(binary, timeout_secs = timeout.as_secs_f64(), "Tool version query timed out");
            unavailable(binary, response_time_ms)
        }
    }
}

fn unavailable(binary: &str, response_time_ms: u64) -> ToolInfo {
    ToolInfo {
        name: binary.to_string(),
        available: false,
        version: None,
        path: None,
        response_time_ms,
    }
}

/// Check the configured transcoder.
pub async fn check_transcoder(config: &EngineConfig) -> ToolInfo {
    check_tool(&config.ffmpeg_path, config.probe_timeout).await
}

/// Check the configured probe binary.
pub async fn check_prober(config: &EngineConfig) -> ToolInfo {
    check_tool(&config.ffprobe_path, config.probe_timeout).await
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
}

/// Availability of every binary the engine depends on.
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub ffmpeg: ToolInfo,
    pub ffprobe: ToolInfo,
    pub checked_at: DateTime<Utc>,
}

impl HealthReport {
    pub fn new(ffmpeg: ToolInfo, ffprobe: ToolInfo) -> Self {
        let status = if ffmpeg.available && ffprobe.available {
            HealthStatus::Healthy
        } else {
            HealthStatus::Unhealthy
        };
        Self {
            status,
            ffmpeg,
            ffprobe,
            checked_at: Utc::now(),
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.status == HealthStatus::Healthy
    }
}

/// Check both binaries concurrently.
pub async fn health_report(config: &EngineConfig) -> HealthReport {
    let (ffmpeg, ffprobe) = tokio::join!(check_transcoder(config), check_prober(config));
    HealthReport::new(ffmpeg, ffprobe)
}
