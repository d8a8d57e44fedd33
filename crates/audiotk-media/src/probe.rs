//! FFprobe stream inspection over stdin.

use std::time::Duration;

use audiotk_models::{MediaFormat, OperationKind};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::command::{truncate_diagnostics, ProcessExecutor, TranscodeCommand, Tool};
use crate::error::{MediaError, MediaResult};

/// What a probe learned about a payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MediaInfo {
    /// Whether at least one audio stream is present
    pub has_audio: bool,
    /// Codec of the first audio stream
    pub audio_codec: Option<String>,
    /// Sample rate of the first audio stream in Hz
    pub sample_rate: Option<u32>,
    /// Channels of the first audio stream
    pub channels: Option<u32>,
    /// Audio bitrate in kbps (stream, else container)
    pub bitrate_kbps: Option<u32>,
    /// Duration in seconds
    pub duration: Option<f64>,
}

/// How a probe is run.
#[derive(Debug, Clone, Copy)]
pub struct ProbeOptions {
    /// Demuxer hint, when the content was recognised
    pub input_format: Option<MediaFormat>,
    pub timeout: Duration,
    /// Maximum characters of stderr kept in a failure
    pub diagnostics_limit: usize,
    /// Operation the probe serves
    pub operation: Option<OperationKind>,
}

impl ProbeOptions {
    pub fn new(timeout: Duration, diagnostics_limit: usize) -> Self {
        Self {
            input_format: None,
            timeout,
            diagnostics_limit,
            operation: None,
        }
    }

    pub fn with_input_format(mut self, format: Option<MediaFormat>) -> Self {
        self.input_format = format;
        self
    }

    pub fn with_operation(mut self, operation: OperationKind) -> Self {
        self.operation = Some(operation);
        self
    }
}

/// FFprobe JSON output format.
#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    format: Option<FfprobeFormat>,
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
    bit_rate: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: Option<String>,
    codec_name: Option<String>,
    sample_rate: Option<String>,
    channels: Option<u32>,
    bit_rate: Option<String>,
    duration: Option<String>,
}

/// Probe invocation reading the payload from stdin.
pub fn probe_command(options: &ProbeOptions) -> TranscodeCommand {
    let input_format = options.input_format;
    let mut args: Vec<String> = ["-v", "error", "-print_format", "json", "-show_format", "-show_streams"]
        .iter()
        .map(|s| s.to_string())
        .collect();

    if let Some(format) = input_format {
        args.push("-f".to_string());
        args.push(format.input_demuxer().to_string());
    }
    args.push("pipe:0".to_string());

    let mut command = TranscodeCommand::new(Tool::Probe, args).with_timeout(options.timeout);
    if let Some(format) = input_format {
        command = command.with_input_format(format);
    }
    if let Some(operation) = options.operation {
        command = command.with_operation(operation);
    }
    command
}

/// Parse FFprobe's JSON report.
pub fn parse_probe_output(stdout: &[u8]) -> MediaResult<MediaInfo> {
    let probe: FfprobeOutput = serde_json::from_slice(stdout)?;

    let audio = probe
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("audio"));

    let format_bitrate = probe
        .format
        .as_ref()
        .and_then(|f| f.bit_rate.as_deref())
        .and_then(parse_bitrate_kbps);

    let format_duration = probe
        .format
        .as_ref()
        .and_then(|f| f.duration.as_deref())
        .and_then(parse_seconds);

    Ok(MediaInfo {
        has_audio: audio.is_some(),
        audio_codec: audio.and_then(|s| s.codec_name.clone()),
        sample_rate: audio
            .and_then(|s| s.sample_rate.as_deref())
            .and_then(|r| r.parse().ok()),
        channels: audio.and_then(|s| s.channels),
        bitrate_kbps: audio
            .and_then(|s| s.bit_rate.as_deref())
            .and_then(parse_bitrate_kbps)
            .or(format_bitrate),
        duration: format_duration.or_else(|| {
            audio
                .and_then(|s| s.duration.as_deref())
                .and_then(parse_seconds)
        }),
    })
}

/// Run a probe over an in-memory payload.
pub async fn probe_payload<E>(
    executor: &E,
    data: &[u8],
    options: &ProbeOptions,
) -> MediaResult<MediaInfo>
where
    E: ProcessExecutor + ?Sized,
{
    let command = probe_command(options);
    let outcome = executor.execute(&command, data).await?;

    if outcome.timed_out {
        return Err(MediaError::ProcessingTimeout(options.timeout));
    }
    if !outcome.success() {
        return Err(MediaError::processing_failed(
            outcome.exit_code,
            truncate_diagnostics(&outcome.stderr, options.diagnostics_limit),
        ));
    }

    let info = parse_probe_output(&outcome.stdout)?;
    debug!(
        has_audio = info.has_audio,
        sample_rate = ?info.sample_rate,
        bitrate_kbps = ?info.bitrate_kbps,
        duration = ?info.duration,
        "Probed payload"
    );
    Ok(info)
}

fn parse_bitrate_kbps(value: &str) -> Option<u32> {
    value
        .parse::<u64>()
        .ok()
        .filter(|bps| *bps > 0)
        .map(|bps| (bps / 1000) as u32)
}

fn parse_seconds(value: &str) -> Option<f64> {
    value.parse::<f64>().ok().filter(|d| d.is_finite() && *d >= 0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use audiotk_models::VideoFormat;

    const MP3_PROBE: &str = r#"{
        "streams": [
            {"index": 0, "codec_name": "mp3", "codec_type": "audio", "sample_rate": "48000",
             "channels": 2, "bit_rate": "320000", "duration": "12.5"}
        ],
        "format": {"format_name": "mp3", "duration": "12.512", "bit_rate": "320500"}
    }"#;

    #[test]
    fn test_parse_audio_probe() {
        let info = parse_probe_output(MP3_PROBE.as_bytes()).unwrap();
        assert!(info.has_audio);
        assert_eq!(info.audio_codec.as_deref(), Some("mp3"));
        assert_eq!(info.sample_rate, Some(48_000));
        assert_eq!(info.channels, Some(2));
        assert_eq!(info.bitrate_kbps, Some(320));
        assert_eq!(info.duration, Some(12.512));
    }

    #[test]
    fn test_parse_video_without_audio() {
        let json = r#"{"streams":[{"codec_type":"video","codec_name":"h264"}],"format":{"duration":"N/A"}}"#;
        let info = parse_probe_output(json.as_bytes()).unwrap();
        assert!(!info.has_audio);
        assert_eq!(info.sample_rate, None);
        assert_eq!(info.duration, None);
    }

    #[test]
    fn test_container_bitrate_fallback() {
        let json = r#"{"streams":[{"codec_type":"audio","codec_name":"vorbis"}],"format":{"bit_rate":"128000"}}"#;
        let info = parse_probe_output(json.as_bytes()).unwrap();
        assert_eq!(info.bitrate_kbps, Some(128));
    }

    #[test]
    fn test_probe_command_reads_stdin() {
        let options = ProbeOptions::new(Duration::from_secs(10), 2000)
            .with_input_format(Some(MediaFormat::Video(VideoFormat::Mkv)))
            .with_operation(OperationKind::Extract);
        let command = probe_command(&options);
        assert_eq!(command.tool(), Tool::Probe);
        assert_eq!(command.operation(), Some(OperationKind::Extract));
        assert_eq!(command.args().last().map(String::as_str), Some("pipe:0"));
        assert!(command.args().windows(2).any(|w| w[0] == "-f" && w[1] == "matroska"));
        assert_eq!(command.timeout(), Some(Duration::from_secs(10)));

        let bare = probe_command(&ProbeOptions::new(Duration::from_secs(1), 2000));
        assert!(!bare.args().contains(&"-f".to_string()));
    }

    #[test]
    fn test_garbage_is_json_error() {
        let err = parse_probe_output(b"not json").unwrap_err();
        assert!(matches!(err, MediaError::JsonParse(_)));
    }
}
