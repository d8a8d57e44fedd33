//! Process orchestration for each operation.
//!
//! Every operation follows the same shape: build a command, execute it,
//! turn a timeout into [`MediaError::ProcessingTimeout`] and a non-zero exit
//! into [`MediaError::ProcessingFailed`]. Trim is the only operation allowed
//! a second attempt, and only when the fast path's diagnostics match the
//! fallback policy.

use std::time::Duration;

use audiotk_models::encoding::DEFAULT_SAMPLE_RATE;
use audiotk_models::{
    AudioFormat, CompressionQuality, MediaFormat, OperationKind, SplitMode, VideoFormat,
    VolumeAdjustment,
};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::builders::{self, AudioSource, MergeInput};
use crate::command::{truncate_diagnostics, ProcessExecutor, ProcessOutcome, TranscodeCommand};
use crate::config::EngineConfig;
use crate::error::{MediaError, MediaResult};
use crate::fallback::FallbackPolicy;
use crate::filters::format_number;
use crate::metrics;
use crate::probe::{self, MediaInfo, ProbeOptions};
use crate::validation::{sanitize_filename, ValidatedPayload};

/// Stderr fragments FFmpeg prints when a stream selector finds no audio.
const NO_AUDIO_MARKERS: &[&str] = &[
    "matches no streams",
    "does not contain any stream",
    "output file #0 does not contain any stream",
];

/// Result of a successful operation.
#[derive(Debug, Clone, Serialize)]
pub struct ProcessedOutput {
    #[serde(skip)]
    pub data: Vec<u8>,
    pub format: AudioFormat,
    pub content_type: &'static str,
    /// Suggested download name
    pub filename: String,
}

impl ProcessedOutput {
    pub fn new(data: Vec<u8>, format: AudioFormat, filename: impl Into<String>) -> Self {
        Self {
            data,
            format,
            content_type: format.mime_type(),
            filename: filename.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Drives the transcoder for each operation.
pub struct Orchestrator<E> {
    executor: E,
    fallback: FallbackPolicy,
    process_timeout: Duration,
    probe_timeout: Duration,
    diagnostics_limit: usize,
}

impl<E: ProcessExecutor> Orchestrator<E> {
    pub fn new(executor: E, config: &EngineConfig) -> Self {
        Self {
            executor,
            fallback: FallbackPolicy::new(&config.fallback_patterns),
            process_timeout: config.process_timeout,
            probe_timeout: config.probe_timeout,
            diagnostics_limit: config.diagnostics_limit,
        }
    }

    pub fn executor(&self) -> &E {
        &self.executor
    }

    pub fn fallback_policy(&self) -> &FallbackPolicy {
        &self.fallback
    }

    /// Re-encode an audio payload into another format.
    pub async fn convert(
        &self,
        payload: &ValidatedPayload,
        target: AudioFormat,
    ) -> MediaResult<ProcessedOutput> {
        let command = builders::build_convert(source_of(payload)?, target);
        let data = self.run(&command, payload.data()).await?;
        Ok(ProcessedOutput::new(
            data,
            target,
            format!("{}.{}", payload.safe_stem(), target.extension()),
        ))
    }

    /// Cut `[start, end)` from an audio payload.
    ///
    /// Tries a stream copy first; retries once with re-encoding when the
    /// failure looks like a container or codec incompatibility.
    pub async fn trim(
        &self,
        payload: &ValidatedPayload,
        start: f64,
        end: f64,
    ) -> MediaResult<ProcessedOutput> {
        let source = source_of(payload)?;
        let format = source.format;
        let filename = format!("{}_trimmed.{}", payload.safe_stem(), format.extension());

        let fast = builders::build_trim(source, start, end);
        let outcome = self.attempt(&fast, payload.data()).await?;
        if outcome.success() && !outcome.stdout.is_empty() {
            return Ok(ProcessedOutput::new(outcome.stdout, format, filename));
        }

        let Some(pattern) = self.fallback.matching_pattern(&outcome.stderr) else {
            return Err(self.failure(&fast, outcome));
        };

        warn!(
            strategy = %fast.strategy(),
            pattern = %pattern,
            exit_code = ?outcome.exit_code,
            "Stream copy failed, retrying trim with re-encoding"
        );
        metrics::record_fallback_retry(OperationKind::Trim);

        let fallback = builders::build_trim_fallback(source, start, end);
        let data = self.run(&fallback, payload.data()).await?;
        Ok(ProcessedOutput::new(data, format, filename))
    }

    /// Join audio payloads in order into one output.
    ///
    /// Inputs are byte-concatenated only when they share a frame-concatenable
    /// format, sample rate and channel count. Anything else is decoded to PCM
    /// at the highest probed sample rate first.
    pub async fn merge(
        &self,
        payloads: &[ValidatedPayload],
        target: AudioFormat,
    ) -> MediaResult<ProcessedOutput> {
        let filename = format!("merged.{}", target.extension());

        let mut probes = Vec::with_capacity(payloads.len());
        for payload in payloads {
            probes.push(self.probe_lenient(payload, OperationKind::Merge).await);
        }

        if let Some(format) = common_concatenable_format(payloads) {
            if uniform_stream_layout(&probes) {
                debug!(format = %format, inputs = payloads.len(), "Merging by frame concatenation");
                let joined: Vec<u8> =
                    payloads.iter().flat_map(|p| p.data().iter().copied()).collect();
                let command = builders::build_merge(MergeInput::Concatenated(format), target);
                let data = self.run(&command, &joined).await?;
                return Ok(ProcessedOutput::new(data, target, filename));
            }
            debug!(format = %format, "Inputs differ in sample rate or channels");
        }

        let sample_rate = highest_sample_rate(&probes);
        debug!(sample_rate, inputs = payloads.len(), "Merging through PCM intermediate");

        let mut pcm = Vec::new();
        for payload in payloads {
            let command = builders::build_normalize(source_of(payload)?, sample_rate);
            let decoded = self.run(&command, payload.data()).await?;
            pcm.extend_from_slice(&decoded);
        }

        let command = builders::build_merge(MergeInput::Pcm { sample_rate }, target);
        let data = self.run(&command, &pcm).await?;
        Ok(ProcessedOutput::new(data, target, filename))
    }

    /// Lower the bitrate of an audio payload.
    ///
    /// A payload already at or below the target is returned unchanged.
    pub async fn compress(
        &self,
        payload: &ValidatedPayload,
        quality: CompressionQuality,
    ) -> MediaResult<ProcessedOutput> {
        let source = source_of(payload)?;
        let target_kbps = quality.bitrate_kbps();

        if let Some(info) = self.probe_lenient(payload, OperationKind::Compress).await {
            if let Some(current) = info.bitrate_kbps {
                if current <= target_kbps {
                    info!(
                        current_kbps = current,
                        target_kbps,
                        "Bitrate already at or below target, bypassing compression"
                    );
                    return Ok(ProcessedOutput::new(
                        payload.data().to_vec(),
                        source.format,
                        format!("{}_compressed.{}", payload.safe_stem(), source.format.extension()),
                    ));
                }
            }
        }

        let command = builders::build_compress(source, quality);
        let target = builders::compressed_format(source.format);
        let data = self.run(&command, payload.data()).await?;
        Ok(ProcessedOutput::new(
            data,
            target,
            format!("{}_compressed.{}", payload.safe_stem(), target.extension()),
        ))
    }

    /// Pull the audio track out of a video payload.
    pub async fn extract_audio(
        &self,
        video: &ValidatedPayload,
        target: AudioFormat,
    ) -> MediaResult<ProcessedOutput> {
        let video_format = video_format_of(video)?;

        if let Some(info) = self.probe_lenient(video, OperationKind::Extract).await {
            if !info.has_audio {
                return Err(MediaError::NoAudioTrack);
            }
        }

        let command = builders::build_extract(video_format, target);
        let data = match self.run(&command, video.data()).await {
            Err(MediaError::ProcessingFailed { diagnostics, .. }) if reports_no_audio(&diagnostics) => {
                return Err(MediaError::NoAudioTrack);
            }
            other => other?,
        };
        Ok(ProcessedOutput::new(
            data,
            target,
            format!("{}.{}", video.safe_stem(), target.extension()),
        ))
    }

    /// Cut an audio payload into ordered, named pieces.
    pub async fn split(
        &self,
        payload: &ValidatedPayload,
        mode: &SplitMode,
    ) -> MediaResult<Vec<ProcessedOutput>> {
        let source = source_of(payload)?;
        let stem = payload.safe_stem();
        let ext = source.format.extension();

        let pieces: Vec<(f64, f64, String)> = match mode {
            SplitMode::Interval { seconds } => {
                let options = self.probe_options(payload, OperationKind::Split);
                let info = probe::probe_payload(&self.executor, payload.data(), &options).await?;
                let duration = info.duration.ok_or_else(|| {
                    MediaError::processing_failed(None, "Could not determine audio duration")
                })?;
                interval_pieces(duration, *seconds as f64)
                    .into_iter()
                    .enumerate()
                    .map(|(i, (start, length))| {
                        (start, length, format!("{}_segment_{}.{}", stem, i + 1, ext))
                    })
                    .collect()
            }
            SplitMode::Segments { segments } => segments
                .iter()
                .enumerate()
                .filter_map(|(i, segment)| {
                    let length = segment.duration();
                    if length <= 0.0 {
                        warn!(index = i + 1, length, "Skipping segment with non-positive duration");
                        return None;
                    }
                    let name = segment
                        .name
                        .as_deref()
                        .map(sanitize_filename)
                        .unwrap_or_else(|| format!("segment_{}", i + 1));
                    Some((segment.start, length, format!("{}.{}", name, ext)))
                })
                .collect(),
        };

        let mut outputs = Vec::with_capacity(pieces.len());
        for (start, length, filename) in pieces {
            let command = builders::build_split_segment(source, start, length);
            let data = self.run(&command, payload.data()).await?;
            outputs.push(ProcessedOutput::new(data, source.format, filename));
        }

        info!(segments = outputs.len(), "Split complete");
        Ok(outputs)
    }

    /// Change the level of an audio payload.
    pub async fn adjust_volume(
        &self,
        payload: &ValidatedPayload,
        adjustment: &VolumeAdjustment,
    ) -> MediaResult<ProcessedOutput> {
        let source = source_of(payload)?;
        let command = builders::build_adjust_volume(source, adjustment);
        let data = self.run(&command, payload.data()).await?;
        Ok(ProcessedOutput::new(
            data,
            source.format,
            format!("{}_volume.{}", payload.safe_stem(), source.format.extension()),
        ))
    }

    /// Change the playback speed of an audio payload.
    pub async fn change_speed(
        &self,
        payload: &ValidatedPayload,
        speed: f64,
        preserve_pitch: bool,
    ) -> MediaResult<ProcessedOutput> {
        let source = source_of(payload)?;
        let format = source.format;

        let sample_rate = if preserve_pitch {
            DEFAULT_SAMPLE_RATE
        } else {
            self.probe_lenient(payload, OperationKind::ChangeSpeed)
                .await
                .and_then(|info| info.sample_rate)
                .unwrap_or(DEFAULT_SAMPLE_RATE)
        };

        let command = builders::build_change_speed(source, speed, preserve_pitch, sample_rate);
        let data = self.run(&command, payload.data()).await?;
        Ok(ProcessedOutput::new(
            data,
            format,
            format!("{}_{}x.{}", payload.safe_stem(), format_number(speed), format.extension()),
        ))
    }

    /// Execute once; a timeout is terminal.
    async fn attempt(&self, command: &TranscodeCommand, input: &[u8]) -> MediaResult<ProcessOutcome> {
        let outcome = self.executor.execute(command, input).await?;

        if outcome.timed_out {
            let limit = command.timeout().unwrap_or(self.process_timeout);
            warn!(
                strategy = %command.strategy(),
                timeout_secs = limit.as_secs_f64(),
                "Transcoder timed out"
            );
            return Err(MediaError::ProcessingTimeout(limit));
        }

        Ok(outcome)
    }

    /// Execute once and return stdout, or the failure.
    async fn run(&self, command: &TranscodeCommand, input: &[u8]) -> MediaResult<Vec<u8>> {
        let outcome = self.attempt(command, input).await?;
        if outcome.success() && !outcome.stdout.is_empty() {
            debug!(
                strategy = %command.strategy(),
                elapsed_ms = outcome.elapsed.as_millis() as u64,
                input_bytes = input.len(),
                output_bytes = outcome.stdout.len(),
                "Transcode succeeded"
            );
            return Ok(outcome.stdout);
        }
        Err(self.failure(command, outcome))
    }

    fn failure(&self, command: &TranscodeCommand, outcome: ProcessOutcome) -> MediaError {
        let diagnostics = if outcome.success() {
            "Transcoder produced no output".to_string()
        } else {
            truncate_diagnostics(&outcome.stderr, self.diagnostics_limit)
        };

        warn!(
            strategy = %command.strategy(),
            exit_code = ?outcome.exit_code,
            elapsed_ms = outcome.elapsed.as_millis() as u64,
            stderr = %diagnostics,
            "Transcode failed"
        );
        MediaError::processing_failed(outcome.exit_code, diagnostics)
    }

    fn probe_options(&self, payload: &ValidatedPayload, operation: OperationKind) -> ProbeOptions {
        ProbeOptions::new(self.probe_timeout, self.diagnostics_limit)
            .with_input_format(payload.detected_format())
            .with_operation(operation)
    }

    /// Probe, treating any failure as "unknown".
    async fn probe_lenient(
        &self,
        payload: &ValidatedPayload,
        operation: OperationKind,
    ) -> Option<MediaInfo> {
        let options = self.probe_options(payload, operation);
        match probe::probe_payload(&self.executor, payload.data(), &options).await {
            Ok(info) => Some(info),
            Err(e) => {
                warn!(error = %e, filename = %payload.filename(), "Probe failed, continuing without it");
                None
            }
        }
    }
}

/// The shared detected format of all inputs when it can be joined byte-wise.
pub fn common_concatenable_format(payloads: &[ValidatedPayload]) -> Option<AudioFormat> {
    let first = payloads.first()?.detected_format()?.as_audio()?;
    let uniform = payloads
        .iter()
        .all(|p| p.detected_format() == Some(MediaFormat::Audio(first)));
    (uniform && first.is_frame_concatenable()).then_some(first)
}

/// Whether every input was probed with the same sample rate and channel count.
///
/// Unknown values count as a mismatch.
pub fn uniform_stream_layout(probes: &[Option<MediaInfo>]) -> bool {
    let layouts: Option<Vec<(u32, u32)>> = probes
        .iter()
        .map(|info| {
            let info = info.as_ref()?;
            Some((info.sample_rate?, info.channels?))
        })
        .collect();

    match layouts {
        Some(layouts) => layouts.windows(2).all(|pair| pair[0] == pair[1]),
        None => false,
    }
}

/// Highest probed sample rate, or the default if none is known.
pub fn highest_sample_rate(probes: &[Option<MediaInfo>]) -> u32 {
    probes
        .iter()
        .filter_map(|info| info.as_ref()?.sample_rate)
        .max()
        .unwrap_or(DEFAULT_SAMPLE_RATE)
}

/// `(start, length)` pairs covering `duration` in steps of `interval`.
///
/// The last piece may be shorter.
pub fn interval_pieces(duration: f64, interval: f64) -> Vec<(f64, f64)> {
    if duration <= 0.0 || interval <= 0.0 {
        return Vec::new();
    }
    let count = (duration / interval).ceil() as usize;
    (0..count)
        .map(|i| {
            let start = i as f64 * interval;
            let end = ((i + 1) as f64 * interval).min(duration);
            (start, end - start)
        })
        .filter(|(_, length)| *length > 0.0)
        .collect()
}

fn source_of(payload: &ValidatedPayload) -> MediaResult<AudioSource> {
    let format = payload.audio_format().ok_or_else(|| {
        MediaError::internal(format!("{} is not an audio payload", payload.filename()))
    })?;
    Ok(match payload.detected_format() {
        Some(_) => AudioSource::detected(format),
        None => AudioSource::assumed(format),
    })
}

fn video_format_of(payload: &ValidatedPayload) -> MediaResult<VideoFormat> {
    match payload.format() {
        MediaFormat::Video(format) => Ok(format),
        MediaFormat::Audio(_) => Err(MediaError::internal(format!(
            "{} is not a video payload",
            payload.filename()
        ))),
    }
}

fn reports_no_audio(diagnostics: &str) -> bool {
    let lowered = diagnostics.to_lowercase();
    NO_AUDIO_MARKERS.iter().any(|marker| lowered.contains(marker))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use audiotk_models::{CompressionLevel, MediaKind, SplitSegment, UploadedPayload};

    use crate::command::{CommandStrategy, Tool};
    use crate::validation::AdmissionValidator;

    /// Executor that replays scripted outcomes and records every call.
    #[derive(Default)]
    struct ScriptedExecutor {
        outcomes: Mutex<VecDeque<MediaResult<ProcessOutcome>>>,
        calls: Mutex<Vec<(TranscodeCommand, usize)>>,
    }

    impl ScriptedExecutor {
        fn new(outcomes: Vec<MediaResult<ProcessOutcome>>) -> Self {
            Self {
                outcomes: Mutex::new(outcomes.into()),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<(TranscodeCommand, usize)> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ProcessExecutor for ScriptedExecutor {
        async fn execute(&self, command: &TranscodeCommand, input: &[u8]) -> MediaResult<ProcessOutcome> {
            self.calls.lock().unwrap().push((command.clone(), input.len()));
            self.outcomes
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(MediaError::internal("no scripted outcome left")))
        }
    }

    fn ok(stdout: &[u8]) -> MediaResult<ProcessOutcome> {
        Ok(ProcessOutcome {
            exit_code: Some(0),
            stdout: stdout.to_vec(),
            ..ProcessOutcome::default()
        })
    }

    fn failed(code: i32, stderr: &str) -> MediaResult<ProcessOutcome> {
        Ok(ProcessOutcome {
            exit_code: Some(code),
            stderr: stderr.to_string(),
            ..ProcessOutcome::default()
        })
    }

    fn probe_json(json: &str) -> MediaResult<ProcessOutcome> {
        ok(json.as_bytes())
    }

    fn orchestrator(outcomes: Vec<MediaResult<ProcessOutcome>>) -> Orchestrator<ScriptedExecutor> {
        Orchestrator::new(ScriptedExecutor::new(outcomes), &EngineConfig::default())
    }

    fn mp3(name: &str) -> ValidatedPayload {
        let mut data = b"ID3\x04\x00\x00\x00\x00\x00\x00".to_vec();
        data.extend_from_slice(&[0xFF, 0xFB, 0x90, 0x64, 0x00, 0x00]);
        admit(UploadedPayload::new(data, name), MediaKind::Audio)
    }

    fn wav(name: &str) -> ValidatedPayload {
        admit(
            UploadedPayload::new(b"RIFF\x24\x08\x00\x00WAVEfmt ".to_vec(), name),
            MediaKind::Audio,
        )
    }

    fn mp4(name: &str) -> ValidatedPayload {
        admit(
            UploadedPayload::new(b"\x00\x00\x00\x20ftypisom\x00\x00\x02\x00".to_vec(), name),
            MediaKind::Video,
        )
    }

    fn admit(payload: UploadedPayload, kind: MediaKind) -> ValidatedPayload {
        AdmissionValidator::new(&EngineConfig::default())
            .validate_payload(payload, kind)
            .unwrap()
    }

    #[tokio::test]
    async fn test_trim_fast_path_success() {
        let orch = orchestrator(vec![ok(b"cut")]);
        let output = orch.trim(&mp3("song.mp3"), 1.0, 2.0).await.unwrap();

        assert_eq!(output.data, b"cut");
        assert_eq!(output.filename, "song_trimmed.mp3");
        assert_eq!(output.content_type, "audio/mpeg");
        let calls = orch.executor().calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0.strategy(), CommandStrategy::Fast);
    }

    #[tokio::test]
    async fn test_trim_falls_back_exactly_once() {
        let orch = orchestrator(vec![
            failed(1, "[mp3 @ 0x1] Invalid argument"),
            ok(b"reencoded"),
        ]);
        let output = orch.trim(&mp3("song.mp3"), 0.0, 5.0).await.unwrap();

        assert_eq!(output.data, b"reencoded");
        let calls = orch.executor().calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].0.strategy(), CommandStrategy::Fast);
        assert_eq!(calls[1].0.strategy(), CommandStrategy::Fallback);
        assert!(!calls[1].0.is_stream_copy());
    }

    #[tokio::test]
    async fn test_trim_fallback_failure_is_not_retried_again() {
        let orch = orchestrator(vec![
            failed(1, "Could not find tag for codec"),
            failed(1, "Invalid argument"),
        ]);
        let err = orch.trim(&mp3("song.mp3"), 0.0, 5.0).await.unwrap_err();

        assert!(matches!(err, MediaError::ProcessingFailed { exit_code: Some(1), .. }));
        assert_eq!(orch.executor().calls().len(), 2);
    }

    #[tokio::test]
    async fn test_trim_unclassified_failure_does_not_retry() {
        let orch = orchestrator(vec![failed(1, "pipe:0: Permission denied")]);
        let err = orch.trim(&mp3("song.mp3"), 0.0, 5.0).await.unwrap_err();

        match err {
            MediaError::ProcessingFailed { diagnostics, .. } => {
                assert_eq!(diagnostics, "pipe:0: Permission denied")
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(orch.executor().calls().len(), 1);
    }

    #[tokio::test]
    async fn test_timeout_is_terminal_and_returns_no_bytes() {
        let orch = orchestrator(vec![Ok(ProcessOutcome::timed_out(Duration::from_secs(300)))]);
        let err = orch.trim(&mp3("song.mp3"), 0.0, 5.0).await.unwrap_err();

        assert!(matches!(err, MediaError::ProcessingTimeout(d) if d == Duration::from_secs(300)));
        assert_eq!(err.status_code(), 504);
        assert_eq!(orch.executor().calls().len(), 1);
    }

    #[tokio::test]
    async fn test_spawn_failure_is_not_retried() {
        let orch = orchestrator(vec![Err(MediaError::spawn_failed("ffmpeg", "not found"))]);
        let err = orch.trim(&mp3("song.mp3"), 0.0, 5.0).await.unwrap_err();

        assert!(matches!(err, MediaError::ProcessSpawnFailed { .. }));
        assert_eq!(orch.executor().calls().len(), 1);
    }

    #[tokio::test]
    async fn test_diagnostics_are_truncated() {
        let stderr = format!("{}tail", "x".repeat(5000));
        let orch = orchestrator(vec![failed(1, &stderr)]);
        let err = orch.convert(&mp3("a.mp3"), AudioFormat::Wav).await.unwrap_err();

        match err {
            MediaError::ProcessingFailed { diagnostics, .. } => {
                assert_eq!(diagnostics.chars().count(), 2000);
                assert!(diagnostics.ends_with("tail"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_empty_output_is_failure() {
        let orch = orchestrator(vec![ok(b"")]);
        let err = orch.convert(&mp3("a.mp3"), AudioFormat::Flac).await.unwrap_err();
        assert!(matches!(err, MediaError::ProcessingFailed { exit_code: Some(0), .. }));
    }

    const STEREO_44K: &str = r#"{"streams":[{"codec_type":"audio","sample_rate":"44100","channels":2}]}"#;
    const STEREO_48K: &str = r#"{"streams":[{"codec_type":"audio","sample_rate":"48000","channels":2}]}"#;

    #[tokio::test]
    async fn test_merge_concatenates_uniform_mp3() {
        let orch = orchestrator(vec![probe_json(STEREO_44K), probe_json(STEREO_44K), ok(b"merged")]);
        let inputs = [mp3("a.mp3"), mp3("b.mp3")];
        let output = orch.merge(&inputs, AudioFormat::Mp3).await.unwrap();

        assert_eq!(output.filename, "merged.mp3");
        let calls = orch.executor().calls();
        assert_eq!(calls.len(), 3);
        assert_eq!(calls[0].0.tool(), Tool::Probe);
        assert_eq!(calls[0].0.operation(), Some(OperationKind::Merge));
        assert_eq!(calls[2].1, inputs[0].data().len() + inputs[1].data().len());
        assert_eq!(calls[2].0.input_format(), Some(MediaFormat::Audio(AudioFormat::Mp3)));
    }

    #[tokio::test]
    async fn test_merge_same_format_different_rates_resamples() {
        let orch = orchestrator(vec![
            probe_json(STEREO_44K),
            probe_json(STEREO_48K),
            ok(&[1, 2]),
            ok(&[3, 4]),
            ok(b"final"),
        ]);
        let inputs = [mp3("a44k.mp3"), mp3("b48k.mp3")];
        let output = orch.merge(&inputs, AudioFormat::Mp3).await.unwrap();

        assert_eq!(output.data, b"final");
        let calls = orch.executor().calls();
        assert_eq!(calls.len(), 5);
        assert!(calls[2].0.args().contains(&"48000".to_string()));
        assert!(calls[3].0.args().contains(&"48000".to_string()));
        assert!(calls[4].0.args().windows(2).any(|w| w[0] == "-f" && w[1] == "s16le"));
        assert_eq!(calls[4].1, 4);
    }

    #[tokio::test]
    async fn test_merge_unknown_layout_is_not_concatenated() {
        let orch = orchestrator(vec![
            probe_json(STEREO_44K),
            failed(1, "probe failed"),
            ok(&[0; 4]),
            ok(&[0; 4]),
            ok(b"final"),
        ]);
        let inputs = [mp3("a.mp3"), mp3("b.mp3")];
        orch.merge(&inputs, AudioFormat::Mp3).await.unwrap();

        let calls = orch.executor().calls();
        assert_eq!(calls.len(), 5);
        assert!(calls[2].0.args().contains(&"44100".to_string()));
    }

    #[test]
    fn test_uniform_stream_layout() {
        let info = |rate, channels| {
            Some(MediaInfo {
                has_audio: true,
                sample_rate: Some(rate),
                channels: Some(channels),
                ..MediaInfo::default()
            })
        };
        assert!(uniform_stream_layout(&[info(44_100, 2), info(44_100, 2)]));
        assert!(!uniform_stream_layout(&[info(44_100, 2), info(44_100, 1)]));
        assert!(!uniform_stream_layout(&[info(44_100, 2), None]));
        assert_eq!(highest_sample_rate(&[info(22_050, 1), None, info(48_000, 2)]), 48_000);
        assert_eq!(highest_sample_rate(&[None, None]), DEFAULT_SAMPLE_RATE);
    }

    #[tokio::test]
    async fn test_convert_uses_detected_demuxer() {
        let orch = orchestrator(vec![ok(b"mp3 bytes")]);
        let adts = admit(
            UploadedPayload::new(vec![0xFF, 0xF1, 0x50, 0x80, 0x02, 0x1F, 0xFC], "song.mp3"),
            MediaKind::Audio,
        );
        orch.convert(&adts, AudioFormat::Wav).await.unwrap();

        let calls = orch.executor().calls();
        let args = calls[0].0.args();
        let input_pos = args.iter().position(|a| a == "pipe:0").unwrap();
        assert_eq!(&args[input_pos - 3..input_pos], &["-f", "aac", "-i"]);
        assert_eq!(calls[0].0.input_format(), Some(MediaFormat::Audio(AudioFormat::Aac)));
    }

    #[tokio::test]
    async fn test_split_probe_failure_is_truncated() {
        let stderr = format!("{}moov atom not found", "x".repeat(10_000));
        let orch = orchestrator(vec![failed(1, &stderr)]);
        let err = orch
            .split(&mp3("talk.mp3"), &SplitMode::Interval { seconds: 10 })
            .await
            .unwrap_err();

        match err {
            MediaError::ProcessingFailed { diagnostics, .. } => {
                assert_eq!(diagnostics.chars().count(), 2000);
                assert!(diagnostics.ends_with("moov atom not found"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_merge_mixed_formats_uses_pcm_at_highest_rate() {
        let orch = orchestrator(vec![
            probe_json(r#"{"streams":[{"codec_type":"audio","sample_rate":"44100"}]}"#),
            probe_json(r#"{"streams":[{"codec_type":"audio","sample_rate":"48000"}]}"#),
            ok(&[1, 2, 3, 4]),
            ok(&[5, 6]),
            ok(b"final"),
        ]);
        let inputs = [mp3("a.mp3"), wav("b.wav")];
        let output = orch.merge(&inputs, AudioFormat::Flac).await.unwrap();

        assert_eq!(output.data, b"final");
        let calls = orch.executor().calls();
        assert_eq!(calls.len(), 5);
        assert_eq!(calls[0].0.tool(), Tool::Probe);
        assert!(calls[2].0.args().contains(&"48000".to_string()));
        assert!(calls[3].0.args().contains(&"48000".to_string()));
        // Final encode receives both PCM streams in order
        assert_eq!(calls[4].1, 6);
        assert!(calls[4].0.args().windows(2).any(|w| w[0] == "-f" && w[1] == "s16le"));
    }

    #[tokio::test]
    async fn test_merge_defaults_sample_rate_when_probe_fails() {
        let orch = orchestrator(vec![
            failed(1, "probe failed"),
            failed(1, "probe failed"),
            ok(&[0; 4]),
            ok(&[0; 4]),
            ok(b"final"),
        ]);
        let inputs = [wav("a.wav"), wav("b.wav")];
        orch.merge(&inputs, AudioFormat::Mp3).await.unwrap();

        let calls = orch.executor().calls();
        assert!(calls[2].0.args().contains(&"44100".to_string()));
    }

    #[tokio::test]
    async fn test_compress_bypasses_low_bitrate_input() {
        let orch = orchestrator(vec![probe_json(
            r#"{"streams":[{"codec_type":"audio","bit_rate":"128000"}]}"#,
        )]);
        let input = mp3("low.mp3");
        let output = orch
            .compress(&input, CompressionQuality::Level(CompressionLevel::Medium))
            .await
            .unwrap();

        assert_eq!(output.data, input.data());
        assert_eq!(orch.executor().calls().len(), 1);
    }

    #[tokio::test]
    async fn test_compress_wav_becomes_mp3() {
        let orch = orchestrator(vec![
            probe_json(r#"{"streams":[{"codec_type":"audio","bit_rate":"1411200"}]}"#),
            ok(b"mp3 bytes"),
        ]);
        let output = orch
            .compress(&wav("take.wav"), CompressionQuality::Level(CompressionLevel::High))
            .await
            .unwrap();

        assert_eq!(output.format, AudioFormat::Mp3);
        assert_eq!(output.filename, "take_compressed.mp3");
    }

    #[tokio::test]
    async fn test_extract_rejects_video_without_audio() {
        let orch = orchestrator(vec![probe_json(
            r#"{"streams":[{"codec_type":"video","codec_name":"h264"}]}"#,
        )]);
        let err = orch.extract_audio(&mp4("silent.mp4"), AudioFormat::Mp3).await.unwrap_err();

        assert!(matches!(err, MediaError::NoAudioTrack));
        assert_eq!(err.status_code(), 400);
        assert_eq!(orch.executor().calls().len(), 1);
    }

    #[tokio::test]
    async fn test_extract_maps_missing_stream_failure() {
        let orch = orchestrator(vec![
            failed(1, "moov atom not found"),
            failed(1, "Stream map '0:a:0' matches no streams."),
        ]);
        let err = orch.extract_audio(&mp4("clip.mp4"), AudioFormat::Wav).await.unwrap_err();
        assert!(matches!(err, MediaError::NoAudioTrack));
    }

    #[tokio::test]
    async fn test_split_by_interval() {
        let orch = orchestrator(vec![
            probe_json(r#"{"streams":[{"codec_type":"audio"}],"format":{"duration":"25.0"}}"#),
            ok(b"1"),
            ok(b"2"),
            ok(b"3"),
        ]);
        let outputs = orch
            .split(&mp3("talk.mp3"), &SplitMode::Interval { seconds: 10 })
            .await
            .unwrap();

        let names: Vec<_> = outputs.iter().map(|o| o.filename.as_str()).collect();
        assert_eq!(names, vec!["talk_segment_1.mp3", "talk_segment_2.mp3", "talk_segment_3.mp3"]);
        let calls = orch.executor().calls();
        assert!(calls[3].0.args().windows(2).any(|w| w[0] == "-t" && w[1] == "5.000"));
    }

    #[tokio::test]
    async fn test_split_segments_skips_empty_ranges() {
        let orch = orchestrator(vec![ok(b"intro")]);
        let mode = SplitMode::Segments {
            segments: vec![
                SplitSegment { start: 0.0, end: 5.0, name: Some("in/tro".to_string()) },
                SplitSegment { start: 8.0, end: 8.0, name: None },
            ],
        };
        let outputs = orch.split(&mp3("talk.mp3"), &mode).await.unwrap();

        assert_eq!(outputs.len(), 1);
        assert_eq!(outputs[0].filename, "tro.mp3");
    }

    #[tokio::test]
    async fn test_change_speed_probes_rate_without_pitch() {
        let orch = orchestrator(vec![
            probe_json(r#"{"streams":[{"codec_type":"audio","sample_rate":"48000"}]}"#),
            ok(b"fast"),
        ]);
        let output = orch.change_speed(&mp3("a.mp3"), 1.5, false).await.unwrap();

        assert_eq!(output.filename, "a_1.5x.mp3");
        let calls = orch.executor().calls();
        assert!(calls[1]
            .0
            .args()
            .contains(&"asetrate=72000,aresample=48000".to_string()));
    }

    #[tokio::test]
    async fn test_adjust_volume() {
        let orch = orchestrator(vec![ok(b"louder")]);
        let output = orch
            .adjust_volume(&wav("a.wav"), &VolumeAdjustment::Percentage(150))
            .await
            .unwrap();
        assert_eq!(output.format, AudioFormat::Wav);
        assert!(orch.executor().calls()[0].0.args().contains(&"volume=1.5".to_string()));
    }

    #[test]
    fn test_interval_pieces() {
        assert_eq!(interval_pieces(25.0, 10.0), vec![(0.0, 10.0), (10.0, 10.0), (20.0, 5.0)]);
        assert_eq!(interval_pieces(20.0, 10.0).len(), 2);
        assert!(interval_pieces(0.0, 10.0).is_empty());
    }
}
