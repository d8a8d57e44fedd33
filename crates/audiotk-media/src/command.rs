//! Transcoder invocations and the process runner.
//!
//! Every invocation reads its input from stdin and writes its result to
//! stdout. The runner pumps all three pipes concurrently so a child that
//! fills its stdout buffer before consuming all of stdin cannot deadlock.

use std::fmt;
use std::io::ErrorKind;
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use audiotk_models::{AudioFormat, MediaFormat, OperationKind};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{ChildStdin, Command};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::error::{MediaError, MediaResult};
use crate::metrics::{self, AttemptOutcome};

/// External binary an invocation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tool {
    Transcoder,
    Probe,
}

impl Tool {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tool::Transcoder => "ffmpeg",
            Tool::Probe => "ffprobe",
        }
    }
}

/// How an invocation treats the audio stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandStrategy {
    /// Stream copy, no re-encode
    Fast,
    /// Re-encode after a failed stream copy
    Fallback,
    /// Single-path operation
    Standard,
}

impl CommandStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommandStrategy::Fast => "fast",
            CommandStrategy::Fallback => "fallback",
            CommandStrategy::Standard => "standard",
        }
    }
}

impl fmt::Display for CommandStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Builder for FFmpeg arguments with piped input and output.
#[derive(Debug, Clone)]
pub struct FfmpegArgs {
    /// Input arguments (before -i)
    input_args: Vec<String>,
    /// Output arguments (after -i)
    output_args: Vec<String>,
    /// Muxer for the piped output
    muxer: String,
    /// Log level
    log_level: String,
}

impl FfmpegArgs {
    /// Start a command whose output is muxed with `muxer`.
    pub fn new(muxer: impl Into<String>) -> Self {
        Self {
            input_args: Vec::new(),
            output_args: Vec::new(),
            muxer: muxer.into(),
            log_level: "error".to_string(),
        }
    }

    /// Add input arguments (before -i).
    pub fn input_arg(mut self, arg: impl Into<String>) -> Self {
        self.input_args.push(arg.into());
        self
    }

    /// Add multiple input arguments.
    pub fn input_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.input_args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Add output arguments (after -i).
    pub fn output_arg(mut self, arg: impl Into<String>) -> Self {
        self.output_args.push(arg.into());
        self
    }

    /// Add multiple output arguments.
    pub fn output_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.output_args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Declare the demuxer of the piped input.
    pub fn input_format(self, demuxer: impl Into<String>) -> Self {
        self.input_arg("-f").input_arg(demuxer)
    }

    /// Start position in the input.
    pub fn seek(self, seconds: f64) -> Self {
        self.output_arg("-ss").output_arg(format!("{:.3}", seconds))
    }

    /// Limit output duration.
    pub fn duration(self, seconds: f64) -> Self {
        self.output_arg("-t").output_arg(format!("{:.3}", seconds))
    }

    /// Drop any video or cover-art stream.
    pub fn no_video(self) -> Self {
        self.output_arg("-vn")
    }

    /// Set audio codec.
    pub fn audio_codec(self, codec: impl Into<String>) -> Self {
        self.output_arg("-c:a").output_arg(codec)
    }

    /// Set audio bitrate.
    pub fn audio_bitrate(self, bitrate: impl Into<String>) -> Self {
        self.output_arg("-b:a").output_arg(bitrate)
    }

    /// Set audio filter.
    pub fn audio_filter(self, filter: impl Into<String>) -> Self {
        self.output_arg("-af").output_arg(filter)
    }

    /// Set output sample rate.
    pub fn sample_rate(self, rate: u32) -> Self {
        self.output_arg("-ar").output_arg(rate.to_string())
    }

    /// Set output channel count.
    pub fn channels(self, channels: u32) -> Self {
        self.output_arg("-ac").output_arg(channels.to_string())
    }

    /// Write MP4-family output that needs no seeking.
    pub fn fragmented(self) -> Self {
        self.output_arg("-movflags").output_arg("frag_keyframe+empty_moov")
    }

    /// Set log level.
    pub fn log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    /// Build the command arguments.
    pub fn build_args(&self) -> Vec<String> {
        let mut args = vec![
            "-hide_banner".to_string(),
            "-nostats".to_string(),
            "-v".to_string(),
            self.log_level.clone(),
        ];

        args.extend(self.input_args.clone());
        args.push("-i".to_string());
        args.push("pipe:0".to_string());

        args.extend(self.output_args.clone());
        args.push("-f".to_string());
        args.push(self.muxer.clone());
        args.push("pipe:1".to_string());

        args
    }
}

/// A fully assembled process invocation.
#[derive(Debug, Clone)]
pub struct TranscodeCommand {
    tool: Tool,
    args: Vec<String>,
    operation: Option<OperationKind>,
    strategy: CommandStrategy,
    input_format: Option<MediaFormat>,
    output_format: Option<AudioFormat>,
    timeout: Option<Duration>,
}

impl TranscodeCommand {
    /// Invocation of `tool` with literal arguments.
    pub fn new<I, S>(tool: Tool, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            tool,
            args: args.into_iter().map(Into::into).collect(),
            operation: None,
            strategy: CommandStrategy::Standard,
            input_format: None,
            output_format: None,
            timeout: None,
        }
    }

    /// Transcoder invocation from a builder.
    pub fn transcode(args: FfmpegArgs) -> Self {
        Self::new(Tool::Transcoder, args.build_args())
    }

    pub fn with_operation(mut self, operation: OperationKind) -> Self {
        self.operation = Some(operation);
        self
    }

    pub fn with_strategy(mut self, strategy: CommandStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_input_format(mut self, format: MediaFormat) -> Self {
        self.input_format = Some(format);
        self
    }

    pub fn with_output_format(mut self, format: AudioFormat) -> Self {
        self.output_format = Some(format);
        self
    }

    /// Override the runner's default deadline for this invocation.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn tool(&self) -> Tool {
        self.tool
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Operation the invocation serves, if any.
    pub fn operation(&self) -> Option<OperationKind> {
        self.operation
    }

    pub fn strategy(&self) -> CommandStrategy {
        self.strategy
    }

    pub fn input_format(&self) -> Option<MediaFormat> {
        self.input_format
    }

    pub fn output_format(&self) -> Option<AudioFormat> {
        self.output_format
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Whether the invocation copies streams without re-encoding.
    pub fn is_stream_copy(&self) -> bool {
        self.args.windows(2).any(|w| w[0] == "-c:a" && w[1] == "copy")
    }
}

/// What a finished (or abandoned) process left behind.
#[derive(Debug, Clone, Default)]
pub struct ProcessOutcome {
    /// Exit code; `None` when killed by a signal or timed out
    pub exit_code: Option<i32>,
    pub stdout: Vec<u8>,
    pub stderr: String,
    pub elapsed: Duration,
    pub timed_out: bool,
}

impl ProcessOutcome {
    /// Outcome of a process killed at its deadline. Partial output is discarded.
    pub fn timed_out(elapsed: Duration) -> Self {
        Self {
            elapsed,
            timed_out: true,
            ..Self::default()
        }
    }

    pub fn success(&self) -> bool {
        !self.timed_out && self.exit_code == Some(0)
    }
}

/// Runs an assembled invocation against an input buffer.
#[async_trait]
pub trait ProcessExecutor: Send + Sync {
    async fn execute(&self, command: &TranscodeCommand, input: &[u8]) -> MediaResult<ProcessOutcome>;
}

/// Production executor spawning the configured binaries.
#[derive(Debug, Clone)]
pub struct TranscodeRunner {
    ffmpeg_path: String,
    ffprobe_path: String,
    timeout: Duration,
    /// Cancellation signal receiver
    cancel_rx: Option<watch::Receiver<bool>>,
}

impl TranscodeRunner {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            ffmpeg_path: config.ffmpeg_path.clone(),
            ffprobe_path: config.ffprobe_path.clone(),
            timeout: config.process_timeout,
            cancel_rx: None,
        }
    }

    /// Set cancellation signal.
    pub fn with_cancel(mut self, cancel_rx: watch::Receiver<bool>) -> Self {
        self.cancel_rx = Some(cancel_rx);
        self
    }

    /// Set the default deadline.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn program(&self, tool: Tool) -> &str {
        match tool {
            Tool::Transcoder => &self.ffmpeg_path,
            Tool::Probe => &self.ffprobe_path,
        }
    }
}

struct Pumped {
    written: std::io::Result<()>,
    stdout: std::io::Result<Vec<u8>>,
    stderr: std::io::Result<Vec<u8>>,
    status: std::io::Result<ExitStatus>,
}

enum Completion {
    Exited(Pumped),
    TimedOut,
    Cancelled,
}

#[async_trait]
impl ProcessExecutor for TranscodeRunner {
    async fn execute(&self, command: &TranscodeCommand, input: &[u8]) -> MediaResult<ProcessOutcome> {
        let program = self.program(command.tool());
        let timeout = command.timeout().unwrap_or(self.timeout);

        debug!(
            program = %program,
            strategy = %command.strategy(),
            input_bytes = input.len(),
            "Running: {} {}",
            program,
            command.args().join(" ")
        );

        let started = Instant::now();
        let mut child = Command::new(program)
            .args(command.args())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| MediaError::spawn_failed(program, e.to_string()))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| MediaError::internal("child stdin not captured"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| MediaError::internal("child stdout not captured"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| MediaError::internal("child stderr not captured"))?;

        let completion = {
            let pump = async {
                let (written, stdout, stderr) =
                    tokio::join!(feed_stdin(stdin, input), drain(stdout), drain(stderr));
                let status = child.wait().await;
                Pumped {
                    written,
                    stdout,
                    stderr,
                    status,
                }
            };

            tokio::select! {
                result = tokio::time::timeout(timeout, pump) => match result {
                    Ok(pumped) => Completion::Exited(pumped),
                    Err(_) => Completion::TimedOut,
                },
                _ = wait_for_cancel(self.cancel_rx.clone()) => Completion::Cancelled,
            }
        };

        match completion {
            Completion::TimedOut => {
                warn!(
                    program = %program,
                    timeout_secs = timeout.as_secs_f64(),
                    "Process timed out, killing"
                );
                // kill() also reaps the child
                let _ = child.kill().await;
                let elapsed = started.elapsed();
                metrics::record_transcode_attempt(
                    command.operation(),
                    command.tool(),
                    command.strategy(),
                    AttemptOutcome::TimedOut,
                    elapsed,
                );
                Ok(ProcessOutcome::timed_out(elapsed))
            }
            Completion::Cancelled => {
                info!(program = %program, "Process cancelled, killing");
                let _ = child.kill().await;
                metrics::record_transcode_attempt(
                    command.operation(),
                    command.tool(),
                    command.strategy(),
                    AttemptOutcome::Cancelled,
                    started.elapsed(),
                );
                Err(MediaError::Cancelled)
            }
            Completion::Exited(pumped) => {
                let elapsed = started.elapsed();
                pumped.written?;
                let stdout = pumped.stdout?;
                let stderr = pumped.stderr?;
                let status = pumped.status?;

                let outcome = ProcessOutcome {
                    exit_code: status.code(),
                    stdout,
                    stderr: String::from_utf8_lossy(&stderr).into_owned(),
                    elapsed,
                    timed_out: false,
                };

                let label = if outcome.success() {
                    AttemptOutcome::Success
                } else {
                    AttemptOutcome::Failed
                };
                metrics::record_transcode_attempt(
                    command.operation(),
                    command.tool(),
                    command.strategy(),
                    label,
                    elapsed,
                );

                debug!(
                    program = %program,
                    exit_code = ?outcome.exit_code,
                    elapsed_ms = elapsed.as_millis() as u64,
                    output_bytes = outcome.stdout.len(),
                    "Process finished"
                );
                Ok(outcome)
            }
        }
    }
}

/// Write the whole input, then close stdin so the child sees EOF.
///
/// A child may legitimately stop reading early (e.g. after `-t`), so a
/// broken pipe is not an error.
async fn feed_stdin(mut stdin: ChildStdin, input: &[u8]) -> std::io::Result<()> {
    let result = stdin.write_all(input).await;
    drop(stdin);
    match result {
        Err(e) if e.kind() == ErrorKind::BrokenPipe => Ok(()),
        other => other,
    }
}

async fn drain<R: AsyncRead + Unpin>(mut reader: R) -> std::io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    reader.read_to_end(&mut buf).await?;
    Ok(buf)
}

/// Resolve once the signal flips to `true`; never resolves without a signal.
async fn wait_for_cancel(cancel_rx: Option<watch::Receiver<bool>>) {
    let Some(mut rx) = cancel_rx else {
        return std::future::pending().await;
    };

    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            // Sender gone without cancelling
            return std::future::pending().await;
        }
    }
}

/// Keep at most `limit` characters of diagnostics, preferring the tail.
pub fn truncate_diagnostics(stderr: &str, limit: usize) -> String {
    let trimmed = stderr.trim();
    let count = trimmed.chars().count();
    if count <= limit {
        return trimmed.to_string();
    }
    trimmed.chars().skip(count - limit).collect()
}
