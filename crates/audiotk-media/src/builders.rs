//! Per-operation command builders.
//!
//! Pure functions from operation parameters to a [`TranscodeCommand`]; no
//! process is involved, so argument assembly is testable on its own.

use audiotk_models::encoding::{FALLBACK_AUDIO_BITRATE, INTERMEDIATE_CHANNELS};
use audiotk_models::{
    AudioFormat, CodecProfile, CompressionQuality, MediaFormat, OperationKind, VideoFormat,
    VolumeAdjustment,
};

use crate::command::{CommandStrategy, FfmpegArgs, TranscodeCommand};
use crate::filters;

/// Sample format of the merge intermediate.
pub const PCM_MUXER: &str = "s16le";
const PCM_CODEC: &str = "pcm_s16le";

/// Audio input of a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioSource {
    /// Format that picks codecs and output muxers
    pub format: AudioFormat,
    /// Whether the content itself identified `format`
    pub detected: bool,
}

impl AudioSource {
    pub fn detected(format: AudioFormat) -> Self {
        Self {
            format,
            detected: true,
        }
    }

    /// Format known only from the declared extension; FFmpeg probes the input itself.
    pub fn assumed(format: AudioFormat) -> Self {
        Self {
            format,
            detected: false,
        }
    }

    /// Demuxer hint to pass with `-f`, only for recognised content.
    pub fn hint(&self) -> Option<MediaFormat> {
        self.detected.then_some(MediaFormat::Audio(self.format))
    }
}

impl From<AudioFormat> for AudioSource {
    fn from(format: AudioFormat) -> Self {
        Self::detected(format)
    }
}

/// What a merge feeds the final encode.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MergeInput {
    /// Byte-concatenated frames of one format
    Concatenated(AudioFormat),
    /// Concatenated raw PCM at the given sample rate
    Pcm { sample_rate: u32 },
}

fn args_for(target: AudioFormat) -> FfmpegArgs {
    let args = FfmpegArgs::new(target.muxer());
    if target.needs_fragmented_output() {
        args.fragmented()
    } else {
        args
    }
}

fn demux(args: FfmpegArgs, hint: Option<MediaFormat>) -> FfmpegArgs {
    match hint {
        Some(format) => args.input_format(format.input_demuxer()),
        None => args,
    }
}

fn with_profile(args: FfmpegArgs, profile: &CodecProfile) -> FfmpegArgs {
    args.output_args(profile.to_ffmpeg_args())
}

fn audio_command(
    operation: OperationKind,
    args: FfmpegArgs,
    input: Option<MediaFormat>,
    output: AudioFormat,
) -> TranscodeCommand {
    let command = TranscodeCommand::transcode(args)
        .with_operation(operation)
        .with_output_format(output);
    match input {
        Some(format) => command.with_input_format(format),
        None => command,
    }
}

/// Re-encode into `target` with its quality profile, keeping metadata.
pub fn build_convert(source: impl Into<AudioSource>, target: AudioFormat) -> TranscodeCommand {
    let source = source.into();
    let mut args = demux(args_for(target), source.hint())
        .no_video()
        .output_args(["-map_metadata", "0"]);
    if target == AudioFormat::Mp3 {
        args = args.output_args(["-id3v2_version", "3"]);
    }
    let args = with_profile(args, &CodecProfile::for_format(target));
    audio_command(OperationKind::Convert, args, source.hint(), target)
}

/// Stream-copy cut of `[start, end)`.
pub fn build_trim(source: impl Into<AudioSource>, start: f64, end: f64) -> TranscodeCommand {
    let source = source.into();
    let format = source.format;
    let args = demux(args_for(format), source.hint())
        .seek(start)
        .duration(end - start)
        .no_video()
        .audio_codec("copy");
    audio_command(OperationKind::Trim, args, source.hint(), format)
        .with_strategy(CommandStrategy::Fast)
}

/// Re-encoding cut used after a failed stream copy.
pub fn build_trim_fallback(source: impl Into<AudioSource>, start: f64, end: f64) -> TranscodeCommand {
    let source = source.into();
    let format = source.format;
    let args = demux(args_for(format), source.hint())
        .seek(start)
        .duration(end - start)
        .no_video();
    let args = with_profile(args, &CodecProfile::with_bitrate(format, FALLBACK_AUDIO_BITRATE));
    audio_command(OperationKind::Trim, args, source.hint(), format)
        .with_strategy(CommandStrategy::Fallback)
}

/// Decode one merge input to the raw PCM intermediate.
pub fn build_normalize(input: impl Into<AudioSource>, sample_rate: u32) -> TranscodeCommand {
    let input = input.into();
    let args = demux(FfmpegArgs::new(PCM_MUXER), input.hint())
        .no_video()
        .audio_codec(PCM_CODEC)
        .sample_rate(sample_rate)
        .channels(INTERMEDIATE_CHANNELS);
    let command = TranscodeCommand::transcode(args).with_operation(OperationKind::Merge);
    match input.hint() {
        Some(format) => command.with_input_format(format),
        None => command,
    }
}

/// Final encode of a merge.
pub fn build_merge(input: MergeInput, target: AudioFormat) -> TranscodeCommand {
    let args = match input {
        MergeInput::Concatenated(format) => {
            args_for(target).input_format(MediaFormat::Audio(format).input_demuxer())
        }
        MergeInput::Pcm { sample_rate } => args_for(target)
            .input_format(PCM_MUXER)
            .input_args(["-ar".to_string(), sample_rate.to_string()])
            .input_args(["-ac".to_string(), INTERMEDIATE_CHANNELS.to_string()]),
    };
    let args = with_profile(args.no_video(), &CodecProfile::for_format(target));

    let command = TranscodeCommand::transcode(args)
        .with_operation(OperationKind::Merge)
        .with_output_format(target);
    match input {
        MergeInput::Concatenated(format) => command.with_input_format(MediaFormat::Audio(format)),
        MergeInput::Pcm { .. } => command,
    }
}

/// Output format a compression of `source` produces.
///
/// Lossless sources have no meaningful bitrate to lower and become MP3.
pub fn compressed_format(source: AudioFormat) -> AudioFormat {
    if source.is_lossless() {
        AudioFormat::Mp3
    } else {
        source
    }
}

/// Re-encode at a lower bitrate.
pub fn build_compress(source: impl Into<AudioSource>, quality: CompressionQuality) -> TranscodeCommand {
    let source = source.into();
    let target = compressed_format(source.format);
    let args = demux(args_for(target), source.hint()).no_video();

    let args = match target {
        AudioFormat::Ogg => args
            .audio_codec("libvorbis")
            .output_args(["-q:a", quality.vorbis_quality()]),
        AudioFormat::Aac | AudioFormat::M4a => {
            args.audio_codec("aac").audio_bitrate(quality.ffmpeg_bitrate())
        }
        _ => args
            .audio_codec("libmp3lame")
            .audio_bitrate(quality.ffmpeg_bitrate()),
    };
    audio_command(OperationKind::Compress, args, source.hint(), target)
}

/// Pull the first audio stream out of a video container.
pub fn build_extract(video: VideoFormat, target: AudioFormat) -> TranscodeCommand {
    let input = MediaFormat::Video(video);
    let args = args_for(target)
        .input_format(input.input_demuxer())
        .no_video()
        .output_args(["-map", "0:a:0"]);
    let args = with_profile(args, &CodecProfile::for_format(target));
    audio_command(OperationKind::Extract, args, Some(input), target)
}

/// Stream-copy one piece of a split.
pub fn build_split_segment(source: impl Into<AudioSource>, start: f64, duration: f64) -> TranscodeCommand {
    let source = source.into();
    let format = source.format;
    let args = demux(args_for(format), source.hint())
        .seek(start)
        .duration(duration)
        .no_video()
        .audio_codec("copy");
    audio_command(OperationKind::Split, args, source.hint(), format)
}

/// Apply a volume filter, re-encoding in the source format.
pub fn build_adjust_volume(
    source: impl Into<AudioSource>,
    adjustment: &VolumeAdjustment,
) -> TranscodeCommand {
    let source = source.into();
    let format = source.format;
    let args = demux(args_for(format), source.hint())
        .no_video()
        .audio_filter(filters::volume_filter(adjustment));
    let args = with_profile(args, &CodecProfile::for_format(format));
    audio_command(OperationKind::AdjustVolume, args, source.hint(), format)
}

/// Change playback speed, re-encoding in the source format.
///
/// `sample_rate` is only used when pitch is not preserved.
pub fn build_change_speed(
    source: impl Into<AudioSource>,
    speed: f64,
    preserve_pitch: bool,
    sample_rate: u32,
) -> TranscodeCommand {
    let filter = if preserve_pitch {
        filters::atempo_filter(speed)
    } else {
        filters::resample_speed_filter(speed, sample_rate)
    };
    let source = source.into();
    let format = source.format;
    let args = demux(args_for(format), source.hint())
        .no_video()
        .audio_filter(filter);
    let args = with_profile(args, &CodecProfile::for_format(format));
    audio_command(OperationKind::ChangeSpeed, args, source.hint(), format)
}
