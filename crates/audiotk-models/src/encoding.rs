//! Audio encoding configuration.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::format::AudioFormat;

/// Bitrate used when a trim has to fall back to re-encoding.
pub const FALLBACK_AUDIO_BITRATE: &str = "192k";
/// Sample rate assumed when a probe cannot determine one.
pub const DEFAULT_SAMPLE_RATE: u32 = 44_100;
/// Channel count of the merge intermediate.
pub const INTERMEDIATE_CHANNELS: u32 = 2;

/// Codec arguments that keep quality high for a target format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct CodecProfile {
    /// FFmpeg audio encoder
    pub codec: String,
    /// Extra quality arguments (bitrate, VBR quality or compression level)
    pub quality_args: Vec<String>,
}

impl CodecProfile {
    /// Quality-preserving profile for conversions and extractions.
    pub fn for_format(format: AudioFormat) -> Self {
        let (codec, quality): (&str, Vec<&str>) = match format {
            AudioFormat::Mp3 => ("libmp3lame", vec!["-q:a", "0"]),
            AudioFormat::Wav => ("pcm_s16le", Vec::new()),
            AudioFormat::Flac => ("flac", vec!["-compression_level", "5"]),
            AudioFormat::Aac | AudioFormat::M4a => ("aac", vec!["-b:a", "256k"]),
            AudioFormat::Ogg => ("libvorbis", vec!["-q:a", "8"]),
        };
        Self {
            codec: codec.to_string(),
            quality_args: quality.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Profile with an explicit bitrate, used by the trim fallback.
    ///
    /// Lossless targets ignore the bitrate and keep their default profile.
    pub fn with_bitrate(format: AudioFormat, bitrate: &str) -> Self {
        match format {
            AudioFormat::Wav | AudioFormat::Flac => Self::for_format(format),
            _ => Self {
                codec: Self::for_format(format).codec,
                quality_args: vec!["-b:a".to_string(), bitrate.to_string()],
            },
        }
    }

    /// Convert to FFmpeg command arguments.
    pub fn to_ffmpeg_args(&self) -> Vec<String> {
        let mut args = vec!["-c:a".to_string(), self.codec.clone()];
        args.extend(self.quality_args.iter().cloned());
        args
    }
}

/// Named compression presets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum CompressionLevel {
    /// 320 kbps
    Low,
    /// 192 kbps
    Medium,
    /// 128 kbps
    High,
}

impl CompressionLevel {
    pub fn bitrate_kbps(&self) -> u32 {
        match self {
            CompressionLevel::Low => 320,
            CompressionLevel::Medium => 192,
            CompressionLevel::High => 128,
        }
    }
}

impl fmt::Display for CompressionLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompressionLevel::Low => f.write_str("low"),
            CompressionLevel::Medium => f.write_str("medium"),
            CompressionLevel::High => f.write_str("high"),
        }
    }
}

impl FromStr for CompressionLevel {
    type Err = CompressionLevelParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "low" => Ok(CompressionLevel::Low),
            "medium" => Ok(CompressionLevel::Medium),
            "high" => Ok(CompressionLevel::High),
            _ => Err(CompressionLevelParseError(s.to_string())),
        }
    }
}

#[derive(Debug, Error)]
#[error("Invalid compression level: {0}. Use low, medium or high")]
pub struct CompressionLevelParseError(String);

/// Target quality for a compression request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum CompressionQuality {
    Level(CompressionLevel),
    /// Explicit bitrate in kbps
    Bitrate(u32),
}

impl CompressionQuality {
    pub fn bitrate_kbps(&self) -> u32 {
        match self {
            CompressionQuality::Level(level) => level.bitrate_kbps(),
            CompressionQuality::Bitrate(kbps) => *kbps,
        }
    }

    /// Bitrate in FFmpeg notation, e.g. `192k`.
    pub fn ffmpeg_bitrate(&self) -> String {
        format!("{}k", self.bitrate_kbps())
    }

    /// Vorbis quality level approximating the target bitrate.
    pub fn vorbis_quality(&self) -> &'static str {
        match self.bitrate_kbps() {
            320 => "8",
            192 => "6",
            128 => "4",
            _ => "6",
        }
    }
}

impl From<CompressionLevel> for CompressionQuality {
    fn from(level: CompressionLevel) -> Self {
        CompressionQuality::Level(level)
    }
}
