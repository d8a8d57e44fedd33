//! Supported audio and video formats.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Audio formats accepted as input and produced as output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum AudioFormat {
    Mp3,
    Wav,
    Flac,
    Aac,
    Ogg,
    M4a,
}

impl AudioFormat {
    pub const ALL: &'static [AudioFormat] = &[
        AudioFormat::Mp3,
        AudioFormat::Wav,
        AudioFormat::Flac,
        AudioFormat::Aac,
        AudioFormat::Ogg,
        AudioFormat::M4a,
    ];

    /// File extension without the leading dot.
    pub fn extension(&self) -> &'static str {
        match self {
            AudioFormat::Mp3 => "mp3",
            AudioFormat::Wav => "wav",
            AudioFormat::Flac => "flac",
            AudioFormat::Aac => "aac",
            AudioFormat::Ogg => "ogg",
            AudioFormat::M4a => "m4a",
        }
    }

    /// MIME type reported to clients for output in this format.
    pub fn mime_type(&self) -> &'static str {
        match self {
            AudioFormat::Mp3 => "audio/mpeg",
            AudioFormat::Wav => "audio/wav",
            AudioFormat::Flac => "audio/flac",
            AudioFormat::Aac => "audio/aac",
            AudioFormat::Ogg => "audio/ogg",
            AudioFormat::M4a => "audio/mp4",
        }
    }

    /// FFmpeg muxer/demuxer name used with `-f` on a pipe.
    ///
    /// Raw AAC travels in an ADTS stream and M4A in an MP4 container.
    pub fn muxer(&self) -> &'static str {
        match self {
            AudioFormat::Mp3 => "mp3",
            AudioFormat::Wav => "wav",
            AudioFormat::Flac => "flac",
            AudioFormat::Aac => "adts",
            AudioFormat::Ogg => "ogg",
            AudioFormat::M4a => "mp4",
        }
    }

    /// MP4-family output cannot seek back on a pipe and must be fragmented.
    pub fn needs_fragmented_output(&self) -> bool {
        matches!(self, AudioFormat::M4a)
    }

    /// Whether independently encoded files can be joined by byte concatenation.
    ///
    /// MP3 and ADTS are self-synchronising frame streams; every other
    /// container carries a header that describes the whole file.
    pub fn is_frame_concatenable(&self) -> bool {
        matches!(self, AudioFormat::Mp3 | AudioFormat::Aac)
    }

    /// Whether the format stores audio without loss.
    pub fn is_lossless(&self) -> bool {
        matches!(self, AudioFormat::Wav | AudioFormat::Flac)
    }
}

impl fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for AudioFormat {
    type Err = FormatParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().trim_start_matches('.').to_lowercase().as_str() {
            "mp3" => Ok(AudioFormat::Mp3),
            "wav" => Ok(AudioFormat::Wav),
            "flac" => Ok(AudioFormat::Flac),
            "aac" => Ok(AudioFormat::Aac),
            "ogg" => Ok(AudioFormat::Ogg),
            "m4a" => Ok(AudioFormat::M4a),
            _ => Err(FormatParseError {
                kind: MediaKind::Audio,
                value: s.to_string(),
            }),
        }
    }
}

/// Video containers accepted for audio extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum VideoFormat {
    Mp4,
    Avi,
    Mkv,
    Mov,
    Webm,
}

impl VideoFormat {
    pub const ALL: &'static [VideoFormat] = &[
        VideoFormat::Mp4,
        VideoFormat::Avi,
        VideoFormat::Mkv,
        VideoFormat::Mov,
        VideoFormat::Webm,
    ];

    pub fn extension(&self) -> &'static str {
        match self {
            VideoFormat::Mp4 => "mp4",
            VideoFormat::Avi => "avi",
            VideoFormat::Mkv => "mkv",
            VideoFormat::Mov => "mov",
            VideoFormat::Webm => "webm",
        }
    }

    /// FFmpeg demuxer name for piped input.
    pub fn demuxer(&self) -> &'static str {
        match self {
            VideoFormat::Mp4 | VideoFormat::Mov => "mov",
            VideoFormat::Avi => "avi",
            VideoFormat::Mkv | VideoFormat::Webm => "matroska",
        }
    }
}

impl fmt::Display for VideoFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for VideoFormat {
    type Err = FormatParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().trim_start_matches('.').to_lowercase().as_str() {
            "mp4" => Ok(VideoFormat::Mp4),
            "avi" => Ok(VideoFormat::Avi),
            "mkv" => Ok(VideoFormat::Mkv),
            "mov" => Ok(VideoFormat::Mov),
            "webm" => Ok(VideoFormat::Webm),
            _ => Err(FormatParseError {
                kind: MediaKind::Video,
                value: s.to_string(),
            }),
        }
    }
}

/// Broad category of an uploaded payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Audio,
    Video,
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaKind::Audio => f.write_str("audio"),
            MediaKind::Video => f.write_str("video"),
        }
    }
}

/// A concrete audio or video format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "kind", content = "format", rename_all = "lowercase")]
pub enum MediaFormat {
    Audio(AudioFormat),
    Video(VideoFormat),
}

impl MediaFormat {
    pub fn kind(&self) -> MediaKind {
        match self {
            MediaFormat::Audio(_) => MediaKind::Audio,
            MediaFormat::Video(_) => MediaKind::Video,
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            MediaFormat::Audio(f) => f.extension(),
            MediaFormat::Video(f) => f.extension(),
        }
    }

    /// Demuxer hint passed with `-f` before `-i pipe:0`.
    pub fn input_demuxer(&self) -> &'static str {
        match self {
            MediaFormat::Audio(AudioFormat::Aac) => "aac",
            MediaFormat::Audio(AudioFormat::M4a) => "mov",
            MediaFormat::Audio(f) => f.muxer(),
            MediaFormat::Video(f) => f.demuxer(),
        }
    }

    /// Parse an extension as a format of the given kind.
    pub fn parse_as(kind: MediaKind, value: &str) -> Result<Self, FormatParseError> {
        match kind {
            MediaKind::Audio => value.parse().map(MediaFormat::Audio),
            MediaKind::Video => value.parse().map(MediaFormat::Video),
        }
    }

    pub fn as_audio(&self) -> Option<AudioFormat> {
        match self {
            MediaFormat::Audio(f) => Some(*f),
            MediaFormat::Video(_) => None,
        }
    }
}

impl fmt::Display for MediaFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unsupported {kind} format: {value}")]
pub struct FormatParseError {
    pub kind: MediaKind,
    pub value: String,
}
