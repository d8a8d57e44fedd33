//! Operation requests handed to the engine by the routing layer.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::encoding::CompressionQuality;
use crate::format::AudioFormat;
use crate::payload::UploadedPayload;

/// Minimum playback speed multiplier.
pub const MIN_SPEED: f64 = 0.25;
/// Maximum playback speed multiplier.
pub const MAX_SPEED: f64 = 4.0;

/// One unit of work: the payload(s) plus operation-specific parameters.
#[derive(Debug, Clone)]
pub enum OperationRequest {
    Convert {
        payload: UploadedPayload,
        target: AudioFormat,
    },
    Trim {
        payload: UploadedPayload,
        start: f64,
        end: f64,
        /// Known total duration, used for bounds checking when present
        duration: Option<f64>,
    },
    Merge {
        payloads: Vec<UploadedPayload>,
        target: AudioFormat,
    },
    Compress {
        payload: UploadedPayload,
        quality: CompressionQuality,
    },
    Extract {
        video: UploadedPayload,
        target: AudioFormat,
    },
    Split {
        payload: UploadedPayload,
        mode: SplitMode,
    },
    AdjustVolume {
        payload: UploadedPayload,
        adjustment: VolumeAdjustment,
    },
    ChangeSpeed {
        payload: UploadedPayload,
        speed: f64,
        preserve_pitch: bool,
    },
}

impl OperationRequest {
    pub fn kind(&self) -> OperationKind {
        match self {
            OperationRequest::Convert { .. } => OperationKind::Convert,
            OperationRequest::Trim { .. } => OperationKind::Trim,
            OperationRequest::Merge { .. } => OperationKind::Merge,
            OperationRequest::Compress { .. } => OperationKind::Compress,
            OperationRequest::Extract { .. } => OperationKind::Extract,
            OperationRequest::Split { .. } => OperationKind::Split,
            OperationRequest::AdjustVolume { .. } => OperationKind::AdjustVolume,
            OperationRequest::ChangeSpeed { .. } => OperationKind::ChangeSpeed,
        }
    }
}

/// Operation discriminant, used for logging and metric labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Convert,
    Trim,
    Merge,
    Compress,
    Extract,
    Split,
    AdjustVolume,
    ChangeSpeed,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Convert => "convert",
            OperationKind::Trim => "trim",
            OperationKind::Merge => "merge",
            OperationKind::Compress => "compress",
            OperationKind::Extract => "extract",
            OperationKind::Split => "split",
            OperationKind::AdjustVolume => "adjust_volume",
            OperationKind::ChangeSpeed => "change_speed",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a split request divides its input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum SplitMode {
    /// Equal intervals of `seconds`; the last segment may be shorter
    Interval { seconds: u32 },
    /// Explicit, named ranges
    Segments { segments: Vec<SplitSegment> },
}

/// A named range of a split request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SplitSegment {
    pub start: f64,
    pub end: f64,
    #[serde(default)]
    pub name: Option<String>,
}

impl SplitSegment {
    pub fn duration(&self) -> f64 {
        self.end - self.start
    }
}

/// Volume change applied by an adjust-volume request.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "mode", content = "value", rename_all = "snake_case")]
pub enum VolumeAdjustment {
    /// 0..=500 percent of the original level
    Percentage(u32),
    /// -30..=30 dB
    Decibels(f64),
    /// Loudness normalisation to an integrated target of -20..=0 LUFS
    Normalize(f64),
}
