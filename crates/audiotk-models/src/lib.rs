//! Shared data models for the audiotk media engine.
//!
//! This crate provides:
//! - Supported audio and video formats with their FFmpeg names
//! - Uploaded payloads and operation requests
//! - Compression presets and codec profiles
//! - Timestamp parsing

pub mod encoding;
pub mod format;
pub mod operation;
pub mod payload;
pub mod timestamp;

// Re-export common types
pub use encoding::{CodecProfile, CompressionLevel, CompressionQuality};
pub use format::{AudioFormat, FormatParseError, MediaFormat, MediaKind, VideoFormat};
pub use operation::{OperationKind, OperationRequest, SplitMode, SplitSegment, VolumeAdjustment};
pub use payload::UploadedPayload;
pub use timestamp::{format_seconds, parse_timestamp, TimestampError};
