//! Magic-number checks for uploaded payloads.
//!
//! Only the leading window of the payload is inspected. A format passes when
//! any of its markers appears inside that window.

use audiotk_models::{AudioFormat, MediaFormat, VideoFormat};

/// Number of leading bytes inspected for a signature.
pub const SIGNATURE_WINDOW: usize = 512;

const ID3: &[u8] = b"ID3";
const RIFF: &[u8] = b"RIFF";
const FLAC: &[u8] = b"fLaC";
const OGG: &[u8] = b"OggS";
const FTYP: &[u8] = b"ftyp";
const MOOV: &[u8] = b"moov";
const EBML: &[u8] = &[0x1A, 0x45, 0xDF, 0xA3];
const ADTS_MPEG4: &[u8] = &[0xFF, 0xF1];
const ADTS_MPEG2: &[u8] = &[0xFF, 0xF9];

/// Markers that identify a format family.
pub fn markers(format: MediaFormat) -> &'static [&'static [u8]] {
    match format {
        MediaFormat::Audio(AudioFormat::Mp3) => &[ID3],
        MediaFormat::Audio(AudioFormat::Wav) => &[RIFF],
        MediaFormat::Audio(AudioFormat::Flac) => &[FLAC],
        MediaFormat::Audio(AudioFormat::Aac) => &[ADTS_MPEG4, ADTS_MPEG2],
        MediaFormat::Audio(AudioFormat::Ogg) => &[OGG],
        MediaFormat::Audio(AudioFormat::M4a) => &[FTYP],
        MediaFormat::Video(VideoFormat::Mp4) | MediaFormat::Video(VideoFormat::Mov) => {
            &[FTYP, MOOV]
        }
        MediaFormat::Video(VideoFormat::Avi) => &[RIFF],
        MediaFormat::Video(VideoFormat::Mkv) | MediaFormat::Video(VideoFormat::Webm) => &[EBML],
    }
}

/// Check that the payload's leading bytes belong to the declared format.
pub fn matches_signature(format: MediaFormat, data: &[u8]) -> bool {
    let window = leading_window(data);

    if format == MediaFormat::Audio(AudioFormat::Mp3) {
        return window.starts_with(ID3) || has_mpeg_frame_sync(window);
    }

    markers(format).iter().any(|marker| contains(window, marker))
}

/// Best-effort detection of an audio format from content alone.
///
/// Container markers win over frame syncs. The first frame sync decides
/// between ADTS and MPEG audio by its layer bits.
pub fn sniff_audio_format(data: &[u8]) -> Option<AudioFormat> {
    let window = leading_window(data);

    if window.starts_with(FLAC) {
        Some(AudioFormat::Flac)
    } else if window.starts_with(OGG) {
        Some(AudioFormat::Ogg)
    } else if window.starts_with(RIFF) {
        Some(AudioFormat::Wav)
    } else if contains(window, FTYP) {
        Some(AudioFormat::M4a)
    } else if window.starts_with(ID3) {
        Some(AudioFormat::Mp3)
    } else {
        first_frame_sync(window)
    }
}

fn leading_window(data: &[u8]) -> &[u8] {
    &data[..data.len().min(SIGNATURE_WINDOW)]
}

/// An MPEG audio frame begins with eleven set bits.
fn has_mpeg_frame_sync(window: &[u8]) -> bool {
    window
        .windows(2)
        .any(|pair| pair[0] == 0xFF && pair[1] & 0xE0 == 0xE0)
}

/// ADTS is a twelve-bit sync with layer `00`, which MPEG audio never uses.
fn first_frame_sync(window: &[u8]) -> Option<AudioFormat> {
    window
        .windows(2)
        .find(|pair| pair[0] == 0xFF && pair[1] & 0xE0 == 0xE0)
        .map(|pair| {
            if pair[1] & 0xF6 == 0xF0 {
                AudioFormat::Aac
            } else {
                AudioFormat::Mp3
            }
        })
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    !needle.is_empty() && haystack.windows(needle.len()).any(|w| w == needle)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn audio(format: AudioFormat) -> MediaFormat {
        MediaFormat::Audio(format)
    }

    #[test]
    fn test_mp3_id3_and_frame_sync() {
        assert!(matches_signature(audio(AudioFormat::Mp3), b"ID3\x04\x00rest"));

        let mut framed = vec![0u8; 100];
        framed.extend_from_slice(&[0xFF, 0xFB, 0x90, 0x64]);
        assert!(matches_signature(audio(AudioFormat::Mp3), &framed));

        assert!(!matches_signature(audio(AudioFormat::Mp3), b"RIFF....WAVEfmt "));
    }

    #[test]
    fn test_marker_outside_window_is_ignored() {
        let mut data = vec![0u8; SIGNATURE_WINDOW];
        data.extend_from_slice(b"fLaC");
        assert!(!matches_signature(audio(AudioFormat::Flac), &data));
    }

    #[test]
    fn test_wav_rejects_png() {
        let png = b"\x89PNG\r\n\x1a\n\x00\x00\x00\rIHDR";
        assert!(!matches_signature(audio(AudioFormat::Wav), png));
        assert!(matches_signature(audio(AudioFormat::Wav), b"RIFF\x24\x08\x00\x00WAVE"));
    }

    #[test]
    fn test_video_markers() {
        let mp4 = b"\x00\x00\x00\x20ftypisom\x00\x00\x02\x00";
        assert!(matches_signature(MediaFormat::Video(VideoFormat::Mp4), mp4));
        assert!(matches_signature(MediaFormat::Video(VideoFormat::Mov), mp4));
        assert!(!matches_signature(MediaFormat::Video(VideoFormat::Mkv), mp4));

        let webm = [0x1A, 0x45, 0xDF, 0xA3, 0x9F, 0x42, 0x86, 0x81];
        assert!(matches_signature(MediaFormat::Video(VideoFormat::Webm), &webm));
    }

    #[test]
    fn test_empty_payload_matches_nothing() {
        for format in AudioFormat::ALL {
            assert!(!matches_signature(audio(*format), &[]));
        }
        assert_eq!(sniff_audio_format(&[]), None);
    }

    #[test]
    fn test_sniff_prefers_containers() {
        assert_eq!(sniff_audio_format(b"OggS\x00\x02"), Some(AudioFormat::Ogg));
        assert_eq!(sniff_audio_format(&[0xFF, 0xF1, 0x50, 0x80]), Some(AudioFormat::Aac));
        assert_eq!(sniff_audio_format(&[0xFF, 0xFB, 0x90, 0x64]), Some(AudioFormat::Mp3));
        assert_eq!(sniff_audio_format(b"hello world"), None);
    }

    #[test]
    fn test_sniff_adts_after_junk() {
        let mut data = vec![0u8; 32];
        data.extend_from_slice(&[0xFF, 0xF9, 0x50, 0x80]);
        assert_eq!(sniff_audio_format(&data), Some(AudioFormat::Aac));
        // Same bytes also pass the loose mp3 family check
        assert!(matches_signature(audio(AudioFormat::Mp3), &data));
    }
}
