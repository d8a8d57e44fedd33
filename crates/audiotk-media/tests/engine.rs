//! Engine tests with a scripted executor.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use audiotk_media::{
    EngineConfig, EngineOutput, ErrorCode, MediaEngine, MediaError, MediaResult, ProcessExecutor,
    ProcessOutcome, RequestId, TranscodeCommand, ValidationKind,
};
use audiotk_models::{AudioFormat, OperationRequest, SplitMode, UploadedPayload};

#[derive(Default)]
struct ScriptedExecutor {
    outcomes: Mutex<VecDeque<MediaResult<ProcessOutcome>>>,
    calls: Mutex<usize>,
}

impl ScriptedExecutor {
    fn new(outcomes: Vec<MediaResult<ProcessOutcome>>) -> Self {
        Self {
            outcomes: Mutex::new(outcomes.into()),
            calls: Mutex::new(0),
        }
    }
}

#[async_trait]
impl ProcessExecutor for ScriptedExecutor {
    async fn execute(&self, _command: &TranscodeCommand, _input: &[u8]) -> MediaResult<ProcessOutcome> {
        *self.calls.lock().unwrap() += 1;
        self.outcomes
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(MediaError::internal("no scripted outcome left")))
    }
}

fn engine(outcomes: Vec<MediaResult<ProcessOutcome>>) -> MediaEngine<ScriptedExecutor> {
    MediaEngine::with_executor(EngineConfig::default(), ScriptedExecutor::new(outcomes))
}

fn calls(engine: &MediaEngine<ScriptedExecutor>) -> usize {
    *engine.orchestrator().executor().calls.lock().unwrap()
}

fn ok(stdout: &[u8]) -> MediaResult<ProcessOutcome> {
    Ok(ProcessOutcome {
        exit_code: Some(0),
        stdout: stdout.to_vec(),
        ..ProcessOutcome::default()
    })
}

fn mp3(name: &str) -> UploadedPayload {
    let mut data = b"ID3\x04\x00\x00\x00\x00\x00\x00".to_vec();
    data.extend_from_slice(&[0xFF, 0xFB, 0x90, 0x64]);
    UploadedPayload::new(data, name).with_content_type("audio/mpeg")
}

fn validation_kind(err: &MediaError) -> Option<ValidationKind> {
    match err {
        MediaError::ValidationFailed(failure) => Some(failure.kind),
        _ => None,
    }
}

#[tokio::test]
async fn test_convert_returns_single_output() {
    let engine = engine(vec![ok(b"flac bytes")]);

    let output = engine
        .process(OperationRequest::Convert {
            payload: mp3("../../song.mp3"),
            target: AudioFormat::Flac,
        })
        .await
        .unwrap()
        .into_single()
        .unwrap();

    assert_eq!(output.data, b"flac bytes");
    assert_eq!(output.content_type, "audio/flac");
    assert_eq!(output.filename, "song.flac");
}

#[tokio::test]
async fn test_oversized_payload_never_reaches_executor() {
    let config = EngineConfig::default().with_max_upload_bytes(8);
    let engine = MediaEngine::with_executor(config, ScriptedExecutor::new(vec![]));

    let err = engine
        .process(OperationRequest::Convert {
            payload: mp3("big.mp3"),
            target: AudioFormat::Wav,
        })
        .await
        .unwrap_err();

    assert_eq!(validation_kind(&err), Some(ValidationKind::Size));
    assert_eq!(err.status_code(), 413);
    assert_eq!(err.error_code(), ErrorCode::FileTooLarge);
    assert_eq!(*engine.orchestrator().executor().calls.lock().unwrap(), 0);
}

#[tokio::test]
async fn test_invalid_time_range_is_rejected_before_processing() {
    let engine = engine(vec![]);

    let err = engine
        .process(OperationRequest::Trim {
            payload: mp3("a.mp3"),
            start: 10.0,
            end: 5.0,
            duration: None,
        })
        .await
        .unwrap_err();

    assert_eq!(validation_kind(&err), Some(ValidationKind::TimeRange));
    assert_eq!(err.to_response().code, ErrorCode::InvalidTimeRange);
    assert_eq!(calls(&engine), 0);
}

#[tokio::test]
async fn test_merge_requires_two_files() {
    let engine = engine(vec![]);

    let err = engine
        .process(OperationRequest::Merge {
            payloads: vec![mp3("only.mp3")],
            target: AudioFormat::Mp3,
        })
        .await
        .unwrap_err();

    assert_eq!(validation_kind(&err), Some(ValidationKind::FileCount));
    assert_eq!(err.status_code(), 400);
}

#[tokio::test]
async fn test_extract_requires_video_payload() {
    let engine = engine(vec![]);

    let err = engine
        .process(OperationRequest::Extract {
            video: mp3("not-a-video.mp3"),
            target: AudioFormat::Mp3,
        })
        .await
        .unwrap_err();

    assert_eq!(validation_kind(&err), Some(ValidationKind::UnsupportedType));
}

#[tokio::test]
async fn test_speed_out_of_range() {
    let engine = engine(vec![]);

    let err = engine
        .process(OperationRequest::ChangeSpeed {
            payload: mp3("a.mp3"),
            speed: 8.0,
            preserve_pitch: true,
        })
        .await
        .unwrap_err();

    assert_eq!(validation_kind(&err), Some(ValidationKind::Parameter));
}

#[tokio::test]
async fn test_timeout_surfaces_as_504() {
    let engine = engine(vec![Ok(ProcessOutcome::timed_out(Duration::from_secs(300)))]);

    let err = engine
        .process_with_id(
            RequestId::new(),
            OperationRequest::Convert {
                payload: mp3("slow.mp3"),
                target: AudioFormat::Ogg,
            },
        )
        .await
        .unwrap_err();

    assert!(matches!(err, MediaError::ProcessingTimeout(_)));
    assert_eq!(err.status_code(), 504);
    assert_eq!(err.error_code(), ErrorCode::Timeout);
}

#[tokio::test]
async fn test_split_returns_multiple_outputs() {
    let engine = engine(vec![
        ok(br#"{"streams":[{"codec_type":"audio"}],"format":{"duration":"12"}}"#),
        ok(b"first"),
        ok(b"second"),
    ]);

    let output = engine
        .process(OperationRequest::Split {
            payload: mp3("talk.mp3"),
            mode: SplitMode::Interval { seconds: 10 },
        })
        .await
        .unwrap();

    assert!(matches!(output, EngineOutput::Multiple(_)));
    assert_eq!(output.total_bytes(), 11);
    let names: Vec<String> = output.into_outputs().into_iter().map(|o| o.filename).collect();
    assert_eq!(names, vec!["talk_segment_1.mp3", "talk_segment_2.mp3"]);
}
