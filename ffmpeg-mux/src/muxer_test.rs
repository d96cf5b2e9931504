use std::{cell::RefCell, path::Path, rc::Rc};

use ffmpeg_next::{Error, Rational, codec, media};

use crate::{
    engine::{CodecLookup, ContainerContext, ContainerEngine, EngineResult},
    error::{ErrorKind, FormatStage, MuxError},
    lifecycle::{MuxerState, Operation},
    muxer::Muxer,
    packet::{MuxPacket, Sample, SampleFlags},
    stream::{CodecDescriptor, StreamDescriptor},
};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Call {
    Allocate(String),
    Open,
    Header,
    NewStream(usize),
    Write {
        stream: usize,
        pts: i64,
        size: usize,
        key: bool,
    },
    Trailer,
    Close,
    Free,
}

#[derive(Default)]
struct Script {
    fail_allocate: bool,
    fail_open: bool,
    fail_header: bool,
    fail_trailer: bool,
    fail_stream_slot: bool,
    reject_stream: Option<usize>,
}

/// In-memory engine recording every call it receives.
#[derive(Clone, Default)]
struct FakeEngine {
    calls: Rc<RefCell<Vec<Call>>>,
    script: Rc<RefCell<Script>>,
}

impl FakeEngine {
    fn calls(&self) -> Vec<Call> {
        self.calls.borrow().clone()
    }

    fn count(&self, f: impl Fn(&Call) -> bool) -> usize {
        self.calls.borrow().iter().filter(|c| f(c)).count()
    }

    fn clear(&self) {
        self.calls.borrow_mut().clear();
    }
}

struct FakeContext {
    calls: Rc<RefCell<Vec<Call>>>,
    script: Rc<RefCell<Script>>,
    open: bool,
    streams: usize,
}

impl ContainerEngine for FakeEngine {
    type Context = FakeContext;

    fn allocate_context(&self, format_name: &str, _path: &Path) -> EngineResult<FakeContext> {
        self.calls
            .borrow_mut()
            .push(Call::Allocate(format_name.to_string()));
        if self.script.borrow().fail_allocate {
            return Err(Error::MuxerNotFound);
        }
        Ok(FakeContext {
            calls: self.calls.clone(),
            script: self.script.clone(),
            open: false,
            streams: 0,
        })
    }
}

impl CodecLookup for FakeEngine {
    fn find_by_name(&self, name: &str) -> Option<CodecDescriptor> {
        let (id, medium) = match name {
            "h264" => (codec::Id::H264, media::Type::Video),
            "hevc" => (codec::Id::HEVC, media::Type::Video),
            "aac" => (codec::Id::AAC, media::Type::Audio),
            _ => return None,
        };
        Some(CodecDescriptor {
            name: name.to_string(),
            id,
            medium,
        })
    }
}

impl FakeContext {
    fn push(&self, call: Call) {
        self.calls.borrow_mut().push(call);
    }
}

impl ContainerContext for FakeContext {
    fn open_output(&mut self) -> EngineResult<()> {
        self.push(Call::Open);
        if self.script.borrow().fail_open {
            return Err(Error::Other {
                errno: ffmpeg_next::util::error::EACCES,
            });
        }
        self.open = true;
        Ok(())
    }

    fn is_output_open(&self) -> bool {
        self.open
    }

    fn write_header(&mut self) -> EngineResult<()> {
        self.push(Call::Header);
        if self.script.borrow().fail_header {
            return Err(Error::InvalidData);
        }
        Ok(())
    }

    fn new_stream_slot(&mut self, stream: &StreamDescriptor) -> EngineResult<usize> {
        self.push(Call::NewStream(stream.index()));
        if self.script.borrow().fail_stream_slot {
            return Err(Error::Other {
                errno: ffmpeg_next::util::error::ENOMEM,
            });
        }
        self.streams += 1;
        Ok(self.streams - 1)
    }

    fn write_interleaved_packet(&mut self, packet: MuxPacket<'_>) -> EngineResult<()> {
        self.push(Call::Write {
            stream: packet.stream_index,
            pts: packet.pts,
            size: packet.data.len(),
            key: packet.is_key,
        });
        if self.script.borrow().reject_stream == Some(packet.stream_index) {
            return Err(Error::InvalidData);
        }
        Ok(())
    }

    fn write_trailer(&mut self) -> EngineResult<()> {
        self.push(Call::Trailer);
        if self.script.borrow().fail_trailer {
            return Err(Error::InvalidData);
        }
        Ok(())
    }

    fn close_output(&mut self) -> EngineResult<()> {
        if self.open {
            self.push(Call::Close);
            self.open = false;
        }
        Ok(())
    }
}

impl Drop for FakeContext {
    fn drop(&mut self) {
        self.push(Call::Free);
    }
}

fn new_muxer() -> (Muxer<FakeEngine, FakeEngine>, FakeEngine) {
    let engine = FakeEngine::default();
    let muxer = Muxer::with_engine("out.mp4", "mp4", engine.clone(), engine.clone());
    (muxer, engine)
}

fn started_muxer() -> (Muxer<FakeEngine, FakeEngine>, FakeEngine) {
    let (mut muxer, engine) = new_muxer();
    muxer.initialize().unwrap();
    muxer
        .add_video_stream("h264", 2_000_000, 1280, 720, 30, &[0x01])
        .unwrap();
    muxer.add_audio_stream("aac", 128_000, 2, 44_100, &[]).unwrap();
    muxer.start().unwrap();
    (muxer, engine)
}

fn is_write(call: &Call) -> bool {
    matches!(call, Call::Write { .. })
}

#[test]
fn test_initialize_then_release_frees_once() {
    let (mut muxer, engine) = new_muxer();
    muxer.initialize().unwrap();
    assert_eq!(muxer.state(), MuxerState::Initialized);

    muxer.release();
    muxer.release();
    assert_eq!(muxer.state(), MuxerState::Released);
    assert_eq!(
        engine.calls(),
        vec![Call::Allocate("mp4".to_string()), Call::Free]
    );

    drop(muxer);
    assert_eq!(engine.count(|c| *c == Call::Free), 1);
}

#[test]
fn test_allocation_failure_is_retry_safe() {
    let (mut muxer, engine) = new_muxer();
    engine.script.borrow_mut().fail_allocate = true;

    let err = muxer.initialize().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AllocationFailure);
    assert_eq!(muxer.state(), MuxerState::Created);

    engine.script.borrow_mut().fail_allocate = false;
    muxer.initialize().unwrap();
    assert_eq!(muxer.state(), MuxerState::Initialized);
}

#[test]
fn test_initialize_twice_is_invalid_state() {
    let (mut muxer, engine) = new_muxer();
    muxer.initialize().unwrap();
    let err = muxer.initialize().unwrap_err();
    assert_eq!(
        err,
        MuxError::InvalidState {
            operation: Operation::Initialize,
            state: MuxerState::Initialized,
        }
    );
    assert_eq!(engine.count(|c| matches!(c, Call::Allocate(_))), 1);
}

#[test]
fn test_declare_before_initialize_is_invalid_state() {
    let (mut muxer, engine) = new_muxer();
    let err = muxer
        .add_video_stream("h264", 0, 640, 480, 25, &[])
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidState);
    assert!(engine.calls().is_empty());
}

#[test]
fn test_stream_indices_are_sequential() {
    let (mut muxer, _engine) = new_muxer();
    muxer.initialize().unwrap();
    let indices = vec![
        muxer.add_video_stream("h264", 0, 1280, 720, 30, &[]).unwrap(),
        muxer.add_audio_stream("aac", 0, 2, 48_000, &[]).unwrap(),
        muxer.add_video_stream("hevc", 0, 1920, 1080, 60, &[]).unwrap(),
        muxer.add_audio_stream("aac", 0, 1, 16_000, &[]).unwrap(),
    ];
    assert_eq!(indices, vec![0, 1, 2, 3]);
    assert_eq!(muxer.streams().len(), 4);
    assert_eq!(muxer.stream(2).unwrap().time_base(), Rational::new(1, 60));
}

#[test]
fn test_unknown_codec_does_not_consume_an_index() {
    let (mut muxer, engine) = new_muxer();
    muxer.initialize().unwrap();

    let err = muxer
        .add_video_stream("not-a-real-codec", 0, 1280, 720, 30, &[])
        .unwrap_err();
    assert_eq!(err, MuxError::UnknownCodec("not-a-real-codec".to_string()));
    assert_eq!(muxer.next_stream_index(), 0);
    assert_eq!(engine.count(|c| matches!(c, Call::NewStream(_))), 0);

    assert_eq!(muxer.add_audio_stream("aac", 0, 2, 44_100, &[]).unwrap(), 0);
}

#[test]
fn test_stream_slot_failure_adds_no_stream() {
    let (mut muxer, engine) = new_muxer();
    muxer.initialize().unwrap();
    muxer.add_audio_stream("aac", 0, 2, 44_100, &[]).unwrap();

    engine.script.borrow_mut().fail_stream_slot = true;
    let err = muxer
        .add_video_stream("h264", 0, 1280, 720, 30, &[0x01])
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AllocationFailure);
    assert_eq!(muxer.streams().len(), 1);
    assert_eq!(muxer.next_stream_index(), 1);
    assert_eq!(muxer.state(), MuxerState::Initialized);

    engine.script.borrow_mut().fail_stream_slot = false;
    assert_eq!(
        muxer.add_video_stream("h264", 0, 1280, 720, 30, &[0x01]).unwrap(),
        1
    );
}

#[test]
fn test_start_without_streams_then_declare_is_invalid_state() {
    let (mut muxer, engine) = new_muxer();
    muxer.initialize().unwrap();
    muxer.start().unwrap();
    assert_eq!(muxer.state(), MuxerState::Started);

    let err = muxer
        .add_video_stream("h264", 0, 1280, 720, 30, &[])
        .unwrap_err();
    assert_eq!(
        err,
        MuxError::InvalidState {
            operation: Operation::DeclareStream,
            state: MuxerState::Started,
        }
    );
    assert_eq!(engine.count(|c| matches!(c, Call::NewStream(_))), 0);
}

#[test]
fn test_write_outside_started_performs_no_io() {
    let (mut muxer, engine) = new_muxer();
    let data = [0u8; 16];

    let err = muxer
        .write_sample(Sample::new(0, &data, 0, SampleFlags::KEY_FRAME))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidState);

    muxer.initialize().unwrap();
    muxer.add_audio_stream("aac", 0, 2, 44_100, &[]).unwrap();
    let err = muxer
        .write_sample(Sample::new(0, &data, 0, SampleFlags::empty()))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidState);

    muxer.start().unwrap();
    muxer.stop().unwrap();
    let err = muxer
        .write_sample(Sample::new(0, &data, 0, SampleFlags::empty()))
        .unwrap_err();
    assert_eq!(
        err,
        MuxError::InvalidState {
            operation: Operation::WriteSample,
            state: MuxerState::Stopped,
        }
    );
    assert_eq!(engine.count(is_write), 0);
}

#[test]
fn test_write_to_undeclared_stream_is_invalid_argument() {
    let (mut muxer, engine) = started_muxer();
    let err = muxer
        .write_sample(Sample::new(2, &[1, 2, 3], 0, SampleFlags::empty()))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    assert_eq!(engine.count(is_write), 0);
    assert_eq!(muxer.state(), MuxerState::Started);
}

#[test]
fn test_write_forwards_flags_and_time_base() {
    let (mut muxer, engine) = started_muxer();
    engine.clear();

    muxer
        .write_sample(Sample::new(0, &[0; 10], 1, SampleFlags::KEY_FRAME))
        .unwrap();
    muxer
        .write_sample(Sample::new(1, &[0; 4], 1024, SampleFlags::CODEC_CONFIG))
        .unwrap();

    assert_eq!(
        engine.calls(),
        vec![
            Call::Write {
                stream: 0,
                pts: 1,
                size: 10,
                key: true,
            },
            Call::Write {
                stream: 1,
                pts: 1024,
                size: 4,
                key: false,
            },
        ]
    );
    let stats = muxer.stream(1).unwrap().stats();
    assert_eq!(stats.samples, 1);
    assert_eq!(stats.bytes, 4);
    assert_eq!(stats.last_pts, Some(1024));
}

#[test]
fn test_write_failure_does_not_poison_session() {
    let (mut muxer, engine) = started_muxer();
    engine.script.borrow_mut().reject_stream = Some(1);

    let err = muxer
        .write_sample(Sample::new(1, &[0; 8], 0, SampleFlags::empty()))
        .unwrap_err();
    assert!(matches!(err, MuxError::WriteFailure { stream_index: 1, .. }));
    assert_eq!(muxer.state(), MuxerState::Started);
    assert_eq!(muxer.stream(1).unwrap().stats().samples, 0);

    muxer
        .write_sample(Sample::new(0, &[0; 8], 0, SampleFlags::KEY_FRAME))
        .unwrap();
    muxer.stop().unwrap();
}

#[test]
fn test_decreasing_timestamps_pass_through() {
    let (mut muxer, engine) = started_muxer();
    engine.clear();

    muxer
        .write_sample(Sample::new(0, &[0; 8], 5, SampleFlags::KEY_FRAME))
        .unwrap();
    muxer
        .write_sample(Sample::new(0, &[0; 8], 3, SampleFlags::empty()))
        .unwrap();

    let pts: Vec<i64> = engine
        .calls()
        .into_iter()
        .filter_map(|c| match c {
            Call::Write { pts, .. } => Some(pts),
            _ => None,
        })
        .collect();
    assert_eq!(pts, vec![5, 3]);
}

#[test]
fn test_open_failure_keeps_initialized() {
    let (mut muxer, engine) = new_muxer();
    muxer.initialize().unwrap();
    engine.script.borrow_mut().fail_open = true;

    let err = muxer.start().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::IoFailure);
    assert_eq!(muxer.state(), MuxerState::Initialized);
    assert_eq!(engine.count(|c| *c == Call::Header), 0);
}

#[test]
fn test_header_failure_closes_output_and_allows_retry() {
    let (mut muxer, engine) = new_muxer();
    muxer.initialize().unwrap();
    engine.script.borrow_mut().fail_header = true;

    let err = muxer.start().unwrap_err();
    assert!(matches!(
        err,
        MuxError::FormatFailure {
            stage: FormatStage::Header,
            ..
        }
    ));
    assert_eq!(muxer.state(), MuxerState::Initialized);
    assert_eq!(
        engine.calls()[1..],
        [Call::Open, Call::Header, Call::Close]
    );

    engine.script.borrow_mut().fail_header = false;
    muxer.start().unwrap();
    assert_eq!(muxer.state(), MuxerState::Started);
}

#[test]
fn test_trailer_failure_still_closes_and_stops() {
    let (mut muxer, engine) = started_muxer();
    engine.clear();
    engine.script.borrow_mut().fail_trailer = true;

    let err = muxer.stop().unwrap_err();
    assert!(matches!(
        err,
        MuxError::FormatFailure {
            stage: FormatStage::Trailer,
            ..
        }
    ));
    assert_eq!(muxer.state(), MuxerState::Stopped);
    assert_eq!(engine.calls(), vec![Call::Trailer, Call::Close]);

    let err = muxer.stop().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidState);
}

#[test]
fn test_release_from_started_finalizes() {
    let (mut muxer, engine) = started_muxer();
    engine.clear();

    muxer.release();
    assert_eq!(
        engine.calls(),
        vec![Call::Trailer, Call::Close, Call::Free]
    );
}

#[test]
fn test_everything_after_release_is_invalid_state() {
    let (mut muxer, engine) = started_muxer();
    muxer.stop().unwrap();
    muxer.release();
    engine.clear();

    assert_eq!(muxer.initialize().unwrap_err().kind(), ErrorKind::InvalidState);
    assert_eq!(muxer.start().unwrap_err().kind(), ErrorKind::InvalidState);
    assert_eq!(muxer.stop().unwrap_err().kind(), ErrorKind::InvalidState);
    assert_eq!(
        muxer
            .add_audio_stream("aac", 0, 2, 44_100, &[])
            .unwrap_err()
            .kind(),
        ErrorKind::InvalidState
    );
    assert_eq!(
        muxer
            .write_sample(Sample::new(0, &[0], 0, SampleFlags::empty()))
            .unwrap_err()
            .kind(),
        ErrorKind::InvalidState
    );
    assert!(engine.calls().is_empty());
}

#[test]
fn test_drop_releases_context() {
    let (muxer, engine) = started_muxer();
    drop(muxer);
    assert_eq!(engine.count(|c| *c == Call::Free), 1);
    assert_eq!(engine.count(|c| *c == Call::Close), 1);
}

/// Muxes h264 + aac into a real mp4 through FFmpeg.
#[test]
fn test_mux_h264_aac_mp4() -> anyhow::Result<()> {
    let _ = env_logger::builder().is_test(true).try_init();
    crate::init()?;

    let dir = tempfile::tempdir()?;
    let path = dir.path().join("out.mp4");

    // avcC record (configurationVersion = 1) and an AAC-LC 44.1kHz stereo
    // AudioSpecificConfig.
    let avcc = [0x01, 0x64, 0x00, 0x1f, 0xff, 0xe0, 0x00];
    let asc = [0x12, 0x10];

    let mut muxer = Muxer::new(&path, "mp4");
    muxer.initialize()?;
    let video = muxer.add_video_stream("h264", 2_000_000, 1280, 720, 30, &avcc)?;
    let audio = muxer.add_audio_stream("aac", 128_000, 2, 44_100, &asc)?;
    assert_eq!((video, audio), (0, 1));
    muxer.start()?;

    let frame = [0x00, 0x00, 0x00, 0x02, 0x65, 0x88];
    let aac_frame = [0x21, 0x10, 0x04, 0x60, 0x8c, 0x1c];
    for i in 0..10i64 {
        let flags = if i == 0 {
            SampleFlags::KEY_FRAME
        } else {
            SampleFlags::empty()
        };
        muxer.write_sample(Sample::new(video, &frame, i, flags))?;
        muxer.write_sample(Sample::new(
            audio,
            &aac_frame,
            i * 1024,
            SampleFlags::KEY_FRAME,
        ))?;
    }
    muxer.stop()?;
    muxer.release();

    let bytes = std::fs::read(&path)?;
    assert!(!bytes.is_empty());
    assert_eq!(&bytes[4..8], b"ftyp");
    assert!(bytes.windows(4).any(|w| w == b"moov"));
    Ok(())
}
