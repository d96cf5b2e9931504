use std::path::{Path, PathBuf};

use crate::{
    engine::{CodecLookup, ContainerContext, ContainerEngine},
    error::{EngineOp, MuxError, Result, translate},
    ffmpeg::FfmpegEngine,
    lifecycle::{MuxerState, Operation, require},
    packet::Sample,
    stream::{StreamDescriptor, StreamRegistry, StreamSpec},
    writer,
};

/// Multiplexes already-encoded elementary streams into one container file.
///
/// Lifecycle: [`initialize`](Self::initialize), declare streams,
/// [`start`](Self::start), [`write_sample`](Self::write_sample) any number of
/// times, [`stop`](Self::stop), [`release`](Self::release). Calls made in the
/// wrong state fail with [`MuxError::InvalidState`] and have no effect.
///
/// A muxer does no locking of its own. When several encoder threads feed one
/// output they must serialize their calls, for example by sharing it behind a
/// `Mutex`.
pub struct Muxer<E: ContainerEngine = FfmpegEngine, L: CodecLookup = FfmpegEngine> {
    path: PathBuf,
    format_name: String,
    state: MuxerState,
    engine: E,
    context: Option<E::Context>,
    registry: StreamRegistry<L>,
}

impl Muxer {
    /// A muxer backed by FFmpeg. Nothing is allocated until
    /// [`initialize`](Self::initialize).
    pub fn new(path: impl AsRef<Path>, format_name: &str) -> Self {
        Self::with_engine(path, format_name, FfmpegEngine, FfmpegEngine)
    }
}

impl<E: ContainerEngine, L: CodecLookup> Muxer<E, L> {
    pub fn with_engine(path: impl AsRef<Path>, format_name: &str, engine: E, lookup: L) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            format_name: format_name.to_string(),
            state: MuxerState::Created,
            engine,
            context: None,
            registry: StreamRegistry::new(lookup),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn format_name(&self) -> &str {
        &self.format_name
    }

    pub fn state(&self) -> MuxerState {
        self.state
    }

    pub fn streams(&self) -> &[StreamDescriptor] {
        self.registry.streams()
    }

    pub fn stream(&self, index: usize) -> Option<&StreamDescriptor> {
        self.registry.get(index)
    }

    /// Index the next declared stream will receive.
    pub fn next_stream_index(&self) -> usize {
        self.registry.next_index()
    }

    fn target(&self) -> String {
        self.path.display().to_string()
    }

    /// Allocates the container context. On failure the muxer stays in
    /// `Created` and may be initialized again.
    pub fn initialize(&mut self) -> Result<()> {
        require(Operation::Initialize, self.state)?;
        let context = self
            .engine
            .allocate_context(&self.format_name, &self.path)
            .map_err(|e| {
                log::error!(
                    "failed to allocate {} context for {}: {}",
                    self.format_name,
                    self.path.display(),
                    e
                );
                translate(EngineOp::AllocateContext, &self.format_name, e)
            })?;
        self.context = Some(context);
        self.state = MuxerState::Initialized;
        log::debug!(
            "muxer initialized: {} ({})",
            self.path.display(),
            self.format_name
        );
        Ok(())
    }

    /// The allocated context alongside the registry, borrowed apart.
    fn context_for(
        &mut self,
        operation: Operation,
    ) -> Result<(&mut E::Context, &mut StreamRegistry<L>)> {
        let state = self.state;
        match self.context.as_mut() {
            Some(context) => Ok((context, &mut self.registry)),
            None => Err(MuxError::InvalidState { operation, state }),
        }
    }

    /// Declares a stream and returns its index. Only legal before `start`.
    pub fn declare_stream(&mut self, spec: StreamSpec) -> Result<usize> {
        require(Operation::DeclareStream, self.state)?;
        let target = self.format_name.clone();
        let (context, registry) = self.context_for(Operation::DeclareStream)?;
        registry.declare(context, spec, &target)
    }

    pub fn add_video_stream(
        &mut self,
        codec_name: &str,
        bit_rate: i64,
        width: u32,
        height: u32,
        frame_rate: u32,
        config: &[u8],
    ) -> Result<usize> {
        self.declare_stream(StreamSpec::video(
            codec_name, bit_rate, width, height, frame_rate, config,
        ))
    }

    pub fn add_audio_stream(
        &mut self,
        codec_name: &str,
        bit_rate: i64,
        channels: u32,
        sample_rate: u32,
        config: &[u8],
    ) -> Result<usize> {
        self.declare_stream(StreamSpec::audio(
            codec_name,
            bit_rate,
            channels,
            sample_rate,
            config,
        ))
    }

    /// Opens the output and writes the container header. Streams are frozen
    /// afterwards.
    ///
    /// If the header cannot be written the output is closed again and the
    /// muxer stays `Initialized`, so `start` can be retried.
    pub fn start(&mut self) -> Result<()> {
        require(Operation::Start, self.state)?;
        let target = self.target();
        let (context, _) = self.context_for(Operation::Start)?;

        context
            .open_output()
            .map_err(|e| translate(EngineOp::OpenOutput, &target, e))?;

        if let Err(e) = context.write_header() {
            if let Err(close_err) = context.close_output() {
                log::warn!("close after header failure on {}: {}", target, close_err);
            }
            return Err(translate(EngineOp::WriteHeader, &target, e));
        }

        self.state = MuxerState::Started;
        log::info!(
            "muxer started: {} ({} streams)",
            target,
            self.registry.len()
        );
        Ok(())
    }

    /// Writes one encoded sample. A failed write leaves the session usable.
    pub fn write_sample(&mut self, sample: Sample<'_>) -> Result<()> {
        require(Operation::WriteSample, self.state)?;
        let (context, registry) = self.context_for(Operation::WriteSample)?;
        writer::write_sample(context, registry, sample)
    }

    /// Writes the trailer and closes the output. The muxer ends up `Stopped`
    /// even when the trailer fails; the output is always closed.
    pub fn stop(&mut self) -> Result<()> {
        require(Operation::Stop, self.state)?;
        let result = self.finalize();
        self.state = MuxerState::Stopped;

        for stream in self.registry.streams() {
            let stats = stream.stats();
            log::info!(
                "stream {} ({}): {} samples, {} bytes",
                stream.index(),
                stream.codec().name,
                stats.samples,
                stats.bytes
            );
        }
        match &result {
            Ok(()) => log::info!("muxer stopped: {}", self.path.display()),
            Err(e) => log::error!("muxer stopped with error: {}", e),
        }
        result
    }

    /// Trailer then close. A trailer failure is reported ahead of a close
    /// failure, but close runs either way.
    fn finalize(&mut self) -> Result<()> {
        let target = self.target();
        let Some(context) = self.context.as_mut() else {
            return Ok(());
        };
        let trailer = context
            .write_trailer()
            .map_err(|e| translate(EngineOp::WriteTrailer, &target, e));
        let close = context
            .close_output()
            .map_err(|e| translate(EngineOp::CloseOutput, &target, e));
        trailer.and(close)
    }

    /// Frees the container context. Safe in every state and idempotent; a
    /// started muxer is finalized first so its output is not left open.
    pub fn release(&mut self) {
        if self.state == MuxerState::Released {
            return;
        }
        if self.state == MuxerState::Started {
            if let Err(e) = self.finalize() {
                log::warn!("finalize during release failed: {}", e);
            }
        }
        if let Some(context) = self.context.take() {
            drop(context);
        }
        log::debug!("muxer released: {}", self.path.display());
        self.state = MuxerState::Released;
    }
}

impl<E: ContainerEngine, L: CodecLookup> Drop for Muxer<E, L> {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
#[path = "muxer_test.rs"]
mod muxer_test;
