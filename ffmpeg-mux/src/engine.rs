//! Seam between the muxer core and the container-format engine.
//!
//! The core never touches FFmpeg directly: it drives a [`ContainerEngine`]
//! (context allocation), the [`ContainerContext`] it hands back (everything
//! that happens to one output), and a [`CodecLookup`] (codec names to
//! descriptors). [`crate::ffmpeg`] implements all three on libavformat.

use std::path::Path;

use crate::{packet::MuxPacket, stream::CodecDescriptor, stream::StreamDescriptor};

pub type EngineResult<T> = std::result::Result<T, ffmpeg_next::Error>;

/// Read-only codec registry. Implementations hold no per-muxer state.
pub trait CodecLookup {
    fn find_by_name(&self, name: &str) -> Option<CodecDescriptor>;
}

pub trait ContainerEngine {
    type Context: ContainerContext;

    /// Allocates a writable context for `format_name` bound to `path`. Does not
    /// touch the file system.
    fn allocate_context(&self, format_name: &str, path: &Path) -> EngineResult<Self::Context>;
}

/// Exclusive owner of one allocated container context.
///
/// Dropping the value frees the context, closing the output first if it is
/// still open. It is never cloned or shared.
pub trait ContainerContext {
    fn open_output(&mut self) -> EngineResult<()>;

    fn is_output_open(&self) -> bool;

    fn write_header(&mut self) -> EngineResult<()>;

    /// Creates the engine stream for `stream` and returns the engine's index
    /// for it.
    fn new_stream_slot(&mut self, stream: &StreamDescriptor) -> EngineResult<usize>;

    /// Hands the packet to the engine's interleaving writer, which may hold it
    /// back until slower streams catch up.
    fn write_interleaved_packet(&mut self, packet: MuxPacket<'_>) -> EngineResult<()>;

    fn write_trailer(&mut self) -> EngineResult<()>;

    fn close_output(&mut self) -> EngineResult<()>;
}
