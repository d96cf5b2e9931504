//! Container muxing on top of FFmpeg.
//!
//! [`Muxer`] owns one output container: it allocates the format context,
//! collects stream declarations, writes the header, forwards encoded samples
//! to libavformat's interleaving writer and finalizes the file.

/// Registers FFmpeg components. Call once at startup.
pub fn init() -> anyhow::Result<()> {
    ffmpeg_next::init().map_err(|e| anyhow::anyhow!("ffmpeg_next init: {}", e))
}

pub mod engine;
pub mod error;
pub mod ffmpeg;
pub mod lifecycle;
pub mod muxer;
pub mod packet;
pub mod stream;
pub mod writer;

pub use error::{ErrorKind, MuxError, Result};
pub use lifecycle::MuxerState;
pub use muxer::Muxer;
pub use packet::{Sample, SampleFlags};
pub use stream::{StreamDescriptor, StreamParams, StreamSpec};
