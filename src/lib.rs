//! Host-facing side of the muxer: the call boundary, a queueing media target
//! and the format helpers hosts need to describe their tracks.

pub mod config;
pub mod format;
pub mod host;
pub mod pcm;
pub mod target;

pub use format::{OutputFormat, TrackFormat, TrackParams};
pub use host::{MuxerHandle, setup};
pub use target::{BufferInfo, MuxerMediaTarget};
