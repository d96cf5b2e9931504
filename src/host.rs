//! Host call boundary.
//!
//! Hosts speak in signed integers, microsecond timestamps and
//! `(buffer, offset, size)` windows. This layer checks those inputs, converts
//! them into the core's types and hands back the core's typed errors. Nothing
//! here decides lifecycle legality; that stays in [`ffmpeg_mux::Muxer`].

use ffmpeg_next::{Rational, Rescale};
use ffmpeg_mux::{Muxer, MuxerState, MuxError, Result, Sample, SampleFlags};

const MICROS: Rational = Rational(1, 1_000_000);

/// An initialized muxer as seen by a host.
///
/// Not synchronized: hosts feeding one handle from several threads must
/// serialize the calls themselves.
pub struct MuxerHandle {
    muxer: Muxer,
}

/// Creates a muxer for `output_path` in container `format_name` and allocates
/// its context. Nothing is written until [`MuxerHandle::start`].
pub fn setup(output_path: &str, format_name: &str) -> Result<MuxerHandle> {
    let mut muxer = Muxer::new(output_path, format_name);
    if let Err(e) = muxer.initialize() {
        log::error!("unable to initialise muxer for {}: {}", output_path, e);
        return Err(e);
    }
    Ok(MuxerHandle { muxer })
}

/// Host status for a result: `0` on success, otherwise the error kind's code.
pub fn status_code<T>(result: &Result<T>) -> i32 {
    match result {
        Ok(_) => 0,
        Err(e) => e.kind().code(),
    }
}

fn positive(name: &str, value: i32) -> Result<u32> {
    u32::try_from(value)
        .ok()
        .filter(|v| *v > 0)
        .ok_or_else(|| {
            MuxError::invalid_argument(format!("{} must be positive, got {}", name, value))
        })
}

/// The `size` bytes of `buffer` starting at `offset`, if that window fits.
pub(crate) fn sample_window(buffer: &[u8], offset: i32, size: i32) -> Result<&[u8]> {
    let window = usize::try_from(offset)
        .ok()
        .zip(usize::try_from(size).ok())
        .and_then(|(offset, size)| Some(offset..offset.checked_add(size)?))
        .filter(|range| range.end <= buffer.len());
    match window {
        Some(range) => Ok(&buffer[range]),
        None => {
            log::error!(
                "write_sample_data saw wrong buffer size {}, size {}, offset {}",
                buffer.len(),
                size,
                offset
            );
            Err(MuxError::invalid_argument("sample has a wrong size"))
        }
    }
}

impl MuxerHandle {
    pub fn state(&self) -> MuxerState {
        self.muxer.state()
    }

    pub fn muxer(&self) -> &Muxer {
        &self.muxer
    }

    pub fn start(&mut self) -> Result<()> {
        self.muxer.start().inspect_err(|e| {
            log::error!("unable to start muxer: {}", e);
        })
    }

    pub fn add_video_stream(
        &mut self,
        codec_name: &str,
        bitrate: i64,
        width: i32,
        height: i32,
        frame_rate: i32,
        config: &[u8],
    ) -> Result<i32> {
        let index = self.muxer.add_video_stream(
            codec_name,
            bitrate,
            positive("width", width)?,
            positive("height", height)?,
            positive("frame rate", frame_rate)?,
            config,
        )?;
        Ok(index as i32)
    }

    pub fn add_audio_stream(
        &mut self,
        codec_name: &str,
        bitrate: i64,
        channels: i32,
        sample_rate: i32,
        config: &[u8],
    ) -> Result<i32> {
        let index = self.muxer.add_audio_stream(
            codec_name,
            bitrate,
            positive("channels", channels)?,
            positive("sample rate", sample_rate)?,
            config,
        )?;
        Ok(index as i32)
    }

    /// Generic, key/value track declaration. Reserved: always `Unsupported`.
    pub fn add_track(&mut self, _values: &[String]) -> Result<i32> {
        Err(MuxError::Unsupported(
            "add_track; declare streams with add_video_stream or add_audio_stream",
        ))
    }

    /// Writes `size` bytes of `buffer` starting at `offset` to stream
    /// `stream_index`. The window is checked before the muxer is consulted.
    pub fn write_sample_data(
        &mut self,
        stream_index: i32,
        buffer: &[u8],
        offset: i32,
        size: i32,
        presentation_time_us: i64,
        flags: i32,
    ) -> Result<()> {
        let data = sample_window(buffer, offset, size)?;
        let stream_index = usize::try_from(stream_index).map_err(|_| {
            MuxError::invalid_argument(format!("stream index {} is invalid", stream_index))
        })?;

        // Undeclared streams have no time base; the muxer rejects them below.
        let pts = match self.muxer.stream(stream_index) {
            Some(stream) => presentation_time_us.rescale(MICROS, stream.time_base()),
            None => presentation_time_us,
        };
        let flags = SampleFlags::from_bits(flags as u32);

        self.muxer
            .write_sample(Sample::new(stream_index, data, pts, flags))
            .inspect_err(|e| log::error!("write_sample_data returned an error: {}", e))
    }

    pub fn stop(&mut self) -> Result<()> {
        self.muxer.stop().inspect_err(|e| {
            log::error!("unable to stop muxer: {}", e);
        })
    }

    /// Frees native resources. Idempotent.
    pub fn release(&mut self) {
        self.muxer.release();
    }
}
