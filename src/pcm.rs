//! Raw PCM into a container, driven through the host boundary.

use ffmpeg_next::{Rational, Rescale};
use ffmpeg_mux::{MuxError, Result};

use crate::{format::OutputFormat, host};

/// Interleaved signed 16-bit little-endian PCM.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PcmLayout {
    pub channels: u32,
    pub sample_rate: u32,
    pub samples_per_packet: u32,
}

impl PcmLayout {
    const BYTES_PER_SAMPLE: usize = 2;

    pub fn frame_size(&self) -> usize {
        self.channels as usize * Self::BYTES_PER_SAMPLE
    }

    pub fn packet_size(&self) -> usize {
        self.frame_size() * self.samples_per_packet as usize
    }

    pub fn bit_rate(&self) -> i64 {
        self.sample_rate as i64 * self.channels as i64 * 16
    }
}

/// Muxes `pcm` into `output` and returns the number of packets written.
/// Trailing bytes that do not form a whole frame are dropped.
pub fn mux_pcm(pcm: &[u8], output: &str, format: OutputFormat, layout: PcmLayout) -> Result<usize> {
    if layout.frame_size() == 0 || layout.samples_per_packet == 0 {
        return Err(MuxError::invalid_argument(format!("invalid pcm layout {:?}", layout)));
    }
    let usable = pcm.len() - pcm.len() % layout.frame_size();
    if usable < pcm.len() {
        log::warn!("dropping {} trailing pcm bytes", pcm.len() - usable);
    }
    let pcm = &pcm[..usable];

    let mut handle = host::setup(output, format.name())?;
    let stream = handle.add_audio_stream(
        "pcm_s16le",
        layout.bit_rate(),
        layout.channels as i32,
        layout.sample_rate as i32,
        &[],
    )?;
    handle.start()?;

    let sample_time_base = Rational::new(1, layout.sample_rate as i32);
    let mut packets = 0;
    let mut offset = 0usize;
    for chunk in pcm.chunks(layout.packet_size()) {
        let first_sample = (offset / layout.frame_size()) as i64;
        let pts_us = first_sample.rescale(sample_time_base, Rational::new(1, 1_000_000));
        handle.write_sample_data(stream, chunk, 0, chunk.len() as i32, pts_us, 1)?;
        offset += chunk.len();
        packets += 1;
    }

    handle.stop()?;
    handle.release();
    log::info!("wrote {} pcm packets to {} ({})", packets, output, format);
    Ok(packets)
}
