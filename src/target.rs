use std::collections::VecDeque;

use bytes::Bytes;
use ffmpeg_mux::{MuxError, Result, lifecycle::Operation};

use crate::{
    format::{TrackFormat, TrackParams},
    host::{self, MuxerHandle, sample_window},
};

/// Placement of one sample inside its buffer, as encoders report it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BufferInfo {
    pub offset: i32,
    pub size: i32,
    pub presentation_time_us: i64,
    pub flags: i32,
}

struct QueuedSample {
    track: usize,
    data: Bytes,
    info: BufferInfo,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Phase {
    /// Waiting for track formats; samples are queued.
    Collecting,
    Started,
    /// Declaring the streams or starting the muxer failed. Terminal.
    Failed(MuxError),
    Released,
}

/// Output target for a fixed number of tracks.
///
/// Encoders usually know their output format only after producing the first
/// samples, and each track learns it at a different time. The target keeps
/// every sample written before all tracks are known, then declares the
/// streams (in target-track order), starts the muxer and writes the backlog
/// in arrival order.
///
/// If that start fails the target is unusable: the backlog is dropped and
/// every later call returns the start error.
pub struct MuxerMediaTarget {
    output_path: String,
    handle: MuxerHandle,
    formats: Vec<Option<TrackFormat>>,
    stream_indices: Vec<i32>,
    queue: VecDeque<QueuedSample>,
    phase: Phase,
}

impl MuxerMediaTarget {
    pub fn new(output_path: &str, track_count: usize, format_name: &str) -> Result<Self> {
        if track_count == 0 {
            return Err(MuxError::invalid_argument("track count must be positive"));
        }
        let handle = host::setup(output_path, format_name)?;
        Ok(Self {
            output_path: output_path.to_string(),
            handle,
            formats: vec![None; track_count],
            stream_indices: Vec::with_capacity(track_count),
            queue: VecDeque::new(),
            phase: Phase::Collecting,
        })
    }

    pub fn output_file_path(&self) -> &str {
        &self.output_path
    }

    pub fn is_started(&self) -> bool {
        self.phase == Phase::Started
    }

    /// Number of samples waiting for the muxer to start.
    pub fn queued_samples(&self) -> usize {
        self.queue.len()
    }

    /// Records the format of `target_track`. Adding the last missing track
    /// starts the muxer and flushes the queue.
    pub fn add_track(&mut self, format: TrackFormat, target_track: usize) -> Result<usize> {
        match &self.phase {
            Phase::Failed(e) => return Err(e.clone()),
            Phase::Released => {
                return Err(MuxError::InvalidState {
                    operation: Operation::DeclareStream,
                    state: self.handle.state(),
                });
            }
            Phase::Collecting | Phase::Started => {}
        }

        let track_count = self.formats.len();
        let slot = self.formats.get_mut(target_track).ok_or_else(|| {
            MuxError::invalid_argument(format!(
                "target track {} out of range ({} tracks)",
                target_track, track_count
            ))
        })?;
        if slot.is_some() {
            return Err(MuxError::invalid_argument(format!(
                "target track {} already added",
                target_track
            )));
        }
        *slot = Some(format);

        if self.formats.iter().all(Option::is_some) {
            log::debug!(
                "all tracks added, starting muxer, writing out {} queued samples",
                self.queue.len()
            );
            if let Err(e) = self.start() {
                log::error!("unable to start muxer for {}: {}", self.output_path, e);
                if !self.queue.is_empty() {
                    log::warn!("dropping {} queued samples", self.queue.len());
                    self.queue.clear();
                }
                self.phase = Phase::Failed(e.clone());
                return Err(e);
            }
            self.phase = Phase::Started;
            self.flush_queue()?;
        }
        Ok(target_track)
    }

    fn start(&mut self) -> Result<()> {
        for format in self.formats.iter().flatten() {
            let codec = format.codec_name();
            let index = match format.params {
                TrackParams::Video {
                    width,
                    height,
                    frame_rate,
                } => self.handle.add_video_stream(
                    &codec,
                    format.bit_rate,
                    width as i32,
                    height as i32,
                    frame_rate as i32,
                    &format.codec_config,
                )?,
                TrackParams::Audio {
                    channels,
                    sample_rate,
                } => self.handle.add_audio_stream(
                    &codec,
                    format.bit_rate,
                    channels as i32,
                    sample_rate as i32,
                    &format.codec_config,
                )?,
            };
            self.stream_indices.push(index);
        }
        self.handle.start()
    }

    /// Writes every queued sample; reports the first failure after trying
    /// them all.
    fn flush_queue(&mut self) -> Result<()> {
        let mut first_error = None;
        while let Some(sample) = self.queue.pop_front() {
            let result = self.handle.write_sample_data(
                self.stream_indices[sample.track],
                &sample.data,
                0,
                sample.info.size,
                sample.info.presentation_time_us,
                sample.info.flags,
            );
            if let Err(e) = result {
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    pub fn write_sample_data(
        &mut self,
        target_track: usize,
        buffer: &[u8],
        info: BufferInfo,
    ) -> Result<()> {
        if target_track >= self.formats.len() {
            return Err(MuxError::invalid_argument(format!(
                "target track {} out of range",
                target_track
            )));
        }
        match &self.phase {
            Phase::Collecting => {}
            Phase::Failed(e) => return Err(e.clone()),
            // Released streams keep their index; the muxer answers InvalidState.
            Phase::Started | Phase::Released => {
                let stream_index = self
                    .stream_indices
                    .get(target_track)
                    .copied()
                    .unwrap_or(target_track as i32);
                return self.handle.write_sample_data(
                    stream_index,
                    buffer,
                    info.offset,
                    info.size,
                    info.presentation_time_us,
                    info.flags,
                );
            }
        }

        // The caller reuses its buffer, so keep a copy of the sample window.
        let data = Bytes::copy_from_slice(sample_window(buffer, info.offset, info.size)?);
        self.queue.push_back(QueuedSample {
            track: target_track,
            data,
            info: BufferInfo { offset: 0, ..info },
        });
        Ok(())
    }

    /// Stops the muxer if it was started and frees it. Queued samples that
    /// never got written are dropped. Idempotent.
    pub fn release(&mut self) {
        if self.phase == Phase::Started {
            if let Err(e) = self.handle.stop() {
                log::warn!("stop on release failed for {}: {}", self.output_path, e);
            }
        }
        if !self.queue.is_empty() {
            log::warn!(
                "dropping {} queued samples for {}",
                self.queue.len(),
                self.output_path
            );
            self.queue.clear();
        }
        self.handle.release();
        self.phase = Phase::Released;
    }
}
