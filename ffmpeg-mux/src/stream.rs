use bytes::Bytes;
use ffmpeg_next::{Rational, codec, media};

use crate::{
    engine::{CodecLookup, ContainerContext},
    error::{EngineOp, MuxError, Result, translate},
};

/// What the engine knows about a codec name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodecDescriptor {
    pub name: String,
    pub id: codec::Id,
    pub medium: media::Type,
}

/// Kind-specific stream parameters as supplied by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamParams {
    Video {
        width: u32,
        height: u32,
        frame_rate: u32,
    },
    Audio {
        channels: u32,
        sample_rate: u32,
    },
}

impl StreamParams {
    pub fn medium(&self) -> media::Type {
        match self {
            StreamParams::Video { .. } => media::Type::Video,
            StreamParams::Audio { .. } => media::Type::Audio,
        }
    }

    /// 1/frame_rate for video, 1/sample_rate for audio.
    fn time_base(&self) -> Result<Rational> {
        let (what, rate) = match *self {
            StreamParams::Video { frame_rate, .. } => ("frame rate", frame_rate),
            StreamParams::Audio { sample_rate, .. } => ("sample rate", sample_rate),
        };
        match i32::try_from(rate) {
            Ok(rate) if rate > 0 => Ok(Rational::new(1, rate)),
            _ => Err(MuxError::invalid_argument(format!(
                "{} must be positive, got {}",
                what, rate
            ))),
        }
    }

    fn validate(&self) -> Result<()> {
        match *self {
            StreamParams::Video { width, height, .. } => {
                if width == 0 || height == 0 || i32::try_from(width.max(height)).is_err() {
                    return Err(MuxError::invalid_argument(format!(
                        "invalid video size {}x{}",
                        width, height
                    )));
                }
            }
            StreamParams::Audio { channels, .. } => {
                if channels == 0 || i32::try_from(channels).is_err() {
                    return Err(MuxError::invalid_argument(format!(
                        "invalid channel count {}",
                        channels
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Caller inputs for one stream declaration.
#[derive(Debug, Clone)]
pub struct StreamSpec {
    pub codec_name: String,
    pub bit_rate: i64,
    pub params: StreamParams,
    /// Out-of-band codec configuration (avcC, AudioSpecificConfig, ...).
    pub config: Bytes,
}

impl StreamSpec {
    pub fn video(
        codec_name: &str,
        bit_rate: i64,
        width: u32,
        height: u32,
        frame_rate: u32,
        config: &[u8],
    ) -> Self {
        Self {
            codec_name: codec_name.to_string(),
            bit_rate,
            params: StreamParams::Video {
                width,
                height,
                frame_rate,
            },
            config: Bytes::copy_from_slice(config),
        }
    }

    pub fn audio(
        codec_name: &str,
        bit_rate: i64,
        channels: u32,
        sample_rate: u32,
        config: &[u8],
    ) -> Self {
        Self {
            codec_name: codec_name.to_string(),
            bit_rate,
            params: StreamParams::Audio {
                channels,
                sample_rate,
            },
            config: Bytes::copy_from_slice(config),
        }
    }
}

/// Per-stream write counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamStats {
    pub samples: u64,
    pub bytes: u64,
    pub last_pts: Option<i64>,
}

/// One declared elementary stream. Its index never changes once assigned.
#[derive(Debug, Clone)]
pub struct StreamDescriptor {
    index: usize,
    codec: CodecDescriptor,
    bit_rate: i64,
    time_base: Rational,
    params: StreamParams,
    config: Bytes,
    stats: StreamStats,
}

impl StreamDescriptor {
    pub fn index(&self) -> usize {
        self.index
    }
    pub fn codec(&self) -> &CodecDescriptor {
        &self.codec
    }
    pub fn bit_rate(&self) -> i64 {
        self.bit_rate
    }
    pub fn time_base(&self) -> Rational {
        self.time_base
    }
    pub fn params(&self) -> &StreamParams {
        &self.params
    }
    pub fn config(&self) -> &Bytes {
        &self.config
    }
    pub fn stats(&self) -> StreamStats {
        self.stats
    }

    pub fn is_video(&self) -> bool {
        self.codec.medium == media::Type::Video
    }

    pub fn is_audio(&self) -> bool {
        self.codec.medium == media::Type::Audio
    }
}

/// Declared streams of one muxer, in declaration order.
///
/// Codec names are resolved through the injected [`CodecLookup`]; the
/// registry itself never consults global engine state.
pub struct StreamRegistry<L> {
    lookup: L,
    streams: Vec<StreamDescriptor>,
}

impl<L: CodecLookup> StreamRegistry<L> {
    pub fn new(lookup: L) -> Self {
        Self {
            lookup,
            streams: Vec::new(),
        }
    }

    /// Index the next successful declaration will receive.
    pub fn next_index(&self) -> usize {
        self.streams.len()
    }

    pub fn len(&self) -> usize {
        self.streams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&StreamDescriptor> {
        self.streams.get(index)
    }

    pub fn streams(&self) -> &[StreamDescriptor] {
        &self.streams
    }

    /// Builds the descriptor for `spec` without registering it.
    fn resolve(&self, spec: StreamSpec) -> Result<StreamDescriptor> {
        let codec = self
            .lookup
            .find_by_name(&spec.codec_name)
            .ok_or_else(|| MuxError::UnknownCodec(spec.codec_name.clone()))?;
        if codec.medium != spec.params.medium() {
            return Err(MuxError::UnknownCodec(format!(
                "{} is a {:?} codec, expected {:?}",
                spec.codec_name,
                codec.medium,
                spec.params.medium()
            )));
        }
        spec.params.validate()?;
        let time_base = spec.params.time_base()?;

        Ok(StreamDescriptor {
            index: self.next_index(),
            codec,
            bit_rate: spec.bit_rate,
            time_base,
            params: spec.params,
            config: spec.config,
            stats: StreamStats::default(),
        })
    }

    /// Resolves `spec`, asks the context for a stream slot and records the
    /// stream. Nothing is recorded (and no slot is taken) when the codec
    /// cannot be resolved.
    pub fn declare<C: ContainerContext>(
        &mut self,
        context: &mut C,
        spec: StreamSpec,
        target: &str,
    ) -> Result<usize> {
        let descriptor = self.resolve(spec)?;
        let slot = context
            .new_stream_slot(&descriptor)
            .map_err(|e| translate(EngineOp::NewStreamSlot, target, e))?;
        debug_assert_eq!(slot, descriptor.index, "engine stream slot out of order");

        let index = descriptor.index;
        log::debug!(
            "declared stream {}: codec={} time_base={}/{} params={:?}",
            index,
            descriptor.codec.name,
            descriptor.time_base.numerator(),
            descriptor.time_base.denominator(),
            descriptor.params
        );
        self.streams.push(descriptor);
        Ok(index)
    }

    pub(crate) fn record_write(&mut self, index: usize, bytes: usize, pts: i64) {
        if let Some(stream) = self.streams.get_mut(index) {
            stream.stats.samples += 1;
            stream.stats.bytes += bytes as u64;
            stream.stats.last_pts = Some(pts);
        }
    }
}
