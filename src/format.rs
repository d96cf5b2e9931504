//! Output container names, MIME types and track descriptions.

use std::{fmt, path::Path, str::FromStr};

use ffmpeg_mux::StreamSpec;
use serde::{Deserialize, Serialize};

/// Containers the muxer is routinely asked for, by their FFmpeg short names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    Mp4,
    Matroska,
    Webm,
    StreamSegment,
    Wav,
    Adts,
}

impl OutputFormat {
    pub fn name(self) -> &'static str {
        match self {
            OutputFormat::Mp4 => "mp4",
            OutputFormat::Matroska => "matroska",
            OutputFormat::Webm => "webm",
            OutputFormat::StreamSegment => "stream_segment",
            OutputFormat::Wav => "wav",
            OutputFormat::Adts => "adts",
        }
    }

    /// Picks a format from the file extension, e.g. `out.mkv` -> matroska.
    pub fn guess_from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        let format = match ext.as_str() {
            "mp4" | "m4a" | "m4v" => OutputFormat::Mp4,
            "mkv" | "mka" => OutputFormat::Matroska,
            "webm" => OutputFormat::Webm,
            "wav" => OutputFormat::Wav,
            "aac" => OutputFormat::Adts,
            _ => return None,
        };
        Some(format)
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for OutputFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let format = match s.to_ascii_lowercase().as_str() {
            "mp4" | "mpeg4" => OutputFormat::Mp4,
            "matroska" | "mkv" => OutputFormat::Matroska,
            "webm" => OutputFormat::Webm,
            "stream_segment" | "segment" => OutputFormat::StreamSegment,
            "wav" => OutputFormat::Wav,
            "adts" => OutputFormat::Adts,
            _ => anyhow::bail!("unknown output format: {}", s),
        };
        Ok(format)
    }
}

pub mod mime {
    pub const AUDIO_AAC: &str = "audio/mp4a-latm";
    pub const AUDIO_RAW: &str = "audio/raw";
    pub const AUDIO_OPUS: &str = "audio/opus";
    pub const AUDIO_VORBIS: &str = "audio/vorbis";

    pub const VIDEO_AVC: &str = "video/avc";
    pub const VIDEO_HEVC: &str = "video/hevc";
    pub const VIDEO_VP8: &str = "video/x-vnd.on2.vp8";
    pub const VIDEO_VP9: &str = "video/x-vnd.on2.vp9";
    pub const VIDEO_AV1: &str = "video/av01";

    pub fn is_video(mime: &str) -> bool {
        mime.starts_with("video/")
    }

    pub fn is_audio(mime: &str) -> bool {
        mime.starts_with("audio/")
    }

    /// FFmpeg codec name for a MIME type. Unknown types fall back to their
    /// subtype, which matches FFmpeg's naming for many codecs.
    pub fn codec_name(mime: &str) -> String {
        let name = match mime {
            VIDEO_AVC => "h264",
            VIDEO_HEVC => "hevc",
            VIDEO_VP8 => "vp8",
            VIDEO_VP9 => "vp9",
            VIDEO_AV1 => "av1",
            AUDIO_AAC => "aac",
            AUDIO_OPUS => "opus",
            AUDIO_VORBIS => "vorbis",
            AUDIO_RAW => "pcm_s16le",
            other => other.rsplit('/').next().unwrap_or(other),
        };
        name.to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum TrackParams {
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

/// Description of one track as an encoder reports it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackFormat {
    pub mime: String,
    #[serde(default)]
    pub bit_rate: i64,
    #[serde(flatten)]
    pub params: TrackParams,
    #[serde(default)]
    pub codec_config: Vec<u8>,
}

impl TrackFormat {
    pub fn video(mime: &str, bit_rate: i64, width: u32, height: u32, frame_rate: u32) -> Self {
        Self {
            mime: mime.to_string(),
            bit_rate,
            params: TrackParams::Video {
                width,
                height,
                frame_rate,
            },
            codec_config: Vec::new(),
        }
    }

    pub fn audio(mime: &str, bit_rate: i64, channels: u32, sample_rate: u32) -> Self {
        Self {
            mime: mime.to_string(),
            bit_rate,
            params: TrackParams::Audio {
                channels,
                sample_rate,
            },
            codec_config: Vec::new(),
        }
    }

    pub fn with_codec_config(mut self, config: &[u8]) -> Self {
        self.codec_config = config.to_vec();
        self
    }

    pub fn codec_name(&self) -> String {
        mime::codec_name(&self.mime)
    }

    pub fn to_stream_spec(&self) -> StreamSpec {
        let codec = self.codec_name();
        match self.params {
            TrackParams::Video {
                width,
                height,
                frame_rate,
            } => StreamSpec::video(
                &codec,
                self.bit_rate,
                width,
                height,
                frame_rate,
                &self.codec_config,
            ),
            TrackParams::Audio {
                channels,
                sample_rate,
            } => StreamSpec::audio(
                &codec,
                self.bit_rate,
                channels,
                sample_rate,
                &self.codec_config,
            ),
        }
    }
}
