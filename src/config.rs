use std::sync::LazyLock;

use crate::pcm::PcmLayout;

/// Defaults for the command-line host, overridable through the environment:
/// `LITR_MUX_CHANNELS`, `LITR_MUX_SAMPLE_RATE`, `LITR_MUX_SAMPLES_PER_PACKET`.
pub struct MuxConfig {
    channels: u32,
    sample_rate: u32,
    samples_per_packet: u32,
}

impl MuxConfig {
    pub fn new(channels: u32, sample_rate: u32, samples_per_packet: u32) -> Self {
        Self {
            channels,
            sample_rate,
            samples_per_packet,
        }
    }

    fn from_env() -> Self {
        Self::new(
            env_u32("LITR_MUX_CHANNELS", 2),
            env_u32("LITR_MUX_SAMPLE_RATE", 44_100),
            env_u32("LITR_MUX_SAMPLES_PER_PACKET", 1024),
        )
    }

    pub fn pcm_layout(&self) -> PcmLayout {
        PcmLayout {
            channels: self.channels,
            sample_rate: self.sample_rate,
            samples_per_packet: self.samples_per_packet,
        }
    }
}

fn env_u32(key: &str, default: u32) -> u32 {
    match std::env::var(key) {
        Ok(value) => value.parse().unwrap_or_else(|_| {
            log::warn!("ignoring {}={:?}, using {}", key, value, default);
            default
        }),
        Err(_) => default,
    }
}

pub fn config() -> &'static MuxConfig {
    static CONFIG: LazyLock<MuxConfig> = LazyLock::new(MuxConfig::from_env);
    &CONFIG
}
