//! # biography-speech
//!
//! Read-aloud playback for a biography page, with two interchangeable engines.
//!
//! ## Features
//!
//! - **Local engine**: on-device synthesis through `espeak-ng`, chunk by chunk,
//!   with a watchdog and a single retry on the automatic voice
//! - **Remote engine**: audio generated by the backend's TTS proxy, prefetched
//!   one chunk ahead of playback, with quota detection
//! - **Session control**: start/stop toggling where no stale task can touch
//!   the state of a newer session
//!
//! ## Quick Start
//!
//! ```toml
//! [dependencies]
//! biography-speech = { version = "2026.2", features = ["rodio"] }
//! ```
//!
//! ```ignore
//! use std::sync::Arc;
//! use biography_speech::engines::local::EspeakEngine;
//! use biography_speech::engines::remote::{AudioGraph, ProxyClient, RodioBackend};
//! use biography_speech::{PlaybackController, PlayerConfig};
//!
//! let config = PlayerConfig::from_env();
//! let espeak = Arc::new(EspeakEngine::new());
//! espeak.load_voices().await?;
//!
//! let controller = PlaybackController::new(
//!     config.clone(),
//!     espeak,
//!     Arc::new(ProxyClient::new(config)),
//!     Arc::new(AudioGraph::new(Arc::new(RodioBackend))),
//! );
//! controller.load_document(&reqwest::Client::new()).await?;
//! controller.toggle()?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod config;
pub mod controller;
pub mod document;
pub mod engines;
pub mod error;
pub mod segmenter;
pub mod session;
pub mod settings;
pub mod state;

#[cfg(test)]
pub(crate) mod testing;

use std::path::Path;

pub use config::{PlayerConfig, PlayerConfigBuilder};
pub use controller::PlaybackController;
pub use document::{BiographyDocument, Section};
pub use engines::DriverOutcome;
pub use error::{Result, SpeechError};
pub use settings::{EngineKind, SettingsPatch, SpeechSettings};
pub use state::{PlaybackState, QuotaCountdown, QuotaState, StatusMessage};

/// Decoded PCM audio, interleaved when `channels > 1`.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedAudio {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub channels: u16,
}

impl DecodedAudio {
    /// Write the audio to a 32-bit float WAV file.
    pub fn write_wav(&self, path: &Path) -> Result<(), hound::Error> {
        let spec = hound::WavSpec {
            channels: self.channels,
            sample_rate: self.sample_rate,
            bits_per_sample: 32,
            sample_format: hound::SampleFormat::Float,
        };
        let mut writer = hound::WavWriter::create(path, spec)?;
        for &sample in &self.samples {
            writer.write_sample(sample)?;
        }
        writer.finalize()
    }

    /// Duration of the audio in seconds.
    pub fn duration_secs(&self) -> f64 {
        let frames = self.samples.len() / usize::from(self.channels.max(1));
        frames as f64 / self.sample_rate as f64
    }
}
