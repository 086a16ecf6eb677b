//! Remote text-to-speech through the backend proxy.
//!
//! The proxy exposes three endpoints:
//!
//! | Endpoint | Result |
//! |---|---|
//! | `GET /api/elevenlabs/voices` | voice catalog, `503` when the provider is not configured |
//! | `GET /api/elevenlabs/subscription` | character usage and the next quota reset |
//! | `POST /api/elevenlabs/speech` | `audio/mpeg` bytes, or a JSON error body |
//!
//! Audio is played through the [`AudioBackend`] capability, so the driver
//! runs the same against a real output device or a test double.

pub mod audio;
pub mod client;
pub mod driver;
pub mod error;
#[cfg(feature = "rodio")]
pub mod rodio_output;

use std::collections::HashMap;

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::SpeechError;

pub use audio::{AudioBackend, AudioContext, AudioGraph, AudioSource, StartedSource};
pub use client::ProxyClient;
pub use driver::RemoteSpeechDriver;
pub use error::ProviderErrorInfo;
#[cfg(feature = "rodio")]
pub use rodio_output::RodioBackend;

/// A voice offered by the remote provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteVoice {
    pub voice_id: String,
    pub name: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub preview_url: String,
    #[serde(default)]
    pub labels: HashMap<String, String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct VoiceList {
    #[serde(default)]
    pub voices: Vec<RemoteVoice>,
}

/// Character usage reported by the provider.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subscription {
    pub next_character_count_reset_unix: Option<i64>,
    #[serde(default)]
    pub character_count: Option<u64>,
    #[serde(default)]
    pub character_limit: Option<u64>,
}

/// Body of `POST /api/elevenlabs/speech`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeechRequest {
    pub text: String,
    pub voice_id: String,
    pub language_code: String,
}

/// Capability interface over the remote TTS proxy.
#[async_trait]
pub trait SpeechProvider: Send + Sync {
    async fn voices(&self) -> Result<Vec<RemoteVoice>, SpeechError>;

    async fn subscription(&self) -> Result<Subscription, SpeechError>;

    /// Synthesize one chunk to encoded audio (MP3).
    ///
    /// Quota exhaustion is reported as [`SpeechError::QuotaExceeded`].
    async fn synthesize(&self, request: &SpeechRequest) -> Result<Bytes, SpeechError>;
}

/// Case-insensitive search over name, gender label and category. A blank term matches all.
pub fn filter_voices<'a>(voices: &'a [RemoteVoice], term: &str) -> Vec<&'a RemoteVoice> {
    let term = term.trim().to_lowercase();
    voices
        .iter()
        .filter(|voice| {
            if term.is_empty() {
                return true;
            }
            let gender = voice.labels.get("gender").map(String::as_str).unwrap_or_default();
            format!("{} {} {}", voice.name, gender, voice.category)
                .to_lowercase()
                .contains(&term)
        })
        .collect()
}
