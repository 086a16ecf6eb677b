use std::time::Duration;

use derive_builder::Builder;

use crate::segmenter::{LOCAL_CHUNK_LIMIT, REMOTE_CHUNK_LIMIT};

/// Environment variable holding the backend base URL.
pub const API_BASE_ENV: &str = "BIOGRAPHY_API_BASE_URL";

const DEFAULT_API_BASE: &str = "http://localhost:3001";

/// Parameters for the playback controller and its drivers.
///
/// ```rust
/// use biography_speech::PlayerConfigBuilder;
/// use std::time::Duration;
///
/// let config = PlayerConfigBuilder::default()
///     .api_base_url("https://bio.example.org/")
///     .watchdog(Duration::from_secs(10))
///     .build()?;
/// assert_eq!(config.api_url("api/biography"), "https://bio.example.org/api/biography");
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Debug, Clone, Builder)]
#[builder(default)]
pub struct PlayerConfig {
    /// Base URL of the backend serving `/api/biography` and `/api/elevenlabs/*`.
    #[builder(setter(into))]
    pub api_base_url: String,
    /// Maximum characters per local utterance.
    pub local_chunk_limit: usize,
    /// Maximum characters per remote synthesis request.
    pub remote_chunk_limit: usize,
    /// Hard ceiling the proxy accepts for one request.
    pub max_request_chars: usize,
    /// Per-chunk watchdog for the local engine.
    pub watchdog: Duration,
    /// Pause before retrying a chunk with the automatic voice.
    pub retry_delay: Duration,
    /// Pause between consecutive local chunks.
    pub chunk_gap: Duration,
    /// Local utterance rate, 1.0 is the engine default.
    pub speech_rate: f32,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE.to_string(),
            local_chunk_limit: LOCAL_CHUNK_LIMIT,
            remote_chunk_limit: REMOTE_CHUNK_LIMIT,
            max_request_chars: 15_000,
            watchdog: Duration::from_secs(15),
            retry_delay: Duration::from_millis(120),
            chunk_gap: Duration::from_millis(10),
            speech_rate: 1.0,
        }
    }
}

impl PlayerConfig {
    /// Default configuration with the base URL taken from `BIOGRAPHY_API_BASE_URL`, if set.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        match std::env::var(API_BASE_ENV) {
            Ok(base) if !base.trim().is_empty() => {
                config.api_base_url = base.trim().to_string();
            }
            _ => log::debug!("{API_BASE_ENV} not set, using {DEFAULT_API_BASE}"),
        }
        config
    }

    /// Join the base URL and an endpoint path with exactly one slash.
    pub fn api_url(&self, path: &str) -> String {
        let base = self.api_base_url.trim_end_matches('/');
        let path = path.trim_start_matches('/');
        format!("{base}/{path}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_engine_limits() {
        let config = PlayerConfig::default();
        assert_eq!(config.local_chunk_limit, 220);
        assert_eq!(config.remote_chunk_limit, 1200);
        assert_eq!(config.watchdog, Duration::from_secs(15));
    }

    #[test]
    fn builder_keeps_unset_fields_at_default() {
        let config = PlayerConfigBuilder::default()
            .remote_chunk_limit(800)
            .build()
            .unwrap();
        assert_eq!(config.remote_chunk_limit, 800);
        assert_eq!(config.api_base_url, DEFAULT_API_BASE);
        assert_eq!(config.retry_delay, Duration::from_millis(120));
    }

    #[test]
    fn api_url_normalizes_slashes() {
        let mut config = PlayerConfig::default();
        config.api_base_url = "http://host:9000///".to_string();
        assert_eq!(config.api_url("/api/biography"), "http://host:9000/api/biography");
        assert_eq!(
            config.api_url("api/elevenlabs/voices"),
            "http://host:9000/api/elevenlabs/voices"
        );
    }
}
