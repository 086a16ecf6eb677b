use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::ACCEPT;
use reqwest::StatusCode;

use super::error::classify_failure;
use super::{RemoteVoice, SpeechProvider, SpeechRequest, Subscription, VoiceList};
use crate::config::PlayerConfig;
use crate::error::SpeechError;

const VOICES_PATH: &str = "/api/elevenlabs/voices";
const SUBSCRIPTION_PATH: &str = "/api/elevenlabs/subscription";
const SPEECH_PATH: &str = "/api/elevenlabs/speech";

const NOT_CONFIGURED_MESSAGE: &str = "Remote speech is not configured on the server.";

/// [`SpeechProvider`] backed by the biography backend's TTS proxy.
///
/// ```rust,no_run
/// use biography_speech::engines::remote::{ProxyClient, SpeechProvider};
/// use biography_speech::PlayerConfig;
///
/// # async fn demo() -> Result<(), biography_speech::SpeechError> {
/// let client = ProxyClient::new(PlayerConfig::from_env());
/// for voice in client.voices().await? {
///     println!("{} ({})", voice.name, voice.voice_id);
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct ProxyClient {
    http: reqwest::Client,
    config: PlayerConfig,
}

impl ProxyClient {
    pub fn new(config: PlayerConfig) -> Self {
        Self::with_client(reqwest::Client::new(), config)
    }

    /// Share an existing connection pool.
    pub fn with_client(http: reqwest::Client, config: PlayerConfig) -> Self {
        Self { http, config }
    }

    fn validate(&self, request: &SpeechRequest) -> Result<(), SpeechError> {
        if request.text.trim().is_empty() {
            return Err(SpeechError::Validation("No text to synthesize.".into()));
        }
        let length = request.text.chars().count();
        if length > self.config.max_request_chars {
            return Err(SpeechError::Validation(format!(
                "Text is {length} characters, the limit per request is {}.",
                self.config.max_request_chars
            )));
        }
        if request.voice_id.trim().is_empty() {
            return Err(SpeechError::Validation(
                "Select a remote voice before starting playback.".into(),
            ));
        }
        Ok(())
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        what: &str,
    ) -> Result<T, SpeechError> {
        let url = self.config.api_url(path);
        let response = self.http.get(&url).send().await?;
        let status = response.status();

        if status == StatusCode::SERVICE_UNAVAILABLE {
            return Err(SpeechError::ProviderRequest(NOT_CONFIGURED_MESSAGE.into()));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            log::warn!("GET {url} failed with {status}: {body}");
            return Err(SpeechError::ProviderRequest(format!(
                "Failed to load {what} ({status})."
            )));
        }

        let bytes = response.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

#[async_trait]
impl SpeechProvider for ProxyClient {
    async fn voices(&self) -> Result<Vec<RemoteVoice>, SpeechError> {
        let list: VoiceList = self.get_json(VOICES_PATH, "remote voices").await?;
        log::debug!("Remote provider offers {} voices", list.voices.len());
        Ok(list.voices)
    }

    async fn subscription(&self) -> Result<Subscription, SpeechError> {
        self.get_json(SUBSCRIPTION_PATH, "the remote subscription").await
    }

    async fn synthesize(&self, request: &SpeechRequest) -> Result<Bytes, SpeechError> {
        self.validate(request)?;

        let url = self.config.api_url(SPEECH_PATH);
        log::debug!(
            "POST {url}: {} chars, voice {}",
            request.text.chars().count(),
            request.voice_id
        );
        let response = self
            .http
            .post(&url)
            .header(ACCEPT, "audio/mpeg")
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(response.bytes().await?);
        }

        let body = response.text().await.unwrap_or_default();
        let error = classify_failure(status.as_u16(), &body);
        log::warn!("Speech request failed with {status}: {error}");
        Err(error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::serve_once;

    fn client(base: String) -> ProxyClient {
        ProxyClient::new(PlayerConfig {
            api_base_url: base,
            max_request_chars: 20,
            ..Default::default()
        })
    }

    fn request(text: &str) -> SpeechRequest {
        SpeechRequest {
            text: text.into(),
            voice_id: "v1".into(),
            language_code: "pt".into(),
        }
    }

    #[tokio::test]
    async fn rejects_bad_requests_before_any_io() {
        // Nothing listens on the discard port.
        let client = client("http://127.0.0.1:9".into());

        assert!(matches!(
            client.synthesize(&request("   ")).await,
            Err(SpeechError::Validation(_))
        ));
        assert!(matches!(
            client.synthesize(&request(&"a".repeat(21))).await,
            Err(SpeechError::Validation(_))
        ));
        let mut no_voice = request("olá");
        no_voice.voice_id = " ".into();
        assert!(matches!(
            client.synthesize(&no_voice).await,
            Err(SpeechError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn posts_camel_case_body_and_returns_audio() {
        let (base, server) = serve_once("200 OK", "audio/mpeg", b"ID3fake".to_vec()).await;

        let audio = client(base).synthesize(&request("Curitiba")).await.unwrap();
        assert_eq!(&audio[..], b"ID3fake");

        let received = server.await.unwrap();
        assert!(received.starts_with("POST /api/elevenlabs/speech"));
        assert!(received.contains(r#""voiceId":"v1""#));
        assert!(received.contains(r#""languageCode":"pt""#));
    }

    #[tokio::test]
    async fn too_many_requests_maps_to_quota() {
        let body = br#"{"detail":{"status":"quota_exceeded"}}"#.to_vec();
        let (base, server) = serve_once("429 Too Many Requests", "application/json", body).await;

        let err = client(base).synthesize(&request("Curitiba")).await.unwrap_err();
        assert!(matches!(err, SpeechError::QuotaExceeded { reset_unix: None }));
        server.await.unwrap();
    }

    #[tokio::test]
    async fn unconfigured_provider_has_clear_message() {
        let (base, server) = serve_once("503 Service Unavailable", "application/json", b"{}".to_vec()).await;

        let err = client(base).voices().await.unwrap_err();
        assert_eq!(err.to_string(), NOT_CONFIGURED_MESSAGE);
        server.await.unwrap();
    }

    #[tokio::test]
    async fn reads_voices_and_subscription() {
        let body = br#"{"voices":[{"voiceId":"v1","name":"Rachel","category":"premade"}]}"#.to_vec();
        let (base, server) = serve_once("200 OK", "application/json", body).await;
        let voices = client(base).voices().await.unwrap();
        assert_eq!(voices.len(), 1);
        assert_eq!(voices[0].name, "Rachel");
        assert!(server.await.unwrap().starts_with("GET /api/elevenlabs/voices"));

        let body = br#"{"nextCharacterCountResetUnix":1767225600,"characterCount":10}"#.to_vec();
        let (base, server) = serve_once("200 OK", "application/json", body).await;
        let subscription = client(base).subscription().await.unwrap();
        assert_eq!(subscription.next_character_count_reset_unix, Some(1_767_225_600));
        assert_eq!(subscription.character_count, Some(10));
        assert_eq!(subscription.character_limit, None);
        server.await.unwrap();
    }
}
