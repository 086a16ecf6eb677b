#[derive(thiserror::Error, Debug)]
pub enum SpeechError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// Rejected before any I/O: missing voice selection, empty text, oversized request.
    #[error("{0}")]
    Validation(String),
    /// Non-success response from the remote TTS proxy that is not a quota refusal.
    #[error("{0}")]
    ProviderRequest(String),
    #[error("Remote speech quota exhausted")]
    QuotaExceeded { reset_unix: Option<i64> },
    /// Local synthesis stalled or errored after the fallback attempt.
    #[error("{0}")]
    PlaybackEngine(String),
    #[error("Audio output error: {0}")]
    Audio(String),
    /// Intentional cancellation. Never shown to the user.
    #[error("Request aborted")]
    Aborted,
    #[error(
        "espeak-ng not found. Install: Linux: `sudo apt-get install espeak-ng`, \
         macOS: `brew install espeak-ng`, Windows: https://espeak-ng.org/download"
    )]
    EspeakNotFound,
}

impl SpeechError {
    pub fn is_abort(&self) -> bool {
        matches!(self, SpeechError::Aborted)
    }
}

pub type Result<T, E = SpeechError> = std::result::Result<T, E>;
