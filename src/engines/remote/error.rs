use serde_json::Value;

use crate::error::SpeechError;

/// Provider status string that signals an exhausted character quota.
pub const QUOTA_EXCEEDED_STATUS: &str = "quota_exceeded";

pub const DEFAULT_PROVIDER_ERROR: &str = "Failed to generate speech with the remote provider.";

/// The `detail` object of a provider error document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProviderErrorInfo {
    pub status: String,
    pub message: String,
}

impl ProviderErrorInfo {
    /// Parse `{"detail": {"status": ..., "message": ...}}`.
    ///
    /// Never fails: input that is not such a document yields an empty status
    /// and the trimmed raw text as message.
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        let Ok(document) = serde_json::from_str::<Value>(raw) else {
            return Self {
                status: String::new(),
                message: raw.to_string(),
            };
        };

        let detail = document.get("detail");
        let text = |key: &str| {
            detail
                .and_then(|d| d.get(key))
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
        };

        Self {
            status: text("status").unwrap_or_default().to_string(),
            message: text("message").unwrap_or(raw).to_string(),
        }
    }

    pub fn is_quota_exceeded(&self) -> bool {
        self.status == QUOTA_EXCEEDED_STATUS
    }
}

/// Turn a failed `POST /api/elevenlabs/speech` response into an error.
///
/// The proxy wraps provider failures as `{ error, details, nextCharacterCountResetUnix }`
/// where `details` is the provider's own error document as a string; a bare
/// provider document is accepted too. `429`, or a provider status of
/// `quota_exceeded`, is quota exhaustion.
pub fn classify_failure(status: u16, body: &str) -> SpeechError {
    let envelope = serde_json::from_str::<Value>(body.trim()).ok();
    let field = |name: &str| envelope.as_ref().and_then(|e| e.get(name));

    let details = match field("details") {
        Some(Value::String(s)) => Some(s.clone()),
        Some(Value::Null) | None => None,
        Some(other) => Some(other.to_string()),
    };
    let info = ProviderErrorInfo::parse(details.as_deref().unwrap_or(body));

    if status == 429 || info.is_quota_exceeded() {
        return SpeechError::QuotaExceeded {
            reset_unix: field("nextCharacterCountResetUnix").and_then(Value::as_i64),
        };
    }

    let headline = field("error")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty());

    let message = match (headline, details.is_some()) {
        (Some(headline), true) => join_message(headline, &info.message),
        (Some(headline), false) => headline.to_string(),
        (None, true) => join_message(DEFAULT_PROVIDER_ERROR, &info.message),
        (None, false) if info.message.is_empty() => DEFAULT_PROVIDER_ERROR.to_string(),
        (None, false) => info.message,
    };

    SpeechError::ProviderRequest(message)
}

fn join_message(headline: &str, detail: &str) -> String {
    if detail.is_empty() {
        headline.to_string()
    } else {
        format!("{headline} {detail}")
    }
}
