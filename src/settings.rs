use serde::{Deserialize, Serialize};

/// Language codes offered to the visitor, with display labels.
pub const SUPPORTED_LANGUAGES: &[(&str, &str)] = &[
    ("pt", "Português"),
    ("en", "English"),
    ("es", "Español"),
    ("fr", "Français"),
    ("de", "Deutsch"),
    ("it", "Italiano"),
    ("ja", "Japanese"),
];

const DEFAULT_SPEECH_LANG: &str = "pt-BR";

/// Which engine produces audio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
    /// On-device synthesis.
    #[default]
    Local,
    /// Audio generated by the remote TTS proxy.
    Remote,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeechSettings {
    pub engine: EngineKind,
    pub language_code: String,
    /// `None` means automatic selection.
    pub local_voice_id: Option<String>,
    pub remote_voice_id: Option<String>,
    pub remote_voice_name: Option<String>,
}

impl Default for SpeechSettings {
    fn default() -> Self {
        Self {
            engine: EngineKind::Local,
            language_code: "pt".to_string(),
            local_voice_id: None,
            remote_voice_id: None,
            remote_voice_name: None,
        }
    }
}

/// A partial settings update. `None` leaves a field untouched; for nullable
/// fields `Some(None)` clears it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SettingsPatch {
    pub engine: Option<EngineKind>,
    pub language_code: Option<String>,
    pub local_voice_id: Option<Option<String>>,
    pub remote_voice_id: Option<Option<String>>,
    pub remote_voice_name: Option<Option<String>>,
}

impl SettingsPatch {
    pub fn engine(engine: EngineKind) -> Self {
        Self {
            engine: Some(engine),
            ..Default::default()
        }
    }

    pub fn language(code: impl Into<String>) -> Self {
        Self {
            language_code: Some(code.into()),
            ..Default::default()
        }
    }

    pub fn local_voice(voice_id: Option<String>) -> Self {
        Self {
            local_voice_id: Some(voice_id),
            ..Default::default()
        }
    }

    /// Select a remote voice, switching to the remote engine.
    pub fn remote_voice(voice_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            engine: Some(EngineKind::Remote),
            remote_voice_id: Some(Some(voice_id.into())),
            remote_voice_name: Some(Some(name.into())),
            ..Default::default()
        }
    }

    /// True when the patch touches engine, language or a voice selection.
    pub fn changes_pipeline(&self) -> bool {
        self.engine.is_some()
            || self.language_code.is_some()
            || self.local_voice_id.is_some()
            || self.remote_voice_id.is_some()
    }

    /// A language change without an explicit local voice resets it to automatic.
    pub fn resets_local_voice(&self) -> bool {
        self.language_code.is_some() && self.local_voice_id.is_none()
    }
}

/// What the local driver needs, frozen at session start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalSnapshot {
    pub voice_id: Option<String>,
    pub language_code: String,
}

/// What the remote driver needs, frozen at session start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteSnapshot {
    pub voice_id: String,
    pub language_code: String,
}

impl SpeechSettings {
    pub fn apply(&mut self, patch: SettingsPatch) {
        let reset_local = patch.resets_local_voice();
        if let Some(engine) = patch.engine {
            self.engine = engine;
        }
        if let Some(code) = patch.language_code {
            self.language_code = code;
        }
        if let Some(voice) = patch.local_voice_id {
            self.local_voice_id = voice;
        } else if reset_local {
            self.local_voice_id = None;
        }
        if let Some(voice) = patch.remote_voice_id {
            self.remote_voice_id = voice;
        }
        if let Some(name) = patch.remote_voice_name {
            self.remote_voice_name = name;
        }
    }

    pub fn local_snapshot(&self) -> LocalSnapshot {
        LocalSnapshot {
            voice_id: self.local_voice_id.clone(),
            language_code: self.language_code.clone(),
        }
    }

    /// `None` when no remote voice is selected.
    pub fn remote_snapshot(&self) -> Option<RemoteSnapshot> {
        let voice_id = self.remote_voice_id.as_deref()?.trim();
        if voice_id.is_empty() {
            return None;
        }
        Some(RemoteSnapshot {
            voice_id: voice_id.to_string(),
            language_code: self.language_code.clone(),
        })
    }
}

/// Map a short language code to a full speech language tag.
///
/// Tags that already carry a region (`en-GB`) pass through; unknown codes
/// map to `pt-BR`.
pub fn to_speech_lang_code(language_code: &str) -> String {
    if language_code.contains('-') {
        return language_code.to_string();
    }
    let tag = match language_code {
        "pt" => "pt-BR",
        "en" => "en-US",
        "es" => "es-ES",
        "fr" => "fr-FR",
        "de" => "de-DE",
        "it" => "it-IT",
        "ja" => "ja-JP",
        _ => DEFAULT_SPEECH_LANG,
    };
    tag.to_string()
}
