//! On-device speech synthesis.
//!
//! The driver talks to any [`LocalSynthesisEngine`]; [`EspeakEngine`] is the
//! bundled implementation backed by the `espeak-ng` binary.
//!
//! # System Requirements
//!
//! **espeak-ng** must be installed for [`EspeakEngine`]:
//! - **Linux**: `sudo apt-get install espeak-ng`
//! - **macOS**: `brew install espeak-ng`
//! - **Windows**: Download installer from <https://espeak-ng.org/download>

pub mod driver;
pub mod espeak;
pub mod voices;

use async_trait::async_trait;

use crate::error::SpeechError;

pub use driver::LocalSpeechDriver;
pub use espeak::EspeakEngine;
pub use voices::{select_voice, voice_matches_language};

/// A voice offered by the local engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Voice {
    /// Stable identifier (the browser's voice URI, espeak's voice file).
    pub id: String,
    pub name: String,
    /// BCP 47-ish language tag, e.g. `pt-BR`.
    pub lang: String,
}

impl Voice {
    pub fn new(id: impl Into<String>, name: impl Into<String>, lang: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            lang: lang.into(),
        }
    }
}

/// One piece of text to speak.
#[derive(Debug, Clone, PartialEq)]
pub struct Utterance {
    pub text: String,
    /// `None` lets the engine pick a default voice for `lang`.
    pub voice: Option<Voice>,
    pub lang: String,
    pub rate: f32,
}

impl Utterance {
    /// Build an utterance; the voice's own language wins over `fallback_lang`.
    pub fn new(text: impl Into<String>, voice: Option<&Voice>, fallback_lang: &str, rate: f32) -> Self {
        Self {
            text: text.into(),
            lang: voice
                .map(|v| v.lang.clone())
                .unwrap_or_else(|| fallback_lang.to_string()),
            voice: voice.cloned(),
            rate,
        }
    }
}

/// Capability interface over an on-device speech engine.
#[async_trait]
pub trait LocalSynthesisEngine: Send + Sync {
    /// Whether the engine can speak at all on this machine.
    fn is_available(&self) -> bool {
        true
    }

    /// Current voice catalog. May be empty until the engine has loaded it.
    fn voices(&self) -> Vec<Voice>;

    /// Speak one utterance, resolving when it ends or fails.
    ///
    /// Dropping the future must stop the utterance.
    async fn speak(&self, utterance: Utterance) -> Result<(), SpeechError>;

    /// Cancel whatever is being spoken right now.
    fn cancel(&self);
}
