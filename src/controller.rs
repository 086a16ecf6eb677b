//! Playback session controller.
//!
//! Owns the settings, the loaded document and the single active session.
//! Every start bumps the session generation, so a driver that is still
//! winding down can no longer touch the observable state.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::config::PlayerConfig;
use crate::document::{fetch_biography, BiographyDocument};
use crate::engines::local::{select_voice, LocalSpeechDriver, LocalSynthesisEngine, Voice};
use crate::engines::remote::{AudioGraph, RemoteSpeechDriver, RemoteVoice, SpeechProvider};
use crate::engines::DriverOutcome;
use crate::error::SpeechError;
use crate::segmenter::{build_speech_segments, split_into_chunks};
use crate::session::{SessionCounter, SessionTicket};
use crate::settings::{EngineKind, SettingsPatch, SpeechSettings};
use crate::state::{PlaybackState, QuotaState, StateHandle};

pub const INTERRUPTED_MESSAGE: &str = "Playback was interrupted to apply the new voice settings.";
pub const MISSING_REMOTE_VOICE_MESSAGE: &str = "Select a remote voice before starting playback.";
const NOT_LOADED_MESSAGE: &str = "The biography has not been loaded yet.";
const NO_TEXT_MESSAGE: &str = "There is no text to read.";
const LOCAL_UNAVAILABLE_MESSAGE: &str = "Local speech is not available on this device.";

type DriverRun = Pin<Box<dyn Future<Output = DriverOutcome> + Send>>;

/// Top-level playback state machine.
///
/// [`toggle`](Self::toggle) and [`stop`](Self::stop) spawn onto and signal
/// tokio tasks, so they must be called from within a tokio runtime.
pub struct PlaybackController {
    config: PlayerConfig,
    local: Arc<dyn LocalSynthesisEngine>,
    remote: Arc<dyn SpeechProvider>,
    graph: Arc<AudioGraph>,
    sessions: SessionCounter,
    state: StateHandle,
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    settings: SpeechSettings,
    document: Option<BiographyDocument>,
    segments: Vec<String>,
    load_error: Option<String>,
    active: Option<ActiveSession>,
}

struct ActiveSession {
    ticket: SessionTicket,
    cancel: CancellationToken,
}

impl PlaybackController {
    pub fn new(
        config: PlayerConfig,
        local: Arc<dyn LocalSynthesisEngine>,
        remote: Arc<dyn SpeechProvider>,
        graph: Arc<AudioGraph>,
    ) -> Self {
        Self {
            config,
            local,
            remote,
            graph,
            sessions: SessionCounter::new(),
            state: StateHandle::new(),
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Start with saved settings instead of the defaults.
    pub fn with_settings(self, settings: SpeechSettings) -> Self {
        self.lock().settings = settings;
        self
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn state(&self) -> PlaybackState {
        self.state.snapshot()
    }

    pub fn subscribe(&self) -> watch::Receiver<PlaybackState> {
        self.state.subscribe()
    }

    pub fn settings(&self) -> SpeechSettings {
        self.lock().settings.clone()
    }

    pub fn segments(&self) -> Vec<String> {
        self.lock().segments.clone()
    }

    pub fn load_error(&self) -> Option<String> {
        self.lock().load_error.clone()
    }

    /// Use `document` for the next sessions and clear any load error.
    pub fn set_document(&self, document: BiographyDocument) {
        let segments = build_speech_segments(&document);
        log::debug!("Document '{}' gives {} segments", document.title, segments.len());
        let mut inner = self.lock();
        inner.segments = segments;
        inner.document = Some(document);
        inner.load_error = None;
    }

    /// Record that the document could not be loaded. Blocks playback.
    pub fn set_load_error(&self, message: impl Into<String>) {
        let message = message.into();
        log::warn!("Biography unavailable: {message}");
        self.lock().load_error = Some(message);
    }

    /// Fetch the biography from the backend (bundled copy as fallback) and use it.
    pub async fn load_document(&self, client: &reqwest::Client) -> Result<(), SpeechError> {
        match fetch_biography(client, &self.config).await {
            Ok(document) => {
                self.set_document(document);
                Ok(())
            }
            Err(e) => {
                self.set_load_error(e.to_string());
                Err(e)
            }
        }
    }

    /// Current local catalog. Stores the automatic choice when no local voice is set.
    pub fn refresh_local_voices(&self) -> Vec<Voice> {
        let voices = self.local.voices();
        let mut inner = self.lock();
        if inner.settings.local_voice_id.is_none() {
            if let Some(voice) = select_voice(&voices, None, &inner.settings.language_code) {
                log::info!("Picked local voice {} ({})", voice.name, voice.lang);
                inner.settings.local_voice_id = Some(voice.id.clone());
            }
        }
        voices
    }

    pub async fn remote_voices(&self) -> Result<Vec<RemoteVoice>, SpeechError> {
        self.remote.voices().await
    }

    /// Whether [`toggle`](Self::toggle) can start playback right now.
    pub fn can_speak(&self) -> bool {
        let inner = self.lock();
        if inner.document.is_none() || inner.load_error.is_some() {
            return false;
        }
        match inner.settings.engine {
            EngineKind::Local => self.local.is_available(),
            EngineKind::Remote => inner.settings.remote_snapshot().is_some(),
        }
    }

    /// Stop when playing, otherwise start a new session on the configured engine.
    pub fn toggle(&self) -> Result<(), SpeechError> {
        if self.state.snapshot().is_busy() {
            self.stop();
            return Ok(());
        }
        self.start()
    }

    fn start(&self) -> Result<(), SpeechError> {
        let mut inner = self.lock();

        if let Some(error) = inner.load_error.clone() {
            return Err(self.reject(error));
        }
        if inner.document.is_none() {
            return Err(self.reject(NOT_LOADED_MESSAGE));
        }
        if inner.segments.is_empty() {
            return Err(self.reject(NO_TEXT_MESSAGE));
        }

        let cancel = CancellationToken::new();
        let engine = inner.settings.engine;
        let run: DriverRun;
        let ticket = match engine {
            EngineKind::Local => {
                if !self.local.is_available() {
                    return Err(self.reject(LOCAL_UNAVAILABLE_MESSAGE));
                }
                let text = inner.segments.join(" ");
                let chunks = split_into_chunks(&text, self.config.local_chunk_limit);
                let driver = LocalSpeechDriver::new(
                    Arc::clone(&self.local),
                    inner.settings.local_snapshot(),
                    &self.config,
                );
                let ticket = self.begin_session(&mut inner);
                run = Box::pin(driver.run(chunks, ticket.clone(), self.state.clone(), cancel.clone()));
                ticket
            }
            EngineKind::Remote => {
                let Some(snapshot) = inner.settings.remote_snapshot() else {
                    return Err(self.reject(MISSING_REMOTE_VOICE_MESSAGE));
                };
                let driver = RemoteSpeechDriver::new(
                    Arc::clone(&self.remote),
                    Arc::clone(&self.graph),
                    snapshot,
                    &self.config,
                );
                let segments = inner.segments.clone();
                let ticket = self.begin_session(&mut inner);
                run = Box::pin(driver.run(segments, ticket.clone(), self.state.clone(), cancel.clone()));
                ticket
            }
        };

        log::info!("Session {}: starting {engine:?} playback", ticket.id());
        // Busy from this call on, so a second toggle stops instead of restarting.
        self.state.update_for(&ticket, |s| {
            s.is_speaking = true;
            s.is_generating_audio = engine == EngineKind::Remote;
        });
        inner.active = Some(ActiveSession {
            ticket: ticket.clone(),
            cancel,
        });
        drop(inner);

        let state = self.state.clone();
        tokio::spawn(async move {
            let outcome = run.await;
            apply_outcome(&state, &ticket, outcome);
        });
        Ok(())
    }

    /// Cancel the previous session, clear transient state and hand out a fresh ticket.
    fn begin_session(&self, inner: &mut Inner) -> SessionTicket {
        if let Some(previous) = inner.active.take() {
            previous.cancel.cancel();
        }
        let ticket = self.sessions.begin();
        self.state.update(|s| {
            s.last_error_message.clear();
            s.quota = None;
        });
        ticket
    }

    fn reject(&self, message: impl Into<String>) -> SpeechError {
        let message = message.into();
        self.state.update(|s| {
            s.last_error_message = message.clone();
            s.quota = None;
        });
        SpeechError::Validation(message)
    }

    /// Invalidate the session, cancel its driver and release audio. Idempotent.
    pub fn stop(&self) {
        let active = self.lock().active.take();
        let generation = self.sessions.invalidate();
        if let Some(active) = active {
            log::info!(
                "Session {}: stopped (generation now {generation})",
                active.ticket.id()
            );
            active.cancel.cancel();
        }
        self.local.cancel();
        self.graph.release_source();
        self.state.update(|s| {
            s.is_speaking = false;
            s.is_generating_audio = false;
        });
    }

    /// Merge `patch` into the settings.
    ///
    /// Engine, language or voice changes stop active playback first and leave
    /// an interruption notice. Any change clears the quota state.
    pub fn update_settings(&self, patch: SettingsPatch) {
        if patch == SettingsPatch::default() {
            return;
        }

        if patch.changes_pipeline() && self.state.snapshot().is_busy() {
            self.stop();
            self.state
                .update(|s| s.last_error_message = INTERRUPTED_MESSAGE.to_string());
        }
        self.state.update(|s| s.quota = None);
        self.lock().settings.apply(patch);
    }

    /// Stop playback and close the audio context.
    pub fn shutdown(&self) {
        self.stop();
        self.graph.close();
    }
}

impl Drop for PlaybackController {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn apply_outcome(state: &StateHandle, ticket: &SessionTicket, outcome: DriverOutcome) {
    log::debug!("Session {}: driver finished with {outcome:?}", ticket.id());
    match outcome {
        DriverOutcome::Cancelled => {}
        DriverOutcome::Completed => {
            state.update_for(ticket, |s| {
                s.is_speaking = false;
                s.is_generating_audio = false;
            });
        }
        DriverOutcome::Failed(message) => {
            state.update_for(ticket, |s| {
                s.is_speaking = false;
                s.is_generating_audio = false;
                s.last_error_message = message;
            });
        }
        DriverOutcome::QuotaExceeded { reset_unix } => {
            state.update_for(ticket, |s| {
                s.is_speaking = false;
                s.is_generating_audio = false;
                s.quota = Some(QuotaState { reset_unix });
                s.last_error_message.clear();
            });
        }
    }
}
