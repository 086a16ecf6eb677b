use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use super::{select_voice, LocalSynthesisEngine, Utterance, Voice};
use crate::config::PlayerConfig;
use crate::engines::DriverOutcome;
use crate::session::SessionTicket;
use crate::settings::{to_speech_lang_code, LocalSnapshot};
use crate::state::StateHandle;

pub const LOCAL_FAILURE_MESSAGE: &str =
    "Local speech playback failed. Try another voice or the remote engine.";

/// Speaks chunks one after another on a [`LocalSynthesisEngine`].
///
/// Each chunk runs under a watchdog. A chunk that stalls or errors is retried
/// once with the automatic voice when an explicit voice was configured; any
/// further failure ends the run.
pub struct LocalSpeechDriver {
    engine: Arc<dyn LocalSynthesisEngine>,
    snapshot: LocalSnapshot,
    watchdog: Duration,
    retry_delay: Duration,
    chunk_gap: Duration,
    rate: f32,
}

impl LocalSpeechDriver {
    pub fn new(
        engine: Arc<dyn LocalSynthesisEngine>,
        snapshot: LocalSnapshot,
        config: &PlayerConfig,
    ) -> Self {
        Self {
            engine,
            snapshot,
            watchdog: config.watchdog,
            retry_delay: config.retry_delay,
            chunk_gap: config.chunk_gap,
            rate: config.speech_rate,
        }
    }

    pub async fn run(
        self,
        chunks: Vec<String>,
        ticket: SessionTicket,
        state: StateHandle,
        cancel: CancellationToken,
    ) -> DriverOutcome {
        // A superseded session must not touch the engine the live one is using.
        if cancel.is_cancelled() || !ticket.is_active() {
            return DriverOutcome::Cancelled;
        }
        if chunks.is_empty() {
            return DriverOutcome::Completed;
        }

        self.engine.cancel();
        state.update_for(&ticket, |s| s.is_speaking = true);

        let fallback_lang = to_speech_lang_code(&self.snapshot.language_code);
        let mut active_voice = self.resolve_voice(self.snapshot.voice_id.as_deref());
        let mut retried_with_automatic_voice = false;
        let mut index = 0;

        log::info!(
            "Session {}: speaking {} chunks locally (voice: {})",
            ticket.id(),
            chunks.len(),
            active_voice.as_ref().map_or(fallback_lang.as_str(), |v| v.name.as_str())
        );

        while index < chunks.len() {
            if cancel.is_cancelled() || !ticket.is_active() {
                return DriverOutcome::Cancelled;
            }

            let utterance = Utterance::new(
                chunks[index].as_str(),
                active_voice.as_ref(),
                &fallback_lang,
                self.rate,
            );

            let attempt = tokio::select! {
                biased;
                // Dropping the speak future ends this utterance only.
                _ = cancel.cancelled() => return DriverOutcome::Cancelled,
                result = tokio::time::timeout(self.watchdog, self.engine.speak(utterance)) => result,
            };

            let failure = match attempt {
                Ok(Ok(())) => {
                    index += 1;
                    if index < chunks.len() && !pause(self.chunk_gap, &cancel).await {
                        return DriverOutcome::Cancelled;
                    }
                    continue;
                }
                Ok(Err(e)) if e.is_abort() => {
                    log::debug!("Session {}: utterance aborted", ticket.id());
                    return DriverOutcome::Cancelled;
                }
                Ok(Err(e)) => e.to_string(),
                Err(_) => format!("no progress after {:?}", self.watchdog),
            };

            if !ticket.is_active() {
                return DriverOutcome::Cancelled;
            }
            self.engine.cancel();

            if self.snapshot.voice_id.is_some() && !retried_with_automatic_voice {
                retried_with_automatic_voice = true;
                active_voice = self.resolve_voice(None);
                log::warn!(
                    "Session {}: chunk {index} failed ({failure}), retrying with automatic voice",
                    ticket.id()
                );
                if !pause(self.retry_delay, &cancel).await {
                    return DriverOutcome::Cancelled;
                }
                continue;
            }

            log::warn!("Session {}: chunk {index} failed ({failure})", ticket.id());
            return DriverOutcome::Failed(LOCAL_FAILURE_MESSAGE.to_string());
        }

        DriverOutcome::Completed
    }

    fn resolve_voice(&self, explicit_id: Option<&str>) -> Option<Voice> {
        let catalog = self.engine.voices();
        select_voice(&catalog, explicit_id, &self.snapshot.language_code).cloned()
    }
}

/// Sleep unless cancelled first. Returns false on cancellation.
async fn pause(duration: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(duration) => true,
    }
}
