use std::sync::Arc;

use bytes::Bytes;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::{AudioGraph, SpeechProvider, SpeechRequest};
use crate::config::PlayerConfig;
use crate::engines::DriverOutcome;
use crate::error::SpeechError;
use crate::segmenter::chunk_segments;
use crate::session::SessionTicket;
use crate::settings::RemoteSnapshot;
use crate::state::StateHandle;

/// Plays remote audio chunk by chunk, requesting chunk `i + 1` while chunk `i` plays.
pub struct RemoteSpeechDriver {
    provider: Arc<dyn SpeechProvider>,
    graph: Arc<AudioGraph>,
    snapshot: RemoteSnapshot,
    chunk_limit: usize,
}

/// An in-flight synthesis request. Dropping it aborts the request.
struct Prefetch {
    handle: JoinHandle<Result<Bytes, SpeechError>>,
}

impl Prefetch {
    fn spawn(
        provider: Arc<dyn SpeechProvider>,
        request: SpeechRequest,
        cancel: CancellationToken,
    ) -> Self {
        let handle = tokio::spawn(async move {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(SpeechError::Aborted),
                audio = provider.synthesize(&request) => audio,
            }
        });
        Self { handle }
    }

    async fn join(mut self) -> Result<Bytes, SpeechError> {
        match (&mut self.handle).await {
            Ok(audio) => audio,
            Err(e) if e.is_cancelled() => Err(SpeechError::Aborted),
            Err(e) => Err(SpeechError::ProviderRequest(format!(
                "Speech request task failed: {e}"
            ))),
        }
    }
}

impl Drop for Prefetch {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

impl RemoteSpeechDriver {
    pub fn new(
        provider: Arc<dyn SpeechProvider>,
        graph: Arc<AudioGraph>,
        snapshot: RemoteSnapshot,
        config: &PlayerConfig,
    ) -> Self {
        Self {
            provider,
            graph,
            snapshot,
            chunk_limit: config.remote_chunk_limit,
        }
    }

    pub async fn run(
        self,
        segments: Vec<String>,
        ticket: SessionTicket,
        state: StateHandle,
        cancel: CancellationToken,
    ) -> DriverOutcome {
        // The graph is shared: a superseded session must not release the live source.
        if cancel.is_cancelled() || !ticket.is_active() {
            return DriverOutcome::Cancelled;
        }
        let chunks = chunk_segments(&segments, self.chunk_limit);
        if chunks.is_empty() {
            return DriverOutcome::Completed;
        }

        self.graph.release_source();
        state.update_for(&ticket, |s| {
            s.is_generating_audio = true;
            s.is_speaking = true;
        });
        log::info!(
            "Session {}: requesting {} remote chunks (voice {})",
            ticket.id(),
            chunks.len(),
            self.snapshot.voice_id
        );

        match self.play_chunks(&chunks, &ticket, &state, &cancel).await {
            Ok(()) => DriverOutcome::Completed,
            Err(error) => self.failure_outcome(error, &ticket, &cancel).await,
        }
    }

    async fn play_chunks(
        &self,
        chunks: &[String],
        ticket: &SessionTicket,
        state: &StateHandle,
        cancel: &CancellationToken,
    ) -> Result<(), SpeechError> {
        let context = self.graph.ensure_context().await?;

        let mut next = Some(self.prefetch(&chunks[0], cancel));
        let mut index = 0;
        while let Some(pending) = next.take() {
            let audio = pending.join().await?;
            if index == 0 {
                state.update_for(ticket, |s| s.is_generating_audio = false);
            }
            if cancel.is_cancelled() || !ticket.is_active() {
                return Err(SpeechError::Aborted);
            }

            next = chunks.get(index + 1).map(|chunk| self.prefetch(chunk, cancel));
            log::debug!(
                "Session {}: playing chunk {}/{} ({} bytes)",
                ticket.id(),
                index + 1,
                chunks.len(),
                audio.len()
            );
            self.graph.play(context.as_ref(), audio, cancel).await?;
            index += 1;
        }
        Ok(())
    }

    fn prefetch(&self, text: &str, cancel: &CancellationToken) -> Prefetch {
        let request = SpeechRequest {
            text: text.to_string(),
            voice_id: self.snapshot.voice_id.clone(),
            language_code: self.snapshot.language_code.clone(),
        };
        Prefetch::spawn(Arc::clone(&self.provider), request, cancel.clone())
    }

    async fn failure_outcome(
        &self,
        error: SpeechError,
        ticket: &SessionTicket,
        cancel: &CancellationToken,
    ) -> DriverOutcome {
        if error.is_abort() || cancel.is_cancelled() || !ticket.is_active() {
            return DriverOutcome::Cancelled;
        }

        let outcome = match error {
            SpeechError::QuotaExceeded { reset_unix } => {
                let reset_unix = match reset_unix {
                    Some(reset) => Some(reset),
                    None => {
                        let subscription = tokio::select! {
                            biased;
                            _ = cancel.cancelled() => return DriverOutcome::Cancelled,
                            subscription = self.provider.subscription() => subscription,
                        };
                        match subscription {
                            Ok(s) => s.next_character_count_reset_unix,
                            Err(e) => {
                                log::warn!("Could not read the quota reset time: {e}");
                                None
                            }
                        }
                    }
                };
                log::warn!(
                    "Session {}: remote quota exhausted (reset: {reset_unix:?})",
                    ticket.id()
                );
                DriverOutcome::QuotaExceeded { reset_unix }
            }
            other => {
                log::error!("Session {}: remote playback failed: {other}", ticket.id());
                DriverOutcome::Failed(other.to_string())
            }
        };

        if !ticket.is_active() {
            return DriverOutcome::Cancelled;
        }
        self.graph.release_source();
        outcome
    }
}
