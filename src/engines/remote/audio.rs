use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use crate::error::SpeechError;
use crate::DecodedAudio;

/// Factory for audio output contexts.
pub trait AudioBackend: Send + Sync {
    fn create_context(&self) -> Result<Arc<dyn AudioContext>, SpeechError>;
}

/// A decoding and playback context, created lazily and reused across sessions.
#[async_trait]
pub trait AudioContext: Send + Sync {
    /// Contexts may start suspended until the first user gesture.
    fn is_suspended(&self) -> bool;

    async fn resume(&self) -> Result<(), SpeechError>;

    async fn decode(&self, encoded: Bytes) -> Result<DecodedAudio, SpeechError>;

    /// Start playing immediately. The returned receiver fires on natural end.
    fn start(&self, audio: DecodedAudio) -> Result<StartedSource, SpeechError>;

    fn close(&self);
}

/// A playing buffer. Both calls must be safe on a source that already ended.
pub trait AudioSource: Send {
    fn stop(&mut self);

    fn disconnect(&mut self);
}

pub struct StartedSource {
    pub source: Box<dyn AudioSource>,
    pub ended: oneshot::Receiver<()>,
}

/// Owns the shared audio context and at most one active source.
pub struct AudioGraph {
    backend: Arc<dyn AudioBackend>,
    context: Mutex<Option<Arc<dyn AudioContext>>>,
    current: Mutex<Option<(u64, Box<dyn AudioSource>)>>,
    next_id: AtomicU64,
}

impl AudioGraph {
    pub fn new(backend: Arc<dyn AudioBackend>) -> Self {
        Self {
            backend,
            context: Mutex::new(None),
            current: Mutex::new(None),
            next_id: AtomicU64::new(0),
        }
    }

    /// Create the context on first use and resume it if suspended.
    pub async fn ensure_context(&self) -> Result<Arc<dyn AudioContext>, SpeechError> {
        let context = {
            let mut slot = self.context.lock().unwrap_or_else(PoisonError::into_inner);
            match slot.as_ref() {
                Some(context) => Arc::clone(context),
                None => {
                    log::debug!("Creating audio context");
                    let context = self.backend.create_context()?;
                    *slot = Some(Arc::clone(&context));
                    context
                }
            }
        };

        if context.is_suspended() {
            context.resume().await?;
        }
        Ok(context)
    }

    /// Decode and play one clip, replacing whatever was playing.
    ///
    /// Resolves when the clip ends on its own, or with [`SpeechError::Aborted`]
    /// once `cancel` fires. Either way the source is stopped and detached.
    pub async fn play(
        &self,
        context: &dyn AudioContext,
        encoded: Bytes,
        cancel: &CancellationToken,
    ) -> Result<(), SpeechError> {
        let audio = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(SpeechError::Aborted),
            decoded = context.decode(encoded) => decoded?,
        };
        if cancel.is_cancelled() {
            return Err(SpeechError::Aborted);
        }

        self.release_source();
        let StartedSource { source, ended } = context.start(audio)?;
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        *self.current.lock().unwrap_or_else(PoisonError::into_inner) = Some((id, source));

        let finished = tokio::select! {
            biased;
            _ = cancel.cancelled() => false,
            _ = ended => true,
        };
        self.finish(id);

        if finished {
            Ok(())
        } else {
            Err(SpeechError::Aborted)
        }
    }

    /// Stop and detach the active source, if any.
    pub fn release_source(&self) {
        let current = self
            .current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some((_, mut source)) = current {
            source.stop();
            source.disconnect();
        }
    }

    /// Release the source and close the context. The next session creates a new one.
    pub fn close(&self) {
        self.release_source();
        let context = self
            .context
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(context) = context {
            log::debug!("Closing audio context");
            context.close();
        }
    }

    // A newer clip may already own the slot.
    fn finish(&self, id: u64) {
        let mut current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        if matches!(current.as_ref(), Some((active, _)) if *active == id) {
            if let Some((_, mut source)) = current.take() {
                source.stop();
                source.disconnect();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{AudioEvent, FakeAudioBackend};
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn context_is_created_once_and_resumed() {
        let backend = Arc::new(FakeAudioBackend::new(Duration::from_secs(1)).suspended());
        let graph = AudioGraph::new(backend.clone());

        graph.ensure_context().await.unwrap();
        graph.ensure_context().await.unwrap();

        assert_eq!(
            backend.events(),
            vec![AudioEvent::ContextCreated, AudioEvent::Resumed]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn plays_until_natural_end() {
        let backend = Arc::new(FakeAudioBackend::new(Duration::from_secs(1)));
        let graph = AudioGraph::new(backend.clone());
        let context = graph.ensure_context().await.unwrap();

        let start = tokio::time::Instant::now();
        graph
            .play(context.as_ref(), Bytes::from_static(b"clip"), &CancellationToken::new())
            .await
            .unwrap();

        assert!(start.elapsed() >= Duration::from_secs(1));
        assert_eq!(
            backend.events(),
            vec![
                AudioEvent::ContextCreated,
                AudioEvent::Decoded("clip".into()),
                AudioEvent::Started(0),
                AudioEvent::Stopped(0),
                AudioEvent::Disconnected(0),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_stops_the_active_source() {
        let backend = Arc::new(FakeAudioBackend::new(Duration::from_secs(5)));
        let graph = Arc::new(AudioGraph::new(backend.clone()));
        let context = graph.ensure_context().await.unwrap();
        let cancel = CancellationToken::new();

        let task = {
            let graph = Arc::clone(&graph);
            let cancel = cancel.clone();
            tokio::spawn(async move {
                graph
                    .play(context.as_ref(), Bytes::from_static(b"clip"), &cancel)
                    .await
            })
        };

        tokio::time::sleep(Duration::from_millis(500)).await;
        cancel.cancel();

        assert!(task.await.unwrap().unwrap_err().is_abort());
        assert!(backend.events().contains(&AudioEvent::Stopped(0)));
        assert!(backend.events().contains(&AudioEvent::Disconnected(0)));
    }

    #[tokio::test(start_paused = true)]
    async fn close_releases_context() {
        let backend = Arc::new(FakeAudioBackend::new(Duration::from_secs(1)));
        let graph = AudioGraph::new(backend.clone());
        graph.ensure_context().await.unwrap();

        graph.close();
        graph.close();
        graph.ensure_context().await.unwrap();

        assert_eq!(
            backend.events(),
            vec![
                AudioEvent::ContextCreated,
                AudioEvent::Closed,
                AudioEvent::ContextCreated,
            ]
        );
    }
}
