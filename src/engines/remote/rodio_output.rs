use std::io::Cursor;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use rodio::buffer::SamplesBuffer;
use rodio::Source;
use tokio::sync::oneshot;

use super::audio::{AudioBackend, AudioContext, AudioSource, StartedSource};
use crate::error::SpeechError;
use crate::DecodedAudio;

/// How often the playback thread checks for a stop request.
const STOP_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Plays remote audio on the default output device.
#[derive(Debug, Default, Clone, Copy)]
pub struct RodioBackend;

impl AudioBackend for RodioBackend {
    fn create_context(&self) -> Result<Arc<dyn AudioContext>, SpeechError> {
        Ok(Arc::new(RodioContext::default()))
    }
}

#[derive(Default)]
struct RodioContext {
    closed: AtomicBool,
}

struct RodioSource {
    stop: Arc<AtomicBool>,
}

impl AudioSource for RodioSource {
    fn stop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    // The sink is owned by the playback thread and goes away with it.
    fn disconnect(&mut self) {}
}

#[async_trait]
impl AudioContext for RodioContext {
    fn is_suspended(&self) -> bool {
        false
    }

    async fn resume(&self) -> Result<(), SpeechError> {
        Ok(())
    }

    async fn decode(&self, encoded: Bytes) -> Result<DecodedAudio, SpeechError> {
        tokio::task::spawn_blocking(move || decode_clip(encoded))
            .await
            .map_err(|e| SpeechError::Audio(format!("decoder task failed: {e}")))?
    }

    fn start(&self, audio: DecodedAudio) -> Result<StartedSource, SpeechError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(SpeechError::Audio("audio context is closed".into()));
        }

        let stop = Arc::new(AtomicBool::new(false));
        let (ended_tx, ended) = oneshot::channel();
        let flag = Arc::clone(&stop);
        std::thread::Builder::new()
            .name("speech-output".into())
            .spawn(move || {
                if let Err(e) = play_blocking(audio, &flag) {
                    log::error!("Audio playback failed: {e}");
                }
                let _ = ended_tx.send(());
            })?;

        Ok(StartedSource {
            source: Box::new(RodioSource { stop }),
            ended,
        })
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

fn decode_clip(encoded: Bytes) -> Result<DecodedAudio, SpeechError> {
    let decoder = rodio::Decoder::new(Cursor::new(encoded))
        .map_err(|e| SpeechError::Audio(format!("undecodable audio: {e}")))?;
    let channels = decoder.channels();
    let sample_rate = decoder.sample_rate();
    let samples: Vec<f32> = decoder.collect();

    log::debug!("Decoded {} samples at {sample_rate} Hz", samples.len());
    Ok(DecodedAudio {
        samples,
        sample_rate,
        channels,
    })
}

fn play_blocking(audio: DecodedAudio, stop: &AtomicBool) -> Result<(), SpeechError> {
    let stream = rodio::OutputStreamBuilder::open_default_stream()
        .map_err(|e| SpeechError::Audio(format!("no output device: {e}")))?;
    let sink = rodio::Sink::connect_new(stream.mixer());
    sink.append(SamplesBuffer::new(
        audio.channels,
        audio.sample_rate,
        audio.samples,
    ));

    while !sink.empty() {
        if stop.load(Ordering::SeqCst) {
            sink.stop();
            break;
        }
        std::thread::sleep(STOP_POLL_INTERVAL);
    }
    Ok(())
}
