//! Test doubles for the engine capabilities and a one-shot HTTP server.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::engines::local::{LocalSynthesisEngine, Utterance, Voice};
use crate::engines::remote::{
    AudioBackend, AudioContext, AudioSource, RemoteVoice, SpeechProvider, SpeechRequest,
    StartedSource, Subscription,
};
use crate::error::SpeechError;
use crate::DecodedAudio;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeakBehavior {
    /// Finishes after 100ms.
    Complete,
    Fail,
    /// Ends as if cancelled from outside.
    Abort,
    /// Never finishes.
    Hang,
}

pub struct FakeLocalEngine {
    voices: Vec<Voice>,
    available: bool,
    script: Mutex<VecDeque<SpeakBehavior>>,
    default: Mutex<SpeakBehavior>,
    spoken: Mutex<Vec<Utterance>>,
    cancels: AtomicUsize,
}

impl FakeLocalEngine {
    pub fn new(voices: Vec<Voice>) -> Self {
        Self {
            voices,
            available: true,
            script: Mutex::new(VecDeque::new()),
            default: Mutex::new(SpeakBehavior::Complete),
            spoken: Mutex::new(Vec::new()),
            cancels: AtomicUsize::new(0),
        }
    }

    pub fn unavailable(mut self) -> Self {
        self.available = false;
        self
    }

    /// Behaviors for the next calls, in order. Later calls use the default.
    pub fn script(&self, behaviors: impl IntoIterator<Item = SpeakBehavior>) {
        self.script.lock().unwrap().extend(behaviors);
    }

    pub fn set_default(&self, behavior: SpeakBehavior) {
        *self.default.lock().unwrap() = behavior;
    }

    pub fn spoken(&self) -> Vec<Utterance> {
        self.spoken.lock().unwrap().clone()
    }

    pub fn cancel_count(&self) -> usize {
        self.cancels.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LocalSynthesisEngine for FakeLocalEngine {
    fn is_available(&self) -> bool {
        self.available
    }

    fn voices(&self) -> Vec<Voice> {
        self.voices.clone()
    }

    async fn speak(&self, utterance: Utterance) -> Result<(), SpeechError> {
        self.spoken.lock().unwrap().push(utterance);
        let behavior = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(*self.default.lock().unwrap());

        match behavior {
            SpeakBehavior::Complete => {
                tokio::time::sleep(Duration::from_millis(100)).await;
                Ok(())
            }
            SpeakBehavior::Fail => Err(SpeechError::PlaybackEngine("synthesis-failed".into())),
            SpeakBehavior::Abort => Err(SpeechError::Aborted),
            SpeakBehavior::Hang => std::future::pending().await,
        }
    }

    fn cancel(&self) {
        self.cancels.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderReply {
    /// `audio:<text>` after the configured latency.
    Audio,
    Quota(Option<i64>),
    Fail(String),
    Hang,
}

pub struct FakeProvider {
    latency: Duration,
    replies: Mutex<VecDeque<ProviderReply>>,
    requests: Mutex<Vec<(Instant, SpeechRequest)>>,
    voices: Vec<RemoteVoice>,
    subscription_reset: Option<i64>,
    subscription_calls: AtomicUsize,
}

impl FakeProvider {
    pub fn new(latency: Duration) -> Self {
        Self {
            latency,
            replies: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
            voices: Vec::new(),
            subscription_reset: None,
            subscription_calls: AtomicUsize::new(0),
        }
    }

    pub fn with_voices(mut self, voices: Vec<RemoteVoice>) -> Self {
        self.voices = voices;
        self
    }

    pub fn with_subscription_reset(mut self, reset: Option<i64>) -> Self {
        self.subscription_reset = reset;
        self
    }

    /// Replies for the next requests, in order. Later requests get audio.
    pub fn script(&self, replies: impl IntoIterator<Item = ProviderReply>) {
        self.replies.lock().unwrap().extend(replies);
    }

    pub fn requests(&self) -> Vec<SpeechRequest> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .map(|(_, r)| r.clone())
            .collect()
    }

    pub fn request_times(&self) -> Vec<Instant> {
        self.requests.lock().unwrap().iter().map(|(at, _)| *at).collect()
    }

    pub fn subscription_calls(&self) -> usize {
        self.subscription_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SpeechProvider for FakeProvider {
    async fn voices(&self) -> Result<Vec<RemoteVoice>, SpeechError> {
        Ok(self.voices.clone())
    }

    async fn subscription(&self) -> Result<Subscription, SpeechError> {
        self.subscription_calls.fetch_add(1, Ordering::SeqCst);
        Ok(Subscription {
            next_character_count_reset_unix: self.subscription_reset,
            ..Default::default()
        })
    }

    async fn synthesize(&self, request: &SpeechRequest) -> Result<Bytes, SpeechError> {
        self.requests
            .lock()
            .unwrap()
            .push((Instant::now(), request.clone()));
        let reply = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(ProviderReply::Audio);

        if reply == ProviderReply::Hang {
            return std::future::pending().await;
        }
        tokio::time::sleep(self.latency).await;

        match reply {
            ProviderReply::Audio => Ok(Bytes::from(format!("audio:{}", request.text))),
            ProviderReply::Quota(reset_unix) => Err(SpeechError::QuotaExceeded { reset_unix }),
            ProviderReply::Fail(message) => Err(SpeechError::ProviderRequest(message)),
            ProviderReply::Hang => unreachable!(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AudioEvent {
    ContextCreated,
    Resumed,
    /// The encoded bytes, as text.
    Decoded(String),
    Started(u64),
    Stopped(u64),
    Disconnected(u64),
    Closed,
}

type EventLog = Arc<Mutex<Vec<AudioEvent>>>;

/// Audio backend whose clips "play" for a fixed duration of tokio time.
pub struct FakeAudioBackend {
    clip: Duration,
    start_suspended: bool,
    events: EventLog,
    sources: Arc<AtomicU64>,
}

impl FakeAudioBackend {
    pub fn new(clip: Duration) -> Self {
        Self {
            clip,
            start_suspended: false,
            events: Arc::default(),
            sources: Arc::default(),
        }
    }

    pub fn suspended(mut self) -> Self {
        self.start_suspended = true;
        self
    }

    pub fn events(&self) -> Vec<AudioEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl AudioBackend for FakeAudioBackend {
    fn create_context(&self) -> Result<Arc<dyn AudioContext>, SpeechError> {
        self.events.lock().unwrap().push(AudioEvent::ContextCreated);
        Ok(Arc::new(FakeAudioContext {
            clip: self.clip,
            suspended: Mutex::new(self.start_suspended),
            events: Arc::clone(&self.events),
            sources: Arc::clone(&self.sources),
        }))
    }
}

struct FakeAudioContext {
    clip: Duration,
    suspended: Mutex<bool>,
    events: EventLog,
    sources: Arc<AtomicU64>,
}

struct FakeSource {
    id: u64,
    events: EventLog,
}

impl AudioSource for FakeSource {
    fn stop(&mut self) {
        self.events.lock().unwrap().push(AudioEvent::Stopped(self.id));
    }

    fn disconnect(&mut self) {
        self.events
            .lock()
            .unwrap()
            .push(AudioEvent::Disconnected(self.id));
    }
}

#[async_trait]
impl AudioContext for FakeAudioContext {
    fn is_suspended(&self) -> bool {
        *self.suspended.lock().unwrap()
    }

    async fn resume(&self) -> Result<(), SpeechError> {
        *self.suspended.lock().unwrap() = false;
        self.events.lock().unwrap().push(AudioEvent::Resumed);
        Ok(())
    }

    async fn decode(&self, encoded: Bytes) -> Result<DecodedAudio, SpeechError> {
        let text = String::from_utf8_lossy(&encoded).into_owned();
        self.events.lock().unwrap().push(AudioEvent::Decoded(text));
        Ok(DecodedAudio {
            samples: vec![0.0; encoded.len()],
            sample_rate: 44_100,
            channels: 1,
        })
    }

    fn start(&self, _audio: DecodedAudio) -> Result<StartedSource, SpeechError> {
        let id = self.sources.fetch_add(1, Ordering::SeqCst);
        self.events.lock().unwrap().push(AudioEvent::Started(id));

        let (ended_tx, ended) = oneshot::channel();
        let clip = self.clip;
        tokio::spawn(async move {
            tokio::time::sleep(clip).await;
            let _ = ended_tx.send(());
        });

        Ok(StartedSource {
            source: Box::new(FakeSource {
                id,
                events: Arc::clone(&self.events),
            }),
            ended,
        })
    }

    fn close(&self) {
        self.events.lock().unwrap().push(AudioEvent::Closed);
    }
}

/// Serve a single HTTP response on a random local port.
///
/// Returns the base URL and a handle resolving to the raw request text.
pub async fn serve_once(
    status_line: &str,
    content_type: &str,
    body: Vec<u8>,
) -> (String, JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let head = format!(
        "HTTP/1.1 {status_line}\r\nContent-Type: {content_type}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        body.len()
    );

    let handle = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let request = read_request(&mut socket).await;
        socket.write_all(head.as_bytes()).await.unwrap();
        socket.write_all(&body).await.unwrap();
        socket.shutdown().await.unwrap();
        request
    });

    (format!("http://{addr}"), handle)
}

async fn read_request(socket: &mut tokio::net::TcpStream) -> String {
    let mut received = Vec::new();
    let mut buf = [0u8; 4096];
    loop {
        let n = socket.read(&mut buf).await.unwrap();
        if n == 0 {
            break;
        }
        received.extend_from_slice(&buf[..n]);

        let text = String::from_utf8_lossy(&received);
        if let Some(header_end) = text.find("\r\n\r\n") {
            let content_length = text[..header_end]
                .lines()
                .filter_map(|line| line.split_once(':'))
                .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
                .and_then(|(_, value)| value.trim().parse::<usize>().ok())
                .unwrap_or(0);
            if received.len() >= header_end + 4 + content_length {
                break;
            }
        }
    }
    String::from_utf8_lossy(&received).into_owned()
}
