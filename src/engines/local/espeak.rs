use std::borrow::Cow;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use super::{LocalSynthesisEngine, Utterance, Voice};
use crate::error::SpeechError;

/// espeak-ng speaking rate at `rate == 1.0`, in words per minute.
const DEFAULT_WORDS_PER_MINUTE: f32 = 175.0;

/// Local engine that shells out to `espeak-ng`, one process per utterance.
///
/// ```rust,no_run
/// use biography_speech::engines::local::{EspeakEngine, LocalSynthesisEngine};
///
/// # async fn demo() -> Result<(), biography_speech::SpeechError> {
/// let engine = EspeakEngine::new();
/// engine.load_voices().await?;
/// println!("{} voices", engine.voices().len());
/// # Ok(())
/// # }
/// ```
pub struct EspeakEngine {
    bin_path: PathBuf,
    voices: Mutex<Vec<Voice>>,
    available: AtomicBool,
    current: Mutex<Option<CancellationToken>>,
}

impl Default for EspeakEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl EspeakEngine {
    /// Use `espeak-ng` from PATH.
    pub fn new() -> Self {
        Self::with_binary("espeak-ng")
    }

    /// Use an explicit espeak-ng binary, e.g. one bundled with the application.
    pub fn with_binary(bin_path: impl Into<PathBuf>) -> Self {
        Self {
            bin_path: bin_path.into(),
            voices: Mutex::new(Vec::new()),
            available: AtomicBool::new(false),
            current: Mutex::new(None),
        }
    }

    /// Query `espeak-ng --voices` and cache the catalog. Returns the voice count.
    pub async fn load_voices(&self) -> Result<usize, SpeechError> {
        let output = Command::new(&self.bin_path)
            .arg("--voices")
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(spawn_error)?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(SpeechError::PlaybackEngine(format!(
                "espeak-ng --voices exited with code {:?}: {stderr}",
                output.status.code()
            )));
        }

        let voices = parse_voice_list(&String::from_utf8_lossy(&output.stdout));
        let count = voices.len();
        *self.voices.lock().unwrap_or_else(PoisonError::into_inner) = voices;
        self.available.store(true, Ordering::SeqCst);
        log::info!("Loaded {count} espeak-ng voices");
        Ok(count)
    }

    fn replace_current(&self, token: Option<CancellationToken>) {
        let previous = std::mem::replace(
            &mut *self.current.lock().unwrap_or_else(PoisonError::into_inner),
            token,
        );
        if let Some(previous) = previous {
            previous.cancel();
        }
    }
}

#[async_trait]
impl LocalSynthesisEngine for EspeakEngine {
    fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    fn voices(&self) -> Vec<Voice> {
        self.voices
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    async fn speak(&self, utterance: Utterance) -> Result<(), SpeechError> {
        let token = CancellationToken::new();
        self.replace_current(Some(token.clone()));

        let voice = utterance
            .voice
            .as_ref()
            .map(|v| v.id.clone())
            .unwrap_or_else(|| utterance.lang.to_lowercase());

        let mut child = Command::new(&self.bin_path)
            .args(["--stdin", "-q"])
            .arg("-v")
            .arg(&voice)
            .arg("-s")
            .arg(words_per_minute(utterance.rate).to_string())
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(spawn_error)?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(stdin_payload(&utterance.text).as_bytes())
                .await?;
        }

        let exit = tokio::select! {
            status = child.wait() => Some(status?),
            _ = token.cancelled() => None,
        };

        match exit {
            Some(status) if status.success() => Ok(()),
            Some(status) => Err(SpeechError::PlaybackEngine(format!(
                "espeak-ng exited with code {:?} (voice {voice})",
                status.code()
            ))),
            None => {
                child.kill().await?;
                Err(SpeechError::Aborted)
            }
        }
    }

    fn cancel(&self) {
        self.replace_current(None);
    }
}

fn spawn_error(e: std::io::Error) -> SpeechError {
    if e.kind() == std::io::ErrorKind::NotFound {
        SpeechError::EspeakNotFound
    } else {
        SpeechError::Io(e)
    }
}

fn words_per_minute(rate: f32) -> u32 {
    (DEFAULT_WORDS_PER_MINUTE * rate).clamp(80.0, 450.0).round() as u32
}

/// espeak-ng reads stdin line by line; the last line needs its terminator.
fn stdin_payload(text: &str) -> Cow<'_, str> {
    if text.ends_with('\n') {
        Cow::Borrowed(text)
    } else {
        Cow::Owned(format!("{text}\n"))
    }
}

/// Parse the table printed by `espeak-ng --voices`.
///
/// ```text
/// Pty Language       Age/Gender VoiceName          File                 Other Languages
///  5  pt-br           M  Portuguese_(Brazil) roa/pt-BR
/// ```
fn parse_voice_list(listing: &str) -> Vec<Voice> {
    listing
        .lines()
        .filter(|line| !line.trim_start().starts_with("Pty"))
        .filter_map(|line| {
            let columns: Vec<&str> = line.split_whitespace().collect();
            match columns.as_slice() {
                [_pty, lang, _gender, name, file, ..] => {
                    Some(Voice::new(*file, name.replace('_', " "), *lang))
                }
                _ => None,
            }
        })
        .collect()
}
