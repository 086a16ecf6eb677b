use std::sync::Arc;
use std::time::Instant;

use biography_speech::engines::local::{EspeakEngine, LocalSynthesisEngine};
use biography_speech::engines::remote::{filter_voices, AudioBackend, AudioGraph, ProxyClient};
use biography_speech::{EngineKind, PlaybackController, PlayerConfig, SettingsPatch};
#[cfg(not(feature = "rodio"))]
use biography_speech::SpeechError;
use clap::{Parser, ValueEnum};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Engine {
    Local,
    Remote,
}

/// Read the biography aloud.
#[derive(Debug, Parser)]
struct Args {
    #[arg(long, value_enum, default_value_t = Engine::Local)]
    engine: Engine,

    /// Language code: pt, en, es, fr, de, it or ja.
    #[arg(long, default_value = "pt")]
    language: String,

    /// Voice id (espeak voice file for local, provider voice id for remote).
    #[arg(long)]
    voice: Option<String>,

    /// Print the voices of the selected engine and exit.
    #[arg(long)]
    list_voices: bool,

    /// Only list voices matching this term.
    #[arg(long, default_value = "")]
    filter: String,

    /// Backend base URL, overrides BIOGRAPHY_API_BASE_URL.
    #[arg(long)]
    api_base_url: Option<String>,
}

/// Stand-in used when the crate is built without the `rodio` feature.
#[cfg(not(feature = "rodio"))]
struct NoOutput;

#[cfg(not(feature = "rodio"))]
impl AudioBackend for NoOutput {
    fn create_context(
        &self,
    ) -> Result<Arc<dyn biography_speech::engines::remote::AudioContext>, SpeechError> {
        Err(SpeechError::Audio(
            "remote playback needs the `rodio` feature".into(),
        ))
    }
}

fn audio_backend() -> Arc<dyn AudioBackend> {
    #[cfg(feature = "rodio")]
    {
        Arc::new(biography_speech::engines::remote::RodioBackend)
    }
    #[cfg(not(feature = "rodio"))]
    {
        Arc::new(NoOutput)
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = Args::parse();

    let mut config = PlayerConfig::from_env();
    if let Some(base) = args.api_base_url {
        config.api_base_url = base;
    }

    let espeak = Arc::new(EspeakEngine::new());
    if let Err(e) = espeak.load_voices().await {
        eprintln!("Local engine unavailable: {e}");
    }

    let controller = PlaybackController::new(
        config.clone(),
        espeak.clone(),
        Arc::new(ProxyClient::new(config)),
        Arc::new(AudioGraph::new(audio_backend())),
    );
    controller.update_settings(SettingsPatch::language(args.language));

    if args.list_voices {
        match args.engine {
            Engine::Local => {
                let term = args.filter.to_lowercase();
                for voice in espeak.voices() {
                    if format!("{} {}", voice.name, voice.lang).to_lowercase().contains(&term) {
                        println!("{:<24} {:<8} {}", voice.id, voice.lang, voice.name);
                    }
                }
            }
            Engine::Remote => {
                let voices = controller.remote_voices().await?;
                for voice in filter_voices(&voices, &args.filter) {
                    println!("{:<24} {:<10} {}", voice.voice_id, voice.category, voice.name);
                }
            }
        }
        return Ok(());
    }

    match (args.engine, args.voice) {
        (Engine::Local, Some(voice)) => {
            controller.update_settings(SettingsPatch::local_voice(Some(voice)));
        }
        (Engine::Local, None) => {
            controller.refresh_local_voices();
        }
        (Engine::Remote, Some(voice)) => {
            controller.update_settings(SettingsPatch::remote_voice(voice.clone(), voice));
        }
        (Engine::Remote, None) => {
            controller.update_settings(SettingsPatch::engine(EngineKind::Remote));
        }
    }

    controller.load_document(&reqwest::Client::new()).await?;
    println!("Reading {} segments", controller.segments().len());

    let start = Instant::now();
    let mut updates = controller.subscribe();
    controller.toggle()?;

    let mut seen_busy = false;
    while updates.changed().await.is_ok() {
        let state = updates.borrow_and_update().clone();
        if let Some(status) = state.status_message(chrono::Utc::now()) {
            println!("{status:?}");
        }
        seen_busy |= state.is_busy();
        let finished = seen_busy || state.quota.is_some() || !state.last_error_message.is_empty();
        if !state.is_busy() && finished {
            break;
        }
    }

    println!("Done in {:.2?}", start.elapsed());
    controller.shutdown();
    Ok(())
}
