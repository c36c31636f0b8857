use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, anyhow};
use clap::Parser;
use tokio::sync::Notify;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use waav_realtime::config::RealtimeFileConfig;
use waav_realtime::core::realtime::openai::{
    OpenAIRealtime, RealtimeMode, TranscriptionHandler, event_types, handler_fn,
};

/// Stream a raw audio file to the OpenAI Realtime API
#[derive(Parser, Debug)]
#[command(name = "waav-realtime")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to configuration file (YAML)
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Raw audio in the configured input format (pcm16 24kHz mono by default)
    #[arg(short = 'i', long = "input", value_name = "FILE")]
    input: PathBuf,

    /// Session mode, overriding the configuration
    #[arg(short = 'm', long = "mode")]
    mode: Option<String>,

    /// Duration of each appended chunk
    #[arg(long = "chunk-ms", default_value_t = 100)]
    chunk_ms: u64,

    /// Send chunks at real-time pace instead of as fast as possible
    #[arg(long = "pace")]
    pace: bool,

    /// How long to wait for the final result after committing
    #[arg(long = "wait-secs", default_value_t = 30)]
    wait_secs: u64,
}

struct PrintTranscripts {
    done: Arc<Notify>,
}

impl TranscriptionHandler for PrintTranscripts {
    fn on_transcription(&self, item_id: &str, _content_index: u32, transcript: &str) {
        println!("[{item_id}] {transcript}");
        self.done.notify_one();
    }

    fn on_transcription_delta(&self, _item_id: &str, _content_index: u32, delta: &str) {
        tracing::debug!("delta: {}", delta);
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if it exists (must be done before config loading)
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow!("Failed to install default crypto provider"))?;

    let cli = Cli::parse();

    let mut file_config = if let Some(config_path) = &cli.config {
        info!("Loading configuration from {}", config_path.display());
        RealtimeFileConfig::from_file(config_path).map_err(|e| anyhow!(e.to_string()))?
    } else {
        RealtimeFileConfig::from_env().map_err(|e| anyhow!(e.to_string()))?
    };
    if let Some(mode) = cli.mode {
        file_config.mode = Some(mode);
    }
    let config = file_config.into_client_config()?;

    let audio = tokio::fs::read(&cli.input)
        .await
        .with_context(|| format!("Failed to read {}", cli.input.display()))?;
    let format = config.input_audio_format;
    let chunk_bytes = (u64::from(format.sample_rate()) * cli.chunk_ms / 1000) as usize
        * format.bytes_per_sample() as usize;
    if chunk_bytes == 0 {
        anyhow::bail!("--chunk-ms {} is too small", cli.chunk_ms);
    }

    let mode = config.mode;
    let realtime = Arc::new(OpenAIRealtime::new(config)?);
    let done = Arc::new(Notify::new());

    realtime.on_close(Arc::new(|event| {
        Box::pin(async move {
            match event.cause {
                Some(cause) => warn!("Connection closed ({}): {}", event.code, cause),
                None => info!("Connection closed ({} {})", event.code, event.reason),
            }
        })
    }));
    realtime.register_transcription_handler(Arc::new(PrintTranscripts {
        done: Arc::clone(&done),
    }));
    if mode == RealtimeMode::Conversation {
        realtime.register_event_handler(
            "response.output_audio_transcript.delta",
            handler_fn(|event| async move {
                print!("{}", event.get_str("delta").unwrap_or_default());
            }),
        );
        let response_done = Arc::clone(&done);
        realtime.register_event_handler(
            "response.done",
            handler_fn(move |_| {
                let done = Arc::clone(&response_done);
                async move {
                    println!();
                    done.notify_one();
                }
            }),
        );
    }
    realtime.register_event_handler(
        event_types::ERROR,
        handler_fn(|event| async move {
            warn!("Server reported: {}", event.raw());
        }),
    );

    realtime.connect().await?;

    for chunk in audio.chunks(chunk_bytes) {
        realtime.append_audio(chunk)?;
        if cli.pace {
            tokio::time::sleep(Duration::from_millis(cli.chunk_ms)).await;
        }
    }
    info!(
        "Streamed {} bytes ({} ms buffered)",
        audio.len(),
        realtime.current_audio_duration_ms()
    );

    if !realtime.commit_buffer()? {
        warn!("Not enough audio to commit");
    } else if mode == RealtimeMode::Conversation {
        realtime.create_response(None)?;
    }

    tokio::select! {
        _ = done.notified() => {}
        _ = tokio::time::sleep(Duration::from_secs(cli.wait_secs)) => {
            warn!("No result within {} s", cli.wait_secs);
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted");
        }
    }

    realtime.close().await?;
    Ok(())
}
