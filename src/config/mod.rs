//! Configuration loading for realtime clients
//!
//! Settings come from YAML files and environment variables.
//! Priority: YAML > ENV vars > .env values > defaults.
//!
//! # Example
//! ```rust,no_run
//! use waav_realtime::config::RealtimeFileConfig;
//! use std::path::Path;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Environment variables only
//! let config = RealtimeFileConfig::from_env()?;
//!
//! // YAML file, with environment variables filling the gaps
//! let config = RealtimeFileConfig::from_file(Path::new("realtime.yaml"))?;
//! let client_config = config.into_client_config()?;
//! # Ok(())
//! # }
//! ```

use std::env;
use std::path::Path;
use std::time::Duration;

mod yaml;

pub use yaml::{AudioYaml, ConnectionYaml, OpenAIYaml, TurnDetectionYaml, YamlConfig};

use crate::core::realtime::openai::{
    OpenAIRealtimeAudioFormat, OpenAIRealtimeConfig, OpenAIRealtimeModel, OpenAIRealtimeVoice,
    RealtimeMode, TranscriptionModel, TurnDetectionSettings,
};
use crate::core::realtime::{PoolExhaustion, RealtimeResult};

pub const ENV_API_KEY: &str = "OPENAI_API_KEY";
pub const ENV_URL: &str = "OPENAI_REALTIME_URL";
pub const ENV_MODEL: &str = "OPENAI_REALTIME_MODEL";
pub const ENV_MODE: &str = "OPENAI_REALTIME_MODE";
pub const ENV_VOICE: &str = "OPENAI_REALTIME_VOICE";

/// Flattened, fully optional client settings.
///
/// Unset fields fall back to the [`OpenAIRealtimeConfig`] defaults.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RealtimeFileConfig {
    pub api_key: Option<String>,
    pub url: Option<String>,
    pub model: Option<String>,
    pub mode: Option<String>,
    pub voice: Option<String>,
    pub instructions: Option<String>,
    pub transcription_model: Option<String>,
    pub input_audio_format: Option<String>,
    pub output_audio_format: Option<String>,
    pub min_commit_ms: Option<u64>,
    pub vad_threshold: Option<f32>,
    pub vad_prefix_padding_ms: Option<u32>,
    pub vad_silence_duration_ms: Option<u32>,
    pub connect_timeout_ms: Option<u64>,
    pub shutdown_grace_ms: Option<u64>,
    pub worker_threads: Option<usize>,
    pub buffer_size: Option<usize>,
    pub buffer_pool_capacity: Option<usize>,
    pub pool_exhaustion: Option<PoolExhaustion>,
}

fn env_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

impl RealtimeFileConfig {
    /// Load settings from environment variables.
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        Ok(Self {
            api_key: env_var(ENV_API_KEY),
            url: env_var(ENV_URL),
            model: env_var(ENV_MODEL),
            mode: env_var(ENV_MODE),
            voice: env_var(ENV_VOICE),
            ..Default::default()
        })
    }

    /// Load settings from a YAML file. Environment variables fill in
    /// whatever the file leaves unset.
    pub fn from_file(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let yaml_config = YamlConfig::from_file(path)?;
        let env_config = Self::from_env()?;
        Ok(Self::merge(yaml_config, env_config))
    }

    fn merge(yaml: YamlConfig, env: Self) -> Self {
        let openai = yaml.openai.unwrap_or_default();
        let audio = yaml.audio.unwrap_or_default();
        let vad = yaml.turn_detection.unwrap_or_default();
        let connection = yaml.connection.unwrap_or_default();

        Self {
            api_key: openai.api_key.or(env.api_key),
            url: openai.url.or(env.url),
            model: openai.model.or(env.model),
            mode: openai.mode.or(env.mode),
            voice: openai.voice.or(env.voice),
            instructions: openai.instructions,
            transcription_model: openai.transcription_model,
            input_audio_format: audio.input_format,
            output_audio_format: audio.output_format,
            min_commit_ms: audio.min_commit_ms,
            vad_threshold: vad.threshold,
            vad_prefix_padding_ms: vad.prefix_padding_ms,
            vad_silence_duration_ms: vad.silence_duration_ms,
            connect_timeout_ms: connection.connect_timeout_ms,
            shutdown_grace_ms: connection.shutdown_grace_ms,
            worker_threads: connection.worker_threads,
            buffer_size: connection.buffer_size,
            buffer_pool_capacity: connection.buffer_pool_capacity,
            pool_exhaustion: connection.pool_exhaustion,
        }
    }

    /// Build a validated client configuration.
    pub fn into_client_config(self) -> RealtimeResult<OpenAIRealtimeConfig> {
        let defaults = OpenAIRealtimeConfig::default();
        let mode = self
            .mode
            .as_deref()
            .map(RealtimeMode::from_str_or_default)
            .unwrap_or(defaults.mode);

        let turn_detection = if self.vad_threshold.is_some()
            || self.vad_prefix_padding_ms.is_some()
            || self.vad_silence_duration_ms.is_some()
        {
            let base = TurnDetectionSettings::for_mode(mode);
            Some(TurnDetectionSettings {
                threshold: self.vad_threshold.unwrap_or(base.threshold),
                prefix_padding_ms: self.vad_prefix_padding_ms.unwrap_or(base.prefix_padding_ms),
                silence_duration_ms: self
                    .vad_silence_duration_ms
                    .unwrap_or(base.silence_duration_ms),
            })
        } else {
            None
        };

        let config = OpenAIRealtimeConfig {
            api_key: self.api_key.unwrap_or_default(),
            url: self.url.unwrap_or(defaults.url),
            model: self
                .model
                .as_deref()
                .map(OpenAIRealtimeModel::from_str_or_default)
                .unwrap_or(defaults.model),
            mode,
            input_audio_format: self
                .input_audio_format
                .as_deref()
                .map(OpenAIRealtimeAudioFormat::from_str_or_default)
                .unwrap_or(defaults.input_audio_format),
            output_audio_format: self
                .output_audio_format
                .as_deref()
                .map(OpenAIRealtimeAudioFormat::from_str_or_default)
                .unwrap_or(defaults.output_audio_format),
            voice: self
                .voice
                .as_deref()
                .map(OpenAIRealtimeVoice::from_str_or_default)
                .unwrap_or(defaults.voice),
            instructions: self.instructions.unwrap_or(defaults.instructions),
            transcription_model: self
                .transcription_model
                .as_deref()
                .map(TranscriptionModel::from_str_or_default)
                .unwrap_or(defaults.transcription_model),
            turn_detection,
            connect_timeout: self
                .connect_timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.connect_timeout),
            buffer_size: self.buffer_size.unwrap_or(defaults.buffer_size),
            buffer_pool_capacity: self
                .buffer_pool_capacity
                .unwrap_or(defaults.buffer_pool_capacity),
            pool_exhaustion: self.pool_exhaustion.unwrap_or(defaults.pool_exhaustion),
            worker_threads: self.worker_threads.unwrap_or(defaults.worker_threads),
            shutdown_grace: self
                .shutdown_grace_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.shutdown_grace),
            min_commit_ms: self.min_commit_ms.unwrap_or(defaults.min_commit_ms),
        };
        config.validate()?;
        Ok(config)
    }
}
