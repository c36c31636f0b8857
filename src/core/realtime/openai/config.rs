//! OpenAI Realtime API configuration types.
//!
//! This module contains configuration types for OpenAI's Realtime API:
//! - Model selection
//! - Voice selection
//! - Audio format configuration
//! - Session mode and turn detection settings

use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

use crate::core::realtime::accumulator::MIN_COMMIT_DURATION_MS;
use crate::core::realtime::base::{RealtimeError, RealtimeResult};
use crate::core::realtime::buffer_pool::{
    DEFAULT_BUFFER_SIZE, DEFAULT_POOL_CAPACITY, PoolExhaustion,
};
use crate::core::realtime::connection::DEFAULT_CONNECT_TIMEOUT;
use crate::core::realtime::worker::{DEFAULT_SHUTDOWN_GRACE, default_worker_count};

/// OpenAI Realtime API WebSocket endpoint.
pub const OPENAI_REALTIME_URL: &str = "wss://api.openai.com/v1/realtime";

/// Default audio sample rate for OpenAI Realtime API.
pub const OPENAI_REALTIME_SAMPLE_RATE: u32 = 24000;

/// Instructions sent in conversation mode when none are configured.
pub const DEFAULT_INSTRUCTIONS: &str = "You are a helpful assistant.";

// =============================================================================
// Models
// =============================================================================

/// Supported OpenAI Realtime models.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OpenAIRealtimeModel {
    /// GPT Realtime (default)
    #[default]
    #[serde(rename = "gpt-realtime")]
    GptRealtime,
    /// GPT Realtime Mini
    #[serde(rename = "gpt-realtime-mini")]
    GptRealtimeMini,
    /// GPT-4o Realtime Preview
    #[serde(rename = "gpt-4o-realtime-preview")]
    Gpt4oRealtimePreview,
    /// GPT-4o Realtime Preview 2024-10-01
    #[serde(rename = "gpt-4o-realtime-preview-2024-10-01")]
    Gpt4oRealtimePreview20241001,
    /// GPT-4o Mini Realtime Preview
    #[serde(rename = "gpt-4o-mini-realtime-preview")]
    Gpt4oMiniRealtimePreview,
}

impl OpenAIRealtimeModel {
    /// Convert to the API parameter value.
    #[inline]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GptRealtime => "gpt-realtime",
            Self::GptRealtimeMini => "gpt-realtime-mini",
            Self::Gpt4oRealtimePreview => "gpt-4o-realtime-preview",
            Self::Gpt4oRealtimePreview20241001 => "gpt-4o-realtime-preview-2024-10-01",
            Self::Gpt4oMiniRealtimePreview => "gpt-4o-mini-realtime-preview",
        }
    }

    /// Parse from string, with fallback to default.
    pub fn from_str_or_default(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "gpt-realtime" => Self::GptRealtime,
            "gpt-realtime-mini" => Self::GptRealtimeMini,
            "gpt-4o-realtime-preview" => Self::Gpt4oRealtimePreview,
            "gpt-4o-realtime-preview-2024-10-01" => Self::Gpt4oRealtimePreview20241001,
            "gpt-4o-mini-realtime-preview" => Self::Gpt4oMiniRealtimePreview,
            _ => Self::default(),
        }
    }
}

impl std::fmt::Display for OpenAIRealtimeModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Models that can transcribe input audio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TranscriptionModel {
    #[default]
    #[serde(rename = "whisper-1")]
    Whisper1,
    #[serde(rename = "gpt-4o-transcribe")]
    Gpt4oTranscribe,
    #[serde(rename = "gpt-4o-mini-transcribe")]
    Gpt4oMiniTranscribe,
}

impl TranscriptionModel {
    #[inline]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Whisper1 => "whisper-1",
            Self::Gpt4oTranscribe => "gpt-4o-transcribe",
            Self::Gpt4oMiniTranscribe => "gpt-4o-mini-transcribe",
        }
    }

    pub fn from_str_or_default(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "whisper-1" | "whisper" => Self::Whisper1,
            "gpt-4o-transcribe" => Self::Gpt4oTranscribe,
            "gpt-4o-mini-transcribe" => Self::Gpt4oMiniTranscribe,
            _ => Self::default(),
        }
    }
}

impl std::fmt::Display for TranscriptionModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =============================================================================
// Voices
// =============================================================================

/// Available voices for OpenAI Realtime API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OpenAIRealtimeVoice {
    /// Alloy voice (default)
    #[default]
    Alloy,
    Ash,
    Ballad,
    Coral,
    Echo,
    Sage,
    Shimmer,
    Verse,
    Marin,
    Cedar,
}

impl OpenAIRealtimeVoice {
    /// Convert to the API parameter value.
    #[inline]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Alloy => "alloy",
            Self::Ash => "ash",
            Self::Ballad => "ballad",
            Self::Coral => "coral",
            Self::Echo => "echo",
            Self::Sage => "sage",
            Self::Shimmer => "shimmer",
            Self::Verse => "verse",
            Self::Marin => "marin",
            Self::Cedar => "cedar",
        }
    }

    /// Parse from string, with fallback to default.
    pub fn from_str_or_default(s: &str) -> Self {
        Self::all()
            .iter()
            .copied()
            .find(|voice| voice.as_str().eq_ignore_ascii_case(s))
            .unwrap_or_default()
    }

    /// Get all available voices.
    pub fn all() -> &'static [OpenAIRealtimeVoice] {
        &[
            Self::Alloy,
            Self::Ash,
            Self::Ballad,
            Self::Coral,
            Self::Echo,
            Self::Sage,
            Self::Shimmer,
            Self::Verse,
            Self::Marin,
            Self::Cedar,
        ]
    }
}

impl std::fmt::Display for OpenAIRealtimeVoice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =============================================================================
// Audio Formats
// =============================================================================

/// Supported audio formats for OpenAI Realtime API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OpenAIRealtimeAudioFormat {
    /// PCM 16-bit signed little-endian, 24kHz mono (default)
    #[default]
    Pcm16,
    /// G.711 u-law (8-bit)
    #[serde(rename = "g711_ulaw")]
    G711Ulaw,
    /// G.711 a-law (8-bit)
    #[serde(rename = "g711_alaw")]
    G711Alaw,
}

impl OpenAIRealtimeAudioFormat {
    /// Convert to the API parameter value.
    #[inline]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pcm16 => "pcm16",
            Self::G711Ulaw => "g711_ulaw",
            Self::G711Alaw => "g711_alaw",
        }
    }

    /// Get the sample rate for this format.
    #[inline]
    pub fn sample_rate(&self) -> u32 {
        match self {
            Self::Pcm16 => OPENAI_REALTIME_SAMPLE_RATE,
            Self::G711Ulaw | Self::G711Alaw => 8000,
        }
    }

    #[inline]
    pub fn bytes_per_sample(&self) -> u32 {
        match self {
            Self::Pcm16 => 2,
            Self::G711Ulaw | Self::G711Alaw => 1,
        }
    }

    /// Parse from string, with fallback to default.
    pub fn from_str_or_default(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "pcm16" | "pcm" | "linear16" => Self::Pcm16,
            "g711_ulaw" | "ulaw" | "mulaw" | "pcmu" => Self::G711Ulaw,
            "g711_alaw" | "alaw" | "pcma" => Self::G711Alaw,
            _ => Self::default(),
        }
    }
}

impl std::fmt::Display for OpenAIRealtimeAudioFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =============================================================================
// Session Mode
// =============================================================================

/// What the session is used for. Decides the session initialization payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RealtimeMode {
    /// Spoken conversation with audio responses
    #[default]
    Conversation,
    /// Input transcription only
    Transcription,
}

impl RealtimeMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Conversation => "conversation",
            Self::Transcription => "transcription",
        }
    }

    pub fn from_str_or_default(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "transcription" | "transcribe" | "stt" => Self::Transcription,
            _ => Self::Conversation,
        }
    }
}

/// Server VAD tuning.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TurnDetectionSettings {
    pub threshold: f32,
    pub prefix_padding_ms: u32,
    pub silence_duration_ms: u32,
}

impl TurnDetectionSettings {
    /// Defaults for a session in `mode`.
    pub fn for_mode(mode: RealtimeMode) -> Self {
        let silence_duration_ms = match mode {
            RealtimeMode::Conversation => 200,
            RealtimeMode::Transcription => 500,
        };
        Self {
            threshold: 0.5,
            prefix_padding_ms: 300,
            silence_duration_ms,
        }
    }
}

impl Default for TurnDetectionSettings {
    fn default() -> Self {
        Self::for_mode(RealtimeMode::default())
    }
}

// =============================================================================
// Client Configuration
// =============================================================================

/// Everything an [`OpenAIRealtime`](super::OpenAIRealtime) client needs.
#[derive(Debug, Clone)]
pub struct OpenAIRealtimeConfig {
    pub api_key: String,
    pub url: String,
    pub model: OpenAIRealtimeModel,
    pub mode: RealtimeMode,
    pub input_audio_format: OpenAIRealtimeAudioFormat,
    pub output_audio_format: OpenAIRealtimeAudioFormat,
    pub voice: OpenAIRealtimeVoice,
    pub instructions: String,
    pub transcription_model: TranscriptionModel,
    /// `None` uses the defaults for `mode`
    pub turn_detection: Option<TurnDetectionSettings>,
    pub connect_timeout: Duration,
    pub buffer_size: usize,
    pub buffer_pool_capacity: usize,
    pub pool_exhaustion: PoolExhaustion,
    pub worker_threads: usize,
    pub shutdown_grace: Duration,
    pub min_commit_ms: u64,
}

impl Default for OpenAIRealtimeConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            url: OPENAI_REALTIME_URL.to_string(),
            model: OpenAIRealtimeModel::default(),
            mode: RealtimeMode::default(),
            input_audio_format: OpenAIRealtimeAudioFormat::default(),
            output_audio_format: OpenAIRealtimeAudioFormat::default(),
            voice: OpenAIRealtimeVoice::default(),
            instructions: DEFAULT_INSTRUCTIONS.to_string(),
            transcription_model: TranscriptionModel::default(),
            turn_detection: None,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            buffer_size: DEFAULT_BUFFER_SIZE,
            buffer_pool_capacity: DEFAULT_POOL_CAPACITY,
            pool_exhaustion: PoolExhaustion::default(),
            worker_threads: default_worker_count(),
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
            min_commit_ms: MIN_COMMIT_DURATION_MS,
        }
    }
}

impl OpenAIRealtimeConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            ..Default::default()
        }
    }

    /// Transcription-only session with `whisper-1`.
    pub fn transcription(api_key: impl Into<String>) -> Self {
        Self {
            mode: RealtimeMode::Transcription,
            ..Self::new(api_key)
        }
    }

    pub fn turn_detection(&self) -> TurnDetectionSettings {
        self.turn_detection
            .unwrap_or_else(|| TurnDetectionSettings::for_mode(self.mode))
    }

    /// Fail fast on anything that would make the client unusable.
    pub fn validate(&self) -> RealtimeResult<()> {
        if self.api_key.trim().is_empty() {
            return Err(RealtimeError::AuthenticationFailed(
                "API key is required".to_string(),
            ));
        }
        self.parsed_url()?;
        if self.buffer_size == 0 {
            return Err(RealtimeError::InvalidConfiguration(
                "buffer_size must be greater than zero".to_string(),
            ));
        }
        if self.buffer_pool_capacity == 0 {
            return Err(RealtimeError::InvalidConfiguration(
                "buffer_pool_capacity must be greater than zero".to_string(),
            ));
        }
        if self.worker_threads == 0 {
            return Err(RealtimeError::InvalidConfiguration(
                "worker_threads must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    fn parsed_url(&self) -> RealtimeResult<Url> {
        let url = Url::parse(&self.url).map_err(|e| {
            RealtimeError::InvalidConfiguration(format!("Invalid URL {}: {}", self.url, e))
        })?;
        match url.scheme() {
            "ws" | "wss" => Ok(url),
            other => Err(RealtimeError::InvalidConfiguration(format!(
                "URL scheme must be ws or wss, got {other}"
            ))),
        }
    }

    /// Endpoint with the `model` query parameter filled in.
    pub fn endpoint_url(&self) -> RealtimeResult<String> {
        let mut url = self.parsed_url()?;
        if !url.query_pairs().any(|(key, _)| key == "model") {
            url.query_pairs_mut()
                .append_pair("model", self.model.as_str());
        }
        Ok(url.into())
    }
}

// =============================================================================
// Tests
// =============================================================================
