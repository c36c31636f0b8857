//! Realtime bidirectional speech streaming.
//!
//! Provider-neutral machinery lives at this level:
//! - `BaseRealtime` trait, error taxonomy and connection lifecycle
//! - Pooled send buffers and the ordered, single-flight outbound pipeline
//! - Audio duration accounting for buffer commits
//! - WebSocket handshake, reader task and close notification
//! - Bounded worker pool for running event handlers
//!
//! Provider clients live in submodules.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use waav_realtime::core::realtime::{BaseRealtime, OpenAIRealtime, OpenAIRealtimeConfig};
//!
//! let realtime = OpenAIRealtime::new(OpenAIRealtimeConfig::transcription("sk-..."))?;
//! realtime.on_close(Arc::new(|event| Box::pin(async move {
//!     println!("closed: {} {}", event.code, event.reason);
//! })));
//! realtime.connect().await?;
//! realtime.send_audio(audio_bytes).await?;
//! ```

pub mod accumulator;
mod base;
pub mod buffer_pool;
pub mod connection;
pub mod openai;
pub mod outbound;
pub mod worker;

pub use accumulator::{AudioAccumulator, MIN_COMMIT_DURATION_MS, chunk_duration_ms};
pub use base::{
    BaseRealtime, CLOSE_CODE_ABNORMAL, CLOSE_CODE_CONNECT_FAILED, CLOSE_CODE_NORMAL,
    CloseCallback, CloseEvent, ConnectionState, ErrorKind, RealtimeError, RealtimeResult,
};
pub use buffer_pool::{BufferPool, BufferPoolStats, PoolExhaustion};
pub use openai::{
    OPENAI_REALTIME_SAMPLE_RATE, OPENAI_REALTIME_URL, OpenAIRealtime,
    OpenAIRealtimeAudioFormat, OpenAIRealtimeConfig, OpenAIRealtimeModel, OpenAIRealtimeVoice,
    RealtimeMode,
};

/// Supported realtime providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RealtimeProvider {
    /// OpenAI Realtime API
    OpenAI,
}

impl RealtimeProvider {
    /// Parse a provider name, case-insensitively.
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "openai" | "openai-realtime" => Some(Self::OpenAI),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenAI => "openai",
        }
    }
}

/// Names accepted by [`create_realtime_provider`].
pub fn get_supported_realtime_providers() -> Vec<&'static str> {
    vec!["openai"]
}

/// Build a boxed realtime client for `provider`.
pub fn create_realtime_provider(
    provider: &str,
    config: OpenAIRealtimeConfig,
) -> RealtimeResult<Box<dyn BaseRealtime>> {
    match RealtimeProvider::parse(provider) {
        Some(RealtimeProvider::OpenAI) => Ok(Box::new(OpenAIRealtime::new(config)?)),
        None => Err(RealtimeError::InvalidConfiguration(format!(
            "Unsupported realtime provider: {provider}. Supported providers: {}",
            get_supported_realtime_providers().join(", ")
        ))),
    }
}
