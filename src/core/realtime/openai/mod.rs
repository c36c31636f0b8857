//! OpenAI Realtime API client.
//!
//! Streams microphone audio to OpenAI's Realtime API over a single WebSocket
//! and dispatches the server's events to registered handlers.
//!
//! # Modes
//!
//! - `Conversation` - speech in, speech and text out
//! - `Transcription` - speech in, transcripts out
//!
//! # Supported Models
//!
//! - `gpt-realtime` (default), `gpt-realtime-mini`
//! - `gpt-4o-realtime-preview`, `gpt-4o-realtime-preview-2024-10-01`
//! - `gpt-4o-mini-realtime-preview`
//!
//! Transcription uses `whisper-1`, `gpt-4o-transcribe` or `gpt-4o-mini-transcribe`.
//!
//! # Supported Voices
//!
//! alloy, ash, ballad, coral, echo, sage, shimmer, verse, marin, cedar
//!
//! # Audio Format
//!
//! PCM 16-bit signed little-endian at 24kHz, or G.711 u-law / a-law at 8kHz.
//!
//! # Example
//!
//! ```rust,ignore
//! use waav_realtime::core::realtime::openai::{
//!     OpenAIRealtime, OpenAIRealtimeConfig, handler_fn,
//! };
//!
//! let realtime = OpenAIRealtime::new(OpenAIRealtimeConfig::new("sk-..."))?;
//! realtime.register_event_handler(
//!     "response.output_text.delta",
//!     handler_fn(|event| async move {
//!         print!("{}", event.get_str("delta").unwrap_or_default());
//!     }),
//! );
//! realtime.connect().await?;
//! realtime.append_audio(&pcm)?;
//! realtime.commit_buffer()?;
//! realtime.create_response(None)?;
//! ```

mod client;
mod config;
mod dispatcher;
pub mod events;
mod handlers;
mod messages;
mod session;

pub use client::OpenAIRealtime;
pub use config::{
    DEFAULT_INSTRUCTIONS, OPENAI_REALTIME_SAMPLE_RATE, OPENAI_REALTIME_URL,
    OpenAIRealtimeAudioFormat, OpenAIRealtimeConfig, OpenAIRealtimeModel, OpenAIRealtimeVoice,
    RealtimeMode, TranscriptionModel, TurnDetectionSettings,
};
pub use dispatcher::InboundDispatcher;
pub use events::{EventKind, InboundEvent, ServerEvent, event_types};
pub use handlers::{AudioHandler, EventHandler, HandlerRegistry, TranscriptionHandler, handler_fn};
pub use messages::{
    ApiError, ClientEvent, ContentPart, ConversationItem, InputAudioTranscription,
    OutboundEvent, RateLimit, ResponseConfig, SessionConfig, TurnDetection, generate_event_id,
};
