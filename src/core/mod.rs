pub mod realtime;

// Re-export commonly used types for convenience
pub use realtime::openai::{
    AudioHandler, EventHandler, InboundEvent, OpenAIRealtimeConfig, ServerEvent,
    TranscriptionHandler, handler_fn,
};
pub use realtime::{
    BaseRealtime, CloseEvent, ConnectionState, ErrorKind, OpenAIRealtime, RealtimeError,
    RealtimeProvider, RealtimeResult, create_realtime_provider, get_supported_realtime_providers,
};
