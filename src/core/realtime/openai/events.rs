//! Inbound server events.
//!
//! Each frame is parsed once into a [`serde_json::Value`], its `type` is
//! resolved to an [`EventKind`] through a perfect-hash table, and the kind
//! decodes the typed payload. Frames with a `type` outside the table become
//! [`ServerEvent::Unknown`] and still carry their raw payload.
//!
//! Payload fields are all optional; a server that omits a field produces
//! `None` rather than a decode failure.

use phf::phf_map;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::warn;

use super::messages::{ApiError, ContentPart, ConversationItem, RateLimit};
use crate::core::realtime::base::{RealtimeError, RealtimeResult};

// =============================================================================
// Discriminant Table
// =============================================================================

/// Every inbound discriminant the client understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Error,
    SessionCreated,
    SessionUpdated,
    ConversationItemAdded,
    ConversationItemDone,
    ConversationItemRetrieved,
    ConversationItemTruncated,
    ConversationItemDeleted,
    TranscriptionCompleted,
    TranscriptionDelta,
    TranscriptionSegment,
    TranscriptionFailed,
    InputAudioBufferCommitted,
    InputAudioBufferCleared,
    SpeechStarted,
    SpeechStopped,
    TimeoutTriggered,
    ResponseCreated,
    ResponseDone,
    OutputItemAdded,
    OutputItemDone,
    ContentPartAdded,
    ContentPartDone,
    OutputTextDelta,
    OutputTextDone,
    OutputAudioTranscriptDelta,
    OutputAudioTranscriptDone,
    OutputAudioDelta,
    OutputAudioDone,
    FunctionCallArgumentsDelta,
    FunctionCallArgumentsDone,
    McpCallArgumentsDelta,
    McpCallArgumentsDone,
    McpCallInProgress,
    McpCallCompleted,
    McpCallFailed,
    McpListToolsInProgress,
    McpListToolsCompleted,
    McpListToolsFailed,
    RateLimitsUpdated,
}

/// Discriminant string → kind.
pub static EVENT_KINDS: phf::Map<&'static str, EventKind> = phf_map! {
    "error" => EventKind::Error,
    "session.created" => EventKind::SessionCreated,
    "session.updated" => EventKind::SessionUpdated,
    "conversation.item.added" => EventKind::ConversationItemAdded,
    "conversation.item.done" => EventKind::ConversationItemDone,
    "conversation.item.retrieved" => EventKind::ConversationItemRetrieved,
    "conversation.item.truncated" => EventKind::ConversationItemTruncated,
    "conversation.item.deleted" => EventKind::ConversationItemDeleted,
    "conversation.item.input_audio_transcription.completed" => EventKind::TranscriptionCompleted,
    "conversation.item.input_audio_transcription.delta" => EventKind::TranscriptionDelta,
    "conversation.item.input_audio_transcription.segment" => EventKind::TranscriptionSegment,
    "conversation.item.input_audio_transcription.failed" => EventKind::TranscriptionFailed,
    "input_audio_buffer.committed" => EventKind::InputAudioBufferCommitted,
    "input_audio_buffer.cleared" => EventKind::InputAudioBufferCleared,
    "input_audio_buffer.speech_started" => EventKind::SpeechStarted,
    "input_audio_buffer.speech_stopped" => EventKind::SpeechStopped,
    "input_audio_buffer.timeout_triggered" => EventKind::TimeoutTriggered,
    "response.created" => EventKind::ResponseCreated,
    "response.done" => EventKind::ResponseDone,
    "response.output_item.added" => EventKind::OutputItemAdded,
    "response.output_item.done" => EventKind::OutputItemDone,
    "response.content_part.added" => EventKind::ContentPartAdded,
    "response.content_part.done" => EventKind::ContentPartDone,
    "response.output_text.delta" => EventKind::OutputTextDelta,
    "response.output_text.done" => EventKind::OutputTextDone,
    "response.output_audio_transcript.delta" => EventKind::OutputAudioTranscriptDelta,
    "response.output_audio_transcript.done" => EventKind::OutputAudioTranscriptDone,
    "response.output_audio.delta" => EventKind::OutputAudioDelta,
    "response.output_audio.done" => EventKind::OutputAudioDone,
    "response.function_call_arguments.delta" => EventKind::FunctionCallArgumentsDelta,
    "response.function_call_arguments.done" => EventKind::FunctionCallArgumentsDone,
    "response.mcp_call_arguments.delta" => EventKind::McpCallArgumentsDelta,
    "response.mcp_call_arguments.done" => EventKind::McpCallArgumentsDone,
    "response.mcp_call.in_progress" => EventKind::McpCallInProgress,
    "response.mcp_call.completed" => EventKind::McpCallCompleted,
    "response.mcp_call.failed" => EventKind::McpCallFailed,
    "mcp_list_tools.in_progress" => EventKind::McpListToolsInProgress,
    "mcp_list_tools.completed" => EventKind::McpListToolsCompleted,
    "mcp_list_tools.failed" => EventKind::McpListToolsFailed,
    "rate_limits.updated" => EventKind::RateLimitsUpdated,
};

/// Discriminants for specialized handler registration.
pub mod event_types {
    pub const ERROR: &str = "error";
    pub const SESSION_CREATED: &str = "session.created";
    pub const INPUT_AUDIO_BUFFER_COMMITTED: &str = "input_audio_buffer.committed";
    pub const INPUT_AUDIO_BUFFER_CLEARED: &str = "input_audio_buffer.cleared";
    pub const TRANSCRIPTION_COMPLETED: &str =
        "conversation.item.input_audio_transcription.completed";
    pub const TRANSCRIPTION_DELTA: &str = "conversation.item.input_audio_transcription.delta";
    pub const OUTPUT_AUDIO_DELTA: &str = "response.output_audio.delta";
}

fn typed<T: DeserializeOwned>(raw: &Value) -> Result<T, serde_json::Error> {
    T::deserialize(raw)
}

impl EventKind {
    /// O(1) lookup of a wire discriminant.
    #[inline]
    pub fn from_type(event_type: &str) -> Option<Self> {
        EVENT_KINDS.get(event_type).copied()
    }

    /// Decode the payload of a frame of this kind.
    pub fn decode(self, raw: &Value) -> Result<ServerEvent, serde_json::Error> {
        use EventKind as K;
        use ServerEvent as E;
        Ok(match self {
            K::Error => E::Error(typed(raw)?),
            K::SessionCreated => E::SessionCreated(typed(raw)?),
            K::SessionUpdated => E::SessionUpdated(typed(raw)?),
            K::ConversationItemAdded => E::ConversationItemAdded(typed(raw)?),
            K::ConversationItemDone => E::ConversationItemDone(typed(raw)?),
            K::ConversationItemRetrieved => E::ConversationItemRetrieved(typed(raw)?),
            K::ConversationItemTruncated => E::ConversationItemTruncated(typed(raw)?),
            K::ConversationItemDeleted => E::ConversationItemDeleted(typed(raw)?),
            K::TranscriptionCompleted => E::TranscriptionCompleted(typed(raw)?),
            K::TranscriptionDelta => E::TranscriptionDelta(typed(raw)?),
            K::TranscriptionSegment => E::TranscriptionSegment(typed(raw)?),
            K::TranscriptionFailed => E::TranscriptionFailed(typed(raw)?),
            K::InputAudioBufferCommitted => E::InputAudioBufferCommitted(typed(raw)?),
            K::InputAudioBufferCleared => E::InputAudioBufferCleared,
            K::SpeechStarted => E::SpeechStarted(typed(raw)?),
            K::SpeechStopped => E::SpeechStopped(typed(raw)?),
            K::TimeoutTriggered => E::TimeoutTriggered(typed(raw)?),
            K::ResponseCreated => E::ResponseCreated(typed(raw)?),
            K::ResponseDone => E::ResponseDone(typed(raw)?),
            K::OutputItemAdded => E::OutputItemAdded(typed(raw)?),
            K::OutputItemDone => E::OutputItemDone(typed(raw)?),
            K::ContentPartAdded => E::ContentPartAdded(typed(raw)?),
            K::ContentPartDone => E::ContentPartDone(typed(raw)?),
            K::OutputTextDelta => E::OutputTextDelta(typed(raw)?),
            K::OutputTextDone => E::OutputTextDone(typed(raw)?),
            K::OutputAudioTranscriptDelta => E::OutputAudioTranscriptDelta(typed(raw)?),
            K::OutputAudioTranscriptDone => E::OutputAudioTranscriptDone(typed(raw)?),
            K::OutputAudioDelta => E::OutputAudioDelta(typed(raw)?),
            K::OutputAudioDone => E::OutputAudioDone(typed(raw)?),
            K::FunctionCallArgumentsDelta => E::FunctionCallArgumentsDelta(typed(raw)?),
            K::FunctionCallArgumentsDone => E::FunctionCallArgumentsDone(typed(raw)?),
            K::McpCallArgumentsDelta => E::McpCallArgumentsDelta(typed(raw)?),
            K::McpCallArgumentsDone => E::McpCallArgumentsDone(typed(raw)?),
            K::McpCallInProgress => E::McpCallInProgress(typed(raw)?),
            K::McpCallCompleted => E::McpCallCompleted(typed(raw)?),
            K::McpCallFailed => E::McpCallFailed(typed(raw)?),
            K::McpListToolsInProgress => E::McpListToolsInProgress(typed(raw)?),
            K::McpListToolsCompleted => E::McpListToolsCompleted(typed(raw)?),
            K::McpListToolsFailed => E::McpListToolsFailed(typed(raw)?),
            K::RateLimitsUpdated => E::RateLimitsUpdated(typed(raw)?),
        })
    }
}

// =============================================================================
// Payloads
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ErrorEvent {
    pub error: ApiError,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct SessionInfo {
    pub id: Option<String>,
    pub model: Option<String>,
    pub voice: Option<String>,
    pub instructions: Option<String>,
    pub input_audio_format: Option<String>,
    pub output_audio_format: Option<String>,
    pub expires_at: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct SessionEvent {
    pub session: Option<SessionInfo>,
}

/// `conversation.item.added`, `.done` and `.retrieved`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ItemEvent {
    pub item: Option<ConversationItem>,
    pub previous_item_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ItemTruncated {
    pub item_id: Option<String>,
    pub content_index: Option<u32>,
    pub audio_end_ms: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ItemDeleted {
    pub item_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct TranscriptionCompleted {
    pub item_id: Option<String>,
    pub content_index: Option<u32>,
    pub transcript: Option<String>,
    pub usage: Option<Value>,
    pub logprobs: Option<Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct TranscriptionDelta {
    pub item_id: Option<String>,
    pub content_index: Option<u32>,
    pub delta: Option<String>,
    pub obfuscation: Option<String>,
    pub logprobs: Option<Value>,
}

/// A diarized transcript segment.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct TranscriptionSegment {
    pub item_id: Option<String>,
    pub content_index: Option<u32>,
    pub id: Option<String>,
    pub text: Option<String>,
    pub speaker: Option<String>,
    pub start: Option<f64>,
    pub end: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct TranscriptionFailed {
    pub item_id: Option<String>,
    pub content_index: Option<u32>,
    pub error: Option<ApiError>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct BufferCommitted {
    pub item_id: Option<String>,
    pub previous_item_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct SpeechStarted {
    pub item_id: Option<String>,
    pub audio_start_ms: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct SpeechStopped {
    pub item_id: Option<String>,
    pub audio_end_ms: Option<u64>,
}

/// Server VAD idle timeout fired.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct TimeoutTriggered {
    pub item_id: Option<String>,
    pub audio_start_ms: Option<u64>,
    pub audio_end_ms: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Usage {
    pub total_tokens: Option<u64>,
    pub input_tokens: Option<u64>,
    pub output_tokens: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ResponseInfo {
    pub id: Option<String>,
    pub status: Option<String>,
    pub status_details: Option<Value>,
    pub output: Option<Vec<ConversationItem>>,
    pub usage: Option<Usage>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ResponseEvent {
    pub response: Option<ResponseInfo>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct OutputItem {
    pub response_id: Option<String>,
    pub output_index: Option<u32>,
    pub item: Option<ConversationItem>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ContentPartEvent {
    pub response_id: Option<String>,
    pub item_id: Option<String>,
    pub output_index: Option<u32>,
    pub content_index: Option<u32>,
    pub part: Option<ContentPart>,
}

/// Streaming chunk of text, transcript or base64 audio.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ContentDelta {
    pub response_id: Option<String>,
    pub item_id: Option<String>,
    pub output_index: Option<u32>,
    pub content_index: Option<u32>,
    pub delta: Option<String>,
}

/// End of a text, transcript or audio content stream.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ContentDone {
    pub response_id: Option<String>,
    pub item_id: Option<String>,
    pub output_index: Option<u32>,
    pub content_index: Option<u32>,
    pub text: Option<String>,
    pub transcript: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct FunctionCallArguments {
    pub response_id: Option<String>,
    pub item_id: Option<String>,
    pub output_index: Option<u32>,
    pub call_id: Option<String>,
    pub name: Option<String>,
    pub delta: Option<String>,
    pub arguments: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct McpCallArguments {
    pub response_id: Option<String>,
    pub item_id: Option<String>,
    pub output_index: Option<u32>,
    pub delta: Option<String>,
    pub arguments: Option<String>,
    pub obfuscation: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct McpCall {
    pub item_id: Option<String>,
    pub output_index: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct McpListTools {
    pub item_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct RateLimitsUpdated {
    pub rate_limits: Vec<RateLimit>,
}

// =============================================================================
// Server Events
// =============================================================================

/// Typed payload of an inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    Error(ErrorEvent),
    SessionCreated(SessionEvent),
    SessionUpdated(SessionEvent),
    ConversationItemAdded(ItemEvent),
    ConversationItemDone(ItemEvent),
    ConversationItemRetrieved(ItemEvent),
    ConversationItemTruncated(ItemTruncated),
    ConversationItemDeleted(ItemDeleted),
    TranscriptionCompleted(TranscriptionCompleted),
    TranscriptionDelta(TranscriptionDelta),
    TranscriptionSegment(TranscriptionSegment),
    TranscriptionFailed(TranscriptionFailed),
    InputAudioBufferCommitted(BufferCommitted),
    InputAudioBufferCleared,
    SpeechStarted(SpeechStarted),
    SpeechStopped(SpeechStopped),
    TimeoutTriggered(TimeoutTriggered),
    ResponseCreated(ResponseEvent),
    ResponseDone(ResponseEvent),
    OutputItemAdded(OutputItem),
    OutputItemDone(OutputItem),
    ContentPartAdded(ContentPartEvent),
    ContentPartDone(ContentPartEvent),
    OutputTextDelta(ContentDelta),
    OutputTextDone(ContentDone),
    OutputAudioTranscriptDelta(ContentDelta),
    OutputAudioTranscriptDone(ContentDone),
    OutputAudioDelta(ContentDelta),
    OutputAudioDone(ContentDone),
    FunctionCallArgumentsDelta(FunctionCallArguments),
    FunctionCallArgumentsDone(FunctionCallArguments),
    McpCallArgumentsDelta(McpCallArguments),
    McpCallArgumentsDone(McpCallArguments),
    McpCallInProgress(McpCall),
    McpCallCompleted(McpCall),
    McpCallFailed(McpCall),
    McpListToolsInProgress(McpListTools),
    McpListToolsCompleted(McpListTools),
    McpListToolsFailed(McpListTools),
    RateLimitsUpdated(RateLimitsUpdated),
    /// Discriminant not in [`EVENT_KINDS`]; see [`InboundEvent::raw`]
    Unknown,
}

/// One decoded inbound frame.
#[derive(Debug, Clone)]
pub struct InboundEvent {
    event_type: String,
    event_id: Option<String>,
    kind: Option<EventKind>,
    payload: ServerEvent,
    raw: Value,
}

impl InboundEvent {
    /// Decode a text frame.
    ///
    /// Fails only when the frame is not a JSON object with a string `type`.
    pub fn decode(text: &str) -> RealtimeResult<Self> {
        let raw: Value = serde_json::from_str(text)?;
        Self::from_value(raw)
    }

    pub fn from_value(raw: Value) -> RealtimeResult<Self> {
        let event_type = raw
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                RealtimeError::SerializationError("event has no type discriminant".to_string())
            })?
            .to_string();
        let event_id = raw
            .get("event_id")
            .and_then(Value::as_str)
            .map(str::to_string);

        let kind = EventKind::from_type(&event_type);
        let payload = match kind {
            Some(kind) => kind.decode(&raw).unwrap_or_else(|e| {
                warn!("Malformed {} event, handling as generic: {}", event_type, e);
                ServerEvent::Unknown
            }),
            None => ServerEvent::Unknown,
        };

        Ok(Self {
            event_type,
            event_id,
            kind,
            payload,
            raw,
        })
    }

    /// Wire discriminant.
    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    pub fn event_id(&self) -> Option<&str> {
        self.event_id.as_deref()
    }

    /// `None` for discriminants outside the table.
    pub fn kind(&self) -> Option<EventKind> {
        self.kind
    }

    pub fn payload(&self) -> &ServerEvent {
        &self.payload
    }

    /// True when the frame is handled as a generic event.
    pub fn is_generic(&self) -> bool {
        matches!(self.payload, ServerEvent::Unknown)
    }

    /// Full JSON payload as received.
    pub fn raw(&self) -> &Value {
        &self.raw
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.raw.get(field)
    }

    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.raw.get(field).and_then(Value::as_str)
    }

    pub fn get_i64(&self, field: &str) -> Option<i64> {
        self.raw.get(field).and_then(Value::as_i64)
    }

    pub fn get_f64(&self, field: &str) -> Option<f64> {
        self.raw.get(field).and_then(Value::as_f64)
    }

    pub fn get_bool(&self, field: &str) -> Option<bool> {
        self.raw.get(field).and_then(Value::as_bool)
    }

    /// The `error` object of an `error` frame, read from the raw payload so a
    /// body that failed typed decoding still reports what it can.
    pub fn as_server_error(&self) -> Option<RealtimeError> {
        if self.kind != Some(EventKind::Error) {
            return None;
        }
        let error = self.raw.get("error");
        let field = |name: &str| error.and_then(|e| e.get(name)).and_then(Value::as_str);
        Some(RealtimeError::ServerError {
            code: field("code")
                .or_else(|| field("type"))
                .unwrap_or("unknown")
                .to_string(),
            message: field("message").unwrap_or_default().to_string(),
        })
    }
}
