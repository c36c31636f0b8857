//! OpenAI Realtime API client.
//!
//! Owns one WebSocket connection and the machinery around it: the ordered
//! outbound pipeline, the audio accumulator, the handler registry and the
//! worker pool that runs handlers.
//!
//! # API Reference
//!
//! - Endpoint: `wss://api.openai.com/v1/realtime?model=<model>`
//! - Protocol: WebSocket with JSON events
//! - Audio: base64 encoded, PCM 16-bit 24kHz or G.711 8kHz
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use waav_realtime::core::realtime::openai::{OpenAIRealtime, OpenAIRealtimeConfig};
//!
//! let realtime = OpenAIRealtime::new(OpenAIRealtimeConfig::transcription("sk-..."))?;
//! realtime.register_transcription_handler(Arc::new(MyTranscripts));
//! realtime.connect().await?;
//!
//! for chunk in pcm.chunks(4800) {
//!     realtime.append_audio(chunk)?;
//! }
//! realtime.commit_buffer()?;
//! realtime.close().await?;
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use base64::prelude::*;
use bytes::Bytes;
use futures_util::StreamExt;
use parking_lot::Mutex;
use serde_json::json;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::config::OpenAIRealtimeConfig;
use super::dispatcher::InboundDispatcher;
use super::handlers::{AudioHandler, EventHandler, HandlerRegistry, TranscriptionHandler};
use super::messages::{ClientEvent, ConversationItem, OutboundEvent, SessionConfig};
use crate::core::realtime::accumulator::{AudioAccumulator, chunk_duration_ms};
use crate::core::realtime::base::{
    BaseRealtime, CLOSE_CODE_CONNECT_FAILED, CLOSE_CODE_NORMAL, CloseCallback, CloseEvent,
    ConnectionState, RealtimeError, RealtimeResult,
};
use crate::core::realtime::buffer_pool::{BufferPool, BufferPoolStats};
use crate::core::realtime::connection::{
    ConnectionStatus, FrameSink, open_websocket, spawn_reader,
};
use crate::core::realtime::outbound::OutboundPipeline;
use crate::core::realtime::worker::WorkerPool;

/// Beta header required by the realtime endpoint.
const OPENAI_BETA_HEADER: (&str, &str) = ("openai-beta", "realtime=v1");

const CLOSE_REASON_CLIENT: &str = "Client closing";

// =============================================================================
// OpenAI Realtime Client
// =============================================================================

/// Realtime client for one session.
///
/// A client connects at most once. After a close, whether local, remote or
/// caused by a transport failure, a new client must be built.
///
/// # Thread Safety
///
/// Every method takes `&self`; the client can be shared behind an `Arc`
/// between an audio producer, a control task and `close()`.
pub struct OpenAIRealtime {
    config: OpenAIRealtimeConfig,
    status: Arc<ConnectionStatus>,
    pipeline: Arc<OutboundPipeline<OutboundEvent>>,
    accumulator: Arc<AudioAccumulator>,
    registry: Arc<HandlerRegistry>,
    dispatcher: Arc<InboundDispatcher>,
    workers: Arc<WorkerPool>,
    reader_cancel: CancellationToken,
    reader: Mutex<Option<JoinHandle<()>>>,
}

impl OpenAIRealtime {
    /// Build a client. Fails fast on invalid configuration.
    pub fn new(config: OpenAIRealtimeConfig) -> RealtimeResult<Self> {
        config.validate()?;

        let status = Arc::new(ConnectionStatus::new());
        let pool = BufferPool::new(
            config.buffer_size,
            config.buffer_pool_capacity,
            config.pool_exhaustion,
        );
        let pipeline = Arc::new(OutboundPipeline::new(pool, Arc::clone(&status)));
        let accumulator = Arc::new(AudioAccumulator::new(config.min_commit_ms));
        let registry = Arc::new(HandlerRegistry::new());
        let workers = Arc::new(WorkerPool::new(config.worker_threads));
        let dispatcher = Arc::new(InboundDispatcher::new(
            Arc::clone(&registry),
            Arc::clone(&accumulator),
            Arc::clone(&workers),
        ));

        Ok(Self {
            config,
            status,
            pipeline,
            accumulator,
            registry,
            dispatcher,
            workers,
            reader_cancel: CancellationToken::new(),
            reader: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &OpenAIRealtimeConfig {
        &self.config
    }

    // =========================================================================
    // Connection
    // =========================================================================

    /// Open the WebSocket and initialize the session.
    ///
    /// On failure the close callback receives code -1 with the cause, and the
    /// client becomes unusable. There is no internal retry.
    pub async fn connect(&self) -> RealtimeResult<()> {
        if !self.status.advance(ConnectionState::Connecting) {
            return Err(match self.status.state() {
                ConnectionState::Closing | ConnectionState::Closed => RealtimeError::Closed,
                _ => RealtimeError::AlreadyConnected,
            });
        }

        info!(
            "Connecting to OpenAI Realtime ({}, {} mode)",
            self.config.model,
            self.config.mode.as_str()
        );

        let timeout = self.config.connect_timeout;
        let result = match tokio::time::timeout(timeout, self.establish()).await {
            Ok(result) => result,
            Err(_) => Err(RealtimeError::Timeout(format!(
                "connect did not complete within {} ms",
                timeout.as_millis()
            ))),
        };

        match result {
            Ok(()) => {
                info!("OpenAI Realtime connected");
                Ok(())
            }
            Err(RealtimeError::Closed) => Err(RealtimeError::Closed),
            Err(e) => {
                error!("Failed to connect to OpenAI Realtime: {}", e);
                self.status.advance(ConnectionState::Closed);
                // A timeout can land after the sink was handed to the pipeline
                let _ = self
                    .pipeline
                    .close_transport(
                        CLOSE_CODE_NORMAL as u16,
                        CLOSE_REASON_CLIENT,
                        self.config.shutdown_grace,
                    )
                    .await;
                self.status
                    .notify_close(
                        CloseEvent::new(CLOSE_CODE_CONNECT_FAILED, "Connection failed")
                            .with_cause(&e),
                    )
                    .await;
                Err(e)
            }
        }
    }

    /// Handshake, session initialization and reader start-up. The caller
    /// bounds the whole sequence with the connect timeout.
    async fn establish(&self) -> RealtimeResult<()> {
        let url = self.config.endpoint_url()?;
        let ws_stream = open_websocket(&url, &self.config.api_key, &[OPENAI_BETA_HEADER]).await?;

        let (mut sink, stream) = ws_stream.split();

        // Session initialization goes out before the pipeline owns the sink,
        // so it is always the first frame on the wire.
        let init = OutboundEvent::new(ClientEvent::SessionUpdate {
            session: SessionConfig::initial(&self.config),
        });
        sink.send_text(&serde_json::to_string(&init)?).await?;
        debug!("Sent session.update ({})", init.event_id);

        // The pipeline owns the sink before the client reports Open, so a
        // close() that observes Open always finds a sink to close.
        self.pipeline.attach(Box::new(sink)).await;
        if !self.status.advance(ConnectionState::Open) {
            // close() ran while the handshake was in flight and may have
            // missed the sink; whichever side takes it sends the close frame.
            let _ = self
                .pipeline
                .close_transport(
                    CLOSE_CODE_NORMAL as u16,
                    CLOSE_REASON_CLIENT,
                    self.config.shutdown_grace,
                )
                .await;
            return Err(RealtimeError::Closed);
        }

        let dispatcher = Arc::clone(&self.dispatcher);
        let reader = spawn_reader(
            stream,
            Arc::clone(&self.status),
            self.reader_cancel.clone(),
            move |text| dispatcher.dispatch_text(text),
        );
        *self.reader.lock() = Some(reader);
        Ok(())
    }

    /// Close the connection and release every resource.
    ///
    /// Only the first call does anything. Events still queued are dropped.
    pub async fn close(&self) -> RealtimeResult<()> {
        if !self.status.request_close() {
            debug!("Close already requested");
            return Ok(());
        }
        info!("Closing OpenAI Realtime connection");

        if !self.status.advance(ConnectionState::Closing) {
            debug!("Connection already {}", self.status.state());
        }

        let dropped = self.pipeline.discard_pending();
        if dropped > 0 {
            warn!("Dropping {} queued events on close", dropped);
        }

        let grace = self.config.shutdown_grace;
        if let Err(e) = self
            .pipeline
            .close_transport(CLOSE_CODE_NORMAL as u16, CLOSE_REASON_CLIENT, grace)
            .await
        {
            debug!("Close frame not sent: {}", e);
        }

        self.reader_cancel.cancel();
        let reader = self.reader.lock().take();
        if let Some(reader) = reader {
            if tokio::time::timeout(grace, reader).await.is_err() {
                warn!("Reader did not stop within {} ms", grace.as_millis());
            }
        }

        if !self.workers.shutdown(grace).await {
            warn!("Handlers still running after {} ms were cancelled", grace.as_millis());
        }

        self.accumulator.reset();
        self.pipeline.release_buffers();
        self.status.advance(ConnectionState::Closed);
        self.status
            .notify_close(CloseEvent::new(CLOSE_CODE_NORMAL, CLOSE_REASON_CLIENT))
            .await;

        info!("OpenAI Realtime connection closed");
        Ok(())
    }

    /// Point-in-time check; sends re-check the state themselves.
    pub fn is_connected(&self) -> bool {
        self.status.is_open()
    }

    pub fn is_closed(&self) -> bool {
        self.status.state() == ConnectionState::Closed
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.status.state()
    }

    /// Session id reported by the server, once `session.created` arrived.
    pub fn session_id(&self) -> Option<String> {
        self.dispatcher.session_id()
    }

    /// Set the callback that receives the single close notification.
    pub fn on_close(&self, callback: CloseCallback) {
        self.status.set_close_callback(callback);
    }

    // =========================================================================
    // Handlers
    // =========================================================================

    /// Register `handler` for `event_type`, replacing any earlier one.
    ///
    /// Any discriminant is accepted, including ones this client does not
    /// know; such events arrive as generic events.
    pub fn register_event_handler(
        &self,
        event_type: impl Into<String>,
        handler: EventHandler,
    ) -> Option<EventHandler> {
        self.registry.register(event_type, handler)
    }

    pub fn unregister_event_handler(&self, event_type: &str) -> Option<EventHandler> {
        self.registry.unregister(event_type)
    }

    pub fn register_transcription_handler(&self, handler: Arc<dyn TranscriptionHandler>) {
        self.registry.register_transcription(handler);
    }

    pub fn register_audio_handler(&self, handler: Arc<dyn AudioHandler>) {
        self.registry.register_audio(handler);
    }

    // =========================================================================
    // Audio
    // =========================================================================

    pub(super) fn ensure_open(&self) -> RealtimeResult<()> {
        match self.status.state() {
            ConnectionState::Open => Ok(()),
            ConnectionState::Closing | ConnectionState::Closed => Err(RealtimeError::Closed),
            ConnectionState::Disconnected | ConnectionState::Connecting => {
                Err(RealtimeError::NotConnected)
            }
        }
    }

    pub(super) fn accumulator(&self) -> &AudioAccumulator {
        &self.accumulator
    }

    pub(super) fn enqueue(&self, event: ClientEvent) -> String {
        let event = OutboundEvent::new(event);
        let event_id = event.event_id.clone();
        self.pipeline.enqueue(event);
        event_id
    }

    /// Stream a chunk of raw audio in the configured input format.
    pub fn append_audio(&self, audio: &[u8]) -> RealtimeResult<()> {
        self.ensure_open()?;
        let format = self.config.input_audio_format;
        let duration = chunk_duration_ms(
            audio.len(),
            format.bytes_per_sample(),
            format.sample_rate(),
        );
        self.accumulator
            .append_with(duration, || self.enqueue(ClientEvent::audio_append(audio)));
        Ok(())
    }

    /// Stream a chunk that is already base64 encoded.
    pub fn append_audio_base64(&self, audio: &str) -> RealtimeResult<()> {
        let decoded = BASE64_STANDARD
            .decode(audio)
            .map_err(|e| RealtimeError::InvalidArgument(format!("audio is not base64: {e}")))?;
        self.append_audio(&decoded)
    }

    /// Commit the input buffer.
    ///
    /// Returns `Ok(false)` and sends nothing when less than the minimum
    /// duration has accumulated.
    pub fn commit_buffer(&self) -> RealtimeResult<bool> {
        self.ensure_open()?;
        Ok(self.accumulator.commit_with(|| {
            self.enqueue(ClientEvent::InputAudioBufferCommit);
        }))
    }

    /// Discard the server-side input buffer.
    pub fn clear_buffer(&self) -> RealtimeResult<()> {
        self.ensure_open()?;
        self.accumulator.clear_with(|| {
            self.enqueue(ClientEvent::InputAudioBufferClear);
        });
        Ok(())
    }

    /// Audio appended since the last commit or clear.
    pub fn current_audio_duration_ms(&self) -> u64 {
        self.accumulator.current_ms()
    }

    // =========================================================================
    // Observability
    // =========================================================================

    /// Outbound events waiting to be sent.
    pub fn pending_events(&self) -> usize {
        self.pipeline.pending()
    }

    pub fn buffer_pool_stats(&self) -> BufferPoolStats {
        self.pipeline.pool_stats()
    }

    /// Install a transport without a handshake and mark the client open.
    #[cfg(test)]
    pub(crate) async fn attach_transport_for_test(&self, sink: Box<dyn FrameSink>) {
        self.status.advance(ConnectionState::Connecting);
        self.pipeline.attach(sink).await;
        self.status.advance(ConnectionState::Open);
    }
}

#[async_trait]
impl BaseRealtime for OpenAIRealtime {
    async fn connect(&self) -> RealtimeResult<()> {
        OpenAIRealtime::connect(self).await
    }

    async fn close(&self) -> RealtimeResult<()> {
        OpenAIRealtime::close(self).await
    }

    fn is_ready(&self) -> bool {
        self.is_connected()
    }

    fn connection_state(&self) -> ConnectionState {
        OpenAIRealtime::connection_state(self)
    }

    async fn send_audio(&self, audio_data: Bytes) -> RealtimeResult<()> {
        self.append_audio(&audio_data)
    }

    async fn send_text(&self, text: &str) -> RealtimeResult<()> {
        self.ensure_open()?;
        self.enqueue(ClientEvent::ConversationItemCreate {
            item: ConversationItem::user_text(text),
            previous_item_id: None,
        });
        Ok(())
    }

    fn provider_info(&self) -> serde_json::Value {
        json!({
            "provider": "openai",
            "api_type": "realtime",
            "model": self.config.model.as_str(),
            "mode": self.config.mode.as_str(),
            "input_audio_format": self.config.input_audio_format.as_str(),
            "output_audio_format": self.config.output_audio_format.as_str(),
            "voice": self.config.voice.as_str(),
            "transcription_model": self.config.transcription_model.as_str(),
            "endpoint": self.config.url,
        })
    }
}

// =============================================================================
// Tests
// =============================================================================
