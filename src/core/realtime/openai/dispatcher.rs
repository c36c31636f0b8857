//! Inbound dispatch.
//!
//! Runs on the read task: decodes each text frame, applies the client's own
//! bookkeeping for the event, then hands the event to the registered handler
//! on the worker pool. No user code runs on the read task.

use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, error, info, warn};

use super::events::{EventKind, InboundEvent, ServerEvent};
use super::handlers::HandlerRegistry;
use crate::core::realtime::accumulator::AudioAccumulator;
use crate::core::realtime::worker::WorkerPool;

pub struct InboundDispatcher {
    registry: Arc<HandlerRegistry>,
    accumulator: Arc<AudioAccumulator>,
    workers: Arc<WorkerPool>,
    session_id: RwLock<Option<String>>,
}

impl InboundDispatcher {
    pub fn new(
        registry: Arc<HandlerRegistry>,
        accumulator: Arc<AudioAccumulator>,
        workers: Arc<WorkerPool>,
    ) -> Self {
        Self {
            registry,
            accumulator,
            workers,
            session_id: RwLock::new(None),
        }
    }

    /// Session id announced by the last `session.created`.
    pub fn session_id(&self) -> Option<String> {
        self.session_id.read().clone()
    }

    /// Decode and route one text frame. Undecodable frames are logged and dropped.
    pub fn dispatch_text(&self, text: &str) {
        match InboundEvent::decode(text) {
            Ok(event) => self.dispatch(event),
            Err(e) => error!("Failed to parse server event: {}", e),
        }
    }

    pub fn dispatch(&self, event: InboundEvent) {
        self.observe(&event);

        if let Some(handler) = self.registry.get(event.event_type()) {
            let label = event.event_type().to_string();
            let event = Arc::new(event);
            // The handler is called inside the task so its synchronous part
            // runs on the pool too and panics stay inside catch_unwind.
            self.workers.spawn(&label, async move { handler(event).await });
        }
    }

    /// Bookkeeping keys off the discriminant, so an acknowledgment whose body
    /// failed typed decoding still resets the accumulator.
    fn observe(&self, event: &InboundEvent) {
        match event.kind() {
            Some(EventKind::Error) => {
                if let Some(err) = event.as_server_error() {
                    error!("{}", err);
                }
            }
            Some(EventKind::SessionCreated) => {
                let id = match event.payload() {
                    ServerEvent::SessionCreated(s) => s.session.as_ref().and_then(|s| s.id.clone()),
                    _ => None,
                };
                info!("Session created: {}", id.as_deref().unwrap_or("unknown"));
                *self.session_id.write() = id;
            }
            Some(EventKind::SessionUpdated) => info!("Session updated"),
            Some(EventKind::InputAudioBufferCommitted) => {
                debug!(
                    "Input audio committed as {}",
                    event.get_str("item_id").unwrap_or("unknown")
                );
                self.accumulator.reset();
            }
            Some(EventKind::InputAudioBufferCleared) => {
                debug!("Input audio buffer cleared");
                self.accumulator.reset();
            }
            Some(EventKind::TranscriptionFailed) => {
                let message = match event.payload() {
                    ServerEvent::TranscriptionFailed(f) => {
                        f.error.as_ref().map(|e| e.message.as_str())
                    }
                    _ => None,
                };
                error!(
                    "Transcription failed for {}: {}",
                    event.get_str("item_id").unwrap_or("unknown"),
                    message.unwrap_or_default()
                );
            }
            Some(EventKind::RateLimitsUpdated) => {
                if let ServerEvent::RateLimitsUpdated(r) = event.payload() {
                    for limit in &r.rate_limits {
                        debug!(
                            "Rate limit {}: {}/{} remaining, resets in {}s",
                            limit.name, limit.remaining, limit.limit, limit.reset_seconds
                        );
                    }
                }
            }
            Some(_) => debug!("Received {}", event.event_type()),
            None => warn!("Unrecognized server event: {}", event.event_type()),
        }
    }
}
