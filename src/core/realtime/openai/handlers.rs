//! Handler registry for inbound events.
//!
//! One handler per discriminant. Registering again replaces the previous
//! handler; the registry uses DashMap so registration never blocks dispatch.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use base64::prelude::*;
use bytes::Bytes;
use dashmap::DashMap;
use tracing::{debug, warn};

use super::events::{InboundEvent, ServerEvent, event_types};

/// Async handler invoked with a shared inbound event.
pub type EventHandler =
    Arc<dyn Fn(Arc<InboundEvent>) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

/// Wrap an async closure as an [`EventHandler`].
///
/// ```rust,ignore
/// realtime.register_event_handler("response.done", handler_fn(|event| async move {
///     println!("{}", event.raw());
/// }));
/// ```
pub fn handler_fn<F, Fut>(f: F) -> EventHandler
where
    F: Fn(Arc<InboundEvent>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    Arc::new(move |event| -> Pin<Box<dyn Future<Output = ()> + Send>> { Box::pin(f(event)) })
}

/// Receives final input transcripts.
pub trait TranscriptionHandler: Send + Sync {
    fn on_transcription(&self, item_id: &str, content_index: u32, transcript: &str);

    /// Incremental transcript text. Ignored unless overridden.
    fn on_transcription_delta(&self, _item_id: &str, _content_index: u32, _delta: &str) {}
}

/// Receives decoded output audio chunks.
pub trait AudioHandler: Send + Sync {
    fn on_audio(&self, item_id: &str, content_index: u32, audio: Bytes);
}

#[derive(Default)]
pub struct HandlerRegistry {
    handlers: DashMap<String, EventHandler>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install `handler` for `event_type`, returning the one it replaced.
    pub fn register(
        &self,
        event_type: impl Into<String>,
        handler: EventHandler,
    ) -> Option<EventHandler> {
        let event_type = event_type.into();
        let previous = self.handlers.insert(event_type.clone(), handler);
        if previous.is_some() {
            debug!("Replaced handler for {}", event_type);
        }
        previous
    }

    pub fn unregister(&self, event_type: &str) -> Option<EventHandler> {
        self.handlers.remove(event_type).map(|(_, handler)| handler)
    }

    /// Handler currently registered for `event_type`.
    pub fn get(&self, event_type: &str) -> Option<EventHandler> {
        self.handlers.get(event_type).map(|h| Arc::clone(h.value()))
    }

    pub fn contains(&self, event_type: &str) -> bool {
        self.handlers.contains_key(event_type)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Route completed and incremental input transcripts to `handler`.
    pub fn register_transcription(&self, handler: Arc<dyn TranscriptionHandler>) {
        let on_done = Arc::clone(&handler);
        self.register(
            event_types::TRANSCRIPTION_COMPLETED,
            handler_fn(move |event| {
                let handler = Arc::clone(&on_done);
                async move {
                    let ServerEvent::TranscriptionCompleted(t) = event.payload() else {
                        return;
                    };
                    if let (Some(item_id), Some(index), Some(transcript)) =
                        (&t.item_id, t.content_index, &t.transcript)
                    {
                        handler.on_transcription(item_id, index, transcript);
                    }
                }
            }),
        );
        self.register(
            event_types::TRANSCRIPTION_DELTA,
            handler_fn(move |event| {
                let handler = Arc::clone(&handler);
                async move {
                    let ServerEvent::TranscriptionDelta(t) = event.payload() else {
                        return;
                    };
                    if let (Some(item_id), Some(index), Some(delta)) =
                        (&t.item_id, t.content_index, &t.delta)
                    {
                        handler.on_transcription_delta(item_id, index, delta);
                    }
                }
            }),
        );
    }

    /// Route decoded `response.output_audio.delta` chunks to `handler`.
    pub fn register_audio(&self, handler: Arc<dyn AudioHandler>) {
        self.register(
            event_types::OUTPUT_AUDIO_DELTA,
            handler_fn(move |event| {
                let handler = Arc::clone(&handler);
                async move {
                    let ServerEvent::OutputAudioDelta(chunk) = event.payload() else {
                        return;
                    };
                    let Some(delta) = chunk.delta.as_deref() else {
                        return;
                    };
                    match BASE64_STANDARD.decode(delta) {
                        Ok(audio) => handler.on_audio(
                            chunk.item_id.as_deref().unwrap_or_default(),
                            chunk.content_index.unwrap_or_default(),
                            Bytes::from(audio),
                        ),
                        Err(e) => warn!("Undecodable audio delta: {}", e),
                    }
                }
            }),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn event(value: serde_json::Value) -> Arc<InboundEvent> {
        Arc::new(InboundEvent::from_value(value).unwrap())
    }

    #[tokio::test]
    async fn test_last_registration_wins() {
        let registry = HandlerRegistry::new();
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&first);
        assert!(
            registry
                .register(
                    "response.done",
                    handler_fn(move |_| {
                        let counter = Arc::clone(&counter);
                        async move {
                            counter.fetch_add(1, Ordering::SeqCst);
                        }
                    }),
                )
                .is_none()
        );
        let counter = Arc::clone(&second);
        assert!(
            registry
                .register(
                    "response.done",
                    handler_fn(move |_| {
                        let counter = Arc::clone(&counter);
                        async move {
                            counter.fetch_add(1, Ordering::SeqCst);
                        }
                    }),
                )
                .is_some()
        );

        let handler = registry.get("response.done").unwrap();
        handler(event(json!({"type": "response.done"}))).await;

        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 1);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_unregister() {
        let registry = HandlerRegistry::new();
        registry.register("error", handler_fn(|_| async {}));
        assert!(registry.contains("error"));
        assert!(registry.unregister("error").is_some());
        assert!(registry.is_empty());
        assert!(registry.get("error").is_none());
    }

    #[derive(Default)]
    struct Transcripts {
        finals: Mutex<Vec<(String, u32, String)>>,
        deltas: Mutex<Vec<String>>,
    }

    impl TranscriptionHandler for Transcripts {
        fn on_transcription(&self, item_id: &str, content_index: u32, transcript: &str) {
            self.finals
                .lock()
                .push((item_id.to_string(), content_index, transcript.to_string()));
        }

        fn on_transcription_delta(&self, _item_id: &str, _content_index: u32, delta: &str) {
            self.deltas.lock().push(delta.to_string());
        }
    }

    #[tokio::test]
    async fn test_transcription_handler() {
        let registry = HandlerRegistry::new();
        let sink = Arc::new(Transcripts::default());
        registry.register_transcription(sink.clone());

        let completed = registry.get(event_types::TRANSCRIPTION_COMPLETED).unwrap();
        completed(event(json!({
            "type": "conversation.item.input_audio_transcription.completed",
            "item_id": "item1",
            "content_index": 0,
            "transcript": "hello"
        })))
        .await;
        // Incomplete events are skipped
        completed(event(json!({
            "type": "conversation.item.input_audio_transcription.completed",
            "item_id": "item2"
        })))
        .await;

        let delta = registry.get(event_types::TRANSCRIPTION_DELTA).unwrap();
        delta(event(json!({
            "type": "conversation.item.input_audio_transcription.delta",
            "item_id": "item1",
            "content_index": 0,
            "delta": "hel"
        })))
        .await;

        assert_eq!(
            *sink.finals.lock(),
            vec![("item1".to_string(), 0, "hello".to_string())]
        );
        assert_eq!(*sink.deltas.lock(), vec!["hel".to_string()]);
    }

    #[derive(Default)]
    struct Chunks(Mutex<Vec<Bytes>>);

    impl AudioHandler for Chunks {
        fn on_audio(&self, _item_id: &str, _content_index: u32, audio: Bytes) {
            self.0.lock().push(audio);
        }
    }

    #[tokio::test]
    async fn test_audio_handler_decodes_base64() {
        let registry = HandlerRegistry::new();
        let sink = Arc::new(Chunks::default());
        registry.register_audio(sink.clone());

        let handler = registry.get(event_types::OUTPUT_AUDIO_DELTA).unwrap();
        handler(event(json!({
            "type": "response.output_audio.delta",
            "item_id": "item1",
            "content_index": 0,
            "delta": BASE64_STANDARD.encode([1u8, 2, 3, 4])
        })))
        .await;
        handler(event(json!({
            "type": "response.output_audio.delta",
            "delta": "%%%not base64%%%"
        })))
        .await;

        let chunks = sink.0.lock();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].as_ref(), &[1, 2, 3, 4]);
    }
}
