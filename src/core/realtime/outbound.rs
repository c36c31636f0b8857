//! Ordered outbound transmission.
//!
//! Events are appended to a FIFO queue. The first enqueue that finds the
//! pipeline idle flips the `sending` flag and spawns the drain loop; every
//! other enqueue just appends. The drain loop sends one frame at a time and
//! only pops the next event once the previous send has completed, which
//! gives total ordering with exactly one frame in flight.
//!
//! Each send serializes into a buffer borrowed from the [`BufferPool`]. A
//! payload larger than the buffer is dropped on its own; the queue keeps
//! moving.

use parking_lot::Mutex;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, error, trace, warn};

use super::base::{RealtimeError, RealtimeResult};
use super::buffer_pool::{BufferPool, BufferPoolStats};
use super::connection::{ConnectionStatus, FrameSink};

/// An event that can travel through the outbound pipeline.
pub trait OutboundFrame: Serialize + Send + Sync + 'static {
    /// Wire discriminant, used for logging.
    fn discriminant(&self) -> &str;

    /// Unique id attached to the frame.
    fn correlation_id(&self) -> &str;
}

pub struct OutboundPipeline<E: OutboundFrame> {
    queue: Mutex<VecDeque<E>>,
    sending: AtomicBool,
    sink: tokio::sync::Mutex<Option<Box<dyn FrameSink>>>,
    pool: BufferPool,
    status: Arc<ConnectionStatus>,
    sent: AtomicU64,
    dropped: AtomicU64,
}

impl<E: OutboundFrame> OutboundPipeline<E> {
    pub fn new(pool: BufferPool, status: Arc<ConnectionStatus>) -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            sending: AtomicBool::new(false),
            sink: tokio::sync::Mutex::new(None),
            pool,
            status,
            sent: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    /// Install the write half of a freshly opened transport.
    pub async fn attach(&self, sink: Box<dyn FrameSink>) {
        *self.sink.lock().await = Some(sink);
    }

    /// Append `event` and make sure a drain loop is running.
    pub fn enqueue(self: &Arc<Self>, event: E) {
        trace!(
            "Queueing {} ({})",
            event.discriminant(),
            event.correlation_id()
        );
        self.queue.lock().push_back(event);
        self.schedule_drain();
    }

    /// Number of events waiting to be sent.
    pub fn pending(&self) -> usize {
        self.queue.lock().len()
    }

    pub fn sent_count(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }

    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn pool_stats(&self) -> BufferPoolStats {
        self.pool.stats()
    }

    /// Drop every queued event. Returns how many were discarded.
    pub fn discard_pending(&self) -> usize {
        let mut queue = self.queue.lock();
        let count = queue.len();
        queue.clear();
        if count > 0 {
            self.dropped.fetch_add(count as u64, Ordering::Relaxed);
        }
        count
    }

    /// Detach the transport and send a close frame on it.
    ///
    /// Waits for an in-flight send to finish first, bounded by `timeout`.
    pub async fn close_transport(
        &self,
        code: u16,
        reason: &str,
        timeout: Duration,
    ) -> RealtimeResult<()> {
        let close = async {
            let sink = self.sink.lock().await.take();
            match sink {
                Some(mut sink) => sink.close(code, reason).await,
                None => Err(RealtimeError::NotConnected),
            }
        };
        tokio::time::timeout(timeout, close)
            .await
            .map_err(|_| RealtimeError::Timeout("sending close frame".to_string()))?
    }

    /// Release idle pooled buffers.
    pub fn release_buffers(&self) {
        self.pool.clear();
    }

    fn schedule_drain(self: &Arc<Self>) {
        if self
            .sending
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            let this = Arc::clone(self);
            tokio::spawn(async move { this.drain().await });
        }
    }

    async fn drain(self: Arc<Self>) {
        loop {
            let next = self.queue.lock().pop_front();
            match next {
                Some(event) => self.transmit(event).await,
                None => {
                    self.sending.store(false, Ordering::Release);
                    // An enqueue may have landed between the pop and the store.
                    if self.queue.lock().is_empty() {
                        return;
                    }
                    if self
                        .sending
                        .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                        .is_err()
                    {
                        return;
                    }
                }
            }
        }
    }

    async fn transmit(&self, event: E) {
        let kind = event.discriminant();
        let id = event.correlation_id();

        if !self.status.is_open() {
            error!(
                "Cannot send {} ({}): connection is {}",
                kind,
                id,
                self.status.state()
            );
            self.dropped.fetch_add(1, Ordering::Relaxed);
            return;
        }

        let mut buffer = match self.pool.acquire() {
            Ok(buffer) => buffer,
            Err(e) => {
                warn!("Dropping {} ({}): {}", kind, id, e);
                self.dropped.fetch_add(1, Ordering::Relaxed);
                return;
            }
        };

        if let Err(e) = serde_json::to_writer(&mut *buffer, &event) {
            error!("Failed to serialize {} ({}): {}", kind, id, e);
            self.dropped.fetch_add(1, Ordering::Relaxed);
            return;
        }

        if buffer.len() > buffer.limit() {
            let err = RealtimeError::FrameTooLarge {
                size: buffer.len(),
                capacity: buffer.limit(),
            };
            warn!("Dropping {} ({}): {}", kind, id, err);
            self.dropped.fetch_add(1, Ordering::Relaxed);
            return;
        }

        let frame = match std::str::from_utf8(&buffer) {
            Ok(frame) => frame,
            Err(e) => {
                error!("Serialized {} is not valid UTF-8: {}", kind, e);
                self.dropped.fetch_add(1, Ordering::Relaxed);
                return;
            }
        };

        let result = {
            let mut sink = self.sink.lock().await;
            match sink.as_mut() {
                Some(sink) => sink.send_text(frame).await,
                None => Err(RealtimeError::NotConnected),
            }
        };

        match result {
            Ok(()) => {
                self.sent.fetch_add(1, Ordering::Relaxed);
                debug!("Sent {} ({}, {} bytes)", kind, id, frame.len());
            }
            Err(e) => {
                error!("Failed to send {} ({}): {}", kind, id, e);
                self.dropped.fetch_add(1, Ordering::Relaxed);
                if matches!(e, RealtimeError::WebSocketError(_)) && !self.status.close_requested()
                {
                    self.status.fail(e).await;
                }
            }
        }
    }
}
