//! Connection lifecycle and WebSocket transport.
//!
//! [`ConnectionStatus`] is the shared, lock-free view of where a connection
//! is in its lifecycle. It also owns the close callback so that the reader,
//! the outbound pipeline and `close()` can all report the end of the
//! connection while the callback still fires only once.
//!
//! The transport is split in two halves after the handshake: the write half
//! is wrapped in a [`FrameSink`] owned by the outbound pipeline, the read
//! half is consumed by [`spawn_reader`].

use async_trait::async_trait;
use futures::FutureExt;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use http::header::{AUTHORIZATION, HeaderName, HeaderValue};
use parking_lot::RwLock;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::base::{
    CLOSE_CODE_ABNORMAL, CloseCallback, CloseEvent, ConnectionState, RealtimeError,
    RealtimeResult,
};

/// Default bound on connecting: handshake plus session initialization.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// WebSocket stream type used by realtime clients.
pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

// =============================================================================
// Connection Status
// =============================================================================

#[derive(Default)]
pub struct ConnectionStatus {
    state: AtomicU8,
    close_requested: AtomicBool,
    close_notified: AtomicBool,
    close_callback: RwLock<Option<CloseCallback>>,
}

impl ConnectionStatus {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::Acquire))
    }

    #[inline]
    pub fn is_open(&self) -> bool {
        self.state() == ConnectionState::Open
    }

    /// Move to `next` if it lies ahead of the current state.
    ///
    /// Returns `false` when the transition would go backwards or stay put.
    pub fn advance(&self, next: ConnectionState) -> bool {
        let target = next as u8;
        self.state
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                (target > current).then_some(target)
            })
            .is_ok()
    }

    /// Claim the teardown path. Only the first caller gets `true`.
    pub fn request_close(&self) -> bool {
        !self.close_requested.swap(true, Ordering::AcqRel)
    }

    /// Whether `close()` has been called.
    pub fn close_requested(&self) -> bool {
        self.close_requested.load(Ordering::Acquire)
    }

    pub fn set_close_callback(&self, callback: CloseCallback) {
        *self.close_callback.write() = Some(callback);
    }

    /// Deliver `event` to the close callback, at most once per connection.
    pub async fn notify_close(&self, event: CloseEvent) {
        if self.close_notified.swap(true, Ordering::AcqRel) {
            debug!("Close already reported, ignoring: {:?}", event);
            return;
        }
        let callback = self.close_callback.read().clone();
        let Some(callback) = callback else {
            return;
        };
        let run = AssertUnwindSafe(async move { callback(event).await });
        if run.catch_unwind().await.is_err() {
            error!("Close callback panicked");
        }
    }

    /// Mark the connection dead after a send or receive failure.
    pub async fn fail(&self, cause: impl std::fmt::Display) {
        let cause = cause.to_string();
        if self.advance(ConnectionState::Closed) {
            error!("Connection lost: {}", cause);
        }
        self.notify_close(CloseEvent::new(CLOSE_CODE_ABNORMAL, "Connection lost").with_cause(cause))
            .await;
    }
}

// =============================================================================
// Frame Sink
// =============================================================================

/// Write half of a realtime transport.
#[async_trait]
pub trait FrameSink: Send {
    /// Send one text frame.
    async fn send_text(&mut self, frame: &str) -> RealtimeResult<()>;

    /// Send a close frame.
    async fn close(&mut self, code: u16, reason: &str) -> RealtimeResult<()>;
}

#[async_trait]
impl FrameSink for SplitSink<WsStream, Message> {
    async fn send_text(&mut self, frame: &str) -> RealtimeResult<()> {
        self.send(Message::Text(frame.into()))
            .await
            .map_err(|e| RealtimeError::WebSocketError(e.to_string()))
    }

    async fn close(&mut self, code: u16, reason: &str) -> RealtimeResult<()> {
        let frame = CloseFrame {
            code: CloseCode::from(code),
            reason: reason.into(),
        };
        self.send(Message::Close(Some(frame)))
            .await
            .map_err(|e| RealtimeError::WebSocketError(e.to_string()))
    }
}

// =============================================================================
// Handshake
// =============================================================================

/// Open a WebSocket to `url`, authenticating with a bearer key.
///
/// Not bounded in time; callers wrap it together with whatever else must
/// finish before the connection counts as established.
pub async fn open_websocket(
    url: &str,
    api_key: &str,
    extra_headers: &[(&'static str, &str)],
) -> RealtimeResult<WsStream> {
    if url.starts_with("wss://") {
        // Already installed is fine.
        let _ = rustls::crypto::ring::default_provider().install_default();
    }

    let mut request = url
        .into_client_request()
        .map_err(|e| RealtimeError::InvalidConfiguration(format!("Invalid URL {url}: {e}")))?;

    let headers = request.headers_mut();
    let bearer = HeaderValue::from_str(&format!("Bearer {api_key}"))
        .map_err(|e| RealtimeError::AuthenticationFailed(e.to_string()))?;
    headers.insert(AUTHORIZATION, bearer);
    for (name, value) in extra_headers {
        let header = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| RealtimeError::InvalidConfiguration(format!("Header {name}: {e}")))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| RealtimeError::InvalidConfiguration(format!("Header {name}: {e}")))?;
        headers.insert(header, value);
    }

    debug!("Opening WebSocket to {}", url);

    let (ws_stream, response) = match tokio_tungstenite::connect_async(request).await {
        Err(tungstenite::Error::Http(response))
            if response.status() == http::StatusCode::UNAUTHORIZED =>
        {
            return Err(RealtimeError::AuthenticationFailed(
                "server rejected the API key".to_string(),
            ));
        }
        Err(e) => return Err(RealtimeError::ConnectionFailed(e.to_string())),
        Ok(pair) => pair,
    };

    info!("WebSocket connected (status {})", response.status());
    Ok(ws_stream)
}

// =============================================================================
// Reader
// =============================================================================

/// Drive the read half until the connection ends or `cancel` fires.
///
/// Every text frame is passed to `on_text` in arrival order on the reader
/// task itself, so `on_text` must not block.
pub fn spawn_reader<F>(
    mut stream: SplitStream<WsStream>,
    status: Arc<ConnectionStatus>,
    cancel: CancellationToken,
    on_text: F,
) -> JoinHandle<()>
where
    F: Fn(&str) + Send + 'static,
{
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("Reader cancelled");
                    break;
                }
                message = stream.next() => match message {
                    Some(Ok(Message::Text(text))) => on_text(text.as_str()),
                    Some(Ok(Message::Binary(data))) => {
                        warn!("Ignoring unexpected binary frame of {} bytes", data.len());
                    }
                    Some(Ok(Message::Close(frame))) => {
                        let (code, reason) = frame
                            .map(|f| (i32::from(u16::from(f.code)), f.reason.to_string()))
                            .unwrap_or((i32::from(u16::from(CloseCode::Status)), String::new()));
                        if status.close_requested() {
                            debug!("Close handshake completed ({})", code);
                        } else {
                            info!("Server closed connection: {} {}", code, reason);
                            status.advance(ConnectionState::Closed);
                            status.notify_close(CloseEvent::new(code, reason)).await;
                        }
                        break;
                    }
                    // Ping/pong replies are handled by tungstenite
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        if !status.close_requested() {
                            status.fail(e).await;
                        }
                        break;
                    }
                    None => {
                        if !status.close_requested() {
                            status.fail("stream ended without close frame").await;
                        }
                        break;
                    }
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_state_only_moves_forward() {
        let status = ConnectionStatus::new();
        assert_eq!(status.state(), ConnectionState::Disconnected);

        assert!(status.advance(ConnectionState::Connecting));
        assert!(status.advance(ConnectionState::Open));
        assert!(status.is_open());

        assert!(!status.advance(ConnectionState::Connecting));
        assert!(!status.advance(ConnectionState::Open));
        assert_eq!(status.state(), ConnectionState::Open);

        assert!(status.advance(ConnectionState::Closed));
        assert!(!status.advance(ConnectionState::Closing));
        assert!(!status.is_open());
    }

    #[test]
    fn test_request_close_once() {
        let status = ConnectionStatus::new();
        assert!(!status.close_requested());
        assert!(status.request_close());
        assert!(!status.request_close());
        assert!(status.close_requested());
    }

    #[tokio::test]
    async fn test_close_notified_once() {
        let status = ConnectionStatus::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        status.set_close_callback(Arc::new(move |_event| {
            let counter = counter.clone();
            Box::pin(async move {
                counter.fetch_add(1, Ordering::SeqCst);
            })
        }));

        status.notify_close(CloseEvent::new(1000, "bye")).await;
        status.fail("broken pipe").await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(status.state(), ConnectionState::Closed);
    }

    #[tokio::test]
    async fn test_panicking_close_callback_is_contained() {
        let status = ConnectionStatus::new();
        status.set_close_callback(Arc::new(|_event| Box::pin(async { panic!("boom") })));
        status.notify_close(CloseEvent::new(1000, "bye")).await;
    }

    #[tokio::test]
    async fn test_open_websocket_invalid_url() {
        let result = open_websocket("not a url", "key", &[]).await;
        assert!(matches!(result, Err(RealtimeError::InvalidConfiguration(_))));
    }
}
