//! WebSocket Mock Server for the Realtime API
//!
//! Records every client event and answers the way the hosted service does
//! for the handful of events the tests exercise.

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::{Value, json};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{Request, Response};
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;

pub const MOCK_SESSION_ID: &str = "sess_mock";
pub const MOCK_ITEM_ID: &str = "item1";
pub const MOCK_TRANSCRIPT: &str = "hello";

/// How the server reacts to client events
#[derive(Debug, Clone)]
pub enum MockBehavior {
    /// `session.created` after `session.update`; `committed` plus a completed
    /// transcription after `input_audio_buffer.commit`
    Responsive,
    /// Record frames, never answer
    Silent,
    /// Send a close frame right after `session.update`
    CloseAfterSessionUpdate { code: u16, reason: String },
}

/// State shared between the test and the connection task
#[derive(Default)]
struct MockState {
    frames: Mutex<Vec<Value>>,
    authorization: Mutex<Option<String>>,
    beta_header: Mutex<Option<String>>,
    push_tx: Mutex<Option<mpsc::UnboundedSender<Message>>>,
    close_frames: AtomicU64,
    last_close_code: Mutex<Option<u16>>,
    connection_count: AtomicU64,
}

pub struct RealtimeMockServer {
    pub url: String,
    state: Arc<MockState>,
    handle: JoinHandle<()>,
}

impl RealtimeMockServer {
    /// Bind an ephemeral port and start accepting connections.
    pub async fn start(behavior: MockBehavior) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let state = Arc::new(MockState::default());

        let accept_state = Arc::clone(&state);
        let handle = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let state = Arc::clone(&accept_state);
                let behavior = behavior.clone();
                tokio::spawn(async move {
                    if let Err(e) = handle_connection(stream, state, behavior).await {
                        eprintln!("Mock realtime connection error: {}", e);
                    }
                });
            }
        });

        Self {
            url: format!("ws://127.0.0.1:{}/v1/realtime", port),
            state,
            handle,
        }
    }

    /// Every text frame received so far, parsed.
    pub fn frames(&self) -> Vec<Value> {
        self.state.frames.lock().clone()
    }

    /// `type` of every frame received so far.
    pub fn frame_types(&self) -> Vec<String> {
        self.frames()
            .iter()
            .map(|f| f["type"].as_str().unwrap_or_default().to_string())
            .collect()
    }

    /// Poll until at least `count` frames arrived or `timeout` passes.
    pub async fn wait_for_frames(&self, count: usize, timeout: Duration) -> Vec<Value> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let frames = self.frames();
            if frames.len() >= count || tokio::time::Instant::now() >= deadline {
                return frames;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    /// Poll until the client's close frame arrived or `timeout` passes.
    pub async fn wait_for_close(&self, timeout: Duration) -> u64 {
        self.wait_for_closes(1, timeout).await
    }

    /// Poll until `count` close frames arrived across all connections.
    pub async fn wait_for_closes(&self, count: u64, timeout: Duration) -> u64 {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let closes = self.close_frames();
            if closes >= count || tokio::time::Instant::now() >= deadline {
                return closes;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    /// Send a server event on the current connection.
    pub fn push(&self, event: Value) {
        let tx = self.state.push_tx.lock().clone();
        match tx {
            Some(tx) => {
                let _ = tx.send(Message::Text(event.to_string().into()));
            }
            None => panic!("no client connected"),
        }
    }

    /// Close the current connection from the server side.
    pub fn close_connection(&self, code: u16, reason: &str) {
        let tx = self.state.push_tx.lock().clone();
        if let Some(tx) = tx {
            let _ = tx.send(close_message(code, reason));
        }
    }

    pub fn authorization(&self) -> Option<String> {
        self.state.authorization.lock().clone()
    }

    pub fn beta_header(&self) -> Option<String> {
        self.state.beta_header.lock().clone()
    }

    pub fn close_frames(&self) -> u64 {
        self.state.close_frames.load(Ordering::Relaxed)
    }

    pub fn last_close_code(&self) -> Option<u16> {
        *self.state.last_close_code.lock()
    }

    pub fn connection_count(&self) -> u64 {
        self.state.connection_count.load(Ordering::Relaxed)
    }
}

impl Drop for RealtimeMockServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn close_message(code: u16, reason: &str) -> Message {
    Message::Close(Some(CloseFrame {
        code: CloseCode::from(code),
        reason: reason.to_string().into(),
    }))
}

/// Server events answering one client event
fn respond(event: &Value, behavior: &MockBehavior) -> Vec<Message> {
    let event_type = event["type"].as_str().unwrap_or_default();
    match (behavior, event_type) {
        (MockBehavior::Responsive, "session.update") => vec![Message::Text(
            json!({
                "type": "session.created",
                "event_id": "event_srv_1",
                "session": {
                    "id": MOCK_SESSION_ID,
                    "model": "gpt-realtime",
                    "expires_at": 1_700_000_000,
                }
            })
            .to_string()
            .into(),
        )],
        (MockBehavior::Responsive, "input_audio_buffer.commit") => vec![
            Message::Text(
                json!({
                    "type": "input_audio_buffer.committed",
                    "event_id": "event_srv_2",
                    "item_id": MOCK_ITEM_ID,
                    "previous_item_id": null,
                })
                .to_string()
                .into(),
            ),
            Message::Text(
                json!({
                    "type": "conversation.item.input_audio_transcription.completed",
                    "event_id": "event_srv_3",
                    "item_id": MOCK_ITEM_ID,
                    "content_index": 0,
                    "transcript": MOCK_TRANSCRIPT,
                })
                .to_string()
                .into(),
            ),
        ],
        (MockBehavior::CloseAfterSessionUpdate { code, reason }, "session.update") => {
            vec![close_message(*code, reason)]
        }
        _ => Vec::new(),
    }
}

/// Handle a single client connection
async fn handle_connection(
    stream: TcpStream,
    state: Arc<MockState>,
    behavior: MockBehavior,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let header_state = Arc::clone(&state);
    let ws_stream = accept_hdr_async(stream, move |request: &Request, response: Response| {
        let header = |name: &str| {
            request
                .headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };
        *header_state.authorization.lock() = header("authorization");
        *header_state.beta_header.lock() = header("openai-beta");
        Ok(response)
    })
    .await?;
    let (mut write, mut read) = ws_stream.split();

    state.connection_count.fetch_add(1, Ordering::Relaxed);
    let (tx, mut rx) = mpsc::unbounded_channel();
    *state.push_tx.lock() = Some(tx);

    loop {
        tokio::select! {
            Some(message) = rx.recv() => {
                let closing = matches!(message, Message::Close(_));
                write.send(message).await?;
                if closing {
                    break;
                }
            }
            message = read.next() => match message {
                Some(Ok(Message::Text(text))) => {
                    let event: Value = serde_json::from_str(text.as_str())?;
                    let replies = respond(&event, &behavior);
                    state.frames.lock().push(event);
                    for reply in replies {
                        let closing = matches!(reply, Message::Close(_));
                        write.send(reply).await?;
                        if closing {
                            return Ok(());
                        }
                    }
                }
                Some(Ok(Message::Close(frame))) => {
                    state.close_frames.fetch_add(1, Ordering::Relaxed);
                    *state.last_close_code.lock() = frame.map(|f| u16::from(f.code));
                    // tungstenite queued the close reply; flush it
                    let _ = write.close().await;
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(_)) | None => break,
            }
        }
    }

    Ok(())
}
