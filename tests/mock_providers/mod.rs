//! Mock Realtime Servers
//!
//! Local stand-ins for the OpenAI Realtime endpoint:
//! - A WebSocket server that records client frames and answers like the API
//! - A listener that accepts TCP but never completes the handshake
//! - An address nothing listens on

// Allow dead code in test infrastructure - not every test binary uses every helper
#![allow(dead_code)]

pub mod websocket_mock;

pub use websocket_mock::{MockBehavior, RealtimeMockServer};

use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// A `ws://` URL whose port was just released, so connecting is refused.
pub async fn refused_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    format!("ws://127.0.0.1:{}/v1/realtime", port)
}

/// Accept TCP connections and hold them open without ever answering the
/// upgrade request.
pub async fn spawn_stalled_listener() -> (String, JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let handle = tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((stream, _)) = listener.accept().await {
            held.push(stream);
        }
    });
    (format!("ws://127.0.0.1:{}/v1/realtime", port), handle)
}
