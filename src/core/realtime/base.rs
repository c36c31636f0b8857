//! Base traits and types for realtime streaming clients.
//!
//! This module defines the provider-neutral pieces shared by every
//! realtime client: the error taxonomy, the connection lifecycle states,
//! the close notification and the abstract streaming contract.

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use thiserror::Error;

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur during realtime operations.
#[derive(Debug, Error)]
pub enum RealtimeError {
    /// Required configuration is missing or malformed
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// No usable bearer credential was supplied
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// An operation argument failed validation
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The handshake could not be completed
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// The handshake did not complete in time
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// Mid-session send or receive failure
    #[error("WebSocket error: {0}")]
    WebSocketError(String),

    /// Serialized event does not fit into a send buffer
    #[error("Event of {size} bytes exceeds buffer capacity of {capacity} bytes")]
    FrameTooLarge { size: usize, capacity: usize },

    /// Event could not be serialized or decoded
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Buffer pool is empty and the reject policy is active
    #[error("Buffer pool exhausted")]
    PoolExhausted,

    /// Error frame reported by the remote side
    #[error("Server error [{code}]: {message}")]
    ServerError { code: String, message: String },

    /// Operation requires an open connection
    #[error("Not connected")]
    NotConnected,

    /// `connect()` was called on a client that is connecting or connected
    #[error("Already connected")]
    AlreadyConnected,

    /// Client has already been closed
    #[error("Client is closed")]
    Closed,
}

/// Coarse classification of a [`RealtimeError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Configuration,
    Connection,
    Transport,
    Protocol,
    Server,
    State,
}

impl RealtimeError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidConfiguration(_)
            | Self::AuthenticationFailed(_)
            | Self::InvalidArgument(_) => ErrorKind::Configuration,
            Self::ConnectionFailed(_) | Self::Timeout(_) => ErrorKind::Connection,
            Self::WebSocketError(_) => ErrorKind::Transport,
            Self::FrameTooLarge { .. } | Self::SerializationError(_) | Self::PoolExhausted => {
                ErrorKind::Protocol
            }
            Self::ServerError { .. } => ErrorKind::Server,
            Self::NotConnected | Self::AlreadyConnected | Self::Closed => ErrorKind::State,
        }
    }
}

impl From<serde_json::Error> for RealtimeError {
    fn from(err: serde_json::Error) -> Self {
        Self::SerializationError(err.to_string())
    }
}

/// Result type for realtime operations.
pub type RealtimeResult<T> = Result<T, RealtimeError>;

// =============================================================================
// Connection State
// =============================================================================

/// Connection lifecycle. States only ever move forward in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
#[repr(u8)]
pub enum ConnectionState {
    /// No transport yet
    #[default]
    Disconnected = 0,
    /// Handshake in progress
    Connecting = 1,
    /// Transport established, frames may be sent
    Open = 2,
    /// Close frame being sent
    Closing = 3,
    /// Terminal
    Closed = 4,
}

impl ConnectionState {
    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Disconnected,
            1 => Self::Connecting,
            2 => Self::Open,
            3 => Self::Closing,
            _ => Self::Closed,
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "Disconnected"),
            ConnectionState::Connecting => write!(f, "Connecting"),
            ConnectionState::Open => write!(f, "Open"),
            ConnectionState::Closing => write!(f, "Closing"),
            ConnectionState::Closed => write!(f, "Closed"),
        }
    }
}

// =============================================================================
// Close Notification
// =============================================================================

/// Status code reported when the handshake never completed.
pub const CLOSE_CODE_CONNECT_FAILED: i32 = -1;
/// Normal closure.
pub const CLOSE_CODE_NORMAL: i32 = 1000;
/// Connection dropped without a close frame.
pub const CLOSE_CODE_ABNORMAL: i32 = 1006;

/// Why a connection ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloseEvent {
    /// WebSocket close code, or `-1` when the connection never opened
    pub code: i32,
    /// Human readable reason
    pub reason: String,
    /// Underlying failure, if any
    pub cause: Option<String>,
}

impl CloseEvent {
    pub fn new(code: i32, reason: impl Into<String>) -> Self {
        Self {
            code,
            reason: reason.into(),
            cause: None,
        }
    }

    pub fn with_cause(mut self, cause: impl fmt::Display) -> Self {
        self.cause = Some(cause.to_string());
        self
    }

    /// True when the connection ended because of an error.
    pub fn is_error(&self) -> bool {
        self.cause.is_some()
    }
}

/// Callback type for close notifications.
pub type CloseCallback =
    Arc<dyn Fn(CloseEvent) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

// =============================================================================
// Base Trait
// =============================================================================

/// Abstract streaming contract shared by live-session clients.
///
/// # Example
///
/// ```rust,ignore
/// use waav_realtime::core::realtime::{BaseRealtime, OpenAIRealtime, OpenAIRealtimeConfig};
///
/// #[tokio::main]
/// async fn main() {
///     let config = OpenAIRealtimeConfig::new("sk-...");
///     let realtime = OpenAIRealtime::new(config)?;
///     realtime.connect().await?;
///
///     realtime.send_audio(audio_bytes).await?;
///     realtime.close().await?;
/// }
/// ```
#[async_trait]
pub trait BaseRealtime: Send + Sync {
    /// Establish the transport and initialize the session.
    async fn connect(&self) -> RealtimeResult<()>;

    /// Close the connection. Only the first call has any effect.
    async fn close(&self) -> RealtimeResult<()>;

    /// Whether frames can currently be sent.
    fn is_ready(&self) -> bool;

    /// Current lifecycle state.
    fn connection_state(&self) -> ConnectionState;

    /// Stream a chunk of raw audio in the configured input format.
    async fn send_audio(&self, audio_data: Bytes) -> RealtimeResult<()>;

    /// Send a user text message.
    async fn send_text(&self, text: &str) -> RealtimeResult<()>;

    /// Static provider description.
    fn provider_info(&self) -> serde_json::Value;
}
