use std::sync::Arc;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::message::Message;

/// Lifecycle states a supervised backend moves through.
#[derive(Debug, Copy, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
pub enum BackendState {
    Starting,
    Running,
    Failed,
    Restarting,
    #[default]
    Stopped,
}

/// What log levels are supported?
/// Higher-value variants are more severe.
#[derive(Debug, Copy, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace = 0,
    Debug = 1,
    Info = 2,
    Warn = 3,
    Error = 4,
    Critical = 5,
}

/// Where backends hand the traffic they receive.
///
/// The router implements this; a backend gets an `Arc<dyn InboundSink>` when
/// it is started and calls `incoming` for every message it pulls off its
/// transport.
#[async_trait]
pub trait InboundSink: Send + Sync {
    async fn incoming(&self, msg: Message);
}

/// The one trait backend authors implement.
///
/// A backend bridges the router to a transport (a GSM modem, an HTTP
/// gateway, ...). The router never interprets transport specifics; it only
/// drives this lifecycle and hands over outgoing messages.
#[async_trait]
pub trait BackendPlugin: Send + Sync {
    /// The name of the backend. Used as the routing key for outgoing
    /// messages, so it should be unique across the router.
    fn name(&self) -> String;

    /// Run the backend's own event loop. Blocks for the backend's entire
    /// operational lifetime: returns `Ok(())` on graceful shutdown (after
    /// `stop` was requested) and `Err` on abnormal termination, in which
    /// case the supervisor restarts it. Messages received from the
    /// transport go into `sink`.
    async fn start(&self, sink: Arc<dyn InboundSink>) -> Result<(), BackendError>;

    /// Request that a blocking `start` call return. Called from a different
    /// task than the one running `start`, so implementations need interior
    /// signalling (a `Notify`, a channel, closing a socket, ...).
    async fn stop(&self);

    /// Push an outgoing message out over the transport.
    async fn send(&self, msg: Message) -> Result<(), BackendError>;
}

/// Errors a backend implementation can return.
#[derive(Error, Debug, Serialize, Deserialize, JsonSchema)]
pub enum BackendError {
    /// The underlying transport dropped or refused the connection.
    #[error("transport error: {0}")]
    Transport(String),

    /// Something went wrong encoding or decoding backend data.
    #[error("codec error: {0}")]
    Codec(String),

    /// The backend is not in a state where this operation is valid.
    #[error("invalid state for this operation")]
    InvalidState,

    /// A timeout occurred.
    #[error("operation timed out after {0} ms")]
    Timeout(u64),

    /// The backend returned an unspecified failure.
    #[error("backend error: {0}")]
    Other(String),
}

impl From<serde_json::Error> for BackendError {
    fn from(err: serde_json::Error) -> BackendError {
        BackendError::Codec(err.to_string())
    }
}

impl From<anyhow::Error> for BackendError {
    fn from(err: anyhow::Error) -> BackendError {
        BackendError::Other(err.to_string())
    }
}

impl From<std::io::Error> for BackendError {
    fn from(err: std::io::Error) -> BackendError {
        BackendError::Transport(err.to_string())
    }
}
