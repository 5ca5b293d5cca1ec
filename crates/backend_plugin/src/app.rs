use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::message::Message;

/// The named pipeline stages, in the order the router runs them.
///
/// Every incoming message goes through `Parse`, `Handle` and `Cleanup`
/// across all registered apps; every outgoing message goes through
/// `Outgoing` before it is handed to its backend.
#[derive(Debug, Copy, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Parse,
    Handle,
    Cleanup,
    Outgoing,
}

impl Phase {
    /// Phase order for `incoming` dispatch.
    pub const INCOMING: [Phase; 3] = [Phase::Parse, Phase::Handle, Phase::Cleanup];
    /// Phase order for `outgoing` dispatch.
    pub const OUTGOING: [Phase; 1] = [Phase::Outgoing];
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Phase::Parse => write!(f, "parse"),
            Phase::Handle => write!(f, "handle"),
            Phase::Cleanup => write!(f, "cleanup"),
            Phase::Outgoing => write!(f, "outgoing"),
        }
    }
}

/// The one trait application authors implement.
///
/// Every phase callback has a no-op default, so an app only overrides the
/// phases it cares about. Callbacks take the message by `&mut`: later
/// phases and later apps observe whatever earlier ones changed.
#[async_trait]
pub trait AppPlugin: Send + Sync {
    /// The name of the app, used in logs when a phase callback fails.
    fn name(&self) -> String;

    /// First incoming phase. Decode or annotate the raw message.
    async fn parse(&self, _msg: &mut Message) -> Result<(), AppError> {
        Ok(())
    }

    /// Second incoming phase. Act on the message.
    async fn handle(&self, _msg: &mut Message) -> Result<(), AppError> {
        Ok(())
    }

    /// Final incoming phase. Tear down whatever `parse`/`handle` left
    /// behind in the message metadata.
    async fn cleanup(&self, _msg: &mut Message) -> Result<(), AppError> {
        Ok(())
    }

    /// Outgoing phase, run before the message is handed to its backend.
    async fn outgoing(&self, _msg: &mut Message) -> Result<(), AppError> {
        Ok(())
    }
}

/// Errors an application phase callback can return.
///
/// The router logs these and carries on with the next app; a failing app
/// never blocks the pipeline for the others.
#[derive(Error, Debug, Serialize, Deserialize, JsonSchema)]
pub enum AppError {
    /// The message could not be understood by this app.
    #[error("invalid message: {0}")]
    InvalidMessage(String),

    /// Something went wrong encoding or decoding app state.
    #[error("json error: {0}")]
    Json(String),

    /// The app returned an unspecified failure.
    #[error("app error: {0}")]
    Other(String),
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> AppError {
        AppError::Json(err.to_string())
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> AppError {
        AppError::Other(err.to_string())
    }
}
