use std::io;

use thiserror::Error;

use crate::operation::Operation;

pub type Result<T, E = ClientError> = std::result::Result<T, E>;

/// Failures surfaced synchronously to callers of the client API.
///
/// Timeouts, socket failures and server-side errors arrive on the event
/// stream instead; see [`crate::event::FailureReason`].
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("malformed message {frame:?}: {reason}")]
    MalformedMessage { frame: String, reason: &'static str },

    #[error("not connected to server")]
    NotConnected,

    #[error("a {pending} operation is already in progress")]
    OperationInProgress { pending: Operation },

    #[error("transport error: {0}")]
    Transport(#[from] io::Error),

    #[error("local store error: {0}")]
    Store(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("client runtime has shut down")]
    Shutdown,
}

impl From<anyhow::Error> for ClientError {
    fn from(error: anyhow::Error) -> Self {
        ClientError::Store(error.into())
    }
}
