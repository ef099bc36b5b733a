use std::{io, time::Duration};

use serde_json::Value;
use thiserror::Error;

/// Everything that can go wrong between issuing a call and holding a typed
/// result.
#[derive(Debug, Error)]
pub enum RpcError {
    /// The editor socket could not be opened.
    #[error("failed to connect to the editor: {0}")]
    ConnectFailed(#[source] io::Error),

    #[error("failed to send request: {0}")]
    WriteFailed(#[source] io::Error),

    /// No reply arrived before the read deadline.
    #[error("no reply from the editor within {}s", .0.as_secs())]
    ReadTimeout(Duration),

    #[error("failed to read reply: {0}")]
    ReadFailed(#[source] io::Error),

    #[error("malformed reply: {0}")]
    MalformedReply(String),

    /// The editor answered with a non-null error element.
    #[error("RPC error: {}", remote_message(.0))]
    RemoteError(Value),

    #[error("invalid buffer id: {0}")]
    InvalidBufferId(Value),

    #[error("invalid content format: expected a list of lines, got {0}")]
    InvalidContentFormat(Value),

    #[error("invalid filetype: {0}")]
    InvalidFiletype(Value),

    #[error("connection to the editor is closed")]
    Closed,
}

impl RpcError {
    /// Whether the connection's framing can no longer be trusted after this
    /// error. A late or half-parsed reply may still be sitting on the wire.
    pub fn desynchronizes(&self) -> bool {
        matches!(self, RpcError::ReadTimeout(_) | RpcError::MalformedReply(_))
    }
}

/// Neovim reports errors as `[code, message]`, other peers as a bare string.
fn remote_message(detail: &Value) -> String {
    match detail {
        Value::String(message) => message.clone(),
        Value::Array(parts) => match parts.as_slice() {
            [_, Value::String(message)] => message.clone(),
            _ => detail.to_string(),
        },
        other => other.to_string(),
    }
}
