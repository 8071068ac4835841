//! Error taxonomy for the bridge.
//!
//! Startup failures (`Configuration`, discovery errors) abort `start()`.
//! Everything else is per-request and ends up as the text of an error reply.

use thiserror::Error;

use crate::fabric::FabricError;

pub type Result<T> = std::result::Result<T, BridgeError>;

#[derive(Debug, Error)]
pub enum BridgeError {
    /// Missing or invalid configuration. Fatal at startup.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Network or TLS failure while talking to a backend.
    #[error("transport error: {0}")]
    Transport(String),

    /// The backend answered with something that is not `Status:Body`.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The backend explicitly reported a command failure.
    #[error("Response failed with error code {code}. Message: {message}")]
    RemoteCommand { code: i64, message: String },

    /// The inbound payload is not a usable command request.
    #[error("invalid request: {0}")]
    RequestFormat(String),

    /// No backend is registered for the destination topic.
    #[error("unable to locate backend for topic: {0}")]
    InternalLookup(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("service is already running")]
    AlreadyRunning,

    #[error("fabric error: {0}")]
    Fabric(#[from] FabricError),
}

impl BridgeError {
    /// Error code carried on an error reply. Backend codes pass through,
    /// everything else uses 0.
    pub fn reply_code(&self) -> i64 {
        match self {
            BridgeError::RemoteCommand { code, .. } => *code,
            _ => 0,
        }
    }

    /// Attach the backend name to a startup failure so the log points at
    /// the misconfigured server.
    pub(crate) fn for_backend(self, name: &str) -> Self {
        match self {
            BridgeError::Configuration(msg) => {
                BridgeError::Configuration(format!("backend '{}': {}", name, msg))
            }
            BridgeError::Transport(msg) => {
                BridgeError::Transport(format!("backend '{}': {}", name, msg))
            }
            BridgeError::Protocol(msg) => {
                BridgeError::Protocol(format!("backend '{}': {}", name, msg))
            }
            BridgeError::RemoteCommand { code, message } => BridgeError::RemoteCommand {
                code,
                message: format!("backend '{}': {}", name, message),
            },
            other => other,
        }
    }
}

impl From<reqwest::Error> for BridgeError {
    fn from(err: reqwest::Error) -> Self {
        BridgeError::Transport(error_chain(&err))
    }
}

/// Render an error followed by each of its causes, `outer: inner: root`.
/// Causes whose text is already present are skipped.
fn error_chain(err: &dyn std::error::Error) -> String {
    let mut text = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        let message = cause.to_string();
        if !text.contains(&message) {
            text.push_str(": ");
            text.push_str(&message);
        }
        source = cause.source();
    }
    text
}

impl From<toml::de::Error> for BridgeError {
    fn from(err: toml::de::Error) -> Self {
        BridgeError::Configuration(err.to_string())
    }
}
