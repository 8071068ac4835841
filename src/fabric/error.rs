//! Errors raised by the messaging fabric.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FabricError {
    #[error("not connected to the fabric")]
    NotConnected,
    #[error("connection failed: {0}")]
    ConnectionFailed(String),
    #[error("timed out waiting for a response")]
    Timeout,
    #[error("request queue is closed")]
    QueueClosed,
    #[error("unknown service: {0}")]
    UnknownService(String),
    #[error("no pending request with id: {0}")]
    UnknownRequest(String),
    #[error("registration rejected: {0}")]
    Rejected(String),
}
