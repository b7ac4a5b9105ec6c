// SPDX-License-Identifier: MIT OR Apache-2.0
//! Transport error taxonomy.

use fg_error::{CatalogError, ErrorCode};

/// Errors produced by the WebSocket transport.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    /// A send was attempted while disconnected and buffering is disabled.
    #[error("not connected")]
    NotConnected,
    /// The socket or negotiation request failed.
    #[error("network error: {0}")]
    Network(String),
    /// A request or connection attempt exceeded its deadline.
    #[error("timed out")]
    Timeout,
    /// The server requires reauthentication before the request can retry.
    #[error("reauthentication required")]
    Reauthenticate,
    /// A frame violated the control/graph wire protocol.
    #[error("protocol error: {0}")]
    Protocol(String),
    /// The transport was shut down and will not reconnect.
    #[error("transport closed")]
    Closed,
}

impl From<TransportError> for CatalogError {
    fn from(err: TransportError) -> Self {
        let code = match &err {
            TransportError::NotConnected => ErrorCode::NotConnected,
            TransportError::Network(_) => ErrorCode::NetworkError,
            TransportError::Timeout => ErrorCode::Timeout,
            TransportError::Reauthenticate => ErrorCode::Reauthenticate,
            TransportError::Protocol(_) => ErrorCode::ProtocolError,
            TransportError::Closed => ErrorCode::Cancelled,
        };
        CatalogError::new(code, err)
    }
}
