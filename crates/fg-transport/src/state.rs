// SPDX-License-Identifier: MIT OR Apache-2.0
//! The transport's connection state machine.

use crate::error::TransportError;

/// `Disconnected → Connecting → Connected → (Disconnecting → Disconnected
/// | ↺ Reconnecting → Connecting) → Closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No socket, not attempting to connect.
    Disconnected,
    /// Negotiation and/or the WS handshake is in flight.
    Connecting,
    /// The socket is open and the router is live.
    Connected,
    /// A graceful shutdown was requested; waiting for the close handshake.
    Disconnecting,
    /// The socket dropped unexpectedly; waiting to retry.
    Reconnecting,
    /// Terminal. `stop()` was called; the transport will not reconnect.
    Closed,
}

/// Emitted on every state transition.
#[derive(Debug, Clone)]
pub struct StateChange {
    /// The state before this transition.
    pub previous: ConnectionState,
    /// The state after this transition.
    pub current: ConnectionState,
    /// The error that triggered the transition, if any.
    pub error: Option<TransportError>,
}

impl ConnectionState {
    /// Whether a message can be sent straight to the socket right now.
    #[must_use]
    pub fn is_connected(self) -> bool {
        matches!(self, Self::Connected)
    }

    /// Whether the transport has permanently stopped.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Closed)
    }
}
