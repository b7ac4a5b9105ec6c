// SPDX-License-Identifier: MIT OR Apache-2.0
//! Plain-data transport configuration, constructed programmatically by the
//! embedding application — the transport itself parses nothing from argv
//! or the environment.

use std::time::Duration;

use serde::{Deserialize, Serialize};

fn duration_secs(secs: u64) -> Duration {
    Duration::from_secs(secs)
}

/// Tunables for connection establishment, heartbeat, reconnection, and the
/// bounded send queue. `Default` matches the numeric defaults called out
/// for the transport; fields without a spec-mandated number carry a
/// documented, embedder-overridable default instead.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Timeout for establishing the socket (negotiation + WS handshake).
    #[serde(with = "duration_secs_serde")]
    pub connect_timeout: Duration,
    /// Time to wait for a clean close acknowledgment before forcing the
    /// socket shut on a graceful shutdown.
    #[serde(with = "duration_secs_serde")]
    pub graceful_close_timeout: Duration,
    /// Default HTTP request timeout for negotiation and any non-streaming
    /// HTTP calls the transport makes on its own behalf.
    #[serde(with = "duration_secs_serde")]
    pub http_request_timeout: Duration,
    /// Interval between heartbeat pings, or `None` to disable heartbeats.
    /// Not mandated by the protocol; disabled by default since a server
    /// that never speaks first should not be assumed.
    pub heartbeat_interval: Option<Duration>,
    /// Maximum number of reconnect attempts over the transport's lifetime;
    /// `0` means unlimited. The counter does not reset on a successful
    /// reconnect — it bounds total attempts, not attempts-per-outage.
    pub max_reconnect_attempts: u32,
    /// If `true` (stateful mode), messages already enqueued survive a
    /// reconnect; if `false` (stateless mode), the send queue is cleared
    /// when a disconnect is observed, alongside other in-memory protocol
    /// state.
    pub stateful_reconnect: bool,
    /// If `false`, `send` while disconnected fails immediately with
    /// [`crate::error::TransportError::NotConnected`] instead of
    /// enqueueing.
    pub buffering_enabled: bool,
    /// Maximum number of messages the send queue holds before evicting the
    /// lowest-priority, oldest entry to make room.
    pub queue_capacity: usize,
    /// Number of delivery attempts before a queued message is dropped.
    pub message_max_retries: u32,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout: duration_secs(10),
            graceful_close_timeout: duration_secs(5),
            http_request_timeout: duration_secs(30),
            heartbeat_interval: None,
            max_reconnect_attempts: 0,
            stateful_reconnect: true,
            buffering_enabled: true,
            queue_capacity: 1024,
            message_max_retries: 5,
        }
    }
}

pub(crate) mod duration_secs_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(deserializer)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_matches_the_documented_numbers() {
        let config = TransportConfig::default();
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
        assert_eq!(config.graceful_close_timeout, Duration::from_secs(5));
        assert_eq!(config.http_request_timeout, Duration::from_secs(30));
        assert_eq!(config.max_reconnect_attempts, 0);
        assert!(config.stateful_reconnect);
        assert!(config.buffering_enabled);
    }

    #[test]
    fn round_trips_through_json() {
        let config = TransportConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let back: TransportConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.connect_timeout, config.connect_timeout);
    }
}
