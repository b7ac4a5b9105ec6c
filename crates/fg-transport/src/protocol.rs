// SPDX-License-Identifier: MIT OR Apache-2.0
//! The line-framed control/graph protocol layered over the raw socket.
//!
//! Every frame — control or graph — ends with a blank line, so the
//! leftmost `"\n\n"` in the buffered text always marks the end of the
//! earliest complete frame: nothing in the grammar below ever embeds a
//! blank line inside a frame's own content.

use serde::{Deserialize, Serialize};

use crate::error::TransportError;

/// One parsed control frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlFrame {
    /// Subscribe to `feed`, resuming from `bookmark` (empty for "from the
    /// start").
    Sub {
        /// The feed string being subscribed to.
        feed: String,
        /// The bookmark to resume from.
        bookmark: String,
    },
    /// Stop streaming `feed`.
    Unsub {
        /// The feed string being unsubscribed from.
        feed: String,
    },
    /// Advance the persisted bookmark for `feed`.
    Book {
        /// The feed string whose bookmark advances.
        feed: String,
        /// The new bookmark value.
        bookmark: String,
    },
    /// The server reports an error scoped to `feed`.
    Err {
        /// The feed string the error concerns.
        feed: String,
        /// A human-readable error message.
        message: String,
    },
}

impl ControlFrame {
    /// Render as the wire form: keyword line, one JSON-string payload line
    /// per field, blank terminator.
    #[must_use]
    pub fn encode(&self) -> String {
        match self {
            Self::Sub { feed, bookmark } => encode_lines("SUB", &[feed, bookmark]),
            Self::Unsub { feed } => encode_lines("UNSUB", &[feed]),
            Self::Book { feed, bookmark } => encode_lines("BOOK", &[feed, bookmark]),
            Self::Err { feed, message } => encode_lines("ERR", &[feed, message]),
        }
    }

    fn parse(keyword: &str, payload: &[&str]) -> Result<Self, TransportError> {
        match (keyword, payload) {
            ("SUB", [feed, bookmark]) => Ok(Self::Sub {
                feed: json_string(feed)?,
                bookmark: json_string(bookmark)?,
            }),
            ("UNSUB", [feed]) => Ok(Self::Unsub {
                feed: json_string(feed)?,
            }),
            ("BOOK", [feed, bookmark]) => Ok(Self::Book {
                feed: json_string(feed)?,
                bookmark: json_string(bookmark)?,
            }),
            ("ERR", [feed, message]) => Ok(Self::Err {
                feed: json_string(feed)?,
                message: json_string(message)?,
            }),
            _ => Err(TransportError::Protocol(format!(
                "{keyword} frame has {} payload lines",
                payload.len()
            ))),
        }
    }
}

fn encode_lines(keyword: &str, fields: &[&str]) -> String {
    let mut out = String::from(keyword);
    out.push('\n');
    for field in fields {
        out.push_str(&serde_json::to_string(field).expect("string always serializes"));
        out.push('\n');
    }
    out.push('\n');
    out
}

fn json_string(line: &str) -> Result<String, TransportError> {
    serde_json::from_str(line).map_err(|e| TransportError::Protocol(e.to_string()))
}

/// JSON heartbeat messages, sent and received outside the line-framed
/// protocol — a ping/pong exchange is a single complete WebSocket text
/// message, never buffered alongside control or graph frames.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Heartbeat {
    /// A liveness probe carrying the sender's clock reading.
    Ping {
        /// Milliseconds since the Unix epoch when the ping was sent.
        timestamp: i64,
    },
    /// The reply to a [`Heartbeat::Ping`].
    Pong {
        /// The timestamp echoed back from the ping that prompted this pong.
        timestamp: i64,
    },
}

impl Heartbeat {
    /// Parse `text` as a heartbeat message, or `None` if it isn't one —
    /// callers fall through to ordinary frame routing in that case.
    #[must_use]
    pub fn parse(text: &str) -> Option<Self> {
        serde_json::from_str(text).ok()
    }

    /// Render as a single-line JSON message.
    #[must_use]
    pub fn encode(&self) -> String {
        serde_json::to_string(self).expect("heartbeat always serializes")
    }
}

/// The outcome of routing one chunk of buffered text: any complete control
/// frames found, plus the concatenation of any complete graph frames (fed
/// to [`fg_codec::GraphDecoder`] as-is).
#[derive(Debug, Default, Clone)]
pub struct RouteResult {
    /// Control frames completed by this call, in stream order.
    pub control_frames: Vec<ControlFrame>,
    /// Concatenated text of any complete graph frames, ready for the
    /// graph decoder. Empty if no graph frame completed.
    pub graph_text: String,
}

/// Buffers chunked socket bytes and splits them into complete frames,
/// stashing an incomplete trailing frame for the next call.
#[derive(Debug, Default)]
pub struct FrameRouter {
    buffer: String,
}

impl FrameRouter {
    /// A router with an empty buffer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `chunk` and extract every complete frame now available.
    /// Control-frame parse failures are logged and the frame dropped —
    /// the protocol continues rather than tearing down the connection.
    pub fn feed(&mut self, chunk: &str) -> RouteResult {
        if chunk.contains('\r') {
            self.buffer.push_str(&chunk.replace("\r\n", "\n"));
        } else {
            self.buffer.push_str(chunk);
        }

        let mut result = RouteResult::default();
        while let Some(pos) = self.buffer.find("\n\n") {
            let frame: String = self.buffer.drain(..pos + 2).collect();
            let mut lines = frame.lines();
            let Some(keyword) = lines.next() else { continue };

            if matches!(keyword, "SUB" | "UNSUB" | "BOOK" | "ERR") {
                let payload: Vec<&str> = lines.collect();
                match ControlFrame::parse(keyword, &payload) {
                    Ok(control) => result.control_frames.push(control),
                    Err(err) => {
                        tracing::warn!(target: "factgraph.transport", %err, keyword, "dropping malformed control frame");
                    }
                }
            } else {
                result.graph_text.push_str(&frame);
            }
        }
        result
    }
}
