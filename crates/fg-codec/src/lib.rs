// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
#![warn(missing_docs)]

//! fg-codec
//!
//! Line-framed, back-reference-compressed encoding of fact graphs for
//! transmission over HTTP bodies and WebSocket frames.

/// Codec error taxonomy.
pub mod error;
/// The line-framed graph encoder and decoder.
pub mod graph;
/// Deterministic ordering of envelopes by predecessor dependency.
pub mod toposort;

pub use error::CodecError;
pub use graph::{GraphDecoder, GraphEncoder, DEFAULT_FLUSH_THRESHOLD};
pub use toposort::topo_sort;
