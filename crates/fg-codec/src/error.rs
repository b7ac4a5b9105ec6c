// SPDX-License-Identifier: MIT OR Apache-2.0
//! Errors produced while encoding or decoding a graph stream.

use fg_error::{CatalogError, ErrorCode};

/// Errors produced by [`crate::graph::GraphEncoder`] and
/// [`crate::graph::GraphDecoder`].
#[derive(Debug, Clone, thiserror::Error)]
pub enum CodecError {
    /// A predecessor or `PK<i>` back-reference named an index that has not
    /// yet been introduced on this stream.
    #[error("reference index {0} is out of range")]
    OutOfRangeReference(usize),
    /// A line did not parse as valid JSON in the position a frame requires.
    #[error("malformed frame: {0}")]
    MalformedFrame(String),
    /// The stream ended before a frame's closing blank line.
    #[error("unexpected end of stream inside a frame")]
    UnexpectedEndOfStream,
    /// The envelope set passed to the encoder has a predecessor cycle, so no
    /// topological order exists.
    #[error("predecessor graph has a cycle")]
    Cycle,
}

impl From<CodecError> for CatalogError {
    fn from(err: CodecError) -> Self {
        let code = match &err {
            CodecError::OutOfRangeReference(_) => ErrorCode::OutOfRangeReference,
            CodecError::MalformedFrame(_) => ErrorCode::MalformedFrame,
            CodecError::UnexpectedEndOfStream => ErrorCode::UnexpectedEndOfStream,
            CodecError::Cycle => ErrorCode::MalformedFrame,
        };
        CatalogError::new(code, err)
    }
}
