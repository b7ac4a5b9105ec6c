// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]

//! Stable error catalog for the fact graph client.
//!
//! Every error kind is assigned a stable `FG-X###` code, where `X` is the
//! category letter and `###` is a three-digit number:
//!
//! - **M** — Model / canonicalization errors
//! - **X** — Crypto (signing / verification) errors
//! - **C** — Graph codec errors
//! - **S** — Fact store errors
//! - **E** — Specification evaluator errors
//! - **A** — Authorization errors
//! - **D** — Distribution errors
//! - **N** — Network / transport errors
//! - **R** — Retry / subscription errors
//!
//! Crate-local error enums are the source of truth for match ergonomics;
//! this catalog is the stable, serializable representation used once an
//! error crosses a crate boundary, for logging, and for test assertions.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Enumeration of all `FG` error codes, organized by category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    // ── Model (M) ─────────────────────────────────────────────────────
    /// A fact's `type` field is empty.
    EmptyFactType,
    /// A field value is not one of the permitted JSON primitives.
    UnsupportedFieldValue,
    /// A predecessor role was referenced that the fact type does not declare.
    UndeclaredRole,

    // ── Crypto (X) ────────────────────────────────────────────────────
    /// The fact's declared hash does not match the recomputed canonical hash.
    CorruptedFact,
    /// The envelope's declared hash disagrees with the recomputed digest.
    HashMismatch,
    /// A signature failed RSA-SHA-512 verification against its public key.
    BadSignature,
    /// A PEM-encoded key could not be parsed.
    MalformedKey,

    // ── Codec (C) ─────────────────────────────────────────────────────
    /// A predecessor or public-key back-reference index is out of range.
    OutOfRangeReference,
    /// A line could not be parsed in the expected position of a frame.
    MalformedFrame,
    /// The graph stream ended in the middle of a frame.
    UnexpectedEndOfStream,

    // ── Store (S) ─────────────────────────────────────────────────────
    /// A predecessor reference is not present in the store.
    UnknownFact,
    /// A bookmark was requested for a feed that has never been saved.
    UnknownFeed,

    // ── Evaluator (E) ─────────────────────────────────────────────────
    /// A specification referenced a label that was never bound.
    UndefinedLabel,
    /// A projection or path condition used a label at the wrong type.
    TypeMismatch,
    /// A condition block declared a kind other than `exists`/`notExists`.
    InvalidSpecification,

    // ── Authorization (A) ─────────────────────────────────────────────
    /// An authorization rule's selector is not predecessor-only.
    InvalidAuthorizationRule,
    /// The signing principal is not in the authorized population.
    NotAuthorized,

    // ── Distribution (D) ──────────────────────────────────────────────
    /// No share rule subsumes one of the requested specification's feeds.
    DistributionDenied,

    // ── Network (N) ───────────────────────────────────────────────────
    /// A network request failed (connection refused, DNS, reset, etc).
    NetworkError,
    /// A network request exceeded its configured timeout.
    Timeout,
    /// The server indicated the credentials must be refreshed.
    Reauthenticate,
    /// A control frame could not be parsed; the connection continues.
    ProtocolError,
    /// The transport rejected a send because it is not connected and
    /// buffering is disabled.
    NotConnected,

    // ── Retry / subscription (R) ──────────────────────────────────────
    /// A subscriber's retry budget was exhausted.
    RetriesExhausted,
    /// An operation was cancelled via a `CancellationToken`.
    Cancelled,
}

impl ErrorCode {
    /// Machine-readable code string (e.g. `"FG-M001"`).
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::EmptyFactType => "FG-M001",
            Self::UnsupportedFieldValue => "FG-M002",
            Self::UndeclaredRole => "FG-M003",

            Self::CorruptedFact => "FG-X001",
            Self::HashMismatch => "FG-X002",
            Self::BadSignature => "FG-X003",
            Self::MalformedKey => "FG-X004",

            Self::OutOfRangeReference => "FG-C001",
            Self::MalformedFrame => "FG-C002",
            Self::UnexpectedEndOfStream => "FG-C003",

            Self::UnknownFact => "FG-S001",
            Self::UnknownFeed => "FG-S002",

            Self::UndefinedLabel => "FG-E001",
            Self::TypeMismatch => "FG-E002",
            Self::InvalidSpecification => "FG-E003",

            Self::InvalidAuthorizationRule => "FG-A001",
            Self::NotAuthorized => "FG-A002",

            Self::DistributionDenied => "FG-D001",

            Self::NetworkError => "FG-N001",
            Self::Timeout => "FG-N002",
            Self::Reauthenticate => "FG-N003",
            Self::ProtocolError => "FG-N004",
            Self::NotConnected => "FG-N005",

            Self::RetriesExhausted => "FG-R001",
            Self::Cancelled => "FG-R002",
        }
    }

    /// `true` if the lower layer may retry an operation that failed with
    /// this code; `false` if retrying cannot help (a programming error or a
    /// terminal authorization/distribution decision).
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::NetworkError | Self::Timeout | Self::Reauthenticate
        )
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Stable, serializable representation of an error once it crosses a crate
/// boundary. Carries the [`ErrorCode`] plus a human-readable message built
/// from the originating crate-local error's `Display` impl.
#[derive(Debug, Clone, Serialize, Deserialize, thiserror::Error)]
#[error("{code}: {message}")]
pub struct CatalogError {
    /// The stable error code.
    pub code: ErrorCode,
    /// Human-readable detail, not part of the stable contract.
    pub message: String,
}

impl CatalogError {
    /// Construct a catalog error from a code and a displayable cause.
    pub fn new(code: ErrorCode, cause: impl fmt::Display) -> Self {
        Self {
            code,
            message: cause.to_string(),
        }
    }

    /// `true` if the underlying code is retryable.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        self.code.is_retryable()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable_strings() {
        assert_eq!(ErrorCode::HashMismatch.code(), "FG-X002");
        assert_eq!(ErrorCode::DistributionDenied.code(), "FG-D001");
    }

    #[test]
    fn network_errors_are_retryable_auth_is_not() {
        assert!(ErrorCode::NetworkError.is_retryable());
        assert!(ErrorCode::Timeout.is_retryable());
        assert!(!ErrorCode::NotAuthorized.is_retryable());
        assert!(!ErrorCode::DistributionDenied.is_retryable());
    }

    #[test]
    fn catalog_error_displays_code_and_message() {
        let err = CatalogError::new(ErrorCode::UnknownFact, "ref not found: Post/abc123");
        let rendered = err.to_string();
        assert!(rendered.starts_with("FG-S001"));
        assert!(rendered.contains("Post/abc123"));
    }

    #[test]
    fn catalog_error_serializes_to_json() {
        let err = CatalogError::new(ErrorCode::BadSignature, "signature byte mutated");
        let json = serde_json::to_string(&err).unwrap();
        assert!(json.contains("\"bad_signature\""));
    }
}
