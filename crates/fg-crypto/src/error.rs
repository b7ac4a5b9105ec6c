// SPDX-License-Identifier: MIT OR Apache-2.0
//! Errors produced while signing or verifying fact envelopes.

use fg_error::{CatalogError, ErrorCode};

/// Errors produced by [`crate::signer::Signer`] and [`crate::verifier::Verifier`].
#[derive(Debug, Clone, thiserror::Error)]
pub enum CryptoError {
    /// A fact's declared hash does not match its recomputed canonical hash;
    /// the signer refuses to sign a fact it cannot verify itself.
    #[error("fact hash does not match its recomputed canonical hash")]
    CorruptedFact,
    /// An envelope's declared hash does not match its recomputed digest.
    #[error("envelope hash does not match the recomputed canonical digest")]
    HashMismatch,
    /// A signature in the envelope failed RSA-SHA-512 verification. The
    /// whole envelope is rejected, even if other signatures are valid.
    #[error("signature failed RSA-SHA-512 verification")]
    BadSignature,
    /// A PEM-encoded key could not be parsed.
    #[error("malformed PEM key: {0}")]
    MalformedKey(String),
}

impl From<CryptoError> for CatalogError {
    fn from(err: CryptoError) -> Self {
        let code = match &err {
            CryptoError::CorruptedFact => ErrorCode::CorruptedFact,
            CryptoError::HashMismatch => ErrorCode::HashMismatch,
            CryptoError::BadSignature => ErrorCode::BadSignature,
            CryptoError::MalformedKey(_) => ErrorCode::MalformedKey,
        };
        CatalogError::new(code, err)
    }
}
