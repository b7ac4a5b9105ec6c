// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
#![warn(missing_docs)]

//! fg-crypto
//!
//! RSA-SHA-512 signing and verification of fact envelopes.

/// Crypto error taxonomy.
pub mod error;
/// Signs facts with an RSA private key.
pub mod signer;
/// Verifies fact envelopes.
pub mod verifier;

pub use error::CryptoError;
pub use signer::Signer;
pub use verifier::Verifier;
