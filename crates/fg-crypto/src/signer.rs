// SPDX-License-Identifier: MIT OR Apache-2.0
//! Signs facts with an RSA private key.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use fg_model::canon::canonicalize;
use fg_model::{Fact, Signature};
use rsa::RsaPrivateKey;
use rsa::pkcs1v15::SigningKey;
use rsa::pkcs8::{DecodePrivateKey, EncodePublicKey, LineEnding};
use rsa::signature::SignatureEncoding;
use rsa::signature::Signer as _;
use sha2::Sha512;

use crate::error::CryptoError;

/// Holds an RSA key pair and signs facts on behalf of one principal.
pub struct Signer {
    signing_key: SigningKey<Sha512>,
    public_key_pem: String,
}

impl Signer {
    /// Load a signer from a PKCS#8 PEM-encoded RSA private key.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::MalformedKey`] if the PEM cannot be parsed as
    /// an RSA private key.
    pub fn from_pkcs8_pem(pem: &str) -> Result<Self, CryptoError> {
        let private_key = RsaPrivateKey::from_pkcs8_pem(pem)
            .map_err(|e| CryptoError::MalformedKey(e.to_string()))?;
        Self::from_private_key(private_key)
    }

    /// Wrap an already-parsed RSA private key.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::MalformedKey`] if the derived public key
    /// cannot be re-encoded as PEM (this should not happen for a key that
    /// parsed successfully).
    pub fn from_private_key(private_key: RsaPrivateKey) -> Result<Self, CryptoError> {
        let public_key = private_key.to_public_key();
        let public_key_pem = public_key
            .to_public_key_pem(LineEnding::LF)
            .map_err(|e| CryptoError::MalformedKey(e.to_string()))?;
        Ok(Self {
            signing_key: SigningKey::<Sha512>::new(private_key),
            public_key_pem,
        })
    }

    /// The PEM-encoded public key this signer attaches to every signature.
    #[must_use]
    pub fn public_key_pem(&self) -> &str {
        &self.public_key_pem
    }

    /// Recompute the fact's canonical digest, refuse to sign if it disagrees
    /// with the fact's declared hash, and produce a base64 RSA-SHA-512
    /// signature over the canonical bytes.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::CorruptedFact`] if `fact.hash()` does not
    /// match the recomputed canonical hash.
    pub fn sign(&self, fact: &Fact) -> Result<Signature, CryptoError> {
        if !fact.hash_is_valid() {
            return Err(CryptoError::CorruptedFact);
        }
        let canonical = canonicalize(fact.fields(), fact.predecessors());
        let signature = self.signing_key.sign(canonical.as_bytes());
        let encoded = BASE64.encode(signature.to_vec());
        Ok(Signature::new(self.public_key_pem.clone(), encoded))
    }
}
