// SPDX-License-Identifier: MIT OR Apache-2.0
//! Verifies fact envelopes: hash agreement and every signature.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use fg_model::canon::{canonicalize, hash_of};
use fg_model::Envelope;
use rsa::RsaPublicKey;
use rsa::pkcs1v15::{Signature as RsaSignature, VerifyingKey};
use rsa::pkcs8::DecodePublicKey;
use rsa::signature::Verifier as _;
use sha2::Sha512;

use crate::error::CryptoError;

/// Stateless verifier for fact envelopes.
#[derive(Debug, Default, Clone, Copy)]
pub struct Verifier;

impl Verifier {
    /// Recompute the envelope's fact digest and reject if it disagrees with
    /// the declared hash, then verify every attached signature. An envelope
    /// with any bad signature is rejected entirely — verification is
    /// per-envelope, not per-signature.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::HashMismatch`] if the declared hash disagrees
    /// with the recomputed digest, or [`CryptoError::BadSignature`] if any
    /// signature fails verification, or [`CryptoError::MalformedKey`] if a
    /// signature's embedded public key cannot be parsed.
    pub fn verify_envelope(envelope: &Envelope) -> Result<(), CryptoError> {
        let fact = &envelope.fact;
        let recomputed = hash_of(fact.fields(), fact.predecessors());
        if recomputed != fact.hash() {
            return Err(CryptoError::HashMismatch);
        }

        let canonical = canonicalize(fact.fields(), fact.predecessors());
        for signature in envelope.signature_list() {
            let public_key = RsaPublicKey::from_public_key_pem(&signature.public_key)
                .map_err(|e| CryptoError::MalformedKey(e.to_string()))?;
            let verifying_key = VerifyingKey::<Sha512>::new(public_key);

            let signature_bytes = BASE64
                .decode(&signature.signature)
                .map_err(|_| CryptoError::BadSignature)?;
            let rsa_signature = RsaSignature::try_from(signature_bytes.as_slice())
                .map_err(|_| CryptoError::BadSignature)?;

            verifying_key
                .verify(canonical.as_bytes(), &rsa_signature)
                .map_err(|_| CryptoError::BadSignature)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signer::Signer;
    use fg_model::Fact;
    use rand::rngs::OsRng;
    use rsa::RsaPrivateKey;
    use std::collections::BTreeMap;

    fn keyed_signer() -> Signer {
        let private_key = RsaPrivateKey::new(&mut OsRng, 2048).unwrap();
        Signer::from_private_key(private_key).unwrap()
    }

    #[test]
    fn accepts_envelope_with_valid_multi_signer_signatures() {
        let k1 = keyed_signer();
        let k2 = keyed_signer();
        let fact = Fact::new("Msg", BTreeMap::new(), BTreeMap::new()).unwrap();

        let mut envelope = Envelope::unsigned(fact.clone());
        envelope.add_signature(k1.sign(&fact).unwrap());
        envelope.add_signature(k2.sign(&fact).unwrap());

        Verifier::verify_envelope(&envelope).unwrap();
    }

    #[test]
    fn rejects_envelope_with_one_mutated_signature() {
        let k1 = keyed_signer();
        let k2 = keyed_signer();
        let fact = Fact::new("Msg", BTreeMap::new(), BTreeMap::new()).unwrap();

        let mut envelope = Envelope::unsigned(fact.clone());
        envelope.add_signature(k1.sign(&fact).unwrap());
        let mut bad = k2.sign(&fact).unwrap();
        bad.signature.replace_range(0..1, if bad.signature.starts_with('A') { "B" } else { "A" });
        envelope.add_signature(bad);

        let err = Verifier::verify_envelope(&envelope).unwrap_err();
        assert!(matches!(err, CryptoError::BadSignature));
    }

    #[test]
    fn rejects_envelope_whose_hash_disagrees_with_recomputed_digest() {
        let fact = Fact::new("Msg", BTreeMap::new(), BTreeMap::new()).unwrap();
        let tampered = Fact::from_parts(
            fact.fact_type().to_string(),
            fact.fields().clone(),
            fact.predecessors().clone(),
            "not-the-real-hash",
        );
        let envelope = Envelope::unsigned(tampered);
        let err = Verifier::verify_envelope(&envelope).unwrap_err();
        assert!(matches!(err, CryptoError::HashMismatch));
    }
}
