// SPDX-License-Identifier: MIT OR Apache-2.0
//! Errors surfaced by [`crate::FactGraphClient`], wrapping every component
//! error this crate composes.

use fg_error::CatalogError;

/// Errors produced while authoring a fact, running a query, or managing a
/// subscription through a [`crate::FactGraphClient`].
#[derive(Debug, Clone, thiserror::Error)]
pub enum ClientError {
    /// A fact could not be constructed (empty type, bad field value).
    #[error(transparent)]
    Fact(#[from] fg_model::FactError),
    /// Signing failed: the fact's declared hash disagreed with its
    /// recomputed canonical hash, or the signer's key was malformed.
    #[error(transparent)]
    Crypto(#[from] fg_crypto::CryptoError),
    /// The local store rejected a save, load, or bookmark operation.
    #[error(transparent)]
    Store(#[from] fg_store::StoreError),
    /// The specification evaluator failed.
    #[error(transparent)]
    Eval(#[from] fg_spec::EvalError),
    /// The authorization engine refused the candidate fact's author.
    #[error(transparent)]
    Authz(#[from] fg_authz::AuthzError),
    /// The distribution engine refused a requesting principal.
    #[error(transparent)]
    Distribution(#[from] fg_distribution::DistributionError),
    /// The subscription manager failed to start a feed.
    #[error(transparent)]
    Subscription(#[from] fg_subscription::SubscriptionError),
    /// The candidate fact's author is not in the type's authorized
    /// population.
    #[error("principal is not authorized to author facts of this type")]
    NotAuthorized,
}

impl From<ClientError> for CatalogError {
    fn from(err: ClientError) -> Self {
        match err {
            ClientError::Fact(e) => CatalogError::new(fg_error::ErrorCode::EmptyFactType, e),
            ClientError::Crypto(e) => e.into(),
            ClientError::Store(e) => e.into(),
            ClientError::Eval(e) => e.into(),
            ClientError::Authz(e) => e.into(),
            ClientError::Distribution(e) => e.into(),
            ClientError::Subscription(e) => e.into(),
            ClientError::NotAuthorized => {
                CatalogError::new(fg_error::ErrorCode::NotAuthorized, "principal is not authorized to author facts of this type")
            }
        }
    }
}
