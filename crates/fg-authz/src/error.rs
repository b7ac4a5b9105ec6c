// SPDX-License-Identifier: MIT OR Apache-2.0
//! Authorization error taxonomy.

use fg_error::{CatalogError, ErrorCode};
use fg_store::StoreError;

/// Errors produced while registering or evaluating authorization rules.
#[derive(Debug, Clone, thiserror::Error)]
pub enum AuthzError {
    /// A selector specification is not predecessor-only, or its shape is
    /// otherwise unsuitable for authorization (wrong projection, existential
    /// condition, multiple given roots).
    #[error("invalid authorization rule: {0}")]
    InvalidAuthorizationRule(String),
    /// The signing principal is not in the candidate fact's authorized
    /// population.
    #[error("principal is not authorized to author this fact")]
    NotAuthorized,
    /// The underlying store failed while resolving a selector's predecessor
    /// walk.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<AuthzError> for CatalogError {
    fn from(err: AuthzError) -> Self {
        let code = match &err {
            AuthzError::InvalidAuthorizationRule(_) => ErrorCode::InvalidAuthorizationRule,
            AuthzError::NotAuthorized => ErrorCode::NotAuthorized,
            AuthzError::Store(inner) => return inner.clone().into(),
        };
        CatalogError::new(code, err)
    }
}
