// SPDX-License-Identifier: MIT OR Apache-2.0
//! Distribution error taxonomy.

use fg_error::{CatalogError, ErrorCode};
use fg_spec::EvalError;

/// Detail attached to a denied distribution decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DenialDetail {
    /// Human-readable reason. In production mode this is the only detail
    /// exposed, to avoid leaking population membership.
    pub reason: String,
    /// In test mode, the hashes of the principals the share rule would have
    /// admitted.
    pub expected_hashes: Option<Vec<String>>,
    /// In test mode, the hash of the principal that was actually presented.
    pub user_hash: Option<String>,
}

/// Errors produced while evaluating a distribution decision.
#[derive(Debug, Clone, thiserror::Error)]
pub enum DistributionError {
    /// No share rule admits the requesting principal to (some feed of) the
    /// requested specification. Subscription fails permanently.
    #[error("distribution denied: {}", .0.reason)]
    DistributionDenied(DenialDetail),
    /// The underlying specification evaluator failed while resolving a feed
    /// or a share rule's `with` specification.
    #[error(transparent)]
    Eval(#[from] EvalError),
}

impl From<DistributionError> for CatalogError {
    fn from(err: DistributionError) -> Self {
        match &err {
            DistributionError::DistributionDenied(_) => {
                CatalogError::new(ErrorCode::DistributionDenied, err)
            }
            DistributionError::Eval(inner) => CatalogError::from(inner.clone()),
        }
    }
}
