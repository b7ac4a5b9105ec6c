// SPDX-License-Identifier: MIT OR Apache-2.0
//! Errors produced while evaluating a [`crate::types::Specification`].

use fg_error::{CatalogError, ErrorCode};
use fg_store::StoreError;

/// Errors produced by [`crate::evaluator::evaluate`].
#[derive(Debug, Clone, thiserror::Error)]
pub enum EvalError {
    /// A path condition or projection referenced a label never bound by a
    /// `given` or a prior `match`.
    #[error("undefined label: {0}")]
    UndefinedLabel(String),
    /// A given binding's reference type disagreed with its declared type,
    /// or a path condition walked through a multi-valued role where a
    /// single predecessor was required.
    #[error("type mismatch: {0}")]
    TypeMismatch(String),
    /// The specification itself is malformed — an unrecognized condition
    /// kind, or a match with no path condition anchoring it to prior
    /// context.
    #[error("invalid specification: {0}")]
    InvalidSpecification(String),
    /// A predecessor walk crossed a reference the store does not have.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<EvalError> for CatalogError {
    fn from(err: EvalError) -> Self {
        let code = match &err {
            EvalError::UndefinedLabel(_) => ErrorCode::UndefinedLabel,
            EvalError::TypeMismatch(_) => ErrorCode::TypeMismatch,
            EvalError::InvalidSpecification(_) => ErrorCode::InvalidSpecification,
            EvalError::Store(e) => return CatalogError::from(e.clone()),
        };
        CatalogError::new(code, err)
    }
}
