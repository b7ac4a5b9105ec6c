// SPDX-License-Identifier: MIT OR Apache-2.0
//! Retry error taxonomy.

use fg_error::{CatalogError, ErrorCode};

/// Errors produced by the generic retry loop.
#[derive(Debug, Clone, thiserror::Error)]
pub enum RetryError<E> {
    /// The operation was cancelled via a [`crate::CancellationToken`] before
    /// it produced a result.
    #[error("retry cancelled")]
    Cancelled,
    /// Every attempt up to `max_retries` failed, or the overall timeout
    /// elapsed before a retry could be attempted. Carries the last attempt's
    /// error.
    #[error("retries exhausted: {0}")]
    RetriesExhausted(E),
}

impl<E> From<RetryError<E>> for CatalogError
where
    E: std::fmt::Display,
{
    fn from(err: RetryError<E>) -> Self {
        let code = match &err {
            RetryError::Cancelled => ErrorCode::Cancelled,
            RetryError::RetriesExhausted(_) => ErrorCode::RetriesExhausted,
        };
        CatalogError::new(code, err.to_string())
    }
}
