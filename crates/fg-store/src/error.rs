// SPDX-License-Identifier: MIT OR Apache-2.0
//! Errors produced by a [`crate::FactStore`].

use fg_error::{CatalogError, ErrorCode};
use fg_model::Reference;

/// Errors produced while saving to or reading from a fact store.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    /// A predecessor reference was not present in the store.
    #[error("referenced fact not found: {0}")]
    UnknownFact(Reference),
    /// A bookmark was requested for a feed that has never been saved.
    #[error("no bookmark saved for feed {0:?}")]
    UnknownFeed(String),
}

impl From<StoreError> for CatalogError {
    fn from(err: StoreError) -> Self {
        let code = match &err {
            StoreError::UnknownFact(_) => ErrorCode::UnknownFact,
            StoreError::UnknownFeed(_) => ErrorCode::UnknownFeed,
        };
        CatalogError::new(code, err)
    }
}
