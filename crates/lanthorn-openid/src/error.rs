//! Internal fault type for the provider engine
//!
//! Protocol-level rejections are not errors; they travel as
//! [`crate::OpenIdResponse`] values. `ProviderError` is reserved for store,
//! crypto and host failures that the host should answer with a 500.

use lanthorn_core::LanthornError;
use lanthorn_crypto::CryptoError;
use lanthorn_store::StoreError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),

    #[error(transparent)]
    Domain(#[from] LanthornError),

    #[error("Authentication hook failed: {0}")]
    Hook(String),
}
