//! Lanthorn Store
//!
//! Storage contracts for associations and response nonces, plus the default
//! in-memory backends. Implementations must be safe to share between
//! concurrent requests.

use lanthorn_core::{Association, AssociationHandle, Nonce};
use std::collections::HashMap;
use std::sync::RwLock;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Backend unavailable: {0}")]
    Unavailable(String),
}

/// Trait for association storage backends
#[async_trait::async_trait]
pub trait AssociationStore: Send + Sync {
    /// Store an association under its handle
    async fn put(&self, association: Association) -> Result<(), StoreError>;

    /// Look up an association. Expired entries may still be returned;
    /// callers decide what to do with them.
    async fn get(&self, handle: &AssociationHandle) -> Result<Option<Association>, StoreError>;

    /// Delete an association (no-op if absent)
    async fn delete(&self, handle: &AssociationHandle) -> Result<(), StoreError>;

    /// Remove expired associations, returning how many were dropped
    async fn cleanup_expired(&self) -> Result<usize, StoreError> {
        Ok(0)
    }
}

/// Trait for nonce storage backends
#[async_trait::async_trait]
pub trait NonceStore: Send + Sync {
    /// Store a freshly issued nonce
    async fn put(&self, nonce: Nonce) -> Result<(), StoreError>;

    /// Atomically fetch and remove a nonce. Of any number of concurrent
    /// callers with the same id, at most one receives `Some`.
    async fn get_and_delete(&self, id: &str) -> Result<Option<Nonce>, StoreError>;

    /// Remove expired nonces, returning how many were dropped
    async fn cleanup_expired(&self) -> Result<usize, StoreError> {
        Ok(0)
    }
}

/// In-memory association store (for development/testing)
#[derive(Default)]
pub struct InMemoryAssociationStore {
    associations: RwLock<HashMap<String, Association>>,
}

impl InMemoryAssociationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored associations, expired ones included
    pub fn len(&self) -> usize {
        self.associations.read().map(|a| a.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait::async_trait]
impl AssociationStore for InMemoryAssociationStore {
    async fn put(&self, association: Association) -> Result<(), StoreError> {
        tracing::debug!(handle = %association.handle().short(), "Storing association");
        let mut associations = self
            .associations
            .write()
            .map_err(|e| StoreError::Storage(e.to_string()))?;
        associations.insert(association.handle().0.clone(), association);
        Ok(())
    }

    async fn get(&self, handle: &AssociationHandle) -> Result<Option<Association>, StoreError> {
        let associations = self
            .associations
            .read()
            .map_err(|e| StoreError::Storage(e.to_string()))?;
        Ok(associations.get(&handle.0).cloned())
    }

    async fn delete(&self, handle: &AssociationHandle) -> Result<(), StoreError> {
        tracing::debug!(handle = %handle.short(), "Deleting association");
        let mut associations = self
            .associations
            .write()
            .map_err(|e| StoreError::Storage(e.to_string()))?;
        associations.remove(&handle.0);
        Ok(())
    }

    async fn cleanup_expired(&self) -> Result<usize, StoreError> {
        let mut associations = self
            .associations
            .write()
            .map_err(|e| StoreError::Storage(e.to_string()))?;

        let before = associations.len();
        associations.retain(|_, a| !a.is_expired());
        Ok(before - associations.len())
    }
}

/// In-memory nonce store (for development/testing)
#[derive(Default)]
pub struct InMemoryNonceStore {
    nonces: RwLock<HashMap<String, Nonce>>,
}

impl InMemoryNonceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nonces.read().map(|n| n.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait::async_trait]
impl NonceStore for InMemoryNonceStore {
    async fn put(&self, nonce: Nonce) -> Result<(), StoreError> {
        tracing::debug!(nonce = %nonce.id, "Storing nonce");
        let mut nonces = self
            .nonces
            .write()
            .map_err(|e| StoreError::Storage(e.to_string()))?;
        nonces.insert(nonce.id.clone(), nonce);
        Ok(())
    }

    async fn get_and_delete(&self, id: &str) -> Result<Option<Nonce>, StoreError> {
        tracing::debug!(nonce = %id, "Fetching and deleting nonce");
        let mut nonces = self
            .nonces
            .write()
            .map_err(|e| StoreError::Storage(e.to_string()))?;

        // Removal happens under the write lock, so a nonce is handed out once.
        Ok(nonces.remove(id).filter(|n| !n.is_expired()))
    }

    async fn cleanup_expired(&self) -> Result<usize, StoreError> {
        let mut nonces = self
            .nonces
            .write()
            .map_err(|e| StoreError::Storage(e.to_string()))?;

        let before = nonces.len();
        nonces.retain(|_, n| !n.is_expired());
        Ok(before - nonces.len())
    }
}
