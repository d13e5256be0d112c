//! Association records
//!
//! An association is the shared secret a relying party and the provider use to
//! sign and verify assertions without a live handshake.

use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::LanthornError;

/// Number of random bytes behind an association handle
pub const HANDLE_ENTROPY_BYTES: usize = 64;

/// Opaque association handle
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AssociationHandle(pub String);

impl AssociationHandle {
    pub fn new(handle: impl Into<String>) -> Self {
        Self(handle.into())
    }

    /// Generate a fresh handle from 64 random bytes, base64 encoded
    pub fn generate() -> Self {
        let mut bytes = [0u8; HANDLE_ENTROPY_BYTES];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(base64::engine::general_purpose::STANDARD.encode(bytes))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Shortened form for log lines
    pub fn short(&self) -> &str {
        let end = self
            .0
            .char_indices()
            .nth(12)
            .map(|(i, _)| i)
            .unwrap_or(self.0.len());
        &self.0[..end]
    }
}

impl std::fmt::Display for AssociationHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Hash function underlying an association or DH session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    Sha1,
    Sha256,
}

impl HashAlgorithm {
    /// Digest length in bytes
    pub fn output_len(&self) -> usize {
        match self {
            HashAlgorithm::Sha1 => 20,
            HashAlgorithm::Sha256 => 32,
        }
    }
}

/// Association (MAC) type negotiated with a relying party
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AssociationType {
    #[serde(rename = "HMAC-SHA1")]
    HmacSha1,
    #[serde(rename = "HMAC-SHA256")]
    HmacSha256,
}

impl AssociationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssociationType::HmacSha1 => "HMAC-SHA1",
            AssociationType::HmacSha256 => "HMAC-SHA256",
        }
    }

    pub fn algorithm(&self) -> HashAlgorithm {
        match self {
            AssociationType::HmacSha1 => HashAlgorithm::Sha1,
            AssociationType::HmacSha256 => HashAlgorithm::Sha256,
        }
    }

    /// MAC key length fixed by the algorithm
    pub fn key_len(&self) -> usize {
        self.algorithm().output_len()
    }
}

impl FromStr for AssociationType {
    type Err = LanthornError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "HMAC-SHA1" => Ok(AssociationType::HmacSha1),
            "HMAC-SHA256" => Ok(AssociationType::HmacSha256),
            other => Err(LanthornError::UnknownAssociationType(other.to_string())),
        }
    }
}

impl std::fmt::Display for AssociationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Symmetric MAC key, wiped on drop
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct MacKey(Vec<u8>);

impl MacKey {
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Debug for MacKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "MacKey([REDACTED; {}])", self.0.len())
    }
}

/// A negotiated (or provider-minted) shared secret
///
/// Fields are read-only after construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Association {
    handle: AssociationHandle,
    assoc_type: AssociationType,
    secret: MacKey,
    expires_at: DateTime<Utc>,
    private: bool,
}

impl Association {
    /// Create an association with a fresh handle
    ///
    /// `private` marks associations the provider minted for itself, which
    /// only the provider can verify (via `check_authentication`).
    pub fn new(
        assoc_type: AssociationType,
        secret: MacKey,
        expiry_seconds: i64,
        private: bool,
    ) -> Result<Self, LanthornError> {
        if secret.len() != assoc_type.key_len() {
            return Err(LanthornError::InvalidKeyLength {
                expected: assoc_type.key_len(),
                actual: secret.len(),
            });
        }

        Ok(Self {
            handle: AssociationHandle::generate(),
            assoc_type,
            secret,
            expires_at: Utc::now() + Duration::seconds(expiry_seconds),
            private,
        })
    }

    pub fn handle(&self) -> &AssociationHandle {
        &self.handle
    }

    pub fn assoc_type(&self) -> AssociationType {
        self.assoc_type
    }

    pub fn algorithm(&self) -> HashAlgorithm {
        self.assoc_type.algorithm()
    }

    pub fn secret(&self) -> &MacKey {
        &self.secret
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    pub fn is_private(&self) -> bool {
        self.private
    }

    /// Check if the association has expired
    pub fn is_expired(&self) -> bool {
        Utc::now() > self.expires_at
    }
}
