//! Lanthorn Core
//!
//! Core domain types for the Lanthorn OpenID 2.0 provider.
//! This crate defines the association and nonce records shared by the
//! crypto, storage and protocol crates.

pub mod association;
pub mod error;
pub mod nonce;

pub use association::{Association, AssociationHandle, AssociationType, HashAlgorithm, MacKey};
pub use error::LanthornError;
pub use nonce::Nonce;

/// Namespace URI of OpenID Authentication 2.0 messages
pub const OPENID_NS: &str = "http://specs.openid.net/auth/2.0";

/// Namespace URI of the OpenID Attribute Exchange 1.0 extension
pub const OPENID_AX_NS: &str = "http://openid.net/srv/ax/1.0";
