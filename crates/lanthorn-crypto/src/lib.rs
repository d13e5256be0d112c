//! Lanthorn Crypto
//!
//! Cryptographic primitives for the Lanthorn OpenID provider:
//! Diffie-Hellman key agreement for association sessions, and HMAC-SHA1 /
//! HMAC-SHA256 message authentication.

pub mod dh;
pub mod mac;

pub use dh::{btwoc, DhKeyPair, DhParams, DEFAULT_GENERATOR, DEFAULT_MODULUS_HEX, MAX_MODULUS_BITS};
pub use mac::{digest, generate_mac_key, sign, signatures_match, xor};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("Invalid base64 encoding: {0}")]
    Encoding(String),

    #[error("Invalid Diffie-Hellman modulus")]
    InvalidModulus,

    #[error("Invalid Diffie-Hellman generator")]
    InvalidGenerator,

    #[error("Invalid Diffie-Hellman public value")]
    InvalidPublicKey,

    #[error("Invalid MAC key: {0}")]
    InvalidKey(String),
}
