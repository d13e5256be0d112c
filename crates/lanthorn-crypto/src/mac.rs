//! MAC keys, HMAC signing and digest helpers

use hmac::{Hmac, Mac};
use lanthorn_core::{AssociationType, HashAlgorithm, MacKey};
use rand::RngCore;
use sha1::Sha1;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::CryptoError;

type HmacSha1 = Hmac<Sha1>;
type HmacSha256 = Hmac<Sha256>;

/// Generate a random MAC key sized for the association type
pub fn generate_mac_key(assoc_type: AssociationType) -> MacKey {
    let mut bytes = vec![0u8; assoc_type.key_len()];
    rand::thread_rng().fill_bytes(&mut bytes);
    MacKey::from_bytes(bytes)
}

/// Compute the HMAC of `data` under `key`
pub fn sign(algorithm: HashAlgorithm, key: &MacKey, data: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let tag = match algorithm {
        HashAlgorithm::Sha1 => {
            let mut mac = HmacSha1::new_from_slice(key.as_bytes())
                .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
            mac.update(data);
            mac.finalize().into_bytes().to_vec()
        }
        HashAlgorithm::Sha256 => {
            let mut mac = HmacSha256::new_from_slice(key.as_bytes())
                .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
            mac.update(data);
            mac.finalize().into_bytes().to_vec()
        }
    };
    Ok(tag)
}

/// Plain digest, used to hash DH shared secrets
pub fn digest(algorithm: HashAlgorithm, data: &[u8]) -> Vec<u8> {
    match algorithm {
        HashAlgorithm::Sha1 => Sha1::digest(data).to_vec(),
        HashAlgorithm::Sha256 => Sha256::digest(data).to_vec(),
    }
}

/// Bytewise XOR of two equal-length buffers
pub fn xor(a: &[u8], b: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if a.len() != b.len() {
        return Err(CryptoError::InvalidKey(format!(
            "length mismatch: {} vs {}",
            a.len(),
            b.len()
        )));
    }
    Ok(a.iter().zip(b).map(|(x, y)| x ^ y).collect())
}

/// Constant-time equality for signatures
pub fn signatures_match(expected: &[u8], supplied: &[u8]) -> bool {
    expected.len() == supplied.len() && bool::from(expected.ct_eq(supplied))
}
