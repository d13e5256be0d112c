//! Diffie-Hellman key agreement
//!
//! Integers travel as base64 of their big-endian two's-complement
//! representation ("btwoc"): a leading zero byte is prepended whenever the
//! most significant bit would otherwise be set.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use num_bigint::{BigUint, RandBigInt};
use num_traits::One;

use crate::CryptoError;

/// Largest modulus accepted from a relying party
pub const MAX_MODULUS_BITS: u64 = 4096;

/// Default modulus for DH association sessions
pub const DEFAULT_MODULUS_HEX: &str = concat!(
    "DCF93A0B883972EC0E19989AC5A2CE310E1D37717E8D9571BB7623731866E61E",
    "F75A2E27898B057F9891C2E27A639C3F29B60814581CD3B2CA3986D268370557",
    "7D45C2E7E52DC81C7A171876E5CEA74B1448BFDFAF18828EFD2519F14E45E382",
    "6634AF1949E5B535CC829A483B8A76223E5D490A257F05BDFF16F2FB22C583AB",
);

/// Default generator
pub const DEFAULT_GENERATOR: u32 = 2;

/// Encode big-endian magnitude bytes as btwoc
pub fn btwoc(bytes: &[u8]) -> Vec<u8> {
    match bytes.first() {
        Some(&msb) if msb & 0x80 != 0 => {
            let mut out = Vec::with_capacity(bytes.len() + 1);
            out.push(0);
            out.extend_from_slice(bytes);
            out
        }
        Some(_) => bytes.to_vec(),
        None => vec![0],
    }
}

/// Base64 btwoc encoding of an integer
pub fn encode_integer(value: &BigUint) -> String {
    STANDARD.encode(btwoc(&value.to_bytes_be()))
}

/// Decode a base64 btwoc integer
pub fn decode_integer(encoded: &str) -> Result<BigUint, CryptoError> {
    let bytes = STANDARD
        .decode(encoded.trim())
        .map_err(|e| CryptoError::Encoding(e.to_string()))?;
    Ok(BigUint::from_bytes_be(&bytes))
}

/// Group parameters for one key exchange
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DhParams {
    pub modulus: BigUint,
    pub generator: BigUint,
}

impl Default for DhParams {
    fn default() -> Self {
        Self {
            // The constant is valid hex; parse cannot fail.
            modulus: BigUint::parse_bytes(DEFAULT_MODULUS_HEX.as_bytes(), 16)
                .unwrap_or_default(),
            generator: BigUint::from(DEFAULT_GENERATOR),
        }
    }
}

impl DhParams {
    /// Build parameters from optional base64 btwoc overrides
    pub fn from_encoded(modulus: Option<&str>, generator: Option<&str>) -> Result<Self, CryptoError> {
        let defaults = Self::default();

        let modulus = match modulus {
            Some(m) => decode_integer(m)?,
            None => defaults.modulus,
        };
        let generator = match generator {
            Some(g) => decode_integer(g)?,
            None => defaults.generator,
        };

        let params = Self { modulus, generator };
        params.validate()?;
        Ok(params)
    }

    fn validate(&self) -> Result<(), CryptoError> {
        let two = BigUint::from(2u32);
        if self.modulus <= two || self.modulus.bits() > MAX_MODULUS_BITS {
            return Err(CryptoError::InvalidModulus);
        }
        if self.generator < two || self.generator >= self.modulus {
            return Err(CryptoError::InvalidGenerator);
        }
        Ok(())
    }

    /// Base64 btwoc encoding of the modulus
    pub fn encoded_modulus(&self) -> String {
        encode_integer(&self.modulus)
    }
}

/// An ephemeral DH key pair
pub struct DhKeyPair {
    params: DhParams,
    private: BigUint,
    public: BigUint,
}

impl DhKeyPair {
    /// Generate a key pair with a private exponent in `[1, p - 1)`
    pub fn generate(params: &DhParams) -> Self {
        let private = rand::thread_rng().gen_biguint_range(&BigUint::one(), &(&params.modulus - 1u32));
        let public = params.generator.modpow(&private, &params.modulus);

        Self {
            params: params.clone(),
            private,
            public,
        }
    }

    pub fn public_key(&self) -> &BigUint {
        &self.public
    }

    /// Base64 btwoc encoding of the public value
    pub fn encoded_public_key(&self) -> String {
        encode_integer(&self.public)
    }

    /// Compute the shared secret (btwoc bytes) with the peer's public value
    pub fn shared_secret(&self, peer_public: &BigUint) -> Result<Vec<u8>, CryptoError> {
        if *peer_public <= BigUint::one() || *peer_public >= &self.params.modulus - 1u32 {
            return Err(CryptoError::InvalidPublicKey);
        }

        let shared = peer_public.modpow(&self.private, &self.params.modulus);
        Ok(btwoc(&shared.to_bytes_be()))
    }
}
