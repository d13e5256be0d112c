//! Single-use response nonces

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};

/// A response nonce binding one assertion to one redemption
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Nonce {
    /// `YYYY-MM-DDTHH:MM:SSZ` followed by 8 hex characters of randomness
    pub id: String,

    /// When the nonce stops being redeemable
    pub expires_at: DateTime<Utc>,
}

impl Nonce {
    /// Create a nonce stamped with the current time
    pub fn generate(expiry_seconds: i64) -> Self {
        let now = Utc::now();
        let mut salt = [0u8; 4];
        rand::thread_rng().fill_bytes(&mut salt);

        Self {
            id: format!(
                "{}{}",
                now.to_rfc3339_opts(SecondsFormat::Secs, true),
                hex::encode(salt)
            ),
            expires_at: now + Duration::seconds(expiry_seconds),
        }
    }

    /// Check if the nonce has expired
    pub fn is_expired(&self) -> bool {
        Utc::now() > self.expires_at
    }
}
