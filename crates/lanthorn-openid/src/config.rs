//! OpenID provider configuration

use serde::{Deserialize, Serialize};

/// OpenID provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Absolute URL the provider is mounted at (e.g., "https://id.example/openid")
    pub provider_endpoint: String,

    /// Lifetime of negotiated and private associations, in seconds
    pub association_expiry_secs: i64,

    /// Lifetime of response nonces, in seconds
    pub nonce_expiry_secs: i64,

    /// Query parameter naming the user in identity URLs
    pub identity_param: String,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            provider_endpoint: "http://localhost:3000/openid".to_string(),
            association_expiry_secs: 30,
            nonce_expiry_secs: 30,
            identity_param: "u".to_string(),
        }
    }
}

impl ProviderConfig {
    /// Create a new config with a custom endpoint
    pub fn with_endpoint(endpoint: impl Into<String>) -> Self {
        Self {
            provider_endpoint: endpoint.into(),
            ..Default::default()
        }
    }

    /// Identity URL for a user: the endpoint with the identity parameter set
    pub fn identity_url(&self, identity: &str) -> String {
        let encoded: String = url::form_urlencoded::byte_serialize(identity.as_bytes()).collect();
        format!("{}?{}={}", self.provider_endpoint, self.identity_param, encoded)
    }
}
