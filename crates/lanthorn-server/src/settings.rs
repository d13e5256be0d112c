//! Server settings
//!
//! Read from an optional `lanthorn.toml`, then `LANTHORN_*` environment
//! variables. Nested provider fields use a double underscore, e.g.
//! `LANTHORN_PROVIDER__PROVIDER_ENDPOINT`.

use config::{Config, ConfigError, Environment, File};
use lanthorn_openid::ProviderConfig;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Socket address to listen on
    pub bind: String,

    /// Path the OpenID endpoint is served from
    pub mount: String,

    /// Seconds between expiry sweeps; 0 disables the sweep
    pub sweep_interval_secs: u64,

    /// Trust `X-Forwarded-Proto` (set only behind a TLS-terminating proxy)
    pub trust_proxy: bool,

    pub provider: ProviderConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:3000".to_string(),
            mount: "/openid".to_string(),
            sweep_interval_secs: 60,
            trust_proxy: false,
            provider: ProviderConfig::default(),
        }
    }
}

impl Settings {
    pub fn load() -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(File::with_name("lanthorn").required(false))
            .add_source(
                Environment::with_prefix("LANTHORN")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()
    }
}
