//! `associate` direct requests: shared-secret negotiation
//!
//! Supports `no-encryption` (TLS only) and Diffie-Hellman sessions whose
//! MAC key is masked with the hash of the DH shared secret.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use lanthorn_core::{Association, AssociationType, HashAlgorithm};
use lanthorn_crypto::dh::decode_integer;
use lanthorn_crypto::{digest, generate_mac_key, xor, DhKeyPair, DhParams};
use lanthorn_store::AssociationStore;

use crate::config::ProviderConfig;
use crate::error::ProviderError;
use crate::message::Message;
use crate::response::OpenIdResponse;

/// Session types a relying party may request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionType {
    NoEncryption,
    DhSha1,
    DhSha256,
}

impl SessionType {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "no-encryption" => Some(SessionType::NoEncryption),
            "DH-SHA1" => Some(SessionType::DhSha1),
            "DH-SHA256" => Some(SessionType::DhSha256),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SessionType::NoEncryption => "no-encryption",
            SessionType::DhSha1 => "DH-SHA1",
            SessionType::DhSha256 => "DH-SHA256",
        }
    }

    /// Hash used to mask the MAC key, if any
    pub fn algorithm(&self) -> Option<HashAlgorithm> {
        match self {
            SessionType::NoEncryption => None,
            SessionType::DhSha1 => Some(HashAlgorithm::Sha1),
            SessionType::DhSha256 => Some(HashAlgorithm::Sha256),
        }
    }
}

/// Error for any `associate` request the provider will not honour.
///
/// Suggests the strongest combination the provider supports.
pub fn unsupported(error: impl Into<String>) -> OpenIdResponse {
    let message: Message = [
        ("error", error.into()),
        ("error_code", "unsupported-type".to_string()),
        ("session_type", SessionType::DhSha256.as_str().to_string()),
        ("assoc_type", AssociationType::HmacSha256.as_str().to_string()),
    ]
    .into_iter()
    .collect();
    OpenIdResponse::direct_error(&message)
}

/// Handle an `associate` request. `secure` reports whether the request
/// arrived over TLS.
pub async fn associate(
    config: &ProviderConfig,
    store: &dyn AssociationStore,
    request: &Message,
    secure: bool,
) -> Result<OpenIdResponse, ProviderError> {
    let requested_session = request.get("session_type").unwrap_or_default();
    let Some(session_type) = SessionType::parse(requested_session) else {
        return Ok(unsupported(format!(
            "Session type not recognised: {}",
            requested_session
        )));
    };

    if session_type == SessionType::NoEncryption && !secure {
        tracing::warn!("Refusing no-encryption association over plain HTTP");
        return Ok(unsupported(
            "Cannot create a \"no-encryption\" session without using HTTPS",
        ));
    }

    let requested_assoc = request.get("assoc_type").unwrap_or_default();
    let Ok(assoc_type) = requested_assoc.parse::<AssociationType>() else {
        return Ok(unsupported(format!(
            "Association type not recognised: {}",
            requested_assoc
        )));
    };

    if let Some(session_hash) = session_type.algorithm() {
        if session_hash != assoc_type.algorithm() {
            return Ok(unsupported(format!(
                "Session type {} cannot carry an {} key",
                session_type.as_str(),
                assoc_type
            )));
        }
    }

    let mac_key = generate_mac_key(assoc_type);

    let mut response = Message::new();
    let secret_fields = match session_type.algorithm() {
        None => vec![("mac_key", STANDARD.encode(mac_key.as_bytes()))],
        Some(algorithm) => {
            let Some(exchange) = diffie_hellman(request, algorithm, mac_key.as_bytes())? else {
                return Ok(OpenIdResponse::direct_error_text(
                    "Invalid Diffie-Hellman parameters",
                ));
            };
            exchange
        }
    };

    let association = Association::new(
        assoc_type,
        mac_key,
        config.association_expiry_secs,
        false,
    )?;
    let handle = association.handle().clone();
    store.put(association).await?;

    tracing::info!(
        handle = %handle.short(),
        session_type = session_type.as_str(),
        assoc_type = %assoc_type,
        "Association established"
    );

    response.insert("assoc_handle", handle.0);
    response.insert("session_type", session_type.as_str());
    response.insert("assoc_type", assoc_type.as_str());
    response.insert("expires_in", config.association_expiry_secs.to_string());
    for (field, value) in secret_fields {
        response.insert(field, value);
    }

    Ok(OpenIdResponse::direct(&response))
}

/// Run the server half of the key exchange and mask the MAC key.
///
/// Returns `Ok(None)` when the relying party's parameters are malformed.
fn diffie_hellman(
    request: &Message,
    algorithm: HashAlgorithm,
    mac_key: &[u8],
) -> Result<Option<Vec<(&'static str, String)>>, ProviderError> {
    let Ok(params) = DhParams::from_encoded(request.get("dh_modulus"), request.get("dh_gen"))
    else {
        return Ok(None);
    };
    let Some(Ok(consumer_public)) = request.get("dh_consumer_public").map(decode_integer) else {
        return Ok(None);
    };

    let keypair = DhKeyPair::generate(&params);
    let Ok(shared) = keypair.shared_secret(&consumer_public) else {
        return Ok(None);
    };

    let enc_mac_key = xor(&digest(algorithm, &shared), mac_key)?;

    Ok(Some(vec![
        ("dh_server_public", keypair.encoded_public_key()),
        ("enc_mac_key", STANDARD.encode(enc_mac_key)),
    ]))
}
