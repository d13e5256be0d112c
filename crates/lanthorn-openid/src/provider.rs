//! Provider protocol engine
//!
//! [`Provider::handle`] dispatches one decoded request. Interactive login is
//! delegated to an [`AuthHook`]; the engine resumes through
//! [`Provider::complete_auth`] or [`Provider::reject_auth`], which may be
//! called from a later request holding the parked [`AuthContext`].

use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use lanthorn_core::{Association, AssociationHandle, AssociationType, Nonce, OPENID_AX_NS};
use lanthorn_crypto::{generate_mac_key, sign, signatures_match};
use lanthorn_store::{AssociationStore, InMemoryAssociationStore, InMemoryNonceStore, NonceStore};
use serde::{Deserialize, Serialize};

use crate::associate::associate;
use crate::ax::{AttributeValues, FetchRequest};
use crate::config::ProviderConfig;
use crate::discovery::{self, DiscoveryDocument};
use crate::error::ProviderError;
use crate::message::Message;
use crate::realm;
use crate::response::{parse_return_to, OpenIdResponse};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestMethod {
    Get,
    Post,
    Other,
}

/// A request as decoded by the host
#[derive(Debug, Clone)]
pub struct IncomingRequest {
    pub method: RequestMethod,

    /// Path relative to the provider mount point
    pub path: String,

    /// Form body (POST) or query string (GET) parameters, in order
    pub params: Vec<(String, String)>,

    /// Whether the request arrived over TLS
    pub secure: bool,

    /// `Accept` header, used for discovery
    pub accept: Option<String>,
}

impl IncomingRequest {
    pub fn new(method: RequestMethod, path: impl Into<String>, params: Vec<(String, String)>) -> Self {
        Self {
            method,
            path: path.into(),
            params,
            secure: false,
            accept: None,
        }
    }

    pub fn get(path: impl Into<String>, params: Vec<(String, String)>) -> Self {
        Self::new(RequestMethod::Get, path, params)
    }

    pub fn post(path: impl Into<String>, params: Vec<(String, String)>) -> Self {
        Self::new(RequestMethod::Post, path, params)
    }

    pub fn with_secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    pub fn with_accept(mut self, accept: impl Into<String>) -> Self {
        self.accept = Some(accept.into());
        self
    }
}

/// Continuation for a pending checkid request
///
/// Serialisable so a host can park it across requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthContext {
    /// The original checkid request
    pub request: Message,

    /// `checkid_setup` (true) or `checkid_immediate` (false)
    pub interactive: bool,

    /// Attribute exchange fetch request, if the relying party sent one
    pub ax: Option<FetchRequest>,
}

impl AuthContext {
    pub fn return_to(&self) -> Option<&str> {
        self.request.get("return_to")
    }

    pub fn realm(&self) -> Option<&str> {
        self.request.get("realm")
    }
}

/// A successful login
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Authentication {
    pub identity: String,
    pub ax: Option<AttributeValues>,
}

impl Authentication {
    pub fn new(identity: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            ax: None,
        }
    }

    pub fn with_attributes(mut self, attributes: AttributeValues) -> Self {
        self.ax = Some(attributes);
        self
    }
}

/// What the host decided to do with a checkid request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthDecision {
    /// The user is known; assert the identity now
    Complete(Authentication),

    /// Refuse (`cancel` or `setup_needed`)
    Reject,

    /// The host parked the context and will resume later. The user agent is
    /// redirected to `location`, usually a login page.
    Defer { location: String },
}

/// Host authentication callback
#[async_trait::async_trait]
pub trait AuthHook: Send + Sync {
    async fn check_auth(
        &self,
        interactive: bool,
        context: AuthContext,
    ) -> Result<AuthDecision, ProviderError>;
}

/// OpenID 2.0 provider
pub struct Provider {
    config: ProviderConfig,
    associations: Arc<dyn AssociationStore>,
    nonces: Arc<dyn NonceStore>,
    hook: Arc<dyn AuthHook>,
}

impl Provider {
    /// Create a provider backed by in-memory stores
    pub fn new(config: ProviderConfig, hook: Arc<dyn AuthHook>) -> Self {
        Self {
            config,
            associations: Arc::new(InMemoryAssociationStore::new()),
            nonces: Arc::new(InMemoryNonceStore::new()),
            hook,
        }
    }

    pub fn with_association_store(mut self, store: Arc<dyn AssociationStore>) -> Self {
        self.associations = store;
        self
    }

    pub fn with_nonce_store(mut self, store: Arc<dyn NonceStore>) -> Self {
        self.nonces = store;
        self
    }

    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    pub fn identity_url(&self, identity: &str) -> String {
        self.config.identity_url(identity)
    }

    /// Handle one request.
    ///
    /// Protocol failures come back as `Ok` responses; `Err` means a store,
    /// crypto or hook fault.
    pub async fn handle(&self, request: &IncomingRequest) -> Result<OpenIdResponse, ProviderError> {
        let message = Message::from_parameters(request.params.iter().map(|(k, v)| (k, v.clone())));

        if !message.is_openid() {
            if request.method == RequestMethod::Get && matches!(request.path.as_str(), "" | "/") {
                return Ok(self.discover(request));
            }
            return Ok(OpenIdResponse::PassThrough);
        }

        let mode = message.mode().unwrap_or_default().to_string();
        tracing::debug!(mode = %mode, method = ?request.method, "OpenID request");

        match (request.method, mode.as_str()) {
            (RequestMethod::Post, "associate") => {
                associate(&self.config, &*self.associations, &message, request.secure).await
            }
            (RequestMethod::Post, "check_authentication") => {
                self.check_authentication(&message).await
            }
            (RequestMethod::Post | RequestMethod::Get, "checkid_setup") => {
                self.check_id(message, true).await
            }
            (RequestMethod::Post | RequestMethod::Get, "checkid_immediate") => {
                self.check_id(message, false).await
            }
            (RequestMethod::Post, _) => Ok(OpenIdResponse::direct_error_text(
                "Unknown or unsupported direct request",
            )),
            (RequestMethod::Get, _) => Ok(OpenIdResponse::indirect_error(
                message.get("return_to"),
                "Unknown or unsupported indirect request",
            )),
            (RequestMethod::Other, _) => Ok(OpenIdResponse::PassThrough),
        }
    }

    fn discover(&self, request: &IncomingRequest) -> OpenIdResponse {
        let Some(format) = discovery::negotiate(request.accept.as_deref()) else {
            tracing::debug!(accept = ?request.accept, "No acceptable discovery format");
            return OpenIdResponse::NotAcceptable;
        };

        let identity = match request.params.as_slice() {
            [(name, value)] if *name == self.config.identity_param => Some(value.as_str()),
            _ => None,
        };

        let document = DiscoveryDocument::render(&self.config, format, identity);
        OpenIdResponse::Document {
            content_type: document.content_type,
            body: document.body,
        }
    }

    async fn check_authentication(&self, request: &Message) -> Result<OpenIdResponse, ProviderError> {
        let is_valid = self.verify_assertion(request).await?;
        tracing::info!(is_valid, "check_authentication");

        let response: Message = [("is_valid", if is_valid { "true" } else { "false" })]
            .into_iter()
            .collect();
        Ok(OpenIdResponse::direct(&response))
    }

    async fn verify_assertion(&self, request: &Message) -> Result<bool, ProviderError> {
        let (Some(handle), Some(nonce)) = (request.get("assoc_handle"), request.get("response_nonce"))
        else {
            return Ok(false);
        };

        // Consume the nonce before anything else so a replay never verifies.
        if self.nonces.get_and_delete(nonce).await?.is_none() {
            tracing::debug!("Nonce missing or already redeemed");
            return Ok(false);
        }

        let handle = AssociationHandle::new(handle);
        let Some(association) = self.associations.get(&handle).await? else {
            return Ok(false);
        };
        if !association.is_private() {
            return Ok(false);
        }
        if association.is_expired() {
            self.associations.delete(&handle).await?;
            return Ok(false);
        }

        let (Some(signed), Some(sig)) = (request.get("signed"), request.get("sig")) else {
            return Ok(false);
        };
        let Ok(supplied) = STANDARD.decode(sig) else {
            return Ok(false);
        };

        let mut original = request.clone();
        original.insert("mode", "id_res");
        let fields: Vec<&str> = signed.split(',').collect();
        let form = original.encode_direct(Some(fields.as_slice()));

        let expected = sign(association.algorithm(), association.secret(), form.body.as_bytes())?;
        Ok(signatures_match(&expected, &supplied))
    }

    async fn check_id(&self, request: Message, interactive: bool) -> Result<OpenIdResponse, ProviderError> {
        let return_to = request.get("return_to");

        if let Err(err) = realm::validate(request.get("realm"), return_to) {
            tracing::warn!(realm = ?request.get("realm"), return_to = ?return_to, "{}", err);
            return Ok(OpenIdResponse::indirect_error(return_to, err.to_string()));
        }

        let ax = match request
            .extension(OPENID_AX_NS)
            .map(FetchRequest::from_extension)
            .transpose()
        {
            Ok(ax) => ax,
            Err(err) => return Ok(OpenIdResponse::indirect_error(return_to, err.to_string())),
        };

        let context = AuthContext {
            request,
            interactive,
            ax,
        };

        match self.hook.check_auth(interactive, context.clone()).await? {
            AuthDecision::Complete(authentication) => self.complete_auth(&context, authentication).await,
            AuthDecision::Reject => Ok(self.reject_auth(&context)),
            AuthDecision::Defer { location } => Ok(OpenIdResponse::Redirect { location }),
        }
    }

    /// Issue a signed positive assertion for a pending request
    pub async fn complete_auth(
        &self,
        context: &AuthContext,
        authentication: Authentication,
    ) -> Result<OpenIdResponse, ProviderError> {
        let request = &context.request;
        let Some(return_to) = context.return_to().filter(|r| parse_return_to(r).is_some()) else {
            return Ok(OpenIdResponse::BadRequest("Invalid return_to parameter".to_string()));
        };

        let nonce = Nonce::generate(self.config.nonce_expiry_secs);
        let identity_url = self.config.identity_url(&authentication.identity);

        let mut response = Message::new();
        response.insert("mode", "id_res");
        response.insert("op_endpoint", self.config.provider_endpoint.as_str());
        response.insert("claimed_id", identity_url.as_str());
        response.insert("identity", identity_url);
        response.insert("return_to", return_to);
        response.insert("response_nonce", nonce.id.as_str());

        if let Some(ax) = &context.ax {
            ax.write_response(authentication.ax.as_ref(), &mut response);
        }

        let association = self
            .resolve_association(request.get("assoc_handle"), &mut response)
            .await?;
        response.insert("assoc_handle", association.handle().as_str());

        let form = response.encode_direct(None);
        let sig = sign(association.algorithm(), association.secret(), form.body.as_bytes())?;
        response.insert("signed", form.fields.join(","));
        response.insert("sig", STANDARD.encode(sig));

        self.nonces.put(nonce).await?;

        tracing::info!(
            identity = %authentication.identity,
            handle = %association.handle().short(),
            private = association.is_private(),
            "Assertion issued"
        );

        Ok(OpenIdResponse::indirect(Some(return_to), &response))
    }

    /// Refuse a pending request: `cancel` for checkid_setup,
    /// `setup_needed` for checkid_immediate
    pub fn reject_auth(&self, context: &AuthContext) -> OpenIdResponse {
        let mode = if context.interactive {
            "cancel"
        } else {
            "setup_needed"
        };
        tracing::info!(mode, "Authentication rejected");

        let response: Message = [("mode", mode)].into_iter().collect();
        OpenIdResponse::indirect(context.return_to(), &response)
    }

    /// Reuse the relying party's association when it is still live,
    /// otherwise mint a private one. A stale handle is echoed back in
    /// `invalidate_handle`.
    async fn resolve_association(
        &self,
        requested: Option<&str>,
        response: &mut Message,
    ) -> Result<Association, ProviderError> {
        if let Some(requested) = requested {
            let handle = AssociationHandle::new(requested);
            match self.associations.get(&handle).await? {
                Some(association) if !association.is_expired() => return Ok(association),
                Some(_) => self.associations.delete(&handle).await?,
                None => {}
            }
            response.insert("invalidate_handle", requested);
        }

        let assoc_type = AssociationType::HmacSha256;
        let association = Association::new(
            assoc_type,
            generate_mac_key(assoc_type),
            self.config.association_expiry_secs,
            true,
        )?;
        self.associations.put(association.clone()).await?;
        Ok(association)
    }

    /// Drop expired associations and nonces from both stores
    pub async fn sweep_expired(&self) -> Result<(usize, usize), ProviderError> {
        let associations = self.associations.cleanup_expired().await?;
        let nonces = self.nonces.cleanup_expired().await?;
        if associations + nonces > 0 {
            tracing::debug!(associations, nonces, "Swept expired entries");
        }
        Ok((associations, nonces))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ax::AttributeValue;
    use crate::response::DirectStatus;
    use lanthorn_core::{HashAlgorithm, MacKey, OPENID_NS};
    use lanthorn_crypto::dh::{decode_integer, encode_integer};
    use lanthorn_crypto::{digest, xor, DhKeyPair, DhParams};
    use num_bigint::BigUint;

    const RETURN_TO: &str = "http://rp.example/return?session=abc";
    const EMAIL: &str = "http://axschema.org/contact/email";

    struct FixedHook(AuthDecision);

    #[async_trait::async_trait]
    impl AuthHook for FixedHook {
        async fn check_auth(
            &self,
            _interactive: bool,
            _context: AuthContext,
        ) -> Result<AuthDecision, ProviderError> {
            Ok(self.0.clone())
        }
    }

    fn provider(decision: AuthDecision) -> Provider {
        Provider::new(
            ProviderConfig::with_endpoint("http://op.example/openid"),
            Arc::new(FixedHook(decision)),
        )
    }

    fn alice() -> AuthDecision {
        AuthDecision::Complete(Authentication::new("alice"))
    }

    fn params(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn checkid(mode: &str, extra: &[(&str, &str)]) -> Vec<(String, String)> {
        let mut p = params(&[
            ("openid.ns", OPENID_NS),
            ("openid.mode", mode),
            ("openid.return_to", RETURN_TO),
            ("openid.realm", "http://rp.example/"),
        ]);
        p.extend(params(extra));
        p
    }

    fn verify_signature(fields: &Message, key: &MacKey, algorithm: HashAlgorithm) -> bool {
        let signed: Vec<&str> = fields.get("signed").unwrap().split(',').collect();
        let form = fields.encode_direct(Some(signed.as_slice()));
        let expected = sign(algorithm, key, form.body.as_bytes()).unwrap();
        STANDARD.encode(expected) == fields.get("sig").unwrap()
    }

    #[tokio::test]
    async fn test_associate_then_assert_verifies_with_shared_secret() {
        let combos = [
            ("DH-SHA1", "HMAC-SHA1", HashAlgorithm::Sha1, false),
            ("DH-SHA256", "HMAC-SHA256", HashAlgorithm::Sha256, false),
            ("no-encryption", "HMAC-SHA1", HashAlgorithm::Sha1, true),
            ("no-encryption", "HMAC-SHA256", HashAlgorithm::Sha256, true),
        ];

        for (session_type, assoc_type, algorithm, secure) in combos {
            let op = provider(alice());
            let rp_keys = DhKeyPair::generate(&DhParams::default());
            let consumer_public = rp_keys.encoded_public_key();

            let mut request = params(&[
                ("openid.ns", OPENID_NS),
                ("openid.mode", "associate"),
                ("openid.session_type", session_type),
                ("openid.assoc_type", assoc_type),
            ]);
            if !secure {
                request.push(("openid.dh_consumer_public".into(), consumer_public));
            }

            let response = op
                .handle(&IncomingRequest::post("/", request).with_secure(secure))
                .await
                .unwrap();
            assert_eq!(response.status_code(), 200, "{} {}", session_type, assoc_type);
            let assoc = response.fields().unwrap();
            assert_eq!(assoc.get("session_type"), Some(session_type));
            assert_eq!(assoc.get("assoc_type"), Some(assoc_type));
            assert_eq!(assoc.get("expires_in"), Some("30"));

            let key = if secure {
                STANDARD.decode(assoc.get("mac_key").unwrap()).unwrap()
            } else {
                let server_public =
                    decode_integer(assoc.get("dh_server_public").unwrap()).unwrap();
                let shared = rp_keys.shared_secret(&server_public).unwrap();
                let enc = STANDARD.decode(assoc.get("enc_mac_key").unwrap()).unwrap();
                xor(&digest(algorithm, &shared), &enc).unwrap()
            };
            let key = MacKey::from_bytes(key);

            let handle = assoc.get("assoc_handle").unwrap();
            let redirect = op
                .handle(&IncomingRequest::get(
                    "/",
                    checkid("checkid_setup", &[("openid.assoc_handle", handle)]),
                ))
                .await
                .unwrap();
            assert_eq!(redirect.status_code(), 302);

            let fields = redirect.fields().unwrap();
            assert_eq!(fields.mode(), Some("id_res"));
            assert_eq!(fields.get("assoc_handle"), Some(handle));
            assert!(!fields.contains("invalidate_handle"));
            assert!(verify_signature(&fields, &key, algorithm));
        }
    }

    #[tokio::test]
    async fn test_assertion_fields_and_signed_list() {
        let op = provider(alice());
        let response = op
            .handle(&IncomingRequest::get("/", checkid("checkid_setup", &[])))
            .await
            .unwrap();

        let OpenIdResponse::Redirect { location } = &response else {
            panic!("expected redirect, got {:?}", response);
        };
        assert!(location.starts_with("http://rp.example/return?session=abc&openid.ns="));

        let fields = response.fields().unwrap();
        let identity = "http://op.example/openid?u=alice";
        assert_eq!(fields.get("claimed_id"), Some(identity));
        assert_eq!(fields.get("identity"), Some(identity));
        assert_eq!(fields.get("op_endpoint"), Some("http://op.example/openid"));
        assert_eq!(fields.get("return_to"), Some(RETURN_TO));

        let signed: Vec<&str> = fields.get("signed").unwrap().split(',').collect();
        for required in [
            "op_endpoint",
            "return_to",
            "response_nonce",
            "assoc_handle",
            "claimed_id",
            "identity",
        ] {
            assert!(signed.contains(&required), "{} not signed", required);
        }
        assert!(!signed.contains(&"sig"));
        assert!(!signed.contains(&"signed"));
    }

    #[tokio::test]
    async fn test_check_authentication_is_single_use() {
        let op = provider(alice());
        let redirect = op
            .handle(&IncomingRequest::get("/", checkid("checkid_setup", &[])))
            .await
            .unwrap();

        let mut verify = redirect.fields().unwrap();
        verify.insert("mode", "check_authentication");
        let request = IncomingRequest::post("/", verify.to_query_pairs());

        let first = op.handle(&request).await.unwrap();
        assert_eq!(first.fields().unwrap().get("is_valid"), Some("true"));

        let replay = op.handle(&request).await.unwrap();
        assert_eq!(replay.status_code(), 200);
        assert_eq!(replay.fields().unwrap().get("is_valid"), Some("false"));
    }

    #[tokio::test]
    async fn test_check_authentication_rejects_tampering_and_unknown_nonce() {
        let op = provider(alice());
        let redirect = op
            .handle(&IncomingRequest::get("/", checkid("checkid_setup", &[])))
            .await
            .unwrap();

        let mut tampered = redirect.fields().unwrap();
        tampered.insert("mode", "check_authentication");
        tampered.insert("identity", "http://op.example/openid?u=mallory");
        let response = op
            .handle(&IncomingRequest::post("/", tampered.to_query_pairs()))
            .await
            .unwrap();
        assert_eq!(response.fields().unwrap().get("is_valid"), Some("false"));

        let mut unknown = redirect.fields().unwrap();
        unknown.insert("mode", "check_authentication");
        unknown.insert("response_nonce", "2024-01-01T00:00:00Zdeadbeef");
        let response = op
            .handle(&IncomingRequest::post("/", unknown.to_query_pairs()))
            .await
            .unwrap();
        assert_eq!(response.fields().unwrap().get("is_valid"), Some("false"));

        let missing = params(&[("openid.ns", OPENID_NS), ("openid.mode", "check_authentication")]);
        let response = op.handle(&IncomingRequest::post("/", missing)).await.unwrap();
        assert_eq!(response.fields().unwrap().get("is_valid"), Some("false"));
    }

    #[tokio::test]
    async fn test_check_authentication_refuses_shared_association() {
        let op = provider(alice());
        let assoc = op
            .handle(
                &IncomingRequest::post(
                    "/",
                    params(&[
                        ("openid.ns", OPENID_NS),
                        ("openid.mode", "associate"),
                        ("openid.session_type", "no-encryption"),
                        ("openid.assoc_type", "HMAC-SHA256"),
                    ]),
                )
                .with_secure(true),
            )
            .await
            .unwrap()
            .fields()
            .unwrap();

        let redirect = op
            .handle(&IncomingRequest::get(
                "/",
                checkid(
                    "checkid_setup",
                    &[("openid.assoc_handle", assoc.get("assoc_handle").unwrap())],
                ),
            ))
            .await
            .unwrap();

        let mut verify = redirect.fields().unwrap();
        verify.insert("mode", "check_authentication");
        let response = op
            .handle(&IncomingRequest::post("/", verify.to_query_pairs()))
            .await
            .unwrap();
        assert_eq!(response.fields().unwrap().get("is_valid"), Some("false"));
    }

    #[tokio::test]
    async fn test_unknown_handle_is_invalidated() {
        let op = provider(alice());
        let response = op
            .handle(&IncomingRequest::get(
                "/",
                checkid("checkid_setup", &[("openid.assoc_handle", "stale")]),
            ))
            .await
            .unwrap();

        let fields = response.fields().unwrap();
        assert_eq!(fields.get("invalidate_handle"), Some("stale"));
        assert_ne!(fields.get("assoc_handle"), Some("stale"));
        assert!(fields.get("signed").unwrap().contains("invalidate_handle"));
    }

    #[tokio::test]
    async fn test_reject_modes() {
        let op = provider(AuthDecision::Reject);

        let setup = op
            .handle(&IncomingRequest::get("/", checkid("checkid_setup", &[])))
            .await
            .unwrap();
        assert_eq!(setup.fields().unwrap().mode(), Some("cancel"));

        let immediate = op
            .handle(&IncomingRequest::get("/", checkid("checkid_immediate", &[])))
            .await
            .unwrap();
        let fields = immediate.fields().unwrap();
        assert_eq!(fields.mode(), Some("setup_needed"));
        assert!(!fields.contains("sig"));
    }

    #[tokio::test]
    async fn test_realm_checks() {
        let op = provider(AuthDecision::Reject);

        let ok = params(&[
            ("openid.ns", OPENID_NS),
            ("openid.mode", "checkid_setup"),
            ("openid.realm", "http://localhost/"),
            ("openid.return_to", "http://localhost/here"),
        ]);
        let response = op.handle(&IncomingRequest::get("/", ok)).await.unwrap();
        assert_eq!(response.fields().unwrap().mode(), Some("cancel"));

        let evil = params(&[
            ("openid.ns", OPENID_NS),
            ("openid.mode", "checkid_setup"),
            ("openid.realm", "http://localhost/"),
            ("openid.return_to", "http://evil.example/"),
        ]);
        let response = op.handle(&IncomingRequest::get("/", evil)).await.unwrap();
        let fields = response.fields().unwrap();
        assert_eq!(fields.mode(), Some("error"));
        assert_eq!(
            fields.get("error"),
            Some("The return_to URL does not match the realm")
        );

        let neither = params(&[("openid.ns", OPENID_NS), ("openid.mode", "checkid_setup")]);
        let response = op.handle(&IncomingRequest::get("/", neither)).await.unwrap();
        assert_eq!(
            response,
            OpenIdResponse::BadRequest("Invalid return_to parameter".to_string())
        );
    }

    #[tokio::test]
    async fn test_deferred_context_completes_later() {
        let op = provider(AuthDecision::Defer {
            location: "/login?session=1".to_string(),
        });

        let response = op
            .handle(&IncomingRequest::post("/", checkid("checkid_setup", &[])))
            .await
            .unwrap();
        assert_eq!(
            response,
            OpenIdResponse::Redirect {
                location: "/login?session=1".to_string()
            }
        );

        let context = AuthContext {
            request: Message::from_parameters(checkid("checkid_setup", &[])),
            interactive: true,
            ax: None,
        };
        let parked = serde_json::to_string(&context).unwrap();
        let restored: AuthContext = serde_json::from_str(&parked).unwrap();
        assert_eq!(restored, context);

        let completed = op
            .complete_auth(&restored, Authentication::new("bob"))
            .await
            .unwrap();
        let fields = completed.fields().unwrap();
        assert_eq!(fields.mode(), Some("id_res"));
        assert_eq!(fields.get("identity"), Some("http://op.example/openid?u=bob"));
    }

    #[tokio::test]
    async fn test_attribute_exchange_mirrors_aliases() {
        let mut attributes = AttributeValues::new();
        attributes.insert(EMAIL.to_string(), AttributeValue::from("alice@example.com"));
        attributes.insert(
            "http://axschema.org/namePerson".to_string(),
            AttributeValue::from("Alice"),
        );
        let op = provider(AuthDecision::Complete(
            Authentication::new("alice").with_attributes(attributes),
        ));

        let request = checkid(
            "checkid_setup",
            &[
                ("openid.ns.ext1", OPENID_AX_NS),
                ("openid.ext1.mode", "fetch_request"),
                ("openid.ext1.type.mail", EMAIL),
                ("openid.ext1.required", "mail"),
            ],
        );
        let fields = op
            .handle(&IncomingRequest::get("/", request))
            .await
            .unwrap()
            .fields()
            .unwrap();

        assert_eq!(fields.get("ns.ext1"), Some(OPENID_AX_NS));
        assert_eq!(fields.get("ext1.mode"), Some("fetch_response"));
        assert_eq!(fields.get("ext1.type.mail"), Some(EMAIL));
        assert_eq!(fields.get("ext1.value.mail"), Some("alice@example.com"));
        assert!(!fields.iter().any(|(_, v)| v == "Alice"));
        assert!(fields.get("signed").unwrap().contains("ext1.value.mail"));
    }

    #[tokio::test]
    async fn test_store_request_is_rejected() {
        let op = provider(alice());
        let request = checkid(
            "checkid_setup",
            &[
                ("openid.ns.ax", OPENID_AX_NS),
                ("openid.ax.mode", "store_request"),
            ],
        );
        let fields = op
            .handle(&IncomingRequest::get("/", request))
            .await
            .unwrap()
            .fields()
            .unwrap();
        assert_eq!(fields.mode(), Some("error"));
        assert_eq!(fields.get("error"), Some("Unexpected attribute exchange mode"));
    }

    #[tokio::test]
    async fn test_no_encryption_requires_tls() {
        let op = provider(alice());
        let response = op
            .handle(&IncomingRequest::post(
                "/",
                params(&[
                    ("openid.ns", OPENID_NS),
                    ("openid.mode", "associate"),
                    ("openid.session_type", "no-encryption"),
                    ("openid.assoc_type", "HMAC-SHA256"),
                ]),
            ))
            .await
            .unwrap();

        let OpenIdResponse::Direct { status, .. } = &response else {
            panic!("expected direct response");
        };
        assert_eq!(*status, DirectStatus::BadRequest);
        let fields = response.fields().unwrap();
        assert_eq!(fields.get("error_code"), Some("unsupported-type"));
        assert_eq!(fields.get("session_type"), Some("DH-SHA256"));
        assert_eq!(fields.get("assoc_type"), Some("HMAC-SHA256"));
        assert!(!fields.contains("mac_key"));
    }

    #[tokio::test]
    async fn test_associate_rejections() {
        let op = provider(alice());
        let cases = [
            ("DH-MD5", "HMAC-SHA1", "Session type not recognised: DH-MD5"),
            ("DH-SHA1", "HMAC-MD5", "Association type not recognised: HMAC-MD5"),
        ];
        for (session_type, assoc_type, error) in cases {
            let response = op
                .handle(&IncomingRequest::post(
                    "/",
                    params(&[
                        ("openid.ns", OPENID_NS),
                        ("openid.mode", "associate"),
                        ("openid.session_type", session_type),
                        ("openid.assoc_type", assoc_type),
                    ]),
                ))
                .await
                .unwrap();
            assert_eq!(response.status_code(), 400);
            let fields = response.fields().unwrap();
            assert_eq!(fields.get("error"), Some(error));
            assert_eq!(fields.get("error_code"), Some("unsupported-type"));
        }

        let response = op
            .handle(&IncomingRequest::post(
                "/",
                params(&[
                    ("openid.ns", OPENID_NS),
                    ("openid.mode", "associate"),
                    ("openid.session_type", "DH-SHA256"),
                    ("openid.assoc_type", "HMAC-SHA256"),
                    ("openid.dh_consumer_public", "!!not base64!!"),
                ]),
            ))
            .await
            .unwrap();
        assert_eq!(response.status_code(), 400);
        assert_eq!(
            response.fields().unwrap().get("error"),
            Some("Invalid Diffie-Hellman parameters")
        );
    }

    #[tokio::test]
    async fn test_discovery() {
        let op = provider(alice());

        let server = op
            .handle(&IncomingRequest::get("/", vec![]).with_accept("application/xrds+xml"))
            .await
            .unwrap();
        let OpenIdResponse::Document { content_type, body } = server else {
            panic!("expected document");
        };
        assert_eq!(content_type, discovery::XRDS_CONTENT_TYPE);
        assert!(body.contains("http://specs.openid.net/auth/2.0/server"));

        let signon = op
            .handle(
                &IncomingRequest::get("/", params(&[("u", "alice")]))
                    .with_accept("application/xrds+xml"),
            )
            .await
            .unwrap();
        let OpenIdResponse::Document { body, .. } = signon else {
            panic!("expected document");
        };
        assert!(body.contains("http://specs.openid.net/auth/2.0/signon"));
        assert!(body.contains("http://op.example/openid?u=alice"));

        let refused = op
            .handle(&IncomingRequest::get("/", vec![]).with_accept("image/png"))
            .await
            .unwrap();
        assert_eq!(refused, OpenIdResponse::NotAcceptable);
        assert_eq!(refused.status_code(), 406);
    }

    #[tokio::test]
    async fn test_dispatch_fallbacks() {
        let op = provider(alice());

        let unknown_direct = op
            .handle(&IncomingRequest::post(
                "/",
                params(&[("openid.ns", OPENID_NS), ("openid.mode", "bogus")]),
            ))
            .await
            .unwrap();
        assert_eq!(unknown_direct.status_code(), 400);
        assert_eq!(
            unknown_direct.fields().unwrap().get("error"),
            Some("Unknown or unsupported direct request")
        );

        let unknown_indirect = op
            .handle(&IncomingRequest::get(
                "/",
                params(&[
                    ("openid.ns", OPENID_NS),
                    ("openid.mode", "associate"),
                    ("openid.return_to", RETURN_TO),
                ]),
            ))
            .await
            .unwrap();
        assert_eq!(unknown_indirect.fields().unwrap().mode(), Some("error"));

        let foreign = op
            .handle(&IncomingRequest::post("/", params(&[("openid.mode", "associate")])))
            .await
            .unwrap();
        assert_eq!(foreign, OpenIdResponse::PassThrough);

        let elsewhere = op
            .handle(&IncomingRequest::get("/other", vec![]))
            .await
            .unwrap();
        assert_eq!(elsewhere, OpenIdResponse::PassThrough);
    }

    #[tokio::test]
    async fn test_sweep_expired() {
        let config = ProviderConfig {
            association_expiry_secs: -1,
            nonce_expiry_secs: -1,
            ..ProviderConfig::with_endpoint("http://op.example/openid")
        };
        let op = Provider::new(config, Arc::new(FixedHook(alice())));
        op.handle(&IncomingRequest::get("/", checkid("checkid_setup", &[])))
            .await
            .unwrap();

        let (associations, nonces) = op.sweep_expired().await.unwrap();
        assert_eq!(associations, 1);
        assert_eq!(nonces, 1);
    }

    fn expiring_provider(store: Arc<InMemoryAssociationStore>) -> Provider {
        let config = ProviderConfig {
            association_expiry_secs: -1,
            ..ProviderConfig::with_endpoint("http://op.example/openid")
        };
        Provider::new(config, Arc::new(FixedHook(alice()))).with_association_store(store)
    }

    #[tokio::test]
    async fn test_check_authentication_drops_expired_private_association() {
        let store = Arc::new(InMemoryAssociationStore::new());
        let op = expiring_provider(store.clone());

        let redirect = op
            .handle(&IncomingRequest::get("/", checkid("checkid_setup", &[])))
            .await
            .unwrap();
        assert_eq!(store.len(), 1);

        let mut verify = redirect.fields().unwrap();
        verify.insert("mode", "check_authentication");
        let response = op
            .handle(&IncomingRequest::post("/", verify.to_query_pairs()))
            .await
            .unwrap();

        assert_eq!(response.fields().unwrap().get("is_valid"), Some("false"));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_expired_handle_is_replaced_and_invalidated() {
        let store = Arc::new(InMemoryAssociationStore::new());
        let op = expiring_provider(store.clone());

        let assoc = op
            .handle(
                &IncomingRequest::post(
                    "/",
                    params(&[
                        ("openid.ns", OPENID_NS),
                        ("openid.mode", "associate"),
                        ("openid.session_type", "no-encryption"),
                        ("openid.assoc_type", "HMAC-SHA1"),
                    ]),
                )
                .with_secure(true),
            )
            .await
            .unwrap()
            .fields()
            .unwrap();
        let stale = assoc.get("assoc_handle").unwrap().to_string();

        let fields = op
            .handle(&IncomingRequest::get(
                "/",
                checkid("checkid_setup", &[("openid.assoc_handle", stale.as_str())]),
            ))
            .await
            .unwrap()
            .fields()
            .unwrap();

        assert_eq!(fields.get("invalidate_handle"), Some(stale.as_str()));
        let fresh = fields.get("assoc_handle").unwrap();
        assert_ne!(fresh, stale.as_str());

        assert!(store.get(&AssociationHandle::new(stale.as_str())).await.unwrap().is_none());
        let replacement = store.get(&AssociationHandle::new(fresh)).await.unwrap().unwrap();
        assert!(replacement.is_private());
        assert_eq!(replacement.assoc_type(), AssociationType::HmacSha256);
        assert!(verify_signature(&fields, replacement.secret(), HashAlgorithm::Sha256));
    }

    #[tokio::test]
    async fn test_associate_with_custom_group() {
        let op = provider(alice());
        let group = DhParams {
            modulus: BigUint::from(0xFFFF_FFFBu32),
            generator: BigUint::from(5u32),
        };
        let rp_keys = DhKeyPair::generate(&group);
        let modulus = encode_integer(&group.modulus);
        let generator = encode_integer(&group.generator);
        let consumer_public = rp_keys.encoded_public_key();

        let request = params(&[
            ("openid.ns", OPENID_NS),
            ("openid.mode", "associate"),
            ("openid.session_type", "DH-SHA1"),
            ("openid.assoc_type", "HMAC-SHA1"),
            ("openid.dh_modulus", modulus.as_str()),
            ("openid.dh_gen", generator.as_str()),
            ("openid.dh_consumer_public", consumer_public.as_str()),
        ]);
        let assoc = op
            .handle(&IncomingRequest::post("/", request))
            .await
            .unwrap();
        assert_eq!(assoc.status_code(), 200);
        let assoc = assoc.fields().unwrap();

        let server_public = decode_integer(assoc.get("dh_server_public").unwrap()).unwrap();
        assert!(server_public < group.modulus);
        let shared = rp_keys.shared_secret(&server_public).unwrap();
        let enc = STANDARD.decode(assoc.get("enc_mac_key").unwrap()).unwrap();
        let key = MacKey::from_bytes(xor(&digest(HashAlgorithm::Sha1, &shared), &enc).unwrap());
        assert_eq!(key.len(), 20);

        let handle = assoc.get("assoc_handle").unwrap();
        let fields = op
            .handle(&IncomingRequest::get(
                "/",
                checkid("checkid_setup", &[("openid.assoc_handle", handle)]),
            ))
            .await
            .unwrap()
            .fields()
            .unwrap();
        assert_eq!(fields.get("assoc_handle"), Some(handle));
        assert!(verify_signature(&fields, &key, HashAlgorithm::Sha1));
    }

    #[tokio::test]
    async fn test_associate_rejects_oversized_modulus() {
        let op = provider(alice());
        let oversized = BigUint::from(1u32) << (lanthorn_crypto::MAX_MODULUS_BITS + 64);
        let modulus = encode_integer(&(oversized + 1u32));
        let consumer_public = DhKeyPair::generate(&DhParams::default()).encoded_public_key();

        let request = params(&[
            ("openid.ns", OPENID_NS),
            ("openid.mode", "associate"),
            ("openid.session_type", "DH-SHA256"),
            ("openid.assoc_type", "HMAC-SHA256"),
            ("openid.dh_modulus", modulus.as_str()),
            ("openid.dh_consumer_public", consumer_public.as_str()),
        ]);
        let response = op
            .handle(&IncomingRequest::post("/", request))
            .await
            .unwrap();

        assert_eq!(response.status_code(), 400);
        assert_eq!(
            response.fields().unwrap().get("error"),
            Some("Invalid Diffie-Hellman parameters")
        );
    }
}
