//! Application state

use chrono::{DateTime, Duration, Utc};
use lanthorn_openid::{AuthContext, AuthDecision, AuthHook, Provider, ProviderError};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::settings::Settings;

/// How long a parked checkid request waits for the user
const LOGIN_SESSION_MINUTES: i64 = 5;

/// A checkid request waiting on the login page
#[derive(Debug, Clone)]
pub struct PendingLogin {
    pub context: AuthContext,
    pub expires_at: DateTime<Utc>,
}

/// Parked authentication contexts, keyed by login session id
#[derive(Default)]
pub struct PendingLogins {
    sessions: RwLock<HashMap<String, PendingLogin>>,
}

impl PendingLogins {
    pub fn new() -> Self {
        Self::default()
    }

    /// Park a context and return its session id
    pub async fn park(&self, context: AuthContext) -> String {
        let id = uuid::Uuid::new_v4().simple().to_string();
        let pending = PendingLogin {
            context,
            expires_at: Utc::now() + Duration::minutes(LOGIN_SESSION_MINUTES),
        };

        let mut sessions = self.sessions.write().await;
        sessions.insert(id.clone(), pending);
        id
    }

    /// Look at a pending context without consuming it
    pub async fn get(&self, id: &str) -> Option<AuthContext> {
        let sessions = self.sessions.read().await;
        sessions
            .get(id)
            .filter(|p| p.expires_at > Utc::now())
            .map(|p| p.context.clone())
    }

    /// Remove and return a pending context
    pub async fn take(&self, id: &str) -> Option<AuthContext> {
        let mut sessions = self.sessions.write().await;
        sessions
            .remove(id)
            .filter(|p| p.expires_at > Utc::now())
            .map(|p| p.context)
    }

    /// Drop abandoned logins
    pub async fn cleanup(&self) -> usize {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        let now = Utc::now();
        sessions.retain(|_, p| p.expires_at > now);
        before - sessions.len()
    }
}

/// Authentication hook backed by the demo login page
///
/// `checkid_setup` is parked and the browser sent to `/login`;
/// `checkid_immediate` cannot show a page and is refused.
pub struct LoginPageHook {
    sessions: Arc<PendingLogins>,
}

impl LoginPageHook {
    pub fn new(sessions: Arc<PendingLogins>) -> Self {
        Self { sessions }
    }
}

#[async_trait::async_trait]
impl AuthHook for LoginPageHook {
    async fn check_auth(
        &self,
        interactive: bool,
        context: AuthContext,
    ) -> Result<AuthDecision, ProviderError> {
        if !interactive {
            return Ok(AuthDecision::Reject);
        }

        let session = self.sessions.park(context).await;
        tracing::debug!(session = %session, "Parked checkid_setup for login");
        Ok(AuthDecision::Defer {
            location: format!("/login?session={}", session),
        })
    }
}

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// OpenID protocol engine
    pub provider: Arc<Provider>,

    /// Requests waiting on the login page
    pub sessions: Arc<PendingLogins>,

    /// Path the provider is mounted at
    pub mount: String,

    /// Honour `X-Forwarded-Proto` from a TLS-terminating proxy
    pub trust_proxy: bool,
}

impl AppState {
    pub fn new(settings: &Settings) -> Self {
        let sessions = Arc::new(PendingLogins::new());
        let hook = Arc::new(LoginPageHook::new(sessions.clone()));
        let provider = Provider::new(settings.provider.clone(), hook);

        Self {
            trust_proxy: settings.trust_proxy,
            provider: Arc::new(provider),
            sessions,
            mount: settings.mount.clone(),
        }
    }

    /// Whether a request reached us over TLS.
    ///
    /// The listener itself is plain TCP, so only a trusted proxy's
    /// `X-Forwarded-Proto: https` counts.
    pub fn is_secure(&self, headers: &axum::http::HeaderMap) -> bool {
        self.trust_proxy
            && headers
                .get("x-forwarded-proto")
                .and_then(|v| v.to_str().ok())
                .is_some_and(|proto| proto.trim().eq_ignore_ascii_case("https"))
    }

    /// Sweep expired associations, nonces and login sessions
    pub async fn sweep(&self) -> Result<(), ProviderError> {
        let (associations, nonces) = self.provider.sweep_expired().await?;
        let logins = self.sessions.cleanup().await;
        if associations + nonces + logins > 0 {
            tracing::info!(associations, nonces, logins, "Expired entries swept");
        }
        Ok(())
    }
}
