//! Test utilities for integration tests

use axum::{
    body::Body,
    http::{header, Request, Response},
    Router,
};
use lanthorn_openid::ProviderConfig;
use lanthorn_server::{settings::Settings, state::AppState};
use tower::ServiceExt;

pub const ENDPOINT: &str = "http://localhost:8080/openid";
pub const OPENID_NS: &str = "http://specs.openid.net/auth/2.0";

/// Test application wrapper
pub struct TestApp {
    router: Router,
    pub state: AppState,
}

impl TestApp {
    /// Create a new test application with in-memory storage
    pub fn new() -> Self {
        Self::with_settings(Settings::default())
    }

    /// Create a test application from custom settings, served at [`ENDPOINT`]
    pub fn with_settings(settings: Settings) -> Self {
        let settings = Settings {
            provider: ProviderConfig::with_endpoint(ENDPOINT),
            ..settings
        };
        let state = AppState::new(&settings);
        let router = lanthorn_server::create_router(state.clone());

        Self { router, state }
    }

    /// Get the router for making requests
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub async fn get(&self, uri: &str) -> Response<Body> {
        self.router()
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap()
    }

    pub async fn post_form(&self, uri: &str, params: &[(&str, &str)]) -> Response<Body> {
        self.router()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(uri)
                    .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                    .body(Body::from(encode(params)))
                    .unwrap(),
            )
            .await
            .unwrap()
    }
}

pub fn encode(params: &[(&str, &str)]) -> String {
    url::form_urlencoded::Serializer::new(String::new())
        .extend_pairs(params)
        .finish()
}

pub async fn body_string(response: Response<Body>) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

pub fn location(response: &Response<Body>) -> String {
    response
        .headers()
        .get(header::LOCATION)
        .unwrap()
        .to_str()
        .unwrap()
        .to_string()
}

/// `openid.`-prefixed query parameters of a redirect, prefix removed
pub fn openid_fields(location: &str) -> Vec<(String, String)> {
    let url = url::Url::parse(location).unwrap();
    url.query_pairs()
        .filter_map(|(k, v)| k.strip_prefix("openid.").map(|k| (k.to_string(), v.into_owned())))
        .collect()
}

pub fn field<'a>(fields: &'a [(String, String)], name: &str) -> Option<&'a str> {
    fields
        .iter()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.as_str())
}
