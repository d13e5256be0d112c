//! Lanthorn Server Library
//!
//! axum host for the Lanthorn OpenID provider. The library exposes the
//! router for integration testing while the binary handles startup.

pub mod login;
pub mod middleware;
pub mod routes;
pub mod settings;
pub mod state;

use axum::{
    middleware as axum_middleware,
    routing::{any, get},
    Router,
};
use tower_http::trace::TraceLayer;

use state::AppState;

/// Create the main router with all routes configured
pub fn create_router(state: AppState) -> Router {
    let mount = state.mount.clone();
    let nested = format!("{}/*rest", mount.trim_end_matches('/'));

    Router::new()
        // OpenID endpoint (discovery, direct and indirect requests)
        .route(&mount, any(routes::openid))
        .route(&nested, any(routes::openid))
        // Demo login page for parked checkid_setup requests
        .route("/login", get(login::login_page).post(login::login_submit))
        // Health check
        .route("/health", get(routes::health))
        .with_state(state)
        .layer(axum_middleware::from_fn(
            middleware::security_headers_middleware,
        ))
        .layer(TraceLayer::new_for_http())
}
