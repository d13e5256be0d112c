//! Lanthorn Server
//!
//! HTTP server for the Lanthorn OpenID provider.

use anyhow::Context;
use lanthorn_server::{create_router, settings::Settings, state::AppState};
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| {
                "lanthorn_server=debug,lanthorn_openid=debug,tower_http=debug".into()
            }),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let settings = Settings::load().context("failed to load settings")?;
    let state = AppState::new(&settings);

    if settings.sweep_interval_secs > 0 {
        let sweeper = state.clone();
        let period = Duration::from_secs(settings.sweep_interval_secs);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                if let Err(err) = sweeper.sweep().await {
                    tracing::error!(error = %err, "Expiry sweep failed");
                }
            }
        });
    }

    let app = create_router(state);

    tracing::info!(
        "Starting Lanthorn server on {} (endpoint {})",
        settings.bind,
        settings.provider.provider_endpoint
    );

    let listener = tokio::net::TcpListener::bind(&settings.bind)
        .await
        .with_context(|| format!("failed to bind {}", settings.bind))?;
    axum::serve(listener, app).await.context("server error")?;

    Ok(())
}
