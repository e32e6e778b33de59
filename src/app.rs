/*
 * Responsibility
 * - Load config -> build dependencies -> assemble the Router
 * - Middleware order: transport (http) -> security headers -> security chain -> handlers
 * - Start with axum::serve()
 */
use std::{panic, process, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use axum::Router;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::api;
use crate::config::Config;
use crate::middleware;
use crate::services::auth::{build_access_verifier, build_oidc_client};
use crate::services::cache::{CacheClient, MemoryClient, ValkeyClient};
use crate::state::AppState;

const IDP_HTTP_TIMEOUT: Duration = Duration::from_secs(10);

fn init_tracing() {
    // RUST_LOG wins when set, e.g.
    // RUST_LOG=info,user_gateway=debug,tower_http=debug cargo run
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,tower_http=info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn init_panic_hook(abort_on_panic: bool) {
    let default_hook = panic::take_hook();

    panic::set_hook(Box::new(move |info| {
        tracing::error!(?info, "panic");

        // Development fails fast; production keeps serving other requests.
        if abort_on_panic {
            process::abort();
        } else {
            default_hook(info);
        }
    }))
}

pub async fn run() -> Result<()> {
    init_tracing();
    let config = Config::from_env()?;
    init_panic_hook(!config.app_env.is_production());

    tracing::info!(
        "starting gateway in {:?} mode on {} (backend {})",
        config.app_env,
        config.addr,
        config.user_service_url
    );

    let state = build_state(&config).await?;
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(config.addr)
        .await
        .with_context(|| format!("binding {}", config.addr))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn build_state(config: &Config) -> Result<AppState> {
    let idp_http = reqwest::Client::builder()
        .timeout(IDP_HTTP_TIMEOUT)
        .build()?;
    let oidc = build_oidc_client(config, idp_http).await?;

    let access_verifier = build_access_verifier(config).map_err(anyhow::Error::msg)?;
    if access_verifier.is_none() {
        tracing::info!("AUTH_JWT_PUBLIC_KEY_PEM not set; bearer tokens are ignored");
    }

    let cache: Arc<dyn CacheClient> = match config.valkey_url.as_deref() {
        Some(url) => Arc::new(ValkeyClient::new(url).await?),
        None => {
            tracing::warn!("VALKEY_URL not set; sessions are kept in process memory");
            Arc::new(MemoryClient::new())
        }
    };
    tracing::info!(backend = cache.backend_name(), "session store ready");

    Ok(AppState::new(config, oidc, cache, access_verifier)?)
}

/// Assemble the full gateway (routes, security chain, transport layers).
pub fn build_router(state: AppState) -> Router {
    let hsts = state.security.secure_cookies;
    let backend_timeout = state.users.timeout();

    let router = middleware::chain::apply(api::routes(), &state).with_state(state);
    let router = middleware::security_headers::apply(router, hsts);
    middleware::http::apply(router, backend_timeout)
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}
