//! mavtak API - JSON status surface for the MAVLink to CoT bridge
//!
//! Serves counters, tracked vehicles, the effective configuration and the
//! debug log to a presentation layer, plus Prometheus metrics. Bridge
//! settings can be changed at runtime through `PUT /api/v1/config`.
//!
//! # Example
//!
//! ```no_run
//! use mavtak_api::{serve, ApiState};
//! use mavtak_bridge::BridgeContext;
//! use mavtak_core::AppConfig;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = AppConfig::default();
//!     let state = ApiState::new(Arc::new(BridgeContext::new()), config.clone());
//!     serve(&config.api.bind_address(), state, std::future::pending()).await
//! }
//! ```

pub mod rest;
pub mod types;

pub use rest::{create_rest_router, ApiError, ApiState};

use axum::Router;
use std::future::Future;
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

/// Full application router with tracing and CORS layers
pub fn create_router(state: ApiState) -> Router {
    create_rest_router(state).layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(cors_layer()),
    )
}

pub fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            axum::http::Method::GET,
            axum::http::Method::POST,
            axum::http::Method::PUT,
        ])
        .allow_headers([axum::http::header::CONTENT_TYPE])
        .max_age(Duration::from_secs(3600))
}

/// Serves the API on `bind_addr` until `shutdown` resolves
pub async fn serve<F>(bind_addr: &str, state: ApiState, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    let local_addr = listener.local_addr()?;
    info!(address = %local_addr, "Status API listening");

    axum::serve(listener, create_router(state))
        .with_graceful_shutdown(shutdown)
        .await?;

    info!("Status API stopped");
    Ok(())
}
