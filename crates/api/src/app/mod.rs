//! HTTP API application wiring (Axum router + service wiring).
//!
//! - `services.rs`: store, bus and dispatcher wiring
//! - `routes/`: HTTP routes + handlers
//! - `errors.rs`: consistent error responses
//! - `extract.rs`: JSON bodies with field-level rejections

use std::sync::Arc;

use axum::{Extension, Router, routing::get};
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use crate::config::AppConfig;

pub mod errors;
pub mod extract;
pub mod routes;
pub mod services;

pub use services::{AppServices, build_services};

/// Router over already-built services.
pub fn router(services: Arc<AppServices>) -> Router {
    Router::new()
        .route("/health", get(routes::system::health))
        .nest("/products/products", routes::products::router())
        .layer(Extension(services))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
}

/// Build services from `config` and the full HTTP router on top of them.
pub async fn build_app(config: &AppConfig) -> anyhow::Result<Router> {
    let services = Arc::new(build_services(config).await?);
    Ok(router(services))
}
