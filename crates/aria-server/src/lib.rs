//! ARIA voice gateway library logic.

pub mod api;
pub mod api_voice;
pub mod background;
pub mod config;
pub mod registry;
pub mod services;
pub mod session;

use axum::{
    extract::DefaultBodyLimit,
    http::{HeaderValue, Method},
    routing::{get, post},
    Extension, Router,
};
use registry::ConnectionRegistry;
use services::VoiceServices;
use std::sync::Arc;
use tower_http::cors::{AllowHeaders, CorsLayer};
use tower_http::trace::TraceLayer;

/// Application state shared across all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// Provider clients and history store handed to every session.
    pub services: Arc<VoiceServices>,
    /// Open voice connections.
    pub registry: ConnectionRegistry,
    /// Browser origin allowed by CORS.
    pub cors_allowed_origin: String,
}

impl AppState {
    pub fn new(services: VoiceServices, cors_allowed_origin: impl Into<String>) -> Self {
        Self {
            services: Arc::new(services),
            registry: ConnectionRegistry::new(),
            cors_allowed_origin: cors_allowed_origin.into(),
        }
    }
}

/// Maximum request body size for the plain HTTP routes (1 MiB).
const MAX_REQUEST_BODY_BYTES: usize = 1024 * 1024;

fn cors_layer(origin: &str) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true);

    match HeaderValue::from_str(origin) {
        Ok(value) => layer.allow_origin(value),
        Err(e) => {
            tracing::warn!(origin, error = %e, "invalid CORS origin, cross-origin requests will be refused");
            layer
        }
    }
}

/// Builds the application router with all routes.
pub fn app(state: AppState) -> Router {
    let cors = cors_layer(&state.cors_allowed_origin);

    Router::new()
        .route("/", get(api::root_handler))
        .route("/health", get(api::health_handler))
        .route("/chat", post(api::chat_handler))
        .route("/voice/test-tts", post(api_voice::test_tts_handler))
        .route("/voice/stream", get(api_voice::voice_stream_handler))
        .layer(DefaultBodyLimit::max(MAX_REQUEST_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(Extension(Arc::new(state)))
}
