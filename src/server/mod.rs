//! Thin axum exposure for the two HTTP surfaces the core names as
//! "Exposed": chat SSE and health. Grounded in the pack's own
//! axum-service idiom (`querymt-service`'s `main.rs`): `tracing`/
//! `tracing-subscriber` for request logging, `axum::response::sse` for
//! streaming, `tower_http` for CORS.

pub mod chat_handler;
pub mod health_handler;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::worker::HealthTracker;

#[derive(Clone)]
pub struct ServerState {
    pub health: Arc<HealthTracker>,
    pub chat: Arc<chat_handler::ChatService>,
}

pub fn build_router(state: ServerState) -> Router {
    Router::new()
        .route("/health", get(health_handler::health))
        .route("/chat", post(chat_handler::chat))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
