pub mod health;

use axum::{
    routing::{get, post},
    Router,
};

use crate::interview::handlers;
use crate::state::AppState;
use crate::streaming::ws;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // Session API
        .route("/api/v1/sessions", post(handlers::handle_create_session))
        .route("/api/v1/sessions/:id", get(handlers::handle_get_session))
        .route(
            "/api/v1/sessions/:id/next-question",
            post(handlers::handle_next_question),
        )
        .route("/api/v1/sessions/:id/answer", post(handlers::handle_answer))
        .route(
            "/api/v1/sessions/:id/feedback",
            post(handlers::handle_feedback),
        )
        // Real-time streaming relay
        .route("/ws/interview", get(ws::handle_ws_upgrade))
        .with_state(state)
}
