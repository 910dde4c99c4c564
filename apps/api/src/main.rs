mod config;
mod errors;
mod interview;
mod knowledge;
mod models;
mod routes;
mod state;
mod streaming;

use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Config;
use crate::interview::evaluator::LengthHeuristicEvaluator;
use crate::interview::selector::UniformRandomPicker;
use crate::interview::store::SessionStore;
use crate::knowledge::KnowledgeBase;
use crate::routes::build_router;
use crate::state::AppState;
use crate::streaming::gateway::StreamGateway;
use crate::streaming::upstream::OpenAiStreamClient;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails fast on a missing API key)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_PKG_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Parley API v{}", env!("CARGO_PKG_VERSION"));

    // Load the knowledge base (embedded question sets, rubrics, templates)
    let knowledge = Arc::new(KnowledgeBase::load());

    // Session engine: length-heuristic evaluator (placeholder scorer) and
    // uniform random question selection, both swappable here.
    let evaluator = Arc::new(LengthHeuristicEvaluator {
        excellent_threshold: config.eval_excellent_threshold,
        average_threshold: config.eval_average_threshold,
    });
    let sessions = Arc::new(SessionStore::new(
        knowledge,
        evaluator,
        Arc::new(UniformRandomPicker),
    ));
    info!("Session store initialized");

    // Streaming gateway over the OpenAI-compatible upstream
    let upstream = Arc::new(OpenAiStreamClient::new(&config));
    let gateway = StreamGateway::new(upstream);
    info!("Streaming gateway initialized (model: {})", config.openai_model);

    let state = AppState {
        sessions,
        gateway,
        config: config.clone(),
    };

    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive()); // TODO: tighten CORS in production

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
