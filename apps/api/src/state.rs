use std::sync::Arc;

use crate::config::Config;
use crate::interview::store::SessionStore;
use crate::streaming::gateway::StreamGateway;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    /// Process-wide registry of active interview sessions.
    pub sessions: Arc<SessionStore>,
    /// Streaming gateway. One live upstream generation per connection.
    pub gateway: StreamGateway,
    /// Runtime configuration, kept for handlers that need it.
    #[allow(dead_code)]
    pub config: Config,
}
