use std::sync::Arc;

use crate::config::ServerConfig;
use crate::lifecycle::PreProjectLifecycle;
use crate::ws::WsManager;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// This is cheaply cloneable (inner data is behind `Arc` or is already `Clone`).
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool.
    pub pool: capstone_db::DbPool,
    /// Server configuration (accessed by middleware and handlers).
    pub config: Arc<ServerConfig>,
    /// WebSocket connection manager (browser clients).
    pub ws_manager: Arc<WsManager>,
    /// Pre-project lifecycle coordinator and its collaborators.
    pub lifecycle: Arc<PreProjectLifecycle>,
}
