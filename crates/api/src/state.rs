use std::sync::Arc;

use shopfront_persistence::LayoutStore;

use crate::config::ServerConfig;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// Cheaply cloneable; everything lives behind `Arc`.
#[derive(Clone)]
pub struct AppState {
    /// Where page layouts are persisted (PostgreSQL or in-memory).
    pub store: Arc<dyn LayoutStore>,
    pub config: Arc<ServerConfig>,
}
