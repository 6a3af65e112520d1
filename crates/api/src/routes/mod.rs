pub mod health;
pub mod pages;

use axum::Router;

use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// Route hierarchy:
///
/// ```text
/// /pages/{page_id}/layout                          get (public), put (owner)
/// /pages/{page_id}/blocks                          mapped blocks (public)
/// /pages/{page_id}/render                          read-only layouts (POST, public)
/// /pages/{page_id}/changes                         audit trail (owner)
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new().nest("/pages", pages::router())
}
