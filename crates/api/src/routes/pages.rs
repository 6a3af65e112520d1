//! Route definitions for page layouts, mounted at `/pages`.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::pages;
use crate::state::AppState;

/// ```text
/// GET    /{page_id}/layout   -> get_layout
/// PUT    /{page_id}/layout   -> save_layout
/// GET    /{page_id}/blocks   -> get_blocks
/// POST   /{page_id}/render   -> render
/// GET    /{page_id}/changes  -> list_changes
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/{page_id}/layout",
            get(pages::get_layout).put(pages::save_layout),
        )
        .route("/{page_id}/blocks", get(pages::get_blocks))
        .route("/{page_id}/render", post(pages::render))
        .route("/{page_id}/changes", get(pages::list_changes))
}
