//! Handlers for page layouts: the storage endpoint, the mapped block view,
//! read-only rendering and the change-log audit trail.

use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};
use shopfront_core::block::Block;
use shopfront_core::error::CoreError;
use shopfront_core::legacy::{load_layout, LegacyLayout, LegacyMappingError};
use shopfront_core::product::Product;
use shopfront_core::reorder::ChangeLogEntry;
use shopfront_core::render::{render_page, BlockLayout};
use shopfront_core::types::{PageId, VersionStamp};
use shopfront_persistence::{SaveRequest, SaveSource};

use crate::error::AppResult;
use crate::middleware::auth::AuthUser;
use crate::query::LimitParams;
use crate::response::DataResponse;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Payloads
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct LayoutResponse {
    pub page_id: PageId,
    pub version: VersionStamp,
    pub rows: LegacyLayout,
}

/// Body of `PUT /pages/{page_id}/layout`.
#[derive(Debug, Deserialize)]
pub struct SaveLayoutBody {
    pub rows: LegacyLayout,
    /// Version the rows were derived from; `0` creates the page.
    pub expected_version: VersionStamp,
    #[serde(default)]
    pub change_log: Vec<ChangeLogEntry>,
    /// Defaults to `manual`.
    #[serde(default)]
    pub source: Option<SaveSource>,
}

#[derive(Debug, Serialize)]
pub struct SavedLayout {
    pub page_id: PageId,
    pub version: VersionStamp,
}

#[derive(Debug, Serialize)]
pub struct BlocksResponse {
    pub page_id: PageId,
    pub version: VersionStamp,
    pub blocks: Vec<Block>,
    /// Rows left out because they could not be mapped.
    pub errors: Vec<LegacyMappingError>,
    pub complete: bool,
}

/// Body of `POST /pages/{page_id}/render`.
#[derive(Debug, Deserialize)]
pub struct RenderBody {
    #[serde(default)]
    pub products: Vec<Product>,
}

#[derive(Debug, Serialize)]
pub struct RenderResponse {
    pub page_id: PageId,
    pub version: VersionStamp,
    pub layouts: Vec<BlockLayout>,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// GET /api/v1/pages/{page_id}/layout
///
/// Raw legacy rows and the version stamp to save against.
pub async fn get_layout(
    State(state): State<AppState>,
    Path(page_id): Path<PageId>,
) -> AppResult<impl IntoResponse> {
    let stored = state.store.load(page_id).await?;

    Ok(Json(DataResponse {
        data: LayoutResponse {
            page_id,
            version: stored.version,
            rows: stored.rows,
        },
    }))
}

/// PUT /api/v1/pages/{page_id}/layout
///
/// Compare-and-swap save. Rows that do not map onto the block model are
/// rejected so the stored page always loads completely.
pub async fn save_layout(
    user: AuthUser,
    State(state): State<AppState>,
    Path(page_id): Path<PageId>,
    Json(body): Json<SaveLayoutBody>,
) -> AppResult<impl IntoResponse> {
    user.authorize_page(state.store.as_ref(), page_id).await?;

    if let Some(first) = load_layout(&body.rows).errors.into_iter().next() {
        return Err(CoreError::from(first).into());
    }

    let source = body.source.unwrap_or(SaveSource::Manual);
    let changes = body.change_log.len();
    let request = SaveRequest {
        rows: body.rows,
        change_log: body.change_log,
        expected_version: body.expected_version,
        source,
        actor_id: user.user_id,
    };
    let version = state.store.save(page_id, request).await?;

    tracing::info!(
        page_id,
        version,
        source = %source,
        changes,
        user_id = user.user_id,
        "Page layout saved",
    );

    Ok(Json(DataResponse {
        data: SavedLayout { page_id, version },
    }))
}

/// GET /api/v1/pages/{page_id}/blocks
///
/// The page mapped onto blocks, with any rows that failed to map.
pub async fn get_blocks(
    State(state): State<AppState>,
    Path(page_id): Path<PageId>,
) -> AppResult<impl IntoResponse> {
    let stored = state.store.load(page_id).await?;
    let loaded = load_layout(&stored.rows);
    if !loaded.is_complete() {
        tracing::warn!(
            page_id,
            failed_rows = loaded.errors.len(),
            "Serving page with unmappable rows"
        );
    }

    let complete = loaded.is_complete();
    Ok(Json(DataResponse {
        data: BlocksResponse {
            page_id,
            version: stored.version,
            blocks: loaded.blocks,
            errors: loaded.errors,
            complete,
        },
    }))
}

/// POST /api/v1/pages/{page_id}/render
///
/// Shopper-facing layouts for the stored page over the supplied catalog.
pub async fn render(
    State(state): State<AppState>,
    Path(page_id): Path<PageId>,
    Json(body): Json<RenderBody>,
) -> AppResult<impl IntoResponse> {
    let stored = state.store.load(page_id).await?;
    let blocks = load_layout(&stored.rows).blocks;
    let layouts = render_page(&blocks, &body.products);

    Ok(Json(DataResponse {
        data: RenderResponse {
            page_id,
            version: stored.version,
            layouts,
        },
    }))
}

/// GET /api/v1/pages/{page_id}/changes?limit=
///
/// Change-log audit trail, oldest first. Owner only.
pub async fn list_changes(
    user: AuthUser,
    State(state): State<AppState>,
    Path(page_id): Path<PageId>,
    Query(params): Query<LimitParams>,
) -> AppResult<impl IntoResponse> {
    if user
        .authorize_page(state.store.as_ref(), page_id)
        .await?
        .is_none()
    {
        return Err(CoreError::NotFound {
            entity: "Page",
            id: page_id,
        }
        .into());
    }

    let entries = state.store.change_log(page_id, params.clamped()).await?;
    Ok(Json(DataResponse { data: entries }))
}
