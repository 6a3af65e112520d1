//! Page layout models and DTOs.

use serde::{Deserialize, Serialize};
use shopfront_core::reorder::ChangeLogEntry;
use shopfront_core::types::{BlockId, DbId, PageId, Timestamp, VersionStamp};
use sqlx::FromRow;

// ---------------------------------------------------------------------------
// Entity structs (database rows)
// ---------------------------------------------------------------------------

/// A row from the `page_layouts` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct PageLayout {
    pub page_id: PageId,
    pub owner_id: DbId,
    pub rows_json: serde_json::Value,
    pub version: VersionStamp,
    pub last_source: String,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// A row from the `layout_change_log` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct ChangeLogRow {
    pub id: DbId,
    pub page_id: PageId,
    pub version: VersionStamp,
    pub seq: i32,
    pub block_id: BlockId,
    pub block_type: String,
    pub action: String,
    pub old_position: i32,
    pub new_position: i32,
    pub source: String,
    pub actor_id: Option<DbId>,
    pub occurred_at: Timestamp,
    pub recorded_at: Timestamp,
}

// ---------------------------------------------------------------------------
// DTOs
// ---------------------------------------------------------------------------

/// One audit entry to insert alongside a save.
#[derive(Debug, Clone, Deserialize)]
pub struct NewChangeLogEntry {
    pub block_id: BlockId,
    pub block_type: String,
    pub action: String,
    pub old_position: i32,
    pub new_position: i32,
    pub occurred_at: Timestamp,
}

impl From<&ChangeLogEntry> for NewChangeLogEntry {
    fn from(entry: &ChangeLogEntry) -> Self {
        Self {
            block_id: entry.block_id,
            block_type: entry.block_type.as_str().to_string(),
            action: entry.action.as_str().to_string(),
            old_position: i32::try_from(entry.old_position).unwrap_or(i32::MAX),
            new_position: i32::try_from(entry.new_position).unwrap_or(i32::MAX),
            occurred_at: entry.timestamp,
        }
    }
}

/// DTO for a compare-and-swap save.
#[derive(Debug, Clone, Deserialize)]
pub struct SaveLayout {
    pub rows_json: serde_json::Value,
    /// Version the caller last read. `0` creates the page.
    pub expected_version: VersionStamp,
    pub source: String,
    /// Becomes the owner when the page is created.
    pub actor_id: DbId,
    pub changes: Vec<NewChangeLogEntry>,
}
