//! PostgreSQL-backed layout store.

use async_trait::async_trait;
use shopfront_core::block::BlockType;
use shopfront_core::error::CoreError;
use shopfront_core::legacy::LegacyLayout;
use shopfront_core::reorder::ChangeAction;
use shopfront_core::types::{DbId, PageId, VersionStamp};
use shopfront_db::models::page_layout::{ChangeLogRow, NewChangeLogEntry, SaveLayout};
use shopfront_db::repositories::{PageLayoutRepo, SaveOutcome};
use shopfront_db::DbPool;

use crate::store::{AuditEntry, LayoutStore, SaveRequest, SaveSource, StoredLayout};

pub struct PgLayoutStore {
    pool: DbPool,
}

impl PgLayoutStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}

/// Connection-level failures are worth retrying; anything else is a bug or a
/// schema problem and is reported as internal.
fn map_db_error(err: sqlx::Error) -> CoreError {
    match err {
        sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::Protocol(_)
        | sqlx::Error::WorkerCrashed => CoreError::TransientSaveFailure(err.to_string()),
        other => CoreError::Internal(format!("Database error: {other}")),
    }
}

fn audit_entry(row: ChangeLogRow) -> Result<AuditEntry, CoreError> {
    let corrupt = |field: &str, value: &str| {
        CoreError::Internal(format!("change log row {} has invalid {field} '{value}'", row.id))
    };
    Ok(AuditEntry {
        version: row.version,
        seq: u32::try_from(row.seq).map_err(|_| corrupt("seq", &row.seq.to_string()))?,
        block_id: row.block_id,
        block_type: BlockType::from_str(&row.block_type)
            .ok_or_else(|| corrupt("block_type", &row.block_type))?,
        action: ChangeAction::from_str(&row.action).ok_or_else(|| corrupt("action", &row.action))?,
        old_position: u32::try_from(row.old_position)
            .map_err(|_| corrupt("old_position", &row.old_position.to_string()))?,
        new_position: u32::try_from(row.new_position)
            .map_err(|_| corrupt("new_position", &row.new_position.to_string()))?,
        source: SaveSource::from_str(&row.source).ok_or_else(|| corrupt("source", &row.source))?,
        actor_id: row.actor_id,
        occurred_at: row.occurred_at,
    })
}

#[async_trait]
impl LayoutStore for PgLayoutStore {
    async fn load(&self, page_id: PageId) -> Result<StoredLayout, CoreError> {
        let Some(layout) = PageLayoutRepo::find_by_page(&self.pool, page_id)
            .await
            .map_err(map_db_error)?
        else {
            return Ok(StoredLayout::default());
        };

        let rows: LegacyLayout = serde_json::from_value(layout.rows_json).map_err(|e| {
            CoreError::Internal(format!("page {page_id} has unreadable rows_json: {e}"))
        })?;
        Ok(StoredLayout {
            rows,
            version: layout.version,
            owner_id: Some(layout.owner_id),
        })
    }

    async fn current_version(&self, page_id: PageId) -> Result<VersionStamp, CoreError> {
        PageLayoutRepo::current_version(&self.pool, page_id)
            .await
            .map_err(map_db_error)
    }

    async fn owner_of(&self, page_id: PageId) -> Result<Option<DbId>, CoreError> {
        PageLayoutRepo::owner_of(&self.pool, page_id)
            .await
            .map_err(map_db_error)
    }

    async fn save(&self, page_id: PageId, request: SaveRequest) -> Result<VersionStamp, CoreError> {
        let rows_json = serde_json::to_value(&request.rows)
            .map_err(|e| CoreError::Internal(format!("Failed to encode rows: {e}")))?;
        let dto = SaveLayout {
            rows_json,
            expected_version: request.expected_version,
            source: request.source.as_str().to_string(),
            actor_id: request.actor_id,
            changes: request.change_log.iter().map(NewChangeLogEntry::from).collect(),
        };

        match PageLayoutRepo::save_versioned(&self.pool, page_id, &dto)
            .await
            .map_err(map_db_error)?
        {
            SaveOutcome::Saved(layout) => Ok(layout.version),
            SaveOutcome::Conflict { actual } => Err(CoreError::VersionConflict {
                page_id,
                expected: request.expected_version,
                actual,
            }),
        }
    }

    async fn change_log(&self, page_id: PageId, limit: usize) -> Result<Vec<AuditEntry>, CoreError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        PageLayoutRepo::list_change_log(&self.pool, page_id, limit)
            .await
            .map_err(map_db_error)?
            .into_iter()
            .map(audit_entry)
            .collect()
    }

    async fn health_check(&self) -> Result<(), CoreError> {
        shopfront_db::health_check(&self.pool)
            .await
            .map_err(map_db_error)
    }
}
