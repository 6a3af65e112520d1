//! Repository for the `page_layouts` and `layout_change_log` tables.
//!
//! Saves are compare-and-swap on `version`: the write and its change-log rows
//! commit together, or nothing is written.

use shopfront_core::types::{DbId, PageId, VersionStamp};
use sqlx::PgPool;

use crate::models::page_layout::{ChangeLogRow, PageLayout, SaveLayout};

/// Column list for `page_layouts` queries.
const COLUMNS: &str = "\
    page_id, owner_id, rows_json, version, last_source, created_at, updated_at";

/// Column list for `layout_change_log` queries.
const CHANGE_LOG_COLUMNS: &str = "\
    id, page_id, version, seq, block_id, block_type, action, \
    old_position, new_position, source, actor_id, occurred_at, recorded_at";

/// Result of a versioned save.
#[derive(Debug, Clone)]
pub enum SaveOutcome {
    Saved(PageLayout),
    /// The stored version was not the expected one. Nothing was written.
    Conflict { actual: VersionStamp },
}

/// Provides data access for page layouts and their audit trail.
pub struct PageLayoutRepo;

impl PageLayoutRepo {
    /// Find the layout of a page.
    pub async fn find_by_page(
        pool: &PgPool,
        page_id: PageId,
    ) -> Result<Option<PageLayout>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM page_layouts WHERE page_id = $1");
        sqlx::query_as::<_, PageLayout>(&query)
            .bind(page_id)
            .fetch_optional(pool)
            .await
    }

    /// Current version of a page; `0` if it has never been saved.
    pub async fn current_version(
        pool: &PgPool,
        page_id: PageId,
    ) -> Result<VersionStamp, sqlx::Error> {
        let version: Option<(VersionStamp,)> =
            sqlx::query_as("SELECT version FROM page_layouts WHERE page_id = $1")
                .bind(page_id)
                .fetch_optional(pool)
                .await?;
        Ok(version.map_or(0, |(v,)| v))
    }

    pub async fn owner_of(pool: &PgPool, page_id: PageId) -> Result<Option<DbId>, sqlx::Error> {
        let owner: Option<(DbId,)> =
            sqlx::query_as("SELECT owner_id FROM page_layouts WHERE page_id = $1")
                .bind(page_id)
                .fetch_optional(pool)
                .await?;
        Ok(owner.map(|(id,)| id))
    }

    /// Write a new version if the stored one still equals
    /// `dto.expected_version`, appending the change-log entries in order.
    pub async fn save_versioned(
        pool: &PgPool,
        page_id: PageId,
        dto: &SaveLayout,
    ) -> Result<SaveOutcome, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let saved = if dto.expected_version == 0 {
            let query = format!(
                "INSERT INTO page_layouts (page_id, owner_id, rows_json, version, last_source) \
                 VALUES ($1, $2, $3, 1, $4) \
                 ON CONFLICT (page_id) DO NOTHING \
                 RETURNING {COLUMNS}"
            );
            sqlx::query_as::<_, PageLayout>(&query)
                .bind(page_id)
                .bind(dto.actor_id)
                .bind(&dto.rows_json)
                .bind(&dto.source)
                .fetch_optional(&mut *tx)
                .await?
        } else {
            let query = format!(
                "UPDATE page_layouts SET \
                     rows_json = $3, \
                     version = version + 1, \
                     last_source = $4, \
                     updated_at = now() \
                 WHERE page_id = $1 AND version = $2 \
                 RETURNING {COLUMNS}"
            );
            sqlx::query_as::<_, PageLayout>(&query)
                .bind(page_id)
                .bind(dto.expected_version)
                .bind(&dto.rows_json)
                .bind(&dto.source)
                .fetch_optional(&mut *tx)
                .await?
        };

        let Some(layout) = saved else {
            let actual: Option<(VersionStamp,)> =
                sqlx::query_as("SELECT version FROM page_layouts WHERE page_id = $1")
                    .bind(page_id)
                    .fetch_optional(&mut *tx)
                    .await?;
            tx.rollback().await?;
            let actual = actual.map_or(0, |(v,)| v);
            tracing::debug!(
                page_id,
                expected = dto.expected_version,
                actual,
                "Rejected stale layout save"
            );
            return Ok(SaveOutcome::Conflict { actual });
        };

        for (seq, change) in dto.changes.iter().enumerate() {
            sqlx::query(
                "INSERT INTO layout_change_log \
                     (page_id, version, seq, block_id, block_type, action, \
                      old_position, new_position, source, actor_id, occurred_at) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
            )
            .bind(page_id)
            .bind(layout.version)
            .bind(seq as i32)
            .bind(change.block_id)
            .bind(&change.block_type)
            .bind(&change.action)
            .bind(change.old_position)
            .bind(change.new_position)
            .bind(&dto.source)
            .bind(dto.actor_id)
            .bind(change.occurred_at)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(SaveOutcome::Saved(layout))
    }

    /// Audit trail of a page, oldest first.
    pub async fn list_change_log(
        pool: &PgPool,
        page_id: PageId,
        limit: i64,
    ) -> Result<Vec<ChangeLogRow>, sqlx::Error> {
        let query = format!(
            "SELECT {CHANGE_LOG_COLUMNS} FROM layout_change_log \
             WHERE page_id = $1 \
             ORDER BY version, seq \
             LIMIT $2"
        );
        sqlx::query_as::<_, ChangeLogRow>(&query)
            .bind(page_id)
            .bind(limit)
            .fetch_all(pool)
            .await
    }
}
