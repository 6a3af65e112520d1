//! In-process layout store.
//!
//! Used when no database is configured and throughout the test suites. Has
//! the same compare-and-swap semantics as the PostgreSQL store, plus failure
//! injection and counters for observing the save pipeline.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use shopfront_core::error::CoreError;
use shopfront_core::legacy::LegacyLayout;
use shopfront_core::types::{DbId, PageId, VersionStamp};
use tokio::sync::RwLock;

use crate::store::{AuditEntry, LayoutStore, SaveRequest, StoredLayout};

#[derive(Debug, Clone)]
struct PageRecord {
    rows: LegacyLayout,
    version: VersionStamp,
    owner_id: DbId,
    log: Vec<AuditEntry>,
}

#[derive(Debug, Default)]
pub struct MemoryLayoutStore {
    pages: RwLock<HashMap<PageId, PageRecord>>,
    fail_next: AtomicU32,
    save_delay: Option<Duration>,
    attempts: AtomicUsize,
    active: AtomicUsize,
    max_active: AtomicUsize,
}

impl MemoryLayoutStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every save sleeps for `delay` before committing.
    pub fn with_save_delay(delay: Duration) -> Self {
        Self {
            save_delay: Some(delay),
            ..Self::default()
        }
    }

    /// Seed a page as if it had been saved `version` times.
    pub async fn insert_page(
        &self,
        page_id: PageId,
        owner_id: DbId,
        rows: LegacyLayout,
        version: VersionStamp,
    ) {
        self.pages.write().await.insert(
            page_id,
            PageRecord {
                rows,
                version,
                owner_id,
                log: Vec::new(),
            },
        );
    }

    /// The next `n` saves fail with a transient error without writing.
    pub fn fail_next_saves(&self, n: u32) {
        self.fail_next.store(n, Ordering::SeqCst);
    }

    /// Number of `save` calls, including failed ones.
    pub fn save_attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Highest number of saves that were running at the same time.
    pub fn max_concurrent_saves(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    async fn commit(&self, page_id: PageId, request: SaveRequest) -> Result<VersionStamp, CoreError> {
        if self
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(CoreError::TransientSaveFailure(
                "layout store unavailable".into(),
            ));
        }

        let mut pages = self.pages.write().await;
        let actual = pages.get(&page_id).map_or(0, |p| p.version);
        if actual != request.expected_version {
            return Err(CoreError::VersionConflict {
                page_id,
                expected: request.expected_version,
                actual,
            });
        }

        let record = pages.entry(page_id).or_insert_with(|| PageRecord {
            rows: LegacyLayout::new(),
            version: 0,
            owner_id: request.actor_id,
            log: Vec::new(),
        });
        record.version += 1;
        record.rows = request.rows;
        let version = record.version;
        record.log.extend(request.change_log.iter().enumerate().map(|(seq, entry)| {
            AuditEntry::from_change(entry, version, seq as u32, request.source, request.actor_id)
        }));
        Ok(version)
    }
}

#[async_trait]
impl LayoutStore for MemoryLayoutStore {
    async fn load(&self, page_id: PageId) -> Result<StoredLayout, CoreError> {
        let pages = self.pages.read().await;
        Ok(pages
            .get(&page_id)
            .map(|p| StoredLayout {
                rows: p.rows.clone(),
                version: p.version,
                owner_id: Some(p.owner_id),
            })
            .unwrap_or_default())
    }

    async fn current_version(&self, page_id: PageId) -> Result<VersionStamp, CoreError> {
        Ok(self.pages.read().await.get(&page_id).map_or(0, |p| p.version))
    }

    async fn owner_of(&self, page_id: PageId) -> Result<Option<DbId>, CoreError> {
        Ok(self.pages.read().await.get(&page_id).map(|p| p.owner_id))
    }

    async fn save(&self, page_id: PageId, request: SaveRequest) -> Result<VersionStamp, CoreError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(active, Ordering::SeqCst);

        if let Some(delay) = self.save_delay {
            tokio::time::sleep(delay).await;
        }
        let result = self.commit(page_id, request).await;

        self.active.fetch_sub(1, Ordering::SeqCst);
        result
    }

    async fn change_log(&self, page_id: PageId, limit: usize) -> Result<Vec<AuditEntry>, CoreError> {
        Ok(self
            .pages
            .read()
            .await
            .get(&page_id)
            .map(|p| p.log.iter().take(limit).cloned().collect())
            .unwrap_or_default())
    }

    async fn health_check(&self) -> Result<(), CoreError> {
        Ok(())
    }
}
