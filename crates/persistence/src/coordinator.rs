//! Debounced, versioned saving of editor snapshots.
//!
//! Each page has its own queue holding at most one pending snapshot. New
//! snapshots coalesce into it (latest blocks win, change logs concatenate) and
//! restart the quiescence window. When the window elapses the snapshot is
//! serialized through the legacy mapper and submitted with the last version
//! this coordinator saw for the page.
//!
//! Rules per page:
//! - at most one save is in flight; a save that completes with work queued
//!   behind it reschedules immediately
//! - transient failures put the payload back and retry with doubling back-off
//! - a version conflict puts the payload back, is published, and blocks
//!   further saves until [`SaveCoordinator::accept_remote_version`] or
//!   [`SaveCoordinator::discard`]
//!
//! Timers are plain spawned sleeps tagged with the queue generation at the
//! time they were armed; a timer whose generation is stale does nothing.

use std::collections::HashMap;
use std::pin::pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::Utc;
use shopfront_core::block::Block;
use shopfront_core::error::CoreError;
use shopfront_core::legacy::save_layout;
use shopfront_core::reorder::ChangeLogEntry;
use shopfront_core::types::{DbId, PageId, VersionStamp};
use tokio::sync::{broadcast, Notify};

use crate::config::CoordinatorConfig;
use crate::events::{SaveEvent, SaveEventBus, SaveStatus};
use crate::store::{LayoutStore, SaveRequest, SaveSource};

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

/// The full block sequence of a page at one editor revision.
#[derive(Debug, Clone, PartialEq)]
pub struct PageSnapshot {
    pub blocks: Vec<Block>,
    pub revision: u64,
    /// Reorder entries produced since the previous snapshot.
    pub change_log: Vec<ChangeLogEntry>,
    pub source: SaveSource,
    pub actor_id: DbId,
}

impl PageSnapshot {
    /// Fold a newer snapshot over this one.
    pub fn coalesce(mut self, newer: PageSnapshot) -> PageSnapshot {
        self.change_log.extend(newer.change_log);
        PageSnapshot {
            blocks: newer.blocks,
            revision: newer.revision,
            change_log: self.change_log,
            source: self.source.strongest(newer.source),
            actor_id: newer.actor_id,
        }
    }
}

// ---------------------------------------------------------------------------
// Per-page queue
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct PageQueue {
    pending: Option<PageSnapshot>,
    in_flight: bool,
    /// Bumped whenever armed timers should be invalidated.
    generation: u64,
    known_version: VersionStamp,
    /// `(expected, actual)` of an unresolved conflict.
    conflict: Option<(VersionStamp, VersionStamp)>,
    retry_delay: Option<Duration>,
    /// Signalled whenever an in-flight save finishes.
    idle: Arc<Notify>,
    /// Open sessions editing the page.
    sessions: usize,
}

impl PageQueue {
    fn is_settled(&self) -> bool {
        self.sessions == 0 && self.pending.is_none() && !self.in_flight && self.conflict.is_none()
    }

    fn put_back(&mut self, failed: PageSnapshot) {
        self.pending = Some(match self.pending.take() {
            Some(newer) => failed.coalesce(newer),
            None => failed,
        });
    }
}

// ---------------------------------------------------------------------------
// Coordinator
// ---------------------------------------------------------------------------

struct Inner {
    store: Arc<dyn LayoutStore>,
    config: CoordinatorConfig,
    pages: Mutex<HashMap<PageId, PageQueue>>,
    events: SaveEventBus,
}

/// Cheaply cloneable handle; clones share queues and the event bus.
#[derive(Clone)]
pub struct SaveCoordinator {
    inner: Arc<Inner>,
}

impl SaveCoordinator {
    pub fn new(store: Arc<dyn LayoutStore>, config: CoordinatorConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                config,
                pages: Mutex::new(HashMap::new()),
                events: SaveEventBus::default(),
            }),
        }
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.inner.config
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SaveEvent> {
        self.inner.events.subscribe()
    }

    fn pages(&self) -> MutexGuard<'_, HashMap<PageId, PageQueue>> {
        self.inner
            .pages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    // -- Queue state ---------------------------------------------------------

    /// Register a session that loaded `version` of the page; the version is
    /// the first expected version of its saves.
    pub fn attach(&self, page_id: PageId, version: VersionStamp) {
        let mut pages = self.pages();
        let queue = pages.entry(page_id).or_default();
        queue.sessions += 1;
        queue.known_version = version;
    }

    /// Unregister a session. The page's queue is dropped once no session
    /// remains and nothing is queued, in flight or conflicted; returns whether
    /// it was.
    pub fn release(&self, page_id: PageId) -> bool {
        let mut pages = self.pages();
        let Some(queue) = pages.get_mut(&page_id) else {
            return false;
        };
        queue.sessions = queue.sessions.saturating_sub(1);
        if !queue.is_settled() {
            return false;
        }
        pages.remove(&page_id);
        tracing::debug!(page_id, "Released layout save queue");
        true
    }

    pub fn known_version(&self, page_id: PageId) -> VersionStamp {
        self.pages().get(&page_id).map_or(0, |q| q.known_version)
    }

    /// Queued or in-flight work exists for the page.
    pub fn has_pending(&self, page_id: PageId) -> bool {
        self.pages()
            .get(&page_id)
            .is_some_and(|q| q.pending.is_some() || q.in_flight)
    }

    /// `(expected, actual)` of an unresolved conflict.
    pub fn conflict(&self, page_id: PageId) -> Option<(VersionStamp, VersionStamp)> {
        self.pages().get(&page_id).and_then(|q| q.conflict)
    }

    /// Resolve a conflict in favour of the local edits: the queued snapshot is
    /// saved over `version` after the usual quiescence window.
    pub fn accept_remote_version(&self, page_id: PageId, version: VersionStamp) {
        let generation = {
            let mut pages = self.pages();
            let queue = pages.entry(page_id).or_default();
            queue.known_version = version;
            queue.conflict = None;
            queue.retry_delay = None;
            queue.generation += 1;
            queue.pending.is_some().then_some(queue.generation)
        };
        tracing::info!(page_id, version, "Accepted remote layout version");
        if let Some(generation) = generation {
            self.schedule(page_id, generation, self.inner.config.debounce);
        }
    }

    /// Drop everything queued for the page. An in-flight save still finishes.
    pub fn discard(&self, page_id: PageId) {
        if let Some(queue) = self.pages().remove(&page_id) {
            tracing::info!(
                page_id,
                had_pending = queue.pending.is_some(),
                "Discarded layout save queue"
            );
            queue.idle.notify_waiters();
        }
    }

    // -- Enqueue and flush ---------------------------------------------------

    /// Queue a snapshot and restart the page's quiescence window. Never blocks
    /// on I/O.
    pub fn enqueue(&self, page_id: PageId, snapshot: PageSnapshot) {
        let (generation, conflicted) = {
            let mut pages = self.pages();
            let queue = pages.entry(page_id).or_default();
            tracing::debug!(
                page_id,
                revision = snapshot.revision,
                source = %snapshot.source,
                coalesced = queue.pending.is_some(),
                "Queued layout snapshot"
            );
            queue.pending = Some(match queue.pending.take() {
                Some(older) => older.coalesce(snapshot),
                None => snapshot,
            });
            queue.generation += 1;
            (queue.generation, queue.conflict.is_some())
        };
        if !conflicted {
            self.schedule(page_id, generation, self.inner.config.debounce);
        }
    }

    fn schedule(&self, page_id: PageId, generation: u64, delay: Duration) {
        let coordinator = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let current = coordinator
                .pages()
                .get(&page_id)
                .is_some_and(|q| q.generation == generation);
            if current {
                if let Err(e) = coordinator.flush(page_id).await {
                    tracing::debug!(page_id, error = %e, "Scheduled layout save did not complete");
                }
            }
        });
    }

    /// Submit the queued snapshot now.
    ///
    /// Returns `Ok(None)` when nothing is queued or a save is already in
    /// flight (it will pick the queue up when it completes).
    pub async fn flush(&self, page_id: PageId) -> Result<Option<VersionStamp>, CoreError> {
        let (snapshot, expected, idle) = {
            let mut pages = self.pages();
            let Some(queue) = pages.get_mut(&page_id) else {
                return Ok(None);
            };
            if queue.in_flight {
                return Ok(None);
            }
            if let Some((expected, actual)) = queue.conflict {
                return Err(CoreError::VersionConflict {
                    page_id,
                    expected,
                    actual,
                });
            }
            let Some(snapshot) = queue.pending.take() else {
                return Ok(None);
            };
            queue.in_flight = true;
            (snapshot, queue.known_version, Arc::clone(&queue.idle))
        };

        let revision = snapshot.revision;
        let source = snapshot.source;
        let request = SaveRequest {
            rows: save_layout(&snapshot.blocks),
            change_log: snapshot.change_log.clone(),
            expected_version: expected,
            source,
            actor_id: snapshot.actor_id,
        };
        tracing::debug!(
            page_id,
            revision,
            expected_version = expected,
            source = %source,
            changes = request.change_log.len(),
            "Submitting layout save"
        );

        let result = self.inner.store.save(page_id, request).await;

        let (status, reschedule) = {
            let mut pages = self.pages();
            let queue = pages.get_mut(&page_id);
            self.settle(page_id, queue, snapshot, expected, &result)
        };
        idle.notify_waiters();

        if let Some((generation, delay)) = reschedule {
            self.schedule(page_id, generation, delay);
        }
        self.inner.events.publish(SaveEvent {
            page_id,
            revision,
            status,
        });
        result.map(Some)
    }

    /// Fold a save result back into the queue. Returns the event to publish
    /// and the timer to arm, if any.
    fn settle(
        &self,
        page_id: PageId,
        queue: Option<&mut PageQueue>,
        snapshot: PageSnapshot,
        expected: VersionStamp,
        result: &Result<VersionStamp, CoreError>,
    ) -> (SaveStatus, Option<(u64, Duration)>) {
        // A discarded queue is not resurrected; the outcome is still reported.
        let Some(queue) = queue else {
            return (status_for(result, expected), None);
        };
        queue.in_flight = false;

        match result {
            Ok(version) => {
                queue.known_version = *version;
                queue.retry_delay = None;
                tracing::info!(
                    page_id,
                    version,
                    revision = snapshot.revision,
                    source = %snapshot.source,
                    "Saved page layout"
                );
                let reschedule = queue
                    .pending
                    .is_some()
                    .then_some((queue.generation, Duration::ZERO));
                (
                    SaveStatus::Saved {
                        version: *version,
                        at: Utc::now(),
                    },
                    reschedule,
                )
            }
            Err(CoreError::VersionConflict { actual, .. }) => {
                tracing::warn!(
                    page_id,
                    expected,
                    actual,
                    "Layout save rejected by version check"
                );
                queue.put_back(snapshot);
                queue.conflict = Some((expected, *actual));
                (
                    SaveStatus::Conflict {
                        expected,
                        actual: *actual,
                    },
                    None,
                )
            }
            Err(e) if e.is_transient() => {
                let delay = self.inner.config.next_retry_delay(queue.retry_delay);
                tracing::warn!(
                    page_id,
                    error = %e,
                    retry_in_ms = delay.as_millis() as u64,
                    "Layout save failed, will retry"
                );
                queue.put_back(snapshot);
                queue.retry_delay = Some(delay);
                queue.generation += 1;
                (
                    SaveStatus::Failed {
                        message: e.to_string(),
                        retrying: true,
                    },
                    Some((queue.generation, delay)),
                )
            }
            Err(e) => {
                tracing::error!(page_id, error = %e, "Layout save failed");
                queue.put_back(snapshot);
                (
                    SaveStatus::Failed {
                        message: e.to_string(),
                        retrying: false,
                    },
                    None,
                )
            }
        }
    }

    /// Wait for any in-flight save, then drain the page's queue.
    ///
    /// Returns the page version once the queue is empty, or `None` when there
    /// was nothing to save. Transient failures stay queued for retry even
    /// though the error is returned.
    pub async fn force_flush(&self, page_id: PageId) -> Result<Option<VersionStamp>, CoreError> {
        let mut worked = false;
        loop {
            let Some(idle) = self.pages().get(&page_id).map(|q| Arc::clone(&q.idle)) else {
                return Ok(None);
            };
            let mut notified = pin!(idle.notified());
            notified.as_mut().enable();

            let (in_flight, pending, known) = match self.pages().get(&page_id) {
                Some(q) => (q.in_flight, q.pending.is_some(), q.known_version),
                None => return Ok(None),
            };
            if in_flight {
                // A timer-driven save may finish the work for us.
                worked = true;
                notified.await;
                continue;
            }
            if !pending {
                return Ok(worked.then_some(known));
            }
            worked = true;
            self.flush(page_id).await?;
        }
    }
}

fn status_for(result: &Result<VersionStamp, CoreError>, expected: VersionStamp) -> SaveStatus {
    match result {
        Ok(version) => SaveStatus::Saved {
            version: *version,
            at: Utc::now(),
        },
        Err(CoreError::VersionConflict { actual, .. }) => SaveStatus::Conflict {
            expected,
            actual: *actual,
        },
        Err(e) => SaveStatus::Failed {
            message: e.to_string(),
            retrying: false,
        },
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
