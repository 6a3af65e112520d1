//! One actor editing one page.
//!
//! An [`EditorSession`] owns the page's [`EditorState`] and is the single
//! dispatch point for it. Content-changing transitions are handed to the
//! shared [`SaveCoordinator`]; save outcomes come back over the coordinator's
//! event bus and are folded into the state by [`EditorSession::sync_save_events`].
//! Persistence failures never surface from `dispatch`, only as `save_error`.

use chrono::Utc;
use shopfront_core::editor::{EditorAction, EditorState, Transition};
use shopfront_core::error::CoreError;
use shopfront_core::legacy::{load_layout, LegacyMappingError};
use shopfront_core::reorder::ChangeLogEntry;
use shopfront_core::types::{DbId, PageId, VersionStamp};
use tokio::sync::broadcast::{self, error::TryRecvError};

use crate::coordinator::{PageSnapshot, SaveCoordinator};
use crate::events::{SaveEvent, SaveStatus};
use crate::store::{LayoutStore, SaveSource};

pub struct EditorSession {
    page_id: PageId,
    actor_id: DbId,
    state: EditorState,
    coordinator: SaveCoordinator,
    events: broadcast::Receiver<SaveEvent>,
    load_errors: Vec<LegacyMappingError>,
    loaded_version: VersionStamp,
}

impl EditorSession {
    /// Load the page, map its legacy rows and seed a fresh editor state.
    ///
    /// Rows that fail to map are left out of the editor and kept in
    /// [`load_errors`](Self::load_errors) so the caller can flag the page as
    /// incomplete.
    pub async fn open(
        page_id: PageId,
        actor_id: DbId,
        store: &dyn LayoutStore,
        coordinator: SaveCoordinator,
    ) -> Result<Self, CoreError> {
        let stored = store.load(page_id).await?;
        let loaded = load_layout(&stored.rows);
        if !loaded.is_complete() {
            tracing::warn!(
                page_id,
                failed_rows = loaded.errors.len(),
                "Page loaded with unmappable rows"
            );
        }

        // Subscribe before the first save can possibly be published.
        let events = coordinator.subscribe();
        coordinator.attach(page_id, stored.version);

        let mut state = EditorState::default();
        state.apply(EditorAction::LoadInitialBlocks(loaded.blocks), Utc::now())?;

        tracing::info!(
            page_id,
            actor_id,
            version = stored.version,
            blocks = state.blocks.len(),
            "Opened editor session"
        );
        Ok(Self {
            page_id,
            actor_id,
            state,
            coordinator,
            events,
            load_errors: loaded.errors,
            loaded_version: stored.version,
        })
    }

    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    pub fn state(&self) -> &EditorState {
        &self.state
    }

    pub fn load_errors(&self) -> &[LegacyMappingError] {
        &self.load_errors
    }

    pub fn loaded_version(&self) -> VersionStamp {
        self.loaded_version
    }

    /// Apply an action. Content changes are queued for saving.
    ///
    /// An error means the action was rejected and the state is unchanged.
    pub fn dispatch(&mut self, action: EditorAction) -> Result<Transition, CoreError> {
        let source = SaveSource::for_action(&action);
        let name = action.name();
        let transition = self.state.apply(action, Utc::now()).map_err(|e| {
            tracing::debug!(page_id = self.page_id, action = name, error = %e, "Rejected editor action");
            e
        })?;
        if transition.content_changed {
            self.enqueue(source, transition.change_log.clone());
        }
        Ok(transition)
    }

    fn enqueue(&self, source: SaveSource, change_log: Vec<ChangeLogEntry>) {
        self.coordinator.enqueue(
            self.page_id,
            PageSnapshot {
                blocks: self.state.blocks.clone(),
                revision: self.state.revision,
                change_log,
                source,
                actor_id: self.actor_id,
            },
        );
    }

    /// Restore every block with unconfirmed edits to its last confirmed
    /// content. The restored blocks are saved like any other change.
    pub fn revert_unconfirmed(&mut self) -> Result<usize, CoreError> {
        let ids: Vec<_> = self.state.optimistic_updates.keys().copied().collect();
        for id in &ids {
            self.dispatch(EditorAction::RollbackOptimisticUpdate(*id))?;
        }
        Ok(ids.len())
    }

    /// Save the current blocks right away, tagged as a manual save.
    pub async fn save_now(&mut self) -> Result<Option<VersionStamp>, CoreError> {
        self.enqueue(SaveSource::Manual, Vec::new());
        let result = self.coordinator.force_flush(self.page_id).await;
        self.sync_save_events();
        result
    }

    /// Fold published save outcomes for this page into the editor state.
    /// Returns the number of events applied.
    pub fn sync_save_events(&mut self) -> usize {
        let mut applied = 0;
        loop {
            let event = match self.events.try_recv() {
                Ok(event) => event,
                Err(TryRecvError::Lagged(skipped)) => {
                    tracing::warn!(page_id = self.page_id, skipped, "Save events lagged");
                    continue;
                }
                Err(TryRecvError::Empty | TryRecvError::Closed) => break,
            };
            if event.page_id != self.page_id {
                continue;
            }
            self.apply_save_event(event);
            applied += 1;
        }
        applied
    }

    fn apply_save_event(&mut self, event: SaveEvent) {
        let now = Utc::now();
        let actions = match event.status {
            SaveStatus::Saved { at, .. } => {
                let mut actions = vec![
                    EditorAction::SetLastSaved(at),
                    EditorAction::SetSaveError(None),
                    EditorAction::ConfirmOptimisticUpdates {
                        through_revision: event.revision,
                    },
                ];
                if event.revision == self.state.revision
                    && !self.coordinator.has_pending(self.page_id)
                {
                    actions.push(EditorAction::SetDirty(false));
                }
                actions
            }
            SaveStatus::Conflict { expected, actual } => {
                vec![EditorAction::SetSaveError(Some(format!(
                    "Page was changed elsewhere (expected version {expected}, found {actual})"
                )))]
            }
            SaveStatus::Failed { message, .. } => {
                vec![EditorAction::SetSaveError(Some(message))]
            }
        };
        for action in actions {
            // Bookkeeping actions never fail.
            let _ = self.state.apply(action, now);
        }
    }

    /// Keep the local edits after a conflict and write them over `version`.
    pub fn overwrite_remote(&self, version: VersionStamp) {
        self.coordinator.accept_remote_version(self.page_id, version);
    }

    /// Drain every queued change and return the final state.
    ///
    /// The state is returned even when the final save fails; the error is then
    /// recorded in `save_error` and the queued payload stays with the
    /// coordinator. Otherwise the page's queue is released once no other
    /// session has it open.
    pub async fn close(mut self) -> EditorState {
        if let Err(e) = self.coordinator.force_flush(self.page_id).await {
            tracing::warn!(page_id = self.page_id, error = %e, "Final save of session failed");
        }
        self.sync_save_events();
        self.coordinator.release(self.page_id);
        tracing::info!(
            page_id = self.page_id,
            revision = self.state.revision,
            dirty = self.state.is_dirty,
            "Closed editor session"
        );
        self.state
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use shopfront_core::block::{Block, BlockData, BlockPatch};
    use shopfront_core::legacy::{save_layout, LegacyLayout, LegacyRow};

    use crate::config::CoordinatorConfig;
    use crate::memory::MemoryLayoutStore;

    async fn open(store: &Arc<MemoryLayoutStore>) -> EditorSession {
        let coordinator = SaveCoordinator::new(store.clone(), CoordinatorConfig::default());
        EditorSession::open(7, 42, store.as_ref(), coordinator)
            .await
            .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn open_reports_unmappable_rows() {
        let store = Arc::new(MemoryLayoutStore::new());
        let mut rows: LegacyLayout = save_layout(&[Block::text("kept", Utc::now())]);
        rows.insert(1, LegacyRow::new("carousel", Default::default()));
        store.insert_page(7, 42, rows, 3).await;

        let session = open(&store).await;
        assert_eq!(session.state().blocks.len(), 1);
        assert_eq!(session.load_errors().len(), 1);
        assert_eq!(session.load_errors()[0].row, 1);
        assert_eq!(session.loaded_version(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn open_skips_rows_repeating_an_id() {
        let store = Arc::new(MemoryLayoutStore::new());
        let first = Block::text("first", Utc::now());
        let mut copy = Block::banner("copy", Utc::now()).with_position(1);
        copy.id = first.id;
        let rows = save_layout(&[first.clone(), copy, Block::list(Utc::now()).with_position(2)]);
        store.insert_page(7, 42, rows, 1).await;

        let session = open(&store).await;
        assert_eq!(session.state().blocks.len(), 2);
        assert_eq!(session.state().blocks[0].id, first.id);
        assert_eq!(session.load_errors().len(), 1);
        assert_eq!(session.load_errors()[0].row, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn close_releases_the_page_queue() {
        let store = Arc::new(MemoryLayoutStore::new());
        let mut session = open(&store).await;
        let coordinator = session.coordinator.clone();
        session
            .dispatch(EditorAction::AddBlock {
                block: Block::text("hi", Utc::now()),
                index: None,
            })
            .unwrap();
        session.save_now().await.unwrap();
        assert_eq!(coordinator.known_version(7), 1);

        let state = session.close().await;
        assert!(!state.is_dirty);
        assert_eq!(store.load(7).await.unwrap().version, 1);
        // A released queue no longer remembers the saved version.
        assert_eq!(coordinator.known_version(7), 0);
        assert!(!coordinator.has_pending(7));
    }

    #[tokio::test(start_paused = true)]
    async fn rejected_action_leaves_state_and_queue_alone() {
        let store = Arc::new(MemoryLayoutStore::new());
        let mut session = open(&store).await;
        session
            .dispatch(EditorAction::AddBlock {
                block: Block::product_grid(Utc::now()),
                index: None,
            })
            .unwrap();
        session.save_now().await.unwrap();
        let before = session.state().clone();

        let id = before.blocks[0].id;
        let bad = BlockPatch::data(
            serde_json::json!({ "columns": 0 })
                .as_object()
                .cloned()
                .unwrap(),
        );
        let err = session
            .dispatch(EditorAction::UpdateBlock {
                block_id: id,
                patch: bad,
                optimistic: true,
            })
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidBlockData(_)));
        assert_eq!(session.state(), &before);
        assert!(!session.coordinator.has_pending(7));
    }

    #[tokio::test(start_paused = true)]
    async fn saved_event_confirms_edits_and_clears_dirty() {
        let store = Arc::new(MemoryLayoutStore::new());
        let mut session = open(&store).await;

        session
            .dispatch(EditorAction::AddBlock {
                block: Block::banner("Sale", Utc::now()),
                index: None,
            })
            .unwrap();
        let id = session.state().blocks[0].id;
        session
            .dispatch(EditorAction::UpdateBlock {
                block_id: id,
                patch: BlockPatch::data(
                    serde_json::json!({ "title": "Big sale" })
                        .as_object()
                        .cloned()
                        .unwrap(),
                ),
                optimistic: true,
            })
            .unwrap();
        assert!(session.state().is_dirty);
        assert!(session.state().has_pending_optimistic());

        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert_eq!(session.sync_save_events(), 1);

        let state = session.state();
        assert!(!state.is_dirty);
        assert!(state.last_saved_at.is_some());
        assert!(state.save_error.is_none());
        assert!(!state.has_pending_optimistic());
        assert_eq!(store.save_attempts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn failure_is_session_state_and_edits_keep_flowing() {
        let store = Arc::new(MemoryLayoutStore::new());
        let mut session = open(&store).await;
        store.fail_next_saves(1);

        session
            .dispatch(EditorAction::AddBlock {
                block: Block::list(Utc::now()),
                index: None,
            })
            .unwrap();
        tokio::time::sleep(Duration::from_millis(1100)).await;
        session.sync_save_events();
        assert!(session.state().save_error.is_some());
        assert!(session.state().is_dirty);

        session
            .dispatch(EditorAction::AddBlock {
                block: Block::masonry(Utc::now()),
                index: Some(0),
            })
            .unwrap();
        let state = session.close().await;
        assert!(state.save_error.is_none());
        assert!(!state.is_dirty);

        let stored = store.load(7).await.unwrap();
        let blocks = load_layout(&stored.rows).blocks;
        assert_eq!(blocks.len(), 2);
        assert!(matches!(blocks[0].data, BlockData::Masonry(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn revert_unconfirmed_restores_previous_content() {
        let store = Arc::new(MemoryLayoutStore::new());
        let mut session = open(&store).await;
        session
            .dispatch(EditorAction::AddBlock {
                block: Block::banner("Before", Utc::now()),
                index: None,
            })
            .unwrap();
        let id = session.state().blocks[0].id;
        session
            .dispatch(EditorAction::UpdateBlock {
                block_id: id,
                patch: BlockPatch::data(
                    serde_json::json!({ "title": "After" })
                        .as_object()
                        .cloned()
                        .unwrap(),
                ),
                optimistic: true,
            })
            .unwrap();

        assert_eq!(session.revert_unconfirmed().unwrap(), 1);
        match &session.state().blocks[0].data {
            BlockData::Banner(b) => assert_eq!(b.title, "Before"),
            other => panic!("unexpected block {other:?}"),
        }
        assert!(!session.state().has_pending_optimistic());
    }
}
