//! Editor state machine.
//!
//! One [`EditorState`] owns the working copy of a page's blocks plus the
//! editing metadata. It changes only through [`EditorAction`]s applied by
//! [`EditorState::apply`] (or the pure [`reduce`]). The clock is an argument,
//! so replaying the same actions with the same timestamps always produces the
//! same state. No transition performs I/O.
//!
//! A transition either fully succeeds or leaves the state untouched: inputs
//! are validated before anything is mutated.

use std::collections::BTreeMap;

use crate::block::{Block, BlockPatch, BlockType};
use crate::error::CoreError;
use crate::reorder::{self, ChangeLogEntry, DragState};
use crate::types::{BlockId, Timestamp};

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

/// A local edit applied before the store has confirmed it.
#[derive(Debug, Clone, PartialEq)]
pub struct OptimisticUpdate {
    /// Every unconfirmed patch for the block, folded last-write-wins.
    pub patch: BlockPatch,
    /// The block as it was before the first unconfirmed edit.
    pub previous: Block,
    /// Content revision of the most recent edit folded into `patch`.
    pub revision: u64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct EditorState {
    /// Working copy, always ordered by `position`.
    pub blocks: Vec<Block>,
    /// At most one block is in text-edit mode.
    pub editing_block_id: Option<BlockId>,
    pub selected_block_id: Option<BlockId>,
    pub is_dirty: bool,
    pub is_loading: bool,
    pub last_saved_at: Option<Timestamp>,
    pub save_error: Option<String>,
    pub optimistic_updates: BTreeMap<BlockId, OptimisticUpdate>,
    pub drag: DragState,
    /// Incremented by every transition that changes persisted content.
    pub revision: u64,
}

// ---------------------------------------------------------------------------
// Actions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum EditorAction {
    LoadInitialBlocks(Vec<Block>),
    SetEditing(Option<BlockId>),
    SetSelected(Option<BlockId>),
    UpdateBlock {
        block_id: BlockId,
        patch: BlockPatch,
        optimistic: bool,
    },
    AddBlock {
        block: Block,
        /// Insertion index; `None` appends.
        index: Option<usize>,
    },
    DeleteBlock(BlockId),
    ReorderBlocks {
        from: usize,
        to: usize,
    },
    SetDirty(bool),
    SetLastSaved(Timestamp),
    SetLoading(bool),
    SetSaveError(Option<String>),
    ClearOptimisticUpdates,
    /// Drop ledger entries covered by a save of `through_revision`.
    ConfirmOptimisticUpdates {
        through_revision: u64,
    },
    /// Restore a block to its pre-optimistic content.
    RollbackOptimisticUpdate(BlockId),
    StartDrag(BlockId),
    SetDragOver(Option<usize>),
    EndDrag,
}

impl EditorAction {
    /// Stable name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::LoadInitialBlocks(_) => "load_initial_blocks",
            Self::SetEditing(_) => "set_editing",
            Self::SetSelected(_) => "set_selected",
            Self::UpdateBlock { .. } => "update_block",
            Self::AddBlock { .. } => "add_block",
            Self::DeleteBlock(_) => "delete_block",
            Self::ReorderBlocks { .. } => "reorder_blocks",
            Self::SetDirty(_) => "set_dirty",
            Self::SetLastSaved(_) => "set_last_saved",
            Self::SetLoading(_) => "set_loading",
            Self::SetSaveError(_) => "set_save_error",
            Self::ClearOptimisticUpdates => "clear_optimistic_updates",
            Self::ConfirmOptimisticUpdates { .. } => "confirm_optimistic_updates",
            Self::RollbackOptimisticUpdate(_) => "rollback_optimistic_update",
            Self::StartDrag(_) => "start_drag",
            Self::SetDragOver(_) => "set_drag_over",
            Self::EndDrag => "end_drag",
        }
    }
}

/// What a successful transition did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Transition {
    /// Persisted content changed; the page needs saving.
    pub content_changed: bool,
    /// Reorder audit entries, in the order they were produced.
    pub change_log: Vec<ChangeLogEntry>,
}

impl Transition {
    fn unchanged() -> Self {
        Self::default()
    }

    fn content() -> Self {
        Self {
            content_changed: true,
            change_log: Vec::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Transitions
// ---------------------------------------------------------------------------

/// Pure form of [`EditorState::apply`].
pub fn reduce(
    state: &EditorState,
    action: EditorAction,
    now: Timestamp,
) -> Result<(EditorState, Transition), CoreError> {
    let mut next = state.clone();
    let transition = next.apply(action, now)?;
    Ok((next, transition))
}

impl EditorState {
    /// A fresh session seeded with `blocks`.
    pub fn with_blocks(blocks: Vec<Block>) -> Self {
        let mut blocks = blocks;
        normalize_positions(&mut blocks);
        Self {
            blocks,
            ..Self::default()
        }
    }

    pub fn block(&self, id: BlockId) -> Option<&Block> {
        self.blocks.iter().find(|b| b.id == id)
    }

    pub fn index_of(&self, id: BlockId) -> Option<usize> {
        self.blocks.iter().position(|b| b.id == id)
    }

    pub fn contains(&self, id: BlockId) -> bool {
        self.index_of(id).is_some()
    }

    /// Positions form exactly `[0, N)` in order.
    pub fn is_positions_contiguous(&self) -> bool {
        reorder::is_contiguous(&self.blocks)
    }

    pub fn has_pending_optimistic(&self) -> bool {
        !self.optimistic_updates.is_empty()
    }

    /// Apply one action in place.
    pub fn apply(&mut self, action: EditorAction, now: Timestamp) -> Result<Transition, CoreError> {
        match action {
            EditorAction::LoadInitialBlocks(blocks) => self.load(blocks),

            EditorAction::SetEditing(None) => {
                self.editing_block_id = None;
                Ok(Transition::unchanged())
            }
            EditorAction::SetEditing(Some(id)) => {
                if self.contains(id) {
                    self.editing_block_id = Some(id);
                    self.selected_block_id = Some(id);
                }
                Ok(Transition::unchanged())
            }
            EditorAction::SetSelected(selection) => {
                if selection.is_some_and(|id| !self.contains(id)) {
                    return Ok(Transition::unchanged());
                }
                if self.editing_block_id.is_some() && self.editing_block_id != selection {
                    self.editing_block_id = None;
                }
                self.selected_block_id = selection;
                Ok(Transition::unchanged())
            }

            EditorAction::UpdateBlock {
                block_id,
                patch,
                optimistic,
            } => self.update(block_id, patch, optimistic, now),
            EditorAction::AddBlock { block, index } => self.add(block, index, now),
            EditorAction::DeleteBlock(id) => Ok(self.delete(id, now)),
            EditorAction::ReorderBlocks { from, to } => {
                let change_log = reorder::move_block(&mut self.blocks, from, to, now);
                if change_log.is_empty() {
                    return Ok(Transition::unchanged());
                }
                self.mark_content_changed();
                Ok(Transition {
                    content_changed: true,
                    change_log,
                })
            }

            EditorAction::SetDirty(dirty) => {
                self.is_dirty = dirty;
                Ok(Transition::unchanged())
            }
            EditorAction::SetLastSaved(at) => {
                self.last_saved_at = Some(at);
                Ok(Transition::unchanged())
            }
            EditorAction::SetLoading(loading) => {
                self.is_loading = loading;
                Ok(Transition::unchanged())
            }
            EditorAction::SetSaveError(error) => {
                self.save_error = error;
                Ok(Transition::unchanged())
            }

            EditorAction::ClearOptimisticUpdates => {
                self.optimistic_updates.clear();
                Ok(Transition::unchanged())
            }
            EditorAction::ConfirmOptimisticUpdates { through_revision } => {
                self.optimistic_updates
                    .retain(|_, update| update.revision > through_revision);
                Ok(Transition::unchanged())
            }
            EditorAction::RollbackOptimisticUpdate(id) => Ok(self.rollback(id, now)),

            EditorAction::StartDrag(id) => {
                if self.contains(id) {
                    self.drag = DragState {
                        is_dragging: true,
                        dragged_block_id: Some(id),
                        drag_over_index: None,
                    };
                }
                Ok(Transition::unchanged())
            }
            EditorAction::SetDragOver(index) => {
                if self.drag.is_dragging {
                    self.drag.drag_over_index = index.map(|i| i.min(self.blocks.len()));
                }
                Ok(Transition::unchanged())
            }
            EditorAction::EndDrag => {
                self.drag = DragState::default();
                Ok(Transition::unchanged())
            }
        }
    }

    fn load(&mut self, mut blocks: Vec<Block>) -> Result<Transition, CoreError> {
        for (i, block) in blocks.iter().enumerate() {
            block.validate()?;
            if blocks[..i].iter().any(|b| b.id == block.id) {
                return Err(CoreError::Validation(format!(
                    "duplicate block id {}",
                    block.id
                )));
            }
        }
        normalize_positions(&mut blocks);
        *self = Self {
            blocks,
            last_saved_at: self.last_saved_at,
            ..Self::default()
        };
        Ok(Transition::unchanged())
    }

    fn update(
        &mut self,
        block_id: BlockId,
        patch: BlockPatch,
        optimistic: bool,
        now: Timestamp,
    ) -> Result<Transition, CoreError> {
        let Some(index) = self.index_of(block_id) else {
            return Ok(Transition::unchanged());
        };
        let updated = patch.apply(&self.blocks[index], now)?;
        let revision = self.revision + 1;

        if optimistic {
            match self.optimistic_updates.get_mut(&block_id) {
                Some(pending) => {
                    pending.patch.merge(&patch);
                    pending.revision = revision;
                }
                None => {
                    self.optimistic_updates.insert(
                        block_id,
                        OptimisticUpdate {
                            patch,
                            previous: self.blocks[index].clone(),
                            revision,
                        },
                    );
                }
            }
        }

        self.blocks[index] = updated;
        self.mark_content_changed();
        Ok(Transition::content())
    }

    fn add(
        &mut self,
        mut block: Block,
        index: Option<usize>,
        now: Timestamp,
    ) -> Result<Transition, CoreError> {
        block.validate()?;
        if self.contains(block.id) {
            return Err(CoreError::Validation(format!(
                "block {} is already on the page",
                block.id
            )));
        }

        let at = index.unwrap_or(self.blocks.len()).min(self.blocks.len());
        let id = block.id;
        let enters_edit_mode = block.block_type() == BlockType::Text;
        block.position = at as u32;
        block.updated_at = now;

        self.blocks.insert(at, block);
        reorder::renumber(&mut self.blocks, now);

        if enters_edit_mode {
            self.editing_block_id = Some(id);
            self.selected_block_id = Some(id);
        }
        self.mark_content_changed();
        Ok(Transition::content())
    }

    fn delete(&mut self, id: BlockId, now: Timestamp) -> Transition {
        let Some(index) = self.index_of(id) else {
            return Transition::unchanged();
        };
        self.blocks.remove(index);
        reorder::renumber(&mut self.blocks, now);

        if self.selected_block_id == Some(id) {
            self.selected_block_id = None;
        }
        if self.editing_block_id == Some(id) {
            self.editing_block_id = None;
        }
        if self.drag.dragged_block_id == Some(id) {
            self.drag = DragState::default();
        }
        self.optimistic_updates.remove(&id);
        self.mark_content_changed();
        Transition::content()
    }

    fn rollback(&mut self, id: BlockId, now: Timestamp) -> Transition {
        let Some(pending) = self.optimistic_updates.remove(&id) else {
            return Transition::unchanged();
        };
        let Some(index) = self.index_of(id) else {
            return Transition::unchanged();
        };

        let mut restored = pending.previous;
        restored.position = self.blocks[index].position;
        restored.updated_at = now;
        self.blocks[index] = restored;
        self.mark_content_changed();
        Transition::content()
    }

    fn mark_content_changed(&mut self) {
        self.is_dirty = true;
        self.revision += 1;
    }
}

/// Order by stored position, then assign `position = index` without stamping.
fn normalize_positions(blocks: &mut [Block]) {
    blocks.sort_by_key(|b| b.position);
    for (index, block) in blocks.iter_mut().enumerate() {
        block.position = index as u32;
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
