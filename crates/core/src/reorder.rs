//! Reorder engine: array moves, renumbering and drag-and-drop resolution.
//!
//! A reorder is a standard array move (remove, then reinsert), never a swap.
//! After every move each block's `position` equals its index, and only blocks
//! whose position actually changed are stamped and logged.

use serde::{Deserialize, Serialize};

use crate::block::{Block, BlockType};
use crate::editor::{EditorAction, EditorState};
use crate::types::{BlockId, Timestamp};

// ---------------------------------------------------------------------------
// Drag state
// ---------------------------------------------------------------------------

/// Transient pointer state while a block is being dragged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DragState {
    pub is_dragging: bool,
    pub dragged_block_id: Option<BlockId>,
    /// Insertion point under the pointer. Visual only.
    pub drag_over_index: Option<usize>,
}

/// Where a drag gesture was released.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropTarget {
    /// Insert before the block currently at this index, where the drop
    /// indicator is drawn.
    Index(usize),
    /// Past the last block.
    End,
    /// Outside any drop zone. Cancels the gesture.
    Outside,
}

// ---------------------------------------------------------------------------
// Change log
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeAction {
    /// The block the user dragged.
    Moved,
    /// A block shifted as a consequence of another block's move.
    PositionUpdated,
}

impl ChangeAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Moved => "moved",
            Self::PositionUpdated => "position_updated",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "moved" => Some(Self::Moved),
            "position_updated" => Some(Self::PositionUpdated),
            _ => None,
        }
    }
}

impl std::fmt::Display for ChangeAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable audit record of one block's position change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeLogEntry {
    pub block_id: BlockId,
    pub block_type: BlockType,
    pub action: ChangeAction,
    pub old_position: u32,
    pub new_position: u32,
    pub timestamp: Timestamp,
}

// ---------------------------------------------------------------------------
// Primitives
// ---------------------------------------------------------------------------

/// Move the block at `from` so that it ends up at `to`.
///
/// `to == len` moves the block to the end. `from >= len`, `to > len` and moves
/// that leave the order unchanged return no entries and touch nothing.
pub fn move_block(
    blocks: &mut Vec<Block>,
    from: usize,
    to: usize,
    now: Timestamp,
) -> Vec<ChangeLogEntry> {
    let len = blocks.len();
    if from >= len || to > len || effective_target(to, len) == from {
        return Vec::new();
    }

    let moved = blocks.remove(from);
    let moved_id = moved.id;
    let insert_at = to.min(blocks.len());
    blocks.insert(insert_at, moved);

    let mut log = Vec::new();
    for (index, block) in blocks.iter_mut().enumerate() {
        let new_position = index as u32;
        if block.position == new_position {
            continue;
        }
        log.push(ChangeLogEntry {
            block_id: block.id,
            block_type: block.block_type(),
            action: if block.id == moved_id {
                ChangeAction::Moved
            } else {
                ChangeAction::PositionUpdated
            },
            old_position: block.position,
            new_position,
            timestamp: now,
        });
        block.position = new_position;
        block.updated_at = now;
    }
    log
}

/// Assign `position = index` to every block, stamping the ones that changed.
/// Returns how many blocks changed.
pub fn renumber(blocks: &mut [Block], now: Timestamp) -> usize {
    let mut changed = 0;
    for (index, block) in blocks.iter_mut().enumerate() {
        let position = index as u32;
        if block.position != position {
            block.position = position;
            block.updated_at = now;
            changed += 1;
        }
    }
    changed
}

/// `true` when positions are exactly `0..len` in order.
pub fn is_contiguous(blocks: &[Block]) -> bool {
    blocks
        .iter()
        .enumerate()
        .all(|(index, block)| block.position as usize == index)
}

/// The index the moved block occupies after the move.
fn effective_target(to: usize, len: usize) -> usize {
    if to >= len {
        len.saturating_sub(1)
    } else {
        to
    }
}

// ---------------------------------------------------------------------------
// Drop resolution
// ---------------------------------------------------------------------------

/// Resolve the end of a drag gesture into the reorder to dispatch.
///
/// Returns `None` when nothing is being dragged, the dragged block is gone,
/// the drop was outside any zone or it lands where the block already is. The
/// caller dispatches `EndDrag` in every case.
pub fn commit_drop(state: &EditorState, target: DropTarget) -> Option<EditorAction> {
    if !state.drag.is_dragging {
        return None;
    }
    let dragged = state.drag.dragged_block_id?;
    let from = state.blocks.iter().position(|b| b.id == dragged)?;
    let len = state.blocks.len();

    let to = match target {
        DropTarget::Outside => return None,
        DropTarget::End => len,
        // Removing the dragged block first shifts later slots up by one.
        DropTarget::Index(index) => {
            let index = index.min(len);
            if index > from {
                index - 1
            } else {
                index
            }
        }
    };
    if effective_target(to, len) == from {
        return None;
    }
    Some(EditorAction::ReorderBlocks { from, to })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
