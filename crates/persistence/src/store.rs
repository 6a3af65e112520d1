//! The layout storage endpoint contract.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use shopfront_core::block::BlockType;
use shopfront_core::editor::EditorAction;
use shopfront_core::error::CoreError;
use shopfront_core::legacy::LegacyLayout;
use shopfront_core::reorder::{ChangeAction, ChangeLogEntry};
use shopfront_core::types::{BlockId, DbId, PageId, Timestamp, VersionStamp};

// ---------------------------------------------------------------------------
// Save source
// ---------------------------------------------------------------------------

/// What triggered a save, recorded with every audit entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SaveSource {
    Manual,
    AutoSave,
    DragDrop,
    InlineEdit,
}

impl SaveSource {
    pub const ALL: &'static [&'static str] = &["manual", "auto_save", "drag_drop", "inline_edit"];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Manual => "manual",
            Self::AutoSave => "auto_save",
            Self::DragDrop => "drag_drop",
            Self::InlineEdit => "inline_edit",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "manual" => Some(Self::Manual),
            "auto_save" => Some(Self::AutoSave),
            "drag_drop" => Some(Self::DragDrop),
            "inline_edit" => Some(Self::InlineEdit),
            _ => None,
        }
    }

    /// The origin of a content-changing editor action.
    pub fn for_action(action: &EditorAction) -> Self {
        match action {
            EditorAction::ReorderBlocks { .. } => Self::DragDrop,
            EditorAction::UpdateBlock { .. } => Self::InlineEdit,
            _ => Self::AutoSave,
        }
    }

    /// Rank used when coalescing: the batch reports its most deliberate origin.
    fn priority(self) -> u8 {
        match self {
            Self::Manual => 3,
            Self::DragDrop => 2,
            Self::InlineEdit => 1,
            Self::AutoSave => 0,
        }
    }

    pub fn strongest(self, other: Self) -> Self {
        if other.priority() > self.priority() {
            other
        } else {
            self
        }
    }
}

impl std::fmt::Display for SaveSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Payloads
// ---------------------------------------------------------------------------

/// A page as persisted. Pages never saved load as empty at version 0.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoredLayout {
    pub rows: LegacyLayout,
    pub version: VersionStamp,
    pub owner_id: Option<DbId>,
}

#[derive(Debug, Clone)]
pub struct SaveRequest {
    pub rows: LegacyLayout,
    pub change_log: Vec<ChangeLogEntry>,
    /// Version the rows were derived from. `0` creates the page.
    pub expected_version: VersionStamp,
    pub source: SaveSource,
    pub actor_id: DbId,
}

/// One persisted change-log entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditEntry {
    pub version: VersionStamp,
    pub seq: u32,
    pub block_id: BlockId,
    pub block_type: BlockType,
    pub action: ChangeAction,
    pub old_position: u32,
    pub new_position: u32,
    pub source: SaveSource,
    pub actor_id: Option<DbId>,
    pub occurred_at: Timestamp,
}

impl AuditEntry {
    pub fn from_change(
        entry: &ChangeLogEntry,
        version: VersionStamp,
        seq: u32,
        source: SaveSource,
        actor_id: DbId,
    ) -> Self {
        Self {
            version,
            seq,
            block_id: entry.block_id,
            block_type: entry.block_type,
            action: entry.action,
            old_position: entry.old_position,
            new_position: entry.new_position,
            source,
            actor_id: Some(actor_id),
            occurred_at: entry.timestamp,
        }
    }
}

// ---------------------------------------------------------------------------
// LayoutStore
// ---------------------------------------------------------------------------

/// Durable home of page layouts.
///
/// `save` is a compare-and-swap: it must return
/// [`CoreError::VersionConflict`] and leave stored data untouched when the
/// stored version differs from `expected_version`. Availability failures are
/// reported as [`CoreError::TransientSaveFailure`] so callers can retry.
#[async_trait]
pub trait LayoutStore: Send + Sync {
    async fn load(&self, page_id: PageId) -> Result<StoredLayout, CoreError>;

    async fn current_version(&self, page_id: PageId) -> Result<VersionStamp, CoreError>;

    async fn owner_of(&self, page_id: PageId) -> Result<Option<DbId>, CoreError>;

    /// Returns the new version.
    async fn save(&self, page_id: PageId, request: SaveRequest) -> Result<VersionStamp, CoreError>;

    /// Audit trail, oldest first.
    async fn change_log(&self, page_id: PageId, limit: usize) -> Result<Vec<AuditEntry>, CoreError>;

    async fn health_check(&self) -> Result<(), CoreError>;
}
