use crate::types::{DbId, PageId, VersionStamp};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CoreError {
    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: &'static str, id: DbId },

    #[error("Validation failed: {0}")]
    Validation(String),

    /// Malformed variant parameters. Fatal to the mutation, not the session.
    #[error("Invalid block data: {0}")]
    InvalidBlockData(String),

    /// A legacy row could not be mapped onto the block model.
    #[error("Legacy row {row} could not be mapped: {reason}")]
    LegacyMapping { row: u32, reason: String },

    /// The stored version advanced since it was read.
    #[error("Version conflict on page {page_id}: expected {expected}, found {actual}")]
    VersionConflict {
        page_id: PageId,
        expected: VersionStamp,
        actual: VersionStamp,
    },

    /// Network or availability failure; the same payload may be retried.
    #[error("Transient save failure: {0}")]
    TransientSaveFailure(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Returns `true` for failures that are retried with the same payload.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::TransientSaveFailure(_))
    }
}
