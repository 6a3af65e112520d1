//! Shared query parameter types for API handlers.

use serde::Deserialize;

/// Default number of change-log entries returned.
pub const DEFAULT_CHANGE_LIMIT: usize = 100;
/// Hard cap on change-log entries per request.
pub const MAX_CHANGE_LIMIT: usize = 1000;

/// `?limit=` for list endpoints.
#[derive(Debug, Default, Deserialize)]
pub struct LimitParams {
    pub limit: Option<usize>,
}

impl LimitParams {
    /// The requested limit, defaulted and clamped to `1..=MAX_CHANGE_LIMIT`.
    pub fn clamped(&self) -> usize {
        self.limit
            .unwrap_or(DEFAULT_CHANGE_LIMIT)
            .clamp(1, MAX_CHANGE_LIMIT)
    }
}
