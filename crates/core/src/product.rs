//! Product records supplied by the catalog.
//!
//! The core never fetches products itself; callers hand it an already-loaded
//! collection which the renderer slices and the block factories draw defaults
//! from.

use serde::{Deserialize, Serialize};

use crate::types::Timestamp;

/// A read-only product record from the catalog source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: String,
    pub name: String,
    /// Price in the store currency's minor unit.
    pub price_cents: i64,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    pub created_at: Timestamp,
}
