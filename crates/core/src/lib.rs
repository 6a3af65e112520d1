//! Pure domain logic for the storefront page-layout editor.
//!
//! Nothing in this crate performs I/O or reads the clock: callers pass the
//! current time into every mutating operation.

pub mod block;
pub mod editor;
pub mod error;
pub mod legacy;
pub mod product;
pub mod reorder;
pub mod render;
pub mod types;
