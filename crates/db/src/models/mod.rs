//! Row structs and DTOs.
//!
//! Each submodule contains:
//! - `FromRow` + `Serialize` entity structs matching the database rows
//! - `Deserialize` DTOs for writes

pub mod page_layout;
