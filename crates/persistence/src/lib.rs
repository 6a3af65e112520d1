//! Durable storage of page layouts and the debounced save pipeline.
//!
//! [`store::LayoutStore`] is the storage endpoint contract, implemented in
//! memory and on PostgreSQL. [`coordinator::SaveCoordinator`] turns a stream of
//! editor mutations into versioned saves, and [`session::EditorSession`] binds
//! one page's editor state to it.

pub mod config;
pub mod coordinator;
pub mod events;
pub mod memory;
pub mod postgres;
pub mod session;
pub mod store;

pub use config::CoordinatorConfig;
pub use coordinator::{PageSnapshot, SaveCoordinator};
pub use events::{SaveEvent, SaveEventBus, SaveStatus};
pub use memory::MemoryLayoutStore;
pub use postgres::PgLayoutStore;
pub use session::EditorSession;
pub use store::{AuditEntry, LayoutStore, SaveRequest, SaveSource, StoredLayout};
