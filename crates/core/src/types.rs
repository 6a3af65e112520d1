/// All database primary keys are PostgreSQL BIGSERIAL.
pub type DbId = i64;

/// Pages are identified by their database id.
pub type PageId = DbId;

/// Blocks carry an opaque id that survives reorders and edits.
pub type BlockId = uuid::Uuid;

/// Monotonically advancing marker of a persisted page's revision.
pub type VersionStamp = i64;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;
