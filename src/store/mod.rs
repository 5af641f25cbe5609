//! Record persistence keyed by document code.
//!
//! [`RecordStore`] is the seam between the registration pipeline and the
//! storage backend. Two implementations ship with the crate:
//!
//! | Store | Durability | Uniqueness |
//! |-------|------------|------------|
//! | [`MemoryStore`] | process lifetime (test mode) | atomic map entry |
//! | [`SqliteStore`] | single `documents` table | `UNIQUE` column constraint |
//!
//! Stores expose insert and lookup only; records are never updated or deleted.

use crate::error::StoreError;
use crate::record::DocumentRecord;

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// Insert-once, lookup-by-code storage for [`DocumentRecord`]s.
pub trait RecordStore: Send + Sync {
    /// Insert a new record.
    ///
    /// Returns [`StoreError::Conflict`] if a record with the same code exists;
    /// the existing record is left untouched.
    fn insert(&self, record: DocumentRecord) -> Result<(), StoreError>;

    /// Fetch the record for `code`. `Ok(None)` means "not found".
    fn get_by_code(&self, code: &str) -> Result<Option<DocumentRecord>, StoreError>;
}
