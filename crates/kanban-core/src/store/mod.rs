//! Storage port and its SQLite implementation.
//!
//! The repositories depend only on the [`Storage`] trait: typed
//! lookup-by-id, linear scan, add/update/remove per entity type, and a
//! `commit` that finalizes the pending changes of one repository call.
//! [`SqliteStore`] backs the port with `rusqlite`; runtime defaults follow
//! the projection-database conventions:
//! - `journal_mode = WAL` for file-backed stores
//! - `busy_timeout = 5s` to reduce transient lock failures
//! - `foreign_keys = ON` so join rows cascade with their work item

pub mod schema;
pub mod sqlite;

pub use sqlite::SqliteStore;

use anyhow::Context;
use std::path::Path;

use crate::model::{Tag, User, WorkItem};

/// Errors surfaced by storage implementations.
///
/// Expected domain outcomes (missing entity, duplicate title, …) are never
/// errors; they are modelled as `Response` values by the repositories. A
/// `StoreError` means the operation aborted with no partial commit.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The underlying SQLite call failed.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// A persisted row could not be mapped back to an entity.
    #[error("corrupt row: {0}")]
    Corrupt(String),
}

/// Abstract persistent collection of users, tags, and work items.
///
/// Methods take `&self`; implementations are interior-mutable and assume a
/// single-writer session (no cross-call transactions). `scan`-style methods
/// (`users`, `tags`, `work_items`) return entities in insertion order.
///
/// Mutating methods stage changes; [`Storage::commit`] finalizes them and
/// must be called at the end of every mutating repository operation before
/// the success response is produced. Implementations must guarantee
/// all-or-nothing behaviour: a failed mutation or commit leaves no partial
/// state behind.
pub trait Storage {
    /// # Errors
    /// Returns an error if the lookup fails.
    fn user(&self, id: i64) -> Result<Option<User>, StoreError>;
    /// # Errors
    /// Returns an error if the scan fails.
    fn users(&self) -> Result<Vec<User>, StoreError>;
    /// # Errors
    /// Returns an error if staging the insert fails.
    fn add_user(&self, user: &User) -> Result<(), StoreError>;
    /// # Errors
    /// Returns an error if staging the overwrite fails.
    fn update_user(&self, user: &User) -> Result<(), StoreError>;
    /// # Errors
    /// Returns an error if staging the removal fails.
    fn remove_user(&self, id: i64) -> Result<(), StoreError>;

    /// # Errors
    /// Returns an error if the lookup fails.
    fn tag(&self, id: i64) -> Result<Option<Tag>, StoreError>;
    /// # Errors
    /// Returns an error if the scan fails.
    fn tags(&self) -> Result<Vec<Tag>, StoreError>;
    /// # Errors
    /// Returns an error if staging the insert fails.
    fn add_tag(&self, tag: &Tag) -> Result<(), StoreError>;
    /// # Errors
    /// Returns an error if staging the overwrite fails.
    fn update_tag(&self, tag: &Tag) -> Result<(), StoreError>;
    /// # Errors
    /// Returns an error if staging the removal fails.
    fn remove_tag(&self, id: i64) -> Result<(), StoreError>;

    /// # Errors
    /// Returns an error if the lookup fails.
    fn work_item(&self, id: i64) -> Result<Option<WorkItem>, StoreError>;
    /// # Errors
    /// Returns an error if the scan fails.
    fn work_items(&self) -> Result<Vec<WorkItem>, StoreError>;
    /// # Errors
    /// Returns an error if staging the insert fails.
    fn add_work_item(&self, item: &WorkItem) -> Result<(), StoreError>;
    /// # Errors
    /// Returns an error if staging the overwrite fails.
    fn update_work_item(&self, item: &WorkItem) -> Result<(), StoreError>;
    /// # Errors
    /// Returns an error if staging the removal fails.
    fn remove_work_item(&self, id: i64) -> Result<(), StoreError>;

    /// Durably persist all staged changes.
    ///
    /// # Errors
    /// Returns an error if the commit fails; staged changes are discarded.
    fn commit(&self) -> Result<(), StoreError>;

    /// Discard all staged changes. A no-op when nothing is staged.
    ///
    /// # Errors
    /// Returns an error if the underlying rollback fails.
    fn rollback(&self) -> Result<(), StoreError>;
}

/// Open (or create) the store at `path` with the standard pragma set and an
/// up-to-date schema.
///
/// This is the process-wide storage handle: open it once at startup and pass
/// it by reference into each repository constructor.
///
/// # Errors
///
/// Returns an error if creating the parent directory or opening, configuring,
/// or migrating the database fails.
pub fn open_store(path: &Path) -> anyhow::Result<SqliteStore> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create store directory {}", parent.display()))?;
    }

    let store = SqliteStore::open(path)
        .with_context(|| format!("open kanban store {}", path.display()))?;

    tracing::debug!(path = %path.display(), "kanban store opened");
    Ok(store)
}
