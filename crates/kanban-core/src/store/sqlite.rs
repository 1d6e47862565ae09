//! `rusqlite`-backed [`Storage`] implementation.
//!
//! Mutations are staged inside one deferred transaction per repository call:
//! the first mutating method issues `BEGIN IMMEDIATE`, `commit` finalizes,
//! and any failed statement rolls the whole call back so no partial state
//! survives.

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use std::cell::Cell;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

use super::{StoreError, schema};
use crate::model::{State, Tag, User, WorkItem};

/// Busy timeout applied to every connection.
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Persistent store for users, tags, and work items.
pub struct SqliteStore {
    conn: Connection,
    in_txn: Cell<bool>,
}

impl SqliteStore {
    /// Open (or create) a file-backed store, apply runtime pragmas, and
    /// migrate the schema to the latest version.
    ///
    /// # Errors
    ///
    /// Returns an error if opening, configuring, or migrating the database
    /// fails.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    /// Open an in-memory store, mainly for tests and ephemeral sessions.
    ///
    /// # Errors
    ///
    /// Returns an error if configuring or migrating the database fails.
    pub fn in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn)
    }

    fn from_connection(mut conn: Connection) -> Result<Self, StoreError> {
        configure_connection(&conn)?;
        schema::migrate(&mut conn)?;
        Ok(Self {
            conn,
            in_txn: Cell::new(false),
        })
    }

    fn begin_if_needed(&self) -> Result<(), StoreError> {
        if !self.in_txn.get() {
            self.conn.execute_batch("BEGIN IMMEDIATE")?;
            self.in_txn.set(true);
        }
        Ok(())
    }

    /// Run a mutating statement batch inside the pending transaction,
    /// rolling the whole transaction back on failure.
    fn staged<T>(
        &self,
        f: impl FnOnce(&Connection) -> rusqlite::Result<T>,
    ) -> Result<T, StoreError> {
        self.begin_if_needed()?;
        match f(&self.conn) {
            Ok(value) => Ok(value),
            Err(error) => {
                self.abort();
                Err(error.into())
            }
        }
    }

    /// Best-effort rollback of the pending transaction.
    fn abort(&self) {
        if self.in_txn.replace(false) {
            if let Err(error) = self.conn.execute_batch("ROLLBACK") {
                warn!(%error, "rollback after failed statement also failed");
            }
        }
    }

    fn item_tag_ids(&self, item_id: i64) -> rusqlite::Result<Vec<i64>> {
        let mut stmt = self
            .conn
            .prepare("SELECT tag_id FROM work_item_tags WHERE item_id = ?1 ORDER BY tag_id")?;
        let ids = stmt.query_map(params![item_id], |row| row.get(0))?;
        ids.collect()
    }

    fn hydrate_item(&self, raw: RawWorkItem) -> Result<WorkItem, StoreError> {
        let tags = self.item_tag_ids(raw.id)?;
        raw.into_entity(tags)
    }
}

/// A `work_items` row before tag resolution and type mapping.
struct RawWorkItem {
    id: i64,
    title: String,
    description: Option<String>,
    state: String,
    assigned_to: Option<i64>,
    created_at_us: i64,
    state_updated_at_us: i64,
}

impl RawWorkItem {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            title: row.get(1)?,
            description: row.get(2)?,
            state: row.get(3)?,
            assigned_to: row.get(4)?,
            created_at_us: row.get(5)?,
            state_updated_at_us: row.get(6)?,
        })
    }

    fn into_entity(self, tags: Vec<i64>) -> Result<WorkItem, StoreError> {
        let state = State::from_str(&self.state)
            .map_err(|e| StoreError::Corrupt(format!("work item {}: {e}", self.id)))?;
        Ok(WorkItem {
            id: self.id,
            title: self.title,
            description: self.description,
            state,
            assigned_to: self.assigned_to,
            tags,
            created: timestamp_from_us(self.id, self.created_at_us)?,
            state_updated: timestamp_from_us(self.id, self.state_updated_at_us)?,
        })
    }
}

fn timestamp_from_us(item_id: i64, us: i64) -> Result<DateTime<Utc>, StoreError> {
    DateTime::from_timestamp_micros(us)
        .ok_or_else(|| StoreError::Corrupt(format!("work item {item_id}: timestamp {us} out of range")))
}

fn configure_connection(conn: &Connection) -> rusqlite::Result<()> {
    conn.pragma_update(None, "foreign_keys", "ON")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    let _journal_mode: String = conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
    conn.busy_timeout(DEFAULT_BUSY_TIMEOUT)?;
    Ok(())
}

const ITEM_COLUMNS: &str =
    "id, title, description, state, assigned_to, created_at_us, state_updated_at_us";

impl super::Storage for SqliteStore {
    fn user(&self, id: i64) -> Result<Option<User>, StoreError> {
        let user = self
            .conn
            .query_row(
                "SELECT id, name, email FROM users WHERE id = ?1",
                params![id],
                |row| {
                    Ok(User {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        email: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(user)
    }

    fn users(&self) -> Result<Vec<User>, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name, email FROM users ORDER BY id")?;
        let users = stmt.query_map([], |row| {
            Ok(User {
                id: row.get(0)?,
                name: row.get(1)?,
                email: row.get(2)?,
            })
        })?;
        Ok(users.collect::<rusqlite::Result<_>>()?)
    }

    fn add_user(&self, user: &User) -> Result<(), StoreError> {
        self.staged(|conn| {
            conn.execute(
                "INSERT INTO users (id, name, email) VALUES (?1, ?2, ?3)",
                params![user.id, user.name, user.email],
            )
            .map(|_| ())
        })
    }

    fn update_user(&self, user: &User) -> Result<(), StoreError> {
        self.staged(|conn| {
            conn.execute(
                "UPDATE users SET name = ?2, email = ?3 WHERE id = ?1",
                params![user.id, user.name, user.email],
            )
            .map(|_| ())
        })
    }

    fn remove_user(&self, id: i64) -> Result<(), StoreError> {
        self.staged(|conn| {
            conn.execute("DELETE FROM users WHERE id = ?1", params![id])
                .map(|_| ())
        })
    }

    fn tag(&self, id: i64) -> Result<Option<Tag>, StoreError> {
        let tag = self
            .conn
            .query_row(
                "SELECT id, name FROM tags WHERE id = ?1",
                params![id],
                |row| {
                    Ok(Tag {
                        id: row.get(0)?,
                        name: row.get(1)?,
                    })
                },
            )
            .optional()?;
        Ok(tag)
    }

    fn tags(&self) -> Result<Vec<Tag>, StoreError> {
        let mut stmt = self.conn.prepare("SELECT id, name FROM tags ORDER BY id")?;
        let tags = stmt.query_map([], |row| {
            Ok(Tag {
                id: row.get(0)?,
                name: row.get(1)?,
            })
        })?;
        Ok(tags.collect::<rusqlite::Result<_>>()?)
    }

    fn add_tag(&self, tag: &Tag) -> Result<(), StoreError> {
        self.staged(|conn| {
            conn.execute(
                "INSERT INTO tags (id, name) VALUES (?1, ?2)",
                params![tag.id, tag.name],
            )
            .map(|_| ())
        })
    }

    fn update_tag(&self, tag: &Tag) -> Result<(), StoreError> {
        self.staged(|conn| {
            conn.execute(
                "UPDATE tags SET name = ?2 WHERE id = ?1",
                params![tag.id, tag.name],
            )
            .map(|_| ())
        })
    }

    fn remove_tag(&self, id: i64) -> Result<(), StoreError> {
        self.staged(|conn| {
            conn.execute("DELETE FROM tags WHERE id = ?1", params![id])
                .map(|_| ())
        })
    }

    fn work_item(&self, id: i64) -> Result<Option<WorkItem>, StoreError> {
        let raw = self
            .conn
            .query_row(
                &format!("SELECT {ITEM_COLUMNS} FROM work_items WHERE id = ?1"),
                params![id],
                RawWorkItem::from_row,
            )
            .optional()?;
        raw.map(|raw| self.hydrate_item(raw)).transpose()
    }

    fn work_items(&self) -> Result<Vec<WorkItem>, StoreError> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {ITEM_COLUMNS} FROM work_items ORDER BY id"))?;
        let raws = stmt
            .query_map([], RawWorkItem::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        drop(stmt);

        raws.into_iter()
            .map(|raw| self.hydrate_item(raw))
            .collect()
    }

    fn add_work_item(&self, item: &WorkItem) -> Result<(), StoreError> {
        self.staged(|conn| {
            conn.execute(
                &format!(
                    "INSERT INTO work_items ({ITEM_COLUMNS})
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"
                ),
                params![
                    item.id,
                    item.title,
                    item.description,
                    item.state.as_str(),
                    item.assigned_to,
                    item.created.timestamp_micros(),
                    item.state_updated.timestamp_micros(),
                ],
            )?;
            insert_item_tags(conn, item.id, &item.tags)
        })
    }

    fn update_work_item(&self, item: &WorkItem) -> Result<(), StoreError> {
        self.staged(|conn| {
            conn.execute(
                "UPDATE work_items
                 SET title = ?2, description = ?3, state = ?4, assigned_to = ?5,
                     created_at_us = ?6, state_updated_at_us = ?7
                 WHERE id = ?1",
                params![
                    item.id,
                    item.title,
                    item.description,
                    item.state.as_str(),
                    item.assigned_to,
                    item.created.timestamp_micros(),
                    item.state_updated.timestamp_micros(),
                ],
            )?;
            conn.execute(
                "DELETE FROM work_item_tags WHERE item_id = ?1",
                params![item.id],
            )?;
            insert_item_tags(conn, item.id, &item.tags)
        })
    }

    fn remove_work_item(&self, id: i64) -> Result<(), StoreError> {
        // Join rows cascade via the foreign key.
        self.staged(|conn| {
            conn.execute("DELETE FROM work_items WHERE id = ?1", params![id])
                .map(|_| ())
        })
    }

    fn commit(&self) -> Result<(), StoreError> {
        if self.in_txn.replace(false) {
            if let Err(error) = self.conn.execute_batch("COMMIT") {
                self.in_txn.set(true);
                self.abort();
                return Err(error.into());
            }
        }
        Ok(())
    }

    fn rollback(&self) -> Result<(), StoreError> {
        if self.in_txn.replace(false) {
            self.conn.execute_batch("ROLLBACK")?;
        }
        Ok(())
    }
}

fn insert_item_tags(conn: &Connection, item_id: i64, tags: &[i64]) -> rusqlite::Result<()> {
    let mut stmt =
        conn.prepare_cached("INSERT INTO work_item_tags (item_id, tag_id) VALUES (?1, ?2)")?;
    for tag_id in tags {
        stmt.execute(params![item_id, tag_id])?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{DEFAULT_BUSY_TIMEOUT, SqliteStore};
    use crate::model::{State, Tag, User, WorkItem};
    use crate::store::Storage;
    use tempfile::TempDir;

    fn temp_db_path() -> (TempDir, std::path::PathBuf) {
        let dir = tempfile::tempdir().expect("create temp dir");
        let path = dir.path().join("kanban.sqlite3");
        (dir, path)
    }

    fn user(id: i64, name: &str) -> User {
        User {
            id,
            name: name.into(),
            email: format!("{}@example.com", name.to_ascii_lowercase()),
        }
    }

    fn item(id: i64, title: &str, tags: Vec<i64>) -> WorkItem {
        WorkItem::new(id, title.into(), None, None, tags)
    }

    #[test]
    fn open_sets_wal_busy_timeout_and_fk() {
        let (_dir, path) = temp_db_path();
        let store = SqliteStore::open(&path).expect("open store");

        let journal_mode: String = store
            .conn
            .pragma_query_value(None, "journal_mode", |row| row.get(0))
            .expect("query journal_mode");
        assert_eq!(journal_mode.to_ascii_lowercase(), "wal");

        let busy_timeout_ms: u64 = store
            .conn
            .pragma_query_value(None, "busy_timeout", |row| row.get(0))
            .expect("query busy_timeout");
        assert_eq!(
            u128::from(busy_timeout_ms),
            DEFAULT_BUSY_TIMEOUT.as_millis()
        );

        let foreign_keys: i64 = store
            .conn
            .pragma_query_value(None, "foreign_keys", |row| row.get(0))
            .expect("query foreign_keys");
        assert_eq!(foreign_keys, 1);
    }

    #[test]
    fn scan_preserves_insertion_order() {
        let store = SqliteStore::in_memory().expect("open store");
        store.add_user(&user(1, "Jens")).expect("add");
        store.add_user(&user(2, "Bo")).expect("add");
        store.commit().expect("commit");

        let names: Vec<_> = store
            .users()
            .expect("scan")
            .into_iter()
            .map(|u| u.name)
            .collect();
        assert_eq!(names, ["Jens", "Bo"]);
    }

    #[test]
    fn work_item_roundtrips_with_tags() {
        let store = SqliteStore::in_memory().expect("open store");
        for (id, name) in [(1, "Smart"), (2, "Green")] {
            store
                .add_tag(&Tag {
                    id,
                    name: name.into(),
                })
                .expect("add tag");
        }
        let stored = item(1, "Project", vec![1, 2]);
        store.add_work_item(&stored).expect("add item");
        store.commit().expect("commit");

        let loaded = store.work_item(1).expect("get").expect("present");
        assert_eq!(loaded.title, "Project");
        assert_eq!(loaded.state, State::New);
        assert_eq!(loaded.tags, [1, 2]);
        assert_eq!(loaded.created, stored.created);
    }

    #[test]
    fn commit_persists_across_reopen() {
        let (_dir, path) = temp_db_path();
        {
            let store = SqliteStore::open(&path).expect("open store");
            store.add_user(&user(1, "Jens")).expect("add");
            store.commit().expect("commit");
        }

        let store = SqliteStore::open(&path).expect("reopen store");
        assert!(store.user(1).expect("get").is_some());
    }

    #[test]
    fn rollback_discards_staged_changes() {
        let store = SqliteStore::in_memory().expect("open store");
        store.add_user(&user(1, "Jens")).expect("add");
        store.rollback().expect("rollback");

        assert!(store.user(1).expect("get").is_none());
        assert!(store.users().expect("scan").is_empty());
    }

    #[test]
    fn remove_work_item_cascades_join_rows() {
        let store = SqliteStore::in_memory().expect("open store");
        store
            .add_tag(&Tag {
                id: 1,
                name: "Smart".into(),
            })
            .expect("add tag");
        store.add_work_item(&item(1, "Project", vec![1])).expect("add item");
        store.commit().expect("commit");

        store.remove_work_item(1).expect("remove");
        store.commit().expect("commit");

        let orphans: i64 = store
            .conn
            .query_row("SELECT COUNT(*) FROM work_item_tags", [], |row| row.get(0))
            .expect("count join rows");
        assert_eq!(orphans, 0);
    }

    #[test]
    fn update_work_item_rewrites_tag_associations() {
        let store = SqliteStore::in_memory().expect("open store");
        for (id, name) in [(1, "Smart"), (2, "Green")] {
            store
                .add_tag(&Tag {
                    id,
                    name: name.into(),
                })
                .expect("add tag");
        }
        let mut stored = item(1, "Project", vec![1]);
        store.add_work_item(&stored).expect("add item");
        store.commit().expect("commit");

        stored.tags = vec![2];
        store.update_work_item(&stored).expect("update");
        store.commit().expect("commit");

        let loaded = store.work_item(1).expect("get").expect("present");
        assert_eq!(loaded.tags, [2]);
    }
}
