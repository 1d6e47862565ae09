//! Canonical SQLite schema for the kanban store.
//!
//! - `users`, `tags`, `work_items` keep one row per entity
//! - `work_item_tags` models the many-to-many tag association
//! - ids are allocated by the repositories, so primary keys are plain
//!   `INTEGER PRIMARY KEY` columns, never `AUTOINCREMENT`
//! - `work_items.assigned_to` carries no foreign-key constraint: force
//!   deleting a user leaves the reference dangling, and projections render
//!   a dangling assignee as an empty name

use rusqlite::{Connection, types::Type};

/// Migration v1: the three entity tables plus the tag join table.
pub const MIGRATION_V1_SQL: &str = "
CREATE TABLE IF NOT EXISTS users (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    email TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS tags (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS work_items (
    id INTEGER PRIMARY KEY,
    title TEXT NOT NULL,
    description TEXT,
    state TEXT NOT NULL CHECK (state IN ('new', 'active', 'closed', 'removed')),
    assigned_to INTEGER,
    created_at_us INTEGER NOT NULL,
    state_updated_at_us INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS work_item_tags (
    item_id INTEGER NOT NULL REFERENCES work_items(id) ON DELETE CASCADE,
    tag_id INTEGER NOT NULL REFERENCES tags(id) ON DELETE CASCADE,
    PRIMARY KEY (item_id, tag_id)
);
";

/// Latest schema version understood by this crate.
pub const LATEST_SCHEMA_VERSION: u32 = 1;

const MIGRATIONS: &[(u32, &str)] = &[(1, MIGRATION_V1_SQL)];

/// Read `PRAGMA user_version` and convert it to a Rust `u32`.
///
/// # Errors
///
/// Returns an error if querying SQLite fails or the version value cannot be
/// represented as `u32`.
pub fn current_schema_version(conn: &Connection) -> rusqlite::Result<u32> {
    let version: i64 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;
    u32::try_from(version).map_err(|error| {
        rusqlite::Error::FromSqlConversionFailure(0, Type::Integer, Box::new(error))
    })
}

/// Apply all pending migrations in ascending order.
///
/// Idempotent: each migration only runs when its version exceeds
/// `user_version`, and the DDL itself uses `IF NOT EXISTS`.
///
/// # Errors
///
/// Returns an error if any migration fails.
pub fn migrate(conn: &mut Connection) -> rusqlite::Result<u32> {
    let mut current = current_schema_version(conn)?;

    for (version, sql) in MIGRATIONS {
        if *version <= current {
            continue;
        }

        let tx = conn.transaction()?;
        tx.execute_batch(sql)?;
        tx.pragma_update(None, "user_version", i64::from(*version))?;
        tx.commit()?;
        current = *version;
    }

    Ok(current)
}
