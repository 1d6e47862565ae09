//! Entity repositories.
//!
//! Each repository holds a shared reference to the [`Storage`] handle plus
//! its own [`IdSequence`]. Every operation runs to completion against the
//! store before returning; mutating operations finish with a single
//! `commit`. Expected failure conditions resolve to a [`Response`] value,
//! never an `Err` and never a panic.

pub mod item;
pub mod tag;
pub mod user;

pub use item::WorkItemRepository;
pub use tag::TagRepository;
pub use user::UserRepository;

use serde::{Deserialize, Serialize};
use std::cell::Cell;
use std::fmt;

/// Outcome of a repository operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Response {
    Created,
    Updated,
    Deleted,
    NotFound,
    Conflict,
    BadRequest,
}

impl Response {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Updated => "updated",
            Self::Deleted => "deleted",
            Self::NotFound => "not found",
            Self::Conflict => "conflict",
            Self::BadRequest => "bad request",
        }
    }
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Monotonic id allocator for one entity type.
///
/// Seeded from `max(existing ids)` when the owning repository is
/// constructed, so the first id of an empty store is 1 and ids are never
/// reused within a run, even after deleting the highest one.
#[derive(Debug)]
pub struct IdSequence {
    next: Cell<i64>,
}

impl IdSequence {
    /// Start allocating after the highest id already in the store.
    #[must_use]
    pub const fn starting_after(max_existing: i64) -> Self {
        Self {
            next: Cell::new(max_existing + 1),
        }
    }

    /// Take the next id.
    #[must_use]
    pub fn next(&self) -> i64 {
        let id = self.next.get();
        self.next.set(id + 1);
        id
    }
}
