//! Entity repository layer for a kanban-style task tracker.
//!
//! Three related entity types — users, tags, and work items — live behind
//! typed repositories that enforce id allocation, referential integrity, and
//! the work-item lifecycle state machine on top of a SQLite store.
//!
//! # Conventions
//!
//! - **Errors**: expected outcomes (missing entity, duplicate title, invalid
//!   assignee, illegal delete) are [`repo::Response`] values; `Err` is
//!   reserved for storage faults and aborts the call with no partial commit.
//! - **Logging**: `tracing` macros at mutation points; no subscriber is
//!   installed by this crate.
//!
//! # Usage sketch
//!
//! ```rust,no_run
//! use kanban_core::dto::WorkItemCreateDto;
//! use kanban_core::repo::WorkItemRepository;
//! use kanban_core::store::open_store;
//!
//! # fn main() -> anyhow::Result<()> {
//! let store = open_store("kanban.sqlite3".as_ref())?;
//! let items = WorkItemRepository::new(&store)?;
//! let (response, id) = items.create(&WorkItemCreateDto {
//!     title: "Fix flaky login".into(),
//!     assigned_to_id: None,
//!     description: None,
//!     tag_names: vec!["Bug".into()],
//! })?;
//! println!("{response}: {id}");
//! # Ok(())
//! # }
//! ```

pub mod dto;
pub mod model;
pub mod repo;
pub mod store;

pub use model::State;
pub use repo::{Response, TagRepository, UserRepository, WorkItemRepository};
pub use store::{SqliteStore, Storage, StoreError, open_store};
