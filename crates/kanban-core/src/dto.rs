//! Transfer shapes crossing the repository boundary.
//!
//! All shapes are flat: they carry ids, names, and timestamps, never entity
//! references. Repositories accept the `*Create`/`*Update` shapes and produce
//! the read projections.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::State;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserDto {
    pub id: i64,
    pub name: String,
    pub email: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserCreateDto {
    pub name: String,
    pub email: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserUpdateDto {
    pub id: i64,
    pub name: String,
    pub email: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagDto {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagCreateDto {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagUpdateDto {
    pub id: i64,
    pub name: String,
}

/// Summary projection used by every work-item list read.
///
/// `assignee_name` is the empty string when the item is unassigned or the
/// assignee no longer resolves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkItemDto {
    pub id: i64,
    pub title: String,
    pub assignee_name: String,
    pub tag_names: Vec<String>,
    pub state: State,
}

/// Detail projection returned by `WorkItemRepository::find`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkItemDetailsDto {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub created: DateTime<Utc>,
    pub assignee_name: String,
    pub tag_names: Vec<String>,
    pub state: State,
    pub state_updated: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkItemCreateDto {
    pub title: String,
    pub assigned_to_id: Option<i64>,
    pub description: Option<String>,
    pub tag_names: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkItemUpdateDto {
    pub id: i64,
    pub title: String,
    pub assigned_to_id: Option<i64>,
    pub description: Option<String>,
    pub tag_names: Vec<String>,
    pub state: State,
}
