//! Domain entities and the work-item lifecycle rules.
//!
//! Relationships are modelled as id-based foreign keys (`WorkItem::assigned_to`,
//! `WorkItem::tags`) rather than live object references; projections resolve
//! them against the store on demand.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// A person work items can be assigned to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub email: String,
}

/// A label shared by many work items (many-to-many).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub id: i64,
    pub name: String,
}

/// The four lifecycle states of a work item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum State {
    New,
    Active,
    Closed,
    Removed,
}

impl State {
    pub(crate) const fn as_str(self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Active => "active",
            Self::Closed => "closed",
            Self::Removed => "removed",
        }
    }

    /// What a delete request does to an item in this state.
    ///
    /// - `New` items are physically removed.
    /// - `Active` items are soft-deleted to `Removed`.
    /// - `Closed` and `Removed` items refuse deletion.
    ///
    /// Explicit updates are not bound by this rule and may set any state.
    #[must_use]
    pub const fn delete_disposition(self) -> DeleteDisposition {
        match self {
            Self::New => DeleteDisposition::Hard,
            Self::Active => DeleteDisposition::Soft,
            Self::Closed | Self::Removed => DeleteDisposition::Refuse,
        }
    }
}

/// Outcome of applying the delete rule to a [`State`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteDisposition {
    /// Physically remove the entity.
    Hard,
    /// Keep the entity, mark it `Removed`.
    Soft,
    /// No further transition permitted via delete.
    Refuse,
}

/// Error returned when parsing a [`State`] from text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseStateError {
    pub got: String,
}

impl fmt::Display for ParseStateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid state: '{}'", self.got)
    }
}

impl std::error::Error for ParseStateError {}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for State {
    type Err = ParseStateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "new" => Ok(Self::New),
            "active" => Ok(Self::Active),
            "closed" => Ok(Self::Closed),
            "removed" => Ok(Self::Removed),
            _ => Err(ParseStateError { got: s.to_string() }),
        }
    }
}

/// Current time truncated to microsecond precision, matching what the
/// store persists so entities survive a round trip unchanged.
pub(crate) fn now_micros() -> DateTime<Utc> {
    let now = Utc::now();
    DateTime::from_timestamp_micros(now.timestamp_micros()).unwrap_or(now)
}

/// A tracked unit of work.
///
/// `tags` holds tag ids resolved at write time; `created` is stamped once,
/// `state_updated` only when `state` actually changes value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkItem {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub state: State,
    pub assigned_to: Option<i64>,
    pub tags: Vec<i64>,
    pub created: DateTime<Utc>,
    pub state_updated: DateTime<Utc>,
}

impl WorkItem {
    /// Construct a freshly created item: state `New`, both timestamps now.
    #[must_use]
    pub fn new(
        id: i64,
        title: String,
        description: Option<String>,
        assigned_to: Option<i64>,
        tags: Vec<i64>,
    ) -> Self {
        let now = now_micros();
        Self {
            id,
            title,
            description,
            state: State::New,
            assigned_to,
            tags,
            created: now,
            state_updated: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{DeleteDisposition, State, WorkItem};
    use std::str::FromStr;

    #[test]
    fn state_json_roundtrips() {
        assert_eq!(serde_json::to_string(&State::New).unwrap(), "\"new\"");
        assert_eq!(
            serde_json::to_string(&State::Removed).unwrap(),
            "\"removed\""
        );
        assert_eq!(
            serde_json::from_str::<State>("\"active\"").unwrap(),
            State::Active
        );
        assert_eq!(
            serde_json::from_str::<State>("\"closed\"").unwrap(),
            State::Closed
        );
    }

    #[test]
    fn state_display_parse_roundtrips() {
        for state in [State::New, State::Active, State::Closed, State::Removed] {
            let rendered = state.to_string();
            assert_eq!(State::from_str(&rendered).unwrap(), state);
        }
    }

    #[test]
    fn state_parse_rejects_unknown_values() {
        assert!(State::from_str("open").is_err());
        assert!(State::from_str("").is_err());
    }

    #[test]
    fn delete_disposition_per_state() {
        assert_eq!(State::New.delete_disposition(), DeleteDisposition::Hard);
        assert_eq!(State::Active.delete_disposition(), DeleteDisposition::Soft);
        assert_eq!(State::Closed.delete_disposition(), DeleteDisposition::Refuse);
        assert_eq!(
            State::Removed.delete_disposition(),
            DeleteDisposition::Refuse
        );
    }

    #[test]
    fn new_item_starts_new_with_equal_timestamps() {
        let item = WorkItem::new(1, "Project".into(), None, None, Vec::new());
        assert_eq!(item.state, State::New);
        assert_eq!(item.created, item.state_updated);
    }

    #[test]
    fn new_item_timestamps_have_microsecond_precision() {
        let item = WorkItem::new(1, "Project".into(), None, None, Vec::new());
        assert_eq!(item.created.timestamp_subsec_nanos() % 1_000, 0);
        assert_eq!(item.state_updated.timestamp_subsec_nanos() % 1_000, 0);
    }
}
