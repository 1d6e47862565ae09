//! Work item CRUD, the lifecycle state machine, and the filtered read
//! projections.
//!
//! Foreign keys are resolved directly against the store: the assignee check
//! happens before any mutation, and tag names are resolved against existing
//! tags only (unknown names are dropped, never created).

use tracing::debug;

use super::{IdSequence, Response};
use crate::dto::{WorkItemCreateDto, WorkItemDetailsDto, WorkItemDto, WorkItemUpdateDto};
use crate::model::{DeleteDisposition, State, WorkItem, now_micros};
use crate::store::{Storage, StoreError};

pub struct WorkItemRepository<'s, S: Storage> {
    store: &'s S,
    ids: IdSequence,
}

impl<'s, S: Storage> WorkItemRepository<'s, S> {
    /// # Errors
    ///
    /// Returns an error if seeding the id sequence from the store fails.
    pub fn new(store: &'s S) -> Result<Self, StoreError> {
        let max_id = store.work_items()?.iter().map(|w| w.id).max().unwrap_or(0);
        Ok(Self {
            store,
            ids: IdSequence::starting_after(max_id),
        })
    }

    /// Create a work item in state `New`.
    ///
    /// Returns `Conflict` with the existing item's id when the title is
    /// taken, and `BadRequest` echoing the supplied assignee id when it does
    /// not resolve to a user. Neither outcome mutates the store.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub fn create(&self, item: &WorkItemCreateDto) -> Result<(Response, i64), StoreError> {
        if let Some(existing) = self
            .store
            .work_items()?
            .into_iter()
            .find(|w| w.title == item.title)
        {
            return Ok((Response::Conflict, existing.id));
        }

        if let Some(user_id) = item.assigned_to_id {
            if self.store.user(user_id)?.is_none() {
                return Ok((Response::BadRequest, user_id));
            }
        }

        let tags = self.resolve_tags(&item.tag_names)?;
        let id = self.ids.next();
        let entity = WorkItem::new(
            id,
            item.title.clone(),
            item.description.clone(),
            item.assigned_to_id,
            tags,
        );
        self.store.add_work_item(&entity)?;
        self.store.commit()?;
        debug!(id, title = %entity.title, "work item created");
        Ok((Response::Created, id))
    }

    /// Lifecycle-aware delete.
    ///
    /// `New` items are removed physically, `Active` items are soft-deleted
    /// to `Removed`, anything else is a `Conflict`.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub fn delete(&self, id: i64) -> Result<Response, StoreError> {
        let Some(mut item) = self.store.work_item(id)? else {
            return Ok(Response::NotFound);
        };

        match item.state.delete_disposition() {
            DeleteDisposition::Hard => {
                self.store.remove_work_item(id)?;
                self.store.commit()?;
                debug!(id, "work item hard-deleted");
                Ok(Response::Deleted)
            }
            DeleteDisposition::Soft => {
                item.state = State::Removed;
                item.state_updated = now_micros();
                self.store.update_work_item(&item)?;
                self.store.commit()?;
                debug!(id, "work item soft-deleted");
                Ok(Response::Deleted)
            }
            DeleteDisposition::Refuse => Ok(Response::Conflict),
        }
    }

    /// Detail projection with resolved assignee name and tag names.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub fn find(&self, id: i64) -> Result<Option<WorkItemDetailsDto>, StoreError> {
        let Some(item) = self.store.work_item(id)? else {
            return Ok(None);
        };

        Ok(Some(WorkItemDetailsDto {
            id: item.id,
            title: item.title,
            description: item.description,
            created: item.created,
            assignee_name: self.assignee_name(item.assigned_to)?,
            tag_names: self.tag_names(&item.tags)?,
            state: item.state,
            state_updated: item.state_updated,
        }))
    }

    /// All work items, ordered by title ascending.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub fn read(&self) -> Result<Vec<WorkItemDto>, StoreError> {
        let items = self.store.work_items()?;
        self.project(items)
    }

    /// Work items in `state`, ordered by title ascending.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub fn read_by_state(&self, state: State) -> Result<Vec<WorkItemDto>, StoreError> {
        let items = self
            .store
            .work_items()?
            .into_iter()
            .filter(|w| w.state == state)
            .collect();
        self.project(items)
    }

    /// Work items carrying the tag named `tag_name`, ordered by title
    /// ascending.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub fn read_by_tag(&self, tag_name: &str) -> Result<Vec<WorkItemDto>, StoreError> {
        let mut matching = Vec::new();
        for item in self.store.work_items()? {
            if self.tag_names(&item.tags)?.iter().any(|n| n == tag_name) {
                matching.push(item);
            }
        }
        self.project(matching)
    }

    /// Work items assigned to `user_id`, ordered by title ascending.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub fn read_by_user(&self, user_id: i64) -> Result<Vec<WorkItemDto>, StoreError> {
        let items = self
            .store
            .work_items()?
            .into_iter()
            .filter(|w| w.assigned_to == Some(user_id))
            .collect();
        self.project(items)
    }

    /// Soft-deleted work items; `read_by_state(Removed)` by definition.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub fn read_removed(&self) -> Result<Vec<WorkItemDto>, StoreError> {
        self.read_by_state(State::Removed)
    }

    /// Overwrite an item.
    ///
    /// The assignee is resolved before anything is written, so `BadRequest`
    /// implies no partial mutation; `assigned_to_id = None` clears the
    /// assignment. The state is always overwritten (no transition graph on
    /// this path), but `state_updated` is refreshed only when the requested
    /// state differs from the stored one.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub fn update(&self, item: &WorkItemUpdateDto) -> Result<Response, StoreError> {
        let Some(mut entity) = self.store.work_item(item.id)? else {
            return Ok(Response::NotFound);
        };

        if let Some(user_id) = item.assigned_to_id {
            if self.store.user(user_id)?.is_none() {
                return Ok(Response::BadRequest);
            }
        }

        entity.title = item.title.clone();
        entity.assigned_to = item.assigned_to_id;
        entity.description = item.description.clone();
        entity.tags = self.resolve_tags(&item.tag_names)?;
        if entity.state != item.state {
            entity.state_updated = now_micros();
        }
        entity.state = item.state;

        self.store.update_work_item(&entity)?;
        self.store.commit()?;
        debug!(id = item.id, state = %item.state, "work item updated");
        Ok(Response::Updated)
    }

    /// Resolve tag names to ids against existing tags; unknown names are
    /// dropped.
    fn resolve_tags(&self, names: &[String]) -> Result<Vec<i64>, StoreError> {
        Ok(self
            .store
            .tags()?
            .into_iter()
            .filter(|tag| names.iter().any(|name| name == &tag.name))
            .map(|tag| tag.id)
            .collect())
    }

    fn tag_names(&self, tag_ids: &[i64]) -> Result<Vec<String>, StoreError> {
        let mut names = Vec::with_capacity(tag_ids.len());
        for id in tag_ids {
            if let Some(tag) = self.store.tag(*id)? {
                names.push(tag.name);
            }
        }
        Ok(names)
    }

    fn assignee_name(&self, assigned_to: Option<i64>) -> Result<String, StoreError> {
        let Some(user_id) = assigned_to else {
            return Ok(String::new());
        };
        Ok(self
            .store
            .user(user_id)?
            .map(|u| u.name)
            .unwrap_or_default())
    }

    fn project(&self, mut items: Vec<WorkItem>) -> Result<Vec<WorkItemDto>, StoreError> {
        items.sort_by(|a, b| a.title.cmp(&b.title));
        items
            .into_iter()
            .map(|item| {
                Ok(WorkItemDto {
                    id: item.id,
                    title: item.title,
                    assignee_name: self.assignee_name(item.assigned_to)?,
                    tag_names: self.tag_names(&item.tags)?,
                    state: item.state,
                })
            })
            .collect()
    }
}
