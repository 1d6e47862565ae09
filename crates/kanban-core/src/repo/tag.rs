//! Tag CRUD.
//!
//! Creation allocates unconditionally (duplicate names are a caller
//! concern); reads are ordered by name.

use tracing::debug;

use super::{IdSequence, Response};
use crate::dto::{TagCreateDto, TagDto, TagUpdateDto};
use crate::model::Tag;
use crate::store::{Storage, StoreError};

pub struct TagRepository<'s, S: Storage> {
    store: &'s S,
    ids: IdSequence,
}

impl<'s, S: Storage> TagRepository<'s, S> {
    /// # Errors
    ///
    /// Returns an error if seeding the id sequence from the store fails.
    pub fn new(store: &'s S) -> Result<Self, StoreError> {
        let max_id = store.tags()?.iter().map(|t| t.id).max().unwrap_or(0);
        Ok(Self {
            store,
            ids: IdSequence::starting_after(max_id),
        })
    }

    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub fn create(&self, tag: &TagCreateDto) -> Result<(Response, i64), StoreError> {
        let id = self.ids.next();
        self.store.add_tag(&Tag {
            id,
            name: tag.name.clone(),
        })?;
        self.store.commit()?;
        debug!(id, name = %tag.name, "tag created");
        Ok((Response::Created, id))
    }

    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub fn delete(&self, id: i64) -> Result<Response, StoreError> {
        if self.store.tag(id)?.is_none() {
            return Ok(Response::NotFound);
        }
        self.store.remove_tag(id)?;
        self.store.commit()?;
        debug!(id, "tag deleted");
        Ok(Response::Deleted)
    }

    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub fn find(&self, id: i64) -> Result<Option<TagDto>, StoreError> {
        Ok(self.store.tag(id)?.map(to_dto))
    }

    /// All tags ordered by name, not by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub fn read(&self) -> Result<Vec<TagDto>, StoreError> {
        let mut tags = self.store.tags()?;
        tags.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(tags.into_iter().map(to_dto).collect())
    }

    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub fn update(&self, tag: &TagUpdateDto) -> Result<Response, StoreError> {
        let Some(mut entity) = self.store.tag(tag.id)? else {
            return Ok(Response::NotFound);
        };

        entity.name = tag.name.clone();
        self.store.update_tag(&entity)?;
        self.store.commit()?;
        Ok(Response::Updated)
    }
}

fn to_dto(tag: Tag) -> TagDto {
    TagDto {
        id: tag.id,
        name: tag.name,
    }
}
