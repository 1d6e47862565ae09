//! User CRUD and the delete-blocked-while-referenced rule.

use tracing::debug;

use super::{IdSequence, Response};
use crate::dto::{UserCreateDto, UserDto, UserUpdateDto};
use crate::model::User;
use crate::store::{Storage, StoreError};

pub struct UserRepository<'s, S: Storage> {
    store: &'s S,
    ids: IdSequence,
}

impl<'s, S: Storage> UserRepository<'s, S> {
    /// # Errors
    ///
    /// Returns an error if seeding the id sequence from the store fails.
    pub fn new(store: &'s S) -> Result<Self, StoreError> {
        let max_id = store.users()?.iter().map(|u| u.id).max().unwrap_or(0);
        Ok(Self {
            store,
            ids: IdSequence::starting_after(max_id),
        })
    }

    /// Create a user unless one with identical name and email exists.
    ///
    /// On conflict the existing user's id is returned and nothing changes.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub fn create(&self, user: &UserCreateDto) -> Result<(Response, i64), StoreError> {
        if let Some(existing) = self
            .store
            .users()?
            .into_iter()
            .find(|u| u.name == user.name && u.email == user.email)
        {
            return Ok((Response::Conflict, existing.id));
        }

        let id = self.ids.next();
        self.store.add_user(&User {
            id,
            name: user.name.clone(),
            email: user.email.clone(),
        })?;
        self.store.commit()?;
        debug!(id, name = %user.name, "user created");
        Ok((Response::Created, id))
    }

    /// Delete a user.
    ///
    /// Blocked with `Conflict` while any work item is assigned to the user,
    /// unless `force` is set. Force deletion does not clear the assignment
    /// on referencing items.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub fn delete(&self, id: i64, force: bool) -> Result<Response, StoreError> {
        if self.store.user(id)?.is_none() {
            return Ok(Response::NotFound);
        }

        if !force {
            let referenced = self
                .store
                .work_items()?
                .iter()
                .any(|item| item.assigned_to == Some(id));
            if referenced {
                return Ok(Response::Conflict);
            }
        }

        self.store.remove_user(id)?;
        self.store.commit()?;
        debug!(id, force, "user deleted");
        Ok(Response::Deleted)
    }

    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub fn find(&self, id: i64) -> Result<Option<UserDto>, StoreError> {
        Ok(self.store.user(id)?.map(to_dto))
    }

    /// All users in store (insertion) order.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub fn read(&self) -> Result<Vec<UserDto>, StoreError> {
        Ok(self.store.users()?.into_iter().map(to_dto).collect())
    }

    /// Overwrite name and email in place.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub fn update(&self, user: &UserUpdateDto) -> Result<Response, StoreError> {
        let Some(mut entity) = self.store.user(user.id)? else {
            return Ok(Response::NotFound);
        };

        entity.name = user.name.clone();
        entity.email = user.email.clone();
        self.store.update_user(&entity)?;
        self.store.commit()?;
        Ok(Response::Updated)
    }
}

fn to_dto(user: User) -> UserDto {
    UserDto {
        id: user.id,
        name: user.name,
        email: user.email,
    }
}

#[cfg(test)]
mod tests {
    use super::UserRepository;
    use crate::dto::{UserCreateDto, UserUpdateDto};
    use crate::model::{State, User, WorkItem};
    use crate::repo::Response;
    use crate::store::{SqliteStore, Storage};

    /// Users Bob and Frederick, plus one work item assigned to Frederick.
    fn seeded_store() -> SqliteStore {
        let store = SqliteStore::in_memory().expect("open store");
        for (id, name, email) in [(1, "Bob", "something@"), (2, "Frederick", "anotherthing@")] {
            store
                .add_user(&User {
                    id,
                    name: name.into(),
                    email: email.into(),
                })
                .expect("add user");
        }
        let mut task = WorkItem::new(1, "Task1".into(), None, Some(2), Vec::new());
        task.state = State::Active;
        store.add_work_item(&task).expect("add item");
        store.commit().expect("commit");
        store
    }

    #[test]
    fn create_returns_created_with_next_id() {
        let store = seeded_store();
        let repo = UserRepository::new(&store).expect("repo");

        let (response, id) = repo
            .create(&UserCreateDto {
                name: "Ib".into(),
                email: "ib@itu.dk".into(),
            })
            .expect("create");
        assert_eq!(response, Response::Created);
        assert_eq!(id, 3);
    }

    #[test]
    fn create_duplicate_name_and_email_returns_conflict_with_existing_id() {
        let store = seeded_store();
        let repo = UserRepository::new(&store).expect("repo");

        let (response, id) = repo
            .create(&UserCreateDto {
                name: "Bob".into(),
                email: "something@".into(),
            })
            .expect("create");
        assert_eq!(response, Response::Conflict);
        assert_eq!(id, 1);
        assert_eq!(repo.read().expect("read").len(), 2);
    }

    #[test]
    fn create_same_name_different_email_is_allowed() {
        let store = seeded_store();
        let repo = UserRepository::new(&store).expect("repo");

        let (response, id) = repo
            .create(&UserCreateDto {
                name: "Bob".into(),
                email: "other@".into(),
            })
            .expect("create");
        assert_eq!(response, Response::Created);
        assert_eq!(id, 3);
    }

    #[test]
    fn delete_unreferenced_user_returns_deleted() {
        let store = seeded_store();
        let repo = UserRepository::new(&store).expect("repo");

        assert_eq!(repo.delete(1, false).expect("delete"), Response::Deleted);
        assert!(repo.find(1).expect("find").is_none());
    }

    #[test]
    fn delete_missing_user_returns_not_found() {
        let store = seeded_store();
        let repo = UserRepository::new(&store).expect("repo");

        assert_eq!(repo.delete(4, true).expect("delete"), Response::NotFound);
    }

    #[test]
    fn delete_referenced_user_without_force_returns_conflict() {
        let store = seeded_store();
        let repo = UserRepository::new(&store).expect("repo");

        assert_eq!(repo.delete(2, false).expect("delete"), Response::Conflict);
        assert!(repo.find(2).expect("find").is_some());
    }

    #[test]
    fn delete_referenced_user_with_force_returns_deleted() {
        let store = seeded_store();
        let repo = UserRepository::new(&store).expect("repo");

        assert_eq!(repo.delete(2, true).expect("delete"), Response::Deleted);
        // The assignment is left dangling on purpose.
        let item = store.work_item(1).expect("get").expect("present");
        assert_eq!(item.assigned_to, Some(2));
    }

    #[test]
    fn ids_are_not_reused_after_delete() {
        let store = seeded_store();
        let repo = UserRepository::new(&store).expect("repo");

        repo.delete(2, true).expect("delete");
        let (_, id) = repo
            .create(&UserCreateDto {
                name: "Ib".into(),
                email: "ib@itu.dk".into(),
            })
            .expect("create");
        assert_eq!(id, 3);
    }

    #[test]
    fn read_returns_users_in_store_order() {
        let store = seeded_store();
        let repo = UserRepository::new(&store).expect("repo");

        let names: Vec<_> = repo
            .read()
            .expect("read")
            .into_iter()
            .map(|u| u.name)
            .collect();
        assert_eq!(names, ["Bob", "Frederick"]);
    }

    #[test]
    fn find_round_trips_created_user() {
        let store = seeded_store();
        let repo = UserRepository::new(&store).expect("repo");

        let (_, id) = repo
            .create(&UserCreateDto {
                name: "Ib".into(),
                email: "ib@itu.dk".into(),
            })
            .expect("create");
        let dto = repo.find(id).expect("find").expect("present");
        assert_eq!(dto.name, "Ib");
        assert_eq!(dto.email, "ib@itu.dk");
    }

    #[test]
    fn update_overwrites_name_and_email() {
        let store = seeded_store();
        let repo = UserRepository::new(&store).expect("repo");

        let response = repo
            .update(&UserUpdateDto {
                id: 2,
                name: "FrederickUpdated".into(),
                email: "mailUpdated@".into(),
            })
            .expect("update");
        assert_eq!(response, Response::Updated);

        let dto = repo.find(2).expect("find").expect("present");
        assert_eq!(dto.name, "FrederickUpdated");
        assert_eq!(dto.email, "mailUpdated@");
    }

    #[test]
    fn update_missing_user_returns_not_found() {
        let store = seeded_store();
        let repo = UserRepository::new(&store).expect("repo");

        let response = repo
            .update(&UserUpdateDto {
                id: 5,
                name: "Nobody".into(),
                email: "nobody@".into(),
            })
            .expect("update");
        assert_eq!(response, Response::NotFound);
    }
}
