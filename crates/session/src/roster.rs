//! Team roster management.

use std::sync::Arc;

use fairpick_core::{User, UserId};
use fairpick_storage::{SelectionStore, StorageError};
use tracing::info;

use crate::{Result, SessionError};

/// Adds, renames, archives and lists roster members.
pub struct RosterManager<S: SelectionStore> {
    store: Arc<S>,
}

impl<S: SelectionStore> RosterManager<S> {
    /// Create a roster manager over `store`.
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Everyone on the roster: active members first, each group by name.
    pub async fn roster(&self) -> Result<Vec<User>> {
        let mut users = self.store.list_users(None, true).await?;
        // Stable sort keeps the store's name ordering within each group.
        users.sort_by_key(|u| u.is_archived);
        Ok(users)
    }

    /// Add a new member.
    pub async fn add(&self, name: &str) -> Result<User> {
        let name = clean_name(name)?;
        let user = self.store.create_user(name).await?;
        info!("User {} added successfully", user.name);
        Ok(user)
    }

    /// Rename a member.
    pub async fn rename(&self, id: UserId, name: &str) -> Result<User> {
        let name = clean_name(name)?;
        self.store
            .update_user_name(id, name)
            .await
            .map_err(|e| unknown_user(id, e))
    }

    /// Archive an active member or bring back an archived one.
    pub async fn toggle_archived(&self, id: UserId) -> Result<User> {
        let user = self.require(id).await?;
        self.set_archived(user.id, !user.is_archived).await
    }

    /// Set a member's archived flag explicitly.
    pub async fn set_archived(&self, id: UserId, archived: bool) -> Result<User> {
        let user = self
            .store
            .set_archived(id, archived)
            .await
            .map_err(|e| unknown_user(id, e))?;
        info!(
            "User {} {} successfully",
            user.name,
            if archived { "archived" } else { "unarchived" }
        );
        Ok(user)
    }

    async fn require(&self, id: UserId) -> Result<User> {
        self.store
            .load_user(id)
            .await?
            .ok_or(SessionError::UnknownUser(id))
    }
}

fn unknown_user(id: UserId, e: StorageError) -> SessionError {
    match e {
        StorageError::NotFound(_) => SessionError::UnknownUser(id),
        e => e.into(),
    }
}

fn clean_name(name: &str) -> Result<&str> {
    let name = name.trim();
    if name.is_empty() {
        return Err(SessionError::EmptyName);
    }
    Ok(name)
}
