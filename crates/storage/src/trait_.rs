//! Storage trait abstraction.

use async_trait::async_trait;
use fairpick_core::{Selection, User, UserId};

use crate::feed::{Subscription, Table};

/// Error type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A stored record could not be read back
    #[error("Corrupt record {path}: {source}")]
    Corrupt {
        /// File holding the record
        path: String,
        /// Why it failed to parse
        source: serde_json::Error,
    },

    /// File watching could not be started
    #[error("Watch error: {0}")]
    Watch(#[from] notify::Error),

    /// Item not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Other error
    #[error("{0}")]
    Other(String),
}

/// Read/write gateway to the persisted roster and selection counts.
///
/// Implementations do no selection logic of their own. Every successful
/// mutation is announced to subscribers of the affected table.
#[async_trait]
pub trait SelectionStore: Send + Sync {
    // === User operations ===

    /// List roster members ordered by name, optionally leaving one user out.
    async fn list_users(&self, exclude: Option<UserId>, include_archived: bool) -> Result<Vec<User>>;

    /// Load a user by ID.
    async fn load_user(&self, id: UserId) -> Result<Option<User>>;

    /// Add a new, active user.
    async fn create_user(&self, name: &str) -> Result<User>;

    /// Change a user's display name.
    async fn update_user_name(&self, id: UserId, name: &str) -> Result<User>;

    /// Archive or unarchive a user.
    async fn set_archived(&self, id: UserId, archived: bool) -> Result<User>;

    // === Selection operations ===

    /// All selection records made by one selector.
    async fn list_selections(&self, selector_id: UserId) -> Result<Vec<Selection>>;

    /// Set the count for a pair, creating the record if the pair has none.
    ///
    /// The pair is the key: an existing record keeps its id.
    async fn upsert_selection_count(
        &self,
        selector_id: UserId,
        candidate_id: UserId,
        count: u32,
    ) -> Result<Selection>;

    // === Change notification ===

    /// Subscribe to changes on one table.
    fn subscribe(&self, table: Table) -> Subscription;
}
