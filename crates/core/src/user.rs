//! Roster members.

use serde::{Deserialize, Serialize};
use crate::id::UserId;
use crate::Time;

/// A teammate on the roster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Unique identifier
    pub id: UserId,

    /// Display name
    pub name: String,

    /// Archived users keep their history but are never offered as reviewers
    #[serde(default)]
    pub is_archived: bool,

    /// When created
    pub created_at: Time,
}

impl User {
    /// Create a new, active roster member.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: UserId::new(),
            name: name.into(),
            is_archived: false,
            created_at: chrono::Utc::now(),
        }
    }

    /// The identity record for this user.
    pub fn as_current(&self) -> CurrentUser {
        CurrentUser {
            id: self.id,
            name: self.name.clone(),
        }
    }
}

/// The user acting in a session, as handed over by the identity boundary.
///
/// Nothing in the core validates this record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentUser {
    /// The acting user's id
    pub id: UserId,
    /// The acting user's display name
    pub name: String,
}
