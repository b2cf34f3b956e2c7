//! Session errors.

use fairpick_core::UserId;
use fairpick_storage::StorageError;

/// Result type for session operations.
pub type Result<T> = std::result::Result<T, SessionError>;

/// Errors surfaced by sessions and roster management.
///
/// None of these are fatal; the session keeps its last good snapshot.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Reading or writing the store failed
    #[error("persistence failure: {0}")]
    Persistence(#[from] StorageError),

    /// A user name was empty after trimming
    #[error("please enter a name")]
    EmptyName,

    /// The user is not a candidate for this selector
    #[error("{0} is not an eligible reviewer")]
    UnknownCandidate(UserId),

    /// No such user on the roster
    #[error("no user with id {0}")]
    UnknownUser(UserId),
}
