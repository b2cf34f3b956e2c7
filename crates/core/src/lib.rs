//! Fairpick core data models and the fair-selection engine.
//!
//! This crate defines the roster and selection-count records and the pure
//! functions that pick the next reviewer from them.

#![warn(missing_docs)]

// Core identities
mod id;

// Roster and counts
mod user;
mod selection;

// Selection logic
pub mod engine;

// Re-exports
pub use id::*;
pub use user::{User, CurrentUser};
pub use selection::Selection;
pub use engine::{
    choose_reviewer, apply_count_adjustment, adjusted_count, count_for,
    SelectionSnapshot, Standing,
};

/// Timestamp type
pub type Time = chrono::DateTime<chrono::Utc>;
