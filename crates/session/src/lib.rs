//! Selection sessions - the glue between the store and the selection engine.
//!
//! A session loads one selector's snapshot from a [`SelectionStore`], asks the
//! engine for a reviewer or a count adjustment, writes the result back, and
//! reloads. Roster management lives alongside in [`RosterManager`].
//!
//! [`SelectionStore`]: fairpick_storage::SelectionStore

#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod controller;
pub mod roster;

pub use config::SessionConfig;
pub use error::{SessionError, Result};
pub use controller::{SelectionSession, ChooseOutcome, SessionWatch};
pub use roster::RosterManager;

#[cfg(test)]
mod testing;
