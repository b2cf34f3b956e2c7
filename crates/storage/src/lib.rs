//! Storage abstraction and implementations for Fairpick.
//!
//! This crate provides the trait-based gateway to persisted users and
//! selection counts, change notification, and a JSON file implementation whose
//! notifications also cover writes made by other processes.

#![warn(missing_docs)]

pub mod trait_;
pub mod feed;
pub mod json_storage;
mod watcher;

pub use trait_::{SelectionStore, StorageError, Result};
pub use feed::{ChangeEvent, ChangeFeed, ChangeKind, Subscription, Table, DEFAULT_FEED_CAPACITY};
pub use json_storage::JsonStorage;
