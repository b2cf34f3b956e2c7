//! Test doubles shared by the session tests.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use fairpick_core::{Selection, User, UserId};
use fairpick_storage::{JsonStorage, Result, SelectionStore, StorageError, Subscription, Table};
use tempfile::TempDir;

/// A JSON store whose reads or writes can be switched off.
pub struct FlakyStore {
    inner: JsonStorage,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    fail_reads_after_write: AtomicBool,
}

impl FlakyStore {
    pub fn inner(&self) -> &JsonStorage {
        &self.inner
    }

    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Let the next write succeed, then fail every read.
    pub fn fail_reads_after_next_write(&self) {
        self.fail_reads_after_write.store(true, Ordering::SeqCst);
    }

    fn after_write<T>(&self, result: Result<T>) -> Result<T> {
        if result.is_ok() && self.fail_reads_after_write.swap(false, Ordering::SeqCst) {
            self.fail_reads(true);
        }
        result
    }

    fn check_read(&self) -> Result<()> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StorageError::Other("store unreachable".to_string()));
        }
        Ok(())
    }

    fn check_write(&self) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StorageError::Other("write rejected".to_string()));
        }
        Ok(())
    }
}

pub async fn open_store() -> (TempDir, Arc<FlakyStore>) {
    let dir = TempDir::new().unwrap();
    let inner = JsonStorage::new(dir.path()).await.unwrap();
    let store = FlakyStore {
        inner,
        fail_reads: AtomicBool::new(false),
        fail_writes: AtomicBool::new(false),
        fail_reads_after_write: AtomicBool::new(false),
    };
    (dir, Arc::new(store))
}

#[async_trait]
impl SelectionStore for FlakyStore {
    async fn list_users(&self, exclude: Option<UserId>, include_archived: bool) -> Result<Vec<User>> {
        self.check_read()?;
        self.inner.list_users(exclude, include_archived).await
    }

    async fn load_user(&self, id: UserId) -> Result<Option<User>> {
        self.check_read()?;
        self.inner.load_user(id).await
    }

    async fn create_user(&self, name: &str) -> Result<User> {
        self.check_write()?;
        self.after_write(self.inner.create_user(name).await)
    }

    async fn update_user_name(&self, id: UserId, name: &str) -> Result<User> {
        self.check_write()?;
        self.after_write(self.inner.update_user_name(id, name).await)
    }

    async fn set_archived(&self, id: UserId, archived: bool) -> Result<User> {
        self.check_write()?;
        self.after_write(self.inner.set_archived(id, archived).await)
    }

    async fn list_selections(&self, selector_id: UserId) -> Result<Vec<Selection>> {
        self.check_read()?;
        self.inner.list_selections(selector_id).await
    }

    async fn upsert_selection_count(
        &self,
        selector_id: UserId,
        candidate_id: UserId,
        count: u32,
    ) -> Result<Selection> {
        self.check_write()?;
        self.after_write(self.inner.upsert_selection_count(selector_id, candidate_id, count).await)
    }

    fn subscribe(&self, table: Table) -> Subscription {
        self.inner.subscribe(table)
    }
}
