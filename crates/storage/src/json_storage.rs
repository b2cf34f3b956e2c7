//! JSON file storage implementation.
//!
//! Stores each record as a JSON file under a root directory and keeps small
//! per-record meta markers (version + updated_at). Selection files are named
//! after their (selector, selected) pair, so a pair can never have two records.
//! Records are written to a temporary file and renamed into place, so readers
//! in other processes never see half a record. A file watcher republishes
//! changes made by other processes sharing the directory.

use std::path::{Path, PathBuf};

use fairpick_core::{Selection, User, UserId};
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::watcher::{self, OwnWrites, WatcherHandle};
use super::{ChangeEvent, ChangeFeed, ChangeKind, Result, SelectionStore, StorageError, Subscription, Table};

/// File-based JSON storage backend.
pub struct JsonStorage {
    root: PathBuf,
    write_lock: Mutex<()>,
    feed: ChangeFeed,
    own_writes: OwnWrites,
    _watcher: WatcherHandle,
}

impl JsonStorage {
    /// Open (and if needed create) a store rooted at `root`.
    pub async fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();

        fs::create_dir_all(root.join("users")).await?;
        fs::create_dir_all(root.join("selections")).await?;

        // Meta markers (version + updated_at per record)
        fs::create_dir_all(root.join("meta").join("users")).await?;
        fs::create_dir_all(root.join("meta").join("selections")).await?;

        // Watcher events carry canonical paths on some platforms
        let root = fs::canonicalize(&root).await?;

        let feed = ChangeFeed::default();
        let own_writes = OwnWrites::default();
        let watcher = watcher::spawn(&root, feed.clone(), own_writes.clone())?;

        info!("Opened JSON store at {}", root.display());

        Ok(Self {
            root,
            write_lock: Mutex::new(()),
            feed,
            own_writes,
            _watcher: watcher,
        })
    }

    /// Root directory of the store.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The feed this store publishes changes on.
    pub fn feed(&self) -> &ChangeFeed {
        &self.feed
    }

    fn user_path(&self, id: UserId) -> PathBuf {
        self.root.join("users").join(format!("{}.json", id))
    }

    fn selection_key(selector_id: UserId, selected_id: UserId) -> String {
        format!("{}--{}", selector_id, selected_id)
    }

    fn selection_path(&self, selector_id: UserId, selected_id: UserId) -> PathBuf {
        self.root
            .join("selections")
            .join(format!("{}.json", Self::selection_key(selector_id, selected_id)))
    }

    fn meta_path(&self, kind: &str, id: &str) -> PathBuf {
        self.root.join("meta").join(kind).join(format!("{}.meta.json", id))
    }

    /// Read and increment per-record version, return new version.
    async fn bump_version(&self, kind: &str, id: &str) -> Result<u64> {
        let path = self.meta_path(kind, id);
        let mut version = 0u64;
        if let Ok(s) = fs::read_to_string(&path).await {
            if let Ok(json) = serde_json::from_str::<serde_json::Value>(&s) {
                if let Some(v) = json.get("version").and_then(|v| v.as_u64()) {
                    version = v;
                }
            }
        }
        version += 1;
        let meta = serde_json::json!({"version": version, "updated_at": chrono::Utc::now()});
        write_atomic(&path, &serde_json::to_string_pretty(&meta)?).await?;
        Ok(version)
    }

    /// Write a record file, remembering the contents so the watcher skips it.
    async fn write_record(&self, path: &Path, json: String) -> Result<()> {
        self.own_writes.lock().await.insert(path.to_path_buf(), json.clone());
        write_atomic(path, &json).await
    }

    async fn write_user(&self, user: &User, kind: ChangeKind) -> Result<()> {
        let json = serde_json::to_string_pretty(user)?;
        self.write_record(&self.user_path(user.id), json).await?;

        let id_str = user.id.to_string();
        let version = self.bump_version("users", &id_str).await?;
        debug!("Wrote user {} (v{})", user.id, version);

        self.feed.publish(ChangeEvent::new(Table::Users, kind, user.id));
        Ok(())
    }

    async fn require_user(&self, id: UserId) -> Result<User> {
        read_json(&self.user_path(id))
            .await?
            .ok_or_else(|| StorageError::NotFound(format!("user {}", id)))
    }
}

#[async_trait::async_trait]
impl SelectionStore for JsonStorage {
    async fn list_users(&self, exclude: Option<UserId>, include_archived: bool) -> Result<Vec<User>> {
        let mut users: Vec<User> = list_dir(&self.root.join("users")).await?;
        users.retain(|u| Some(u.id) != exclude && (include_archived || !u.is_archived));
        users.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        Ok(users)
    }

    async fn load_user(&self, id: UserId) -> Result<Option<User>> {
        read_json(&self.user_path(id)).await
    }

    async fn create_user(&self, name: &str) -> Result<User> {
        let _guard = self.write_lock.lock().await;
        let user = User::new(name);
        self.write_user(&user, ChangeKind::Insert).await?;
        info!("Added user {} ({})", user.name, user.id);
        Ok(user)
    }

    async fn update_user_name(&self, id: UserId, name: &str) -> Result<User> {
        let _guard = self.write_lock.lock().await;
        let mut user = self.require_user(id).await?;
        user.name = name.to_string();
        self.write_user(&user, ChangeKind::Update).await?;
        Ok(user)
    }

    async fn set_archived(&self, id: UserId, archived: bool) -> Result<User> {
        let _guard = self.write_lock.lock().await;
        let mut user = self.require_user(id).await?;
        user.is_archived = archived;
        self.write_user(&user, ChangeKind::Update).await?;
        info!("User {} archived={}", user.id, archived);
        Ok(user)
    }

    async fn list_selections(&self, selector_id: UserId) -> Result<Vec<Selection>> {
        let all: Vec<Selection> = list_dir(&self.root.join("selections")).await?;
        Ok(all
            .into_iter()
            .filter(|s| s.selector_id == selector_id)
            .collect())
    }

    async fn upsert_selection_count(
        &self,
        selector_id: UserId,
        candidate_id: UserId,
        count: u32,
    ) -> Result<Selection> {
        let _guard = self.write_lock.lock().await;
        let path = self.selection_path(selector_id, candidate_id);

        let (selection, kind) = match read_json::<Selection>(&path).await? {
            Some(mut existing) => {
                existing.count = count;
                existing.updated_at = chrono::Utc::now();
                (existing, ChangeKind::Update)
            }
            None => (Selection::new(selector_id, candidate_id, count), ChangeKind::Insert),
        };

        let json = serde_json::to_string_pretty(&selection)?;
        self.write_record(&path, json).await?;

        let key = Self::selection_key(selector_id, candidate_id);
        let version = self.bump_version("selections", &key).await?;
        debug!("Set count {} -> {} to {} (v{})", selector_id, candidate_id, count, version);

        self.feed.publish(ChangeEvent::new(Table::Selections, kind, selection.id));
        Ok(selection)
    }

    fn subscribe(&self, table: Table) -> Subscription {
        self.feed.subscribe(table)
    }
}

/// Write `contents` next to `path`, then rename it into place.
async fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let file_name = path
        .file_name()
        .and_then(|s| s.to_str())
        .ok_or_else(|| StorageError::Other(format!("bad record path {}", path.display())))?;
    let tmp = path.with_file_name(format!("{}.{}.tmp", file_name, ulid::Ulid::new()));

    fs::write(&tmp, contents.as_bytes()).await?;
    if let Err(e) = fs::rename(&tmp, path).await {
        let _ = fs::remove_file(&tmp).await;
        return Err(e.into());
    }
    Ok(())
}

async fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    match fs::read_to_string(path).await {
        Ok(json) => {
            let value = serde_json::from_str(&json).map_err(|source| StorageError::Corrupt {
                path: path.display().to_string(),
                source,
            })?;
            Ok(Some(value))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

async fn list_dir<T: serde::de::DeserializeOwned>(dir: &Path) -> Result<Vec<T>> {
    let mut items = Vec::new();
    let mut rd = fs::read_dir(dir).await?;
    while let Some(entry) = rd.next_entry().await? {
        if entry.path().extension().and_then(|s| s.to_str()) != Some("json") {
            continue;
        }
        match read_json(&entry.path()).await {
            Ok(Some(item)) => items.push(item),
            // Removed between listing and reading
            Ok(None) => {}
            Err(e) => {
                warn!("Unreadable record {}: {}", entry.path().display(), e);
                return Err(e);
            }
        }
    }
    Ok(items)
}
