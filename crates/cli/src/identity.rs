//! Signed-in user, kept next to the store.

use std::path::{Path, PathBuf};

use anyhow::Result;
use fairpick_core::CurrentUser;
use tokio::fs;

fn current_user_path(store_root: &Path) -> PathBuf {
    store_root.join("current_user.json")
}

/// The signed-in user, if any.
pub async fn load(store_root: &Path) -> Result<Option<CurrentUser>> {
    match fs::read_to_string(current_user_path(store_root)).await {
        Ok(json) => Ok(Some(serde_json::from_str(&json)?)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Remember `user` as the signed-in user.
pub async fn save(store_root: &Path, user: &CurrentUser) -> Result<()> {
    let json = serde_json::to_string_pretty(user)?;
    fs::write(current_user_path(store_root), json.as_bytes()).await?;
    Ok(())
}

/// Forget the signed-in user. Signing out twice is fine.
pub async fn clear(store_root: &Path) -> Result<()> {
    fs::remove_file(current_user_path(store_root)).await.or_else(|e| {
        if e.kind() == std::io::ErrorKind::NotFound { Ok(()) } else { Err(e) }
    })?;
    Ok(())
}
