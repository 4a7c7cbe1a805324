//! Favorite Spaces persisted as a JSON array of ids.
//!
//! The backing file is read and rewritten in full on every mutation. All
//! operations on one [`FavoritesStore`] are serialized through a single
//! mutex, and writes go through a temporary file that is renamed into place,
//! so a crash mid-write never leaves a truncated list behind.
//!
//! A missing or empty file is an empty list. A file that does not parse is
//! also treated as empty (with a warning); the next mutation overwrites it.

use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{info, warn};

#[derive(Debug, thiserror::Error)]
pub enum FavoritesError {
    #[error("Failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to serialize favorites: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("Invalid path: {0}")]
    InvalidPath(String),
}

pub type FavoritesResult<T> = std::result::Result<T, FavoritesError>;

/// Outcome of [`FavoritesStore::add`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    Added,
    AlreadyPresent,
}

/// Outcome of [`FavoritesStore::remove`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoveOutcome {
    Removed,
    NotPresent,
}

#[derive(Debug)]
pub struct FavoritesStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FavoritesStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    /// Store at `favorite_spaces.json` inside `dir`.
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        Self::new(dir.as_ref().join(crate::config::FAVORITES_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current favorites. Never fails: unreadable or corrupt files yield `[]`.
    pub async fn list(&self) -> Vec<String> {
        let _guard = self.lock.lock().await;
        self.load().await
    }

    pub async fn add(&self, space_id: &str) -> FavoritesResult<AddOutcome> {
        let _guard = self.lock.lock().await;
        let mut favorites = self.load().await;

        if favorites.iter().any(|id| id == space_id) {
            info!("Space '{}' is already in favorites", space_id);
            return Ok(AddOutcome::AlreadyPresent);
        }

        favorites.push(space_id.to_string());
        self.save(&favorites).await?;
        Ok(AddOutcome::Added)
    }

    pub async fn remove(&self, space_id: &str) -> FavoritesResult<RemoveOutcome> {
        let _guard = self.lock.lock().await;
        let mut favorites = self.load().await;

        let before = favorites.len();
        favorites.retain(|id| id != space_id);
        if favorites.len() == before {
            info!("Space '{}' is not in favorites", space_id);
            return Ok(RemoveOutcome::NotPresent);
        }

        self.save(&favorites).await?;
        Ok(RemoveOutcome::Removed)
    }

    async fn load(&self) -> Vec<String> {
        let contents = match fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Vec::new(),
            Err(e) => {
                warn!("Could not read {}: {}", self.path.display(), e);
                return Vec::new();
            }
        };

        if contents.trim().is_empty() {
            return Vec::new();
        }

        match serde_json::from_str::<Vec<String>>(&contents) {
            Ok(favorites) => dedup_preserving_order(favorites),
            Err(e) => {
                warn!(
                    "Could not decode JSON from {}: {}. Starting with an empty list.",
                    self.path.display(),
                    e
                );
                Vec::new()
            }
        }
    }

    async fn save(&self, favorites: &[String]) -> FavoritesResult<()> {
        let json = serde_json::to_vec_pretty(favorites)?;
        self.write_atomically(&json).await
    }

    async fn write_atomically(&self, data: &[u8]) -> FavoritesResult<()> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            Some(_) => PathBuf::from("."),
            None => {
                return Err(FavoritesError::InvalidPath(
                    self.path.display().to_string(),
                ));
            }
        };
        let write_err = |source| FavoritesError::Write {
            path: self.path.clone(),
            source,
        };

        fs::create_dir_all(&dir).await.map_err(write_err)?;

        let temp_file = NamedTempFile::new_in(&dir).map_err(write_err)?;
        let (std_file, temp_path) = temp_file.into_parts();
        let mut file = fs::File::from_std(std_file);
        file.write_all(data).await.map_err(write_err)?;
        file.flush().await.map_err(write_err)?;
        drop(file);

        temp_path.persist(&self.path).map_err(|e| write_err(e.error))?;
        Ok(())
    }
}

fn dedup_preserving_order(favorites: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    favorites
        .into_iter()
        .filter(|id| seen.insert(id.clone()))
        .collect()
}
