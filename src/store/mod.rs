//! Arena snapshot persistence.
//!
//! The snapshot is a single JSON document. Writes go to a temporary file in
//! the same directory, are fsynced, then renamed over the old snapshot, so a
//! crash leaves either the previous snapshot or the new one.

use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::error::ArenaError;
use crate::models::{ArenaState, SNAPSHOT_VERSION};

pub const STATE_FILE: &str = "arena_state.json";

/// Write `bytes` to `path` atomically.
pub async fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
        _ => PathBuf::from("."),
    };
    tokio::fs::create_dir_all(&dir).await?;

    let name = path
        .file_name()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "path has no file name"))?;
    let tmp = dir.join(format!(".{}.tmp", name.to_string_lossy()));

    let result = async {
        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(bytes).await?;
        file.sync_all().await?;
        drop(file);
        tokio::fs::rename(&tmp, path).await
    }
    .await;

    if result.is_err() {
        let _ = tokio::fs::remove_file(&tmp).await;
        return result;
    }

    // Persist the rename itself
    #[cfg(unix)]
    if let Ok(dir) = tokio::fs::File::open(&dir).await {
        let _ = dir.sync_all().await;
    }

    Ok(())
}

/// Loads and saves the arena snapshot under a data directory.
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        Self {
            path: data_dir.as_ref().join(STATE_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the snapshot. `Ok(None)` if none was ever written.
    pub async fn load(&self) -> Result<Option<ArenaState>, ArenaError> {
        let raw = match tokio::fs::read(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(ArenaError::persistence(&self.path, e)),
        };

        let state: ArenaState =
            serde_json::from_slice(&raw).map_err(|e| ArenaError::persistence(&self.path, e))?;

        if state.version > SNAPSHOT_VERSION {
            return Err(ArenaError::persistence(
                &self.path,
                format!(
                    "snapshot version {} is newer than supported version {}",
                    state.version, SNAPSHOT_VERSION
                ),
            ));
        }

        debug!(path = %self.path.display(), cycle = state.cycle, "Loaded snapshot");
        Ok(Some(state))
    }

    /// Write the snapshot atomically.
    pub async fn save(&self, state: &ArenaState) -> Result<(), ArenaError> {
        let bytes =
            serde_json::to_vec_pretty(state).map_err(|e| ArenaError::persistence(&self.path, e))?;
        write_atomic(&self.path, &bytes)
            .await
            .map_err(|e| ArenaError::persistence(&self.path, e))?;

        debug!(path = %self.path.display(), cycle = state.cycle, bytes = bytes.len(), "Saved snapshot");
        Ok(())
    }

    /// Load the snapshot, or create and save a fresh one for `roster`.
    ///
    /// A snapshot whose agents differ from the roster is a configuration
    /// error; `reset` rebuilds it.
    pub async fn load_or_init(
        &self,
        roster: &[&str],
        starting_cash: Decimal,
        now: DateTime<Utc>,
    ) -> Result<ArenaState, ArenaError> {
        if let Some(state) = self.load().await? {
            let (missing, extra) = state.roster_diff(roster.iter().copied());
            if !missing.is_empty() || !extra.is_empty() {
                return Err(ArenaError::config(format!(
                    "snapshot at {} does not match the roster (missing: [{}], unknown: [{}]); run `arena reset` to rebuild it",
                    self.path.display(),
                    missing.join(", "),
                    extra.join(", ")
                )));
            }
            return Ok(state);
        }

        let state = ArenaState::new(roster.iter().copied(), starting_cash, now);
        self.save(&state).await?;
        info!(path = %self.path.display(), agents = roster.len(), "Initialized new arena");
        Ok(state)
    }
}
