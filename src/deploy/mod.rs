//! Stages the dashboard and snapshot into a static site directory.
//!
//! Pushing the directory to a host is left to whatever watches it; staging
//! only writes files whose contents changed and describes the result in a
//! manifest.

use std::path::PathBuf;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::dashboard::DASHBOARD_FILE;
use crate::error::ArenaError;
use crate::models::ArenaState;
use crate::store::{write_atomic, STATE_FILE};

pub const MANIFEST_FILE: &str = "publish_manifest.json";

/// One staged file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StagedFile {
    /// Path relative to the site directory
    pub path: String,
    pub bytes: usize,
    pub changed: bool,
}

/// What a `stage` call produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishBundle {
    pub cycle: u64,
    pub commit_message: String,
    pub files: Vec<StagedFile>,
}

impl PublishBundle {
    pub fn has_changes(&self) -> bool {
        self.files.iter().any(|f| f.changed)
    }
}

pub struct DeployPublisher {
    site_dir: PathBuf,
}

impl DeployPublisher {
    pub fn new(site_dir: impl Into<PathBuf>) -> Self {
        Self {
            site_dir: site_dir.into(),
        }
    }

    /// Stage the rendered dashboard and a copy of the snapshot.
    pub async fn stage(&self, artifact: &[u8], state: &ArenaState) -> Result<PublishBundle, ArenaError> {
        let snapshot = serde_json::to_vec_pretty(state)
            .map_err(|e| ArenaError::persistence(&self.site_dir, e))?;

        let dashboard_path = DASHBOARD_FILE.to_string();
        let snapshot_path = format!("data/{}", STATE_FILE);

        let files = vec![
            self.stage_file(&dashboard_path, artifact).await?,
            self.stage_file(&snapshot_path, &snapshot).await?,
        ];

        let at = state.last_run_at.unwrap_or_else(Utc::now);
        let bundle = PublishBundle {
            cycle: state.cycle,
            commit_message: format!(
                "Arena update cycle {} ({})",
                state.cycle,
                at.format("%Y-%m-%d %H:%M UTC")
            ),
            files,
        };

        if bundle.has_changes() {
            let manifest = serde_json::to_vec_pretty(&bundle)
                .map_err(|e| ArenaError::persistence(&self.site_dir, e))?;
            let path = self.site_dir.join(MANIFEST_FILE);
            write_atomic(&path, &manifest)
                .await
                .map_err(|e| ArenaError::persistence(&path, e))?;
            info!(
                cycle = bundle.cycle,
                site = %self.site_dir.display(),
                "Staged site update: {}",
                bundle.commit_message
            );
        } else {
            debug!(cycle = bundle.cycle, "Site unchanged, nothing staged");
        }

        Ok(bundle)
    }

    async fn stage_file(&self, relative: &str, bytes: &[u8]) -> Result<StagedFile, ArenaError> {
        let path = self.site_dir.join(relative);

        let unchanged = matches!(tokio::fs::read(&path).await, Ok(existing) if existing == bytes);
        if !unchanged {
            write_atomic(&path, bytes)
                .await
                .map_err(|e| ArenaError::persistence(&path, e))?;
        }

        Ok(StagedFile {
            path: relative.to_string(),
            bytes: bytes.len(),
            changed: !unchanged,
        })
    }
}
