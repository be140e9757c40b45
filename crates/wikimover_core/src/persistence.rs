use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::replacement::{Actions, Replacement};
use crate::title::NamespaceTable;

pub const SNAPSHOT_FILENAME: &str = "move-pages.json";
const TMP_SUFFIX: &str = ".tmp";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SnapshotEntry {
    from: String,
    to: String,
    actions: Actions,
    #[serde(default)]
    reason: String,
}

/// The persisted plan of an unfinished run. Its presence on disk means a
/// run is in progress and should be resumed rather than re-planned.
#[derive(Debug, Clone)]
pub struct SnapshotFile {
    path: PathBuf,
}

impl SnapshotFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn in_dir(state_dir: &Path) -> Self {
        Self::new(state_dir.join(SNAPSHOT_FILENAME))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Write the full replacement list, replacing any previous snapshot
    /// atomically.
    pub fn save(&self, replacements: &[Replacement]) -> Result<()> {
        let entries = replacements
            .iter()
            .map(|replacement| SnapshotEntry {
                from: replacement.from.full_name(),
                to: replacement.to.full_text(),
                actions: replacement.actions(),
                reason: replacement.reason().to_string(),
            })
            .collect::<Vec<_>>();
        let mut rendered =
            serde_json::to_string_pretty(&entries).context("failed to serialize move snapshot")?;
        rendered.push('\n');

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let tmp_path = self.tmp_path();
        {
            let mut file = File::create(&tmp_path)
                .with_context(|| format!("failed to create {}", tmp_path.display()))?;
            file.write_all(rendered.as_bytes())
                .with_context(|| format!("failed to write {}", tmp_path.display()))?;
            file.sync_all()
                .with_context(|| format!("failed to sync {}", tmp_path.display()))?;
        }
        fs::rename(&tmp_path, &self.path).with_context(|| {
            format!(
                "failed to replace {} with {}",
                self.path.display(),
                tmp_path.display()
            )
        })?;
        sync_parent_dir(&self.path);
        debug!(path = %self.path.display(), entries = entries.len(), "saved move snapshot");
        Ok(())
    }

    /// Load a previously saved plan, or `None` when no run is in progress.
    pub fn try_load(&self, table: &NamespaceTable) -> Result<Option<Vec<Replacement>>> {
        if !self.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&self.path)
            .with_context(|| format!("failed to read {}", self.path.display()))?;
        let entries: Vec<SnapshotEntry> = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse {}", self.path.display()))?;

        let mut replacements = Vec::with_capacity(entries.len());
        for (index, entry) in entries.into_iter().enumerate() {
            let from = table.parse_title(&entry.from).with_context(|| {
                format!("invalid `from` in entry {index} of {}", self.path.display())
            })?;
            let to = table.parse_title(&entry.to).with_context(|| {
                format!("invalid `to` in entry {index} of {}", self.path.display())
            })?;
            replacements.push(Replacement::with_actions(
                from,
                to,
                entry.actions,
                entry.reason,
            ));
        }
        Ok(Some(replacements))
    }

    /// Remove the snapshot. Returns `false` when there was none.
    pub fn delete(&self) -> Result<bool> {
        if !self.exists() {
            return Ok(false);
        }
        fs::remove_file(&self.path)
            .with_context(|| format!("failed to delete {}", self.path.display()))?;
        debug!(path = %self.path.display(), "deleted move snapshot");
        Ok(true)
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|name| name.to_os_string())
            .unwrap_or_else(|| SNAPSHOT_FILENAME.into());
        name.push(TMP_SUFFIX);
        self.path.with_file_name(name)
    }
}

fn sync_parent_dir(path: &Path) {
    if let Some(parent) = path.parent()
        && let Ok(dir) = File::open(parent)
    {
        let _ = dir.sync_all();
    }
}
