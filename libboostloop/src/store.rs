//! Local persistence for the followed and reposted id lists
//!
//! Each list lives in its own file as a JSON array of strings. Reading never
//! fails: a missing or malformed file is treated as an empty list.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::{Result, StoreError};
use crate::state::TrackedSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    Following,
    Reposted,
}

impl StoreKind {
    pub fn file_name(&self) -> &'static str {
        match self {
            StoreKind::Following => "following.json",
            StoreKind::Reposted => "reposted.json",
        }
    }
}

impl std::fmt::Display for StoreKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreKind::Following => write!(f, "following"),
            StoreKind::Reposted => write!(f, "reposted"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Store {
    dir: PathBuf,
}

impl Store {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path(&self, kind: StoreKind) -> PathBuf {
        self.dir.join(kind.file_name())
    }

    /// Read a list, degrading to empty on any failure
    pub fn load(&self, kind: StoreKind) -> Vec<String> {
        let path = self.path(kind);
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) => {
                debug!("No {} list at {}: {}", kind, path.display(), e);
                return Vec::new();
            }
        };

        match serde_json::from_str::<Vec<String>>(&content) {
            Ok(ids) => {
                debug!("Loaded {} {} ids", ids.len(), kind);
                ids
            }
            Err(e) => {
                warn!(
                    "Ignoring malformed {} list at {}: {}",
                    kind,
                    path.display(),
                    e
                );
                Vec::new()
            }
        }
    }

    pub fn load_set(&self, kind: StoreKind) -> TrackedSet {
        self.load(kind).into()
    }

    /// Overwrite a list on disk
    ///
    /// Writes a sibling temp file and renames it over the target.
    pub fn save(&self, kind: StoreKind, ids: &[String]) -> Result<()> {
        std::fs::create_dir_all(&self.dir).map_err(|source| StoreError::Write {
            path: self.dir.display().to_string(),
            source,
        })?;

        let path = self.path(kind);
        let tmp = path.with_extension("json.tmp");
        let json = serde_json::to_string(ids).map_err(StoreError::Serialize)?;

        std::fs::write(&tmp, json)
            .and_then(|_| std::fs::rename(&tmp, &path))
            .map_err(|source| StoreError::Write {
                path: path.display().to_string(),
                source,
            })?;

        debug!("Saved {} {} ids to {}", ids.len(), kind, path.display());
        Ok(())
    }

    pub fn save_set(&self, kind: StoreKind, set: &TrackedSet) -> Result<()> {
        self.save(kind, set.as_slice())
    }
}
