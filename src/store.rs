//! Persisted set of listing ids that have already been handled.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Ids seen across every search term, kept in first-seen order
#[derive(Debug, Clone, Default)]
pub struct SeenIdSet {
    order: Vec<String>,
    index: HashSet<String>,
}

impl SeenIdSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains(id)
    }

    /// Returns false when the id was already present
    pub fn add(&mut self, id: impl Into<String>) -> bool {
        let id = id.into();
        if self.index.contains(&id) {
            return false;
        }
        self.index.insert(id.clone());
        self.order.push(id);
        true
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn ids(&self) -> &[String] {
        &self.order
    }
}

impl FromIterator<String> for SeenIdSet {
    fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
        let mut set = SeenIdSet::new();
        for id in iter {
            set.add(id);
        }
        set
    }
}

/// On-disk layout
#[derive(Debug, Default, Serialize, Deserialize)]
struct SeenFile {
    #[serde(default)]
    ids: Vec<String>,
}

/// File-backed dedup store.
///
/// Both directions fail soft: a bad read yields an empty set and a failed
/// write leaves the previous file in place.
#[derive(Debug, Clone)]
pub struct SeenStore {
    path: PathBuf,
}

impl SeenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn load(&self) -> SeenIdSet {
        match self.try_load().await {
            Ok(Some(set)) => {
                debug!("Loaded {} seen ids from {}", set.len(), self.path.display());
                set
            }
            Ok(None) => {
                info!("No seen-id file at {}, starting empty", self.path.display());
                SeenIdSet::new()
            }
            Err(e) => {
                warn!("Could not load seen ids, starting empty: {:#}", e);
                SeenIdSet::new()
            }
        }
    }

    pub async fn save(&self, set: &SeenIdSet) {
        match self.try_save(set).await {
            Ok(()) => debug!("Saved {} seen ids to {}", set.len(), self.path.display()),
            Err(e) => warn!("Could not save seen ids: {:#}", e),
        }
    }

    async fn try_load(&self) -> Result<Option<SeenIdSet>> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read {}", self.path.display()))
            }
        };

        let file: SeenFile = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse {}", self.path.display()))?;
        Ok(Some(file.ids.into_iter().collect()))
    }

    /// Write to a sibling temp file, then rename over the real one
    async fn try_save(&self, set: &SeenIdSet) -> Result<()> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(dir)
                .await
                .with_context(|| format!("Failed to create {}", dir.display()))?;
        }

        let file = SeenFile { ids: set.ids().to_vec() };
        let json = serde_json::to_string_pretty(&file)?;

        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json)
            .await
            .with_context(|| format!("Failed to write {}", tmp.display()))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .with_context(|| format!("Failed to replace {}", self.path.display()))?;
        Ok(())
    }
}
