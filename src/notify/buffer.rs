use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

/// Append-only text file holding notifications produced outside the active window.
///
/// Its content is only ever delivered by being prefixed onto the next
/// in-window message.
#[derive(Debug, Clone)]
pub struct NotificationBuffer {
    path: PathBuf,
}

impl NotificationBuffer {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append a block; failures are logged and the block is lost
    pub async fn append(&self, block: &str) {
        match self.try_append(block).await {
            Ok(()) => debug!("Buffered {} bytes to {}", block.len(), self.path.display()),
            Err(e) => warn!("Could not append to notification buffer: {:#}", e),
        }
    }

    /// Read the whole buffer and truncate it.
    ///
    /// Unreadable means empty. Content that could not be cleared is not
    /// returned either, so it is never sent twice.
    pub async fn take(&self) -> String {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return String::new(),
            Err(e) => {
                warn!("Could not read notification buffer {}: {}", self.path.display(), e);
                return String::new();
            }
        };

        if content.is_empty() {
            return content;
        }
        let cleared = tokio::fs::OpenOptions::new()
            .write(true)
            .truncate(true)
            .open(&self.path)
            .await
            .map(drop);
        self.release(content, cleared)
    }

    /// Content only leaves the buffer once the file is known to be empty
    fn release(&self, content: String, cleared: std::io::Result<()>) -> String {
        match cleared {
            Ok(()) => content,
            Err(e) => {
                warn!(
                    "Could not clear notification buffer {}, keeping it for later: {}",
                    self.path.display(),
                    e
                );
                String::new()
            }
        }
    }

    async fn try_append(&self, block: &str) -> Result<()> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(dir).await?;
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .with_context(|| format!("Failed to open {}", self.path.display()))?;
        file.write_all(block.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}
