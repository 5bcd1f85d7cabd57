use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::fs;

/// Narrow seam over the attachment disk. The rest of the crate never touches
/// the filesystem directly, so tests can point the store at a temp directory.
#[async_trait]
pub trait FileStore: Send + Sync {
    /// Name of the backing disk, recorded on each attachment row.
    fn disk(&self) -> &str;

    async fn store(&self, path: &str, bytes: &[u8]) -> Result<()>;

    async fn exists(&self, path: &str) -> bool;

    async fn delete(&self, path: &str) -> Result<()>;

    async fn read(&self, path: &str) -> Result<Vec<u8>>;
}

/// Private local disk rooted at a configured directory, the deployment
/// default. Paths stored on attachment rows are relative to the root.
pub struct LocalDisk {
    root: PathBuf,
}

impl LocalDisk {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, path: &str) -> PathBuf {
        self.root.join(path)
    }
}

#[async_trait]
impl FileStore for LocalDisk {
    fn disk(&self) -> &str {
        "private"
    }

    async fn store(&self, path: &str, bytes: &[u8]) -> Result<()> {
        let full = self.resolve(path);
        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        fs::write(&full, bytes)
            .await
            .with_context(|| format!("writing {}", full.display()))?;
        Ok(())
    }

    async fn exists(&self, path: &str) -> bool {
        fs::try_exists(self.resolve(path)).await.unwrap_or(false)
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let full = self.resolve(path);
        fs::remove_file(&full)
            .await
            .with_context(|| format!("removing {}", full.display()))?;
        Ok(())
    }

    async fn read(&self, path: &str) -> Result<Vec<u8>> {
        let full = self.resolve(path);
        let bytes = fs::read(&full)
            .await
            .with_context(|| format!("reading {}", full.display()))?;
        Ok(bytes)
    }
}

/// Build the attachment file name from the original upload: a random stem so
/// user-supplied names can never collide or traverse, keeping the extension.
pub fn generated_filename(original: &str) -> String {
    let id = uuid::Uuid::new_v4();
    match Path::new(original).extension().and_then(|e| e.to_str()) {
        Some(ext) if !ext.is_empty() => format!("{id}.{ext}"),
        _ => id.to_string(),
    }
}
