use std::{io, path::Path, sync::Arc};

use async_trait::async_trait;

/// Filesystem operations the cleaner needs.
#[async_trait]
pub trait SessionFs: Send + Sync {
    async fn exists(&self, path: &Path) -> io::Result<bool>;
    /// Recursive forced removal: directories with their contents, or a plain file.
    async fn remove_all(&self, path: &Path) -> io::Result<()>;
}

pub type SharedSessionFs = Arc<dyn SessionFs>;

#[derive(Debug, Default, Clone, Copy)]
pub struct LocalFs;

#[async_trait]
impl SessionFs for LocalFs {
    async fn exists(&self, path: &Path) -> io::Result<bool> {
        tokio::fs::try_exists(path).await
    }

    async fn remove_all(&self, path: &Path) -> io::Result<()> {
        let metadata = tokio::fs::symlink_metadata(path).await?;
        if metadata.is_dir() {
            tokio::fs::remove_dir_all(path).await
        } else {
            tokio::fs::remove_file(path).await
        }
    }
}
