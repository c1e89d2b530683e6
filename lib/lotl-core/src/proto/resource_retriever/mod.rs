use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::Context;


/// Byte source for trusted list documents, keyed by URL.
///
/// `Ok(None)` means the resource does not exist. Fetchers tolerate both
/// `None` and errors and turn them into report items.
#[cfg_attr(any(test, feature = "mock"), mockall::automock)]
#[async_trait::async_trait]
pub trait ResourceRetriever: Send + Sync {
    async fn get_bytes_by_url(&self, url: &str) -> anyhow::Result<Option<Vec<u8>>>;
}

/// Serves `file://` URLs and plain paths from disk, optionally relative to a base directory.
#[derive(Clone, Debug, Default)]
pub struct FileResourceRetriever {
    base_dir: Option<PathBuf>,
}

impl FileResourceRetriever {
    pub fn new(base_dir: Option<PathBuf>) -> Self {
        Self { base_dir }
    }

    fn resolve(&self, url: &str) -> PathBuf {
        let path = Path::new(url.strip_prefix("file://").unwrap_or(url));
        match &self.base_dir {
            Some(base_dir) if path.is_relative() => base_dir.join(path),
            _ => path.to_path_buf(),
        }
    }
}

#[async_trait::async_trait]
impl ResourceRetriever for FileResourceRetriever {
    async fn get_bytes_by_url(&self, url: &str) -> anyhow::Result<Option<Vec<u8>>> {
        let path = self.resolve(url);
        match tokio::fs::read(&path).await {
            Ok(content) => Ok(Some(content)),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                tracing::debug!("Resource not found: {}", path.display());
                Ok(None)
            }
            Err(err) => Err(err).with_context(|| format!("failed to read {}", path.display())),
        }
    }
}
