//! Report object storage.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;

use crate::errors::ScanError;

/// Read access to the bucket holding scan reports.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Fetch the full body of `bucket/key`.
    async fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>, ScanError>;
}

/// Object store backed by a local directory, one sub-directory per bucket.
#[derive(Debug, Clone)]
pub struct FsObjectStore {
    root: PathBuf,
}

impl FsObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Resolve `{root}/{bucket}/{key}`, refusing anything that escapes the bucket.
    fn object_path(&self, bucket: &str, key: &str) -> Result<PathBuf, ScanError> {
        let mut path = self.root.clone();
        for part in [bucket, key] {
            let relative = Path::new(part);
            if part.is_empty()
                || relative
                    .components()
                    .any(|c| !matches!(c, Component::Normal(_)))
            {
                return Err(ScanError::ObjectFetchFailed(format!(
                    "Refusing object path {bucket}/{key}"
                )));
            }
            path.push(relative);
        }
        Ok(path)
    }
}

#[async_trait]
impl ObjectStore for FsObjectStore {
    async fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>, ScanError> {
        let path = self.object_path(bucket, key)?;
        tokio::fs::read(&path).await.map_err(|e| {
            ScanError::ObjectFetchFailed(format!("Failed to read {}: {e}", path.display()))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reads_object_under_bucket() {
        let dir = tempfile::tempdir().unwrap();
        let object_dir = dir.path().join("scap-reports").join("i-0abc");
        std::fs::create_dir_all(&object_dir).unwrap();
        std::fs::write(object_dir.join("scan.xml"), b"<Benchmark/>").unwrap();

        let store = FsObjectStore::new(dir.path());
        let body = store.get("scap-reports", "i-0abc/scan.xml").await.unwrap();
        assert_eq!(body, b"<Benchmark/>");
    }

    #[tokio::test]
    async fn missing_object_fails() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsObjectStore::new(dir.path());
        let err = store.get("scap-reports", "i-0abc/scan.xml").await.unwrap_err();
        assert!(matches!(err, ScanError::ObjectFetchFailed(_)));
    }

    #[tokio::test]
    async fn rejects_traversal() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsObjectStore::new(dir.path());
        assert!(store.get("scap-reports", "../secrets").await.is_err());
        assert!(store.get("..", "scan.xml").await.is_err());
        assert!(store.get("scap-reports", "/etc/passwd").await.is_err());
        assert!(store.get("", "scan.xml").await.is_err());
    }
}
