use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use super::{Blob, BlobStore, PutOutcome, StoreError, validate_key};

/// Stores each object as a file under `root`, keyed by its relative path.
///
/// Writes go to a sibling temp file and are renamed into place, so readers
/// never see a torn object. Versions are the SHA-256 of the contents.
/// Conditional writes are serialized within this process only.
#[derive(Debug)]
pub struct FilesystemStore {
    root: PathBuf,
    cas_lock: tokio::sync::Mutex<()>,
    tmp_seq: AtomicU64,
}

impl FilesystemStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            cas_lock: tokio::sync::Mutex::new(()),
            tmp_seq: AtomicU64::new(0),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, StoreError> {
        validate_key(key)?;
        Ok(self.root.join(key))
    }

    async fn read(&self, path: &Path) -> Result<Option<Blob>, StoreError> {
        match tokio::fs::read(path).await {
            Ok(bytes) => {
                let version = content_version(&bytes);
                Ok(Some(Blob {
                    bytes,
                    version: Some(version),
                }))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn write(&self, path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let seq = self.tmp_seq.fetch_add(1, Ordering::Relaxed);
        let mut tmp = path.as_os_str().to_owned();
        tmp.push(format!(".tmp-{}-{seq}", std::process::id()));
        let tmp = PathBuf::from(tmp);

        tokio::fs::write(&tmp, bytes).await?;
        if let Err(e) = tokio::fs::rename(&tmp, path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        Ok(())
    }
}

fn content_version(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

#[async_trait]
impl BlobStore for FilesystemStore {
    fn kind(&self) -> &'static str {
        "fs"
    }

    async fn get(&self, key: &str) -> Result<Option<Blob>, StoreError> {
        let path = self.path_for(key)?;
        self.read(&path).await
    }

    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<(), StoreError> {
        let path = self.path_for(key)?;
        self.write(&path, &bytes).await
    }

    async fn put_if(
        &self,
        key: &str,
        bytes: Vec<u8>,
        expected: Option<&str>,
    ) -> Result<PutOutcome, StoreError> {
        let path = self.path_for(key)?;
        let _guard = self.cas_lock.lock().await;

        let current = self.read(&path).await?.and_then(|b| b.version);
        if current.as_deref() != expected {
            return Ok(PutOutcome::Conflict);
        }
        self.write(&path, &bytes).await?;
        Ok(PutOutcome::Written)
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let path = self.path_for(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        let path = self.path_for(key)?;
        Ok(tokio::fs::try_exists(&path).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn roundtrip_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let store = FilesystemStore::new(dir.path());

        assert!(store.get("price-tracking/stats").await.unwrap().is_none());
        store
            .put("price-tracking/stats", b"{}".to_vec())
            .await
            .unwrap();

        assert!(dir.path().join("price-tracking").join("stats").is_file());
        let blob = store.get("price-tracking/stats").await.unwrap().unwrap();
        assert_eq!(blob.bytes, b"{}");
        assert_eq!(blob.version.unwrap().len(), 64);
    }

    #[tokio::test]
    async fn no_temp_files_left_behind() {
        let dir = tempfile::tempdir().unwrap();
        let store = FilesystemStore::new(dir.path());
        store.put("stats", b"1".to_vec()).await.unwrap();
        store.put("stats", b"2".to_vec()).await.unwrap();

        let names: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from("stats")]);
    }

    #[tokio::test]
    async fn delete_missing_is_ok() {
        let dir = tempfile::tempdir().unwrap();
        let store = FilesystemStore::new(dir.path());
        store.delete("nothing/here").await.unwrap();
        assert!(!store.exists("nothing/here").await.unwrap());
    }

    #[tokio::test]
    async fn conditional_write_uses_content_version() {
        let dir = tempfile::tempdir().unwrap();
        let store = FilesystemStore::new(dir.path());

        assert_eq!(
            store.put_if("k", b"a".to_vec(), None).await.unwrap(),
            PutOutcome::Written
        );
        let stale = store.get("k").await.unwrap().unwrap().version;
        store.put("k", b"b".to_vec()).await.unwrap();

        assert_eq!(
            store
                .put_if("k", b"c".to_vec(), stale.as_deref())
                .await
                .unwrap(),
            PutOutcome::Conflict
        );
        assert_eq!(store.get("k").await.unwrap().unwrap().bytes, b"b");
    }

    #[tokio::test]
    async fn rejects_path_traversal() {
        let dir = tempfile::tempdir().unwrap();
        let store = FilesystemStore::new(dir.path());
        let err = store.put("../escape", b"x".to_vec()).await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidKey(_)));
    }
}
