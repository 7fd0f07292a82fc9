use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{Blob, BlobStore, PutOutcome, StoreError, validate_key};

/// Process-local object store. Versions are monotonically increasing
/// generation numbers.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryInner>,
}

#[derive(Debug, Default)]
struct MemoryInner {
    objects: HashMap<String, (Vec<u8>, u64)>,
    next_generation: u64,
}

impl MemoryInner {
    fn write(&mut self, key: &str, bytes: Vec<u8>) {
        self.next_generation += 1;
        self.objects
            .insert(key.to_string(), (bytes, self.next_generation));
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored objects.
    pub fn len(&self) -> usize {
        self.inner.lock().objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl BlobStore for MemoryStore {
    fn kind(&self) -> &'static str {
        "memory"
    }

    async fn get(&self, key: &str) -> Result<Option<Blob>, StoreError> {
        validate_key(key)?;
        let inner = self.inner.lock();
        Ok(inner.objects.get(key).map(|(bytes, generation)| Blob {
            bytes: bytes.clone(),
            version: Some(generation.to_string()),
        }))
    }

    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<(), StoreError> {
        validate_key(key)?;
        self.inner.lock().write(key, bytes);
        Ok(())
    }

    async fn put_if(
        &self,
        key: &str,
        bytes: Vec<u8>,
        expected: Option<&str>,
    ) -> Result<PutOutcome, StoreError> {
        validate_key(key)?;
        let mut inner = self.inner.lock();
        let current = inner.objects.get(key).map(|(_, g)| g.to_string());
        if current.as_deref() != expected {
            return Ok(PutOutcome::Conflict);
        }
        inner.write(key, bytes);
        Ok(PutOutcome::Written)
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        validate_key(key)?;
        self.inner.lock().objects.remove(key);
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        validate_key(key)?;
        Ok(self.inner.lock().objects.contains_key(key))
    }
}
