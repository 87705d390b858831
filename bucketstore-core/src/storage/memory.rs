/*!
In-memory storage client.
*/

use super::{StorageClient, StoredObject};
use crate::codec::EncodedHeaders;
use crate::{Result, StoreError};
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

/// A bucket held in memory.
///
/// Useful for unit testing and for embedding the data store without a cloud
/// account. Clones share the same bucket.
///
/// # Example
/// ```rust
/// use bucketstore_core::storage::{MemoryStorageClient, StorageClient};
/// use bucketstore_core::codec::EncodedHeaders;
///
/// let client = MemoryStorageClient::new("media");
/// client.create_bucket()?;
/// client.upload("a/b.txt", b"hello", &EncodedHeaders::default())?;
/// assert_eq!(&client.download("a/b.txt")?.data[..], b"hello");
/// # Ok::<(), bucketstore_core::StoreError>(())
/// ```
#[derive(Debug, Clone)]
pub struct MemoryStorageClient {
    bucket: String,
    state: Arc<Mutex<MemoryBucket>>,
}

#[derive(Debug, Default)]
struct MemoryBucket {
    created: bool,
    objects: HashMap<String, MemoryObject>,
}

#[derive(Debug, Clone)]
struct MemoryObject {
    data: Bytes,
    headers: EncodedHeaders,
}

impl MemoryStorageClient {
    /// Create a client for a bucket that does not exist yet
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            state: Arc::default(),
        }
    }

    /// Create a client for a bucket that already exists
    pub fn with_existing_bucket(bucket: impl Into<String>) -> Self {
        let client = Self::new(bucket);
        client.lock().created = true;
        client
    }

    /// Headers an object was uploaded with
    pub fn headers(&self, key: &str) -> Option<EncodedHeaders> {
        self.lock().objects.get(key).map(|o| o.headers.clone())
    }

    /// Keys of all stored objects, sorted
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.lock().objects.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Store an object with raw header slots, bypassing the codec
    pub fn insert_raw(&self, key: &str, data: &[u8], headers: EncodedHeaders) {
        self.lock().objects.insert(
            key.to_string(),
            MemoryObject {
                data: Bytes::copy_from_slice(data),
                headers,
            },
        );
    }

    fn lock(&self) -> MutexGuard<'_, MemoryBucket> {
        // A panic while holding the lock cannot leave the map half-updated.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl StorageClient for MemoryStorageClient {
    fn bucket_exists(&self) -> Result<bool> {
        Ok(self.lock().created)
    }

    fn create_bucket(&self) -> Result<()> {
        let mut bucket = self.lock();
        if bucket.created {
            return Err(StoreError::storage(format!(
                "Bucket '{}' already exists",
                self.bucket
            )));
        }
        bucket.created = true;
        Ok(())
    }

    fn upload(&self, key: &str, data: &[u8], headers: &EncodedHeaders) -> Result<()> {
        let mut bucket = self.lock();
        if !bucket.created {
            return Err(StoreError::storage(format!(
                "Bucket '{}' does not exist",
                self.bucket
            )));
        }
        bucket.objects.insert(
            key.to_string(),
            MemoryObject {
                data: Bytes::copy_from_slice(data),
                headers: headers.clone(),
            },
        );
        Ok(())
    }

    fn download(&self, key: &str) -> Result<StoredObject> {
        let bucket = self.lock();
        let object = bucket
            .objects
            .get(key)
            .ok_or_else(|| StoreError::not_found(key))?;
        Ok(StoredObject {
            data: object.data.clone(),
            metadata: object.headers.metadata.clone(),
        })
    }

    fn delete(&self, key: &str) -> Result<()> {
        self.lock()
            .objects
            .remove(key)
            .map(|_| ())
            .ok_or_else(|| StoreError::not_found(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::HeaderSet;

    #[test]
    fn test_memory_client_basic_operations() {
        let client = MemoryStorageClient::new("bucket");
        assert!(!client.bucket_exists().unwrap());
        client.create_bucket().unwrap();
        assert!(client.bucket_exists().unwrap());

        let mut metadata = HeaderSet::new();
        metadata.insert("x-amz-meta-json".to_string(), "{}".to_string());
        let headers = EncodedHeaders {
            metadata: metadata.clone(),
            content_type: Some("text/plain".to_string()),
            ..Default::default()
        };

        client.upload("k", b"data", &headers).unwrap();
        let object = client.download("k").unwrap();
        assert_eq!(&object.data[..], b"data");
        assert_eq!(object.metadata, metadata);
        assert_eq!(client.headers("k"), Some(headers));

        client.delete("k").unwrap();
        assert!(matches!(client.download("k"), Err(StoreError::NotFound(_))));
        assert!(matches!(client.delete("k"), Err(StoreError::NotFound(_))));
    }

    #[test]
    fn test_upload_requires_bucket() {
        let client = MemoryStorageClient::new("missing");
        assert!(client
            .upload("k", b"x", &EncodedHeaders::default())
            .is_err());
    }

    #[test]
    fn test_create_bucket_twice_fails() {
        let client = MemoryStorageClient::with_existing_bucket("b");
        assert!(client.create_bucket().is_err());
    }

    #[test]
    fn test_clones_share_bucket() {
        let client = MemoryStorageClient::with_existing_bucket("b");
        let other = client.clone();
        other.upload("k", b"x", &EncodedHeaders::default()).unwrap();
        assert_eq!(client.keys(), vec!["k".to_string()]);
    }
}
