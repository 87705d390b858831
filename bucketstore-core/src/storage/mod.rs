/*!
Object-storage clients used by the data store.

This module defines the narrow port the data store needs from a bucket
(existence, creation, upload, download, delete) and its implementations. The
codec and UID logic stay independent of any provider SDK.
*/

#[cfg(feature = "gcs")]
pub mod gcs;
pub mod memory;

use crate::codec::{EncodedHeaders, HeaderSet};
use crate::Result;
use bytes::Bytes;

/// An object as returned by a download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    /// Object content
    pub data: Bytes,
    /// Custom header slots the object was stored with
    pub metadata: HeaderSet,
}

/// Access to a single bucket.
///
/// Implementations are blocking; async SDKs drive their own runtime.
#[cfg_attr(test, mockall::automock)]
pub trait StorageClient: Send + Sync {
    /// Check whether the bucket exists
    fn bucket_exists(&self) -> Result<bool>;

    /// Create the bucket
    fn create_bucket(&self) -> Result<()>;

    /// Upload `data` under `key` with the given transport headers and custom slots
    ///
    /// # Arguments
    /// * `key` - Object name within the bucket
    /// * `data` - Object content
    /// * `headers` - Typed transport headers and custom metadata slots
    fn upload(&self, key: &str, data: &[u8], headers: &EncodedHeaders) -> Result<()>;

    /// Download the content and custom metadata stored under `key`
    ///
    /// # Errors
    /// `StoreError::NotFound` when no object exists under `key`
    fn download(&self, key: &str) -> Result<StoredObject>;

    /// Delete the object stored under `key`
    fn delete(&self, key: &str) -> Result<()>;
}

#[cfg(feature = "gcs")]
pub use gcs::GcsStorageClient;
pub use memory::MemoryStorageClient;
