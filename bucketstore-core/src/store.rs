/*!
The data store: write, read and destroy objects in a bucket.

This module sequences the UID generator, the metadata codec and a
[`StorageClient`]. Reads and destroys come in two flavours: `try_*` methods
propagate every error, while [`DataStore::read`] and [`DataStore::destroy`]
swallow failures the way host libraries expect from a data store.
*/

use crate::codec::{self, HeaderSet};
use crate::metadata::{MetaValue, Metadata};
use crate::storage::StorageClient;
use crate::uid::{generate_uid, DEFAULT_NAME};
use crate::{DataStoreConfig, Result};
#[cfg(feature = "metrics")]
use crate::observability::MetricsTimer;
use bytes::Bytes;
use once_cell::sync::OnceCell;
use std::path::Path;
use tracing::{debug, info, warn};

/// An object handed to the data store for writing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Content {
    /// Object content
    pub data: Bytes,
    /// Display name, used as the last UID segment
    pub name: Option<String>,
    /// Application metadata
    pub meta: Metadata,
}

impl Content {
    /// Create content from bytes with no name and no metadata
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            ..Default::default()
        }
    }

    /// Load content from a file, named after the file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read(path)?;
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned());
        Ok(Self {
            data: data.into(),
            name,
            meta: Metadata::new(),
        })
    }

    /// Set the display name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Replace the metadata mapping
    pub fn with_meta(mut self, meta: Metadata) -> Self {
        self.meta = meta;
        self
    }

    /// Add a single metadata entry
    pub fn with_meta_value(mut self, key: impl Into<String>, value: impl Into<MetaValue>) -> Self {
        self.meta.insert(key.into(), value.into());
        self
    }

    /// Name used when generating a UID
    pub fn uid_name(&self) -> &str {
        self.name
            .as_deref()
            .filter(|name| !name.is_empty())
            .unwrap_or(DEFAULT_NAME)
    }
}

/// Per-write options.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteOptions {
    /// Store under this UID instead of generating one
    pub path: Option<String>,
    /// Header overrides, highest precedence
    pub headers: HeaderSet,
}

impl WriteOptions {
    /// Store under an explicit UID
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Override a header for this write
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        codec::insert_header(&mut self.headers, name, value);
        self
    }
}

/// Data store over a single bucket
///
/// # Example
/// ```rust
/// use bucketstore_core::{Content, DataStore, DataStoreConfig, WriteOptions};
/// use bucketstore_core::storage::MemoryStorageClient;
///
/// let store = DataStore::new(
///     MemoryStorageClient::new("uploads"),
///     DataStoreConfig::new("project", "uploads"),
/// )?;
///
/// let content = Content::new(&b"hello"[..])
///     .with_name("hello.txt")
///     .with_meta_value("note", "a b%c");
/// let uid = store.write(&content, &WriteOptions::default())?;
///
/// let (data, meta) = store.read(&uid).expect("object was just written");
/// assert_eq!(&data[..], b"hello");
/// assert_eq!(meta, Some(content.meta));
/// # Ok::<(), bucketstore_core::StoreError>(())
/// ```
pub struct DataStore<C: StorageClient> {
    client: C,
    config: DataStoreConfig,
    bucket_ready: OnceCell<()>,
}

impl<C: StorageClient> DataStore<C> {
    /// Create a data store with the given client and configuration
    ///
    /// # Errors
    /// `StoreError::Validation` if the configuration is invalid
    pub fn new(client: C, config: DataStoreConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            client,
            config,
            bucket_ready: OnceCell::new(),
        })
    }

    /// The underlying storage client
    pub fn client(&self) -> &C {
        &self.client
    }

    /// The store configuration
    pub fn config(&self) -> &DataStoreConfig {
        &self.config
    }

    /// Store `content` and return its UID
    ///
    /// This method:
    /// 1. Makes sure the bucket exists, creating it on first use
    /// 2. Takes the UID from `opts.path` or generates one from the content name
    /// 3. Encodes the metadata and merges it with default and per-write headers
    /// 4. Uploads the content under the storage key
    ///
    /// # Errors
    /// * `StoreError::UnsupportedValueType` / `StoreError::Validation` - If the metadata cannot be encoded
    /// * `StoreError::Storage` - If the bucket or upload call fails
    pub fn write(&self, content: &Content, opts: &WriteOptions) -> Result<String> {
        #[cfg(feature = "metrics")]
        let timer = MetricsTimer::start("write");

        let result = self.write_inner(content, opts);

        #[cfg(feature = "metrics")]
        match &result {
            Ok(_) => timer.finish(),
            Err(_) => timer.finish_with_error(),
        }

        result
    }

    fn write_inner(&self, content: &Content, opts: &WriteOptions) -> Result<String> {
        self.ensure_bucket_exists()?;

        let uid = match opts.path.as_deref().filter(|path| !path.is_empty()) {
            Some(path) => path.to_string(),
            None => generate_uid(content.uid_name()),
        };

        let headers = codec::encode(&self.config.storage_headers, &opts.headers, &content.meta)?;
        let key = self.config.storage_key(&uid);

        info!(
            bucket = %self.config.bucket,
            key = %key,
            size = content.data.len(),
            meta_keys = content.meta.len(),
            "Writing object"
        );
        self.client.upload(&key, &content.data, &headers)?;

        Ok(uid)
    }

    /// Fetch the content and metadata stored under `uid`
    ///
    /// Metadata is `None` when the object carries no metadata slot.
    ///
    /// # Errors
    /// * `StoreError::NotFound` - If there is no such object
    /// * `StoreError::MalformedMetadataPayload` - If the metadata slot cannot be decoded
    pub fn try_read(&self, uid: &str) -> Result<(Bytes, Option<Metadata>)> {
        #[cfg(feature = "metrics")]
        let timer = MetricsTimer::start("read");

        let key = self.config.storage_key(uid);
        debug!(bucket = %self.config.bucket, key = %key, "Reading object");

        let result = self
            .client
            .download(&key)
            .and_then(|object| Ok((object.data, codec::decode(&object.metadata)?)));

        #[cfg(feature = "metrics")]
        match &result {
            Ok(_) => timer.finish(),
            Err(_) => timer.finish_with_error(),
        }

        result
    }

    /// Fail-closed [`try_read`](Self::try_read): any error yields `None`.
    pub fn read(&self, uid: &str) -> Option<(Bytes, Option<Metadata>)> {
        match self.try_read(uid) {
            Ok(found) => Some(found),
            Err(e) => {
                warn!(bucket = %self.config.bucket, uid = %uid, error = %e, "Read failed");
                #[cfg(feature = "metrics")]
                if e.is_codec_error() {
                    crate::observability::StoreMetrics::global().record_decode_failure();
                }
                None
            }
        }
    }

    /// Delete the object stored under `uid`
    pub fn try_destroy(&self, uid: &str) -> Result<()> {
        #[cfg(feature = "metrics")]
        let timer = MetricsTimer::start("destroy");

        let key = self.config.storage_key(uid);
        info!(bucket = %self.config.bucket, key = %key, "Destroying object");
        let result = self.client.delete(&key);

        #[cfg(feature = "metrics")]
        match &result {
            Ok(_) => timer.finish(),
            Err(_) => timer.finish_with_error(),
        }

        result
    }

    /// Fail-closed [`try_destroy`](Self::try_destroy); returns whether the object was deleted.
    pub fn destroy(&self, uid: &str) -> bool {
        match self.try_destroy(uid) {
            Ok(()) => true,
            Err(e) => {
                warn!(bucket = %self.config.bucket, uid = %uid, error = %e, "Destroy failed");
                false
            }
        }
    }

    /// Public URL of `uid`, when a domain is configured
    pub fn url_for(&self, uid: &str) -> Option<String> {
        let domain = self.config.domain.as_deref()?;
        Some(format!("https://{domain}/{}", self.config.storage_key(uid)))
    }

    /// Create the bucket if it does not exist yet
    ///
    /// The check runs once per store; later calls return immediately.
    pub fn ensure_bucket_exists(&self) -> Result<()> {
        self.bucket_ready
            .get_or_try_init(|| {
                if !self.client.bucket_exists()? {
                    info!(bucket = %self.config.bucket, "Bucket missing, creating it");
                    self.client.create_bucket()?;
                }
                Ok(())
            })
            .map(|_| ())
    }
}
