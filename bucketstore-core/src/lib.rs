/*!
# Bucketstore Core

A blob data store over an object-storage bucket, with portable metadata.

Objects are written under time-ordered UIDs
(`YYYY/MM/DD/HH/MM/SS/<uuid>/<name>`), and their application metadata is
carried in a custom header slot so any reader of the bucket can recover it.

- Hexagonal layout: the [`storage::StorageClient`] port hides the provider SDK
- Metadata codec writing JSON to `x-amz-meta-json` and reading the legacy
  binary slot `x-amz-meta-extra` left behind by older writers
- Google Cloud Storage client behind the `gcs` feature, and an in-memory client

## Usage

```rust
use bucketstore_core::{Content, DataStore, DataStoreConfig, WriteOptions};
use bucketstore_core::storage::MemoryStorageClient;

let config = DataStoreConfig::new("my-project", "uploads")
    .with_domain("media.example.com")
    .with_storage_header("Cache-Control", "public, max-age=31536000");
let store = DataStore::new(MemoryStorageClient::new("uploads"), config)?;

let content = Content::new(&b"png bytes"[..])
    .with_name("avatar.png")
    .with_meta_value("width", 64i64);
let uid = store.write(&content, &WriteOptions::default())?;

let url = store.url_for(&uid).unwrap();
assert!(url.starts_with("https://media.example.com/"));
assert!(store.destroy(&uid));
# Ok::<(), bucketstore_core::StoreError>(())
```
*/

pub mod codec;
pub mod config;
pub mod error;
pub mod metadata;
pub mod observability;
pub mod storage;
pub mod store;
pub mod uid;


pub use codec::EncodingFormat;
pub use config::DataStoreConfig;
pub use error::{Result, StoreError};
pub use metadata::{MetaValue, Metadata};
pub use storage::{MemoryStorageClient, StorageClient};
#[cfg(feature = "gcs")]
pub use storage::GcsStorageClient;
pub use store::{Content, DataStore, WriteOptions};
pub use uid::generate_uid;
