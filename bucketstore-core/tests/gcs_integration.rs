/*!
Google Cloud Storage integration tests.

These tests talk to a real bucket and are skipped unless enabled:
```bash
RUN_GCS_TESTS=1 BUCKETSTORE_TEST_BUCKET=my-test-bucket GOOGLE_CLOUD_PROJECT=my-project \
    cargo test -p bucketstore-core --features gcs --test gcs_integration
```
*/

#![cfg(feature = "gcs")]

use bucketstore_core::observability::init_default_observability;
use bucketstore_core::{Content, DataStore, DataStoreConfig, GcsStorageClient, WriteOptions};

fn gcs_config() -> Option<DataStoreConfig> {
    if std::env::var("RUN_GCS_TESTS").unwrap_or_default() != "1" {
        println!("Skipping GCS test - set RUN_GCS_TESTS=1 and BUCKETSTORE_TEST_BUCKET");
        return None;
    }
    let bucket = std::env::var("BUCKETSTORE_TEST_BUCKET").ok()?;
    let project = std::env::var("GOOGLE_CLOUD_PROJECT").unwrap_or_default();

    let mut config = DataStoreConfig::new(project, bucket).with_root_path("bucketstore-tests");
    config.keyfile = std::env::var_os("GOOGLE_APPLICATION_CREDENTIALS").map(Into::into);
    Some(config)
}

#[test]
fn test_gcs_round_trip() {
    let Some(config) = gcs_config() else {
        return;
    };
    init_default_observability();

    let client = GcsStorageClient::from_config(&config).unwrap();
    let store = DataStore::new(client, config).unwrap();

    let content = Content::new(&b"hello from bucketstore"[..])
        .with_name("greeting.txt")
        .with_meta_value("lang", "en")
        .with_meta_value("words", 3i64);
    let opts = WriteOptions::default().with_header("Content-Type", "text/plain");

    let uid = store.write(&content, &opts).unwrap();
    let (data, meta) = store.try_read(&uid).unwrap();
    assert_eq!(data, content.data);
    assert_eq!(meta, Some(content.meta.clone()));

    store.try_destroy(&uid).unwrap();
    assert!(store.read(&uid).is_none());
}
