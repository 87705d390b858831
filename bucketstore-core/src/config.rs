//! Configuration for the data store
//!
//! This module provides the settings a data store is built from: the target
//! bucket and project, credentials, the optional public domain used by
//! `url_for`, an optional root path prefixed to every storage key, and the
//! default headers applied to every upload.

use crate::codec::{insert_header, HeaderSet};
use crate::{Result, StoreError};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Configuration structure for a data store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataStoreConfig {
    /// Cloud project owning the bucket (used when the bucket must be created)
    pub project: String,
    /// Bucket objects are stored in
    pub bucket: String,
    /// Service account JSON keyfile (optional, defaults to the credential chain)
    #[serde(default)]
    pub keyfile: Option<PathBuf>,
    /// Public domain objects are served from (optional)
    #[serde(default)]
    pub domain: Option<String>,
    /// Prefix prepended to every storage key (optional)
    #[serde(default)]
    pub root_path: Option<String>,
    /// Headers applied to every upload, lowest precedence
    #[serde(default)]
    pub storage_headers: HeaderSet,
}

impl DataStoreConfig {
    /// Create a configuration for `bucket` in `project`
    pub fn new(project: impl Into<String>, bucket: impl Into<String>) -> Self {
        DataStoreConfig {
            project: project.into(),
            bucket: bucket.into(),
            keyfile: None,
            domain: None,
            root_path: None,
            storage_headers: HeaderSet::new(),
        }
    }

    /// Use a service account keyfile
    pub fn with_keyfile(mut self, keyfile: impl Into<PathBuf>) -> Self {
        self.keyfile = Some(keyfile.into());
        self
    }

    /// Serve objects from a public domain
    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    /// Store every object below a root path
    pub fn with_root_path(mut self, root_path: impl Into<String>) -> Self {
        self.root_path = Some(root_path.into());
        self
    }

    /// Add a default header applied to every upload
    pub fn with_storage_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        insert_header(&mut self.storage_headers, name, value);
        self
    }

    /// Parse a storage URI of the form `gs://bucket` or `gs://bucket/root/path`
    pub fn from_uri(project: impl Into<String>, uri: &str) -> Result<Self> {
        let rest = uri
            .strip_prefix("gs://")
            .ok_or_else(|| StoreError::validation(format!("Invalid GCS URI '{uri}': expected gs://")))?;

        let (bucket, root) = match rest.split_once('/') {
            Some((bucket, root)) => (bucket, root.trim_matches('/')),
            None => (rest, ""),
        };
        if bucket.is_empty() {
            return Err(StoreError::validation("Invalid GCS URI: missing bucket name"));
        }

        let mut config = DataStoreConfig::new(project, bucket);
        if !root.is_empty() {
            config.root_path = Some(root.to_string());
        }
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.bucket.is_empty() {
            return Err(StoreError::validation("bucket name cannot be empty"));
        }
        if self.bucket.contains('/') {
            return Err(StoreError::validation(format!(
                "bucket name '{}' cannot contain '/'",
                self.bucket
            )));
        }
        if matches!(&self.domain, Some(domain) if domain.is_empty()) {
            return Err(StoreError::validation("domain cannot be empty when set"));
        }
        Ok(())
    }

    /// The key an object with `uid` is stored under
    pub fn storage_key(&self, uid: &str) -> String {
        match self.root_path.as_deref().map(|root| root.trim_end_matches('/')) {
            Some(root) if !root.is_empty() => format!("{root}/{uid}"),
            _ => uid.to_string(),
        }
    }
}
