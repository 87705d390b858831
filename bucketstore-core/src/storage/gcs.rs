/*!
Google Cloud Storage (GCS) client implementation.

This module drives the asynchronous `google-cloud-storage` client from a
dedicated runtime so the data store can stay blocking.
*/

use google_cloud_storage::client::google_cloud_auth::credentials::CredentialsFile;
use google_cloud_storage::client::{Client as GcsClient, ClientConfig};
use google_cloud_storage::http::buckets::get::GetBucketRequest;
use google_cloud_storage::http::buckets::insert::{InsertBucketParam, InsertBucketRequest};
use google_cloud_storage::http::objects::delete::DeleteObjectRequest;
use google_cloud_storage::http::objects::download::Range;
use google_cloud_storage::http::objects::get::GetObjectRequest;
use google_cloud_storage::http::objects::upload::{UploadObjectRequest, UploadType};
use google_cloud_storage::http::objects::Object;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use tokio::runtime::Runtime;
use tracing::{debug, error, info};

use super::{StorageClient, StoredObject};
use crate::codec::{EncodedHeaders, HeaderSet};
use crate::config::DataStoreConfig;
use crate::{Result, StoreError};

/// Google Cloud Storage client for a single bucket
///
/// # Authentication
/// When a service-account keyfile is configured it is used directly.
/// Otherwise the standard GCP credential chain applies:
/// 1. GOOGLE_APPLICATION_CREDENTIALS environment variable pointing to service account JSON
/// 2. Service account attached to the compute instance (GCE, GKE, Cloud Run, etc.)
/// 3. gcloud user credentials (when running locally with gcloud auth)
///
/// # Example
/// ```rust,no_run
/// use bucketstore_core::{DataStore, DataStoreConfig, storage::GcsStorageClient};
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let config = DataStoreConfig::new("my-project", "my-uploads");
/// let client = GcsStorageClient::from_config(&config)?;
/// let store = DataStore::new(client, config)?;
/// # Ok(())
/// # }
/// ```
pub struct GcsStorageClient {
    client: GcsClient,
    bucket: String,
    project: String,
    runtime: Arc<Runtime>,
}

impl GcsStorageClient {
    /// Create a client from a data store configuration
    pub fn from_config(config: &DataStoreConfig) -> Result<Self> {
        Self::new(
            config.bucket.clone(),
            config.project.clone(),
            config.keyfile.as_deref(),
        )
    }

    /// Create a client for `bucket` in `project`
    ///
    /// # Arguments
    /// * `bucket` - The GCS bucket name
    /// * `project` - Project used when the bucket has to be created
    /// * `keyfile` - Optional path to a service account JSON file
    ///
    /// # Errors
    /// Returns an error if the runtime cannot be created or authentication fails
    pub fn new(
        bucket: impl Into<String>,
        project: impl Into<String>,
        keyfile: Option<&Path>,
    ) -> Result<Self> {
        let bucket = bucket.into();
        let project = project.into();

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(num_cpus::get().clamp(2, 8))
            .enable_all()
            .build()
            .map_err(|e| {
                StoreError::storage(format!("Failed to create async runtime for GCS client: {e}"))
            })?;

        let config = runtime.block_on(async {
            match keyfile {
                Some(path) => {
                    let credentials =
                        CredentialsFile::new_from_file(path.to_string_lossy().into_owned())
                            .await
                            .map_err(|e| {
                                StoreError::storage(format!(
                                    "Failed to read GCS keyfile {}: {e}",
                                    path.display()
                                ))
                            })?;
                    ClientConfig::default()
                        .with_credentials(credentials)
                        .await
                        .map_err(|e| StoreError::storage(format!("GCS authentication failed: {e}")))
                }
                None => ClientConfig::default()
                    .with_auth()
                    .await
                    .map_err(|e| StoreError::storage(format!("GCS authentication failed: {e}"))),
            }
        })?;

        info!(bucket = %bucket, project = %project, "Initialized GCS storage client");

        Ok(GcsStorageClient {
            client: GcsClient::new(config),
            bucket,
            project,
            runtime: Arc::new(runtime),
        })
    }

    fn block_on<F: Future>(&self, future: F) -> F::Output {
        self.runtime.block_on(future)
    }
}

impl StorageClient for GcsStorageClient {
    fn bucket_exists(&self) -> Result<bool> {
        let req = GetBucketRequest {
            bucket: self.bucket.clone(),
            ..Default::default()
        };

        match self.block_on(self.client.get_bucket(&req)) {
            Ok(_) => Ok(true),
            Err(e) if is_not_found(&e) => Ok(false),
            Err(e) => Err(map_gcs_error("get_bucket", &e, &self.bucket)),
        }
    }

    fn create_bucket(&self) -> Result<()> {
        info!(bucket = %self.bucket, project = %self.project, "Creating GCS bucket");

        let req = InsertBucketRequest {
            name: self.bucket.clone(),
            param: InsertBucketParam {
                project: self.project.clone(),
                ..Default::default()
            },
            ..Default::default()
        };

        self.block_on(self.client.insert_bucket(&req))
            .map(|_| ())
            .map_err(|e| {
                let err = map_gcs_error("insert_bucket", &e, &self.bucket);
                error!(bucket = %self.bucket, error = ?err, "Failed to create GCS bucket");
                err
            })
    }

    fn upload(&self, key: &str, data: &[u8], headers: &EncodedHeaders) -> Result<()> {
        info!(bucket = %self.bucket, key = %key, size = data.len(), "Uploading object to GCS");

        let req = UploadObjectRequest {
            bucket: self.bucket.clone(),
            ..Default::default()
        };
        let object = Object {
            name: key.to_string(),
            content_type: headers.content_type.clone(),
            cache_control: headers.cache_control.clone(),
            content_disposition: headers.content_disposition.clone(),
            content_encoding: headers.content_encoding.clone(),
            content_language: headers.content_language.clone(),
            metadata: Some(headers.metadata.clone().into_iter().collect()),
            ..Default::default()
        };
        let upload_type = UploadType::Multipart(Box::new(object));

        match self.block_on(self.client.upload_object(&req, data.to_vec(), &upload_type)) {
            Ok(_) => {
                debug!("Uploaded gs://{}/{}", self.bucket, key);
                Ok(())
            }
            Err(e) => {
                let err = map_gcs_error("upload_object", &e, key);
                error!(bucket = %self.bucket, key = %key, error = ?err, "Failed to upload object to GCS");
                Err(err)
            }
        }
    }

    fn download(&self, key: &str) -> Result<StoredObject> {
        info!(bucket = %self.bucket, key = %key, "Downloading object from GCS");

        let req = GetObjectRequest {
            bucket: self.bucket.clone(),
            object: key.to_string(),
            ..Default::default()
        };

        let result = self.block_on(async {
            let object = self.client.get_object(&req).await?;
            let data = self.client.download_object(&req, &Range::default()).await?;
            Ok::<_, google_cloud_storage::http::Error>((object, data))
        });

        match result {
            Ok((object, data)) => {
                debug!("Downloaded {} bytes from gs://{}/{}", data.len(), self.bucket, key);
                let metadata: HeaderSet = object.metadata.unwrap_or_default().into_iter().collect();
                Ok(StoredObject {
                    data: data.into(),
                    metadata,
                })
            }
            Err(e) => Err(map_gcs_error("download_object", &e, key)),
        }
    }

    fn delete(&self, key: &str) -> Result<()> {
        info!(bucket = %self.bucket, key = %key, "Deleting object from GCS");

        let req = DeleteObjectRequest {
            bucket: self.bucket.clone(),
            object: key.to_string(),
            ..Default::default()
        };

        match self.block_on(self.client.delete_object(&req)) {
            Ok(()) => {
                debug!("Deleted gs://{}/{}", self.bucket, key);
                Ok(())
            }
            Err(e) => Err(map_gcs_error("delete_object", &e, key)),
        }
    }
}

/// HTTP status carried by a GCS error, if the service answered at all
fn status_code(error: &google_cloud_storage::http::Error) -> Option<u16> {
    use google_cloud_storage::http::Error;

    match error {
        Error::Response(response) => Some(response.code),
        Error::HttpClient(e) | Error::RawResponse(e, _) => e.status().map(|status| status.as_u16()),
        _ => None,
    }
}

fn is_not_found(error: &google_cloud_storage::http::Error) -> bool {
    status_code(error) == Some(404)
}

/// Map GCS errors to StoreError
fn map_gcs_error(
    operation: &str,
    error: &google_cloud_storage::http::Error,
    key: &str,
) -> StoreError {
    match status_code(error) {
        Some(404) => StoreError::not_found(key),
        Some(401 | 403) => StoreError::storage(format!(
            "GCS permission denied for '{key}': Ensure you have proper IAM permissions. Error: {error}"
        )),
        Some(409) => StoreError::storage(format!("GCS conflict for '{key}': {error}")),
        Some(429) => StoreError::storage(format!("GCS rate limit exceeded for '{key}': {error}")),
        _ => StoreError::storage(format!("GCS {operation} error for '{key}': {error}")),
    }
}
