use async_trait::async_trait;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::operation::get_object::GetObjectError;
use aws_sdk_s3::operation::head_object::HeadObjectError;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client as S3Client;
use chrono::DateTime;
use std::collections::HashMap;

use super::error::StoreError;
use super::store::{ObjectListing, ObjectStore, ObjectSummary};

/// Image objects in one S3 bucket
pub struct S3ObjectStore {
    client: S3Client,
    bucket: String,
}

impl S3ObjectStore {
    pub fn new(client: S3Client, bucket: &str) -> Self {
        Self {
            client,
            bucket: bucket.to_string(),
        }
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn put_object(
        &self,
        key: &str,
        body: Vec<u8>,
        content_type: &str,
        metadata: HashMap<String, String>,
    ) -> Result<(), StoreError> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(body))
            .content_type(content_type)
            .set_metadata(Some(header_safe(metadata)))
            .send()
            .await
            .map_err(|e| StoreError::S3(format!("put_object {}: {}", key, DisplayErrorContext(&e))))?;
        Ok(())
    }

    async fn get_object(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let result = match self.client.get_object().bucket(&self.bucket).key(key).send().await {
            Ok(output) => output,
            Err(e) if matches!(e.as_service_error(), Some(GetObjectError::NoSuchKey(_))) => {
                return Ok(None)
            }
            Err(e) => {
                return Err(StoreError::S3(format!(
                    "get_object {}: {}",
                    key,
                    DisplayErrorContext(&e)
                )))
            }
        };

        let body_bytes = result
            .body
            .collect()
            .await
            .map_err(|e| StoreError::S3(format!("Failed to read S3 body for {}: {}", key, e)))?
            .into_bytes();

        Ok(Some(body_bytes.to_vec()))
    }

    async fn object_exists(&self, key: &str) -> Result<bool, StoreError> {
        match self.client.head_object().bucket(&self.bucket).key(key).send().await {
            Ok(_) => Ok(true),
            Err(e) if matches!(e.as_service_error(), Some(HeadObjectError::NotFound(_))) => Ok(false),
            Err(e) => Err(StoreError::S3(format!(
                "head_object {}: {}",
                key,
                DisplayErrorContext(&e)
            ))),
        }
    }

    async fn delete_object(&self, key: &str) -> Result<(), StoreError> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| StoreError::S3(format!("delete_object {}: {}", key, DisplayErrorContext(&e))))?;
        Ok(())
    }

    async fn list_objects(
        &self,
        prefix: &str,
        continuation: Option<String>,
    ) -> Result<ObjectListing, StoreError> {
        let resp = self
            .client
            .list_objects_v2()
            .bucket(&self.bucket)
            .prefix(prefix)
            .set_continuation_token(continuation)
            .send()
            .await
            .map_err(|e| {
                tracing::error!("S3 list_objects_v2 failed for prefix {}: {}", prefix, e);
                StoreError::S3(format!("list_objects_v2 {}: {}", prefix, DisplayErrorContext(&e)))
            })?;

        let objects = resp
            .contents()
            .iter()
            .filter_map(|o| {
                let key = o.key()?.to_string();
                let last_modified = o
                    .last_modified()
                    .and_then(|t| DateTime::from_timestamp(t.secs(), t.subsec_nanos()));
                Some(ObjectSummary { key, last_modified })
            })
            .collect();

        let continuation = if resp.is_truncated().unwrap_or(false) {
            resp.next_continuation_token().map(|s| s.to_string())
        } else {
            None
        };

        Ok(ObjectListing {
            objects,
            continuation,
        })
    }
}

/// S3 user metadata travels as HTTP headers; drop values that cannot.
fn header_safe(metadata: HashMap<String, String>) -> HashMap<String, String> {
    metadata
        .into_iter()
        .filter(|(k, v)| {
            let ok = v.chars().all(|c| c.is_ascii() && !c.is_ascii_control());
            if !ok {
                tracing::debug!("Skipping non-ASCII object metadata field {}", k);
            }
            ok
        })
        .collect()
}
