//! Storage seams for the image handlers.
//!
//! Both traits are object-safe so handlers can hold `Arc<dyn ...>` and the
//! in-memory implementations can stand in for S3 and DynamoDB.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;

use super::error::StoreError;
use super::model::{ImageRecord, PageKey, RecordPage};

/// One listed object
#[derive(Debug, Clone)]
pub struct ObjectSummary {
    pub key: String,
    pub last_modified: Option<DateTime<Utc>>,
}

/// One page of an object listing
#[derive(Debug, Default)]
pub struct ObjectListing {
    pub objects: Vec<ObjectSummary>,
    pub continuation: Option<String>,
}

/// Binary blob storage (S3)
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put_object(
        &self,
        key: &str,
        body: Vec<u8>,
        content_type: &str,
        metadata: HashMap<String, String>,
    ) -> Result<(), StoreError>;

    /// `None` when the key does not exist
    async fn get_object(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    async fn object_exists(&self, key: &str) -> Result<bool, StoreError>;

    /// Deleting a missing key is not an error
    async fn delete_object(&self, key: &str) -> Result<(), StoreError>;

    async fn list_objects(
        &self,
        prefix: &str,
        continuation: Option<String>,
    ) -> Result<ObjectListing, StoreError>;
}

/// Indexed metadata storage (DynamoDB)
#[async_trait]
pub trait MetadataStore: Send + Sync {
    async fn put_record(&self, record: &ImageRecord) -> Result<(), StoreError>;

    async fn get_record(&self, image_id: &str) -> Result<Option<ImageRecord>, StoreError>;

    async fn delete_record(&self, image_id: &str) -> Result<(), StoreError>;

    /// Records of one user, newest first, resuming after `start`
    async fn query_by_user(
        &self,
        user_id: &str,
        limit: usize,
        start: Option<&PageKey>,
    ) -> Result<RecordPage, StoreError>;

    /// All records in store order, resuming after `start`
    async fn scan(&self, limit: usize, start: Option<&PageKey>) -> Result<RecordPage, StoreError>;
}

/// The two stores every image operation talks to
#[derive(Clone)]
pub struct ImageStores {
    pub objects: Arc<dyn ObjectStore>,
    pub metadata: Arc<dyn MetadataStore>,
}

impl ImageStores {
    pub fn new(objects: Arc<dyn ObjectStore>, metadata: Arc<dyn MetadataStore>) -> Self {
        Self { objects, metadata }
    }
}
