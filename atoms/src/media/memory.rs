//! In-process stores for local runs (`STORAGE_BACKEND=memory`) and tests.
//! They mimic the paging contract of the AWS stores: scans in `image_id`
//! order, user queries newest first, `next` set whenever the page filled up.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;

use super::error::StoreError;
use super::model::{format_timestamp, ImageRecord, PageKey, RecordPage};
use super::store::{MetadataStore, ObjectListing, ObjectStore, ObjectSummary};

const LIST_PAGE_SIZE: usize = 1000;

#[derive(Debug, Clone)]
struct StoredObject {
    body: Vec<u8>,
    content_type: String,
    metadata: HashMap<String, String>,
    last_modified: DateTime<Utc>,
}

#[derive(Default)]
pub struct MemoryObjectStore {
    objects: RwLock<BTreeMap<String, StoredObject>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.objects.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.objects.read().await.is_empty()
    }

    pub async fn content_type(&self, key: &str) -> Option<String> {
        self.objects.read().await.get(key).map(|o| o.content_type.clone())
    }

    pub async fn metadata(&self, key: &str) -> Option<HashMap<String, String>> {
        self.objects.read().await.get(key).map(|o| o.metadata.clone())
    }

    /// Backdate an object, e.g. to push it past the sweep grace period
    pub async fn set_last_modified(&self, key: &str, at: DateTime<Utc>) {
        if let Some(obj) = self.objects.write().await.get_mut(key) {
            obj.last_modified = at;
        }
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn put_object(
        &self,
        key: &str,
        body: Vec<u8>,
        content_type: &str,
        metadata: HashMap<String, String>,
    ) -> Result<(), StoreError> {
        self.objects.write().await.insert(
            key.to_string(),
            StoredObject {
                body,
                content_type: content_type.to_string(),
                metadata,
                last_modified: Utc::now(),
            },
        );
        Ok(())
    }

    async fn get_object(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.objects.read().await.get(key).map(|o| o.body.clone()))
    }

    async fn object_exists(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.objects.read().await.contains_key(key))
    }

    async fn delete_object(&self, key: &str) -> Result<(), StoreError> {
        self.objects.write().await.remove(key);
        Ok(())
    }

    async fn list_objects(
        &self,
        prefix: &str,
        continuation: Option<String>,
    ) -> Result<ObjectListing, StoreError> {
        let objects = self.objects.read().await;
        let mut matching = objects
            .iter()
            .filter(|(k, _)| k.starts_with(prefix))
            .filter(|(k, _)| continuation.as_deref().map_or(true, |after| k.as_str() > after));

        let page: Vec<ObjectSummary> = matching
            .by_ref()
            .take(LIST_PAGE_SIZE)
            .map(|(k, o)| ObjectSummary {
                key: k.clone(),
                last_modified: Some(o.last_modified),
            })
            .collect();

        let continuation = match matching.next() {
            Some(_) => page.last().map(|o| o.key.clone()),
            None => None,
        };
        Ok(ObjectListing {
            objects: page,
            continuation,
        })
    }
}

#[derive(Default)]
pub struct MemoryMetadataStore {
    records: RwLock<BTreeMap<String, ImageRecord>>,
}

impl MemoryMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

/// Sort key of the user index; ties broken by id like a stable store would
fn index_position(record: &ImageRecord) -> (String, String) {
    (format_timestamp(&record.created_at), record.image_id.clone())
}

#[async_trait]
impl MetadataStore for MemoryMetadataStore {
    async fn put_record(&self, record: &ImageRecord) -> Result<(), StoreError> {
        self.records
            .write()
            .await
            .insert(record.image_id.clone(), record.clone());
        Ok(())
    }

    async fn get_record(&self, image_id: &str) -> Result<Option<ImageRecord>, StoreError> {
        Ok(self.records.read().await.get(image_id).cloned())
    }

    async fn delete_record(&self, image_id: &str) -> Result<(), StoreError> {
        self.records.write().await.remove(image_id);
        Ok(())
    }

    async fn query_by_user(
        &self,
        user_id: &str,
        limit: usize,
        start: Option<&PageKey>,
    ) -> Result<RecordPage, StoreError> {
        let records = self.records.read().await;
        let mut owned: Vec<&ImageRecord> = records.values().filter(|r| r.user_id == user_id).collect();
        owned.sort_by_key(|r| std::cmp::Reverse(index_position(r)));

        let after = start.and_then(|key| {
            Some((key.get("created_at")?.to_string(), key.get("image_id")?.to_string()))
        });
        let remaining: Vec<ImageRecord> = owned
            .into_iter()
            .filter(|r| after.as_ref().map_or(true, |pos| index_position(r) < *pos))
            .cloned()
            .collect();

        Ok(page_of(remaining, limit, PageKey::for_user_index))
    }

    async fn scan(&self, limit: usize, start: Option<&PageKey>) -> Result<RecordPage, StoreError> {
        let records = self.records.read().await;
        let after = start.and_then(|key| key.get("image_id"));
        let remaining: Vec<ImageRecord> = records
            .values()
            .filter(|r| after.map_or(true, |id| r.image_id.as_str() > id))
            .cloned()
            .collect();

        Ok(page_of(remaining, limit, PageKey::for_table))
    }
}

/// Like DynamoDB, hand out a key whenever the page is full, even if nothing follows.
fn page_of(
    mut remaining: Vec<ImageRecord>,
    limit: usize,
    key_of: fn(&ImageRecord) -> PageKey,
) -> RecordPage {
    let limit = limit.max(1);
    let next = if remaining.len() >= limit {
        remaining.truncate(limit);
        remaining.last().map(key_of)
    } else {
        None
    };
    RecordPage {
        records: remaining,
        next,
    }
}
