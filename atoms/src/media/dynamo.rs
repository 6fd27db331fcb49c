use async_trait::async_trait;
use aws_sdk_dynamodb::error::DisplayErrorContext;
use aws_sdk_dynamodb::types::AttributeValue;
use aws_sdk_dynamodb::Client as DynamoClient;
use std::collections::HashMap;

use super::error::StoreError;
use super::model::{format_timestamp, parse_timestamp, ImageRecord, PageKey, RecordPage};
use super::store::MetadataStore;

/// Image records in a DynamoDB table keyed by `image_id`, with a
/// `user_id`/`created_at` global secondary index.
pub struct DynamoMetadataStore {
    client: DynamoClient,
    table_name: String,
    user_index: String,
}

impl DynamoMetadataStore {
    pub fn new(client: DynamoClient, table_name: &str, user_index: &str) -> Self {
        Self {
            client,
            table_name: table_name.to_string(),
            user_index: user_index.to_string(),
        }
    }
}

#[async_trait]
impl MetadataStore for DynamoMetadataStore {
    async fn put_record(&self, record: &ImageRecord) -> Result<(), StoreError> {
        self.client
            .put_item()
            .table_name(&self.table_name)
            .set_item(Some(to_item(record)))
            .send()
            .await
            .map_err(|e| StoreError::Dynamo(format!("put_item: {}", DisplayErrorContext(&e))))?;
        Ok(())
    }

    async fn get_record(&self, image_id: &str) -> Result<Option<ImageRecord>, StoreError> {
        let result = self
            .client
            .get_item()
            .table_name(&self.table_name)
            .key("image_id", AttributeValue::S(image_id.to_string()))
            .send()
            .await
            .map_err(|e| StoreError::Dynamo(format!("get_item: {}", DisplayErrorContext(&e))))?;

        result.item().map(from_item).transpose()
    }

    async fn delete_record(&self, image_id: &str) -> Result<(), StoreError> {
        self.client
            .delete_item()
            .table_name(&self.table_name)
            .key("image_id", AttributeValue::S(image_id.to_string()))
            .send()
            .await
            .map_err(|e| StoreError::Dynamo(format!("delete_item: {}", DisplayErrorContext(&e))))?;
        Ok(())
    }

    async fn query_by_user(
        &self,
        user_id: &str,
        limit: usize,
        start: Option<&PageKey>,
    ) -> Result<RecordPage, StoreError> {
        let result = self
            .client
            .query()
            .table_name(&self.table_name)
            .index_name(&self.user_index)
            .key_condition_expression("user_id = :user_id")
            .expression_attribute_values(":user_id", AttributeValue::S(user_id.to_string()))
            .limit(page_limit(limit))
            // Newest first
            .scan_index_forward(false)
            .set_exclusive_start_key(start.map(to_key))
            .send()
            .await
            .map_err(|e| StoreError::Dynamo(format!("query: {}", DisplayErrorContext(&e))))?;

        Ok(RecordPage {
            records: result.items().iter().map(from_item).collect::<Result<_, _>>()?,
            next: result.last_evaluated_key().map(from_key),
        })
    }

    async fn scan(&self, limit: usize, start: Option<&PageKey>) -> Result<RecordPage, StoreError> {
        let result = self
            .client
            .scan()
            .table_name(&self.table_name)
            .limit(page_limit(limit))
            .set_exclusive_start_key(start.map(to_key))
            .send()
            .await
            .map_err(|e| StoreError::Dynamo(format!("scan: {}", DisplayErrorContext(&e))))?;

        Ok(RecordPage {
            records: result.items().iter().map(from_item).collect::<Result<_, _>>()?,
            next: result.last_evaluated_key().map(from_key),
        })
    }
}

fn page_limit(limit: usize) -> i32 {
    i32::try_from(limit.max(1)).unwrap_or(i32::MAX)
}

fn to_key(key: &PageKey) -> HashMap<String, AttributeValue> {
    key.0
        .iter()
        .map(|(k, v)| (k.clone(), AttributeValue::S(v.clone())))
        .collect()
}

fn from_key(key: &HashMap<String, AttributeValue>) -> PageKey {
    PageKey(
        key.iter()
            .filter_map(|(k, v)| v.as_s().ok().map(|s| (k.clone(), s.clone())))
            .collect(),
    )
}

pub(crate) fn to_item(record: &ImageRecord) -> HashMap<String, AttributeValue> {
    let mut item = HashMap::new();
    item.insert("image_id".to_string(), AttributeValue::S(record.image_id.clone()));
    item.insert("user_id".to_string(), AttributeValue::S(record.user_id.clone()));
    item.insert("s3_key".to_string(), AttributeValue::S(record.s3_key.clone()));
    item.insert("title".to_string(), AttributeValue::S(record.title.clone()));
    item.insert("description".to_string(), AttributeValue::S(record.description.clone()));
    item.insert(
        "tags".to_string(),
        AttributeValue::L(record.tags.iter().cloned().map(AttributeValue::S).collect()),
    );
    item.insert("width".to_string(), AttributeValue::N(record.width.to_string()));
    item.insert("height".to_string(), AttributeValue::N(record.height.to_string()));
    item.insert("format".to_string(), AttributeValue::S(record.format.clone()));
    item.insert("source_format".to_string(), AttributeValue::S(record.source_format.clone()));
    item.insert("file_size".to_string(), AttributeValue::N(record.file_size.to_string()));
    item.insert("created_at".to_string(), AttributeValue::S(format_timestamp(&record.created_at)));
    item.insert("updated_at".to_string(), AttributeValue::S(format_timestamp(&record.updated_at)));
    item
}

pub(crate) fn from_item(item: &HashMap<String, AttributeValue>) -> Result<ImageRecord, StoreError> {
    let image_id = item
        .get("image_id")
        .and_then(|v| v.as_s().ok())
        .map(|s| s.to_string())
        .ok_or_else(|| StoreError::Corrupt {
            image_id: "<unknown>".to_string(),
            reason: "missing image_id".to_string(),
        })?;

    let corrupt = |reason: &str| StoreError::Corrupt {
        image_id: image_id.clone(),
        reason: reason.to_string(),
    };

    let string = |name: &str| {
        item.get(name)
            .and_then(|v| v.as_s().ok())
            .map(|s| s.to_string())
    };
    let number = |name: &str| {
        item.get(name)
            .and_then(|v| v.as_n().ok())
            .and_then(|n| n.parse::<u64>().ok())
    };

    let user_id = string("user_id").ok_or_else(|| corrupt("missing user_id"))?;
    let s3_key = string("s3_key").ok_or_else(|| corrupt("missing s3_key"))?;
    let created_at = string("created_at")
        .as_deref()
        .and_then(parse_timestamp)
        .ok_or_else(|| corrupt("bad created_at"))?;
    let updated_at = string("updated_at")
        .as_deref()
        .and_then(parse_timestamp)
        .unwrap_or(created_at);

    let tags = item
        .get("tags")
        .and_then(|v| v.as_l().ok())
        .map(|list| {
            list.iter()
                .filter_map(|t| t.as_s().ok().map(|s| s.to_string()))
                .collect()
        })
        .unwrap_or_default();

    Ok(ImageRecord {
        user_id,
        s3_key,
        title: string("title").unwrap_or_default(),
        description: string("description").unwrap_or_default(),
        tags,
        width: number("width").and_then(|n| u32::try_from(n).ok()).unwrap_or(0),
        height: number("height").and_then(|n| u32::try_from(n).ok()).unwrap_or(0),
        format: string("format").unwrap_or_default(),
        source_format: string("source_format").unwrap_or_default(),
        file_size: number("file_size").unwrap_or(0),
        created_at,
        updated_at,
        image_id,
    })
}
