use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::Utc;
use std::collections::HashMap;

use super::codec::{self, OUTPUT_CONTENT_TYPE, OUTPUT_FORMAT};
use super::error::MediaError;
use super::model::{
    object_key, ImagePage, ImageRecord, ImageWithData, ListImagesQuery, PageKey,
    UploadImagePayload,
};
use super::settings::{MediaSettings, UploadLimits};
use super::store::ImageStores;

/// Upload an image: normalize to JPEG, write the object, then the record.
///
/// If the record write fails the object is removed again so the two stores
/// do not drift apart.
pub async fn upload_image(
    stores: &ImageStores,
    limits: &UploadLimits,
    payload: UploadImagePayload,
) -> Result<ImageRecord, MediaError> {
    let (user_id, image_data) = match (non_empty(payload.user_id), non_empty(payload.image_data)) {
        (Some(user_id), Some(image_data)) => (user_id, image_data),
        _ => {
            return Err(MediaError::Validation(
                "user_id and image_data are required".to_string(),
            ))
        }
    };

    let title = payload.title.unwrap_or_default();
    let description = payload.description.unwrap_or_default();
    let tags = payload.tags.unwrap_or_default();
    check_len("title", &title, limits.max_title_len)?;
    check_len("description", &description, limits.max_description_len)?;
    if tags.len() > limits.max_tags {
        return Err(MediaError::Validation(format!(
            "Too many tags. Max count: {}",
            limits.max_tags
        )));
    }

    let raw = codec::decode_payload(&image_data, limits)?;
    let image = codec::normalize(&raw, limits)?;

    let image_id = uuid::Uuid::new_v4().to_string();
    let s3_key = object_key(&user_id, &image_id);
    let now = Utc::now();

    let record = ImageRecord {
        image_id: image_id.clone(),
        user_id: user_id.clone(),
        s3_key: s3_key.clone(),
        title: title.clone(),
        description: description.clone(),
        tags,
        width: image.width,
        height: image.height,
        format: OUTPUT_FORMAT.to_string(),
        source_format: image.source_format,
        file_size: image.bytes.len() as u64,
        created_at: now,
        updated_at: now,
    };

    let mut object_metadata = HashMap::new();
    object_metadata.insert("user_id".to_string(), user_id);
    object_metadata.insert("image_id".to_string(), image_id);
    object_metadata.insert("title".to_string(), title);
    object_metadata.insert("description".to_string(), description);

    stores
        .objects
        .put_object(&s3_key, image.bytes, OUTPUT_CONTENT_TYPE, object_metadata)
        .await?;

    if let Err(e) = stores.metadata.put_record(&record).await {
        tracing::error!(
            "Metadata write failed for {}, removing object {}: {}",
            record.image_id,
            s3_key,
            e
        );
        if let Err(cleanup) = stores.objects.delete_object(&s3_key).await {
            // Left for the sweep
            tracing::warn!("Cleanup of {} failed: {}", s3_key, cleanup);
        }
        return Err(e.into());
    }

    Ok(record)
}

/// One page of image summaries, filtered by owner and/or tag.
///
/// Reads backing pages until it holds `limit + 1` matches or the store runs
/// dry, so `next_key` is present exactly when more matches exist.
pub async fn list_images(
    stores: &ImageStores,
    settings: &MediaSettings,
    query: ListImagesQuery,
) -> Result<ImagePage, MediaError> {
    let limit = query.limit.unwrap_or(settings.default_page_limit);
    if limit == 0 || limit > settings.max_page_limit {
        return Err(MediaError::Validation(format!(
            "limit must be between 1 and {}",
            settings.max_page_limit
        )));
    }

    let user_id = non_empty(query.user_id);
    let tag = non_empty(query.tag);
    let mut cursor = match non_empty(query.last_key) {
        Some(token) => Some(PageKey::decode_for(&token, user_id.as_deref())?),
        None => None,
    };

    let mut matches: Vec<ImageRecord> = Vec::with_capacity(limit + 1);
    loop {
        let want = limit + 1 - matches.len();
        let page = match &user_id {
            Some(user_id) => {
                stores
                    .metadata
                    .query_by_user(user_id, want, cursor.as_ref())
                    .await?
            }
            None => stores.metadata.scan(want, cursor.as_ref()).await?,
        };

        matches.extend(
            page.records
                .into_iter()
                .filter(|r| tag.as_deref().map_or(true, |t| r.has_tag(t))),
        );

        cursor = page.next;
        if matches.len() > limit || cursor.is_none() {
            break;
        }
    }

    let has_more = matches.len() > limit;
    matches.truncate(limit);

    let next_key = if has_more {
        matches.last().map(|last| {
            if user_id.is_some() {
                PageKey::for_user_index(last).encode()
            } else {
                PageKey::for_table(last).encode()
            }
        })
    } else {
        None
    };

    let images: Vec<_> = matches.iter().map(ImageRecord::summary).collect();
    Ok(ImagePage {
        count: images.len(),
        images,
        has_more: next_key.is_some(),
        next_key,
    })
}

/// DynamoDB refuses partition keys longer than this
const MAX_IMAGE_ID_BYTES: usize = 2048;

/// Fetch a record, failing with `NotFound` when it does not exist
pub async fn get_image(stores: &ImageStores, image_id: &str) -> Result<ImageRecord, MediaError> {
    // No stored id can be this long
    if image_id.is_empty() || image_id.len() > MAX_IMAGE_ID_BYTES {
        return Err(MediaError::NotFound);
    }
    stores
        .metadata
        .get_record(image_id)
        .await?
        .ok_or(MediaError::NotFound)
}

/// Record plus stored bytes
pub async fn get_image_with_data(
    stores: &ImageStores,
    image_id: &str,
) -> Result<ImageWithData, MediaError> {
    let record = get_image(stores, image_id).await?;
    let bytes = stores
        .objects
        .get_object(&record.s3_key)
        .await?
        .ok_or(MediaError::ObjectMissing)?;

    Ok(ImageWithData {
        image_id: record.image_id.clone(),
        image_data: STANDARD.encode(bytes),
        content_type: OUTPUT_CONTENT_TYPE.to_string(),
        metadata: record.summary(),
    })
}

/// Delete an image. The object delete is best-effort; the record delete is not.
pub async fn delete_image(stores: &ImageStores, image_id: &str) -> Result<ImageRecord, MediaError> {
    let record = get_image(stores, image_id).await?;

    if let Err(e) = stores.objects.delete_object(&record.s3_key).await {
        tracing::warn!(
            "Failed to delete object {} for image {}, continuing: {}",
            record.s3_key,
            image_id,
            e
        );
    }

    stores.metadata.delete_record(image_id).await?;
    Ok(record)
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

fn check_len(field: &str, value: &str, max: usize) -> Result<(), MediaError> {
    if value.chars().count() > max {
        return Err(MediaError::Validation(format!(
            "{} too long. Max length: {}",
            field, max
        )));
    }
    Ok(())
}
