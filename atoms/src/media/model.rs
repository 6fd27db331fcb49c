use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

use super::error::MediaError;

/// Prefix every stored image object lives under
pub const IMAGE_PREFIX: &str = "images/";

/// Image domain model - metadata for one stored image
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ImageRecord {
    pub image_id: String,
    pub user_id: String,
    pub s3_key: String,
    pub title: String,
    pub description: String,
    pub tags: Vec<String>,
    pub width: u32,
    pub height: u32,
    /// Always the normalized output format ("JPEG")
    pub format: String,
    /// What the client actually sent, e.g. "PNG"
    #[serde(default)]
    pub source_format: String,
    pub file_size: u64,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "timestamp")]
    pub updated_at: DateTime<Utc>,
}

impl ImageRecord {
    pub fn summary(&self) -> ImageSummary {
        ImageSummary {
            image_id: self.image_id.clone(),
            user_id: self.user_id.clone(),
            title: self.title.clone(),
            description: self.description.clone(),
            tags: self.tags.clone(),
            width: self.width,
            height: self.height,
            format: self.format.clone(),
            file_size: self.file_size,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }
}

/// Record as exposed by list/view: no storage key, no binary
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ImageSummary {
    pub image_id: String,
    pub user_id: String,
    pub title: String,
    pub description: String,
    pub tags: Vec<String>,
    pub width: u32,
    pub height: u32,
    pub format: String,
    pub file_size: u64,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "timestamp")]
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, Default)]
pub struct UploadImagePayload {
    pub user_id: Option<String>,
    /// Base64, optionally wrapped in a `data:` URL
    pub image_data: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub tags: Option<Vec<String>>,
}

#[derive(Debug, Serialize)]
pub struct UploadImageResponse {
    pub message: String,
    pub image_id: String,
    pub metadata: ImageRecord,
}

#[derive(Debug, Default, Clone)]
pub struct ListImagesQuery {
    pub user_id: Option<String>,
    pub tag: Option<String>,
    pub limit: Option<usize>,
    pub last_key: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ImagePage {
    pub images: Vec<ImageSummary>,
    pub count: usize,
    pub next_key: Option<String>,
    pub has_more: bool,
}

/// Full view: metadata plus the stored JPEG, base64-encoded
#[derive(Debug, Serialize, Deserialize)]
pub struct ImageWithData {
    pub image_id: String,
    pub image_data: String,
    pub content_type: String,
    pub metadata: ImageSummary,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DeleteImageResponse {
    pub message: String,
    pub image_id: String,
}

/// Store key of a record, used to resume a scan or an index query.
/// Every key attribute in the table is a string.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PageKey(pub BTreeMap<String, String>);

impl PageKey {
    /// Key for resuming a table scan
    pub fn for_table(record: &ImageRecord) -> Self {
        let mut key = BTreeMap::new();
        key.insert("image_id".to_string(), record.image_id.clone());
        PageKey(key)
    }

    /// Key for resuming a `user_id`/`created_at` index query
    pub fn for_user_index(record: &ImageRecord) -> Self {
        let mut key = BTreeMap::new();
        key.insert("image_id".to_string(), record.image_id.clone());
        key.insert("user_id".to_string(), record.user_id.clone());
        key.insert("created_at".to_string(), format_timestamp(&record.created_at));
        PageKey(key)
    }

    pub fn get(&self, attribute: &str) -> Option<&str> {
        self.0.get(attribute).map(|s| s.as_str())
    }

    /// Opaque token handed to clients as `next_key`
    pub fn encode(&self) -> String {
        // BTreeMap<String, String> always serializes
        let json = serde_json::to_vec(&self.0).unwrap_or_default();
        URL_SAFE_NO_PAD.encode(json)
    }

    /// Decode a client token for the listing it will resume: a bare
    /// `image_id` for a scan, or `image_id`/`user_id`/`created_at` of the
    /// same user for an index query.
    pub fn decode_for(token: &str, user_id: Option<&str>) -> Result<Self, MediaError> {
        let invalid = || MediaError::Validation("Invalid last_key".to_string());
        let bytes = URL_SAFE_NO_PAD.decode(token.trim()).map_err(|_| invalid())?;
        let map: BTreeMap<String, String> =
            serde_json::from_slice(&bytes).map_err(|_| invalid())?;
        let key = PageKey(map);

        let shape_ok = match user_id {
            None => key.0.len() == 1 && key.get("image_id").is_some(),
            Some(user_id) => {
                key.0.len() == 3
                    && key.get("image_id").is_some()
                    && key.get("user_id") == Some(user_id)
                    && key.get("created_at").and_then(parse_timestamp).is_some()
            }
        };
        if !shape_ok {
            return Err(invalid());
        }
        Ok(key)
    }
}

/// One page read from the metadata store
#[derive(Debug, Default)]
pub struct RecordPage {
    pub records: Vec<ImageRecord>,
    pub next: Option<PageKey>,
}

/// Object key for an image: `images/{user segment}/{image_id}.jpg`
pub fn object_key(user_id: &str, image_id: &str) -> String {
    format!("{}{}/{}.jpg", IMAGE_PREFIX, user_segment(user_id), image_id)
}

/// Inverse of [`object_key`]: the image id encoded in a key, if it has that shape
pub fn image_id_from_key(key: &str) -> Option<&str> {
    let rest = key.strip_prefix(IMAGE_PREFIX)?;
    let (_, file) = rest.rsplit_once('/')?;
    let id = file.strip_suffix(".jpg")?;
    if id.is_empty() {
        None
    } else {
        Some(id)
    }
}

/// User ids are unvalidated, so only `[A-Za-z0-9_-]` reaches the key.
fn user_segment(user_id: &str) -> String {
    let safe: String = user_id
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-')
        .collect();
    if !safe.is_empty() {
        return safe;
    }
    let digest = Sha256::digest(user_id.as_bytes());
    digest.iter().take(8).map(|b| format!("{:02x}", b)).collect()
}

/// Fixed-width RFC 3339 so that string order on the index equals time order
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

mod timestamp {
    use chrono::{DateTime, Utc};
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(ts: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&super::format_timestamp(ts))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(d)?;
        super::parse_timestamp(&raw)
            .ok_or_else(|| D::Error::custom(format!("invalid timestamp: {raw}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_key_keeps_safe_user_ids() {
        assert_eq!(object_key("user_123", "abc"), "images/user_123/abc.jpg");
    }

    #[test]
    fn object_key_strips_path_traversal() {
        assert_eq!(object_key("../../etc", "abc"), "images/etc/abc.jpg");
        let hashed = object_key("../", "abc");
        assert!(hashed.starts_with("images/"));
        assert!(!hashed.contains(".."));
        assert_eq!(image_id_from_key(&hashed), Some("abc"));
    }

    #[test]
    fn image_id_from_key_rejects_other_shapes() {
        assert_eq!(image_id_from_key("images/u/1234.jpg"), Some("1234"));
        assert_eq!(image_id_from_key("images/u/1234.png"), None);
        assert_eq!(image_id_from_key("other/u/1234.jpg"), None);
        assert_eq!(image_id_from_key("images/.jpg"), None);
    }

    fn record(user_id: &str) -> ImageRecord {
        let created = parse_timestamp("2024-05-01T10:00:00Z").unwrap();
        ImageRecord {
            image_id: "img-1".to_string(),
            user_id: user_id.to_string(),
            s3_key: object_key(user_id, "img-1"),
            title: String::new(),
            description: String::new(),
            tags: vec![],
            width: 1,
            height: 1,
            format: "JPEG".to_string(),
            source_format: "PNG".to_string(),
            file_size: 1,
            created_at: created,
            updated_at: created,
        }
    }

    #[test]
    fn page_key_token_survives_the_client() {
        let key = PageKey::for_user_index(&record("alice"));
        let token = key.encode();
        assert!(!token.contains('='));
        assert_eq!(PageKey::decode_for(&token, Some("alice")).unwrap(), key);

        let key = PageKey::for_table(&record("alice"));
        assert_eq!(PageKey::decode_for(&key.encode(), None).unwrap(), key);
    }

    #[test]
    fn page_key_rejects_garbage() {
        assert!(matches!(
            PageKey::decode_for("not base64!", None),
            Err(MediaError::Validation(_))
        ));
        let no_id = URL_SAFE_NO_PAD.encode(br#"{"user_id":"alice"}"#);
        assert!(PageKey::decode_for(&no_id, None).is_err());
        let bad_time = URL_SAFE_NO_PAD
            .encode(br#"{"created_at":"yesterday","image_id":"x","user_id":"alice"}"#);
        assert!(PageKey::decode_for(&bad_time, Some("alice")).is_err());
    }

    #[test]
    fn page_key_must_match_the_listing_it_resumes() {
        let scan_token = PageKey::for_table(&record("alice")).encode();
        let index_token = PageKey::for_user_index(&record("alice")).encode();

        assert!(matches!(
            PageKey::decode_for(&scan_token, Some("alice")),
            Err(MediaError::Validation(_))
        ));
        assert!(matches!(
            PageKey::decode_for(&index_token, None),
            Err(MediaError::Validation(_))
        ));
        assert!(matches!(
            PageKey::decode_for(&index_token, Some("bob")),
            Err(MediaError::Validation(_))
        ));
    }

    #[test]
    fn timestamps_are_fixed_width() {
        let early = parse_timestamp("2024-01-01T00:00:00Z").unwrap();
        let late = parse_timestamp("2024-01-01T00:00:00.5Z").unwrap();
        let (a, b) = (format_timestamp(&early), format_timestamp(&late));
        assert_eq!(a.len(), b.len());
        assert!(a < b);
    }
}
