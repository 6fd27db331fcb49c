use chrono::Duration;
use gallery_atoms::media::sweep::SweepOptions;
use gallery_atoms::media::{MediaSettings, UploadLimits};
use std::env;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("{name} has invalid value {value:?}: {reason}")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },
}

/// Where images and records are kept
#[derive(Debug, Clone, PartialEq)]
pub enum StorageBackend {
    Aws,
    /// In-process stores, for local runs without AWS
    Memory,
}

/// Everything read from the environment at cold start
#[derive(Debug, Clone)]
pub struct Config {
    pub bucket_name: String,
    pub table_name: String,
    pub user_index_name: String,
    /// LocalStack and friends
    pub endpoint_url: Option<String>,
    pub storage_backend: StorageBackend,
    /// Stage prefix stripped before routing, e.g. "/prod"
    pub base_path: String,
    pub allowed_origin: String,
    pub media: MediaSettings,
    pub sweep: SweepOptions,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str, default: &str| {
            lookup(name)
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| default.to_string())
        };

        let storage_backend = match get("STORAGE_BACKEND", "aws").to_ascii_lowercase().as_str() {
            "aws" => StorageBackend::Aws,
            "memory" => StorageBackend::Memory,
            other => {
                return Err(ConfigError::Invalid {
                    name: "STORAGE_BACKEND",
                    value: other.to_string(),
                    reason: "expected \"aws\" or \"memory\"".to_string(),
                })
            }
        };

        let defaults = MediaSettings::default();
        let limits = UploadLimits {
            max_image_bytes: parse(&lookup, "MAX_IMAGE_BYTES", defaults.limits.max_image_bytes)?,
            max_dimension: parse(&lookup, "MAX_IMAGE_DIMENSION", defaults.limits.max_dimension)?,
            ..defaults.limits
        };
        let media = MediaSettings {
            limits,
            default_page_limit: parse(&lookup, "DEFAULT_PAGE_LIMIT", defaults.default_page_limit)?,
            max_page_limit: parse(&lookup, "MAX_PAGE_LIMIT", defaults.max_page_limit)?,
            expose_error_details: parse(&lookup, "EXPOSE_ERROR_DETAILS", false)?,
        };
        if media.default_page_limit == 0 || media.default_page_limit > media.max_page_limit {
            return Err(ConfigError::Invalid {
                name: "DEFAULT_PAGE_LIMIT",
                value: media.default_page_limit.to_string(),
                reason: format!("must be between 1 and MAX_PAGE_LIMIT ({})", media.max_page_limit),
            });
        }

        let grace_secs: i64 = parse(&lookup, "SWEEP_GRACE_SECS", 3600)?;
        let sweep = SweepOptions {
            grace: Duration::seconds(grace_secs.max(0)),
            dry_run: parse(&lookup, "SWEEP_DRY_RUN", false)?,
        };

        let base_path = get("API_BASE_PATH", "").trim_end_matches('/').to_string();

        Ok(Config {
            bucket_name: get("BUCKET_NAME", "image-storage-bucket"),
            table_name: get("TABLE_NAME", "image-metadata"),
            user_index_name: get("USER_INDEX_NAME", "user-id-index"),
            endpoint_url: lookup("AWS_ENDPOINT_URL").filter(|v| !v.trim().is_empty()),
            storage_backend,
            base_path,
            allowed_origin: get("ALLOWED_ORIGIN", "*"),
            media,
            sweep,
        })
    }
}

fn parse<F, T>(lookup: &F, name: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty()) {
        None => Ok(default),
        Some(raw) => raw
            .to_ascii_lowercase()
            .parse()
            .map_err(|e: T::Err| ConfigError::Invalid {
                name,
                value: raw,
                reason: e.to_string(),
            }),
    }
}
