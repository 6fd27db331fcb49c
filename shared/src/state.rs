use aws_config::BehaviorVersion;
use aws_sdk_dynamodb::Client as DynamoClient;
use aws_sdk_s3::Client as S3Client;
use gallery_atoms::media::dynamo::DynamoMetadataStore;
use gallery_atoms::media::memory::{MemoryMetadataStore, MemoryObjectStore};
use gallery_atoms::media::s3::S3ObjectStore;
use gallery_atoms::media::ImageStores;
use std::sync::Arc;

use crate::config::{Config, StorageBackend};

/// Shared across invocations of a warm Lambda
pub struct AppState {
    pub stores: ImageStores,
    pub config: Config,
}

impl AppState {
    pub async fn from_config(config: Config) -> Self {
        match config.storage_backend {
            StorageBackend::Aws => Self {
                stores: aws_stores(&config).await,
                config,
            },
            StorageBackend::Memory => {
                tracing::warn!("Using in-memory stores; nothing outlives this process");
                Self::in_memory(config)
            }
        }
    }

    /// Memory-backed state for tests and local runs
    pub fn in_memory(config: Config) -> Self {
        Self {
            stores: ImageStores::new(
                Arc::new(MemoryObjectStore::new()),
                Arc::new(MemoryMetadataStore::new()),
            ),
            config,
        }
    }
}

async fn aws_stores(config: &Config) -> ImageStores {
    let mut loader = aws_config::defaults(BehaviorVersion::latest());
    if let Some(endpoint) = &config.endpoint_url {
        tracing::info!("Using custom AWS endpoint {}", endpoint);
        loader = loader.endpoint_url(endpoint);
    }
    let sdk_config = loader.load().await;

    // Local emulators don't do virtual-hosted buckets
    let s3_config = aws_sdk_s3::config::Builder::from(&sdk_config)
        .force_path_style(config.endpoint_url.is_some())
        .build();

    tracing::info!(
        "Stores: bucket={} table={} index={}",
        config.bucket_name,
        config.table_name,
        config.user_index_name
    );

    ImageStores::new(
        Arc::new(S3ObjectStore::new(
            S3Client::from_conf(s3_config),
            &config.bucket_name,
        )),
        Arc::new(DynamoMetadataStore::new(
            DynamoClient::new(&sdk_config),
            &config.table_name,
            &config.user_index_name,
        )),
    )
}
