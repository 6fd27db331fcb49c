// Re-export model types and service functions
pub mod codec;
pub mod dynamo;
pub mod error;
pub mod http;
pub mod memory;
pub mod model;
pub mod s3;
pub mod service;
pub mod settings;
pub mod store;
pub mod sweep;

pub use error::{MediaError, StoreError};
pub use model::{ImagePage, ImageRecord, ImageSummary, ListImagesQuery, UploadImagePayload};
pub use settings::{MediaSettings, UploadLimits};
pub use store::{ImageStores, MetadataStore, ObjectStore};
pub use service::*;
pub use http::*;
