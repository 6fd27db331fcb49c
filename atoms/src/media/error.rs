use lambda_http::http::StatusCode;
use thiserror::Error;

/// Failures talking to object storage or the metadata table
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("DynamoDB error: {0}")]
    Dynamo(String),

    #[error("S3 error: {0}")]
    S3(String),

    #[error("Corrupt record {image_id}: {reason}")]
    Corrupt { image_id: String, reason: String },
}

/// Everything an image operation can fail with
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("{0}")]
    Validation(String),

    #[error("Invalid image data: {0}")]
    InvalidImage(String),

    #[error("Request too large")]
    PayloadTooLarge,

    #[error("Image not found")]
    NotFound,

    #[error("Image file not found")]
    ObjectMissing,

    #[error(transparent)]
    Storage(#[from] StoreError),
}

impl MediaError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            MediaError::Validation(_) | MediaError::InvalidImage(_) => StatusCode::BAD_REQUEST,
            MediaError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            MediaError::NotFound | MediaError::ObjectMissing => StatusCode::NOT_FOUND,
            MediaError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to send to the caller. Backend detail only leaves the
    /// process when `expose_details` is set.
    pub fn client_message(&self, expose_details: bool) -> String {
        match self {
            MediaError::Storage(e) if expose_details => format!("Internal server error: {}", e),
            MediaError::Storage(_) => "Internal server error".to_string(),
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_errors_hide_details_by_default() {
        let err = MediaError::from(StoreError::Dynamo("table image-metadata missing".into()));
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.client_message(false), "Internal server error");
        assert!(err.client_message(true).contains("image-metadata"));
    }

    #[test]
    fn client_errors_keep_their_message() {
        let err = MediaError::InvalidImage("unsupported format".into());
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(err.client_message(false), "Invalid image data: unsupported format");
        assert_eq!(MediaError::NotFound.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(MediaError::PayloadTooLarge.status_code(), StatusCode::PAYLOAD_TOO_LARGE);
    }
}
