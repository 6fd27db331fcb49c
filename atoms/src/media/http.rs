use lambda_http::{http::StatusCode, Body, Error as LambdaError, Response};
use serde::Serialize;

use super::error::MediaError;
use super::model::{DeleteImageResponse, ListImagesQuery, UploadImagePayload, UploadImageResponse};
use super::service::{delete_image, get_image, get_image_with_data, list_images, upload_image};
use super::settings::MediaSettings;
use super::store::ImageStores;

fn json_response<T: Serialize>(status: StatusCode, value: &T) -> Result<Response<Body>, LambdaError> {
    Ok(Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .body(serde_json::to_string(value)?.into())
        .map_err(Box::new)?)
}

/// Map a failed operation to its status code and a client-safe message
pub fn error_response(
    err: &MediaError,
    settings: &MediaSettings,
) -> Result<Response<Body>, LambdaError> {
    let status = err.status_code();
    if status.is_server_error() {
        tracing::error!("❌ Image operation failed: {}", err);
    } else {
        tracing::info!("Rejected image request ({}): {}", status.as_u16(), err);
    }
    json_response(
        status,
        &serde_json::json!({ "error": err.client_message(settings.expose_error_details) }),
    )
}

/// HTTP Handler: POST /images
pub async fn upload_image_handler(
    stores: &ImageStores,
    settings: &MediaSettings,
    body: &[u8],
) -> Result<Response<Body>, LambdaError> {
    // Base64 inflates by a third; twice the decoded limit is plenty
    if body.len() > settings.limits.max_image_bytes.saturating_mul(2) {
        return error_response(&MediaError::PayloadTooLarge, settings);
    }

    let payload: UploadImagePayload = match serde_json::from_slice(body) {
        Ok(payload) => payload,
        Err(e) => {
            tracing::info!("Upload body is not valid JSON: {}", e);
            let err = MediaError::Validation("Invalid JSON format".to_string());
            return error_response(&err, settings);
        }
    };

    match upload_image(stores, &settings.limits, payload).await {
        Ok(record) => {
            tracing::info!(
                "✅ Uploaded image_id={} user_id={} {}x{} {} bytes",
                record.image_id,
                record.user_id,
                record.width,
                record.height,
                record.file_size,
            );
            json_response(
                StatusCode::CREATED,
                &UploadImageResponse {
                    message: "Image uploaded successfully".to_string(),
                    image_id: record.image_id.clone(),
                    metadata: record,
                },
            )
        }
        Err(e) => error_response(&e, settings),
    }
}

/// HTTP Handler: GET /images
pub async fn list_images_handler(
    stores: &ImageStores,
    settings: &MediaSettings,
    query: ListImagesQuery,
) -> Result<Response<Body>, LambdaError> {
    match list_images(stores, settings, query).await {
        Ok(page) => json_response(StatusCode::OK, &page),
        Err(e) => error_response(&e, settings),
    }
}

/// HTTP Handler: GET /images/{id}
pub async fn get_image_handler(
    stores: &ImageStores,
    settings: &MediaSettings,
    image_id: &str,
    metadata_only: bool,
) -> Result<Response<Body>, LambdaError> {
    if metadata_only {
        return match get_image(stores, image_id).await {
            Ok(record) => json_response(StatusCode::OK, &record.summary()),
            Err(e) => error_response(&e, settings),
        };
    }

    match get_image_with_data(stores, image_id).await {
        Ok(image) => json_response(StatusCode::OK, &image),
        Err(e) => error_response(&e, settings),
    }
}

/// HTTP Handler: DELETE /images/{id}
pub async fn delete_image_handler(
    stores: &ImageStores,
    settings: &MediaSettings,
    image_id: &str,
) -> Result<Response<Body>, LambdaError> {
    match delete_image(stores, image_id).await {
        Ok(record) => {
            tracing::info!("🗑️ Deleted image_id={} key={}", record.image_id, record.s3_key);
            json_response(
                StatusCode::OK,
                &DeleteImageResponse {
                    message: "Image deleted successfully".to_string(),
                    image_id: record.image_id,
                },
            )
        }
        Err(e) => error_response(&e, settings),
    }
}
