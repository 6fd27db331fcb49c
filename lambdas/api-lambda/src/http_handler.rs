use gallery_atoms::media::{self, ListImagesQuery, MediaError};
use gallery_shared::responses::{finalize_response, method_not_allowed, not_found, preflight};
use gallery_shared::AppState;
use lambda_http::{http::Method, Body, Error, Request, RequestExt, Response};
use std::sync::Arc;

/// Main Lambda handler - routes /images requests to the media handlers
pub(crate) async fn function_handler(
    event: Request,
    state: Arc<AppState>,
) -> Result<Response<Body>, Error> {
    let method = event.method();
    let path = route_path(event.uri().path(), &state.config.base_path);
    let allowed_origin = state.config.allowed_origin.as_str();
    let settings = &state.config.media;
    let stores = &state.stores;
    tracing::info!("🚀 Gallery API invoked - Method: {} Path: {}", method, path);

    // Handle CORS preflight
    if *method == Method::OPTIONS {
        return preflight(allowed_origin);
    }

    let parts: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    let params = event.query_string_parameters_ref();
    let param = |name: &str| params.and_then(|p| p.first(name)).map(str::to_string);

    let resp = match (method, parts.as_slice()) {
        // POST /images - upload
        (&Method::POST, ["images"]) => {
            media::upload_image_handler(stores, settings, event.body().as_ref()).await
        }
        // GET /images - list, optionally by user and tag
        (&Method::GET, ["images"]) => {
            let limit = match param("limit").map(|raw| raw.trim().parse::<usize>()) {
                None => None,
                Some(Ok(limit)) => Some(limit),
                Some(Err(_)) => {
                    let err = MediaError::Validation(format!(
                        "limit must be between 1 and {}",
                        settings.max_page_limit
                    ));
                    return finalize_response(media::error_response(&err, settings), allowed_origin);
                }
            };
            let query = ListImagesQuery {
                user_id: param("user_id"),
                tag: param("tag"),
                limit,
                last_key: param("last_key"),
            };
            media::list_images_handler(stores, settings, query).await
        }
        // GET /images/{id} - view
        (&Method::GET, ["images", image_id]) => {
            let metadata_only = param("metadata_only")
                .map_or(false, |v| v.eq_ignore_ascii_case("true"));
            media::get_image_handler(stores, settings, image_id, metadata_only).await
        }
        // DELETE /images/{id} - delete
        (&Method::DELETE, ["images", image_id]) => {
            media::delete_image_handler(stores, settings, image_id).await
        }
        (_, ["images"]) | (_, ["images", _]) => method_not_allowed(),
        _ => not_found(),
    };

    finalize_response(resp, allowed_origin)
}

/// Drop the stage prefix (e.g. "/prod") the gateway leaves on the path
fn route_path<'a>(path: &'a str, base_path: &str) -> &'a str {
    if base_path.is_empty() {
        return path;
    }
    match path.strip_prefix(base_path) {
        Some(rest) if rest.is_empty() || rest.starts_with('/') => rest,
        _ => path,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::{engine::general_purpose::STANDARD, Engine};
    use gallery_shared::Config;
    use image::{ImageFormat, Rgb, RgbImage};
    use lambda_http::http::StatusCode;
    use serde_json::{json, Value};
    use std::collections::HashMap;
    use std::io::Cursor;

    fn state_with(vars: &[(&str, &str)]) -> Arc<AppState> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let config = Config::from_lookup(|name| vars.get(name).cloned()).unwrap();
        Arc::new(AppState::in_memory(config))
    }

    fn state() -> Arc<AppState> {
        state_with(&[])
    }

    fn png_base64(width: u32, height: u32) -> String {
        let img = RgbImage::from_pixel(width, height, Rgb([200, 40, 40]));
        let mut buf = Cursor::new(Vec::new());
        img.write_to(&mut buf, ImageFormat::Png).unwrap();
        STANDARD.encode(buf.into_inner())
    }

    fn request(method: &str, uri: &str, body: Body) -> Request {
        lambda_http::http::Request::builder()
            .method(method)
            .uri(uri)
            .body(body)
            .unwrap()
    }

    fn with_query(req: Request, params: &[(&str, &str)]) -> Request {
        let params: HashMap<String, String> = params
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        req.with_query_string_parameters(params)
    }

    async fn call(state: &Arc<AppState>, req: Request) -> (StatusCode, Value) {
        let resp = function_handler(req, state.clone()).await.unwrap();
        let status = resp.status();
        let body = match resp.body() {
            Body::Empty => Value::Null,
            other => serde_json::from_slice(other.as_ref()).unwrap(),
        };
        (status, body)
    }

    async fn upload(state: &Arc<AppState>, user_id: &str, tags: &[&str]) -> String {
        let body = json!({
            "user_id": user_id,
            "image_data": png_base64(8, 6),
            "title": "Sunset",
            "tags": tags,
        });
        let (status, body) = call(state, request("POST", "/images", Body::from(body.to_string()))).await;
        assert_eq!(status, StatusCode::CREATED);
        body["image_id"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn upload_view_and_delete_round_trip() {
        let state = state();
        let image_id = upload(&state, "alice", &["beach"]).await;

        let (status, body) = call(&state, request("GET", &format!("/images/{}", image_id), Body::Empty)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["content_type"], "image/jpeg");
        assert_eq!(body["metadata"]["width"], 8);
        assert!(body["metadata"].get("s3_key").is_none());
        let jpeg = STANDARD.decode(body["image_data"].as_str().unwrap()).unwrap();
        assert_eq!(image::guess_format(&jpeg).unwrap(), ImageFormat::Jpeg);

        let (status, body) = call(
            &state,
            request("DELETE", &format!("/images/{}", image_id), Body::Empty),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Image deleted successfully");

        let (status, body) = call(&state, request("GET", &format!("/images/{}", image_id), Body::Empty)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "Image not found");
    }

    #[tokio::test]
    async fn metadata_only_view_skips_the_binary() {
        let state = state();
        let image_id = upload(&state, "alice", &[]).await;

        let req = with_query(
            request("GET", &format!("/images/{}", image_id), Body::Empty),
            &[("metadata_only", "TRUE")],
        );
        let (status, body) = call(&state, req).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["image_id"], image_id.as_str());
        assert_eq!(body["title"], "Sunset");
        assert!(body.get("image_data").is_none());
    }

    #[tokio::test]
    async fn list_filters_and_pages() {
        let state = state();
        upload(&state, "alice", &["beach"]).await;
        upload(&state, "alice", &["city"]).await;
        upload(&state, "alice", &["beach"]).await;
        upload(&state, "bob", &["beach"]).await;

        let req = with_query(
            request("GET", "/images", Body::Empty),
            &[("user_id", "alice"), ("tag", "beach"), ("limit", "1")],
        );
        let (status, first) = call(&state, req).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(first["count"], 1);
        assert_eq!(first["has_more"], true);
        let token = first["next_key"].as_str().unwrap().to_string();

        let req = with_query(
            request("GET", "/images", Body::Empty),
            &[("user_id", "alice"), ("tag", "beach"), ("limit", "1"), ("last_key", &token)],
        );
        let (_, second) = call(&state, req).await;
        assert_eq!(second["count"], 1);
        assert_eq!(second["has_more"], false);
        assert!(second["next_key"].is_null());
        assert_ne!(first["images"][0]["image_id"], second["images"][0]["image_id"]);
    }

    #[tokio::test]
    async fn bad_inputs_are_client_errors() {
        let state = state();

        let (status, body) = call(&state, request("POST", "/images", Body::from("{not json"))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Invalid JSON format");

        let req = with_query(request("GET", "/images", Body::Empty), &[("limit", "abc")]);
        let (status, _) = call(&state, req).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let req = with_query(request("GET", "/images", Body::Empty), &[("last_key", "%%%")]);
        let (status, body) = call(&state, req).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Invalid last_key");

        let body = json!({ "user_id": "alice", "image_data": STANDARD.encode(b"plain text") });
        let (status, _) = call(&state, request("POST", "/images", Body::from(body.to_string()))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn oversized_request_is_rejected() {
        let state = state_with(&[("MAX_IMAGE_BYTES", "16")]);
        let body = json!({ "user_id": "alice", "image_data": "A".repeat(64) });
        let (status, body) = call(&state, request("POST", "/images", Body::from(body.to_string()))).await;
        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(body["error"], "Request too large");
    }

    #[tokio::test]
    async fn routing_and_cors() {
        let state = state_with(&[("API_BASE_PATH", "/prod"), ("ALLOWED_ORIGIN", "https://app.example.com")]);

        let resp = function_handler(request("OPTIONS", "/prod/images", Body::Empty), state.clone())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers()["Access-Control-Allow-Origin"], "https://app.example.com");

        let resp = function_handler(request("GET", "/prod/images", Body::Empty), state.clone())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers()["X-Content-Type-Options"], "nosniff");

        let (status, body) = call(&state, request("PUT", "/prod/images/abc", Body::Empty)).await;
        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(body["error"], "Method not allowed");

        let (status, body) = call(&state, request("GET", "/prod/albums", Body::Empty)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "Not found");
    }

    #[tokio::test]
    async fn overlong_image_id_is_not_found() {
        let state = state();
        let uri = format!("/images/{}", "x".repeat(3000));

        let (status, body) = call(&state, request("GET", &uri, Body::Empty)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "Image not found");

        let (status, _) = call(&state, request("DELETE", &uri, Body::Empty)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[test]
    fn base_path_is_only_stripped_on_a_segment_boundary() {
        assert_eq!(route_path("/prod/images", "/prod"), "/images");
        assert_eq!(route_path("/production/images", "/prod"), "/production/images");
        assert_eq!(route_path("/images", ""), "/images");
    }
}
