use lambda_http::{
    http::header::{HeaderValue, VARY},
    http::StatusCode,
    Body, Error, Response,
};

pub fn with_cors_headers(mut resp: Response<Body>, allowed_origin: &str) -> Response<Body> {
    let headers = resp.headers_mut();
    headers.insert(
        "Access-Control-Allow-Origin",
        HeaderValue::from_str(allowed_origin).unwrap_or_else(|_| HeaderValue::from_static("*")),
    );
    headers.insert(
        "Access-Control-Allow-Methods",
        HeaderValue::from_static("GET,POST,DELETE,OPTIONS"),
    );
    headers.insert(
        "Access-Control-Allow-Headers",
        HeaderValue::from_static("Content-Type,Authorization,X-Amz-Date,X-Api-Key"),
    );
    headers.insert("X-Content-Type-Options", HeaderValue::from_static("nosniff"));
    headers.append(VARY, HeaderValue::from_static("Origin"));

    resp
}

pub fn finalize_response(
    resp: Result<Response<Body>, Error>,
    allowed_origin: &str,
) -> Result<Response<Body>, Error> {
    resp.map(|r| with_cors_headers(r, allowed_origin))
}

pub fn preflight(allowed_origin: &str) -> Result<Response<Body>, Error> {
    let resp = Response::builder()
        .status(StatusCode::OK)
        .body(Body::Empty)
        .map_err(Box::new)?;
    Ok(with_cors_headers(resp, allowed_origin))
}

fn error_json(status: StatusCode, message: &str) -> Result<Response<Body>, Error> {
    Ok(Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .body(serde_json::json!({ "error": message }).to_string().into())
        .map_err(Box::new)?)
}

pub fn not_found() -> Result<Response<Body>, Error> {
    error_json(StatusCode::NOT_FOUND, "Not found")
}

pub fn method_not_allowed() -> Result<Response<Body>, Error> {
    error_json(StatusCode::METHOD_NOT_ALLOWED, "Method not allowed")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cors_headers_use_configured_origin() {
        let resp = finalize_response(not_found(), "https://gallery.example.com").unwrap();
        let headers = resp.headers();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            headers["Access-Control-Allow-Origin"],
            "https://gallery.example.com"
        );
        assert_eq!(headers["X-Content-Type-Options"], "nosniff");
        assert_eq!(headers[VARY], "Origin");
    }

    #[test]
    fn unusable_origin_falls_back_to_wildcard() {
        let resp = preflight("bad\norigin").unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers()["Access-Control-Allow-Origin"], "*");
    }
}
