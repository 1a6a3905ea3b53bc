use axum::{
    body::{Body, Bytes, to_bytes},
    http::{Request, header},
    middleware::Next,
    response::Response,
};
use serde_json::Value;
use tracing::error;

/// Largest error body read back for logging.
const LOGGED_BODY_LIMIT: usize = 1024;

fn api_code(bytes: &Bytes) -> Option<i64> {
    serde_json::from_slice::<Value>(bytes)
        .ok()?
        .get("code")?
        .as_i64()
}

/// Logs every 5xx with the request line and the response body.
pub async fn log_errors(req: Request<Body>, next: Next) -> Response {
    let method = req.method().clone();
    let uri = req.uri().clone();
    let response = next.run(req).await;

    if !response.status().is_server_error() {
        return response;
    }

    let (mut parts, body) = response.into_parts();
    let bytes = match to_bytes(body, LOGGED_BODY_LIMIT).await {
        Ok(b) => b,
        Err(e) => {
            error!("{} {} failed with {}; body unreadable: {}", method, uri, parts.status, e);
            return Response::from_parts(parts, Body::empty());
        }
    };

    error!(
        status = %parts.status,
        code = ?api_code(&bytes),
        "{} {} failed: {}",
        method,
        uri,
        String::from_utf8_lossy(&bytes)
    );

    parts.headers.remove(header::CONTENT_LENGTH);
    Response::from_parts(parts, Body::from(bytes))
}
