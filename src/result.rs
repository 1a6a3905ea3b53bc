use axum::Json;
use axum::http::StatusCode;
use serde::{Deserialize, Serialize};

use crate::error::{BackendError, ErrorKind};
use crate::services::ServiceResult;

/// Body of every API response.
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    /// 0 on success.
    pub code: i32,
    pub msg: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resp_data: Option<T>,
}

pub mod error_codes {
    pub const SUCCESS: i32 = 0;
    pub const VALIDATION_ERROR: i32 = 1000;
    pub const USER_EXISTS: i32 = 1001;
    pub const AUTH_FAILED: i32 = 1002;
    pub const PERMISSION_DENIED: i32 = 1003;
    pub const NOT_FOUND: i32 = 1004;
    pub const RATE_LIMIT: i32 = 1005;
    pub const CONFLICT: i32 = 1006;
    pub const EMAIL_NOT_CONFIRMED: i32 = 1007;
    pub const UPSTREAM_ERROR: i32 = 5002;
    pub const INTERNAL_ERROR: i32 = 5000;
}

pub fn success_to_api_response<T: Serialize>(data: T) -> Json<ApiResponse<T>> {
    Json(ApiResponse {
        code: error_codes::SUCCESS,
        msg: "success".into(),
        resp_data: Some(data),
    })
}

pub fn error_to_api_response<T>(code: i32, msg: String) -> Json<ApiResponse<T>> {
    Json(ApiResponse {
        code,
        msg,
        resp_data: None,
    })
}

pub fn error_code(kind: ErrorKind) -> i32 {
    match kind {
        ErrorKind::Validation | ErrorKind::WeakPassword | ErrorKind::Constraint => {
            error_codes::VALIDATION_ERROR
        }
        ErrorKind::UserAlreadyRegistered => error_codes::USER_EXISTS,
        ErrorKind::InvalidCredentials | ErrorKind::Unauthenticated => error_codes::AUTH_FAILED,
        ErrorKind::EmailNotConfirmed => error_codes::EMAIL_NOT_CONFIRMED,
        ErrorKind::PermissionDenied => error_codes::PERMISSION_DENIED,
        ErrorKind::NotFound => error_codes::NOT_FOUND,
        ErrorKind::Conflict => error_codes::CONFLICT,
        ErrorKind::RateLimited => error_codes::RATE_LIMIT,
        ErrorKind::Network => error_codes::UPSTREAM_ERROR,
        ErrorKind::Internal => error_codes::INTERNAL_ERROR,
    }
}

pub fn status_code(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Validation | ErrorKind::WeakPassword | ErrorKind::Constraint => {
            StatusCode::BAD_REQUEST
        }
        ErrorKind::InvalidCredentials | ErrorKind::Unauthenticated => StatusCode::UNAUTHORIZED,
        ErrorKind::EmailNotConfirmed | ErrorKind::PermissionDenied => StatusCode::FORBIDDEN,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Conflict | ErrorKind::UserAlreadyRegistered => StatusCode::CONFLICT,
        ErrorKind::RateLimited => StatusCode::TOO_MANY_REQUESTS,
        ErrorKind::Network => StatusCode::BAD_GATEWAY,
        ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

pub type ApiReply<T> = (StatusCode, Json<ApiResponse<T>>);

pub fn error_reply<T>(error: &BackendError) -> ApiReply<T> {
    (
        status_code(error.kind),
        error_to_api_response(error_code(error.kind), error.message.clone()),
    )
}

pub fn respond<T: Serialize>(result: Result<T, BackendError>) -> ApiReply<T> {
    match result {
        Ok(data) => (StatusCode::OK, success_to_api_response(data)),
        Err(e) => error_reply(&e),
    }
}

/// Turns a service envelope into the HTTP reply.
pub fn reply<T: Serialize>(result: ServiceResult<T>) -> ApiReply<T> {
    respond(result.into_result())
}
