use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
};

use crate::{
    AppState,
    error::{BackendError, ErrorKind},
    result::{error_reply, reply, respond},
    services::FileUpload,
};

use super::model::{FolderQuery, ObjectPath, PUBLIC_BUCKETS, PublicUrlResponse, UploadQuery};

const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// The request body is the file; its name and folder come from the query.
#[axum::debug_handler]
pub async fn upload_file(
    State(state): State<AppState>,
    Path(bucket): Path<String>,
    Query(query): Query<UploadQuery>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or(DEFAULT_CONTENT_TYPE)
        .to_string();
    let upload = FileUpload {
        name: query.name,
        content_type,
        bytes: body.to_vec(),
    };
    reply(
        state
            .services
            .storage
            .upload_file(&bucket, &query.folder, upload, None)
            .await,
    )
}

#[axum::debug_handler]
pub async fn list_files(
    State(state): State<AppState>,
    Path(bucket): Path<String>,
    Query(query): Query<FolderQuery>,
) -> impl IntoResponse {
    reply(state.services.storage.list_files(&bucket, &query.folder).await)
}

async fn serve(state: &AppState, object: &ObjectPath) -> Response {
    match state
        .services
        .storage
        .download_file(&object.bucket, &object.path)
        .await
        .into_result()
    {
        Ok(bytes) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, DEFAULT_CONTENT_TYPE)],
            bytes,
        )
            .into_response(),
        Err(e) => error_reply::<()>(&e).into_response(),
    }
}

#[axum::debug_handler]
pub async fn download_file(
    State(state): State<AppState>,
    Path(object): Path<ObjectPath>,
) -> Response {
    serve(&state, &object).await
}

/// Unauthenticated reads, limited to the public buckets.
#[axum::debug_handler]
pub async fn public_file(
    State(state): State<AppState>,
    Path(object): Path<ObjectPath>,
) -> Response {
    if !PUBLIC_BUCKETS.contains(&object.bucket.as_str()) {
        let e = BackendError::new(ErrorKind::NotFound, format!("no public bucket {}", object.bucket));
        return error_reply::<()>(&e).into_response();
    }
    serve(&state, &object).await
}

#[axum::debug_handler]
pub async fn delete_file(
    State(state): State<AppState>,
    Path(object): Path<ObjectPath>,
) -> impl IntoResponse {
    reply(
        state
            .services
            .storage
            .delete_file(&object.bucket, &object.path)
            .await,
    )
}

#[axum::debug_handler]
pub async fn public_url(
    State(state): State<AppState>,
    Path(object): Path<ObjectPath>,
) -> impl IntoResponse {
    let url = state
        .services
        .storage
        .get_public_url(&object.bucket, &object.path);
    respond(Ok(PublicUrlResponse { url }))
}
