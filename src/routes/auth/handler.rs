use axum::{
    extract::{Extension, Json, Path, State},
    response::IntoResponse,
};
use serde_json::Value;

use crate::{AppState, middleware::AuthContext, result::reply};

use super::model::{
    ForgotPasswordRequest, OAuthResponse, RefreshRequest, SignInRequest, SignUpRequest,
    UpdatePasswordRequest, VerifyRecoveryRequest,
};

#[axum::debug_handler]
pub async fn sign_up(
    State(state): State<AppState>,
    Json(req): Json<SignUpRequest>,
) -> impl IntoResponse {
    reply(
        state
            .services
            .auth
            .sign_up(&req.email, &req.password, req.display_name.as_deref())
            .await,
    )
}

#[axum::debug_handler]
pub async fn sign_in(
    State(state): State<AppState>,
    Json(req): Json<SignInRequest>,
) -> impl IntoResponse {
    reply(state.services.auth.sign_in(&req.email, &req.password).await)
}

#[axum::debug_handler]
pub async fn oauth_url(
    State(state): State<AppState>,
    Path(provider): Path<String>,
) -> impl IntoResponse {
    reply(
        state
            .services
            .auth
            .sign_in_with_oauth(&provider)
            .await
            .map(|url| OAuthResponse { url }),
    )
}

#[axum::debug_handler]
pub async fn forgot_password(
    State(state): State<AppState>,
    Json(req): Json<ForgotPasswordRequest>,
) -> impl IntoResponse {
    reply(state.services.auth.forgot_password(&req.email).await)
}

#[axum::debug_handler]
pub async fn verify_recovery(
    State(state): State<AppState>,
    Json(req): Json<VerifyRecoveryRequest>,
) -> impl IntoResponse {
    reply(state.services.auth.verify_recovery(&req.email, &req.token).await)
}

#[axum::debug_handler]
pub async fn refresh(
    State(state): State<AppState>,
    Json(req): Json<RefreshRequest>,
) -> impl IntoResponse {
    reply(state.services.auth.refresh_session(&req.refresh_token).await)
}

#[axum::debug_handler]
pub async fn sign_out(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> impl IntoResponse {
    reply(state.services.auth.sign_out(&auth.access_token).await)
}

#[axum::debug_handler]
pub async fn current_user(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> impl IntoResponse {
    reply(state.services.auth.get_user(&auth.access_token).await)
}

#[axum::debug_handler]
pub async fn update_password(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(req): Json<UpdatePasswordRequest>,
) -> impl IntoResponse {
    reply(
        state
            .services
            .auth
            .update_password(&auth.access_token, &req.password)
            .await,
    )
}

/// Merges the body into the user's metadata.
#[axum::debug_handler]
pub async fn update_user_data(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(data): Json<Value>,
) -> impl IntoResponse {
    reply(
        state
            .services
            .auth
            .update_user_data(&auth.access_token, data)
            .await,
    )
}
