use axum::{
    extract::{Extension, Json, State},
    response::IntoResponse,
};

use crate::{
    AppState,
    error::{BackendError, ErrorKind},
    middleware::AuthContext,
    models::{ProfileUpdate, ProfileView},
    result::{reply, respond},
};

/// The caller's profile view; a first visit creates the profile row.
async fn load_view(state: &AppState, auth: &AuthContext) -> Result<ProfileView, BackendError> {
    let members = &state.services.members;
    match members.get_profile_view(auth.user_id).await.into_result() {
        Err(e) if e.kind == ErrorKind::NotFound => {
            let user = state
                .services
                .auth
                .get_user(&auth.access_token)
                .await
                .into_result()?;
            members.ensure_profile(&user).await.into_result()?;
            members.get_profile_view(auth.user_id).await.into_result()
        }
        other => other,
    }
}

#[axum::debug_handler]
pub async fn get_profile(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> impl IntoResponse {
    respond(load_view(&state, &auth).await)
}

#[axum::debug_handler]
pub async fn update_profile(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(update): Json<ProfileUpdate>,
) -> impl IntoResponse {
    reply(
        state
            .services
            .members
            .update_profile(auth.user_id, &update)
            .await,
    )
}

#[axum::debug_handler]
pub async fn my_lodges(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> impl IntoResponse {
    reply(state.services.members.get_user_lodges(auth.user_id).await)
}
