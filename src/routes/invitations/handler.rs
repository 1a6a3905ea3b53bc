use axum::{
    extract::{Extension, Json, Path, Query, State},
    response::IntoResponse,
};
use chrono::Duration;
use uuid::Uuid;

use crate::{
    AppState,
    error::BackendError,
    middleware::AuthContext,
    models::NewInvitation,
    result::{error_reply, reply, respond},
};

use super::super::require_manager;
use super::model::{CreateInvitationRequest, DEFAULT_VALID_DAYS, InvitationPath, PendingQuery};

#[axum::debug_handler]
pub async fn list_invitations(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(lodge_id): Path<Uuid>,
    Query(query): Query<PendingQuery>,
) -> impl IntoResponse {
    if let Err(e) = require_manager(&state, auth.user_id, lodge_id).await {
        return error_reply(&e);
    }
    reply(
        state
            .services
            .invitations
            .list_invitations(lodge_id, query.pending)
            .await,
    )
}

#[axum::debug_handler]
pub async fn create_invitation(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(lodge_id): Path<Uuid>,
    Json(req): Json<CreateInvitationRequest>,
) -> impl IntoResponse {
    if let Err(e) = require_manager(&state, auth.user_id, lodge_id).await {
        return error_reply(&e);
    }
    let invitation = NewInvitation {
        lodge_id,
        email: req.email,
        role: req.role,
        degree: req.degree,
        invited_by: Some(auth.user_id),
    };
    let valid_for = Duration::days(req.valid_days.unwrap_or(DEFAULT_VALID_DAYS));
    reply(
        state
            .services
            .invitations
            .create_invitation(&invitation, valid_for)
            .await,
    )
}

#[axum::debug_handler]
pub async fn revoke_invitation(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(path): Path<InvitationPath>,
) -> impl IntoResponse {
    respond(
        async {
            require_manager(&state, auth.user_id, path.lodge_id).await?;
            let invitations = state
                .services
                .invitations
                .list_invitations(path.lodge_id, false)
                .await
                .into_result()?;
            if !invitations.iter().any(|i| i.id == path.invitation_id) {
                return Err(BackendError::not_found("invitation not found in this lodge"));
            }
            state
                .services
                .invitations
                .revoke(path.invitation_id)
                .await
                .into_result()
        }
        .await,
    )
}

/// Whether a code can still be redeemed, and for which lodge.
#[axum::debug_handler]
pub async fn check_invitation(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> impl IntoResponse {
    reply(state.services.invitations.check_code(&code).await)
}

#[axum::debug_handler]
pub async fn redeem_invitation(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(code): Path<String>,
) -> impl IntoResponse {
    reply(state.services.invitations.redeem(&code, auth.user_id).await)
}
