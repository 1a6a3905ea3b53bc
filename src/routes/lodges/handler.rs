use axum::{
    extract::{Extension, Json, Path, Query, State},
    response::IntoResponse,
};
use chrono::Utc;
use uuid::Uuid;

use crate::{
    AppState,
    error::{BackendError, ErrorKind},
    middleware::AuthContext,
    models::{LodgeUpdate, MemberRole, MembershipUpdate, NewLodge, NewMembership},
    result::{error_reply, reply, respond},
    services::{LodgeQuery, MemberQuery},
};

use super::super::{require_manager, require_member};
use super::model::{AddMemberRequest, MembershipPath};

/// Fails unless `membership_id` belongs to `lodge_id`.
async fn membership_in_lodge(
    state: &AppState,
    lodge_id: Uuid,
    membership_id: Uuid,
) -> Result<(), BackendError> {
    let memberships = state
        .services
        .lodges
        .list_memberships(lodge_id, true)
        .await
        .into_result()?;
    if memberships.iter().any(|m| m.id == membership_id) {
        Ok(())
    } else {
        Err(BackendError::not_found("membership not found in this lodge"))
    }
}

#[axum::debug_handler]
pub async fn list_lodges(
    State(state): State<AppState>,
    Query(query): Query<LodgeQuery>,
) -> impl IntoResponse {
    reply(state.services.lodges.list_lodges(&query).await)
}

/// The caller founds the lodge and becomes its admin.
#[axum::debug_handler]
pub async fn create_lodge(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(lodge): Json<NewLodge>,
) -> impl IntoResponse {
    reply(
        state
            .services
            .lodges
            .create_lodge_with_founder(&lodge, auth.user_id)
            .await,
    )
}

#[axum::debug_handler]
pub async fn get_lodge(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(lodge_id): Path<Uuid>,
) -> impl IntoResponse {
    if let Err(e) = require_member(&state, auth.user_id, lodge_id).await {
        return error_reply(&e);
    }
    reply(state.services.lodges.get_lodge(lodge_id).await)
}

#[axum::debug_handler]
pub async fn update_lodge(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(lodge_id): Path<Uuid>,
    Json(update): Json<LodgeUpdate>,
) -> impl IntoResponse {
    if let Err(e) = require_manager(&state, auth.user_id, lodge_id).await {
        return error_reply(&e);
    }
    reply(state.services.lodges.update_lodge(lodge_id, &update).await)
}

#[axum::debug_handler]
pub async fn deactivate_lodge(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(lodge_id): Path<Uuid>,
) -> impl IntoResponse {
    match require_member(&state, auth.user_id, lodge_id).await {
        Ok(m) if m.role == MemberRole::Admin => {}
        Ok(_) => {
            return error_reply(&BackendError::new(
                ErrorKind::PermissionDenied,
                "only an admin can close the lodge",
            ));
        }
        Err(e) => return error_reply(&e),
    }
    reply(state.services.lodges.deactivate_lodge(lodge_id).await)
}

#[axum::debug_handler]
pub async fn lodge_counts(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(lodge_id): Path<Uuid>,
) -> impl IntoResponse {
    if let Err(e) = require_member(&state, auth.user_id, lodge_id).await {
        return error_reply(&e);
    }
    let today = Utc::now().date_naive();
    reply(state.services.lodges.get_lodge_counts(lodge_id, today).await)
}

#[axum::debug_handler]
pub async fn list_members(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(lodge_id): Path<Uuid>,
    Query(query): Query<MemberQuery>,
) -> impl IntoResponse {
    if let Err(e) = require_member(&state, auth.user_id, lodge_id).await {
        return error_reply(&e);
    }
    reply(state.services.members.get_lodge_members(lodge_id, &query).await)
}

#[axum::debug_handler]
pub async fn add_member(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(lodge_id): Path<Uuid>,
    Json(req): Json<AddMemberRequest>,
) -> impl IntoResponse {
    if let Err(e) = require_manager(&state, auth.user_id, lodge_id).await {
        return error_reply(&e);
    }
    let mut membership = NewMembership::new(req.user_id, lodge_id, req.role, req.degree);
    membership.office = req.office;
    reply(state.services.lodges.add_membership(&membership).await)
}

#[axum::debug_handler]
pub async fn update_member(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(path): Path<MembershipPath>,
    Json(update): Json<MembershipUpdate>,
) -> impl IntoResponse {
    let checked = async {
        require_manager(&state, auth.user_id, path.lodge_id).await?;
        membership_in_lodge(&state, path.lodge_id, path.membership_id).await
    };
    if let Err(e) = checked.await {
        return error_reply(&e);
    }
    reply(
        state
            .services
            .members
            .update_membership(path.membership_id, &update)
            .await,
    )
}

#[axum::debug_handler]
pub async fn remove_member(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(path): Path<MembershipPath>,
) -> impl IntoResponse {
    respond(
        async {
            require_manager(&state, auth.user_id, path.lodge_id).await?;
            membership_in_lodge(&state, path.lodge_id, path.membership_id).await?;
            state
                .services
                .lodges
                .deactivate_membership(path.membership_id)
                .await
                .into_result()
        }
        .await,
    )
}
