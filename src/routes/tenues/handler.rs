use axum::{
    extract::{Extension, Json, Path, Query, State},
    response::IntoResponse,
};
use chrono::Utc;
use uuid::Uuid;

use crate::{
    AppState,
    error::BackendError,
    middleware::AuthContext,
    models::{LodgeMembership, NewTenue, Tenue, TenueUpdate},
    result::{error_reply, reply, respond},
    services::TenueQuery,
};

use super::super::{cap_degree, require_degree, require_manager, require_member};
use super::model::{AttendanceRequest, UpcomingQuery};

/// The tenue, provided the caller may see it.
async fn visible_tenue(
    state: &AppState,
    user_id: Uuid,
    tenue_id: Uuid,
) -> Result<(Tenue, LodgeMembership), BackendError> {
    let tenue = state.services.tenues.get_tenue(tenue_id).await.into_result()?;
    let membership = require_member(state, user_id, tenue.lodge_id).await?;
    require_degree(&membership, Some(tenue.degree))?;
    Ok((tenue, membership))
}

async fn managed_tenue(state: &AppState, user_id: Uuid, tenue_id: Uuid) -> Result<Tenue, BackendError> {
    let tenue = state.services.tenues.get_tenue(tenue_id).await.into_result()?;
    require_manager(state, user_id, tenue.lodge_id).await?;
    Ok(tenue)
}

#[axum::debug_handler]
pub async fn list_tenues(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(lodge_id): Path<Uuid>,
    Query(mut query): Query<TenueQuery>,
) -> impl IntoResponse {
    let membership = match require_member(&state, auth.user_id, lodge_id).await {
        Ok(m) => m,
        Err(e) => return error_reply(&e),
    };
    query.max_degree = cap_degree(&membership, query.max_degree);
    reply(state.services.tenues.list_tenues(lodge_id, &query).await)
}

#[axum::debug_handler]
pub async fn upcoming_tenues(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(lodge_id): Path<Uuid>,
    Query(query): Query<UpcomingQuery>,
) -> impl IntoResponse {
    let membership = match require_member(&state, auth.user_id, lodge_id).await {
        Ok(m) => m,
        Err(e) => return error_reply(&e),
    };
    let today = Utc::now().date_naive();
    reply(
        state
            .services
            .tenues
            .get_upcoming_tenues(lodge_id, today, query.limit)
            .await
            .map(|tenues| {
                tenues
                    .into_iter()
                    .filter(|t| t.degree <= membership.degree)
                    .collect::<Vec<_>>()
            }),
    )
}

#[axum::debug_handler]
pub async fn create_tenue(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(lodge_id): Path<Uuid>,
    Json(mut tenue): Json<NewTenue>,
) -> impl IntoResponse {
    if let Err(e) = require_manager(&state, auth.user_id, lodge_id).await {
        return error_reply(&e);
    }
    tenue.lodge_id = lodge_id;
    tenue.created_by = Some(auth.user_id);
    reply(state.services.tenues.create_tenue(&tenue).await)
}

#[axum::debug_handler]
pub async fn get_tenue(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(tenue_id): Path<Uuid>,
) -> impl IntoResponse {
    respond(
        visible_tenue(&state, auth.user_id, tenue_id)
            .await
            .map(|(tenue, _)| tenue),
    )
}

#[axum::debug_handler]
pub async fn update_tenue(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(tenue_id): Path<Uuid>,
    Json(update): Json<TenueUpdate>,
) -> impl IntoResponse {
    if let Err(e) = managed_tenue(&state, auth.user_id, tenue_id).await {
        return error_reply(&e);
    }
    reply(state.services.tenues.update_tenue(tenue_id, &update).await)
}

#[axum::debug_handler]
pub async fn cancel_tenue(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(tenue_id): Path<Uuid>,
) -> impl IntoResponse {
    if let Err(e) = managed_tenue(&state, auth.user_id, tenue_id).await {
        return error_reply(&e);
    }
    reply(state.services.tenues.cancel_tenue(tenue_id).await)
}

#[axum::debug_handler]
pub async fn delete_tenue(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(tenue_id): Path<Uuid>,
) -> impl IntoResponse {
    if let Err(e) = managed_tenue(&state, auth.user_id, tenue_id).await {
        return error_reply(&e);
    }
    reply(state.services.tenues.delete_tenue(tenue_id).await)
}

#[axum::debug_handler]
pub async fn tenue_attendance(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(tenue_id): Path<Uuid>,
) -> impl IntoResponse {
    if let Err(e) = visible_tenue(&state, auth.user_id, tenue_id).await {
        return error_reply(&e);
    }
    reply(state.services.tenues.get_attendance(tenue_id).await)
}

#[axum::debug_handler]
pub async fn my_attendance(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(tenue_id): Path<Uuid>,
) -> impl IntoResponse {
    reply(
        state
            .services
            .tenues
            .get_user_attendance(tenue_id, auth.user_id)
            .await,
    )
}

/// Records the caller's own attendance.
#[axum::debug_handler]
pub async fn set_attendance(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(tenue_id): Path<Uuid>,
    Json(req): Json<AttendanceRequest>,
) -> impl IntoResponse {
    if let Err(e) = visible_tenue(&state, auth.user_id, tenue_id).await {
        return error_reply(&e);
    }
    reply(
        state
            .services
            .tenues
            .set_attendance(tenue_id, auth.user_id, req.status, req.excuse.as_deref())
            .await,
    )
}
