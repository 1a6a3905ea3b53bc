use axum::{
    extract::{Extension, Json, Path, Query, State},
    response::IntoResponse,
};
use uuid::Uuid;

use crate::{
    AppState,
    error::{BackendError, ErrorKind},
    middleware::AuthContext,
    models::{LibraryEntry, LibraryEntryUpdate, LibraryKind, LodgeMembership, NewLibraryEntry},
    result::{error_reply, reply, respond},
    services::LibraryQuery,
};

use super::super::{cap_degree, require_degree, require_member};

/// Any member may publish a planche; documents and news are for officers.
fn may_publish(kind: LibraryKind, membership: &LodgeMembership) -> Result<(), BackendError> {
    if kind == LibraryKind::Planche || membership.role.can_manage() {
        return Ok(());
    }
    Err(BackendError::new(
        ErrorKind::PermissionDenied,
        format!("only officers publish {}", kind.table()),
    ))
}

async fn visible_entry(
    state: &AppState,
    user_id: Uuid,
    kind: LibraryKind,
    id: Uuid,
) -> Result<(LibraryEntry, LodgeMembership), BackendError> {
    let entry = state.services.library.get(kind, id).await.into_result()?;
    let membership = require_member(state, user_id, entry.lodge_id).await?;
    require_degree(&membership, entry.degree)?;
    Ok((entry, membership))
}

/// Authors edit their own entries; officers edit any.
async fn editable_entry(
    state: &AppState,
    user_id: Uuid,
    kind: LibraryKind,
    id: Uuid,
) -> Result<LibraryEntry, BackendError> {
    let (entry, membership) = visible_entry(state, user_id, kind, id).await?;
    if entry.author_id == Some(user_id) || membership.role.can_manage() {
        Ok(entry)
    } else {
        Err(BackendError::new(
            ErrorKind::PermissionDenied,
            "only the author or an officer may change this entry",
        ))
    }
}

#[axum::debug_handler]
pub async fn list_entries(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path((lodge_id, kind)): Path<(Uuid, LibraryKind)>,
    Query(mut query): Query<LibraryQuery>,
) -> impl IntoResponse {
    let membership = match require_member(&state, auth.user_id, lodge_id).await {
        Ok(m) => m,
        Err(e) => return error_reply(&e),
    };
    query.max_degree = cap_degree(&membership, query.max_degree);
    reply(state.services.library.list(kind, lodge_id, &query).await)
}

#[axum::debug_handler]
pub async fn create_entry(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path((lodge_id, kind)): Path<(Uuid, LibraryKind)>,
    Json(mut entry): Json<NewLibraryEntry>,
) -> impl IntoResponse {
    let checked = async {
        let membership = require_member(&state, auth.user_id, lodge_id).await?;
        may_publish(kind, &membership)?;
        require_degree(&membership, entry.degree)
    };
    if let Err(e) = checked.await {
        return error_reply(&e);
    }
    entry.lodge_id = lodge_id;
    entry.author_id = Some(auth.user_id);
    reply(state.services.library.create(kind, &entry).await)
}

#[axum::debug_handler]
pub async fn get_entry(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path((kind, id)): Path<(LibraryKind, Uuid)>,
) -> impl IntoResponse {
    respond(
        visible_entry(&state, auth.user_id, kind, id)
            .await
            .map(|(entry, _)| entry),
    )
}

#[axum::debug_handler]
pub async fn update_entry(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path((kind, id)): Path<(LibraryKind, Uuid)>,
    Json(update): Json<LibraryEntryUpdate>,
) -> impl IntoResponse {
    if let Err(e) = editable_entry(&state, auth.user_id, kind, id).await {
        return error_reply(&e);
    }
    reply(state.services.library.update(kind, id, &update).await)
}

#[axum::debug_handler]
pub async fn delete_entry(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path((kind, id)): Path<(LibraryKind, Uuid)>,
) -> impl IntoResponse {
    if let Err(e) = editable_entry(&state, auth.user_id, kind, id).await {
        return error_reply(&e);
    }
    reply(state.services.library.delete(kind, id).await)
}
