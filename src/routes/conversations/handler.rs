use axum::{
    extract::{Extension, Json, Path, Query, State},
    response::IntoResponse,
};
use uuid::Uuid;

use crate::{
    AppState,
    error::{BackendError, ErrorKind},
    middleware::AuthContext,
    models::{Conversation, NewMessage},
    result::{error_reply, reply},
};

use super::model::{DirectRequest, GroupRequest, HistoryQuery, ReadRequest, SendRequest};

async fn participant_of(
    state: &AppState,
    user_id: Uuid,
    conversation_id: Uuid,
) -> Result<Conversation, BackendError> {
    let conversation = state
        .services
        .messages
        .get_conversation(conversation_id)
        .await
        .into_result()?;
    if !conversation.participant_ids.contains(&user_id) {
        return Err(BackendError::new(
            ErrorKind::PermissionDenied,
            "not a participant of this conversation",
        ));
    }
    Ok(conversation)
}

#[axum::debug_handler]
pub async fn list_conversations(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> impl IntoResponse {
    reply(state.services.messages.list_conversations(auth.user_id).await)
}

#[axum::debug_handler]
pub async fn open_direct(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(req): Json<DirectRequest>,
) -> impl IntoResponse {
    reply(
        state
            .services
            .messages
            .get_or_create_direct(auth.user_id, req.user_id)
            .await,
    )
}

/// The caller is always among the participants.
#[axum::debug_handler]
pub async fn create_group(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(mut req): Json<GroupRequest>,
) -> impl IntoResponse {
    req.participant_ids.push(auth.user_id);
    reply(
        state
            .services
            .messages
            .create_group_conversation(&req.title, &req.participant_ids, req.lodge_id)
            .await,
    )
}

#[axum::debug_handler]
pub async fn list_messages(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(conversation_id): Path<Uuid>,
    Query(query): Query<HistoryQuery>,
) -> impl IntoResponse {
    if let Err(e) = participant_of(&state, auth.user_id, conversation_id).await {
        return error_reply(&e);
    }
    reply(
        state
            .services
            .messages
            .list_messages(conversation_id, query.before, query.limit)
            .await,
    )
}

#[axum::debug_handler]
pub async fn send_message(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(conversation_id): Path<Uuid>,
    Json(req): Json<SendRequest>,
) -> impl IntoResponse {
    if let Err(e) = participant_of(&state, auth.user_id, conversation_id).await {
        return error_reply(&e);
    }
    let message = NewMessage {
        conversation_id,
        sender_id: auth.user_id,
        text: req.text,
        attachments: req.attachments,
    };
    reply(state.services.messages.send_message(&message).await)
}

#[axum::debug_handler]
pub async fn mark_read(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(conversation_id): Path<Uuid>,
    Json(req): Json<ReadRequest>,
) -> impl IntoResponse {
    if let Err(e) = participant_of(&state, auth.user_id, conversation_id).await {
        return error_reply(&e);
    }
    reply(
        state
            .services
            .messages
            .mark_read(&req.message_ids, auth.user_id)
            .await,
    )
}
