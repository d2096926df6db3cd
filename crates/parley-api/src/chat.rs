use axum::{
    Extension, Json,
    extract::{
        Path, Query, State,
        rejection::{JsonRejection, PathRejection, QueryRejection},
    },
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;

use parley_types::api::{
    AddUserRequest, Claims, CreateGroupRequest, DirectChatQuery, SendMessageRequest,
};

use crate::auth::AppState;
use crate::conversations::{IncomingMessage, Resolution};
use crate::error::ServiceError;
use crate::run_blocking;

/// 201 when the message opened a new thread, 200 when it joined an existing one.
pub async fn send_message(
    State(state): State<AppState>,
    body: Result<Json<SendMessageRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ServiceError> {
    let Json(req) = body?;

    let (thread, resolution) = run_blocking(move || {
        state.chats.resolve_and_append(
            &req.users,
            req.chat_name.as_deref(),
            IncomingMessage {
                sender_id: req.message.sender_id,
                text: req.message.text,
            },
        )
    })
    .await?;

    let status = match resolution {
        Resolution::Created => StatusCode::CREATED,
        Resolution::Appended => StatusCode::OK,
    };
    Ok((status, Json(thread)))
}

pub async fn get_chat(
    State(state): State<AppState>,
    chat_id: Result<Path<Uuid>, PathRejection>,
) -> Result<impl IntoResponse, ServiceError> {
    let Path(chat_id) = chat_id?;
    let thread = run_blocking(move || state.chats.get_thread(chat_id)).await?;
    Ok(Json(thread))
}

/// `GET /chat/get-chat?userId1=..&userId2=..`
pub async fn find_direct_chat(
    State(state): State<AppState>,
    query: Result<Query<DirectChatQuery>, QueryRejection>,
) -> Result<impl IntoResponse, ServiceError> {
    let Query(query) = query?;
    let (Some(a), Some(b)) = (query.user_id1, query.user_id2) else {
        return Err(ServiceError::validation(
            "Provide either chatId or both userId1 and userId2",
        ));
    };

    let thread = run_blocking(move || state.chats.find_direct(a, b)).await?;
    Ok(Json(thread))
}

pub async fn create_group(
    State(state): State<AppState>,
    body: Result<Json<CreateGroupRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ServiceError> {
    let Json(req) = body?;

    let thread = run_blocking(move || {
        state
            .chats
            .create_group(&req.chat_name, &req.users, req.profile_pic)
    })
    .await?;

    Ok((StatusCode::CREATED, Json(thread)))
}

pub async fn add_user(
    State(state): State<AppState>,
    group_id: Result<Path<Uuid>, PathRejection>,
    body: Result<Json<AddUserRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ServiceError> {
    let Path(group_id) = group_id?;
    let Json(req) = body?;

    let thread = run_blocking(move || state.chats.add_participant(group_id, req.user_id)).await?;
    Ok(Json(thread))
}

pub async fn contacts_and_groups(
    State(state): State<AppState>,
    user_id: Result<Path<Uuid>, PathRejection>,
) -> Result<impl IntoResponse, ServiceError> {
    let Path(user_id) = user_id?;
    let listing = run_blocking(move || state.chats.contacts_and_groups(user_id)).await?;
    Ok(Json(listing))
}

/// Marks the thread read on behalf of the authenticated caller.
pub async fn mark_read(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    chat_id: Result<Path<Uuid>, PathRejection>,
) -> Result<impl IntoResponse, ServiceError> {
    let Path(chat_id) = chat_id?;
    let thread = run_blocking(move || state.chats.mark_read(chat_id, claims.sub)).await?;
    Ok(Json(thread))
}
