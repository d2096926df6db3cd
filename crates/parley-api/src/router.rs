use axum::{
    Router, middleware,
    routing::{get, post},
};

use crate::auth::{self, AppState};
use crate::chat;
use crate::middleware::require_auth;

/// All session and chat routes. Transport layers (CORS, tracing) are added by
/// the binary.
pub fn router(state: AppState) -> Router {
    let auth_routes = Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/auth/refresh-token", post(auth::refresh_token))
        .route("/auth/logout", post(auth::logout));

    let chat_routes = Router::new()
        .route("/chat/send-message", post(chat::send_message))
        .route("/chat/get-chat", get(chat::find_direct_chat))
        .route("/chat/get-chat/{chat_id}", get(chat::get_chat))
        .route("/chat/create-group", post(chat::create_group))
        .route("/chat/groups/{group_id}/adduser", post(chat::add_user))
        .route("/chat/contacts-and-groups/{user_id}", get(chat::contacts_and_groups))
        .route("/chat/read/{chat_id}", post(chat::mark_read))
        .layer(middleware::from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .merge(auth_routes)
        .merge(chat_routes)
        .with_state(state)
}
