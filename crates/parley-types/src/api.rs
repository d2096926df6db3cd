use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{Contact, ConversationThread, ProfilePic, UserSummary};

// -- Token Claims --

/// Claims carried by both access and refresh tokens. The two kinds are told
/// apart by the secret they are signed with, not by their payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub iat: usize,
    pub exp: usize,
    pub jti: Uuid,
}

// -- Auth --

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    pub profile_pic: Option<ProfilePic>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

/// Body returned by register and login. The refresh token travels in a
/// cookie, never in this body.
#[derive(Debug, Serialize, Deserialize)]
pub struct AuthResponse {
    pub user: UserSummary,
    pub token: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TokenResponse {
    pub token: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatusMessage {
    pub message: String,
}

// -- Chat --

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutgoingMessage {
    pub sender_id: Uuid,
    #[serde(default)]
    pub text: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageRequest {
    pub users: Vec<Uuid>,
    pub chat_name: Option<String>,
    pub message: OutgoingMessage,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateGroupRequest {
    #[serde(default)]
    pub chat_name: String,
    pub users: Vec<Uuid>,
    pub profile_pic: Option<ProfilePic>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddUserRequest {
    pub user_id: Uuid,
}

/// Query form of `GET /chat/get-chat` for looking up a one-to-one thread.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectChatQuery {
    pub user_id1: Option<Uuid>,
    pub user_id2: Option<Uuid>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ContactsAndGroups {
    pub users: Vec<Contact>,
    pub groups: Vec<ConversationThread>,
}
