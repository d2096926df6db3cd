use anyhow::Result;

use crate::models::{ChatRow, MessageRow, NewChat, NewMessage, NewUser, UserRow};

/// Persistence for user records and their current refresh token.
pub trait CredentialStore: Send + Sync {
    fn find_user_by_email(&self, email: &str) -> Result<Option<UserRow>>;

    fn get_user_by_id(&self, id: &str) -> Result<Option<UserRow>>;

    /// Returns `false` without writing if the email is already registered.
    fn create_user(&self, user: &NewUser) -> Result<bool>;

    /// Overwrites the stored refresh token. Returns `false` if the user is unknown.
    fn set_refresh_token(&self, user_id: &str, token: &str) -> Result<bool>;

    /// Clears the stored refresh token. Returns `false` if the user is unknown.
    fn clear_refresh_token(&self, user_id: &str) -> Result<bool>;

    /// Every user except `user_id`, ordered by username.
    fn list_users_except(&self, user_id: &str) -> Result<Vec<UserRow>>;
}

/// Persistence for conversation threads and their embedded messages.
///
/// Implementations must reject a second thread with the same
/// (participant key, name) pair at write time.
pub trait ConversationStore: Send + Sync {
    fn get_chat(&self, id: &str) -> Result<Option<ChatRow>>;

    /// Thread whose participant key and name both match exactly.
    fn find_chat(&self, participant_key: &str, name: Option<&str>) -> Result<Option<ChatRow>>;

    /// Inserts a thread, optionally seeded with its first message. Returns
    /// `false` when a thread with the same identity already exists.
    fn insert_chat(&self, chat: &NewChat, first: Option<&NewMessage>) -> Result<bool>;

    /// Appends at the end of the thread. Returns `None` if the thread is gone.
    fn append_message(&self, chat_id: &str, message: &NewMessage) -> Result<Option<MessageRow>>;

    fn add_participant(&self, chat_id: &str, user_id: &str) -> Result<AddParticipantOutcome>;

    /// Named threads with more than two members that `user_id` belongs to,
    /// most recently active first, loaded without profile pictures.
    fn groups_for_user(&self, user_id: &str) -> Result<Vec<ChatRow>>;

    /// Adds `user_id` to the read set of every message in the thread.
    fn mark_read(&self, chat_id: &str, user_id: &str) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddParticipantOutcome {
    Added,
    ChatNotFound,
    AlreadyMember,
    /// One-to-one threads have a fixed membership.
    DirectChat,
    /// The grown set would duplicate another thread's identity.
    Collision,
}

/// Canonical form of a participant set: distinct ids, sorted, comma-joined.
pub fn participant_key<S: AsRef<str>>(ids: &[S]) -> String {
    let mut ids: Vec<&str> = ids.iter().map(|id| id.as_ref()).collect();
    ids.sort_unstable();
    ids.dedup();
    ids.join(",")
}
