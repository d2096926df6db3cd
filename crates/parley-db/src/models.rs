/// Database row types. These map directly to SQLite rows.
/// Distinct from parley-types API models to keep the DB layer independent.

pub struct UserRow {
    pub id: String,
    pub username: String,
    pub email: String,
    pub password: String,
    pub profile_pic: Option<Vec<u8>>,
    pub profile_pic_type: Option<String>,
    pub refresh_token: Option<String>,
    pub created_at: String,
}

pub struct NewUser {
    pub id: String,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub profile_pic: Option<(Vec<u8>, String)>,
    pub refresh_token: Option<String>,
    pub created_at: String,
}

/// A thread with its participants (in join order) and messages (in post order).
pub struct ChatRow {
    pub id: String,
    pub name: Option<String>,
    pub participant_key: String,
    pub profile_pic: Option<(Vec<u8>, String)>,
    pub created_at: String,
    pub updated_at: String,
    pub participants: Vec<String>,
    pub messages: Vec<MessageRow>,
}

pub struct NewChat {
    pub id: String,
    pub name: Option<String>,
    pub participants: Vec<String>,
    pub profile_pic: Option<(Vec<u8>, String)>,
    pub created_at: String,
}

pub struct MessageRow {
    pub id: String,
    pub chat_id: String,
    pub seq: i64,
    pub sender_id: String,
    pub text: String,
    pub created_at: String,
    pub read_by: Vec<String>,
}

pub struct NewMessage {
    pub id: String,
    pub sender_id: String,
    pub text: String,
    pub created_at: String,
}
