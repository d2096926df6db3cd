use crate::Database;
use crate::models::{ChatRow, MessageRow, NewChat, NewMessage, NewUser, UserRow};
use crate::store::{AddParticipantOutcome, ConversationStore, CredentialStore, participant_key};
use anyhow::Result;
use rusqlite::{Connection, ErrorCode};

const USER_COLUMNS: &str =
    "id, username, email, password, profile_pic, profile_pic_type, refresh_token, created_at";

// -- Users --

impl CredentialStore for Database {
    fn find_user_by_email(&self, email: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "email", email))
    }

    fn get_user_by_id(&self, id: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "id", id))
    }

    fn create_user(&self, user: &NewUser) -> Result<bool> {
        let (pic, pic_type) = split_pic(&user.profile_pic);
        self.with_conn_mut(|conn| {
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO users
                    (id, username, email, password, profile_pic, profile_pic_type, refresh_token, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                rusqlite::params![
                    user.id,
                    user.username,
                    user.email,
                    user.password_hash,
                    pic,
                    pic_type,
                    user.refresh_token,
                    user.created_at,
                ],
            )?;
            Ok(inserted == 1)
        })
    }

    fn set_refresh_token(&self, user_id: &str, token: &str) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let updated = conn.execute(
                "UPDATE users SET refresh_token = ?2 WHERE id = ?1",
                (user_id, token),
            )?;
            Ok(updated == 1)
        })
    }

    fn clear_refresh_token(&self, user_id: &str) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let updated = conn.execute(
                "UPDATE users SET refresh_token = NULL WHERE id = ?1",
                [user_id],
            )?;
            Ok(updated == 1)
        })
    }

    fn list_users_except(&self, user_id: &str) -> Result<Vec<UserRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {USER_COLUMNS} FROM users WHERE id != ?1 ORDER BY username, id"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([user_id], map_user)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

// -- Chats --

impl ConversationStore for Database {
    fn get_chat(&self, id: &str) -> Result<Option<ChatRow>> {
        self.with_conn(|conn| load_chat(conn, id, true))
    }

    fn find_chat(&self, participant_key: &str, name: Option<&str>) -> Result<Option<ChatRow>> {
        self.with_conn(|conn| {
            let id: Option<String> = conn
                .query_row(
                    "SELECT id FROM chats
                     WHERE participant_key = ?1 AND COALESCE(name, '') = COALESCE(?2, '')",
                    rusqlite::params![participant_key, name],
                    |row| row.get(0),
                )
                .optional()?;

            match id {
                Some(id) => load_chat(conn, &id, true),
                None => Ok(None),
            }
        })
    }

    fn insert_chat(&self, chat: &NewChat, first: Option<&NewMessage>) -> Result<bool> {
        let key = participant_key(&chat.participants);
        let (pic, pic_type) = split_pic(&chat.profile_pic);

        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            // The identity index turns a duplicate thread into a no-op insert.
            let inserted = tx.execute(
                "INSERT OR IGNORE INTO chats
                    (id, name, participant_key, profile_pic, profile_pic_type, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
                rusqlite::params![chat.id, chat.name, key, pic, pic_type, chat.created_at],
            )?;
            if inserted == 0 {
                return Ok(false);
            }

            let mut position = 0i64;
            for user_id in &chat.participants {
                let added = tx.execute(
                    "INSERT OR IGNORE INTO chat_participants (chat_id, user_id, position)
                     VALUES (?1, ?2, ?3)",
                    rusqlite::params![chat.id, user_id, position],
                )?;
                position += added as i64;
            }

            if let Some(message) = first {
                insert_message(&tx, &chat.id, message)?;
            }

            tx.commit()?;
            Ok(true)
        })
    }

    fn append_message(&self, chat_id: &str, message: &NewMessage) -> Result<Option<MessageRow>> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let touched = tx.execute(
                "UPDATE chats SET updated_at = ?2 WHERE id = ?1",
                (chat_id, &message.created_at),
            )?;
            if touched == 0 {
                return Ok(None);
            }

            let row = insert_message(&tx, chat_id, message)?;
            tx.commit()?;
            Ok(Some(row))
        })
    }

    fn add_participant(&self, chat_id: &str, user_id: &str) -> Result<AddParticipantOutcome> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let name: Option<Option<String>> = tx
                .query_row("SELECT name FROM chats WHERE id = ?1", [chat_id], |row| {
                    row.get(0)
                })
                .optional()?;
            let Some(name) = name else {
                return Ok(AddParticipantOutcome::ChatNotFound);
            };

            let mut members = query_participants(&tx, chat_id)?;
            if members.iter().any(|m| m == user_id) {
                return Ok(AddParticipantOutcome::AlreadyMember);
            }
            if name.is_none() {
                return Ok(AddParticipantOutcome::DirectChat);
            }

            members.push(user_id.to_string());
            let key = participant_key(&members);
            let now = chrono::Utc::now().to_rfc3339();

            match tx.execute(
                "UPDATE chats SET participant_key = ?2, updated_at = ?3 WHERE id = ?1",
                (chat_id, &key, &now),
            ) {
                Ok(_) => {}
                Err(rusqlite::Error::SqliteFailure(e, _)) if e.code == ErrorCode::ConstraintViolation => {
                    return Ok(AddParticipantOutcome::Collision);
                }
                Err(e) => return Err(e.into()),
            }

            tx.execute(
                "INSERT INTO chat_participants (chat_id, user_id, position)
                 VALUES (?1, ?2, (SELECT COALESCE(MAX(position), -1) + 1
                                  FROM chat_participants WHERE chat_id = ?1))",
                (chat_id, user_id),
            )?;

            tx.commit()?;
            Ok(AddParticipantOutcome::Added)
        })
    }

    fn groups_for_user(&self, user_id: &str) -> Result<Vec<ChatRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT c.id FROM chats c
                 JOIN chat_participants p ON p.chat_id = c.id
                 WHERE p.user_id = ?1 AND c.name IS NOT NULL
                   AND (SELECT COUNT(*) FROM chat_participants m WHERE m.chat_id = c.id) > 2
                 ORDER BY c.updated_at DESC, c.id",
            )?;
            let ids = stmt
                .query_map([user_id], |row| row.get::<_, String>(0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            let mut chats = Vec::with_capacity(ids.len());
            for id in ids {
                if let Some(chat) = load_chat(conn, &id, false)? {
                    chats.push(chat);
                }
            }
            Ok(chats)
        })
    }

    fn mark_read(&self, chat_id: &str, user_id: &str) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT OR IGNORE INTO message_reads (message_id, user_id)
                 SELECT id, ?2 FROM messages WHERE chat_id = ?1",
                (chat_id, user_id),
            )?;
            Ok(())
        })
    }
}

fn split_pic(pic: &Option<(Vec<u8>, String)>) -> (Option<&[u8]>, Option<&str>) {
    match pic {
        Some((data, content_type)) => (Some(data.as_slice()), Some(content_type.as_str())),
        None => (None, None),
    }
}

fn map_user(row: &rusqlite::Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(0)?,
        username: row.get(1)?,
        email: row.get(2)?,
        password: row.get(3)?,
        profile_pic: row.get(4)?,
        profile_pic_type: row.get(5)?,
        refresh_token: row.get(6)?,
        created_at: row.get(7)?,
    })
}

fn query_user(conn: &Connection, column: &str, value: &str) -> Result<Option<UserRow>> {
    let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE {column} = ?1");
    let mut stmt = conn.prepare(&sql)?;
    let row = stmt.query_row([value], map_user).optional()?;
    Ok(row)
}

fn query_participants(conn: &Connection, chat_id: &str) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT user_id FROM chat_participants WHERE chat_id = ?1 ORDER BY position",
    )?;
    let rows = stmt
        .query_map([chat_id], |row| row.get(0))?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn insert_message(conn: &Connection, chat_id: &str, message: &NewMessage) -> Result<MessageRow> {
    let seq: i64 = conn.query_row(
        "SELECT COALESCE(MAX(seq), 0) + 1 FROM messages WHERE chat_id = ?1",
        [chat_id],
        |row| row.get(0),
    )?;

    conn.execute(
        "INSERT INTO messages (id, chat_id, seq, sender_id, text, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        rusqlite::params![
            message.id,
            chat_id,
            seq,
            message.sender_id,
            message.text,
            message.created_at,
        ],
    )?;

    Ok(MessageRow {
        id: message.id.clone(),
        chat_id: chat_id.to_string(),
        seq,
        sender_id: message.sender_id.clone(),
        text: message.text.clone(),
        created_at: message.created_at.clone(),
        read_by: vec![],
    })
}

fn load_chat(conn: &Connection, id: &str, with_pic: bool) -> Result<Option<ChatRow>> {
    let head = conn
        .query_row(
            "SELECT id, name, participant_key, profile_pic, profile_pic_type, created_at, updated_at
             FROM chats WHERE id = ?1",
            [id],
            |row| {
                let pic: Option<Vec<u8>> = if with_pic { row.get(3)? } else { None };
                let pic_type: Option<String> = row.get(4)?;
                Ok(ChatRow {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    participant_key: row.get(2)?,
                    profile_pic: pic.zip(pic_type),
                    created_at: row.get(5)?,
                    updated_at: row.get(6)?,
                    participants: vec![],
                    messages: vec![],
                })
            },
        )
        .optional()?;

    let Some(mut chat) = head else {
        return Ok(None);
    };

    chat.participants = query_participants(conn, id)?;
    chat.messages = query_messages(conn, id)?;
    Ok(Some(chat))
}

fn query_messages(conn: &Connection, chat_id: &str) -> Result<Vec<MessageRow>> {
    let mut stmt = conn.prepare(
        "SELECT id, chat_id, seq, sender_id, text, created_at
         FROM messages WHERE chat_id = ?1 ORDER BY seq",
    )?;
    let mut messages = stmt
        .query_map([chat_id], |row| {
            Ok(MessageRow {
                id: row.get(0)?,
                chat_id: row.get(1)?,
                seq: row.get(2)?,
                sender_id: row.get(3)?,
                text: row.get(4)?,
                created_at: row.get(5)?,
                read_by: vec![],
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    if messages.is_empty() {
        return Ok(messages);
    }

    // One pass over the thread's read receipts instead of a query per message
    let mut stmt = conn.prepare(
        "SELECT r.message_id, r.user_id FROM message_reads r
         JOIN messages m ON m.id = r.message_id
         WHERE m.chat_id = ?1
         ORDER BY r.rowid",
    )?;
    let reads = stmt
        .query_map([chat_id], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    for (message_id, user_id) in reads {
        if let Some(message) = messages.iter_mut().find(|m| m.id == message_id) {
            message.read_by.push(user_id);
        }
    }

    Ok(messages)
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(id: &str, email: &str) -> NewUser {
        NewUser {
            id: id.into(),
            username: format!("user-{id}"),
            email: email.into(),
            password_hash: "$argon2id$stub".into(),
            profile_pic: None,
            refresh_token: Some(format!("rt-{id}")),
            created_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    fn chat(id: &str, name: Option<&str>, participants: &[&str]) -> NewChat {
        NewChat {
            id: id.into(),
            name: name.map(String::from),
            participants: participants.iter().map(|p| p.to_string()).collect(),
            profile_pic: None,
            created_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    fn message(id: &str, sender: &str, text: &str) -> NewMessage {
        NewMessage {
            id: id.into(),
            sender_id: sender.into(),
            text: text.into(),
            created_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    #[test]
    fn duplicate_email_is_not_inserted() {
        let db = Database::open_in_memory().unwrap();
        assert!(db.create_user(&user("u1", "a@x.com")).unwrap());
        assert!(!db.create_user(&user("u2", "a@x.com")).unwrap());

        let stored = db.find_user_by_email("a@x.com").unwrap().unwrap();
        assert_eq!(stored.id, "u1");
        assert!(db.get_user_by_id("u2").unwrap().is_none());
    }

    #[test]
    fn clear_refresh_token_drops_stored_value() {
        let db = Database::open_in_memory().unwrap();
        db.create_user(&user("u1", "a@x.com")).unwrap();

        assert!(!db.clear_refresh_token("nobody").unwrap());
        assert!(db.clear_refresh_token("u1").unwrap());
        assert!(db.get_user_by_id("u1").unwrap().unwrap().refresh_token.is_none());
        // Clearing again is harmless.
        assert!(db.clear_refresh_token("u1").unwrap());
    }

    #[test]
    fn identity_index_rejects_same_set_and_name() {
        let db = Database::open_in_memory().unwrap();
        assert!(db.insert_chat(&chat("c1", None, &["a", "b"]), None).unwrap());
        assert!(!db.insert_chat(&chat("c2", None, &["b", "a"]), None).unwrap());

        // Same members under a name is a different thread.
        assert!(db.insert_chat(&chat("c3", Some("Team"), &["a", "b"]), None).unwrap());
        assert!(!db.insert_chat(&chat("c4", Some("Team"), &["a", "b"]), None).unwrap());
        assert!(db.get_chat("c2").unwrap().is_none());
    }

    #[test]
    fn messages_keep_post_order() {
        let db = Database::open_in_memory().unwrap();
        db.insert_chat(&chat("c1", None, &["a", "b"]), Some(&message("m1", "a", "hi")))
            .unwrap();
        let appended = db.append_message("c1", &message("m2", "b", "yo")).unwrap().unwrap();
        assert_eq!(appended.seq, 2);

        let stored = db.get_chat("c1").unwrap().unwrap();
        let texts: Vec<_> = stored.messages.iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, ["hi", "yo"]);
        assert_eq!(stored.participants, ["a", "b"]);
    }

    #[test]
    fn append_to_missing_chat_is_none() {
        let db = Database::open_in_memory().unwrap();
        assert!(db.append_message("nope", &message("m1", "a", "hi")).unwrap().is_none());
    }

    #[test]
    fn add_participant_outcomes() {
        let db = Database::open_in_memory().unwrap();
        db.insert_chat(&chat("direct", None, &["a", "b"]), None).unwrap();
        db.insert_chat(&chat("g1", Some("Team"), &["a", "b"]), None).unwrap();
        db.insert_chat(&chat("g2", Some("Team"), &["a", "b", "c"]), None).unwrap();

        assert_eq!(db.add_participant("missing", "c").unwrap(), AddParticipantOutcome::ChatNotFound);
        assert_eq!(db.add_participant("direct", "c").unwrap(), AddParticipantOutcome::DirectChat);
        assert_eq!(db.add_participant("g1", "a").unwrap(), AddParticipantOutcome::AlreadyMember);
        assert_eq!(db.add_participant("g1", "c").unwrap(), AddParticipantOutcome::Collision);
        assert_eq!(db.add_participant("g1", "d").unwrap(), AddParticipantOutcome::Added);

        let grown = db.get_chat("g1").unwrap().unwrap();
        assert_eq!(grown.participants, ["a", "b", "d"]);
        assert_eq!(grown.participant_key, "a,b,d");
    }

    #[test]
    fn mark_read_is_idempotent() {
        let db = Database::open_in_memory().unwrap();
        db.insert_chat(&chat("c1", None, &["a", "b"]), Some(&message("m1", "a", "hi")))
            .unwrap();
        db.mark_read("c1", "b").unwrap();
        db.mark_read("c1", "b").unwrap();

        let stored = db.get_chat("c1").unwrap().unwrap();
        assert_eq!(stored.messages[0].read_by, ["b"]);
    }

    #[test]
    fn groups_for_user_skips_pairs_and_pictures() {
        let db = Database::open_in_memory().unwrap();
        db.insert_chat(&chat("direct", None, &["a", "b"]), None).unwrap();
        db.insert_chat(&chat("pair", Some("Just us"), &["a", "b"]), None).unwrap();
        let mut group = chat("g1", Some("Team"), &["a", "b", "c"]);
        group.profile_pic = Some((vec![1, 2, 3], "image/png".into()));
        db.insert_chat(&group, None).unwrap();

        let groups = db.groups_for_user("a").unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].id, "g1");
        assert!(groups[0].profile_pic.is_none());
        assert!(db.get_chat("g1").unwrap().unwrap().profile_pic.is_some());
        assert!(db.groups_for_user("z").unwrap().is_empty());
    }
}
