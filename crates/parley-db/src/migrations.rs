use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS users (
            id                  TEXT PRIMARY KEY,
            username            TEXT NOT NULL,
            email               TEXT NOT NULL UNIQUE,
            password            TEXT NOT NULL,
            profile_pic         BLOB,
            profile_pic_type    TEXT,
            refresh_token       TEXT,
            created_at          TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS chats (
            id                  TEXT PRIMARY KEY,
            name                TEXT,
            participant_key     TEXT NOT NULL,
            profile_pic         BLOB,
            profile_pic_type    TEXT,
            created_at          TEXT NOT NULL,
            updated_at          TEXT NOT NULL
        );

        -- One thread per (participant set, name); direct threads have no name.
        CREATE UNIQUE INDEX IF NOT EXISTS idx_chats_identity
            ON chats(participant_key, COALESCE(name, ''));

        CREATE TABLE IF NOT EXISTS chat_participants (
            chat_id     TEXT NOT NULL REFERENCES chats(id),
            user_id     TEXT NOT NULL,
            position    INTEGER NOT NULL,
            PRIMARY KEY (chat_id, user_id)
        );

        CREATE INDEX IF NOT EXISTS idx_chat_participants_user
            ON chat_participants(user_id);

        CREATE TABLE IF NOT EXISTS messages (
            id          TEXT PRIMARY KEY,
            chat_id     TEXT NOT NULL REFERENCES chats(id),
            seq         INTEGER NOT NULL,
            sender_id   TEXT NOT NULL,
            text        TEXT NOT NULL,
            created_at  TEXT NOT NULL,
            UNIQUE(chat_id, seq)
        );

        CREATE TABLE IF NOT EXISTS message_reads (
            message_id  TEXT NOT NULL REFERENCES messages(id),
            user_id     TEXT NOT NULL,
            PRIMARY KEY (message_id, user_id)
        );
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
