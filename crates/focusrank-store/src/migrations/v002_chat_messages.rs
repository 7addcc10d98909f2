use rusqlite::Connection;

const UP_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS chat_messages (
    id         TEXT PRIMARY KEY NOT NULL,     -- UUID v4, server-assigned
    squad_id   TEXT NOT NULL,
    user_id    TEXT NOT NULL,
    content    TEXT NOT NULL,
    client_key TEXT,                          -- UUID v4 from the composing client
    created_at TEXT NOT NULL                  -- RFC-3339
);

CREATE INDEX IF NOT EXISTS idx_chat_messages_squad_ts
    ON chat_messages(squad_id, created_at);

-- A client key is only meaningful to the sender that minted it.
-- NULL keys (legacy senders) never collide in a SQLite UNIQUE index.
CREATE UNIQUE INDEX IF NOT EXISTS idx_chat_messages_client_key
    ON chat_messages(squad_id, user_id, client_key);
"#;

pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
