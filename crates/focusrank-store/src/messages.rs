use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};
use uuid::Uuid;

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::{ts_from_row, ts_to_sql, uuid_from_row, SquadId, StoredMessage, UserId};

const SELECT_COLUMNS: &str = "SELECT id, squad_id, user_id, content, client_key, created_at
                              FROM chat_messages";

impl Database {
    /// Persist a chat message.
    ///
    /// When the same sender already stored a message under this `client_key`
    /// in this squad, that row is returned instead and nothing is written; the
    /// boolean is `true` only when a new row was inserted. The returned row is
    /// read back, so its timestamp has the stored precision.
    pub fn insert_chat_message(&self, message: &StoredMessage) -> Result<(StoredMessage, bool)> {
        let affected = self.conn().execute(
            "INSERT INTO chat_messages (id, squad_id, user_id, content, client_key, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(squad_id, user_id, client_key) DO NOTHING",
            params![
                message.id.to_string(),
                message.squad_id.0.to_string(),
                message.user_id.as_str(),
                message.content,
                message.client_key.map(|k| k.to_string()),
                ts_to_sql(message.created_at),
            ],
        )?;

        if affected > 0 {
            return Ok((self.get_chat_message(message.id)?, true));
        }

        let key = message.client_key.ok_or(StoreError::NotFound)?;
        let existing = self
            .get_message_by_client_key(message.squad_id, &message.user_id, key)?
            .ok_or(StoreError::NotFound)?;
        Ok((existing, false))
    }

    pub fn get_chat_message(&self, id: Uuid) -> Result<StoredMessage> {
        self.conn()
            .query_row(
                &format!("{SELECT_COLUMNS} WHERE id = ?1"),
                params![id.to_string()],
                row_to_message,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
                other => StoreError::Sqlite(other),
            })
    }

    /// The message `user_id` stored in `squad_id` under `client_key`, if any.
    pub fn get_message_by_client_key(
        &self,
        squad_id: SquadId,
        user_id: &UserId,
        client_key: Uuid,
    ) -> Result<Option<StoredMessage>> {
        let message = self
            .conn()
            .query_row(
                &format!(
                    "{SELECT_COLUMNS} WHERE squad_id = ?1 AND user_id = ?2 AND client_key = ?3"
                ),
                params![squad_id.0.to_string(), user_id.as_str(), client_key.to_string()],
                row_to_message,
            )
            .optional()?;
        Ok(message)
    }

    /// A page of squad chat in reading order (oldest first).
    ///
    /// Returns the `limit` newest messages created strictly before `before`
    /// (or the newest overall when `before` is `None`).
    pub fn messages_for_squad(
        &self,
        squad_id: SquadId,
        limit: u32,
        before: Option<DateTime<Utc>>,
    ) -> Result<Vec<StoredMessage>> {
        let mut stmt = self.conn().prepare(&format!(
            "{SELECT_COLUMNS}
             WHERE squad_id = ?1 AND (?2 IS NULL OR created_at < ?2)
             ORDER BY created_at DESC, id DESC
             LIMIT ?3"
        ))?;

        let rows = stmt.query_map(
            params![squad_id.0.to_string(), before.map(ts_to_sql), limit],
            row_to_message,
        )?;

        let mut messages = Vec::new();
        for row in rows {
            messages.push(row?);
        }
        messages.reverse();
        Ok(messages)
    }
}

fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<StoredMessage> {
    let client_key = match row.get::<_, Option<String>>(4)? {
        Some(_) => Some(uuid_from_row(row, 4)?),
        None => None,
    };

    Ok(StoredMessage {
        id: uuid_from_row(row, 0)?,
        squad_id: SquadId(uuid_from_row(row, 1)?),
        user_id: UserId(row.get(2)?),
        content: row.get(3)?,
        client_key,
        created_at: ts_from_row(row, 5)?,
    })
}
