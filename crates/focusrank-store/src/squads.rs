use chrono::Utc;
use rusqlite::{params, OptionalExtension};

use crate::database::Database;
use crate::error::Result;
use crate::models::{ts_from_row, ts_to_sql, uuid_from_row, SquadId, SquadMember, UserId};

impl Database {
    /// Add a user to a squad. Returns `false` if they were already a member.
    pub fn add_squad_member(&self, squad_id: SquadId, user_id: &UserId) -> Result<bool> {
        let affected = self.conn().execute(
            "INSERT OR IGNORE INTO squad_members (squad_id, user_id, joined_at)
             VALUES (?1, ?2, ?3)",
            params![
                squad_id.0.to_string(),
                user_id.as_str(),
                ts_to_sql(Utc::now()),
            ],
        )?;
        Ok(affected > 0)
    }

    pub fn remove_squad_member(&self, squad_id: SquadId, user_id: &UserId) -> Result<bool> {
        let affected = self.conn().execute(
            "DELETE FROM squad_members WHERE squad_id = ?1 AND user_id = ?2",
            params![squad_id.0.to_string(), user_id.as_str()],
        )?;
        Ok(affected > 0)
    }

    pub fn is_squad_member(&self, squad_id: SquadId, user_id: &UserId) -> Result<bool> {
        let found = self
            .conn()
            .query_row(
                "SELECT 1 FROM squad_members WHERE squad_id = ?1 AND user_id = ?2",
                params![squad_id.0.to_string(), user_id.as_str()],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }

    /// Members of a squad, ordered by user id.
    pub fn squad_members(&self, squad_id: SquadId) -> Result<Vec<SquadMember>> {
        let mut stmt = self.conn().prepare(
            "SELECT squad_id, user_id, joined_at FROM squad_members
             WHERE squad_id = ?1
             ORDER BY user_id",
        )?;
        let rows = stmt.query_map(params![squad_id.0.to_string()], row_to_member)?;

        let mut members = Vec::new();
        for row in rows {
            members.push(row?);
        }
        Ok(members)
    }

    /// Every squad a user belongs to.
    pub fn squads_for_user(&self, user_id: &UserId) -> Result<Vec<SquadId>> {
        let mut stmt = self
            .conn()
            .prepare("SELECT squad_id FROM squad_members WHERE user_id = ?1 ORDER BY squad_id")?;
        let rows = stmt.query_map(params![user_id.as_str()], |row| {
            Ok(SquadId(uuid_from_row(row, 0)?))
        })?;

        let mut squads = Vec::new();
        for row in rows {
            squads.push(row?);
        }
        Ok(squads)
    }
}

fn row_to_member(row: &rusqlite::Row<'_>) -> rusqlite::Result<SquadMember> {
    Ok(SquadMember {
        squad_id: SquadId(uuid_from_row(row, 0)?),
        user_id: UserId(row.get(1)?),
        joined_at: ts_from_row(row, 2)?,
    })
}
