use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, params};
use uuid::Uuid;

use amora_types::models::Block;

use crate::rows::{ts, ts_at, uuid_at};

/// Returns `true` if a new row was written, `false` if it already existed.
pub fn upsert_block(
    conn: &Connection,
    blocker: Uuid,
    blocked: Uuid,
    at: DateTime<Utc>,
) -> Result<bool> {
    let affected = conn.execute(
        "INSERT INTO blocks (blocker_id, blocked_id, created_at) VALUES (?1, ?2, ?3)
         ON CONFLICT(blocker_id, blocked_id) DO NOTHING",
        params![blocker.to_string(), blocked.to_string(), ts(at)],
    )?;
    Ok(affected > 0)
}

pub fn delete_block(conn: &Connection, blocker: Uuid, blocked: Uuid) -> Result<bool> {
    let affected = conn.execute(
        "DELETE FROM blocks WHERE blocker_id = ?1 AND blocked_id = ?2",
        params![blocker.to_string(), blocked.to_string()],
    )?;
    Ok(affected > 0)
}

pub fn is_blocked_either_direction(conn: &Connection, a: Uuid, b: Uuid) -> Result<bool> {
    let blocked: bool = conn.query_row(
        "SELECT EXISTS(
            SELECT 1 FROM blocks
            WHERE (blocker_id = ?1 AND blocked_id = ?2)
               OR (blocker_id = ?2 AND blocked_id = ?1)
         )",
        params![a.to_string(), b.to_string()],
        |row| row.get(0),
    )?;
    Ok(blocked)
}

pub fn list_blocked_by(conn: &Connection, blocker: Uuid) -> Result<Vec<Block>> {
    let mut stmt = conn.prepare(
        "SELECT blocker_id, blocked_id, created_at FROM blocks
         WHERE blocker_id = ?1
         ORDER BY created_at DESC, rowid DESC",
    )?;

    let rows = stmt
        .query_map([blocker.to_string()], |row| {
            Ok(Block {
                blocker_id: uuid_at(row, 0)?,
                blocked_id: uuid_at(row, 1)?,
                created_at: ts_at(row, 2)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(rows)
}
