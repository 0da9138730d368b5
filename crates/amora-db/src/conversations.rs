use anyhow::{Result, anyhow};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, params};
use uuid::Uuid;

use amora_types::models::Conversation;

use crate::rows::{OptionalExt, opt_ts_at, ts, ts_at, uuid_at};

const CONVERSATION_COLUMNS: &str = "id, user_low, user_high, last_message, last_message_at,
     unread_low, unread_high, created_at";

/// Which stored side of a conversation a participant occupies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Low,
    High,
}

impl Side {
    pub fn of(conversation: &Conversation, user_id: Uuid) -> Option<Side> {
        if conversation.user_low == user_id {
            Some(Side::Low)
        } else if conversation.user_high == user_id {
            Some(Side::High)
        } else {
            None
        }
    }

    fn unread_column(self) -> &'static str {
        match self {
            Side::Low => "unread_low",
            Side::High => "unread_high",
        }
    }
}

/// Insert the conversation for `(low, high)` unless one exists, then return
/// whichever row owns the pair. The UNIQUE constraint settles races.
pub fn insert_or_get(
    conn: &Connection,
    id: Uuid,
    low: Uuid,
    high: Uuid,
    at: DateTime<Utc>,
) -> Result<(Conversation, bool)> {
    debug_assert!(low < high, "pair must be in canonical order");

    let inserted = conn.execute(
        "INSERT INTO conversations (id, user_low, user_high, created_at)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(user_low, user_high) DO NOTHING",
        params![id.to_string(), low.to_string(), high.to_string(), ts(at)],
    )? > 0;

    let conversation = find_by_pair(conn, low, high)?
        .ok_or_else(|| anyhow!("conversation for pair {}/{} vanished after upsert", low, high))?;
    Ok((conversation, inserted))
}

pub fn find_by_pair(conn: &Connection, low: Uuid, high: Uuid) -> Result<Option<Conversation>> {
    let sql = format!(
        "SELECT {CONVERSATION_COLUMNS} FROM conversations WHERE user_low = ?1 AND user_high = ?2"
    );
    conn.query_row(&sql, params![low.to_string(), high.to_string()], row_to_conversation)
        .optional()
}

pub fn get_conversation(conn: &Connection, id: Uuid) -> Result<Option<Conversation>> {
    let sql = format!("SELECT {CONVERSATION_COLUMNS} FROM conversations WHERE id = ?1");
    conn.query_row(&sql, [id.to_string()], row_to_conversation).optional()
}

/// Set the preview and bump the receiver's unread counter in one statement.
pub fn record_inbound(
    conn: &Connection,
    id: Uuid,
    receiver_side: Side,
    preview: &str,
    at: DateTime<Utc>,
) -> Result<()> {
    let col = receiver_side.unread_column();
    let sql = format!(
        "UPDATE conversations
         SET last_message = ?1, last_message_at = ?2, {col} = {col} + 1
         WHERE id = ?3"
    );
    conn.execute(&sql, params![preview, ts(at), id.to_string()])?;
    Ok(())
}

pub fn reset_unread(conn: &Connection, id: Uuid, side: Side) -> Result<()> {
    let col = side.unread_column();
    let sql = format!("UPDATE conversations SET {col} = 0 WHERE id = ?1");
    conn.execute(&sql, [id.to_string()])?;
    Ok(())
}

/// Decrement by one, clamped at zero.
pub fn decrement_unread(conn: &Connection, id: Uuid, side: Side) -> Result<()> {
    let col = side.unread_column();
    let sql = format!("UPDATE conversations SET {col} = MAX({col} - 1, 0) WHERE id = ?1");
    conn.execute(&sql, [id.to_string()])?;
    Ok(())
}

pub fn list_for_participant(conn: &Connection, user_id: Uuid) -> Result<Vec<Conversation>> {
    let sql = format!(
        "SELECT {CONVERSATION_COLUMNS} FROM conversations
         WHERE user_low = ?1 OR user_high = ?1
         ORDER BY last_message_at IS NULL, last_message_at DESC, created_at DESC"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([user_id.to_string()], row_to_conversation)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn unread_total(conn: &Connection, user_id: Uuid) -> Result<i64> {
    let total: i64 = conn.query_row(
        "SELECT COALESCE(SUM(CASE WHEN user_low = ?1 THEN unread_low ELSE unread_high END), 0)
         FROM conversations
         WHERE user_low = ?1 OR user_high = ?1",
        [user_id.to_string()],
        |row| row.get(0),
    )?;
    Ok(total)
}

pub fn count_for_pair(conn: &Connection, low: Uuid, high: Uuid) -> Result<i64> {
    let n: i64 = conn.query_row(
        "SELECT COUNT(*) FROM conversations WHERE user_low = ?1 AND user_high = ?2",
        params![low.to_string(), high.to_string()],
        |row| row.get(0),
    )?;
    Ok(n)
}

fn row_to_conversation(row: &rusqlite::Row<'_>) -> rusqlite::Result<Conversation> {
    Ok(Conversation {
        id: uuid_at(row, 0)?,
        user_low: uuid_at(row, 1)?,
        user_high: uuid_at(row, 2)?,
        last_message: row.get(3)?,
        last_message_at: opt_ts_at(row, 4)?,
        unread_low: row.get(5)?,
        unread_high: row.get(6)?,
        created_at: ts_at(row, 7)?,
    })
}
