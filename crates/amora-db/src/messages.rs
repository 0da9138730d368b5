use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, params};
use uuid::Uuid;

use amora_types::models::Message;

use crate::rows::{OptionalExt, label_at, opt_ts, opt_ts_at, opt_uuid_at, ts, ts_at, uuid_at};

const MESSAGE_COLUMNS: &str = "id, conversation_id, sender_id, receiver_id, content, media_url,
     message_type, is_read, read_at, is_deleted, deleted_at, credits_charged, created_at";

pub fn insert_message(conn: &Connection, message: &Message) -> Result<()> {
    conn.execute(
        "INSERT INTO messages (id, conversation_id, sender_id, receiver_id, content, media_url,
                               message_type, is_read, read_at, is_deleted, deleted_at,
                               credits_charged, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
        params![
            message.id.to_string(),
            message.conversation_id.map(|id| id.to_string()),
            message.sender_id.to_string(),
            message.receiver_id.to_string(),
            message.content,
            message.media_url,
            message.message_type.as_str(),
            message.is_read,
            opt_ts(message.read_at),
            message.is_deleted,
            opt_ts(message.deleted_at),
            message.credits_charged,
            ts(message.created_at),
        ],
    )?;
    Ok(())
}

pub fn get_message(conn: &Connection, id: Uuid) -> Result<Option<Message>> {
    let sql = format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = ?1");
    conn.query_row(&sql, [id.to_string()], row_to_message).optional()
}

/// Live messages of a conversation, oldest first; insertion order breaks ties.
pub fn list_for_conversation(conn: &Connection, conversation_id: Uuid) -> Result<Vec<Message>> {
    let sql = format!(
        "SELECT {MESSAGE_COLUMNS} FROM messages
         WHERE conversation_id = ?1 AND is_deleted = 0
         ORDER BY created_at ASC, rowid ASC"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([conversation_id.to_string()], row_to_message)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Flag every unread message addressed to `receiver` in the conversation.
pub fn mark_conversation_read(
    conn: &Connection,
    conversation_id: Uuid,
    receiver: Uuid,
    at: DateTime<Utc>,
) -> Result<usize> {
    let affected = conn.execute(
        "UPDATE messages SET is_read = 1, read_at = ?3
         WHERE conversation_id = ?1 AND receiver_id = ?2 AND is_read = 0",
        params![conversation_id.to_string(), receiver.to_string(), ts(at)],
    )?;
    Ok(affected)
}

/// Returns `true` only on the unread → read transition.
pub fn mark_read(conn: &Connection, id: Uuid, at: DateTime<Utc>) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE messages SET is_read = 1, read_at = ?2 WHERE id = ?1 AND is_read = 0",
        params![id.to_string(), ts(at)],
    )?;
    Ok(affected > 0)
}

/// Returns `true` only on the live → deleted transition.
pub fn soft_delete(conn: &Connection, id: Uuid, at: DateTime<Utc>) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE messages SET is_deleted = 1, deleted_at = ?2 WHERE id = ?1 AND is_deleted = 0",
        params![id.to_string(), ts(at)],
    )?;
    Ok(affected > 0)
}

fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<Message> {
    Ok(Message {
        id: uuid_at(row, 0)?,
        conversation_id: opt_uuid_at(row, 1)?,
        sender_id: uuid_at(row, 2)?,
        receiver_id: uuid_at(row, 3)?,
        content: row.get(4)?,
        media_url: row.get(5)?,
        message_type: label_at(row, 6)?,
        is_read: row.get(7)?,
        read_at: opt_ts_at(row, 8)?,
        is_deleted: row.get(9)?,
        deleted_at: opt_ts_at(row, 10)?,
        credits_charged: row.get(11)?,
        created_at: ts_at(row, 12)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversations;
    use crate::test_support::*;
    use amora_types::models::MessageType;

    fn text(conv: Uuid, from: Uuid, to: Uuid, body: &str, at: DateTime<Utc>) -> Message {
        Message {
            id: Uuid::new_v4(),
            conversation_id: Some(conv),
            sender_id: from,
            receiver_id: to,
            content: Some(body.to_string()),
            media_url: None,
            message_type: MessageType::Text,
            is_read: false,
            read_at: None,
            is_deleted: false,
            deleted_at: None,
            credits_charged: 0,
            created_at: at,
        }
    }

    #[test]
    fn equal_timestamps_keep_insertion_order() {
        let (_dir, db) = open_temp();
        let a = user(&db, 1);
        let b = user(&db, 2);
        let at = Utc::now();
        let (conv, _) = db
            .with_conn_mut(|conn| conversations::insert_or_get(conn, Uuid::new_v4(), a, b, at))
            .unwrap();

        let bodies = ["one", "two", "three"];
        db.with_conn_mut(|conn| {
            for body in bodies {
                insert_message(conn, &text(conv.id, a, b, body, at))?;
            }
            Ok(())
        })
        .unwrap();

        let listed = db.with_conn(|conn| list_for_conversation(conn, conv.id)).unwrap();
        let got: Vec<_> = listed.iter().filter_map(|m| m.content.as_deref()).collect();
        assert_eq!(got, bodies);
    }

    #[test]
    fn soft_delete_hides_but_keeps_row() {
        let (_dir, db) = open_temp();
        let a = user(&db, 1);
        let b = user(&db, 2);
        let (conv, _) = db
            .with_conn_mut(|conn| {
                conversations::insert_or_get(conn, Uuid::new_v4(), a, b, Utc::now())
            })
            .unwrap();
        let msg = text(conv.id, a, b, "oops", Utc::now());
        db.with_conn_mut(|conn| insert_message(conn, &msg)).unwrap();

        assert!(db.with_conn_mut(|conn| soft_delete(conn, msg.id, Utc::now())).unwrap());
        assert!(!db.with_conn_mut(|conn| soft_delete(conn, msg.id, Utc::now())).unwrap());

        assert!(db.with_conn(|conn| list_for_conversation(conn, conv.id)).unwrap().is_empty());
        let row = db.with_conn(|conn| get_message(conn, msg.id)).unwrap().unwrap();
        assert!(row.is_deleted);
        assert!(row.deleted_at.is_some());
    }
}
