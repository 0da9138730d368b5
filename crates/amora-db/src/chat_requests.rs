use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, params};
use uuid::Uuid;

use amora_types::models::{ChatRequest, ChatRequestStatus};

use crate::rows::{OptionalExt, label_at, opt_ts, opt_ts_at, ts, ts_at, uuid_at};

const REQUEST_COLUMNS: &str =
    "id, sender_id, receiver_id, first_message, status, expires_at, created_at, responded_at";

pub fn insert_request(conn: &Connection, request: &ChatRequest) -> Result<()> {
    conn.execute(
        "INSERT INTO chat_requests (id, sender_id, receiver_id, first_message, status,
                                    expires_at, created_at, responded_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            request.id.to_string(),
            request.sender_id.to_string(),
            request.receiver_id.to_string(),
            request.first_message,
            request.status.as_str(),
            ts(request.expires_at),
            ts(request.created_at),
            opt_ts(request.responded_at),
        ],
    )?;
    Ok(())
}

pub fn get_request(conn: &Connection, id: Uuid) -> Result<Option<ChatRequest>> {
    let sql = format!("SELECT {REQUEST_COLUMNS} FROM chat_requests WHERE id = ?1");
    conn.query_row(&sql, [id.to_string()], row_to_request).optional()
}

/// A live pending request from `sender` to `receiver`. Overdue rows the
/// sweep hasn't reached yet don't count.
pub fn pending_exists(
    conn: &Connection,
    sender: Uuid,
    receiver: Uuid,
    now: DateTime<Utc>,
) -> Result<bool> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(
            SELECT 1 FROM chat_requests
            WHERE sender_id = ?1 AND receiver_id = ?2 AND status = 'pending'
              AND expires_at > ?3
         )",
        params![sender.to_string(), receiver.to_string(), ts(now)],
        |row| row.get(0),
    )?;
    Ok(exists)
}

/// Expire an overdue pending request for one ordered pair, freeing the slot
/// held by the partial unique index.
pub fn expire_stale_for_pair(
    conn: &Connection,
    sender: Uuid,
    receiver: Uuid,
    now: DateTime<Utc>,
) -> Result<usize> {
    let affected = conn.execute(
        "UPDATE chat_requests SET status = 'expired'
         WHERE sender_id = ?1 AND receiver_id = ?2 AND status = 'pending'
           AND expires_at <= ?3",
        params![sender.to_string(), receiver.to_string(), ts(now)],
    )?;
    Ok(affected)
}

/// Move a pending request to `to`. Returns `false` if it was no longer
/// pending, which is how a lost race or a repeated call shows up.
pub fn transition(
    conn: &Connection,
    id: Uuid,
    to: ChatRequestStatus,
    at: DateTime<Utc>,
) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE chat_requests SET status = ?2, responded_at = ?3
         WHERE id = ?1 AND status = 'pending'",
        params![id.to_string(), to.as_str(), ts(at)],
    )?;
    Ok(affected > 0)
}

pub fn list_pending_for(
    conn: &Connection,
    receiver: Uuid,
    now: DateTime<Utc>,
) -> Result<Vec<ChatRequest>> {
    let sql = format!(
        "SELECT {REQUEST_COLUMNS} FROM chat_requests
         WHERE receiver_id = ?1 AND status = 'pending' AND expires_at > ?2
         ORDER BY created_at DESC, rowid DESC"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params![receiver.to_string(), ts(now)], row_to_request)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Flip every pending request whose expiry has passed to `expired`.
pub fn expire_due(conn: &Connection, now: DateTime<Utc>) -> Result<usize> {
    let affected = conn.execute(
        "UPDATE chat_requests SET status = 'expired'
         WHERE status = 'pending' AND expires_at <= ?1",
        [ts(now)],
    )?;
    Ok(affected)
}

fn row_to_request(row: &rusqlite::Row<'_>) -> rusqlite::Result<ChatRequest> {
    Ok(ChatRequest {
        id: uuid_at(row, 0)?,
        sender_id: uuid_at(row, 1)?,
        receiver_id: uuid_at(row, 2)?,
        first_message: row.get(3)?,
        status: label_at(row, 4)?,
        expires_at: ts_at(row, 5)?,
        created_at: ts_at(row, 6)?,
        responded_at: opt_ts_at(row, 7)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::*;
    use chrono::Duration;

    fn pending(from: Uuid, to: Uuid, created_at: DateTime<Utc>) -> ChatRequest {
        ChatRequest {
            id: Uuid::new_v4(),
            sender_id: from,
            receiver_id: to,
            first_message: "hi".into(),
            status: ChatRequestStatus::Pending,
            expires_at: created_at + Duration::days(30),
            created_at,
            responded_at: None,
        }
    }

    #[test]
    fn only_one_pending_per_ordered_pair() {
        let (_dir, db) = open_temp();
        let a = user(&db, 1);
        let b = user(&db, 2);

        db.with_conn_mut(|conn| insert_request(conn, &pending(a, b, Utc::now())))
            .unwrap();
        let dup = db.with_conn_mut(|conn| insert_request(conn, &pending(a, b, Utc::now())));
        assert!(dup.is_err());

        // The reverse direction is a different ordered pair.
        db.with_conn_mut(|conn| insert_request(conn, &pending(b, a, Utc::now())))
            .unwrap();
    }

    #[test]
    fn transition_is_one_shot() {
        let (_dir, db) = open_temp();
        let a = user(&db, 1);
        let b = user(&db, 2);
        let req = pending(a, b, Utc::now());
        db.with_conn_mut(|conn| insert_request(conn, &req)).unwrap();

        let now = Utc::now();
        assert!(db
            .with_conn_mut(|conn| transition(conn, req.id, ChatRequestStatus::Accepted, now))
            .unwrap());
        assert!(!db
            .with_conn_mut(|conn| transition(conn, req.id, ChatRequestStatus::Rejected, now))
            .unwrap());

        let stored = db.with_conn(|conn| get_request(conn, req.id)).unwrap().unwrap();
        assert_eq!(stored.status, ChatRequestStatus::Accepted);
        assert!(stored.responded_at.is_some());
    }

    #[test]
    fn expiry_sweep_only_touches_overdue_pending() {
        let (_dir, db) = open_temp();
        let a = user(&db, 1);
        let b = user(&db, 2);
        let c = user(&db, 3);

        let old = pending(a, b, Utc::now() - Duration::days(31));
        let fresh = pending(c, b, Utc::now());
        db.with_conn_mut(|conn| {
            insert_request(conn, &old)?;
            insert_request(conn, &fresh)
        })
        .unwrap();

        let listed = db.with_conn(|conn| list_pending_for(conn, b, Utc::now())).unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, fresh.id);

        assert_eq!(db.with_conn_mut(|conn| expire_due(conn, Utc::now())).unwrap(), 1);
        assert_eq!(db.with_conn_mut(|conn| expire_due(conn, Utc::now())).unwrap(), 0);

        let stored = db.with_conn(|conn| get_request(conn, old.id)).unwrap().unwrap();
        assert_eq!(stored.status, ChatRequestStatus::Expired);
    }

    #[test]
    fn stale_pending_frees_the_pair() {
        let (_dir, db) = open_temp();
        let a = user(&db, 1);
        let b = user(&db, 2);
        let old = pending(a, b, Utc::now() - Duration::days(31));
        db.with_conn_mut(|conn| insert_request(conn, &old)).unwrap();

        let now = Utc::now();
        assert!(!db.with_conn(|conn| pending_exists(conn, a, b, now)).unwrap());
        assert_eq!(
            db.with_conn_mut(|conn| expire_stale_for_pair(conn, a, b, now)).unwrap(),
            1
        );
        db.with_conn_mut(|conn| insert_request(conn, &pending(a, b, now)))
            .unwrap();
        assert!(db.with_conn(|conn| pending_exists(conn, a, b, now)).unwrap());
    }
}
