use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, params};
use uuid::Uuid;

use amora_types::models::{CreditRelation, CreditTransaction, WindowSpend};

use crate::rows::{label_at, opt_ts_at, opt_uuid_at, ts, ts_at, uuid_at};

const TRANSACTION_COLUMNS: &str =
    "id, user_id, type, amount, description, relation_kind, relation_id, created_at";

/// Append a ledger row. There are deliberately no update/delete helpers.
pub fn insert_transaction(conn: &Connection, tx: &CreditTransaction) -> Result<()> {
    conn.execute(
        "INSERT INTO credit_transactions (id, user_id, type, amount, description,
                                          relation_kind, relation_id, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            tx.id.to_string(),
            tx.user_id.to_string(),
            tx.transaction_type.as_str(),
            tx.amount,
            tx.description,
            tx.relation.map(|r| r.kind.as_str()),
            tx.relation.map(|r| r.id.to_string()),
            ts(tx.created_at),
        ],
    )?;
    Ok(())
}

/// Newest first.
pub fn list_for_user(
    conn: &Connection,
    user_id: Uuid,
    limit: u32,
    offset: u32,
) -> Result<Vec<CreditTransaction>> {
    let sql = format!(
        "SELECT {TRANSACTION_COLUMNS} FROM credit_transactions
         WHERE user_id = ?1
         ORDER BY created_at DESC, rowid DESC
         LIMIT ?2 OFFSET ?3"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params![user_id.to_string(), limit, offset], row_to_transaction)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn count_for_user(conn: &Connection, user_id: Uuid) -> Result<i64> {
    let n: i64 = conn.query_row(
        "SELECT COUNT(*) FROM credit_transactions WHERE user_id = ?1",
        [user_id.to_string()],
        |row| row.get(0),
    )?;
    Ok(n)
}

pub fn sum_for_user(conn: &Connection, user_id: Uuid) -> Result<i64> {
    let sum: i64 = conn.query_row(
        "SELECT COALESCE(SUM(amount), 0) FROM credit_transactions WHERE user_id = ?1",
        [user_id.to_string()],
        |row| row.get(0),
    )?;
    Ok(sum)
}

/// Total usage spend since `since`, plus the oldest usage row in that window.
pub fn window_spend(conn: &Connection, user_id: Uuid, since: DateTime<Utc>) -> Result<WindowSpend> {
    let spend = conn.query_row(
        "SELECT COALESCE(SUM(ABS(amount)), 0), MIN(created_at)
         FROM credit_transactions
         WHERE user_id = ?1 AND type = 'usage' AND amount < 0 AND created_at >= ?2",
        params![user_id.to_string(), ts(since)],
        |row| {
            Ok(WindowSpend {
                total: row.get(0)?,
                oldest_transaction_at: opt_ts_at(row, 1)?,
            })
        },
    )?;
    Ok(spend)
}

fn row_to_transaction(row: &rusqlite::Row<'_>) -> rusqlite::Result<CreditTransaction> {
    let relation_kind: Option<String> = row.get(5)?;
    let relation_id = opt_uuid_at(row, 6)?;
    let relation = match (relation_kind, relation_id) {
        (Some(kind), Some(id)) => Some(CreditRelation {
            kind: kind.parse().map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(
                    5,
                    rusqlite::types::Type::Text,
                    Box::new(e),
                )
            })?,
            id,
        }),
        _ => None,
    };

    Ok(CreditTransaction {
        id: uuid_at(row, 0)?,
        user_id: uuid_at(row, 1)?,
        transaction_type: label_at(row, 2)?,
        amount: row.get(3)?,
        description: row.get(4)?,
        relation,
        created_at: ts_at(row, 7)?,
    })
}
