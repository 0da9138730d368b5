//! The credit/VIP columns of the externally-owned user account.

use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, params};
use uuid::Uuid;

use amora_types::models::{Role, SubscriptionPlan, UserAccount};

use crate::Database;
use crate::rows::{OptionalExt, label_at, opt_ts, opt_ts_at, ts, uuid_at};

const USER_COLUMNS: &str = "id, role, subscription_plan, credits, total_credits_spent,
     last_credit_spent_at, vip_active, vip_expires_at";

/// Insert the user row if it doesn't exist yet. Existing rows are untouched.
pub fn ensure_user(conn: &Connection, id: Uuid, role: Role, plan: SubscriptionPlan) -> Result<()> {
    conn.execute(
        "INSERT INTO users (id, role, subscription_plan, created_at)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(id) DO NOTHING",
        params![id.to_string(), role.as_str(), plan.as_str(), ts(Utc::now())],
    )?;
    Ok(())
}

pub fn get_user(conn: &Connection, id: Uuid) -> Result<Option<UserAccount>> {
    let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1");
    conn.query_row(&sql, [id.to_string()], row_to_user).optional()
}

pub fn user_exists(conn: &Connection, id: Uuid) -> Result<bool> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM users WHERE id = ?1)",
        [id.to_string()],
        |row| row.get(0),
    )?;
    Ok(exists)
}

pub fn set_subscription_plan(conn: &Connection, id: Uuid, plan: SubscriptionPlan) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE users SET subscription_plan = ?1 WHERE id = ?2",
        params![plan.as_str(), id.to_string()],
    )?;
    Ok(affected > 0)
}

pub fn set_vip(
    conn: &Connection,
    id: Uuid,
    active: bool,
    expires_at: Option<DateTime<Utc>>,
) -> Result<()> {
    conn.execute(
        "UPDATE users SET vip_active = ?1, vip_expires_at = ?2 WHERE id = ?3",
        params![active, opt_ts(expires_at), id.to_string()],
    )?;
    Ok(())
}

/// Conditionally take `amount` off the balance in one statement.
///
/// Returns `false` (and changes nothing) when the balance is short or the
/// user doesn't exist.
pub fn try_debit(conn: &Connection, id: Uuid, amount: i64, at: DateTime<Utc>) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE users
         SET credits = credits - ?1,
             total_credits_spent = total_credits_spent + ?1,
             last_credit_spent_at = ?3
         WHERE id = ?2 AND credits >= ?1",
        params![amount, id.to_string(), ts(at)],
    )?;
    Ok(affected == 1)
}

pub fn add_credits(conn: &Connection, id: Uuid, amount: i64) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE users SET credits = credits + ?1 WHERE id = ?2",
        params![amount, id.to_string()],
    )?;
    Ok(affected == 1)
}

fn row_to_user(row: &rusqlite::Row<'_>) -> rusqlite::Result<UserAccount> {
    Ok(UserAccount {
        id: uuid_at(row, 0)?,
        role: label_at(row, 1)?,
        subscription_plan: label_at(row, 2)?,
        credits: row.get(3)?,
        total_credits_spent: row.get(4)?,
        last_credit_spent_at: opt_ts_at(row, 5)?,
        vip_active: row.get(6)?,
        vip_expires_at: opt_ts_at(row, 7)?,
    })
}

impl Database {
    pub fn ensure_user(&self, id: Uuid, role: Role, plan: SubscriptionPlan) -> Result<()> {
        self.with_conn_mut(|conn| ensure_user(conn, id, role, plan))
    }

    pub fn get_user(&self, id: Uuid) -> Result<Option<UserAccount>> {
        self.with_conn(|conn| get_user(conn, id))
    }

    pub fn set_subscription_plan(&self, id: Uuid, plan: SubscriptionPlan) -> Result<bool> {
        self.with_conn_mut(|conn| set_subscription_plan(conn, id, plan))
    }
}
