use std::sync::Arc;

use chrono::Utc;
use rusqlite::Connection;
use tracing::info;
use uuid::Uuid;

use amora_db::{Database, blocks};
use amora_types::models::Block;

use crate::error::{CoreError, Result};

/// The symmetric block gate.
///
/// Rows are directional (the blocker owns them) but every check treats a
/// block in either direction as blocking both users.
#[derive(Clone)]
pub struct BlockRegistry {
    db: Arc<Database>,
}

impl BlockRegistry {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Idempotent.
    pub fn block(&self, blocker: Uuid, blocked: Uuid) -> Result<()> {
        if blocker == blocked {
            return Err(CoreError::Validation("cannot block yourself".into()));
        }
        self.db.with_tx(|tx| {
            if !amora_db::users::user_exists(tx, blocked)? {
                return Err(CoreError::NotFound("user"));
            }
            if blocks::upsert_block(tx, blocker, blocked, Utc::now())? {
                info!(%blocker, %blocked, "User blocked");
            }
            Ok(())
        })
    }

    /// Removes only the caller's own directional row; absent rows are fine.
    pub fn unblock(&self, blocker: Uuid, blocked: Uuid) -> Result<()> {
        let removed = self
            .db
            .with_conn_mut(|conn| blocks::delete_block(conn, blocker, blocked))?;
        if removed {
            info!(%blocker, %blocked, "User unblocked");
        }
        Ok(())
    }

    pub fn is_blocked_either_direction(&self, a: Uuid, b: Uuid) -> Result<bool> {
        Ok(self
            .db
            .with_conn(|conn| blocks::is_blocked_either_direction(conn, a, b))?)
    }

    /// Most recent first.
    pub fn list_blocked_by(&self, user_id: Uuid) -> Result<Vec<Block>> {
        Ok(self.db.with_conn(|conn| blocks::list_blocked_by(conn, user_id))?)
    }

    /// The gate other components run inside their own transaction.
    pub(crate) fn ensure_not_blocked_in(&self, conn: &Connection, a: Uuid, b: Uuid) -> Result<()> {
        if blocks::is_blocked_either_direction(conn, a, b)? {
            return Err(CoreError::blocked());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::Harness;

    #[test]
    fn block_rejects_self_and_is_idempotent() {
        let h = Harness::new();
        let a = h.user(1);
        let b = h.user(2);
        let registry = &h.services.blocks;

        assert!(matches!(registry.block(a, a), Err(CoreError::Validation(_))));

        registry.block(a, b).unwrap();
        registry.block(a, b).unwrap();
        assert_eq!(registry.list_blocked_by(a).unwrap().len(), 1);
        assert!(registry.is_blocked_either_direction(b, a).unwrap());
    }

    #[test]
    fn unblock_is_directional() {
        let h = Harness::new();
        let a = h.user(1);
        let b = h.user(2);
        let registry = &h.services.blocks;

        registry.block(a, b).unwrap();
        // b can't lift a's block
        registry.unblock(b, a).unwrap();
        assert!(registry.is_blocked_either_direction(a, b).unwrap());

        registry.unblock(a, b).unwrap();
        registry.unblock(a, b).unwrap();
        assert!(!registry.is_blocked_either_direction(a, b).unwrap());
    }

    #[test]
    fn blocking_unknown_user_is_not_found() {
        let h = Harness::new();
        let a = h.user(1);
        assert!(matches!(
            h.services.blocks.block(a, Uuid::from_u128(99)),
            Err(CoreError::NotFound("user"))
        ));
    }

    #[test]
    fn listing_is_newest_first() {
        let h = Harness::new();
        let a = h.user(1);
        let b = h.user(2);
        let c = h.user(3);
        h.services.blocks.block(a, b).unwrap();
        h.services.blocks.block(a, c).unwrap();

        let listed = h.services.blocks.list_blocked_by(a).unwrap();
        let ids: Vec<_> = listed.iter().map(|b| b.blocked_id).collect();
        assert_eq!(ids, vec![c, b]);
    }
}
