//! Append-only credit ledger plus the materialized balance on the user row.
//!
//! Every balance change and its ledger row are written in the same
//! transaction, so `SUM(amount)` over a user's rows always equals their
//! `credits` column.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use tracing::{debug, info};
use uuid::Uuid;

use amora_db::{Database, credits as ledger, users};
use amora_types::api::HistoryPage;
use amora_types::models::{CreditRelation, CreditTransaction, CreditTransactionType, UserAccount};

use crate::error::{CoreError, Result};
use crate::vip::{VipEligibilityEngine, VipStatus};

pub const HISTORY_PAGE_SIZE: u32 = 20;

#[derive(Clone)]
pub struct CreditLedger {
    db: Arc<Database>,
    vip: VipEligibilityEngine,
}

impl CreditLedger {
    pub fn new(db: Arc<Database>, vip: VipEligibilityEngine) -> Self {
        Self { db, vip }
    }

    /// Debit `amount` and log it as usage, or fail without writing anything.
    ///
    /// VIP eligibility is recomputed in the same transaction.
    pub fn spend(
        &self,
        user_id: Uuid,
        amount: i64,
        description: &str,
        relation: Option<CreditRelation>,
    ) -> Result<CreditTransaction> {
        let (entry, status) = self
            .db
            .with_tx(|tx| self.charge_in(tx, user_id, amount, description, relation, Utc::now()))?;
        self.announce_vip(user_id, &status);
        Ok(entry)
    }

    /// Purchase, subscription, refund and refill paths.
    pub fn credit(
        &self,
        user_id: Uuid,
        amount: i64,
        transaction_type: CreditTransactionType,
        description: &str,
        relation: Option<CreditRelation>,
    ) -> Result<CreditTransaction> {
        if amount <= 0 {
            return Err(CoreError::Validation("amount must be positive".into()));
        }
        if transaction_type == CreditTransactionType::Usage {
            return Err(CoreError::Validation(
                "usage is recorded through spend".into(),
            ));
        }

        let entry = self.db.with_tx(|tx| {
            if !users::add_credits(tx, user_id, amount)? {
                return Err(CoreError::NotFound("user"));
            }
            self.append_in(
                tx,
                user_id,
                transaction_type,
                amount,
                Some(description),
                relation,
                Utc::now(),
            )
        })?;

        info!(%user_id, amount, kind = %transaction_type, "Credits added");
        Ok(entry)
    }

    pub fn balance_of(&self, user_id: Uuid) -> Result<i64> {
        Ok(self.account(user_id)?.credits)
    }

    pub fn account(&self, user_id: Uuid) -> Result<UserAccount> {
        self.db
            .with_conn(|conn| users::get_user(conn, user_id))?
            .ok_or(CoreError::NotFound("user"))
    }

    /// One page of the ledger, newest first. Pages start at 1.
    pub fn history_of(&self, user_id: Uuid, page: u32) -> Result<HistoryPage> {
        let page = page.max(1);
        let offset = (page - 1).saturating_mul(HISTORY_PAGE_SIZE);
        let (items, total) = self.db.with_conn(|conn| {
            let items = ledger::list_for_user(conn, user_id, HISTORY_PAGE_SIZE, offset)?;
            let total = ledger::count_for_user(conn, user_id)?;
            Ok((items, total))
        })?;
        debug!(%user_id, page, total, "Loaded credit history");
        Ok(HistoryPage {
            items,
            page,
            page_size: HISTORY_PAGE_SIZE,
            total,
        })
    }

    /// Whether the ledger rows still add up to the stored balance.
    ///
    /// Both reads share one snapshot, so a spend committing in between
    /// can't produce a false mismatch.
    pub fn verify_consistency(&self, user_id: Uuid) -> Result<bool> {
        let (account, sum) = self.db.with_conn(|conn| {
            let snapshot = conn.unchecked_transaction()?;
            let account = users::get_user(&snapshot, user_id)?;
            let sum = ledger::sum_for_user(&snapshot, user_id)?;
            snapshot.finish()?;
            Ok((account, sum))
        })?;
        let account = account.ok_or(CoreError::NotFound("user"))?;
        Ok(account.credits == sum)
    }

    // -- Transaction-scoped building blocks --

    /// Spend plus the VIP recalculation it triggers, in the caller's transaction.
    pub(crate) fn charge_in(
        &self,
        conn: &Connection,
        user_id: Uuid,
        amount: i64,
        description: &str,
        relation: Option<CreditRelation>,
        at: DateTime<Utc>,
    ) -> Result<(CreditTransaction, VipStatus)> {
        let entry = self.spend_in(conn, user_id, amount, description, relation, at)?;
        let status = self.vip.recalculate_in(conn, user_id, at)?;
        Ok((entry, status))
    }

    /// Publish a VIP flip produced by [`charge_in`](Self::charge_in) once committed.
    pub(crate) fn announce_vip(&self, user_id: Uuid, status: &VipStatus) {
        self.vip.announce(user_id, status);
    }

    /// Pure log insert. Callers pair it with the matching balance update.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn append_in(
        &self,
        conn: &Connection,
        user_id: Uuid,
        transaction_type: CreditTransactionType,
        amount: i64,
        description: Option<&str>,
        relation: Option<CreditRelation>,
        at: DateTime<Utc>,
    ) -> Result<CreditTransaction> {
        let entry = CreditTransaction {
            id: Uuid::new_v4(),
            user_id,
            transaction_type,
            amount,
            description: description.map(str::to_string),
            relation,
            created_at: at,
        };
        ledger::insert_transaction(conn, &entry)?;
        Ok(entry)
    }

    /// Conditional debit plus its usage row. Leaves VIP to the caller.
    pub(crate) fn spend_in(
        &self,
        conn: &Connection,
        user_id: Uuid,
        amount: i64,
        description: &str,
        relation: Option<CreditRelation>,
        at: DateTime<Utc>,
    ) -> Result<CreditTransaction> {
        if amount <= 0 {
            return Err(CoreError::Validation("amount must be positive".into()));
        }
        if !users::try_debit(conn, user_id, amount, at)? {
            let account = users::get_user(conn, user_id)?.ok_or(CoreError::NotFound("user"))?;
            debug!(%user_id, balance = account.credits, amount, "Spend refused");
            return Err(CoreError::InsufficientCredits {
                balance: account.credits,
                required: amount,
            });
        }
        let entry = self.append_in(
            conn,
            user_id,
            CreditTransactionType::Usage,
            -amount,
            Some(description),
            relation,
            at,
        )?;
        info!(%user_id, amount, transaction_id = %entry.id, "Credits spent");
        Ok(entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::Harness;
    use amora_types::models::RelationKind;

    fn funded(h: &Harness, n: u128, amount: i64) -> Uuid {
        let u = h.user(n);
        h.services
            .credits
            .credit(u, amount, CreditTransactionType::Purchase, "starter pack", None)
            .unwrap();
        u
    }

    #[test]
    fn scenario_d_second_spend_is_refused() {
        let h = Harness::new();
        let u = funded(&h, 1, 50);
        let ledger = &h.services.credits;

        let first = ledger.spend(u, 30, "boost", None).unwrap();
        assert_eq!(first.amount, -30);
        assert_eq!(first.transaction_type, CreditTransactionType::Usage);
        assert_eq!(ledger.balance_of(u).unwrap(), 20);
        assert_eq!(ledger.history_of(u, 1).unwrap().total, 2);

        let err = ledger.spend(u, 30, "boost", None).unwrap_err();
        assert!(matches!(
            err,
            CoreError::InsufficientCredits {
                balance: 20,
                required: 30
            }
        ));
        assert_eq!(ledger.balance_of(u).unwrap(), 20);
        assert_eq!(ledger.history_of(u, 1).unwrap().total, 2);
        assert!(ledger.verify_consistency(u).unwrap());
    }

    #[test]
    fn spend_tracks_lifetime_totals() {
        let h = Harness::new();
        let u = funded(&h, 1, 100);
        h.services.credits.spend(u, 10, "a", None).unwrap();
        h.services.credits.spend(u, 15, "b", None).unwrap();

        let account = h.services.credits.account(u).unwrap();
        assert_eq!(account.credits, 75);
        assert_eq!(account.total_credits_spent, 25);
        assert!(account.last_credit_spent_at.is_some());
    }

    #[test]
    fn concurrent_spends_never_overdraw() {
        let h = Harness::new();
        let u = funded(&h, 1, 100);
        let ledger = h.services.credits.clone();

        let succeeded = std::thread::scope(|s| {
            let handles: Vec<_> = (0..12)
                .map(|_| {
                    let ledger = ledger.clone();
                    s.spawn(move || ledger.spend(u, 10, "race", None).is_ok())
                })
                .collect();
            handles
                .into_iter()
                .map(|t| t.join().unwrap())
                .filter(|ok| *ok)
                .count()
        });

        assert_eq!(succeeded, 10);
        assert_eq!(ledger.balance_of(u).unwrap(), 0);
        assert!(ledger.verify_consistency(u).unwrap());
    }

    #[test]
    fn consistency_holds_while_spends_commit() {
        let h = Harness::new();
        let u = funded(&h, 1, 200);
        let ledger = h.services.credits.clone();

        std::thread::scope(|s| {
            let spender = ledger.clone();
            s.spawn(move || {
                for _ in 0..200 {
                    spender.spend(u, 1, "drip", None).unwrap();
                }
            });
            for _ in 0..200 {
                assert!(ledger.verify_consistency(u).unwrap());
            }
        });

        assert_eq!(ledger.balance_of(u).unwrap(), 0);
        assert!(ledger.verify_consistency(u).unwrap());
    }

    #[test]
    fn non_positive_amounts_are_rejected() {
        let h = Harness::new();
        let u = funded(&h, 1, 10);
        assert!(matches!(
            h.services.credits.spend(u, 0, "x", None),
            Err(CoreError::Validation(_))
        ));
        assert!(matches!(
            h.services.credits.credit(u, -5, CreditTransactionType::Refund, "x", None),
            Err(CoreError::Validation(_))
        ));
        assert!(matches!(
            h.services.credits.credit(u, 5, CreditTransactionType::Usage, "x", None),
            Err(CoreError::Validation(_))
        ));
    }

    #[test]
    fn unknown_user_is_not_found() {
        let h = Harness::new();
        let ghost = Uuid::from_u128(404);
        assert!(matches!(
            h.services.credits.credit(ghost, 5, CreditTransactionType::Refill, "x", None),
            Err(CoreError::NotFound("user"))
        ));
        assert!(matches!(
            h.services.credits.spend(ghost, 5, "x", None),
            Err(CoreError::NotFound("user"))
        ));
    }

    #[test]
    fn history_pages_newest_first_with_relation() {
        let h = Harness::new();
        let u = funded(&h, 1, 1000);
        let gift = CreditRelation {
            kind: RelationKind::Gift,
            id: Uuid::from_u128(77),
        };
        for i in 0..24 {
            let relation = (i == 23).then_some(gift);
            h.services.credits.spend(u, 1, "tick", relation).unwrap();
        }

        let first = h.services.credits.history_of(u, 1).unwrap();
        assert_eq!(first.total, 25);
        assert_eq!(first.items.len(), HISTORY_PAGE_SIZE as usize);
        assert_eq!(first.items[0].relation, Some(gift));

        let second = h.services.credits.history_of(u, 2).unwrap();
        assert_eq!(second.items.len(), 5);
        let oldest = second.items.last().unwrap();
        assert_eq!(oldest.transaction_type, CreditTransactionType::Purchase);

        // Page 0 is treated as the first page.
        assert_eq!(h.services.credits.history_of(u, 0).unwrap().page, 1);
    }
}
