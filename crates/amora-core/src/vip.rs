//! VIP membership derived from a rolling 30-day usage spend.
//!
//! Eligibility is recomputed from the ledger on every spend rather than
//! kept as a running total. A recomputation that finds the user below the
//! threshold revokes VIP immediately, even if the stored expiry is still in
//! the future.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use rusqlite::Connection;
use tracing::{debug, info};
use uuid::Uuid;

use amora_db::{Database, credits, users};
use amora_types::events::{Notification, NotificationKind};
use amora_types::models::{VipProgress, WindowSpend};

use crate::config::ConfigProvider;
use crate::error::{CoreError, Result};
use crate::notify::{NotificationSender, notify_best_effort};

/// Trailing window over which usage spend is summed.
pub const SPEND_WINDOW_DAYS: i64 = 30;
/// How long a grant lasts from the recalculation that produced it.
pub const VIP_GRANT_DAYS: i64 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VipStatus {
    pub active: bool,
    pub expires_at: Option<DateTime<Utc>>,
    /// Whether `active` flipped in this recalculation.
    pub changed: bool,
}

#[derive(Clone)]
pub struct VipEligibilityEngine {
    db: Arc<Database>,
    config: Arc<dyn ConfigProvider>,
    notifier: Arc<dyn NotificationSender>,
}

impl VipEligibilityEngine {
    pub fn new(
        db: Arc<Database>,
        config: Arc<dyn ConfigProvider>,
        notifier: Arc<dyn NotificationSender>,
    ) -> Self {
        Self {
            db,
            config,
            notifier,
        }
    }

    pub fn window_spend(&self, user_id: Uuid) -> Result<WindowSpend> {
        let since = Utc::now() - Duration::days(SPEND_WINDOW_DAYS);
        Ok(self
            .db
            .with_conn(|conn| credits::window_spend(conn, user_id, since))?)
    }

    pub fn recalculate(&self, user_id: Uuid) -> Result<VipStatus> {
        let status = self
            .db
            .with_tx(|tx| self.recalculate_in(tx, user_id, Utc::now()))?;
        self.announce(user_id, &status);
        Ok(status)
    }

    /// Read-only view for progress UIs.
    pub fn progress(&self, user_id: Uuid) -> Result<VipProgress> {
        let now = Utc::now();
        let since = now - Duration::days(SPEND_WINDOW_DAYS);
        let (account, spend) = self.db.with_conn(|conn| {
            let account = users::get_user(conn, user_id)?;
            let spend = credits::window_spend(conn, user_id, since)?;
            Ok((account, spend))
        })?;
        let account = account.ok_or(CoreError::NotFound("user"))?;
        let threshold = self.config.vip_spend_threshold();

        debug!(%user_id, spend = spend.total, threshold, "VIP progress");

        Ok(VipProgress {
            window_spend: spend.total,
            threshold,
            remaining: (threshold - spend.total).max(0),
            // A grant nobody has recalculated since it lapsed still reads as lapsed.
            vip_active: account.vip_active && account.vip_expires_at.is_some_and(|e| e > now),
            vip_expires_at: account.vip_expires_at,
            deadline: spend
                .oldest_transaction_at
                .map(|oldest| oldest + Duration::days(SPEND_WINDOW_DAYS)),
        })
    }

    /// Recompute and persist the flag inside the caller's transaction, so it
    /// sees spends that haven't committed yet.
    pub(crate) fn recalculate_in(
        &self,
        conn: &Connection,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<VipStatus> {
        let account = users::get_user(conn, user_id)?.ok_or(CoreError::NotFound("user"))?;
        let spend = credits::window_spend(conn, user_id, now - Duration::days(SPEND_WINDOW_DAYS))?;
        let threshold = self.config.vip_spend_threshold();

        let eligible = account.subscription_plan.is_premium_or_above() && spend.total >= threshold;
        let expires_at = eligible.then(|| now + Duration::days(VIP_GRANT_DAYS));
        users::set_vip(conn, user_id, eligible, expires_at)?;

        let changed = eligible != account.vip_active;
        if changed {
            info!(
                %user_id,
                active = eligible,
                spend = spend.total,
                threshold,
                plan = %account.subscription_plan,
                "VIP status changed"
            );
        }

        Ok(VipStatus {
            active: eligible,
            expires_at,
            changed,
        })
    }

    /// Tell the user about a flip. Call only after the write has committed.
    pub(crate) fn announce(&self, user_id: Uuid, status: &VipStatus) {
        if status.changed {
            notify_best_effort(
                self.notifier.as_ref(),
                Notification::new(NotificationKind::VipStatusChanged, user_id, user_id, None),
            );
        }
    }
}
