use std::sync::Arc;

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use tracing::{debug, info};
use uuid::Uuid;

use amora_db::Database;
use amora_db::conversations::{self as store, Side};
use amora_types::api::ConversationSummary;
use amora_types::models::Conversation;

use crate::error::{CoreError, Result};

/// Order a pair so the same two users always map to one storage key.
pub fn canonical_pair(a: Uuid, b: Uuid) -> (Uuid, Uuid) {
    if a <= b { (a, b) } else { (b, a) }
}

/// Owns the conversation rows: one per unordered pair of users, plus the
/// last-message preview and the per-side unread counters.
#[derive(Clone)]
pub struct ConversationDirectory {
    db: Arc<Database>,
}

impl ConversationDirectory {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Safe under concurrent calls for the same pair, in either order.
    pub fn get_or_create(&self, a: Uuid, b: Uuid) -> Result<Conversation> {
        self.db.with_tx(|tx| self.get_or_create_in(tx, a, b))
    }

    pub fn get(&self, conversation_id: Uuid) -> Result<Conversation> {
        self.db
            .with_conn(|conn| store::get_conversation(conn, conversation_id))?
            .ok_or(CoreError::NotFound("conversation"))
    }

    pub fn record_inbound_message(
        &self,
        conversation: &Conversation,
        sender: Uuid,
        receiver: Uuid,
        preview: &str,
    ) -> Result<()> {
        self.db.with_tx(|tx| {
            self.record_inbound_in(tx, conversation, sender, receiver, preview, Utc::now())
        })
    }

    pub fn reset_unread(&self, conversation: &Conversation, user_id: Uuid) -> Result<()> {
        self.db.with_tx(|tx| self.reset_unread_in(tx, conversation, user_id))
    }

    /// Newest activity first.
    pub fn find_by_participant(&self, user_id: Uuid) -> Result<Vec<Conversation>> {
        let conversations = self
            .db
            .with_conn(|conn| store::list_for_participant(conn, user_id))?;
        debug!(%user_id, count = conversations.len(), "Listed conversations");
        Ok(conversations)
    }

    /// [`find_by_participant`](Self::find_by_participant) from the caller's point of view.
    pub fn summaries_for(&self, user_id: Uuid) -> Result<Vec<ConversationSummary>> {
        Ok(self
            .find_by_participant(user_id)?
            .into_iter()
            .filter_map(|conversation| {
                let counterpart_id = conversation.counterpart(user_id)?;
                let unread = conversation.unread_for(user_id);
                Some(ConversationSummary {
                    conversation,
                    counterpart_id,
                    unread,
                })
            })
            .collect())
    }

    pub fn unread_total(&self, user_id: Uuid) -> Result<i64> {
        Ok(self.db.with_conn(|conn| store::unread_total(conn, user_id))?)
    }

    // -- Transaction-scoped building blocks for sibling components --

    pub(crate) fn get_or_create_in(
        &self,
        conn: &Connection,
        a: Uuid,
        b: Uuid,
    ) -> Result<Conversation> {
        if a == b {
            return Err(CoreError::Validation(
                "a conversation needs two different users".into(),
            ));
        }
        let (low, high) = canonical_pair(a, b);
        let (conversation, inserted) =
            store::insert_or_get(conn, Uuid::new_v4(), low, high, Utc::now())?;
        if inserted {
            info!(conversation_id = %conversation.id, %low, %high, "Conversation created");
        }
        Ok(conversation)
    }

    pub(crate) fn find_for_pair_in(
        &self,
        conn: &Connection,
        a: Uuid,
        b: Uuid,
    ) -> Result<Option<Conversation>> {
        let (low, high) = canonical_pair(a, b);
        Ok(store::find_by_pair(conn, low, high)?)
    }

    pub(crate) fn get_in(&self, conn: &Connection, conversation_id: Uuid) -> Result<Conversation> {
        store::get_conversation(conn, conversation_id)?.ok_or(CoreError::NotFound("conversation"))
    }

    pub(crate) fn record_inbound_in(
        &self,
        conn: &Connection,
        conversation: &Conversation,
        sender: Uuid,
        receiver: Uuid,
        preview: &str,
        at: DateTime<Utc>,
    ) -> Result<()> {
        if Side::of(conversation, sender).is_none() {
            return Err(CoreError::not_participant());
        }
        let receiver_side =
            Side::of(conversation, receiver).ok_or_else(CoreError::not_participant)?;
        store::record_inbound(conn, conversation.id, receiver_side, preview, at)?;
        Ok(())
    }

    pub(crate) fn reset_unread_in(
        &self,
        conn: &Connection,
        conversation: &Conversation,
        user_id: Uuid,
    ) -> Result<()> {
        let side = Side::of(conversation, user_id).ok_or_else(CoreError::not_participant)?;
        store::reset_unread(conn, conversation.id, side)?;
        Ok(())
    }

    pub(crate) fn decrement_unread_in(
        &self,
        conn: &Connection,
        conversation: &Conversation,
        user_id: Uuid,
    ) -> Result<()> {
        let side = Side::of(conversation, user_id).ok_or_else(CoreError::not_participant)?;
        store::decrement_unread(conn, conversation.id, side)?;
        Ok(())
    }
}
