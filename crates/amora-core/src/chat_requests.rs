//! First-contact handshake.
//!
//! `pending` moves exactly once, to `accepted` or `rejected` by the
//! receiver, or to `expired` by the sweep. Overdue requests the sweep hasn't
//! reached yet are already hidden from listings and can't be answered.

use std::sync::Arc;

use chrono::{Duration, Utc};
use tracing::{debug, info};
use uuid::Uuid;

use amora_db::{Database, chat_requests as store, messages, users};
use amora_types::events::{Notification, NotificationKind};
use amora_types::models::{ChatRequest, ChatRequestStatus, Conversation, Message, MessageType};

use crate::blocks::BlockRegistry;
use crate::conversations::ConversationDirectory;
use crate::error::{CoreError, Result};
use crate::messages::preview;
use crate::notify::{NotificationSender, notify_best_effort};

pub const REQUEST_TTL_DAYS: i64 = 30;

/// What an accepted request turned into.
#[derive(Debug, Clone)]
pub struct AcceptedRequest {
    pub request: ChatRequest,
    pub conversation: Conversation,
    /// The request's first message, now the conversation's opening message.
    pub message: Message,
}

#[derive(Clone)]
pub struct ChatRequestWorkflow {
    db: Arc<Database>,
    blocks: BlockRegistry,
    directory: ConversationDirectory,
    notifier: Arc<dyn NotificationSender>,
}

impl ChatRequestWorkflow {
    pub fn new(
        db: Arc<Database>,
        blocks: BlockRegistry,
        directory: ConversationDirectory,
        notifier: Arc<dyn NotificationSender>,
    ) -> Self {
        Self {
            db,
            blocks,
            directory,
            notifier,
        }
    }

    pub fn create(
        &self,
        sender_id: Uuid,
        receiver_id: Uuid,
        first_message: &str,
    ) -> Result<ChatRequest> {
        if sender_id == receiver_id {
            return Err(CoreError::Validation("cannot send a chat request to yourself".into()));
        }
        let first_message = first_message.trim();
        if first_message.is_empty() {
            return Err(CoreError::Validation("first_message is required".into()));
        }

        let request = self.db.with_tx(|tx| {
            if !users::user_exists(tx, receiver_id)? {
                return Err(CoreError::NotFound("user"));
            }
            self.blocks.ensure_not_blocked_in(tx, sender_id, receiver_id)?;
            if self.directory.find_for_pair_in(tx, sender_id, receiver_id)?.is_some() {
                return Err(CoreError::Conflict(
                    "conversation already exists, send a message directly".into(),
                ));
            }

            let now = Utc::now();
            let stale = store::expire_stale_for_pair(tx, sender_id, receiver_id, now)?;
            if stale > 0 {
                debug!(sender = %sender_id, receiver = %receiver_id, "Expired stale request before re-sending");
            }
            if store::pending_exists(tx, sender_id, receiver_id, now)? {
                return Err(CoreError::Conflict("a chat request is already pending".into()));
            }

            let request = ChatRequest {
                id: Uuid::new_v4(),
                sender_id,
                receiver_id,
                first_message: first_message.to_string(),
                status: ChatRequestStatus::Pending,
                expires_at: now + Duration::days(REQUEST_TTL_DAYS),
                created_at: now,
                responded_at: None,
            };
            store::insert_request(tx, &request)?;
            Ok(request)
        })?;

        info!(request_id = %request.id, sender = %sender_id, receiver = %receiver_id, "Chat request created");
        notify_best_effort(
            self.notifier.as_ref(),
            Notification::new(
                NotificationKind::ChatRequest,
                receiver_id,
                sender_id,
                Some(request.id),
            ),
        );
        Ok(request)
    }

    /// Open the conversation and post the request's first message into it.
    pub fn accept(&self, request_id: Uuid, acting_user: Uuid) -> Result<AcceptedRequest> {
        let accepted = self.db.with_tx::<_, _, CoreError>(|tx| {
            let now = Utc::now();
            let request = self.load_answerable(tx, request_id, acting_user, now)?;
            self.blocks
                .ensure_not_blocked_in(tx, request.sender_id, request.receiver_id)?;

            let conversation =
                self.directory
                    .get_or_create_in(tx, request.sender_id, request.receiver_id)?;
            let message = Message {
                id: Uuid::new_v4(),
                conversation_id: Some(conversation.id),
                sender_id: request.sender_id,
                receiver_id: request.receiver_id,
                content: Some(request.first_message.clone()),
                media_url: None,
                message_type: MessageType::Text,
                is_read: false,
                read_at: None,
                is_deleted: false,
                deleted_at: None,
                credits_charged: 0,
                created_at: now,
            };
            messages::insert_message(tx, &message)?;
            self.directory.record_inbound_in(
                tx,
                &conversation,
                request.sender_id,
                request.receiver_id,
                &preview(&message),
                now,
            )?;

            self.transition(tx, &request, ChatRequestStatus::Accepted, now)?;
            Ok(AcceptedRequest {
                request: ChatRequest {
                    status: ChatRequestStatus::Accepted,
                    responded_at: Some(now),
                    ..request
                },
                conversation: self.directory.get_in(tx, conversation.id)?,
                message,
            })
        })?;

        let request = &accepted.request;
        info!(
            request_id = %request.id,
            conversation_id = %accepted.conversation.id,
            "Chat request accepted"
        );
        notify_best_effort(
            self.notifier.as_ref(),
            Notification::new(
                NotificationKind::ChatRequestAccepted,
                request.sender_id,
                request.receiver_id,
                Some(accepted.conversation.id),
            ),
        );
        Ok(accepted)
    }

    pub fn reject(&self, request_id: Uuid, acting_user: Uuid) -> Result<ChatRequest> {
        let request = self.db.with_tx::<_, _, CoreError>(|tx| {
            let now = Utc::now();
            let request = self.load_answerable(tx, request_id, acting_user, now)?;
            self.transition(tx, &request, ChatRequestStatus::Rejected, now)?;
            Ok(ChatRequest {
                status: ChatRequestStatus::Rejected,
                responded_at: Some(now),
                ..request
            })
        })?;

        info!(request_id = %request.id, "Chat request rejected");
        notify_best_effort(
            self.notifier.as_ref(),
            Notification::new(
                NotificationKind::ChatRequestRejected,
                request.sender_id,
                request.receiver_id,
                Some(request.id),
            ),
        );
        Ok(request)
    }

    /// Pending, unexpired requests addressed to the user, newest first.
    pub fn list_pending_for(&self, receiver_id: Uuid) -> Result<Vec<ChatRequest>> {
        let requests = self
            .db
            .with_conn(|conn| store::list_pending_for(conn, receiver_id, Utc::now()))?;
        debug!(receiver = %receiver_id, count = requests.len(), "Listed pending chat requests");
        Ok(requests)
    }

    /// Move every overdue pending request to `expired`. Returns how many moved.
    pub fn sweep_expired(&self) -> Result<usize> {
        let expired = self
            .db
            .with_conn_mut(|conn| store::expire_due(conn, Utc::now()))?;
        if expired > 0 {
            info!(expired, "Expired stale chat requests");
        }
        Ok(expired)
    }

    fn load_answerable(
        &self,
        conn: &rusqlite::Connection,
        request_id: Uuid,
        acting_user: Uuid,
        now: chrono::DateTime<Utc>,
    ) -> Result<ChatRequest> {
        let request =
            store::get_request(conn, request_id)?.ok_or(CoreError::NotFound("chat request"))?;
        if request.receiver_id != acting_user {
            return Err(CoreError::Forbidden(
                "only the receiver can answer a chat request".into(),
            ));
        }
        if request.status != ChatRequestStatus::Pending {
            return Err(CoreError::AlreadyProcessed(request.status));
        }
        if request.expires_at <= now {
            return Err(CoreError::AlreadyProcessed(ChatRequestStatus::Expired));
        }
        Ok(request)
    }

    fn transition(
        &self,
        conn: &rusqlite::Connection,
        request: &ChatRequest,
        to: ChatRequestStatus,
        now: chrono::DateTime<Utc>,
    ) -> Result<()> {
        if store::transition(conn, request.id, to, now)? {
            return Ok(());
        }
        let current = store::get_request(conn, request.id)?
            .map(|r| r.status)
            .unwrap_or(ChatRequestStatus::Expired);
        Err(CoreError::AlreadyProcessed(current))
    }
}
