use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info};
use uuid::Uuid;

use amora_db::{Database, messages as store, users};
use amora_types::events::{Notification, NotificationKind};
use amora_types::models::{CreditRelation, Message, MessageType, RelationKind};

use crate::blocks::BlockRegistry;
use crate::config::ConfigProvider;
use crate::conversations::ConversationDirectory;
use crate::credits::CreditLedger;
use crate::error::{CoreError, Result};
use crate::notify::{NotificationSender, notify_best_effort};

const PREVIEW_MAX_CHARS: usize = 100;

/// Where a message is going: straight to a user, or into a known conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recipient {
    User(Uuid),
    /// `receiver`, when given, must be the sender's counterpart.
    Conversation { id: Uuid, receiver: Option<Uuid> },
}

impl Recipient {
    pub fn from_parts(conversation_id: Option<Uuid>, receiver_id: Option<Uuid>) -> Result<Self> {
        match (conversation_id, receiver_id) {
            (Some(id), receiver) => Ok(Recipient::Conversation { id, receiver }),
            (None, Some(user)) => Ok(Recipient::User(user)),
            (None, None) => Err(CoreError::Validation(
                "conversation_id or receiver_id is required".into(),
            )),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct OutgoingMessage {
    pub content: Option<String>,
    pub media_url: Option<String>,
    pub message_type: Option<MessageType>,
}

impl OutgoingMessage {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            ..Self::default()
        }
    }
}

#[derive(Clone)]
pub struct MessageStore {
    db: Arc<Database>,
    blocks: BlockRegistry,
    directory: ConversationDirectory,
    ledger: CreditLedger,
    config: Arc<dyn ConfigProvider>,
    notifier: Arc<dyn NotificationSender>,
}

impl MessageStore {
    pub fn new(
        db: Arc<Database>,
        blocks: BlockRegistry,
        directory: ConversationDirectory,
        ledger: CreditLedger,
        config: Arc<dyn ConfigProvider>,
        notifier: Arc<dyn NotificationSender>,
    ) -> Self {
        Self {
            db,
            blocks,
            directory,
            ledger,
            config,
            notifier,
        }
    }

    /// Send a message, creating the conversation on first contact.
    ///
    /// When the message type carries a cost the sender is charged in the
    /// same transaction; a short balance fails the send with nothing written.
    pub fn send(
        &self,
        sender_id: Uuid,
        recipient: Recipient,
        outgoing: OutgoingMessage,
    ) -> Result<Message> {
        let content = outgoing.content.filter(|c| !c.trim().is_empty());
        let media_url = outgoing.media_url.filter(|m| !m.trim().is_empty());
        if content.is_none() && media_url.is_none() {
            return Err(CoreError::Validation(
                "a message needs content or media".into(),
            ));
        }
        let message_type = outgoing.message_type.unwrap_or(if content.is_some() {
            MessageType::Text
        } else {
            MessageType::Image
        });
        let cost = self.config.message_cost(message_type);

        let (message, vip_status) = self.db.with_tx(|tx| {
            let now = Utc::now();

            let (conversation, receiver_id) = match recipient {
                Recipient::User(receiver_id) => {
                    if receiver_id == sender_id {
                        return Err(CoreError::Validation("cannot message yourself".into()));
                    }
                    if !users::user_exists(tx, receiver_id)? {
                        return Err(CoreError::NotFound("user"));
                    }
                    self.blocks.ensure_not_blocked_in(tx, sender_id, receiver_id)?;
                    let conversation = self.directory.get_or_create_in(tx, sender_id, receiver_id)?;
                    (conversation, receiver_id)
                }
                Recipient::Conversation { id, receiver } => {
                    let conversation = self.directory.get_in(tx, id)?;
                    let counterpart = conversation
                        .counterpart(sender_id)
                        .ok_or_else(CoreError::not_participant)?;
                    if receiver.is_some_and(|r| r != counterpart) {
                        return Err(CoreError::Validation(
                            "receiver is not the other participant".into(),
                        ));
                    }
                    self.blocks.ensure_not_blocked_in(tx, sender_id, counterpart)?;
                    (conversation, counterpart)
                }
            };

            let id = Uuid::new_v4();
            let mut vip_status = None;
            if cost > 0 {
                let kind = if message_type == MessageType::Gift {
                    RelationKind::Gift
                } else {
                    RelationKind::Message
                };
                let (_, status) = self.ledger.charge_in(
                    tx,
                    sender_id,
                    cost,
                    &format!("{} message", message_type),
                    Some(CreditRelation { kind, id }),
                    now,
                )?;
                vip_status = Some(status);
            }

            let message = Message {
                id,
                conversation_id: Some(conversation.id),
                sender_id,
                receiver_id,
                content,
                media_url,
                message_type,
                is_read: false,
                read_at: None,
                is_deleted: false,
                deleted_at: None,
                credits_charged: cost.max(0),
                created_at: now,
            };
            store::insert_message(tx, &message)?;
            self.directory.record_inbound_in(
                tx,
                &conversation,
                sender_id,
                receiver_id,
                &preview(&message),
                now,
            )?;
            Ok((message, vip_status))
        })?;

        info!(
            message_id = %message.id,
            conversation_id = ?message.conversation_id,
            sender = %sender_id,
            receiver = %message.receiver_id,
            kind = %message.message_type,
            charged = message.credits_charged,
            "Message sent"
        );

        if let Some(status) = vip_status {
            self.ledger.announce_vip(sender_id, &status);
        }
        self.announce(&message);
        Ok(message)
    }

    /// Live messages, oldest first. Reading marks everything addressed to
    /// the requester as read and clears their unread counter.
    pub fn list_for_conversation(
        &self,
        conversation_id: Uuid,
        requester: Uuid,
    ) -> Result<Vec<Message>> {
        let (messages, marked) = self.db.with_tx(|tx| {
            let conversation = self.directory.get_in(tx, conversation_id)?;
            if !conversation.has_participant(requester) {
                return Err(CoreError::not_participant());
            }
            let marked = store::mark_conversation_read(tx, conversation.id, requester, Utc::now())?;
            self.directory.reset_unread_in(tx, &conversation, requester)?;
            let messages = store::list_for_conversation(tx, conversation.id)?;
            Ok((messages, marked))
        })?;
        debug!(%conversation_id, %requester, count = messages.len(), marked, "Listed messages");
        Ok(messages)
    }

    /// Idempotent: only the unread → read flip touches the counter.
    pub fn mark_read(&self, message_id: Uuid, requester: Uuid) -> Result<Message> {
        self.db.with_tx(|tx| {
            let message =
                store::get_message(tx, message_id)?.ok_or(CoreError::NotFound("message"))?;
            if message.receiver_id != requester {
                return Err(CoreError::Forbidden(
                    "only the receiver can mark a message read".into(),
                ));
            }
            let now = Utc::now();
            if !store::mark_read(tx, message_id, now)? {
                return Ok(message);
            }
            if let Some(conversation_id) = message.conversation_id {
                let conversation = self.directory.get_in(tx, conversation_id)?;
                self.directory.decrement_unread_in(tx, &conversation, requester)?;
            }
            debug!(%message_id, %requester, "Message marked read");
            Ok(Message {
                is_read: true,
                read_at: Some(now),
                ..message
            })
        })
    }

    /// Hide a message from listings. The row stays; unread counters don't move.
    pub fn soft_delete(&self, message_id: Uuid, requester: Uuid) -> Result<()> {
        self.db.with_tx(|tx| {
            let message =
                store::get_message(tx, message_id)?.ok_or(CoreError::NotFound("message"))?;
            if message.sender_id != requester && message.receiver_id != requester {
                return Err(CoreError::Forbidden(
                    "only the sender or receiver can delete a message".into(),
                ));
            }
            if store::soft_delete(tx, message_id, Utc::now())? {
                info!(%message_id, %requester, "Message deleted");
            }
            Ok(())
        })
    }

    fn announce(&self, message: &Message) {
        notify_best_effort(
            self.notifier.as_ref(),
            Notification::new(
                NotificationKind::NewMessage,
                message.receiver_id,
                message.sender_id,
                Some(message.id),
            ),
        );
        if message.message_type == MessageType::Gift {
            notify_best_effort(
                self.notifier.as_ref(),
                Notification::new(
                    NotificationKind::GiftReceived,
                    message.receiver_id,
                    message.sender_id,
                    Some(message.id),
                ),
            );
        }
    }
}

/// Conversation list preview: the text, or `[type]` for media-only messages.
pub(crate) fn preview(message: &Message) -> String {
    match message.content.as_deref() {
        Some(text) => text.chars().take(PREVIEW_MAX_CHARS).collect(),
        None => format!("[{}]", message.message_type),
    }
}
