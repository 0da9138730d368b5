use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    NewMessage,
    ChatRequest,
    ChatRequestAccepted,
    ChatRequestRejected,
    GiftReceived,
    VipStatusChanged,
}

/// A typed event handed to the notification collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    /// User the event is addressed to.
    pub recipient: Uuid,
    pub kind: NotificationKind,
    /// User whose action caused the event.
    pub actor: Uuid,
    /// Message, chat request or conversation id, depending on `kind`.
    pub subject_id: Option<Uuid>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl Notification {
    pub fn new(
        kind: NotificationKind,
        recipient: Uuid,
        actor: Uuid,
        subject_id: Option<Uuid>,
    ) -> Self {
        Self {
            recipient,
            kind,
            actor,
            subject_id,
            timestamp: chrono::Utc::now(),
        }
    }
}

/// Events sent over the WebSocket gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayEvent {
    /// Server confirms the connection is authenticated
    Ready { user_id: Uuid },

    /// A core notification addressed to this user
    Notify(Notification),
}
