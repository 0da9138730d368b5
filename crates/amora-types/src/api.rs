use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{
    Capability, ChatRequest, Conversation, CreditRelation, CreditTransaction,
    CreditTransactionType, Message, MessageType, Role,
};

// -- JWT Claims --

/// JWT claims shared across amora-api (REST middleware) and amora-gateway
/// (WebSocket upgrade). Tokens are issued by the login service; this
/// workspace only verifies them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    #[serde(default = "default_role")]
    pub role: Role,
    pub exp: usize,
}

fn default_role() -> Role {
    Role::User
}

/// The authenticated caller, as established by the auth middleware.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthContext {
    pub user_id: Uuid,
    pub role: Role,
}

impl AuthContext {
    pub fn can(&self, capability: Capability) -> bool {
        self.role.can(capability)
    }
}

impl From<&Claims> for AuthContext {
    fn from(claims: &Claims) -> Self {
        Self {
            user_id: claims.sub,
            role: claims.role,
        }
    }
}

// -- Chat requests --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateChatRequestRequest {
    pub receiver_id: Uuid,
    pub first_message: String,
}

/// The request after acceptance, the conversation it opened and its first message.
#[derive(Debug, Serialize)]
pub struct AcceptChatRequestResponse {
    pub request: ChatRequest,
    pub conversation: Conversation,
    pub message: Message,
}

#[derive(Debug, Serialize)]
pub struct SweepResponse {
    pub expired: usize,
}

// -- Messages --

/// Either `conversation_id` or `receiver_id` must be present.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SendMessageRequest {
    pub conversation_id: Option<Uuid>,
    pub receiver_id: Option<Uuid>,
    pub content: Option<String>,
    pub media_url: Option<String>,
    pub message_type: Option<MessageType>,
}

// -- Conversations --

#[derive(Debug, Serialize)]
pub struct ConversationSummary {
    #[serde(flatten)]
    pub conversation: Conversation,
    pub counterpart_id: Uuid,
    pub unread: i64,
}

#[derive(Debug, Serialize)]
pub struct ConversationListResponse {
    pub conversations: Vec<ConversationSummary>,
    pub unread_total: i64,
}

// -- Blocks --

#[derive(Debug, Serialize)]
pub struct BlockResponse {
    pub blocked: bool,
}

// -- Credits --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SpendCreditsRequest {
    pub amount: i64,
    pub description: String,
    pub relation: Option<CreditRelation>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GrantCreditsRequest {
    pub user_id: Uuid,
    pub amount: i64,
    #[serde(default = "default_grant_type")]
    pub transaction_type: CreditTransactionType,
    pub description: String,
    pub relation: Option<CreditRelation>,
}

fn default_grant_type() -> CreditTransactionType {
    CreditTransactionType::Refill
}

#[derive(Debug, Serialize)]
pub struct BalanceResponse {
    pub user_id: Uuid,
    pub credits: i64,
    pub total_credits_spent: i64,
    pub vip_active: bool,
}

#[derive(Debug, Serialize)]
pub struct HistoryPage {
    pub items: Vec<CreditTransaction>,
    pub page: u32,
    pub page_size: u32,
    pub total: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn claims_without_role_default_to_user() {
        let claims: Claims = serde_json::from_str(
            r#"{"sub":"00000000-0000-0000-0000-000000000007","exp":1}"#,
        )
        .unwrap();
        assert_eq!(claims.role, Role::User);
        assert_eq!(AuthContext::from(&claims).user_id, Uuid::from_u128(7));
    }

    #[test]
    fn grant_defaults_to_refill() {
        let req: GrantCreditsRequest = serde_json::from_str(
            r#"{"user_id":"00000000-0000-0000-0000-000000000001","amount":10,"description":"promo"}"#,
        )
        .unwrap();
        assert_eq!(req.transaction_type, CreditTransactionType::Refill);
        assert!(req.relation.is_none());
    }

    #[test]
    fn relation_is_a_tagged_record() {
        let req: SpendCreditsRequest = serde_json::from_str(
            r#"{"amount":5,"description":"gift","relation":{"kind":"gift","id":"00000000-0000-0000-0000-000000000009"}}"#,
        )
        .unwrap();
        let rel = req.relation.unwrap();
        assert_eq!(rel.kind, crate::models::RelationKind::Gift);
        assert_eq!(rel.id, Uuid::from_u128(9));
    }
}
