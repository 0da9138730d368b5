use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Error returned when a stored enum label doesn't match any variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

impl fmt::Display for UnknownVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown {} '{}'", self.kind, self.value)
    }
}

impl std::error::Error for UnknownVariant {}

/// Implements `as_str`, `Display` and `FromStr` for a unit enum using the
/// same snake_case labels serde uses, so DB text and JSON always agree.
macro_rules! labelled_enum {
    ($ty:ident, $kind:literal, { $($variant:ident => $label:literal),+ $(,)? }) => {
        impl $ty {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $label,)+
                }
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $ty {
            type Err = UnknownVariant;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($label => Ok(Self::$variant),)+
                    other => Err(UnknownVariant {
                        kind: $kind,
                        value: other.to_string(),
                    }),
                }
            }
        }
    };
}

// -- Roles --

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Moderator,
    Admin,
}

labelled_enum!(Role, "role", {
    User => "user",
    Moderator => "moderator",
    Admin => "admin",
});

/// Privileged actions gated by role.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    /// Credit a user's balance outside of a purchase flow.
    GrantCredits,
    /// Trigger the chat-request expiry sweep on demand.
    SweepRequests,
    /// Read another user's credit ledger.
    ViewAnyLedger,
}

impl Role {
    /// The one place role → capability policy lives.
    pub fn can(self, capability: Capability) -> bool {
        match (self, capability) {
            (Role::Admin, _) => true,
            (Role::Moderator, Capability::SweepRequests | Capability::ViewAnyLedger) => true,
            (Role::Moderator, Capability::GrantCredits) => false,
            (Role::User, _) => false,
        }
    }
}

// -- Users --

/// Subscription tiers, ordered from lowest to highest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionPlan {
    Free,
    Basic,
    Premium,
    Platinum,
}

labelled_enum!(SubscriptionPlan, "subscription plan", {
    Free => "free",
    Basic => "basic",
    Premium => "premium",
    Platinum => "platinum",
});

impl SubscriptionPlan {
    pub fn is_premium_or_above(self) -> bool {
        self >= SubscriptionPlan::Premium
    }
}

/// The credit/VIP slice of a user account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserAccount {
    pub id: Uuid,
    pub role: Role,
    pub subscription_plan: SubscriptionPlan,
    pub credits: i64,
    pub total_credits_spent: i64,
    pub last_credit_spent_at: Option<DateTime<Utc>>,
    pub vip_active: bool,
    pub vip_expires_at: Option<DateTime<Utc>>,
}

// -- Conversations --

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: Uuid,
    /// Lower participant id of the pair.
    pub user_low: Uuid,
    /// Higher participant id of the pair.
    pub user_high: Uuid,
    pub last_message: Option<String>,
    pub last_message_at: Option<DateTime<Utc>>,
    pub unread_low: i64,
    pub unread_high: i64,
    pub created_at: DateTime<Utc>,
}

impl Conversation {
    pub fn has_participant(&self, user_id: Uuid) -> bool {
        self.user_low == user_id || self.user_high == user_id
    }

    /// The other side of the pair, if `user_id` is a participant.
    pub fn counterpart(&self, user_id: Uuid) -> Option<Uuid> {
        if self.user_low == user_id {
            Some(self.user_high)
        } else if self.user_high == user_id {
            Some(self.user_low)
        } else {
            None
        }
    }

    pub fn unread_for(&self, user_id: Uuid) -> i64 {
        if self.user_low == user_id {
            self.unread_low
        } else if self.user_high == user_id {
            self.unread_high
        } else {
            0
        }
    }
}

// -- Messages --

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    Text,
    Image,
    Video,
    Voice,
    Email,
    Intro,
    Gift,
}

labelled_enum!(MessageType, "message type", {
    Text => "text",
    Image => "image",
    Video => "video",
    Voice => "voice",
    Email => "email",
    Intro => "intro",
    Gift => "gift",
});

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    /// `None` only for rows written before conversations existed.
    pub conversation_id: Option<Uuid>,
    pub sender_id: Uuid,
    pub receiver_id: Uuid,
    pub content: Option<String>,
    pub media_url: Option<String>,
    pub message_type: MessageType,
    pub is_read: bool,
    pub read_at: Option<DateTime<Utc>>,
    pub is_deleted: bool,
    pub deleted_at: Option<DateTime<Utc>>,
    pub credits_charged: i64,
    pub created_at: DateTime<Utc>,
}

// -- Chat requests --

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatRequestStatus {
    Pending,
    Accepted,
    Rejected,
    Expired,
}

labelled_enum!(ChatRequestStatus, "chat request status", {
    Pending => "pending",
    Accepted => "accepted",
    Rejected => "rejected",
    Expired => "expired",
});

impl ChatRequestStatus {
    pub fn is_terminal(self) -> bool {
        self != ChatRequestStatus::Pending
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    pub id: Uuid,
    pub sender_id: Uuid,
    pub receiver_id: Uuid,
    pub first_message: String,
    pub status: ChatRequestStatus,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub responded_at: Option<DateTime<Utc>>,
}

// -- Blocks --

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Block {
    pub blocker_id: Uuid,
    pub blocked_id: Uuid,
    pub created_at: DateTime<Utc>,
}

// -- Credits --

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CreditTransactionType {
    Purchase,
    Subscription,
    Usage,
    Refund,
    Refill,
}

labelled_enum!(CreditTransactionType, "credit transaction type", {
    Purchase => "purchase",
    Subscription => "subscription",
    Usage => "usage",
    Refund => "refund",
    Refill => "refill",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationKind {
    Message,
    Gift,
    Subscription,
    Order,
}

labelled_enum!(RelationKind, "relation kind", {
    Message => "message",
    Gift => "gift",
    Subscription => "subscription",
    Order => "order",
});

/// What a ledger entry was spent on or credited for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditRelation {
    pub kind: RelationKind,
    pub id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreditTransaction {
    pub id: Uuid,
    pub user_id: Uuid,
    pub transaction_type: CreditTransactionType,
    /// Signed: negative for usage, positive for everything that adds credits.
    pub amount: i64,
    pub description: Option<String>,
    pub relation: Option<CreditRelation>,
    pub created_at: DateTime<Utc>,
}

// -- VIP --

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowSpend {
    pub total: i64,
    pub oldest_transaction_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VipProgress {
    pub window_spend: i64,
    pub threshold: i64,
    pub remaining: i64,
    pub vip_active: bool,
    pub vip_expires_at: Option<DateTime<Utc>>,
    /// When the oldest spend in the window rolls out of it.
    pub deadline: Option<DateTime<Utc>>,
}
