//! # amora-core
//!
//! The conversation & credit core: who may talk to whom, the single
//! conversation per pair of users, message read/delete state, the
//! first-contact chat request handshake, the credit ledger and the VIP
//! eligibility derived from it.
//!
//! Components are cheap to clone and receive their collaborators
//! (storage, notifications, configuration) at construction time.

pub mod auth;
pub mod blocks;
pub mod chat_requests;
pub mod config;
pub mod conversations;
pub mod credits;
pub mod error;
pub mod messages;
pub mod notify;
pub mod vip;

use std::sync::Arc;

use amora_db::Database;

pub use blocks::BlockRegistry;
pub use chat_requests::{AcceptedRequest, ChatRequestWorkflow};
pub use config::{ConfigProvider, StaticConfig};
pub use conversations::ConversationDirectory;
pub use credits::CreditLedger;
pub use error::{CoreError, Result};
pub use messages::{MessageStore, OutgoingMessage, Recipient};
pub use notify::{NoopNotifier, NotificationSender};
pub use vip::VipEligibilityEngine;

/// Every component, wired together once at start-up.
#[derive(Clone)]
pub struct Services {
    pub blocks: BlockRegistry,
    pub conversations: ConversationDirectory,
    pub messages: MessageStore,
    pub chat_requests: ChatRequestWorkflow,
    pub credits: CreditLedger,
    pub vip: VipEligibilityEngine,
}

impl Services {
    pub fn new(
        db: Arc<Database>,
        notifier: Arc<dyn NotificationSender>,
        config: Arc<dyn ConfigProvider>,
    ) -> Self {
        let blocks = BlockRegistry::new(db.clone());
        let conversations = ConversationDirectory::new(db.clone());
        let vip = VipEligibilityEngine::new(db.clone(), config.clone(), notifier.clone());
        let credits = CreditLedger::new(db.clone(), vip.clone());
        let messages = MessageStore::new(
            db.clone(),
            blocks.clone(),
            conversations.clone(),
            credits.clone(),
            config,
            notifier.clone(),
        );
        let chat_requests =
            ChatRequestWorkflow::new(db, blocks.clone(), conversations.clone(), notifier);

        Self {
            blocks,
            conversations,
            messages,
            chat_requests,
            credits,
            vip,
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;

    use amora_db::Database;
    use amora_types::models::{MessageType, Role, SubscriptionPlan};
    use uuid::Uuid;

    use crate::Services;
    use crate::config::StaticConfig;
    use crate::notify::RecordingNotifier;

    pub struct Harness {
        _dir: tempfile::TempDir,
        pub db: Arc<Database>,
        pub notifier: Arc<RecordingNotifier>,
        pub services: Services,
    }

    impl Harness {
        pub fn new() -> Self {
            Self::with(StaticConfig::default(), RecordingNotifier::new())
        }

        pub fn with(config: StaticConfig, notifier: RecordingNotifier) -> Self {
            let dir = tempfile::tempdir().unwrap();
            let db = Arc::new(Database::open(&dir.path().join("core.db")).unwrap());
            let notifier = Arc::new(notifier);
            let services = Services::new(db.clone(), notifier.clone(), Arc::new(config));
            Self {
                _dir: dir,
                db,
                notifier,
                services,
            }
        }

        pub fn user(&self, n: u128) -> Uuid {
            self.user_on(n, SubscriptionPlan::Free)
        }

        pub fn user_on(&self, n: u128, plan: SubscriptionPlan) -> Uuid {
            let id = Uuid::from_u128(n);
            self.db.ensure_user(id, Role::User, plan).unwrap();
            id
        }
    }

    pub fn config_with_cost(message_type: MessageType, cost: i64) -> StaticConfig {
        let mut config = StaticConfig::default();
        config.message_costs.insert(message_type, cost);
        config
    }
}
