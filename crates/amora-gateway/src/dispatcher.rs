use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tokio::sync::mpsc;
use tracing::trace;
use uuid::Uuid;

use amora_core::NotificationSender;
use amora_types::events::Notification;

/// user_id -> (conn_id, sender) per open connection.
type UserChannels = HashMap<Uuid, Vec<(Uuid, mpsc::UnboundedSender<Notification>)>>;

/// Routes core notifications to the gateway connections of their recipient.
///
/// Each connection registers its own channel, so one user's backlog never
/// affects delivery to anyone else.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

struct DispatcherInner {
    /// A user may be connected from several devices.
    user_channels: RwLock<UserChannels>,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(DispatcherInner {
                user_channels: RwLock::new(HashMap::new()),
            }),
        }
    }

    /// Open a targeted channel for one connection of `user_id`.
    pub fn register(&self, user_id: Uuid) -> (Uuid, mpsc::UnboundedReceiver<Notification>) {
        let conn_id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();
        self.write().entry(user_id).or_default().push((conn_id, tx));
        (conn_id, rx)
    }

    /// Drop the channel registered under `conn_id`; other devices stay connected.
    pub fn unregister(&self, user_id: Uuid, conn_id: Uuid) {
        let mut channels = self.write();
        if let Some(senders) = channels.get_mut(&user_id) {
            senders.retain(|(id, _)| *id != conn_id);
            if senders.is_empty() {
                channels.remove(&user_id);
            }
        }
    }

    pub fn is_online(&self, user_id: Uuid) -> bool {
        self.read().contains_key(&user_id)
    }

    /// Total open gateway connections.
    pub fn connection_count(&self) -> usize {
        self.read().values().map(Vec::len).sum()
    }

    // The map is only touched without awaiting, so a poisoned lock still
    // holds a consistent map.
    fn read(&self) -> RwLockReadGuard<'_, UserChannels> {
        self.inner
            .user_channels
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, UserChannels> {
        self.inner
            .user_channels
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl NotificationSender for Dispatcher {
    fn send(&self, notification: Notification) -> anyhow::Result<()> {
        let channels = self.read();
        let Some(senders) = channels.get(&notification.recipient) else {
            // Offline recipients just miss the push.
            trace!(recipient = %notification.recipient, "Recipient offline, notification dropped");
            return Ok(());
        };
        for (_, tx) in senders {
            // A closed receiver belongs to a connection that is tearing down.
            let _ = tx.send(notification.clone());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use amora_types::events::NotificationKind;

    fn note(kind: NotificationKind, recipient: u128) -> Notification {
        Notification::new(kind, Uuid::from_u128(recipient), Uuid::from_u128(99), None)
    }

    #[tokio::test]
    async fn recipient_receives_sent_notifications() {
        let dispatcher = Dispatcher::new();
        let recipient = Uuid::from_u128(2);
        let (_, mut rx) = dispatcher.register(recipient);

        dispatcher.send(note(NotificationKind::NewMessage, 2)).unwrap();

        let got = rx.recv().await.unwrap();
        assert_eq!(got.recipient, recipient);
        assert_eq!(got.kind, NotificationKind::NewMessage);
    }

    #[tokio::test]
    async fn other_users_traffic_does_not_evict_pending_events() {
        let dispatcher = Dispatcher::new();
        let (_, mut alice_rx) = dispatcher.register(Uuid::from_u128(1));
        let (_, mut bob_rx) = dispatcher.register(Uuid::from_u128(2));

        dispatcher.send(note(NotificationKind::GiftReceived, 1)).unwrap();
        for _ in 0..5000 {
            dispatcher.send(note(NotificationKind::NewMessage, 2)).unwrap();
        }

        let got = alice_rx.try_recv().unwrap();
        assert_eq!(got.kind, NotificationKind::GiftReceived);
        assert!(alice_rx.try_recv().is_err());

        let mut bobs = 0;
        while bob_rx.try_recv().is_ok() {
            bobs += 1;
        }
        assert_eq!(bobs, 5000);
    }

    #[tokio::test]
    async fn every_device_of_the_recipient_gets_a_copy() {
        let dispatcher = Dispatcher::new();
        let user = Uuid::from_u128(3);
        let (_, mut phone) = dispatcher.register(user);
        let (_, mut laptop) = dispatcher.register(user);

        dispatcher.send(note(NotificationKind::ChatRequest, 3)).unwrap();

        assert_eq!(phone.recv().await.unwrap().kind, NotificationKind::ChatRequest);
        assert_eq!(laptop.recv().await.unwrap().kind, NotificationKind::ChatRequest);
    }

    #[tokio::test]
    async fn sending_to_offline_user_is_not_an_error() {
        let dispatcher = Dispatcher::new();
        assert!(dispatcher.send(note(NotificationKind::ChatRequest, 2)).is_ok());
    }

    #[tokio::test]
    async fn tracks_connections_per_user() {
        let dispatcher = Dispatcher::new();
        let user = Uuid::from_u128(7);

        let (first, _rx1) = dispatcher.register(user);
        let (second, _rx2) = dispatcher.register(user);
        assert_eq!(dispatcher.connection_count(), 2);

        dispatcher.unregister(user, first);
        assert!(dispatcher.is_online(user));
        dispatcher.unregister(user, second);
        assert!(!dispatcher.is_online(user));
        assert_eq!(dispatcher.connection_count(), 0);
    }
}
