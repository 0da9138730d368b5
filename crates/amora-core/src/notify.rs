//! The notification collaborator as seen from the core.
//!
//! Components hand typed events to a [`NotificationSender`] after their
//! write has committed. Delivery is best-effort: a failed send is logged and
//! dropped, never surfaced to the caller.

use tracing::warn;

use amora_types::events::Notification;

pub trait NotificationSender: Send + Sync {
    /// Enqueue an event for delivery. Must not block on the recipient.
    fn send(&self, notification: Notification) -> anyhow::Result<()>;
}

pub(crate) fn notify_best_effort(sender: &dyn NotificationSender, notification: Notification) {
    let kind = notification.kind;
    let recipient = notification.recipient;
    if let Err(e) = sender.send(notification) {
        warn!(?kind, %recipient, error = %e, "Notification dispatch failed, discarding");
    }
}

/// Drops every event. Used when no transport is wired up.
pub struct NoopNotifier;

impl NotificationSender for NoopNotifier {
    fn send(&self, _notification: Notification) -> anyhow::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
pub(crate) use recording::RecordingNotifier;
