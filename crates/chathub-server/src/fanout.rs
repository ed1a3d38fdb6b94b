//! Pushes a newly stored message to the other online members of its chat.
//!
//! Runs after the sender's transaction has committed. Delivery is
//! at-most-once: members that are offline or closing get nothing and nothing
//! is kept for later.

use std::sync::Arc;

use chathub_core::Envelope;
use chathub_store::{ChatRepository, Storage};
use metrics::counter;
use tracing::{debug, error, warn};

use crate::dispatch::FanoutEvent;
use crate::metrics::{FANOUT_DELIVERED_TOTAL, FANOUT_SKIPPED_TOTAL};
use crate::registry::ConnectionRegistry;
use crate::websocket::connection::EnqueueOutcome;

/// What one fan-out did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FanoutReport {
    /// Members of the chat other than the sender.
    pub recipients: usize,
    /// Notifications queued.
    pub delivered: usize,
    /// Recipients offline, closing, or dropped as slow consumers.
    pub skipped: usize,
}

/// Deliver `event` to every other registered member of its chat.
pub async fn fan_out(
    registry: &ConnectionRegistry,
    storage: &Arc<dyn Storage>,
    event: FanoutEvent,
) -> FanoutReport {
    let chat = event.chat;
    let members = {
        let storage = Arc::clone(storage);
        tokio::task::spawn_blocking(move || -> Result<_, chathub_store::StoreError> {
            let uow = storage.begin()?;
            let ids = uow.chat_member_ids(chat)?;
            uow.commit()?;
            Ok(ids)
        })
        .await
    };
    let members = match members {
        Ok(Ok(ids)) => ids,
        Ok(Err(e)) => {
            error!(chat_id = %chat, error = %e, "fan-out membership lookup failed");
            return FanoutReport::default();
        }
        Err(e) => {
            error!(chat_id = %chat, error = %e, "fan-out membership task failed");
            return FanoutReport::default();
        }
    };

    let notification = Envelope::new_message_notification(event.sender, chat, event.message);
    let frame: Arc<str> = match notification.to_frame() {
        Ok(frame) => Arc::from(frame),
        Err(e) => {
            error!(chat_id = %chat, error = %e, "failed to serialize notification");
            return FanoutReport::default();
        }
    };

    let mut report = FanoutReport::default();
    for member in members.into_iter().filter(|id| *id != event.sender) {
        report.recipients += 1;
        let Some(session) = registry.lookup(member) else {
            report.skipped += 1;
            continue;
        };
        match session.enqueue_frame(Arc::clone(&frame)) {
            EnqueueOutcome::Queued => report.delivered += 1,
            outcome => {
                warn!(chat_id = %chat, user_id = %member, ?outcome, "notification not delivered");
                report.skipped += 1;
            }
        }
    }

    counter!(FANOUT_DELIVERED_TOTAL).increment(report.delivered as u64);
    counter!(FANOUT_SKIPPED_TOTAL).increment(report.skipped as u64);
    debug!(
        chat_id = %chat,
        sender = %event.sender,
        recipients = report.recipients,
        delivered = report.delivered,
        skipped = report.skipped,
        "fan-out complete"
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::handlers::test_helpers::*;
    use crate::websocket::connection::{CloseReason, SessionHandle};
    use chathub_core::{ChatId, MsgType, UserId};
    use serde_json::json;
    use tokio::sync::mpsc;
    use tokio_util::sync::CancellationToken;

    const DAVE: UserId = UserId::new(4);

    fn online(
        registry: &ConnectionRegistry,
        user: UserId,
        capacity: usize,
    ) -> (Arc<SessionHandle>, mpsc::Receiver<Arc<str>>) {
        let (handle, rx) = SessionHandle::new(user, capacity, CancellationToken::new());
        registry.register(Arc::clone(&handle)).unwrap();
        (handle, rx)
    }

    fn event(chat: ChatId) -> FanoutEvent {
        FanoutEvent {
            sender: ALICE,
            chat,
            message: json!({"id": 1, "chatId": chat.get(), "userId": ALICE.get(), "message": "hi"}),
        }
    }

    /// Chat with ALICE, BOB and DAVE; CAROL is online but not a member.
    fn setup() -> (Arc<dyn Storage>, ChatId) {
        let (db, chat) = seeded();
        let uow = db.begin().unwrap();
        uow.add_user_to_chat(chat, DAVE).unwrap();
        uow.commit().unwrap();
        (Arc::new(db), chat)
    }

    #[tokio::test]
    async fn delivers_to_other_online_members_only() {
        let (storage, chat) = setup();
        let registry = ConnectionRegistry::new(8);
        let (_a, mut rx_a) = online(&registry, ALICE, 8);
        let (_b, mut rx_b) = online(&registry, BOB, 8);
        let (_c, mut rx_c) = online(&registry, CAROL, 8);
        // DAVE is a member but offline.

        let report = fan_out(&registry, &storage, event(chat)).await;
        assert_eq!(
            report,
            FanoutReport {
                recipients: 2,
                delivered: 1,
                skipped: 1
            }
        );

        let frame = rx_b.try_recv().unwrap();
        let wire: serde_json::Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(wire["msgType"], MsgType::FetchMessage.as_wire());
        assert_eq!(wire["from"], ALICE.get());
        assert_eq!(wire["to"], chat.get());
        assert_eq!(wire["data"]["message"], "hi");

        assert!(rx_a.try_recv().is_err(), "sender must not be notified");
        assert!(rx_c.try_recv().is_err(), "non-member must not be notified");
    }

    #[tokio::test]
    async fn closing_member_is_skipped() {
        let (storage, chat) = setup();
        let registry = ConnectionRegistry::new(8);
        let (b, mut rx_b) = online(&registry, BOB, 8);
        let _ = b.close(CloseReason::PeerClosed);

        let report = fan_out(&registry, &storage, event(chat)).await;
        assert_eq!(report.delivered, 0);
        assert_eq!(report.skipped, 2);
        assert!(rx_b.try_recv().is_err());
    }

    #[tokio::test]
    async fn full_queue_closes_recipient_without_blocking() {
        let (storage, chat) = setup();
        let registry = ConnectionRegistry::new(8);
        let (b, _rx_b) = online(&registry, BOB, 1);
        let (_d, mut rx_d) = online(&registry, DAVE, 8);
        assert_eq!(b.enqueue_frame(Arc::from("filler")), EnqueueOutcome::Queued);

        let report = fan_out(&registry, &storage, event(chat)).await;
        assert_eq!(report.delivered, 1);
        assert_eq!(report.skipped, 1);
        assert_eq!(b.close_reason(), Some(CloseReason::SlowConsumer));
        assert!(rx_d.try_recv().is_ok());
    }

    #[tokio::test]
    async fn missing_chat_delivers_nothing() {
        let (storage, _) = setup();
        let registry = ConnectionRegistry::new(8);
        let (_b, mut rx_b) = online(&registry, BOB, 8);
        let report = fan_out(&registry, &storage, event(ChatId::new(999))).await;
        assert_eq!(report, FanoutReport::default());
        assert!(rx_b.try_recv().is_err());
    }
}
