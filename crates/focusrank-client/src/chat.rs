use tracing::{debug, warn};
use uuid::Uuid;

use focusrank_shared::protocol::{ChatEvent, SendMessageRequest};
use focusrank_shared::types::{SquadId, UserId};

use crate::error::ClientError;
use crate::timeline::{Reconciled, Timeline, TimelineEntry};
use crate::transport::ChatTransport;

/// One user's view of one squad's chat.
pub struct SquadChat<T> {
    transport: T,
    timeline: Timeline,
}

impl<T: ChatTransport> SquadChat<T> {
    pub fn new(transport: T, squad_id: SquadId, user_id: UserId) -> Self {
        Self::with_timeline(transport, Timeline::new(squad_id, user_id))
    }

    pub fn with_timeline(transport: T, timeline: Timeline) -> Self {
        Self {
            transport,
            timeline,
        }
    }

    pub fn entries(&self) -> &[TimelineEntry] {
        self.timeline.entries()
    }

    pub fn timeline(&self) -> &Timeline {
        &self.timeline
    }

    /// Send a message. It is visible as pending right away.
    ///
    /// Moderation and rate-limit rejections are returned as errors and leave
    /// no trace. A failed delivery is not an error here: the message stays in
    /// the timeline as failed and its client key is returned for a retry.
    pub async fn send(&mut self, content: impl Into<String>) -> Result<Uuid, ClientError> {
        let draft = self.timeline.compose(content);
        let client_key = draft.client_key;
        let request = self.timeline.submit(draft)?;
        self.deliver(client_key, request).await;
        Ok(client_key)
    }

    pub async fn retry(&mut self, client_key: Uuid) -> Result<(), ClientError> {
        let request = self.timeline.retry(client_key)?;
        self.deliver(client_key, request).await;
        Ok(())
    }

    /// Apply an event from the realtime stream.
    pub fn on_event(&mut self, event: ChatEvent) -> Reconciled {
        match event {
            ChatEvent::Insert { message } => self.timeline.reconcile(message),
        }
    }

    /// Merge the latest `limit` stored messages. Returns how many were new.
    pub async fn load_history(&mut self, limit: u32) -> Result<usize, ClientError> {
        let messages = self
            .transport
            .history(self.timeline.squad_id(), limit)
            .await?;
        let added = messages
            .into_iter()
            .map(|m| self.timeline.reconcile(m))
            .filter(|r| *r != Reconciled::Duplicate)
            .count();
        Ok(added)
    }

    async fn deliver(&mut self, client_key: Uuid, request: SendMessageRequest) {
        let squad_id = self.timeline.squad_id();
        match self.transport.post_message(squad_id, &request).await {
            Ok(stored) => {
                let outcome = self.timeline.reconcile(stored);
                debug!(client_key = %client_key, ?outcome, "Send acknowledged");
            }
            Err(e) => {
                warn!(client_key = %client_key, error = %e, "Send failed");
                let reason = match &e {
                    ClientError::Server {
                        reason: Some(reason),
                        ..
                    } => reason.clone(),
                    other => other.to_string(),
                };
                if let Err(e) = self.timeline.fail(client_key, reason) {
                    debug!(client_key = %client_key, error = %e, "No timeline entry to mark failed");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timeline::DeliveryState;
    use chrono::Utc;
    use focusrank_shared::moderation::ModerationGate;
    use focusrank_shared::protocol::StoredMessage;
    use focusrank_shared::ratelimit::RateLimiter;
    use futures::future::BoxFuture;
    use futures::FutureExt;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    /// Stores messages in memory; can be switched to fail every post.
    #[derive(Default)]
    struct FakeTransport {
        down: AtomicBool,
        stored: Mutex<Vec<StoredMessage>>,
    }

    impl ChatTransport for FakeTransport {
        fn post_message<'a>(
            &'a self,
            squad_id: SquadId,
            request: &'a SendMessageRequest,
        ) -> BoxFuture<'a, Result<StoredMessage, ClientError>> {
            let result = if self.down.load(Ordering::SeqCst) {
                Err(ClientError::Server {
                    status: 500,
                    error: "Storage error".into(),
                    reason: None,
                })
            } else {
                let message = StoredMessage {
                    id: Uuid::new_v4(),
                    squad_id,
                    user_id: request.user_id.clone(),
                    content: request.content.clone(),
                    client_key: request.client_key,
                    created_at: Utc::now(),
                };
                self.stored.lock().unwrap().push(message.clone());
                Ok(message)
            };
            futures::future::ready(result).boxed()
        }

        fn history(&self, _squad_id: SquadId, _limit: u32) -> BoxFuture<'_, Result<Vec<StoredMessage>, ClientError>> {
            let messages = self.stored.lock().unwrap().clone();
            futures::future::ready(Ok(messages)).boxed()
        }
    }

    fn chat() -> SquadChat<FakeTransport> {
        let timeline = Timeline::with_limits(
            SquadId::new(),
            UserId::from("alice"),
            ModerationGate::default(),
            RateLimiter::new(1.0, 5.0),
        );
        SquadChat::with_timeline(FakeTransport::default(), timeline)
    }

    #[tokio::test]
    async fn test_send_confirms_and_realtime_echo_is_ignored() {
        let mut chat = chat();
        let key = chat.send("hello squad").await.unwrap();
        assert_eq!(chat.timeline().get(key).unwrap().state, DeliveryState::Confirmed);

        let echoed = chat.transport.stored.lock().unwrap()[0].clone();
        assert_eq!(
            chat.on_event(ChatEvent::Insert { message: echoed }),
            Reconciled::Duplicate
        );
        assert_eq!(chat.entries().len(), 1);
    }

    #[tokio::test]
    async fn test_failed_send_stays_visible_and_retries() {
        let mut chat = chat();
        chat.transport.down.store(true, Ordering::SeqCst);

        let key = chat.send("are you there").await.unwrap();
        let entry = chat.timeline().get(key).unwrap();
        assert_eq!(entry.state, DeliveryState::Failed);
        assert!(entry.error.as_deref().unwrap().contains("Storage error"));

        chat.transport.down.store(false, Ordering::SeqCst);
        chat.retry(key).await.unwrap();
        assert_eq!(chat.timeline().get(key).unwrap().state, DeliveryState::Confirmed);
        assert_eq!(chat.entries().len(), 1);
    }

    #[tokio::test]
    async fn test_failed_delivery_for_unknown_key_changes_nothing() {
        let mut chat = chat();
        let key = chat.send("kept").await.unwrap();
        chat.transport.down.store(true, Ordering::SeqCst);

        let request = SendMessageRequest {
            user_id: UserId::from("alice"),
            content: "never composed here".into(),
            client_key: Some(Uuid::new_v4()),
        };
        chat.deliver(request.client_key.unwrap(), request).await;

        assert_eq!(chat.entries().len(), 1);
        assert_eq!(chat.timeline().get(key).unwrap().state, DeliveryState::Confirmed);
    }

    #[tokio::test]
    async fn test_rejections_leave_no_entry() {
        let mut chat = chat();
        assert!(matches!(chat.send("").await, Err(ClientError::Rejected(_))));
        assert!(chat.entries().is_empty());
        assert!(chat.transport.stored.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_history_merges_without_duplicates() {
        let mut chat = chat();
        chat.send("mine").await.unwrap();
        chat.transport.stored.lock().unwrap().push(StoredMessage {
            id: Uuid::new_v4(),
            squad_id: chat.timeline().squad_id(),
            user_id: UserId::from("bob"),
            content: "theirs".into(),
            client_key: None,
            created_at: Utc::now(),
        });

        assert_eq!(chat.load_history(50).await.unwrap(), 1);
        assert_eq!(chat.load_history(50).await.unwrap(), 0);
        assert_eq!(chat.entries().len(), 2);
    }
}
