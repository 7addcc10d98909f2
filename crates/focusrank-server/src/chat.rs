//! Squad chat: membership, moderation, rate limiting, persistence and
//! realtime fan-out, in that order.

use std::time::Duration;

use chrono::{DateTime, SubsecRound, Utc};
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, info};
use uuid::Uuid;

use focusrank_shared::error::Rejection;
use focusrank_shared::moderation::ModerationGate;
use focusrank_shared::protocol::{ChatEvent, SendMessageRequest, StoredMessage};
use focusrank_shared::ratelimit::RateLimiter;
use focusrank_shared::types::{SquadId, UserId};

use crate::db::{with_db, SharedDb};
use crate::error::ServerError;
use crate::realtime::Fanout;

const CHAT_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("{user} is not a member of squad {squad}")]
    NotMember { user: UserId, squad: SquadId },

    #[error("Message rejected: {0}")]
    Rejected(#[from] Rejection),

    #[error("Slow down: too many messages")]
    RateLimited,

    #[error(transparent)]
    Server(#[from] ServerError),
}

impl From<ChatError> for ServerError {
    fn from(err: ChatError) -> Self {
        match err {
            ChatError::NotMember { user, squad } => {
                ServerError::Forbidden(format!("{user} is not a member of squad {squad}"))
            }
            ChatError::Rejected(rejection) => ServerError::Rejected {
                reason: rejection.to_string(),
            },
            ChatError::RateLimited => ServerError::RateLimited,
            ChatError::Server(e) => e,
        }
    }
}

/// Outcome of a successful send.
#[derive(Debug, Clone)]
pub struct Sent {
    pub message: StoredMessage,
    /// False when the client key was already stored and the earlier row was
    /// returned instead.
    pub created: bool,
}

pub struct ChatService {
    db: SharedDb,
    gate: ModerationGate,
    limiter: RateLimiter,
    fanout: Fanout<SquadId, ChatEvent>,
}

impl ChatService {
    pub fn new(db: SharedDb, gate: ModerationGate, limiter: RateLimiter) -> Self {
        Self {
            db,
            gate,
            limiter,
            fanout: Fanout::new(CHAT_CHANNEL_CAPACITY),
        }
    }

    pub fn send(&self, squad_id: SquadId, request: SendMessageRequest) -> Result<Sent, ChatError> {
        let SendMessageRequest {
            user_id,
            content,
            client_key,
        } = request;

        let is_member = with_db(&self.db, |db| db.is_squad_member(squad_id, &user_id))?;
        if !is_member {
            return Err(ChatError::NotMember {
                user: user_id,
                squad: squad_id,
            });
        }

        self.gate.check(&content)?;

        // A resend of something this sender already stored here is answered
        // without spending a token.
        if let Some(key) = client_key {
            let existing =
                with_db(&self.db, |db| db.get_message_by_client_key(squad_id, &user_id, key))?;
            if let Some(existing) = existing {
                debug!(squad = %squad_id, client_key = %key, "Duplicate send, returning stored row");
                return Ok(Sent {
                    message: existing,
                    created: false,
                });
            }
        }

        if !self.limiter.allow(user_id.as_str()) {
            debug!(user = %user_id, squad = %squad_id, "Chat send rate limited");
            return Err(ChatError::RateLimited);
        }

        let message = StoredMessage {
            id: Uuid::new_v4(),
            squad_id,
            user_id,
            content,
            client_key,
            // Microseconds, as stored; realtime and history rows compare equal.
            created_at: Utc::now().trunc_subsecs(6),
        };

        let (message, created) = with_db(&self.db, |db| db.insert_chat_message(&message))?;

        if created {
            let delivered = self.fanout.publish(
                &squad_id,
                ChatEvent::Insert {
                    message: message.clone(),
                },
            );
            info!(
                squad = %squad_id,
                user = %message.user_id,
                id = %message.id,
                delivered,
                "Chat message sent"
            );
        }

        Ok(Sent { message, created })
    }

    pub fn history(
        &self,
        squad_id: SquadId,
        limit: u32,
        before: Option<DateTime<Utc>>,
    ) -> Result<Vec<StoredMessage>, ChatError> {
        Ok(with_db(&self.db, |db| db.messages_for_squad(squad_id, limit, before))?)
    }

    pub fn subscribe(&self, squad_id: SquadId) -> broadcast::Receiver<ChatEvent> {
        self.fanout.subscribe(&squad_id)
    }

    /// Drop idle rate buckets and unused squad channels.
    pub fn purge_idle(&self, max_idle: Duration) -> usize {
        let buckets = self.limiter.purge_stale(max_idle);
        let channels = self.fanout.prune();
        if buckets > 0 || channels > 0 {
            debug!(buckets, channels, "Purged idle chat state");
        }
        buckets
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::shared;
    use axum::http::StatusCode;
    use axum::response::IntoResponse;
    use focusrank_store::Database;

    fn service() -> (ChatService, SquadId) {
        let db = shared(Database::open_in_memory().unwrap());
        let squad = SquadId::new();
        with_db(&db, |db| db.add_squad_member(squad, &UserId::from("alice"))).unwrap();
        let chat = ChatService::new(db, ModerationGate::default(), RateLimiter::new(1.0, 5.0));
        (chat, squad)
    }

    fn request(user: &str, content: &str) -> SendMessageRequest {
        SendMessageRequest {
            user_id: UserId::from(user),
            content: content.to_string(),
            client_key: None,
        }
    }

    #[tokio::test]
    async fn test_send_persists_and_publishes() {
        let (chat, squad) = service();
        let mut rx = chat.subscribe(squad);

        let key = Uuid::new_v4();
        let sent = chat
            .send(
                squad,
                SendMessageRequest {
                    client_key: Some(key),
                    ..request("alice", "morning all")
                },
            )
            .unwrap();
        assert!(sent.created);
        assert_eq!(sent.message.client_key, Some(key));

        let ChatEvent::Insert { message } = rx.recv().await.unwrap();
        assert_eq!(message, sent.message);

        let history = chat.history(squad, 50, None).unwrap();
        assert_eq!(history, vec![sent.message]);
    }

    #[test]
    fn test_rejections_in_order() {
        let (chat, squad) = service();

        let err = chat.send(squad, request("mallory", "hi")).unwrap_err();
        assert!(matches!(err, ChatError::NotMember { .. }));

        let err = chat.send(squad, request("alice", "   ")).unwrap_err();
        assert!(matches!(err, ChatError::Rejected(Rejection::Empty)));

        let err = chat.send(squad, request("alice", "free SPAM here")).unwrap_err();
        assert!(matches!(err, ChatError::Rejected(Rejection::Blocked { .. })));

        let err = chat.send(squad, request("alice", &"x".repeat(6000))).unwrap_err();
        assert!(matches!(err, ChatError::Rejected(Rejection::TooLong { .. })));

        // None of the rejected sends spent a token or left a row.
        for i in 0..5 {
            chat.send(squad, request("alice", &format!("msg {i}"))).unwrap();
        }
        let err = chat.send(squad, request("alice", "one too many")).unwrap_err();
        assert!(matches!(err, ChatError::RateLimited));
        assert_eq!(chat.history(squad, 50, None).unwrap().len(), 5);
    }

    #[test]
    fn test_duplicate_client_key_returns_stored_row() {
        let (chat, squad) = service();
        let key = Uuid::new_v4();
        let send = || {
            chat.send(
                squad,
                SendMessageRequest {
                    client_key: Some(key),
                    ..request("alice", "once")
                },
            )
        };

        let first = send().unwrap();
        for _ in 0..10 {
            let again = send().unwrap();
            assert!(!again.created);
            assert_eq!(again.message.id, first.message.id);
        }
        assert_eq!(chat.history(squad, 50, None).unwrap().len(), 1);
    }

    #[test]
    fn test_client_key_reuse_across_senders_creates_new_row() {
        let (chat, s1) = service();
        let s2 = SquadId::new();
        with_db(&chat.db, |db| db.add_squad_member(s2, &UserId::from("bob"))).unwrap();
        let key = Uuid::new_v4();

        let secret = chat
            .send(
                s1,
                SendMessageRequest {
                    client_key: Some(key),
                    ..request("alice", "secret plan")
                },
            )
            .unwrap();

        let sent = chat
            .send(
                s2,
                SendMessageRequest {
                    client_key: Some(key),
                    ..request("bob", "hi")
                },
            )
            .unwrap();
        assert!(sent.created);
        assert_ne!(sent.message.id, secret.message.id);
        assert_eq!(sent.message.squad_id, s2);
        assert_eq!(sent.message.user_id, UserId::from("bob"));
        assert_eq!(sent.message.content, "hi");
        assert_eq!(chat.history(s1, 50, None).unwrap(), vec![secret.message]);
    }

    #[test]
    fn test_errors_map_to_statuses() {
        let cases = [
            (
                ChatError::NotMember {
                    user: UserId::from("u"),
                    squad: SquadId::new(),
                },
                StatusCode::FORBIDDEN,
            ),
            (ChatError::Rejected(Rejection::Empty), StatusCode::UNPROCESSABLE_ENTITY),
            (ChatError::RateLimited, StatusCode::TOO_MANY_REQUESTS),
        ];
        for (err, status) in cases {
            assert_eq!(ServerError::from(err).into_response().status(), status);
        }
    }
}
