//! Optimistic message timeline for one squad.
//!
//! A message moves `Composed -> Pending -> Confirmed`, or `Pending -> Failed`
//! when the send fails. A failed message stays visible and can be retried,
//! which puts it back to `Pending` under the same client key.
//!
//! Server rows are matched to local messages by the client key they echo
//! back. Rows without a key fall back to matching the oldest pending message
//! with the same author and content. Rows already in the timeline are
//! ignored, since realtime delivery may repeat them.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

use focusrank_shared::moderation::ModerationGate;
use focusrank_shared::protocol::{SendMessageRequest, StoredMessage};
use focusrank_shared::ratelimit::RateLimiter;
use focusrank_shared::types::{SquadId, UserId};

use crate::error::ClientError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryState {
    Pending,
    Confirmed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TimelineEntry {
    /// Set for every message composed locally; remote rows carry whatever
    /// key their sender attached, if any.
    pub client_key: Option<Uuid>,
    /// Server id, known once the message is confirmed.
    pub id: Option<Uuid>,
    pub user_id: UserId,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub state: DeliveryState,
    pub error: Option<String>,
}

/// A composed message that has not been submitted yet. Not shown anywhere.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Draft {
    pub client_key: Uuid,
    pub content: String,
}

/// What [`Timeline::reconcile`] did with a server row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconciled {
    /// A local message was confirmed.
    Confirmed,
    /// The row is new to this timeline and was appended.
    Appended,
    /// The row was already in the timeline.
    Duplicate,
}

pub struct Timeline {
    squad_id: SquadId,
    user_id: UserId,
    gate: ModerationGate,
    limiter: RateLimiter,
    entries: Vec<TimelineEntry>,
}

impl Timeline {
    pub fn new(squad_id: SquadId, user_id: UserId) -> Self {
        Self::with_limits(squad_id, user_id, ModerationGate::default(), RateLimiter::default())
    }

    pub fn with_limits(
        squad_id: SquadId,
        user_id: UserId,
        gate: ModerationGate,
        limiter: RateLimiter,
    ) -> Self {
        Self {
            squad_id,
            user_id,
            gate,
            limiter,
            entries: Vec::new(),
        }
    }

    pub fn squad_id(&self) -> SquadId {
        self.squad_id
    }

    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    pub fn entries(&self) -> &[TimelineEntry] {
        &self.entries
    }

    /// One of our own messages, by the key it was composed with.
    pub fn get(&self, client_key: Uuid) -> Option<&TimelineEntry> {
        self.entries
            .iter()
            .find(|e| e.user_id == self.user_id && e.client_key == Some(client_key))
    }

    pub fn compose(&self, content: impl Into<String>) -> Draft {
        Draft {
            client_key: Uuid::new_v4(),
            content: content.into(),
        }
    }

    /// Check a draft and, if it passes, show it as pending.
    ///
    /// Returns the request to send. A rejected draft never enters the
    /// timeline.
    pub fn submit(&mut self, draft: Draft) -> Result<SendMessageRequest, ClientError> {
        self.gate.check(&draft.content)?;
        if !self.limiter.allow(self.user_id.as_str()) {
            return Err(ClientError::RateLimited);
        }

        self.entries.push(TimelineEntry {
            client_key: Some(draft.client_key),
            id: None,
            user_id: self.user_id.clone(),
            content: draft.content.clone(),
            created_at: Utc::now(),
            state: DeliveryState::Pending,
            error: None,
        });

        Ok(SendMessageRequest {
            user_id: self.user_id.clone(),
            content: draft.content,
            client_key: Some(draft.client_key),
        })
    }

    /// Fold a server row into the timeline, from either the send response or
    /// the realtime stream.
    pub fn reconcile(&mut self, message: StoredMessage) -> Reconciled {
        if self.entries.iter().any(|e| e.id == Some(message.id)) {
            return Reconciled::Duplicate;
        }

        // Only our own rows can confirm a local entry; keys are per sender.
        let own = message.user_id == self.user_id;
        let position = match message.client_key {
            Some(key) if own => self
                .entries
                .iter()
                .position(|e| e.user_id == self.user_id && e.client_key == Some(key)),
            None if own => self.entries.iter().position(|e| {
                e.state == DeliveryState::Pending && e.id.is_none() && e.content == message.content
            }),
            _ => None,
        };

        match position {
            Some(i) => {
                let entry = &mut self.entries[i];
                if entry.state == DeliveryState::Confirmed {
                    return Reconciled::Duplicate;
                }
                entry.id = Some(message.id);
                entry.created_at = message.created_at;
                entry.state = DeliveryState::Confirmed;
                entry.error = None;
                debug!(id = %message.id, "Message confirmed");
                Reconciled::Confirmed
            }
            None => {
                self.entries.push(TimelineEntry {
                    client_key: message.client_key,
                    id: Some(message.id),
                    user_id: message.user_id,
                    content: message.content,
                    created_at: message.created_at,
                    state: DeliveryState::Confirmed,
                    error: None,
                });
                Reconciled::Appended
            }
        }
    }

    /// Mark a pending message as failed. A message that was confirmed in the
    /// meantime stays confirmed.
    pub fn fail(&mut self, client_key: Uuid, error: impl Into<String>) -> Result<(), ClientError> {
        let entry = self.entry_mut(client_key)?;
        if entry.state == DeliveryState::Pending {
            entry.state = DeliveryState::Failed;
            entry.error = Some(error.into());
        }
        Ok(())
    }

    /// Put a failed message back to pending and return the request to send
    /// again.
    pub fn retry(&mut self, client_key: Uuid) -> Result<SendMessageRequest, ClientError> {
        let user = self.user_id.clone();
        let state = self.entry_mut(client_key)?.state;
        if state != DeliveryState::Failed {
            return Err(ClientError::NotFailed(client_key));
        }
        if !self.limiter.allow(user.as_str()) {
            return Err(ClientError::RateLimited);
        }

        let entry = self.entry_mut(client_key)?;
        entry.state = DeliveryState::Pending;
        entry.error = None;

        Ok(SendMessageRequest {
            user_id: user,
            content: entry.content.clone(),
            client_key: Some(client_key),
        })
    }

    fn entry_mut(&mut self, client_key: Uuid) -> Result<&mut TimelineEntry, ClientError> {
        let user = &self.user_id;
        self.entries
            .iter_mut()
            .find(|e| &e.user_id == user && e.client_key == Some(client_key))
            .ok_or(ClientError::UnknownMessage(client_key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use focusrank_shared::error::Rejection;

    fn timeline() -> Timeline {
        Timeline::with_limits(
            SquadId::new(),
            UserId::from("alice"),
            ModerationGate::default(),
            RateLimiter::new(1.0, 5.0),
        )
    }

    fn row(tl: &Timeline, user: &str, content: &str, client_key: Option<Uuid>) -> StoredMessage {
        StoredMessage {
            id: Uuid::new_v4(),
            squad_id: tl.squad_id(),
            user_id: UserId::from(user),
            content: content.to_string(),
            client_key,
            created_at: Utc::now(),
        }
    }

    fn submit(tl: &mut Timeline, content: &str) -> Uuid {
        let draft = tl.compose(content);
        let key = draft.client_key;
        tl.submit(draft).unwrap();
        key
    }

    #[test]
    fn test_submit_shows_pending_entry() {
        let mut tl = timeline();
        let draft = tl.compose("hello");
        let key = draft.client_key;
        assert!(tl.entries().is_empty());

        let request = tl.submit(draft).unwrap();
        assert_eq!(request.client_key, Some(key));
        assert_eq!(request.user_id, UserId::from("alice"));

        let entry = tl.get(key).unwrap();
        assert_eq!(entry.state, DeliveryState::Pending);
        assert_eq!(entry.id, None);
    }

    #[test]
    fn test_rejected_drafts_never_appear() {
        let mut tl = timeline();
        let err = tl.submit(tl.compose("  ")).unwrap_err();
        assert!(matches!(err, ClientError::Rejected(Rejection::Empty)));
        let err = tl.submit(tl.compose("buy spam")).unwrap_err();
        assert!(matches!(err, ClientError::Rejected(Rejection::Blocked { .. })));
        assert!(tl.entries().is_empty());

        for i in 0..5 {
            submit(&mut tl, &format!("msg {i}"));
        }
        let err = tl.submit(tl.compose("one more")).unwrap_err();
        assert!(matches!(err, ClientError::RateLimited));
        assert_eq!(tl.entries().len(), 5);
    }

    #[test]
    fn test_keyed_row_confirms_and_repeats_are_ignored() {
        let mut tl = timeline();
        let key = submit(&mut tl, "hello");
        let stored = row(&tl, "alice", "hello", Some(key));

        assert_eq!(tl.reconcile(stored.clone()), Reconciled::Confirmed);
        assert_eq!(tl.reconcile(stored.clone()), Reconciled::Duplicate);
        assert_eq!(tl.reconcile(stored.clone()), Reconciled::Duplicate);

        assert_eq!(tl.entries().len(), 1);
        let entry = tl.get(key).unwrap();
        assert_eq!(entry.state, DeliveryState::Confirmed);
        assert_eq!(entry.id, Some(stored.id));
        assert_eq!(entry.created_at, stored.created_at);
    }

    #[test]
    fn test_identical_content_matched_by_key() {
        let mut tl = timeline();
        let first = submit(&mut tl, "same");
        let second = submit(&mut tl, "same");

        // The server answers the second send first.
        tl.reconcile(row(&tl, "alice", "same", Some(second)));
        assert_eq!(tl.get(first).unwrap().state, DeliveryState::Pending);
        assert_eq!(tl.get(second).unwrap().state, DeliveryState::Confirmed);
    }

    #[test]
    fn test_foreign_row_with_our_key_is_appended() {
        let mut tl = timeline();
        let key = submit(&mut tl, "hello");

        assert_eq!(tl.reconcile(row(&tl, "bob", "hi", Some(key))), Reconciled::Appended);
        let ours = tl.get(key).unwrap();
        assert_eq!(ours.state, DeliveryState::Pending);
        assert_eq!(ours.content, "hello");

        assert_eq!(tl.reconcile(row(&tl, "alice", "hello", Some(key))), Reconciled::Confirmed);
        assert_eq!(tl.entries().len(), 2);
    }

    #[test]
    fn test_keyless_row_confirms_oldest_pending_match() {
        let mut tl = timeline();
        let first = submit(&mut tl, "same");
        let second = submit(&mut tl, "same");

        assert_eq!(tl.reconcile(row(&tl, "alice", "same", None)), Reconciled::Confirmed);
        assert_eq!(tl.get(first).unwrap().state, DeliveryState::Confirmed);
        assert_eq!(tl.get(second).unwrap().state, DeliveryState::Pending);

        // Another user's identical text is never taken for ours.
        assert_eq!(tl.reconcile(row(&tl, "bob", "same", None)), Reconciled::Appended);
        assert_eq!(tl.get(second).unwrap().state, DeliveryState::Pending);
    }

    #[test]
    fn test_keyless_orphan_is_appended() {
        let mut tl = timeline();
        let key = submit(&mut tl, "draft one");

        // Sent from another device: same author, no pending match.
        let orphan = row(&tl, "alice", "from my phone", None);
        assert_eq!(tl.reconcile(orphan.clone()), Reconciled::Appended);
        assert_eq!(tl.reconcile(orphan), Reconciled::Duplicate);

        assert_eq!(tl.entries().len(), 2);
        assert_eq!(tl.get(key).unwrap().state, DeliveryState::Pending);
        assert_eq!(tl.entries()[1].state, DeliveryState::Confirmed);
    }

    #[test]
    fn test_fail_then_retry() {
        let mut tl = timeline();
        let key = submit(&mut tl, "hello");

        assert!(matches!(tl.retry(key), Err(ClientError::NotFailed(_))));

        tl.fail(key, "connection reset").unwrap();
        let entry = tl.get(key).unwrap();
        assert_eq!(entry.state, DeliveryState::Failed);
        assert_eq!(entry.error.as_deref(), Some("connection reset"));

        let request = tl.retry(key).unwrap();
        assert_eq!(request.client_key, Some(key));
        assert_eq!(request.content, "hello");
        assert_eq!(tl.get(key).unwrap().state, DeliveryState::Pending);
        assert_eq!(tl.get(key).unwrap().error, None);

        assert!(matches!(
            tl.fail(Uuid::new_v4(), "x"),
            Err(ClientError::UnknownMessage(_))
        ));
    }

    #[test]
    fn test_failed_message_confirmed_by_late_row() {
        let mut tl = timeline();
        let key = submit(&mut tl, "hello");
        tl.fail(key, "timed out").unwrap();

        // The row was stored after all and arrives over realtime.
        assert_eq!(tl.reconcile(row(&tl, "alice", "hello", Some(key))), Reconciled::Confirmed);
        assert_eq!(tl.get(key).unwrap().state, DeliveryState::Confirmed);

        // A late failure report does not undo the confirmation.
        tl.fail(key, "timed out").unwrap();
        assert_eq!(tl.get(key).unwrap().state, DeliveryState::Confirmed);
    }
}
