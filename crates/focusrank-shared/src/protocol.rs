//! JSON shapes exchanged between the HTTP API, its callers and the chat
//! client.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::score::Tier;
use crate::streak::StreakState;
use crate::types::{SquadId, UserId};

// ---------------------------------------------------------------------------
// Ingestion
// ---------------------------------------------------------------------------

/// One raw per-app usage row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppUsageInput {
    pub app: String,
    pub minutes: u32,
    pub date: NaiveDate,
}

/// One pre-aggregated day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateInput {
    pub date: NaiveDate,
    pub productive_mins: u32,
    pub unproductive_mins: u32,
    pub neutral_mins: u32,
}

/// Body of `POST /ingest`. The two shapes are told apart by their list
/// field: `data` for per-app rows, `payload` for pre-aggregated days.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum IngestRequest {
    PerApp {
        user_id: UserId,
        data: Vec<AppUsageInput>,
    },
    Aggregated {
        user_id: UserId,
        payload: Vec<AggregateInput>,
    },
}

impl IngestRequest {
    pub fn user_id(&self) -> &UserId {
        match self {
            IngestRequest::PerApp { user_id, .. } | IngestRequest::Aggregated { user_id, .. } => {
                user_id
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestResponse {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub apps_processed: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inserted: Option<usize>,
}

// ---------------------------------------------------------------------------
// Scores
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScorePeriod {
    /// The most recent day with data.
    #[default]
    Day,
    /// The last seven calendar days, ending today.
    Week,
}

/// Body of `GET /users/:user_id/score`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreResponse {
    pub user_id: UserId,
    pub period: ScorePeriod,
    pub score: u8,
    pub tier: Tier,
    pub streak: StreakState,
    pub streak_bonus: f64,
    /// Number of daily aggregates the score was computed from.
    pub days: usize,
}

// ---------------------------------------------------------------------------
// Squads
// ---------------------------------------------------------------------------

/// Body of `POST /squads/:squad_id/members`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddMemberRequest {
    pub user_id: UserId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MembershipResponse {
    pub ok: bool,
    /// False when the request was a no-op (already a member, or not one).
    pub changed: bool,
}

// ---------------------------------------------------------------------------
// Chat
// ---------------------------------------------------------------------------

/// Body of `POST /squads/:squad_id/messages`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendMessageRequest {
    pub user_id: UserId,
    pub content: String,
    /// Idempotency key generated by the client when the message was composed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_key: Option<Uuid>,
}

/// A chat message as persisted by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredMessage {
    pub id: Uuid,
    pub squad_id: SquadId,
    pub user_id: UserId,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_key: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

/// Realtime event pushed to squad chat subscribers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatEvent {
    Insert { message: StoredMessage },
}

/// Error body returned by the API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}
