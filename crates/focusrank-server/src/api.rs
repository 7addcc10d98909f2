use std::sync::Arc;

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        ws::{Message, WebSocket},
        Path, Query, State, WebSocketUpgrade,
    },
    http::{Method, StatusCode},
    response::Response,
    routing::{delete, get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::error::RecvError;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};
use uuid::Uuid;

use focusrank_shared::constants::STREAK_LOOKBACK;
use focusrank_shared::leaderboard::LeaderboardSnapshot;
use focusrank_shared::moderation::ModerationGate;
use focusrank_shared::protocol::{
    AddMemberRequest, IngestRequest, IngestResponse, MembershipResponse, ScorePeriod,
    ScoreResponse, SendMessageRequest, StoredMessage,
};
use focusrank_shared::ratelimit::RateLimiter;
use focusrank_shared::streak::{streak, StreakState};
use focusrank_shared::types::{normalize_app_name, AppCategory, SquadId, UserId};

use crate::aggregator::UsageAggregator;
use crate::chat::ChatService;
use crate::classifier::{Classifier, HttpClassifier, KeywordClassifier};
use crate::config::ServerConfig;
use crate::db::{with_db, SharedDb};
use crate::error::ServerError;
use crate::leaderboard::{user_score, LeaderboardHub};
use crate::resolver::{CategoryResolver, StoreCategoryCache};

const DEFAULT_HISTORY_LIMIT: u32 = 50;
const MAX_HISTORY_LIMIT: u32 = 200;

#[derive(Clone)]
pub struct AppState {
    pub db: SharedDb,
    pub resolver: Arc<CategoryResolver>,
    pub aggregator: Arc<UsageAggregator>,
    pub leaderboards: Arc<LeaderboardHub>,
    pub chat: Arc<ChatService>,
    pub config: Arc<ServerConfig>,
}

impl AppState {
    /// Wire every service around one database handle.
    pub fn new(config: ServerConfig, db: SharedDb) -> Self {
        let classifier: Arc<dyn Classifier> = match &config.classifier_url {
            Some(url) => Arc::new(HttpClassifier::new(url.clone())),
            None => Arc::new(KeywordClassifier::default()),
        };
        let resolver = Arc::new(CategoryResolver::new(
            Arc::new(StoreCategoryCache::new(db.clone())),
            classifier,
            config.classifier_timeout,
        ));
        let leaderboards = Arc::new(LeaderboardHub::new(db.clone(), config.streak_bonus_per_day));
        let aggregator = Arc::new(UsageAggregator::new(
            db.clone(),
            resolver.clone(),
            leaderboards.clone(),
        ));
        let chat = Arc::new(ChatService::new(
            db.clone(),
            ModerationGate::new(config.max_message_chars, &config.chat_blocklist),
            RateLimiter::new(config.chat_rate_per_sec, config.chat_burst),
        ));

        Self {
            db,
            resolver,
            aggregator,
            leaderboards,
            chat,
            config: Arc::new(config),
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_check))
        .route("/ingest", post(ingest))
        .route("/users/:user_id/score", get(get_user_score))
        .route("/users/:user_id/streak", get(get_user_streak))
        .route("/categories/:app_name", get(get_category))
        .route("/squads/:squad_id/members", post(add_member))
        .route("/squads/:squad_id/members/:user_id", delete(remove_member))
        .route("/squads/:squad_id/leaderboard", get(get_leaderboard))
        .route("/squads/:squad_id/leaderboard/ws", get(leaderboard_ws))
        .route(
            "/squads/:squad_id/messages",
            post(send_message).get(list_messages),
        )
        .route("/squads/:squad_id/messages/ws", get(messages_ws))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

#[derive(Deserialize)]
struct ScoreQuery {
    #[serde(default)]
    period: ScorePeriod,
}

#[derive(Deserialize)]
struct HistoryQuery {
    limit: Option<u32>,
    before: Option<DateTime<Utc>>,
}

/// Malformed JSON is a 400 with the parser's message, whatever axum's
/// default status for the particular rejection would be.
fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ServerError> {
    payload
        .map(|Json(body)| body)
        .map_err(|rejection| ServerError::BadRequest(rejection.body_text()))
}

/// Path segments that fail to parse (a squad id that is not a UUID) get the
/// same JSON 400 as bad bodies.
fn path_param<T>(param: Result<Path<T>, PathRejection>) -> Result<T, ServerError> {
    param
        .map(|Path(value)| value)
        .map_err(|rejection| ServerError::BadRequest(rejection.body_text()))
}

fn query_params<T>(query: Result<Query<T>, QueryRejection>) -> Result<T, ServerError> {
    query
        .map(|Query(value)| value)
        .map_err(|rejection| ServerError::BadRequest(rejection.body_text()))
}

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn ingest(
    State(state): State<AppState>,
    payload: Result<Json<IngestRequest>, JsonRejection>,
) -> Result<Json<IngestResponse>, ServerError> {
    let request = json_body(payload)?;
    Ok(Json(state.aggregator.ingest(request).await?))
}

async fn get_user_score(
    State(state): State<AppState>,
    user_id: Result<Path<String>, PathRejection>,
    query: Result<Query<ScoreQuery>, QueryRejection>,
) -> Result<Json<ScoreResponse>, ServerError> {
    let user_id = UserId::new(path_param(user_id)?);
    let query = query_params(query)?;
    let per_day = state.config.streak_bonus_per_day;
    let today = Utc::now().date_naive();
    let report = with_db(&state.db, |db| {
        user_score(db, &user_id, query.period, per_day, today)
    })?;
    Ok(Json(report))
}

async fn get_user_streak(
    State(state): State<AppState>,
    user_id: Result<Path<String>, PathRejection>,
) -> Result<Json<StreakState>, ServerError> {
    let user_id = UserId::new(path_param(user_id)?);
    let history = with_db(&state.db, |db| {
        db.recent_daily_aggregates(&user_id, STREAK_LOOKBACK as u32)
    })?;
    Ok(Json(streak(&history)))
}

async fn get_category(
    State(state): State<AppState>,
    app_name: Result<Path<String>, PathRejection>,
) -> Result<Json<AppCategory>, ServerError> {
    let app_name = path_param(app_name)?;
    if normalize_app_name(&app_name).is_empty() {
        return Err(ServerError::BadRequest("app name must not be empty".into()));
    }
    Ok(Json(state.resolver.resolve(&app_name).await))
}

async fn add_member(
    State(state): State<AppState>,
    squad_id: Result<Path<Uuid>, PathRejection>,
    payload: Result<Json<AddMemberRequest>, JsonRejection>,
) -> Result<Json<MembershipResponse>, ServerError> {
    let squad_id = SquadId(path_param(squad_id)?);
    let AddMemberRequest { user_id } = json_body(payload)?;
    if user_id.as_str().trim().is_empty() {
        return Err(ServerError::BadRequest("user_id must not be empty".into()));
    }

    let changed = with_db(&state.db, |db| db.add_squad_member(squad_id, &user_id))?;
    if changed {
        info!(squad = %squad_id, user = %user_id, "Member joined squad");
        state.leaderboards.recompute(squad_id)?;
    }
    Ok(Json(MembershipResponse { ok: true, changed }))
}

async fn remove_member(
    State(state): State<AppState>,
    params: Result<Path<(Uuid, String)>, PathRejection>,
) -> Result<Json<MembershipResponse>, ServerError> {
    let (squad_id, user_id) = path_param(params)?;
    let squad_id = SquadId(squad_id);
    let user_id = UserId::new(user_id);

    let changed = with_db(&state.db, |db| db.remove_squad_member(squad_id, &user_id))?;
    if changed {
        info!(squad = %squad_id, user = %user_id, "Member left squad");
        state.leaderboards.recompute(squad_id)?;
    }
    Ok(Json(MembershipResponse { ok: true, changed }))
}

async fn get_leaderboard(
    State(state): State<AppState>,
    squad_id: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<LeaderboardSnapshot>, ServerError> {
    let snapshot = state.leaderboards.query(SquadId(path_param(squad_id)?))?;
    Ok(Json((*snapshot).clone()))
}

async fn send_message(
    State(state): State<AppState>,
    squad_id: Result<Path<Uuid>, PathRejection>,
    payload: Result<Json<SendMessageRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<StoredMessage>), ServerError> {
    let squad_id = SquadId(path_param(squad_id)?);
    let request = json_body(payload)?;
    let sent = state.chat.send(squad_id, request)?;
    let status = if sent.created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(sent.message)))
}

async fn list_messages(
    State(state): State<AppState>,
    squad_id: Result<Path<Uuid>, PathRejection>,
    query: Result<Query<HistoryQuery>, QueryRejection>,
) -> Result<Json<Vec<StoredMessage>>, ServerError> {
    let squad_id = path_param(squad_id)?;
    let query = query_params(query)?;
    let limit = query
        .limit
        .unwrap_or(DEFAULT_HISTORY_LIMIT)
        .clamp(1, MAX_HISTORY_LIMIT);
    let messages = state.chat.history(SquadId(squad_id), limit, query.before)?;
    Ok(Json(messages))
}

// ─── Realtime ───

type WsSender = SplitSink<WebSocket, Message>;

async fn send_json<T: Serialize>(sender: &mut WsSender, value: &T) -> bool {
    match serde_json::to_string(value) {
        Ok(text) => sender.send(Message::Text(text.into())).await.is_ok(),
        Err(e) => {
            warn!(error = %e, "Failed to encode realtime frame");
            false
        }
    }
}

/// Drain the client side of a socket until it closes. Client frames carry no
/// meaning on these streams.
async fn drain_client(mut receiver: futures::stream::SplitStream<WebSocket>) {
    while let Some(Ok(msg)) = receiver.next().await {
        if let Message::Close(_) = msg {
            break;
        }
    }
}

async fn leaderboard_ws(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    squad_id: Result<Path<Uuid>, PathRejection>,
) -> Result<Response, ServerError> {
    let squad_id = SquadId(path_param(squad_id)?);
    Ok(ws.on_upgrade(move |socket| leaderboard_socket(socket, state, squad_id)))
}

async fn leaderboard_socket(socket: WebSocket, state: AppState, squad_id: SquadId) {
    let (mut sender, receiver) = socket.split();

    // Subscribe before reading the current snapshot so a recompute landing in
    // between still reaches this client.
    let mut rx = state.leaderboards.subscribe(squad_id);
    let initial = match state.leaderboards.query(squad_id) {
        Ok(snapshot) => snapshot,
        Err(e) => {
            warn!(squad = %squad_id, error = %e, "Could not load leaderboard for subscriber");
            return;
        }
    };
    if !send_json(&mut sender, &*initial).await {
        return;
    }

    debug!(squad = %squad_id, "Leaderboard subscriber connected");

    let hub = state.leaderboards.clone();
    let mut send_task = tokio::spawn(async move {
        loop {
            let next = match rx.recv().await {
                Ok(snapshot) => snapshot,
                Err(RecvError::Lagged(skipped)) => {
                    debug!(squad = %squad_id, skipped, "Leaderboard subscriber lagged, resending latest");
                    match hub.current(squad_id) {
                        Some(latest) => latest,
                        None => continue,
                    }
                }
                Err(RecvError::Closed) => break,
            };
            if !send_json(&mut sender, &*next).await {
                break;
            }
        }
    });
    let mut recv_task = tokio::spawn(drain_client(receiver));

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    debug!(squad = %squad_id, "Leaderboard subscriber disconnected");
}

async fn messages_ws(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    squad_id: Result<Path<Uuid>, PathRejection>,
) -> Result<Response, ServerError> {
    let squad_id = SquadId(path_param(squad_id)?);
    Ok(ws.on_upgrade(move |socket| messages_socket(socket, state, squad_id)))
}

async fn messages_socket(socket: WebSocket, state: AppState, squad_id: SquadId) {
    let (mut sender, receiver) = socket.split();
    let mut rx = state.chat.subscribe(squad_id);

    debug!(squad = %squad_id, "Chat subscriber connected");

    let mut send_task = tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    if !send_json(&mut sender, &event).await {
                        break;
                    }
                }
                // Missed rows are not replayed; clients page history instead.
                Err(RecvError::Lagged(skipped)) => {
                    warn!(squad = %squad_id, skipped, "Chat subscriber lagged");
                }
                Err(RecvError::Closed) => break,
            }
        }
    });
    let mut recv_task = tokio::spawn(drain_client(receiver));

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    debug!(squad = %squad_id, "Chat subscriber disconnected");
}

pub async fn serve(state: AppState, addr: std::net::SocketAddr) -> anyhow::Result<()> {
    let app = build_router(state);

    info!(addr = %addr, "Starting HTTP API server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
