//! Usage ingestion.
//!
//! Per-app batches are added to the stored per-app minutes, then every
//! touched day is re-bucketed from all of that day's per-app rows. Pre-
//! aggregated batches are written through. Either way the day's aggregate is
//! overwritten, and the user's squads are re-ranked afterwards.
//!
//! Nothing is written until the whole batch validates, including the cap of
//! one day's worth of minutes per user and date across everything stored.
//! A store failure part way through leaves earlier rows in place; callers
//! retry the whole batch.
//!
//! Days are only re-bucketed when they are ingested. A category that
//! resolves later does not touch days already aggregated.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::NaiveDate;
use tracing::{info, warn};

use focusrank_shared::constants::MINUTES_PER_DAY;
use focusrank_shared::protocol::{AggregateInput, AppUsageInput, IngestRequest, IngestResponse};
use focusrank_shared::types::{normalize_app_name, Category, DailyAggregate, UsageSource, UserId};

use crate::db::{with_db, SharedDb};
use crate::error::ServerError;
use crate::leaderboard::LeaderboardHub;
use crate::resolver::CategoryResolver;

pub struct UsageAggregator {
    db: SharedDb,
    resolver: Arc<CategoryResolver>,
    leaderboards: Arc<LeaderboardHub>,
}

impl UsageAggregator {
    pub fn new(
        db: SharedDb,
        resolver: Arc<CategoryResolver>,
        leaderboards: Arc<LeaderboardHub>,
    ) -> Self {
        Self {
            db,
            resolver,
            leaderboards,
        }
    }

    pub async fn ingest(&self, request: IngestRequest) -> Result<IngestResponse, ServerError> {
        let user_id = request.user_id().clone();
        if user_id.as_str().trim().is_empty() {
            return Err(ServerError::BadRequest("user_id must not be empty".into()));
        }

        let response = match request {
            IngestRequest::PerApp { data, .. } => {
                let processed = self.ingest_apps(&user_id, &data).await?;
                IngestResponse {
                    ok: true,
                    apps_processed: Some(processed),
                    inserted: None,
                }
            }
            IngestRequest::Aggregated { payload, .. } => {
                let inserted = self.ingest_aggregates(&user_id, &payload)?;
                IngestResponse {
                    ok: true,
                    apps_processed: None,
                    inserted: Some(inserted),
                }
            }
        };

        // The usage is stored at this point; a failed re-rank only delays the
        // board until the next write.
        if let Err(e) = self.leaderboards.recompute_for_user(&user_id) {
            warn!(user = %user_id, error = %e, "Leaderboard recompute after ingest failed");
        }

        Ok(response)
    }

    async fn ingest_apps(&self, user_id: &UserId, data: &[AppUsageInput]) -> Result<usize, ServerError> {
        let batch = sum_app_batch(data)?;

        let mut per_day: BTreeMap<NaiveDate, u64> = BTreeMap::new();
        for ((date, _), minutes) in &batch {
            *per_day.entry(*date).or_insert(0) += u64::from(*minutes);
        }

        // Check and write under one lock so concurrent batches cannot both
        // squeeze under the cap.
        let over = with_db(&self.db, |db| {
            for (date, added) in &per_day {
                let stored: u64 = db
                    .app_usage_for_day(user_id, *date)?
                    .iter()
                    .map(|row| u64::from(row.minutes))
                    .sum();
                if stored + added > u64::from(MINUTES_PER_DAY) {
                    return Ok(Some((*date, stored + added)));
                }
            }
            for ((date, app_name), minutes) in &batch {
                db.add_app_usage(user_id, app_name, *date, *minutes)?;
            }
            Ok(None)
        })?;
        if let Some((date, total)) = over {
            return Err(ServerError::BadRequest(format!(
                "{date} would have {total} minutes, more than a day"
            )));
        }

        for date in per_day.into_keys() {
            self.rebucket_day(user_id, date).await?;
        }

        info!(user = %user_id, entries = data.len(), apps = batch.len(), "Ingested app usage");
        Ok(data.len())
    }

    /// Rebuild one day's aggregate from every per-app row stored for it.
    async fn rebucket_day(&self, user_id: &UserId, date: NaiveDate) -> Result<DailyAggregate, ServerError> {
        let rows = with_db(&self.db, |db| db.app_usage_for_day(user_id, date))?;

        let mut day = DailyAggregate {
            user_id: user_id.clone(),
            date,
            productive_mins: 0,
            unproductive_mins: 0,
            neutral_mins: 0,
            source: UsageSource::Apps,
        };

        for row in &rows {
            let bucket = match self.resolver.resolve(&row.app_name).await.category {
                Category::Productive => &mut day.productive_mins,
                Category::Unproductive => &mut day.unproductive_mins,
                Category::Utility => &mut day.neutral_mins,
            };
            *bucket = bucket.saturating_add(row.minutes);
        }

        with_db(&self.db, |db| db.upsert_daily_aggregate(&day))?;
        Ok(day)
    }

    fn ingest_aggregates(&self, user_id: &UserId, payload: &[AggregateInput]) -> Result<usize, ServerError> {
        let days = validate_aggregates(user_id, payload)?;

        with_db(&self.db, |db| {
            for day in &days {
                db.upsert_daily_aggregate(day)?;
            }
            Ok(())
        })?;

        info!(user = %user_id, days = days.len(), "Ingested daily aggregates");
        Ok(days.len())
    }
}

/// Validate a per-app batch and sum it per (date, normalised app name).
fn sum_app_batch(data: &[AppUsageInput]) -> Result<BTreeMap<(NaiveDate, String), u32>, ServerError> {
    if data.is_empty() {
        return Err(ServerError::BadRequest("data must not be empty".into()));
    }

    let mut batch: BTreeMap<(NaiveDate, String), u32> = BTreeMap::new();
    for entry in data {
        let app_name = normalize_app_name(&entry.app);
        if app_name.is_empty() {
            return Err(ServerError::BadRequest("app name must not be empty".into()));
        }

        let minutes = batch.entry((entry.date, app_name)).or_insert(0);
        *minutes = minutes.saturating_add(entry.minutes);
    }
    Ok(batch)
}

fn validate_aggregates(user_id: &UserId, payload: &[AggregateInput]) -> Result<Vec<DailyAggregate>, ServerError> {
    if payload.is_empty() {
        return Err(ServerError::BadRequest("payload must not be empty".into()));
    }

    payload
        .iter()
        .map(|input| {
            let day = DailyAggregate {
                user_id: user_id.clone(),
                date: input.date,
                productive_mins: input.productive_mins,
                unproductive_mins: input.unproductive_mins,
                neutral_mins: input.neutral_mins,
                source: UsageSource::Aggregate,
            };
            let total = u64::from(day.productive_mins)
                + u64::from(day.unproductive_mins)
                + u64::from(day.neutral_mins);
            if total > u64::from(MINUTES_PER_DAY) {
                return Err(ServerError::BadRequest(format!(
                    "{} has {total} minutes, more than a day",
                    input.date
                )));
            }
            Ok(day)
        })
        .collect()
}
