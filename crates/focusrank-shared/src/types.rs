use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ParseError;

// User identity as issued by the external auth provider (opaque string)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(transparent)]
pub struct UserId(pub String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UserId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// A squad is the cohort a leaderboard ranks and the room chat happens in.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct SquadId(pub Uuid);

impl SquadId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SquadId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SquadId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// App categories
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Productive,
    Unproductive,
    Utility,
}

impl Category {
    /// Weight the category contributes to the efficiency calculation.
    pub fn multiplier(self) -> i8 {
        match self {
            Category::Productive => 1,
            Category::Unproductive => -1,
            Category::Utility => 0,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Category::Productive => "productive",
            Category::Unproductive => "unproductive",
            Category::Utility => "utility",
        }
    }
}

impl FromStr for Category {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "productive" => Ok(Category::Productive),
            "unproductive" => Ok(Category::Unproductive),
            "utility" | "neutral" => Ok(Category::Utility),
            other => Err(ParseError::UnknownCategory(other.to_string())),
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Cached classification of one app, shared by every user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppCategory {
    pub app_name: String,
    pub category: Category,
    pub multiplier: i8,
}

impl AppCategory {
    pub fn new(app_name: impl Into<String>, category: Category) -> Self {
        Self {
            app_name: app_name.into(),
            category,
            multiplier: category.multiplier(),
        }
    }

    /// The degraded answer used while an app is unclassified.
    pub fn unresolved(app_name: impl Into<String>) -> Self {
        Self::new(app_name, Category::Utility)
    }
}

/// Normalise an app name into its cache key.
pub fn normalize_app_name(app_name: &str) -> String {
    app_name.trim().to_lowercase()
}

// ---------------------------------------------------------------------------
// Daily aggregates
// ---------------------------------------------------------------------------

/// Which ingestion shape produced a daily aggregate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UsageSource {
    /// Re-bucketed from per-app rows through the category resolver.
    Apps,
    /// Written through as supplied by the caller.
    Aggregate,
}

impl UsageSource {
    pub fn as_str(self) -> &'static str {
        match self {
            UsageSource::Apps => "apps",
            UsageSource::Aggregate => "aggregate",
        }
    }
}

impl FromStr for UsageSource {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "apps" => Ok(UsageSource::Apps),
            "aggregate" => Ok(UsageSource::Aggregate),
            other => Err(ParseError::UnknownSource(other.to_string())),
        }
    }
}

/// Three-bucket usage totals for one user on one day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyAggregate {
    pub user_id: UserId,
    pub date: NaiveDate,
    pub productive_mins: u32,
    pub unproductive_mins: u32,
    pub neutral_mins: u32,
    pub source: UsageSource,
}

impl DailyAggregate {
    pub fn total_mins(&self) -> u32 {
        self.productive_mins + self.unproductive_mins + self.neutral_mins
    }
}
