//! Server configuration loaded from environment variables.
//!
//! All settings have sensible defaults so the server can start with zero
//! configuration for local development.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use focusrank_shared::constants::{
    DEFAULT_CHAT_BURST, DEFAULT_CHAT_RATE_PER_SEC, DEFAULT_HTTP_PORT, MAX_MESSAGE_CHARS,
};

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Socket address for the HTTP (axum) API server.
    /// Env: `HTTP_ADDR`
    /// Default: `0.0.0.0:8080`
    pub http_addr: SocketAddr,

    /// SQLite database file.
    /// Env: `DATABASE_PATH`
    /// Default: `None` (platform data directory).
    pub database_path: Option<PathBuf>,

    /// Endpoint of the external app classifier.
    /// Env: `CLASSIFIER_URL`
    /// Default: `None` (built-in keyword rules).
    pub classifier_url: Option<String>,

    /// How long a single classification may take before the app is treated
    /// as utility for now.
    /// Env: `CLASSIFIER_TIMEOUT_MS`
    /// Default: `2000`
    pub classifier_timeout: Duration,

    /// Sustained chat sends per second, per user.
    /// Env: `CHAT_RATE_PER_SEC`
    /// Default: `1.0`
    pub chat_rate_per_sec: f64,

    /// Chat burst capacity, per user.
    /// Env: `CHAT_BURST`
    /// Default: `5`
    pub chat_burst: f64,

    /// Chat message length ceiling in characters.
    /// Env: `MAX_MESSAGE_CHARS`
    /// Default: `5000`
    pub max_message_chars: usize,

    /// Words the moderation gate rejects.
    /// Env: `CHAT_BLOCKLIST` (comma separated)
    pub chat_blocklist: Vec<String>,

    /// Bonus points per streak day added to leaderboard scores (capped).
    /// Env: `STREAK_BONUS_PER_DAY`
    /// Default: `0`
    pub streak_bonus_per_day: f64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: ([0, 0, 0, 0], DEFAULT_HTTP_PORT).into(),
            database_path: None,
            classifier_url: None,
            classifier_timeout: Duration::from_millis(2000),
            chat_rate_per_sec: DEFAULT_CHAT_RATE_PER_SEC,
            chat_burst: DEFAULT_CHAT_BURST,
            max_message_chars: MAX_MESSAGE_CHARS,
            chat_blocklist: vec!["spam".to_string(), "scam".to_string()],
            streak_bonus_per_day: 0.0,
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(addr) = var("HTTP_ADDR") {
            if let Ok(parsed) = addr.parse::<SocketAddr>() {
                config.http_addr = parsed;
            } else {
                tracing::warn!(value = %addr, "Invalid HTTP_ADDR, using default");
            }
        }

        if let Some(path) = var("DATABASE_PATH") {
            if !path.is_empty() {
                config.database_path = Some(PathBuf::from(path));
            }
        }

        if let Some(url) = var("CLASSIFIER_URL") {
            if !url.is_empty() {
                config.classifier_url = Some(url);
            }
        }

        if let Some(val) = var("CLASSIFIER_TIMEOUT_MS") {
            match val.parse::<u64>() {
                Ok(ms) => config.classifier_timeout = Duration::from_millis(ms),
                Err(_) => tracing::warn!(value = %val, "Invalid CLASSIFIER_TIMEOUT_MS, using default"),
            }
        }

        if let Some(val) = var("CHAT_RATE_PER_SEC") {
            match parse_positive(&val) {
                Some(rate) => config.chat_rate_per_sec = rate,
                None => tracing::warn!(value = %val, "Invalid CHAT_RATE_PER_SEC, using default"),
            }
        }

        if let Some(val) = var("CHAT_BURST") {
            match parse_positive(&val) {
                Some(burst) if burst >= 1.0 => config.chat_burst = burst,
                _ => tracing::warn!(value = %val, "Invalid CHAT_BURST, using default"),
            }
        }

        if let Some(val) = var("MAX_MESSAGE_CHARS") {
            match val.parse::<usize>() {
                Ok(n) if n > 0 => config.max_message_chars = n,
                _ => tracing::warn!(value = %val, "Invalid MAX_MESSAGE_CHARS, using default"),
            }
        }

        if let Some(val) = var("CHAT_BLOCKLIST") {
            config.chat_blocklist = val
                .split(',')
                .map(|w| w.trim().to_string())
                .filter(|w| !w.is_empty())
                .collect();
        }

        if let Some(val) = var("STREAK_BONUS_PER_DAY") {
            match val.parse::<f64>() {
                Ok(bonus) if bonus >= 0.0 && bonus.is_finite() => {
                    config.streak_bonus_per_day = bonus
                }
                _ => tracing::warn!(value = %val, "Invalid STREAK_BONUS_PER_DAY, using default"),
            }
        }

        // RUST_LOG is handled directly by tracing-subscriber's EnvFilter,
        // so we do not store it here.

        config
    }
}

fn parse_positive(val: &str) -> Option<f64> {
    val.trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite() && *v > 0.0)
}
