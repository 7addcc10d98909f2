/// Application name
pub const APP_NAME: &str = "focusrank";

/// Number of daily records the streak calculator looks at
pub const STREAK_LOOKBACK: usize = 30;

/// Days summed by the weekly score period
pub const WEEK_DAYS: usize = 7;

/// Upper bound on the bonus points a streak can add to a score
pub const MAX_STREAK_BONUS: f64 = 10.0;

/// Tier thresholds (inclusive lower bounds)
pub const DIAMOND_THRESHOLD: u8 = 95;
pub const GOLD_THRESHOLD: u8 = 80;
pub const SILVER_THRESHOLD: u8 = 60;

/// Maximum chat message length in characters
pub const MAX_MESSAGE_CHARS: usize = 5000;

/// Chat send rate limit: sustained tokens per second and burst capacity
pub const DEFAULT_CHAT_RATE_PER_SEC: f64 = 1.0;
pub const DEFAULT_CHAT_BURST: f64 = 5.0;

/// Minutes in a day; per-day bucket totals above this are rejected
pub const MINUTES_PER_DAY: u32 = 24 * 60;

/// Default HTTP API port (server)
pub const DEFAULT_HTTP_PORT: u16 = 8080;
