//! # focusrank-shared
//!
//! Domain types and pure algorithms shared by the server, the store and the
//! chat client: efficiency scoring, streaks, leaderboard ranking, the chat
//! moderation gate and the token-bucket rate limiter.

pub mod constants;
pub mod error;
pub mod leaderboard;
pub mod moderation;
pub mod protocol;
pub mod ratelimit;
pub mod score;
pub mod streak;
pub mod types;
