//! Pre-send content check for squad chat.
//!
//! The gate stands in for a real moderation service: it rejects empty
//! messages, messages over the length ceiling, and messages containing a
//! blocklisted word. It runs before rate limiting and before persistence, so
//! a rejected message never costs a token and is never stored.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::constants::MAX_MESSAGE_CHARS;
use crate::error::Rejection;

/// Result of a moderation check in the shape the HTTP layer returns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModerationOutcome {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl From<Result<(), Rejection>> for ModerationOutcome {
    fn from(result: Result<(), Rejection>) -> Self {
        match result {
            Ok(()) => Self {
                ok: true,
                reason: None,
            },
            Err(rejection) => Self {
                ok: false,
                reason: Some(rejection.to_string()),
            },
        }
    }
}

#[derive(Debug, Clone)]
pub struct ModerationGate {
    max_chars: usize,
    blocklist: HashSet<String>,
}

impl ModerationGate {
    pub fn new<I, S>(max_chars: usize, blocklist: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let blocklist = blocklist
            .into_iter()
            .map(|w| w.as_ref().trim().to_lowercase())
            .filter(|w| !w.is_empty())
            .collect();
        Self {
            max_chars,
            blocklist,
        }
    }

    pub fn check(&self, text: &str) -> Result<(), Rejection> {
        if text.trim().is_empty() {
            return Err(Rejection::Empty);
        }

        let len = text.chars().count();
        if len > self.max_chars {
            return Err(Rejection::TooLong {
                len,
                max: self.max_chars,
            });
        }

        if let Some(word) = self.first_blocked_word(text) {
            return Err(Rejection::Blocked { word });
        }

        Ok(())
    }

    pub fn moderate(&self, text: &str) -> ModerationOutcome {
        self.check(text).into()
    }

    fn first_blocked_word(&self, text: &str) -> Option<String> {
        if self.blocklist.is_empty() {
            return None;
        }
        text.split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .map(str::to_lowercase)
            .find(|w| self.blocklist.contains(w))
    }
}

impl Default for ModerationGate {
    fn default() -> Self {
        Self::new(MAX_MESSAGE_CHARS, ["spam", "scam"])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_empty() {
        let gate = ModerationGate::default();
        assert_eq!(gate.check(""), Err(Rejection::Empty));
        assert_eq!(gate.check("   \n"), Err(Rejection::Empty));
        assert!(!gate.moderate("").ok);
    }

    #[test]
    fn test_rejects_over_length_ceiling() {
        let gate = ModerationGate::default();
        let long = "a".repeat(6000);
        assert!(matches!(
            gate.check(&long),
            Err(Rejection::TooLong { len: 6000, .. })
        ));
        assert!(gate.check(&"a".repeat(MAX_MESSAGE_CHARS)).is_ok());
    }

    #[test]
    fn test_rejects_blocklisted_word_with_reason() {
        let gate = ModerationGate::new(100, ["badword"]);
        let outcome = gate.moderate("well that is a BadWord, honestly");
        assert!(!outcome.ok);
        assert_eq!(
            outcome.reason.as_deref(),
            Some("Message contains blocked content")
        );
    }

    #[test]
    fn test_blocklist_matches_whole_words_only() {
        let gate = ModerationGate::new(100, ["ass"]);
        assert!(gate.check("what a classic pass").is_ok());
        assert!(gate.check("ass!").is_err());
    }

    #[test]
    fn test_accepts_normal_text() {
        let outcome = ModerationGate::default().moderate("nice streak today!");
        assert!(outcome.ok);
        assert!(outcome.reason.is_none());
    }
}
