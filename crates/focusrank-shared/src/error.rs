use thiserror::Error;

/// Why the moderation gate refused a chat message.
///
/// The `Display` text is user-facing and is returned as the `reason` of a
/// rejected send.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    #[error("Message is empty")]
    Empty,

    #[error("Message is too long: {len} characters (max {max})")]
    TooLong { len: usize, max: usize },

    #[error("Message contains blocked content")]
    Blocked { word: String },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("Unknown category: {0}")]
    UnknownCategory(String),

    #[error("Unknown usage source: {0}")]
    UnknownSource(String),
}
