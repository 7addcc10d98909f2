//! # focusrank-client
//!
//! Squad chat client. Messages show up locally the moment they are sent and
//! are reconciled against the rows the server persists and broadcasts.

pub mod chat;
pub mod error;
pub mod timeline;
pub mod transport;

pub use chat::SquadChat;
pub use error::ClientError;
pub use timeline::{DeliveryState, Reconciled, Timeline, TimelineEntry};
pub use transport::{ChatTransport, HttpTransport};
