//! `officesim-gateways` — adapters for the external email and chat
//! backends.
//!
//! The core only sees the [`EmailGateway`] and [`ChatGateway`] traits. HTTP
//! implementations talk to the backends with a narrow verb set; in-memory
//! implementations back offline runs and tests. The style-transformation
//! post-filter is applied here, never by the core.

mod bootstrap;
mod chat;
mod email;
mod error;
mod filter;
mod memory;

pub use bootstrap::bootstrap_channels;
pub use chat::{ChatGateway, HttpChatGateway, OutgoingDm, OutgoingRoomMessage};
pub use email::{EmailGateway, HttpEmailGateway, OutgoingEmail, SentEmail};
pub use error::{GatewayError, Result};
pub use filter::{identity_filter, StyleFilter, StyledAs};
pub use memory::{InMemoryChatGateway, InMemoryEmailGateway, StoredDm, StoredEmail, StoredRoomMessage};
