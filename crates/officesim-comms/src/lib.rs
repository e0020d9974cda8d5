//! `officesim-comms` — scheduled-communication parsing, throttling, and
//! dispatch.
//!
//! Hourly plans may carry a `Scheduled communications` section whose lines
//! describe future sends. The [`CommunicationHub`] extracts those lines,
//! holds them keyed by `(person, tick)`, and dispatches them when their
//! tick arrives: deduplicated, cooldown-limited, thread-aware, and with
//! hallucinated recipients rejected.

mod hub;
mod parser;

pub use hub::{CommunicationHub, DispatchLookups};
pub use parser::{parse_scheduled_comms, CommAction, CommChannel};
