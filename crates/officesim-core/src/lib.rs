//! `officesim-core` — shared domain types, configuration, and locale tables
//! for the officesim workplace simulator.

pub mod config;
pub mod error;
pub mod locale;
pub mod types;

pub use config::SimConfig;
pub use error::{Result, SimError};
pub use locale::Locale;
