//! `officesim-ticks` — the single source of truth for simulated time.
//!
//! One tick is one simulated minute inside the workday window;
//! `hours_per_day` ticks form one simulated day that still spans 24 h of
//! simulated wall clock. This crate owns the conversions, the per-person
//! work-window cache, the advance mutex, and the auto-tick background task.

mod auto;
mod error;
mod manager;

pub use auto::AdvanceDriver;
pub use error::{Result, TickError};
pub use manager::TickManager;
