//! `officesim-engine` — the simulation coordinator.
//!
//! Composes the tick manager, state store, worker runtimes, project
//! manager, event system, planning orchestrator, and communication hub
//! into the per-tick pipeline, and owns lifecycle (start/stop/reset/
//! rewind), the auto-pause supervisor, and the replay read path.

mod advance;
mod engine;
mod lifecycle;
mod replay;

pub use engine::{AutoPauseStatus, SimulationEngine};
pub use replay::{ReplayComm, ReplayManager, ReplayMetadata, ReplayMode, TickData};
