//! `officesim-planner` — the LLM provider boundary.
//!
//! The engine talks to a [`PlannerService`], which wraps a [`Planner`] with
//! strict/fallback handling and a bounded metrics ring. The LLM itself is an
//! opaque text generator behind [`LlmClient`]; [`StubPlanner`] produces
//! deterministic plans without any network access.

mod client;
mod error;
mod metrics;
mod planner;
mod prompts;
mod service;
mod stub;

pub use client::{ChatMessage, Completion, HttpLlmClient, LlmClient, Role};
pub use error::{PlannerError, Result};
pub use metrics::{MetricsEntry, MetricsRecorder};
pub use planner::{
    DailyPlanContext, DailyReportContext, HourlyPlanContext, HourlySummaryContext, LlmPlanner,
    Planner, PlannerModels, ProjectPlanContext, SimulationReportContext,
};
pub use service::PlannerService;
pub use stub::StubPlanner;
