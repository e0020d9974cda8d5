//! `officesim-store` — durable row-oriented persistence for the simulator.
//!
//! All tables live in a single SQLite file behind one shared [`Db`] handle
//! (WAL, 30 s busy timeout). Subsystem crates run their own queries against
//! the handle; this crate owns the schema, migrations, the simulation-state
//! singleton, and the plan/report/people/exchange stores.

pub mod db;
pub mod error;
pub mod exchange;
pub mod people;
pub mod plans;
pub mod reports;
pub mod state;

pub use db::Db;
pub use error::{Result, StoreError};
pub use exchange::{ExchangeEntry, ExchangeLog};
pub use people::PeopleStore;
pub use plans::{PlanStore, PlanType, WorkerPlanRow};
pub use reports::{DailyReportRow, HourlySummaryRow, ReportStore, SimulationReportRow};
pub use state::StateStore;
