use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{error, info};

use officesim_comms::CommunicationHub;
use officesim_core::config::SimConfig;
use officesim_core::locale::Locale;
use officesim_core::types::{
    Person, PersonDraft, SimulationSnapshot, SimulationStatus,
};
use officesim_core::{Result, SimError};
use officesim_events::EventSystem;
use officesim_gateways::{bootstrap_channels, ChatGateway, EmailGateway};
use officesim_planner::{MetricsEntry, Planner, PlannerService};
use officesim_planning::PlanningOrchestrator;
use officesim_projects::ProjectManager;
use officesim_runtime::WorkerRuntimeManager;
use officesim_store::{Db, ExchangeLog, PeopleStore, PlanStore, ReportStore, StateStore};
use officesim_ticks::{AdvanceDriver, TickManager};

/// The simulation coordinator. One instance per database; share it as
/// `Arc<SimulationEngine>`.
pub struct SimulationEngine {
    pub(crate) config: SimConfig,
    pub(crate) locale: Locale,
    pub(crate) db: Db,
    pub(crate) state: StateStore,
    pub(crate) people: PeopleStore,
    pub(crate) plans: Arc<PlanStore>,
    pub(crate) reports: Arc<ReportStore>,
    pub(crate) exchange: ExchangeLog,
    pub(crate) ticks: Arc<TickManager>,
    pub(crate) runtime: WorkerRuntimeManager,
    pub(crate) projects: ProjectManager,
    pub(crate) events: EventSystem,
    pub(crate) hub: Arc<CommunicationHub>,
    pub(crate) planner_service: Arc<PlannerService>,
    pub(crate) planning: PlanningOrchestrator,
    pub(crate) email: Arc<dyn EmailGateway>,
    pub(crate) chat: Arc<dyn ChatGateway>,
    pub(crate) rng: Arc<Mutex<StdRng>>,
    /// Roster subset selected at start; `None` means everyone.
    pub(crate) active_person_ids: Mutex<Option<Vec<i64>>>,
    /// `(person, day, tick-of-day)` → planning attempts this minute.
    /// Its own lock: parallel planning tasks enter it.
    pub(crate) plan_attempts: Mutex<HashMap<(i64, i64, i64), u32>>,
    pub(crate) auto_pause_enabled: AtomicBool,
    pub(crate) model_hint: Mutex<Option<String>>,
}

impl SimulationEngine {
    /// Open the configured database and wire every subsystem. Bootstraps
    /// the email/chat backends (with backoff) before returning.
    pub async fn new(
        config: SimConfig,
        email: Arc<dyn EmailGateway>,
        chat: Arc<dyn ChatGateway>,
        planner: Arc<dyn Planner>,
    ) -> Result<Arc<Self>> {
        let db = Db::open(&config.database.path).map_err(storage)?;
        Self::with_db(config, db, email, chat, planner).await
    }

    /// Wire the engine onto an already-open database (tests, offline runs).
    pub async fn with_db(
        config: SimConfig,
        db: Db,
        email: Arc<dyn EmailGateway>,
        chat: Arc<dyn ChatGateway>,
        planner: Arc<dyn Planner>,
    ) -> Result<Arc<Self>> {
        let locale = config.simulation.locale;
        let sim = &config.simulation;

        let state = StateStore::new(db.clone()).map_err(storage)?;
        let people = PeopleStore::new(db.clone());
        let plans = Arc::new(PlanStore::new(db.clone()));
        let reports = Arc::new(ReportStore::new(db.clone()));
        let exchange = ExchangeLog::new(db.clone());
        let ticks = Arc::new(TickManager::new(
            sim.hours_per_day,
            sim.tick_interval_seconds,
        ));
        let runtime = WorkerRuntimeManager::new(db.clone());
        let projects = ProjectManager::new(db.clone());
        let rng = Arc::new(Mutex::new(StdRng::seed_from_u64(0)));
        let events = EventSystem::new(db.clone(), rng.clone(), locale);
        let hub = Arc::new(CommunicationHub::new(
            email.clone(),
            chat.clone(),
            ticks.clone(),
            locale,
            sim.contact_cooldown_ticks,
            &sim.external_stakeholders,
        ));
        let planner_service = Arc::new(PlannerService::new(planner, config.planner.strict));
        let planning = PlanningOrchestrator::new(
            planner_service.clone(),
            plans.clone(),
            reports.clone(),
            hub.clone(),
            locale,
            sim.hours_per_day,
            sim.max_planning_workers,
        );
        let auto_pause_enabled = AtomicBool::new(sim.auto_pause_on_project_end);

        let engine = Arc::new(Self {
            locale,
            db,
            state,
            people,
            plans,
            reports,
            exchange,
            ticks,
            runtime,
            projects,
            events,
            hub,
            planner_service,
            planning,
            email,
            chat,
            rng,
            active_person_ids: Mutex::new(None),
            plan_attempts: Mutex::new(HashMap::new()),
            auto_pause_enabled,
            model_hint: Mutex::new(None),
            config,
        });

        bootstrap_channels(
            engine.email.as_ref(),
            engine.chat.as_ref(),
            &engine.config.simulation.manager_email,
            &engine.config.simulation.manager_handle,
        )
        .await;

        let roster = engine.people.list().map_err(storage)?;
        engine.runtime.sync_runtimes(&roster).map_err(storage)?;
        info!(personas = roster.len(), "simulation engine ready");
        Ok(engine)
    }

    pub fn hours_per_day(&self) -> i64 {
        self.ticks.hours_per_day()
    }

    pub fn tick_manager(&self) -> &Arc<TickManager> {
        &self.ticks
    }

    // --- people management --------------------------------------------------

    pub fn create_person(&self, draft: &PersonDraft) -> Result<Person> {
        let person = self
            .people
            .create(draft)
            .map_err(|e| SimError::InputInvalid(e.to_string()))?;
        let roster = self.people.list().map_err(storage)?;
        self.runtime.sync_runtimes(&roster).map_err(storage)?;
        Ok(person)
    }

    pub fn list_people(&self) -> Result<Vec<Person>> {
        self.people.list().map_err(storage)
    }

    pub fn get_person(&self, person_id: i64) -> Result<Person> {
        self.people.get(person_id).map_err(storage)
    }

    pub fn delete_person_by_name(&self, name: &str) -> Result<bool> {
        let deleted = self.people.delete_by_name(name).map_err(storage)?;
        if deleted {
            let roster = self.people.list().map_err(storage)?;
            self.runtime.sync_runtimes(&roster).map_err(storage)?;
        }
        Ok(deleted)
    }

    // --- introspection ------------------------------------------------------

    pub fn get_state(&self) -> Result<SimulationSnapshot> {
        self.snapshot()
    }

    pub(crate) fn snapshot(&self) -> Result<SimulationSnapshot> {
        let status = self.state.simulation_state().map_err(storage)?;
        Ok(SimulationSnapshot {
            current_tick: status.current_tick,
            is_running: status.is_running,
            auto_tick: status.auto_tick,
            sim_time: self.ticks.format_sim_time(status.current_tick),
        })
    }

    pub fn planner_metrics(&self, limit: usize) -> Vec<MetricsEntry> {
        self.planner_service.metrics(limit)
    }

    pub fn token_usage(&self) -> Result<HashMap<String, i64>> {
        self.reports.token_usage().map_err(storage)
    }

    pub fn list_events(&self) -> Result<Vec<officesim_core::types::EventRecord>> {
        self.events.list_events().map_err(storage)
    }

    pub fn inject_event(
        &self,
        event: &officesim_core::types::EventInput,
    ) -> Result<officesim_core::types::EventRecord> {
        self.events.inject_event(event).map_err(storage)
    }

    pub fn set_status_override(
        &self,
        worker_id: i64,
        status: &str,
        until_tick: i64,
        reason: &str,
    ) -> Result<()> {
        if until_tick < 0 {
            return Err(SimError::InputInvalid("until_tick must be >= 0".into()));
        }
        self.state
            .set_status_override(worker_id, status, until_tick, reason)
            .map_err(storage)
    }

    pub fn clear_status_override(&self, worker_id: i64) -> Result<()> {
        self.state.clear_status_override(worker_id).map_err(storage)
    }

    pub fn set_model_hint(&self, hint: Option<String>) {
        *self.model_hint.lock().unwrap() = hint;
    }

    pub fn set_auto_pause(&self, enabled: bool) {
        self.auto_pause_enabled.store(enabled, Ordering::SeqCst);
        info!(enabled, "auto-pause setting updated");
    }

    pub fn auto_pause_enabled(&self) -> bool {
        self.auto_pause_enabled.load(Ordering::SeqCst)
    }

    pub fn set_tick_interval(&self, seconds: f64) -> Result<f64> {
        self.ticks
            .set_tick_interval(seconds)
            .map_err(|e| SimError::InputInvalid(e.to_string()))?;
        Ok(self.ticks.tick_interval())
    }

    // --- roster helpers -----------------------------------------------------

    /// Active roster in start-request order, or everyone when no filter is
    /// in effect.
    pub(crate) fn active_people(&self) -> Result<Vec<Person>> {
        let available = self.people.list().map_err(storage)?;
        let ids = self.active_person_ids.lock().unwrap().clone();
        match ids {
            None => Ok(available),
            Some(ids) => {
                let lookup: HashMap<i64, Person> =
                    available.into_iter().map(|p| (p.id, p)).collect();
                Ok(ids.iter().filter_map(|id| lookup.get(id).cloned()).collect())
            }
        }
    }

    pub(crate) fn current_week_now(&self) -> i64 {
        self.state
            .simulation_state()
            .map(|s| self.ticks.current_week(s.current_tick))
            .unwrap_or(1)
    }

    /// Up to two collaborators for fallback traffic: the department head
    /// first, then one other teammate.
    pub(crate) fn select_collaborators(&self, person: &Person, people: &[Person]) -> Vec<Person> {
        if people.len() <= 1 {
            return Vec::new();
        }
        let head = people
            .iter()
            .find(|p| p.is_department_head)
            .unwrap_or(&people[0]);
        if person.id == head.id {
            return people
                .iter()
                .filter(|p| p.id != person.id)
                .take(2)
                .cloned()
                .collect();
        }
        let mut recipients = vec![head.clone()];
        if let Some(peer) = people.iter().find(|p| p.id != person.id && p.id != head.id) {
            recipients.push(peer.clone());
        }
        recipients
    }

    // --- auto-tick control --------------------------------------------------

    pub fn start_auto_ticks(self: &Arc<Self>) -> Result<SimulationSnapshot> {
        let driver: Arc<dyn AdvanceDriver> = self.clone();
        self.ticks
            .start_auto_tick(driver)
            .map_err(|e| SimError::AutoTick(e.to_string()))?;
        self.snapshot()
    }

    pub async fn stop_auto_ticks(&self) -> Result<SimulationSnapshot> {
        let _ = self.ticks.stop_auto_tick(self).await;
        self.snapshot()
    }

    /// Operator-facing snapshot of the auto-pause condition.
    pub fn auto_pause_status(&self) -> Result<AutoPauseStatus> {
        let enabled = self.auto_pause_enabled();
        if !enabled {
            return Ok(AutoPauseStatus {
                auto_pause_enabled: false,
                should_pause: false,
                active_projects_count: 0,
                future_projects_count: 0,
                current_week: 0,
                reason: "auto-pause on project end is disabled".into(),
            });
        }
        let week = self.current_week_now();
        let active = self
            .projects
            .active_projects_with_assignments(week)
            .map_err(storage)?;
        let future = self.projects.future_project_count(week).map_err(storage)?;
        let should_pause = active.is_empty() && future == 0;
        let reason = if should_pause {
            format!("all projects completed, no future projects (week {week})")
        } else if !active.is_empty() {
            format!("{} active project(s) in week {week}", active.len())
        } else {
            format!("no active projects in week {week}, but {future} future project(s) exist")
        };
        Ok(AutoPauseStatus {
            auto_pause_enabled: true,
            should_pause,
            active_projects_count: active.len(),
            future_projects_count: future,
            current_week: week,
            reason,
        })
    }

    /// Most recently stored project plan, if any.
    pub fn get_project_plan(&self) -> Result<Option<officesim_core::types::ProjectPlan>> {
        self.projects.get_project_plan(None).map_err(storage)
    }

    pub fn active_projects_with_assignments(
        &self,
        week: Option<i64>,
    ) -> Result<Vec<officesim_core::types::ProjectWithTeam>> {
        let week = week.unwrap_or_else(|| self.current_week_now());
        self.projects
            .active_projects_with_assignments(week)
            .map_err(storage)
    }

    pub fn project_chat_room(&self, project_id: i64) -> Result<Option<String>> {
        self.projects
            .active_project_chat_room(project_id)
            .map_err(storage)
    }

    /// Auto-pause supervisor, run once per auto-tick iteration: when no
    /// project is active this week and none start later, archive the
    /// completed projects' chat rooms and disable auto-tick. `is_running`
    /// stays set.
    pub(crate) async fn run_auto_pause_check(&self) {
        if !self.auto_pause_enabled() {
            return;
        }
        let week = self.current_week_now();
        let active = match self.projects.active_projects_with_assignments(week) {
            Ok(active) => active,
            Err(e) => {
                error!(error = %e, "auto-pause check failed; continuing auto-tick");
                return;
            }
        };
        if !active.is_empty() {
            return;
        }
        let future = self.projects.future_project_count(week).unwrap_or(0);
        if future > 0 {
            return;
        }
        let completed = self.projects.completed_projects(week).unwrap_or_default();
        for project in &completed {
            if let Err(e) = self.projects.archive_project_chat_room(project.id) {
                error!(project_id = project.id, error = %e, "failed to archive chat room");
            }
        }
        info!(
            week,
            completed = completed.len(),
            "no active or future projects; auto-pausing"
        );
        let _ = self.state.set_auto_tick(false);
    }
}

#[async_trait]
impl AdvanceDriver for SimulationEngine {
    fn status(&self) -> Option<SimulationStatus> {
        self.state.simulation_state().ok()
    }

    async fn supervise(&self) {
        self.run_auto_pause_check().await;
    }

    async fn advance_one(
        &self,
    ) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.advance(1, "auto").await?;
        Ok(())
    }

    fn set_auto_tick(&self, enabled: bool) {
        let _ = self.state.set_auto_tick(enabled);
    }
}

/// Why the supervisor would (or would not) pause the scheduler right now.
#[derive(Debug, Clone, serde::Serialize)]
pub struct AutoPauseStatus {
    pub auto_pause_enabled: bool,
    pub should_pause: bool,
    pub active_projects_count: usize,
    pub future_projects_count: i64,
    pub current_week: i64,
    pub reason: String,
}

pub(crate) fn storage(e: officesim_store::StoreError) -> SimError {
    SimError::Storage(e.to_string())
}
