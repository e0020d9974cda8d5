//! `officesim-planning` — the three-level planning pipeline.
//!
//! Daily plans are cached per `(person, day)`; hourly plans are generated
//! per trigger and can fan out across a bounded worker pool; summaries and
//! reports aggregate upward at hour and day boundaries. A failed or timed
//! out planning task yields an empty result for that persona only.

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use tokio::sync::Semaphore;
use tokio::time::timeout;
use tracing::{error, warn};

use officesim_comms::CommunicationHub;
use officesim_core::locale::Locale;
use officesim_core::types::{Person, PlanResult, ProjectPlan, ScheduleBlock};
use officesim_core::{Result, SimError};
use officesim_planner::{
    DailyPlanContext, DailyReportContext, HourlyPlanContext, HourlySummaryContext, PlannerService,
    SimulationReportContext,
};
use officesim_store::{
    DailyReportRow, HourlySummaryRow, PlanStore, PlanType, ReportStore,
};

/// Per-task wall-clock budgets; the advance mutex is held across planner
/// calls, so a hung provider must not hold it indefinitely.
const PLANNING_TIMEOUT: Duration = Duration::from_secs(240);
const SUMMARY_TIMEOUT: Duration = Duration::from_secs(30);
const REPORT_TIMEOUT: Duration = Duration::from_secs(60);

/// One hourly-planning unit collected during phase 1 of a tick.
#[derive(Debug, Clone)]
pub struct PlanningTask {
    pub person: Person,
    pub project: ProjectPlan,
    pub daily_plan_text: String,
    pub tick: i64,
    pub reason: String,
    pub adjustments: Vec<String>,
    pub all_active_projects: Option<Vec<ProjectPlan>>,
}

pub struct PlanningOrchestrator {
    service: Arc<PlannerService>,
    plans: Arc<PlanStore>,
    reports: Arc<ReportStore>,
    hub: Arc<CommunicationHub>,
    locale: Locale,
    hours_per_day: i64,
    /// Bounded pool for parallel planning; `None` disables parallelism.
    pool: Option<Arc<Semaphore>>,
}

impl PlanningOrchestrator {
    pub fn new(
        service: Arc<PlannerService>,
        plans: Arc<PlanStore>,
        reports: Arc<ReportStore>,
        hub: Arc<CommunicationHub>,
        locale: Locale,
        hours_per_day: i64,
        max_planning_workers: usize,
    ) -> Self {
        let pool = (max_planning_workers > 1)
            .then(|| Arc::new(Semaphore::new(max_planning_workers)));
        Self {
            service,
            plans,
            reports,
            hub,
            locale,
            hours_per_day,
            pool,
        }
    }

    // --- daily planning -----------------------------------------------------

    /// Return the existing daily plan for this exact day, or generate and
    /// persist one. Calling N times performs at most one planner call.
    pub async fn ensure_daily_plan(
        &self,
        person: &Person,
        day_index: i64,
        project: &ProjectPlan,
        team: &[Person],
        model_hint: Option<&str>,
    ) -> Result<String> {
        if let Some(existing) = self
            .plans
            .get_worker_plan(person.id, PlanType::Daily, Some(day_index), true)
            .map_err(storage)?
        {
            return Ok(existing.content);
        }
        let result = self
            .generate_daily_plan(person, day_index, project, team, model_hint)
            .await?;
        Ok(result.content)
    }

    pub async fn generate_daily_plan(
        &self,
        person: &Person,
        day_index: i64,
        project: &ProjectPlan,
        team: &[Person],
        model_hint: Option<&str>,
    ) -> Result<PlanResult> {
        let ctx = DailyPlanContext {
            worker: person,
            project_plan: &project.plan,
            day_index,
            duration_weeks: project.duration_weeks,
            team,
            model_hint,
        };
        let result = self
            .service
            .daily_plan(&ctx)
            .await
            .map_err(|e| SimError::Planning(format!("daily plan for {}: {e}", person.name)))?;
        self.plans
            .put_worker_plan(
                person.id,
                day_index,
                PlanType::Daily,
                &result,
                Some(&format!("day_index={day_index}")),
            )
            .map_err(storage)?;
        Ok(result)
    }

    // --- hourly planning ----------------------------------------------------

    /// Generate and persist one hourly plan, folding in recent-email
    /// context and any live adjustments.
    pub async fn generate_hourly_plan(
        &self,
        task: &PlanningTask,
        team: &[Person],
        model_hint: Option<&str>,
    ) -> Result<PlanResult> {
        let recent_emails = self.hub.recent_emails_for(task.person.id, 10);
        let ctx = HourlyPlanContext {
            worker: &task.person,
            project_plan: &task.project.plan,
            daily_plan: &task.daily_plan_text,
            tick: task.tick,
            reason: &task.reason,
            team,
            recent_emails: &recent_emails,
            all_active_projects: task.all_active_projects.as_deref(),
            model_hint,
        };
        let mut result = self
            .service
            .hourly_plan(&ctx)
            .await
            .map_err(|e| SimError::Planning(format!("hourly plan for {}: {e}", task.person.name)))?;

        if !task.adjustments.is_empty() {
            let bullets = task
                .adjustments
                .iter()
                .map(|a| format!("- {a}"))
                .collect::<Vec<_>>()
                .join("\n");
            result.content = format!(
                "{}\n\n{}:\n{}",
                result.content,
                self.locale.live_collaboration_adjustments(),
                bullets
            );
        }

        let context = if task.adjustments.is_empty() {
            format!("reason={}", task.reason)
        } else {
            format!("reason={};adjustments={}", task.reason, task.adjustments.len())
        };
        self.plans
            .put_worker_plan(
                task.person.id,
                task.tick,
                PlanType::Hourly,
                &result,
                Some(&context),
            )
            .map_err(storage)?;
        Ok(result)
    }

    /// Run planning tasks through the worker pool (or sequentially when
    /// the pool is disabled or there is a single task). Results preserve
    /// input order; a failed or timed out task yields an empty result.
    pub async fn generate_hourly_plans_parallel(
        &self,
        tasks: Vec<PlanningTask>,
        team: &[Person],
        model_hint: Option<&str>,
    ) -> Vec<(Person, PlanResult)> {
        if tasks.len() <= 1 || self.pool.is_none() {
            let mut results = Vec::with_capacity(tasks.len());
            for task in tasks {
                let result = match timeout(
                    PLANNING_TIMEOUT,
                    self.generate_hourly_plan(&task, team, model_hint),
                )
                .await
                {
                    Ok(Ok(result)) => result,
                    Ok(Err(e)) => {
                        error!(person = %task.person.name, error = %e, "planning failed");
                        PlanResult::empty()
                    }
                    Err(_) => {
                        error!(person = %task.person.name, "planning timed out");
                        PlanResult::empty()
                    }
                };
                results.push((task.person, result));
            }
            return results;
        }

        let pool = self.pool.as_ref().expect("pool checked above").clone();
        let futures = tasks.into_iter().map(|task| {
            let pool = pool.clone();
            async move {
                let _permit = pool.acquire().await.expect("semaphore never closed");
                let result = match timeout(
                    PLANNING_TIMEOUT,
                    self.generate_hourly_plan(&task, team, model_hint),
                )
                .await
                {
                    Ok(Ok(result)) => result,
                    Ok(Err(e)) => {
                        error!(person = %task.person.name, error = %e, "parallel planning failed");
                        PlanResult::empty()
                    }
                    Err(_) => {
                        error!(person = %task.person.name, "parallel planning timed out");
                        PlanResult::empty()
                    }
                };
                (task.person, result)
            }
        });
        join_all(futures).await
    }

    // --- hourly summaries ---------------------------------------------------

    /// Summarise one completed hour (60-tick window). Idempotent per
    /// `(person, hour_index)`.
    pub async fn generate_hourly_summary(
        &self,
        person: &Person,
        hour_index: i64,
        model_hint: Option<&str>,
    ) -> Result<HourlySummaryRow> {
        if let Some(existing) = self
            .reports
            .get_hourly_summary(person.id, hour_index)
            .map_err(storage)?
        {
            return Ok(existing);
        }

        let start_tick = hour_index * 60 + 1;
        let end_tick = (hour_index + 1) * 60;
        let rows = self
            .plans
            .hourly_plans_in_range(person.id, start_tick, end_tick)
            .map_err(storage)?;
        if rows.is_empty() {
            return Ok(HourlySummaryRow {
                id: 0,
                person_id: person.id,
                hour_index,
                summary: String::new(),
                model_used: "none".into(),
                tokens_used: Some(0),
            });
        }

        let digest = rows
            .iter()
            .map(|(tick, content)| {
                let head: String = content.chars().take(200).collect();
                format!("Tick {tick}: {head}...")
            })
            .collect::<Vec<_>>()
            .join("\n");
        let ctx = HourlySummaryContext {
            worker: person,
            hour_index,
            hourly_plans: &digest,
            model_hint,
        };
        let result = match self.service.hourly_summary(&ctx).await {
            Ok(result) => result,
            Err(e) => {
                warn!(person = %person.name, hour_index, error = %e, "hourly summary failed");
                PlanResult {
                    content: format!("Hour {} activities", hour_index + 1),
                    model_used: "stub".into(),
                    tokens_used: Some(0),
                }
            }
        };
        self.reports
            .put_hourly_summary(person.id, hour_index, &result)
            .map_err(storage)
    }

    /// Summaries for every person on an hour boundary, pool-parallel where
    /// possible. Failures are logged per person and never abort the tick.
    pub async fn generate_hourly_summaries(
        &self,
        people: &[Person],
        hour_index: i64,
        model_hint: Option<&str>,
    ) {
        let futures = people.iter().map(|person| {
            let pool = self.pool.clone();
            async move {
                let _permit = match &pool {
                    Some(pool) => Some(pool.acquire().await.expect("semaphore never closed")),
                    None => None,
                };
                match timeout(
                    SUMMARY_TIMEOUT,
                    self.generate_hourly_summary(person, hour_index, model_hint),
                )
                .await
                {
                    Ok(Ok(_)) => {}
                    Ok(Err(e)) => {
                        warn!(person = %person.name, hour_index, error = %e, "hourly summary failed")
                    }
                    Err(_) => warn!(person = %person.name, hour_index, "hourly summary timed out"),
                }
            }
        });
        join_all(futures).await;
    }

    // --- daily reports ------------------------------------------------------

    /// End-of-day report from precomputed hourly summaries (generated on
    /// demand when missing) plus a minute-level schedule outline.
    pub async fn generate_daily_report(
        &self,
        person: &Person,
        day_index: i64,
        project: &ProjectPlan,
        daily_plan_text: Option<&str>,
        model_hint: Option<&str>,
    ) -> Result<DailyReportRow> {
        if let Some(existing) = self
            .reports
            .get_daily_report(person.id, day_index)
            .map_err(storage)?
        {
            return Ok(existing);
        }

        let daily_plan = match daily_plan_text {
            Some(text) => text.to_string(),
            None => self
                .plans
                .get_worker_plan(person.id, PlanType::Daily, Some(day_index), true)
                .map_err(storage)?
                .map(|row| row.content)
                .unwrap_or_default(),
        };

        // Hour window of the completed day; empty when a day is shorter
        // than one 60-tick hour.
        let hours_per_sim_day = self.hours_per_day / 60;
        let start_hour = day_index * hours_per_sim_day;
        let end_hour = (day_index + 1) * hours_per_sim_day;

        let mut summary_lines = Vec::new();
        for hour in start_hour..end_hour {
            if let Some(summary) = self
                .reports
                .get_hourly_summary(person.id, hour)
                .map_err(storage)?
            {
                if !summary.summary.is_empty() {
                    summary_lines.push(format!("Hour {}: {}", hour + 1, summary.summary));
                }
            }
        }
        if summary_lines.is_empty() {
            for hour in start_hour..end_hour {
                let summary = self.generate_hourly_summary(person, hour, model_hint).await?;
                if !summary.summary.is_empty() {
                    summary_lines.push(format!("Hour {}: {}", hour + 1, summary.summary));
                }
            }
        }
        let hourly_log = if summary_lines.is_empty() {
            self.locale.no_hourly_activities().to_string()
        } else {
            summary_lines.join("\n")
        };

        let minute_schedule = render_minute_schedule(&person.schedule);
        let ctx = DailyReportContext {
            worker: person,
            project_plan: &project.plan,
            day_index,
            daily_plan: &daily_plan,
            hourly_log: &hourly_log,
            minute_schedule: &minute_schedule,
            model_hint,
        };
        let result = self
            .service
            .daily_report(&ctx)
            .await
            .map_err(|e| SimError::Planning(format!("daily report for {}: {e}", person.name)))?;
        self.reports
            .put_daily_report(person.id, day_index, &minute_schedule, &result)
            .map_err(storage)
    }

    /// Reports for every person on a day boundary, pool-parallel where
    /// possible.
    pub async fn generate_daily_reports(
        &self,
        people: &[Person],
        day_index: i64,
        project: &ProjectPlan,
        model_hint: Option<&str>,
    ) {
        let futures = people.iter().map(|person| {
            let pool = self.pool.clone();
            async move {
                let _permit = match &pool {
                    Some(pool) => Some(pool.acquire().await.expect("semaphore never closed")),
                    None => None,
                };
                match timeout(
                    REPORT_TIMEOUT,
                    self.generate_daily_report(person, day_index, project, None, model_hint),
                )
                .await
                {
                    Ok(Ok(_)) => {}
                    Ok(Err(e)) => {
                        warn!(person = %person.name, day_index, error = %e, "daily report failed")
                    }
                    Err(_) => warn!(person = %person.name, day_index, "daily report timed out"),
                }
            }
        });
        join_all(futures).await;
    }

    // --- simulation report --------------------------------------------------

    pub async fn generate_simulation_report(
        &self,
        project: &ProjectPlan,
        team: &[Person],
        total_ticks: i64,
        model_hint: Option<&str>,
    ) -> Result<()> {
        let digest = self.reports.daily_reports_digest().map_err(storage)?;
        let ctx = SimulationReportContext {
            project_plan: &project.plan,
            team,
            total_ticks,
            daily_reports: &digest,
            model_hint,
        };
        let result = self
            .service
            .simulation_report(&ctx)
            .await
            .map_err(|e| SimError::Planning(format!("simulation report: {e}")))?;
        self.reports
            .put_simulation_report(total_ticks, &result)
            .map_err(storage)?;
        Ok(())
    }
}

/// Minute-level schedule outline rendered from a persona's schedule blocks.
pub fn render_minute_schedule(blocks: &[ScheduleBlock]) -> String {
    if blocks.is_empty() {
        return "No schedule blocks defined.".to_string();
    }
    blocks
        .iter()
        .map(|b| format!("{}-{} {}", b.start, b.end, b.activity))
        .collect::<Vec<_>>()
        .join("\n")
}

/// First meaningful lines of a plan, with placeholder headers and meta
/// lines stripped. Feeds fallback-communication bodies.
pub fn summarize_plan(plan_text: &str, max_lines: usize) -> String {
    let lines: Vec<&str> = plan_text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();
    if lines.is_empty() {
        return "No plan provided yet.".to_string();
    }
    let filtered: Vec<&str> = lines
        .iter()
        .copied()
        .filter(|line| {
            !((line.starts_with('[') && line.ends_with(']'))
                || line.starts_with('#')
                || line.starts_with("```")
                || line.starts_with("Tick:")
                || line.starts_with("Worker:")
                || line.starts_with("Reason:")
                || line.starts_with("Outline:"))
        })
        .collect();
    let chosen = if filtered.is_empty() { &lines } else { &filtered };
    chosen
        .iter()
        .take(max_lines)
        .copied()
        .collect::<Vec<_>>()
        .join("\n")
}

fn storage(e: officesim_store::StoreError) -> SimError {
    SimError::Storage(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    use officesim_gateways::{InMemoryChatGateway, InMemoryEmailGateway};
    use officesim_planner::StubPlanner;
    use officesim_store::Db;
    use officesim_ticks::TickManager;

    fn person(id: i64, name: &str) -> Person {
        Person {
            id,
            name: name.into(),
            role: "Developer".into(),
            timezone: "UTC".into(),
            work_hours: "09:00-17:00".into(),
            break_frequency: "hourly".into(),
            communication_style: "direct".into(),
            email_address: format!("{}@co", name.to_lowercase()),
            chat_handle: name.to_lowercase(),
            is_department_head: false,
            team_name: None,
            skills: vec![],
            personality: vec![],
            objectives: vec![],
            metrics: vec![],
            planning_guidelines: vec![],
            event_playbook: BTreeMap::new(),
            statuses: vec![],
            persona_markdown: String::new(),
            schedule: vec![ScheduleBlock {
                start: "09:00".into(),
                end: "12:00".into(),
                activity: "deep work".into(),
            }],
        }
    }

    fn project() -> ProjectPlan {
        ProjectPlan {
            id: 1,
            project_name: "Alpha".into(),
            project_summary: "s".into(),
            plan: "the plan".into(),
            generated_by: None,
            duration_weeks: 1,
            start_week: 1,
            model_used: "stub".into(),
            tokens_used: Some(0),
            created_at: String::new(),
        }
    }

    fn orchestrator(db: &Db) -> PlanningOrchestrator {
        db.with(|conn| {
            for (id, name) in [(1, "Alice"), (2, "Bob")] {
                conn.execute(
                    "INSERT INTO people(id, name, role, timezone, work_hours, break_frequency,
                        communication_style, email_address, chat_handle, skills, personality,
                        persona_markdown, created_at)
                     VALUES (?1, ?2, 'dev', 'UTC', '09:00-17:00', 'hourly', 'direct', ?3, ?4,
                        '[]', '[]', '', 't')",
                    rusqlite::params![id, name, format!("{name}@co"), name.to_lowercase()],
                )?;
            }
            Ok(())
        })
        .unwrap();
        let service = Arc::new(PlannerService::new(Arc::new(StubPlanner::new()), false));
        let ticks = Arc::new(TickManager::new(8, 1.0));
        let hub = Arc::new(CommunicationHub::new(
            Arc::new(InMemoryEmailGateway::new()),
            Arc::new(InMemoryChatGateway::new()),
            ticks,
            Locale::En,
            10,
            &[],
        ));
        PlanningOrchestrator::new(
            service,
            Arc::new(PlanStore::new(db.clone())),
            Arc::new(ReportStore::new(db.clone())),
            hub,
            Locale::En,
            8,
            4,
        )
    }

    #[tokio::test]
    async fn ensure_daily_plan_is_idempotent() {
        let db = Db::open_in_memory().unwrap();
        let orch = orchestrator(&db);
        let alice = person(1, "Alice");
        let proj = project();
        let first = orch
            .ensure_daily_plan(&alice, 0, &proj, &[alice.clone()], None)
            .await
            .unwrap();
        let second = orch
            .ensure_daily_plan(&alice, 0, &proj, &[alice.clone()], None)
            .await
            .unwrap();
        assert_eq!(first, second);
        let count = PlanStore::new(db).count_daily_plans(1, 0).unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn adjustments_are_appended_as_bullets() {
        let db = Db::open_in_memory().unwrap();
        let orch = orchestrator(&db);
        let alice = person(1, "Alice");
        let bob = person(2, "Bob");
        let task = PlanningTask {
            person: alice.clone(),
            project: project(),
            daily_plan_text: "daily".into(),
            tick: 3,
            reason: "auto".into(),
            adjustments: vec!["Coordinate cover while Bob recovers.".into()],
            all_active_projects: None,
        };
        let result = orch
            .generate_hourly_plan(&task, &[alice, bob], None)
            .await
            .unwrap();
        assert!(result.content.contains("Live collaboration adjustments"));
        assert!(result.content.contains("- Coordinate cover while Bob recovers."));
    }

    #[tokio::test]
    async fn parallel_results_preserve_input_order() {
        let db = Db::open_in_memory().unwrap();
        let orch = orchestrator(&db);
        let alice = person(1, "Alice");
        let bob = person(2, "Bob");
        let team = vec![alice.clone(), bob.clone()];
        let tasks = vec![
            PlanningTask {
                person: alice.clone(),
                project: project(),
                daily_plan_text: "d".into(),
                tick: 2,
                reason: "auto".into(),
                adjustments: vec![],
                all_active_projects: None,
            },
            PlanningTask {
                person: bob.clone(),
                project: project(),
                daily_plan_text: "d".into(),
                tick: 2,
                reason: "auto".into(),
                adjustments: vec![],
                all_active_projects: None,
            },
        ];
        let results = orch.generate_hourly_plans_parallel(tasks, &team, None).await;
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].0.id, 1);
        assert_eq!(results[1].0.id, 2);
        assert!(results.iter().all(|(_, r)| !r.content.is_empty()));
    }

    #[tokio::test]
    async fn hourly_summary_empty_window_is_not_persisted() {
        let db = Db::open_in_memory().unwrap();
        let orch = orchestrator(&db);
        let alice = person(1, "Alice");
        let summary = orch.generate_hourly_summary(&alice, 0, None).await.unwrap();
        assert_eq!(summary.model_used, "none");
        assert!(ReportStore::new(db)
            .get_hourly_summary(1, 0)
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn daily_report_renders_schedule_outline() {
        let db = Db::open_in_memory().unwrap();
        let orch = orchestrator(&db);
        let alice = person(1, "Alice");
        let report = orch
            .generate_daily_report(&alice, 0, &project(), Some("daily"), None)
            .await
            .unwrap();
        assert!(report.schedule_outline.contains("09:00-12:00 deep work"));
        // Second call returns the stored row.
        let again = orch
            .generate_daily_report(&alice, 0, &project(), Some("daily"), None)
            .await
            .unwrap();
        assert_eq!(report.id, again.id);
    }

    #[test]
    fn summarize_plan_strips_meta_lines() {
        let text = "Worker: Alice\nTick: 3\n- build the parser\n- review PR\n```\ncode\n```";
        let summary = summarize_plan(text, 2);
        assert_eq!(summary, "- build the parser\n- review PR");
        assert_eq!(summarize_plan("", 3), "No plan provided yet.");
    }
}
