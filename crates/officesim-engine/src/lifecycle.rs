use std::collections::HashSet;

use rand::SeedableRng;
use sha2::{Digest, Sha256};
use tracing::{info, warn};

use officesim_comms::CommChannel;
use officesim_core::types::{
    Person, ProjectTimeline, SimulationSnapshot, StartRequest,
};
use officesim_core::{Result, SimError};
use officesim_planner::ProjectPlanContext;

use crate::engine::{storage, SimulationEngine};

impl SimulationEngine {
    /// Start a simulation run: seed the PRNG, reset runtime state, resolve
    /// the active roster, initialise project plans and chat rooms, capture
    /// the wall-clock base, and schedule kickoff comms.
    pub async fn start(&self, request: Option<&StartRequest>) -> Result<SimulationSnapshot> {
        let seed = derive_seed(request);
        *self.rng.lock().unwrap() = rand::rngs::StdRng::seed_from_u64(seed);

        self.reset_runtime_state()?;

        let all_people = self.people.list().map_err(storage)?;
        if all_people.is_empty() {
            return Err(SimError::InputInvalid(
                "cannot start simulation without any personas".into(),
            ));
        }
        let active = resolve_active_people(request, &all_people)?;
        *self.active_person_ids.lock().unwrap() = Some(active.iter().map(|p| p.id).collect());

        if let Some(request) = request {
            *self.model_hint.lock().unwrap() = request.model_hint.clone();
            self.initialise_project_plans(request, &active).await?;
        }

        self.state.set_running(true).map_err(storage)?;
        self.ticks.set_base_datetime(None);
        self.runtime.sync_runtimes(&active).map_err(storage)?;

        self.schedule_kickoff_comms(&active);
        info!(active = active.len(), seed, "simulation started");
        self.snapshot()
    }

    /// Stop a run: halt auto-ticks, write the final simulation report when
    /// a project exists, and clear the running flag.
    pub async fn stop(&self) -> Result<SimulationSnapshot> {
        let _ = self.ticks.stop_auto_tick(self).await;
        let status = self.state.simulation_state().map_err(storage)?;
        if status.is_running {
            if let Some(project) = self.projects.get_project_plan(None).map_err(storage)? {
                let team = self.active_people()?;
                let model_hint = self.model_hint.lock().unwrap().clone();
                if let Err(e) = self
                    .planning
                    .generate_simulation_report(
                        &project,
                        &team,
                        status.current_tick,
                        model_hint.as_deref(),
                    )
                    .await
                {
                    warn!(error = %e, "simulation report generation failed");
                }
            }
        }
        self.state.set_running(false).map_err(storage)?;
        *self.active_person_ids.lock().unwrap() = None;
        self.snapshot()
    }

    /// Soft reset: truncate derived tables, keep personas, refresh the
    /// work-hour cache.
    pub async fn reset(&self) -> Result<SimulationSnapshot> {
        let _ = self.ticks.stop_auto_tick(self).await;
        let _guard = self.ticks.lock_advance().await;

        self.state.reset_simulation(true).map_err(storage)?;
        self.reset_runtime_state()?;
        self.projects.clear_cache();
        *self.model_hint.lock().unwrap() = None;
        self.plan_attempts.lock().unwrap().clear();
        self.ticks.clear_base_datetime();

        let people = self.people.list().map_err(storage)?;
        self.ticks.update_work_windows(&people);
        self.snapshot()
    }

    /// Full reset: soft reset, then delete personas and clear the email
    /// and chat backends.
    pub async fn reset_full(&self) -> Result<SimulationSnapshot> {
        self.reset().await?;
        let _guard = self.ticks.lock_advance().await;
        self.state.reset_simulation(false).map_err(storage)?;
        if let Err(e) = self.email.purge_all().await {
            warn!(error = %e, "email backend purge failed");
        }
        if let Err(e) = self.chat.purge_all().await {
            warn!(error = %e, "chat backend purge failed");
        }
        self.ticks.update_work_windows(&[]);
        self.snapshot()
    }

    /// Hard reset: drop and recreate the schema, then re-bootstrap the
    /// backends. Only valid with the scheduler stopped, which this
    /// enforces.
    pub async fn hard_reset(&self) -> Result<SimulationSnapshot> {
        let _ = self.ticks.stop_auto_tick(self).await;
        let _guard = self.ticks.lock_advance().await;

        self.state.hard_reset().map_err(storage)?;
        self.reset_runtime_state()?;
        self.projects.clear_cache();
        self.plan_attempts.lock().unwrap().clear();
        self.ticks.clear_base_datetime();
        self.ticks.update_work_windows(&[]);

        officesim_gateways::bootstrap_channels(
            self.email.as_ref(),
            self.chat.as_ref(),
            &self.config.simulation.manager_email,
            &self.config.simulation.manager_handle,
        )
        .await;
        self.snapshot()
    }

    /// Rewind to `requested_tick` (clamped to the current tick), purging
    /// every artifact generated after the cutoff, including backend emails
    /// and chats past the simulated cutoff instant.
    pub async fn rewind(&self, requested_tick: i64) -> Result<SimulationSnapshot> {
        let _ = self.ticks.stop_auto_tick(self).await;
        let _guard = self.ticks.lock_advance().await;

        let status = self.state.simulation_state().map_err(storage)?;
        let cutoff = requested_tick.clamp(0, status.current_tick);
        let h = self.ticks.hours_per_day();
        let hour_cutoff = if cutoff > 0 { (cutoff - 1) / 60 } else { 0 };
        let day_cutoff = if cutoff > 0 { (cutoff - 1) / h } else { 0 };

        self.plans.delete_after_tick(cutoff).map_err(storage)?;
        self.reports.delete_hourly_after(hour_cutoff).map_err(storage)?;
        self.reports.delete_daily_after(day_cutoff).map_err(storage)?;
        self.exchange.delete_after_tick(cutoff).map_err(storage)?;
        self.state.delete_tick_log_after(cutoff).map_err(storage)?;
        self.state.delete_events_after(cutoff).map_err(storage)?;

        if let Some(cutoff_dt) = self.ticks.sim_datetime_for_tick(cutoff) {
            let cutoff_iso = cutoff_dt.to_rfc3339();
            if let Err(e) = self.email.purge_after(&cutoff_iso).await {
                warn!(error = %e, "email backend rewind purge failed");
            }
            if let Err(e) = self.chat.purge_after(&cutoff_iso).await {
                warn!(error = %e, "chat backend rewind purge failed");
            }
        }

        self.state.set_tick_silent(cutoff).map_err(storage)?;
        info!(cutoff, hour_cutoff, day_cutoff, "rewound simulation");
        self.snapshot()
    }

    // --- internals ----------------------------------------------------------

    fn reset_runtime_state(&self) -> Result<()> {
        self.runtime.clear_all().map_err(storage)?;
        *self.active_person_ids.lock().unwrap() = None;
        self.state.clear_all_status_overrides().map_err(storage)?;
        self.hub.clear_runtime();
        Ok(())
    }

    async fn initialise_project_plans(
        &self,
        request: &StartRequest,
        team: &[Person],
    ) -> Result<()> {
        self.runtime.sync_runtimes(team).map_err(storage)?;
        let head = resolve_department_head(team, request.department_head_name.as_deref())?;
        let model_hint = request.model_hint.as_deref();

        if !request.projects.is_empty() {
            self.initialise_multi_project(request, team, head, model_hint)
                .await
        } else {
            self.initialise_single_project(request, team, head, model_hint)
                .await
        }
    }

    /// Multi-project mode: generate every project plan concurrently, then
    /// store plans + assignments and create chat rooms in request order.
    /// Per-worker planning stays lazy so start is quick.
    async fn initialise_multi_project(
        &self,
        request: &StartRequest,
        team: &[Person],
        head: &Person,
        model_hint: Option<&str>,
    ) -> Result<()> {
        let team_by_id: std::collections::HashMap<i64, &Person> =
            team.iter().map(|p| (p.id, p)).collect();

        let prepared: Vec<(&ProjectTimeline, Vec<Person>)> = request
            .projects
            .iter()
            .filter_map(|timeline| {
                let project_team: Vec<Person> = if timeline.assigned_person_ids.is_empty() {
                    team.to_vec()
                } else {
                    timeline
                        .assigned_person_ids
                        .iter()
                        .filter_map(|id| team_by_id.get(id).map(|p| (*p).clone()))
                        .collect()
                };
                (!project_team.is_empty()).then_some((timeline, project_team))
            })
            .collect();

        let futures = prepared.iter().map(|(timeline, project_team)| async move {
            let ctx = ProjectPlanContext {
                department_head: head,
                project_name: &timeline.project_name,
                project_summary: &timeline.project_summary,
                duration_weeks: timeline.duration_weeks,
                team: project_team,
                model_hint,
            };
            self.planner_service.project_plan(&ctx).await
        });
        let results = futures_util::future::join_all(futures).await;

        for ((timeline, project_team), result) in prepared.iter().zip(results) {
            let plan_result = result.map_err(|e| {
                SimError::Planning(format!(
                    "unable to generate project plan for '{}': {e}",
                    timeline.project_name
                ))
            })?;
            self.store_one_project(timeline, project_team, head, &plan_result)
                .await?;
        }
        Ok(())
    }

    /// Single-project mode: one plan, one chat room, and eager day-0
    /// planning for the whole team.
    async fn initialise_single_project(
        &self,
        request: &StartRequest,
        team: &[Person],
        head: &Person,
        model_hint: Option<&str>,
    ) -> Result<()> {
        let project_name = request
            .project_name
            .as_deref()
            .ok_or_else(|| SimError::InputInvalid("project_name is required".into()))?;
        let timeline = ProjectTimeline {
            project_name: project_name.to_string(),
            project_summary: request.project_summary.clone().unwrap_or_default(),
            duration_weeks: request.duration_weeks,
            start_week: 1,
            assigned_person_ids: Vec::new(),
        };
        let plan = self
            .create_one_project(&timeline, team, head, model_hint)
            .await?;

        for person in team {
            let daily = self
                .planning
                .generate_daily_plan(person, 0, &plan, team, model_hint)
                .await?;
            let task = officesim_planning::PlanningTask {
                person: person.clone(),
                project: plan.clone(),
                daily_plan_text: daily.content,
                tick: 0,
                reason: "initialisation".to_string(),
                adjustments: Vec::new(),
                all_active_projects: None,
            };
            self.planning
                .generate_hourly_plan(&task, team, model_hint)
                .await?;
        }
        Ok(())
    }

    async fn create_one_project(
        &self,
        timeline: &ProjectTimeline,
        project_team: &[Person],
        head: &Person,
        model_hint: Option<&str>,
    ) -> Result<officesim_core::types::ProjectPlan> {
        let ctx = ProjectPlanContext {
            department_head: head,
            project_name: &timeline.project_name,
            project_summary: &timeline.project_summary,
            duration_weeks: timeline.duration_weeks,
            team: project_team,
            model_hint,
        };
        let plan_result = self.planner_service.project_plan(&ctx).await.map_err(|e| {
            SimError::Planning(format!(
                "unable to generate project plan for '{}': {e}",
                timeline.project_name
            ))
        })?;
        self.store_one_project(timeline, project_team, head, &plan_result)
            .await
    }

    async fn store_one_project(
        &self,
        timeline: &ProjectTimeline,
        project_team: &[Person],
        head: &Person,
        plan_result: &officesim_core::types::PlanResult,
    ) -> Result<officesim_core::types::ProjectPlan> {
        let plan = self
            .projects
            .store_project_plan(
                &timeline.project_name,
                &timeline.project_summary,
                plan_result,
                Some(head.id),
                timeline.duration_weeks,
                timeline.start_week,
                &timeline.assigned_person_ids,
            )
            .map_err(storage)?;

        let handles: Vec<String> = project_team.iter().map(|p| p.chat_handle.clone()).collect();
        match self
            .projects
            .create_project_chat_room(plan.id, &timeline.project_name, &handles, self.chat.as_ref())
            .await
        {
            Ok(Some(slug)) => info!(%slug, project = %timeline.project_name, "project chat room ready"),
            Ok(None) => {}
            Err(e) => warn!(project = %timeline.project_name, error = %e, "chat room bookkeeping failed"),
        }
        Ok(plan)
    }

    /// Each worker opens day 1 with a chat ping and, half an hour later, a
    /// kickoff email toward their first collaborator.
    fn schedule_kickoff_comms(&self, active: &[Person]) {
        for person in active {
            let (start_tick_of_day, _) = self.ticks.work_hours_ticks(person.id);
            let kickoff_tick = 1 + start_tick_of_day.max(0) + 5;
            let recipients = self.select_collaborators(person, active);
            let Some(target) = recipients.first() else {
                continue;
            };
            self.hub.schedule_direct(
                person.id,
                kickoff_tick,
                CommChannel::Chat,
                &target.chat_handle,
                self.locale.kickoff_chat(),
            );
            self.hub.schedule_direct(
                person.id,
                kickoff_tick + 30,
                CommChannel::Email,
                &target.email_address,
                self.locale.kickoff_email(),
            );
        }
    }
}

/// Seed from an explicit request value, else SHA-256 of the project name.
fn derive_seed(request: Option<&StartRequest>) -> u64 {
    if let Some(request) = request {
        if let Some(seed) = request.random_seed {
            return seed;
        }
    }
    let project_name = request
        .and_then(|r| {
            r.projects
                .first()
                .map(|p| p.project_name.as_str())
                .or(r.project_name.as_deref())
        })
        .unwrap_or("officesim-default");
    let digest = Sha256::digest(project_name.as_bytes());
    u64::from_be_bytes(digest[..8].try_into().expect("sha256 digest >= 8 bytes"))
}

fn resolve_department_head<'a>(
    people: &'a [Person],
    requested_name: Option<&str>,
) -> Result<&'a Person> {
    if let Some(name) = requested_name {
        return people.iter().find(|p| p.name == name).ok_or_else(|| {
            SimError::InputInvalid(format!(
                "department head '{name}' not found among registered personas"
            ))
        });
    }
    Ok(people
        .iter()
        .find(|p| p.is_department_head)
        .unwrap_or(&people[0]))
}

/// Apply include/exclude filters from the start request. Unknown includes
/// are an error; an empty result after excludes is an error.
fn resolve_active_people(
    request: Option<&StartRequest>,
    available: &[Person],
) -> Result<Vec<Person>> {
    let Some(request) = request else {
        return Ok(available.to_vec());
    };

    let include_ids: HashSet<i64> = request.include_person_ids.iter().copied().collect();
    let include_names: HashSet<String> = request
        .include_person_names
        .iter()
        .map(|n| n.trim().to_lowercase())
        .filter(|n| !n.is_empty())
        .collect();

    let matched: Vec<Person> = if include_ids.is_empty() && include_names.is_empty() {
        available.to_vec()
    } else {
        let matched: Vec<Person> = available
            .iter()
            .filter(|p| include_ids.contains(&p.id) || include_names.contains(&p.name.to_lowercase()))
            .cloned()
            .collect();
        let matched_ids: HashSet<i64> = matched.iter().map(|p| p.id).collect();
        let matched_names: HashSet<String> =
            matched.iter().map(|p| p.name.to_lowercase()).collect();
        let mut missing: Vec<String> = Vec::new();
        let mut missing_ids: Vec<i64> =
            include_ids.difference(&matched_ids).copied().collect();
        missing_ids.sort_unstable();
        if !missing_ids.is_empty() {
            missing.push(format!(
                "ids {}",
                missing_ids
                    .iter()
                    .map(|id| id.to_string())
                    .collect::<Vec<_>>()
                    .join(", ")
            ));
        }
        let mut missing_names: Vec<&String> =
            include_names.difference(&matched_names).collect();
        missing_names.sort();
        if !missing_names.is_empty() {
            missing.push(format!(
                "names {}",
                missing_names
                    .iter()
                    .map(|s| s.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            ));
        }
        if !missing.is_empty() {
            return Err(SimError::InputInvalid(format!(
                "requested personas not found: {}",
                missing.join("; ")
            )));
        }
        matched
    };

    let exclude_ids: HashSet<i64> = request.exclude_person_ids.iter().copied().collect();
    let exclude_names: HashSet<String> = request
        .exclude_person_names
        .iter()
        .map(|n| n.trim().to_lowercase())
        .filter(|n| !n.is_empty())
        .collect();
    let filtered: Vec<Person> = matched
        .into_iter()
        .filter(|p| !exclude_ids.contains(&p.id) && !exclude_names.contains(&p.name.to_lowercase()))
        .collect();
    if filtered.is_empty() {
        return Err(SimError::InputInvalid(
            "no personas remain after applying include/exclude filters".into(),
        ));
    }
    Ok(filtered)
}
