//! `officesim-projects` — project plans, assignments, and per-project chat
//! rooms.
//!
//! A project with no assignment rows is team-wide: everyone works on it.
//! Each active project owns exactly one chat room, created on start and
//! archived when the project completes.

use std::sync::Mutex;

use chrono::Utc;
use rusqlite::params;
use tracing::{info, warn};

use officesim_core::types::{PlanResult, ProjectPlan, ProjectWithTeam, TeamMember};
use officesim_gateways::ChatGateway;
use officesim_store::{Db, Result};

pub struct ProjectManager {
    db: Db,
    /// Most-recent plan, invalidated on reset.
    cache: Mutex<Option<ProjectPlan>>,
}

impl ProjectManager {
    pub fn new(db: Db) -> Self {
        Self {
            db,
            cache: Mutex::new(None),
        }
    }

    /// Plan by id, or the most recently stored plan when `None`.
    pub fn get_project_plan(&self, project_id: Option<i64>) -> Result<Option<ProjectPlan>> {
        if project_id.is_none() {
            if let Some(cached) = self.cache.lock().unwrap().clone() {
                return Ok(Some(cached));
            }
        }
        let plan = self.db.with(|conn| {
            let query = match project_id {
                Some(_) => format!("{PROJECT_SELECT} WHERE id = ?1"),
                None => format!("{PROJECT_SELECT} ORDER BY id DESC LIMIT 1"),
            };
            let result = match project_id {
                Some(id) => conn.query_row(&query, params![id], row_to_project),
                None => conn.query_row(&query, [], row_to_project),
            };
            result.map(Some).or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(other),
            })
        })?;
        if project_id.is_none() {
            if let Some(plan) = &plan {
                *self.cache.lock().unwrap() = Some(plan.clone());
            }
        }
        Ok(plan)
    }

    /// All projects the person works on in `week`: the union of explicitly
    /// assigned projects and projects with no assignments at all, both
    /// filtered to the active window and ordered by `start_week`.
    pub fn active_projects_for_person(&self, person_id: i64, week: i64) -> Result<Vec<ProjectPlan>> {
        self.db.with(|conn| {
            let mut assigned = {
                let mut stmt = conn.prepare(
                    "SELECT pp.id, pp.project_name, pp.project_summary, pp.plan, pp.generated_by,
                            pp.duration_weeks, pp.start_week, pp.model_used, pp.tokens_used, pp.created_at
                     FROM project_plans pp
                     INNER JOIN project_assignments pa ON pp.id = pa.project_id
                     WHERE pa.person_id = ?1 AND pp.start_week <= ?2
                       AND (pp.start_week + pp.duration_weeks - 1) >= ?2
                     ORDER BY pp.start_week ASC",
                )?;
                let rows = stmt.query_map(params![person_id, week], row_to_project)?;
                rows.collect::<rusqlite::Result<Vec<_>>>()?
            };
            let unassigned = {
                let mut stmt = conn.prepare(
                    "SELECT pp.id, pp.project_name, pp.project_summary, pp.plan, pp.generated_by,
                            pp.duration_weeks, pp.start_week, pp.model_used, pp.tokens_used, pp.created_at
                     FROM project_plans pp
                     WHERE pp.id NOT IN (SELECT DISTINCT project_id FROM project_assignments)
                       AND pp.start_week <= ?1 AND (pp.start_week + pp.duration_weeks - 1) >= ?1
                     ORDER BY pp.start_week ASC",
                )?;
                let rows = stmt.query_map(params![week], row_to_project)?;
                rows.collect::<rusqlite::Result<Vec<_>>>()?
            };
            let assigned_ids: std::collections::HashSet<i64> =
                assigned.iter().map(|p| p.id).collect();
            assigned.extend(unassigned.into_iter().filter(|p| !assigned_ids.contains(&p.id)));
            assigned.sort_by_key(|p| (p.start_week, p.id));
            Ok(assigned)
        })
    }

    /// Every project active in `week` with its resolved team (explicit
    /// assignees, or the whole roster when none exist).
    pub fn active_projects_with_assignments(&self, week: i64) -> Result<Vec<ProjectWithTeam>> {
        let projects: Vec<ProjectPlan> = self.db.with(|conn| {
            let mut stmt = conn.prepare(&format!(
                "{PROJECT_SELECT} WHERE start_week <= ?1
                   AND (start_week + duration_weeks - 1) >= ?1
                 ORDER BY start_week ASC"
            ))?;
            let rows = stmt.query_map(params![week], row_to_project)?;
            rows.collect()
        })?;

        let mut result = Vec::with_capacity(projects.len());
        for project in projects {
            let mut team: Vec<TeamMember> = self.db.with(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT p.id, p.name, p.role, p.team_name
                     FROM people p
                     INNER JOIN project_assignments pa ON p.id = pa.person_id
                     WHERE pa.project_id = ?1
                     ORDER BY p.team_name, p.name",
                )?;
                let rows = stmt.query_map(params![project.id], row_to_member)?;
                rows.collect()
            })?;
            if team.is_empty() {
                team = self.db.with(|conn| {
                    let mut stmt = conn.prepare(
                        "SELECT id, name, role, team_name FROM people ORDER BY team_name, name",
                    )?;
                    let rows = stmt.query_map([], row_to_member)?;
                    rows.collect()
                })?;
            }
            result.push(ProjectWithTeam {
                project,
                team_members: team,
            });
        }
        Ok(result)
    }

    /// Insert a plan and its assignment rows in one transaction, then cache
    /// it as the most recent plan.
    #[allow(clippy::too_many_arguments)]
    pub fn store_project_plan(
        &self,
        project_name: &str,
        project_summary: &str,
        plan_result: &PlanResult,
        generated_by: Option<i64>,
        duration_weeks: i64,
        start_week: i64,
        assigned_person_ids: &[i64],
    ) -> Result<ProjectPlan> {
        let id = self.db.with_tx(|conn| {
            conn.execute(
                "INSERT INTO project_plans(project_name, project_summary, plan, generated_by,
                    duration_weeks, start_week, model_used, tokens_used, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    project_name,
                    project_summary,
                    plan_result.content,
                    generated_by,
                    duration_weeks,
                    start_week,
                    plan_result.model_used,
                    plan_result.tokens_used,
                    Utc::now().to_rfc3339(),
                ],
            )?;
            let id = conn.last_insert_rowid();
            for person_id in assigned_person_ids {
                conn.execute(
                    "INSERT OR IGNORE INTO project_assignments(project_id, person_id, created_at)
                     VALUES (?1, ?2, ?3)",
                    params![id, person_id, Utc::now().to_rfc3339()],
                )?;
            }
            Ok(id)
        })?;
        let plan = self
            .get_project_plan(Some(id))?
            .expect("plan row just inserted");
        *self.cache.lock().unwrap() = Some(plan.clone());
        info!(project_id = id, %project_name, "project plan stored");
        Ok(plan)
    }

    /// Create the project's group chat room and record the mapping. Gateway
    /// failure is logged and reported but must not abort a start.
    pub async fn create_project_chat_room(
        &self,
        project_id: i64,
        project_name: &str,
        member_handles: &[String],
        chat: &dyn ChatGateway,
    ) -> Result<Option<String>> {
        let room_name = format!("{project_name} Team");
        let room_slug = format!("project-{project_id}-{}", slugify(project_name));

        if let Err(e) = chat
            .create_room(&room_name, member_handles, Some(&room_slug))
            .await
        {
            warn!(project_id, error = %e, "failed to create project chat room");
            return Ok(None);
        }

        self.db.with(|conn| {
            conn.execute(
                "INSERT INTO project_chat_rooms(project_id, room_slug, room_name, is_active, created_at)
                 VALUES (?1, ?2, ?3, 1, ?4)",
                params![project_id, room_slug, room_name, Utc::now().to_rfc3339()],
            )
        })?;
        info!(project_id, %room_slug, "project chat room created");
        Ok(Some(room_slug))
    }

    /// Slug of the active room for a project, if any.
    pub fn active_project_chat_room(&self, project_id: i64) -> Result<Option<String>> {
        self.db.with(|conn| {
            conn.query_row(
                "SELECT room_slug FROM project_chat_rooms
                 WHERE project_id = ?1 AND is_active = 1
                 ORDER BY created_at DESC LIMIT 1",
                params![project_id],
                |row| row.get(0),
            )
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(other),
            })
        })
    }

    /// Archive the active room. Idempotent: returns false when nothing was
    /// active.
    pub fn archive_project_chat_room(&self, project_id: i64) -> Result<bool> {
        let n = self.db.with(|conn| {
            conn.execute(
                "UPDATE project_chat_rooms
                 SET is_active = 0, archived_at = ?2
                 WHERE project_id = ?1 AND is_active = 1",
                params![project_id, Utc::now().to_rfc3339()],
            )
        })?;
        if n > 0 {
            info!(project_id, "project chat room archived");
        }
        Ok(n > 0)
    }

    /// A project is complete once the current week is past its end week.
    pub fn is_project_complete(&self, project_id: i64, current_week: i64) -> Result<bool> {
        match self.get_project_plan(Some(project_id))? {
            Some(plan) => Ok(current_week > plan.end_week()),
            None => Ok(false),
        }
    }

    /// Projects whose windows ended before `week`, most recently ended
    /// first. Feeds room archiving on auto-pause.
    pub fn completed_projects(&self, week: i64) -> Result<Vec<ProjectPlan>> {
        self.db.with(|conn| {
            let mut stmt = conn.prepare(&format!(
                "{PROJECT_SELECT} WHERE (start_week + duration_weeks - 1) < ?1
                 ORDER BY (start_week + duration_weeks - 1) DESC"
            ))?;
            let rows = stmt.query_map(params![week], row_to_project)?;
            rows.collect()
        })
    }

    /// Count of projects that have not started yet as of `week`.
    pub fn future_project_count(&self, week: i64) -> Result<i64> {
        self.db.with(|conn| {
            conn.query_row(
                "SELECT COUNT(*) FROM project_plans WHERE start_week > ?1",
                params![week],
                |r| r.get(0),
            )
        })
    }

    pub fn clear_cache(&self) {
        *self.cache.lock().unwrap() = None;
    }
}

const PROJECT_SELECT: &str = "SELECT id, project_name, project_summary, plan, generated_by,
    duration_weeks, start_week, model_used, tokens_used, created_at FROM project_plans";

fn row_to_project(row: &rusqlite::Row<'_>) -> rusqlite::Result<ProjectPlan> {
    Ok(ProjectPlan {
        id: row.get(0)?,
        project_name: row.get(1)?,
        project_summary: row.get(2)?,
        plan: row.get(3)?,
        generated_by: row.get(4)?,
        duration_weeks: row.get(5)?,
        start_week: row.get(6)?,
        model_used: row.get(7)?,
        tokens_used: row.get(8)?,
        created_at: row.get(9)?,
    })
}

fn row_to_member(row: &rusqlite::Row<'_>) -> rusqlite::Result<TeamMember> {
    Ok(TeamMember {
        id: row.get(0)?,
        name: row.get(1)?,
        role: row.get(2)?,
        team_name: row.get(3)?,
    })
}

fn slugify(name: &str) -> String {
    name.to_lowercase().replace(' ', "-")
}

#[cfg(test)]
mod tests {
    use super::*;
    use officesim_gateways::InMemoryChatGateway;

    fn plan_result() -> PlanResult {
        PlanResult {
            content: "plan body".into(),
            model_used: "stub".into(),
            tokens_used: Some(0),
        }
    }

    fn insert_person(db: &Db, id: i64, name: &str) {
        db.with(|conn| {
            conn.execute(
                "INSERT INTO people(id, name, role, timezone, work_hours, break_frequency,
                    communication_style, email_address, chat_handle, skills, personality,
                    persona_markdown, created_at)
                 VALUES (?1, ?2, 'dev', 'UTC', '09:00-17:00', 'hourly', 'direct', ?3, ?4,
                    '[]', '[]', '', 't')",
                params![id, name, format!("{name}@co"), name.to_lowercase()],
            )
        })
        .unwrap();
    }

    fn manager() -> (ProjectManager, Db) {
        let db = Db::open_in_memory().unwrap();
        insert_person(&db, 1, "Alice");
        insert_person(&db, 2, "Bob");
        (ProjectManager::new(db.clone()), db)
    }

    #[test]
    fn stored_plan_round_trips_byte_exact() {
        let (pm, _db) = manager();
        let stored = pm
            .store_project_plan("Alpha", "summary", &plan_result(), Some(1), 2, 1, &[])
            .unwrap();
        let fetched = pm.get_project_plan(None).unwrap().unwrap();
        assert_eq!(fetched.plan, stored.plan);
        assert_eq!(fetched.project_name, "Alpha");
        assert_eq!(fetched.created_at, stored.created_at);
    }

    #[test]
    fn unassigned_project_belongs_to_everyone() {
        let (pm, _db) = manager();
        pm.store_project_plan("Alpha", "s", &plan_result(), None, 1, 1, &[])
            .unwrap();
        let for_alice = pm.active_projects_for_person(1, 1).unwrap();
        let for_bob = pm.active_projects_for_person(2, 1).unwrap();
        assert_eq!(for_alice.len(), 1);
        assert_eq!(for_bob.len(), 1);
    }

    #[test]
    fn assigned_project_excludes_others() {
        let (pm, _db) = manager();
        pm.store_project_plan("Alpha", "s", &plan_result(), None, 1, 1, &[1])
            .unwrap();
        assert_eq!(pm.active_projects_for_person(1, 1).unwrap().len(), 1);
        assert!(pm.active_projects_for_person(2, 1).unwrap().is_empty());

        let with_teams = pm.active_projects_with_assignments(1).unwrap();
        assert_eq!(with_teams[0].team_members.len(), 1);
        assert_eq!(with_teams[0].team_members[0].name, "Alice");
    }

    #[test]
    fn window_filtering_orders_by_start_week() {
        let (pm, _db) = manager();
        pm.store_project_plan("Late", "s", &plan_result(), None, 2, 3, &[])
            .unwrap();
        pm.store_project_plan("Early", "s", &plan_result(), None, 4, 1, &[])
            .unwrap();
        let week3 = pm.active_projects_for_person(1, 3).unwrap();
        assert_eq!(week3.len(), 2);
        assert_eq!(week3[0].project_name, "Early");
        // Week 5: "Early" (1..4) and "Late" (3..4) are both over.
        assert!(pm.active_projects_for_person(1, 5).unwrap().is_empty());
    }

    #[test]
    fn completion_boundaries() {
        let (pm, _db) = manager();
        let plan = pm
            .store_project_plan("Alpha", "s", &plan_result(), None, 2, 3, &[])
            .unwrap();
        // start_week=3, duration=2 → end_week=4.
        assert!(!pm.is_project_complete(plan.id, 4).unwrap());
        assert!(pm.is_project_complete(plan.id, 5).unwrap());
        assert_eq!(pm.completed_projects(5).unwrap().len(), 1);
        assert_eq!(pm.future_project_count(2).unwrap(), 1);
    }

    #[tokio::test]
    async fn chat_room_lifecycle() {
        let (pm, _db) = manager();
        let plan = pm
            .store_project_plan("Alpha Launch", "s", &plan_result(), None, 1, 1, &[])
            .unwrap();
        let chat = InMemoryChatGateway::new();
        let slug = pm
            .create_project_chat_room(plan.id, "Alpha Launch", &["alice".into(), "bob".into()], &chat)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(slug, format!("project-{}-alpha-launch", plan.id));
        assert_eq!(pm.active_project_chat_room(plan.id).unwrap(), Some(slug));

        assert!(pm.archive_project_chat_room(plan.id).unwrap());
        assert!(!pm.archive_project_chat_room(plan.id).unwrap());
        assert_eq!(pm.active_project_chat_room(plan.id).unwrap(), None);
    }
}
