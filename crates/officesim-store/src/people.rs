use std::collections::BTreeMap;

use rusqlite::params;
use tracing::{info, instrument};

use officesim_core::types::{Person, PersonDraft, ScheduleBlock};

use crate::db::{now_iso, Db};
use crate::error::{Result, StoreError};

/// Persona persistence. Personas are created once and treated as immutable
/// during a run; temporary state lives in status overrides.
pub struct PeopleStore {
    db: Db,
}

impl PeopleStore {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    /// Validate and insert a persona (with schedule blocks) in one
    /// transaction. The persona markdown is rendered here, once.
    #[instrument(skip(self, draft), fields(name = %draft.name))]
    pub fn create(&self, draft: &PersonDraft) -> Result<Person> {
        if draft.name.trim().is_empty() {
            return Err(StoreError::InvalidInput("persona name is empty".into()));
        }
        if draft.skills.is_empty() || draft.personality.is_empty() {
            return Err(StoreError::InvalidInput(
                "skills and personality must each include at least one entry".into(),
            ));
        }
        if self.find_id_by_name(&draft.name)?.is_some() {
            return Err(StoreError::InvalidInput(format!(
                "persona '{}' already exists",
                draft.name
            )));
        }

        let markdown = render_persona_markdown(draft);
        let id = self.db.with_tx(|conn| {
            conn.execute(
                "INSERT INTO people(name, role, timezone, work_hours, break_frequency,
                    communication_style, email_address, chat_handle, is_department_head,
                    team_name, skills, personality, objectives, metrics,
                    planning_guidelines, event_playbook, statuses, persona_markdown, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19)",
                params![
                    draft.name,
                    draft.role,
                    draft.timezone,
                    draft.work_hours,
                    draft.break_frequency,
                    draft.communication_style,
                    draft.email_address,
                    draft.chat_handle,
                    draft.is_department_head as i64,
                    draft.team_name,
                    to_json(&draft.skills),
                    to_json(&draft.personality),
                    to_json(&draft.objectives),
                    to_json(&draft.metrics),
                    to_json(&draft.planning_guidelines),
                    serde_json::to_string(&draft.event_playbook).unwrap_or_else(|_| "{}".into()),
                    to_json(&draft.statuses),
                    markdown,
                    now_iso(),
                ],
            )?;
            let id = conn.last_insert_rowid();
            for block in &draft.schedule {
                conn.execute(
                    "INSERT INTO schedule_blocks(person_id, start, end, activity)
                     VALUES (?1, ?2, ?3, ?4)",
                    params![id, block.start, block.end, block.activity],
                )?;
            }
            Ok(id)
        })?;
        info!(person_id = id, "persona created");
        self.get(id)
    }

    pub fn get(&self, id: i64) -> Result<Person> {
        let mut person = self
            .db
            .with(|conn| {
                conn.query_row(
                    &format!("{PERSON_SELECT} WHERE id = ?1"),
                    params![id],
                    row_to_person,
                )
            })
            .map_err(|e| match e {
                StoreError::Database(rusqlite::Error::QueryReturnedNoRows) => {
                    StoreError::NotFound(format!("person {id}"))
                }
                other => other,
            })?;
        person.schedule = self.schedule_for(id)?;
        Ok(person)
    }

    pub fn list(&self) -> Result<Vec<Person>> {
        let mut people: Vec<Person> = self.db.with(|conn| {
            let mut stmt = conn.prepare(&format!("{PERSON_SELECT} ORDER BY id"))?;
            let rows = stmt.query_map([], row_to_person)?;
            rows.collect()
        })?;
        for person in &mut people {
            person.schedule = self.schedule_for(person.id)?;
        }
        Ok(people)
    }

    pub fn delete_by_name(&self, name: &str) -> Result<bool> {
        let n = self
            .db
            .with(|conn| conn.execute("DELETE FROM people WHERE name = ?1", params![name]))?;
        Ok(n > 0)
    }

    fn find_id_by_name(&self, name: &str) -> Result<Option<i64>> {
        self.db.with(|conn| {
            conn.query_row(
                "SELECT id FROM people WHERE name = ?1",
                params![name],
                |row| row.get::<_, i64>(0),
            )
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(other),
            })
        })
    }

    fn schedule_for(&self, person_id: i64) -> Result<Vec<ScheduleBlock>> {
        self.db.with(|conn| {
            let mut stmt = conn.prepare(
                "SELECT start, end, activity FROM schedule_blocks WHERE person_id = ?1 ORDER BY id",
            )?;
            let rows = stmt.query_map(params![person_id], |row| {
                Ok(ScheduleBlock {
                    start: row.get(0)?,
                    end: row.get(1)?,
                    activity: row.get(2)?,
                })
            })?;
            rows.collect()
        })
    }
}

const PERSON_SELECT: &str = "SELECT id, name, role, timezone, work_hours, break_frequency,
    communication_style, email_address, chat_handle, is_department_head, team_name,
    skills, personality, objectives, metrics, planning_guidelines, event_playbook,
    statuses, persona_markdown FROM people";

/// Map a SELECT row (column order from PERSON_SELECT) to a Person.
fn row_to_person(row: &rusqlite::Row<'_>) -> rusqlite::Result<Person> {
    let playbook: BTreeMap<String, Vec<String>> =
        serde_json::from_str(&row.get::<_, String>(16)?).unwrap_or_default();
    Ok(Person {
        id: row.get(0)?,
        name: row.get(1)?,
        role: row.get(2)?,
        timezone: row.get(3)?,
        work_hours: row.get(4)?,
        break_frequency: row.get(5)?,
        communication_style: row.get(6)?,
        email_address: row.get(7)?,
        chat_handle: row.get(8)?,
        is_department_head: row.get::<_, i64>(9)? != 0,
        team_name: row.get(10)?,
        skills: from_json(&row.get::<_, String>(11)?),
        personality: from_json(&row.get::<_, String>(12)?),
        objectives: from_json(&row.get::<_, String>(13)?),
        metrics: from_json(&row.get::<_, String>(14)?),
        planning_guidelines: from_json(&row.get::<_, String>(15)?),
        event_playbook: playbook,
        statuses: from_json(&row.get::<_, String>(17)?),
        persona_markdown: row.get(18)?,
        schedule: Vec::new(),
    })
}

fn to_json(items: &[String]) -> String {
    serde_json::to_string(items).unwrap_or_else(|_| "[]".into())
}

fn from_json(raw: &str) -> Vec<String> {
    serde_json::from_str(raw).unwrap_or_default()
}

/// Markdown used to seed planning prompts; rendered once at creation.
fn render_persona_markdown(draft: &PersonDraft) -> String {
    let mut out = String::new();
    out.push_str(&format!("# {} — {}\n\n", draft.name, draft.role));
    out.push_str(&format!(
        "- Timezone: {}\n- Work hours: {}\n- Break frequency: {}\n- Email: {}\n- Chat: @{}\n",
        draft.timezone, draft.work_hours, draft.break_frequency, draft.email_address, draft.chat_handle,
    ));
    out.push_str(&format!(
        "- Communication style: {}\n\n",
        draft.communication_style
    ));
    push_section(&mut out, "Skills", &draft.skills);
    push_section(&mut out, "Personality", &draft.personality);
    push_section(&mut out, "Objectives", &draft.objectives);
    push_section(&mut out, "Metrics", &draft.metrics);
    push_section(&mut out, "Planning guidelines", &draft.planning_guidelines);
    out.trim_end().to_string()
}

fn push_section(out: &mut String, title: &str, items: &[String]) {
    if items.is_empty() {
        return;
    }
    out.push_str(&format!("## {title}\n"));
    for item in items {
        out.push_str(&format!("- {item}\n"));
    }
    out.push('\n');
}
