use std::fmt;

use rusqlite::params;

use officesim_core::types::PlanResult;

use crate::db::{now_iso, Db};
use crate::error::Result;

/// Kind of worker plan. Daily plans are keyed by day index, hourly plans by
/// absolute tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanType {
    Daily,
    Hourly,
}

impl PlanType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlanType::Daily => "daily",
            PlanType::Hourly => "hourly",
        }
    }
}

impl fmt::Display for PlanType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct WorkerPlanRow {
    pub id: i64,
    pub person_id: i64,
    pub tick: i64,
    pub plan_type: String,
    pub content: String,
    pub model_used: String,
    pub tokens_used: Option<i64>,
    pub context: Option<String>,
    pub created_at: String,
}

/// Persistence for worker plans (daily/hourly).
pub struct PlanStore {
    db: Db,
}

impl PlanStore {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    /// Upsert on `(person_id, plan_type, tick)`: re-planning the same slot
    /// replaces the row instead of accumulating duplicates.
    pub fn put_worker_plan(
        &self,
        person_id: i64,
        tick: i64,
        plan_type: PlanType,
        result: &PlanResult,
        context: Option<&str>,
    ) -> Result<WorkerPlanRow> {
        self.db.with(|conn| {
            conn.execute(
                "INSERT INTO worker_plans(person_id, tick, plan_type, content, model_used,
                    tokens_used, context, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                 ON CONFLICT(person_id, plan_type, tick) DO UPDATE SET
                     content = excluded.content,
                     model_used = excluded.model_used,
                     tokens_used = excluded.tokens_used,
                     context = excluded.context",
                params![
                    person_id,
                    tick,
                    plan_type.as_str(),
                    result.content,
                    result.model_used,
                    result.tokens_used,
                    context,
                    now_iso(),
                ],
            )?;
            conn.query_row(
                "SELECT id, person_id, tick, plan_type, content, model_used, tokens_used,
                        context, created_at
                 FROM worker_plans WHERE person_id = ?1 AND plan_type = ?2 AND tick = ?3",
                params![person_id, plan_type.as_str(), tick],
                row_to_plan,
            )
        })
    }

    /// Insert a batch of hourly plans in one transaction (end-of-tick flush).
    pub fn batch_put_worker_plans(
        &self,
        plans: &[(i64, i64, PlanType, PlanResult, Option<String>)],
    ) -> Result<()> {
        if plans.is_empty() {
            return Ok(());
        }
        self.db.with_tx(|conn| {
            for (person_id, tick, plan_type, result, context) in plans {
                conn.execute(
                    "INSERT INTO worker_plans(person_id, tick, plan_type, content, model_used,
                        tokens_used, context, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                     ON CONFLICT(person_id, plan_type, tick) DO UPDATE SET
                         content = excluded.content,
                         model_used = excluded.model_used,
                         tokens_used = excluded.tokens_used,
                         context = excluded.context",
                    params![
                        person_id,
                        tick,
                        plan_type.as_str(),
                        result.content,
                        result.model_used,
                        result.tokens_used,
                        context.as_deref(),
                        now_iso(),
                    ],
                )?;
            }
            Ok(())
        })
    }

    /// Fetch the latest plan of a type; with `exact_tick` the tick must
    /// match exactly (idempotence probe), otherwise it is an upper bound.
    pub fn get_worker_plan(
        &self,
        person_id: i64,
        plan_type: PlanType,
        tick: Option<i64>,
        exact_tick: bool,
    ) -> Result<Option<WorkerPlanRow>> {
        self.db.with(|conn| {
            let mut query = String::from(
                "SELECT id, person_id, tick, plan_type, content, model_used, tokens_used,
                        context, created_at
                 FROM worker_plans WHERE person_id = ?1 AND plan_type = ?2",
            );
            let mut bound: Vec<Box<dyn rusqlite::ToSql>> =
                vec![Box::new(person_id), Box::new(plan_type.as_str())];
            if let Some(tick) = tick {
                query.push_str(if exact_tick {
                    " AND tick = ?3"
                } else {
                    " AND tick <= ?3"
                });
                bound.push(Box::new(tick));
            }
            query.push_str(" ORDER BY id DESC LIMIT 1");
            let refs: Vec<&dyn rusqlite::ToSql> = bound.iter().map(|b| b.as_ref()).collect();
            conn.query_row(&query, refs.as_slice(), row_to_plan)
                .map(Some)
                .or_else(|e| match e {
                    rusqlite::Error::QueryReturnedNoRows => Ok(None),
                    other => Err(other),
                })
        })
    }

    pub fn list_worker_plans(
        &self,
        person_id: i64,
        plan_type: Option<PlanType>,
        limit: Option<i64>,
    ) -> Result<Vec<WorkerPlanRow>> {
        self.db.with(|conn| {
            let mut query = String::from(
                "SELECT id, person_id, tick, plan_type, content, model_used, tokens_used,
                        context, created_at
                 FROM worker_plans WHERE person_id = ?1",
            );
            if let Some(pt) = plan_type {
                query.push_str(&format!(" AND plan_type = '{}'", pt.as_str()));
            }
            query.push_str(" ORDER BY id DESC");
            if let Some(limit) = limit {
                query.push_str(&format!(" LIMIT {limit}"));
            }
            let mut stmt = conn.prepare(&query)?;
            let rows = stmt.query_map(params![person_id], row_to_plan)?;
            rows.collect()
        })
    }

    /// `(tick, content)` pairs for hourly plans in an inclusive tick range.
    pub fn hourly_plans_in_range(
        &self,
        person_id: i64,
        start_tick: i64,
        end_tick: i64,
    ) -> Result<Vec<(i64, String)>> {
        self.db.with(|conn| {
            let mut stmt = conn.prepare(
                "SELECT tick, content FROM worker_plans
                 WHERE person_id = ?1 AND plan_type = 'hourly' AND tick BETWEEN ?2 AND ?3
                 ORDER BY tick",
            )?;
            let rows = stmt.query_map(params![person_id, start_tick, end_tick], |row| {
                Ok((row.get(0)?, row.get(1)?))
            })?;
            rows.collect()
        })
    }

    pub fn delete_after_tick(&self, cutoff: i64) -> Result<usize> {
        self.db
            .with(|conn| conn.execute("DELETE FROM worker_plans WHERE tick > ?1", params![cutoff]))
    }

    pub fn count_daily_plans(&self, person_id: i64, day_index: i64) -> Result<i64> {
        self.db.with(|conn| {
            conn.query_row(
                "SELECT COUNT(*) FROM worker_plans
                 WHERE person_id = ?1 AND plan_type = 'daily' AND tick = ?2",
                params![person_id, day_index],
                |r| r.get(0),
            )
        })
    }
}

fn row_to_plan(row: &rusqlite::Row<'_>) -> rusqlite::Result<WorkerPlanRow> {
    Ok(WorkerPlanRow {
        id: row.get(0)?,
        person_id: row.get(1)?,
        tick: row.get(2)?,
        plan_type: row.get(3)?,
        content: row.get(4)?,
        model_used: row.get(5)?,
        tokens_used: row.get(6)?,
        context: row.get(7)?,
        created_at: row.get(8)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Db;

    fn setup() -> PlanStore {
        let db = Db::open_in_memory().unwrap();
        db.with(|conn| {
            conn.execute(
                "INSERT INTO people(name, role, timezone, work_hours, break_frequency,
                    communication_style, email_address, chat_handle, skills, personality,
                    persona_markdown, created_at)
                 VALUES ('A', 'dev', 'UTC', '09:00-17:00', 'hourly', 'direct', 'a@co', 'a',
                    '[]', '[]', '', 't')",
                [],
            )
        })
        .unwrap();
        PlanStore::new(db)
    }

    fn result(content: &str) -> PlanResult {
        PlanResult {
            content: content.into(),
            model_used: "stub".into(),
            tokens_used: Some(0),
        }
    }

    #[test]
    fn daily_plan_upsert_is_idempotent() {
        let store = setup();
        store
            .put_worker_plan(1, 0, PlanType::Daily, &result("v1"), None)
            .unwrap();
        store
            .put_worker_plan(1, 0, PlanType::Daily, &result("v2"), None)
            .unwrap();
        assert_eq!(store.count_daily_plans(1, 0).unwrap(), 1);
        let row = store
            .get_worker_plan(1, PlanType::Daily, Some(0), true)
            .unwrap()
            .unwrap();
        assert_eq!(row.content, "v2");
    }

    #[test]
    fn exact_tick_lookup_misses_other_ticks() {
        let store = setup();
        store
            .put_worker_plan(1, 3, PlanType::Hourly, &result("h3"), None)
            .unwrap();
        assert!(store
            .get_worker_plan(1, PlanType::Hourly, Some(4), true)
            .unwrap()
            .is_none());
        assert!(store
            .get_worker_plan(1, PlanType::Hourly, Some(4), false)
            .unwrap()
            .is_some());
    }

    #[test]
    fn range_query_and_rewind_purge() {
        let store = setup();
        for tick in 1..=5 {
            store
                .put_worker_plan(1, tick, PlanType::Hourly, &result(&format!("t{tick}")), None)
                .unwrap();
        }
        assert_eq!(store.hourly_plans_in_range(1, 2, 4).unwrap().len(), 3);
        assert_eq!(store.delete_after_tick(3).unwrap(), 2);
        assert!(store
            .get_worker_plan(1, PlanType::Hourly, Some(4), true)
            .unwrap()
            .is_none());
    }

    #[test]
    fn batch_put_persists_all() {
        let store = setup();
        let batch: Vec<_> = (1..=3)
            .map(|t| (1, t, PlanType::Hourly, result(&format!("t{t}")), None))
            .collect();
        store.batch_put_worker_plans(&batch).unwrap();
        assert_eq!(store.hourly_plans_in_range(1, 1, 3).unwrap().len(), 3);
    }
}
