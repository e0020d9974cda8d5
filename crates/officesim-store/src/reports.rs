use std::collections::HashMap;

use rusqlite::params;

use officesim_core::types::PlanResult;

use crate::db::{now_iso, Db};
use crate::error::Result;

#[derive(Debug, Clone)]
pub struct HourlySummaryRow {
    pub id: i64,
    pub person_id: i64,
    pub hour_index: i64,
    pub summary: String,
    pub model_used: String,
    pub tokens_used: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct DailyReportRow {
    pub id: i64,
    pub person_id: i64,
    pub day_index: i64,
    pub report: String,
    pub schedule_outline: String,
    pub model_used: String,
    pub tokens_used: Option<i64>,
    pub created_at: String,
}

#[derive(Debug, Clone)]
pub struct SimulationReportRow {
    pub id: i64,
    pub report: String,
    pub model_used: String,
    pub tokens_used: Option<i64>,
    pub total_ticks: i64,
    pub created_at: String,
}

/// Persistence for hourly summaries, daily reports, and run-level reports,
/// plus aggregate queries (token usage).
pub struct ReportStore {
    db: Db,
}

impl ReportStore {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    // --- hourly summaries ---------------------------------------------------

    pub fn put_hourly_summary(
        &self,
        person_id: i64,
        hour_index: i64,
        result: &PlanResult,
    ) -> Result<HourlySummaryRow> {
        self.db.with(|conn| {
            conn.execute(
                "INSERT OR REPLACE INTO hourly_summaries(person_id, hour_index, summary,
                    model_used, tokens_used, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    person_id,
                    hour_index,
                    result.content,
                    result.model_used,
                    result.tokens_used.unwrap_or(0),
                    now_iso(),
                ],
            )?;
            conn.query_row(
                "SELECT id, person_id, hour_index, summary, model_used, tokens_used
                 FROM hourly_summaries WHERE person_id = ?1 AND hour_index = ?2",
                params![person_id, hour_index],
                row_to_summary,
            )
        })
    }

    pub fn get_hourly_summary(
        &self,
        person_id: i64,
        hour_index: i64,
    ) -> Result<Option<HourlySummaryRow>> {
        self.db.with(|conn| {
            conn.query_row(
                "SELECT id, person_id, hour_index, summary, model_used, tokens_used
                 FROM hourly_summaries WHERE person_id = ?1 AND hour_index = ?2",
                params![person_id, hour_index],
                row_to_summary,
            )
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(other),
            })
        })
    }

    pub fn delete_hourly_after(&self, hour_index_cutoff: i64) -> Result<usize> {
        self.db.with(|conn| {
            conn.execute(
                "DELETE FROM hourly_summaries WHERE hour_index > ?1",
                params![hour_index_cutoff],
            )
        })
    }

    // --- daily reports ------------------------------------------------------

    pub fn put_daily_report(
        &self,
        person_id: i64,
        day_index: i64,
        schedule_outline: &str,
        result: &PlanResult,
    ) -> Result<DailyReportRow> {
        self.db.with(|conn| {
            conn.execute(
                "INSERT INTO daily_reports(person_id, day_index, report, schedule_outline,
                    model_used, tokens_used, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT(person_id, day_index) DO UPDATE SET
                     report = excluded.report,
                     schedule_outline = excluded.schedule_outline,
                     model_used = excluded.model_used,
                     tokens_used = excluded.tokens_used",
                params![
                    person_id,
                    day_index,
                    result.content,
                    schedule_outline,
                    result.model_used,
                    result.tokens_used,
                    now_iso(),
                ],
            )?;
            conn.query_row(
                "SELECT id, person_id, day_index, report, schedule_outline, model_used,
                        tokens_used, created_at
                 FROM daily_reports WHERE person_id = ?1 AND day_index = ?2",
                params![person_id, day_index],
                row_to_daily,
            )
        })
    }

    pub fn get_daily_report(
        &self,
        person_id: i64,
        day_index: i64,
    ) -> Result<Option<DailyReportRow>> {
        self.db.with(|conn| {
            conn.query_row(
                "SELECT id, person_id, day_index, report, schedule_outline, model_used,
                        tokens_used, created_at
                 FROM daily_reports WHERE person_id = ?1 AND day_index = ?2",
                params![person_id, day_index],
                row_to_daily,
            )
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(other),
            })
        })
    }

    pub fn list_daily_reports(
        &self,
        person_id: i64,
        limit: Option<i64>,
    ) -> Result<Vec<DailyReportRow>> {
        self.db.with(|conn| {
            let mut query = String::from(
                "SELECT id, person_id, day_index, report, schedule_outline, model_used,
                        tokens_used, created_at
                 FROM daily_reports WHERE person_id = ?1 ORDER BY id DESC",
            );
            if let Some(limit) = limit {
                query.push_str(&format!(" LIMIT {limit}"));
            }
            let mut stmt = conn.prepare(&query)?;
            let rows = stmt.query_map(params![person_id], row_to_daily)?;
            rows.collect()
        })
    }

    pub fn delete_daily_after(&self, day_index_cutoff: i64) -> Result<usize> {
        self.db.with(|conn| {
            conn.execute(
                "DELETE FROM daily_reports WHERE day_index > ?1",
                params![day_index_cutoff],
            )
        })
    }

    pub fn max_daily_report_day(&self) -> Result<Option<i64>> {
        self.db.with(|conn| {
            conn.query_row("SELECT MAX(day_index) FROM daily_reports", [], |r| {
                r.get::<_, Option<i64>>(0)
            })
        })
    }

    /// Concatenated digest of all daily reports, oldest first; input to the
    /// final simulation report.
    pub fn daily_reports_digest(&self) -> Result<String> {
        let lines: Vec<String> = self.db.with(|conn| {
            let mut stmt = conn.prepare(
                "SELECT person_id, day_index, report FROM daily_reports
                 ORDER BY person_id, day_index",
            )?;
            let rows = stmt.query_map([], |row| {
                let person_id: i64 = row.get(0)?;
                let day_index: i64 = row.get(1)?;
                let report: String = row.get(2)?;
                Ok(format!("Person {person_id} Day {day_index}: {report}"))
            })?;
            rows.collect()
        })?;
        if lines.is_empty() {
            return Ok("No daily reports were generated.".to_string());
        }
        Ok(lines.join("\n"))
    }

    // --- simulation reports -------------------------------------------------

    pub fn put_simulation_report(
        &self,
        total_ticks: i64,
        result: &PlanResult,
    ) -> Result<SimulationReportRow> {
        self.db.with(|conn| {
            conn.execute(
                "INSERT INTO simulation_reports(report, model_used, tokens_used, total_ticks,
                    created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    result.content,
                    result.model_used,
                    result.tokens_used,
                    total_ticks,
                    now_iso(),
                ],
            )?;
            let id = conn.last_insert_rowid();
            conn.query_row(
                "SELECT id, report, model_used, tokens_used, total_ticks, created_at
                 FROM simulation_reports WHERE id = ?1",
                params![id],
                |row| {
                    Ok(SimulationReportRow {
                        id: row.get(0)?,
                        report: row.get(1)?,
                        model_used: row.get(2)?,
                        tokens_used: row.get(3)?,
                        total_ticks: row.get(4)?,
                        created_at: row.get(5)?,
                    })
                },
            )
        })
    }

    // --- aggregates ---------------------------------------------------------

    /// Token spend per model across every generated artifact.
    pub fn token_usage(&self) -> Result<HashMap<String, i64>> {
        let rows: Vec<(String, i64)> = self.db.with(|conn| {
            let mut stmt = conn.prepare(
                "SELECT model_used, COALESCE(tokens_used, 0) FROM project_plans
                 UNION ALL
                 SELECT model_used, COALESCE(tokens_used, 0) FROM worker_plans
                 UNION ALL
                 SELECT model_used, COALESCE(tokens_used, 0) FROM daily_reports
                 UNION ALL
                 SELECT model_used, COALESCE(tokens_used, 0) FROM simulation_reports",
            )?;
            let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
            rows.collect()
        })?;
        let mut usage = HashMap::new();
        for (model, tokens) in rows {
            *usage.entry(model).or_insert(0) += tokens;
        }
        Ok(usage)
    }
}

fn row_to_summary(row: &rusqlite::Row<'_>) -> rusqlite::Result<HourlySummaryRow> {
    Ok(HourlySummaryRow {
        id: row.get(0)?,
        person_id: row.get(1)?,
        hour_index: row.get(2)?,
        summary: row.get(3)?,
        model_used: row.get(4)?,
        tokens_used: row.get(5)?,
    })
}

fn row_to_daily(row: &rusqlite::Row<'_>) -> rusqlite::Result<DailyReportRow> {
    Ok(DailyReportRow {
        id: row.get(0)?,
        person_id: row.get(1)?,
        day_index: row.get(2)?,
        report: row.get(3)?,
        schedule_outline: row.get(4)?,
        model_used: row.get(5)?,
        tokens_used: row.get(6)?,
        created_at: row.get(7)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Db;

    fn setup() -> ReportStore {
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
        ReportStore::new(db)
    }

    fn result(content: &str) -> PlanResult {
        PlanResult {
            content: content.into(),
            model_used: "stub".into(),
            tokens_used: Some(7),
        }
    }

    #[test]
    fn hourly_summary_unique_per_hour() {
        let store = setup();
        store.put_hourly_summary(1, 0, &result("first")).unwrap();
        store.put_hourly_summary(1, 0, &result("second")).unwrap();
        let row = store.get_hourly_summary(1, 0).unwrap().unwrap();
        assert_eq!(row.summary, "second");
    }

    #[test]
    fn daily_report_unique_per_day() {
        let store = setup();
        store.put_daily_report(1, 0, "outline", &result("r1")).unwrap();
        store.put_daily_report(1, 0, "outline", &result("r2")).unwrap();
        let row = store.get_daily_report(1, 0).unwrap().unwrap();
        assert_eq!(row.report, "r2");
        assert_eq!(store.list_daily_reports(1, None).unwrap().len(), 1);
    }

    #[test]
    fn rewind_purges_by_index() {
        let store = setup();
        for day in 0..3 {
            store
                .put_daily_report(1, day, "outline", &result("r"))
                .unwrap();
        }
        assert_eq!(store.delete_daily_after(0).unwrap(), 2);
        assert_eq!(store.max_daily_report_day().unwrap(), Some(0));
    }

    #[test]
    fn token_usage_sums_per_model() {
        let store = setup();
        store.put_daily_report(1, 0, "o", &result("r")).unwrap();
        store.put_simulation_report(8, &result("final")).unwrap();
        let usage = store.token_usage().unwrap();
        assert_eq!(usage.get("stub"), Some(&14));
    }
}
