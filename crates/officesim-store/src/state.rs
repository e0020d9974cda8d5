use std::collections::HashMap;
use std::sync::Mutex;

use rusqlite::params;
use tracing::info;

use officesim_core::types::{SimulationStatus, StatusOverride};

use crate::db::{now_iso, Db};
use crate::error::Result;

/// Simulation-state singleton, tick log, and worker status overrides.
///
/// Overrides are cached in memory (they are read on every tick) and kept
/// in sync with `worker_status_overrides` on every mutation.
pub struct StateStore {
    db: Db,
    overrides: Mutex<HashMap<i64, (String, i64)>>,
}

impl StateStore {
    /// Wrap the shared handle, ensure the singleton row exists, and load
    /// persisted overrides.
    pub fn new(db: Db) -> Result<Self> {
        db.with(|conn| {
            conn.execute(
                "INSERT OR IGNORE INTO simulation_state(id, current_tick, is_running, auto_tick)
                 VALUES (1, 0, 0, 0)",
                [],
            )
        })?;
        let store = Self {
            db,
            overrides: Mutex::new(HashMap::new()),
        };
        store.reload_status_overrides()?;
        Ok(store)
    }

    pub fn simulation_state(&self) -> Result<SimulationStatus> {
        self.db.with(|conn| {
            conn.query_row(
                "SELECT current_tick, is_running, auto_tick FROM simulation_state WHERE id = 1",
                [],
                |row| {
                    Ok(SimulationStatus {
                        current_tick: row.get(0)?,
                        is_running: row.get::<_, i64>(1)? != 0,
                        auto_tick: row.get::<_, i64>(2)? != 0,
                    })
                },
            )
        })
    }

    /// Update the tick and append the tick-log row in one transaction.
    pub fn set_tick(&self, tick: i64, reason: &str) -> Result<()> {
        self.db.with_tx(|conn| {
            conn.execute(
                "UPDATE simulation_state SET current_tick = ?1 WHERE id = 1",
                params![tick],
            )?;
            conn.execute(
                "INSERT INTO tick_log(tick, reason, created_at) VALUES (?1, ?2, ?3)",
                params![tick, reason, now_iso()],
            )?;
            Ok(())
        })
    }

    /// Set the tick without logging; used by rewind and replay jumps.
    pub fn set_tick_silent(&self, tick: i64) -> Result<()> {
        self.db.with(|conn| {
            conn.execute(
                "UPDATE simulation_state SET current_tick = ?1 WHERE id = 1",
                params![tick],
            )
        })?;
        Ok(())
    }

    pub fn set_running(&self, running: bool) -> Result<()> {
        self.db.with(|conn| {
            conn.execute(
                "UPDATE simulation_state SET is_running = ?1 WHERE id = 1",
                params![running as i64],
            )
        })?;
        Ok(())
    }

    pub fn set_auto_tick(&self, enabled: bool) -> Result<()> {
        self.db.with(|conn| {
            conn.execute(
                "UPDATE simulation_state SET auto_tick = ?1 WHERE id = 1",
                params![enabled as i64],
            )
        })?;
        Ok(())
    }

    // --- status overrides ---------------------------------------------------

    pub fn status_overrides(&self) -> HashMap<i64, (String, i64)> {
        self.overrides.lock().unwrap().clone()
    }

    pub fn list_status_overrides(&self) -> Result<Vec<StatusOverride>> {
        self.db.with(|conn| {
            let mut stmt = conn.prepare(
                "SELECT worker_id, status, until_tick, reason FROM worker_status_overrides
                 ORDER BY worker_id",
            )?;
            let rows = stmt.query_map([], |row| {
                Ok(StatusOverride {
                    worker_id: row.get(0)?,
                    status: row.get(1)?,
                    until_tick: row.get(2)?,
                    reason: row.get(3)?,
                })
            })?;
            rows.collect()
        })
    }

    pub fn set_status_override(
        &self,
        worker_id: i64,
        status: &str,
        until_tick: i64,
        reason: &str,
    ) -> Result<()> {
        self.db.with(|conn| {
            conn.execute(
                "INSERT INTO worker_status_overrides(worker_id, status, until_tick, reason, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(worker_id) DO UPDATE SET
                     status = excluded.status,
                     until_tick = excluded.until_tick,
                     reason = excluded.reason",
                params![worker_id, status, until_tick, reason, now_iso()],
            )
        })?;
        self.overrides
            .lock()
            .unwrap()
            .insert(worker_id, (status.to_string(), until_tick));
        Ok(())
    }

    pub fn clear_status_override(&self, worker_id: i64) -> Result<()> {
        self.db.with(|conn| {
            conn.execute(
                "DELETE FROM worker_status_overrides WHERE worker_id = ?1",
                params![worker_id],
            )
        })?;
        self.overrides.lock().unwrap().remove(&worker_id);
        Ok(())
    }

    /// Clear every override whose `until_tick` has been reached. Returns the
    /// affected worker ids.
    pub fn expire_status_overrides(&self, current_tick: i64) -> Result<Vec<i64>> {
        let expired: Vec<i64> = {
            let overrides = self.overrides.lock().unwrap();
            overrides
                .iter()
                .filter(|(_, (_, until))| current_tick >= *until)
                .map(|(id, _)| *id)
                .collect()
        };
        if expired.is_empty() {
            return Ok(expired);
        }
        self.db.with_tx(|conn| {
            for worker_id in &expired {
                conn.execute(
                    "DELETE FROM worker_status_overrides WHERE worker_id = ?1",
                    params![worker_id],
                )?;
            }
            Ok(())
        })?;
        let mut overrides = self.overrides.lock().unwrap();
        for worker_id in &expired {
            overrides.remove(worker_id);
        }
        Ok(expired)
    }

    pub fn clear_all_status_overrides(&self) -> Result<()> {
        self.db
            .with(|conn| conn.execute("DELETE FROM worker_status_overrides", []))?;
        self.overrides.lock().unwrap().clear();
        Ok(())
    }

    fn reload_status_overrides(&self) -> Result<()> {
        let loaded: Vec<(i64, String, i64)> = self.db.with(|conn| {
            let mut stmt =
                conn.prepare("SELECT worker_id, status, until_tick FROM worker_status_overrides")?;
            let rows = stmt.query_map([], |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?))
            })?;
            rows.collect()
        })?;
        let mut overrides = self.overrides.lock().unwrap();
        overrides.clear();
        for (id, status, until) in loaded {
            overrides.insert(id, (status, until));
        }
        Ok(())
    }

    // --- resets -------------------------------------------------------------

    /// Truncate all derived tables and zero the state row. When
    /// `preserve_personas` is false, personas and schedule blocks go too.
    pub fn reset_simulation(&self, preserve_personas: bool) -> Result<()> {
        self.db.with_tx(|conn| {
            for table in [
                "worker_plans",
                "hourly_summaries",
                "daily_reports",
                "simulation_reports",
                "events",
                "tick_log",
                "worker_runtime_messages",
                "worker_exchange_log",
                "worker_status_overrides",
                "project_assignments",
                "project_chat_rooms",
                "project_plans",
            ] {
                conn.execute(&format!("DELETE FROM {table}"), [])?;
            }
            if !preserve_personas {
                conn.execute("DELETE FROM schedule_blocks", [])?;
                conn.execute("DELETE FROM people", [])?;
            }
            conn.execute(
                "UPDATE simulation_state SET current_tick = 0, is_running = 0, auto_tick = 0
                 WHERE id = 1",
                [],
            )?;
            Ok(())
        })?;
        self.overrides.lock().unwrap().clear();
        info!(preserve_personas, "simulation state reset");
        Ok(())
    }

    /// Drop and recreate the whole schema. Caller must have stopped the
    /// tick scheduler first.
    pub fn hard_reset(&self) -> Result<()> {
        self.db.recreate_schema()?;
        self.db.with(|conn| {
            conn.execute(
                "INSERT OR IGNORE INTO simulation_state(id, current_tick, is_running, auto_tick)
                 VALUES (1, 0, 0, 0)",
                [],
            )
        })?;
        self.overrides.lock().unwrap().clear();
        Ok(())
    }

    // --- rewind helpers -----------------------------------------------------

    pub fn delete_tick_log_after(&self, cutoff: i64) -> Result<usize> {
        self.db
            .with(|conn| conn.execute("DELETE FROM tick_log WHERE tick > ?1", params![cutoff]))
    }

    pub fn delete_events_after(&self, cutoff: i64) -> Result<usize> {
        self.db.with(|conn| {
            conn.execute(
                "DELETE FROM events WHERE at_tick IS NOT NULL AND at_tick > ?1",
                params![cutoff],
            )
        })
    }

    pub fn tick_log_len(&self) -> Result<i64> {
        self.db
            .with(|conn| conn.query_row("SELECT COUNT(*) FROM tick_log", [], |r| r.get(0)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> StateStore {
        StateStore::new(Db::open_in_memory().unwrap()).unwrap()
    }

    #[test]
    fn state_row_starts_zeroed() {
        let s = store();
        let st = s.simulation_state().unwrap();
        assert_eq!(st.current_tick, 0);
        assert!(!st.is_running);
        assert!(!st.auto_tick);
    }

    #[test]
    fn set_tick_appends_log_atomically() {
        let s = store();
        s.set_tick(1, "manual").unwrap();
        s.set_tick(2, "manual").unwrap();
        assert_eq!(s.simulation_state().unwrap().current_tick, 2);
        assert_eq!(s.tick_log_len().unwrap(), 2);
    }

    #[test]
    fn overrides_expire_at_until_tick() {
        let s = store();
        s.db
            .with(|conn| {
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
        s.set_status_override(1, "SickLeave", 10, "test").unwrap();
        assert!(s.expire_status_overrides(9).unwrap().is_empty());
        assert_eq!(s.expire_status_overrides(10).unwrap(), vec![1]);
        assert!(s.status_overrides().is_empty());
        assert!(s.list_status_overrides().unwrap().is_empty());
    }

    #[test]
    fn reset_preserves_personas_when_asked() {
        let s = store();
        s.db
            .with(|conn| {
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
        s.set_tick(5, "manual").unwrap();
        s.reset_simulation(true).unwrap();
        let st = s.simulation_state().unwrap();
        assert_eq!(st.current_tick, 0);
        let people: i64 = s
            .db
            .with(|conn| conn.query_row("SELECT COUNT(*) FROM people", [], |r| r.get(0)))
            .unwrap();
        assert_eq!(people, 1);
        assert_eq!(s.tick_log_len().unwrap(), 0);

        s.reset_simulation(false).unwrap();
        let people: i64 = s
            .db
            .with(|conn| conn.query_row("SELECT COUNT(*) FROM people", [], |r| r.get(0)))
            .unwrap();
        assert_eq!(people, 0);
    }
}
