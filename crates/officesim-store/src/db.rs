use std::path::Path;
use std::sync::{Arc, Mutex};

use rusqlite::Connection;
use tracing::info;

use crate::error::Result;

/// Shared handle to the simulator database.
///
/// A single connection wrapped in a `Mutex`; every store clones the handle.
/// Critical sections are short and never await, so a plain mutex is
/// sufficient for the single-node target.
#[derive(Clone)]
pub struct Db {
    conn: Arc<Mutex<Connection>>,
}

impl Db {
    /// Open (or create) the database at `path` and ensure the schema.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    /// In-memory database for tests and offline runs.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        // journal_mode returns the resulting mode as a row, so this is a
        // query rather than a pragma_update.
        conn.query_row("PRAGMA journal_mode = WAL", [], |_row| Ok(()))?;
        conn.busy_timeout(std::time::Duration::from_secs(30))?;
        init_schema(&conn)?;
        apply_migrations(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run a closure against the connection.
    pub fn with<T>(&self, f: impl FnOnce(&Connection) -> rusqlite::Result<T>) -> Result<T> {
        let conn = self.conn.lock().unwrap();
        Ok(f(&conn)?)
    }

    /// Run a closure inside a single transaction; commits on `Ok`.
    pub fn with_tx<T>(&self, f: impl FnOnce(&Connection) -> rusqlite::Result<T>) -> Result<T> {
        let conn = self.conn.lock().unwrap();
        let tx = conn.unchecked_transaction()?;
        let out = f(&tx)?;
        tx.commit()?;
        Ok(out)
    }

    /// Drop every table and rebuild the schema from scratch. Only safe to
    /// call while the tick scheduler is stopped.
    pub fn recreate_schema(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let tables: Vec<String> = {
            let mut stmt = conn.prepare(
                "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%'",
            )?;
            let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
            rows.filter_map(|r| r.ok()).collect()
        };
        conn.execute_batch("PRAGMA foreign_keys = OFF")?;
        for table in tables {
            conn.execute_batch(&format!("DROP TABLE IF EXISTS \"{table}\""))?;
        }
        conn.execute_batch("PRAGMA foreign_keys = ON")?;
        init_schema(&conn)?;
        apply_migrations(&conn)?;
        info!("schema recreated");
        Ok(())
    }
}

/// Create all tables. Safe to call on every startup (idempotent).
pub fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    create_people_tables(conn)?;
    create_state_tables(conn)?;
    create_project_tables(conn)?;
    create_plan_tables(conn)?;
    create_runtime_tables(conn)?;
    Ok(())
}

fn create_people_tables(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS people (
            id                  INTEGER PRIMARY KEY AUTOINCREMENT,
            name                TEXT NOT NULL UNIQUE,
            role                TEXT NOT NULL,
            timezone            TEXT NOT NULL,
            work_hours          TEXT NOT NULL,
            break_frequency     TEXT NOT NULL,
            communication_style TEXT NOT NULL,
            email_address       TEXT NOT NULL,
            chat_handle         TEXT NOT NULL,
            is_department_head  INTEGER NOT NULL DEFAULT 0,
            team_name           TEXT,
            skills              TEXT NOT NULL,  -- JSON array
            personality         TEXT NOT NULL,  -- JSON array
            objectives          TEXT NOT NULL DEFAULT '[]',
            metrics             TEXT NOT NULL DEFAULT '[]',
            planning_guidelines TEXT NOT NULL DEFAULT '[]',
            event_playbook      TEXT NOT NULL DEFAULT '{}',
            statuses            TEXT NOT NULL DEFAULT '[]',
            persona_markdown    TEXT NOT NULL,
            created_at          TEXT NOT NULL
        );
        CREATE TABLE IF NOT EXISTS schedule_blocks (
            id        INTEGER PRIMARY KEY AUTOINCREMENT,
            person_id INTEGER NOT NULL REFERENCES people(id) ON DELETE CASCADE,
            start     TEXT NOT NULL,
            end       TEXT NOT NULL,
            activity  TEXT NOT NULL
        );",
    )
}

fn create_state_tables(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS simulation_state (
            id           INTEGER PRIMARY KEY CHECK (id = 1),
            current_tick INTEGER NOT NULL,
            is_running   INTEGER NOT NULL,
            auto_tick    INTEGER NOT NULL DEFAULT 0
        );
        CREATE TABLE IF NOT EXISTS tick_log (
            id         INTEGER PRIMARY KEY AUTOINCREMENT,
            tick       INTEGER NOT NULL,
            reason     TEXT NOT NULL,
            created_at TEXT NOT NULL
        );
        CREATE TABLE IF NOT EXISTS events (
            id         INTEGER PRIMARY KEY AUTOINCREMENT,
            type       TEXT NOT NULL,
            target_ids TEXT NOT NULL,  -- JSON array
            project_id TEXT,
            at_tick    INTEGER,
            payload    TEXT,
            created_at TEXT NOT NULL
        );
        CREATE TABLE IF NOT EXISTS worker_status_overrides (
            worker_id  INTEGER PRIMARY KEY REFERENCES people(id) ON DELETE CASCADE,
            status     TEXT NOT NULL,
            until_tick INTEGER NOT NULL,
            reason     TEXT NOT NULL,
            created_at TEXT NOT NULL
        );",
    )
}

fn create_project_tables(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS project_plans (
            id              INTEGER PRIMARY KEY AUTOINCREMENT,
            project_name    TEXT NOT NULL,
            project_summary TEXT NOT NULL,
            plan            TEXT NOT NULL,
            generated_by    INTEGER REFERENCES people(id) ON DELETE SET NULL,
            duration_weeks  INTEGER NOT NULL,
            start_week      INTEGER NOT NULL DEFAULT 1,
            model_used      TEXT NOT NULL,
            tokens_used     INTEGER,
            created_at      TEXT NOT NULL
        );
        CREATE TABLE IF NOT EXISTS project_assignments (
            id         INTEGER PRIMARY KEY AUTOINCREMENT,
            project_id INTEGER NOT NULL REFERENCES project_plans(id) ON DELETE CASCADE,
            person_id  INTEGER NOT NULL REFERENCES people(id) ON DELETE CASCADE,
            created_at TEXT NOT NULL,
            UNIQUE(project_id, person_id)
        );
        CREATE TABLE IF NOT EXISTS project_chat_rooms (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            project_id  INTEGER NOT NULL REFERENCES project_plans(id) ON DELETE CASCADE,
            room_slug   TEXT NOT NULL UNIQUE,
            room_name   TEXT NOT NULL,
            is_active   INTEGER NOT NULL DEFAULT 1,
            created_at  TEXT NOT NULL,
            archived_at TEXT
        );",
    )
}

fn create_plan_tables(conn: &Connection) -> rusqlite::Result<()> {
    // UNIQUE(person_id, plan_type, tick) makes plan writes idempotent: one
    // daily row per (person, day_index), one hourly row per (person, tick).
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS worker_plans (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            person_id   INTEGER NOT NULL REFERENCES people(id) ON DELETE CASCADE,
            tick        INTEGER NOT NULL,
            plan_type   TEXT NOT NULL,
            content     TEXT NOT NULL,
            model_used  TEXT NOT NULL,
            tokens_used INTEGER,
            context     TEXT,
            created_at  TEXT NOT NULL,
            UNIQUE(person_id, plan_type, tick)
        );
        CREATE TABLE IF NOT EXISTS hourly_summaries (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            person_id   INTEGER NOT NULL REFERENCES people(id) ON DELETE CASCADE,
            hour_index  INTEGER NOT NULL,
            summary     TEXT NOT NULL,
            model_used  TEXT NOT NULL,
            tokens_used INTEGER,
            created_at  TEXT NOT NULL,
            UNIQUE(person_id, hour_index)
        );
        CREATE TABLE IF NOT EXISTS daily_reports (
            id               INTEGER PRIMARY KEY AUTOINCREMENT,
            person_id        INTEGER NOT NULL REFERENCES people(id) ON DELETE CASCADE,
            day_index        INTEGER NOT NULL,
            report           TEXT NOT NULL,
            schedule_outline TEXT NOT NULL,
            model_used       TEXT NOT NULL,
            tokens_used      INTEGER,
            created_at       TEXT NOT NULL,
            UNIQUE(person_id, day_index)
        );
        CREATE TABLE IF NOT EXISTS simulation_reports (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            report      TEXT NOT NULL,
            model_used  TEXT NOT NULL,
            tokens_used INTEGER,
            total_ticks INTEGER NOT NULL,
            created_at  TEXT NOT NULL
        );",
    )
}

fn create_runtime_tables(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS worker_runtime_messages (
            id           INTEGER PRIMARY KEY AUTOINCREMENT,
            recipient_id INTEGER NOT NULL REFERENCES people(id) ON DELETE CASCADE,
            payload      TEXT NOT NULL,  -- JSON InboundMessage
            created_at   TEXT NOT NULL
        );
        CREATE TABLE IF NOT EXISTS worker_exchange_log (
            id           INTEGER PRIMARY KEY AUTOINCREMENT,
            tick         INTEGER NOT NULL,
            sender_id    INTEGER REFERENCES people(id) ON DELETE SET NULL,
            recipient_id INTEGER REFERENCES people(id) ON DELETE SET NULL,
            channel      TEXT NOT NULL,
            subject      TEXT,
            summary      TEXT,
            created_at   TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_exchange_tick
            ON worker_exchange_log(tick);",
    )
}

/// Add columns introduced after the initial schema. Checked against
/// `PRAGMA table_info` so re-running is harmless.
pub fn apply_migrations(conn: &Connection) -> rusqlite::Result<()> {
    let has_column = |table: &str, column: &str| -> rusqlite::Result<bool> {
        let mut stmt = conn.prepare(&format!("PRAGMA table_info({table})"))?;
        let names = stmt.query_map([], |row| row.get::<_, String>(1))?;
        for name in names {
            if name? == column {
                return Ok(true);
            }
        }
        Ok(false)
    };

    if !has_column("people", "team_name")? {
        conn.execute("ALTER TABLE people ADD COLUMN team_name TEXT", [])?;
    }
    if !has_column("simulation_state", "auto_tick")? {
        conn.execute(
            "ALTER TABLE simulation_state ADD COLUMN auto_tick INTEGER NOT NULL DEFAULT 0",
            [],
        )?;
    }
    if !has_column("project_plans", "start_week")? {
        conn.execute(
            "ALTER TABLE project_plans ADD COLUMN start_week INTEGER NOT NULL DEFAULT 1",
            [],
        )?;
    }
    Ok(())
}

/// RFC 3339 timestamp for `created_at` columns.
pub(crate) fn now_iso() -> String {
    chrono::Utc::now().to_rfc3339()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_init_is_idempotent() {
        let db = Db::open_in_memory().unwrap();
        db.with(|conn| init_schema(conn)).unwrap();
        db.with(|conn| apply_migrations(conn)).unwrap();
    }

    #[test]
    fn recreate_schema_drops_rows() {
        let db = Db::open_in_memory().unwrap();
        db.with(|conn| {
            conn.execute(
                "INSERT INTO tick_log(tick, reason, created_at) VALUES (1, 'x', 't')",
                [],
            )
        })
        .unwrap();
        db.recreate_schema().unwrap();
        let count: i64 = db
            .with(|conn| conn.query_row("SELECT COUNT(*) FROM tick_log", [], |r| r.get(0)))
            .unwrap();
        assert_eq!(count, 0);
    }
}

