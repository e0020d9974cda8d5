use rusqlite::params;

use crate::db::{now_iso, Db};
use crate::error::Result;

/// One row of the communication audit trail. Every gateway send (and
/// attempted fallback) is mirrored here with its tick.
#[derive(Debug, Clone)]
pub struct ExchangeEntry {
    pub id: i64,
    pub tick: i64,
    pub sender_id: Option<i64>,
    pub recipient_id: Option<i64>,
    pub channel: String,
    pub subject: Option<String>,
    pub summary: Option<String>,
    pub created_at: String,
}

/// Append-only log of worker communications, the backing data for replay.
pub struct ExchangeLog {
    db: Db,
}

impl ExchangeLog {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    pub fn record(
        &self,
        tick: i64,
        sender_id: Option<i64>,
        recipient_id: Option<i64>,
        channel: &str,
        subject: Option<&str>,
        summary: Option<&str>,
    ) -> Result<()> {
        self.db.with(|conn| {
            conn.execute(
                "INSERT INTO worker_exchange_log(tick, sender_id, recipient_id, channel,
                    subject, summary, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![tick, sender_id, recipient_id, channel, subject, summary, now_iso()],
            )
        })?;
        Ok(())
    }

    /// Highest tick with logged traffic; the replay boundary.
    pub fn max_tick(&self) -> Result<i64> {
        self.db.with(|conn| {
            conn.query_row("SELECT MAX(tick) FROM worker_exchange_log", [], |row| {
                row.get::<_, Option<i64>>(0).map(|v| v.unwrap_or(0))
            })
        })
    }

    pub fn entries_for_tick(&self, tick: i64) -> Result<Vec<ExchangeEntry>> {
        self.db.with(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, tick, sender_id, recipient_id, channel, subject, summary, created_at
                 FROM worker_exchange_log WHERE tick = ?1 ORDER BY id",
            )?;
            let rows = stmt.query_map(params![tick], row_to_entry)?;
            rows.collect()
        })
    }

    /// `(emails, chats)` totals across the whole log.
    pub fn channel_counts(&self) -> Result<(i64, i64)> {
        self.db.with(|conn| {
            let emails = conn.query_row(
                "SELECT COUNT(*) FROM worker_exchange_log WHERE channel = 'email'",
                [],
                |r| r.get(0),
            )?;
            let chats = conn.query_row(
                "SELECT COUNT(*) FROM worker_exchange_log WHERE channel = 'chat'",
                [],
                |r| r.get(0),
            )?;
            Ok((emails, chats))
        })
    }

    pub fn delete_after_tick(&self, cutoff: i64) -> Result<usize> {
        self.db.with(|conn| {
            conn.execute(
                "DELETE FROM worker_exchange_log WHERE tick > ?1",
                params![cutoff],
            )
        })
    }
}

fn row_to_entry(row: &rusqlite::Row<'_>) -> rusqlite::Result<ExchangeEntry> {
    Ok(ExchangeEntry {
        id: row.get(0)?,
        tick: row.get(1)?,
        sender_id: row.get(2)?,
        recipient_id: row.get(3)?,
        channel: row.get(4)?,
        subject: row.get(5)?,
        summary: row.get(6)?,
        created_at: row.get(7)?,
    })
}
