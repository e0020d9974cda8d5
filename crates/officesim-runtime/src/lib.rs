//! `officesim-runtime` — per-persona runtime inboxes.
//!
//! Each active worker has an in-memory FIFO inbox of [`InboundMessage`]
//! records mirrored to `worker_runtime_messages`, so queued work survives a
//! restart and is re-delivered at the next planning opportunity.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use chrono::Utc;
use rusqlite::params;
use tracing::debug;

use officesim_core::types::{InboundMessage, Person};
use officesim_store::{Db, Result};

/// Runtime state for a single worker: the pending inbox.
#[derive(Debug, Default)]
struct WorkerRuntime {
    inbox: Vec<InboundMessage>,
}

/// Manages runtime state for every active worker.
pub struct WorkerRuntimeManager {
    db: Db,
    runtimes: Mutex<HashMap<i64, WorkerRuntime>>,
}

impl WorkerRuntimeManager {
    pub fn new(db: Db) -> Self {
        Self {
            db,
            runtimes: Mutex::new(HashMap::new()),
        }
    }

    /// Align the runtime set with the active roster: load persisted
    /// messages for newly seen personas, evict runtimes for everyone else.
    pub fn sync_runtimes(&self, people: &[Person]) -> Result<()> {
        let known: HashSet<i64> = self.runtimes.lock().unwrap().keys().copied().collect();
        let mut loaded: Vec<(i64, Vec<InboundMessage>)> = Vec::new();
        for person in people {
            if !known.contains(&person.id) {
                loaded.push((person.id, self.load_messages(person.id)?));
            }
        }
        let active: HashSet<i64> = people.iter().map(|p| p.id).collect();
        let mut runtimes = self.runtimes.lock().unwrap();
        for (person_id, inbox) in loaded {
            runtimes.insert(person_id, WorkerRuntime { inbox });
        }
        runtimes.retain(|person_id, _| active.contains(person_id));
        Ok(())
    }

    /// Queue a message for a recipient. The message is persisted before
    /// this returns and the storage id is written back into the record.
    pub fn queue_message(&self, recipient: &Person, mut message: InboundMessage) -> Result<()> {
        let payload = serde_json::to_string(&message)?;
        let id = self.db.with(|conn| {
            conn.execute(
                "INSERT INTO worker_runtime_messages(recipient_id, payload, created_at)
                 VALUES (?1, ?2, ?3)",
                params![recipient.id, payload, Utc::now().to_rfc3339()],
            )?;
            Ok(conn.last_insert_rowid())
        })?;
        message.message_id = Some(id);
        let mut runtimes = self.runtimes.lock().unwrap();
        runtimes.entry(recipient.id).or_default().inbox.push(message);
        debug!(recipient_id = recipient.id, message_id = id, "message queued");
        Ok(())
    }

    /// Remove and return all pending messages in insertion order (FIFO).
    /// Persistent rows stay until the caller confirms consumption via
    /// [`Self::remove_messages`].
    pub fn drain(&self, person: &Person) -> Result<Vec<InboundMessage>> {
        {
            let mut runtimes = self.runtimes.lock().unwrap();
            if let Some(runtime) = runtimes.get_mut(&person.id) {
                return Ok(std::mem::take(&mut runtime.inbox));
            }
        }
        // First sight of this persona: whatever is persisted is the inbox.
        let inbox = self.load_messages(person.id)?;
        self.runtimes
            .lock()
            .unwrap()
            .insert(person.id, WorkerRuntime::default());
        Ok(inbox)
    }

    /// Put drained messages back (off-hours carry-over).
    pub fn requeue(&self, person_id: i64, messages: Vec<InboundMessage>) {
        let mut runtimes = self.runtimes.lock().unwrap();
        runtimes.entry(person_id).or_default().inbox.extend(messages);
    }

    pub fn has_messages(&self, person_id: i64) -> bool {
        self.runtimes
            .lock()
            .unwrap()
            .get(&person_id)
            .map(|r| !r.inbox.is_empty())
            .unwrap_or(false)
    }

    /// Delete consumed rows by storage id.
    pub fn remove_messages(&self, message_ids: &[i64]) -> Result<()> {
        if message_ids.is_empty() {
            return Ok(());
        }
        self.db.with_tx(|conn| {
            for id in message_ids {
                conn.execute(
                    "DELETE FROM worker_runtime_messages WHERE id = ?1",
                    params![id],
                )?;
            }
            Ok(())
        })
    }

    /// Drop every runtime and all persisted inbox rows.
    pub fn clear_all(&self) -> Result<()> {
        self.runtimes.lock().unwrap().clear();
        self.db
            .with(|conn| conn.execute("DELETE FROM worker_runtime_messages", []))?;
        Ok(())
    }

    fn load_messages(&self, person_id: i64) -> Result<Vec<InboundMessage>> {
        let rows: Vec<(i64, String)> = self.db.with(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, payload FROM worker_runtime_messages
                 WHERE recipient_id = ?1 ORDER BY id",
            )?;
            let rows = stmt.query_map(params![person_id], |row| Ok((row.get(0)?, row.get(1)?)))?;
            rows.collect()
        })?;
        let mut inbox = Vec::with_capacity(rows.len());
        for (id, payload) in rows {
            let mut message: InboundMessage = serde_json::from_str(&payload)?;
            message.message_id = Some(id);
            inbox.push(message);
        }
        Ok(inbox)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    use officesim_core::types::{MessageChannel, MessageKind};

    fn person(id: i64, name: &str) -> Person {
        Person {
            id,
            name: name.into(),
            role: "dev".into(),
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
            schedule: vec![],
        }
    }

    fn insert_person_row(db: &Db, id: i64, name: &str) {
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

    fn message(tick: i64, subject: &str) -> InboundMessage {
        InboundMessage {
            message_id: None,
            sender_id: 0,
            sender_name: "Simulation Manager".into(),
            subject: subject.into(),
            summary: "s".into(),
            action_item: None,
            message_type: MessageKind::Update,
            channel: MessageChannel::System,
            tick,
        }
    }

    #[test]
    fn drain_returns_fifo_and_empties_inbox() {
        let db = Db::open_in_memory().unwrap();
        insert_person_row(&db, 1, "Alice");
        let manager = WorkerRuntimeManager::new(db);
        let alice = person(1, "Alice");

        manager.queue_message(&alice, message(1, "first")).unwrap();
        manager.queue_message(&alice, message(2, "second")).unwrap();

        let drained = manager.drain(&alice).unwrap();
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].subject, "first");
        assert_eq!(drained[1].subject, "second");
        assert!(drained.iter().all(|m| m.message_id.is_some()));
        assert!(manager.drain(&alice).unwrap().is_empty());
    }

    #[test]
    fn messages_survive_a_manager_restart() {
        let db = Db::open_in_memory().unwrap();
        insert_person_row(&db, 1, "Alice");
        let alice = person(1, "Alice");

        {
            let manager = WorkerRuntimeManager::new(db.clone());
            manager.queue_message(&alice, message(1, "durable")).unwrap();
        }

        let manager = WorkerRuntimeManager::new(db);
        manager.sync_runtimes(std::slice::from_ref(&alice)).unwrap();
        let drained = manager.drain(&alice).unwrap();
        assert_eq!(drained.len(), 1);
        assert_eq!(drained[0].subject, "durable");

        // Consumption deletes the rows; a fresh drain stays empty.
        let ids: Vec<i64> = drained.iter().filter_map(|m| m.message_id).collect();
        manager.remove_messages(&ids).unwrap();
        let manager = WorkerRuntimeManager::new(manager.db.clone());
        manager.sync_runtimes(std::slice::from_ref(&alice)).unwrap();
        assert!(manager.drain(&alice).unwrap().is_empty());
    }

    #[test]
    fn sync_evicts_inactive_personas() {
        let db = Db::open_in_memory().unwrap();
        insert_person_row(&db, 1, "Alice");
        insert_person_row(&db, 2, "Bob");
        let manager = WorkerRuntimeManager::new(db);
        let alice = person(1, "Alice");
        let bob = person(2, "Bob");

        manager.sync_runtimes(&[alice.clone(), bob.clone()]).unwrap();
        manager.queue_message(&bob, message(1, "for bob")).unwrap();
        manager.sync_runtimes(std::slice::from_ref(&alice)).unwrap();
        assert!(!manager.has_messages(2));

        // Re-syncing Bob reloads his persisted message.
        manager.sync_runtimes(&[alice, bob.clone()]).unwrap();
        assert!(manager.has_messages(2));
    }

    #[test]
    fn requeue_preserves_order() {
        let db = Db::open_in_memory().unwrap();
        insert_person_row(&db, 1, "Alice");
        let manager = WorkerRuntimeManager::new(db);
        let alice = person(1, "Alice");
        manager.queue_message(&alice, message(1, "a")).unwrap();
        manager.queue_message(&alice, message(2, "b")).unwrap();
        let drained = manager.drain(&alice).unwrap();
        manager.requeue(alice.id, drained);
        let again = manager.drain(&alice).unwrap();
        assert_eq!(again[0].subject, "a");
        assert_eq!(again[1].subject, "b");
    }
}
