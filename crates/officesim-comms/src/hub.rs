use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};

use tracing::{debug, warn};
use uuid::Uuid;

use officesim_core::locale::Locale;
use officesim_core::types::{Person, RecentEmail};
use officesim_gateways::{
    ChatGateway, EmailGateway, OutgoingDm, OutgoingEmail, OutgoingRoomMessage,
};
use officesim_ticks::TickManager;

use crate::parser::{parse_scheduled_comms, CommAction, CommChannel};

/// Reserved chat targets routed to the active project's group room.
const GROUP_KEYWORDS: [&str; 4] = ["team", "project", "group", "everyone"];

/// Recent-email ring size per persona.
const RECENT_EMAILS_CAP: usize = 10;

type DedupKey = (i64, CommChannel, String, Vec<String>, String, String);
type ContactKey = (CommChannel, String, Vec<String>);

/// Lookups the dispatcher borrows from the engine, passed as closures so
/// the hub never references engine types.
pub struct DispatchLookups<'a> {
    pub current_week: &'a (dyn Fn() -> i64 + Sync),
    /// `(person_id, week)` → ids of that person's active projects, ordered.
    pub active_project_ids: &'a (dyn Fn(i64, i64) -> Vec<i64> + Sync),
    /// Project id → active room slug.
    pub project_room: &'a (dyn Fn(i64) -> Option<String> + Sync),
}

/// Resolution of a raw scheduled-comm target against the roster.
enum TargetMatch {
    Email(String),
    Chat(String),
    /// A persona name matched: both addressing handles are known.
    Both { email: String, chat: String },
    Group(String),
    /// A chat target that is not in the roster; sent as-is.
    FreeChat(String),
    Rejected,
}

/// Centralized communication scheduling and dispatch.
pub struct CommunicationHub {
    email: Arc<dyn EmailGateway>,
    chat: Arc<dyn ChatGateway>,
    ticks: Arc<TickManager>,
    locale: Locale,
    cooldown_ticks: i64,
    /// Lowercased external addresses allowed as email targets.
    external_stakeholders: HashSet<String>,
    /// Per-tick dedup set, cleared at the top of every tick.
    dedup: Mutex<HashSet<DedupKey>>,
    /// `(channel, sender, recipients)` → last accepted tick.
    last_contact: Mutex<HashMap<ContactKey, i64>>,
    /// person id → tick → pending actions.
    scheduled: Mutex<HashMap<i64, HashMap<i64, Vec<CommAction>>>>,
    /// person id → bounded ring of recent emails (sent and received).
    recent_emails: Mutex<HashMap<i64, VecDeque<RecentEmail>>>,
}

impl CommunicationHub {
    pub fn new(
        email: Arc<dyn EmailGateway>,
        chat: Arc<dyn ChatGateway>,
        ticks: Arc<TickManager>,
        locale: Locale,
        cooldown_ticks: i64,
        external_stakeholders: &[String],
    ) -> Self {
        Self {
            email,
            chat,
            ticks,
            locale,
            cooldown_ticks,
            external_stakeholders: external_stakeholders
                .iter()
                .map(|s| s.to_lowercase())
                .collect(),
            dedup: Mutex::new(HashSet::new()),
            last_contact: Mutex::new(HashMap::new()),
            scheduled: Mutex::new(HashMap::new()),
            recent_emails: Mutex::new(HashMap::new()),
        }
    }

    /// Clear the per-tick dedup set; called once at the top of each tick.
    pub fn reset_tick_sends(&self) {
        self.dedup.lock().unwrap().clear();
    }

    /// Drop all ephemeral state (reset).
    pub fn clear_runtime(&self) {
        self.dedup.lock().unwrap().clear();
        self.last_contact.lock().unwrap().clear();
        self.scheduled.lock().unwrap().clear();
        self.recent_emails.lock().unwrap().clear();
    }

    /// Dedup + cooldown gate. An accepted send updates both structures, so
    /// call this only when the send will actually be attempted.
    pub fn can_send(
        &self,
        tick: i64,
        channel: CommChannel,
        sender: &str,
        recipients: &[String],
        subject: Option<&str>,
        body: &str,
    ) -> bool {
        let mut key_recipients: Vec<String> = recipients.to_vec();
        key_recipients.sort();
        key_recipients.dedup();

        let dedup_key = (
            tick,
            channel,
            sender.to_string(),
            key_recipients.clone(),
            subject.unwrap_or("").to_string(),
            body.trim().to_string(),
        );
        let mut dedup = self.dedup.lock().unwrap();
        if dedup.contains(&dedup_key) {
            return false;
        }

        let contact_key = (channel, sender.to_string(), key_recipients);
        let mut last_contact = self.last_contact.lock().unwrap();
        if let Some(last) = last_contact.get(&contact_key) {
            if tick - last < self.cooldown_ticks {
                return false;
            }
        }

        dedup.insert(dedup_key);
        last_contact.insert(contact_key, tick);
        true
    }

    /// Parse a just-generated hourly plan and queue its future sends.
    pub fn schedule_from_hourly_plan(&self, person: &Person, plan_text: &str, current_tick: i64) {
        let actions = parse_scheduled_comms(plan_text, current_tick, self.ticks.hours_per_day());
        if actions.is_empty() {
            return;
        }
        let mut scheduled = self.scheduled.lock().unwrap();
        let by_tick = scheduled.entry(person.id).or_default();
        for (tick, action) in actions {
            let entries = by_tick.entry(tick).or_default();
            if !entries.contains(&action) {
                debug!(person_id = person.id, tick, channel = action.channel.as_str(),
                    "scheduled communication queued");
                entries.push(action);
            }
        }
    }

    /// Queue a single communication for a specific tick (kickoff comms).
    pub fn schedule_direct(
        &self,
        person_id: i64,
        tick: i64,
        channel: CommChannel,
        target: &str,
        payload: &str,
    ) {
        let mut scheduled = self.scheduled.lock().unwrap();
        scheduled
            .entry(person_id)
            .or_default()
            .entry(tick)
            .or_default()
            .push(CommAction {
                channel,
                target: target.to_string(),
                payload: payload.to_string(),
                reply_to_email_id: None,
                cc: Vec::new(),
                bcc: Vec::new(),
            });
    }

    /// Recent emails visible to a persona, oldest first.
    pub fn recent_emails_for(&self, person_id: i64, limit: usize) -> Vec<RecentEmail> {
        let rings = self.recent_emails.lock().unwrap();
        rings
            .get(&person_id)
            .map(|ring| {
                let skip = ring.len().saturating_sub(limit);
                ring.iter().skip(skip).cloned().collect()
            })
            .unwrap_or_default()
    }

    /// `(thread_id, original_sender)` for a reply directive, if the email
    /// id is still in the persona's ring.
    pub fn thread_for_reply(&self, person_id: i64, email_id: &str) -> Option<(String, String)> {
        let rings = self.recent_emails.lock().unwrap();
        rings.get(&person_id).and_then(|ring| {
            ring.iter()
                .find(|e| e.email_id == email_id)
                .map(|e| (e.thread_id.clone(), e.from.clone()))
        })
    }

    /// Append a sent email to the sender's ring and every recipient's ring.
    fn record_email(&self, record: RecentEmail, sender_id: i64, recipient_ids: &[i64]) {
        let mut rings = self.recent_emails.lock().unwrap();
        for person_id in std::iter::once(sender_id).chain(recipient_ids.iter().copied()) {
            let ring = rings.entry(person_id).or_default();
            if ring.len() == RECENT_EMAILS_CAP {
                ring.pop_front();
            }
            ring.push_back(record.clone());
        }
    }

    /// Dispatch everything scheduled for `(person, current_tick)`.
    /// Returns `(emails_sent, chats_sent)`.
    pub async fn dispatch_scheduled(
        &self,
        person: &Person,
        current_tick: i64,
        people_by_id: &HashMap<i64, Person>,
        lookups: &DispatchLookups<'_>,
    ) -> (u64, u64) {
        let actions: Vec<CommAction> = {
            let mut scheduled = self.scheduled.lock().unwrap();
            scheduled
                .get_mut(&person.id)
                .and_then(|by_tick| by_tick.remove(&current_tick))
                .unwrap_or_default()
        };
        if actions.is_empty() {
            return (0, 0);
        }

        let mut emails = 0u64;
        let mut chats = 0u64;
        let sent_at_iso = self
            .ticks
            .sim_datetime_for_tick(current_tick)
            .map(|dt| dt.to_rfc3339());

        for action in actions {
            match action.channel {
                CommChannel::Email => {
                    emails += self
                        .dispatch_email(person, current_tick, &action, people_by_id, &sent_at_iso)
                        .await;
                }
                CommChannel::Chat => {
                    chats += self
                        .dispatch_chat(person, current_tick, &action, people_by_id, lookups, &sent_at_iso)
                        .await;
                }
            }
        }
        (emails, chats)
    }

    async fn dispatch_email(
        &self,
        person: &Person,
        current_tick: i64,
        action: &CommAction,
        people_by_id: &HashMap<i64, Person>,
        sent_at_iso: &Option<String>,
    ) -> u64 {
        // Replies inherit thread and target from the parent email.
        let mut thread_id: Option<String> = None;
        let mut raw_target = action.target.clone();
        if let Some(reply_id) = &action.reply_to_email_id {
            match self.thread_for_reply(person.id, reply_id) {
                Some((thread, original_sender)) => {
                    thread_id = Some(thread);
                    raw_target = original_sender;
                }
                None => {
                    warn!(
                        person = %person.name,
                        email_id = %reply_id,
                        "reply email-id not found in recent emails; dropping directive"
                    );
                    return 0;
                }
            }
        }

        let email_to = match self.match_target(&raw_target, people_by_id) {
            TargetMatch::Email(addr) | TargetMatch::Both { email: addr, .. } => addr,
            _ => return 0,
        };

        let (subject, body) = match action.payload.split_once(" | ") {
            Some((subject, body)) => (subject.trim().to_string(), body.trim().to_string()),
            None => (
                self.locale.update_generic(&person.name),
                action.payload.clone(),
            ),
        };

        let cc_emails = {
            let resolved = self.resolve_email_list(&action.cc, people_by_id);
            if resolved.is_empty() {
                self.suggest_cc(person, &email_to, people_by_id)
            } else {
                resolved
            }
        };
        let bcc_emails = self.resolve_email_list(&action.bcc, people_by_id);

        let mut recipients: Vec<String> = Vec::with_capacity(1 + cc_emails.len() + bcc_emails.len());
        recipients.push(email_to.clone());
        recipients.extend(cc_emails.iter().cloned());
        recipients.extend(bcc_emails.iter().cloned());

        let thread_id =
            thread_id.unwrap_or_else(|| format!("thread-{}", &Uuid::new_v4().simple().to_string()[..16]));

        if !self.can_send(
            current_tick,
            CommChannel::Email,
            &person.email_address,
            &recipients,
            Some(&subject),
            &body,
        ) {
            return 0;
        }

        let result = self
            .email
            .send_email(OutgoingEmail {
                sender: person.email_address.clone(),
                to: vec![email_to.clone()],
                cc: cc_emails.clone(),
                bcc: bcc_emails,
                subject: subject.clone(),
                body,
                thread_id: Some(thread_id.clone()),
                sent_at_iso: sent_at_iso.clone(),
                persona_id: Some(person.id),
            })
            .await;

        match result {
            Ok(sent) => {
                let recipient_ids: Vec<i64> = std::iter::once(&email_to)
                    .chain(cc_emails.iter())
                    .filter_map(|addr| {
                        people_by_id
                            .values()
                            .find(|p| p.email_address.eq_ignore_ascii_case(addr))
                            .map(|p| p.id)
                    })
                    .collect();
                self.record_email(
                    RecentEmail {
                        email_id: sent.id,
                        from: person.email_address.clone(),
                        to: email_to,
                        subject,
                        thread_id,
                        sent_at_tick: current_tick,
                    },
                    person.id,
                    &recipient_ids,
                );
                1
            }
            Err(e) => {
                warn!(person = %person.name, error = %e, "scheduled email failed; dropped");
                0
            }
        }
    }

    async fn dispatch_chat(
        &self,
        person: &Person,
        current_tick: i64,
        action: &CommAction,
        people_by_id: &HashMap<i64, Person>,
        lookups: &DispatchLookups<'_>,
        sent_at_iso: &Option<String>,
    ) -> u64 {
        let chat_to = match self.match_target(&action.target, people_by_id) {
            TargetMatch::Group(keyword) => {
                return self
                    .dispatch_group_chat(person, current_tick, &action.payload, &keyword, lookups, sent_at_iso)
                    .await;
            }
            TargetMatch::Chat(handle)
            | TargetMatch::FreeChat(handle)
            | TargetMatch::Both { chat: handle, .. } => handle,
            TargetMatch::Email(_) | TargetMatch::Rejected => return 0,
        };

        // Mirroring guard: only the lexicographically smaller handle sends,
        // so both sides planning the same exchange yields one DM.
        if person.chat_handle.to_lowercase() > chat_to.to_lowercase() {
            return 0;
        }

        if !self.can_send(
            current_tick,
            CommChannel::Chat,
            &person.chat_handle,
            std::slice::from_ref(&chat_to),
            None,
            &action.payload,
        ) {
            return 0;
        }

        let result = self
            .chat
            .send_dm(OutgoingDm {
                sender: person.chat_handle.clone(),
                recipient: chat_to,
                body: action.payload.clone(),
                sent_at_iso: sent_at_iso.clone(),
                persona_id: Some(person.id),
            })
            .await;
        match result {
            Ok(()) => 1,
            Err(e) => {
                warn!(person = %person.name, error = %e, "scheduled DM failed; dropped");
                0
            }
        }
    }

    async fn dispatch_group_chat(
        &self,
        person: &Person,
        current_tick: i64,
        payload: &str,
        keyword: &str,
        lookups: &DispatchLookups<'_>,
        sent_at_iso: &Option<String>,
    ) -> u64 {
        let week = (lookups.current_week)();
        let project_ids = (lookups.active_project_ids)(person.id, week);
        let Some(first_project) = project_ids.first() else {
            debug!(person = %person.name, keyword, "no active project for group chat target");
            return 0;
        };
        let Some(room_slug) = (lookups.project_room)(*first_project) else {
            debug!(project_id = first_project, "no active chat room for project");
            return 0;
        };

        if !self.can_send(
            current_tick,
            CommChannel::Chat,
            &person.chat_handle,
            std::slice::from_ref(&room_slug),
            None,
            payload,
        ) {
            return 0;
        }

        let result = self
            .chat
            .send_room_message(
                &room_slug,
                OutgoingRoomMessage {
                    sender: person.chat_handle.clone(),
                    body: payload.to_string(),
                    sent_at_iso: sent_at_iso.clone(),
                    persona_id: Some(person.id),
                },
            )
            .await;
        match result {
            Ok(()) => 1,
            Err(e) => {
                warn!(error = %e, "group chat message failed; dropped");
                0
            }
        }
    }

    /// Resolve a raw target string against group keywords, the roster, and
    /// the external allow-list. Unknown email-shaped targets are rejected
    /// as hallucinations.
    fn match_target(&self, raw: &str, people_by_id: &HashMap<i64, Person>) -> TargetMatch {
        let val = raw.trim().to_lowercase();
        if val.is_empty() {
            return TargetMatch::Rejected;
        }
        if GROUP_KEYWORDS.contains(&val.as_str()) {
            return TargetMatch::Group(val);
        }
        for p in people_by_id.values() {
            if p.email_address.to_lowercase() == val {
                return TargetMatch::Email(p.email_address.clone());
            }
        }
        for p in people_by_id.values() {
            let handle = p.chat_handle.to_lowercase();
            if handle == val || format!("@{handle}") == val {
                return TargetMatch::Chat(p.chat_handle.clone());
            }
        }
        for p in people_by_id.values() {
            if p.name.to_lowercase() == val {
                return TargetMatch::Both {
                    email: p.email_address.clone(),
                    chat: p.chat_handle.clone(),
                };
            }
        }
        if val.contains('@') {
            if self.external_stakeholders.contains(&val) {
                return TargetMatch::Email(val);
            }
            warn!(target = %raw, "rejecting hallucinated email address");
            return TargetMatch::Rejected;
        }
        TargetMatch::FreeChat(raw.trim().to_string())
    }

    /// Resolve a cc/bcc token list to roster or allow-listed addresses,
    /// dropping parsing artifacts and duplicates.
    fn resolve_email_list(&self, raw: &[String], people_by_id: &HashMap<i64, Person>) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for token in raw {
            let mut cleaned = token.trim().to_string();
            for artifact in [" bcc", " cc", "bcc ", "cc "] {
                cleaned = cleaned.replace(artifact, "");
            }
            let cleaned = cleaned.trim();
            if cleaned.is_empty() || cleaned == "cc" || cleaned == "bcc" {
                continue;
            }
            if let TargetMatch::Email(addr) = self.match_target(cleaned, people_by_id) {
                if !out.iter().any(|a| a.eq_ignore_ascii_case(&addr)) {
                    out.push(addr);
                }
            }
        }
        out
    }

    /// CC heuristic for emails without an explicit list: the department
    /// head plus one peer picked by role affinity.
    fn suggest_cc(
        &self,
        sender: &Person,
        primary_to: &str,
        people_by_id: &HashMap<i64, Person>,
    ) -> Vec<String> {
        let mut cc: Vec<String> = Vec::new();
        let primary = people_by_id
            .values()
            .find(|p| p.email_address.eq_ignore_ascii_case(primary_to));

        if let Some(head) = people_by_id.values().find(|p| p.is_department_head) {
            let head_addr = head.email_address.to_lowercase();
            if head_addr != sender.email_address.to_lowercase()
                && head_addr != primary_to.to_lowercase()
            {
                cc.push(head.email_address.clone());
            }
        }

        let want_peer = role_peer(&sender.role)
            .or_else(|| primary.and_then(|p| role_peer(&p.role)));
        if let Some(want) = want_peer {
            // Stable order keeps the suggestion deterministic.
            let mut candidates: Vec<&Person> = people_by_id.values().collect();
            candidates.sort_by_key(|p| p.id);
            for p in candidates {
                if p.id == sender.id || primary.map(|pr| pr.id) == Some(p.id) {
                    continue;
                }
                if p.role.to_lowercase().contains(want) {
                    let addr = p.email_address.to_lowercase();
                    if addr != sender.email_address.to_lowercase()
                        && addr != primary_to.to_lowercase()
                        && !cc.iter().any(|c| c.eq_ignore_ascii_case(&p.email_address))
                    {
                        cc.push(p.email_address.clone());
                        break;
                    }
                }
            }
        }
        cc
    }
}

/// Role-affinity pairing: who a sender in this role usually loops in.
fn role_peer(role: &str) -> Option<&'static str> {
    let role = role.trim().to_lowercase();
    if role.is_empty() {
        None
    } else if role.contains("devops") || role.contains("site reliability") {
        Some("dev")
    } else if role.contains("developer") || role.contains("engineer") || role.contains("dev") {
        Some("designer")
    } else if role.contains("design") {
        Some("dev")
    } else if role.contains("product") || role.contains("pm") || role.contains("manager") {
        Some("dev")
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    use officesim_gateways::{InMemoryChatGateway, InMemoryEmailGateway};

    fn person(id: i64, name: &str, role: &str, head: bool) -> Person {
        Person {
            id,
            name: name.into(),
            role: role.into(),
            timezone: "UTC".into(),
            work_hours: "09:00-17:00".into(),
            break_frequency: "hourly".into(),
            communication_style: "direct".into(),
            email_address: format!("{}@co", name.to_lowercase()),
            chat_handle: name.to_lowercase(),
            is_department_head: head,
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

    struct Fixture {
        hub: CommunicationHub,
        email: Arc<InMemoryEmailGateway>,
        chat: Arc<InMemoryChatGateway>,
        people: HashMap<i64, Person>,
    }

    fn fixture(external: &[String]) -> Fixture {
        let email = Arc::new(InMemoryEmailGateway::new());
        let chat = Arc::new(InMemoryChatGateway::new());
        let ticks = Arc::new(TickManager::new(8, 1.0));
        ticks.set_base_datetime(Some(
            "2026-01-05T00:00:00Z".parse::<chrono::DateTime<chrono::Utc>>().unwrap(),
        ));
        let hub = CommunicationHub::new(
            email.clone() as Arc<dyn EmailGateway>,
            chat.clone() as Arc<dyn ChatGateway>,
            ticks,
            Locale::En,
            10,
            external,
        );
        let mut people = HashMap::new();
        for p in [
            person(1, "Alice", "Developer", true),
            person(2, "Bob", "Designer", false),
            person(3, "Carol", "DevOps", false),
        ] {
            people.insert(p.id, p);
        }
        Fixture {
            hub,
            email,
            chat,
            people,
        }
    }

    fn no_project_lookups() -> (
        Box<dyn Fn() -> i64 + Sync>,
        Box<dyn Fn(i64, i64) -> Vec<i64> + Sync>,
        Box<dyn Fn(i64) -> Option<String> + Sync>,
    ) {
        (
            Box::new(|| 1),
            Box::new(|_, _| Vec::new()),
            Box::new(|_| None),
        )
    }

    async fn dispatch(fx: &Fixture, person_id: i64, tick: i64) -> (u64, u64) {
        let (week, projects, room) = no_project_lookups();
        let lookups = DispatchLookups {
            current_week: &*week,
            active_project_ids: &*projects,
            project_room: &*room,
        };
        fx.hub
            .dispatch_scheduled(&fx.people[&person_id], tick, &fx.people, &lookups)
            .await
    }

    #[tokio::test]
    async fn duplicate_scheduled_lines_send_once() {
        let fx = fixture(&[]);
        let alice = fx.people[&1].clone();
        let plan = "Email at 10:00 to bob@co: Ping | Hello\nEmail at 10:00 to bob@co: Ping | Hello";
        fx.hub.schedule_from_hourly_plan(&alice, plan, 1);

        fx.hub.reset_tick_sends();
        let (emails, chats) = dispatch(&fx, 1, 4).await;
        assert_eq!((emails, chats), (1, 0));
        assert_eq!(fx.email.emails().len(), 1);
    }

    #[tokio::test]
    async fn cooldown_blocks_until_window_elapses() {
        let fx = fixture(&[]);
        let alice = fx.people[&1].clone();

        fx.hub
            .schedule_direct(1, 12, CommChannel::Email, "bob@co", "Ping | first");
        fx.hub
            .schedule_direct(1, 15, CommChannel::Email, "bob@co", "Ping | second");
        fx.hub
            .schedule_direct(1, 22, CommChannel::Email, "bob@co", "Ping | third");
        let _ = alice;

        fx.hub.reset_tick_sends();
        assert_eq!(dispatch(&fx, 1, 12).await.0, 1);
        fx.hub.reset_tick_sends();
        // 15 - 12 < 10 → blocked.
        assert_eq!(dispatch(&fx, 1, 15).await.0, 0);
        fx.hub.reset_tick_sends();
        assert_eq!(dispatch(&fx, 1, 22).await.0, 1);
    }

    #[tokio::test]
    async fn hallucinated_recipient_is_dropped() {
        let fx = fixture(&[]);
        fx.hub.schedule_direct(
            1,
            4,
            CommChannel::Email,
            "team@nobody.example",
            "Update | hi",
        );
        fx.hub.reset_tick_sends();
        assert_eq!(dispatch(&fx, 1, 4).await, (0, 0));
        assert!(fx.email.emails().is_empty());
    }

    #[tokio::test]
    async fn allow_listed_external_address_is_accepted() {
        let fx = fixture(&["client@example.com".to_string()]);
        fx.hub.schedule_direct(
            1,
            4,
            CommChannel::Email,
            "client@example.com",
            "Update | hi",
        );
        fx.hub.reset_tick_sends();
        assert_eq!(dispatch(&fx, 1, 4).await.0, 1);
    }

    #[tokio::test]
    async fn reply_directive_threads_to_original_sender() {
        let fx = fixture(&[]);
        let alice = fx.people[&1].clone();
        let bob = fx.people[&2].clone();

        // Alice emails Bob at tick 4.
        fx.hub.schedule_from_hourly_plan(
            &alice,
            "Email at 09:10 to bob@co: Morning | Plan for today",
            1,
        );
        fx.hub.reset_tick_sends();
        assert_eq!(dispatch(&fx, 1, 4).await.0, 1);

        // Bob's ring now has the email; he replies by id.
        let recent = fx.hub.recent_emails_for(2, 10);
        assert_eq!(recent.len(), 1);
        let email_id = recent[0].email_id.clone();
        let thread_id = recent[0].thread_id.clone();

        fx.hub.schedule_from_hourly_plan(
            &bob,
            &format!("Reply at 15:00 to [{email_id}]: RE: Morning | Ack"),
            4,
        );
        fx.hub.reset_tick_sends();
        assert_eq!(dispatch(&fx, 2, 6).await.0, 1);

        let sent = fx.email.emails();
        let reply = sent.last().unwrap();
        assert_eq!(reply.sender, "bob@co");
        assert_eq!(reply.to, vec!["alice@co".to_string()]);
        assert_eq!(reply.subject, "RE: Morning");
        assert_eq!(reply.thread_id.as_deref(), Some(thread_id.as_str()));
    }

    #[tokio::test]
    async fn unknown_reply_id_is_dropped() {
        let fx = fixture(&[]);
        let bob = fx.people[&2].clone();
        fx.hub
            .schedule_from_hourly_plan(&bob, "Reply at 15:00 to [email-404]: RE | nope", 4);
        fx.hub.reset_tick_sends();
        assert_eq!(dispatch(&fx, 2, 6).await.0, 0);
    }

    #[tokio::test]
    async fn dm_mirroring_guard_suppresses_larger_handle() {
        let fx = fixture(&[]);
        // bob → alice: "bob" > "alice", suppressed.
        fx.hub
            .schedule_direct(2, 4, CommChannel::Chat, "alice", "ping");
        fx.hub.reset_tick_sends();
        assert_eq!(dispatch(&fx, 2, 4).await.1, 0);

        // alice → bob goes out.
        fx.hub.schedule_direct(1, 5, CommChannel::Chat, "bob", "ping");
        fx.hub.reset_tick_sends();
        assert_eq!(dispatch(&fx, 1, 5).await.1, 1);
        assert_eq!(fx.chat.dms().len(), 1);
    }

    #[tokio::test]
    async fn group_keyword_routes_to_project_room() {
        let fx = fixture(&[]);
        fx.hub
            .schedule_direct(1, 4, CommChannel::Chat, "team", "standup time");
        fx.hub.reset_tick_sends();

        let week: Box<dyn Fn() -> i64 + Sync> = Box::new(|| 1);
        let projects: Box<dyn Fn(i64, i64) -> Vec<i64> + Sync> = Box::new(|_, _| vec![7]);
        let room: Box<dyn Fn(i64) -> Option<String> + Sync> =
            Box::new(|id| Some(format!("project-{id}-alpha")));
        let lookups = DispatchLookups {
            current_week: &*week,
            active_project_ids: &*projects,
            project_room: &*room,
        };
        let (emails, chats) = fx
            .hub
            .dispatch_scheduled(&fx.people[&1], 4, &fx.people, &lookups)
            .await;
        assert_eq!((emails, chats), (0, 1));
        let msgs = fx.chat.room_messages();
        assert_eq!(msgs[0].room_slug, "project-7-alpha");
        assert_eq!(msgs[0].sender, "alice");
    }

    #[tokio::test]
    async fn cc_suggestion_adds_head_and_affinity_peer() {
        let fx = fixture(&[]);
        // Carol (DevOps) mails Bob: suggestion is head Alice + a "dev" peer;
        // Alice is both, so exactly one cc.
        fx.hub
            .schedule_direct(3, 4, CommChannel::Email, "bob@co", "Subject | body");
        fx.hub.reset_tick_sends();
        assert_eq!(dispatch(&fx, 3, 4).await.0, 1);
        let sent = fx.email.emails();
        assert_eq!(sent[0].cc, vec!["alice@co".to_string()]);
    }

    #[tokio::test]
    async fn explicit_cc_is_resolved_not_suggested() {
        let fx = fixture(&[]);
        let alice = fx.people[&1].clone();
        fx.hub.schedule_from_hourly_plan(
            &alice,
            "Email at 10:00 to bob@co cc carol@co: Subject | body",
            1,
        );
        fx.hub.reset_tick_sends();
        assert_eq!(dispatch(&fx, 1, 4).await.0, 1);
        assert_eq!(fx.email.emails()[0].cc, vec!["carol@co".to_string()]);
    }

    #[tokio::test]
    async fn payload_without_pipe_gets_generic_subject() {
        let fx = fixture(&[]);
        fx.hub
            .schedule_direct(1, 4, CommChannel::Email, "bob@co", "just a body");
        fx.hub.reset_tick_sends();
        assert_eq!(dispatch(&fx, 1, 4).await.0, 1);
        let sent = fx.email.emails();
        assert!(sent[0].subject.contains("Alice"));
        assert_eq!(sent[0].body, "just a body");
    }

    #[tokio::test]
    async fn rings_are_bounded_to_ten() {
        let fx = fixture(&[]);
        for i in 0..12 {
            let tick = 4 + i * 10;
            fx.hub.schedule_direct(
                1,
                tick,
                CommChannel::Email,
                "bob@co",
                &format!("Subject {i} | body {i}"),
            );
            fx.hub.reset_tick_sends();
            assert_eq!(dispatch(&fx, 1, tick).await.0, 1);
        }
        assert_eq!(fx.hub.recent_emails_for(1, 100).len(), 10);
        assert_eq!(fx.hub.recent_emails_for(2, 100).len(), 10);
    }
}
