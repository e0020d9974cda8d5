use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A persona registered with the simulator.
///
/// Created once via the admin surface and treated as immutable during a
/// run; temporary state (sick leave etc.) lives in status overrides.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Person {
    pub id: i64,
    pub name: String,
    pub role: String,
    pub timezone: String,
    /// Work window as `"HH:MM-HH:MM"`.
    pub work_hours: String,
    pub break_frequency: String,
    pub communication_style: String,
    pub email_address: String,
    pub chat_handle: String,
    pub is_department_head: bool,
    pub team_name: Option<String>,
    pub skills: Vec<String>,
    pub personality: Vec<String>,
    pub objectives: Vec<String>,
    pub metrics: Vec<String>,
    pub planning_guidelines: Vec<String>,
    /// Event type → suggested responses, used to seed planning prompts.
    pub event_playbook: BTreeMap<String, Vec<String>>,
    pub statuses: Vec<String>,
    /// Markdown rendering of the persona, precomputed at creation time.
    pub persona_markdown: String,
    pub schedule: Vec<ScheduleBlock>,
}

impl Person {
    /// First name, used for casual salutations in generated traffic.
    pub fn first_name(&self) -> &str {
        self.name.split_whitespace().next().unwrap_or(&self.name)
    }
}

/// One block of a persona's intended daily schedule.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScheduleBlock {
    /// 24h start time, e.g. "09:00".
    pub start: String,
    /// 24h end time, e.g. "10:00".
    pub end: String,
    pub activity: String,
}

/// Payload for creating a persona.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersonDraft {
    pub name: String,
    pub role: String,
    pub timezone: String,
    pub work_hours: String,
    pub break_frequency: String,
    pub communication_style: String,
    pub email_address: String,
    pub chat_handle: String,
    #[serde(default)]
    pub is_department_head: bool,
    #[serde(default)]
    pub team_name: Option<String>,
    pub skills: Vec<String>,
    pub personality: Vec<String>,
    #[serde(default)]
    pub objectives: Vec<String>,
    #[serde(default)]
    pub metrics: Vec<String>,
    #[serde(default)]
    pub planning_guidelines: Vec<String>,
    #[serde(default)]
    pub event_playbook: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub statuses: Vec<String>,
    #[serde(default)]
    pub schedule: Vec<ScheduleBlock>,
}

/// Classification of an inbox message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Update,
    Ack,
    Event,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Update => "update",
            MessageKind::Ack => "ack",
            MessageKind::Event => "event",
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Channel a message travelled (or will travel) on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageChannel {
    #[serde(rename = "email")]
    Email,
    #[serde(rename = "chat")]
    Chat,
    #[serde(rename = "system")]
    System,
    #[serde(rename = "email+chat")]
    EmailAndChat,
}

impl MessageChannel {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageChannel::Email => "email",
            MessageChannel::Chat => "chat",
            MessageChannel::System => "system",
            MessageChannel::EmailAndChat => "email+chat",
        }
    }
}

impl fmt::Display for MessageChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A durable inbox item delivered to a persona for consumption at its
/// next planning opportunity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundMessage {
    /// Storage id, assigned when the message is persisted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<i64>,
    /// `0` denotes the simulation manager.
    pub sender_id: i64,
    pub sender_name: String,
    pub subject: String,
    pub summary: String,
    pub action_item: Option<String>,
    pub message_type: MessageKind,
    pub channel: MessageChannel,
    pub tick: i64,
}

/// Output of a single planner call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanResult {
    pub content: String,
    pub model_used: String,
    pub tokens_used: Option<i64>,
}

impl PlanResult {
    /// Placeholder emitted when a planning task times out or errors; the
    /// tick still completes for everyone else.
    pub fn empty() -> Self {
        Self {
            content: String::new(),
            model_used: "error".to_string(),
            tokens_used: Some(0),
        }
    }
}

/// A stored project plan. Active in week W iff
/// `start_week <= W <= start_week + duration_weeks - 1`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectPlan {
    pub id: i64,
    pub project_name: String,
    pub project_summary: String,
    pub plan: String,
    pub generated_by: Option<i64>,
    pub duration_weeks: i64,
    pub start_week: i64,
    pub model_used: String,
    pub tokens_used: Option<i64>,
    pub created_at: String,
}

impl ProjectPlan {
    pub fn end_week(&self) -> i64 {
        self.start_week + self.duration_weeks - 1
    }
}

/// Roster entry attached to an active project.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamMember {
    pub id: i64,
    pub name: String,
    pub role: String,
    pub team_name: Option<String>,
}

/// A project together with its resolved team for a given week.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectWithTeam {
    pub project: ProjectPlan,
    pub team_members: Vec<TeamMember>,
}

/// Timeline entry for multi-project starts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectTimeline {
    pub project_name: String,
    pub project_summary: String,
    pub duration_weeks: i64,
    #[serde(default = "default_start_week")]
    pub start_week: i64,
    #[serde(default)]
    pub assigned_person_ids: Vec<i64>,
}

fn default_start_week() -> i64 {
    1
}

/// Request to start a simulation run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StartRequest {
    pub project_name: Option<String>,
    pub project_summary: Option<String>,
    #[serde(default = "default_duration_weeks")]
    pub duration_weeks: i64,
    /// Multi-project mode; when non-empty, `project_name`/`project_summary`
    /// are ignored.
    #[serde(default)]
    pub projects: Vec<ProjectTimeline>,
    #[serde(default)]
    pub include_person_ids: Vec<i64>,
    #[serde(default)]
    pub include_person_names: Vec<String>,
    #[serde(default)]
    pub exclude_person_ids: Vec<i64>,
    #[serde(default)]
    pub exclude_person_names: Vec<String>,
    pub department_head_name: Option<String>,
    pub model_hint: Option<String>,
    pub random_seed: Option<u64>,
}

fn default_duration_weeks() -> i64 {
    4
}

/// Singleton simulation state row (id = 1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulationStatus {
    pub current_tick: i64,
    pub is_running: bool,
    pub auto_tick: bool,
}

/// State plus the rendered simulated clock, as reported to operators.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationSnapshot {
    pub current_tick: i64,
    pub is_running: bool,
    pub auto_tick: bool,
    pub sim_time: String,
}

/// Result of `advance(ticks, reason)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdvanceResult {
    pub ticks_advanced: i64,
    pub current_tick: i64,
    pub emails_sent: u64,
    pub chat_messages_sent: u64,
    pub sim_time: String,
}

/// Payload for injecting an event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventInput {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub target_ids: Vec<i64>,
    pub project_id: Option<String>,
    pub at_tick: Option<i64>,
    #[serde(default)]
    pub payload: serde_json::Value,
}

/// A stored (write-once) event row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRecord {
    pub id: i64,
    #[serde(rename = "type")]
    pub kind: String,
    pub target_ids: Vec<i64>,
    pub project_id: Option<String>,
    pub at_tick: Option<i64>,
    pub payload: serde_json::Value,
}

/// Ring-buffer entry describing a recently sent/received email; resolves
/// `Reply to [email-id]` directives and seeds planning prompts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecentEmail {
    pub email_id: String,
    pub from: String,
    pub to: String,
    pub subject: String,
    pub thread_id: String,
    pub sent_at_tick: i64,
}

/// Temporary status assignment for a worker, cleared once
/// `current_tick >= until_tick`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusOverride {
    pub worker_id: i64,
    pub status: String,
    pub until_tick: i64,
    pub reason: String,
}

/// Status literal that suspends planning and dispatch for a worker.
pub const STATUS_SICK_LEAVE: &str = "SickLeave";

/// Per-call metrics context recorded by the planner service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlanContextSummary {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub worker: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub day_index: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tick: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_hint: Option<String>,
}

impl FromStr for MessageKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "update" => Ok(MessageKind::Update),
            "ack" => Ok(MessageKind::Ack),
            "event" => Ok(MessageKind::Event),
            other => Err(format!("unknown message kind: {other}")),
        }
    }
}

impl FromStr for MessageChannel {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "email" => Ok(MessageChannel::Email),
            "chat" => Ok(MessageChannel::Chat),
            "system" => Ok(MessageChannel::System),
            "email+chat" => Ok(MessageChannel::EmailAndChat),
            other => Err(format!("unknown message channel: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_channel_round_trips_through_str() {
        for ch in [
            MessageChannel::Email,
            MessageChannel::Chat,
            MessageChannel::System,
            MessageChannel::EmailAndChat,
        ] {
            assert_eq!(ch.as_str().parse::<MessageChannel>().unwrap(), ch);
        }
    }

    #[test]
    fn project_plan_end_week() {
        let plan = ProjectPlan {
            id: 1,
            project_name: "Alpha".into(),
            project_summary: "s".into(),
            plan: "p".into(),
            generated_by: None,
            duration_weeks: 2,
            start_week: 3,
            model_used: "m".into(),
            tokens_used: None,
            created_at: String::new(),
        };
        assert_eq!(plan.end_week(), 4);
    }

    #[test]
    fn first_name_falls_back_to_full_name() {
        let mut person = sample_person();
        assert_eq!(person.first_name(), "Alice");
        person.name = "Cher".into();
        assert_eq!(person.first_name(), "Cher");
    }

    pub(crate) fn sample_person() -> Person {
        Person {
            id: 1,
            name: "Alice Park".into(),
            role: "Developer".into(),
            timezone: "UTC".into(),
            work_hours: "09:00-17:00".into(),
            break_frequency: "hourly".into(),
            communication_style: "direct".into(),
            email_address: "alice@co".into(),
            chat_handle: "alice".into(),
            is_department_head: true,
            team_name: None,
            skills: vec!["rust".into()],
            personality: vec!["calm".into()],
            objectives: vec![],
            metrics: vec![],
            planning_guidelines: vec![],
            event_playbook: BTreeMap::new(),
            statuses: vec![],
            persona_markdown: "# Alice".into(),
            schedule: vec![],
        }
    }
}
