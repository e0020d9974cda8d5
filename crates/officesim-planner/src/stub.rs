use async_trait::async_trait;

use officesim_core::types::{Person, PlanResult};

use crate::error::Result;
use crate::planner::{
    DailyPlanContext, DailyReportContext, HourlyPlanContext, HourlySummaryContext, Planner,
    ProjectPlanContext, SimulationReportContext,
};

/// Fallback planner producing deterministic text without external calls.
///
/// Hourly plans include scheduled-communication lines addressed to a real
/// teammate so the downstream parser and dispatcher stay exercised even
/// when no LLM is reachable.
#[derive(Debug, Default)]
pub struct StubPlanner;

impl StubPlanner {
    pub fn new() -> Self {
        Self
    }

    fn result(content: String, model: &str, hint: Option<&str>) -> PlanResult {
        PlanResult {
            content,
            model_used: hint.unwrap_or(model).to_string(),
            tokens_used: Some(0),
        }
    }

    /// First teammate other than the worker, if any.
    fn pick_contact<'a>(worker: &Person, team: &'a [Person]) -> Option<&'a Person> {
        team.iter().find(|member| member.id != worker.id)
    }
}

#[async_trait]
impl Planner for StubPlanner {
    fn name(&self) -> &'static str {
        "stub"
    }

    async fn project_plan(&self, ctx: &ProjectPlanContext<'_>) -> Result<PlanResult> {
        let teammates = ctx
            .team
            .iter()
            .map(|m| format!("- {} ({})", m.name, m.role))
            .collect::<Vec<_>>()
            .join("\n");
        let content = format!(
            "Project: {}\nSummary: {}\nDuration: {} week(s)\nDepartment head: {}\nTeam:\n{}\n\
             Initial focus: break work into design, build, review, and communication checkpoints.",
            ctx.project_name,
            ctx.project_summary,
            ctx.duration_weeks,
            ctx.department_head.name,
            if teammates.is_empty() { "- (none)".to_string() } else { teammates },
        );
        Ok(Self::result(content, "officesim-stub-project", ctx.model_hint))
    }

    async fn daily_plan(&self, ctx: &DailyPlanContext<'_>) -> Result<PlanResult> {
        let total_days = ctx.duration_weeks.max(1) * 5;
        let content = format!(
            "Worker: {} ({})\nDay: {} / {}\nGoals:\n\
             - Advance project milestones\n\
             - Communicate blockers\n\
             - Capture progress for end-of-day report",
            ctx.worker.name,
            ctx.worker.role,
            ctx.day_index + 1,
            total_days,
        );
        Ok(Self::result(content, "officesim-stub-daily", ctx.model_hint))
    }

    async fn hourly_plan(&self, ctx: &HourlyPlanContext<'_>) -> Result<PlanResult> {
        // Deterministic, human-looking plan with explicit comms later in
        // the workday, addressed to a resolvable teammate when one exists.
        let mut lines = vec![
            format!("Worker: {}", ctx.worker.name),
            format!("Tick: {} ({})", ctx.tick, ctx.reason),
            "Focus for the next hour:".to_string(),
            "- Review priorities".to_string(),
            "- Heads-down execution".to_string(),
            "- Share update with teammate".to_string(),
        ];
        if let Some(contact) = Self::pick_contact(ctx.worker, ctx.team) {
            lines.push(String::new());
            lines.push("Scheduled communications:".to_string());
            lines.push(format!(
                "Chat at 09:10 with {}: Morning! Quick sync on priorities?",
                contact.chat_handle
            ));
            lines.push(format!(
                "Email at 09:35 to {}: Kickoff | Plan for the morning and any blockers",
                contact.email_address
            ));
            lines.push(format!(
                "Chat at 14:20 with {}: Checking in on progress, anything I can unblock?",
                contact.chat_handle
            ));
        }
        Ok(Self::result(
            lines.join("\n"),
            "officesim-stub-hourly",
            ctx.model_hint,
        ))
    }

    async fn hourly_summary(&self, ctx: &HourlySummaryContext<'_>) -> Result<PlanResult> {
        let content = format!(
            "- Continued project work\n- Coordinated with team\n- {} hour(s) logged",
            ctx.hour_index + 1
        );
        Ok(Self::result(
            content,
            "officesim-stub-hourly-summary",
            ctx.model_hint,
        ))
    }

    async fn daily_report(&self, ctx: &DailyReportContext<'_>) -> Result<PlanResult> {
        let content = format!(
            "Worker: {}\nDay {} summary\nHighlights:\n- Delivered planned work\n\
             - Communicated status\nRisks:\n- Pending follow-ups",
            ctx.worker.name,
            ctx.day_index + 1,
        );
        Ok(Self::result(
            content,
            "officesim-stub-daily-report",
            ctx.model_hint,
        ))
    }

    async fn simulation_report(&self, ctx: &SimulationReportContext<'_>) -> Result<PlanResult> {
        let team = ctx
            .team
            .iter()
            .map(|p| p.name.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        let content = format!(
            "Total ticks: {}\nTeam: {}\nRecap:\n- Work advanced\n- Communication stayed regular\n\
             - See daily reports for detail",
            ctx.total_ticks,
            if team.is_empty() { "(none)".to_string() } else { team },
        );
        Ok(Self::result(
            content,
            "officesim-stub-sim-report",
            ctx.model_hint,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn person(id: i64, name: &str) -> Person {
        Person {
            id,
            name: name.into(),
            role: "Developer".into(),
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

    #[tokio::test]
    async fn hourly_plan_targets_a_real_teammate() {
        let alice = person(1, "Alice");
        let bob = person(2, "Bob");
        let team = vec![alice.clone(), bob.clone()];
        let ctx = HourlyPlanContext {
            worker: &alice,
            project_plan: "plan",
            daily_plan: "daily",
            tick: 1,
            reason: "auto",
            team: &team,
            recent_emails: &[],
            all_active_projects: None,
            model_hint: None,
        };
        let result = StubPlanner::new().hourly_plan(&ctx).await.unwrap();
        assert!(result.content.contains("Scheduled communications:"));
        assert!(result.content.contains("bob@co"));

        // Determinism: same input, same output.
        let again = StubPlanner::new().hourly_plan(&ctx).await.unwrap();
        assert_eq!(result, again);
    }

    #[tokio::test]
    async fn solo_worker_gets_no_comm_lines() {
        let alice = person(1, "Alice");
        let team = vec![alice.clone()];
        let ctx = HourlyPlanContext {
            worker: &alice,
            project_plan: "plan",
            daily_plan: "daily",
            tick: 1,
            reason: "auto",
            team: &team,
            recent_emails: &[],
            all_active_projects: None,
            model_hint: None,
        };
        let result = StubPlanner::new().hourly_plan(&ctx).await.unwrap();
        assert!(!result.content.contains("Email at"));
    }
}
