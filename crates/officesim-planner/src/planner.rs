use std::sync::Arc;

use async_trait::async_trait;

use officesim_core::locale::Locale;
use officesim_core::types::{Person, PlanResult, ProjectPlan, RecentEmail};

use crate::client::LlmClient;
use crate::error::Result;
use crate::prompts;

/// Context for generating a project-level plan.
pub struct ProjectPlanContext<'a> {
    pub department_head: &'a Person,
    pub project_name: &'a str,
    pub project_summary: &'a str,
    pub duration_weeks: i64,
    pub team: &'a [Person],
    pub model_hint: Option<&'a str>,
}

/// Context for generating a worker's daily plan.
pub struct DailyPlanContext<'a> {
    pub worker: &'a Person,
    pub project_plan: &'a str,
    pub day_index: i64,
    pub duration_weeks: i64,
    pub team: &'a [Person],
    pub model_hint: Option<&'a str>,
}

/// Context for generating a worker's hourly plan.
pub struct HourlyPlanContext<'a> {
    pub worker: &'a Person,
    pub project_plan: &'a str,
    pub daily_plan: &'a str,
    pub tick: i64,
    pub reason: &'a str,
    pub team: &'a [Person],
    pub recent_emails: &'a [RecentEmail],
    pub all_active_projects: Option<&'a [ProjectPlan]>,
    pub model_hint: Option<&'a str>,
}

pub struct HourlySummaryContext<'a> {
    pub worker: &'a Person,
    pub hour_index: i64,
    pub hourly_plans: &'a str,
    pub model_hint: Option<&'a str>,
}

pub struct DailyReportContext<'a> {
    pub worker: &'a Person,
    pub project_plan: &'a str,
    pub day_index: i64,
    pub daily_plan: &'a str,
    pub hourly_log: &'a str,
    pub minute_schedule: &'a str,
    pub model_hint: Option<&'a str>,
}

pub struct SimulationReportContext<'a> {
    pub project_plan: &'a str,
    pub team: &'a [Person],
    pub total_ticks: i64,
    pub daily_reports: &'a str,
    pub model_hint: Option<&'a str>,
}

/// The six generation operations the engine drives.
#[async_trait]
pub trait Planner: Send + Sync {
    /// Name used in metrics entries.
    fn name(&self) -> &'static str;

    async fn project_plan(&self, ctx: &ProjectPlanContext<'_>) -> Result<PlanResult>;
    async fn daily_plan(&self, ctx: &DailyPlanContext<'_>) -> Result<PlanResult>;
    async fn hourly_plan(&self, ctx: &HourlyPlanContext<'_>) -> Result<PlanResult>;
    async fn hourly_summary(&self, ctx: &HourlySummaryContext<'_>) -> Result<PlanResult>;
    async fn daily_report(&self, ctx: &DailyReportContext<'_>) -> Result<PlanResult>;
    async fn simulation_report(&self, ctx: &SimulationReportContext<'_>) -> Result<PlanResult>;
}

/// Default models per operation; a per-call `model_hint` overrides.
#[derive(Debug, Clone)]
pub struct PlannerModels {
    pub project: String,
    pub daily: String,
    pub hourly: String,
    pub report: String,
}

impl Default for PlannerModels {
    fn default() -> Self {
        Self {
            project: "gpt-4o-mini".into(),
            daily: "gpt-4o-mini".into(),
            hourly: "gpt-4o-mini".into(),
            report: "gpt-4o-mini".into(),
        }
    }
}

/// LLM-backed planner: builds locale-aware prompts and forwards them to the
/// configured client.
pub struct LlmPlanner {
    client: Arc<dyn LlmClient>,
    models: PlannerModels,
    locale: Locale,
}

impl LlmPlanner {
    pub fn new(client: Arc<dyn LlmClient>, models: PlannerModels, locale: Locale) -> Self {
        Self {
            client,
            models,
            locale,
        }
    }

    async fn run(
        &self,
        messages: Vec<crate::client::ChatMessage>,
        default_model: &str,
        hint: Option<&str>,
    ) -> Result<PlanResult> {
        let model = hint.unwrap_or(default_model);
        let completion = self.client.generate(&messages, model).await?;
        Ok(PlanResult {
            content: completion.text,
            model_used: model.to_string(),
            tokens_used: completion.tokens_used,
        })
    }
}

#[async_trait]
impl Planner for LlmPlanner {
    fn name(&self) -> &'static str {
        "llm"
    }

    async fn project_plan(&self, ctx: &ProjectPlanContext<'_>) -> Result<PlanResult> {
        self.run(
            prompts::project_plan_messages(ctx, self.locale),
            &self.models.project,
            ctx.model_hint,
        )
        .await
    }

    async fn daily_plan(&self, ctx: &DailyPlanContext<'_>) -> Result<PlanResult> {
        self.run(
            prompts::daily_plan_messages(ctx, self.locale),
            &self.models.daily,
            ctx.model_hint,
        )
        .await
    }

    async fn hourly_plan(&self, ctx: &HourlyPlanContext<'_>) -> Result<PlanResult> {
        self.run(
            prompts::hourly_plan_messages(ctx, self.locale),
            &self.models.hourly,
            ctx.model_hint,
        )
        .await
    }

    async fn hourly_summary(&self, ctx: &HourlySummaryContext<'_>) -> Result<PlanResult> {
        self.run(
            prompts::hourly_summary_messages(ctx, self.locale),
            &self.models.report,
            ctx.model_hint,
        )
        .await
    }

    async fn daily_report(&self, ctx: &DailyReportContext<'_>) -> Result<PlanResult> {
        self.run(
            prompts::daily_report_messages(ctx, self.locale),
            &self.models.report,
            ctx.model_hint,
        )
        .await
    }

    async fn simulation_report(&self, ctx: &SimulationReportContext<'_>) -> Result<PlanResult> {
        self.run(
            prompts::simulation_report_messages(ctx, self.locale),
            &self.models.report,
            ctx.model_hint,
        )
        .await
    }
}
