use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use tracing::warn;

use officesim_core::types::{PlanContextSummary, PlanResult};

use crate::error::Result;
use crate::metrics::{MetricsEntry, MetricsRecorder};
use crate::planner::{
    DailyPlanContext, DailyReportContext, HourlyPlanContext, HourlySummaryContext, Planner,
    ProjectPlanContext, SimulationReportContext,
};
use crate::stub::StubPlanner;

/// Wraps planner calls with fallback handling and metrics recording.
///
/// On a primary failure the deterministic stub answers instead, unless
/// strict mode is on, in which case the error propagates. Every call lands
/// in the bounded metrics ring either way.
pub struct PlannerService {
    primary: Arc<dyn Planner>,
    stub: StubPlanner,
    strict: bool,
    metrics: MetricsRecorder,
}

impl PlannerService {
    pub fn new(primary: Arc<dyn Planner>, strict: bool) -> Self {
        Self {
            primary,
            stub: StubPlanner::new(),
            strict,
            metrics: MetricsRecorder::default(),
        }
    }

    pub fn metrics(&self, limit: usize) -> Vec<MetricsEntry> {
        self.metrics.list(limit)
    }

    pub async fn project_plan(&self, ctx: &ProjectPlanContext<'_>) -> Result<PlanResult> {
        let context = PlanContextSummary {
            worker: Some(ctx.department_head.name.clone()),
            project_name: Some(ctx.project_name.to_string()),
            model_hint: ctx.model_hint.map(str::to_string),
            ..Default::default()
        };
        self.call(
            "project_plan",
            context,
            self.primary.project_plan(ctx),
            self.stub.project_plan(ctx),
        )
        .await
    }

    pub async fn daily_plan(&self, ctx: &DailyPlanContext<'_>) -> Result<PlanResult> {
        let context = PlanContextSummary {
            worker: Some(ctx.worker.name.clone()),
            day_index: Some(ctx.day_index),
            model_hint: ctx.model_hint.map(str::to_string),
            ..Default::default()
        };
        self.call(
            "daily_plan",
            context,
            self.primary.daily_plan(ctx),
            self.stub.daily_plan(ctx),
        )
        .await
    }

    pub async fn hourly_plan(&self, ctx: &HourlyPlanContext<'_>) -> Result<PlanResult> {
        let context = PlanContextSummary {
            worker: Some(ctx.worker.name.clone()),
            tick: Some(ctx.tick),
            model_hint: ctx.model_hint.map(str::to_string),
            ..Default::default()
        };
        self.call(
            "hourly_plan",
            context,
            self.primary.hourly_plan(ctx),
            self.stub.hourly_plan(ctx),
        )
        .await
    }

    pub async fn hourly_summary(&self, ctx: &HourlySummaryContext<'_>) -> Result<PlanResult> {
        let context = PlanContextSummary {
            worker: Some(ctx.worker.name.clone()),
            model_hint: ctx.model_hint.map(str::to_string),
            ..Default::default()
        };
        self.call(
            "hourly_summary",
            context,
            self.primary.hourly_summary(ctx),
            self.stub.hourly_summary(ctx),
        )
        .await
    }

    pub async fn daily_report(&self, ctx: &DailyReportContext<'_>) -> Result<PlanResult> {
        let context = PlanContextSummary {
            worker: Some(ctx.worker.name.clone()),
            day_index: Some(ctx.day_index),
            model_hint: ctx.model_hint.map(str::to_string),
            ..Default::default()
        };
        self.call(
            "daily_report",
            context,
            self.primary.daily_report(ctx),
            self.stub.daily_report(ctx),
        )
        .await
    }

    pub async fn simulation_report(&self, ctx: &SimulationReportContext<'_>) -> Result<PlanResult> {
        let context = PlanContextSummary {
            model_hint: ctx.model_hint.map(str::to_string),
            ..Default::default()
        };
        self.call(
            "simulation_report",
            context,
            self.primary.simulation_report(ctx),
            self.stub.simulation_report(ctx),
        )
        .await
    }

    async fn call<F, G>(
        &self,
        method: &'static str,
        context: PlanContextSummary,
        primary: F,
        fallback: G,
    ) -> Result<PlanResult>
    where
        F: Future<Output = Result<PlanResult>>,
        G: Future<Output = Result<PlanResult>>,
    {
        let primary_name = self.primary.name();
        let start = Instant::now();
        match primary.await {
            Ok(result) => {
                self.metrics.append(MetricsEntry {
                    timestamp: chrono::Utc::now().to_rfc3339(),
                    method,
                    planner: primary_name,
                    result_planner: primary_name,
                    model: result.model_used.clone(),
                    duration_ms: ms_since(start),
                    fallback_duration_ms: None,
                    fallback: false,
                    error: None,
                    context,
                });
                Ok(result)
            }
            Err(err) => {
                let duration_ms = ms_since(start);
                if self.strict || primary_name == self.stub.name() {
                    self.metrics.append(MetricsEntry {
                        timestamp: chrono::Utc::now().to_rfc3339(),
                        method,
                        planner: primary_name,
                        result_planner: primary_name,
                        model: "unknown".into(),
                        duration_ms,
                        fallback_duration_ms: None,
                        fallback: false,
                        error: Some(err.to_string()),
                        context,
                    });
                    return Err(err);
                }
                warn!(method, error = %err, "planner failed; falling back to stub");
                let fb_start = Instant::now();
                match fallback.await {
                    Ok(result) => {
                        self.metrics.append(MetricsEntry {
                            timestamp: chrono::Utc::now().to_rfc3339(),
                            method,
                            planner: primary_name,
                            result_planner: self.stub.name(),
                            model: result.model_used.clone(),
                            duration_ms,
                            fallback_duration_ms: Some(ms_since(fb_start)),
                            fallback: true,
                            error: Some(err.to_string()),
                            context,
                        });
                        Ok(result)
                    }
                    Err(fb_err) => {
                        self.metrics.append(MetricsEntry {
                            timestamp: chrono::Utc::now().to_rfc3339(),
                            method,
                            planner: primary_name,
                            result_planner: self.stub.name(),
                            model: "unknown".into(),
                            duration_ms,
                            fallback_duration_ms: Some(ms_since(fb_start)),
                            fallback: true,
                            error: Some(fb_err.to_string()),
                            context,
                        });
                        Err(fb_err)
                    }
                }
            }
        }
    }
}

fn ms_since(start: Instant) -> f64 {
    (start.elapsed().as_secs_f64() * 1000.0 * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::BTreeMap;

    use officesim_core::types::Person;

    use crate::error::PlannerError;

    struct AlwaysFail;

    #[async_trait]
    impl Planner for AlwaysFail {
        fn name(&self) -> &'static str {
            "always-fail"
        }
        async fn project_plan(&self, _: &ProjectPlanContext<'_>) -> Result<PlanResult> {
            Err(PlannerError::Provider("intentional failure".into()))
        }
        async fn daily_plan(&self, _: &DailyPlanContext<'_>) -> Result<PlanResult> {
            Err(PlannerError::Provider("intentional failure".into()))
        }
        async fn hourly_plan(&self, _: &HourlyPlanContext<'_>) -> Result<PlanResult> {
            Err(PlannerError::Provider("intentional failure".into()))
        }
        async fn hourly_summary(&self, _: &HourlySummaryContext<'_>) -> Result<PlanResult> {
            Err(PlannerError::Provider("intentional failure".into()))
        }
        async fn daily_report(&self, _: &DailyReportContext<'_>) -> Result<PlanResult> {
            Err(PlannerError::Provider("intentional failure".into()))
        }
        async fn simulation_report(&self, _: &SimulationReportContext<'_>) -> Result<PlanResult> {
            Err(PlannerError::Provider("intentional failure".into()))
        }
    }

    fn person() -> Person {
        Person {
            id: 1,
            name: "Alice".into(),
            role: "Developer".into(),
            timezone: "UTC".into(),
            work_hours: "09:00-17:00".into(),
            break_frequency: "hourly".into(),
            communication_style: "direct".into(),
            email_address: "alice@co".into(),
            chat_handle: "alice".into(),
            is_department_head: true,
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
    async fn falls_back_to_stub_and_records_metrics() {
        let service = PlannerService::new(Arc::new(AlwaysFail), false);
        let worker = person();
        let ctx = DailyPlanContext {
            worker: &worker,
            project_plan: "plan",
            day_index: 0,
            duration_weeks: 1,
            team: &[],
            model_hint: None,
        };
        let result = service.daily_plan(&ctx).await.unwrap();
        assert!(result.model_used.contains("stub"));

        let entries = service.metrics(10);
        assert_eq!(entries.len(), 1);
        assert!(entries[0].fallback);
        assert_eq!(entries[0].result_planner, "stub");
        assert!(entries[0].error.as_deref().unwrap().contains("intentional"));
    }

    #[tokio::test]
    async fn strict_mode_propagates_the_error() {
        let service = PlannerService::new(Arc::new(AlwaysFail), true);
        let worker = person();
        let ctx = DailyPlanContext {
            worker: &worker,
            project_plan: "plan",
            day_index: 0,
            duration_weeks: 1,
            team: &[],
            model_hint: None,
        };
        assert!(service.daily_plan(&ctx).await.is_err());
        let entries = service.metrics(10);
        assert_eq!(entries.len(), 1);
        assert!(!entries[0].fallback);
        assert!(entries[0].error.is_some());
    }

    #[tokio::test]
    async fn success_path_records_primary() {
        let service = PlannerService::new(Arc::new(StubPlanner::new()), false);
        let worker = person();
        let ctx = HourlySummaryContext {
            worker: &worker,
            hour_index: 0,
            hourly_plans: "tick 1: work",
            model_hint: None,
        };
        let result = service.hourly_summary(&ctx).await.unwrap();
        assert!(!result.content.is_empty());
        let entries = service.metrics(10);
        assert!(!entries[0].fallback);
        assert_eq!(entries[0].planner, "stub");
    }
}
