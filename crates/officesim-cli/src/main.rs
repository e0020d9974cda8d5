use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::{info, warn};

use officesim_core::config::SimConfig;
use officesim_core::types::{PersonDraft, StartRequest};
use officesim_engine::SimulationEngine;
use officesim_gateways::{
    ChatGateway, EmailGateway, HttpChatGateway, HttpEmailGateway, InMemoryChatGateway,
    InMemoryEmailGateway,
};
use officesim_planner::{HttpLlmClient, LlmPlanner, Planner, PlannerModels, StubPlanner};

/// Drive the workplace simulator from the command line.
#[derive(Parser)]
#[command(name = "officesim", version, about = "Discrete-time workplace simulator")]
struct Cli {
    /// Config file path (defaults to OFFICESIM_CONFIG or ./officesim.toml).
    #[arg(long, global = true)]
    config: Option<String>,
    /// Use in-memory backends and the deterministic stub planner.
    #[arg(long, global = true)]
    offline: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start a simulation and advance it by N ticks.
    Run {
        #[arg(long, default_value = "Alpha Project")]
        project: String,
        #[arg(long, default_value = "Ship the first milestone")]
        summary: String,
        #[arg(long, default_value_t = 1)]
        duration_weeks: i64,
        #[arg(long, default_value_t = 8)]
        ticks: i64,
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Print the current simulation state.
    Status,
    /// Reset derived state; --full also deletes personas and backend data.
    Reset {
        #[arg(long)]
        full: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "officesim=info".into()),
        )
        .init();

    let cli = Cli::parse();
    let config = SimConfig::load(cli.config.as_deref()).unwrap_or_else(|e| {
        warn!("config load failed ({e}), using defaults");
        SimConfig::default()
    });

    let engine = build_engine(&config, cli.offline).await?;

    match cli.command {
        Command::Run {
            project,
            summary,
            duration_weeks,
            ticks,
            seed,
        } => {
            if engine.list_people()?.is_empty() {
                if cli.offline {
                    info!("no personas registered; seeding a demo team");
                    seed_demo_team(&engine)?;
                } else {
                    anyhow::bail!("no personas registered; create some via the admin surface first");
                }
            }
            let request = StartRequest {
                project_name: Some(project),
                project_summary: Some(summary),
                duration_weeks,
                random_seed: seed,
                ..Default::default()
            };
            let state = engine.start(Some(&request)).await?;
            info!(tick = state.current_tick, "simulation started");
            let result = engine.advance(ticks, "manual").await?;
            println!("{}", serde_json::to_string_pretty(&result)?);
            let state = engine.stop().await?;
            info!(tick = state.current_tick, "simulation stopped");
        }
        Command::Status => {
            let state = engine.get_state()?;
            println!("{}", serde_json::to_string_pretty(&state)?);
        }
        Command::Reset { full } => {
            let state = if full {
                engine.reset_full().await?
            } else {
                engine.reset().await?
            };
            println!("{}", serde_json::to_string_pretty(&state)?);
        }
    }
    Ok(())
}

async fn build_engine(config: &SimConfig, offline: bool) -> anyhow::Result<Arc<SimulationEngine>> {
    let (email, chat, planner): (Arc<dyn EmailGateway>, Arc<dyn ChatGateway>, Arc<dyn Planner>) =
        if offline {
            (
                Arc::new(InMemoryEmailGateway::new()),
                Arc::new(InMemoryChatGateway::new()),
                Arc::new(StubPlanner::new()),
            )
        } else {
            let client = Arc::new(HttpLlmClient::new(
                config.planner.base_url.clone(),
                config.planner.chat_path.clone(),
                config.planner.api_key.clone(),
            ));
            let models = PlannerModels {
                project: config.planner.project_model.clone(),
                daily: config.planner.daily_model.clone(),
                hourly: config.planner.hourly_model.clone(),
                report: config.planner.report_model.clone(),
            };
            (
                Arc::new(HttpEmailGateway::new(config.email.base_url.clone())),
                Arc::new(HttpChatGateway::new(config.chat.base_url.clone())),
                Arc::new(LlmPlanner::new(
                    client,
                    models,
                    config.simulation.locale,
                )),
            )
        };
    Ok(SimulationEngine::new(config.clone(), email, chat, planner).await?)
}

fn seed_demo_team(engine: &Arc<SimulationEngine>) -> anyhow::Result<()> {
    let team = [
        ("Alice Park", "Developer", true),
        ("Bob Lee", "Designer", false),
    ];
    for (name, role, head) in team {
        let first = name.split_whitespace().next().unwrap_or(name).to_lowercase();
        engine.create_person(&PersonDraft {
            name: name.into(),
            role: role.into(),
            timezone: "UTC".into(),
            work_hours: "09:00-17:00".into(),
            break_frequency: "hourly".into(),
            communication_style: "concise and friendly".into(),
            email_address: format!("{first}@officesim.local"),
            chat_handle: first,
            is_department_head: head,
            team_name: Some("Core".into()),
            skills: vec!["planning".into(), "execution".into()],
            personality: vec!["collaborative".into()],
            objectives: vec!["ship the milestone".into()],
            metrics: vec![],
            planning_guidelines: vec![],
            event_playbook: Default::default(),
            statuses: vec![],
            schedule: vec![],
        })?;
    }
    Ok(())
}
