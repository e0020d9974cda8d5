use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::{Result, SimError};
use crate::locale::Locale;

/// Default identity the simulator itself sends from.
pub const DEFAULT_MANAGER_EMAIL: &str = "simulator@officesim.local";
pub const DEFAULT_MANAGER_HANDLE: &str = "sim-manager";

/// Top-level config (`officesim.toml` + `OFFICESIM_*` env overrides, plus
/// the flat operator keys documented on the admin surface).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimConfig {
    #[serde(default)]
    pub simulation: SimulationConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub planner: PlannerConfig,
    #[serde(default)]
    pub email: BackendConfig,
    #[serde(default)]
    pub chat: BackendConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Ticks per simulated workday.
    #[serde(default = "default_hours_per_day")]
    pub hours_per_day: i64,
    /// Auto-tick cadence in seconds; 0 means max speed.
    #[serde(default = "default_tick_interval")]
    pub tick_interval_seconds: f64,
    /// Minimum gap between sends to the same recipient set.
    #[serde(default = "default_cooldown_ticks")]
    pub contact_cooldown_ticks: i64,
    /// Per-minute replanning cap per persona.
    #[serde(default = "default_max_hourly_plans")]
    pub max_hourly_plans_per_minute: u32,
    /// Bounded worker pool size for parallel planning.
    #[serde(default = "default_max_planning_workers")]
    pub max_planning_workers: usize,
    #[serde(default = "bool_true")]
    pub auto_pause_on_project_end: bool,
    #[serde(default)]
    pub locale: Locale,
    /// External email addresses permitted as recipients.
    #[serde(default)]
    pub external_stakeholders: Vec<String>,
    #[serde(default = "default_manager_email")]
    pub manager_email: String,
    #[serde(default = "default_manager_handle")]
    pub manager_handle: String,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            hours_per_day: default_hours_per_day(),
            tick_interval_seconds: default_tick_interval(),
            contact_cooldown_ticks: default_cooldown_ticks(),
            max_hourly_plans_per_minute: default_max_hourly_plans(),
            max_planning_workers: default_max_planning_workers(),
            auto_pause_on_project_end: true,
            locale: Locale::default(),
            external_stakeholders: Vec::new(),
            manager_email: default_manager_email(),
            manager_handle: default_manager_handle(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlannerConfig {
    /// If true, never fall back to the stub planner on provider errors.
    #[serde(default)]
    pub strict: bool,
    pub api_key: Option<String>,
    #[serde(default = "default_llm_base_url")]
    pub base_url: String,
    #[serde(default = "default_chat_path")]
    pub chat_path: String,
    #[serde(default = "default_model")]
    pub project_model: String,
    #[serde(default = "default_model")]
    pub daily_model: String,
    #[serde(default = "default_model")]
    pub hourly_model: String,
    #[serde(default = "default_model")]
    pub report_model: String,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            strict: false,
            api_key: None,
            base_url: default_llm_base_url(),
            chat_path: default_chat_path(),
            project_model: default_model(),
            daily_model: default_model(),
            hourly_model: default_model(),
            report_model: default_model(),
        }
    }
}

/// Base URL of an email or chat backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    #[serde(default = "default_backend_url")]
    pub base_url: String,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: default_backend_url(),
        }
    }
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            simulation: SimulationConfig::default(),
            database: DatabaseConfig::default(),
            planner: PlannerConfig::default(),
            email: BackendConfig::default(),
            chat: BackendConfig::default(),
        }
    }
}

impl SimConfig {
    /// Load config: explicit path > `OFFICESIM_CONFIG` env > `officesim.toml`
    /// in the working directory. Nested keys come from `OFFICESIM_*` with
    /// `__` as the separator; the flat operator keys from the admin surface
    /// (`HOURS_PER_DAY`, `LOCALE`, ...) are applied last.
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let path = config_path
            .map(String::from)
            .or_else(|| std::env::var("OFFICESIM_CONFIG").ok())
            .unwrap_or_else(|| "officesim.toml".to_string());

        let mut config: SimConfig = Figment::new()
            .merge(Toml::file(&path))
            .merge(Env::prefixed("OFFICESIM_").split("__"))
            .extract()
            .map_err(|e| SimError::Config(e.to_string()))?;

        config.apply_flat_env();
        config.validate()?;
        Ok(config)
    }

    /// Operator-facing flat environment keys override whatever the file and
    /// prefixed env provided.
    fn apply_flat_env(&mut self) {
        if let Some(v) = env_parse::<i64>("HOURS_PER_DAY") {
            self.simulation.hours_per_day = v;
        }
        if let Some(v) = env_parse::<f64>("TICK_INTERVAL_SECONDS") {
            self.simulation.tick_interval_seconds = v;
        }
        if let Some(v) = env_parse::<i64>("CONTACT_COOLDOWN_TICKS") {
            self.simulation.contact_cooldown_ticks = v;
        }
        if let Some(v) = env_parse::<u32>("MAX_HOURLY_PLANS_PER_MINUTE") {
            self.simulation.max_hourly_plans_per_minute = v;
        }
        if let Some(v) = env_parse::<usize>("MAX_PLANNING_WORKERS") {
            self.simulation.max_planning_workers = v;
        }
        if let Some(v) = std::env::var("PLANNER_STRICT").ok().map(truthy) {
            self.planner.strict = v;
        }
        if let Some(v) = std::env::var("AUTO_PAUSE_ON_PROJECT_END").ok().map(truthy) {
            self.simulation.auto_pause_on_project_end = v;
        }
        if let Ok(v) = std::env::var("LOCALE") {
            match v.trim().parse::<Locale>() {
                Ok(locale) => self.simulation.locale = locale,
                Err(_) => tracing::warn!(value = %v, "ignoring unknown LOCALE"),
            }
        }
        if let Ok(v) = std::env::var("EXTERNAL_STAKEHOLDERS") {
            self.simulation.external_stakeholders = v
                .split(',')
                .map(|s| s.trim().to_ascii_lowercase())
                .filter(|s| !s.is_empty())
                .collect();
        }
    }

    fn validate(&self) -> Result<()> {
        if self.simulation.hours_per_day < 1 {
            return Err(SimError::Config(
                "hours_per_day must be at least 1".to_string(),
            ));
        }
        if self.simulation.tick_interval_seconds < 0.0 {
            return Err(SimError::Config(
                "tick_interval_seconds cannot be negative".to_string(),
            ));
        }
        Ok(())
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    let raw = std::env::var(key).ok()?;
    match raw.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!(%key, value = %raw, "ignoring unparseable env override");
            None
        }
    }
}

fn truthy(raw: String) -> bool {
    matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

fn bool_true() -> bool {
    true
}

fn default_hours_per_day() -> i64 {
    8
}

fn default_tick_interval() -> f64 {
    1.0
}

fn default_cooldown_ticks() -> i64 {
    10
}

fn default_max_hourly_plans() -> u32 {
    10
}

fn default_max_planning_workers() -> usize {
    4
}

fn default_db_path() -> String {
    "officesim.db".to_string()
}

fn default_llm_base_url() -> String {
    "https://api.openai.com".to_string()
}

fn default_chat_path() -> String {
    "/v1/chat/completions".to_string()
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_backend_url() -> String {
    "http://127.0.0.1:8000".to_string()
}

fn default_manager_email() -> String {
    DEFAULT_MANAGER_EMAIL.to_string()
}

fn default_manager_handle() -> String {
    DEFAULT_MANAGER_HANDLE.to_string()
}
