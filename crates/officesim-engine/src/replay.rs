use std::sync::{Arc, Mutex};

use serde::Serialize;
use tracing::info;

use officesim_core::{Result, SimError};
use officesim_store::ExchangeEntry;

use crate::engine::{storage, SimulationEngine};

/// Replay works on 24-hour calendar days: 1440 ticks per day regardless of
/// the workday length.
const TICKS_PER_CALENDAR_DAY: i64 = 24 * 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplayMode {
    Live,
    Replay,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReplayMetadata {
    pub max_generated_tick: i64,
    pub current_tick: i64,
    pub total_days: i64,
    pub mode: ReplayMode,
    pub is_replay: bool,
    pub total_emails: i64,
    pub total_chats: i64,
}

/// Communications observed at one tick, with its calendar position.
#[derive(Debug, Clone, Serialize)]
pub struct TickData {
    pub tick: i64,
    pub day: i64,
    pub hour: i64,
    pub minute: i64,
    pub sim_time: String,
    pub is_replay: bool,
    pub max_generated_tick: i64,
    pub emails: Vec<ReplayComm>,
    pub chats: Vec<ReplayComm>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReplayComm {
    pub id: i64,
    pub tick: i64,
    pub sender_id: Option<i64>,
    pub recipient_id: Option<i64>,
    pub subject: Option<String>,
    pub summary: Option<String>,
    pub at: String,
}

/// Read-only time machine over historical simulation output.
///
/// Jumps move the `current_tick` pointer only; they never touch live
/// engine state beyond it, and the boundary is the highest tick with
/// logged traffic.
pub struct ReplayManager {
    engine: Arc<SimulationEngine>,
    mode: Mutex<ReplayMode>,
}

impl ReplayManager {
    pub fn new(engine: Arc<SimulationEngine>) -> Self {
        Self {
            engine,
            mode: Mutex::new(ReplayMode::Live),
        }
    }

    pub fn mode(&self) -> ReplayMode {
        *self.mode.lock().unwrap()
    }

    /// Highest tick with generated data; jumps beyond it are refused.
    pub fn max_generated_tick(&self) -> Result<i64> {
        self.engine.exchange.max_tick().map_err(storage)
    }

    pub fn metadata(&self) -> Result<ReplayMetadata> {
        let max_tick = self.max_generated_tick()?;
        let current_tick = self
            .engine
            .state
            .simulation_state()
            .map_err(storage)?
            .current_tick;
        let (emails, chats) = self.engine.exchange.channel_counts().map_err(storage)?;
        let is_replay = current_tick < max_tick;
        Ok(ReplayMetadata {
            max_generated_tick: max_tick,
            current_tick,
            total_days: if max_tick > 0 {
                max_tick / TICKS_PER_CALENDAR_DAY + 1
            } else {
                0
            },
            mode: if is_replay {
                ReplayMode::Replay
            } else {
                ReplayMode::Live
            },
            is_replay,
            total_emails: emails,
            total_chats: chats,
        })
    }

    /// `(day, hour, minute)` on the 1440-tick calendar.
    pub fn tick_to_time(&self, tick: i64) -> (i64, i64, i64) {
        let day = (tick - 1).div_euclid(TICKS_PER_CALENDAR_DAY) + 1;
        let tick_of_day = (tick - 1).rem_euclid(TICKS_PER_CALENDAR_DAY);
        (day, tick_of_day / 60, tick_of_day % 60)
    }

    pub fn time_to_tick(&self, day: i64, hour: i64, minute: i64) -> Result<i64> {
        if day < 1 {
            return Err(SimError::InputInvalid(format!("day must be >= 1, got {day}")));
        }
        if !(0..=23).contains(&hour) {
            return Err(SimError::InputInvalid(format!("hour must be 0-23, got {hour}")));
        }
        if !(0..=59).contains(&minute) {
            return Err(SimError::InputInvalid(format!(
                "minute must be 0-59, got {minute}"
            )));
        }
        Ok((day - 1) * TICKS_PER_CALENDAR_DAY + hour * 60 + minute + 1)
    }

    /// Jump the current-tick pointer to `tick` and return that tick's view.
    pub fn jump_to_tick(&self, tick: i64) -> Result<TickData> {
        let max_tick = self.max_generated_tick()?;
        if tick < 1 {
            return Err(SimError::InputInvalid(format!("tick must be >= 1, got {tick}")));
        }
        if tick > max_tick {
            return Err(SimError::InputInvalid(format!(
                "cannot jump to tick {tick}: only {max_tick} ticks have been generated"
            )));
        }
        info!(tick, "replay jump");
        self.engine.state.set_tick_silent(tick).map_err(storage)?;
        *self.mode.lock().unwrap() = ReplayMode::Replay;
        self.current_tick_data()
    }

    pub fn jump_to_time(&self, day: i64, hour: i64, minute: i64) -> Result<TickData> {
        let tick = self.time_to_tick(day, hour, minute)?;
        self.jump_to_tick(tick)
    }

    /// The view at the engine's current tick.
    pub fn current_tick_data(&self) -> Result<TickData> {
        let current_tick = self
            .engine
            .state
            .simulation_state()
            .map_err(storage)?
            .current_tick;
        self.tick_data(current_tick)
    }

    /// Communications logged at exactly `tick`, split by channel.
    pub fn tick_data(&self, tick: i64) -> Result<TickData> {
        let entries = self.engine.exchange.entries_for_tick(tick).map_err(storage)?;
        let max_tick = self.max_generated_tick()?;
        let (day, hour, minute) = self.tick_to_time(tick);
        let (mut emails, mut chats) = (Vec::new(), Vec::new());
        for entry in entries {
            let comm = to_comm(&entry);
            match entry.channel.as_str() {
                "email" => emails.push(comm),
                "chat" => chats.push(comm),
                _ => {}
            }
        }
        Ok(TickData {
            tick,
            day,
            hour,
            minute,
            sim_time: format!("{hour:02}:{minute:02}"),
            is_replay: tick < max_tick,
            max_generated_tick: max_tick,
            emails,
            chats,
        })
    }

    /// Return to live mode: the pointer moves to the max generated tick.
    pub fn reset_to_live(&self) -> Result<ReplayMetadata> {
        let max_tick = self.max_generated_tick()?;
        self.engine.state.set_tick_silent(max_tick).map_err(storage)?;
        *self.mode.lock().unwrap() = ReplayMode::Live;
        info!(tick = max_tick, "replay reset to live");
        self.metadata()
    }
}

fn to_comm(entry: &ExchangeEntry) -> ReplayComm {
    ReplayComm {
        id: entry.id,
        tick: entry.tick,
        sender_id: entry.sender_id,
        recipient_id: entry.recipient_id,
        subject: entry.subject.clone(),
        summary: entry.summary.clone(),
        at: entry.created_at.clone(),
    }
}
