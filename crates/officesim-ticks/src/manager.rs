use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Duration as ChronoDuration, Utc};

use officesim_core::types::Person;

use crate::auto::AutoTask;
use crate::error::{Result, TickError};

/// Owns tick arithmetic, the per-person work-hour cache, the wall-clock
/// base datetime captured on start, the advance mutex, and the auto-tick
/// task handle.
pub struct TickManager {
    hours_per_day: i64,
    tick_interval_seconds: Mutex<f64>,
    base_dt: Mutex<Option<DateTime<Utc>>>,
    work_windows: Mutex<HashMap<i64, (i64, i64)>>,
    /// Serializes every `advance` body (and resets) engine-wide. Held
    /// across planner/gateway awaits, hence a tokio mutex.
    advance_lock: tokio::sync::Mutex<()>,
    pub(crate) auto_task: Mutex<Option<AutoTask>>,
}

impl TickManager {
    pub fn new(hours_per_day: i64, tick_interval_seconds: f64) -> Self {
        Self {
            hours_per_day: hours_per_day.max(1),
            tick_interval_seconds: Mutex::new(tick_interval_seconds),
            base_dt: Mutex::new(None),
            work_windows: Mutex::new(HashMap::new()),
            advance_lock: tokio::sync::Mutex::new(()),
            auto_task: Mutex::new(None),
        }
    }

    pub fn hours_per_day(&self) -> i64 {
        self.hours_per_day
    }

    /// Acquire the advance mutex; the guard must live for the whole
    /// advance (or reset) body.
    pub async fn lock_advance(&self) -> tokio::sync::MutexGuard<'_, ()> {
        self.advance_lock.lock().await
    }

    /// Capture the wall-clock base used by [`sim_datetime_for_tick`].
    /// `None` means "now".
    pub fn set_base_datetime(&self, base: Option<DateTime<Utc>>) {
        *self.base_dt.lock().unwrap() = Some(base.unwrap_or_else(Utc::now));
    }

    pub fn clear_base_datetime(&self) {
        *self.base_dt.lock().unwrap() = None;
    }

    // --- conversions --------------------------------------------------------

    /// Parse `"HH:MM"` to a tick-of-day in `[0, H]`. Malformed input maps
    /// to 0, matching the forgiving persona-input handling upstream.
    pub fn parse_time_to_tick(&self, time_str: &str, round_up: bool) -> i64 {
        let minutes = match parse_minutes(time_str) {
            Some(m) => m,
            None => return 0,
        };
        let h = self.hours_per_day as f64;
        let ticks = (minutes as f64 / 1440.0) * h;
        let tick = if round_up {
            ticks.ceil() as i64
        } else {
            ticks.floor() as i64
        };
        tick.clamp(0, self.hours_per_day)
    }

    /// Parse `"HH:MM-HH:MM"` into a `(start, end)` tick-of-day window.
    /// Degenerate inputs (short days, missing dash, empty window) fall back
    /// to the full day.
    pub fn parse_work_hours_to_ticks(&self, work_hours: &str) -> (i64, i64) {
        let h = self.hours_per_day;
        if h < 6 {
            return (0, h);
        }
        let Some((start_str, end_str)) = work_hours.split_once('-') else {
            return (0, h);
        };
        let start = self
            .parse_time_to_tick(start_str.trim(), false)
            .clamp(0, h - 1);
        let end = self.parse_time_to_tick(end_str.trim(), true).clamp(0, h);
        if start == end {
            return (0, h);
        }
        (start, end)
    }

    /// Rebuild the work-window cache from the active roster.
    pub fn update_work_windows(&self, people: &[Person]) {
        let mut cache = HashMap::with_capacity(people.len());
        for person in people {
            cache.insert(person.id, self.parse_work_hours_to_ticks(&person.work_hours));
        }
        *self.work_windows.lock().unwrap() = cache;
    }

    pub fn work_hours_ticks(&self, person_id: i64) -> (i64, i64) {
        self.work_windows
            .lock()
            .unwrap()
            .get(&person_id)
            .copied()
            .unwrap_or((0, self.hours_per_day))
    }

    /// Whether `tick` falls inside the person's cached work window.
    /// Wrap-around windows (night shifts) are supported.
    pub fn is_within_work_hours(&self, person: &Person, tick: i64) -> bool {
        let window = self.work_windows.lock().unwrap().get(&person.id).copied();
        let Some((start, end)) = window else {
            return true;
        };
        let tick_of_day = (tick - 1).rem_euclid(self.hours_per_day);
        if start <= end {
            start <= tick_of_day && tick_of_day < end
        } else {
            tick_of_day >= start || tick_of_day < end
        }
    }

    /// `"Day N HH:MM"` with 1-indexed days; tick 0 renders as Day 0.
    pub fn format_sim_time(&self, tick: i64) -> String {
        if tick <= 0 {
            return "Day 0 00:00".to_string();
        }
        let day_index = (tick - 1) / self.hours_per_day + 1;
        let (hour, minute) = self.clock_of_day(tick);
        format!("Day {day_index} {hour:02}:{minute:02}")
    }

    /// Concrete datetime for a tick, relative to the base captured at
    /// start. `None` until a simulation has started.
    pub fn sim_datetime_for_tick(&self, tick: i64) -> Option<DateTime<Utc>> {
        let base = (*self.base_dt.lock().unwrap())?;
        let day_index = (tick - 1).div_euclid(self.hours_per_day);
        let tick_of_day = (tick - 1).rem_euclid(self.hours_per_day);
        let minutes = (tick_of_day as f64 / self.hours_per_day as f64 * 1440.0) as i64;
        Some(base + ChronoDuration::days(day_index) + ChronoDuration::minutes(minutes))
    }

    /// 1-indexed week number assuming 5-day work weeks.
    pub fn current_week(&self, current_tick: i64) -> i64 {
        if current_tick <= 0 {
            return 1;
        }
        let current_day = (current_tick - 1) / self.hours_per_day;
        (current_day / 5 + 1).max(1)
    }

    pub fn day_index(&self, tick: i64) -> i64 {
        if tick <= 0 {
            0
        } else {
            (tick - 1) / self.hours_per_day
        }
    }

    pub fn tick_of_day(&self, tick: i64) -> i64 {
        if tick <= 0 {
            0
        } else {
            (tick - 1) % self.hours_per_day
        }
    }

    fn clock_of_day(&self, tick: i64) -> (i64, i64) {
        let tick_of_day = (tick - 1).rem_euclid(self.hours_per_day);
        let minutes = (tick_of_day as f64 / self.hours_per_day as f64 * 1440.0) as i64;
        (minutes / 60, minutes % 60)
    }

    // --- auto-tick interval -------------------------------------------------

    pub fn tick_interval(&self) -> f64 {
        *self.tick_interval_seconds.lock().unwrap()
    }

    /// 0 means max speed. Intervals above 60 s are refused so a typo can't
    /// stall the scheduler for minutes.
    pub fn set_tick_interval(&self, seconds: f64) -> Result<()> {
        if seconds < 0.0 {
            return Err(TickError::InvalidInterval(
                "tick interval cannot be negative".into(),
            ));
        }
        if seconds > 60.0 {
            return Err(TickError::InvalidInterval(
                "tick interval cannot exceed 60 seconds".into(),
            ));
        }
        *self.tick_interval_seconds.lock().unwrap() = seconds;
        Ok(())
    }
}

fn parse_minutes(time_str: &str) -> Option<i64> {
    let (hours, minutes) = time_str.trim().split_once(':')?;
    let hours: i64 = hours.trim().parse().ok()?;
    let minutes: i64 = minutes.trim().parse().ok()?;
    Some(hours * 60 + minutes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn person(id: i64, work_hours: &str) -> Person {
        Person {
            id,
            name: format!("P{id}"),
            role: "dev".into(),
            timezone: "UTC".into(),
            work_hours: work_hours.into(),
            break_frequency: "hourly".into(),
            communication_style: "direct".into(),
            email_address: format!("p{id}@co"),
            chat_handle: format!("p{id}"),
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

    #[test]
    fn parse_time_boundaries() {
        let tm = TickManager::new(8, 1.0);
        assert_eq!(tm.parse_time_to_tick("00:00", false), 0);
        assert_eq!(tm.parse_time_to_tick("23:59", true), 8);
        assert_eq!(tm.parse_time_to_tick("09:00", false), 3);
        assert_eq!(tm.parse_time_to_tick("garbage", false), 0);
    }

    #[test]
    fn work_hours_parse_and_fallbacks() {
        let tm = TickManager::new(8, 1.0);
        assert_eq!(tm.parse_work_hours_to_ticks("09:00-17:00"), (3, 6));
        assert_eq!(tm.parse_work_hours_to_ticks(""), (0, 8));
        // Short days always span the full window.
        let tiny = TickManager::new(4, 1.0);
        assert_eq!(tiny.parse_work_hours_to_ticks("09:00-17:00"), (0, 4));
    }

    #[test]
    fn format_sim_time_matches_day_rollover() {
        let tm = TickManager::new(8, 1.0);
        assert_eq!(tm.format_sim_time(0), "Day 0 00:00");
        assert_eq!(tm.format_sim_time(1), "Day 1 00:00");
        assert_eq!(tm.format_sim_time(9), "Day 2 00:00");
        assert_eq!(tm.format_sim_time(8), "Day 1 21:00");
    }

    #[test]
    fn within_work_hours_including_wraparound() {
        let tm = TickManager::new(8, 1.0);
        let day = person(1, "09:00-17:00");
        let night = person(2, "21:00-06:00");
        tm.update_work_windows(&[day.clone(), night.clone()]);

        // 09:00-17:00 → ticks of day 3..6.
        assert!(!tm.is_within_work_hours(&day, 1));
        assert!(tm.is_within_work_hours(&day, 4));
        assert!(!tm.is_within_work_hours(&day, 7));

        // 21:00-06:00 wraps: tick-of-day >= 7 or < 2.
        assert!(tm.is_within_work_hours(&night, 8));
        assert!(tm.is_within_work_hours(&night, 1));
        assert!(!tm.is_within_work_hours(&night, 4));
    }

    #[test]
    fn unknown_person_is_always_working() {
        let tm = TickManager::new(8, 1.0);
        let p = person(9, "09:00-17:00");
        assert!(tm.is_within_work_hours(&p, 1));
    }

    #[test]
    fn sim_datetime_requires_base() {
        let tm = TickManager::new(8, 1.0);
        assert!(tm.sim_datetime_for_tick(1).is_none());
        let base = "2026-01-05T00:00:00Z".parse::<DateTime<Utc>>().unwrap();
        tm.set_base_datetime(Some(base));
        assert_eq!(tm.sim_datetime_for_tick(1), Some(base));
        // Tick 9 = day 2, first minute.
        assert_eq!(
            tm.sim_datetime_for_tick(9),
            Some(base + ChronoDuration::days(1))
        );
        // Half way through day 1 → 12:00 simulated.
        assert_eq!(
            tm.sim_datetime_for_tick(5),
            Some(base + ChronoDuration::minutes(720))
        );
    }

    #[test]
    fn week_advances_every_five_days() {
        let tm = TickManager::new(8, 1.0);
        assert_eq!(tm.current_week(0), 1);
        assert_eq!(tm.current_week(8 * 5), 1);
        assert_eq!(tm.current_week(8 * 5 + 1), 2);
    }

    #[test]
    fn interval_guard() {
        let tm = TickManager::new(8, 1.0);
        assert!(tm.set_tick_interval(0.0).is_ok());
        assert!(tm.set_tick_interval(-1.0).is_err());
        assert!(tm.set_tick_interval(61.0).is_err());
        assert_eq!(tm.tick_interval(), 0.0);
    }
}
