use std::sync::LazyLock;

use regex::Regex;

/// Channel of a parsed scheduled-communication line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommChannel {
    Email,
    Chat,
}

impl CommChannel {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommChannel::Email => "email",
            CommChannel::Chat => "chat",
        }
    }
}

/// A future send extracted from an hourly plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommAction {
    pub channel: CommChannel,
    pub target: String,
    pub payload: String,
    pub reply_to_email_id: Option<String>,
    pub cc: Vec<String>,
    pub bcc: Vec<String>,
}

// Accepted line shapes, case-insensitive, optional cc/bcc before ':'.
static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^Email\s+at\s+(\d{2}:\d{2})\s+to\s+([^:]+?)(?:\s+cc\s+([^:]+?))?(?:\s+bcc\s+([^:]+?))?\s*:\s*(.*)$",
    )
    .expect("email regex")
});
static REPLY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^Reply\s+at\s+(\d{2}:\d{2})\s+to\s+\[([^\]]+)\](?:\s+cc\s+([^:]+?))?(?:\s+bcc\s+([^:]+?))?\s*:\s*(.*)$",
    )
    .expect("reply regex")
});
static CHAT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^Chat\s+at\s+(\d{2}:\d{2})\s+(?:with|to)\s+([^:]+):\s*(.*)$").expect("chat regex")
});

/// Parse scheduled-communication lines out of free-form plan text.
///
/// Returns `(absolute_tick, action)` pairs for the current day. A line
/// whose time resolves to a tick-of-day at or before the current one is
/// dropped; nothing is ever scheduled retroactively.
pub fn parse_scheduled_comms(
    plan_text: &str,
    current_tick: i64,
    hours_per_day: i64,
) -> Vec<(i64, CommAction)> {
    let h = hours_per_day.max(1);
    let day_index = (current_tick - 1).div_euclid(h);
    let tick_of_day = (current_tick - 1).rem_euclid(h);
    let base_tick = day_index * h + 1;

    let mut out: Vec<(i64, CommAction)> = Vec::new();
    for line in plan_text.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let parsed = if let Some(caps) = EMAIL_RE.captures(line) {
            Some((
                caps.get(1).map(|m| m.as_str().to_string()).unwrap_or_default(),
                CommAction {
                    channel: CommChannel::Email,
                    target: trimmed(&caps, 2),
                    payload: trimmed(&caps, 5),
                    reply_to_email_id: None,
                    cc: split_addresses(caps.get(3).map(|m| m.as_str())),
                    bcc: split_addresses(caps.get(4).map(|m| m.as_str())),
                },
            ))
        } else if let Some(caps) = REPLY_RE.captures(line) {
            Some((
                caps.get(1).map(|m| m.as_str().to_string()).unwrap_or_default(),
                CommAction {
                    channel: CommChannel::Email,
                    // Target is resolved from the parent email at dispatch.
                    target: String::new(),
                    payload: trimmed(&caps, 5),
                    reply_to_email_id: Some(trimmed(&caps, 2)),
                    cc: split_addresses(caps.get(3).map(|m| m.as_str())),
                    bcc: split_addresses(caps.get(4).map(|m| m.as_str())),
                },
            ))
        } else {
            CHAT_RE.captures(line).map(|caps| {
                (
                    caps.get(1).map(|m| m.as_str().to_string()).unwrap_or_default(),
                    CommAction {
                        channel: CommChannel::Chat,
                        target: trimmed(&caps, 2),
                        payload: trimmed(&caps, 3),
                        reply_to_email_id: None,
                        cc: Vec::new(),
                        bcc: Vec::new(),
                    },
                )
            })
        };

        let Some((when, action)) = parsed else {
            continue;
        };
        let Some(minutes) = parse_minutes(&when) else {
            continue;
        };
        let scheduled_tick_of_day = ((minutes as f64) * (h as f64) / 1440.0).round() as i64;
        if scheduled_tick_of_day <= tick_of_day {
            continue;
        }
        let tick = base_tick + scheduled_tick_of_day;
        // Identical entries at the same tick collapse.
        if !out.iter().any(|(t, a)| *t == tick && *a == action) {
            out.push((tick, action));
        }
    }
    out
}

fn trimmed(caps: &regex::Captures<'_>, idx: usize) -> String {
    caps.get(idx)
        .map(|m| m.as_str().trim().to_string())
        .unwrap_or_default()
}

fn split_addresses(raw: Option<&str>) -> Vec<String> {
    raw.map(|raw| {
        raw.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    })
    .unwrap_or_default()
}

fn parse_minutes(when: &str) -> Option<i64> {
    let (hh, mm) = when.split_once(':')?;
    let hh: i64 = hh.parse().ok()?;
    let mm: i64 = mm.parse().ok()?;
    Some(hh * 60 + mm)
}

#[cfg(test)]
mod tests {
    use super::*;

    // H = 8 throughout: one tick covers three simulated hours of clock, so
    // 09:00 maps to tick-of-day 3.

    #[test]
    fn parses_email_line_with_subject_and_body() {
        let plan = "Email at 10:00 to bob@co: Ping | Hello";
        let parsed = parse_scheduled_comms(plan, 1, 8);
        assert_eq!(parsed.len(), 1);
        let (tick, action) = &parsed[0];
        // round(600 * 8 / 1440) = 3, day 0 → tick 4.
        assert_eq!(*tick, 4);
        assert_eq!(action.channel, CommChannel::Email);
        assert_eq!(action.target, "bob@co");
        assert_eq!(action.payload, "Ping | Hello");
    }

    #[test]
    fn parses_cc_and_bcc_lists() {
        let plan = "Email at 12:00 to bob@co cc carol@co, dan@co bcc eve@co: Subj | Body";
        let parsed = parse_scheduled_comms(plan, 1, 8);
        let action = &parsed[0].1;
        assert_eq!(action.cc, vec!["carol@co".to_string(), "dan@co".to_string()]);
        assert_eq!(action.bcc, vec!["eve@co".to_string()]);
    }

    #[test]
    fn parses_reply_directive() {
        let plan = "Reply at 09:20 to [email-7]: RE: Morning | Ack";
        let parsed = parse_scheduled_comms(plan, 1, 8);
        let action = &parsed[0].1;
        assert_eq!(action.reply_to_email_id.as_deref(), Some("email-7"));
        assert!(action.target.is_empty());
    }

    #[test]
    fn parses_chat_with_and_to_forms() {
        let plan = "Chat at 14:20 with bob: checking in\nchat at 15:00 to carol: status?";
        let parsed = parse_scheduled_comms(plan, 1, 8);
        assert_eq!(parsed.len(), 2);
        assert!(parsed.iter().all(|(_, a)| a.channel == CommChannel::Chat));
    }

    #[test]
    fn drops_times_at_or_before_the_current_minute() {
        // current_tick 4 → tick_of_day 3; 09:00 also maps to 3 → dropped.
        let plan = "Email at 09:00 to bob@co: Late | too late\nEmail at 13:00 to bob@co: Ok | fine";
        let parsed = parse_scheduled_comms(plan, 4, 8);
        assert_eq!(parsed.len(), 1);
        assert!(parsed[0].1.payload.contains("fine"));
    }

    #[test]
    fn duplicate_lines_collapse() {
        let plan = "Email at 10:00 to bob@co: Ping | Hello\nEmail at 10:00 to bob@co: Ping | Hello";
        let parsed = parse_scheduled_comms(plan, 1, 8);
        assert_eq!(parsed.len(), 1);
    }

    #[test]
    fn ignores_prose_lines() {
        let plan = "Focus:\n- write code\nEmail bob later today";
        assert!(parse_scheduled_comms(plan, 1, 8).is_empty());
    }

    #[test]
    fn schedules_relative_to_the_current_day() {
        // Tick 9 is day 1 (0-indexed day 1), base_tick 9.
        let parsed = parse_scheduled_comms("Email at 10:00 to bob@co: S | B", 9, 8);
        assert_eq!(parsed[0].0, 9 + 3);
    }
}
