use std::collections::VecDeque;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use officesim_core::types::PlanContextSummary;

/// One planner call as recorded for monitoring.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsEntry {
    pub timestamp: String,
    pub method: &'static str,
    /// Planner asked first.
    pub planner: &'static str,
    /// Planner that produced the returned result.
    pub result_planner: &'static str,
    pub model: String,
    pub duration_ms: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback_duration_ms: Option<f64>,
    pub fallback: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub context: PlanContextSummary,
}

/// Bounded ring of planner-call entries, newest last.
pub struct MetricsRecorder {
    entries: Mutex<VecDeque<MetricsEntry>>,
    cap: usize,
}

impl MetricsRecorder {
    pub fn new(cap: usize) -> Self {
        Self {
            entries: Mutex::new(VecDeque::with_capacity(cap)),
            cap,
        }
    }

    pub fn append(&self, entry: MetricsEntry) {
        let mut entries = self.entries.lock().unwrap();
        if entries.len() == self.cap {
            entries.pop_front();
        }
        entries.push_back(entry);
    }

    /// The most recent `limit` entries, oldest first.
    pub fn list(&self, limit: usize) -> Vec<MetricsEntry> {
        let entries = self.entries.lock().unwrap();
        let skip = entries.len().saturating_sub(limit);
        entries.iter().skip(skip).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MetricsRecorder {
    fn default() -> Self {
        Self::new(200)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(method: &'static str) -> MetricsEntry {
        MetricsEntry {
            timestamp: "t".into(),
            method,
            planner: "llm",
            result_planner: "llm",
            model: "m".into(),
            duration_ms: 1.0,
            fallback_duration_ms: None,
            fallback: false,
            error: None,
            context: PlanContextSummary::default(),
        }
    }

    #[test]
    fn ring_is_bounded() {
        let recorder = MetricsRecorder::new(2);
        recorder.append(entry("a"));
        recorder.append(entry("b"));
        recorder.append(entry("c"));
        let listed = recorder.list(10);
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].method, "b");
        assert_eq!(listed[1].method, "c");
    }

    #[test]
    fn list_limits_to_most_recent() {
        let recorder = MetricsRecorder::new(10);
        for m in ["a", "b", "c"] {
            recorder.append(entry(m));
        }
        let listed = recorder.list(2);
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].method, "b");
    }
}
