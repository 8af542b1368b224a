//! StageTrace — A recorded sequence of stage events for one session
//!
//! Used by the simulator for export and by tests to assert on ordering.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::event::StageEvent;
use crate::stage::Stage;

/// A complete trace of stage events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageTrace {
    /// Unique identifier for this trace
    pub trace_id: String,

    /// All events in chronological order
    pub events: Vec<StageEvent>,

    /// When this trace was recorded
    pub recorded_at: DateTime<Utc>,
}

impl StageTrace {
    /// Create a new empty trace
    pub fn new(trace_id: impl Into<String>) -> Self {
        Self {
            trace_id: trace_id.into(),
            events: Vec::new(),
            recorded_at: Utc::now(),
        }
    }

    /// Add an event to the trace
    pub fn push(&mut self, event: StageEvent) {
        self.events.push(event);
    }

    pub fn extend(&mut self, events: impl IntoIterator<Item = StageEvent>) {
        self.events.extend(events);
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Get total duration in milliseconds
    pub fn duration_ms(&self) -> f64 {
        match (self.events.first(), self.events.last()) {
            (Some(first), Some(last)) => last.timestamp_ms - first.timestamp_ms,
            _ => 0.0,
        }
    }

    /// Count events of a stage type
    pub fn count(&self, type_name: &str) -> usize {
        self.events
            .iter()
            .filter(|e| e.stage.type_name() == type_name)
            .count()
    }

    /// Check if trace contains a specific stage type
    pub fn has_stage(&self, type_name: &str) -> bool {
        self.events.iter().any(|e| e.stage.type_name() == type_name)
    }

    /// Find first event matching a predicate
    pub fn find_event<F>(&self, predicate: F) -> Option<&StageEvent>
    where
        F: Fn(&StageEvent) -> bool,
    {
        self.events.iter().find(|e| predicate(e))
    }

    /// Index of the first event of a type, for ordering assertions
    pub fn position(&self, type_name: &str) -> Option<usize> {
        self.events
            .iter()
            .position(|e| e.stage.type_name() == type_name)
    }

    /// Total payout across every completed hit
    pub fn total_payout(&self) -> u32 {
        self.events
            .iter()
            .filter_map(|e| match &e.stage {
                Stage::HitEnd { total_payout, .. } => Some(*total_payout),
                _ => None,
            })
            .sum()
    }

    /// Reel stop symbols in the order they landed
    pub fn reel_stops(&self) -> Vec<(u8, u8)> {
        self.events
            .iter()
            .filter_map(|e| match &e.stage {
                Stage::ReelStop {
                    reel_index, symbol, ..
                } => Some((*reel_index, *symbol)),
                _ => None,
            })
            .collect()
    }

    /// Export as pretty JSON
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_trace() -> StageTrace {
        let mut trace = StageTrace::new("t-1");
        trace.push(StageEvent::new(Stage::HitStart { round_count: 1 }, 100.0));
        trace.push(StageEvent::new(
            Stage::RoundStart {
                round: 1,
                target_in: 3,
            },
            100.0,
        ));
        trace.push(StageEvent::new(Stage::GateOpen, 100.0));
        trace.push(StageEvent::new(
            Stage::HitEnd {
                total_payout: 30,
                rounds_played: 1,
                timeouts: 0,
            },
            2600.0,
        ));
        trace
    }

    #[test]
    fn test_queries() {
        let trace = sample_trace();
        assert_eq!(trace.len(), 4);
        assert!(trace.has_stage("gate_open"));
        assert_eq!(trace.count("round_start"), 1);
        assert_eq!(trace.position("hit_end"), Some(3));
        assert_eq!(trace.total_payout(), 30);
        assert!((trace.duration_ms() - 2500.0).abs() < 1e-9);
    }

    #[test]
    fn test_json_export() {
        let trace = sample_trace();
        let json = trace.to_json().unwrap();
        let parsed: StageTrace = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.events, trace.events);
    }
}
