//! Rewriting a log-derived stream into what the play-only replayer accepts.

use super::endpoint::{CANONICAL_GAME_PATH, PLAYS, POST_PICKER_STATUS, PUZZLES};
use super::record::TrafficEvent;
use super::sequence::compute_delays;

pub const DEFAULT_SERIES: &str = "pplmag-site-puzzler";
pub const DEFAULT_PUZZLE_ID: &str = "ce996e5f";

/// `(method, endpoint)` pairs the replayer can dispatch.
pub const SUPPORTED_REQUESTS: &[(&str, &str)] = &[
    ("GET", PUZZLES),
    ("GET", PLAYS),
    ("POST", PLAYS),
    ("GET", CANONICAL_GAME_PATH),
    ("POST", POST_PICKER_STATUS),
];

#[derive(Debug, Clone)]
pub struct PrepareOptions {
    pub default_series: String,
    pub default_puzzle_id: String,
}

impl Default for PrepareOptions {
    fn default() -> Self {
        Self {
            default_series: DEFAULT_SERIES.to_string(),
            default_puzzle_id: DEFAULT_PUZZLE_ID.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PrepareReport {
    pub total: usize,
    pub kept: usize,
    pub method_rewrites: usize,
}

impl PrepareReport {
    pub fn dropped(&self) -> usize {
        self.total - self.kept
    }
}

/// Normalize events for replay.
///
/// `GET /postPickerStatus` is logged for what is a POST on the wire, so it is
/// rewritten. Unsupported pairs are dropped and empty `series`/`puzzleId`
/// are filled from `options`. Delays are recomputed over the surviving
/// events so the replay timeline keeps the gaps of dropped ones.
pub fn normalize_for_replay(
    events: Vec<TrafficEvent>,
    options: &PrepareOptions,
) -> (Vec<TrafficEvent>, PrepareReport) {
    let mut report = PrepareReport {
        total: events.len(),
        ..PrepareReport::default()
    };

    let mut kept: Vec<TrafficEvent> = events
        .into_iter()
        .filter_map(|mut event| {
            if event.endpoint == POST_PICKER_STATUS && event.method_or_default() == "GET" {
                event.method = Some("POST".to_string());
                report.method_rewrites += 1;
            }

            if !is_supported(event.method_or_default(), &event.endpoint) {
                return None;
            }

            event.method = Some(event.method_or_default().to_string());
            if event.series.as_deref().is_none_or(str::is_empty) {
                event.series = Some(options.default_series.clone());
            }
            if event.puzzle_id.as_deref().is_none_or(str::is_empty) {
                event.puzzle_id = Some(options.default_puzzle_id.clone());
            }
            Some(event)
        })
        .collect();

    compute_delays(&mut kept);
    report.kept = kept.len();
    (kept, report)
}

/// Whether the replayer can dispatch this pair.
pub fn is_supported(method: &str, endpoint: &str) -> bool {
    SUPPORTED_REQUESTS
        .iter()
        .any(|(m, e)| *m == method && *e == endpoint)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_picker_status_get_becomes_post() {
        let events = vec![TrafficEvent::new(1, POST_PICKER_STATUS).with_method("GET")];
        let (kept, report) = normalize_for_replay(events, &PrepareOptions::default());
        assert_eq!(kept[0].method.as_deref(), Some("POST"));
        assert_eq!(report.method_rewrites, 1);
    }

    #[test]
    fn test_unsupported_pairs_dropped() {
        let events = vec![
            TrafficEvent::new(1, "/date-picker").with_method("GET"),
            TrafficEvent::new(2, PUZZLES).with_method("POST"),
            TrafficEvent::new(3, CANONICAL_GAME_PATH),
        ];
        let (kept, report) = normalize_for_replay(events, &PrepareOptions::default());
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].endpoint, CANONICAL_GAME_PATH);
        assert_eq!(kept[0].method.as_deref(), Some("GET"));
        assert_eq!(report.dropped(), 2);
    }

    #[test]
    fn test_defaults_fill_only_missing() {
        let mut custom = TrafficEvent::new(1, PLAYS).with_method("POST");
        custom.series = Some("daily".into());
        custom.puzzle_id = Some(String::new());

        let (kept, _) = normalize_for_replay(vec![custom], &PrepareOptions::default());
        assert_eq!(kept[0].series.as_deref(), Some("daily"));
        assert_eq!(kept[0].puzzle_id.as_deref(), Some(DEFAULT_PUZZLE_ID));
    }

    #[test]
    fn test_dropped_event_gap_stays_in_delays() {
        let mut events = vec![
            TrafficEvent::new(0, PLAYS).with_method("POST"),
            TrafficEvent::new(100, "/date-picker").with_method("GET"),
            TrafficEvent::new(10_000, PLAYS).with_method("POST"),
        ];
        compute_delays(&mut events);
        assert_eq!(events[0].delay_ms, 100);

        let (kept, _) = normalize_for_replay(events, &PrepareOptions::default());
        let delays: Vec<u64> = kept.iter().map(|e| e.delay_ms).collect();
        assert_eq!(delays, vec![10_000, 0]);
    }
}
