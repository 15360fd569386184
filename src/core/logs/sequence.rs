//! Finalizing an event list into a replayable stream.

use std::collections::HashSet;

use super::record::TrafficEvent;

/// Orders events and fills in the derived `delayMs` / `isLastReq` fields.
#[derive(Debug, Default)]
pub struct SequenceBuilder {
    events: Vec<TrafficEvent>,
}

impl SequenceBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            events: Vec::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, event: TrafficEvent) {
        self.events.push(event);
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Sort, mark each user's last request and compute inter-arrival delays.
    pub fn build(mut self) -> Vec<TrafficEvent> {
        // stable: equal timestamps keep their source order
        self.events.sort_by_key(|event| event.timestamp);
        mark_last_requests(&mut self.events);
        compute_delays(&mut self.events);
        self.events
    }
}

impl Extend<TrafficEvent> for SequenceBuilder {
    fn extend<I: IntoIterator<Item = TrafficEvent>>(&mut self, iter: I) {
        self.events.extend(iter);
    }
}

impl FromIterator<TrafficEvent> for SequenceBuilder {
    fn from_iter<I: IntoIterator<Item = TrafficEvent>>(iter: I) -> Self {
        Self {
            events: iter.into_iter().collect(),
        }
    }
}

/// Flag the chronologically last event of every identified user.
///
/// Expects `events` sorted by timestamp. Existing flags are cleared first.
/// Events without a user are never flagged.
pub fn mark_last_requests(events: &mut [TrafficEvent]) {
    let mut seen: HashSet<&str> = HashSet::new();
    let mut last = vec![false; events.len()];

    for (idx, event) in events.iter().enumerate().rev() {
        if let Some(user) = event.user_id.as_deref() {
            if seen.insert(user) {
                last[idx] = true;
            }
        }
    }

    for (event, is_last) in events.iter_mut().zip(last) {
        event.is_last_request = is_last;
    }
}

/// `delayMs[i] = max(0, ts[i+1] - ts[i])`, and the final delay is zero.
pub fn compute_delays(events: &mut [TrafficEvent]) {
    let next_timestamps: Vec<i64> = events.iter().skip(1).map(|e| e.timestamp).collect();

    for (event, next) in events.iter_mut().zip(
        next_timestamps
            .into_iter()
            .map(Some)
            .chain(std::iter::once(None)),
    ) {
        event.delay_ms = match next {
            Some(next) => u64::try_from(next - event.timestamp).unwrap_or(0),
            None => 0,
        };
    }
}
