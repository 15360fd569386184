//! Merging finalized streams from several log sources.

use tracing::debug;

use super::record::TrafficEvent;
use super::sequence::{compute_delays, mark_last_requests};

#[derive(Debug, Clone, Copy, Default)]
pub struct MergeOptions {
    /// Recompute last-request markers across all sources. By default each
    /// source keeps the markers it was finalized with.
    pub remark_last_requests: bool,
}

/// Concatenates streams and re-derives global ordering and delays.
#[derive(Debug, Default)]
pub struct MultiSourceMerger {
    options: MergeOptions,
    events: Vec<TrafficEvent>,
    sources: usize,
}

impl MultiSourceMerger {
    pub fn new(options: MergeOptions) -> Self {
        Self {
            options,
            events: Vec::new(),
            sources: 0,
        }
    }

    pub fn add_source(&mut self, events: Vec<TrafficEvent>) {
        debug!(source = self.sources, events = events.len(), "Adding merge source");
        self.sources += 1;
        self.events.extend(events);
    }

    pub fn source_count(&self) -> usize {
        self.sources
    }

    pub fn merge(mut self) -> Vec<TrafficEvent> {
        self.events.sort_by_key(|event| event.timestamp);
        if self.options.remark_last_requests {
            mark_last_requests(&mut self.events);
        }
        compute_delays(&mut self.events);
        self.events
    }
}

/// Merge a set of streams in one call.
pub fn merge_streams(
    streams: impl IntoIterator<Item = Vec<TrafficEvent>>,
    options: MergeOptions,
) -> Vec<TrafficEvent> {
    let mut merger = MultiSourceMerger::new(options);
    for stream in streams {
        merger.add_source(stream);
    }
    merger.merge()
}
