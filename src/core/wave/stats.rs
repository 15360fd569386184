//! Per-wave and per-run aggregation of session reports.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::time::Duration;

use serde::Serialize;
use serde_json::{Value, json};

use crate::core::flow::SessionReport;

fn ms(duration: Duration) -> f64 {
    duration.as_nanos() as f64 / 1_000_000.0
}

/// A session report tagged with where it ran.
#[derive(Debug, Clone)]
pub struct SessionRecord {
    /// 1-based wave number
    pub wave: usize,
    /// 0-based slot inside the wave
    pub slot: usize,
    pub report: SessionReport,
}

/// Distribution summary over a set of latencies.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LatencySummary {
    pub count: usize,
    pub min_ms: f64,
    pub max_ms: f64,
    pub mean_ms: f64,
    pub p50_ms: f64,
    pub p95_ms: f64,
    pub p99_ms: f64,
}

impl LatencySummary {
    /// `None` for an empty set.
    pub fn from_durations(latencies: &[Duration]) -> Option<Self> {
        if latencies.is_empty() {
            return None;
        }
        let mut sorted: Vec<f64> = latencies.iter().copied().map(ms).collect();
        sorted.sort_by(f64::total_cmp);

        let count = sorted.len();
        let sum: f64 = sorted.iter().sum();
        Some(Self {
            count,
            min_ms: sorted[0],
            max_ms: sorted[count - 1],
            mean_ms: sum / count as f64,
            p50_ms: percentile(&sorted, 50.0),
            p95_ms: percentile(&sorted, 95.0),
            p99_ms: percentile(&sorted, 99.0),
        })
    }
}

/// Nearest-rank percentile over ascending, non-empty data.
fn percentile(sorted: &[f64], pct: f64) -> f64 {
    let rank = ((pct / 100.0) * sorted.len() as f64).ceil() as usize;
    sorted[rank.clamp(1, sorted.len()) - 1]
}

/// Statistics for one wave. Latency figures cover successful sessions only.
#[derive(Debug, Clone, PartialEq)]
pub struct WaveResult {
    pub wave_number: usize,
    pub threads: usize,
    pub success: usize,
    pub failed: usize,
    /// Offset of the wave start from the run start
    pub started: Duration,
    pub wall: Duration,
    /// Total latency of each successful session, in completion order
    pub latencies: Vec<Duration>,
}

impl WaveResult {
    pub fn from_reports<'a>(
        wave_number: usize,
        wall: Duration,
        reports: impl IntoIterator<Item = &'a SessionReport>,
    ) -> Self {
        let mut threads = 0;
        let mut latencies = Vec::new();
        for report in reports {
            threads += 1;
            if let Some(total) = report.total_latency() {
                latencies.push(total);
            }
        }
        Self {
            wave_number,
            threads,
            success: latencies.len(),
            failed: threads - latencies.len(),
            started: Duration::ZERO,
            wall,
            latencies,
        }
    }

    pub fn min(&self) -> Option<Duration> {
        self.latencies.iter().min().copied()
    }

    pub fn max(&self) -> Option<Duration> {
        self.latencies.iter().max().copied()
    }

    pub fn avg(&self) -> Option<Duration> {
        if self.latencies.is_empty() {
            return None;
        }
        let total: Duration = self.latencies.iter().sum();
        Some(total / self.latencies.len() as u32)
    }

    pub fn to_json(&self) -> Value {
        json!({
            "wave_number": self.wave_number,
            "threads": self.threads,
            "success": self.success,
            "failed": self.failed,
            "started_ms": ms(self.started),
            "wall_ms": ms(self.wall),
            "latencies": self.latencies.iter().copied().map(ms).collect::<Vec<_>>(),
            "min": self.min().map(ms),
            "max": self.max().map(ms),
            "avg": self.avg().map(ms),
        })
    }
}

/// Average step latencies across successful sessions.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StepAverages {
    pub picker_ms: f64,
    pub picker_status_ms: f64,
    pub puzzle_load_ms: f64,
    /// Sum of the play updates of one session
    pub plays_ms: f64,
    pub per_play_ms: f64,
}

/// Everything a wave run produced.
#[derive(Debug, Clone)]
pub struct RunResult {
    pub requested_rps: usize,
    pub duration_secs: usize,
    pub waves: Vec<WaveResult>,
    pub sessions: Vec<SessionRecord>,
    /// Target spacing between wave starts
    pub interval: Duration,
    pub total_wall: Duration,
}

impl RunResult {
    pub fn total_sessions(&self) -> usize {
        self.sessions.len()
    }

    pub fn successes(&self) -> usize {
        self.sessions.iter().filter(|s| s.report.is_success()).count()
    }

    pub fn failures(&self) -> usize {
        self.total_sessions() - self.successes()
    }

    /// Sessions per second the schedule asked for.
    pub fn requested_rate(&self) -> f64 {
        let secs = self.interval.as_secs_f64();
        if secs <= 0.0 {
            return 0.0;
        }
        self.requested_rps as f64 / secs
    }

    /// Sessions launched per second over the scheduled window.
    ///
    /// The window runs from the first wave start to one interval past the
    /// last wave start, or to the end of the run if the last wave overran.
    pub fn achieved_rps(&self) -> f64 {
        let slots = self.interval * self.duration_secs as u32;
        let secs = self.total_wall.max(slots).as_secs_f64();
        if secs <= 0.0 {
            return 0.0;
        }
        self.total_sessions() as f64 / secs
    }

    pub fn latency_summary(&self) -> Option<LatencySummary> {
        let totals: Vec<Duration> = self
            .sessions
            .iter()
            .filter_map(|s| s.report.total_latency())
            .collect();
        LatencySummary::from_durations(&totals)
    }

    pub fn step_averages(&self) -> Option<StepAverages> {
        let done: Vec<&SessionReport> = self
            .sessions
            .iter()
            .map(|s| &s.report)
            .filter(|r| r.is_success())
            .collect();
        if done.is_empty() {
            return None;
        }

        let n = done.len() as f64;
        let avg = |f: &dyn Fn(&SessionReport) -> Duration| -> f64 {
            done.iter().map(|r| ms(f(*r))).sum::<f64>() / n
        };
        let plays_ms = avg(&|r| r.plays_latency());
        let play_count: usize = done.iter().map(|r| r.iterations.len()).sum();

        Some(StepAverages {
            picker_ms: avg(&|r| r.picker.unwrap_or_default()),
            picker_status_ms: avg(&|r| r.picker_status.unwrap_or_default()),
            puzzle_load_ms: avg(&|r| r.puzzle_load.unwrap_or_default()),
            plays_ms,
            per_play_ms: if play_count == 0 {
                0.0
            } else {
                plays_ms * n / play_count as f64
            },
        })
    }

    /// Failure counts keyed by error tag.
    pub fn error_breakdown(&self) -> BTreeMap<&'static str, usize> {
        let mut breakdown = BTreeMap::new();
        for tag in self.sessions.iter().filter_map(|s| s.report.error_tag()) {
            *breakdown.entry(tag).or_default() += 1;
        }
        breakdown
    }

    pub fn to_json(&self) -> Value {
        let sessions: Vec<Value> = self
            .sessions
            .iter()
            .map(|s| {
                json!({
                    "wave": s.wave,
                    "thread": s.slot,
                    "uid": s.report.uid,
                    "puzzle_id": s.report.puzzle_id,
                    "success": s.report.is_success(),
                    "error": s.report.error().map(ToString::to_string),
                    "error_tag": s.report.error_tag(),
                    "completed_iterations": s.report.iterations.len(),
                    "total_ms": s.report.total_latency().map(ms),
                })
            })
            .collect();

        json!({
            "config": {
                "rps": self.requested_rps,
                "duration": self.duration_secs,
                "total_threads": self.requested_rps * self.duration_secs,
                "interval_ms": ms(self.interval),
            },
            "waves": self.waves.iter().map(WaveResult::to_json).collect::<Vec<_>>(),
            "results": sessions,
            "total_time_ms": ms(self.total_wall),
            "requested_rate": self.requested_rate(),
            "achieved_rps": self.achieved_rps(),
            "latency": self.latency_summary(),
            "steps": self.step_averages(),
        })
    }

    /// Plain-text summary table.
    pub fn render_summary(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "{:>5} {:>8} {:>8} {:>8} {:>10} {:>10} {:>10}",
            "wave", "threads", "success", "failed", "min(ms)", "avg(ms)", "max(ms)"
        );
        let cell = |d: Option<Duration>| d.map_or_else(|| "-".to_string(), |d| format!("{:.0}", ms(d)));
        for wave in &self.waves {
            let _ = writeln!(
                out,
                "{:>5} {:>8} {:>8} {:>8} {:>10} {:>10} {:>10}",
                wave.wave_number,
                wave.threads,
                wave.success,
                wave.failed,
                cell(wave.min()),
                cell(wave.avg()),
                cell(wave.max()),
            );
        }

        let _ = writeln!(out);
        let _ = writeln!(
            out,
            "sessions: {} ({} ok, {} failed) in {:.1}s",
            self.total_sessions(),
            self.successes(),
            self.failures(),
            self.total_wall.as_secs_f64()
        );
        let _ = writeln!(
            out,
            "rate: requested {}/s, achieved {:.2}/s",
            self.requested_rate(),
            self.achieved_rps()
        );
        if let Some(l) = self.latency_summary() {
            let _ = writeln!(
                out,
                "latency (ms): min {:.0}  p50 {:.0}  p95 {:.0}  p99 {:.0}  max {:.0}  mean {:.0}",
                l.min_ms, l.p50_ms, l.p95_ms, l.p99_ms, l.max_ms, l.mean_ms
            );
        }
        if let Some(s) = self.step_averages() {
            let _ = writeln!(
                out,
                "steps avg (ms): picker {:.0}  status {:.0}  load {:.0}  plays {:.0} ({:.0}/update)",
                s.picker_ms, s.picker_status_ms, s.puzzle_load_ms, s.plays_ms, s.per_play_ms
            );
        }
        for (tag, count) in self.error_breakdown() {
            let _ = writeln!(out, "errors[{tag}]: {count}");
        }
        out
    }
}
