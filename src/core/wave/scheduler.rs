//! Wave-based session scheduler.
//!
//! A run is `duration` waves. Each wave launches exactly `rps` sessions as a
//! task group, waits for every one of them to reach a terminal state, then
//! sleeps out the rest of its one-second slot. A wave that overruns its slot
//! is followed immediately by the next one; lost time is not caught up and
//! waves never overlap.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use rand::SeedableRng;
use rand::rngs::StdRng;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::stats::{RunResult, SessionRecord, WaveResult};
use crate::core::flow::{SessionFlow, SessionReport};
use crate::errors::FlowError;
use crate::utils::UidSource;

/// Target spacing between wave starts
pub const WAVE_INTERVAL: Duration = Duration::from_secs(1);

/// Starts one session. Implementations must always return a report.
#[async_trait]
pub trait SessionLauncher: Send + Sync + 'static {
    async fn launch(&self, wave: usize, slot: usize) -> SessionReport;
}

/// Launches [`SessionFlow`]s with uids drawn from a [`UidSource`].
pub struct FlowLauncher {
    flow: SessionFlow,
    uids: UidSource,
    seed: Option<u64>,
    uid_rng: Mutex<StdRng>,
}

impl FlowLauncher {
    pub fn new(flow: SessionFlow, uids: UidSource, seed: Option<u64>) -> Self {
        let uid_rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self {
            flow,
            uids,
            seed,
            uid_rng: Mutex::new(uid_rng),
        }
    }
}

#[async_trait]
impl SessionLauncher for FlowLauncher {
    async fn launch(&self, wave: usize, slot: usize) -> SessionReport {
        let uid = self.uids.next_uid(&mut *self.uid_rng.lock());
        // distinct, reproducible stream per session
        let seed = self
            .seed
            .map(|seed| seed ^ ((wave as u64) << 32) ^ slot as u64);
        self.flow.run(uid, seed).await
    }
}

/// Runs waves of sessions at a fixed arrival rate.
#[derive(Debug, Clone)]
pub struct WaveScheduler {
    rps: usize,
    duration: usize,
    interval: Duration,
}

impl WaveScheduler {
    /// `rps` sessions per wave for `duration` waves.
    pub fn new(rps: usize, duration: usize) -> Self {
        Self {
            rps,
            duration,
            interval: WAVE_INTERVAL,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn total_sessions(&self) -> usize {
        self.rps * self.duration
    }

    pub async fn run(&self, launcher: Arc<dyn SessionLauncher>) -> RunResult {
        info!(
            rps = self.rps,
            duration = self.duration,
            total = self.total_sessions(),
            "Starting wave run"
        );

        let pool = Arc::new(Semaphore::new(self.rps));
        let mut waves = Vec::with_capacity(self.duration);
        let mut sessions = Vec::with_capacity(self.total_sessions());
        let run_start = Instant::now();

        for wave in 1..=self.duration {
            let wave_start = Instant::now();
            let records = self.run_wave(wave, &launcher, &pool).await;
            let wall = wave_start.elapsed();

            let mut result =
                WaveResult::from_reports(wave, wall, records.iter().map(|r| &r.report));
            result.started = wave_start - run_start;
            info!(
                wave,
                of = self.duration,
                success = result.success,
                failed = result.failed,
                wall_ms = wall.as_millis() as u64,
                avg_ms = result.avg().map(|d| d.as_millis() as u64),
                "Wave complete"
            );
            waves.push(result);
            sessions.extend(records);

            if wave < self.duration {
                let remaining = self.interval.saturating_sub(wall);
                if remaining.is_zero() {
                    debug!(wave, "Wave overran its slot, starting next wave immediately");
                } else {
                    tokio::time::sleep(remaining).await;
                }
            }
        }

        RunResult {
            requested_rps: self.rps,
            duration_secs: self.duration,
            waves,
            sessions,
            interval: self.interval,
            total_wall: run_start.elapsed(),
        }
    }

    /// Launch one wave and join every session in it.
    async fn run_wave(
        &self,
        wave: usize,
        launcher: &Arc<dyn SessionLauncher>,
        pool: &Arc<Semaphore>,
    ) -> Vec<SessionRecord> {
        let mut group = JoinSet::new();
        for slot in 0..self.rps {
            let launcher = Arc::clone(launcher);
            let pool = Arc::clone(pool);
            group.spawn(async move {
                // the pool is never closed
                let _permit = pool.acquire_owned().await.ok();
                (slot, launcher.launch(wave, slot).await)
            });
        }

        let mut records = Vec::with_capacity(self.rps);
        let mut lost = Vec::new();
        while let Some(joined) = group.join_next().await {
            match joined {
                Ok((slot, report)) => records.push(SessionRecord { wave, slot, report }),
                Err(e) => {
                    warn!(wave, error = %e, "Session task did not complete");
                    lost.push(e.to_string());
                }
            }
        }

        // a task that panicked still counts as a launched, failed session
        if !lost.is_empty() {
            let seen: BTreeSet<usize> = records.iter().map(|r| r.slot).collect();
            let missing = (0..self.rps).filter(|slot| !seen.contains(slot));
            for (slot, message) in missing.zip(lost) {
                records.push(SessionRecord {
                    wave,
                    slot,
                    report: SessionReport::aborted("", FlowError::Aborted(message)),
                });
            }
        }
        records
    }
}
