//! Log-derived traffic replay.
//!
//! A finalized event stream is replayed against the target with its original
//! inter-arrival timing, optionally compressed by a speed factor. Users are
//! prewarmed first (picker + puzzle load) so that token-bearing requests can
//! be sent with real load tokens and play ids.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use futures::stream;
use parking_lot::Mutex;
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::Serialize;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::core::flow::session::{
    PICKER_NAME, PICKER_PATH, PLAY_STATE_IN_PROGRESS, PLAYS_PATH, PUZZLE_PATH,
};
use crate::core::flow::{
    ApiRequest, FlowConfig, GridState, HttpTransport, PlayUpdate, PostScoreReason, SessionContext,
    SessionFlow,
};
use crate::core::logs::TrafficEvent;
use crate::core::logs::endpoint::{
    CANONICAL_GAME_PATH, DATE_PICKER, PLAYS, POST_PICKER_STATUS, PUZZLES,
};
use crate::errors::{FlowError, FlowResult};

pub const DEFAULT_PREWARM_CONCURRENCY: usize = 50;

const PUZZLES_PATH: &str = "api/v1/puzzles";

/// Page size used by listing requests
const LIST_LIMIT: &str = "14";

/// Cells posted with autosave updates when the session has no grid size
const AUTOSAVE_CELLS: usize = 15;

#[derive(Debug, Clone)]
pub struct ReplayOptions {
    /// Replay speed multiplier; 2.0 halves every delay
    pub speed: f64,
    /// Schedule and record events without sending anything
    pub dry_run: bool,
    pub prewarm_concurrency: usize,
}

impl Default for ReplayOptions {
    fn default() -> Self {
        Self {
            speed: 1.0,
            dry_run: false,
            prewarm_concurrency: DEFAULT_PREWARM_CONCURRENCY,
        }
    }
}

/// Outcome of one replayed event.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplayEventResult {
    pub index: usize,
    /// Offset from replay start the event was scheduled for
    pub scheduled_ms: u64,
    /// Offset from replay start the event was actually sent
    pub actual_ms: u64,
    pub latency_ms: f64,
    pub success: bool,
    pub endpoint: String,
    pub user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplaySummary {
    pub events: usize,
    pub unique_users: usize,
    pub prewarmed: usize,
    pub prewarm_failed: usize,
    pub success: usize,
    pub failed: usize,
    /// Span of the traffic as logged
    pub original_span_ms: u64,
    /// Span after applying the speed factor
    pub scheduled_span_ms: u64,
    /// Wall time from replay start until the last response
    pub actual_ms: u64,
    pub avg_latency_ms: f64,
    pub speed: f64,
    pub dry_run: bool,
}

impl ReplaySummary {
    /// Human readable multi-line summary.
    pub fn render(&self) -> String {
        let mode = if self.dry_run { " (dry run)" } else { "" };
        format!(
            "Replay summary{mode}\n\
             events:          {}\n\
             unique users:    {} ({} prewarmed, {} failed)\n\
             success/failed:  {}/{}\n\
             original span:   {} ms\n\
             scheduled span:  {} ms (speed {}x)\n\
             actual wall:     {} ms\n\
             avg latency:     {:.1} ms",
            self.events,
            self.unique_users,
            self.prewarmed,
            self.prewarm_failed,
            self.success,
            self.failed,
            self.original_span_ms,
            self.scheduled_span_ms,
            self.speed,
            self.actual_ms,
            self.avg_latency_ms,
        )
    }
}

#[derive(Debug, Clone)]
pub struct ReplayReport {
    pub summary: ReplaySummary,
    /// Ordered by event index
    pub results: Vec<ReplayEventResult>,
}

/// Replays a finalized event stream.
pub struct TrafficReplayer {
    transport: Arc<dyn HttpTransport>,
    flow: SessionFlow,
    options: ReplayOptions,
    sessions: Arc<Mutex<HashMap<String, SessionContext>>>,
}

impl TrafficReplayer {
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        flow_config: Arc<FlowConfig>,
        options: ReplayOptions,
    ) -> Self {
        Self {
            flow: SessionFlow::new(Arc::clone(&transport), flow_config),
            transport,
            options,
            sessions: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Number of users with a prewarmed session.
    pub fn session_count(&self) -> usize {
        self.sessions.lock().len()
    }

    pub async fn replay(&self, events: &[TrafficEvent]) -> ReplayReport {
        let users: BTreeSet<&str> = events.iter().filter_map(|e| e.user_id.as_deref()).collect();
        info!(
            events = events.len(),
            users = users.len(),
            speed = self.options.speed,
            dry_run = self.options.dry_run,
            "Starting traffic replay"
        );

        let (prewarmed, prewarm_failed) = if self.options.dry_run || users.is_empty() {
            (0, 0)
        } else {
            self.prewarm(&users).await
        };

        let speed = if self.options.speed > 0.0 {
            self.options.speed
        } else {
            1.0
        };

        let start = Instant::now();
        let mut in_flight = JoinSet::new();
        let mut results = Vec::with_capacity(events.len());
        let mut timings = Vec::with_capacity(events.len());
        let mut lost = Vec::new();
        let mut cumulative_ms: u64 = 0;

        for (index, event) in events.iter().enumerate() {
            let scheduled_ms = (cumulative_ms as f64 / speed) as u64;
            cumulative_ms += event.delay_ms;

            tokio::time::sleep_until(start + Duration::from_millis(scheduled_ms)).await;
            let actual_ms = start.elapsed().as_millis() as u64;
            timings.push((scheduled_ms, actual_ms));

            if self.options.dry_run {
                debug!(index, endpoint = %event.endpoint, user = ?event.user_id, "Dry-run event");
                results.push(ReplayEventResult {
                    index,
                    scheduled_ms,
                    actual_ms,
                    latency_ms: 0.0,
                    success: true,
                    endpoint: event.endpoint.clone(),
                    user_id: event.user_id.clone(),
                    error: None,
                });
                continue;
            }

            let dispatcher = Dispatcher {
                transport: Arc::clone(&self.transport),
                flow: self.flow.clone(),
                sessions: Arc::clone(&self.sessions),
            };
            let event = event.clone();
            in_flight.spawn(async move {
                let sent = Instant::now();
                let outcome = dispatcher.fire(&event).await;
                let latency_ms = sent.elapsed().as_secs_f64() * 1000.0;
                if let Err(e) = &outcome {
                    debug!(index, endpoint = %event.endpoint, error = %e, "Replay request failed");
                }
                ReplayEventResult {
                    index,
                    scheduled_ms,
                    actual_ms,
                    latency_ms,
                    success: outcome.is_ok(),
                    endpoint: event.endpoint,
                    user_id: event.user_id,
                    error: outcome.err().map(|e| e.to_string()),
                }
            });

            // keep the set from growing without bound on long streams
            while let Some(done) = in_flight.try_join_next() {
                collect(done, &mut results, &mut lost);
            }
        }

        while let Some(done) = in_flight.join_next().await {
            collect(done, &mut results, &mut lost);
        }
        let actual_ms = start.elapsed().as_millis() as u64;

        // a task that panicked still counts as a sent, failed event
        if !lost.is_empty() {
            let seen: BTreeSet<usize> = results.iter().map(|r| r.index).collect();
            let missing = (0..events.len()).filter(|index| !seen.contains(index));
            for (index, message) in missing.zip(lost) {
                let (scheduled_ms, actual_ms) = timings[index];
                let event = &events[index];
                results.push(ReplayEventResult {
                    index,
                    scheduled_ms,
                    actual_ms,
                    latency_ms: 0.0,
                    success: false,
                    endpoint: event.endpoint.clone(),
                    user_id: event.user_id.clone(),
                    error: Some(FlowError::Aborted(message).to_string()),
                });
            }
        }
        results.sort_by_key(|r| r.index);

        let success = results.iter().filter(|r| r.success).count();
        let latency_sum: f64 = results.iter().map(|r| r.latency_ms).sum();
        let summary = ReplaySummary {
            events: events.len(),
            unique_users: users.len(),
            prewarmed,
            prewarm_failed,
            success,
            failed: results.len() - success,
            original_span_ms: cumulative_ms,
            scheduled_span_ms: (cumulative_ms as f64 / speed) as u64,
            actual_ms,
            avg_latency_ms: if results.is_empty() {
                0.0
            } else {
                latency_sum / results.len() as f64
            },
            speed,
            dry_run: self.options.dry_run,
        };

        info!(
            success = summary.success,
            failed = summary.failed,
            actual_ms = summary.actual_ms,
            "Traffic replay complete"
        );
        ReplayReport { summary, results }
    }

    /// Build a session for every user with bounded concurrency.
    /// Returns `(warmed, failed)`.
    async fn prewarm(&self, users: &BTreeSet<&str>) -> (usize, usize) {
        let started = Instant::now();
        let concurrency = self.options.prewarm_concurrency.max(1);
        info!(users = users.len(), concurrency, "Prewarming user sessions");

        let outcomes: Vec<(String, FlowResult<SessionContext>)> = stream::iter(users.iter())
            .map(|user| {
                let flow = self.flow.clone();
                let user = user.to_string();
                async move {
                    let result = prewarm_user(&flow, &user).await;
                    (user, result)
                }
            })
            .buffer_unordered(concurrency)
            .collect()
            .await;

        let mut warmed = 0;
        let mut failed = 0;
        let mut sessions = self.sessions.lock();
        for (user, outcome) in outcomes {
            match outcome {
                Ok(ctx) => {
                    sessions.insert(user, ctx);
                    warmed += 1;
                }
                Err(e) => {
                    warn!(user = %user, error = %e, "Failed to prewarm user");
                    failed += 1;
                }
            }
        }

        info!(
            warmed,
            failed,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Prewarm complete"
        );
        (warmed, failed)
    }
}

async fn prewarm_user(flow: &SessionFlow, user: &str) -> FlowResult<SessionContext> {
    let mut ctx = SessionContext::new(user);
    let mut rng = StdRng::from_os_rng();
    flow.picker(&mut ctx).await?;
    flow.puzzle_load(&mut ctx, &mut rng).await?;
    Ok(ctx)
}

fn collect(
    joined: Result<ReplayEventResult, tokio::task::JoinError>,
    results: &mut Vec<ReplayEventResult>,
    lost: &mut Vec<String>,
) {
    match joined {
        Ok(result) => results.push(result),
        Err(e) => {
            warn!(error = %e, "Replay task did not complete");
            lost.push(e.to_string());
        }
    }
}

/// Sends the request for one event.
struct Dispatcher {
    transport: Arc<dyn HttpTransport>,
    flow: SessionFlow,
    sessions: Arc<Mutex<HashMap<String, SessionContext>>>,
}

impl Dispatcher {
    fn session(&self, user: Option<&str>) -> Option<SessionContext> {
        let user = user?;
        self.sessions.lock().get(user).cloned()
    }

    fn require_session(&self, event: &TrafficEvent) -> FlowResult<SessionContext> {
        self.session(event.user_id.as_deref())
            .filter(|ctx| ctx.load_token.is_some())
            .ok_or_else(|| FlowError::Aborted(format!("no session for {}", event.endpoint)))
    }

    async fn fire(&self, event: &TrafficEvent) -> FlowResult<()> {
        let config = self.flow.config();
        let uid = event.user_id.clone().unwrap_or_default();
        let series = event
            .series
            .clone()
            .unwrap_or_else(|| config.set_param.clone());

        match (event.method_or_default(), event.endpoint.as_str()) {
            (_, DATE_PICKER) => {
                let request = ApiRequest::page(PICKER_PATH)
                    .with_query("set", &config.set_param)
                    .with_query("uid", uid);
                self.send(request).await
            }
            (_, POST_PICKER_STATUS) => {
                let ctx = self.require_session(event)?;
                self.flow.picker_status(&ctx).await.map(|_| ())
            }
            (_, CANONICAL_GAME_PATH) => {
                let ctx = self.session(event.user_id.as_deref());
                let puzzle_id = event
                    .puzzle_id
                    .clone()
                    .or_else(|| ctx.as_ref().and_then(|c| c.puzzle_id.clone()))
                    .unwrap_or_default();
                let load_token = ctx.and_then(|c| c.load_token).unwrap_or_default();
                let src = format!(
                    "{}{}?set={}&uid={}",
                    config.base_url, PICKER_PATH, config.set_param, uid
                );
                let request = ApiRequest::page(PUZZLE_PATH)
                    .with_query("id", puzzle_id)
                    .with_query("set", &config.set_param)
                    .with_query("picker", PICKER_NAME)
                    .with_query("src", src)
                    .with_query("uid", uid)
                    .with_query("loadToken", load_token);
                self.send(request).await
            }
            ("GET", PLAYS) => {
                let mut request = ApiRequest::get(PLAYS_PATH)
                    .with_query("series", series)
                    .with_query("limit", LIST_LIMIT)
                    .with_query("offset", "0");
                if let Some(puzzle_id) = &event.puzzle_id {
                    request = request.with_query("puzzleIds", puzzle_id);
                }
                self.send(request).await
            }
            (_, PLAYS) => {
                let ctx = self.require_session(event)?;
                let len = match ctx.state_len() {
                    0 => AUTOSAVE_CELLS,
                    n => n,
                };
                let mut rng = StdRng::from_os_rng();
                let grid = GridState::seeded(len, config.fill_ratio, &mut rng);
                let update = PlayUpdate {
                    play_state: PLAY_STATE_IN_PROGRESS,
                    grid: Some(&grid),
                    reason: PostScoreReason::Autosave,
                };
                self.flow.play_update(&ctx, update).await.map(|_| ())
            }
            (_, PUZZLES) => {
                let request = ApiRequest::get(PUZZLES_PATH)
                    .with_query("series", series)
                    .with_query("limit", LIST_LIMIT)
                    .with_query("offset", "0");
                self.send(request).await
            }
            (method, endpoint) => Err(FlowError::Aborted(format!(
                "unsupported request {method} {endpoint}"
            ))),
        }
    }

    async fn send(&self, request: ApiRequest) -> FlowResult<()> {
        let path = request.path.clone();
        self.transport.send(request).await?.ensure_success(&path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::flow::{ApiResponse, FlowConfig};
    use async_trait::async_trait;

    struct NeverCalled;

    #[async_trait]
    impl HttpTransport for NeverCalled {
        async fn send(&self, request: ApiRequest) -> FlowResult<ApiResponse> {
            panic!("dry run sent {}", request.path);
        }
    }

    /// Serves a picker page and a puzzle page, answers everything else
    /// with `{"status":0}`.
    struct SiteTransport {
        paths: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl HttpTransport for SiteTransport {
        async fn send(&self, request: ApiRequest) -> FlowResult<ApiResponse> {
            use base64::Engine;
            use base64::engine::general_purpose::STANDARD;

            self.paths.lock().push(request.path.clone());
            let page = |params: serde_json::Value| {
                format!(r#"<script type="application/json" id="params">{params}</script>"#)
            };
            let body = match request.path.as_str() {
                PICKER_PATH => page(serde_json::json!({
                    "rawsps": STANDARD.encode(r#"{"loadToken":"tok-1"}"#)
                })),
                PUZZLE_PATH => page(serde_json::json!({
                    "rawp": STANDARD.encode(r#"{"playId":"play-1"}"#)
                })),
                _ => r#"{"status":0}"#.to_string(),
            };
            Ok(ApiResponse {
                status: 200,
                body,
                latency: Duration::from_millis(3),
            })
        }
    }

    fn stream() -> Vec<TrafficEvent> {
        let mut a = TrafficEvent::new(0, DATE_PICKER).with_user("a");
        a.delay_ms = 1000;
        let mut b = TrafficEvent::new(1000, PLAYS).with_user("a");
        b.delay_ms = 3000;
        let c = TrafficEvent::new(4000, CANONICAL_GAME_PATH);
        vec![a, b, c]
    }

    #[tokio::test(start_paused = true)]
    async fn test_dry_run_schedules_with_speed() {
        let replayer = TrafficReplayer::new(
            Arc::new(NeverCalled),
            Arc::new(FlowConfig::default()),
            ReplayOptions {
                speed: 2.0,
                dry_run: true,
                ..ReplayOptions::default()
            },
        );
        let report = replayer.replay(&stream()).await;

        let scheduled: Vec<u64> = report.results.iter().map(|r| r.scheduled_ms).collect();
        assert_eq!(scheduled, vec![0, 500, 2000]);
        assert!(report.results.iter().all(|r| r.success));
        assert_eq!(report.summary.original_span_ms, 4000);
        assert_eq!(report.summary.scheduled_span_ms, 2000);
        assert_eq!(report.summary.unique_users, 1);
        assert_eq!(report.summary.prewarmed, 0);
        assert_eq!(replayer.session_count(), 0);
    }

    #[tokio::test]
    async fn test_live_replay_prewarms_and_dispatches() {
        let transport = Arc::new(SiteTransport {
            paths: Mutex::new(Vec::new()),
        });
        let config = FlowConfig {
            puzzle: crate::core::flow::PuzzleSelection::Fixed {
                puzzle_id: "1461ef6d".into(),
                state_len: 185,
            },
            ..FlowConfig::default()
        };
        let replayer = TrafficReplayer::new(
            transport.clone(),
            Arc::new(config),
            ReplayOptions {
                speed: 1000.0,
                ..ReplayOptions::default()
            },
        );

        let events = vec![
            TrafficEvent::new(0, POST_PICKER_STATUS).with_user("a"),
            TrafficEvent::new(0, PLAYS).with_method("POST").with_user("a"),
            TrafficEvent::new(0, PUZZLES).with_method("GET"),
            // no session for this user: fails without sending
            TrafficEvent::new(0, PLAYS).with_method("POST"),
        ];
        let report = replayer.replay(&events).await;

        assert_eq!(report.summary.prewarmed, 1);
        assert_eq!(replayer.session_count(), 1);
        let outcomes: Vec<bool> = report.results.iter().map(|r| r.success).collect();
        assert_eq!(outcomes, vec![true, true, true, false]);
        assert!(report.results[3].error.as_deref().unwrap().contains("no session"));

        let paths = transport.paths.lock().clone();
        assert_eq!(&paths[..2], &[PICKER_PATH.to_string(), PUZZLE_PATH.to_string()]);
        assert!(paths.contains(&PUZZLES_PATH.to_string()));
        assert_eq!(paths.len(), 5);
    }

    /// Panics on listing requests, answers everything else with status 0.
    struct PanicsOnListing;

    #[async_trait]
    impl HttpTransport for PanicsOnListing {
        async fn send(&self, request: ApiRequest) -> FlowResult<ApiResponse> {
            if request.path == PUZZLES_PATH {
                panic!("listing blew up");
            }
            Ok(ApiResponse {
                status: 200,
                body: r#"{"status":0}"#.to_string(),
                latency: Duration::from_millis(1),
            })
        }
    }

    #[tokio::test]
    async fn test_panicked_request_counts_as_failure() {
        let replayer = TrafficReplayer::new(
            Arc::new(PanicsOnListing),
            Arc::new(FlowConfig::default()),
            ReplayOptions {
                speed: 1000.0,
                ..ReplayOptions::default()
            },
        );
        let events = vec![
            TrafficEvent::new(0, PLAYS).with_method("GET"),
            TrafficEvent::new(0, PUZZLES).with_method("GET"),
            TrafficEvent::new(0, PLAYS).with_method("GET"),
        ];
        let report = replayer.replay(&events).await;

        assert_eq!(report.results.len(), 3);
        assert_eq!(report.summary.success, 2);
        assert_eq!(report.summary.failed, 1);
        assert_eq!(report.summary.success + report.summary.failed, report.summary.events);

        let failed = &report.results[1];
        assert_eq!(failed.index, 1);
        assert!(!failed.success);
        assert_eq!(failed.endpoint, PUZZLES);
        assert!(failed.error.is_some());
    }
}
