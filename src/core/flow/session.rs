//! One simulated user session against the puzzle API.
//!
//! ```text
//! PICKER → PICKER_STATUS → PUZZLE_LOAD → PLAY(1..=10) → DONE
//!    │           │              │            │
//!    └───────────┴──────────────┴────────────┴──→ FAILED
//! ```
//!
//! Every step depends on data decoded from the previous one, so the first
//! failure ends the session. Nothing is retried.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::IndexedRandom;
use serde_json::{Value, json};
use time::OffsetDateTime;
use tracing::{debug, warn};

use super::grid::GridState;
use super::page_data::{
    LoadTokenData, PlayMetadata, PuzzleCandidate, crossword_candidates, extract_params,
};
use super::transport::{ApiRequest, ApiResponse, BROWSER_USER_AGENT, HttpTransport};
use crate::errors::{FlowError, FlowResult, ParseError};

// =============================================================================
// Endpoints and constants
// =============================================================================

pub const PICKER_PATH: &str = "date-picker";
pub const PICKER_STATUS_PATH: &str = "postPickerStatus";
pub const PUZZLE_PATH: &str = "crossword";
pub const PLAYS_PATH: &str = "api/v1/plays";

/// Picker name reported back to the API
pub const PICKER_NAME: &str = "date-picker";

/// Play updates per session
pub const PLAY_ITERATIONS: usize = 10;

pub const PLAY_STATE_STARTED: u8 = 1;
pub const PLAY_STATE_IN_PROGRESS: u8 = 2;
pub const PLAY_STATE_COMPLETED: u8 = 4;

pub const DEFAULT_FILL_RATIO: f64 = 0.1;

/// Why the client posted a play update
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostScoreReason {
    Blur,
    Autosave,
}

impl PostScoreReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Blur => "BLUR",
            Self::Autosave => "AUTOSAVE",
        }
    }
}

// =============================================================================
// Configuration
// =============================================================================

/// How the puzzle for a session is chosen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PuzzleSelection {
    /// Pick uniformly among the crosswords listed on the picker page and use
    /// its grid dimensions.
    RandomFromPicker,
    /// Always load this puzzle with a grid of `state_len` cells.
    Fixed { puzzle_id: String, state_len: usize },
}

/// Immutable settings shared by every session of a run.
#[derive(Debug, Clone)]
pub struct FlowConfig {
    /// `set` query parameter, also reported as the play series
    pub set_param: String,
    /// Base URL used to build the `src` parameter of puzzle loads
    pub base_url: String,
    pub puzzle: PuzzleSelection,
    /// Share of cells filled in the seed grid
    pub fill_ratio: f64,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            set_param: "gandalf".to_string(),
            base_url: "http://localhost:8080/".to_string(),
            puzzle: PuzzleSelection::RandomFromPicker,
            fill_ratio: DEFAULT_FILL_RATIO,
        }
    }
}

// =============================================================================
// Session state
// =============================================================================

/// Data accumulated by one session. Owned by exactly one flow.
#[derive(Debug, Clone, Default)]
pub struct SessionContext {
    pub uid: String,
    pub load_token: Option<String>,
    pub puzzle_id: Option<String>,
    pub play_id: String,
    pub grid_width: usize,
    pub grid_height: usize,
    pub metadata: PlayMetadata,
    /// Picker params kept for puzzle selection
    picker_params: Option<Value>,
}

impl SessionContext {
    pub fn new(uid: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            ..Self::default()
        }
    }

    pub fn state_len(&self) -> usize {
        self.grid_width * self.grid_height
    }

    fn require_load_token(&self) -> FlowResult<&str> {
        self.load_token
            .as_deref()
            .ok_or(FlowError::Parse(ParseError::MissingField("loadToken")))
    }

    fn require_puzzle_id(&self) -> FlowResult<&str> {
        self.puzzle_id
            .as_deref()
            .ok_or(FlowError::Parse(ParseError::MissingField("puzzleId")))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowState {
    Picker,
    PickerStatus,
    PuzzleLoad,
    /// 1-based play iteration
    Play(usize),
    Done,
}

impl fmt::Display for FlowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Picker => f.write_str("PICKER"),
            Self::PickerStatus => f.write_str("PICKER_STATUS"),
            Self::PuzzleLoad => f.write_str("PUZZLE_LOAD"),
            Self::Play(i) => write!(f, "PLAY({i})"),
            Self::Done => f.write_str("DONE"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlayIteration {
    /// 1-based
    pub iteration: usize,
    pub play_state: u8,
    pub latency: Duration,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionOutcome {
    Done,
    Failed { state: FlowState, error: FlowError },
}

/// Result of one session, successful or not.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionReport {
    pub uid: String,
    pub puzzle_id: Option<String>,
    pub picker: Option<Duration>,
    pub picker_status: Option<Duration>,
    pub puzzle_load: Option<Duration>,
    pub iterations: Vec<PlayIteration>,
    pub outcome: SessionOutcome,
}

impl SessionReport {
    fn started(uid: &str) -> Self {
        Self {
            uid: uid.to_string(),
            puzzle_id: None,
            picker: None,
            picker_status: None,
            puzzle_load: None,
            iterations: Vec::with_capacity(PLAY_ITERATIONS),
            outcome: SessionOutcome::Done,
        }
    }

    /// Report for a session whose task never produced one.
    pub fn aborted(uid: impl Into<String>, error: FlowError) -> Self {
        let uid: String = uid.into();
        let mut report = Self::started(&uid);
        report.outcome = SessionOutcome::Failed {
            state: FlowState::Picker,
            error,
        };
        report
    }

    pub fn is_success(&self) -> bool {
        matches!(self.outcome, SessionOutcome::Done)
    }

    pub fn error(&self) -> Option<&FlowError> {
        match &self.outcome {
            SessionOutcome::Failed { error, .. } => Some(error),
            SessionOutcome::Done => None,
        }
    }

    pub fn error_tag(&self) -> Option<&'static str> {
        self.error().map(FlowError::tag)
    }

    /// Sum of all play update latencies so far.
    pub fn plays_latency(&self) -> Duration {
        self.iterations.iter().map(|i| i.latency).sum()
    }

    /// End-to-end latency. Only defined for completed sessions.
    pub fn total_latency(&self) -> Option<Duration> {
        if !self.is_success() {
            return None;
        }
        Some(
            self.picker.unwrap_or_default()
                + self.picker_status.unwrap_or_default()
                + self.puzzle_load.unwrap_or_default()
                + self.plays_latency(),
        )
    }
}

// =============================================================================
// Flow
// =============================================================================

/// Play update to post for an existing session.
#[derive(Debug, Clone, Copy)]
pub struct PlayUpdate<'a> {
    pub play_state: u8,
    /// `None` sends null cell states
    pub grid: Option<&'a GridState>,
    pub reason: PostScoreReason,
}

/// Drives sessions through a shared transport.
#[derive(Clone)]
pub struct SessionFlow {
    transport: Arc<dyn HttpTransport>,
    config: Arc<FlowConfig>,
}

impl SessionFlow {
    pub fn new(transport: Arc<dyn HttpTransport>, config: Arc<FlowConfig>) -> Self {
        Self { transport, config }
    }

    pub fn config(&self) -> &FlowConfig {
        &self.config
    }

    /// Run one full session. Never fails: errors end up in the report.
    pub async fn run(&self, uid: impl Into<String>, seed: Option<u64>) -> SessionReport {
        let mut rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        let mut ctx = SessionContext::new(uid);
        let mut report = SessionReport::started(&ctx.uid);

        if let Err((state, error)) = self.drive(&mut ctx, &mut report, &mut rng).await {
            warn!(uid = %ctx.uid, state = %state, error = %error, "Session failed");
            report.outcome = SessionOutcome::Failed { state, error };
        } else {
            debug!(uid = %ctx.uid, total = ?report.total_latency(), "Session completed");
        }
        report.puzzle_id = ctx.puzzle_id.clone();
        report
    }

    async fn drive(
        &self,
        ctx: &mut SessionContext,
        report: &mut SessionReport,
        rng: &mut StdRng,
    ) -> Result<(), (FlowState, FlowError)> {
        let at = |state: FlowState| move |error: FlowError| (state, error);

        report.picker = Some(self.picker(ctx).await.map_err(at(FlowState::Picker))?);
        report.picker_status = Some(
            self.picker_status(ctx)
                .await
                .map_err(at(FlowState::PickerStatus))?,
        );
        report.puzzle_load = Some(
            self.puzzle_load(ctx, rng)
                .await
                .map_err(at(FlowState::PuzzleLoad))?,
        );

        let len = ctx.state_len();
        let mut grid = GridState::seeded(len, self.config.fill_ratio, rng);
        for iteration in 1..=PLAY_ITERATIONS {
            let (play_state, cells) = match iteration {
                1 => (PLAY_STATE_STARTED, None),
                PLAY_ITERATIONS => (PLAY_STATE_COMPLETED, Some(GridState::complete(len, rng))),
                _ => {
                    grid.mutate(rng);
                    (PLAY_STATE_IN_PROGRESS, Some(grid.clone()))
                }
            };

            let update = PlayUpdate {
                play_state,
                grid: cells.as_ref(),
                reason: PostScoreReason::Blur,
            };
            let latency = self
                .play_update(ctx, update)
                .await
                .map_err(at(FlowState::Play(iteration)))?;

            debug!(uid = %ctx.uid, iteration, play_state, ?latency, "Play update posted");
            report.iterations.push(PlayIteration {
                iteration,
                play_state,
                latency,
            });
        }
        Ok(())
    }

    /// PICKER: load the picker page and decode the load token.
    pub async fn picker(&self, ctx: &mut SessionContext) -> FlowResult<Duration> {
        let request = ApiRequest::page(PICKER_PATH)
            .with_query("set", &self.config.set_param)
            .with_query("uid", &ctx.uid);
        let response = self.send(request).await?;

        let params = extract_params(&response.body)?;
        let token = LoadTokenData::from_params(&params)?;
        ctx.load_token = Some(token.load_token);
        ctx.picker_params = Some(params);
        Ok(response.latency)
    }

    /// PICKER_STATUS: acknowledge the picker; the API must answer status 0.
    pub async fn picker_status(&self, ctx: &SessionContext) -> FlowResult<Duration> {
        let body = json!({
            "loadToken": ctx.require_load_token()?,
            "isVerified": true,
            "adDuration": 0,
            "reason": "displaying puzzle picker",
        });
        let response = self
            .send(ApiRequest::post_json(PICKER_STATUS_PATH, body))
            .await?;
        ensure_app_status(PICKER_STATUS_PATH, &response)?;
        Ok(response.latency)
    }

    /// PUZZLE_LOAD: choose a puzzle, load its page and decode play metadata.
    pub async fn puzzle_load(
        &self,
        ctx: &mut SessionContext,
        rng: &mut StdRng,
    ) -> FlowResult<Duration> {
        let load_token = ctx.require_load_token()?.to_string();

        let (puzzle_id, width, height) = match &self.config.puzzle {
            PuzzleSelection::Fixed {
                puzzle_id,
                state_len,
            } => (puzzle_id.clone(), *state_len, 1),
            PuzzleSelection::RandomFromPicker => {
                let candidates = ctx
                    .picker_params
                    .as_ref()
                    .map(crossword_candidates)
                    .unwrap_or_default();
                let chosen: &PuzzleCandidate = candidates
                    .choose(rng)
                    .ok_or(FlowError::Parse(ParseError::MissingField("puzzleDetails")))?;
                (chosen.puzzle_id.clone(), chosen.grid_width, chosen.grid_height)
            }
        };

        let src = format!(
            "{}{}?set={}&uid={}",
            self.config.base_url, PICKER_PATH, self.config.set_param, ctx.uid
        );
        let request = ApiRequest::page(PUZZLE_PATH)
            .with_query("id", &puzzle_id)
            .with_query("set", &self.config.set_param)
            .with_query("picker", PICKER_NAME)
            .with_query("src", src)
            .with_query("uid", &ctx.uid)
            .with_query("loadToken", load_token);
        let response = self.send(request).await?;

        let params = extract_params(&response.body)?;
        ctx.metadata = PlayMetadata::from_params(&params)?;
        ctx.play_id = ctx.metadata.play_id.clone();
        ctx.puzzle_id = Some(puzzle_id);
        ctx.grid_width = width;
        ctx.grid_height = height;
        Ok(response.latency)
    }

    /// PLAY: post one play update; the API must answer status 0.
    pub async fn play_update(
        &self,
        ctx: &SessionContext,
        update: PlayUpdate<'_>,
    ) -> FlowResult<Duration> {
        let now_ms = (OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64;
        let body = play_payload(ctx, &self.config, update, now_ms)?;
        let response = self.send(ApiRequest::post_json(PLAYS_PATH, body)).await?;
        ensure_app_status(PLAYS_PATH, &response)?;
        Ok(response.latency)
    }

    async fn send(&self, request: ApiRequest) -> FlowResult<ApiResponse> {
        let path = request.path.clone();
        self.transport.send(request).await?.ensure_success(&path)
    }
}

/// Build the JSON body of a play update.
pub fn play_payload(
    ctx: &SessionContext,
    config: &FlowConfig,
    update: PlayUpdate<'_>,
    timestamp_ms: i64,
) -> FlowResult<Value> {
    let (primary, secondary) = match update.grid {
        Some(grid) => (Value::from(grid.primary()), Value::from(grid.secondary())),
        None => (Value::Null, Value::Null),
    };

    Ok(json!({
        "browser": BROWSER_USER_AGENT,
        "fromPicker": PICKER_NAME,
        "getProgressFromBackend": true,
        "id": ctx.require_puzzle_id()?,
        "inContestMode": false,
        "loadToken": ctx.require_load_token()?,
        "nClearClicks": 0,
        "nExceptions": 0,
        "nHelpClicks": 0,
        "nPrints": 0,
        "nPrintsEmpty": 0,
        "nPrintsFilled": 0,
        "nPrintsSol": 0,
        "nResizes": 0,
        "nSettingsClicks": 0,
        "playId": ctx.play_id,
        "playState": update.play_state,
        "postScoreReason": update.reason.as_str(),
        "primaryState": primary,
        "score": ctx.metadata.score,
        "secondaryState": secondary,
        "series": config.set_param,
        "streakLength": 0,
        "timeOnPage": ctx.metadata.time_on_page,
        "timeTaken": ctx.metadata.time_taken,
        "timestamp": timestamp_ms,
        "updateLoadTable": false,
        "updatePlayTable": true,
        "updatedTimestamp": timestamp_ms,
        "userId": ctx.uid,
    }))
}

/// Fail unless the JSON body carries `"status": 0`.
pub fn ensure_app_status(path: &str, response: &ApiResponse) -> FlowResult<()> {
    let body: Value = serde_json::from_str(&response.body)
        .map_err(|e| ParseError::json("status response", e))?;
    let status = body
        .get("status")
        .and_then(Value::as_i64)
        .ok_or(ParseError::MissingField("status"))?;
    if status != 0 {
        return Err(FlowError::AppStatus {
            path: path.to_string(),
            status,
        });
    }
    Ok(())
}
