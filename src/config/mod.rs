//! Configuration for extraction, wave runs and replay
//!
//! Settings come from YAML files, environment variables and defaults.
//! Priority: YAML > ENV vars > .env values > defaults.
//!
//! # Modules
//! - `yaml`: YAML configuration file loading
//! - `env`: `REPLAY_*` environment variable loading
//! - `validation`: Configuration validation logic
//!
//! # Example
//! ```rust,no_run
//! use traffic_replay::config::ReplayConfig;
//! use std::path::Path;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Load from environment variables only
//! let config = ReplayConfig::from_env()?;
//!
//! // Load from YAML file with environment variable overrides
//! let config = ReplayConfig::from_file(Path::new("replay.yaml"))?;
//!
//! println!("Targeting {}", config.base_url);
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use rand::SeedableRng;
use rand::rngs::StdRng;

pub mod env;
mod validation;
mod yaml;

pub use validation::{validate_base_url, validate_puzzle, validate_rates};
pub use yaml::YamlConfig;

use crate::core::flow::{FlowConfig, PuzzleSelection, TransportOptions};
use crate::core::logs::EndpointProfile;
use crate::core::logs::timestamp::DEFAULT_REFERENCE_YEAR;
use crate::core::replay::{DEFAULT_PREWARM_CONCURRENCY, ReplayOptions};
use crate::errors::{ConfigError, ConfigResult};
use crate::utils::{UidSource, generate_pool};

pub const DEFAULT_BASE_URL: &str = "http://localhost:8080/";
pub const DEFAULT_SET_PARAM: &str = "gandalf";
pub const DEFAULT_UID: &str = "vansh";
/// Cell count of the default fixed puzzle
pub const DEFAULT_STATE_LEN: usize = 185;
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_POOL_SIZE: usize = 100;

/// How sessions get their uid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UidStrategy {
    /// Always the configured uid
    Fixed,
    /// Fresh random uid per session
    #[default]
    Random,
    /// Random choice from a pool of N generated uids
    Pool(usize),
}

impl UidStrategy {
    /// Parse `fixed`, `random` or `pool`; `pool_size` applies to `pool` only.
    pub fn parse(name: &str, pool_size: Option<usize>) -> ConfigResult<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "fixed" => Ok(Self::Fixed),
            "random" => Ok(Self::Random),
            "pool" => Ok(Self::Pool(pool_size.unwrap_or(DEFAULT_POOL_SIZE))),
            _ => Err(ConfigError::UnknownUidStrategy(name.to_string())),
        }
    }
}

/// Everything a run needs, resolved from all sources.
#[derive(Debug, Clone, PartialEq)]
pub struct ReplayConfig {
    // Target
    pub base_url: String,
    pub set_param: String,
    pub headers: HashMap<String, String>,
    pub request_timeout: Duration,
    pub connect_timeout: Duration,

    // Users
    pub uid: String,
    pub uid_strategy: UidStrategy,

    // Log mining
    /// Year assumed for log timestamps, which carry none
    pub reference_year: i32,
    pub profile: EndpointProfile,

    // Puzzle selection
    /// Fixed puzzle id; `None` picks randomly from the picker page
    pub puzzle_id: Option<String>,
    pub state_len: usize,
    pub fill_ratio: f64,

    // Wave runs
    pub rps: usize,
    pub duration: usize,
    pub seed: Option<u64>,

    // Replay
    pub speed: f64,
    pub prewarm_concurrency: usize,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            set_param: DEFAULT_SET_PARAM.to_string(),
            headers: HashMap::new(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            uid: DEFAULT_UID.to_string(),
            uid_strategy: UidStrategy::default(),
            reference_year: DEFAULT_REFERENCE_YEAR,
            profile: EndpointProfile::default(),
            puzzle_id: None,
            state_len: DEFAULT_STATE_LEN,
            fill_ratio: crate::core::flow::session::DEFAULT_FILL_RATIO,
            rps: 1,
            duration: 1,
            seed: None,
            speed: 1.0,
            prewarm_concurrency: DEFAULT_PREWARM_CONCURRENCY,
        }
    }
}

impl ReplayConfig {
    /// Load configuration from environment variables over defaults.
    ///
    /// The binary loads `.env` before calling this.
    pub fn from_env() -> ConfigResult<Self> {
        let config = env::load_env_config()?;
        config.validate()?;
        Ok(config)
    }

    /// Load a YAML file on top of the environment configuration.
    ///
    /// Priority order (highest to lowest):
    /// 1. YAML file values
    /// 2. Environment variables (actual ENV vars override .env values)
    /// 3. .env file values
    /// 4. Default values
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed, an environment
    /// variable is malformed, or the merged configuration is invalid.
    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let yaml = YamlConfig::from_file(path)?;
        let mut config = env::load_env_config()?;
        config.apply_yaml(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Overlay every value the YAML file sets.
    pub fn apply_yaml(&mut self, yaml: YamlConfig) -> ConfigResult<()> {
        if let Some(target) = yaml.target {
            if let Some(url) = target.base_url {
                self.base_url = url;
            }
            if let Some(set) = target.set_param {
                self.set_param = set;
            }
            if let Some(ms) = target.request_timeout_ms {
                self.request_timeout = Duration::from_millis(ms);
            }
            if let Some(ms) = target.connect_timeout_ms {
                self.connect_timeout = Duration::from_millis(ms);
            }
            if let Some(headers) = target.headers {
                self.headers.extend(headers);
            }
        }

        if let Some(users) = yaml.users {
            if let Some(uid) = users.uid {
                self.uid = uid;
            }
            match (users.strategy, users.pool_size) {
                (Some(strategy), size) => {
                    self.uid_strategy = UidStrategy::parse(&strategy, size)?;
                }
                (None, Some(size)) => {
                    if let UidStrategy::Pool(current) = &mut self.uid_strategy {
                        *current = size;
                    }
                }
                (None, None) => {}
            }
        }

        if let Some(puzzle) = yaml.puzzle {
            if let Some(id) = puzzle.id {
                self.puzzle_id = Some(id);
            }
            if let Some(len) = puzzle.state_len {
                self.state_len = len;
            }
            if let Some(ratio) = puzzle.fill_ratio {
                self.fill_ratio = ratio;
            }
        }

        if let Some(logs) = yaml.logs {
            if let Some(year) = logs.reference_year {
                self.reference_year = year;
            }
            if let Some(profile) = logs.profile {
                self.profile = profile.parse().map_err(|_| ConfigError::Yaml(format!(
                    "unknown profile {profile:?}"
                )))?;
            }
        }

        if let Some(waves) = yaml.waves {
            self.rps = waves.rps.unwrap_or(self.rps);
            self.duration = waves.duration.unwrap_or(self.duration);
            self.seed = waves.seed.or(self.seed);
        }

        if let Some(replay) = yaml.replay {
            self.speed = replay.speed.unwrap_or(self.speed);
            self.prewarm_concurrency = replay
                .prewarm_concurrency
                .unwrap_or(self.prewarm_concurrency);
        }

        Ok(())
    }

    pub fn validate(&self) -> ConfigResult<()> {
        validate_base_url(&self.base_url)?;
        validate_rates(self)?;
        validate_puzzle(self)
    }

    pub fn puzzle_selection(&self) -> PuzzleSelection {
        match &self.puzzle_id {
            Some(puzzle_id) => PuzzleSelection::Fixed {
                puzzle_id: puzzle_id.clone(),
                state_len: self.state_len,
            },
            None => PuzzleSelection::RandomFromPicker,
        }
    }

    pub fn to_transport_options(&self) -> TransportOptions {
        TransportOptions {
            base_url: self.base_url.clone(),
            request_timeout: self.request_timeout,
            connect_timeout: self.connect_timeout,
            headers: self.headers.clone(),
            ..TransportOptions::default()
        }
    }

    pub fn to_flow_config(&self) -> FlowConfig {
        FlowConfig {
            set_param: self.set_param.clone(),
            base_url: self.base_url.clone(),
            puzzle: self.puzzle_selection(),
            fill_ratio: self.fill_ratio,
        }
    }

    pub fn to_replay_options(&self, dry_run: bool) -> ReplayOptions {
        ReplayOptions {
            speed: self.speed,
            dry_run,
            prewarm_concurrency: self.prewarm_concurrency,
        }
    }

    /// Resolve the uid strategy. Pools are generated here, from the seed
    /// when one is configured.
    pub fn uid_source(&self) -> UidSource {
        match self.uid_strategy {
            UidStrategy::Fixed => UidSource::Fixed(self.uid.clone()),
            UidStrategy::Random => UidSource::Random,
            UidStrategy::Pool(size) => {
                let mut rng = match self.seed {
                    Some(seed) => StdRng::seed_from_u64(seed),
                    None => StdRng::from_os_rng(),
                };
                UidSource::Pool(generate_pool(&mut rng, size))
            }
        }
    }
}
