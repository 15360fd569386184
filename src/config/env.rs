//! `REPLAY_*` environment variables.
//!
//! `.env` files are loaded by the binary before this runs, so values from
//! there show up here as ordinary variables.

use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

use super::{ReplayConfig, UidStrategy};
use crate::errors::{ConfigError, ConfigResult};

pub const BASE_URL: &str = "REPLAY_BASE_URL";
pub const SET_PARAM: &str = "REPLAY_SET_PARAM";
pub const UID: &str = "REPLAY_UID";
pub const UID_STRATEGY: &str = "REPLAY_UID_STRATEGY";
pub const UID_POOL_SIZE: &str = "REPLAY_UID_POOL_SIZE";
/// Comma separated `Name=value` pairs
pub const HEADERS: &str = "REPLAY_HEADERS";
pub const REQUEST_TIMEOUT_MS: &str = "REPLAY_REQUEST_TIMEOUT_MS";
pub const CONNECT_TIMEOUT_MS: &str = "REPLAY_CONNECT_TIMEOUT_MS";
pub const REFERENCE_YEAR: &str = "REPLAY_REFERENCE_YEAR";
pub const PROFILE: &str = "REPLAY_PROFILE";
pub const PUZZLE_ID: &str = "REPLAY_PUZZLE_ID";
pub const STATE_LEN: &str = "REPLAY_STATE_LEN";
pub const FILL_RATIO: &str = "REPLAY_FILL_RATIO";
pub const RPS: &str = "REPLAY_RPS";
pub const DURATION: &str = "REPLAY_DURATION";
pub const SEED: &str = "REPLAY_SEED";
pub const SPEED: &str = "REPLAY_SPEED";
pub const PREWARM_CONCURRENCY: &str = "REPLAY_PREWARM_CONCURRENCY";

fn var(name: &'static str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parsed<T: FromStr>(name: &'static str) -> ConfigResult<Option<T>> {
    match var(name) {
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidEnv {
                var: name,
                value: raw,
            }),
        None => Ok(None),
    }
}

/// Parse `Name=value,Other=value`.
pub(crate) fn parse_headers(raw: &str) -> ConfigResult<HashMap<String, String>> {
    raw.split(',')
        .filter(|pair| !pair.trim().is_empty())
        .map(|pair| {
            let (name, value) = pair.split_once('=').ok_or_else(|| ConfigError::InvalidEnv {
                var: HEADERS,
                value: raw.to_string(),
            })?;
            Ok((name.trim().to_string(), value.trim().to_string()))
        })
        .collect()
}

/// Defaults overridden by whatever `REPLAY_*` variables are set.
pub(crate) fn load_env_config() -> ConfigResult<ReplayConfig> {
    let mut config = ReplayConfig::default();

    if let Some(url) = var(BASE_URL) {
        config.base_url = url;
    }
    if let Some(set) = var(SET_PARAM) {
        config.set_param = set;
    }
    if let Some(uid) = var(UID) {
        config.uid = uid;
    }
    if let Some(headers) = var(HEADERS) {
        config.headers = parse_headers(&headers)?;
    }
    if let Some(ms) = parsed::<u64>(REQUEST_TIMEOUT_MS)? {
        config.request_timeout = Duration::from_millis(ms);
    }
    if let Some(ms) = parsed::<u64>(CONNECT_TIMEOUT_MS)? {
        config.connect_timeout = Duration::from_millis(ms);
    }
    if let Some(year) = parsed(REFERENCE_YEAR)? {
        config.reference_year = year;
    }
    if let Some(profile) = parsed(PROFILE)? {
        config.profile = profile;
    }
    if let Some(id) = var(PUZZLE_ID) {
        config.puzzle_id = Some(id);
    }
    if let Some(len) = parsed(STATE_LEN)? {
        config.state_len = len;
    }
    if let Some(ratio) = parsed(FILL_RATIO)? {
        config.fill_ratio = ratio;
    }
    if let Some(rps) = parsed(RPS)? {
        config.rps = rps;
    }
    if let Some(duration) = parsed(DURATION)? {
        config.duration = duration;
    }
    if let Some(seed) = parsed(SEED)? {
        config.seed = Some(seed);
    }
    if let Some(speed) = parsed(SPEED)? {
        config.speed = speed;
    }
    if let Some(n) = parsed(PREWARM_CONCURRENCY)? {
        config.prewarm_concurrency = n;
    }

    let pool_size = parsed::<usize>(UID_POOL_SIZE)?;
    if let Some(strategy) = var(UID_STRATEGY) {
        config.uid_strategy = UidStrategy::parse(&strategy, pool_size)?;
    } else if let (UidStrategy::Pool(size), Some(n)) = (&mut config.uid_strategy, pool_size) {
        *size = n;
    }

    Ok(config)
}
