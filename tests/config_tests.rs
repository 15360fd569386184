//! Configuration loading from environment variables and YAML files.

use std::fs;
use std::time::Duration;

use serial_test::serial;
use tempfile::TempDir;

use traffic_replay::config::{ReplayConfig, UidStrategy, env};
use traffic_replay::core::flow::PuzzleSelection;
use traffic_replay::core::logs::EndpointProfile;
use traffic_replay::errors::ConfigError;
use traffic_replay::utils::UidSource;

const ALL_VARS: &[&str] = &[
    env::BASE_URL,
    env::SET_PARAM,
    env::UID,
    env::UID_STRATEGY,
    env::UID_POOL_SIZE,
    env::HEADERS,
    env::REQUEST_TIMEOUT_MS,
    env::CONNECT_TIMEOUT_MS,
    env::REFERENCE_YEAR,
    env::PROFILE,
    env::PUZZLE_ID,
    env::STATE_LEN,
    env::FILL_RATIO,
    env::RPS,
    env::DURATION,
    env::SEED,
    env::SPEED,
    env::PREWARM_CONCURRENCY,
];

fn clear_env() {
    for var in ALL_VARS {
        // SAFETY: tests touching the environment are serialized
        unsafe { std::env::remove_var(var) };
    }
}

fn set_env(var: &str, value: &str) {
    // SAFETY: tests touching the environment are serialized
    unsafe { std::env::set_var(var, value) };
}

#[test]
#[serial]
fn test_from_env_defaults() {
    clear_env();
    let config = ReplayConfig::from_env().unwrap();
    assert_eq!(config, ReplayConfig::default());
}

#[test]
#[serial]
fn test_from_env_overrides() {
    clear_env();
    set_env(env::BASE_URL, "https://staging.example.com/");
    set_env(env::SET_PARAM, "frodo");
    set_env(env::UID_STRATEGY, "pool");
    set_env(env::UID_POOL_SIZE, "12");
    set_env(env::HEADERS, "X-Load-Test=1");
    set_env(env::REQUEST_TIMEOUT_MS, "1500");
    set_env(env::PROFILE, "pplmag");
    set_env(env::PUZZLE_ID, "1461ef6d");
    set_env(env::RPS, "25");
    set_env(env::SEED, "4");

    let config = ReplayConfig::from_env().unwrap();
    clear_env();

    assert_eq!(config.base_url, "https://staging.example.com/");
    assert_eq!(config.set_param, "frodo");
    assert_eq!(config.uid_strategy, UidStrategy::Pool(12));
    assert_eq!(config.headers["X-Load-Test"], "1");
    assert_eq!(config.request_timeout, Duration::from_millis(1500));
    assert_eq!(config.profile, EndpointProfile::Pplmag);
    assert_eq!(config.rps, 25);
    assert_eq!(
        config.puzzle_selection(),
        PuzzleSelection::Fixed {
            puzzle_id: "1461ef6d".into(),
            state_len: 185,
        }
    );
    match config.uid_source() {
        UidSource::Pool(pool) => assert_eq!(pool.len(), 12),
        other => panic!("expected pool, got {other:?}"),
    }
}

#[test]
#[serial]
fn test_from_env_rejects_bad_values() {
    clear_env();
    set_env(env::RPS, "many");
    let err = ReplayConfig::from_env().unwrap_err();
    assert_eq!(
        err,
        ConfigError::InvalidEnv {
            var: env::RPS,
            value: "many".into()
        }
    );
    assert_eq!(err.tag(), "config_env");

    set_env(env::RPS, "0");
    assert_eq!(ReplayConfig::from_env(), Err(ConfigError::ZeroRate));

    clear_env();
    set_env(env::BASE_URL, "ftp://example.com/");
    assert!(matches!(
        ReplayConfig::from_env(),
        Err(ConfigError::InvalidBaseUrl { .. })
    ));
    clear_env();
}

#[test]
#[serial]
fn test_yaml_overrides_env() {
    clear_env();
    set_env(env::SET_PARAM, "from-env");
    set_env(env::RPS, "7");

    let dir = TempDir::new().unwrap();
    let path = dir.path().join("replay.yaml");
    fs::write(
        &path,
        r#"
target:
  set_param: "from-yaml"
replay:
  speed: 3.0
"#,
    )
    .unwrap();

    let config = ReplayConfig::from_file(&path).unwrap();
    clear_env();

    assert_eq!(config.set_param, "from-yaml");
    // not in the file, so the environment value stands
    assert_eq!(config.rps, 7);
    assert_eq!(config.speed, 3.0);
}

#[test]
#[serial]
fn test_invalid_yaml_values_are_rejected() {
    clear_env();
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("replay.yaml");
    fs::write(&path, "puzzle:\n  fill_ratio: 2.0\n").unwrap();

    assert_eq!(
        ReplayConfig::from_file(&path),
        Err(ConfigError::InvalidFillRatio(2.0))
    );

    let missing = dir.path().join("missing.yaml");
    let err = ReplayConfig::from_file(&missing).unwrap_err();
    assert_eq!(err.tag(), "config_file");
}
