use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

use crate::errors::{ConfigError, ConfigResult};

/// Complete YAML configuration structure
///
/// All fields are optional so a file can override just a few values. Anything
/// left out falls back to the environment and then to defaults.
///
/// # Example YAML structure
/// ```yaml
/// target:
///   base_url: "https://staging.example.com/"
///   set_param: "gandalf"
///   request_timeout_ms: 10000
///   connect_timeout_ms: 5000
///   headers:
///     X-Load-Test: "1"
///
/// users:
///   strategy: "pool"     # fixed | random | pool
///   uid: "vansh"
///   pool_size: 500
///
/// puzzle:
///   id: "1461ef6d"       # omit to pick randomly from the picker page
///   state_len: 185
///   fill_ratio: 0.1
///
/// logs:
///   reference_year: 2025
///   profile: "traffic"   # traffic | pplmag
///
/// waves:
///   rps: 50
///   duration: 60
///   seed: 42
///
/// replay:
///   speed: 2.0
///   prewarm_concurrency: 50
/// ```
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct YamlConfig {
    pub target: Option<TargetYaml>,
    pub users: Option<UsersYaml>,
    pub puzzle: Option<PuzzleYaml>,
    pub logs: Option<LogsYaml>,
    pub waves: Option<WavesYaml>,
    pub replay: Option<ReplayYaml>,
}

/// Target service settings from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct TargetYaml {
    pub base_url: Option<String>,
    pub set_param: Option<String>,
    pub request_timeout_ms: Option<u64>,
    pub connect_timeout_ms: Option<u64>,
    /// Extra headers sent with every request
    pub headers: Option<HashMap<String, String>>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct UsersYaml {
    pub strategy: Option<String>,
    pub uid: Option<String>,
    pub pool_size: Option<usize>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct PuzzleYaml {
    pub id: Option<String>,
    pub state_len: Option<usize>,
    pub fill_ratio: Option<f64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct LogsYaml {
    pub reference_year: Option<i32>,
    pub profile: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct WavesYaml {
    pub rps: Option<usize>,
    pub duration: Option<usize>,
    pub seed: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ReplayYaml {
    pub speed: Option<f64>,
    pub prewarm_concurrency: Option<usize>,
}

impl YamlConfig {
    /// Load a YAML configuration file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or the YAML is malformed.
    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;

        Self::parse(&contents)
    }

    pub fn parse(contents: &str) -> ConfigResult<Self> {
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(contents).map_err(|e| ConfigError::Yaml(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_yaml_config_full() {
        let yaml = r#"
target:
  base_url: "https://staging.example.com/"
  set_param: "gandalf"
  request_timeout_ms: 10000
  headers:
    X-Load-Test: "1"
users:
  strategy: "pool"
  pool_size: 500
puzzle:
  id: "1461ef6d"
  state_len: 185
logs:
  reference_year: 2024
  profile: "pplmag"
waves:
  rps: 50
  duration: 60
replay:
  speed: 2.5
"#;
        let config = YamlConfig::parse(yaml).unwrap();

        let target = config.target.unwrap();
        assert_eq!(target.base_url.as_deref(), Some("https://staging.example.com/"));
        assert_eq!(target.request_timeout_ms, Some(10000));
        assert!(target.connect_timeout_ms.is_none());
        assert_eq!(target.headers.unwrap()["X-Load-Test"], "1");

        let users = config.users.unwrap();
        assert_eq!(users.strategy.as_deref(), Some("pool"));
        assert_eq!(users.pool_size, Some(500));

        let puzzle = config.puzzle.unwrap();
        assert_eq!(puzzle.id.as_deref(), Some("1461ef6d"));
        assert_eq!(puzzle.state_len, Some(185));

        assert_eq!(config.logs.unwrap().reference_year, Some(2024));
        assert_eq!(config.waves.unwrap().rps, Some(50));
        assert_eq!(config.replay.unwrap().speed, Some(2.5));
    }

    #[test]
    fn test_yaml_config_partial() {
        let config = YamlConfig::parse("waves:\n  rps: 3\n").unwrap();
        assert!(config.target.is_none());
        let waves = config.waves.unwrap();
        assert_eq!(waves.rps, Some(3));
        assert!(waves.duration.is_none());
    }

    #[test]
    fn test_yaml_config_empty() {
        let config = YamlConfig::parse("").unwrap();
        assert!(config.target.is_none());
        assert!(config.replay.is_none());
    }

    #[test]
    fn test_from_file() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.yaml");
        fs::write(&config_path, "target:\n  set_param: \"frodo\"\n").unwrap();

        let config = YamlConfig::from_file(&config_path).unwrap();
        assert_eq!(
            config.target.unwrap().set_param,
            Some("frodo".to_string())
        );
    }

    #[test]
    fn test_from_file_not_found() {
        let result = YamlConfig::from_file(Path::new("/nonexistent/config.yaml"));
        assert!(matches!(result, Err(ConfigError::Read { .. })));
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("Failed to read config file")
        );
    }

    #[test]
    fn test_from_file_invalid_yaml() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("invalid.yaml");
        fs::write(&config_path, "invalid: yaml: content:").unwrap();

        let result = YamlConfig::from_file(&config_path);
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("Failed to parse YAML")
        );
    }
}
