use url::Url;

use super::ReplayConfig;
use crate::errors::{ConfigError, ConfigResult};

/// Base URL must be non-empty, absolute and http(s).
pub fn validate_base_url(base_url: &str) -> ConfigResult<()> {
    if base_url.trim().is_empty() {
        return Err(ConfigError::EmptyBaseUrl);
    }
    let invalid = |message: String| ConfigError::InvalidBaseUrl {
        url: base_url.to_string(),
        message,
    };
    let url = Url::parse(base_url).map_err(|e| invalid(e.to_string()))?;
    match url.scheme() {
        "http" | "https" => Ok(()),
        other => Err(invalid(format!("unsupported scheme {other}"))),
    }
}

pub fn validate_rates(config: &ReplayConfig) -> ConfigResult<()> {
    if config.rps == 0 {
        return Err(ConfigError::ZeroRate);
    }
    if config.speed.is_nan() || config.speed <= 0.0 {
        return Err(ConfigError::InvalidSpeed(config.speed));
    }
    Ok(())
}

pub fn validate_puzzle(config: &ReplayConfig) -> ConfigResult<()> {
    if !(0.0..=1.0).contains(&config.fill_ratio) {
        return Err(ConfigError::InvalidFillRatio(config.fill_ratio));
    }
    if let Some(id) = &config.puzzle_id
        && config.state_len == 0
    {
        return Err(ConfigError::EmptyPuzzleState(id.clone()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_base_url() {
        assert!(validate_base_url("http://localhost:8080/").is_ok());
        assert!(validate_base_url("https://example.com").is_ok());
        assert_eq!(validate_base_url("  "), Err(ConfigError::EmptyBaseUrl));
        assert!(matches!(
            validate_base_url("ftp://example.com/"),
            Err(ConfigError::InvalidBaseUrl { .. })
        ));
        assert!(matches!(
            validate_base_url("not a url"),
            Err(ConfigError::InvalidBaseUrl { .. })
        ));
    }

    #[test]
    fn test_validate_rates() {
        let mut config = ReplayConfig::default();
        assert!(validate_rates(&config).is_ok());

        config.rps = 0;
        assert_eq!(validate_rates(&config), Err(ConfigError::ZeroRate));

        config.rps = 1;
        config.speed = 0.0;
        assert_eq!(validate_rates(&config), Err(ConfigError::InvalidSpeed(0.0)));
        config.speed = f64::NAN;
        assert!(validate_rates(&config).is_err());
    }

    #[test]
    fn test_validate_puzzle() {
        let mut config = ReplayConfig::default();
        config.fill_ratio = 1.5;
        assert_eq!(
            validate_puzzle(&config),
            Err(ConfigError::InvalidFillRatio(1.5))
        );

        config.fill_ratio = 0.0;
        config.puzzle_id = Some("1461ef6d".into());
        config.state_len = 0;
        assert_eq!(
            validate_puzzle(&config),
            Err(ConfigError::EmptyPuzzleState("1461ef6d".into()))
        );

        config.state_len = 185;
        assert!(validate_puzzle(&config).is_ok());
    }
}
