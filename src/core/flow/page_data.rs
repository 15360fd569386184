//! Typed decoding of the data pages embed for the client.
//!
//! Picker and puzzle pages carry a `<script id="params" type="application/json">`
//! block. Inside it, `rawsps` (picker) and `rawp` (puzzle) are base64 strings
//! wrapping further JSON. Only the handful of fields the session flow needs
//! are decoded; everything else is ignored.

use std::sync::LazyLock;

use base64::Engine;
use base64::engine::general_purpose::{STANDARD, URL_SAFE};
use regex::Regex;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::core::logs::identity::restore_padding;
use crate::errors::{ParseError, ParseResult};

pub const DEFAULT_GRID_DIMENSION: usize = 5;
pub const DEFAULT_SCORE: i64 = 0;
pub const DEFAULT_TIME_ON_PAGE: i64 = 5000;
pub const DEFAULT_TIME_TAKEN: i64 = 5;

/// Puzzle type the flow knows how to play
pub const CROSSWORD_TYPE: &str = "CROSSWORD";

static PARAMS_TYPE_FIRST: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)<script[^>]*type="application/json"[^>]*id="params"[^>]*>(.*?)</script>"#)
        .expect("params pattern is valid")
});

static PARAMS_ID_FIRST: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)<script[^>]*id="params"[^>]*type="application/json"[^>]*>(.*?)</script>"#)
        .expect("params pattern is valid")
});

/// Locate and parse the embedded params block, in either attribute order.
pub fn extract_params(html: &str) -> ParseResult<Value> {
    let body = [&*PARAMS_TYPE_FIRST, &*PARAMS_ID_FIRST]
        .into_iter()
        .find_map(|pattern| pattern.captures(html))
        .map(|caps| caps[1].trim().to_string())
        .ok_or(ParseError::MissingPageData)?;

    serde_json::from_str(&body).map_err(|e| ParseError::json("params block", e))
}

/// Base64-decode `encoded` and parse the result as JSON.
pub fn decode_b64_json<T: DeserializeOwned>(field: &'static str, encoded: &str) -> ParseResult<T> {
    let padded = restore_padding(encoded.trim().trim_end_matches('='));
    let bytes = STANDARD
        .decode(padded.as_bytes())
        .or_else(|_| URL_SAFE.decode(padded.as_bytes()))
        .map_err(|e| ParseError::InvalidBase64 {
            field,
            error: e.to_string(),
        })?;
    serde_json::from_slice(&bytes).map_err(|e| ParseError::json(field, e))
}

fn string_field<'a>(params: &'a Value, field: &'static str) -> ParseResult<&'a str> {
    params
        .get(field)
        .and_then(Value::as_str)
        .ok_or(ParseError::MissingField(field))
}

/// The part of `rawsps` the flow needs.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoadTokenData {
    #[serde(rename = "loadToken")]
    pub load_token: String,
}

impl LoadTokenData {
    /// Decode the load token from picker params.
    pub fn from_params(params: &Value) -> ParseResult<Self> {
        let rawsps = string_field(params, "rawsps")?;
        let decoded: Value = decode_b64_json("rawsps", rawsps)?;
        let load_token = decoded
            .get("loadToken")
            .and_then(Value::as_str)
            .ok_or(ParseError::MissingField("loadToken"))?;
        Ok(Self {
            load_token: load_token.to_string(),
        })
    }
}

/// Play metadata decoded from `rawp`, with documented defaults for absent
/// fields: score 0, time on page 5000 ms, time taken 5 s.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PlayMetadata {
    #[serde(rename = "playId", default)]
    pub play_id: String,
    #[serde(default = "default_score")]
    pub score: i64,
    #[serde(rename = "timeOnPage", default = "default_time_on_page")]
    pub time_on_page: i64,
    #[serde(rename = "timeTaken", default = "default_time_taken")]
    pub time_taken: i64,
}

fn default_score() -> i64 {
    DEFAULT_SCORE
}

fn default_time_on_page() -> i64 {
    DEFAULT_TIME_ON_PAGE
}

fn default_time_taken() -> i64 {
    DEFAULT_TIME_TAKEN
}

impl Default for PlayMetadata {
    fn default() -> Self {
        Self {
            play_id: String::new(),
            score: DEFAULT_SCORE,
            time_on_page: DEFAULT_TIME_ON_PAGE,
            time_taken: DEFAULT_TIME_TAKEN,
        }
    }
}

impl PlayMetadata {
    /// Decode play metadata from puzzle params. A page without `rawp` yields
    /// the defaults and an empty play id.
    pub fn from_params(params: &Value) -> ParseResult<Self> {
        match params.get("rawp").and_then(Value::as_str) {
            Some(rawp) if !rawp.is_empty() => decode_b64_json("rawp", rawp),
            _ => Ok(Self::default()),
        }
    }
}

/// A playable puzzle listed on the picker page.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PuzzleCandidate {
    #[serde(rename = "puzzleId")]
    pub puzzle_id: String,
    #[serde(rename = "puzzleType", default)]
    pub puzzle_type: String,
    #[serde(rename = "gridWidth", default = "default_dimension")]
    pub grid_width: usize,
    #[serde(rename = "gridHeight", default = "default_dimension")]
    pub grid_height: usize,
}

fn default_dimension() -> usize {
    DEFAULT_GRID_DIMENSION
}

impl PuzzleCandidate {
    pub fn cell_count(&self) -> usize {
        self.grid_width * self.grid_height
    }
}

/// Crossword candidates from `streakInfo[].puzzleDetails` of picker params.
/// Malformed entries are skipped.
pub fn crossword_candidates(params: &Value) -> Vec<PuzzleCandidate> {
    params
        .get("streakInfo")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item.get("puzzleDetails"))
                .filter_map(|details| PuzzleCandidate::deserialize(details).ok())
                .filter(|candidate| candidate.puzzle_type == CROSSWORD_TYPE)
                .collect()
        })
        .unwrap_or_default()
}
