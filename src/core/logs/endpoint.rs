//! Endpoint allow-listing and normalization.
//!
//! Game pages are served under many visually distinct paths (`/sudoku`,
//! `/wordsearch`, ...) but drive the same backend work, so they all collapse
//! to [`CANONICAL_GAME_PATH`]. Anything outside the allow-list is dropped.

use serde::{Deserialize, Serialize};

pub const DATE_PICKER: &str = "/date-picker";
pub const POST_PICKER_STATUS: &str = "/postPickerStatus";
pub const PLAYS: &str = "/api/v1/plays";
pub const PUZZLES: &str = "/api/v1/puzzles";

/// Path every game page is rewritten to.
pub const CANONICAL_GAME_PATH: &str = "/crossword";

/// Every game-page path recognised in production logs.
pub const GAME_PAGE_PATHS: &[&str] = &[
    "/crossword",
    "/sudoku",
    "/wordf",
    "/wordrow",
    "/wordsearch",
    "/quiz",
    "/codeword",
    "/jigsaw",
];

/// Allow-list variant, one per log source family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EndpointProfile {
    /// Picker-driven site logs: picker, picker status, plays and game pages.
    #[default]
    Traffic,
    /// Embedded-player logs: adds the puzzles API and the jigsaw page.
    Pplmag,
}

impl EndpointProfile {
    /// Non-game endpoints allowed for this profile.
    pub fn api_paths(&self) -> &'static [&'static str] {
        match self {
            Self::Traffic => &[DATE_PICKER, POST_PICKER_STATUS, PLAYS],
            Self::Pplmag => &[POST_PICKER_STATUS, PLAYS, PUZZLES],
        }
    }

    /// Game-page paths allowed for this profile.
    pub fn game_paths(&self) -> &'static [&'static str] {
        match self {
            // the picker site never served the jigsaw page
            Self::Traffic => &GAME_PAGE_PATHS[..7],
            Self::Pplmag => GAME_PAGE_PATHS,
        }
    }

    /// Map a raw path to its canonical form, or `None` when not allowed.
    pub fn normalize(&self, path: &str) -> Option<&'static str> {
        if let Some(api) = self.api_paths().iter().find(|p| **p == path) {
            return Some(api);
        }
        if self.game_paths().contains(&path) {
            return Some(CANONICAL_GAME_PATH);
        }
        None
    }

    /// Whether a retained event on this canonical endpoint must carry a user id.
    pub fn requires_identity(&self, canonical: &str) -> bool {
        match self {
            Self::Traffic => true,
            Self::Pplmag => canonical == PLAYS || canonical == POST_PICKER_STATUS,
        }
    }

    /// Whether this profile's records carry the HTTP method.
    pub fn records_method(&self) -> bool {
        matches!(self, Self::Pplmag)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Traffic => "traffic",
            Self::Pplmag => "pplmag",
        }
    }
}

impl std::fmt::Display for EndpointProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for EndpointProfile {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "traffic" | "pmm" => Ok(Self::Traffic),
            "pplmag" => Ok(Self::Pplmag),
            other => Err(format!("unknown endpoint profile '{other}'")),
        }
    }
}

/// Whether a path belongs to the game-page family.
pub fn is_game_page(path: &str) -> bool {
    GAME_PAGE_PATHS.contains(&path)
}
