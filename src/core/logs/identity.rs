//! User identity recovery from raw log lines.
//!
//! Identity sources are tried in a fixed order and the first hit wins:
//!
//! 1. a labeled JSON payload embedded in the message (`payloadJson: {...}`),
//!    falling back to a quoted `"userId": "..."` anywhere on the line
//! 2. a bare `userId: value` / `uid: value` field
//! 3. the `uid` claim inside an encoded `loadToken`

use std::sync::LazyLock;

use base64::Engine;
use base64::engine::general_purpose::{STANDARD, URL_SAFE};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Labels that introduce an embedded JSON payload in a log message.
pub const PAYLOAD_LABELS: &[&str] = &["payloadJson:", "postScoreJson:", "pickerStatusJson:"];

static QUOTED_USER_ID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""userId":\s*"([^"]+)""#).expect("quoted userId pattern is valid")
});

static BARE_USER_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\buserId:\s*(\S+)").expect("bare userId pattern is valid"));

static BARE_UID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\buid:\s*(\S+)").expect("bare uid pattern is valid"));

static LOAD_TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""loadToken":\s*"([^"]+)""#).expect("loadToken pattern is valid")
});

static TOKEN_UID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""uid":\s*"([^"]+)""#).expect("token uid pattern is valid"));

/// Where a resolved identity came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentitySource {
    Payload,
    BareField,
    Token,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedIdentity {
    pub user_id: String,
    pub source: IdentitySource,
}

impl ResolvedIdentity {
    fn new(user_id: impl Into<String>, source: IdentitySource) -> Self {
        Self {
            user_id: user_id.into(),
            source,
        }
    }
}

/// Stateless resolver for the identity fallback chain.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityResolver;

impl IdentityResolver {
    pub fn new() -> Self {
        Self
    }

    /// Run the full fallback chain over a raw line.
    pub fn resolve(&self, line: &str) -> Option<ResolvedIdentity> {
        self.resolve_payload(line)
            .or_else(|| self.resolve_bare_field(line))
            .or_else(|| self.resolve_token(line))
    }

    /// Identity from the encoded load token only.
    pub fn resolve_token_only(&self, line: &str) -> Option<ResolvedIdentity> {
        self.resolve_token(line)
    }

    fn resolve_payload(&self, line: &str) -> Option<ResolvedIdentity> {
        for label in PAYLOAD_LABELS {
            let Some(payload) = extract_labeled_payload(line, label) else {
                continue;
            };
            if let Some(user_id) = payload.get("userId").and_then(Value::as_str) {
                return Some(ResolvedIdentity::new(user_id, IdentitySource::Payload));
            }
        }

        // payload too mangled to parse; the quoted field may still be intact
        QUOTED_USER_ID
            .captures(line)
            .map(|caps| ResolvedIdentity::new(&caps[1], IdentitySource::Payload))
    }

    fn resolve_bare_field(&self, line: &str) -> Option<ResolvedIdentity> {
        [&*BARE_USER_ID, &*BARE_UID].into_iter().find_map(|pattern| {
            let caps = pattern.captures(line)?;
            let value = caps[1].trim_end_matches(',');
            (!value.is_empty()).then(|| ResolvedIdentity::new(value, IdentitySource::BareField))
        })
    }

    fn resolve_token(&self, line: &str) -> Option<ResolvedIdentity> {
        let caps = LOAD_TOKEN.captures(line)?;
        decode_token_uid(&caps[1]).map(|uid| ResolvedIdentity::new(uid, IdentitySource::Token))
    }
}

/// Locate the JSON object following `label` and parse it.
///
/// The object is delimited by a string-aware brace scan. Truncated objects get
/// their missing closers appended and are parsed once more.
pub fn extract_labeled_payload(line: &str, label: &str) -> Option<Value> {
    let start = line.find(label)? + label.len();
    let rest = line[start..].trim_start();
    if !rest.starts_with('{') {
        return None;
    }

    match scan_balanced_object(rest) {
        BraceScan::Complete(object) => serde_json::from_str(object).ok(),
        BraceScan::Truncated {
            depth,
            in_string,
        } => {
            let mut repaired = String::with_capacity(rest.len() + depth + 1);
            repaired.push_str(rest.trim_end());
            if in_string {
                repaired.push('"');
            }
            repaired.extend(std::iter::repeat_n('}', depth));
            serde_json::from_str(&repaired).ok()
        }
    }
}

enum BraceScan<'a> {
    Complete(&'a str),
    Truncated { depth: usize, in_string: bool },
}

fn scan_balanced_object(text: &str) -> BraceScan<'_> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (idx, ch) in text.char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return BraceScan::Complete(&text[..=idx]);
                }
            }
            _ => {}
        }
    }

    BraceScan::Truncated { depth, in_string }
}

/// Decode the `uid` claim from a load token.
///
/// Tokens are normally `header.payload.signature` with base64url segments.
/// Older tokens are a single base64 blob of concatenated JSON objects, in
/// which case the `"uid":"..."` field is searched for in the decoded text.
pub fn decode_token_uid(token: &str) -> Option<String> {
    let parts: Vec<&str> = token.split('.').collect();
    if parts.len() >= 2 {
        if let Some(uid) = decode_segment(parts[1])
            .and_then(|bytes| serde_json::from_slice::<Value>(&bytes).ok())
            .and_then(|claims| claims.get("uid").and_then(Value::as_str).map(str::to_string))
        {
            return Some(uid);
        }
    }

    let bytes = decode_segment(token)?;
    let decoded = String::from_utf8_lossy(&bytes);
    TOKEN_UID.captures(&decoded).map(|caps| caps[1].to_string())
}

fn decode_segment(segment: &str) -> Option<Vec<u8>> {
    let padded = restore_padding(segment.trim_end_matches('='));
    URL_SAFE
        .decode(padded.as_bytes())
        .or_else(|_| STANDARD.decode(padded.as_bytes()))
        .ok()
}

/// Append `=` until the length is a multiple of four.
pub fn restore_padding(segment: &str) -> String {
    let mut padded = segment.to_string();
    let missing = (4 - segment.len() % 4) % 4;
    padded.extend(std::iter::repeat_n('=', missing));
    padded
}
