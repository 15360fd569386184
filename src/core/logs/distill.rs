//! Unfiltered distillation: every structured log line becomes a [`LogRecord`].

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::identity::extract_labeled_payload;
use super::timestamp::parse_log_timestamp;

static GENERIC_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d{1,2}\s+\w{3}\s+\d{2}:\d{2}:\d{2}\.\d{3})\s+(\w+)\s+(\w+)\s+\[([^\]]*)\]\s+-\s+(.*)$")
        .expect("generic line pattern is valid")
});

static KEY_VALUE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\w+):\s*(\S+)").expect("key/value pattern is valid"));

/// Message keys copied into [`LogRecord::fields`].
pub const FIELDS_OF_INTEREST: &[&str] = &[
    "userId",
    "uid",
    "series",
    "id",
    "playId",
    "sessionId",
    "DBtimeTaken",
    "elapsedTimeMs",
    "status",
    "dbName",
    "IP",
];

pub const MESSAGE_PREVIEW_CHARS: usize = 200;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogRecord {
    /// Epoch milliseconds; `0` when the timestamp could not be decoded
    pub ts: i64,
    pub service: String,
    pub level: String,
    pub servlet: String,
    pub endpoint: String,
    pub message_preview: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub fields: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
}

/// Distill one line, or `None` when it lacks the `ts service level [ctx] - msg` shape.
pub fn distill_line(line: &str, reference_year: i32) -> Option<LogRecord> {
    let caps = GENERIC_LINE.captures(line.trim())?;
    let (servlet, endpoint) = split_context(&caps[4]);
    let message = &caps[5];

    let mut fields = BTreeMap::new();
    for kv in KEY_VALUE.captures_iter(message) {
        if FIELDS_OF_INTEREST.contains(&&kv[1]) {
            fields.insert(kv[1].to_string(), kv[2].to_string());
        }
    }

    let payload = extract_labeled_payload(message, "payloadJson:");
    let user = payload.as_ref().map(|p| {
        p.get("userId")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    });

    Some(LogRecord {
        ts: parse_log_timestamp(&caps[1], reference_year),
        service: caps[2].to_string(),
        level: caps[3].to_string(),
        servlet: servlet.to_string(),
        endpoint: endpoint.to_string(),
        message_preview: message.chars().take(MESSAGE_PREVIEW_CHARS).collect(),
        fields,
        payload,
        user,
    })
}

/// `Servlet:/path` splits on the first colon; no colon means no endpoint.
fn split_context(context: &str) -> (&str, &str) {
    context.split_once(':').unwrap_or((context, ""))
}
