//! Traffic event records and their JSONL representation.
//!
//! One event per line, compact JSON:
//!
//! ```text
//! {"ts":1766275200134,"endpoint":"/api/v1/plays","method":"POST","userId":"abc123","delayMs":12,"isLastReq":0}
//! ```
//!
//! `userId` is always written (as `null` when unknown); `method`, `series`
//! and `puzzleId` only when present.

use std::io::{BufRead, Write};

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tracing::debug;

use crate::errors::{ParseError, ParseResult};

/// A single user request recovered from production logs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrafficEvent {
    /// Epoch milliseconds, UTC
    #[serde(rename = "ts")]
    pub timestamp: i64,

    /// Canonical endpoint path
    pub endpoint: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,

    #[serde(rename = "userId", default)]
    pub user_id: Option<String>,

    /// Milliseconds until the next event in the stream
    #[serde(rename = "delayMs", default)]
    pub delay_ms: u64,

    /// Set on the chronologically last event of each user
    #[serde(
        rename = "isLastReq",
        default,
        serialize_with = "flag_as_int",
        deserialize_with = "flag_from_int"
    )]
    pub is_last_request: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub series: Option<String>,

    #[serde(rename = "puzzleId", default, skip_serializing_if = "Option::is_none")]
    pub puzzle_id: Option<String>,
}

impl TrafficEvent {
    pub fn new(timestamp: i64, endpoint: impl Into<String>) -> Self {
        Self {
            timestamp,
            endpoint: endpoint.into(),
            method: None,
            user_id: None,
            delay_ms: 0,
            is_last_request: false,
            series: None,
            puzzle_id: None,
        }
    }

    pub fn with_method(mut self, method: impl Into<String>) -> Self {
        self.method = Some(method.into());
        self
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Method to replay with; logs without a method column imply `GET`.
    pub fn method_or_default(&self) -> &str {
        self.method.as_deref().unwrap_or("GET")
    }
}

fn flag_as_int<S: Serializer>(flag: &bool, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u8(u8::from(*flag))
}

fn flag_from_int<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Int(u64),
        Bool(bool),
    }

    Ok(match Flag::deserialize(deserializer)? {
        Flag::Int(value) => value != 0,
        Flag::Bool(value) => value,
    })
}

/// Parse one JSONL line into an event.
pub fn parse_event_line(line: &str) -> ParseResult<TrafficEvent> {
    serde_json::from_str(line).map_err(|e| ParseError::MalformedRecord(e.to_string()))
}

/// Events read from a JSONL source, with the count of lines that were skipped.
#[derive(Debug, Default)]
pub struct EventStream {
    pub events: Vec<TrafficEvent>,
    pub malformed: usize,
}

/// Read every event from a JSONL source. Blank lines are ignored and
/// malformed lines are counted and skipped.
pub fn read_events<R: BufRead>(reader: R) -> std::io::Result<EventStream> {
    let mut stream = EventStream::default();

    for (line_no, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        match parse_event_line(trimmed) {
            Ok(event) => stream.events.push(event),
            Err(e) => {
                debug!(line = line_no + 1, error = %e, "Skipping malformed event record");
                stream.malformed += 1;
            }
        }
    }

    Ok(stream)
}

/// Write events as compact JSONL, one object per line.
pub fn write_events<W: Write>(mut writer: W, events: &[TrafficEvent]) -> std::io::Result<()> {
    for event in events {
        serde_json::to_writer(&mut writer, event)?;
        writer.write_all(b"\n")?;
    }
    writer.flush()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_field_names() {
        let mut event = TrafficEvent::new(1_766_275_200_134, "/api/v1/plays")
            .with_method("POST")
            .with_user("abc123");
        event.delay_ms = 12;
        event.is_last_request = true;

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["ts"], 1_766_275_200_134i64);
        assert_eq!(json["endpoint"], "/api/v1/plays");
        assert_eq!(json["method"], "POST");
        assert_eq!(json["userId"], "abc123");
        assert_eq!(json["delayMs"], 12);
        assert_eq!(json["isLastReq"], 1);
        assert!(json.get("series").is_none());
    }

    #[test]
    fn test_null_user_is_written_and_read() {
        let event = TrafficEvent::new(5, "/crossword");
        let line = serde_json::to_string(&event).unwrap();
        assert!(line.contains(r#""userId":null"#));
        assert!(!line.contains("method"));

        let back = parse_event_line(&line).unwrap();
        assert_eq!(back.user_id, None);
        assert!(!back.is_last_request);
    }

    #[test]
    fn test_last_flag_accepts_bool() {
        let event =
            parse_event_line(r#"{"ts":1,"endpoint":"/crossword","userId":"u","isLastReq":true}"#)
                .unwrap();
        assert!(event.is_last_request);
        assert_eq!(event.delay_ms, 0);
    }

    #[test]
    fn test_reader_skips_blank_and_malformed() {
        let input = "\n{\"ts\":1,\"endpoint\":\"/crossword\",\"userId\":\"a\"}\nnot json\n\n{\"ts\":2,\"endpoint\":\"/date-picker\",\"userId\":null}\n";
        let stream = read_events(input.as_bytes()).unwrap();
        assert_eq!(stream.events.len(), 2);
        assert_eq!(stream.malformed, 1);
        assert_eq!(stream.events[1].endpoint, "/date-picker");
    }

    #[test]
    fn test_writer_emits_one_line_per_event() {
        let events = vec![
            TrafficEvent::new(1, "/crossword").with_user("a"),
            TrafficEvent::new(2, "/api/v1/plays").with_user("b"),
        ];
        let mut out = Vec::new();
        write_events(&mut out, &events).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(text.lines().count(), 2);
        assert!(text.ends_with('\n'));
    }

    #[test]
    fn test_method_default() {
        assert_eq!(TrafficEvent::new(1, "/crossword").method_or_default(), "GET");
    }
}
