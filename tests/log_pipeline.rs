//! End-to-end tests for the log mining pipeline: raw lines in, finalized
//! JSONL stream out.

use std::collections::HashMap;
use std::io::Cursor;

use traffic_replay::core::logs::{
    CANONICAL_GAME_PATH, EndpointProfile, EventExtractor, LossyLines, MergeOptions, TrafficEvent,
    distill_line, extract_lines, extract_reader, merge_streams, read_events, write_events,
};

const YEAR: i32 = 2025;

/// 2025-12-21T00:00:00.134Z
const DEC_21_00_00_00_134: i64 = 1_766_275_200_134;

fn extractor() -> EventExtractor {
    EventExtractor::new(EndpointProfile::Traffic, YEAR)
}

fn line(time: &str, servlet_path: &str, method: &str, tail: &str) -> String {
    format!("21 Dec {time} LoggingFilter INFO  [Servlet:{servlet_path}] - COMPLETED Request type: {method} {tail}")
}

/// Every user has exactly one marker, on their latest event.
fn assert_markers(events: &[TrafficEvent]) {
    let mut latest: HashMap<&str, i64> = HashMap::new();
    for event in events {
        if let Some(user) = event.user_id.as_deref() {
            let ts = latest.entry(user).or_insert(event.timestamp);
            *ts = (*ts).max(event.timestamp);
        }
    }
    for (user, ts) in latest {
        let marked: Vec<&TrafficEvent> = events
            .iter()
            .filter(|e| e.user_id.as_deref() == Some(user) && e.is_last_request)
            .collect();
        assert_eq!(marked.len(), 1, "user {user} has {} markers", marked.len());
        assert_eq!(marked[0].timestamp, ts);
    }
}

fn assert_delays(events: &[TrafficEvent]) {
    for pair in events.windows(2) {
        let expected = (pair[1].timestamp - pair[0].timestamp).max(0) as u64;
        assert_eq!(pair[0].delay_ms, expected);
    }
    if let Some(last) = events.last() {
        assert_eq!(last.delay_ms, 0);
    }
}

#[test]
fn test_literal_plays_line() {
    let raw = r#"21 Dec 00:00:00.134 LoggingFilter INFO [PlaysServlet:/api/v1/plays] - COMPLETED Request type: POST payloadJson: {"userId":"abc123","playState":2}"#;
    let stream = extract_lines(&extractor(), [raw]);

    assert_eq!(stream.events.len(), 1);
    let event = &stream.events[0];
    assert_eq!(event.endpoint, "/api/v1/plays");
    assert_eq!(event.user_id.as_deref(), Some("abc123"));
    assert_eq!(event.timestamp, DEC_21_00_00_00_134);
    assert!(event.is_last_request);
    assert_eq!(event.delay_ms, 0);
}

#[test]
fn test_mixed_log_is_sorted_and_marked() {
    let lines = vec![
        line("00:00:05.000", "/api/v1/plays", "POST", r#"payloadJson: {"userId":"u1"}"#),
        "garbage that is not a log line".to_string(),
        line("00:00:01.000", "/date-picker", "GET", "uid: u1"),
        line("00:00:03.000", "/sudoku", "GET", "uid: u2 set: daily"),
        line("00:00:02.000", "/not-tracked", "GET", "uid: u2"),
        line("00:00:04.000", "/crossword", "GET", "uid: u2"),
        line("00:00:02.500", "/date-picker", "GET", "no identity here"),
    ];
    let stream = extract_lines(&extractor(), &lines);

    let timestamps: Vec<i64> = stream.events.iter().map(|e| e.timestamp).collect();
    let mut sorted = timestamps.clone();
    sorted.sort();
    assert_eq!(timestamps, sorted);
    assert_eq!(stream.events.len(), 4);

    assert!(
        stream
            .events
            .iter()
            .filter(|e| e.user_id.as_deref() == Some("u2"))
            .all(|e| e.endpoint == CANONICAL_GAME_PATH)
    );
    assert_markers(&stream.events);
    assert_delays(&stream.events);

    assert_eq!(stream.stats.lines_read, 7);
    assert_eq!(stream.stats.events, 4);
    assert_eq!(stream.stats.skipped_total(), 3);
    assert_eq!(stream.stats.unique_users(), 2);
}

#[test]
fn test_reader_to_jsonl_and_back() {
    let log = [
        line("00:00:01.000", "/date-picker", "GET", "uid: a"),
        line("00:00:02.250", "/api/v1/plays", "POST", r#"payloadJson: {"userId":"a"}"#),
    ]
    .join("\n");

    let stream = extract_reader(&extractor(), Cursor::new(log.into_bytes())).unwrap();
    let mut out = Vec::new();
    write_events(&mut out, &stream.events).unwrap();

    let text = String::from_utf8(out.clone()).unwrap();
    assert_eq!(text.lines().count(), 2);
    assert!(text.lines().next().unwrap().contains(r#""delayMs":1250"#));
    assert!(text.lines().nth(1).unwrap().contains(r#""isLastReq":1"#));

    let back = read_events(Cursor::new(out)).unwrap();
    assert_eq!(back.malformed, 0);
    assert_eq!(back.events, stream.events);
}

#[test]
fn test_merge_is_order_independent() {
    let source = |lines: &[String]| extract_lines(&extractor(), lines).events;
    let a = source(&[
        line("00:00:01.000", "/date-picker", "GET", "uid: a"),
        line("00:00:07.000", "/crossword", "GET", "uid: a"),
    ]);
    let b = source(&[line("00:00:03.000", "/date-picker", "GET", "uid: b")]);
    let c = source(&[
        line("00:00:05.000", "/crossword", "GET", "uid: c"),
        line("00:00:06.000", "/crossword", "GET", "uid: b"),
    ]);

    let remark = MergeOptions {
        remark_last_requests: true,
    };
    let ab_then_c = merge_streams([merge_streams([a.clone(), b.clone()], remark), c.clone()], remark);
    let bc_then_a = merge_streams([merge_streams([b, c], remark), a], remark);

    assert_eq!(ab_then_c, bc_then_a);
    assert_eq!(ab_then_c.len(), 5);
    assert_markers(&ab_then_c);
    assert_delays(&ab_then_c);
}

#[test]
fn test_distill_survives_invalid_utf8() {
    let mut log = b"1 Jan 10:00:00.000 Scheduler WARN [cleanup] - took \xff\xfe too long\n".to_vec();
    log.extend_from_slice(b"21 Dec 00:00:00.134 PlaysServlet DEBUG [PlaysServlet:/api/v1/plays] - saved userId: u1\n");

    let records: Vec<_> = LossyLines::new(Cursor::new(log))
        .map(|line| line.unwrap())
        .filter_map(|line| distill_line(&line, YEAR))
        .collect();

    assert_eq!(records.len(), 2);
    assert_eq!(records[0].servlet, "cleanup");
    assert!(records[0].message_preview.contains('\u{fffd}'));
    assert_eq!(records[1].ts, DEC_21_00_00_00_134);
}
