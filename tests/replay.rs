//! Replaying a finalized stream, dry and against a mock site.

use std::io::Write;
use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde_json::json;
use tempfile::NamedTempFile;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use traffic_replay::core::flow::{
    FlowConfig, PuzzleSelection, ReqwestTransport, TransportOptions,
};
use traffic_replay::core::logs::read_events;
use traffic_replay::core::replay::{ReplayOptions, TrafficReplayer};

const STREAM: &str = r#"{"timestamp":1766275200000,"endpoint":"/date-picker","userId":"alice","delayMs":200,"isLastReq":0}
{"timestamp":1766275200200,"endpoint":"/postPickerStatus","method":"POST","userId":"alice","delayMs":300,"isLastReq":0}

not json
{"timestamp":1766275200500,"endpoint":"/api/v1/plays","method":"POST","userId":"alice","delayMs":500,"isLastReq":1}
{"timestamp":1766275201000,"endpoint":"/api/v1/puzzles","method":"GET","userId":null,"delayMs":0,"isLastReq":0,"series":"frodo"}
"#;

fn stream_file() -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(STREAM.as_bytes()).unwrap();
    file
}

fn load() -> Vec<traffic_replay::TrafficEvent> {
    let file = stream_file();
    let reader = std::io::BufReader::new(std::fs::File::open(file.path()).unwrap());
    let stream = read_events(reader).unwrap();
    assert_eq!(stream.malformed, 1);
    stream.events
}

fn fixed_puzzle(base_url: String) -> FlowConfig {
    FlowConfig {
        base_url,
        puzzle: PuzzleSelection::Fixed {
            puzzle_id: "1461ef6d".into(),
            state_len: 185,
        },
        ..FlowConfig::default()
    }
}

#[tokio::test(start_paused = true)]
async fn test_dry_run_from_file() {
    let events = load();
    assert_eq!(events.len(), 4);

    // nothing listens here; a dry run must not connect
    let transport = ReqwestTransport::new(&TransportOptions {
        base_url: "http://127.0.0.1:1/".into(),
        ..TransportOptions::default()
    })
    .unwrap();
    let replayer = TrafficReplayer::new(
        Arc::new(transport),
        Arc::new(fixed_puzzle("http://127.0.0.1:1/".into())),
        ReplayOptions {
            speed: 4.0,
            dry_run: true,
            ..ReplayOptions::default()
        },
    );
    let report = replayer.replay(&events).await;

    let scheduled: Vec<u64> = report.results.iter().map(|r| r.scheduled_ms).collect();
    assert_eq!(scheduled, vec![0, 50, 125, 250]);
    assert_eq!(report.summary.success, 4);
    assert_eq!(report.summary.original_span_ms, 1000);
    assert_eq!(report.summary.scheduled_span_ms, 250);
    assert_eq!(report.summary.unique_users, 1);
    assert!(report.summary.render().contains("dry run"));
}

#[tokio::test]
async fn test_live_replay_against_mock_site() {
    let server = MockServer::start().await;
    let picker = format!(
        r#"<script id="params" type="application/json">{}</script>"#,
        json!({"rawsps": STANDARD.encode(json!({"loadToken": "lt-alice"}).to_string())})
    );
    let puzzle = format!(
        r#"<script type="application/json" id="params">{}</script>"#,
        json!({"rawp": STANDARD.encode(json!({"playId": "play-alice"}).to_string())})
    );

    Mock::given(method("GET"))
        .and(path("/date-picker"))
        .respond_with(ResponseTemplate::new(200).set_body_string(picker))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/crossword"))
        .respond_with(ResponseTemplate::new(200).set_body_string(puzzle))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/postPickerStatus"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": 0})))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v1/plays"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": 0})))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/puzzles"))
        .and(query_param("series", "frodo"))
        .and(query_param("limit", "14"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"puzzles": []})))
        .mount(&server)
        .await;

    let transport = ReqwestTransport::new(&TransportOptions {
        base_url: server.uri(),
        ..TransportOptions::default()
    })
    .unwrap();
    let replayer = TrafficReplayer::new(
        Arc::new(transport),
        Arc::new(fixed_puzzle(format!("{}/", server.uri()))),
        ReplayOptions {
            speed: 10.0,
            ..ReplayOptions::default()
        },
    );
    let report = replayer.replay(&load()).await;

    assert_eq!(report.summary.prewarmed, 1);
    assert_eq!(report.summary.failed, 0, "{:?}", report.results);
    assert_eq!(report.summary.success, 4);
    assert!(report.results.windows(2).all(|w| w[0].index < w[1].index));

    let requests = server.received_requests().await.unwrap_or_default();
    let play = requests
        .iter()
        .find(|r| r.url.path() == "/api/v1/plays")
        .unwrap();
    let body: serde_json::Value = serde_json::from_slice(&play.body).unwrap();
    assert_eq!(body["loadToken"], "lt-alice");
    assert_eq!(body["playId"], "play-alice");
    assert_eq!(body["playState"], 2);
    assert_eq!(body["postScoreReason"], "AUTOSAVE");
}
