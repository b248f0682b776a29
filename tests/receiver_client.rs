//! Wire-level receiver client tests against a mock HTTP server.

use httpmock::{Method::GET, MockServer};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use autorec::config::ReceiverConfig;
use autorec::errors::ReceiverError;
use autorec::observability::AppObservability;
use autorec::receiver::{ReceiverApi, ReceiverClient};
use autorec::utils::circuit_breaker::{BreakerConfig, CircuitBreaker};

fn test_config(base_url: &str) -> ReceiverConfig {
    ReceiverConfig {
        base_url: base_url.to_string(),
        max_retries: 2,
        backoff: "1ms".into(),
        max_backoff: "2ms".into(),
        rate_limit: 0.0,
        ..ReceiverConfig::default()
    }
}

fn client_with(config: ReceiverConfig, breaker_threshold: u32) -> ReceiverClient {
    let breaker = Arc::new(CircuitBreaker::new(BreakerConfig {
        failure_threshold: breaker_threshold,
        ..BreakerConfig::default()
    }));
    ReceiverClient::new(
        config,
        breaker,
        Arc::new(AppObservability::new()),
        CancellationToken::new(),
    )
    .unwrap()
}

fn client_for(server: &MockServer) -> ReceiverClient {
    client_with(test_config(&server.base_url()), 100)
}

#[tokio::test]
async fn timers_decode_happy_path() {
    let server = MockServer::start_async().await;
    let m = server
        .mock_async(|when, then| {
            when.method(GET).path("/api/timerlist");
            then.status(200).json_body(serde_json::json!({
                "timers": [
                    {"serviceref": "1:0:1:1", "name": "News", "begin": 100, "end": 200, "state": 0, "disabled": 0}
                ]
            }));
        })
        .await;

    let client = client_for(&server);
    let timers = client.timers().await.unwrap();
    m.assert_async().await;
    assert_eq!(timers.len(), 1);
    assert_eq!(timers[0].service_ref, "1:0:1:1");
}

#[tokio::test]
async fn server_errors_are_retried_until_exhaustion() {
    let server = MockServer::start_async().await;
    let m = server
        .mock_async(|when, then| {
            when.method(GET).path("/api/timerlist");
            then.status(500).body("internal error");
        })
        .await;

    let client = client_for(&server);
    let result = client.timers().await;

    assert!(matches!(
        result,
        Err(ReceiverError::Upstream { status: 500, .. })
    ));
    // First attempt plus max_retries = 2
    assert_eq!(m.hits_async().await, 3);
}

#[tokio::test]
async fn not_found_is_not_retried() {
    let server = MockServer::start_async().await;
    let m = server
        .mock_async(|when, then| {
            when.method(GET).path("/api/timerlist");
            then.status(404);
        })
        .await;

    let client = client_for(&server);
    let result = client.timers().await;

    assert!(matches!(result, Err(ReceiverError::NotFound { .. })));
    assert_eq!(m.hits_async().await, 1);
}

#[tokio::test]
async fn too_many_requests_is_retried() {
    let server = MockServer::start_async().await;
    let m = server
        .mock_async(|when, then| {
            when.method(GET).path("/api/timerlist");
            then.status(429);
        })
        .await;

    let client = client_for(&server);
    let result = client.timers().await;

    assert!(matches!(result, Err(ReceiverError::Unavailable { .. })));
    assert_eq!(m.hits_async().await, 3);
}

#[tokio::test]
async fn nested_services_shape_is_cached() {
    let server = MockServer::start_async().await;
    let nested = server
        .mock_async(|when, then| {
            when.method(GET).path("/api/getservices");
            then.status(200).json_body(serde_json::json!({
                "services": [
                    {"servicename": "One", "servicereference": "1:0:1:1"}
                ]
            }));
        })
        .await;

    let client = client_for(&server);
    for _ in 0..2 {
        let services = client.services("1:7:1:0").await.unwrap();
        assert_eq!(services.len(), 1);
    }
    assert_eq!(nested.hits_async().await, 2);
}

#[tokio::test]
async fn flat_services_fallback_expands_subservices() {
    let server = MockServer::start_async().await;
    let nested = server
        .mock_async(|when, then| {
            when.method(GET).path("/api/getservices");
            // Flat-shaped answer: the nested decoder rejects it.
            then.status(200).json_body(serde_json::json!({
                "services": [
                    {"servicename": "Bouquet", "servicereference": "1:7:1:0", "subservices": []}
                ]
            }));
        })
        .await;
    let flat = server
        .mock_async(|when, then| {
            when.method(GET).path("/api/getallservices");
            then.status(200).json_body(serde_json::json!({
                "services": [
                    {"servicename": "Bouquet", "servicereference": "1:7:1:0", "subservices": [
                        {"servicename": "One", "servicereference": "1:0:1:1"},
                        {"servicename": "Two", "servicereference": "1:0:1:2"}
                    ]}
                ]
            }));
        })
        .await;

    let client = client_for(&server);

    let services = client.services("1:7:1:0").await.unwrap();
    assert_eq!(services.len(), 2);

    // The flat shape is remembered; the nested endpoint is not probed again.
    client.services("1:7:1:0").await.unwrap();
    assert_eq!(nested.hits_async().await, 1);
    assert_eq!(flat.hits_async().await, 2);
}

#[tokio::test]
async fn epg_xml_body_is_sniffed() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/api/epgservice");
            then.status(200)
                .header("content-type", "text/xml")
                .body(
                    r#"<e2eventlist><e2event>
                        <e2eventid>7</e2eventid>
                        <e2eventstart>1700000000</e2eventstart>
                        <e2eventduration>1800</e2eventduration>
                        <e2eventtitle>News</e2eventtitle>
                        <e2eventservicereference>1:0:1:1</e2eventservicereference>
                    </e2event></e2eventlist>"#,
                );
        })
        .await;

    let client = client_for(&server);
    let events = client.epg_for_service("1:0:1:1", 7).await.unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].title, "News");
}

#[tokio::test]
async fn epg_falls_back_to_webif_endpoint_on_404() {
    let server = MockServer::start_async().await;
    let json_api = server
        .mock_async(|when, then| {
            when.method(GET).path("/api/epgservice");
            then.status(404);
        })
        .await;
    let xml_api = server
        .mock_async(|when, then| {
            when.method(GET).path("/web/epgservice");
            then.status(200).body(
                r#"<e2eventlist><e2event>
                    <e2eventid>9</e2eventid>
                    <e2eventstart>1700000000</e2eventstart>
                    <e2eventduration>600</e2eventduration>
                    <e2eventtitle>Late News</e2eventtitle>
                    <e2eventservicereference>1:0:1:1</e2eventservicereference>
                </e2event></e2eventlist>"#,
            );
        })
        .await;

    let client = client_for(&server);
    let events = client.epg_for_service("1:0:1:1", 7).await.unwrap();

    assert_eq!(events[0].title, "Late News");
    assert_eq!(json_api.hits_async().await, 1);
    assert_eq!(xml_api.hits_async().await, 1);
}

#[tokio::test]
async fn latin1_bodies_are_converted() {
    let server = MockServer::start_async().await;
    let mut body =
        br#"{"timers": [{"serviceref": "1:0:1:1", "name": "K"#.to_vec();
    body.push(0xFC); // latin-1 u-umlaut
    body.extend_from_slice(br#"che", "begin": 1, "end": 2}]}"#);

    server
        .mock_async(move |when, then| {
            when.method(GET).path("/api/timerlist");
            then.status(200)
                .header("content-type", "application/json; charset=ISO-8859-1")
                .body(body.clone());
        })
        .await;

    let client = client_for(&server);
    let timers = client.timers().await.unwrap();
    assert_eq!(timers[0].name, "Küche");
}

#[tokio::test]
async fn error_bodies_are_redacted() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/api/timerlist");
            then.status(500)
                .body("login failed password=hunter2 sid=abc123");
        })
        .await;

    let mut config = test_config(&server.base_url());
    config.max_retries = 0;
    let client = client_with(config, 100);

    let error = client.timers().await.unwrap_err();
    let message = error.to_string();
    assert!(message.contains("password=***"));
    assert!(!message.contains("hunter2"));
    assert!(!message.contains("abc123"));
}

#[tokio::test]
async fn open_circuit_fails_fast_without_touching_the_receiver() {
    let server = MockServer::start_async().await;
    let m = server
        .mock_async(|when, then| {
            when.method(GET).path("/api/timerlist");
            then.status(500);
        })
        .await;

    let mut config = test_config(&server.base_url());
    config.max_retries = 0;
    let client = client_with(config, 1);

    let first = client.timers().await;
    assert!(matches!(first, Err(ReceiverError::Upstream { .. })));

    let second = client.timers().await;
    assert!(matches!(second, Err(ReceiverError::CircuitOpen { .. })));
    assert_eq!(m.hits_async().await, 1);
}

#[tokio::test]
async fn basic_auth_is_sent_when_configured() {
    let server = MockServer::start_async().await;
    let m = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/api/timerlist")
                .header("authorization", "Basic cm9vdDpzZWNyZXQ=");
            then.status(200).json_body(serde_json::json!({"timers": []}));
        })
        .await;

    let mut config = test_config(&server.base_url());
    config.username = "root".into();
    config.password = "secret".into();
    let client = client_with(config, 100);

    client.timers().await.unwrap();
    m.assert_async().await;
}

#[tokio::test]
async fn add_timer_conflict_is_classified() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/api/timeradd")
                .query_param("sRef", "1:0:1:1")
                .query_param("begin", "100")
                .query_param("end", "200");
            then.status(200).json_body(serde_json::json!({
                "result": false,
                "message": "Conflicting Timer(s) detected!"
            }));
        })
        .await;

    let client = client_for(&server);
    let result = client.add_timer("1:0:1:1", 100, 200, "News", "desc").await;
    assert!(matches!(result, Err(ReceiverError::Conflict { .. })));
}

#[tokio::test]
async fn add_timer_success() {
    let server = MockServer::start_async().await;
    let m = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/api/timeradd")
                .query_param("name", "News at Six");
            then.status(200)
                .json_body(serde_json::json!({"result": true, "message": "done"}));
        })
        .await;

    let client = client_for(&server);
    client
        .add_timer("1:0:1:1", 100, 200, "News at Six", "desc")
        .await
        .unwrap();
    m.assert_async().await;
}

#[test]
fn stream_urls_cover_both_modes() {
    let mut config = test_config("http://receiver.local");
    config.stream_port = 8001;
    let client = client_with(config, 100);
    assert_eq!(
        client.stream_url("1:0:1:1:0:0:0:0:0:0:", "News"),
        "http://receiver.local:8001/1:0:1:1:0:0:0:0:0:0:"
    );

    let mut config = test_config("http://receiver.local");
    config.use_webif_streams = true;
    let client = client_with(config, 100);
    let url = client.stream_url("1:0:1:1", "My Channel");
    assert!(url.starts_with("http://receiver.local/web/stream.m3u?"));
    assert!(url.contains("ref=1%3A0%3A1%3A1"));
    assert!(url.contains("name=My+Channel"));
}
