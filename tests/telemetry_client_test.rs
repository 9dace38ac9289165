use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use chrono::{NaiveDate, NaiveTime};
use horae::config::TelemetryConfig;
use horae::credentials::Credentials;
use horae::error::HoraeError;
use horae::range::{QueryDescriptor, expand};
use horae::telemetry::{HttpTelemetryClient, TelemetrySource};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone)]
struct SeenRequest {
    device: String,
    query: HashMap<String, String>,
    auth: Option<String>,
    content_type: Option<String>,
}

type Seen = Arc<Mutex<Vec<SeenRequest>>>;

async fn timeseries(
    State(seen): State<Seen>,
    Path(device): Path<String>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> impl IntoResponse {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };
    seen.lock().unwrap().push(SeenRequest {
        device: device.clone(),
        query,
        auth: header("x-authorization"),
        content_type: header("content-type"),
    });

    match device.as_str() {
        "dev-ok" => (
            StatusCode::OK,
            r#"{"netkvah":[{"ts":1758326400000,"value":"1.25"},{"ts":1758330000000,"value":"2.5"}]}"#,
        ),
        "dev-empty" => (StatusCode::OK, ""),
        "dev-null" => (StatusCode::OK, "null"),
        "dev-denied" => (StatusCode::UNAUTHORIZED, r#"{"status":401}"#),
        "dev-garbage" => (StatusCode::OK, "<html>maintenance</html>"),
        _ => (StatusCode::INTERNAL_SERVER_ERROR, "boom"),
    }
}

async fn fake_server() -> (String, Seen) {
    let seen: Seen = Arc::new(Mutex::new(Vec::new()));
    let app = axum::Router::new()
        .route(
            "/api/plugins/telemetry/DEVICE/{device}/values/timeseries",
            get(timeseries),
        )
        .with_state(seen.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (
        format!(
            "http://{}/api/plugins/telemetry/DEVICE/{{deviceId}}/values/timeseries",
            addr
        ),
        seen,
    )
}

fn client(endpoint: &str) -> HttpTelemetryClient {
    let config = TelemetryConfig {
        endpoint_template: endpoint.to_string(),
        request_timeout_secs: 5,
        ..TelemetryConfig::default()
    };
    HttpTelemetryClient::new(&config).unwrap()
}

fn descriptor() -> QueryDescriptor {
    let date = NaiveDate::from_ymd_opt(2025, 9, 20).unwrap();
    expand(
        date,
        date,
        NaiveTime::from_hms_opt(0, 0, 0),
        NaiveTime::from_hms_opt(2, 0, 0),
    )[0]
}

#[tokio::test]
async fn fetch_sends_query_and_headers() {
    let (endpoint, seen) = fake_server().await;
    let client = client(&endpoint);
    let creds = Credentials::new("dev-ok", "secret-token").unwrap();

    let response = client.fetch(&descriptor(), &creds).await.unwrap();
    let samples = response.samples("netkvah").unwrap();
    assert_eq!(samples.len(), 2);
    assert_eq!(samples[0].ts, 1_758_326_400_000);
    assert_eq!(samples[1].numeric_value(), Some(2.5));

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    let req = &seen[0];
    assert_eq!(req.device, "dev-ok");
    assert_eq!(req.auth.as_deref(), Some("Bearer secret-token"));
    assert_eq!(req.content_type.as_deref(), Some("application/json"));
    assert_eq!(req.query["keys"], "netkvah");
    assert_eq!(req.query["startTs"], "1758326400000");
    assert_eq!(req.query["endTs"], "1758333600000");
    assert_eq!(req.query["agg"], "SUM");
    assert_eq!(req.query["interval"], "7200000");
}

#[tokio::test]
async fn empty_and_null_bodies_are_empty_responses() {
    let (endpoint, _seen) = fake_server().await;
    let client = client(&endpoint);

    for device in ["dev-empty", "dev-null"] {
        let creds = Credentials::new(device, "tok").unwrap();
        let response = client.fetch(&descriptor(), &creds).await.unwrap();
        assert!(response.samples("netkvah").is_none(), "device {}", device);
    }
}

#[tokio::test]
async fn error_statuses_map_to_error_kinds() {
    let (endpoint, _seen) = fake_server().await;
    let client = client(&endpoint);

    let creds = Credentials::new("dev-denied", "tok").unwrap();
    let err = client.fetch(&descriptor(), &creds).await.unwrap_err();
    assert!(matches!(err, HoraeError::Auth { .. }), "{:?}", err);

    let creds = Credentials::new("dev-broken", "tok").unwrap();
    let err = client.fetch(&descriptor(), &creds).await.unwrap_err();
    assert!(matches!(err, HoraeError::Api { .. }), "{:?}", err);
    assert!(err.to_string().contains("500"));

    let creds = Credentials::new("dev-garbage", "tok").unwrap();
    let err = client.fetch(&descriptor(), &creds).await.unwrap_err();
    assert!(matches!(err, HoraeError::Serialization { .. }), "{:?}", err);
}

#[tokio::test]
async fn unreachable_server_is_a_network_error() {
    // Bind then drop to get a port nothing listens on
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let client = client(&format!("http://{}/values/{{deviceId}}", addr));
    let creds = Credentials::new("dev-ok", "tok").unwrap();
    let err = client.fetch(&descriptor(), &creds).await.unwrap_err();
    assert!(matches!(err, HoraeError::Network { .. }), "{:?}", err);
}
