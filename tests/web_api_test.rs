use axum::body::Body;
use axum::http::{Request, StatusCode};
use horae::config::Config;
use horae::credentials::Credentials;
use horae::error::{HoraeError, Result};
use horae::range::{DateRangeInput, QueryDescriptor};
use horae::telemetry::{Sample, TelemetrySource, TimeseriesResponse};
use horae::web::{AppState, build_router};
use horae::{Dashboard, DashboardOptions};
use http_body_util::BodyExt as _;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tower::ServiceExt;

struct GatedSource {
    gate: Semaphore,
}

#[async_trait::async_trait]
impl TelemetrySource for GatedSource {
    async fn fetch(
        &self,
        _query: &QueryDescriptor,
        _credentials: &Credentials,
    ) -> Result<TimeseriesResponse> {
        let permit = self
            .gate
            .acquire()
            .await
            .map_err(|_| HoraeError::network("gate closed"))?;
        permit.forget();
        Ok(TimeseriesResponse::default().with_metric("netkvah", vec![Sample::new(0, "0.75")]))
    }
}

fn router_with(permits: usize) -> (axum::Router, Arc<GatedSource>) {
    let mut config = Config::default();
    config.session.route = "/dev-9/very-secret".to_string();

    let options = DashboardOptions {
        windows: config.dashboard.windows.clone(),
        date_range: DateRangeInput::new("2025-09-20", "2025-09-21"),
        metric_key: config.telemetry.metric_key.clone(),
        pacing: Duration::ZERO,
    };
    let source = Arc::new(GatedSource {
        gate: Semaphore::new(permits),
    });
    let creds = Credentials::from_route(&config.session.route, None).unwrap();
    let (dashboard, handle) = Dashboard::new(options, creds, source.clone());
    dashboard.spawn();

    let router = build_router(AppState {
        dashboard: handle,
        config: Arc::new(config),
    });
    (router, source)
}

async fn call(router: &axum::Router, method: &str, uri: &str, body: Option<&str>) -> (StatusCode, serde_json::Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if body.is_some() {
        builder = builder.header("content-type", "application/json");
    }
    let request = builder
        .body(body.map_or_else(Body::empty, |b| Body::from(b.to_string())))
        .unwrap();

    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
    (status, json)
}

#[tokio::test]
async fn health_and_status() {
    let (router, _) = router_with(Semaphore::MAX_PERMITS);

    let response = router
        .clone()
        .oneshot(Request::builder().uri("/api/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(&body[..], b"ok");

    let (status, json) = call(&router, "GET", "/api/status", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["device_id"], "dev-9");
    assert_eq!(json["windows"].as_array().unwrap().len(), 7);
    assert_eq!(json["any_busy"], false);
    assert!(json["version"].as_str().is_some());
}

#[tokio::test]
async fn run_and_wait_returns_summary() {
    let (router, _) = router_with(Semaphore::MAX_PERMITS);

    let (status, json) = call(&router, "POST", "/api/windows/section-1/run?wait=true", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["window_id"], "section-1");
    assert_eq!(json["calls"].as_array().unwrap().len(), 2);
    assert_eq!(json["aggregate"]["sign"], "positive");

    let (_, windows) = call(&router, "GET", "/api/windows", None).await;
    assert_eq!(windows[0]["total"], "1.50");
    assert_eq!(windows[0]["busy"], false);
    assert_eq!(windows[1]["total"], "0.00");
}

#[tokio::test]
async fn run_status_codes() {
    let (router, source) = router_with(0);

    let (status, json) = call(&router, "POST", "/api/windows/nope/run", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(json["error"].as_str().unwrap().contains("nope"));

    let (status, json) = call(&router, "POST", "/api/windows/section-2/run", None).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert!(json["cycle_id"].as_str().is_some());

    let (status, _) = call(&router, "POST", "/api/windows/section-2/run", None).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = call(
        &router,
        "PUT",
        "/api/date-range",
        Some(r#"{"from_date":"2025-09-22","to_date":"2025-09-20"}"#),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, json) = call(&router, "POST", "/api/windows/section-3/run", None).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(json["error"], "From date must be before or equal to to date");

    source.gate.add_permits(2);
}

#[tokio::test]
async fn window_and_date_range_edits() {
    let (router, _) = router_with(Semaphore::MAX_PERMITS);

    let (status, _) = call(
        &router,
        "PUT",
        "/api/windows/section-4",
        Some(r#"{"from_time":"12:15","to_time":"16:00"}"#),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = call(
        &router,
        "PUT",
        "/api/windows/ghost",
        Some(r#"{"from_time":"12:15","to_time":"16:00"}"#),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, windows) = call(&router, "GET", "/api/windows", None).await;
    assert_eq!(windows[3]["from_time"], "12:15");

    let (status, _) = call(
        &router,
        "PUT",
        "/api/date-range",
        Some(r#"{"from_date":"2025-01-01","to_date":"2025-01-31"}"#),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let (_, range) = call(&router, "GET", "/api/date-range", None).await;
    assert_eq!(range["from_date"], "2025-01-01");
    assert_eq!(range["to_date"], "2025-01-31");
}

#[tokio::test]
async fn config_is_redacted_and_schema_served() {
    let (router, _) = router_with(Semaphore::MAX_PERMITS);

    let (status, json) = call(&router, "GET", "/api/config", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["session"]["route"], "***");
    assert!(!json.to_string().contains("very-secret"));

    let (status, schema) = call(&router, "GET", "/api/config/schema", None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(schema["properties"]["telemetry"].is_object());
}

#[tokio::test]
async fn unknown_path_is_json_not_found() {
    let (router, _) = router_with(Semaphore::MAX_PERMITS);
    let (status, json) = call(&router, "GET", "/nowhere/at/all", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json, serde_json::json!({"error":"not found"}));
}

#[tokio::test]
async fn events_stream_starts_with_snapshot() {
    let (router, _) = router_with(Semaphore::MAX_PERMITS);

    let response = router
        .oneshot(Request::builder().uri("/api/events").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let ct = response
        .headers()
        .get(axum::http::header::CONTENT_TYPE)
        .and_then(|h| h.to_str().ok())
        .unwrap_or("");
    assert!(ct.contains("text/event-stream"));

    let mut body = response.into_body();
    let mut buf: Vec<u8> = Vec::new();
    let wait = tokio::time::timeout(Duration::from_secs(2), async {
        while let Some(Ok(frame)) = body.frame().await {
            if let Some(data) = frame.data_ref() {
                buf.extend_from_slice(data);
                if buf.windows(b"any_busy".len()).any(|w| w == b"any_busy") {
                    break;
                }
            }
        }
    })
    .await;

    assert!(wait.is_ok(), "timed out waiting for snapshot event");
    let s = String::from_utf8_lossy(&buf);
    assert!(s.contains("event: snapshot"), "{}", s);
    assert!(s.contains("dev-9"), "{}", s);
}

#[tokio::test]
async fn serve_reports_bind_failure_as_web_error() {
    let taken = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = taken.local_addr().unwrap().port();

    let mut config = Config::default();
    config.web.host = "127.0.0.1".to_string();
    config.web.port = port;

    let options = DashboardOptions {
        windows: config.dashboard.windows.clone(),
        date_range: DateRangeInput::new("2025-09-20", "2025-09-20"),
        metric_key: config.telemetry.metric_key.clone(),
        pacing: Duration::ZERO,
    };
    let source = Arc::new(GatedSource {
        gate: Semaphore::new(0),
    });
    let creds = Credentials::from_route("/dev-9/token", None).unwrap();
    let (dashboard, handle) = Dashboard::new(options, creds, source);
    dashboard.spawn();

    let err = horae::web::serve(handle, Arc::new(config)).await.unwrap_err();
    let err = err.downcast_ref::<HoraeError>().unwrap();
    assert!(matches!(err, HoraeError::Web { .. }));
    assert!(err.to_string().contains(&format!("127.0.0.1:{}", port)));
}
