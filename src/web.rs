//! Axum HTTP surface: dashboard state, window runs and live events
//!
//! With the `openapi` feature the router also serves an OpenAPI document and
//! Swagger UI at `/docs`.

use crate::config::Config;
use crate::dashboard::DashboardHandle;
use crate::error::HoraeError;
use crate::range::DateRangeInput;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Deserialize;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::{BroadcastStream, WatchStream};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
#[cfg(feature = "openapi")]
use utoipa::{OpenApi, ToSchema};
#[cfg(feature = "openapi")]
use utoipa_swagger_ui::SwaggerUi;

#[derive(Clone)]
pub struct AppState {
    pub dashboard: DashboardHandle,
    pub config: Arc<Config>,
}

#[derive(Debug, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct WindowTimesBody {
    pub from_time: String,
    pub to_time: String,
}

#[derive(Debug, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct DateRangeBody {
    pub from_date: String,
    pub to_date: String,
}

#[derive(Debug, Default, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema, utoipa::IntoParams))]
#[cfg_attr(feature = "openapi", into_params(parameter_in = Query))]
pub struct RunParams {
    /// Block until the cycle finishes and return its summary
    #[serde(default)]
    pub wait: bool,
}

fn error_response(err: &HoraeError) -> Response {
    let status = match err {
        HoraeError::Validation { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        HoraeError::NotFound { .. } => StatusCode::NOT_FOUND,
        HoraeError::Busy { .. } => StatusCode::CONFLICT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    let message = match err {
        HoraeError::Validation { message, .. } => message.clone(),
        other => other.to_string(),
    };
    (status, Json(serde_json::json!({ "error": message }))).into_response()
}

#[cfg_attr(feature = "openapi", utoipa::path(get, path = "/api/health", responses(
    (status = 200, description = "Service is healthy")
)))]
async fn health() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

#[cfg_attr(feature = "openapi", utoipa::path(get, path = "/api/status", responses(
    (status = 200, description = "Dashboard snapshot")
)))]
async fn status(State(state): State<AppState>) -> impl IntoResponse {
    let snapshot = state.dashboard.snapshot();
    let mut root = serde_json::to_value(&*snapshot)
        .unwrap_or(serde_json::json!({"error":"serialization"}));
    if let Some(obj) = root.as_object_mut() {
        obj.insert("version".to_string(), env!("APP_VERSION").into());
    }
    Json(root)
}

#[cfg_attr(feature = "openapi", utoipa::path(get, path = "/api/windows", responses((status = 200))))]
async fn windows(State(state): State<AppState>) -> impl IntoResponse {
    let snapshot = state.dashboard.snapshot();
    Json(serde_json::to_value(&snapshot.windows).unwrap_or(serde_json::json!([])))
}

#[cfg_attr(feature = "openapi", utoipa::path(
    put,
    path = "/api/windows/{id}",
    params(("id" = String, Path, description = "Window id")),
    request_body = WindowTimesBody,
    responses((status = 200), (status = 404))
))]
async fn put_window(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<WindowTimesBody>,
) -> Response {
    match state
        .dashboard
        .set_window_times(&id, &body.from_time, &body.to_time)
        .await
    {
        Ok(()) => (StatusCode::OK, Json(serde_json::json!({"ok":true}))).into_response(),
        Err(e) => error_response(&e),
    }
}

#[cfg_attr(feature = "openapi", utoipa::path(
    post,
    path = "/api/windows/{id}/run",
    params(("id" = String, Path, description = "Window id"), RunParams),
    responses((status = 200), (status = 202), (status = 404), (status = 409), (status = 422))
))]
async fn run_window(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<RunParams>,
) -> Response {
    let ticket = match state.dashboard.run_window(&id).await {
        Ok(t) => t,
        Err(e) => return error_response(&e),
    };

    if !params.wait {
        return (
            StatusCode::ACCEPTED,
            Json(serde_json::json!({"ok":true, "cycle_id": ticket.cycle_id})),
        )
            .into_response();
    }

    match ticket.wait().await {
        Ok(summary) => (
            StatusCode::OK,
            Json(serde_json::to_value(&summary).unwrap_or(serde_json::json!({}))),
        )
            .into_response(),
        Err(e) => error_response(&e),
    }
}

#[cfg_attr(feature = "openapi", utoipa::path(get, path = "/api/date-range", responses((status = 200))))]
async fn get_date_range(State(state): State<AppState>) -> impl IntoResponse {
    let snapshot = state.dashboard.snapshot();
    Json(serde_json::json!({
        "from_date": snapshot.date_range.from_date,
        "to_date": snapshot.date_range.to_date,
    }))
}

#[cfg_attr(feature = "openapi", utoipa::path(
    put,
    path = "/api/date-range",
    request_body = DateRangeBody,
    responses((status = 200))
))]
async fn put_date_range(State(state): State<AppState>, Json(body): Json<DateRangeBody>) -> Response {
    let range = DateRangeInput::new(body.from_date, body.to_date);
    match state.dashboard.set_date_range(range).await {
        Ok(()) => (StatusCode::OK, Json(serde_json::json!({"ok":true}))).into_response(),
        Err(e) => error_response(&e),
    }
}

#[cfg_attr(feature = "openapi", utoipa::path(get, path = "/api/config", responses((status = 200))))]
async fn get_config(State(state): State<AppState>) -> impl IntoResponse {
    Json(
        serde_json::to_value(state.config.redacted())
            .unwrap_or(serde_json::json!({"error":"serialization"})),
    )
}

#[cfg_attr(feature = "openapi", utoipa::path(get, path = "/api/config/schema", responses((status = 200))))]
async fn get_config_schema() -> impl IntoResponse {
    let schema = schemars::schema_for!(crate::config::Config);
    Json(serde_json::to_value(&schema).unwrap_or(serde_json::json!({"error":"schema"})))
}

#[cfg_attr(feature = "openapi", utoipa::path(get, path = "/api/events", responses((status = 200))))]
async fn events(State(state): State<AppState>) -> impl IntoResponse {
    let snapshots = WatchStream::new(state.dashboard.watch_snapshots()).filter_map(|snap| {
        Event::default()
            .event("snapshot")
            .json_data(&*snap)
            .ok()
            .map(Ok::<Event, std::convert::Infallible>)
    });
    let notices = BroadcastStream::new(state.dashboard.subscribe_notices()).filter_map(|msg| {
        match msg {
            Ok(notice) => Event::default()
                .event("notice")
                .json_data(&notice)
                .ok()
                .map(Ok::<Event, std::convert::Infallible>),
            Err(_) => None,
        }
    });
    Sse::new(snapshots.merge(notices)).keep_alive(KeepAlive::default())
}

async fn not_found() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(serde_json::json!({"error":"not found"})),
    )
}

#[cfg(feature = "openapi")]
#[derive(OpenApi)]
#[openapi(
    paths(
        health, status, windows, put_window, run_window,
        get_date_range, put_date_range, get_config, get_config_schema, events,
    ),
    components(schemas(WindowTimesBody, DateRangeBody, RunParams)),
    tags((name = "horae", description = "Horae energy window API"))
)]
pub struct ApiDoc;

pub fn build_router(state: AppState) -> Router {
    let router = Router::new()
        .route("/api/health", get(health))
        .route("/api/status", get(status))
        .route("/api/windows", get(windows))
        .route("/api/windows/{id}", axum::routing::put(put_window))
        .route("/api/windows/{id}/run", post(run_window))
        .route("/api/date-range", get(get_date_range).put(put_date_range))
        .route("/api/config", get(get_config))
        .route("/api/config/schema", get(get_config_schema))
        .route("/api/events", get(events));

    #[cfg(feature = "openapi")]
    let router = router.merge(SwaggerUi::new("/docs").url("/openapi.json", ApiDoc::openapi()));

    router
        .fallback(not_found)
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

pub async fn serve(dashboard: DashboardHandle, config: Arc<Config>) -> anyhow::Result<()> {
    let host = config.web.host.clone();
    let port = config.web.port;
    let router = build_router(AppState { dashboard, config });

    let logger = crate::logging::get_logger("web");
    logger.info(&format!(
        "Starting web server; requested host={}, port={}",
        host, port
    ));

    let addr: SocketAddr = match host.parse::<IpAddr>() {
        Ok(ip) => SocketAddr::new(ip, port),
        Err(_) => {
            logger.warn(&format!("Invalid host '{}'; falling back to 127.0.0.1", host));
            ([127, 0, 0, 1], port).into()
        }
    };

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| HoraeError::web(format!("Failed to bind {}: {}", addr, e)))?;
    let local_addr = listener.local_addr()?;
    logger.info(&format!(
        "Web server listening at http://{}:{} (API /api, docs /docs)",
        local_addr.ip(),
        local_addr.port()
    ));

    axum::serve(listener, router)
        .await
        .map_err(|e| HoraeError::web(format!("Server stopped: {}", e)))?;
    Ok(())
}
