//! Admin HTTP surface: configure/alerts/logs/health.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::middleware;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::auth::require_api_key;
use crate::error::{Result, SiemError};
use crate::metrics::MetricsCollector;
use crate::models::{Alert, Event};
use crate::pipeline::PipelineOrchestrator;
use crate::storage::StorageAdapter;

pub struct AppState {
    pub orchestrator: Arc<PipelineOrchestrator>,
    pub storage: Arc<StorageAdapter>,
    pub metrics: Arc<MetricsCollector>,
    pub api_key: String,
}

pub fn create_router(state: Arc<AppState>) -> Router {
    let protected = Router::new()
        .route("/configure", post(configure))
        .route("/alerts", get(get_alerts))
        .route("/logs", get(get_logs))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_api_key));

    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .merge(protected)
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()).layer(CorsLayer::permissive()))
        .with_state(state)
}

#[derive(Deserialize)]
struct ConfigureRequest {
    sources: Vec<String>,
}

#[derive(Serialize)]
struct ConfigureResponse {
    status: &'static str,
    sources: Vec<String>,
}

async fn configure(State(state): State<Arc<AppState>>, Json(request): Json<ConfigureRequest>) -> Result<Json<ConfigureResponse>> {
    state.orchestrator.stop_monitoring().await;
    state
        .orchestrator
        .initialize(request.sources.clone())
        .await
        .map_err(|e| SiemError::internal(e.to_string()))?;
    state
        .orchestrator
        .start_monitoring()
        .await
        .map_err(|e| SiemError::internal(e.to_string()))?;

    Ok(Json(ConfigureResponse {
        status: "ok",
        sources: request.sources,
    }))
}

#[derive(Deserialize)]
struct AlertsQuery {
    severity: Option<String>,
    time_range: Option<String>,
}

async fn get_alerts(State(state): State<Arc<AppState>>, Query(query): Query<AlertsQuery>) -> Result<Json<Vec<Alert>>> {
    if let Some(severity) = &query.severity {
        validate_severity(severity)?;
    }
    let time_range = query.time_range.as_deref().unwrap_or("1h");
    validate_time_range(time_range)?;

    // Alerts are emitted through the configured AlertSink(s), not retained
    // in storage for query; the admin surface exposes the most recent
    // stored events instead, filtered by severity and time range. The time
    // filter is driven through the query itself (a range query, which
    // matches every document in range) rather than an empty text search
    // post-filtered in memory. An empty `multi_match` tokenizes to zero
    // terms and matches nothing.
    let cutoff = Utc::now() - time_range_duration(time_range);
    let events = state.storage.query_range(cutoff, 100).await;

    let alerts: Vec<Alert> = events
        .iter()
        .filter(|e| query.severity.as_deref().map(|s| severity_matches(e, s)).unwrap_or(true))
        .map(Alert::from_event_anomaly)
        .take(100)
        .collect();

    Ok(Json(alerts))
}

fn severity_matches(event: &Event, requested: &str) -> bool {
    format!("{:?}", event.severity).eq_ignore_ascii_case(requested)
}

fn validate_severity(severity: &str) -> Result<()> {
    const VALID: &[&str] = &["low", "medium", "high", "critical", "unknown"];
    if VALID.contains(&severity.to_lowercase().as_str()) {
        Ok(())
    } else {
        Err(SiemError::validation(format!("unknown severity: {}", severity)))
    }
}

fn validate_time_range(time_range: &str) -> Result<()> {
    if time_range_duration_opt(time_range).is_some() {
        Ok(())
    } else {
        Err(SiemError::validation(format!("unknown time_range: {}", time_range)))
    }
}

fn time_range_duration_opt(time_range: &str) -> Option<chrono::Duration> {
    match time_range {
        "1h" => Some(chrono::Duration::hours(1)),
        "6h" => Some(chrono::Duration::hours(6)),
        "24h" => Some(chrono::Duration::hours(24)),
        "7d" => Some(chrono::Duration::days(7)),
        _ => None,
    }
}

fn time_range_duration(time_range: &str) -> chrono::Duration {
    time_range_duration_opt(time_range).unwrap_or_else(|| chrono::Duration::hours(1))
}

#[derive(Deserialize)]
struct LogsQuery {
    query: Option<String>,
    size: Option<usize>,
}

async fn get_logs(State(state): State<Arc<AppState>>, Query(query): Query<LogsQuery>) -> Result<Json<Vec<Event>>> {
    let size = query.size.unwrap_or(50);
    let query_text = query.query.unwrap_or_default();
    let mut events = state.storage.search(&query_text, size).await;
    events.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    Ok(Json(events))
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    monitoring: bool,
    storage_reachable: bool,
}

async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let monitoring = state.orchestrator.state() == crate::pipeline::LifecycleState::Running;
    let storage_reachable = state.orchestrator.is_storage_reachable().await;
    let status = if monitoring && storage_reachable { "healthy" } else { "degraded" };

    Json(HealthResponse {
        status,
        monitoring,
        storage_reachable,
    })
}

async fn metrics(State(state): State<Arc<AppState>>) -> String {
    state.metrics.export()
}
