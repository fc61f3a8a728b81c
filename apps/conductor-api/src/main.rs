use std::convert::Infallible;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_stream::stream;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use clap::Parser;
use conductor_events::JsonlFileSink;
use conductor_kernel::{Conductor, ConductorConfig};
use conductor_protocol::{
    CapabilityInventory, ConductorError, ConductorSnapshot, EventEnvelope, ModuleId,
    ModuleRegistration, MountViewRequest, MountedViewResult, PortSignal, RegisteredModule,
    StoreMetrics, SwapMode, SwapPlan, ValidationOutcome, WiringEdge,
};
use futures_util::Stream;
use indexmap::IndexMap;
use serde::Deserialize;
use serde_json::json;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

#[derive(Debug, Parser)]
#[command(name = "conductor-api")]
#[command(about = "Conductor control-plane API")]
struct Cli {
    #[arg(long, default_value = "127.0.0.1:8788")]
    listen: SocketAddr,
    /// Engine config (JSON `ConductorConfig`); defaults when absent.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Mirror every event to this JSONL file.
    #[arg(long)]
    trace_file: Option<PathBuf>,
}

#[derive(Clone)]
struct AppState {
    conductor: Conductor,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct DiscoverRequest {
    module_id: Option<ModuleId>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SwapRequest {
    from_module_id: ModuleId,
    to_module_id: ModuleId,
    #[serde(default)]
    mode: SwapMode,
}

#[derive(Debug, Deserialize, Default)]
struct TraceQuery {
    limit: Option<usize>,
}

#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
}

impl From<ConductorError> for ApiError {
    fn from(error: ConductorError) -> Self {
        let status = match &error {
            ConductorError::Validation { .. } => StatusCode::BAD_REQUEST,
            ConductorError::Remote { .. } => StatusCode::BAD_GATEWAY,
            ConductorError::ModuleRejected { .. } | ConductorError::WiringRejected(_) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            error if error.is_referential() => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            message: error.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .json()
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => {
            let text = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("failed reading config {}", path.display()))?;
            serde_json::from_str(&text)
                .with_context(|| format!("invalid conductor config {}", path.display()))?
        }
        None => ConductorConfig::default(),
    };

    let mut builder = Conductor::builder().config(config);
    if let Some(trace_file) = &cli.trace_file {
        builder = builder.sink(Arc::new(JsonlFileSink::new(trace_file)));
    }
    let conductor = builder.build();
    let state = AppState {
        conductor: conductor.clone(),
    };

    let listener = tokio::net::TcpListener::bind(cli.listen).await?;
    info!(listen = %cli.listen, "conductor-api listening");

    axum::serve(listener, app(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    conductor.close().await;
    Ok(())
}

fn app(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/state", get(get_state))
        .route("/metrics", get(metrics))
        .route("/trace", get(trace))
        .route("/modules", post(register_module))
        .route("/discover", post(discover))
        .route("/views", post(mount_view))
        .route("/wiring", post(connect_ports))
        .route("/wiring/validate", post(validate_wiring))
        .route("/swap", post(swap_module))
        .route("/signals", post(emit_signal))
        .route("/validation-outcomes", post(report_outcome))
        .route("/events/stream", get(stream_events))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

async fn healthz() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "service": "conductor-api"
    }))
}

async fn get_state(State(state): State<AppState>) -> Json<ConductorSnapshot> {
    Json(state.conductor.get_state().as_ref().clone())
}

async fn metrics(State(state): State<AppState>) -> Json<StoreMetrics> {
    Json(state.conductor.metrics())
}

async fn trace(
    Query(query): Query<TraceQuery>,
    State(state): State<AppState>,
) -> Json<Vec<EventEnvelope>> {
    let limit = query.limit.map(|limit| limit.clamp(1, 5000));
    Json(state.conductor.get_trace(limit))
}

async fn register_module(
    State(state): State<AppState>,
    Json(registration): Json<ModuleRegistration>,
) -> ApiResult<Json<RegisteredModule>> {
    Ok(Json(state.conductor.register_module(registration).await?))
}

async fn discover(
    State(state): State<AppState>,
    body: Option<Json<DiscoverRequest>>,
) -> ApiResult<Json<IndexMap<ModuleId, CapabilityInventory>>> {
    let request = body.map(|Json(request)| request).unwrap_or_default();
    let discovered = state
        .conductor
        .discover_capabilities(request.module_id.as_ref())
        .await?;
    Ok(Json(discovered))
}

async fn mount_view(
    State(state): State<AppState>,
    Json(request): Json<MountViewRequest>,
) -> ApiResult<Json<MountedViewResult>> {
    Ok(Json(state.conductor.mount_view(request).await?))
}

async fn connect_ports(
    State(state): State<AppState>,
    Json(edge): Json<WiringEdge>,
) -> ApiResult<Json<WiringEdge>> {
    Ok(Json(state.conductor.connect_ports(edge)?))
}

async fn validate_wiring(
    State(state): State<AppState>,
    Json(edge): Json<WiringEdge>,
) -> Json<Vec<ValidationOutcome>> {
    Json(state.conductor.validate_wiring_edge(&edge, None))
}

async fn swap_module(
    State(state): State<AppState>,
    Json(request): Json<SwapRequest>,
) -> ApiResult<Json<SwapPlan>> {
    let plan = state
        .conductor
        .swap_module(&request.from_module_id, &request.to_module_id, request.mode)
        .await?;
    Ok(Json(plan))
}

async fn emit_signal(
    State(state): State<AppState>,
    Json(signal): Json<PortSignal>,
) -> ApiResult<Json<serde_json::Value>> {
    let actions = state.conductor.emit_port_event(signal).await?;
    Ok(Json(json!({ "actions": actions })))
}

async fn report_outcome(
    State(state): State<AppState>,
    Json(outcome): Json<ValidationOutcome>,
) -> ApiResult<(StatusCode, Json<EventEnvelope>)> {
    let event = state.conductor.report_validation_outcome(outcome)?;
    Ok((StatusCode::CREATED, Json(event)))
}

async fn stream_events(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let mut subscription = state.conductor.subscribe_events();
    let stream = stream! {
        loop {
            match subscription.recv().await {
                Ok(event) => yield Ok(as_sse_event(&event)),
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "event stream subscriber lagged");
                    let lag_payload = json!({ "skipped": skipped }).to_string();
                    yield Ok(Event::default().event("stream.lagged").data(lag_payload));
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    };

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}

fn as_sse_event(event: &EventEnvelope) -> Event {
    let payload = serde_json::to_string(event)
        .unwrap_or_else(|error| json!({ "error": error.to_string() }).to_string());
    Event::default()
        .id(event.event_id.to_string())
        .event("conductor.event")
        .data(payload)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(error) = tokio::signal::ctrl_c().await {
            tracing::error!(%error, "failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    {
        let terminate = async {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut signal) => {
                    signal.recv().await;
                }
                Err(error) => {
                    tracing::error!(%error, "failed to install SIGTERM handler");
                }
            }
        };

        tokio::select! {
            _ = ctrl_c => {},
            _ = terminate => {},
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c.await;
    }
}
