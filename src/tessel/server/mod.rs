// SPDX-License-Identifier: MIT

use axum::{
    extract::State,
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    routing::{get, post},
    Json, Router,
};
use futures::stream::Stream;
use serde::Deserialize;
use serde_json::{json, Value};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::sdk::error::TesselError;
use crate::tessel::workflow::builder::Builder;
use crate::tessel::workflow::events::WorkflowEvent;
use crate::tessel::workflow::graph::{ValidationResult, Workflow};
use crate::tessel::workflow::registry::StepRegistry;
use crate::tessel::workflow::runner::WorkflowRunner;
use crate::tessel::workflow::types::WorkflowDefinition;

type ApiError = (StatusCode, Json<Value>);

#[derive(Clone)]
pub struct AppState {
    builder: Arc<Builder>,
    runner: WorkflowRunner,
}

impl AppState {
    pub fn new(registry: StepRegistry, runner: WorkflowRunner) -> Self {
        Self {
            builder: Arc::new(Builder::new(registry)),
            runner,
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health_check))
        .route("/api/steps", get(list_steps))
        .route("/api/workflows/validate", post(validate_workflow))
        .route("/api/executions", post(create_execution))
        .route("/api/executions/stream", post(stream_execution))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn serve(port: u16, state: AppState) -> Result<(), TesselError> {
    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    log::info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router(state)).await?;

    Ok(())
}

async fn health_check() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn list_steps(State(state): State<AppState>) -> Json<Value> {
    Json(json!(state.builder.registry().kinds().await))
}

async fn validate_workflow(
    State(state): State<AppState>,
    Json(def): Json<WorkflowDefinition>,
) -> Result<Json<ValidationResult>, ApiError> {
    let workflow = build(&state, &def).await?;
    Ok(Json(workflow.validate()))
}

#[derive(Deserialize)]
struct ExecutionRequest {
    workflow: WorkflowDefinition,
    #[serde(default)]
    input: Value,
}

async fn create_execution(
    State(state): State<AppState>,
    Json(payload): Json<ExecutionRequest>,
) -> Result<Json<Value>, ApiError> {
    let workflow = build(&state, &payload.workflow).await?;

    match state
        .runner
        .run(workflow, payload.input, CancellationToken::new())
        .await
    {
        Ok(execution) => Ok(Json(json!({ "status": "completed", "execution": execution }))),
        Err(e) => match e.execution() {
            Some(execution) => Ok(Json(json!({
                "status": execution.status,
                "error": e.to_string(),
                "execution": execution,
            }))),
            None => Err(error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())),
        },
    }
}

async fn stream_execution(
    State(state): State<AppState>,
    Json(payload): Json<ExecutionRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let workflow = build(&state, &payload.workflow).await?;
    log::info!(
        "Starting streaming execution for workflow: {}",
        workflow.metadata.name
    );

    // The run is cancelled once the client goes away and the stream is dropped
    let cancel = CancellationToken::new();
    let guard = cancel.clone().drop_guard();
    let events = state.runner.run_stream(workflow, payload.input, cancel);

    let stream = events.map(move |event| {
        let _guard = &guard;
        Ok::<_, Infallible>(to_sse(&event))
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(1))))
}

async fn build(state: &AppState, def: &WorkflowDefinition) -> Result<Arc<Workflow>, ApiError> {
    state
        .builder
        .build(def)
        .await
        .map(Arc::new)
        .map_err(|e| {
            log::warn!("Rejected workflow '{}': {}", def.metadata.name, e);
            error(StatusCode::BAD_REQUEST, e.to_string())
        })
}

fn to_sse(event: &WorkflowEvent) -> Event {
    match Event::default().event(event.event_type()).json_data(event) {
        Ok(sse) => sse,
        Err(e) => Event::default().event("error").data(e.to_string()),
    }
}

fn error(status: StatusCode, message: String) -> ApiError {
    (status, Json(json!({ "error": message })))
}
