use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use clap::Parser;
use futures_util::{Stream, StreamExt};
use gantry_dispatch::{ProtocolDispatcher, ResourceEntry};
use gantry_protocol::{TaskId, TaskProgress, TaskUpdate};
use gantry_tasks::{TaskManager, TaskManagerConfig};
use gantry_tools::builtin::{DelayTool, EchoTool};
use gantry_tools::{TimeoutPolicy, ToolRegistry};
use serde::Serialize;
use serde_json::{Value, json};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

#[derive(Debug, Parser)]
#[command(name = "gantry-api")]
#[command(about = "Gantry tool-calling API")]
struct Cli {
    #[arg(long, default_value = "127.0.0.1:8790")]
    listen: SocketAddr,
    /// Hard capacity bound on the task store.
    #[arg(long, default_value_t = 1000)]
    max_tasks: usize,
    #[arg(long, default_value_t = 60)]
    sweep_interval_secs: u64,
    #[arg(long, default_value_t = 30)]
    fast_timeout_secs: u64,
    #[arg(long, default_value_t = 1200)]
    compute_timeout_secs: u64,
}

#[derive(Clone)]
struct AppState {
    dispatcher: ProtocolDispatcher,
    tasks: Arc<TaskManager>,
}

#[derive(Debug, Serialize)]
struct CreateTaskResponse {
    task_id: TaskId,
}

#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn not_found(error: impl std::fmt::Display) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
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

    let registry = Arc::new(ToolRegistry::new(TimeoutPolicy {
        fast: Duration::from_secs(cli.fast_timeout_secs),
        compute: Duration::from_secs(cli.compute_timeout_secs),
    }));
    registry.register(Arc::new(EchoTool));
    registry.register(Arc::new(DelayTool));

    let dispatcher = ProtocolDispatcher::new(registry);
    dispatcher.resources().register(
        ResourceEntry::text_resource(
            "gantry://about",
            "about",
            "Gantry tool-calling server with task progress streaming",
        )
        .with_description("Server self-description"),
    );

    let tasks = Arc::new(TaskManager::new(TaskManagerConfig {
        max_tasks: cli.max_tasks,
        ..TaskManagerConfig::default()
    }));
    let _sweeper = tasks
        .clone()
        .spawn_sweeper(Duration::from_secs(cli.sweep_interval_secs));

    let state = AppState { dispatcher, tasks };

    let app = Router::new()
        .route("/healthz", get(healthz))
        .route("/rpc", post(rpc))
        .route("/tasks", post(create_task).get(list_tasks))
        .route(
            "/tasks/{task_id}",
            get(get_task).post(update_task).delete(cleanup_task),
        )
        .route("/tasks/{task_id}/cancel", post(cancel_task))
        .route("/tasks/{task_id}/events", get(stream_task_events))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(cli.listen).await?;
    info!(listen = %cli.listen, "gantry-api listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn healthz() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "gantry-api"
    }))
}

/// Protocol endpoint: accepts a single envelope or a batch array.
/// Notification-only input yields 204 No Content — no response frame is
/// ever emitted for a notification.
async fn rpc(State(state): State<AppState>, Json(raw): Json<Value>) -> Response {
    match raw {
        Value::Array(batch) => {
            let responses = state.dispatcher.handle_batch(batch).await;
            if responses.is_empty() {
                StatusCode::NO_CONTENT.into_response()
            } else {
                Json(responses).into_response()
            }
        }
        single => match state.dispatcher.handle_value(single).await {
            Some(response) => Json(response).into_response(),
            None => StatusCode::NO_CONTENT.into_response(),
        },
    }
}

async fn create_task(State(state): State<AppState>) -> Json<CreateTaskResponse> {
    let task_id = state.tasks.create();
    Json(CreateTaskResponse { task_id })
}

async fn list_tasks(State(state): State<AppState>) -> Json<Vec<TaskProgress>> {
    Json(state.tasks.list())
}

async fn get_task(
    Path(task_id): Path<String>,
    State(state): State<AppState>,
) -> ApiResult<Json<TaskProgress>> {
    let task_id = TaskId::from_string(task_id);
    state
        .tasks
        .get(&task_id)
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("task not found: {task_id}")))
}

async fn update_task(
    Path(task_id): Path<String>,
    State(state): State<AppState>,
    Json(update): Json<TaskUpdate>,
) -> ApiResult<Json<TaskProgress>> {
    let task_id = TaskId::from_string(task_id);
    let snapshot = state
        .tasks
        .update(&task_id, update)
        .map_err(ApiError::not_found)?;
    Ok(Json(snapshot))
}

async fn cancel_task(
    Path(task_id): Path<String>,
    State(state): State<AppState>,
) -> ApiResult<Json<Value>> {
    let task_id = TaskId::from_string(task_id);
    let cancelled = state
        .tasks
        .cancel(&task_id)
        .map_err(ApiError::not_found)?;
    Ok(Json(json!({ "cancelled": cancelled })))
}

async fn cleanup_task(
    Path(task_id): Path<String>,
    State(state): State<AppState>,
) -> ApiResult<StatusCode> {
    let task_id = TaskId::from_string(task_id);
    if state.tasks.cleanup(&task_id) {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::not_found(format!("task not found: {task_id}")))
    }
}

/// SSE progress stream: the first frame replays the current snapshot, live
/// updates follow, and the stream ends once a terminal snapshot has been
/// delivered. Keep-alive comment frames cover idle gaps.
async fn stream_task_events(
    Path(task_id): Path<String>,
    State(state): State<AppState>,
) -> ApiResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    let task_id = TaskId::from_string(task_id);
    let snapshots = state
        .tasks
        .subscribe(&task_id)
        .map_err(ApiError::not_found)?;

    let stream = snapshots.map(|snapshot| Ok(as_sse_event("progress", &snapshot)));

    Ok(Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15))))
}

fn as_sse_event(event_name: &str, snapshot: &TaskProgress) -> Event {
    let payload = serde_json::to_string(snapshot)
        .unwrap_or_else(|error| json!({ "error": error.to_string() }).to_string());
    Event::default().event(event_name).data(payload)
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sse_event_carries_the_snapshot_payload() {
        let snapshot = TaskProgress::new(TaskId::from_string("t1"));
        // Event's builder panics on invalid payloads; constructing one is
        // the contract being checked here.
        let _event = as_sse_event("progress", &snapshot);
    }
}
