//! Dashboard HTTP API
//!
//! Serves the web dashboard and its JSON endpoints: runtime config edits,
//! answer polling, quick commands, text command injection, hardware
//! readouts, and an SSE relay of streaming reply tokens.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event as SseEvent, KeepAlive, Sse};
use axum::response::Html;
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::Stream;
use serde::Deserialize;
use tokio::net::TcpListener;
use tokio::sync::{RwLock, broadcast};
use tokio_stream::StreamExt;
use tokio_stream::wrappers::BroadcastStream;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::coordinator::CoordinatorHandle;
use crate::hardware::HardwareBus;
use crate::store::{ConfigStore, Value, keys};
use crate::{Error, Result};

/// Quick commands seeded on startup
const DEFAULT_QUICK_COMMANDS: &[&str] = &["wake", "终止程序"];

/// Shared state for API handlers
#[derive(Clone)]
pub struct ApiState {
    pub store: Arc<ConfigStore>,
    pub coordinator: CoordinatorHandle,
    pub bus: Arc<dyn HardwareBus>,
    pub tokens: broadcast::Sender<String>,
    quick_commands: Arc<RwLock<Vec<String>>>,
    /// Last answer handed out by `/get_answer`, for change detection
    last_answer: Arc<Mutex<String>>,
}

impl ApiState {
    #[must_use]
    pub fn new(
        store: Arc<ConfigStore>,
        coordinator: CoordinatorHandle,
        bus: Arc<dyn HardwareBus>,
        tokens: broadcast::Sender<String>,
    ) -> Self {
        Self {
            store,
            coordinator,
            bus,
            tokens,
            quick_commands: Arc::new(RwLock::new(
                DEFAULT_QUICK_COMMANDS.iter().map(ToString::to_string).collect(),
            )),
            last_answer: Arc::new(Mutex::new(String::new())),
        }
    }
}

/// Dashboard API server
pub struct ApiServer {
    state: ApiState,
    port: u16,
    static_dir: Option<PathBuf>,
}

impl ApiServer {
    #[must_use]
    pub fn new(state: ApiState, port: u16, static_dir: Option<PathBuf>) -> Self {
        Self {
            state,
            port,
            static_dir,
        }
    }

    /// Build the router with all routes
    #[must_use]
    pub fn router(&self) -> Router {
        let mut router = Router::new()
            .route("/update_config", post(update_config))
            .route("/get_answer", get(get_answer))
            .route("/get_quick_commands", get(get_quick_commands))
            .route("/add_quick_command", post(add_quick_command))
            .route("/remove_quick_command", post(remove_quick_command))
            .route("/command", get(inject_command))
            .route("/api/sensor_data", get(sensor_data))
            .route("/api/device_status", get(device_status))
            .route("/api/control_device", post(control_device))
            .route("/api/stream_response", get(stream_response))
            .with_state(self.state.clone());

        if let Some(static_dir) = &self.static_dir {
            tracing::info!(path = %static_dir.display(), "serving dashboard files");
            router = router.fallback_service(ServeDir::new(static_dir));
        } else {
            router = router.route("/", get(fallback_page));
        }

        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
        router.layer(cors).layer(TraceLayer::new_for_http())
    }

    /// Run the server until the process exits
    ///
    /// # Errors
    ///
    /// Returns error if the server fails to bind or run
    pub async fn run(self) -> Result<()> {
        let addr = format!("0.0.0.0:{}", self.port);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| Error::Config(format!("failed to bind dashboard server: {e}")))?;
        tracing::info!(port = self.port, "dashboard server listening");

        axum::serve(listener, self.router())
            .await
            .map_err(|e| Error::Config(format!("dashboard server error: {e}")))?;
        Ok(())
    }

    /// Run the server in a background task
    #[must_use]
    pub fn spawn(self) -> tokio::task::JoinHandle<Result<()>> {
        tokio::spawn(async move { self.run().await })
    }
}

async fn fallback_page() -> Html<&'static str> {
    Html(
        "<!doctype html><html><head><meta charset=\"utf-8\"><title>hearth</title></head>\
         <body><h1>hearth</h1><p>Voice assistant is running. No dashboard files configured.</p>\
         </body></html>",
    )
}

/// Apply dashboard edits to the runtime store
///
/// String values are coerced to bool/float heuristically; keys outside the
/// dashboard allow-list are dropped.
async fn update_config(
    State(state): State<ApiState>,
    Json(body): Json<HashMap<String, serde_json::Value>>,
) -> Json<serde_json::Value> {
    let mut applied = Vec::new();
    let mut rejected = Vec::new();

    for (key, raw) in body {
        if !state.store.is_dashboard_writable(&key) {
            tracing::warn!(key = %key, "dashboard write to non-writable key rejected");
            rejected.push(key);
            continue;
        }
        match coerce(&raw) {
            Some(value) => applied.push((key, value)),
            None => {
                tracing::warn!(key = %key, "uncoercible dashboard value rejected");
                rejected.push(key);
            }
        }
    }

    let applied_keys: Vec<String> = applied.iter().map(|(k, _)| k.clone()).collect();
    state.store.set_many(applied);
    Json(serde_json::json!({
        "status": "ok",
        "applied": applied_keys,
        "rejected": rejected,
    }))
}

/// Latest answer text, or null when unchanged since the last poll
async fn get_answer(State(state): State<ApiState>) -> Json<Option<String>> {
    let answer = state.store.get_str(keys::ANSWER);
    let mut last = state.last_answer.lock().expect("last answer lock");
    if *last == answer {
        return Json(None);
    }
    *last = answer.clone();
    Json(Some(answer))
}

async fn get_quick_commands(State(state): State<ApiState>) -> Json<Vec<String>> {
    Json(state.quick_commands.read().await.clone())
}

#[derive(Deserialize)]
struct QuickCommandBody {
    command: String,
}

async fn add_quick_command(
    State(state): State<ApiState>,
    Json(body): Json<QuickCommandBody>,
) -> (StatusCode, Json<Vec<String>>) {
    let command = body.command.trim().to_string();
    if command.is_empty() {
        return (StatusCode::BAD_REQUEST, Json(Vec::new()));
    }
    let mut commands = state.quick_commands.write().await;
    if !commands.contains(&command) {
        commands.push(command);
    }
    (StatusCode::OK, Json(commands.clone()))
}

async fn remove_quick_command(
    State(state): State<ApiState>,
    Json(body): Json<QuickCommandBody>,
) -> Json<Vec<String>> {
    let mut commands = state.quick_commands.write().await;
    commands.retain(|c| c != &body.command);
    Json(commands.clone())
}

#[derive(Deserialize)]
struct CommandQuery {
    words: String,
}

/// Inject free text as if it had been spoken
async fn inject_command(
    State(state): State<ApiState>,
    Query(query): Query<CommandQuery>,
) -> (StatusCode, Json<serde_json::Value>) {
    let words = query.words.trim();
    if words.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({"error": "empty command"})),
        );
    }
    tracing::info!(words = %words, "command injected from dashboard");
    state.store.set(keys::COMMAND, words);
    (StatusCode::OK, Json(serde_json::json!({"status": "ok"})))
}

async fn sensor_data(State(state): State<ApiState>) -> Json<serde_json::Value> {
    match state.bus.sensor_snapshot() {
        Some(snapshot) => Json(serde_json::json!({
            "temperature": snapshot.temperature,
            "humidity": snapshot.humidity,
            "updated_at": snapshot.updated_at.to_rfc3339(),
        })),
        None => Json(serde_json::json!({
            "temperature": null,
            "humidity": null,
            "updated_at": null,
        })),
    }
}

async fn device_status(State(state): State<ApiState>) -> Json<serde_json::Value> {
    let status = state.bus.device_status();
    Json(serde_json::json!({
        "led": {"on": status.led_on, "brightness": status.led_brightness},
        "buzzer": {"on": status.buzzer_on},
    }))
}

#[derive(Deserialize)]
struct ControlDeviceBody {
    device: String,
    #[serde(default)]
    state: Option<bool>,
    #[serde(default)]
    brightness: Option<u8>,
}

async fn control_device(
    State(state): State<ApiState>,
    Json(body): Json<ControlDeviceBody>,
) -> (StatusCode, Json<serde_json::Value>) {
    let result = match (body.device.as_str(), body.state, body.brightness) {
        ("led", _, Some(brightness)) if (1..=100).contains(&brightness) => {
            state.bus.set_led_brightness(brightness)
        }
        ("led", Some(on), None) => state.bus.set_led(on),
        ("buzzer", Some(on), None) => state.bus.set_buzzer(on),
        _ => {
            return (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({"error": "unknown device or missing state"})),
            );
        }
    };

    match result {
        Ok(()) => (StatusCode::OK, Json(serde_json::json!({"status": "ok"}))),
        Err(e) => {
            tracing::error!(error = %e, device = %body.device, "device control failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({"error": e.to_string()})),
            )
        }
    }
}

/// SSE relay of streaming reply tokens
async fn stream_response(
    State(state): State<ApiState>,
) -> Sse<impl Stream<Item = std::result::Result<SseEvent, std::convert::Infallible>>> {
    let stream = BroadcastStream::new(state.tokens.subscribe()).filter_map(|token| match token {
        Ok(token) => Some(Ok(SseEvent::default().data(token))),
        // Lagging dashboards just miss tokens
        Err(_) => None,
    });
    Sse::new(stream).keep_alive(KeepAlive::default())
}

/// Heuristic JSON-to-store coercion for dashboard values
fn coerce(raw: &serde_json::Value) -> Option<Value> {
    match raw {
        serde_json::Value::Bool(b) => Some(Value::Bool(*b)),
        serde_json::Value::Number(n) => n.as_f64().map(Value::Float),
        serde_json::Value::String(s) => Some(coerce_str(s)),
        _ => None,
    }
}

fn coerce_str(s: &str) -> Value {
    match s.trim().to_ascii_lowercase().as_str() {
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        trimmed => trimmed
            .parse::<f64>()
            .map_or_else(|_| Value::Str(s.to_string()), Value::Float),
    }
}
