use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::extract::{Path as AxumPath, State};
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use clap::Parser;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::net::TcpListener;
use tokio::sync::RwLock;
use tower_http::cors::CorsLayer;

use crate::*;

/// Arguments for running the local canvas editor API
#[derive(Debug, Clone, Parser)]
#[command(name = "flowcanvas serve", about = "Serve a canvas snapshot over a local editing API.")]
pub struct ServeArgs {
    /// Canvas snapshot to edit; created on the first save if missing.
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,

    /// Address to bind the HTTP server to.
    #[arg(long, default_value = "127.0.0.1")]
    pub host: String,

    /// Port to listen on.
    #[arg(long, default_value_t = 5151)]
    pub port: u16,

    /// Quiet period before edits are written back, in milliseconds.
    #[arg(long = "autosave-ms")]
    pub autosave_ms: Option<u64>,

    /// Background color for rendered SVG previews.
    #[arg(long = "background-color")]
    pub background_color: Option<String>,

    /// Render SVG previews with the dark theme.
    #[arg(long)]
    pub dark: bool,
}

pub struct ServeState {
    canvas: RwLock<CanvasController>,
    theme: Theme,
    background: Option<String>,
}

impl ServeState {
    pub fn new(controller: CanvasController, theme: Theme, background: Option<String>) -> Self {
        Self {
            canvas: RwLock::new(controller),
            theme,
            background,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct StatusPayload {
    revision: u64,
    dirty: bool,
    generating: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    save: Option<SaveStatus>,
}

impl StatusPayload {
    fn of(controller: &CanvasController) -> Self {
        Self {
            revision: controller.revision(),
            dirty: controller.is_dirty(),
            generating: controller.is_generating(),
            save: controller.save_status(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct CanvasPayload {
    canvas: CanvasState,
    status: StatusPayload,
}

#[derive(Debug, Clone, Serialize)]
struct CreatedPayload {
    id: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NewNodeRequest {
    #[serde(default)]
    x: f64,
    #[serde(default)]
    y: f64,
    text: Option<String>,
    style: Option<NodeStyle>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NodeUpdate {
    text: Option<String>,
    x: Option<f64>,
    y: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NewConnectionRequest {
    source_id: String,
    target_id: String,
    label: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct GenerateRequest {
    /// Either the raw response text or an already-parsed JSON document.
    response: Value,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeneratePayload {
    nodes: usize,
    connections: usize,
    fallback: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    notice: Option<String>,
}

pub fn router(state: Arc<ServeState>) -> Router {
    Router::new()
        .route("/api/canvas", get(get_canvas).put(put_canvas))
        .route("/api/canvas/svg", get(get_svg))
        .route("/api/canvas/status", get(get_status))
        .route("/api/canvas/nodes", post(post_node))
        .route("/api/canvas/nodes/:id", delete(delete_node).patch(patch_node))
        .route("/api/canvas/connections", post(post_connection))
        .route("/api/canvas/connections/:id", delete(delete_connection))
        .route("/api/canvas/generate/start", post(start_generation))
        .route(
            "/api/canvas/generate",
            post(complete_generation).delete(cancel_generation),
        )
        .with_state(state)
        .layer(CorsLayer::permissive())
}

pub async fn run_serve(args: ServeArgs) -> Result<()> {
    let mut config = EditorConfig::default();
    if let Some(ms) = args.autosave_ms {
        config.autosave_delay = Duration::from_millis(ms);
    }
    if args.dark {
        config.dark_mode = true;
    }

    let store = FileStore::new(&args.input);
    let mut controller = CanvasController::from_config(&config);
    if let Some(snapshot) = store.load().await? {
        controller
            .load_snapshot(&snapshot)
            .with_context(|| format!("failed to load canvas from '{}'", args.input.display()))?;
    }
    controller.attach_autosave(AutosaveHandle::spawn(store, config.autosave_delay));

    let state = Arc::new(ServeState::new(
        controller,
        config.theme(),
        args.background_color.clone(),
    ));
    let app = router(state.clone());

    let addr = format!("{}:{}", args.host, args.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind HTTP server to {addr}"))?;

    println!("flowcanvas server listening on http://{addr}");
    println!("Editing {}", args.input.display());
    println!("Press Ctrl+C to stop.");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
        .context("HTTP server error")?;

    let autosave = state.canvas.write().await.detach_autosave();
    if let Some(autosave) = autosave {
        if let SaveStatus::Failed { message, .. } = autosave.shutdown().await {
            eprintln!("Last save failed: {message}");
        }
    }

    Ok(())
}

async fn get_canvas(State(state): State<Arc<ServeState>>) -> Json<CanvasPayload> {
    let canvas = state.canvas.read().await;
    Json(CanvasPayload {
        canvas: canvas.state().clone(),
        status: StatusPayload::of(&canvas),
    })
}

async fn put_canvas(
    State(state): State<Arc<ServeState>>,
    Json(snapshot): Json<CanvasState>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    state
        .canvas
        .write()
        .await
        .replace_state(snapshot)
        .map_err(canvas_error)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn get_status(State(state): State<Arc<ServeState>>) -> Json<StatusPayload> {
    Json(StatusPayload::of(&*state.canvas.read().await))
}

async fn get_svg(State(state): State<Arc<ServeState>>) -> Result<Response, (StatusCode, String)> {
    let svg = {
        let canvas = state.canvas.read().await;
        render_svg(canvas.state(), &state.theme, state.background.as_deref())
            .map_err(internal_error)?
    };

    let mut response = Response::new(svg.into());
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("image/svg+xml"),
    );
    Ok(response)
}

async fn post_node(
    State(state): State<Arc<ServeState>>,
    Json(request): Json<NewNodeRequest>,
) -> impl IntoResponse {
    let id = state.canvas.write().await.add_node(
        request.x,
        request.y,
        request.text.as_deref(),
        request.style,
    );
    (StatusCode::CREATED, Json(CreatedPayload { id }))
}

async fn patch_node(
    State(state): State<Arc<ServeState>>,
    AxumPath(node_id): AxumPath<String>,
    Json(update): Json<NodeUpdate>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let mut canvas = state.canvas.write().await;
    let (x, y) = canvas
        .state()
        .node(&node_id)
        .map(|node| (node.x, node.y))
        .ok_or_else(|| canvas_error(CanvasError::UnknownNode(node_id.clone())))?;

    if let Some(text) = &update.text {
        canvas.set_node_text(&node_id, text).map_err(canvas_error)?;
    }
    if update.x.is_some() || update.y.is_some() {
        canvas
            .move_node(&node_id, update.x.unwrap_or(x), update.y.unwrap_or(y))
            .map_err(canvas_error)?;
    }
    Ok(StatusCode::NO_CONTENT)
}

async fn delete_node(
    State(state): State<Arc<ServeState>>,
    AxumPath(node_id): AxumPath<String>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    state
        .canvas
        .write()
        .await
        .remove_node(&node_id)
        .map_err(canvas_error)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn post_connection(
    State(state): State<Arc<ServeState>>,
    Json(request): Json<NewConnectionRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let id = state
        .canvas
        .write()
        .await
        .add_connection(&request.source_id, &request.target_id, request.label)
        .map_err(canvas_error)?;
    Ok((StatusCode::CREATED, Json(CreatedPayload { id })))
}

async fn delete_connection(
    State(state): State<Arc<ServeState>>,
    AxumPath(connection_id): AxumPath<String>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    state
        .canvas
        .write()
        .await
        .remove_connection(&connection_id)
        .map_err(canvas_error)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn start_generation(
    State(state): State<Arc<ServeState>>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    state
        .canvas
        .write()
        .await
        .begin_generation()
        .map_err(canvas_error)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn complete_generation(
    State(state): State<Arc<ServeState>>,
    Json(request): Json<GenerateRequest>,
) -> Result<Json<GeneratePayload>, (StatusCode, String)> {
    let mut canvas = state.canvas.write().await;
    let diagram = match &request.response {
        Value::String(text) => canvas.complete_generation_text(text),
        other => canvas.complete_generation(other),
    }
    .map_err(canvas_error)?;

    Ok(Json(GeneratePayload {
        nodes: diagram.nodes.len(),
        connections: diagram.connections.len(),
        fallback: diagram.is_fallback(),
        notice: diagram.notice(),
    }))
}

async fn cancel_generation(State(state): State<Arc<ServeState>>) -> StatusCode {
    state.canvas.write().await.cancel_generation();
    StatusCode::NO_CONTENT
}

fn canvas_error(err: CanvasError) -> (StatusCode, String) {
    let status = match &err {
        CanvasError::UnknownNode(_) | CanvasError::UnknownConnection(_) => StatusCode::NOT_FOUND,
        CanvasError::DanglingReference { .. }
        | CanvasError::DuplicateId(_)
        | CanvasError::Serialization(_) => StatusCode::BAD_REQUEST,
        CanvasError::GenerationInProgress | CanvasError::GenerationNotStarted => {
            StatusCode::CONFLICT
        }
    };
    (status, err.to_string())
}

fn internal_error(err: anyhow::Error) -> (StatusCode, String) {
    (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
}
