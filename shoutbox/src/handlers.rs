//! HTTP surface: translates requests into repository calls.
//!
//! Every failure answers 500 with a message naming the stage that failed.

use std::sync::Arc;

use anyhow::anyhow;
use axum::{
    body::Bytes,
    extract::{rejection::BytesRejection, Path, State},
    http::{
        header::{CONTENT_TYPE, LOCATION},
        StatusCode,
    },
    response::{Html, IntoResponse, Response},
    routing::get,
    Router,
};
use tracing::warn;

use crate::error::{parse_id, ShoutError};
use crate::pipeline::{self, UserName};
use crate::repository::ShoutRepository;

const JSON_UTF8: &str = "application/json; charset=utf-8";
const UI_TEMPLATE: &str = include_str!("../assets/index.html");
const UI_API_PLACEHOLDER: &str = "{{API}}";

/// Dependencies shared by every handler.
#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<ShoutRepository>,
    /// Public base URL of the API, handed to the UI page.
    pub api: String,
}

impl AppState {
    pub fn new(repo: Arc<ShoutRepository>, api: impl Into<String>) -> Self {
        Self {
            repo,
            api: api.into(),
        }
    }
}

/// Builds the full application: API routes (bare and under `/api`), the UI
/// page, and the request pipeline around all of it.
pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route(
            "/information/",
            get(list_information).post(post_information),
        )
        .route(
            "/information/:id/",
            get(get_information)
                .put(update_information)
                .delete(delete_information),
        )
        .route("/whoami/", get(who_am_i));

    let app = Router::new()
        .merge(api.clone())
        .nest("/api", api)
        .route("/ui/", get(render_ui))
        .route("/", get(redirect_to_ui))
        .with_state(state);

    pipeline::layer(app)
}

#[derive(Debug, Clone, Copy)]
enum Stage {
    List,
    ParseId,
    ReadBody,
    Fetch,
    Save,
    Delete,
    Render,
}

impl Stage {
    fn message(self) -> &'static str {
        match self {
            Stage::List => "Internal Server Error",
            Stage::ParseId => "Internal Server Error while parsing ID",
            Stage::ReadBody => "Internal Server Error while reading body",
            Stage::Fetch => "Internal Server Error while fetching from DB",
            Stage::Save => "Internal Server Error while saving to DB",
            Stage::Delete => "Internal Server Error while deleting from DB",
            Stage::Render => "Internal Server Error while rendering to json",
        }
    }
}

struct Failure {
    stage: Stage,
    error: anyhow::Error,
}

impl IntoResponse for Failure {
    fn into_response(self) -> Response {
        warn!(stage = ?self.stage, error = %self.error, "request failed");
        (StatusCode::INTERNAL_SERVER_ERROR, self.stage.message()).into_response()
    }
}

fn at<E>(stage: Stage) -> impl FnOnce(E) -> Failure
where
    E: Into<anyhow::Error>,
{
    move |err| Failure {
        stage,
        error: err.into(),
    }
}

/// Runs a blocking repository call off the async workers.
///
/// A panic inside `op` is resumed on the calling task so the pipeline's
/// recovery stage handles it like any other handler panic.
async fn run_blocking<T, F>(op: F) -> anyhow::Result<T>
where
    F: FnOnce() -> Result<T, ShoutError> + Send + 'static,
    T: Send + 'static,
{
    match tokio::task::spawn_blocking(op).await {
        Ok(result) => Ok(result?),
        Err(err) => match err.try_into_panic() {
            Ok(payload) => std::panic::resume_unwind(payload),
            Err(err) => Err(anyhow!(err).context("repository task was cancelled")),
        },
    }
}

fn json(body: impl Into<axum::body::Body>) -> Response {
    ([(CONTENT_TYPE, JSON_UTF8)], body.into()).into_response()
}

fn json_id(id: u64) -> Response {
    json(id.to_string())
}

fn body_text(body: Result<Bytes, BytesRejection>) -> Result<String, Failure> {
    let body = body.map_err(at(Stage::ReadBody))?;
    String::from_utf8(body.to_vec()).map_err(at(Stage::ReadBody))
}

async fn list_information(State(state): State<AppState>) -> Result<Response, Failure> {
    let repo = Arc::clone(&state.repo);
    let ids = run_blocking(move || repo.list())
        .await
        .map_err(at(Stage::List))?;
    let body = serde_json::to_vec(&ids).map_err(at(Stage::List))?;
    Ok(json(body))
}

async fn get_information(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
) -> Result<Response, Failure> {
    let id = parse_id(&raw_id).map_err(at(Stage::ParseId))?;
    let repo = Arc::clone(&state.repo);
    let shout = run_blocking(move || repo.get(id))
        .await
        .map_err(at(Stage::Fetch))?;
    let body = shout.encode().map_err(at(Stage::Render))?;
    Ok(json(body))
}

async fn post_information(
    State(state): State<AppState>,
    user: UserName,
    body: Result<Bytes, BytesRejection>,
) -> Result<Response, Failure> {
    let message = body_text(body)?;
    let repo = Arc::clone(&state.repo);
    let id = run_blocking(move || repo.save(user.as_str(), &message))
        .await
        .map_err(at(Stage::Save))?;
    Ok(json_id(id))
}

async fn update_information(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
    user: UserName,
    body: Result<Bytes, BytesRejection>,
) -> Result<Response, Failure> {
    let id = parse_id(&raw_id).map_err(at(Stage::ParseId))?;
    let message = body_text(body)?;
    let repo = Arc::clone(&state.repo);
    let id = run_blocking(move || repo.update(id, user.as_str(), &message))
        .await
        .map_err(at(Stage::Save))?;
    Ok(json_id(id))
}

async fn delete_information(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
) -> Result<Response, Failure> {
    let id = parse_id(&raw_id).map_err(at(Stage::ParseId))?;
    let repo = Arc::clone(&state.repo);
    let id = run_blocking(move || repo.delete(id))
        .await
        .map_err(at(Stage::Delete))?;
    Ok(json_id(id))
}

async fn who_am_i(user: UserName) -> String {
    user.0
}

async fn render_ui(State(state): State<AppState>) -> Html<String> {
    Html(UI_TEMPLATE.replace(UI_API_PLACEHOLDER, &state.api))
}

async fn redirect_to_ui() -> impl IntoResponse {
    (StatusCode::MOVED_PERMANENTLY, [(LOCATION, "/ui/")])
}
