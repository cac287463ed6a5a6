//! Coverage server: hosts source and content directories for the browser,
//! serves the coverage client script and stores uploaded coverage.
//!
//! Routes:
//! - `POST`/`PUT /coverage` stores one upload in the coverage directory
//! - `GET /coverage/client` returns the browser client, pre-wired to this server
//! - anything else is looked up in the mounted directories, longest route first

use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, State},
    http::{header, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use cubrir::lifecycle::{EventTrigger, Fixture, SingleUseEvent};
use cubrir::{CoverageMap, CubrirError, CubrirResult, HarnessConfig};
use regex::Regex;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock};
use tokio::sync::oneshot;
use tower_http::cors::{Any, CorsLayer};

/// Largest accepted upload, in bytes
pub const BODY_LIMIT: usize = 12_500_000;

/// Response message for a stored upload
pub const SAVED_MESSAGE: &str = "You have successfully saved your coverage report.";

const FIXTURE_NAME: &str = "coverage-server";
const CLIENT_SOURCE: &str = include_str!("../assets/coverage-sender.js");

/// A directory served under a route
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mount {
    /// Route prefix, with a leading slash
    pub route: String,
    /// Directory on disk
    pub dir: PathBuf,
}

/// Settings for one coverage server
#[derive(Debug, Clone)]
pub struct CoverageServerConfig {
    /// Listen port; 0 picks a free one
    pub port: u16,
    /// Where uploads are written
    pub coverage_dir: PathBuf,
    /// Run identifier embedded in upload file names
    pub run_id: String,
    /// Global the instrumented code records into
    pub coverage_variable: String,
    /// Served directories, longest route first
    pub mounts: Vec<Mount>,
}

impl CoverageServerConfig {
    /// Derive server settings from a harness configuration
    #[must_use]
    pub fn from_harness(config: &HarnessConfig) -> Self {
        let resolver = config.resolver();
        let mounts = config
            .served_source_dirs()
            .values()
            .chain(config.content_dirs.values())
            .map(|def| Mount {
                route: def.route_path(),
                dir: resolver.content_path(def),
            })
            .collect();
        Self {
            port: config.coverage_port,
            coverage_dir: config.coverage_dir(),
            run_id: config.run_id.clone(),
            coverage_variable: config.instrument_options().transform.coverage_variable,
            mounts,
        }
        .with_sorted_mounts()
    }

    /// Order mounts so longer routes match first
    #[must_use]
    pub fn with_sorted_mounts(mut self) -> Self {
        self.mounts
            .sort_by(|a, b| b.route.len().cmp(&a.route.len()).then_with(|| a.route.cmp(&b.route)));
        self
    }

    /// Base URL of the server
    #[must_use]
    pub fn base_url(&self) -> String {
        format!("http://localhost:{}", self.port)
    }

    fn socket_addr(&self) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], self.port))
    }
}

/// Browser name and version extracted from a user agent
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrowserMatch {
    /// Lowercase engine name, or `unknown`
    pub name: String,
    /// Version string, or `0`
    pub version: String,
}

fn ua_patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            r"(chrome)[ /]([\w.]+)",
            r"(webkit)[ /]([\w.]+)",
            r"(opera)(?:.*version|)[ /]([\w.]+)",
            r"(msie) ([\w.]+)",
        ]
        .iter()
        .filter_map(|pattern| Regex::new(pattern).ok())
        .collect()
    })
}

fn mozilla_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"(mozilla)(?:.*? rv:([\w.]+)|)").ok())
        .as_ref()
}

/// Identify the browser behind a user agent string
#[must_use]
pub fn ua_match(user_agent: &str) -> BrowserMatch {
    let ua = user_agent.to_lowercase();
    let captures = ua_patterns()
        .iter()
        .find_map(|pattern| pattern.captures(&ua))
        .or_else(|| {
            if ua.contains("compatible") {
                None
            } else {
                mozilla_pattern().and_then(|pattern| pattern.captures(&ua))
            }
        });
    let group = |index: usize, fallback: &str| {
        captures
            .as_ref()
            .and_then(|found| found.get(index))
            .map_or_else(|| fallback.to_string(), |m| m.as_str().to_string())
    };
    BrowserMatch {
        name: group(1, "unknown"),
        version: group(2, "0"),
    }
}

/// A parsed coverage upload
#[derive(Debug, Clone, PartialEq)]
pub struct CoverageUpload {
    /// Coverage keyed by file path
    pub coverage: CoverageMap,
    /// `navigator.userAgent` of the uploading page
    pub user_agent: Option<String>,
    /// `document.URL` of the uploading page
    pub document_url: Option<String>,
}

fn embedded_json(value: &Value, what: &str) -> Result<Value, String> {
    match value {
        Value::String(text) => {
            serde_json::from_str(text).map_err(|err| format!("{what} is not valid JSON: {err}"))
        }
        other => Ok(other.clone()),
    }
}

/// Parse an upload body: `{payload: {document, navigator, coverage}}` (the
/// payload may itself be a JSON string) or a bare `{coverage}`.
///
/// The coverage must be an istanbul coverage object; anything else is
/// rejected so the coverage directory only ever holds mergeable files.
pub fn parse_upload(body: &[u8]) -> Result<CoverageUpload, String> {
    let value: Value =
        serde_json::from_slice(body).map_err(|err| format!("upload is not valid JSON: {err}"))?;
    let payload = match value.get("payload") {
        Some(payload) => embedded_json(payload, "payload")?,
        None => value,
    };
    let coverage = match payload.get("coverage") {
        Some(coverage) => embedded_json(coverage, "coverage")?,
        None => return Err("upload has no coverage data".to_string()),
    };
    if !coverage.is_object() {
        return Err("coverage data must be an object".to_string());
    }
    let coverage: CoverageMap = serde_json::from_value(coverage)
        .map_err(|err| format!("coverage data is not istanbul coverage: {err}"))?;
    let text = |pointer: &str| payload.pointer(pointer).and_then(Value::as_str).map(str::to_string);
    Ok(CoverageUpload {
        coverage,
        user_agent: text("/navigator/userAgent"),
        document_url: text("/document/URL"),
    })
}

fn test_file_name(document_url: Option<&str>) -> String {
    let last = document_url
        .and_then(|url| url.split(['?', '#']).next())
        .and_then(|path| path.rsplit('/').next())
        .unwrap_or_default();
    let cleaned: String = last
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') { c } else { '_' })
        .collect();
    if cleaned.is_empty() {
        "unknown".to_string()
    } else {
        cleaned
    }
}

/// `coverage-<browser>-<version>-<test file>-<run id>-<nonce>.json`
#[must_use]
pub fn coverage_file_name(upload: &CoverageUpload, run_id: &str, nonce: u32) -> String {
    let browser = ua_match(upload.user_agent.as_deref().unwrap_or_default());
    format!(
        "coverage-{}-{}-{}-{}-{}.json",
        browser.name,
        browser.version,
        test_file_name(upload.document_url.as_deref()),
        run_id,
        nonce
    )
}

async fn save_upload(config: &CoverageServerConfig, body: &[u8]) -> Result<PathBuf, String> {
    let upload = parse_upload(body)?;
    let nonce = (uuid::Uuid::new_v4().as_u128() % 10_000) as u32;
    let path = config
        .coverage_dir
        .join(coverage_file_name(&upload, &config.run_id, nonce));
    let text = serde_json::to_string_pretty(&upload.coverage).map_err(|err| err.to_string())?;
    tokio::fs::create_dir_all(&config.coverage_dir)
        .await
        .map_err(|err| format!("cannot create {}: {err}", config.coverage_dir.display()))?;
    tokio::fs::write(&path, text)
        .await
        .map_err(|err| format!("cannot write {}: {err}", path.display()))?;
    Ok(path)
}

#[derive(Clone)]
struct AppState {
    config: Arc<CoverageServerConfig>,
}

async fn receive_coverage(State(state): State<AppState>, body: Bytes) -> Response {
    match save_upload(&state.config, &body).await {
        Ok(path) => {
            tracing::info!(file = %path.display(), bytes = body.len(), "Saved coverage upload");
            (StatusCode::OK, Json(json!({ "message": SAVED_MESSAGE }))).into_response()
        }
        Err(message) => {
            tracing::warn!(error = %message, "Rejected coverage upload");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "isError": true, "message": message })),
            )
                .into_response()
        }
    }
}

/// Client script with the wiring call for `config` appended
#[must_use]
pub fn client_script(config: &CoverageServerConfig) -> String {
    let url = Value::String(format!("{}/coverage", config.base_url()));
    let variable = Value::String(config.coverage_variable.clone());
    format!("{CLIENT_SOURCE}\ncubrirCoverageSender.wire({{ url: {url}, variable: {variable} }});\n")
}

async fn serve_client(State(state): State<AppState>) -> Response {
    (
        [(header::CONTENT_TYPE, "text/javascript")],
        client_script(&state.config),
    )
        .into_response()
}

/// Map a request path onto a mounted file. Paths that climb out of their
/// mount with `..` map to nothing.
#[must_use]
pub fn resolve_request(mounts: &[Mount], request_path: &str) -> Option<PathBuf> {
    mounts.iter().find_map(|mount| {
        let rest = if mount.route == "/" {
            Some(request_path)
        } else if request_path == mount.route {
            Some("")
        } else {
            request_path
                .strip_prefix(mount.route.as_str())
                .filter(|rest| rest.starts_with('/'))
        };
        let rest = rest?;
        let mut target = mount.dir.clone();
        for segment in rest.split('/').filter(|s| !s.is_empty() && *s != ".") {
            if segment == ".." || segment.contains('\\') {
                return None;
            }
            target.push(segment);
        }
        Some(target)
    })
}

/// MIME type for a served file
#[must_use]
pub fn mime_type(path: &Path) -> String {
    match path.extension().and_then(|e| e.to_str()) {
        Some("js" | "mjs") => "text/javascript".to_string(),
        Some("map") => "application/json".to_string(),
        _ => mime_guess::from_path(path)
            .first_or_octet_stream()
            .essence_str()
            .to_string(),
    }
}

async fn serve_file(path: &Path) -> Response {
    match tokio::fs::read(path).await {
        Ok(contents) => Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, mime_type(path))
            .header(header::CACHE_CONTROL, "no-cache")
            .body(axum::body::Body::from(contents))
            .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            (StatusCode::NOT_FOUND, format!("File not found: {}", path.display())).into_response()
        }
        Err(e) => {
            (StatusCode::INTERNAL_SERVER_ERROR, format!("Error reading file: {e}")).into_response()
        }
    }
}

async fn serve_mounted(State(state): State<AppState>, uri: Uri) -> Response {
    let Some(path) = resolve_request(&state.config.mounts, uri.path()) else {
        return (StatusCode::NOT_FOUND, "Not found").into_response();
    };
    if tokio::fs::metadata(&path).await.is_ok_and(|meta| meta.is_dir()) {
        return serve_file(&path.join("index.html")).await;
    }
    serve_file(&path).await
}

/// The coverage server, usable directly or as a lifecycle [`Fixture`]
pub struct CoverageServer {
    config: Arc<CoverageServerConfig>,
    shutdown: Option<oneshot::Sender<()>>,
    stopped: Option<SingleUseEvent>,
    local_addr: Arc<Mutex<Option<SocketAddr>>>,
}

impl std::fmt::Debug for CoverageServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoverageServer")
            .field("config", &self.config)
            .field("running", &self.shutdown.is_some())
            .finish()
    }
}

impl CoverageServer {
    /// Create a stopped server
    #[must_use]
    pub fn new(config: CoverageServerConfig) -> Self {
        Self {
            config: Arc::new(config),
            shutdown: None,
            stopped: None,
            local_addr: Arc::new(Mutex::new(None)),
        }
    }

    /// Server settings
    #[must_use]
    pub fn config(&self) -> &CoverageServerConfig {
        &self.config
    }

    /// Address the running server is bound to
    #[must_use]
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr.lock().ok().and_then(|addr| *addr)
    }

    /// Build the router
    pub fn router(&self) -> Router {
        let state = AppState {
            config: Arc::clone(&self.config),
        };
        Router::new()
            .route("/coverage", post(receive_coverage).put(receive_coverage))
            .route("/coverage/client", get(serve_client))
            .fallback(serve_mounted)
            .with_state(state)
            .layer(DefaultBodyLimit::max(BODY_LIMIT))
            .layer(
                CorsLayer::new()
                    .allow_origin(Any)
                    .allow_methods(Any)
                    .allow_headers(Any),
            )
    }

    fn spawn(
        &self,
        ready: EventTrigger,
        stopped: EventTrigger,
        shutdown: oneshot::Receiver<()>,
    ) -> CubrirResult<()> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|err| CubrirError::fixture(FIXTURE_NAME, err.to_string()))?;
        let config = Arc::clone(&self.config);
        let router = self.router();
        let bound = Arc::clone(&self.local_addr);
        runtime.spawn(async move {
            if let Err(err) = tokio::fs::create_dir_all(&config.coverage_dir).await {
                tracing::warn!(path = %config.coverage_dir.display(), error = %err, "Cannot create coverage directory");
            }
            let listener = match tokio::net::TcpListener::bind(config.socket_addr()).await {
                Ok(listener) => listener,
                Err(err) => {
                    tracing::error!(port = config.port, error = %err, "Coverage server failed to bind");
                    return;
                }
            };
            let addr = listener.local_addr().ok();
            if let Ok(mut slot) = bound.lock() {
                *slot = addr;
            }
            tracing::info!(addr = ?addr, "Coverage server started");
            ready.fire();

            let served = axum::serve(listener, router)
                .with_graceful_shutdown(async {
                    let _ = shutdown.await;
                })
                .await;
            if let Err(err) = served {
                tracing::error!(error = %err, "Coverage server stopped with an error");
            }
            tracing::info!("Coverage server stopped");
            stopped.fire();
        });
        Ok(())
    }
}

impl Fixture for CoverageServer {
    fn name(&self) -> &str {
        FIXTURE_NAME
    }

    fn construct(&mut self) -> CubrirResult<SingleUseEvent> {
        if self.shutdown.is_some() {
            return Err(CubrirError::fixture(FIXTURE_NAME, "already running"));
        }
        let (ready, ready_event) = SingleUseEvent::pair("coverage-server-started");
        let (stopped, stopped_event) = SingleUseEvent::pair("coverage-server-stopped");
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        self.spawn(ready, stopped, shutdown_rx)?;
        self.shutdown = Some(shutdown_tx);
        self.stopped = Some(stopped_event);
        Ok(ready_event)
    }

    fn stop(&mut self) -> CubrirResult<SingleUseEvent> {
        match (self.shutdown.take(), self.stopped.take()) {
            (Some(shutdown), Some(stopped)) => {
                if shutdown.send(()).is_err() {
                    tracing::debug!("Coverage server already gone");
                }
                Ok(stopped)
            }
            _ => Ok(SingleUseEvent::fired("coverage-server-stopped")),
        }
    }

    fn priority(&self) -> i32 {
        100
    }
}
