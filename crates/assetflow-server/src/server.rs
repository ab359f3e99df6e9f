//! Development server implementation.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    http::header,
    middleware,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use tower_http::services::ServeDir;

use assetflow_pipeline::{run_blocking, PipelineConfig, TaskName};

use crate::watcher::{FileWatcher, WatchAction, WatchEvent, WatchRules};
use crate::websocket::{reload_client_script, ReloadHub, ReloadMessage};

const RELOAD_SOCKET: &str = "/__reload";
const RELOAD_SCRIPT: &str = "/__reload.js";

/// Configuration for the development server.
#[derive(Debug, Clone)]
pub struct DevServerConfig {
    /// Port to listen on
    pub port: u16,

    /// Host to bind to
    pub host: String,

    /// Open browser on start
    pub open: bool,

    /// Debounce window for filesystem events
    pub settle: Duration,
}

impl Default for DevServerConfig {
    fn default() -> Self {
        Self {
            port: 3000,
            host: "0.0.0.0".to_string(),
            open: false,
            settle: Duration::from_millis(100),
        }
    }
}

/// Errors that can occur with the server.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Failed to bind to {0}: {1}")]
    BindError(SocketAddr, String),

    #[error("File watch error: {0}")]
    WatchError(String),
}

/// Shared server state.
struct ServerState {
    hub: ReloadHub,
}

/// Development server: static files from the app directory, live reload, and
/// pipeline re-runs on change.
pub struct DevServer {
    config: DevServerConfig,
    pipeline: Arc<PipelineConfig>,
}

impl DevServer {
    /// Create a new development server.
    pub fn new(config: DevServerConfig, pipeline: Arc<PipelineConfig>) -> Self {
        Self { config, pipeline }
    }

    /// Start watching and serving. Runs until the process is stopped.
    pub async fn start(self) -> Result<(), ServerError> {
        let addr: SocketAddr = format!("{}:{}", self.config.host, self.config.port)
            .parse()
            .map_err(|_| {
                ServerError::InvalidAddress(format!("{}:{}", self.config.host, self.config.port))
            })?;

        let hub = ReloadHub::new();
        let state = Arc::new(ServerState { hub: hub.clone() });

        let rules = WatchRules::from_config(&self.pipeline);
        let (watcher, mut rx) = FileWatcher::new(
            &watch_paths(&self.pipeline),
            rules,
            self.config.settle,
        )
        .map_err(|e| ServerError::WatchError(e.to_string()))?;

        let pipeline = Arc::clone(&self.pipeline);
        let css_path = stylesheet_url(&pipeline);
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                handle_watch_event(&hub, &pipeline, &css_path, event).await;
            }
            // Keep watcher alive
            drop(watcher);
        });

        let app = Router::new()
            .route(RELOAD_SOCKET, get(ws_handler))
            .route(RELOAD_SCRIPT, get(reload_script_handler))
            .fallback_service(ServeDir::new(&self.pipeline.app_dir))
            .layer(middleware::map_response(inject_reload_script))
            .with_state(state);

        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::BindError(addr, e.to_string()))?;

        let local = format!("http://localhost:{}", self.config.port);
        tracing::info!("Serving {} at {}", self.pipeline.app_dir.display(), local);
        if addr.ip().is_unspecified() {
            tracing::info!("Listening on all interfaces, port {}", self.config.port);
        }

        if self.config.open {
            let _ = open::that(&local);
        }

        axum::serve(listener, app)
            .await
            .map_err(|e| ServerError::BindError(addr, e.to_string()))?;

        Ok(())
    }
}

/// Directories to watch: the app directory plus any entry directories outside it.
fn watch_paths(config: &PipelineConfig) -> Vec<PathBuf> {
    let mut paths = vec![config.app_dir.clone()];

    for entry in config.style_entries.iter().chain(&config.script_entries) {
        if let Some(parent) = entry.parent() {
            if !parent.starts_with(&config.app_dir) && !paths.iter().any(|p| p == parent) {
                paths.push(parent.to_path_buf());
            }
        }
    }

    paths
}

/// URL path of the compiled stylesheet, for in-place CSS refresh.
fn stylesheet_url(config: &PipelineConfig) -> String {
    let output = config.style_output_path();
    let relative = output.strip_prefix(&config.app_dir).unwrap_or(&output);
    let url = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/");
    format!("/{}", url)
}

/// Handle one coalesced watch event.
async fn handle_watch_event(
    hub: &ReloadHub,
    pipeline: &Arc<PipelineConfig>,
    css_path: &str,
    event: WatchEvent,
) {
    tracing::info!("Changed: {}", event.path.display());

    match event.action {
        WatchAction::Run(task) => match run_blocking(task, Arc::clone(pipeline)).await {
            Ok(report) => {
                tracing::info!("Rebuilt '{}' in {}ms", task, report.duration_ms);
                if task == TaskName::Styles {
                    hub.send(ReloadMessage::Css {
                        path: css_path.to_string(),
                    });
                } else {
                    hub.send(ReloadMessage::Reload);
                }
            }
            Err(e) => {
                // Keep watching; the next save gets another try.
                tracing::error!("{}", e);
            }
        },
        WatchAction::Reload => hub.send(ReloadMessage::Reload),
    }
}

/// Insert the reload client before the closing body tag, or append it.
pub fn inject_script_tag(html: &str) -> String {
    let tag = format!(r#"<script src="{}"></script>"#, RELOAD_SCRIPT);

    match html.to_ascii_lowercase().rfind("</body>") {
        Some(at) => format!("{}{}{}", &html[..at], tag, &html[at..]),
        None => format!("{}{}", html, tag),
    }
}

/// Rewrite HTML responses to load the reload client.
async fn inject_reload_script(response: Response) -> Response {
    let is_html = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("text/html"));
    if !is_html {
        return response;
    }

    let (mut parts, body) = response.into_parts();
    let bytes = match axum::body::to_bytes(body, usize::MAX).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!("Failed to buffer HTML response: {}", e);
            return Response::from_parts(parts, Body::empty());
        }
    };

    let html = inject_script_tag(&String::from_utf8_lossy(&bytes));
    parts.headers.remove(header::CONTENT_LENGTH);
    Response::from_parts(parts, Body::from(html))
}

/// Handler for the reload WebSocket endpoint.
async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<ServerState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_ws(socket, state))
}

/// Forward hub messages to one client.
async fn handle_ws(mut socket: WebSocket, state: Arc<ServerState>) {
    let mut rx = state.hub.subscribe();

    if !send_message(&mut socket, &ReloadMessage::Connected).await {
        return;
    }

    while let Ok(msg) = rx.recv().await {
        if !send_message(&mut socket, &msg).await {
            break;
        }
    }
}

async fn send_message(socket: &mut WebSocket, msg: &ReloadMessage) -> bool {
    let Ok(json) = serde_json::to_string(msg) else {
        return false;
    };
    socket.send(Message::Text(json.into())).await.is_ok()
}

/// Handler for the reload client script.
async fn reload_script_handler() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "application/javascript")],
        reload_client_script(RELOAD_SOCKET),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_listens_on_all_interfaces() {
        let config = DevServerConfig::default();

        assert_eq!(config.port, 3000);
        assert_eq!(config.host, "0.0.0.0");
        assert!(!config.open);
    }

    #[test]
    fn injects_before_closing_body() {
        let html = "<html><BODY><p>hi</p></BODY></html>";

        let injected = inject_script_tag(html);

        assert_eq!(
            injected,
            r#"<html><BODY><p>hi</p><script src="/__reload.js"></script></BODY></html>"#
        );
    }

    #[test]
    fn appends_when_body_is_missing() {
        let injected = inject_script_tag("<p>fragment</p>");

        assert!(injected.ends_with(r#"<script src="/__reload.js"></script>"#));
    }

    #[test]
    fn stylesheet_url_is_relative_to_app_dir() {
        let config = PipelineConfig::with_root("/site");

        assert_eq!(stylesheet_url(&config), "/css/style.min.css");
    }

    #[test]
    fn watches_entries_outside_the_app_dir() {
        let mut config = PipelineConfig::with_root("/site");
        config.script_entries = vec![PathBuf::from("/shared/js/vendor.js")];

        let paths = watch_paths(&config);

        assert_eq!(
            paths,
            vec![PathBuf::from("/site/app"), PathBuf::from("/shared/js")]
        );
    }

    #[tokio::test]
    async fn style_change_rebuilds_and_sends_one_css_message() {
        let temp = tempfile::tempdir().unwrap();
        let config = Arc::new(PipelineConfig::with_root(temp.path()));
        let scss_dir = config.style_entries[0].parent().unwrap();
        std::fs::create_dir_all(scss_dir).unwrap();
        std::fs::write(&config.style_entries[0], "a { color: red; }").unwrap();

        let hub = ReloadHub::new();
        let mut rx = hub.subscribe();
        let event = WatchEvent {
            action: WatchAction::Run(TaskName::Styles),
            path: config.style_entries[0].clone(),
        };

        handle_watch_event(&hub, &config, "/css/style.min.css", event).await;

        assert!(config.style_output_path().exists());
        assert!(!config.script_output_path().exists());
        assert!(!config.app_dir.join("index.html").exists());
        assert_eq!(
            rx.try_recv().unwrap(),
            ReloadMessage::Css {
                path: "/css/style.min.css".to_string()
            }
        );
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn failed_rebuild_sends_nothing() {
        let temp = tempfile::tempdir().unwrap();
        let config = Arc::new(PipelineConfig::with_root(temp.path()));
        let hub = ReloadHub::new();
        let mut rx = hub.subscribe();
        let event = WatchEvent {
            action: WatchAction::Run(TaskName::Scripts),
            path: config.script_entries[0].clone(),
        };

        handle_watch_event(&hub, &config, "/css/style.min.css", event).await;

        assert!(rx.try_recv().is_err());
    }
}
