//! Minimal static file server hosting the application under test.
//!
//! Just enough HTTP to serve a manifest and its assets to the runtime:
//! GET only, files resolved under one base directory, content type picked
//! by extension. Anything fancier belongs to a real web server.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::extract::State;
use axum::http::{header, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::Router;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use crate::errors::HarnessError;

struct ServeRoot {
    base: PathBuf,
}

/// A running file server. [`stop`](Self::stop) shuts it down gracefully;
/// dropping the handle aborts it.
pub struct FileServer {
    addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl FileServer {
    /// Serves `dir` on `127.0.0.1:port`. Port 0 picks an ephemeral port,
    /// readable afterwards via [`port`](Self::port).
    #[instrument(skip(dir))]
    pub async fn serve(dir: impl AsRef<Path>, port: u16) -> Result<Self, HarnessError> {
        let base = tokio::fs::canonicalize(dir.as_ref())
            .await
            .map_err(|e| {
                HarnessError::Server(format!("base dir {}: {e}", dir.as_ref().display()))
            })?;

        let listener = tokio::net::TcpListener::bind(("127.0.0.1", port))
            .await
            .map_err(|e| HarnessError::Server(format!("bind port {port}: {e}")))?;
        let addr = listener
            .local_addr()
            .map_err(|e| HarnessError::Server(format!("local_addr: {e}")))?;
        info!(%addr, base = %base.display(), "file server started");

        let app = Router::new()
            .fallback(serve_file)
            .with_state(Arc::new(ServeRoot { base }));

        let (shutdown, rx) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            let result = axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = rx.await;
                })
                .await;
            if let Err(e) = result {
                warn!("file server error: {e}");
            }
        });

        Ok(Self {
            addr,
            shutdown: Some(shutdown),
            task,
        })
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Url of a served file, e.g. `url_for("app.json")`.
    pub fn url_for(&self, path: &str) -> String {
        format!("http://localhost:{}/{}", self.addr.port(), path)
    }

    /// Stops accepting connections and waits for in-flight requests.
    pub async fn stop(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        let _ = (&mut self.task).await;
        info!(addr = %self.addr, "file server stopped");
    }
}

impl Drop for FileServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn serve_file(
    State(root): State<Arc<ServeRoot>>,
    method: Method,
    uri: Uri,
) -> Response {
    let name = uri.path().trim_start_matches('/');
    debug!(%method, file = name, "request");

    if method != Method::GET {
        return (StatusCode::METHOD_NOT_ALLOWED, "Method must be GET").into_response();
    }

    // Canonicalize and re-check the prefix so `..` segments cannot escape
    // the served directory.
    let full = match tokio::fs::canonicalize(root.base.join(name)).await {
        Ok(p) if p.starts_with(&root.base) => p,
        _ => return (StatusCode::NOT_FOUND, "File not found").into_response(),
    };

    match tokio::fs::read(&full).await {
        Ok(bytes) => {
            let content_type = content_type_for(name);
            ([(header::CONTENT_TYPE, content_type)], bytes).into_response()
        }
        Err(e) => {
            warn!(file = name, "read failed: {e}");
            (StatusCode::NOT_FOUND, "File not found").into_response()
        }
    }
}

fn content_type_for(name: &str) -> &'static str {
    match Path::new(name).extension().and_then(|e| e.to_str()) {
        Some("html") => "text/html",
        Some("json") => "application/json",
        _ => "text/plain",
    }
}
