//! HTTP surface: routing, CORS and server lifecycle.
//!
//! Handlers receive a shared [`ServerContext`]; there are no hidden
//! singletons. Every response carries `Access-Control-Allow-Origin: *` and
//! preflight requests answer 204.

pub mod handlers;
pub mod progress;

use std::sync::Arc;
use std::sync::atomic::AtomicU32;

use axum::Router;
use axum::extract::{DefaultBodyLimit, Request};
use axum::http::{HeaderValue, Method, StatusCode, header};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post};
use log::info;

use crate::DocId;
use crate::config::Config;
use crate::error::{PapyrusError, Result};
use crate::ingest::{BatchIndexWriter, PdfProcessingPool};
use crate::search::QueryEngine;

use progress::UploadProgress;

/// Maximum accepted upload body (all files combined).
const MAX_UPLOAD_BYTES: usize = 100 * 1024 * 1024;

/// Everything the handlers need, constructed once at startup.
pub struct ServerContext {
    pub config: Config,
    pub engine: Arc<QueryEngine>,
    pub writer: Arc<BatchIndexWriter>,
    pub pool: PdfProcessingPool,
    pub progress: UploadProgress,
    next_doc_id: AtomicU32,
}

impl ServerContext {
    pub fn new(
        config: Config,
        engine: Arc<QueryEngine>,
        writer: Arc<BatchIndexWriter>,
        pool: PdfProcessingPool,
        next_doc_id: DocId,
    ) -> Self {
        ServerContext {
            config,
            engine,
            writer,
            pool,
            progress: UploadProgress::new(),
            next_doc_id: AtomicU32::new(next_doc_id),
        }
    }

    /// Mint the next document id. Ids are never reused.
    pub fn mint_doc_id(&self) -> DocId {
        self.next_doc_id
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst)
    }
}

/// Build the application router.
pub fn router(ctx: Arc<ServerContext>) -> Router {
    Router::new()
        .route("/search", get(handlers::search))
        .route("/autocomplete", get(handlers::autocomplete))
        .route("/upload", post(handlers::upload))
        .route("/download/:doc_id", get(handlers::download))
        .route("/upload-progress", get(handlers::upload_progress))
        .route("/stats", get(handlers::stats))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(middleware::from_fn(cors))
        .with_state(ctx)
}

/// Bind and serve until the process exits. A failed bind is fatal.
pub async fn serve(ctx: Arc<ServerContext>, host: &str, port: u16) -> Result<()> {
    let app = router(ctx);
    let addr = format!("{host}:{port}");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| PapyrusError::other(format!("Could not bind {addr}: {e}")))?;
    info!("[Server] Listening on http://{addr}");

    axum::serve(listener, app)
        .await
        .map_err(|e| PapyrusError::other(format!("Server error: {e}")))
}

/// Wildcard CORS: preflight answers 204, every other response gets the
/// allow-origin header appended.
async fn cors(request: Request, next: Next) -> Response {
    if request.method() == Method::OPTIONS {
        return Response::builder()
            .status(StatusCode::NO_CONTENT)
            .header(header::ACCESS_CONTROL_ALLOW_ORIGIN, "*")
            .header(header::ACCESS_CONTROL_ALLOW_METHODS, "GET, POST, OPTIONS")
            .header(header::ACCESS_CONTROL_ALLOW_HEADERS, "*")
            .body(Default::default())
            .expect("static preflight response");
    }

    let mut response = next.run(request).await;
    response.headers_mut().insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    );
    response
}
