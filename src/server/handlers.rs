//! Request handlers for the HTTP surface.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use axum::Json;
use axum::extract::{Multipart, Path as UrlPath, Query, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use log::{error, info, warn};
use serde::Deserialize;
use serde_json::json;

use crate::DocId;
use crate::ingest::TaskHandle;

use super::ServerContext;

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    q: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AutocompleteParams {
    q: Option<String>,
    limit: Option<usize>,
}

fn bad_request(message: &str) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({ "error": message })),
    )
        .into_response()
}

fn internal_error(message: String) -> Response {
    error!("[Server] {message}");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": message })),
    )
        .into_response()
}

/// `GET /search?q=...`
pub async fn search(
    State(ctx): State<Arc<ServerContext>>,
    Query(params): Query<SearchParams>,
) -> Response {
    let query = match params.q {
        Some(q) => q,
        None => return bad_request("Missing 'q' parameter"),
    };

    let engine = Arc::clone(&ctx.engine);
    match tokio::task::spawn_blocking(move || engine.search(&query)).await {
        Ok(response) => Json(response).into_response(),
        Err(e) => internal_error(format!("Search task failed: {e}")),
    }
}

/// `GET /autocomplete?q=...&limit=10`
pub async fn autocomplete(
    State(ctx): State<Arc<ServerContext>>,
    Query(params): Query<AutocompleteParams>,
) -> Response {
    let prefix = match params.q {
        Some(q) => q,
        None => return bad_request("Missing 'q' parameter"),
    };
    let limit = params.limit.unwrap_or(10);
    Json(ctx.engine.autocomplete(&prefix, limit)).into_response()
}

/// `POST /upload`: multipart form with one or more `files` fields.
///
/// The handler stages each PDF, fans the batch out to the processing pool,
/// waits for every task, then flushes synchronously and refreshes the query
/// engine so the response implies searchability.
pub async fn upload(State(ctx): State<Arc<ServerContext>>, mut multipart: Multipart) -> Response {
    let start = Instant::now();
    let mut handles: Vec<(TaskHandle, String)> = Vec::new();
    let mut failed_count = 0usize;

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => return bad_request(&format!("Malformed multipart body: {e}")),
        };
        if field.name() != Some("files") {
            continue;
        }

        let file_name = sanitize_file_name(field.file_name().unwrap_or("upload.pdf"));
        let bytes = match field.bytes().await {
            Ok(bytes) => bytes,
            Err(e) => return bad_request(&format!("Could not read upload: {e}")),
        };

        ctx.progress.begin(1);
        let doc_id = ctx.mint_doc_id();
        let pdf_path = ctx
            .config
            .temp_pdfs_dir()
            .join(format!("upload_{doc_id}_{file_name}"));

        if let Err(e) = std::fs::write(&pdf_path, &bytes) {
            warn!("[Server] Could not stage {file_name}: {e}");
            ctx.progress
                .finish(false, format!("{file_name}: staging failed"));
            failed_count += 1;
            continue;
        }

        info!("[Server] Staged {file_name} as doc_id={doc_id}");
        handles.push((ctx.pool.submit(pdf_path, doc_id), file_name));
    }

    if handles.is_empty() && failed_count == 0 {
        return bad_request("No 'files' field in upload");
    }

    // Wait for the pool, then make the batch durable and visible.
    let blocking_ctx = Arc::clone(&ctx);
    let outcome = tokio::task::spawn_blocking(move || {
        let mut new_doc_ids: Vec<DocId> = Vec::new();
        let mut failed = failed_count;

        for (handle, file_name) in handles {
            let doc_id = handle.doc_id();
            match handle.wait() {
                Ok(doc_id) => {
                    stage_download_copy(&blocking_ctx, doc_id);
                    blocking_ctx
                        .progress
                        .finish(true, format!("{file_name}: indexed as doc {doc_id}"));
                    new_doc_ids.push(doc_id);
                }
                Err(e) => {
                    blocking_ctx
                        .progress
                        .finish(false, format!("{file_name}: {e}"));
                    warn!("[Server] Upload of {file_name} (doc {doc_id}) failed: {e}");
                    failed += 1;
                }
            }
        }

        if !new_doc_ids.is_empty() {
            if let Err(e) = blocking_ctx.writer.flush_now() {
                return Err(format!("Flush failed: {e}"));
            }
            blocking_ctx.engine.reload_delta_index();
            blocking_ctx.engine.reload_metadata();
            blocking_ctx.engine.reload_doc_stats();
        }
        Ok((new_doc_ids, failed))
    })
    .await;

    let (new_doc_ids, failed) = match outcome {
        Ok(Ok(result)) => result,
        Ok(Err(message)) => return internal_error(message),
        Err(e) => return internal_error(format!("Upload task failed: {e}")),
    };

    let uploaded = new_doc_ids.len();
    Json(json!({
        "success": true,
        "uploadedCount": uploaded,
        "failedCount": failed,
        "newDocIds": new_doc_ids,
        "processingTimeMs": start.elapsed().as_millis() as u64,
        "message": format!("{uploaded} document(s) indexed, {failed} failed"),
        "status": "indexed",
    }))
    .into_response()
}

/// `GET /download/<doc_id>`
pub async fn download(
    State(ctx): State<Arc<ServerContext>>,
    UrlPath(doc_id): UrlPath<DocId>,
) -> Response {
    let path = ctx.config.downloads_dir().join(format!("{doc_id}.pdf"));
    match std::fs::read(&path) {
        Ok(bytes) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "application/pdf")],
            bytes,
        )
            .into_response(),
        Err(_) => (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": format!("No document {doc_id}") })),
        )
            .into_response(),
    }
}

/// `GET /upload-progress`
pub async fn upload_progress(State(ctx): State<Arc<ServerContext>>) -> Response {
    Json(ctx.progress.snapshot()).into_response()
}

/// `GET /stats`
pub async fn stats(State(ctx): State<Arc<ServerContext>>) -> Response {
    Json(json!({
        "processing_pool": ctx.pool.stats(),
        "batch_writer": ctx.writer.stats(),
    }))
    .into_response()
}

/// Keep only the file's base name, replacing anything path-like.
fn sanitize_file_name(name: &str) -> String {
    Path::new(name)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "upload.pdf".to_string())
}

/// Copy a successfully processed PDF into the downloads directory.
fn stage_download_copy(ctx: &ServerContext, doc_id: DocId) {
    let downloads = ctx.config.downloads_dir();
    let target = downloads.join(format!("{doc_id}.pdf"));

    // The staged upload is named upload_<doc_id>_<original name>.
    let staged = std::fs::read_dir(ctx.config.temp_pdfs_dir())
        .ok()
        .and_then(|entries| {
            entries
                .filter_map(|e| e.ok())
                .map(|e| e.path())
                .find(|p| {
                    p.file_name()
                        .map(|n| {
                            n.to_string_lossy()
                                .starts_with(&format!("upload_{doc_id}_"))
                        })
                        .unwrap_or(false)
                })
        });

    if let Some(staged) = staged {
        if let Err(e) = std::fs::copy(&staged, &target) {
            warn!(
                "[Server] Could not copy {} to downloads: {e}",
                staged.display()
            );
        }
    }
}
