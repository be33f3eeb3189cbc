//! Fixed-size PDF processing pool.
//!
//! Workers pull `(pdf_path, doc_id)` tasks from a channel, run the external
//! tokenizer, build the document's statistics against the lexicon and hand a
//! [`PendingDocument`] to the batch writer. Failures never cross the thread
//! boundary; each task carries a result channel the submitter can wait on.

use std::path::PathBuf;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender, bounded, unbounded};
use log::{error, info};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;

use crate::DocId;
use crate::error::{PapyrusError, Result};
use crate::lexicon::Lexicon;

use super::extractor::PdfExtractor;
use super::pending::{PendingDocument, build_doc_stats};
use super::writer::BatchIndexWriter;

/// Pool counters, exposed by the stats endpoint.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct PoolStats {
    /// Workers currently processing a task.
    pub active_workers: usize,
    /// Tasks waiting in the channel.
    pub queue_size: usize,
    pub completed_tasks: u64,
    pub failed_tasks: u64,
}

struct Task {
    pdf_path: PathBuf,
    doc_id: DocId,
    result: Sender<Result<DocId>>,
}

/// Handle to one submitted task.
#[derive(Debug)]
pub struct TaskHandle {
    doc_id: DocId,
    receiver: Receiver<Result<DocId>>,
}

impl TaskHandle {
    /// The doc id this task was submitted under.
    pub fn doc_id(&self) -> DocId {
        self.doc_id
    }

    /// Block until the task finishes, yielding the indexed doc id or the
    /// captured failure.
    pub fn wait(self) -> Result<DocId> {
        self.receiver
            .recv()
            .map_err(|_| PapyrusError::ingest("Processing worker disappeared"))?
    }
}

/// Fixed-size worker pool for PDF tokenization.
pub struct PdfProcessingPool {
    task_sender: Option<Sender<Task>>,
    workers: Vec<JoinHandle<()>>,
    stats: Arc<Mutex<PoolStats>>,
}

impl PdfProcessingPool {
    /// Start `num_workers` workers feeding the given batch writer.
    pub fn new(
        num_workers: usize,
        extractor: PdfExtractor,
        lexicon: Arc<RwLock<Lexicon>>,
        writer: Arc<BatchIndexWriter>,
    ) -> Result<Self> {
        let (task_sender, task_receiver) = unbounded::<Task>();
        let extractor = Arc::new(extractor);
        let stats = Arc::new(Mutex::new(PoolStats::default()));

        let mut workers = Vec::with_capacity(num_workers);
        for worker_id in 0..num_workers {
            let receiver = task_receiver.clone();
            let extractor = Arc::clone(&extractor);
            let lexicon = Arc::clone(&lexicon);
            let writer = Arc::clone(&writer);
            let stats = Arc::clone(&stats);
            workers.push(
                thread::Builder::new()
                    .name(format!("pdf-worker-{worker_id}"))
                    .spawn(move || {
                        worker_loop(receiver, extractor, lexicon, writer, stats);
                    })?,
            );
        }

        info!("[ProcessingPool] Started with {num_workers} workers");
        Ok(PdfProcessingPool {
            task_sender: Some(task_sender),
            workers,
            stats,
        })
    }

    /// Submit one PDF for processing under a pre-minted doc id.
    pub fn submit(&self, pdf_path: PathBuf, doc_id: DocId) -> TaskHandle {
        let (result, receiver) = bounded(1);
        let task = Task {
            pdf_path,
            doc_id,
            result,
        };
        if let Some(sender) = &self.task_sender {
            // Send fails only after shutdown; the dropped result sender then
            // surfaces as an error from `wait`.
            let _ = sender.send(task);
        }
        TaskHandle { doc_id, receiver }
    }

    /// Snapshot of the pool counters.
    pub fn stats(&self) -> PoolStats {
        let mut stats = *self.stats.lock();
        stats.queue_size = self.task_sender.as_ref().map_or(0, Sender::len);
        stats
    }
}

impl Drop for PdfProcessingPool {
    fn drop(&mut self) {
        // Closing the channel lets workers drain outstanding tasks and exit.
        self.task_sender.take();
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}

fn worker_loop(
    receiver: Receiver<Task>,
    extractor: Arc<PdfExtractor>,
    lexicon: Arc<RwLock<Lexicon>>,
    writer: Arc<BatchIndexWriter>,
    stats: Arc<Mutex<PoolStats>>,
) {
    while let Ok(task) = receiver.recv() {
        stats.lock().active_workers += 1;

        let outcome = process_task(&task, &extractor, &lexicon, &writer);
        {
            let mut stats = stats.lock();
            stats.active_workers -= 1;
            match &outcome {
                Ok(_) => stats.completed_tasks += 1,
                Err(e) => {
                    stats.failed_tasks += 1;
                    error!(
                        "[ProcessingPool] doc_id={} ({}): {e}",
                        task.doc_id,
                        task.pdf_path.display()
                    );
                }
            }
        }
        let _ = task.result.send(outcome);
    }
}

fn process_task(
    task: &Task,
    extractor: &PdfExtractor,
    lexicon: &RwLock<Lexicon>,
    writer: &BatchIndexWriter,
) -> Result<DocId> {
    let extracted = extractor.extract(&task.pdf_path, task.doc_id)?;

    let lowered: Vec<String> = extracted
        .body_tokens
        .iter()
        .map(|t| t.to_lowercase())
        .collect();
    let doc_stats = build_doc_stats(&lowered, &lexicon.read());

    let file_name = task
        .pdf_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    writer.enqueue_document(PendingDocument {
        doc_id: task.doc_id,
        title: extracted.title,
        tokens: lowered,
        doc_stats,
        url: format!("uploaded://{file_name}"),
        pdf_path: task.pdf_path.clone(),
        enqueue_time: None,
    });

    Ok(task.doc_id)
}
