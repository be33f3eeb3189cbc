//! Batch index writer: a single background thread that serializes every
//! persistent-index mutation.
//!
//! Producers enqueue pending documents; the writer coalesces them into
//! batches and applies all index updates in a fixed order, each file replaced
//! atomically. A dedicated flush lock serializes `flush_now` against the
//! background loop; it also guards the writer-owned mutable index state.

use std::fs::OpenOptions;
use std::io::Write as _;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Instant;

use chrono::Datelike;
use log::{error, info, warn};
use parking_lot::{Condvar, Mutex, RwLock};
use serde::Serialize;

use crate::config::Config;
use crate::error::Result;
use crate::index::barrel::InvertedIndexBuilder;
use crate::index::delta::DeltaIndex;
use crate::index::forward;
use crate::index::stats_cache::{DocStats, DocStatsCache};
use crate::lexicon::{Lexicon, Trie};
use crate::metadata::{DocMetadata, DocUrlMapper, DocumentMetadata};

use super::pending::PendingDocument;

/// Writer counters, exposed by the stats endpoint.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct WriterStats {
    pub documents_queued: u64,
    pub documents_indexed: u64,
    pub batches_flushed: u64,
    pub failed_batches: u64,
    pub avg_batch_time_ms: f64,
    pub avg_latency_ms: f64,
    pub current_queue_size: usize,
}

/// Mutable index state owned exclusively by the writer. The surrounding
/// mutex doubles as the flush lock.
struct WriterIndexes {
    metadata: DocumentMetadata,
    url_mapper: DocUrlMapper,
    stats_cache: DocStatsCache,
}

struct WriterShared {
    config: Config,
    lexicon: Arc<RwLock<Lexicon>>,
    trie: Arc<RwLock<Trie>>,
    queue: Mutex<Vec<PendingDocument>>,
    queue_cv: Condvar,
    indexes: Mutex<WriterIndexes>,
    stats: Mutex<WriterStats>,
    last_flush: Mutex<Instant>,
    shutdown: AtomicBool,
}

/// The batch index writer. Dropping it signals shutdown, joins the
/// background thread and drains any remaining queue items.
pub struct BatchIndexWriter {
    shared: Arc<WriterShared>,
    worker: Option<JoinHandle<()>>,
}

impl BatchIndexWriter {
    /// Load the writer-owned stores and start the background thread.
    pub fn start(
        config: Config,
        lexicon: Arc<RwLock<Lexicon>>,
        trie: Arc<RwLock<Trie>>,
    ) -> Result<Self> {
        let indexes = WriterIndexes {
            metadata: DocumentMetadata::load(config.metadata_path()),
            url_mapper: DocUrlMapper::load(config.url_map_path()),
            stats_cache: DocStatsCache::open(
                &config.doc_stats_path(),
                &config.forward_index_path(),
            )?,
        };

        info!(
            "[BatchWriter] Started with batch_size={}, flush_interval={:?}",
            config.batch_size, config.flush_interval
        );

        let shared = Arc::new(WriterShared {
            config,
            lexicon,
            trie,
            queue: Mutex::new(Vec::new()),
            queue_cv: Condvar::new(),
            indexes: Mutex::new(indexes),
            stats: Mutex::new(WriterStats::default()),
            last_flush: Mutex::new(Instant::now()),
            shutdown: AtomicBool::new(false),
        });

        let worker_shared = Arc::clone(&shared);
        let worker = thread::Builder::new()
            .name("batch-writer".to_string())
            .spawn(move || writer_loop(&worker_shared))?;

        Ok(BatchIndexWriter {
            shared,
            worker: Some(worker),
        })
    }

    /// Enqueue a pending document. Returns immediately; searchability comes
    /// with the next flush.
    pub fn enqueue_document(&self, mut doc: PendingDocument) {
        doc.enqueue_time = Some(Instant::now());

        {
            let mut queue = self.shared.queue.lock();
            queue.push(doc);

            let mut stats = self.shared.stats.lock();
            stats.documents_queued += 1;
            stats.current_queue_size = queue.len();
        }
        self.shared.queue_cv.notify_one();
    }

    /// Synchronously flush everything queued right now.
    pub fn flush_now(&self) -> Result<()> {
        // Flush lock first so the background loop cannot flush concurrently.
        let mut indexes = self.shared.indexes.lock();

        let batch: Vec<PendingDocument> = {
            let mut queue = self.shared.queue.lock();
            let batch = std::mem::take(&mut *queue);
            self.shared.stats.lock().current_queue_size = 0;
            batch
        };

        if batch.is_empty() {
            return Ok(());
        }
        info!("[BatchWriter] flush_now: {} documents", batch.len());
        flush_batch(&self.shared, &mut indexes, batch)
    }

    /// Snapshot of the writer counters.
    pub fn stats(&self) -> WriterStats {
        *self.shared.stats.lock()
    }
}

impl Drop for BatchIndexWriter {
    fn drop(&mut self) {
        self.shared.shutdown.store(true, Ordering::Release);
        self.shared.queue_cv.notify_all();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }

        // Drain whatever is still queued.
        let remaining: Vec<PendingDocument> = std::mem::take(&mut *self.shared.queue.lock());
        if !remaining.is_empty() {
            info!(
                "[BatchWriter] Flushing {} remaining documents on shutdown",
                remaining.len()
            );
            let mut indexes = self.shared.indexes.lock();
            if let Err(e) = flush_batch(&self.shared, &mut indexes, remaining) {
                error!("[BatchWriter] Shutdown flush failed: {e}");
            }
        }
    }
}

/// Background loop: wait until shutdown, a full batch, or an expired flush
/// interval, then flush up to `batch_size` documents.
fn writer_loop(shared: &WriterShared) {
    let batch_size = shared.config.batch_size;
    let flush_interval = shared.config.flush_interval;

    loop {
        let batch: Vec<PendingDocument> = {
            let mut queue = shared.queue.lock();

            loop {
                if shared.shutdown.load(Ordering::Acquire) || queue.len() >= batch_size {
                    break;
                }
                let elapsed = shared.last_flush.lock().elapsed();
                if elapsed >= flush_interval {
                    if queue.is_empty() {
                        // Nothing to flush; restart the interval instead of
                        // spinning on an expired timer.
                        *shared.last_flush.lock() = Instant::now();
                        continue;
                    }
                    break;
                }
                shared
                    .queue_cv
                    .wait_for(&mut queue, flush_interval - elapsed);
            }

            if shared.shutdown.load(Ordering::Acquire) {
                return;
            }

            let take = queue.len().min(batch_size);
            let batch: Vec<PendingDocument> = queue.drain(..take).collect();
            shared.stats.lock().current_queue_size = queue.len();
            batch
        };

        if batch.is_empty() {
            continue;
        }

        let mut indexes = shared.indexes.lock();
        if let Err(e) = flush_batch(shared, &mut indexes, batch) {
            error!("[BatchWriter] Batch flush failed: {e}");
            shared.stats.lock().failed_batches += 1;
        }
    }
}

/// Apply one batch to every persistent index, in order: lexicon, forward
/// index, delta file, metadata, url mapper, stats cache, ingest log, and
/// finally the delta-merge check.
fn flush_batch(
    shared: &WriterShared,
    indexes: &mut WriterIndexes,
    batch: Vec<PendingDocument>,
) -> Result<()> {
    let start = Instant::now();
    let config = &shared.config;
    info!("[BatchWriter] Flushing batch of {} documents", batch.len());

    // 1. Lexicon: admit the union of tokens, keeping the trie in sync.
    let all_tokens: Vec<String> = batch
        .iter()
        .flat_map(|doc| doc.tokens.iter().cloned())
        .collect();
    if !all_tokens.is_empty() {
        let added = shared
            .lexicon
            .write()
            .update_from_tokens(&all_tokens, config.lexicon_path())?;
        if !added.is_empty() {
            let mut trie = shared.trie.write();
            for word in &added {
                trie.insert(word);
            }
        }
    }

    let forward_data: Vec<_> = batch.iter().map(|doc| (doc.doc_id, doc.forward_data())).collect();

    // 2. Forward index: one appended line per document.
    for (doc_id, data) in &forward_data {
        forward::append_document(config.forward_index_path(), *doc_id, data)?;
    }

    // 3. Delta file: load, insert new postings, atomic replace.
    let delta_path = config.delta_path();
    let mut delta = DeltaIndex::load(&delta_path);
    for doc in &batch {
        delta.add_document(doc.doc_id, &doc.doc_stats);
    }
    delta.save(&delta_path)?;

    // 4. Metadata, stamped with the current year/month.
    let today = chrono::Utc::now();
    for doc in &batch {
        indexes.metadata.add_document(
            doc.doc_id,
            DocMetadata {
                publication_year: today.year(),
                publication_month: today.month(),
                cited_by_count: 0,
                title: doc.title.clone(),
                url: doc.url.clone(),
                keywords: Vec::new(),
            },
        );
    }
    indexes.metadata.save(config.metadata_path())?;

    // 5. URL mappings.
    for doc in &batch {
        indexes.url_mapper.add_mapping(doc.doc_id, doc.url.clone());
    }
    indexes.url_mapper.save(config.url_map_path())?;

    // 6. Stats cache, rebuilt incrementally so fresh documents keep their
    // title boost, plus the ingest log.
    for (doc_id, data) in &forward_data {
        indexes.stats_cache.insert(*doc_id, DocStats::from_forward(data));
    }
    indexes.stats_cache.save_binary(&config.doc_stats_path())?;
    if let Err(e) = append_ingest_log(config, &batch) {
        warn!("[BatchWriter] Could not append ingest log: {e}");
    }

    // Counters.
    let elapsed_ms = start.elapsed().as_millis() as f64;
    let total_latency_ms: f64 = batch
        .iter()
        .filter_map(|doc| doc.enqueue_time)
        .map(|t| t.elapsed().as_millis() as f64)
        .sum();
    {
        let mut stats = shared.stats.lock();
        stats.documents_indexed += batch.len() as u64;
        stats.batches_flushed += 1;
        stats.avg_batch_time_ms = (stats.avg_batch_time_ms * (stats.batches_flushed - 1) as f64
            + elapsed_ms)
            / stats.batches_flushed as f64;
        stats.avg_latency_ms = total_latency_ms / batch.len() as f64;
    }
    *shared.last_flush.lock() = Instant::now();
    info!(
        "[BatchWriter] Batch complete in {elapsed_ms:.0}ms ({:.0}ms/doc)",
        elapsed_ms / batch.len() as f64
    );

    // Merge the delta into the barrels once it grows past the threshold.
    if delta.posting_count() >= config.delta_merge_threshold {
        info!(
            "[BatchWriter] Delta holds {} postings, merging into barrels",
            delta.posting_count()
        );
        InvertedIndexBuilder::new(config.num_barrels)
            .merge_delta_to_main(&delta_path, config.barrels_dir())?;
    }

    Ok(())
}

/// Append one bookkeeping line per flushed document.
fn append_ingest_log(config: &Config, batch: &[PendingDocument]) -> Result<()> {
    #[derive(Serialize)]
    struct LogLine<'a> {
        doc_id: crate::DocId,
        title: &'a str,
        word_count: usize,
        pdf_path: &'a std::path::Path,
        url: &'a str,
    }

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(config.ingest_log_path())?;
    for doc in batch {
        let line = LogLine {
            doc_id: doc.doc_id,
            title: &doc.title,
            word_count: doc.tokens.len(),
            pdf_path: &doc.pdf_path,
            url: &doc.url,
        };
        serde_json::to_writer(&mut file, &line)?;
        file.write_all(b"\n")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::Posting;
    use crate::ingest::pending::build_doc_stats;
    use crate::lexicon::LexiconBuildOptions;
    use std::path::PathBuf;
    use std::time::Duration;
    use tempfile::TempDir;

    fn setup(dir: &TempDir, batch_size: usize) -> (Config, Arc<RwLock<Lexicon>>, BatchIndexWriter) {
        let mut config = Config::with_data_dir(dir.path().join("data"));
        config.batch_size = batch_size;
        config.flush_interval = Duration::from_millis(200);
        config.ensure_directories().unwrap();

        let corpus = dir.path().join("corpus.jsonl");
        std::fs::write(&corpus, "{\"tokens\":[\"alpha\",\"beta\"]}\n").unwrap();
        let mut lexicon = Lexicon::new().unwrap();
        lexicon
            .build_from_corpus(&corpus, &LexiconBuildOptions::default())
            .unwrap();
        lexicon.save(config.lexicon_path()).unwrap();

        let trie = Trie::from_lexicon(&lexicon);
        let lexicon = Arc::new(RwLock::new(lexicon));
        let trie = Arc::new(RwLock::new(trie));

        let writer =
            BatchIndexWriter::start(config.clone(), Arc::clone(&lexicon), trie).unwrap();
        (config, lexicon, writer)
    }

    fn pending(doc_id: crate::DocId, tokens: &[&str], lexicon: &Lexicon) -> PendingDocument {
        let tokens: Vec<String> = tokens.iter().map(|s| s.to_string()).collect();
        PendingDocument {
            doc_id,
            title: format!("Doc {doc_id}"),
            doc_stats: build_doc_stats(&tokens, lexicon),
            tokens,
            url: format!("uploaded://doc{doc_id}.pdf"),
            pdf_path: PathBuf::from(format!("doc{doc_id}.pdf")),
            enqueue_time: None,
        }
    }

    #[test]
    fn test_flush_now_writes_all_stores() {
        let dir = TempDir::new().unwrap();
        let (config, lexicon, writer) = setup(&dir, 100);

        let doc = pending(0, &["alpha", "gamma", "alpha"], &lexicon.read());
        writer.enqueue_document(doc);
        writer.flush_now().unwrap();

        // lexicon admitted the new word and persisted
        assert!(lexicon.read().contains("gamma"));
        let mut reloaded = Lexicon::new().unwrap();
        reloaded.load(config.lexicon_path()).unwrap();
        assert!(reloaded.contains("gamma"));

        // forward line appended
        let mut docs = Vec::new();
        forward::for_each_record(config.forward_index_path(), |id, data| {
            docs.push((id, data.doc_length))
        })
        .unwrap();
        assert_eq!(docs, vec![(0, 3)]);

        // delta has a posting for alpha (word 0) with both positions
        let delta = DeltaIndex::load(config.delta_path());
        assert_eq!(delta.get(0).unwrap()[0], Posting::new(0, 2, vec![0, 2]));

        // metadata + url mapper persisted
        let metadata = DocumentMetadata::load(config.metadata_path());
        assert_eq!(metadata.title(0), "Doc 0");
        assert!(metadata.publication_year(0) >= 2024);
        let urls = DocUrlMapper::load(config.url_map_path());
        assert_eq!(urls.get(0), "uploaded://doc0.pdf");

        // stats cache rewritten with the fresh document
        let cache = DocStatsCache::load_binary(&config.doc_stats_path()).unwrap();
        assert_eq!(cache.get_document_length(0), 3);

        // ingest log appended
        let log = std::fs::read_to_string(config.ingest_log_path()).unwrap();
        assert!(log.contains("\"doc_id\":0"));

        let stats = writer.stats();
        assert_eq!(stats.documents_indexed, 1);
        assert_eq!(stats.batches_flushed, 1);
        assert_eq!(stats.current_queue_size, 0);
    }

    #[test]
    fn test_background_flush_by_batch_size() {
        let dir = TempDir::new().unwrap();
        let (config, lexicon, writer) = setup(&dir, 1);

        writer.enqueue_document(pending(0, &["alpha"], &lexicon.read()));

        // the writer thread should pick the document up well within a second
        let deadline = Instant::now() + Duration::from_secs(2);
        loop {
            if writer.stats().documents_indexed >= 1 {
                break;
            }
            assert!(Instant::now() < deadline, "background flush never happened");
            thread::sleep(Duration::from_millis(20));
        }

        let delta = DeltaIndex::load(config.delta_path());
        assert_eq!(delta.posting_count(), 1);
    }

    #[test]
    fn test_shutdown_drains_queue() {
        let dir = TempDir::new().unwrap();
        let (config, lexicon, writer) = setup(&dir, 100);

        writer.enqueue_document(pending(0, &["beta"], &lexicon.read()));
        drop(writer);

        let delta = DeltaIndex::load(config.delta_path());
        assert_eq!(delta.posting_count(), 1);
    }

    #[test]
    fn test_merge_threshold_triggers_merge() {
        let dir = TempDir::new().unwrap();
        let (mut config, lexicon, _writer) = setup(&dir, 100);
        drop(_writer);
        config.delta_merge_threshold = 1;

        let trie = Arc::new(RwLock::new(Trie::from_lexicon(&lexicon.read())));
        let writer = BatchIndexWriter::start(config.clone(), Arc::clone(&lexicon), trie).unwrap();

        writer.enqueue_document(pending(0, &["alpha", "beta"], &lexicon.read()));
        writer.flush_now().unwrap();

        // delta was merged away and the barrels now own the postings
        let delta = DeltaIndex::load(config.delta_path());
        assert!(delta.is_empty());

        let builder = InvertedIndexBuilder::new(config.num_barrels);
        let barrel = builder.load_barrel(&config.barrels_dir(), 0);
        assert_eq!(barrel[&0], vec![Posting::new(0, 1, vec![0])]);
    }
}
