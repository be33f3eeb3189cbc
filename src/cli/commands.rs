//! Command execution for the `papyrus` binary.

use std::sync::Arc;
use std::time::Duration;

use log::{info, warn};
use parking_lot::RwLock;

use crate::analysis::TextAnalyzer;
use crate::config::Config;
use crate::error::Result;
use crate::index::{DocStatsCache, ForwardIndexBuilder, InvertedIndexBuilder};
use crate::ingest::{BatchIndexWriter, PdfExtractor, PdfProcessingPool};
use crate::lexicon::{Lexicon, LexiconBuildOptions, Trie};
use crate::metadata::{DocUrlMapper, DocumentMetadata};
use crate::search::QueryEngine;
use crate::server::{self, ServerContext};
use crate::storage;

use super::args::{BuildArgs, Command, PapyrusArgs, ServeArgs};

/// Uploads and handshake files older than this are removed at startup.
const TEMP_FILE_MAX_AGE: Duration = Duration::from_secs(3600);

/// Execute the parsed command line.
pub fn execute_command(args: PapyrusArgs) -> Result<()> {
    match args.command {
        Command::Serve(serve_args) => serve(serve_args),
        Command::Build(build_args) => build(build_args),
    }
}

/// Offline build: lexicon, forward index, barrels and stats cache.
fn build(args: BuildArgs) -> Result<()> {
    let config = Config {
        num_barrels: args.num_barrels,
        ..Config::with_data_dir(&args.data_dir)
    };
    config.ensure_directories()?;

    let mut analyzer = TextAnalyzer::new()?;
    if let Some(stopwords) = &args.stopwords {
        analyzer.load_stopwords(stopwords)?;
    }

    let mut lexicon = Lexicon::with_analyzer(analyzer);
    let options = LexiconBuildOptions {
        min_frequency: args.min_frequency,
        max_frequency_percentile: args.max_frequency_percentile,
    };
    lexicon.build_from_corpus(&args.corpus, &options)?;
    lexicon.save(config.lexicon_path())?;
    info!("[Build] Lexicon: {} words", lexicon.len());

    let forward = ForwardIndexBuilder::new()?;
    let docs = forward.build_index(&args.corpus, config.forward_index_path(), &lexicon)?;
    info!("[Build] Forward index: {docs} documents");

    let barrels = InvertedIndexBuilder::new(config.num_barrels)
        .build(config.forward_index_path(), config.barrels_dir())?;
    info!("[Build] Inverted index: {barrels} barrels");

    let cache = DocStatsCache::rebuild_from_forward(&config.forward_index_path())?;
    cache.save_binary(&config.doc_stats_path())?;
    info!("[Build] Stats cache: {} documents", cache.len());

    Ok(())
}

/// Start the ingest pipeline and serve the HTTP API.
fn serve(args: ServeArgs) -> Result<()> {
    let mut config = Config::with_data_dir(&args.data_dir);
    config.batch_size = args.batch_size.max(1);
    config.flush_interval = Duration::from_secs(args.flush_interval_secs.max(1));
    config.delta_merge_threshold = args.delta_merge_threshold;
    if let Some(workers) = args.workers {
        config.num_workers = workers.max(1);
    }
    if let Some(tokenizer) = &args.tokenizer {
        let command: Vec<String> = tokenizer.split_whitespace().map(String::from).collect();
        if !command.is_empty() {
            config.tokenizer_command = command;
        }
    }
    config.ensure_directories()?;

    for dir in [config.temp_pdfs_dir(), config.temp_json_dir()] {
        match storage::clean_stale_files(&dir, TEMP_FILE_MAX_AGE) {
            Ok(0) => {}
            Ok(removed) => info!("[Startup] Removed {removed} stale files from {}", dir.display()),
            Err(e) => warn!("[Startup] Could not clean {}: {e}", dir.display()),
        }
    }

    let mut lexicon = Lexicon::new()?;
    if let Err(e) = lexicon.load(config.lexicon_path()) {
        warn!("[Startup] CRITICAL: no lexicon at {}: {e}", config.lexicon_path().display());
        warn!("[Startup] The engine will start but every query will return empty");
    }
    let trie = Trie::from_lexicon(&lexicon);
    let lexicon = Arc::new(RwLock::new(lexicon));
    let trie = Arc::new(RwLock::new(trie));

    // Doc ids continue after everything already indexed.
    let next_doc_id = DocumentMetadata::load(config.metadata_path())
        .max_doc_id()
        .into_iter()
        .chain(DocUrlMapper::load(config.url_map_path()).max_doc_id())
        .max()
        .map_or(0, |max| max + 1);
    info!("[Startup] Next doc id: {next_doc_id}");

    let writer = Arc::new(BatchIndexWriter::start(
        config.clone(),
        Arc::clone(&lexicon),
        Arc::clone(&trie),
    )?);

    let extractor = PdfExtractor::new(config.tokenizer_command.clone(), config.temp_json_dir());
    let pool = PdfProcessingPool::new(
        config.num_workers,
        extractor,
        Arc::clone(&lexicon),
        Arc::clone(&writer),
    )?;

    let engine = Arc::new(QueryEngine::open(config.clone(), lexicon, trie)?);

    let ctx = Arc::new(ServerContext::new(
        config,
        engine,
        writer,
        pool,
        next_doc_id,
    ));

    tokio::runtime::Runtime::new()?.block_on(server::serve(ctx, &args.host, args.port))
}
