//! Runtime configuration and on-disk layout.
//!
//! All persisted paths are derived from a single data directory so that the
//! whole index can be relocated by moving one tree.

use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use crate::ranking::RankingWeights;

/// Number of barrel files the inverted index is partitioned into.
pub const DEFAULT_NUM_BARRELS: usize = 100;

/// Maximum number of barrels held in the query engine's cache.
pub const DEFAULT_BARREL_CACHE_CAPACITY: usize = 30;

/// Runtime configuration for the engine, ingest pipeline and server.
#[derive(Debug, Clone)]
pub struct Config {
    /// Root data directory (default `data`).
    pub data_dir: PathBuf,
    /// Number of inverted-index barrels (`barrel_id = word_id % num_barrels`).
    pub num_barrels: usize,
    /// Documents per batch before the writer flushes.
    pub batch_size: usize,
    /// Maximum time a pending document waits before a flush.
    pub flush_interval: Duration,
    /// Delta postings count that triggers a merge into the main barrels.
    pub delta_merge_threshold: usize,
    /// PDF processing pool size.
    pub num_workers: usize,
    /// Barrel cache capacity on the query path.
    pub barrel_cache_capacity: usize,
    /// Ranking weight configuration.
    pub ranking_weights: RankingWeights,
    /// Argv prefix for the external PDF tokenizer. The pdf path, doc id and
    /// temp json path are appended as three trailing arguments.
    pub tokenizer_command: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            data_dir: PathBuf::from("data"),
            num_barrels: DEFAULT_NUM_BARRELS,
            batch_size: 8,
            flush_interval: Duration::from_secs(5),
            delta_merge_threshold: 5000,
            num_workers: default_worker_count(),
            barrel_cache_capacity: DEFAULT_BARREL_CACHE_CAPACITY,
            ranking_weights: RankingWeights::default(),
            tokenizer_command: vec![
                "python3".to_string(),
                "scripts/tokenize_single_pdf.py".to_string(),
            ],
        }
    }
}

/// Hardware concurrency with a floor of 4 workers.
pub fn default_worker_count() -> usize {
    thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
        .max(4)
}

impl Config {
    /// Create a configuration rooted at the given data directory.
    pub fn with_data_dir<P: AsRef<Path>>(data_dir: P) -> Self {
        Config {
            data_dir: data_dir.as_ref().to_path_buf(),
            ..Config::default()
        }
    }

    /// Directory holding the persistent index files.
    pub fn processed_dir(&self) -> PathBuf {
        self.data_dir.join("processed")
    }

    /// Directory holding the barrel files.
    pub fn barrels_dir(&self) -> PathBuf {
        self.processed_dir().join("barrels")
    }

    pub fn lexicon_path(&self) -> PathBuf {
        self.processed_dir().join("lexicon.json")
    }

    pub fn forward_index_path(&self) -> PathBuf {
        self.processed_dir().join("forward_index.jsonl")
    }

    pub fn delta_path(&self) -> PathBuf {
        self.barrels_dir().join("inverted_delta.json")
    }

    pub fn metadata_path(&self) -> PathBuf {
        self.processed_dir().join("document_metadata.json")
    }

    pub fn url_map_path(&self) -> PathBuf {
        self.processed_dir().join("docid_to_url.json")
    }

    pub fn doc_stats_path(&self) -> PathBuf {
        self.processed_dir().join("doc_stats.bin")
    }

    pub fn document_vectors_path(&self) -> PathBuf {
        self.processed_dir().join("document_vectors.bin")
    }

    pub fn word_embeddings_path(&self) -> PathBuf {
        self.processed_dir().join("word_embeddings.bin")
    }

    pub fn ingest_log_path(&self) -> PathBuf {
        self.processed_dir().join("ingest_log.jsonl")
    }

    /// Staging area for uploaded PDFs awaiting tokenization.
    pub fn temp_pdfs_dir(&self) -> PathBuf {
        self.data_dir.join("temp_pdfs")
    }

    /// Scratch area for the extractor's file-based handshake.
    pub fn temp_json_dir(&self) -> PathBuf {
        self.data_dir.join("temp_json")
    }

    /// Successfully indexed PDFs, served by the download endpoint.
    pub fn downloads_dir(&self) -> PathBuf {
        self.data_dir.join("downloads")
    }

    /// Create every directory the engine writes into.
    pub fn ensure_directories(&self) -> std::io::Result<()> {
        for dir in [
            self.processed_dir(),
            self.barrels_dir(),
            self.temp_pdfs_dir(),
            self.temp_json_dir(),
            self.downloads_dir(),
        ] {
            std::fs::create_dir_all(&dir)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.num_barrels, DEFAULT_NUM_BARRELS);
        assert!(config.num_workers >= 4);
        assert_eq!(config.lexicon_path(), Path::new("data/processed/lexicon.json"));
        assert_eq!(
            config.delta_path(),
            Path::new("data/processed/barrels/inverted_delta.json")
        );
    }

    #[test]
    fn test_with_data_dir() {
        let config = Config::with_data_dir("/tmp/papyrus");
        assert_eq!(
            config.doc_stats_path(),
            Path::new("/tmp/papyrus/processed/doc_stats.bin")
        );
    }
}
