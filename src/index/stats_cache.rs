//! Doc-stats cache: compact binary of per-document length and per-word title
//! frequency, used for O(1) lookups on the ranking path.
//!
//! Binary layout (little-endian): `u32 num_docs`, then per document
//! `i32 doc_id`, `i32 doc_length`, `u32 num_title_freqs`, followed by that
//! many `(i32 word_id, i32 freq)` pairs. Zero title frequencies are omitted.

use std::io::Cursor;
use std::path::Path;

use ahash::AHashMap;
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use log::info;

use crate::error::Result;
use crate::storage;
use crate::{DocId, WordId};

use super::forward::{self, ForwardDocData};

/// Cached statistics for one document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocStats {
    pub doc_length: i32,
    /// Non-zero title frequencies by word id.
    pub title_frequencies: AHashMap<WordId, i32>,
}

impl DocStats {
    /// Derive cache stats from a forward record.
    pub fn from_forward(data: &ForwardDocData) -> Self {
        let title_frequencies = data
            .words
            .iter()
            .filter(|(_, entry)| entry.title_frequency > 0)
            .map(|(id, entry)| (*id, entry.title_frequency as i32))
            .collect();
        DocStats {
            doc_length: data.doc_length as i32,
            title_frequencies,
        }
    }
}

/// In-memory doc-stats cache, recoverable from the forward index.
#[derive(Debug, Default)]
pub struct DocStatsCache {
    docs: AHashMap<DocId, DocStats>,
}

impl DocStatsCache {
    pub fn new() -> Self {
        DocStatsCache::default()
    }

    /// Open the cache: deserialize the binary file when present and
    /// non-empty, otherwise rebuild from the forward index and persist the
    /// binary form for the next start.
    pub fn open(cache_path: &Path, forward_path: &Path) -> Result<Self> {
        if let Ok(meta) = std::fs::metadata(cache_path) {
            if meta.len() > 0 {
                match Self::load_binary(cache_path) {
                    Ok(cache) => {
                        info!("[DocStats] Loaded {} documents from cache", cache.len());
                        return Ok(cache);
                    }
                    Err(e) => {
                        log::warn!("[DocStats] Unreadable cache, rebuilding: {e}");
                    }
                }
            }
        }

        let cache = Self::rebuild_from_forward(forward_path)?;
        if !cache.docs.is_empty() {
            cache.save_binary(cache_path)?;
        }
        Ok(cache)
    }

    /// Stream the forward index and populate the cache.
    pub fn rebuild_from_forward(forward_path: &Path) -> Result<Self> {
        let mut cache = DocStatsCache::new();
        if !forward_path.exists() {
            return Ok(cache);
        }
        forward::for_each_record(forward_path, |doc_id, data| {
            cache.docs.insert(doc_id, DocStats::from_forward(&data));
        })?;
        info!("[DocStats] Rebuilt cache for {} documents", cache.len());
        Ok(cache)
    }

    /// Deserialize the binary cache file.
    pub fn load_binary(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        let mut reader = Cursor::new(bytes);

        let num_docs = reader.read_u32::<LittleEndian>()?;
        let mut docs = AHashMap::with_capacity(num_docs as usize);

        for _ in 0..num_docs {
            let doc_id = reader.read_i32::<LittleEndian>()? as DocId;
            let doc_length = reader.read_i32::<LittleEndian>()?;
            let num_freqs = reader.read_u32::<LittleEndian>()?;

            let mut title_frequencies = AHashMap::with_capacity(num_freqs as usize);
            for _ in 0..num_freqs {
                let word_id = reader.read_i32::<LittleEndian>()? as WordId;
                let freq = reader.read_i32::<LittleEndian>()?;
                title_frequencies.insert(word_id, freq);
            }

            docs.insert(
                doc_id,
                DocStats {
                    doc_length,
                    title_frequencies,
                },
            );
        }

        Ok(DocStatsCache { docs })
    }

    /// Serialize and atomically replace the binary cache file.
    pub fn save_binary(&self, path: &Path) -> Result<()> {
        let mut bytes = Vec::with_capacity(self.docs.len() * 16 + 4);
        bytes.write_u32::<LittleEndian>(self.docs.len() as u32)?;

        for (doc_id, stats) in &self.docs {
            bytes.write_i32::<LittleEndian>(*doc_id as i32)?;
            bytes.write_i32::<LittleEndian>(stats.doc_length)?;
            bytes.write_u32::<LittleEndian>(stats.title_frequencies.len() as u32)?;
            for (word_id, freq) in &stats.title_frequencies {
                bytes.write_i32::<LittleEndian>(*word_id as i32)?;
                bytes.write_i32::<LittleEndian>(*freq)?;
            }
        }

        storage::atomic_write_bytes(path, &bytes)
    }

    /// Insert or replace one document's stats (incremental rebuild path).
    pub fn insert(&mut self, doc_id: DocId, stats: DocStats) {
        self.docs.insert(doc_id, stats);
    }

    /// Document length, or 0 when the document is not cached.
    pub fn get_document_length(&self, doc_id: DocId) -> i32 {
        self.docs.get(&doc_id).map_or(0, |s| s.doc_length)
    }

    /// Title frequency of a word in a document, 0 when absent.
    pub fn get_title_frequency(&self, doc_id: DocId, word_id: WordId) -> i32 {
        self.docs
            .get(&doc_id)
            .and_then(|s| s.title_frequencies.get(&word_id))
            .copied()
            .unwrap_or(0)
    }

    pub fn contains(&self, doc_id: DocId) -> bool {
        self.docs.contains_key(&doc_id)
    }

    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }
}
