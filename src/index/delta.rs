//! Delta index: a write-optimized inverted index for recently ingested
//! documents, mirrored to a single file and merged into the barrels
//! periodically. Delta entries take precedence on the query path by being
//! concatenated after barrel postings.

use std::collections::BTreeMap;
use std::path::Path;

use ahash::AHashMap;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::storage;
use crate::{DocId, WordId};

use super::posting::{Posting, WordStats};

/// In-memory delta index, same shape as one barrel.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeltaIndex {
    entries: AHashMap<WordId, Vec<Posting>>,
}

impl DeltaIndex {
    /// Create an empty delta index.
    pub fn new() -> Self {
        DeltaIndex::default()
    }

    /// Load the delta file. A missing or corrupted file reads as empty.
    pub fn load<P: AsRef<Path>>(path: P) -> Self {
        storage::read_json_or_default(path.as_ref())
    }

    /// Persist atomically.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        storage::atomic_write_json(path.as_ref(), self)
    }

    /// Append one posting under a word.
    pub fn add_posting(&mut self, word_id: WordId, posting: Posting) {
        self.entries.entry(word_id).or_default().push(posting);
    }

    /// Append one posting per word of a document's statistics.
    pub fn add_document(&mut self, doc_id: DocId, doc_stats: &BTreeMap<WordId, WordStats>) {
        for (word_id, stats) in doc_stats {
            self.add_posting(
                *word_id,
                Posting::new(doc_id, stats.weighted_frequency(), stats.merged_positions()),
            );
        }
    }

    /// Postings for a word, if any.
    pub fn get(&self, word_id: WordId) -> Option<&[Posting]> {
        self.entries.get(&word_id).map(Vec::as_slice)
    }

    /// Number of words with at least one delta posting.
    pub fn word_count(&self) -> usize {
        self.entries.len()
    }

    /// Total number of postings across all words.
    pub fn posting_count(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Consume the index, yielding its entries for a merge.
    pub fn into_entries(self) -> impl Iterator<Item = (WordId, Vec<Posting>)> {
        self.entries.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_round_trip_matches_barrel_shape() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("inverted_delta.json");

        let mut delta = DeltaIndex::new();
        delta.add_posting(12, Posting::new(3, 4, vec![0, 1]));
        delta.add_posting(12, Posting::new(9, 1, vec![5]));
        delta.save(&path).unwrap();

        // flat object keyed by word id, postings as triples
        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["12"][0][0], 3);
        assert_eq!(raw["12"][1][2][0], 5);

        let loaded = DeltaIndex::load(&path);
        assert_eq!(loaded.posting_count(), 2);
        assert_eq!(loaded.get(12).unwrap()[0], Posting::new(3, 4, vec![0, 1]));
    }

    #[test]
    fn test_missing_file_loads_empty() {
        let dir = TempDir::new().unwrap();
        let delta = DeltaIndex::load(dir.path().join("absent.json"));
        assert!(delta.is_empty());
        assert_eq!(delta.posting_count(), 0);
    }

    #[test]
    fn test_get_unknown_word() {
        let delta = DeltaIndex::new();
        assert!(delta.get(7).is_none());
    }
}
