//! Barreled inverted index.
//!
//! Word ids are partitioned across `N` barrel files by `word_id % N`; each
//! barrel maps word ids to posting lists.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use ahash::AHashMap;
use log::info;
use rayon::prelude::*;

use crate::error::Result;
use crate::storage;
use crate::{DocId, WordId};

use super::delta::DeltaIndex;
use super::forward;
use super::posting::{Posting, WordStats};

/// In-memory form of one barrel file: word id to posting list.
pub type BarrelMap = AHashMap<WordId, Vec<Posting>>;

/// File name of barrel `k` inside the barrel directory.
pub fn barrel_file_name(barrel_id: usize) -> String {
    format!("inverted_barrel_{barrel_id}.json")
}

/// Builds barrels from the forward index and merges the delta into them.
#[derive(Debug, Clone)]
pub struct InvertedIndexBuilder {
    num_barrels: usize,
}

impl InvertedIndexBuilder {
    pub fn new(num_barrels: usize) -> Self {
        InvertedIndexBuilder { num_barrels }
    }

    /// The barrel owning a word id.
    pub fn barrel_id(&self, word_id: WordId) -> usize {
        word_id as usize % self.num_barrels
    }

    /// Path of barrel `k` under `barrel_dir`.
    pub fn barrel_path(&self, barrel_dir: &Path, barrel_id: usize) -> PathBuf {
        barrel_dir.join(barrel_file_name(barrel_id))
    }

    /// Build every barrel from scratch by streaming the forward index.
    /// Only non-empty barrels are written.
    pub fn build<P: AsRef<Path>, Q: AsRef<Path>>(
        &self,
        forward_path: P,
        barrel_dir: Q,
    ) -> Result<usize> {
        let barrel_dir = barrel_dir.as_ref();
        std::fs::create_dir_all(barrel_dir)?;

        let mut barrels: Vec<BarrelMap> = vec![BarrelMap::new(); self.num_barrels];
        let mut docs = 0usize;

        forward::for_each_record(forward_path, |doc_id, data| {
            for (word_id, entry) in &data.words {
                let posting =
                    Posting::new(doc_id, entry.weighted_frequency, entry.merged_positions());
                barrels[*word_id as usize % self.num_barrels]
                    .entry(*word_id)
                    .or_default()
                    .push(posting);
            }
            docs += 1;
            if docs % 5000 == 0 {
                info!("[InvertedIndex] Inverted {docs} documents...");
            }
        })?;

        let written = barrels
            .par_iter()
            .enumerate()
            .filter(|(_, barrel)| !barrel.is_empty())
            .map(|(barrel_id, barrel)| {
                storage::atomic_write_json(&self.barrel_path(barrel_dir, barrel_id), barrel)
            })
            .collect::<Result<Vec<_>>>()?
            .len();

        info!("[InvertedIndex] Inverted {docs} documents into {written} barrels");
        Ok(written)
    }

    /// Load one barrel. A missing or corrupted file reads as empty.
    pub fn load_barrel(&self, barrel_dir: &Path, barrel_id: usize) -> BarrelMap {
        storage::read_json_or_default(&self.barrel_path(barrel_dir, barrel_id))
    }

    /// Record a freshly ingested document in the delta file: load, append
    /// one posting per word, atomic replace.
    pub fn update_delta_barrel<P: AsRef<Path>>(
        &self,
        delta_path: P,
        doc_id: DocId,
        doc_stats: &BTreeMap<WordId, WordStats>,
    ) -> Result<()> {
        let mut delta = DeltaIndex::load(delta_path.as_ref());
        delta.add_document(doc_id, doc_stats);
        delta.save(delta_path.as_ref())
    }

    /// Merge all delta postings into their owning barrels, then truncate the
    /// delta file to `{}`. Postings keep their order within each list.
    pub fn merge_delta_to_main<P: AsRef<Path>, Q: AsRef<Path>>(
        &self,
        delta_path: P,
        barrel_dir: Q,
    ) -> Result<()> {
        let delta_path = delta_path.as_ref();
        let barrel_dir = barrel_dir.as_ref();

        let delta = DeltaIndex::load(delta_path);
        if delta.is_empty() {
            return Ok(());
        }

        // Group by owning barrel so each barrel file is rewritten once.
        let mut by_barrel: AHashMap<usize, Vec<(WordId, Vec<Posting>)>> = AHashMap::new();
        for (word_id, postings) in delta.into_entries() {
            by_barrel
                .entry(word_id as usize % self.num_barrels)
                .or_default()
                .push((word_id, postings));
        }

        let affected = by_barrel.len();
        by_barrel
            .into_iter()
            .collect::<Vec<_>>()
            .into_par_iter()
            .map(|(barrel_id, updates)| {
                let mut barrel = self.load_barrel(barrel_dir, barrel_id);
                for (word_id, postings) in updates {
                    barrel.entry(word_id).or_default().extend(postings);
                }
                storage::atomic_write_json(&self.barrel_path(barrel_dir, barrel_id), &barrel)
            })
            .collect::<Result<Vec<_>>>()?;

        DeltaIndex::new().save(delta_path)?;
        info!("[InvertedIndex] Merged delta into {affected} barrels");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::forward::{ForwardDocData, append_document};
    use crate::lexicon::{Lexicon, LexiconBuildOptions};
    use tempfile::TempDir;

    fn fixture(dir: &TempDir) -> (Lexicon, PathBuf) {
        let corpus = dir.path().join("corpus.jsonl");
        std::fs::write(&corpus, "{\"tokens\":[\"alpha\",\"beta\"]}\n").unwrap();
        let mut lexicon = Lexicon::new().unwrap();
        lexicon
            .build_from_corpus(&corpus, &LexiconBuildOptions::default())
            .unwrap();

        let forward = dir.path().join("forward_index.jsonl");
        let data = ForwardDocData::from_tokens(
            &["alpha".to_string()],
            &["beta".to_string(), "alpha".to_string()],
            &lexicon,
        );
        append_document(&forward, 0, &data).unwrap();
        (lexicon, forward)
    }

    #[test]
    fn test_build_two_barrels() {
        let dir = TempDir::new().unwrap();
        let (_lexicon, forward) = fixture(&dir);
        let barrels = dir.path().join("barrels");

        let builder = InvertedIndexBuilder::new(2);
        let written = builder.build(&forward, &barrels).unwrap();
        assert_eq!(written, 2);

        // word 0 (alpha) lands in barrel 0 with merged positions
        let barrel0 = builder.load_barrel(&barrels, 0);
        assert_eq!(barrel0[&0], vec![Posting::new(0, 4, vec![0, 1])]);

        // word 1 (beta) lands in barrel 1
        let barrel1 = builder.load_barrel(&barrels, 1);
        assert_eq!(barrel1[&1], vec![Posting::new(0, 1, vec![0])]);
    }

    #[test]
    fn test_barrel_partitioning_invariant() {
        let dir = TempDir::new().unwrap();
        let (_lexicon, forward) = fixture(&dir);
        let barrels = dir.path().join("barrels");

        let builder = InvertedIndexBuilder::new(2);
        builder.build(&forward, &barrels).unwrap();

        for barrel_id in 0..2 {
            let barrel = builder.load_barrel(&barrels, barrel_id);
            for word_id in barrel.keys() {
                assert_eq!(*word_id as usize % 2, barrel_id);
            }
        }
    }

    #[test]
    fn test_missing_barrel_loads_empty() {
        let dir = TempDir::new().unwrap();
        let builder = InvertedIndexBuilder::new(2);
        assert!(builder.load_barrel(dir.path(), 1).is_empty());
    }

    #[test]
    fn test_update_delta_barrel_single_document() {
        let dir = TempDir::new().unwrap();
        let delta_path = dir.path().join("inverted_delta.json");

        let mut stats = WordStats::default();
        stats.add_title_occurrence(0);
        stats.add_body_occurrence(2);
        let mut doc_stats = BTreeMap::new();
        doc_stats.insert(4u32, stats);

        let builder = InvertedIndexBuilder::new(2);
        builder.update_delta_barrel(&delta_path, 11, &doc_stats).unwrap();

        let delta = DeltaIndex::load(&delta_path);
        assert_eq!(delta.get(4).unwrap(), &[Posting::new(11, 4, vec![0, 2])]);

        // a second document appends, never overwrites
        let mut stats = WordStats::default();
        stats.add_body_occurrence(0);
        let mut doc_stats = BTreeMap::new();
        doc_stats.insert(4u32, stats);
        builder.update_delta_barrel(&delta_path, 12, &doc_stats).unwrap();

        let delta = DeltaIndex::load(&delta_path);
        assert_eq!(delta.get(4).unwrap().len(), 2);
    }

    #[test]
    fn test_merge_delta_to_main() {
        let dir = TempDir::new().unwrap();
        let barrels = dir.path().join("barrels");
        std::fs::create_dir_all(&barrels).unwrap();
        let delta_path = barrels.join("inverted_delta.json");

        let builder = InvertedIndexBuilder::new(2);

        // seed barrel 0 with an existing posting for word 2
        let mut barrel0 = BarrelMap::new();
        barrel0.insert(2, vec![Posting::new(1, 3, vec![0])]);
        storage::atomic_write_json(&builder.barrel_path(&barrels, 0), &barrel0).unwrap();

        // delta holds a newer posting for word 2 and one for word 3
        let mut delta = DeltaIndex::new();
        delta.add_posting(2, Posting::new(5, 1, vec![4]));
        delta.add_posting(3, Posting::new(5, 2, vec![0, 7]));
        delta.save(&delta_path).unwrap();

        builder.merge_delta_to_main(&delta_path, &barrels).unwrap();

        let barrel0 = builder.load_barrel(&barrels, 0);
        assert_eq!(
            barrel0[&2],
            vec![Posting::new(1, 3, vec![0]), Posting::new(5, 1, vec![4])]
        );
        let barrel1 = builder.load_barrel(&barrels, 1);
        assert_eq!(barrel1[&3], vec![Posting::new(5, 2, vec![0, 7])]);

        // the delta file is truncated to an empty object
        let merged = DeltaIndex::load(&delta_path);
        assert!(merged.is_empty());
        assert_eq!(
            std::fs::read_to_string(&delta_path).unwrap().trim(),
            "{}"
        );
    }
}
