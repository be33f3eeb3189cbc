//! The lexicon: a bijection between normalized tokens and dense word ids.
//!
//! Ids are assigned once and never renumbered; `update_from_tokens` only
//! appends. The initial build sorts the vocabulary lexicographically so a
//! given corpus always yields the same ids.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use ahash::AHashMap;
use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::WordId;
use crate::analysis::TextAnalyzer;
use crate::error::{PapyrusError, Result};
use crate::storage;

/// Filter parameters for the initial corpus build.
#[derive(Debug, Clone)]
pub struct LexiconBuildOptions {
    /// Minimum document frequency for a token to be admitted.
    pub min_frequency: u32,
    /// Keep the bottom P% of document frequencies; tokens above the cutoff
    /// are treated as too common to be useful.
    pub max_frequency_percentile: u32,
}

impl Default for LexiconBuildOptions {
    fn default() -> Self {
        LexiconBuildOptions {
            min_frequency: 1,
            max_frequency_percentile: 100,
        }
    }
}

/// Persistent form of the lexicon.
#[derive(Debug, Default, Serialize, Deserialize)]
struct LexiconFile {
    word_to_index: AHashMap<String, WordId>,
    index_to_word: Vec<String>,
    total_words: usize,
}

/// A bijection between words and dense word ids.
#[derive(Debug)]
pub struct Lexicon {
    word_to_index: AHashMap<String, WordId>,
    index_to_word: Vec<String>,
    analyzer: TextAnalyzer,
}

impl Lexicon {
    /// Create an empty lexicon with the default analyzer.
    pub fn new() -> Result<Self> {
        Ok(Lexicon {
            word_to_index: AHashMap::new(),
            index_to_word: Vec::new(),
            analyzer: TextAnalyzer::new()?,
        })
    }

    /// Create an empty lexicon with a custom analyzer (e.g. loaded stopwords).
    pub fn with_analyzer(analyzer: TextAnalyzer) -> Self {
        Lexicon {
            word_to_index: AHashMap::new(),
            index_to_word: Vec::new(),
            analyzer,
        }
    }

    /// The analyzer used for significance checks.
    pub fn analyzer(&self) -> &TextAnalyzer {
        &self.analyzer
    }

    /// Number of words in the lexicon.
    pub fn len(&self) -> usize {
        self.index_to_word.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index_to_word.is_empty()
    }

    /// Resolve a word to its id. Lowercases before lookup.
    pub fn get_word_index(&self, word: &str) -> Option<WordId> {
        self.word_to_index.get(&word.to_lowercase()).copied()
    }

    /// Resolve an id back to its word. Bounds-checked.
    pub fn get_word(&self, id: WordId) -> Option<&str> {
        self.index_to_word.get(id as usize).map(String::as_str)
    }

    pub fn contains(&self, word: &str) -> bool {
        self.get_word_index(word).is_some()
    }

    /// Iterate the vocabulary in id order.
    pub fn words(&self) -> impl Iterator<Item = &str> {
        self.index_to_word.iter().map(String::as_str)
    }

    /// Build the lexicon from a JSONL corpus.
    ///
    /// Each record contributes its token list; a token's document frequency
    /// counts it at most once per document. After the scan, tokens failing
    /// the significance filters, the minimum document frequency, or the
    /// percentile cutoff are dropped. The survivors are sorted
    /// lexicographically and assigned dense ids in order.
    pub fn build_from_corpus<P: AsRef<Path>>(
        &mut self,
        corpus_path: P,
        options: &LexiconBuildOptions,
    ) -> Result<()> {
        let file = File::open(corpus_path.as_ref()).map_err(|e| {
            PapyrusError::analysis(format!(
                "Could not open corpus {}: {e}",
                corpus_path.as_ref().display()
            ))
        })?;

        let mut doc_frequencies: AHashMap<String, u32> = AHashMap::new();
        let mut total_documents = 0usize;

        for line in BufReader::new(file).lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let tokens = match corpus_line_tokens(&line, &self.analyzer) {
                Some(tokens) => tokens,
                None => {
                    warn!("[Lexicon] Skipping malformed corpus line");
                    continue;
                }
            };

            let mut seen = ahash::AHashSet::new();
            for token in tokens {
                let token = token.to_lowercase();
                if seen.insert(token.clone()) {
                    *doc_frequencies.entry(token).or_insert(0) += 1;
                }
            }
            total_documents += 1;
        }

        info!(
            "[Lexicon] Scanned {total_documents} documents, {} unique tokens",
            doc_frequencies.len()
        );

        // Upper cutoff: keep the bottom P% of document frequencies.
        let mut freqs: Vec<u32> = doc_frequencies.values().copied().collect();
        freqs.sort_unstable();
        let max_freq = percentile_cutoff(&freqs, options.max_frequency_percentile);

        let mut significant: Vec<String> = doc_frequencies
            .into_iter()
            .filter(|(word, df)| {
                self.analyzer.is_significant(word)
                    && *df >= options.min_frequency
                    && max_freq.map_or(true, |cutoff| *df <= cutoff)
            })
            .map(|(word, _)| word)
            .collect();
        significant.sort_unstable();

        self.word_to_index = significant
            .iter()
            .enumerate()
            .map(|(i, w)| (w.clone(), i as WordId))
            .collect();
        self.index_to_word = significant;

        info!("[Lexicon] Kept {} significant words", self.len());
        Ok(())
    }

    /// Admit new tokens, assigning the next dense ids. Existing entries are
    /// never renumbered. Persists atomically when at least one word was
    /// added, and returns the added words in assignment order.
    pub fn update_from_tokens<P: AsRef<Path>>(
        &mut self,
        tokens: &[String],
        persist_path: P,
    ) -> Result<Vec<String>> {
        let mut added = Vec::new();

        for token in tokens {
            let word = token.to_lowercase();
            if self.word_to_index.contains_key(&word) || !self.analyzer.is_significant(&word) {
                continue;
            }
            let id = self.index_to_word.len() as WordId;
            self.word_to_index.insert(word.clone(), id);
            self.index_to_word.push(word.clone());
            added.push(word);
        }

        if !added.is_empty() {
            self.save(persist_path)?;
            info!("[Lexicon] Admitted {} new words", added.len());
        }
        Ok(added)
    }

    /// Load the lexicon from its persistent JSON form. A missing file is an
    /// error; a corrupted file is treated as empty with a warning.
    pub fn load<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        let path = path.as_ref();
        let file: LexiconFile = match storage::read_json(path) {
            Ok(file) => file,
            Err(PapyrusError::Io(e)) => {
                return Err(PapyrusError::storage(format!(
                    "Could not open lexicon {}: {e}",
                    path.display()
                )));
            }
            Err(e) => {
                warn!(
                    "[Lexicon] Corrupted lexicon file {}, starting empty: {e}",
                    path.display()
                );
                LexiconFile::default()
            }
        };

        self.index_to_word = file.index_to_word;
        self.word_to_index = if file.word_to_index.is_empty() {
            // Recover the lookup side from the reverse structure.
            self.index_to_word
                .iter()
                .enumerate()
                .map(|(i, w)| (w.clone(), i as WordId))
                .collect()
        } else {
            file.word_to_index
        };

        info!("[Lexicon] Loaded {} entries", self.len());
        Ok(())
    }

    /// Persist the lexicon atomically.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = LexiconFile {
            word_to_index: self.word_to_index.clone(),
            index_to_word: self.index_to_word.clone(),
            total_words: self.index_to_word.len(),
        };
        storage::atomic_write_json(path.as_ref(), &file)
    }
}

/// Extract a token list from one corpus line. Supports pre-tokenized
/// `title_tokens`/`body_tokens`, a legacy `tokens` array, or raw
/// `title`/`body`/`abstract` text.
pub(crate) fn corpus_line_tokens(line: &str, analyzer: &TextAnalyzer) -> Option<Vec<String>> {
    #[derive(Deserialize)]
    struct CorpusRecord {
        #[serde(default)]
        title_tokens: Option<Vec<String>>,
        #[serde(default)]
        body_tokens: Option<Vec<String>>,
        #[serde(default)]
        tokens: Option<Vec<String>>,
        #[serde(default)]
        title: Option<String>,
        #[serde(default)]
        body: Option<String>,
        #[serde(default, rename = "abstract")]
        abstract_text: Option<String>,
    }

    let record: CorpusRecord = serde_json::from_str(line).ok()?;

    if record.title_tokens.is_some() || record.body_tokens.is_some() {
        let mut tokens = record.title_tokens.unwrap_or_default();
        tokens.extend(record.body_tokens.unwrap_or_default());
        return Some(tokens);
    }
    if let Some(tokens) = record.tokens {
        return Some(tokens);
    }

    let mut text = record.title.unwrap_or_default();
    if let Some(body) = record.body.or(record.abstract_text) {
        text.push(' ');
        text.push_str(&body);
    }
    Some(analyzer.tokenize(&text))
}

/// Document-frequency cutoff keeping the bottom `percentile`% of `freqs`
/// (which must be sorted ascending). `None` means no cutoff.
fn percentile_cutoff(freqs: &[u32], percentile: u32) -> Option<u32> {
    if freqs.is_empty() || percentile >= 100 {
        return None;
    }
    let keep_count = ((freqs.len() * percentile as usize) / 100).max(1);
    Some(freqs[keep_count - 1])
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn write_corpus(dir: &TempDir, lines: &[&str]) -> std::path::PathBuf {
        let path = dir.path().join("corpus.jsonl");
        let mut file = File::create(&path).unwrap();
        for line in lines {
            writeln!(file, "{line}").unwrap();
        }
        path
    }

    #[test]
    fn test_build_assigns_sorted_dense_ids() {
        let dir = TempDir::new().unwrap();
        let corpus = write_corpus(
            &dir,
            &[
                r#"{"tokens":["alpha","beta","alpha"]}"#,
                r#"{"tokens":["beta","gamma"]}"#,
            ],
        );

        let mut lexicon = Lexicon::new().unwrap();
        lexicon
            .build_from_corpus(&corpus, &LexiconBuildOptions::default())
            .unwrap();

        assert_eq!(lexicon.len(), 3);
        assert_eq!(lexicon.get_word_index("alpha"), Some(0));
        assert_eq!(lexicon.get_word_index("beta"), Some(1));
        assert_eq!(lexicon.get_word_index("gamma"), Some(2));
    }

    #[test]
    fn test_bijection_invariant() {
        let dir = TempDir::new().unwrap();
        let corpus = write_corpus(&dir, &[r#"{"tokens":["delta","epsilon","zeta"]}"#]);

        let mut lexicon = Lexicon::new().unwrap();
        lexicon
            .build_from_corpus(&corpus, &LexiconBuildOptions::default())
            .unwrap();

        for id in 0..lexicon.len() as WordId {
            let word = lexicon.get_word(id).unwrap().to_string();
            assert_eq!(lexicon.get_word_index(&word), Some(id));
        }
    }

    #[test]
    fn test_build_filters_insignificant_tokens() {
        let dir = TempDir::new().unwrap();
        let corpus = write_corpus(&dir, &[r#"{"tokens":["alpha","the","ab","123"]}"#]);

        let mut lexicon = Lexicon::new().unwrap();
        lexicon
            .build_from_corpus(&corpus, &LexiconBuildOptions::default())
            .unwrap();

        assert_eq!(lexicon.len(), 1);
        assert!(lexicon.contains("alpha"));
    }

    #[test]
    fn test_percentile_excludes_most_frequent() {
        let dir = TempDir::new().unwrap();
        // "common" appears in all three docs, the others in one each.
        let corpus = write_corpus(
            &dir,
            &[
                r#"{"tokens":["common","alpha"]}"#,
                r#"{"tokens":["common","beta"]}"#,
                r#"{"tokens":["common","gamma"]}"#,
            ],
        );

        let mut lexicon = Lexicon::new().unwrap();
        let options = LexiconBuildOptions {
            min_frequency: 1,
            max_frequency_percentile: 75,
        };
        lexicon.build_from_corpus(&corpus, &options).unwrap();

        assert!(!lexicon.contains("common"));
        assert!(lexicon.contains("alpha"));
        assert!(lexicon.contains("beta"));
        assert!(lexicon.contains("gamma"));
    }

    #[test]
    fn test_update_from_tokens_is_append_only() {
        let dir = TempDir::new().unwrap();
        let corpus = write_corpus(&dir, &[r#"{"tokens":["alpha","gamma"]}"#]);
        let persist = dir.path().join("lexicon.json");

        let mut lexicon = Lexicon::new().unwrap();
        lexicon
            .build_from_corpus(&corpus, &LexiconBuildOptions::default())
            .unwrap();
        let before: Vec<(String, WordId)> = lexicon
            .words()
            .map(|w| (w.to_string(), lexicon.get_word_index(w).unwrap()))
            .collect();

        let added = lexicon
            .update_from_tokens(
                &["beta".to_string(), "alpha".to_string(), "the".to_string()],
                &persist,
            )
            .unwrap();

        // only the genuinely new significant word was admitted, at the end
        assert_eq!(added, vec!["beta".to_string()]);
        assert_eq!(lexicon.get_word_index("beta"), Some(2));
        for (word, id) in before {
            assert_eq!(lexicon.get_word_index(&word), Some(id));
        }

        // a second update with the same tokens changes nothing
        let added = lexicon
            .update_from_tokens(&["beta".to_string()], &persist)
            .unwrap();
        assert!(added.is_empty());
        assert_eq!(lexicon.len(), 3);
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = TempDir::new().unwrap();
        let corpus = write_corpus(&dir, &[r#"{"tokens":["alpha","beta"]}"#]);
        let path = dir.path().join("lexicon.json");

        let mut lexicon = Lexicon::new().unwrap();
        lexicon
            .build_from_corpus(&corpus, &LexiconBuildOptions::default())
            .unwrap();
        lexicon.save(&path).unwrap();

        let mut loaded = Lexicon::new().unwrap();
        loaded.load(&path).unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded.get_word_index("Alpha"), Some(0));
        assert_eq!(loaded.get_word(1), Some("beta"));
    }

    #[test]
    fn test_load_corrupted_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("lexicon.json");
        std::fs::write(&path, b"{broken").unwrap();

        let mut lexicon = Lexicon::new().unwrap();
        lexicon.load(&path).unwrap();
        assert!(lexicon.is_empty());
    }

    #[test]
    fn test_raw_text_corpus_records() {
        let dir = TempDir::new().unwrap();
        let corpus = write_corpus(
            &dir,
            &[r#"{"title":"Graph Theory","abstract":"Spectral methods."}"#],
        );

        let mut lexicon = Lexicon::new().unwrap();
        lexicon
            .build_from_corpus(&corpus, &LexiconBuildOptions::default())
            .unwrap();

        assert!(lexicon.contains("graph"));
        assert!(lexicon.contains("spectral"));
        assert!(lexicon.contains("methods"));
    }
}
