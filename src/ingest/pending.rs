//! Pending documents: tokenized uploads awaiting their batch flush.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Instant;

use crate::index::forward::{ForwardDocData, WordEntry};
use crate::index::posting::WordStats;
use crate::lexicon::Lexicon;
use crate::{DocId, WordId};

/// A tokenized document handed from the processing pool to the batch writer.
#[derive(Debug, Clone)]
pub struct PendingDocument {
    pub doc_id: DocId,
    pub title: String,
    /// Raw body tokens from the extractor.
    pub tokens: Vec<String>,
    /// Lexicon-filtered statistics (body-only at this stage).
    pub doc_stats: BTreeMap<WordId, WordStats>,
    pub url: String,
    pub pdf_path: PathBuf,
    /// Stamped by the writer when the document enters its queue.
    pub enqueue_time: Option<Instant>,
}

impl PendingDocument {
    /// The forward record this document flushes as. The title is not
    /// tokenized at ingest time, so title statistics are empty and the body
    /// spans the whole token stream.
    pub fn forward_data(&self) -> ForwardDocData {
        ForwardDocData {
            doc_length: self.tokens.len() as u32,
            title_length: 0,
            body_length: self.tokens.len() as u32,
            words: self
                .doc_stats
                .iter()
                .map(|(id, stats)| (*id, WordEntry::from_stats(stats)))
                .collect(),
        }
    }
}

/// Collect body statistics for every extractor token the lexicon knows.
/// Positions index the full token stream, including unknown tokens.
pub fn build_doc_stats(tokens: &[String], lexicon: &Lexicon) -> BTreeMap<WordId, WordStats> {
    let mut doc_stats: BTreeMap<WordId, WordStats> = BTreeMap::new();
    for (pos, token) in tokens.iter().enumerate() {
        if let Some(word_id) = lexicon.get_word_index(token) {
            doc_stats
                .entry(word_id)
                .or_default()
                .add_body_occurrence(pos as u32);
        }
    }
    doc_stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexicon::LexiconBuildOptions;
    use tempfile::TempDir;

    fn lexicon_with(words: &[&str]) -> Lexicon {
        let dir = TempDir::new().unwrap();
        let corpus = dir.path().join("corpus.jsonl");
        let tokens: Vec<String> = words.iter().map(|w| format!("\"{w}\"")).collect();
        std::fs::write(&corpus, format!("{{\"tokens\":[{}]}}\n", tokens.join(","))).unwrap();
        let mut lexicon = Lexicon::new().unwrap();
        lexicon
            .build_from_corpus(&corpus, &LexiconBuildOptions::default())
            .unwrap();
        lexicon
    }

    #[test]
    fn test_doc_stats_skip_unknown_tokens_but_keep_positions() {
        let lexicon = lexicon_with(&["alpha", "beta"]);
        let tokens: Vec<String> = ["alpha", "unknown", "beta", "alpha"]
            .iter()
            .map(|s| s.to_string())
            .collect();

        let stats = build_doc_stats(&tokens, &lexicon);
        assert_eq!(stats.len(), 2);
        assert_eq!(stats[&0].body_positions, vec![0, 3]);
        assert_eq!(stats[&0].body_frequency, 2);
        assert_eq!(stats[&1].body_positions, vec![2]);
    }

    #[test]
    fn test_forward_data_counts_all_tokens() {
        let lexicon = lexicon_with(&["alpha"]);
        let tokens: Vec<String> = ["alpha", "unknown"].iter().map(|s| s.to_string()).collect();
        let doc = PendingDocument {
            doc_id: 1,
            title: "T".to_string(),
            doc_stats: build_doc_stats(&tokens, &lexicon),
            tokens,
            url: String::new(),
            pdf_path: PathBuf::new(),
            enqueue_time: None,
        };

        let data = doc.forward_data();
        assert_eq!(data.doc_length, 2);
        assert_eq!(data.title_length, 0);
        assert_eq!(data.words[&0].weighted_frequency, 1);
    }
}
