//! The query engine: composes every read-side component into `search` and
//! `autocomplete`.
//!
//! Retrieval is conjunctive: a document must match every query word that
//! resolves in the lexicon. Per-term scores accumulate through the ranking
//! scorer, adjacent query words occurring adjacently in a document earn a
//! fixed proximity bonus, and an optional semantic re-rank blends in cosine
//! similarity from precomputed vectors.

use std::sync::Arc;

use ahash::AHashMap;
use log::{error, info};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;

use crate::config::Config;
use crate::analysis::TextAnalyzer;
use crate::error::Result;
use crate::index::{DeltaIndex, DocStatsCache, InvertedIndexBuilder, Posting};
use crate::lexicon::{Lexicon, Trie};
use crate::metadata::{DocUrlMapper, DocumentMetadata};
use crate::ranking::{RankingScorer, SemanticScorer};
use crate::{DocId, WordId};

use super::barrel_cache::BarrelCache;

/// Fixed bonus per adjacent query-word pair occurring adjacently in a doc.
const PROXIMITY_BONUS: f64 = 100.0;

/// Result cap per query.
const MAX_RESULTS: usize = 50;

/// Blend factor of the lexical score under semantic re-ranking.
const LEXICAL_BLEND: f64 = 0.6;

/// One ranked search result.
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    #[serde(rename = "docId")]
    pub doc_id: DocId,
    pub score: f64,
    pub url: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub publication_year: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cited_by_count: Option<u32>,
}

/// Response body of the search endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct SearchResponse {
    pub query: String,
    pub results: Vec<SearchHit>,
}

/// Response body of the autocomplete endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct AutocompleteResponse {
    pub prefix: String,
    pub suggestions: Vec<String>,
}

/// Read-mostly composition of all search-path components.
pub struct QueryEngine {
    config: Config,
    analyzer: TextAnalyzer,
    lexicon: Arc<RwLock<Lexicon>>,
    trie: Arc<RwLock<Trie>>,
    metadata: RwLock<DocumentMetadata>,
    url_mapper: RwLock<DocUrlMapper>,
    doc_stats: RwLock<DocStatsCache>,
    delta: RwLock<DeltaIndex>,
    barrel_cache: Mutex<BarrelCache>,
    inverted: InvertedIndexBuilder,
    ranker: RankingScorer,
    semantic: Option<SemanticScorer>,
}

impl QueryEngine {
    /// Open the engine over the shared lexicon and trie. Optional inputs
    /// (metadata, delta, stats cache, semantic vectors) load best-effort.
    pub fn open(
        config: Config,
        lexicon: Arc<RwLock<Lexicon>>,
        trie: Arc<RwLock<Trie>>,
    ) -> Result<Self> {
        if lexicon.read().is_empty() {
            error!("[Engine] CRITICAL: lexicon is empty, every query will return nothing");
        }

        let doc_stats = match DocStatsCache::load_binary(&config.doc_stats_path()) {
            Ok(cache) => cache,
            // The binary cache belongs to the writer; recover in memory only.
            Err(_) => DocStatsCache::rebuild_from_forward(&config.forward_index_path())
                .unwrap_or_default(),
        };

        let semantic = SemanticScorer::load_if_present(
            &config.document_vectors_path(),
            &config.word_embeddings_path(),
        );

        let engine = QueryEngine {
            analyzer: TextAnalyzer::new()?,
            metadata: RwLock::new(DocumentMetadata::load(config.metadata_path())),
            url_mapper: RwLock::new(DocUrlMapper::load(config.url_map_path())),
            doc_stats: RwLock::new(doc_stats),
            delta: RwLock::new(DeltaIndex::load(config.delta_path())),
            barrel_cache: Mutex::new(BarrelCache::new(config.barrel_cache_capacity)),
            inverted: InvertedIndexBuilder::new(config.num_barrels),
            ranker: RankingScorer::new(config.ranking_weights),
            semantic,
            lexicon,
            trie,
            config,
        };
        info!("[Engine] Query engine ready");
        Ok(engine)
    }

    /// Run a ranked multi-term query.
    pub fn search(&self, query: &str) -> SearchResponse {
        let query_words = self.analyzer.tokenize(query);

        // Resolve query words against the lexicon; unknown words are skipped.
        let resolved: Vec<(usize, WordId)> = {
            let lexicon = self.lexicon.read();
            query_words
                .iter()
                .filter_map(|word| lexicon.get_word_index(word))
                .enumerate()
                .collect()
        };

        if resolved.is_empty() {
            return SearchResponse {
                query: query.to_string(),
                results: Vec::new(),
            };
        }
        let valid_words = resolved.len();

        let mut doc_scores: AHashMap<DocId, f64> = AHashMap::new();
        let mut doc_matches: AHashMap<DocId, usize> = AHashMap::new();
        let mut doc_positions: AHashMap<DocId, Vec<Vec<u32>>> = AHashMap::new();

        {
            let metadata = self.metadata.read();
            let doc_stats = self.doc_stats.read();
            let delta = self.delta.read();

            for (term_index, word_id) in &resolved {
                for posting in self.term_postings(*word_id, &delta) {
                    let doc_id = posting.doc_id;
                    let components = self.ranker.score(
                        posting.weighted_frequency,
                        doc_stats.get_title_frequency(doc_id, *word_id),
                        &posting.positions,
                        doc_stats.get_document_length(doc_id),
                        doc_id,
                        metadata.get(doc_id),
                    );

                    *doc_scores.entry(doc_id).or_insert(0.0) += components.final_score;
                    *doc_matches.entry(doc_id).or_insert(0) += 1;
                    doc_positions
                        .entry(doc_id)
                        .or_insert_with(|| vec![Vec::new(); valid_words])[*term_index] =
                        posting.positions;
                }
            }
        }

        // AND filter: every resolved query word must be present.
        let mut scored: Vec<(DocId, f64)> = doc_scores
            .into_iter()
            .filter(|(doc_id, _)| doc_matches.get(doc_id) == Some(&valid_words))
            .collect();

        // Proximity bonus, at most once per adjacent query-word pair.
        for (doc_id, score) in &mut scored {
            if let Some(positions) = doc_positions.get(doc_id) {
                for pair in positions.windows(2) {
                    if has_adjacent_occurrence(&pair[0], &pair[1]) {
                        *score += PROXIMITY_BONUS;
                    }
                }
            }
        }

        if let Some(semantic) = &self.semantic {
            apply_semantic_rerank(semantic, &query_words, &mut scored);
        }

        // Order by score, then recency, then citations.
        let metadata = self.metadata.read();
        let url_mapper = self.url_mapper.read();
        let mut ranked: Vec<(DocId, f64, i32, u32)> = scored
            .into_iter()
            .map(|(doc_id, score)| {
                (
                    doc_id,
                    score,
                    metadata.publication_year(doc_id),
                    metadata.cited_by_count(doc_id),
                )
            })
            .collect();
        ranked.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.2.cmp(&a.2))
                .then_with(|| b.3.cmp(&a.3))
        });
        ranked.truncate(MAX_RESULTS);

        let results = ranked
            .into_iter()
            .map(|(doc_id, score, year, cited)| {
                let entry = metadata.get(doc_id);
                SearchHit {
                    doc_id,
                    score,
                    url: url_mapper.get(doc_id).to_string(),
                    title: metadata.title(doc_id).to_string(),
                    publication_year: entry.map(|_| year),
                    cited_by_count: entry.map(|_| cited),
                }
            })
            .collect();

        SearchResponse {
            query: query.to_string(),
            results,
        }
    }

    /// Prefix completion over the lexicon vocabulary.
    pub fn autocomplete(&self, prefix: &str, limit: usize) -> AutocompleteResponse {
        let clean_prefix: String = prefix
            .to_lowercase()
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect();
        let limit = limit.clamp(1, 50);

        let suggestions = self.trie.read().autocomplete(&clean_prefix, limit);
        AutocompleteResponse {
            prefix: clean_prefix,
            suggestions,
        }
    }

    /// Re-read the delta file. Also drops cached barrels, since a merge may
    /// have moved postings out of the delta and into rewritten barrel files.
    pub fn reload_delta_index(&self) {
        *self.delta.write() = DeltaIndex::load(self.config.delta_path());
        self.barrel_cache.lock().clear();
    }

    /// Re-read document metadata and the url mapping.
    pub fn reload_metadata(&self) {
        *self.metadata.write() = DocumentMetadata::load(self.config.metadata_path());
        *self.url_mapper.write() = DocUrlMapper::load(self.config.url_map_path());
    }

    /// Re-read the doc-stats binary written by the batch writer.
    pub fn reload_doc_stats(&self) {
        if let Ok(cache) = DocStatsCache::load_binary(&self.config.doc_stats_path()) {
            *self.doc_stats.write() = cache;
        }
    }

    /// Barrel postings (via the bounded cache) concatenated with delta
    /// postings for one word.
    fn term_postings(&self, word_id: WordId, delta: &DeltaIndex) -> Vec<Posting> {
        let barrel_id = self.inverted.barrel_id(word_id);
        let barrel = self.barrel_cache.lock().get_or_load(barrel_id, || {
            self.inverted
                .load_barrel(&self.config.barrels_dir(), barrel_id)
        });

        let mut postings: Vec<Posting> = barrel.get(&word_id).cloned().unwrap_or_default();
        if let Some(delta_postings) = delta.get(word_id) {
            postings.extend_from_slice(delta_postings);
        }
        postings
    }
}

/// Whether any position in `next` immediately follows a position in `prev`.
fn has_adjacent_occurrence(prev: &[u32], next: &[u32]) -> bool {
    next.iter()
        .any(|&b| prev.iter().any(|&a| b == a + 1))
}

/// Blend min-max-normalized semantic similarity into the lexical scores.
fn apply_semantic_rerank(
    semantic: &SemanticScorer,
    query_words: &[String],
    scored: &mut [(DocId, f64)],
) {
    if scored.is_empty() {
        return;
    }

    let similarities: Vec<f64> = scored
        .iter()
        .map(|(doc_id, _)| semantic.compute_similarity(*doc_id, query_words))
        .collect();

    let min = similarities.iter().cloned().fold(f64::INFINITY, f64::min);
    let max = similarities.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let range = max - min;

    for ((_, score), similarity) in scored.iter_mut().zip(similarities) {
        let normalized = if range > 0.0 {
            (similarity - min) / range
        } else {
            0.0
        };
        *score = LEXICAL_BLEND * *score + (1.0 - LEXICAL_BLEND) * normalized;
    }
}
