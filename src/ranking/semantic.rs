//! Semantic re-ranking from precomputed embeddings.
//!
//! Two little-endian binary inputs: per-document 300-dim vectors and
//! per-word embeddings. Word vectors are unit-normalized on load; a query
//! vector is the normalized mean of its known word vectors.

use std::io::Cursor;
use std::path::Path;

use ahash::AHashMap;
use byteorder::{LittleEndian, ReadBytesExt};
use log::{info, warn};

use crate::DocId;
use crate::error::Result;

/// Dimensionality of document and word vectors.
pub const EMBEDDING_DIM: usize = 300;

/// Cosine-similarity re-ranker over precomputed vectors.
#[derive(Debug, Default)]
pub struct SemanticScorer {
    document_vectors: AHashMap<DocId, Vec<f32>>,
    word_embeddings: AHashMap<String, Vec<f32>>,
}

impl SemanticScorer {
    /// Load the scorer if both binary files exist; `None` disables semantic
    /// re-ranking for the session.
    pub fn load_if_present(doc_vectors_path: &Path, word_embeddings_path: &Path) -> Option<Self> {
        if !doc_vectors_path.exists() || !word_embeddings_path.exists() {
            warn!("[Semantic] Vector files not found, semantic re-ranking disabled");
            return None;
        }

        let mut scorer = SemanticScorer::default();
        match scorer.load(doc_vectors_path, word_embeddings_path) {
            Ok(()) if scorer.is_loaded() => {
                info!(
                    "[Semantic] Loaded {} document vectors and {} word embeddings",
                    scorer.document_vectors.len(),
                    scorer.word_embeddings.len()
                );
                Some(scorer)
            }
            Ok(()) => None,
            Err(e) => {
                warn!("[Semantic] Could not load vectors, re-ranking disabled: {e}");
                None
            }
        }
    }

    fn load(&mut self, doc_vectors_path: &Path, word_embeddings_path: &Path) -> Result<()> {
        self.load_document_vectors(doc_vectors_path)?;
        self.load_word_embeddings(word_embeddings_path)?;
        Ok(())
    }

    /// `i32 num_docs`, then per doc `i32 doc_id` + `f32[300]`.
    fn load_document_vectors(&mut self, path: &Path) -> Result<()> {
        let bytes = std::fs::read(path)?;
        let mut reader = Cursor::new(bytes);

        let num_docs = reader.read_i32::<LittleEndian>()?;
        self.document_vectors.clear();
        self.document_vectors.reserve(num_docs.max(0) as usize);

        for _ in 0..num_docs {
            let doc_id = reader.read_i32::<LittleEndian>()? as DocId;
            let mut vector = vec![0.0f32; EMBEDDING_DIM];
            reader.read_f32_into::<LittleEndian>(&mut vector)?;
            self.document_vectors.insert(doc_id, vector);
        }
        Ok(())
    }

    /// `i32 num_words`, then per word `i32 len` + utf-8 bytes + `f32[300]`.
    /// Word vectors are unit-normalized here.
    fn load_word_embeddings(&mut self, path: &Path) -> Result<()> {
        let bytes = std::fs::read(path)?;
        let mut reader = Cursor::new(bytes);

        let num_words = reader.read_i32::<LittleEndian>()?;
        self.word_embeddings.clear();
        self.word_embeddings.reserve(num_words.max(0) as usize);

        for _ in 0..num_words {
            let len = reader.read_i32::<LittleEndian>()?.max(0) as usize;
            let mut word_bytes = vec![0u8; len];
            std::io::Read::read_exact(&mut reader, &mut word_bytes)?;
            let word = String::from_utf8_lossy(&word_bytes).into_owned();

            let mut vector = vec![0.0f32; EMBEDDING_DIM];
            reader.read_f32_into::<LittleEndian>(&mut vector)?;
            normalize(&mut vector);
            self.word_embeddings.insert(word, vector);
        }
        Ok(())
    }

    /// Whether both vector sets are non-empty.
    pub fn is_loaded(&self) -> bool {
        !self.document_vectors.is_empty() && !self.word_embeddings.is_empty()
    }

    /// Normalized mean of the known word vectors; the zero vector when no
    /// query word is known.
    pub fn query_vector(&self, query_words: &[String]) -> Vec<f32> {
        let mut query_vec = vec![0.0f32; EMBEDDING_DIM];
        let mut known_words = 0usize;

        for word in query_words {
            if let Some(vector) = self.word_embeddings.get(word) {
                for (acc, v) in query_vec.iter_mut().zip(vector) {
                    *acc += v;
                }
                known_words += 1;
            }
        }

        if known_words == 0 {
            return query_vec;
        }
        for v in &mut query_vec {
            *v /= known_words as f32;
        }
        normalize(&mut query_vec);
        query_vec
    }

    /// Cosine similarity between the document and the query, clamped to
    /// `[0, 1]`. Returns 0 when either vector is absent or zero.
    pub fn compute_similarity(&self, doc_id: DocId, query_words: &[String]) -> f64 {
        if !self.is_loaded() {
            return 0.0;
        }
        let doc_vec = match self.document_vectors.get(&doc_id) {
            Some(v) => v,
            None => return 0.0,
        };
        let query_vec = self.query_vector(query_words);
        if query_vec.iter().all(|&v| v == 0.0) {
            return 0.0;
        }
        cosine_similarity(&query_vec, doc_vec).clamp(0.0, 1.0)
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() {
        return 0.0;
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (&x, &y) in a.iter().zip(b) {
        dot += x as f64 * y as f64;
        norm_a += x as f64 * x as f64;
        norm_b += y as f64 * y as f64;
    }

    let norm = norm_a.sqrt() * norm_b.sqrt();
    if norm == 0.0 { 0.0 } else { dot / norm }
}

fn normalize(vector: &mut [f32]) {
    let norm: f32 = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        for v in vector {
            *v /= norm;
        }
    }
}
