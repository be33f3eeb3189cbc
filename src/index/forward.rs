//! Forward index: one append-only JSON record per document.
//!
//! Each line is the envelope `{"doc_id": "<int>", "data": {...}}` so a
//! recovery pass can build a doc-id-to-offset map without parsing record
//! bodies.

use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::Path;

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::analysis::TextAnalyzer;
use crate::error::{PapyrusError, Result};
use crate::lexicon::Lexicon;
use crate::{DocId, WordId};

use super::posting::WordStats;

/// Per-word entry in a forward record.
///
/// Legacy records carry a single `frequency`/`positions` pair instead of the
/// title/body split; those deserialize with the legacy fields set and are
/// folded into `body_frequency`/`body_positions` by [`WordEntry::normalized`].
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct WordEntry {
    #[serde(default)]
    pub title_frequency: u32,
    #[serde(default)]
    pub body_frequency: u32,
    #[serde(default)]
    pub weighted_frequency: u32,
    #[serde(default)]
    pub title_positions: Vec<u32>,
    #[serde(default)]
    pub body_positions: Vec<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    frequency: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    positions: Option<Vec<u32>>,
}

impl WordEntry {
    /// Build an entry from in-memory word stats.
    pub fn from_stats(stats: &WordStats) -> Self {
        WordEntry {
            title_frequency: stats.title_frequency,
            body_frequency: stats.body_frequency,
            weighted_frequency: stats.weighted_frequency(),
            title_positions: stats.title_positions.clone(),
            body_positions: stats.body_positions.clone(),
            frequency: None,
            positions: None,
        }
    }

    /// Fold legacy single-frequency records into the canonical title/body
    /// split (`body_frequency = frequency`, `title_frequency = 0`).
    pub fn normalized(mut self) -> Self {
        if let Some(frequency) = self.frequency.take() {
            if self.title_frequency == 0 && self.body_frequency == 0 {
                self.body_frequency = frequency;
            }
        }
        if let Some(positions) = self.positions.take() {
            if self.title_positions.is_empty() && self.body_positions.is_empty() {
                self.body_positions = positions;
            }
        }
        if self.weighted_frequency == 0 {
            self.weighted_frequency =
                super::posting::TITLE_WEIGHT * self.title_frequency + self.body_frequency;
        }
        self
    }

    /// Title positions followed by body positions.
    pub fn merged_positions(&self) -> Vec<u32> {
        let mut positions =
            Vec::with_capacity(self.title_positions.len() + self.body_positions.len());
        positions.extend_from_slice(&self.title_positions);
        positions.extend_from_slice(&self.body_positions);
        positions
    }
}

/// Body of a forward record.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ForwardDocData {
    /// Total tokens after normalization (title + body).
    #[serde(default)]
    pub doc_length: u32,
    #[serde(default)]
    pub title_length: u32,
    #[serde(default)]
    pub body_length: u32,
    /// Word-id keyed statistics; only lexicon words appear.
    #[serde(default)]
    pub words: BTreeMap<WordId, WordEntry>,
}

impl ForwardDocData {
    /// Assemble a record from token streams, counting frequencies and
    /// positions for every token the lexicon knows.
    pub fn from_tokens(title_tokens: &[String], body_tokens: &[String], lexicon: &Lexicon) -> Self {
        let mut stats: BTreeMap<WordId, WordStats> = BTreeMap::new();

        for (pos, token) in title_tokens.iter().enumerate() {
            if let Some(id) = lexicon.get_word_index(token) {
                stats.entry(id).or_default().add_title_occurrence(pos as u32);
            }
        }
        for (pos, token) in body_tokens.iter().enumerate() {
            if let Some(id) = lexicon.get_word_index(token) {
                stats.entry(id).or_default().add_body_occurrence(pos as u32);
            }
        }

        ForwardDocData {
            doc_length: (title_tokens.len() + body_tokens.len()) as u32,
            title_length: title_tokens.len() as u32,
            body_length: body_tokens.len() as u32,
            words: stats
                .iter()
                .map(|(id, s)| (*id, WordEntry::from_stats(s)))
                .collect(),
        }
    }
}

/// One line of the forward index file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForwardRecord {
    /// Document id, serialized as a decimal string.
    pub doc_id: String,
    pub data: ForwardDocData,
}

impl ForwardRecord {
    pub fn new(doc_id: DocId, data: ForwardDocData) -> Self {
        ForwardRecord {
            doc_id: doc_id.to_string(),
            data,
        }
    }

    /// Parse the envelope's doc id.
    pub fn parsed_doc_id(&self) -> Option<DocId> {
        self.doc_id.parse().ok()
    }
}

/// Builds the forward index from a corpus and appends single documents.
#[derive(Debug)]
pub struct ForwardIndexBuilder {
    analyzer: TextAnalyzer,
}

impl ForwardIndexBuilder {
    pub fn new() -> Result<Self> {
        Ok(ForwardIndexBuilder {
            analyzer: TextAnalyzer::new()?,
        })
    }

    /// Stream a JSONL corpus and write one forward record per document that
    /// contains at least one lexicon word. Document ids are assigned
    /// sequentially in corpus order.
    pub fn build_index<P: AsRef<Path>, Q: AsRef<Path>>(
        &self,
        corpus_path: P,
        output_path: Q,
        lexicon: &Lexicon,
    ) -> Result<usize> {
        let corpus = File::open(corpus_path.as_ref()).map_err(|e| {
            PapyrusError::index(format!(
                "Could not open corpus {}: {e}",
                corpus_path.as_ref().display()
            ))
        })?;
        let mut out = File::create(output_path.as_ref())?;

        let mut doc_id: DocId = 0;
        let mut written = 0usize;

        for line in BufReader::new(corpus).lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match self.record_tokens(&line) {
                Some((title_tokens, body_tokens)) => {
                    let data = ForwardDocData::from_tokens(&title_tokens, &body_tokens, lexicon);
                    if !data.words.is_empty() {
                        let record = ForwardRecord::new(doc_id, data);
                        serde_json::to_writer(&mut out, &record)?;
                        out.write_all(b"\n")?;
                        written += 1;
                    }
                    doc_id += 1;
                }
                None => warn!("[ForwardIndex] Skipping malformed corpus line"),
            }
            if doc_id % 5000 == 0 && doc_id > 0 {
                info!("[ForwardIndex] Processed {doc_id} documents...");
            }
        }

        info!("[ForwardIndex] Wrote {written} records");
        Ok(written)
    }

    /// Split one corpus line into title and body token streams.
    fn record_tokens(&self, line: &str) -> Option<(Vec<String>, Vec<String>)> {
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
            return Some((
                record.title_tokens.unwrap_or_default(),
                record.body_tokens.unwrap_or_default(),
            ));
        }
        // legacy body-only token arrays
        if let Some(tokens) = record.tokens {
            return Some((Vec::new(), tokens));
        }

        let title_tokens = self.analyzer.tokenize(&record.title.unwrap_or_default());
        let body = record.body.or(record.abstract_text).unwrap_or_default();
        Some((title_tokens, self.analyzer.tokenize(&body)))
    }
}

/// Append a single forward record to the index file.
pub fn append_document<P: AsRef<Path>>(
    path: P,
    doc_id: DocId,
    data: &ForwardDocData,
) -> Result<()> {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path.as_ref())?;
    let record = ForwardRecord::new(doc_id, data.clone());
    serde_json::to_writer(&mut file, &record)?;
    file.write_all(b"\n")?;
    Ok(())
}

/// Stream the forward index line by line, invoking `visit` with each parsed
/// record (legacy word entries already normalized). Malformed lines are
/// skipped with a warning.
pub fn for_each_record<P, F>(path: P, mut visit: F) -> Result<()>
where
    P: AsRef<Path>,
    F: FnMut(DocId, ForwardDocData),
{
    let file = File::open(path.as_ref()).map_err(|e| {
        PapyrusError::index(format!(
            "Could not open forward index {}: {e}",
            path.as_ref().display()
        ))
    })?;

    for line in BufReader::new(file).lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let record: ForwardRecord = match serde_json::from_str(&line) {
            Ok(record) => record,
            Err(e) => {
                warn!("[ForwardIndex] Skipping malformed line: {e}");
                continue;
            }
        };
        let doc_id = match record.parsed_doc_id() {
            Some(id) => id,
            None => {
                warn!("[ForwardIndex] Skipping record with bad doc_id {:?}", record.doc_id);
                continue;
            }
        };
        let mut data = record.data;
        data.words = data
            .words
            .into_iter()
            .map(|(id, entry)| (id, entry.normalized()))
            .collect();
        visit(doc_id, data);
    }
    Ok(())
}
