//! Posting lists and per-document word statistics.

use serde::de::Deserializer;
use serde::ser::{SerializeTuple, Serializer};
use serde::{Deserialize, Serialize};

use crate::DocId;

/// Multiplier applied to title occurrences in the weighted frequency.
pub const TITLE_WEIGHT: u32 = 3;

/// A single posting under a word in the inverted index.
///
/// The wire form is the compact triple `[doc_id, weighted_frequency,
/// [positions]]`; positions are the document's title positions followed by
/// its body positions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Posting {
    pub doc_id: DocId,
    pub weighted_frequency: u32,
    pub positions: Vec<u32>,
}

impl Posting {
    pub fn new(doc_id: DocId, weighted_frequency: u32, positions: Vec<u32>) -> Self {
        Posting {
            doc_id,
            weighted_frequency,
            positions,
        }
    }
}

impl Serialize for Posting {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut tuple = serializer.serialize_tuple(3)?;
        tuple.serialize_element(&self.doc_id)?;
        tuple.serialize_element(&self.weighted_frequency)?;
        tuple.serialize_element(&self.positions)?;
        tuple.end()
    }
}

impl<'de> Deserialize<'de> for Posting {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let (doc_id, weighted_frequency, positions) =
            <(DocId, u32, Vec<u32>)>::deserialize(deserializer)?;
        Ok(Posting {
            doc_id,
            weighted_frequency,
            positions,
        })
    }
}

/// Title/body statistics for one word within one document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WordStats {
    pub title_frequency: u32,
    pub body_frequency: u32,
    /// 0-based positions within the title token stream.
    pub title_positions: Vec<u32>,
    /// 0-based positions within the body token stream.
    pub body_positions: Vec<u32>,
}

impl WordStats {
    /// `3 * title_frequency + body_frequency`.
    pub fn weighted_frequency(&self) -> u32 {
        TITLE_WEIGHT * self.title_frequency + self.body_frequency
    }

    /// Record one title occurrence at the given position.
    pub fn add_title_occurrence(&mut self, position: u32) {
        self.title_frequency += 1;
        self.title_positions.push(position);
    }

    /// Record one body occurrence at the given position.
    pub fn add_body_occurrence(&mut self, position: u32) {
        self.body_frequency += 1;
        self.body_positions.push(position);
    }

    /// Title positions followed by body positions, the order postings store.
    pub fn merged_positions(&self) -> Vec<u32> {
        let mut positions =
            Vec::with_capacity(self.title_positions.len() + self.body_positions.len());
        positions.extend_from_slice(&self.title_positions);
        positions.extend_from_slice(&self.body_positions);
        positions
    }
}
