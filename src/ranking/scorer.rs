//! Multi-factor lexical ranking.
//!
//! Four weighted components (frequency, position, title boost, metadata) are
//! combined and multiplied by a publication-date boost.

use crate::DocId;
use crate::metadata::DocMetadata;

/// Weights for the four additive score components.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RankingWeights {
    pub frequency: f64,
    pub position: f64,
    pub title: f64,
    pub metadata: f64,
}

impl Default for RankingWeights {
    fn default() -> Self {
        RankingWeights {
            frequency: 0.4,
            position: 0.2,
            title: 0.3,
            metadata: 0.1,
        }
    }
}

/// Breakdown of a single term-in-document score.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScoreComponents {
    pub frequency_score: f64,
    pub position_score: f64,
    pub title_boost: f64,
    pub metadata_score: f64,
    pub date_boost: f64,
    pub final_score: f64,
}

/// Combines per-posting statistics into a relevance score.
#[derive(Debug, Clone)]
pub struct RankingScorer {
    weights: RankingWeights,
}

impl RankingScorer {
    pub fn new(weights: RankingWeights) -> Self {
        RankingScorer { weights }
    }

    pub fn weights(&self) -> RankingWeights {
        self.weights
    }

    /// Score one term occurrence in one document.
    pub fn score(
        &self,
        weighted_frequency: u32,
        title_frequency: i32,
        positions: &[u32],
        doc_length: i32,
        _doc_id: DocId,
        metadata: Option<&DocMetadata>,
    ) -> ScoreComponents {
        let frequency_score = frequency_score(weighted_frequency);
        let position_score = position_score(positions, doc_length);
        let title_boost = if title_frequency > 0 { 2.0 } else { 1.0 };
        let metadata_score = metadata.map_or(0.0, metadata_score);
        let date_boost = date_boost(metadata.map_or(0, |m| m.publication_year));

        let final_score = (frequency_score * self.weights.frequency
            + position_score * self.weights.position
            + title_boost * self.weights.title
            + metadata_score * self.weights.metadata)
            * date_boost;

        ScoreComponents {
            frequency_score,
            position_score,
            title_boost,
            metadata_score,
            date_boost,
            final_score,
        }
    }
}

impl Default for RankingScorer {
    fn default() -> Self {
        RankingScorer::new(RankingWeights::default())
    }
}

/// Sublinear saturation: `log(1 + weighted_frequency)`.
fn frequency_score(weighted_frequency: u32) -> f64 {
    (1.0 + weighted_frequency as f64).ln()
}

/// Early occurrences score higher. With a known document length, positions
/// are scored by their relative offset `r = p / doc_length`; without one, an
/// absolute-position formula is used. Both average over all positions.
fn position_score(positions: &[u32], doc_length: i32) -> f64 {
    if positions.is_empty() {
        return 0.0;
    }

    let total: f64 = if doc_length > 0 {
        let doc_length = doc_length as f64;
        positions
            .iter()
            .map(|&p| {
                let r = p as f64 / doc_length;
                if r < 0.1 {
                    1.0 - 10.0 * r
                } else if r < 0.5 {
                    0.2 * (1.0 - 2.5 * (r - 0.1))
                } else {
                    0.1 * (1.1 - r)
                }
            })
            .sum()
    } else {
        positions
            .iter()
            .map(|&p| {
                if p < 10 {
                    (10.0 - p as f64) * 0.1
                } else if p < 50 {
                    (50.0 - p as f64) * 0.01
                } else {
                    0.0
                }
            })
            .sum()
    };

    total / positions.len() as f64
}

/// `0.3 * log(1 + cited_by_count)`.
fn metadata_score(metadata: &DocMetadata) -> f64 {
    if metadata.cited_by_count > 0 {
        0.3 * (1.0 + metadata.cited_by_count as f64).ln()
    } else {
        0.0
    }
}

/// Recency boost: `1.0 + (year - 2000) * 0.01`, clamped to `[0.5, 2.0]`.
/// Unknown years are neutral.
fn date_boost(publication_year: i32) -> f64 {
    if publication_year <= 0 {
        return 1.0;
    }
    (1.0 + (publication_year - 2000) as f64 * 0.01).clamp(0.5, 2.0)
}
