//! Ranking: the multi-factor lexical scorer and the optional semantic
//! re-ranker.

pub mod scorer;
pub mod semantic;

pub use scorer::{RankingScorer, RankingWeights, ScoreComponents};
pub use semantic::{EMBEDDING_DIM, SemanticScorer};
