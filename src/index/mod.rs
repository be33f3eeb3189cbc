//! Index data structures: forward index, barreled inverted index, delta
//! index and the doc-stats cache.

pub mod barrel;
pub mod delta;
pub mod forward;
pub mod posting;
pub mod stats_cache;

pub use barrel::{BarrelMap, InvertedIndexBuilder};
pub use delta::DeltaIndex;
pub use forward::{ForwardDocData, ForwardIndexBuilder, ForwardRecord, WordEntry};
pub use posting::{Posting, WordStats};
pub use stats_cache::{DocStats, DocStatsCache};
