//! Read-side query engine.

pub mod barrel_cache;
pub mod engine;

pub use barrel_cache::BarrelCache;
pub use engine::{AutocompleteResponse, QueryEngine, SearchHit, SearchResponse};
