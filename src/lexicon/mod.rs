//! Lexicon and autocomplete trie.

pub mod lexicon;
pub mod trie;

pub use lexicon::{Lexicon, LexiconBuildOptions};
pub use trie::Trie;
