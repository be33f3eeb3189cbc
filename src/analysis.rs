//! Text analysis: normalization, tokenization and stopword filtering.
//!
//! Every token stored in or looked up against the index passes through the
//! same pipeline: lowercase, strip non-alphanumerics to whitespace, split.

use std::collections::HashSet;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use regex::Regex;

use crate::error::{PapyrusError, Result};

/// Tokens shorter than this never enter the lexicon.
pub const MIN_TOKEN_LEN: usize = 3;

/// Default English stopword set used when no stopword file is configured.
const DEFAULT_STOPWORDS: &[&str] = &[
    "the", "a", "an", "and", "or", "but", "in", "on", "at", "to", "for", "of", "with", "by",
    "from", "as", "is", "was", "are", "were", "be", "have", "has", "had", "do", "does", "did",
    "will", "would", "should", "could", "may", "might", "must", "can", "this", "that", "these",
    "those", "i", "you", "he", "she", "it", "we", "they", "what", "which", "who", "when", "where",
    "why", "how", "all", "each", "every", "both", "few", "more", "most", "other", "some", "such",
    "no", "not", "only", "own", "same", "so", "than", "too", "very", "now", "then", "there",
    "their", "them", "through", "under", "until", "up", "use", "using", "via", "year", "years",
    "your", "yours",
];

/// A text analyzer that extracts lowercase alphanumeric tokens.
#[derive(Debug, Clone)]
pub struct TextAnalyzer {
    /// Pattern matching a single token in lowercased text.
    token_pattern: Regex,
    /// Words excluded from the lexicon.
    stop_words: HashSet<String>,
}

impl TextAnalyzer {
    /// Create an analyzer with the default stopword set.
    pub fn new() -> Result<Self> {
        let token_pattern = Regex::new(r"[a-z0-9]+")
            .map_err(|e| PapyrusError::analysis(format!("Invalid token pattern: {e}")))?;

        Ok(TextAnalyzer {
            token_pattern,
            stop_words: DEFAULT_STOPWORDS.iter().map(|w| w.to_string()).collect(),
        })
    }

    /// Replace the stopword set with the contents of a one-word-per-line file.
    pub fn load_stopwords<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        let file = File::open(path.as_ref()).map_err(|e| {
            PapyrusError::analysis(format!(
                "Stopwords file not found: {}: {e}",
                path.as_ref().display()
            ))
        })?;

        let mut stop_words = HashSet::new();
        for line in BufReader::new(file).lines() {
            let line = line?;
            let word = line.trim().to_lowercase();
            if !word.is_empty() {
                stop_words.insert(word);
            }
        }
        self.stop_words = stop_words;
        Ok(())
    }

    /// Tokenize text: lowercase, treat non-alphanumerics as whitespace, split.
    pub fn tokenize(&self, text: &str) -> Vec<String> {
        let lowered = text.to_lowercase();
        self.token_pattern
            .find_iter(&lowered)
            .map(|m| m.as_str().to_string())
            .collect()
    }

    /// Whether a token is admissible to the lexicon: not a stopword, at least
    /// [`MIN_TOKEN_LEN`] chars, and not entirely digits.
    pub fn is_significant(&self, word: &str) -> bool {
        let w = word.to_lowercase();
        if w.len() < MIN_TOKEN_LEN {
            return false;
        }
        if w.chars().all(|c| c.is_ascii_digit()) {
            return false;
        }
        !self.stop_words.contains(&w)
    }

    /// Whether a word is in the stopword set.
    pub fn is_stopword(&self, word: &str) -> bool {
        self.stop_words.contains(&word.to_lowercase())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_tokenize_strips_punctuation() {
        let analyzer = TextAnalyzer::new().unwrap();
        assert_eq!(
            analyzer.tokenize("Hello, World! Rust-2024"),
            vec!["hello", "world", "rust", "2024"]
        );
    }

    #[test]
    fn test_tokenize_empty() {
        let analyzer = TextAnalyzer::new().unwrap();
        assert!(analyzer.tokenize("  ...  ").is_empty());
    }

    #[test]
    fn test_significance_filters() {
        let analyzer = TextAnalyzer::new().unwrap();
        assert!(analyzer.is_significant("alpha"));
        assert!(!analyzer.is_significant("ab"));
        assert!(!analyzer.is_significant("12345"));
        assert!(!analyzer.is_significant("the"));
        assert!(!analyzer.is_significant("The"));
        // digits mixed with letters are fine
        assert!(analyzer.is_significant("b2b"));
    }

    #[test]
    fn test_stopword_file_override() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "Foo\n  bar \n\nbaz").unwrap();

        let mut analyzer = TextAnalyzer::new().unwrap();
        analyzer.load_stopwords(file.path()).unwrap();

        assert!(analyzer.is_stopword("foo"));
        assert!(analyzer.is_stopword("BAR"));
        // default set is replaced, not merged
        assert!(!analyzer.is_stopword("the"));
    }
}
