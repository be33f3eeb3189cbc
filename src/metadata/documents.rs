//! Document metadata store: publication date, citation count, title, url and
//! keywords per document.

use std::path::Path;

use ahash::AHashMap;
use log::info;
use serde::{Deserialize, Serialize};

use crate::DocId;
use crate::error::Result;
use crate::storage;

/// Metadata for a single document. Missing fields default to 0 / empty.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DocMetadata {
    #[serde(default)]
    pub publication_year: i32,
    #[serde(default)]
    pub publication_month: u32,
    #[serde(default)]
    pub cited_by_count: u32,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub keywords: Vec<String>,
}

/// All document metadata, keyed by doc id.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentMetadata {
    docs: AHashMap<DocId, DocMetadata>,
}

impl DocumentMetadata {
    pub fn new() -> Self {
        DocumentMetadata::default()
    }

    /// Load the store. A missing or corrupted file reads as empty with a
    /// warning.
    pub fn load<P: AsRef<Path>>(path: P) -> Self {
        let store: DocumentMetadata = storage::read_json_or_default(path.as_ref());
        if !store.docs.is_empty() {
            info!("[Metadata] Loaded {} entries", store.docs.len());
        }
        store
    }

    /// Persist atomically.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        storage::atomic_write_json(path.as_ref(), self)
    }

    /// Insert or overwrite a document's metadata.
    pub fn add_document(&mut self, doc_id: DocId, entry: DocMetadata) {
        self.docs.insert(doc_id, entry);
    }

    pub fn get(&self, doc_id: DocId) -> Option<&DocMetadata> {
        self.docs.get(&doc_id)
    }

    pub fn contains(&self, doc_id: DocId) -> bool {
        self.docs.contains_key(&doc_id)
    }

    /// Publication year, 0 for unknown documents.
    pub fn publication_year(&self, doc_id: DocId) -> i32 {
        self.docs.get(&doc_id).map_or(0, |d| d.publication_year)
    }

    /// Citation count, 0 for unknown documents.
    pub fn cited_by_count(&self, doc_id: DocId) -> u32 {
        self.docs.get(&doc_id).map_or(0, |d| d.cited_by_count)
    }

    /// Title, empty for unknown documents.
    pub fn title(&self, doc_id: DocId) -> &str {
        self.docs.get(&doc_id).map_or("", |d| d.title.as_str())
    }

    /// Largest doc id present, if any.
    pub fn max_doc_id(&self) -> Option<DocId> {
        self.docs.keys().max().copied()
    }

    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_round_trip_and_key_shape() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("document_metadata.json");

        let mut store = DocumentMetadata::new();
        store.add_document(
            12,
            DocMetadata {
                publication_year: 2021,
                publication_month: 6,
                cited_by_count: 40,
                title: "Spectral Graph Methods".to_string(),
                url: "https://example.org/12.pdf".to_string(),
                keywords: vec!["graphs".to_string()],
            },
        );
        store.save(&path).unwrap();

        // doc ids serialize as string keys
        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["12"]["publication_year"], 2021);

        let loaded = DocumentMetadata::load(&path);
        assert_eq!(loaded.publication_year(12), 2021);
        assert_eq!(loaded.cited_by_count(12), 40);
        assert_eq!(loaded.title(12), "Spectral Graph Methods");
    }

    #[test]
    fn test_missing_ids_default() {
        let store = DocumentMetadata::new();
        assert_eq!(store.publication_year(5), 0);
        assert_eq!(store.cited_by_count(5), 0);
        assert_eq!(store.title(5), "");
        assert!(store.get(5).is_none());
    }

    #[test]
    fn test_partial_entries_fill_defaults() {
        let entry: DocMetadata =
            serde_json::from_str(r#"{"title":"Untitled Draft"}"#).unwrap();
        assert_eq!(entry.publication_year, 0);
        assert_eq!(entry.cited_by_count, 0);
        assert!(entry.keywords.is_empty());
    }

    #[test]
    fn test_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let store = DocumentMetadata::load(dir.path().join("absent.json"));
        assert!(store.is_empty());
    }
}
