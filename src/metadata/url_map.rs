//! Doc-id to source-url mapping.

use std::path::Path;

use ahash::AHashMap;
use serde::{Deserialize, Serialize};

use crate::DocId;
use crate::error::Result;
use crate::storage;

/// Maps document ids to the url they were fetched or uploaded from.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocUrlMapper {
    urls: AHashMap<DocId, String>,
}

impl DocUrlMapper {
    pub fn new() -> Self {
        DocUrlMapper::default()
    }

    /// Load the mapping. Missing or corrupted files read as empty.
    pub fn load<P: AsRef<Path>>(path: P) -> Self {
        storage::read_json_or_default(path.as_ref())
    }

    /// Persist atomically.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        storage::atomic_write_json(path.as_ref(), self)
    }

    pub fn add_mapping(&mut self, doc_id: DocId, url: String) {
        self.urls.insert(doc_id, url);
    }

    /// Url for a document, empty string for misses.
    pub fn get(&self, doc_id: DocId) -> &str {
        self.urls.get(&doc_id).map_or("", String::as_str)
    }

    /// Largest doc id present, if any.
    pub fn max_doc_id(&self) -> Option<DocId> {
        self.urls.keys().max().copied()
    }

    pub fn len(&self) -> usize {
        self.urls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.urls.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("docid_to_url.json");

        let mut mapper = DocUrlMapper::new();
        mapper.add_mapping(3, "uploaded://paper.pdf".to_string());
        mapper.save(&path).unwrap();

        let loaded = DocUrlMapper::load(&path);
        assert_eq!(loaded.get(3), "uploaded://paper.pdf");
        assert_eq!(loaded.get(4), "");
        assert_eq!(loaded.max_doc_id(), Some(3));
    }
}
