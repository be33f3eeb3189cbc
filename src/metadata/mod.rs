//! Per-document metadata and the doc-id to source-url mapping.

pub mod documents;
pub mod url_map;

pub use documents::{DocMetadata, DocumentMetadata};
pub use url_map::DocUrlMapper;
