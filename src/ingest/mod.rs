//! Dynamic ingest pipeline: PDF extraction workers and the batch index
//! writer.

pub mod extractor;
pub mod pending;
pub mod pool;
pub mod writer;

pub use extractor::{ExtractedDocument, PdfExtractor};
pub use pending::{PendingDocument, build_doc_stats};
pub use pool::{PdfProcessingPool, PoolStats, TaskHandle};
pub use writer::{BatchIndexWriter, WriterStats};
