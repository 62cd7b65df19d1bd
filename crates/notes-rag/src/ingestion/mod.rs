//! Notes ingestion: PDF loading and page-aware chunking

mod chunker;
mod loader;
mod parser;

pub use chunker::{TextChunker, DEFAULT_SEPARATORS};
pub use loader::{unit_name, DocumentLoader, LoadFailure, LoadReport, LoadedFile};
pub use parser::{cleanup_pdf_text, hash_content, PageContent, ParsedPdf, PdfParser};
