//! Page-level PDF text extraction

use sha2::{Digest, Sha256};

use crate::error::{Error, Result};

/// Typographic characters that PDF fonts commonly emit, mapped to plain text
const REPLACEMENTS: &[(char, &str)] = &[
    ('\u{2010}', "-"),   // Hyphen
    ('\u{2011}', "-"),   // Non-breaking hyphen
    ('\u{2013}', "-"),   // En dash
    ('\u{2014}', "--"),  // Em dash
    ('\u{2018}', "'"),   // Left single quote
    ('\u{2019}', "'"),   // Right single quote
    ('\u{201C}', "\""),  // Left double quote
    ('\u{201D}', "\""),  // Right double quote
    ('\u{2022}', "* "),  // Bullet
    ('\u{2026}', "..."), // Ellipsis
    ('\u{00A0}', " "),   // Non-breaking space
    ('\u{FB00}', "ff"),
    ('\u{FB01}', "fi"),
    ('\u{FB02}', "fl"),
    ('\u{FB03}', "ffi"),
    ('\u{FB04}', "ffl"),
];

/// Clean up extracted page text
///
/// Drops NUL bytes, flattens ligatures and typographic punctuation, strips
/// trailing whitespace per line and collapses runs of blank lines into a
/// single paragraph break.
pub fn cleanup_pdf_text(text: &str) -> String {
    let mut flattened = String::with_capacity(text.len());
    for c in text.chars() {
        if c == '\0' || c == '\r' {
            continue;
        }
        match REPLACEMENTS.iter().find(|(from, _)| *from == c) {
            Some((_, to)) => flattened.push_str(to),
            None => flattened.push(c),
        }
    }

    let mut cleaned = String::with_capacity(flattened.len());
    let mut blank_run = 0usize;
    for line in flattened.lines() {
        let line = line.trim_end();
        if line.trim().is_empty() {
            blank_run += 1;
            continue;
        }
        if !cleaned.is_empty() {
            cleaned.push_str(if blank_run > 0 { "\n\n" } else { "\n" });
        }
        cleaned.push_str(line);
        blank_run = 0;
    }

    cleaned
}

/// Text of one PDF page
#[derive(Debug, Clone)]
pub struct PageContent {
    /// Page number (1-indexed, as stored in the PDF page tree)
    pub page_number: u32,
    /// Cleaned text of the page
    pub content: String,
}

/// A parsed PDF file
#[derive(Debug, Clone)]
pub struct ParsedPdf {
    /// Pages in page-tree order
    pub pages: Vec<PageContent>,
    /// SHA-256 of the raw file bytes
    pub content_hash: String,
}

impl ParsedPdf {
    /// Number of pages
    pub fn page_count(&self) -> u32 {
        self.pages.len() as u32
    }

    /// True when no page yielded any text
    pub fn is_blank(&self) -> bool {
        self.pages.iter().all(|p| p.content.trim().is_empty())
    }
}

/// PDF parser producing one text record per page
pub struct PdfParser;

impl PdfParser {
    /// Parse PDF bytes into pages
    pub fn parse(filename: &str, data: &[u8]) -> Result<ParsedPdf> {
        let doc = lopdf::Document::load_mem(data)
            .map_err(|e| Error::file_parse(filename, format!("Failed to load PDF: {}", e)))?;

        if doc.trailer.get(b"Encrypt").is_ok() {
            return Err(Error::file_parse(filename, "PDF is encrypted"));
        }

        let page_ids = doc.get_pages();
        if page_ids.is_empty() {
            return Err(Error::file_parse(filename, "PDF has no pages"));
        }

        let mut pages = Vec::with_capacity(page_ids.len());
        for (page_number, page_id) in page_ids {
            let raw = match doc.extract_text(&[page_number]) {
                Ok(text) => text,
                Err(e) => {
                    tracing::debug!(
                        "{}: text extraction failed on page {} ({}), scanning content stream",
                        filename,
                        page_number,
                        e
                    );
                    match doc.get_page_content(page_id) {
                        Ok(content) => Self::extract_text_from_content(&content),
                        Err(e) => {
                            tracing::debug!("{}: no content for page {}: {}", filename, page_number, e);
                            String::new()
                        }
                    }
                }
            };

            pages.push(PageContent {
                page_number,
                content: cleanup_pdf_text(&raw),
            });
        }

        let parsed = ParsedPdf {
            pages,
            content_hash: hash_content(data),
        };

        if parsed.is_blank() {
            tracing::warn!(
                "{}: no extractable text on any of {} pages, PDF may be image-based",
                filename,
                parsed.page_count()
            );
        }

        Ok(parsed)
    }

    /// Extract text from PDF content stream bytes
    ///
    /// Only literal strings shown with `Tj`/`TJ` inside `BT`/`ET` blocks are
    /// recovered, one block per output line.
    fn extract_text_from_content(content: &[u8]) -> String {
        let content_str = String::from_utf8_lossy(content);
        let mut text = String::new();
        let mut in_text_block = false;
        let mut current_text = String::new();

        for line in content_str.lines() {
            let line = line.trim();

            if line == "BT" {
                in_text_block = true;
                continue;
            }

            if line == "ET" {
                in_text_block = false;
                if !current_text.is_empty() {
                    text.push_str(&current_text);
                    text.push('\n');
                    current_text.clear();
                }
                continue;
            }

            if in_text_block && (line.ends_with("Tj") || line.ends_with("TJ")) {
                if let (Some(start), Some(end)) = (line.find('('), line.rfind(')')) {
                    if start < end {
                        let decoded = line[start + 1..end]
                            .replace("\\n", "\n")
                            .replace("\\r", "")
                            .replace("\\t", "\t")
                            .replace("\\(", "(")
                            .replace("\\)", ")")
                            .replace("\\\\", "\\");
                        current_text.push_str(&decoded);
                    }
                }
            }
        }

        text
    }
}

/// Hash raw bytes for change detection
pub fn hash_content(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}
