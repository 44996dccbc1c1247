//! Domain error types.
//!
//! Most plumbing returns `anyhow::Result`; these are the failures callers
//! may want to tell apart (and tests downcast to).

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by the catalog database layer.
#[derive(Error, Debug)]
pub enum CatalogError {
    /// The catalog file does not exist.
    #[error("Catalog not found: {0}")]
    NotFound(PathBuf),

    /// The implicit `user_ns` tag at the top of the hierarchy is missing.
    #[error("Namespace root tag '{0}' not found in tag_table")]
    MissingNamespaceRoot(&'static str),

    /// `_dbl_auto_id_table` has no row to allocate from.
    #[error("Identifier allocator row missing from _dbl_auto_id_table")]
    MissingAllocator,

    /// Walking parent links from `tag_id` revisited `repeated`.
    #[error("Cyclic tag hierarchy: walking up from tag {tag_id} revisited tag {repeated}")]
    CyclicHierarchy { tag_id: i64, repeated: i64 },
}

/// Errors raised while reading or rewriting embedded file metadata.
#[derive(Error, Debug)]
pub enum MetadataError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Not a JPEG file")]
    NotJpeg,

    #[error("JPEG truncated at offset {0}")]
    Truncated(usize),

    #[error("Corrupt metadata: {0}")]
    Corrupt(String),

    /// A rewritten APP segment no longer fits the 16-bit segment length.
    #[error("Segment payload of {0} bytes exceeds the JPEG segment limit")]
    SegmentTooLarge(usize),

    #[error("IPTC: {0}")]
    Iptc(String),

    #[error("XMP: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("Unsupported file format: {0}")]
    UnsupportedFormat(String),
}
