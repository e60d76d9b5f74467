//! # Cairn DB Doc
//!
//! JSON documents stored as prolly trees.
//!
//! This crate provides:
//! - Canonical JSON marshalling (`marshal`)
//! - Structural paths and their order-preserving key encoding (`location`)
//! - The streaming scanner that walks canonical JSON byte-by-byte while
//!   tracking the structural location (`scanner`)
//! - Read cursors into stored documents (`cursor`)
//! - The JSON chunker that writes documents as trees (`chunker`)
//! - The document API: full writes, incremental splices, lookups
//!   (`document`)
//!
//! ## Writing a document
//!
//! ```ignore
//! use cairn_db_core::MemoryNodeStore;
//! use cairn_db_doc::{IndexedJsonDocument, JsonPath};
//!
//! let store = Arc::new(MemoryNodeStore::new());
//! let doc = IndexedJsonDocument::create(store, &value).await?;
//! let (doc, _) = doc.replace(&JsonPath::parse("$.users[42].name")?, &new_name).await?;
//! ```
//!
//! Incremental writes re-use every chunk an edit does not touch: a
//! single-value change to a large document rewrites a bounded number of
//! leaves plus the path of interior nodes above them.

pub mod chunker;
pub mod cursor;
pub mod document;
pub mod location;
pub mod marshal;
pub mod scanner;

pub use chunker::JsonChunker;
pub use cursor::{JsonCursor, SeekBias};
pub use document::{serialize_json_to_addr, splice_json, IndexedJsonDocument, Splice};
pub use location::{end_of_document_key, JsonLocation, JsonPath, LocationMarker, PathStep};
pub use marshal::{canonical_key_bytes, marshal_json};
pub use scanner::{JsonScanner, ScanProgress};
