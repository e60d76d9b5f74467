//! # Cairn DB Prolly
//!
//! The prolly tree engine: probabilistically-balanced, history-independent
//! search trees over a content-addressed node store.
//!
//! This crate provides:
//! - Node wire formats (leaf blobs and interior address maps)
//! - `Node`: a parsed, immutable view over stored node bytes
//! - `NodeCursor`: a position in an existing tree, with parent chain
//! - The boundary predicate that draws chunk boundaries from keys
//! - `InteriorChunker`: the generic chunker for levels >= 1
//!
//! ## Design Principles
//!
//! 1. **Boundaries hash keys, not content**: a cut point is a property of
//!    the tree's key space at that position, so inserting unrelated content
//!    earlier in a tree never shifts later cut points
//! 2. **Strictly increasing keys**: chunkers receive pairs in key order and
//!    enforce it; trees are deterministic functions of their pair sequence
//! 3. **Graft, don't rewrite**: when an incremental write re-synchronizes
//!    with an old node boundary, the rest of the old tree is re-referenced
//!    without being read

pub mod boundary;
pub mod chunk_config;
pub mod chunker;
pub mod cursor;
pub mod message;
pub mod node;

pub use boundary::crosses_boundary;
pub use chunk_config::{level_salt, INTERIOR_MIN_CHUNK_SIZE, MAX_CHUNK_SIZE, MIN_CHUNK_SIZE};
pub use chunker::InteriorChunker;
pub use cursor::{load_node, NodeCursor};
pub use message::{AddressMapSerializer, BlobSerializer};
pub use node::Node;
