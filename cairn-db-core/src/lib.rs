//! # Cairn DB Core
//!
//! Core types shared by the cairn-db storage engine:
//!
//! - `Address`: fixed-width content address (SHA-256 of node bytes)
//! - `NodeStore` trait and the in-memory reference implementation
//! - `BufferPool`: allocator handle used by node serializers
//! - The shared `Error` / `Result` types
//!
//! ## Design Principles
//!
//! 1. **Runtime-agnostic**: async at the I/O seam only, no forced runtime
//! 2. **Immutable nodes**: a node is written once and identified forever by
//!    its address; supersession is by publishing a new root
//! 3. **Append-only sharing**: the node store is the only shared resource and
//!    is safe for concurrent writers targeting distinct content

pub mod address;
pub mod error;
pub mod store;

pub use address::{Address, ADDRESS_SIZE};
pub use error::{Error, Result};
pub use store::{BufferPool, MemoryNodeStore, NodeStore};
