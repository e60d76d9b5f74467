//! Node store traits and the in-memory reference implementation.
//!
//! A node store persists opaque byte blobs and hands back fixed-width
//! content addresses. It is append-only and must be safe to call from
//! multiple writers, provided each writer targets distinct content (writes
//! of identical bytes are idempotent by construction).
//!
//! Apps provide their own implementations; `MemoryNodeStore` here is the
//! reference used by tests and embedded callers.

use crate::address::Address;
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::{Arc, Mutex, RwLock};

// ============================================================================
// BufferPool
// ============================================================================

/// Buffers above this size are dropped rather than recycled.
const MAX_POOLED_BUFFER: usize = 1 << 16;

/// Number of buffers retained at rest.
const MAX_POOLED_COUNT: usize = 32;

/// A small recycling pool of byte buffers, handed to node serializers.
///
/// Cloning the pool clones the handle; all clones share the same free list.
#[derive(Clone, Debug, Default)]
pub struct BufferPool {
    free: Arc<Mutex<Vec<Vec<u8>>>>,
}

impl BufferPool {
    /// Create an empty pool.
    pub fn new() -> Self {
        Self::default()
    }

    /// Take a cleared buffer from the pool, or allocate a fresh one.
    pub fn get(&self) -> Vec<u8> {
        self.free
            .lock()
            .expect("BufferPool lock poisoned")
            .pop()
            .unwrap_or_default()
    }

    /// Return a buffer to the pool for reuse.
    pub fn put(&self, mut buf: Vec<u8>) {
        if buf.capacity() > MAX_POOLED_BUFFER {
            return;
        }
        buf.clear();
        let mut free = self.free.lock().expect("BufferPool lock poisoned");
        if free.len() < MAX_POOLED_COUNT {
            free.push(buf);
        }
    }
}

// ============================================================================
// NodeStore trait
// ============================================================================

/// Content-addressed, append-only storage for tree nodes.
///
/// Writes are unordered (addresses are position-independent); readers see a
/// node as soon as its write completes. Nothing becomes observable as a
/// document until the caller publishes a root address, so abandoned writes
/// leave only unreferenced garbage.
#[async_trait]
pub trait NodeStore: Debug + Send + Sync {
    /// Write an opaque node and return its content address.
    async fn write_node(&self, bytes: &[u8]) -> Result<Address>;

    /// Read a node's bytes by address.
    ///
    /// Returns `Error::NotFound` if no node with this address exists.
    async fn read_node(&self, addr: &Address) -> Result<Arc<Vec<u8>>>;

    /// The allocator handle used by serializers writing into this store.
    fn pool(&self) -> BufferPool;
}

// ============================================================================
// MemoryNodeStore
// ============================================================================

/// In-memory node store backed by a `HashMap`.
///
/// Used by tests and as the embedded default; shares node bytes via `Arc`
/// so reads are cheap.
#[derive(Debug, Clone, Default)]
pub struct MemoryNodeStore {
    nodes: Arc<RwLock<HashMap<Address, Arc<Vec<u8>>>>>,
    pool: BufferPool,
}

impl MemoryNodeStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of distinct nodes currently stored.
    pub fn len(&self) -> usize {
        self.nodes.read().expect("RwLock poisoned").len()
    }

    /// Whether the store holds no nodes.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All addresses currently stored. Test/introspection helper.
    pub fn addresses(&self) -> Vec<Address> {
        self.nodes
            .read()
            .expect("RwLock poisoned")
            .keys()
            .copied()
            .collect()
    }
}

#[async_trait]
impl NodeStore for MemoryNodeStore {
    async fn write_node(&self, bytes: &[u8]) -> Result<Address> {
        let addr = Address::of(bytes);
        self.nodes
            .write()
            .expect("RwLock poisoned")
            .entry(addr)
            .or_insert_with(|| Arc::new(bytes.to_vec()));
        Ok(addr)
    }

    async fn read_node(&self, addr: &Address) -> Result<Arc<Vec<u8>>> {
        self.nodes
            .read()
            .expect("RwLock poisoned")
            .get(addr)
            .cloned()
            .ok_or_else(|| Error::not_found(format!("node {addr}")))
    }

    fn pool(&self) -> BufferPool {
        self.pool.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_write_read_roundtrip() {
        let store = MemoryNodeStore::new();
        let addr = store.write_node(b"some node bytes").await.unwrap();
        let bytes = store.read_node(&addr).await.unwrap();
        assert_eq!(bytes.as_slice(), b"some node bytes");
    }

    #[tokio::test]
    async fn test_write_is_idempotent() {
        let store = MemoryNodeStore::new();
        let a1 = store.write_node(b"same").await.unwrap();
        let a2 = store.write_node(b"same").await.unwrap();
        assert_eq!(a1, a2);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_read_missing_is_not_found() {
        let store = MemoryNodeStore::new();
        let addr = Address::of(b"never written");
        match store.read_node(&addr).await {
            Err(Error::NotFound(_)) => {}
            other => panic!("expected NotFound, got {other:?}"),
        }
    }

    #[test]
    fn test_pool_recycles_buffers() {
        let pool = BufferPool::new();
        let mut buf = pool.get();
        buf.extend_from_slice(b"scratch");
        let cap = buf.capacity();
        pool.put(buf);
        let reused = pool.get();
        assert!(reused.is_empty());
        assert_eq!(reused.capacity(), cap);
    }

    #[test]
    fn test_pool_drops_oversized_buffers() {
        let pool = BufferPool::new();
        pool.put(Vec::with_capacity(MAX_POOLED_BUFFER * 2));
        assert_eq!(pool.get().capacity(), 0);
    }
}
