//! Leaf blob wire format.
//!
//! A leaf holds a single opaque value segment and no child addresses.
//!
//! ## Layout (big-endian)
//!
//! ```text
//! magic   u8          0xCB
//! level   u8          always 0
//! len     u32  [2..6]
//! value   [u8] [6..6+len]
//! ```

use super::BLOB_MAGIC;
use cairn_db_core::BufferPool;

/// Serializes leaf blob nodes.
#[derive(Debug, Clone)]
pub struct BlobSerializer {
    pool: BufferPool,
}

impl BlobSerializer {
    pub fn new(pool: BufferPool) -> Self {
        Self { pool }
    }

    /// Serialize a value segment into a leaf node message.
    pub fn serialize(&self, value: &[u8]) -> Vec<u8> {
        let mut buf = self.pool.get();
        buf.reserve(6 + value.len());
        buf.push(BLOB_MAGIC);
        buf.push(0); // level
        buf.extend_from_slice(&(value.len() as u32).to_be_bytes());
        buf.extend_from_slice(value);
        buf
    }

    /// Return a serialization buffer to the pool.
    pub fn recycle(&self, buf: Vec<u8>) {
        self.pool.put(buf);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::Node;
    use std::sync::Arc;

    #[test]
    fn test_blob_roundtrip() {
        let ser = BlobSerializer::new(BufferPool::new());
        let bytes = ser.serialize(b"{\"a\":1}");
        let node = Node::from_bytes(Arc::new(bytes)).unwrap();
        assert!(node.is_leaf());
        assert_eq!(node.level(), 0);
        assert_eq!(node.value(), b"{\"a\":1}");
    }

    #[test]
    fn test_empty_blob() {
        let ser = BlobSerializer::new(BufferPool::new());
        let bytes = ser.serialize(b"");
        let node = Node::from_bytes(Arc::new(bytes)).unwrap();
        assert_eq!(node.value(), b"");
    }
}
