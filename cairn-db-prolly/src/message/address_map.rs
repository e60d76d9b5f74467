//! Interior address-map wire format.
//!
//! An interior node is an ordered mapping from boundary key (the end
//! location of a child's span) to the child's content address. Keys are
//! kept in a contiguous heap indexed by an offset table so lookups can
//! binary-search without parsing the whole node.
//!
//! ## Layout (big-endian)
//!
//! ```text
//! magic        u8             0xCA
//! level        u8             >= 1
//! count        u16
//! key_offsets  (count+1) u32  offsets into the key heap; key_offsets[0] = 0
//! key_heap     key_offsets[count] bytes
//! addresses    count * 32
//! ```

use super::ADDRESS_MAP_MAGIC;
use cairn_db_core::{Address, BufferPool, Error, Result, ADDRESS_SIZE};

/// Serializes interior address-map nodes.
#[derive(Debug, Clone)]
pub struct AddressMapSerializer {
    pool: BufferPool,
}

impl AddressMapSerializer {
    pub fn new(pool: BufferPool) -> Self {
        Self { pool }
    }

    /// Serialize sorted `(key, address)` pairs into an interior node message.
    ///
    /// Keys must be in strictly increasing order; the caller (the chunker)
    /// enforces this, so a violation here is an internal invariant failure.
    pub fn serialize(&self, level: u8, keys: &[Vec<u8>], addrs: &[Address]) -> Result<Vec<u8>> {
        if level == 0 {
            return Err(Error::invariant("address maps begin at level 1"));
        }
        if keys.len() != addrs.len() {
            return Err(Error::invariant(format!(
                "key/address arity mismatch: {} vs {}",
                keys.len(),
                addrs.len()
            )));
        }
        if keys.len() > usize::from(u16::MAX) {
            return Err(Error::invariant(format!(
                "too many entries for one node: {}",
                keys.len()
            )));
        }

        let heap_len: usize = keys.iter().map(Vec::len).sum();
        let mut buf = self.pool.get();
        buf.reserve(4 + (keys.len() + 1) * 4 + heap_len + keys.len() * ADDRESS_SIZE);

        buf.push(ADDRESS_MAP_MAGIC);
        buf.push(level);
        buf.extend_from_slice(&(keys.len() as u16).to_be_bytes());

        let mut offset = 0u32;
        buf.extend_from_slice(&offset.to_be_bytes());
        for key in keys {
            offset = offset
                .checked_add(key.len() as u32)
                .ok_or_else(|| Error::invariant("key heap exceeds u32 range"))?;
            buf.extend_from_slice(&offset.to_be_bytes());
        }
        for key in keys {
            buf.extend_from_slice(key);
        }
        for addr in addrs {
            buf.extend_from_slice(addr.as_bytes());
        }
        Ok(buf)
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

    fn addr(tag: &[u8]) -> Address {
        Address::of(tag)
    }

    #[test]
    fn test_address_map_roundtrip() {
        let ser = AddressMapSerializer::new(BufferPool::new());
        let keys = vec![b"aa".to_vec(), b"bbb".to_vec(), b"\xff".to_vec()];
        let addrs = vec![addr(b"1"), addr(b"2"), addr(b"3")];
        let bytes = ser.serialize(1, &keys, &addrs).unwrap();

        let node = Node::from_bytes(Arc::new(bytes)).unwrap();
        assert!(!node.is_leaf());
        assert_eq!(node.level(), 1);
        assert_eq!(node.count(), 3);
        assert_eq!(node.key(0), b"aa");
        assert_eq!(node.key(1), b"bbb");
        assert_eq!(node.key(2), b"\xff");
        assert_eq!(node.child_address(1), addr(b"2"));
        assert_eq!(node.last_key(), b"\xff");
    }

    #[test]
    fn test_empty_map() {
        let ser = AddressMapSerializer::new(BufferPool::new());
        let bytes = ser.serialize(2, &[], &[]).unwrap();
        let node = Node::from_bytes(Arc::new(bytes)).unwrap();
        assert_eq!(node.count(), 0);
        assert_eq!(node.level(), 2);
    }

    #[test]
    fn test_rejects_level_zero() {
        let ser = AddressMapSerializer::new(BufferPool::new());
        assert!(ser.serialize(0, &[], &[]).is_err());
    }

    #[test]
    fn test_rejects_arity_mismatch() {
        let ser = AddressMapSerializer::new(BufferPool::new());
        assert!(ser.serialize(1, &[b"k".to_vec()], &[]).is_err());
    }
}
