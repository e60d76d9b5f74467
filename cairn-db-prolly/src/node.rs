//! Parsed node view.
//!
//! A `Node` wraps the stored bytes of a leaf blob or interior address map
//! and exposes typed accessors. Parsing validates the layout once; all
//! accessors afterwards are bounds-checked slices into the shared bytes.
//!
//! Nodes are immutable. A node's identity is the address of its bytes.

use crate::message::{ADDRESS_MAP_MAGIC, BLOB_MAGIC};
use cairn_db_core::{Address, Error, Result, ADDRESS_SIZE};
use std::sync::Arc;

#[derive(Debug, Clone)]
enum Layout {
    /// Value segment range within the bytes.
    Blob { value: std::ops::Range<usize> },
    /// Offset-table geometry for an address map.
    AddressMap {
        count: usize,
        offsets_pos: usize,
        heap_pos: usize,
        addrs_pos: usize,
    },
}

/// An immutable tree node: either a leaf blob (level 0) holding one value
/// segment, or an interior address map (level >= 1) holding sorted
/// `(boundary key, child address)` entries.
#[derive(Debug, Clone)]
pub struct Node {
    bytes: Arc<Vec<u8>>,
    level: u8,
    layout: Layout,
}

impl Node {
    /// Parse stored bytes into a node, validating the layout.
    pub fn from_bytes(bytes: Arc<Vec<u8>>) -> Result<Self> {
        let buf = bytes.as_slice();
        if buf.len() < 2 {
            return Err(Error::storage("node too short for header"));
        }
        let magic = buf[0];
        let level = buf[1];
        match magic {
            BLOB_MAGIC => {
                if level != 0 {
                    return Err(Error::storage(format!("blob node with level {level}")));
                }
                if buf.len() < 6 {
                    return Err(Error::storage("blob node too short for length"));
                }
                let len = u32::from_be_bytes([buf[2], buf[3], buf[4], buf[5]]) as usize;
                if buf.len() != 6 + len {
                    return Err(Error::storage(format!(
                        "blob length mismatch: header says {len}, body has {}",
                        buf.len() - 6
                    )));
                }
                Ok(Node {
                    level,
                    layout: Layout::Blob { value: 6..6 + len },
                    bytes,
                })
            }
            ADDRESS_MAP_MAGIC => {
                if level == 0 {
                    return Err(Error::storage("address map node with level 0"));
                }
                if buf.len() < 4 {
                    return Err(Error::storage("address map too short for header"));
                }
                let count = u16::from_be_bytes([buf[2], buf[3]]) as usize;
                let offsets_pos = 4;
                let heap_pos = offsets_pos + (count + 1) * 4;
                if buf.len() < heap_pos {
                    return Err(Error::storage("address map too short for offset table"));
                }
                let read_offset = |i: usize| -> usize {
                    let p = offsets_pos + i * 4;
                    u32::from_be_bytes([buf[p], buf[p + 1], buf[p + 2], buf[p + 3]]) as usize
                };
                let mut prev = 0usize;
                for i in 0..=count {
                    let off = read_offset(i);
                    if i == 0 && off != 0 {
                        return Err(Error::storage("address map offset table must start at 0"));
                    }
                    if off < prev {
                        return Err(Error::storage("address map offsets not monotonic"));
                    }
                    prev = off;
                }
                let heap_len = read_offset(count);
                let addrs_pos = heap_pos + heap_len;
                let expected = addrs_pos + count * ADDRESS_SIZE;
                if buf.len() != expected {
                    return Err(Error::storage(format!(
                        "address map size mismatch: expected {expected}, got {}",
                        buf.len()
                    )));
                }
                Ok(Node {
                    level,
                    layout: Layout::AddressMap {
                        count,
                        offsets_pos,
                        heap_pos,
                        addrs_pos,
                    },
                    bytes,
                })
            }
            other => Err(Error::storage(format!("unknown node magic 0x{other:02x}"))),
        }
    }

    /// The tree level: 0 for leaves, >= 1 for interior nodes.
    pub fn level(&self) -> u8 {
        self.level
    }

    /// Whether this is a leaf blob.
    pub fn is_leaf(&self) -> bool {
        matches!(self.layout, Layout::Blob { .. })
    }

    /// The raw stored bytes.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// This node's content address.
    pub fn address(&self) -> Address {
        Address::of(&self.bytes)
    }

    /// Number of entries: 1 for leaf blobs, the entry count for maps.
    pub fn count(&self) -> usize {
        match &self.layout {
            Layout::Blob { .. } => 1,
            Layout::AddressMap { count, .. } => *count,
        }
    }

    /// The value segment of a leaf blob.
    ///
    /// Panics if called on an interior node; callers dispatch on `is_leaf`.
    pub fn value(&self) -> &[u8] {
        match &self.layout {
            Layout::Blob { value } => &self.bytes[value.clone()],
            Layout::AddressMap { .. } => {
                panic!("value() called on an interior node")
            }
        }
    }

    fn map_geometry(&self) -> (usize, usize, usize, usize) {
        match &self.layout {
            Layout::AddressMap {
                count,
                offsets_pos,
                heap_pos,
                addrs_pos,
            } => (*count, *offsets_pos, *heap_pos, *addrs_pos),
            Layout::Blob { .. } => panic!("interior accessor called on a leaf blob"),
        }
    }

    fn key_offset(&self, offsets_pos: usize, i: usize) -> usize {
        let p = offsets_pos + i * 4;
        u32::from_be_bytes([
            self.bytes[p],
            self.bytes[p + 1],
            self.bytes[p + 2],
            self.bytes[p + 3],
        ]) as usize
    }

    /// The `i`th boundary key of an interior node.
    pub fn key(&self, i: usize) -> &[u8] {
        let (count, offsets_pos, heap_pos, _) = self.map_geometry();
        assert!(i < count, "key index {i} out of range ({count} entries)");
        let start = heap_pos + self.key_offset(offsets_pos, i);
        let end = heap_pos + self.key_offset(offsets_pos, i + 1);
        &self.bytes[start..end]
    }

    /// The `i`th child address of an interior node.
    pub fn child_address(&self, i: usize) -> Address {
        let (count, _, _, addrs_pos) = self.map_geometry();
        assert!(i < count, "address index {i} out of range ({count} entries)");
        let start = addrs_pos + i * ADDRESS_SIZE;
        Address::from_slice(&self.bytes[start..start + ADDRESS_SIZE])
            .expect("address slice width checked at parse time")
    }

    /// The highest boundary key in an interior node.
    pub fn last_key(&self) -> &[u8] {
        let (count, ..) = self.map_geometry();
        assert!(count > 0, "last_key on empty node");
        self.key(count - 1)
    }

    /// Index of the first entry whose key is >= `key`, clamped to the last
    /// entry. The rightmost subtree is keyed by the end sentinel, so real
    /// targets always land within range; the clamp only guards degenerate
    /// callers.
    pub fn lower_bound(&self, key: &[u8]) -> usize {
        let (count, ..) = self.map_geometry();
        let mut lo = 0usize;
        let mut hi = count;
        while lo < hi {
            let mid = (lo + hi) / 2;
            if self.key(mid) < key {
                lo = mid + 1;
            } else {
                hi = mid;
            }
        }
        lo.min(count.saturating_sub(1))
    }
}
