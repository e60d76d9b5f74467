//! Tree cursor over interior nodes.
//!
//! A `NodeCursor` points at one entry of an interior node and carries the
//! chain of parent cursors up to the root, so advancing across a node
//! boundary can load the next sibling through the parent. Cursors over
//! level-1 nodes are the usual working position: their entries address the
//! leaf blobs.
//!
//! Once a cursor chain is exhausted, every level is marked past-the-end so
//! that no entry can be visited twice.

use crate::node::Node;
use cairn_db_core::{Address, Error, NodeStore, Result};
use std::sync::Arc;

/// A position within one level of a tree, with the parent chain above it.
#[derive(Debug)]
pub struct NodeCursor<S: NodeStore> {
    node: Node,
    idx: usize,
    parent: Option<Box<NodeCursor<S>>>,
    store: Arc<S>,
}

impl<S: NodeStore> NodeCursor<S> {
    /// Descend from `root` to the level-1 node whose key range covers
    /// `key`, returning the cursor chain for the whole path.
    ///
    /// The descent is logarithmic in the number of leaves.
    pub async fn seek(store: Arc<S>, root: Node, key: &[u8]) -> Result<NodeCursor<S>> {
        if root.is_leaf() {
            return Err(Error::invariant("tree root must be an address map"));
        }
        let mut cur = NodeCursor {
            node: root,
            idx: 0,
            parent: None,
            store: store.clone(),
        };
        loop {
            cur.idx = cur.node.lower_bound(key);
            if cur.node.level() == 1 {
                return Ok(cur);
            }
            let child = load_node(&store, &cur.node.child_address(cur.idx)).await?;
            if child.level() + 1 != cur.node.level() {
                return Err(Error::storage(format!(
                    "level discontinuity: node at level {} points to level {}",
                    cur.node.level(),
                    child.level()
                )));
            }
            cur = NodeCursor {
                node: child,
                idx: 0,
                parent: Some(Box::new(cur)),
                store: store.clone(),
            };
        }
    }

    /// Whether the cursor still refers to a live entry.
    pub fn valid(&self) -> bool {
        self.idx < self.node.count()
    }

    /// Whether the cursor sits on the first entry of its node.
    pub fn at_node_start(&self) -> bool {
        self.idx == 0
    }

    /// The node this cursor is positioned in.
    pub fn node(&self) -> &Node {
        &self.node
    }

    /// The entry index within the node.
    pub fn index(&self) -> usize {
        self.idx
    }

    /// The parent-level cursor, if this node is not the root.
    pub fn parent(&self) -> Option<&NodeCursor<S>> {
        self.parent.as_deref()
    }

    /// Discard this level and return the parent cursor, positioned at the
    /// entry referencing the node this cursor was in.
    pub fn into_parent(self) -> Option<NodeCursor<S>> {
        self.parent.map(|b| *b)
    }

    /// The boundary key at the cursor position.
    pub fn current_key(&self) -> &[u8] {
        assert!(self.valid(), "current_key on exhausted cursor");
        self.node.key(self.idx)
    }

    /// The child address at the cursor position.
    pub fn current_address(&self) -> Address {
        assert!(self.valid(), "current_address on exhausted cursor");
        self.node.child_address(self.idx)
    }

    /// The boundary key of the entry immediately to the left of the cursor
    /// in document order, or `None` if the cursor is leftmost in the tree.
    ///
    /// A node's boundary key in its parent equals the node's own last key,
    /// so walking up to the first ancestor with a left sibling finds it.
    pub fn left_boundary_key(&self) -> Option<Vec<u8>> {
        let mut cur: Option<&NodeCursor<S>> = Some(self);
        while let Some(c) = cur {
            if c.idx > 0 {
                return Some(c.node.key(c.idx - 1).to_vec());
            }
            cur = c.parent.as_deref();
        }
        None
    }

    fn ancestor_mut(&mut self, n: usize) -> &mut NodeCursor<S> {
        let mut cur = self;
        for _ in 0..n {
            cur = cur
                .parent
                .as_deref_mut()
                .expect("ancestor depth checked before walking");
        }
        cur
    }

    /// Step to the next entry in key order, loading the next node through
    /// the parent chain when this node is exhausted.
    ///
    /// Returns `false` once the tree is exhausted; the call is then
    /// idempotent.
    pub async fn advance(&mut self) -> Result<bool> {
        if !self.valid() {
            return Ok(false);
        }
        self.idx += 1;
        if self.idx < self.node.count() {
            return Ok(true);
        }

        // Find the closest ancestor with entries remaining.
        let mut levels_up = 0usize;
        {
            let mut cur: Option<&NodeCursor<S>> = self.parent.as_deref();
            let mut n = 1usize;
            while let Some(c) = cur {
                if c.idx + 1 < c.node.count() {
                    levels_up = n;
                    break;
                }
                cur = c.parent.as_deref();
                n += 1;
            }
        }
        if levels_up == 0 {
            // Exhausted: invalidate every level of the chain.
            let mut cur: Option<&mut NodeCursor<S>> = self.parent.as_deref_mut();
            while let Some(c) = cur {
                c.idx = c.node.count();
                cur = c.parent.as_deref_mut();
            }
            return Ok(false);
        }

        let store = self.store.clone();
        self.ancestor_mut(levels_up).idx += 1;
        for depth in (0..levels_up).rev() {
            let addr = self.ancestor_mut(depth + 1).current_address();
            let node = load_node(&store, &addr).await?;
            let c = self.ancestor_mut(depth);
            c.node = node;
            c.idx = 0;
        }
        Ok(true)
    }
}

/// Read and parse a node, mapping a missing node to cursor invalidation:
/// the backing tree has been collected out from under the reader.
pub async fn load_node<S: NodeStore>(store: &Arc<S>, addr: &Address) -> Result<Node> {
    let bytes = store.read_node(addr).await.map_err(|e| match e {
        Error::NotFound(msg) => Error::cursor_invalidated(msg),
        other => other,
    })?;
    Node::from_bytes(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{AddressMapSerializer, BlobSerializer};
    use cairn_db_core::MemoryNodeStore;

    /// Build a two-level tree: `leaf_runs` gives the keys per level-1 node.
    async fn build_tree(
        store: &Arc<MemoryNodeStore>,
        leaf_runs: &[&[&[u8]]],
    ) -> (Node, Vec<Vec<u8>>) {
        let blob_ser = BlobSerializer::new(store.pool());
        let map_ser = AddressMapSerializer::new(store.pool());
        let mut all_keys = Vec::new();
        let mut l1_keys = Vec::new();
        let mut l1_addrs = Vec::new();
        for run in leaf_runs {
            let mut keys = Vec::new();
            let mut addrs = Vec::new();
            for key in run.iter() {
                let bytes = blob_ser.serialize(key);
                let addr = store.write_node(&bytes).await.unwrap();
                keys.push(key.to_vec());
                addrs.push(addr);
                all_keys.push(key.to_vec());
            }
            let node_bytes = map_ser.serialize(1, &keys, &addrs).unwrap();
            let addr = store.write_node(&node_bytes).await.unwrap();
            l1_keys.push(keys.last().unwrap().clone());
            l1_addrs.push(addr);
        }
        let root_bytes = map_ser.serialize(2, &l1_keys, &l1_addrs).unwrap();
        store.write_node(&root_bytes).await.unwrap();
        let root = Node::from_bytes(Arc::new(root_bytes)).unwrap();
        (root, all_keys)
    }

    #[tokio::test]
    async fn test_seek_and_iterate_all_entries() {
        let store = Arc::new(MemoryNodeStore::new());
        let runs: &[&[&[u8]]] = &[&[b"a", b"c"], &[b"e", b"g"], &[b"i"]];
        let (root, all_keys) = build_tree(&store, runs).await;

        let mut cur = NodeCursor::seek(store.clone(), root, b"").await.unwrap();
        let mut seen = Vec::new();
        while cur.valid() {
            seen.push(cur.current_key().to_vec());
            cur.advance().await.unwrap();
        }
        assert_eq!(seen, all_keys);
        // Exhausted cursors stay exhausted.
        assert!(!cur.advance().await.unwrap());
        assert!(!cur.valid());
    }

    #[tokio::test]
    async fn test_seek_lands_on_covering_entry() {
        let store = Arc::new(MemoryNodeStore::new());
        let runs: &[&[&[u8]]] = &[&[b"b", b"d"], &[b"f", b"h"]];
        let (root, _) = build_tree(&store, runs).await;

        let cur = NodeCursor::seek(store.clone(), root.clone(), b"e").await.unwrap();
        assert_eq!(cur.current_key(), b"f");

        let cur = NodeCursor::seek(store.clone(), root, b"b").await.unwrap();
        assert_eq!(cur.current_key(), b"b");
    }

    #[tokio::test]
    async fn test_left_boundary_key() {
        let store = Arc::new(MemoryNodeStore::new());
        let runs: &[&[&[u8]]] = &[&[b"b", b"d"], &[b"f", b"h"]];
        let (root, _) = build_tree(&store, runs).await;

        let cur = NodeCursor::seek(store.clone(), root.clone(), b"a").await.unwrap();
        assert_eq!(cur.left_boundary_key(), None);

        let cur = NodeCursor::seek(store.clone(), root.clone(), b"c").await.unwrap();
        assert_eq!(cur.left_boundary_key(), Some(b"b".to_vec()));

        // First entry of the second level-1 node: left neighbor lives in
        // the previous node, found through the parent.
        let cur = NodeCursor::seek(store.clone(), root, b"e").await.unwrap();
        assert!(cur.at_node_start());
        assert_eq!(cur.left_boundary_key(), Some(b"d".to_vec()));
    }
}
