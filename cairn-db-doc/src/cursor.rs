//! Read cursor into an existing document tree.
//!
//! A `JsonCursor` combines a level-1 tree cursor (whose entries address
//! the leaf blobs) with a scanner positioned inside the current leaf. The
//! scanner's `value_offset` marks the exact byte at which a splice will
//! occur; everything before it in the leaf is the prefix a chunker copies,
//! everything after it is the original stream a chunker keeps consuming
//! until it re-synchronizes.
//!
//! Handing a cursor to a chunker consumes it: the chunker advances the
//! cursor destructively and the cursor is not usable afterwards.

use crate::location::{JsonLocation, JsonPath};
use crate::scanner::{JsonScanner, ScanProgress};
use cairn_db_core::{Error, NodeStore, Result};
use cairn_db_prolly::{load_node, Node, NodeCursor};
use std::sync::Arc;

/// Which side of the target location a seek should land on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekBias {
    /// Stop at the last natural stop strictly before the target: the
    /// splice point for inserts and deletes, before any separator or key
    /// bytes that precede the target.
    Before,
    /// Stop at the first natural stop at or after the target: the splice
    /// point for replacing an existing value.
    At,
}

/// A position inside an existing document tree.
#[derive(Debug)]
pub struct JsonCursor<S: NodeStore> {
    store: Arc<S>,
    map_cur: NodeCursor<S>,
    leaf: Node,
    scanner: JsonScanner,
}

impl<S: NodeStore> JsonCursor<S> {
    /// Descend from `root` to the target location.
    ///
    /// Returns the cursor and whether a value exists exactly at the
    /// target's path (for `Before`, whether the stop immediately after the
    /// landing point is the target).
    pub async fn seek(
        store: Arc<S>,
        root: Node,
        target: &JsonLocation,
        bias: SeekBias,
    ) -> Result<(JsonCursor<S>, bool)> {
        let target_key = target.key();
        let map_cur = NodeCursor::seek(store.clone(), root, &target_key).await?;
        let leaf = load_leaf(&store, &map_cur).await?;

        // Seed the scanner with the leaf's start location, which is the
        // left neighbor's boundary key (or the document start for the
        // leftmost leaf).
        let seed = match map_cur.left_boundary_key() {
            Some(key) => JsonLocation::decode(&key)?,
            None => JsonLocation::start_of_document(),
        };
        let mut scanner = JsonScanner::scan_from_middle(leaf.value().to_vec(), seed);

        loop {
            let checkpoint = scanner.clone();
            match scanner.advance_to_next_location()? {
                ScanProgress::Stop => {
                    let key = scanner.location().key();
                    if key.as_slice() >= target_key.as_slice() {
                        let found = key == target_key;
                        if bias == SeekBias::Before {
                            scanner = checkpoint;
                        }
                        return Ok((
                            JsonCursor {
                                store,
                                map_cur,
                                leaf,
                                scanner,
                            },
                            found,
                        ));
                    }
                }
                ScanProgress::EndOfInput => {
                    // The leaf's boundary key is >= the target by descent,
                    // and the final stop lands on it, so this is dead code
                    // for well-formed trees.
                    return Err(Error::invariant(format!(
                        "leaf exhausted before reaching {}",
                        target.path
                    )));
                }
            }
        }
    }

    /// Whether the cursor still refers to a live leaf.
    pub fn valid(&self) -> bool {
        self.map_cur.valid()
    }

    /// The bytes of the leaf the cursor currently sits on.
    pub fn current_value(&self) -> &[u8] {
        self.leaf.value()
    }

    /// The unconsumed bytes of the current leaf, from the scanner's
    /// position to the leaf's end.
    pub fn remaining_bytes(&self) -> &[u8] {
        &self.scanner.buffer()[self.scanner.value_offset()..]
    }

    /// The embedded scanner marking the splice position.
    pub fn scanner(&self) -> &JsonScanner {
        &self.scanner
    }

    /// The level-1 tree cursor underneath this document cursor.
    pub fn map_cursor(&self) -> &NodeCursor<S> {
        &self.map_cur
    }

    /// Give up the document view and keep only the tree cursor chain.
    pub fn into_map_cursor(self) -> NodeCursor<S> {
        self.map_cur
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Step to the next leaf in key order. Returns the validity flag.
    ///
    /// The scanner is re-seeded at the new leaf's first byte with the
    /// location it had reached, which is only meaningful when the previous
    /// leaf was consumed to its end (as `skip_to` does).
    pub async fn advance(&mut self) -> Result<bool> {
        if !self.map_cur.advance().await? {
            return Ok(false);
        }
        self.leaf = load_leaf(&self.store, &self.map_cur).await?;
        self.scanner = JsonScanner::scan_from_middle(
            self.leaf.value().to_vec(),
            self.scanner.location().clone(),
        );
        Ok(true)
    }

    /// Advance the scanner to the stop at exactly `target`, crossing leaf
    /// boundaries as needed. The consumed bytes are skipped, not copied:
    /// this is how a splice drops the original bytes of a replaced or
    /// deleted value.
    pub async fn skip_to(&mut self, target: &JsonLocation) -> Result<()> {
        let target_key = target.key();
        loop {
            match self.scanner.advance_to_next_location()? {
                ScanProgress::Stop => {
                    let key = self.scanner.location().key();
                    if key == target_key {
                        return Ok(());
                    }
                    if key.as_slice() > target_key.as_slice() {
                        return Err(Error::invariant(format!(
                            "scanned past {} without stopping at it",
                            target.path
                        )));
                    }
                }
                ScanProgress::EndOfInput => {
                    if !self.advance().await? {
                        return Err(Error::invariant(format!(
                            "document ended before {}",
                            target.path
                        )));
                    }
                }
            }
        }
    }

    /// If the next unconsumed byte is `byte`, skip it and return true.
    pub fn skip_byte_if(&mut self, byte: u8) -> bool {
        if self.remaining_bytes().first() == Some(&byte) {
            self.scanner.skip_bytes(1);
            true
        } else {
            false
        }
    }

    /// Collect the bytes of the value starting at the cursor position,
    /// whose path is `path`, crossing leaves as needed.
    ///
    /// The cursor must be positioned at the value's start (a `SeekBias::At`
    /// seek for its start location).
    pub async fn read_value(&mut self, path: &JsonPath) -> Result<Vec<u8>> {
        let end_key = JsonLocation::end_of(path.clone()).key();
        let mut out = Vec::new();
        let mut from = self.scanner.value_offset();
        loop {
            match self.scanner.advance_to_next_location()? {
                ScanProgress::Stop => {
                    if self.scanner.location().key() == end_key {
                        out.extend_from_slice(&self.scanner.buffer()[from..self.scanner.value_offset()]);
                        return Ok(out);
                    }
                }
                ScanProgress::EndOfInput => {
                    out.extend_from_slice(&self.scanner.buffer()[from..]);
                    if !self.advance().await? {
                        return Err(Error::invariant(format!(
                            "document ended inside {path}"
                        )));
                    }
                    from = 0;
                }
            }
        }
    }
}

async fn load_leaf<S: NodeStore>(store: &Arc<S>, map_cur: &NodeCursor<S>) -> Result<Node> {
    let node = load_node(store, &map_cur.current_address()).await?;
    if !node.is_leaf() {
        return Err(Error::storage(format!(
            "level-1 entry does not address a leaf (level {})",
            node.level()
        )));
    }
    Ok(node)
}
