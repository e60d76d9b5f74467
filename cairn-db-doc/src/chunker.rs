//! The JSON chunker: streams canonical JSON bytes into tree leaves.
//!
//! Leaf nodes are blobs, each holding one contiguous segment of the
//! document's canonical serialization; every segment ends on a valid
//! scanner stop. Interior nodes are address maps keyed by the end location
//! of each child's span. This type writes the level-0 blobs and feeds
//! `(boundary key, address)` pairs to the interior chunker, which begins
//! at level 1.
//!
//! For a full write the chunker starts empty. For an incremental write it
//! is seeded from a cursor: the bytes before the cursor's position become
//! the initial buffer (copied; the chunker never aliases the cursor's
//! buffer), the interior chunker inherits every node to the left of the
//! cursor chain, and after the new bytes are appended the chunker keeps
//! consuming the cursor's leaves until one of its own cuts lands exactly
//! on an original leaf boundary. From that point the old and new trees
//! agree, and the rest of the original is grafted unchanged.

use crate::cursor::JsonCursor;
use crate::location::{end_of_document_key, JsonLocation, JsonPath, LocationMarker, PathStep};
use crate::scanner::{JsonScanner, ScanProgress};
use cairn_db_core::{Error, NodeStore, Result};
use cairn_db_prolly::{crosses_boundary, BlobSerializer, InteriorChunker, Node};
use std::sync::Arc;
use tracing::trace;

/// Writes a prolly tree containing a JSON document.
#[derive(Debug)]
pub struct JsonChunker<S: NodeStore> {
    /// Present during a splice: the original document stream to resume
    /// from once the new bytes are exhausted.
    cursor: Option<JsonCursor<S>>,
    /// Owns the append buffer holding bytes not yet committed to a leaf.
    scanner: JsonScanner,
    /// Chunker for the address-map levels, beginning at level 1.
    interior: InteriorChunker<S>,
    blob: BlobSerializer,
    store: Arc<S>,
}

impl<S: NodeStore> JsonChunker<S> {
    /// A chunker for writing a document from scratch.
    pub fn new_empty(store: Arc<S>) -> Self {
        Self {
            cursor: None,
            scanner: JsonScanner::scan_from_beginning(Vec::new()),
            interior: InteriorChunker::new(store.clone()),
            blob: BlobSerializer::new(store.pool()),
            store,
        }
    }

    /// A chunker seeded from a cursor into an existing document, for
    /// rewriting everything at and after the cursor's position.
    ///
    /// Consumes the cursor; it is advanced destructively during `done`.
    pub fn from_cursor(cursor: JsonCursor<S>) -> Result<Self> {
        let store = cursor.store().clone();
        // Copy the prefix so this buffer never aliases the cursor's: the
        // cursor's leaf may be dropped at any advance.
        let prefix = cursor.scanner().buffer()[..cursor.scanner().value_offset()].to_vec();
        let prefix_len = prefix.len();
        let mut scanner =
            JsonScanner::scan_from_middle(prefix, cursor.scanner().location().clone());
        scanner.skip_bytes(prefix_len);

        let interior = InteriorChunker::from_cursor_chain(store.clone(), cursor.map_cursor())?;
        Ok(Self {
            cursor: Some(cursor),
            scanner,
            interior,
            blob: BlobSerializer::new(store.pool()),
            store,
        })
    }

    /// Append a separator and key for a value about to be inserted at
    /// `path`, then position the scanner at the value's start.
    ///
    /// Writes `,` unless the insertion point is the first element of its
    /// container, and `"key":` unless the container is an array. The
    /// injected bytes cannot contain a value stop, so they are skipped
    /// rather than scanned.
    ///
    /// The path must name a child of the container the scanner sits in;
    /// a mismatch produces a malformed document, not an error here.
    pub fn write_key(&mut self, path: &JsonPath) -> Result<()> {
        let step = path
            .last()
            .ok_or_else(|| Error::invariant("cannot write a key at the document root"))?;

        if !self.scanner.first_element_or_end_of_empty_value() {
            self.append_without_splitting(b",");
        }
        if let PathStep::Key(key) = step {
            let mut bytes = Vec::with_capacity(key.len() + 3);
            bytes.push(b'"');
            bytes.extend_from_slice(key);
            bytes.extend_from_slice(b"\":");
            self.append_without_splitting(&bytes);
        }
        self.scanner.set_location(JsonLocation {
            path: path.clone(),
            marker: LocationMarker::StartOfValue,
        });
        Ok(())
    }

    /// Append bytes to the buffer; they are scanned for boundaries at the
    /// next `process_buffer`.
    pub fn append_json_to_buffer(&mut self, bytes: &[u8]) {
        self.scanner.append(bytes);
    }

    /// Skip the original document's bytes up to the end of the value at
    /// the cursor position. This is how a replace or delete drops the old
    /// value.
    ///
    /// If the splice point is at the head of its container, a separator
    /// that preceded the next retained value is dropped with it.
    pub async fn skip_original(&mut self, end: &JsonLocation) -> Result<()> {
        let cursor = self
            .cursor
            .as_mut()
            .ok_or_else(|| Error::invariant("no original stream to skip"))?;
        cursor.skip_to(end).await?;
        if self.scanner.first_element_or_end_of_empty_value() {
            // The separator to drop may sit at the head of the next leaf.
            if cursor.remaining_bytes().is_empty() {
                cursor.advance().await?;
            }
            cursor.skip_byte_if(b',');
        }
        Ok(())
    }

    /// Scan forward through unprocessed buffer bytes, cutting a leaf at
    /// every stop the boundary predicate accepts.
    pub async fn process_buffer(&mut self) -> Result<()> {
        loop {
            let before = self.scanner.value_offset();
            if self.scanner.advance_to_next_location()? == ScanProgress::EndOfInput {
                return Ok(());
            }
            if self.scanner.value_offset() == before {
                // Zero-width stop (an array's first-element transition):
                // a leaf ending here could not be re-scanned to its own
                // boundary key, so it is never a cut candidate.
                continue;
            }
            let key = self.scanner.location().key();
            if key == end_of_document_key() {
                // The final stop: its leaf is always emitted by `done`,
                // which keeps the end sentinel keyed exactly once.
                continue;
            }
            let size = self.scanner.value_offset() as u32;
            if crosses_boundary(&key, size, size, 0) {
                self.cut_leaf(key).await?;
            }
        }
    }

    /// Finalize the tree and return its root.
    pub async fn done(mut self) -> Result<Node> {
        let Some(mut cursor) = self.cursor.take() else {
            // Full write: the remaining buffer becomes the final leaf.
            self.write_final_leaf().await?;
            return self.interior.done(None).await;
        };

        let mut rest = cursor.remaining_bytes().to_vec();
        while rest.is_empty() {
            if !cursor.advance().await? {
                self.write_final_leaf().await?;
                return self.interior.done(None).await;
            }
            rest = cursor.current_value().to_vec();
        }
        // A value spliced in front of an existing sibling needs a
        // separator the original bytes don't carry at this point.
        if !self.scanner.first_element_or_end_of_empty_value()
            && !matches!(rest[0], b'}' | b']' | b',')
        {
            self.scanner.append(b",");
        }

        // Consume the original stream until a cut coincides with one of
        // its leaf boundaries, or it runs out.
        loop {
            self.scanner.append(&rest);
            self.process_buffer().await?;
            if self.scanner.buffer().is_empty() {
                // Re-synchronized: a cut landed exactly on an original
                // leaf boundary. Step past the coinciding leaf so its key
                // is not emitted twice, then graft the remainder.
                cursor.advance().await?;
                return self.interior.done(Some(cursor.into_map_cursor())).await;
            }
            if !cursor.advance().await? {
                // Reached the end of the original tree.
                self.write_final_leaf().await?;
                return self.interior.done(None).await;
            }
            rest = cursor.current_value().to_vec();
        }
    }

    /// Write the buffer's bytes `[0, offset)` as a leaf and restart the
    /// scanner on the remainder.
    async fn cut_leaf(&mut self, key: Vec<u8>) -> Result<()> {
        let offset = self.scanner.value_offset();
        let bytes = self.blob.serialize(&self.scanner.buffer()[..offset]);
        let addr = self.store.write_node(&bytes).await?;
        self.blob.recycle(bytes);
        trace!(len = offset, addr = %addr, "cut leaf chunk");
        self.interior.add_pair(key, addr).await?;

        let rest = self.scanner.buffer()[offset..].to_vec();
        self.scanner = JsonScanner::scan_from_middle(rest, self.scanner.location().clone());
        Ok(())
    }

    /// Write whatever the buffer still holds as the final leaf, keyed by
    /// the end-of-document sentinel.
    async fn write_final_leaf(&mut self) -> Result<()> {
        let bytes = self.blob.serialize(self.scanner.buffer());
        let addr = self.store.write_node(&bytes).await?;
        self.blob.recycle(bytes);
        trace!(len = self.scanner.buffer().len(), addr = %addr, "wrote final leaf");
        self.interior.add_pair(end_of_document_key(), addr).await
    }

    fn append_without_splitting(&mut self, bytes: &[u8]) {
        self.scanner.append(bytes);
        self.scanner.skip_bytes(bytes.len());
    }
}
