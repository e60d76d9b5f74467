//! JSON paths, locations, and their canonical key encoding.
//!
//! A location names a structural position in a document: a path (object
//! keys and array indices) plus a marker for where relative to the value
//! at that path the location sits. The encoded form is the sort key that
//! indexes tree leaves and seeds the boundary hash.
//!
//! ## Key layout
//!
//! Each path step is encoded, then a single marker byte is appended:
//!
//! ```text
//! object key step   0x20, key_len u32 BE, key bytes (canonical escaped form)
//! array index step  0x30, index u64 BE
//!
//! marker            0x01 start-of-value
//!                   0x02 inside an empty-so-far object
//!                   0x03 inside an empty-so-far array
//!                   0xFF end-of-value
//! ```
//!
//! The byte assignments give the three ordering properties the tree relies
//! on, under plain lexicographic comparison:
//!
//! 1. A value's start (0x01) sorts before everything inside it, because
//!    0x01 is lower than every step tag.
//! 2. A value's end (0xFF) sorts after every descendant location and
//!    before the next sibling's start, because 0xFF is higher than every
//!    step tag and sibling steps are prefix-free.
//! 3. The root's end marker alone, the single byte `0xFF`, sorts after
//!    every real location and is the end-of-document sentinel.
//!
//! Sibling object keys compare by (length, bytes), which is exactly the
//! canonical member order the marshaller writes.

use cairn_db_core::{Error, Result};
use std::fmt;

const KEY_STEP_TAG: u8 = 0x20;
const INDEX_STEP_TAG: u8 = 0x30;

const MARKER_START: u8 = 0x01;
const MARKER_OBJECT_INITIAL: u8 = 0x02;
const MARKER_ARRAY_INITIAL: u8 = 0x03;
const MARKER_END: u8 = 0xFF;

/// The encoded end-of-document sentinel: the root's end-of-value marker.
pub fn end_of_document_key() -> Vec<u8> {
    vec![MARKER_END]
}

// ============================================================================
// Path steps and paths
// ============================================================================

/// One step of a JSON path.
///
/// Object keys are held in canonical escaped form (the bytes between the
/// quotes of the canonical serialization), so step comparison and document
/// byte order agree even for keys containing escapes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PathStep {
    Key(Vec<u8>),
    Index(u64),
}

/// A structural path: a sequence of steps from the document root.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct JsonPath {
    steps: Vec<PathStep>,
}

impl JsonPath {
    /// The empty path (document root).
    pub fn root() -> Self {
        Self::default()
    }

    pub fn is_root(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn push(&mut self, step: PathStep) {
        self.steps.push(step);
    }

    pub fn pop(&mut self) -> Option<PathStep> {
        self.steps.pop()
    }

    pub fn last(&self) -> Option<&PathStep> {
        self.steps.last()
    }

    pub fn last_mut(&mut self) -> Option<&mut PathStep> {
        self.steps.last_mut()
    }

    /// The path one level up, or `None` at the root.
    pub fn parent(&self) -> Option<JsonPath> {
        if self.steps.is_empty() {
            return None;
        }
        Some(JsonPath {
            steps: self.steps[..self.steps.len() - 1].to_vec(),
        })
    }

    /// Extend with a key step, taking the raw (unescaped) key text.
    pub fn child_key(&self, key: &str) -> JsonPath {
        let mut steps = self.steps.clone();
        steps.push(PathStep::Key(crate::marshal::canonical_key_bytes(key)));
        JsonPath { steps }
    }

    /// Extend with an index step.
    pub fn child_index(&self, index: u64) -> JsonPath {
        let mut steps = self.steps.clone();
        steps.push(PathStep::Index(index));
        JsonPath { steps }
    }

    /// Parse a `$`-rooted path expression: `$`, `$.key`, `$."quoted key"`,
    /// `$[3]`, and combinations like `$.users[42].name`.
    pub fn parse(input: &str) -> Result<JsonPath> {
        let bytes = input.as_bytes();
        if bytes.first() != Some(&b'$') {
            return Err(Error::parse(0, "path must start with '$'"));
        }
        let mut steps = Vec::new();
        let mut i = 1usize;
        while i < bytes.len() {
            match bytes[i] {
                b'.' => {
                    i += 1;
                    if bytes.get(i) == Some(&b'"') {
                        let end = find_string_end(bytes, i)
                            .ok_or_else(|| Error::parse(i, "unterminated quoted key"))?;
                        let literal = std::str::from_utf8(&bytes[i..=end])
                            .map_err(|_| Error::parse(i, "quoted key is not UTF-8"))?;
                        let raw: String = serde_json::from_str(literal)
                            .map_err(|e| Error::parse(i, format!("bad quoted key: {e}")))?;
                        steps.push(PathStep::Key(crate::marshal::canonical_key_bytes(&raw)));
                        i = end + 1;
                    } else {
                        let start = i;
                        while i < bytes.len() && bytes[i] != b'.' && bytes[i] != b'[' {
                            i += 1;
                        }
                        if i == start {
                            return Err(Error::parse(start, "empty key segment"));
                        }
                        let raw = std::str::from_utf8(&bytes[start..i])
                            .map_err(|_| Error::parse(start, "key is not UTF-8"))?;
                        steps.push(PathStep::Key(crate::marshal::canonical_key_bytes(raw)));
                    }
                }
                b'[' => {
                    i += 1;
                    let start = i;
                    while i < bytes.len() && bytes[i].is_ascii_digit() {
                        i += 1;
                    }
                    if i == start || bytes.get(i) != Some(&b']') {
                        return Err(Error::parse(start, "expected '[<digits>]'"));
                    }
                    let index: u64 = std::str::from_utf8(&bytes[start..i])
                        .expect("digits are UTF-8")
                        .parse()
                        .map_err(|e| Error::parse(start, format!("bad index: {e}")))?;
                    steps.push(PathStep::Index(index));
                    i += 1;
                }
                _ => return Err(Error::parse(i, "expected '.' or '['")),
            }
        }
        Ok(JsonPath { steps })
    }
}

/// Find the index of the closing quote of a JSON string literal starting
/// at `start` (which must be a `"`), honoring backslash escapes.
fn find_string_end(bytes: &[u8], start: usize) -> Option<usize> {
    let mut i = start + 1;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b'"' => return Some(i),
            _ => i += 1,
        }
    }
    None
}

impl fmt::Display for JsonPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "$")?;
        for step in &self.steps {
            match step {
                PathStep::Key(key) => {
                    let text = String::from_utf8_lossy(key);
                    if text.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_') && !text.is_empty()
                    {
                        write!(f, ".{text}")?;
                    } else {
                        write!(f, ".\"{text}\"")?;
                    }
                }
                PathStep::Index(i) => write!(f, "[{i}]")?,
            }
        }
        Ok(())
    }
}

// ============================================================================
// Locations
// ============================================================================

/// Where a location sits relative to the value at its path.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LocationMarker {
    /// Immediately before the value's first byte.
    StartOfValue,
    /// Inside an object whose members have not started yet (just past `{`).
    ObjectInitial,
    /// Inside an array whose elements have not started yet (just past `[`).
    ArrayInitial,
    /// Immediately after the value's last byte.
    EndOfValue,
}

impl LocationMarker {
    fn to_byte(self) -> u8 {
        match self {
            LocationMarker::StartOfValue => MARKER_START,
            LocationMarker::ObjectInitial => MARKER_OBJECT_INITIAL,
            LocationMarker::ArrayInitial => MARKER_ARRAY_INITIAL,
            LocationMarker::EndOfValue => MARKER_END,
        }
    }

    fn from_byte(b: u8) -> Option<Self> {
        match b {
            MARKER_START => Some(LocationMarker::StartOfValue),
            MARKER_OBJECT_INITIAL => Some(LocationMarker::ObjectInitial),
            MARKER_ARRAY_INITIAL => Some(LocationMarker::ArrayInitial),
            MARKER_END => Some(LocationMarker::EndOfValue),
            _ => None,
        }
    }
}

/// A structural position: path plus marker. The encoded form is the leaf
/// sort key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct JsonLocation {
    pub path: JsonPath,
    pub marker: LocationMarker,
}

impl JsonLocation {
    /// The location of the document root's first byte.
    pub fn start_of_document() -> Self {
        Self {
            path: JsonPath::root(),
            marker: LocationMarker::StartOfValue,
        }
    }

    pub fn start_of(path: JsonPath) -> Self {
        Self {
            path,
            marker: LocationMarker::StartOfValue,
        }
    }

    pub fn end_of(path: JsonPath) -> Self {
        Self {
            path,
            marker: LocationMarker::EndOfValue,
        }
    }

    /// Encode to the canonical sort key.
    pub fn key(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.path.steps.len() * 12 + 1);
        for step in &self.path.steps {
            match step {
                PathStep::Key(key) => {
                    out.push(KEY_STEP_TAG);
                    out.extend_from_slice(&(key.len() as u32).to_be_bytes());
                    out.extend_from_slice(key);
                }
                PathStep::Index(i) => {
                    out.push(INDEX_STEP_TAG);
                    out.extend_from_slice(&i.to_be_bytes());
                }
            }
        }
        out.push(self.marker.to_byte());
        out
    }

    /// Decode an encoded key back into a location. Used to seed mid-tree
    /// scans from a neighbor's boundary key.
    pub fn decode(bytes: &[u8]) -> Result<JsonLocation> {
        let mut steps = Vec::new();
        let mut i = 0usize;
        loop {
            match bytes.get(i) {
                None => return Err(Error::storage("truncated location key")),
                Some(&KEY_STEP_TAG) => {
                    if bytes.len() < i + 5 {
                        return Err(Error::storage("truncated key step"));
                    }
                    let len = u32::from_be_bytes([
                        bytes[i + 1],
                        bytes[i + 2],
                        bytes[i + 3],
                        bytes[i + 4],
                    ]) as usize;
                    let start = i + 5;
                    if bytes.len() < start + len {
                        return Err(Error::storage("truncated key step bytes"));
                    }
                    steps.push(PathStep::Key(bytes[start..start + len].to_vec()));
                    i = start + len;
                }
                Some(&INDEX_STEP_TAG) => {
                    if bytes.len() < i + 9 {
                        return Err(Error::storage("truncated index step"));
                    }
                    let mut arr = [0u8; 8];
                    arr.copy_from_slice(&bytes[i + 1..i + 9]);
                    steps.push(PathStep::Index(u64::from_be_bytes(arr)));
                    i += 9;
                }
                Some(&marker_byte) => {
                    let marker = LocationMarker::from_byte(marker_byte).ok_or_else(|| {
                        Error::storage(format!("unknown location marker 0x{marker_byte:02x}"))
                    })?;
                    if i + 1 != bytes.len() {
                        return Err(Error::storage("trailing bytes after location marker"));
                    }
                    return Ok(JsonLocation {
                        path: JsonPath { steps },
                        marker,
                    });
                }
            }
        }
    }
}
