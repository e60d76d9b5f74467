//! Indexed JSON documents: the public write and read surface.
//!
//! A document is identified by its tree root. Full writes serialize a
//! value and chunk it from scratch; incremental writes position a cursor
//! at the mutation point and splice new bytes into the original stream,
//! re-using every chunk the edit does not touch.
//!
//! Writers are single-owner: each operation builds a complete new tree
//! and returns its root; nothing is observable until the caller adopts
//! the returned root. Concurrent edits of the same document are out of
//! scope.

use crate::chunker::JsonChunker;
use crate::cursor::{JsonCursor, SeekBias};
use crate::location::{JsonLocation, JsonPath, LocationMarker, PathStep};
use crate::marshal::marshal_json;
use cairn_db_core::{Address, Error, NodeStore, Result};
use cairn_db_prolly::{load_node, Node, NodeCursor};
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

/// An incremental mutation applied at a path.
#[derive(Debug, Clone, Copy)]
pub enum Splice<'a> {
    /// Insert a new value; the path must not exist yet.
    Insert(&'a Value),
    /// Replace the existing value at the path.
    Replace(&'a Value),
    /// Remove the value at the path.
    Delete,
}

/// Store a JSON value as a prolly tree, returning the root of the tree.
pub async fn serialize_json_to_addr<S: NodeStore>(store: &Arc<S>, value: &Value) -> Result<Node> {
    let bytes = marshal_json(value);
    let mut chunker = JsonChunker::new_empty(store.clone());
    chunker.append_json_to_buffer(&bytes);
    chunker.process_buffer().await?;
    let root = chunker.done().await?;
    debug!(len = bytes.len(), root = %root.address(), "serialized document");
    Ok(root)
}

/// Apply one mutation through a positioned cursor, returning the new root.
///
/// The cursor must have been obtained with the bias matching the
/// operation: `SeekBias::At` the value's start for `Replace`,
/// `SeekBias::Before` the value's start for `Insert` and `Delete`. The
/// cursor is consumed.
pub async fn splice_json<S: NodeStore>(
    cursor: JsonCursor<S>,
    path: &JsonPath,
    op: Splice<'_>,
) -> Result<Node> {
    let mut chunker = JsonChunker::from_cursor(cursor)?;
    match op {
        Splice::Insert(value) => {
            chunker.write_key(path)?;
            chunker.append_json_to_buffer(&marshal_json(value));
            chunker.process_buffer().await?;
        }
        Splice::Replace(value) => {
            chunker
                .skip_original(&JsonLocation::end_of(path.clone()))
                .await?;
            chunker.append_json_to_buffer(&marshal_json(value));
            chunker.process_buffer().await?;
        }
        Splice::Delete => {
            chunker
                .skip_original(&JsonLocation::end_of(path.clone()))
                .await?;
        }
    }
    chunker.done().await
}

/// A JSON document stored as a prolly tree.
#[derive(Debug)]
pub struct IndexedJsonDocument<S: NodeStore> {
    store: Arc<S>,
    root: Node,
}

impl<S: NodeStore> Clone for IndexedJsonDocument<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            root: self.root.clone(),
        }
    }
}

impl<S: NodeStore> IndexedJsonDocument<S> {
    /// Serialize `value` into `store` and index the result.
    pub async fn create(store: Arc<S>, value: &Value) -> Result<Self> {
        let root = serialize_json_to_addr(&store, value).await?;
        Ok(Self { store, root })
    }

    /// Open an existing document by its root address.
    pub async fn load(store: Arc<S>, addr: &Address) -> Result<Self> {
        let root = load_node(&store, addr).await?;
        if root.is_leaf() {
            return Err(Error::storage("document root must be an address map"));
        }
        Ok(Self { store, root })
    }

    /// The root node of the document tree.
    pub fn root(&self) -> &Node {
        &self.root
    }

    /// The document's identity: its root address.
    pub fn address(&self) -> Address {
        self.root.address()
    }

    fn with_root(&self, root: Node) -> Self {
        Self {
            store: self.store.clone(),
            root,
        }
    }

    /// The canonical bytes of the whole document: its leaves concatenated
    /// in key order.
    pub async fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut cur = NodeCursor::seek(self.store.clone(), self.root.clone(), &[]).await?;
        let mut out = Vec::new();
        while cur.valid() {
            let leaf = load_node(&self.store, &cur.current_address()).await?;
            if !leaf.is_leaf() {
                return Err(Error::storage("level-1 entry does not address a leaf"));
            }
            out.extend_from_slice(leaf.value());
            cur.advance().await?;
        }
        Ok(out)
    }

    /// Parse the document back into a JSON value.
    pub async fn to_value(&self) -> Result<Value> {
        Ok(serde_json::from_slice(&self.to_bytes().await?)?)
    }

    /// The value at `path`, or `None` if the path does not exist.
    pub async fn lookup(&self, path: &JsonPath) -> Result<Option<Value>> {
        if path.is_root() {
            return Ok(Some(self.to_value().await?));
        }
        let target = JsonLocation::start_of(path.clone());
        let (mut cursor, found) = JsonCursor::seek(
            self.store.clone(),
            self.root.clone(),
            &target,
            SeekBias::At,
        )
        .await?;
        if !found {
            return Ok(None);
        }
        let bytes = cursor.read_value(path).await?;
        Ok(Some(serde_json::from_slice(&bytes)?))
    }

    /// Whether a value exists at `path`.
    pub async fn contains(&self, path: &JsonPath) -> Result<bool> {
        if path.is_root() {
            return Ok(true);
        }
        let target = JsonLocation::start_of(path.clone());
        let (_, found) = JsonCursor::seek(
            self.store.clone(),
            self.root.clone(),
            &target,
            SeekBias::Before,
        )
        .await?;
        Ok(found)
    }

    /// Insert a new value at `path`. Returns the updated document and
    /// whether anything changed (`false` when the path already exists).
    pub async fn insert(&self, path: &JsonPath, value: &Value) -> Result<(Self, bool)> {
        if path.is_root() {
            // The root always exists; inserting it is a no-op.
            return Ok((self.clone(), false));
        }
        let target = JsonLocation::start_of(path.clone());
        let (cursor, exists) = JsonCursor::seek(
            self.store.clone(),
            self.root.clone(),
            &target,
            SeekBias::Before,
        )
        .await?;
        // Occupied object keys are a no-op; occupied array indices shift
        // the existing elements right.
        if exists && matches!(path.last(), Some(PathStep::Key(_))) {
            return Ok((self.clone(), false));
        }
        validate_insert_context(cursor.scanner().location(), path)?;
        let effective = effective_insert_path(cursor.scanner().location(), path);
        let root = splice_json(cursor, &effective, Splice::Insert(value)).await?;
        Ok((self.with_root(root), true))
    }

    /// Replace the value at `path`. Returns the updated document and
    /// whether anything changed (`false` when the path does not exist).
    pub async fn replace(&self, path: &JsonPath, value: &Value) -> Result<(Self, bool)> {
        if path.is_root() {
            let root = serialize_json_to_addr(&self.store, value).await?;
            return Ok((self.with_root(root), true));
        }
        let target = JsonLocation::start_of(path.clone());
        let (cursor, found) = JsonCursor::seek(
            self.store.clone(),
            self.root.clone(),
            &target,
            SeekBias::At,
        )
        .await?;
        if !found {
            return Ok((self.clone(), false));
        }
        let root = splice_json(cursor, path, Splice::Replace(value)).await?;
        Ok((self.with_root(root), true))
    }

    /// Insert-or-replace the value at `path`.
    pub async fn set(&self, path: &JsonPath, value: &Value) -> Result<Self> {
        if path.is_root() {
            return Ok(self.replace(path, value).await?.0);
        }
        if self.contains(path).await? {
            Ok(self.replace(path, value).await?.0)
        } else {
            Ok(self.insert(path, value).await?.0)
        }
    }

    /// Remove the value at `path`. Returns the updated document and
    /// whether anything changed (`false` when the path does not exist).
    pub async fn delete(&self, path: &JsonPath) -> Result<(Self, bool)> {
        if path.is_root() {
            return Err(Error::invariant("cannot delete the document root"));
        }
        let target = JsonLocation::start_of(path.clone());
        let (cursor, found) = JsonCursor::seek(
            self.store.clone(),
            self.root.clone(),
            &target,
            SeekBias::Before,
        )
        .await?;
        if !found {
            return Ok((self.clone(), false));
        }
        let root = splice_json(cursor, path, Splice::Delete).await?;
        Ok((self.with_root(root), true))
    }
}

/// Check that the landing stop for an insert actually sits in the
/// container the new path names a child of, and that the container kind
/// matches the final path step. Writing a key into the wrong structural
/// context would produce a malformed document.
fn validate_insert_context(stop: &JsonLocation, path: &JsonPath) -> Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| Error::invariant("insert path must have a parent"))?;
    let step = path.last().expect("non-root path has a last step");

    let ok = match stop.marker {
        LocationMarker::ObjectInitial => {
            stop.path == parent && matches!(step, PathStep::Key(_))
        }
        LocationMarker::ArrayInitial => {
            stop.path == parent && matches!(step, PathStep::Index(_))
        }
        LocationMarker::EndOfValue => {
            // The stop ends a sibling of the value being inserted.
            stop.path.parent().as_ref() == Some(&parent)
                && match (stop.path.last(), step) {
                    (Some(PathStep::Key(_)), PathStep::Key(_)) => true,
                    (Some(PathStep::Index(_)), PathStep::Index(_)) => true,
                    _ => false,
                }
        }
        LocationMarker::StartOfValue => false,
    };
    if ok {
        Ok(())
    } else {
        Err(Error::invariant(format!(
            "path {path} does not fit the document structure at {}",
            stop.path
        )))
    }
}

/// For array inserts, the landing stop decides where the new element
/// actually goes: an index past the end appends. Rewriting the path keeps
/// the boundary keys the chunker emits canonical for the resulting
/// document.
fn effective_insert_path(stop: &JsonLocation, path: &JsonPath) -> JsonPath {
    if !matches!(path.last(), Some(PathStep::Index(_))) {
        return path.clone();
    }
    let parent = path.parent().expect("insert path is not the root");
    match (stop.marker, stop.path.last()) {
        (LocationMarker::ArrayInitial, _) => parent.child_index(0),
        (LocationMarker::EndOfValue, Some(PathStep::Index(i))) => parent.child_index(i + 1),
        _ => path.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cairn_db_core::MemoryNodeStore;
    use serde_json::json;

    async fn doc(value: &Value) -> IndexedJsonDocument<MemoryNodeStore> {
        let store = Arc::new(MemoryNodeStore::new());
        IndexedJsonDocument::create(store, value).await.unwrap()
    }

    #[tokio::test]
    async fn test_empty_object_layout() {
        let d = doc(&json!({})).await;
        // One interior node with a single end-of-document entry, one leaf
        // holding the two bytes of the document.
        assert_eq!(d.root().level(), 1);
        assert_eq!(d.root().count(), 1);
        assert_eq!(d.root().key(0), crate::location::end_of_document_key());
        assert_eq!(d.to_bytes().await.unwrap(), b"{}");
    }

    #[tokio::test]
    async fn test_roundtrip_value() {
        let v = json!({"a": 1, "b": [true, null, "s"], "c": {"d": 2.5}});
        let d = doc(&v).await;
        assert_eq!(d.to_value().await.unwrap(), v);
        assert_eq!(d.to_bytes().await.unwrap(), marshal_json(&v));
    }

    #[tokio::test]
    async fn test_lookup() {
        let v = json!({"users": [{"id": 1, "name": "ada"}, {"id": 2, "name": "bob"}]});
        let d = doc(&v).await;
        let name = d
            .lookup(&JsonPath::parse("$.users[1].name").unwrap())
            .await
            .unwrap();
        assert_eq!(name, Some(json!("bob")));
        let missing = d
            .lookup(&JsonPath::parse("$.users[2]").unwrap())
            .await
            .unwrap();
        assert_eq!(missing, None);
        let whole = d.lookup(&JsonPath::root()).await.unwrap();
        assert_eq!(whole, Some(v));
    }

    #[tokio::test]
    async fn test_insert_at_head_synthesizes_comma() {
        let d = doc(&json!({"b": 2})).await;
        let (d2, changed) = d
            .insert(&JsonPath::parse("$.a").unwrap(), &json!(1))
            .await
            .unwrap();
        assert!(changed);
        assert_eq!(d2.to_bytes().await.unwrap(), br#"{"a":1,"b":2}"#);
    }

    #[tokio::test]
    async fn test_insert_into_empty_containers() {
        let d = doc(&json!({})).await;
        let (d2, _) = d
            .insert(&JsonPath::parse("$.x").unwrap(), &json!(1))
            .await
            .unwrap();
        assert_eq!(d2.to_bytes().await.unwrap(), br#"{"x":1}"#);

        let d = doc(&json!({"arr": []})).await;
        let (d2, _) = d
            .insert(&JsonPath::parse("$.arr[0]").unwrap(), &json!("first"))
            .await
            .unwrap();
        assert_eq!(d2.to_bytes().await.unwrap(), br#"{"arr":["first"]}"#);
    }

    #[tokio::test]
    async fn test_insert_existing_is_noop() {
        let d = doc(&json!({"a": 1})).await;
        let (d2, changed) = d
            .insert(&JsonPath::parse("$.a").unwrap(), &json!(2))
            .await
            .unwrap();
        assert!(!changed);
        assert_eq!(d2.address(), d.address());
    }

    #[tokio::test]
    async fn test_insert_rejects_missing_parent() {
        let d = doc(&json!({})).await;
        let err = d
            .insert(&JsonPath::parse("$.a.b").unwrap(), &json!(1))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvariantViolation(_)));
    }

    #[tokio::test]
    async fn test_insert_rejects_wrong_container_kind() {
        let d = doc(&json!({"arr": [1, 2]})).await;
        let err = d
            .insert(&JsonPath::parse("$.arr.key").unwrap(), &json!(1))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvariantViolation(_)));
    }

    #[tokio::test]
    async fn test_replace_value() {
        let d = doc(&json!({"a": 1, "b": 2})).await;
        let (d2, changed) = d
            .replace(&JsonPath::parse("$.a").unwrap(), &json!({"nested": true}))
            .await
            .unwrap();
        assert!(changed);
        assert_eq!(
            d2.to_value().await.unwrap(),
            json!({"a": {"nested": true}, "b": 2})
        );
    }

    #[tokio::test]
    async fn test_replace_missing_is_noop() {
        let d = doc(&json!({"a": 1})).await;
        let (d2, changed) = d
            .replace(&JsonPath::parse("$.zzz").unwrap(), &json!(1))
            .await
            .unwrap();
        assert!(!changed);
        assert_eq!(d2.address(), d.address());
    }

    #[tokio::test]
    async fn test_delete_member() {
        let d = doc(&json!({"a": 1, "b": 2, "c": 3})).await;
        let (d2, changed) = d.delete(&JsonPath::parse("$.b").unwrap()).await.unwrap();
        assert!(changed);
        assert_eq!(d2.to_bytes().await.unwrap(), br#"{"a":1,"c":3}"#);
    }

    #[tokio::test]
    async fn test_delete_first_member() {
        let d = doc(&json!({"a": 1, "b": 2})).await;
        let (d2, _) = d.delete(&JsonPath::parse("$.a").unwrap()).await.unwrap();
        assert_eq!(d2.to_bytes().await.unwrap(), br#"{"b":2}"#);
    }

    #[tokio::test]
    async fn test_delete_last_array_element_leaves_no_comma() {
        let d = doc(&json!([1, 2, 3])).await;
        let (d2, _) = d.delete(&JsonPath::parse("$[2]").unwrap()).await.unwrap();
        assert_eq!(d2.to_bytes().await.unwrap(), b"[1,2]");
    }

    #[tokio::test]
    async fn test_delete_only_member() {
        let d = doc(&json!({"only": 1})).await;
        let (d2, _) = d.delete(&JsonPath::parse("$.only").unwrap()).await.unwrap();
        assert_eq!(d2.to_bytes().await.unwrap(), b"{}");
    }

    #[tokio::test]
    async fn test_delete_root_is_an_error() {
        let d = doc(&json!({"a": 1})).await;
        assert!(d.delete(&JsonPath::root()).await.is_err());
    }

    #[tokio::test]
    async fn test_set_inserts_then_replaces() {
        let d = doc(&json!({"a": 1})).await;
        let d2 = d.set(&JsonPath::parse("$.b").unwrap(), &json!(2)).await.unwrap();
        assert_eq!(d2.to_value().await.unwrap(), json!({"a": 1, "b": 2}));
        let d3 = d2.set(&JsonPath::parse("$.b").unwrap(), &json!(3)).await.unwrap();
        assert_eq!(d3.to_value().await.unwrap(), json!({"a": 1, "b": 3}));
    }

    #[tokio::test]
    async fn test_array_insert_shifts_indices() {
        let d = doc(&json!([10, 20, 30])).await;
        let (d2, _) = d
            .insert(&JsonPath::parse("$[1]").unwrap(), &json!(15))
            .await
            .unwrap();
        assert_eq!(d2.to_value().await.unwrap(), json!([10, 15, 20, 30]));
        let fetched = d2.lookup(&JsonPath::parse("$[2]").unwrap()).await.unwrap();
        assert_eq!(fetched, Some(json!(20)));
    }

    #[tokio::test]
    async fn test_array_insert_past_end_appends() {
        let d = doc(&json!([1, 2])).await;
        let (d2, changed) = d
            .insert(&JsonPath::parse("$[9]").unwrap(), &json!(3))
            .await
            .unwrap();
        assert!(changed);
        assert_eq!(d2.to_value().await.unwrap(), json!([1, 2, 3]));
    }

    #[tokio::test]
    async fn test_load_by_address() {
        let store = Arc::new(MemoryNodeStore::new());
        let v = json!({"k": [1, 2, 3]});
        let d = IndexedJsonDocument::create(store.clone(), &v).await.unwrap();
        let reopened = IndexedJsonDocument::load(store, &d.address()).await.unwrap();
        assert_eq!(reopened.to_value().await.unwrap(), v);
    }
}
