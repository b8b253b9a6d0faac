//! RocksDB-backed graph storage
//!
//! Nodes and edges live in separate column families. Adjacency is kept in
//! both directions so incoming and outgoing expansion are prefix scans, and a
//! scope index maps every zone to the nodes it owns.
//!
//! ```text
//! nodes      {id}                      -> node JSON
//! edges_out  {from}\0{TYPE}\0{to}      -> edge JSON
//! edges_in   {to}\0{TYPE}\0{from}      -> edge JSON
//! scope      {zone}\0{kind}\0{id}      -> ()
//! meta       schema_version            -> "1"
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};
use rocksdb::{BoundColumnFamily, IteratorMode, WriteBatch, DB};
use serde::Serialize;
use uuid::Uuid;

use crate::error::{GraphError, Result};
use crate::node::{Node, NodeId, NodeKind};
use crate::relationship::{EdgeRecord, RelationType};

pub(crate) const CF_NODES: &str = "nodes";
pub(crate) const CF_EDGES_OUT: &str = "edges_out";
pub(crate) const CF_EDGES_IN: &str = "edges_in";
pub(crate) const CF_SCOPE: &str = "scope";
pub(crate) const CF_META: &str = "meta";

/// Every column family the schema requires
pub(crate) const COLUMN_FAMILIES: [&str; 5] =
    [CF_NODES, CF_EDGES_OUT, CF_EDGES_IN, CF_SCOPE, CF_META];

/// Schema version written by this build
pub const SCHEMA_VERSION: u32 = 1;
const SCHEMA_VERSION_KEY: &[u8] = b"schema_version";

const SEP: char = '\0';

/// Scope under which zones themselves are indexed
pub(crate) const ROOT_SCOPE: NodeId = NodeId(Uuid::nil());

/// A live handle on the backing store, shared by every repository
pub struct Connection {
    db: DB,
    path: PathBuf,
    write_lock: Mutex<()>,
}

/// An edge as read from one of the adjacency tables
#[derive(Debug, Clone)]
pub(crate) struct StoredEdge {
    pub from: NodeId,
    pub to: NodeId,
    pub relation_type: RelationType,
    pub record: EdgeRecord,
}

/// Node and edge counts
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreStats {
    pub total_nodes: usize,
    pub total_relationships: usize,
    pub nodes_by_kind: BTreeMap<String, usize>,
    pub relationships_by_type: BTreeMap<String, usize>,
}

impl Connection {
    pub(crate) fn new(db: DB, path: PathBuf) -> Self {
        Self {
            db,
            path,
            write_lock: Mutex::new(()),
        }
    }

    /// Directory the store lives in
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Create column families and the schema version marker if missing.
    ///
    /// Safe to run on every start; fails if the store was written by a newer
    /// schema or the marker is unreadable.
    pub(crate) fn bootstrap(&self) -> Result<()> {
        for name in COLUMN_FAMILIES {
            if self.db.cf_handle(name).is_none() {
                self.db
                    .create_cf(name, &rocksdb::Options::default())
                    .map_err(|e| GraphError::schema(format!("creating '{}': {}", name, e)))?;
                log::info!("Created column family '{}'", name);
            }
        }

        let meta = self.cf(CF_META)?;
        match self.db.get_cf(&meta, SCHEMA_VERSION_KEY)? {
            None => {
                self.db
                    .put_cf(&meta, SCHEMA_VERSION_KEY, SCHEMA_VERSION.to_string())?;
                log::info!("Initialized graph schema v{}", SCHEMA_VERSION);
            }
            Some(raw) => {
                let found: u32 = std::str::from_utf8(&raw)
                    .ok()
                    .and_then(|s| s.trim().parse().ok())
                    .ok_or_else(|| GraphError::schema("unreadable schema version marker"))?;
                if found > SCHEMA_VERSION {
                    return Err(GraphError::schema(format!(
                        "store uses schema v{}, this build supports up to v{}",
                        found, SCHEMA_VERSION
                    )));
                }
                log::debug!("Graph schema v{} already present", found);
            }
        }

        Ok(())
    }

    fn cf(&self, name: &str) -> Result<Arc<BoundColumnFamily<'_>>> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| GraphError::schema(format!("missing column family '{}'", name)))
    }

    /// Serialize writers; held for the whole read-modify-write of one call
    pub(crate) fn write_guard(&self) -> MutexGuard<'_, ()> {
        self.write_lock.lock()
    }

    pub(crate) fn batch(&self) -> Batch<'_> {
        Batch {
            conn: self,
            inner: WriteBatch::default(),
        }
    }

    /// Load a node by id
    pub fn get_node(&self, id: NodeId) -> Result<Option<Node>> {
        let nodes = self.cf(CF_NODES)?;
        match self.db.get_cf(&nodes, id.to_string())? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Load a node, failing with `NotFound` if it is absent
    pub(crate) fn require_node(&self, id: NodeId) -> Result<Node> {
        self.get_node(id)?
            .ok_or_else(|| GraphError::not_found(id.to_string()))
    }

    /// Ids of every node of `kind` owned by `zone`
    pub(crate) fn scoped_ids(&self, zone: NodeId, kind: NodeKind) -> Result<Vec<NodeId>> {
        let prefix = format!("{}{}{}{}", zone, SEP, kind, SEP);
        let keys = self.scan_keys(CF_SCOPE, prefix.as_bytes())?;
        keys.iter()
            .map(|key| -> Result<NodeId> {
                let id = &key[prefix.len()..];
                Ok(id.parse::<NodeId>()?)
            })
            .collect()
    }

    /// Whether `zone` owns any node at all
    pub(crate) fn zone_has_members(&self, zone: NodeId) -> Result<bool> {
        let prefix = format!("{}{}", zone, SEP);
        let scope = self.cf(CF_SCOPE)?;
        let mut iter = self.db.iterator_cf(
            &scope,
            IteratorMode::From(prefix.as_bytes(), rocksdb::Direction::Forward),
        );
        match iter.next() {
            Some(item) => {
                let (key, _) = item?;
                Ok(key.starts_with(prefix.as_bytes()))
            }
            None => Ok(false),
        }
    }

    /// Edges leaving `id`, optionally restricted to one type
    pub(crate) fn edges_from(
        &self,
        id: NodeId,
        relation_type: Option<RelationType>,
    ) -> Result<Vec<StoredEdge>> {
        self.scan_edges(CF_EDGES_OUT, id, relation_type, false)
    }

    /// Edges arriving at `id`, optionally restricted to one type
    pub(crate) fn edges_to(
        &self,
        id: NodeId,
        relation_type: Option<RelationType>,
    ) -> Result<Vec<StoredEdge>> {
        self.scan_edges(CF_EDGES_IN, id, relation_type, true)
    }

    /// Look up one exact edge
    pub(crate) fn get_edge(
        &self,
        from: NodeId,
        to: NodeId,
        relation_type: RelationType,
    ) -> Result<Option<EdgeRecord>> {
        let out = self.cf(CF_EDGES_OUT)?;
        match self.db.get_cf(&out, edge_key(from, relation_type, to))? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn scan_edges(
        &self,
        cf_name: &str,
        id: NodeId,
        relation_type: Option<RelationType>,
        reversed: bool,
    ) -> Result<Vec<StoredEdge>> {
        let prefix = match relation_type {
            Some(t) => format!("{}{}{}{}", id, SEP, t, SEP),
            None => format!("{}{}", id, SEP),
        };

        let cf = self.cf(cf_name)?;
        let iter = self.db.iterator_cf(
            &cf,
            IteratorMode::From(prefix.as_bytes(), rocksdb::Direction::Forward),
        );

        let mut edges = Vec::new();
        for item in iter {
            let (key, value) = item?;
            if !key.starts_with(prefix.as_bytes()) {
                break;
            }
            let (near, relation_type, far) = parse_edge_key(&key)?;
            let record: EdgeRecord = serde_json::from_slice(&value)?;
            let (from, to) = if reversed { (far, near) } else { (near, far) };
            edges.push(StoredEdge {
                from,
                to,
                relation_type,
                record,
            });
        }
        Ok(edges)
    }

    fn scan_keys(&self, cf_name: &str, prefix: &[u8]) -> Result<Vec<String>> {
        let cf = self.cf(cf_name)?;
        let iter = self
            .db
            .iterator_cf(&cf, IteratorMode::From(prefix, rocksdb::Direction::Forward));

        let mut keys = Vec::new();
        for item in iter {
            let (key, _) = item?;
            if !key.starts_with(prefix) {
                break;
            }
            keys.push(String::from_utf8_lossy(&key).into_owned());
        }
        Ok(keys)
    }

    /// Node counts per kind and edge counts per type
    pub fn stats(&self) -> Result<StoreStats> {
        let mut stats = StoreStats::default();

        for key in self.scan_keys(CF_SCOPE, b"")? {
            if let Some(kind) = key.split(SEP).nth(1) {
                *stats.nodes_by_kind.entry(kind.to_string()).or_insert(0) += 1;
                stats.total_nodes += 1;
            }
        }

        for key in self.scan_keys(CF_EDGES_OUT, b"")? {
            if let Some(relation_type) = key.split(SEP).nth(1) {
                *stats
                    .relationships_by_type
                    .entry(relation_type.to_string())
                    .or_insert(0) += 1;
                stats.total_relationships += 1;
            }
        }

        Ok(stats)
    }
}

/// Accumulates the writes of one repository call; nothing is visible until
/// [`Batch::commit`].
pub(crate) struct Batch<'a> {
    conn: &'a Connection,
    inner: WriteBatch,
}

impl Batch<'_> {
    /// Write a node record and its scope index entry
    pub fn put_node(&mut self, node: &Node) -> Result<()> {
        let nodes = self.conn.cf(CF_NODES)?;
        let scope = self.conn.cf(CF_SCOPE)?;
        self.inner
            .put_cf(&nodes, node.id().to_string(), serde_json::to_vec(node)?);
        self.inner.put_cf(&scope, scope_key(node), b"");
        Ok(())
    }

    /// Remove a node record and its scope index entry; edges are the
    /// caller's responsibility
    pub fn delete_node(&mut self, node: &Node) -> Result<()> {
        let nodes = self.conn.cf(CF_NODES)?;
        let scope = self.conn.cf(CF_SCOPE)?;
        self.inner.delete_cf(&nodes, node.id().to_string());
        self.inner.delete_cf(&scope, scope_key(node));
        Ok(())
    }

    pub fn put_edge(
        &mut self,
        from: NodeId,
        to: NodeId,
        relation_type: RelationType,
        record: &EdgeRecord,
    ) -> Result<()> {
        let out = self.conn.cf(CF_EDGES_OUT)?;
        let inc = self.conn.cf(CF_EDGES_IN)?;
        let value = serde_json::to_vec(record)?;
        self.inner
            .put_cf(&out, edge_key(from, relation_type, to), &value);
        self.inner
            .put_cf(&inc, edge_key(to, relation_type, from), &value);
        Ok(())
    }

    pub fn delete_edge(
        &mut self,
        from: NodeId,
        to: NodeId,
        relation_type: RelationType,
    ) -> Result<()> {
        let out = self.conn.cf(CF_EDGES_OUT)?;
        let inc = self.conn.cf(CF_EDGES_IN)?;
        self.inner.delete_cf(&out, edge_key(from, relation_type, to));
        self.inner.delete_cf(&inc, edge_key(to, relation_type, from));
        Ok(())
    }

    /// Apply every accumulated write atomically
    pub fn commit(self) -> Result<()> {
        self.conn.db.write(self.inner)?;
        Ok(())
    }
}

fn edge_key(near: NodeId, relation_type: RelationType, far: NodeId) -> String {
    format!("{}{}{}{}{}", near, SEP, relation_type, SEP, far)
}

fn parse_edge_key(key: &[u8]) -> Result<(NodeId, RelationType, NodeId)> {
    let text = std::str::from_utf8(key)
        .map_err(|_| GraphError::other("non UTF-8 edge key"))?;
    let mut parts = text.split(SEP);
    match (parts.next(), parts.next(), parts.next()) {
        (Some(near), Some(relation_type), Some(far)) => {
            Ok((near.parse()?, relation_type.parse()?, far.parse()?))
        }
        _ => Err(GraphError::other(format!("malformed edge key '{}'", text))),
    }
}

fn scope_key(node: &Node) -> String {
    let scope = match node {
        Node::Zone(_) => ROOT_SCOPE,
        other => other.scope(),
    };
    format!("{}{}{}{}{}", scope, SEP, node.kind(), SEP, node.id())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connector::{connect, StoreConfig};
    use crate::node::{Metadata, Zone};
    use chrono::Utc;
    use tempfile::TempDir;

    fn zone(name: &str) -> Node {
        let now = Utc::now();
        Node::Zone(Zone {
            id: NodeId::new(),
            name: name.to_string(),
            description: String::new(),
            tags: Default::default(),
            metadata: Metadata::new(),
            created_at: now,
            updated_at: now,
        })
    }

    #[test]
    fn test_edge_key_round_trip() {
        let a = NodeId::new();
        let b = NodeId::new();
        let key = edge_key(a, RelationType::DependsOn, b);
        let (near, t, far) = parse_edge_key(key.as_bytes()).unwrap();
        assert_eq!((near, t, far), (a, RelationType::DependsOn, b));
    }

    #[test]
    fn test_batch_is_invisible_until_commit() {
        let dir = TempDir::new().unwrap();
        let conn = connect(&StoreConfig::new(dir.path())).unwrap();
        let node = zone("Z1");

        let mut batch = conn.batch();
        batch.put_node(&node).unwrap();
        assert!(conn.get_node(node.id()).unwrap().is_none());
        batch.commit().unwrap();

        assert_eq!(conn.get_node(node.id()).unwrap(), Some(node.clone()));
        assert_eq!(
            conn.scoped_ids(ROOT_SCOPE, NodeKind::Zone).unwrap(),
            vec![node.id()]
        );
    }

    #[test]
    fn test_edges_are_indexed_both_ways() {
        let dir = TempDir::new().unwrap();
        let conn = connect(&StoreConfig::new(dir.path())).unwrap();
        let a = NodeId::new();
        let b = NodeId::new();

        let mut batch = conn.batch();
        batch
            .put_edge(a, b, RelationType::RelatesTo, &EdgeRecord::new())
            .unwrap();
        batch.commit().unwrap();

        let out = conn.edges_from(a, None).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!((out[0].from, out[0].to), (a, b));

        let inc = conn.edges_to(b, Some(RelationType::RelatesTo)).unwrap();
        assert_eq!(inc.len(), 1);
        assert_eq!((inc[0].from, inc[0].to), (a, b));

        assert!(conn.edges_to(b, Some(RelationType::Blocks)).unwrap().is_empty());

        let stats = conn.stats().unwrap();
        assert_eq!(stats.total_relationships, 1);
        assert_eq!(stats.relationships_by_type.get("RELATES_TO"), Some(&1));
    }

    #[test]
    fn test_zone_has_members_ignores_other_prefixes() {
        let dir = TempDir::new().unwrap();
        let conn = connect(&StoreConfig::new(dir.path())).unwrap();
        let node = zone("Z1");

        let mut batch = conn.batch();
        batch.put_node(&node).unwrap();
        batch.commit().unwrap();

        assert!(!conn.zone_has_members(node.id()).unwrap());
        assert!(conn.zone_has_members(ROOT_SCOPE).unwrap());
    }
}
