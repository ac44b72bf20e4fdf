//! The property-graph store seam.
//!
//! Nodes are keyed by URN and carry a label plus a flat property bag. Aspect
//! payloads hang off their entity through a `HAS_ASPECT` edge whose shape
//! (`name`, `kind`, `version` or `ts`, `latest`) is part of the external
//! contract. Relationships are labeled, directed edges between URNs with at
//! most one edge per `(from, type, to)` triple.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

use crate::error::{CatalogError, Result};
use crate::schema::AspectKind;

/// Flat property bag of a node or an edge.
pub type Props = Map<String, JsonValue>;

/// Property stamped on every entity write, in epoch milliseconds.
pub const LAST_UPDATED: &str = "last_updated";
/// Key property of every entity node.
pub const URN: &str = "urn";

/// Decode a record read back from the store. A record that no longer parses
/// is store corruption, not a caller mistake.
pub fn decode_stored<T: DeserializeOwned>(raw: &str) -> Result<T> {
    serde_json::from_str(raw)
        .map_err(|e| CatalogError::Storage(format!("corrupt stored record: {e}")))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeRecord {
    pub label: String,
    pub urn: String,
    pub props: Props,
}

/// Properties of the `HAS_ASPECT` edge.
///
/// Versioned aspects set `version` and `latest`; time-series aspects set `ts`
/// only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HasAspect {
    pub name: String,
    pub kind: AspectKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ts: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latest: Option<bool>,
}

/// The aspect node itself. `payload` is the JSON-serialized aspect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AspectNode {
    pub id: String,
    pub payload: String,
    pub created_at: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AspectRecord {
    pub edge: HasAspect,
    pub node: AspectNode,
}

impl AspectRecord {
    pub fn is_latest(&self) -> bool {
        self.edge.latest == Some(true)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeRecord {
    pub from: String,
    pub rel_type: String,
    pub to: String,
    pub props: Props,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeDirection {
    Outgoing,
    Incoming,
    Both,
}

/// One versioned aspect write.
#[derive(Debug, Clone, Copy)]
pub struct VersionedWrite<'a> {
    pub label: &'a str,
    pub urn: &'a str,
    pub aspect: &'a str,
    pub payload: &'a str,
    /// Explicit version; `None` means "current max + 1", starting at 0.
    pub version: Option<u64>,
    pub created_at: i64,
}

/// One time-series aspect append.
#[derive(Debug, Clone, Copy)]
pub struct TimeSeriesWrite<'a> {
    pub label: &'a str,
    pub urn: &'a str,
    pub aspect: &'a str,
    pub payload: &'a str,
    pub timestamp_ms: i64,
    pub created_at: i64,
}

/// Synchronous request/response access to a property-graph store.
///
/// Every method is one atomic unit of work. In particular
/// [`write_versioned_aspect`](GraphStore::write_versioned_aspect) must read
/// the current max version, demote the previous latest edge and insert the
/// new aspect as a single serialized step for its `(urn, aspect)` key.
pub trait GraphStore: Send + Sync {
    /// `MERGE (n:label {urn}) SET n += props`. A node with the same URN and a
    /// different label is a validation error.
    fn merge_node(&self, label: &str, urn: &str, props: &Props) -> Result<()>;

    fn node(&self, urn: &str) -> Result<Option<NodeRecord>>;

    /// Remove the node, its aspects and every edge touching it. Returns
    /// `false` when no node with that label and URN exists.
    fn detach_delete_node(&self, label: &str, urn: &str) -> Result<bool>;

    /// Returns the version that was written.
    fn write_versioned_aspect(&self, write: VersionedWrite<'_>) -> Result<u64>;

    fn append_timeseries_aspect(&self, write: TimeSeriesWrite<'_>) -> Result<()>;

    /// Every record of `aspect` on `urn`, both kinds, in storage order.
    fn aspect_records(&self, urn: &str, aspect: &str) -> Result<Vec<AspectRecord>>;

    /// Remove every record of `aspect` on `urn`; returns how many were removed.
    fn delete_aspect(&self, label: &str, urn: &str, aspect: &str) -> Result<usize>;

    /// `MATCH (a:from_label {urn}), (b:to_label {urn}) MERGE (a)-[r:type]->(b)
    /// SET r += props`. Missing endpoints are a not-found error.
    fn merge_edge(&self, from_label: &str, to_label: &str, edge: &EdgeRecord) -> Result<()>;

    fn edges(&self, urn: &str, direction: EdgeDirection) -> Result<Vec<EdgeRecord>>;
}
