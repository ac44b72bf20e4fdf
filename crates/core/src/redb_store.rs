//! [`GraphStore`] on top of an embedded redb database.
//!
//! Four tables, all `&str -> &str` with JSON values:
//!
//! - `nodes`: `urn` -> [`NodeRecord`]
//! - `aspects`: `urn \x1f aspect \x1f ulid` -> [`AspectRecord`]
//! - `edges`: `from \x1f type \x1f to` -> [`EdgeRecord`]
//! - `edges_rev`: `to \x1f type \x1f from` -> `""`, the incoming-edge index
//!
//! redb admits one write transaction at a time, so every write below is
//! serialized against every other write on the same database.

use std::path::Path;

use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition, WriteTransaction};
use tracing::{debug, info};
use ulid::Ulid;

use crate::error::{CatalogError, Result, Target};
use crate::schema::{AspectKind, KEY_SEPARATOR};
use crate::store::{
    decode_stored, AspectNode, AspectRecord, EdgeDirection, EdgeRecord, GraphStore, HasAspect,
    NodeRecord, Props, TimeSeriesWrite, VersionedWrite, LAST_UPDATED,
};

const NODES: TableDefinition<&str, &str> = TableDefinition::new("nodes");
const ASPECTS: TableDefinition<&str, &str> = TableDefinition::new("aspects");
const EDGES: TableDefinition<&str, &str> = TableDefinition::new("edges");
const EDGES_REV: TableDefinition<&str, &str> = TableDefinition::new("edges_rev");

pub struct RedbGraphStore {
    db: Database,
}

impl RedbGraphStore {
    /// Open or create a catalog database at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let db = Database::create(path)?;
        info!(path = %path.display(), "opened catalog store");
        Self::init(db)
    }

    /// Create an in-memory catalog database (no file I/O). Data is lost when
    /// the instance is dropped.
    pub fn open_in_memory() -> Result<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder().create_with_backend(backend)?;
        Self::init(db)
    }

    fn init(db: Database) -> Result<Self> {
        {
            let write_txn = db.begin_write()?;
            write_txn.open_table(NODES)?;
            write_txn.open_table(ASPECTS)?;
            write_txn.open_table(EDGES)?;
            write_txn.open_table(EDGES_REV)?;
            write_txn.commit()?;
        }
        Ok(Self { db })
    }
}

// ---------------------------------------------------------------------------
// Keys
// ---------------------------------------------------------------------------

fn join_key(parts: &[&str]) -> String {
    let mut key = String::new();
    for (i, part) in parts.iter().enumerate() {
        if i > 0 {
            key.push(KEY_SEPARATOR);
        }
        key.push_str(part);
    }
    key
}

/// Prefix shared by every key that starts with `parts`, separator included.
fn key_prefix(parts: &[&str]) -> String {
    let mut prefix = join_key(parts);
    prefix.push(KEY_SEPARATOR);
    prefix
}

fn split_key(key: &str) -> Vec<&str> {
    key.split(KEY_SEPARATOR).collect()
}

/// Every `(key, value)` whose key starts with `prefix`, in key order.
fn scan_prefix(
    table: &impl ReadableTable<&'static str, &'static str>,
    prefix: &str,
) -> Result<Vec<(String, String)>> {
    let mut out = Vec::new();
    for entry in table.range(prefix..)? {
        let (k, v) = entry?;
        let key = k.value();
        if !key.starts_with(prefix) {
            break;
        }
        out.push((key.to_string(), v.value().to_string()));
    }
    Ok(out)
}

// ---------------------------------------------------------------------------
// In-transaction helpers
// ---------------------------------------------------------------------------

fn label_conflict(urn: &str, existing: &str, requested: &str) -> CatalogError {
    CatalogError::validation(
        Target::entity(requested, urn),
        format!("node already exists with label `{existing}`"),
    )
}

/// `MERGE` semantics: create the node if missing, otherwise fold `props` in.
fn merge_node_in(txn: &WriteTransaction, label: &str, urn: &str, props: &Props) -> Result<()> {
    let mut nodes = txn.open_table(NODES)?;
    let existing = nodes.get(urn)?.map(|raw| raw.value().to_string());
    let mut node = match existing {
        Some(raw) => {
            let node: NodeRecord = decode_stored(&raw)?;
            if node.label != label {
                return Err(label_conflict(urn, &node.label, label));
            }
            node
        }
        None => NodeRecord {
            label: label.to_string(),
            urn: urn.to_string(),
            props: Props::new(),
        },
    };
    for (key, value) in props {
        node.props.insert(key.clone(), value.clone());
    }
    let value = serde_json::to_string(&node)?;
    nodes.insert(urn, value.as_str())?;
    Ok(())
}

/// Create the entity node for an aspect write when it does not exist yet.
fn ensure_node_in(txn: &WriteTransaction, label: &str, urn: &str, created_at: i64) -> Result<()> {
    let existing = {
        let nodes = txn.open_table(NODES)?;
        let raw = nodes.get(urn)?.map(|raw| raw.value().to_string());
        raw
    };
    match existing {
        Some(raw) => {
            let node: NodeRecord = decode_stored(&raw)?;
            if node.label != label {
                return Err(label_conflict(urn, &node.label, label));
            }
            Ok(())
        }
        None => {
            let mut props = Props::new();
            props.insert(LAST_UPDATED.to_string(), created_at.into());
            merge_node_in(txn, label, urn, &props)
        }
    }
}

fn require_node_in(txn: &WriteTransaction, label: &str, urn: &str) -> Result<()> {
    let nodes = txn.open_table(NODES)?;
    let raw = nodes.get(urn)?.map(|raw| raw.value().to_string());
    match raw {
        Some(raw) => {
            let node: NodeRecord = decode_stored(&raw)?;
            if node.label == label {
                Ok(())
            } else {
                Err(CatalogError::NotFound(Target::entity(label, urn)))
            }
        }
        None => Err(CatalogError::NotFound(Target::entity(label, urn))),
    }
}

fn insert_aspect(txn: &WriteTransaction, urn: &str, record: &AspectRecord) -> Result<()> {
    let key = join_key(&[urn, record.edge.name.as_str(), record.node.id.as_str()]);
    let value = serde_json::to_string(record)?;
    let mut aspects = txn.open_table(ASPECTS)?;
    aspects.insert(key.as_str(), value.as_str())?;
    Ok(())
}

// ---------------------------------------------------------------------------
// GraphStore
// ---------------------------------------------------------------------------

impl GraphStore for RedbGraphStore {
    fn merge_node(&self, label: &str, urn: &str, props: &Props) -> Result<()> {
        let write_txn = self.db.begin_write()?;
        merge_node_in(&write_txn, label, urn, props)?;
        write_txn.commit()?;
        Ok(())
    }

    fn node(&self, urn: &str) -> Result<Option<NodeRecord>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(NODES)?;
        let raw = table.get(urn)?.map(|raw| raw.value().to_string());
        match raw {
            Some(raw) => Ok(Some(decode_stored(&raw)?)),
            None => Ok(None),
        }
    }

    fn detach_delete_node(&self, label: &str, urn: &str) -> Result<bool> {
        let write_txn = self.db.begin_write()?;
        {
            let mut nodes = write_txn.open_table(NODES)?;
            let existing = nodes.get(urn)?.map(|raw| raw.value().to_string());
            let Some(raw) = existing else {
                return Ok(false);
            };
            let node: NodeRecord = decode_stored(&raw)?;
            if node.label != label {
                return Ok(false);
            }
            nodes.remove(urn)?;

            let prefix = key_prefix(&[urn]);

            let mut aspects = write_txn.open_table(ASPECTS)?;
            for (key, _) in scan_prefix(&aspects, &prefix)? {
                aspects.remove(key.as_str())?;
            }

            let mut edges = write_txn.open_table(EDGES)?;
            let mut edges_rev = write_txn.open_table(EDGES_REV)?;
            for (key, _) in scan_prefix(&edges, &prefix)? {
                if let [from, rel, to] = split_key(&key)[..] {
                    edges_rev.remove(join_key(&[to, rel, from]).as_str())?;
                }
                edges.remove(key.as_str())?;
            }
            for (key, _) in scan_prefix(&edges_rev, &prefix)? {
                if let [to, rel, from] = split_key(&key)[..] {
                    edges.remove(join_key(&[from, rel, to]).as_str())?;
                }
                edges_rev.remove(key.as_str())?;
            }
        }
        write_txn.commit()?;
        debug!(label, urn, "detach-deleted node");
        Ok(true)
    }

    fn write_versioned_aspect(&self, write: VersionedWrite<'_>) -> Result<u64> {
        let write_txn = self.db.begin_write()?;
        ensure_node_in(&write_txn, write.label, write.urn, write.created_at)?;

        let version = {
            let mut aspects = write_txn.open_table(ASPECTS)?;
            let prefix = key_prefix(&[write.urn, write.aspect]);

            let mut max_version: Option<u64> = None;
            let mut demote = Vec::new();
            for (key, raw) in scan_prefix(&aspects, &prefix)? {
                let record: AspectRecord = decode_stored(&raw)?;
                let Some(existing) = record.edge.version else {
                    continue;
                };
                if write.version == Some(existing) {
                    return Err(CatalogError::validation(
                        Target::aspect(write.label, write.urn, write.aspect),
                        format!("version {existing} already exists"),
                    ));
                }
                max_version = max_version.max(Some(existing));
                if record.is_latest() {
                    demote.push((key, record));
                }
            }

            let version = match (write.version, max_version) {
                (Some(explicit), _) => explicit,
                (None, None) => 0,
                (None, Some(max)) => max.checked_add(1).ok_or_else(|| {
                    CatalogError::validation(
                        Target::aspect(write.label, write.urn, write.aspect),
                        "version space exhausted",
                    )
                })?,
            };

            for (key, mut record) in demote {
                record.edge.latest = Some(false);
                let value = serde_json::to_string(&record)?;
                aspects.insert(key.as_str(), value.as_str())?;
            }

            version
        };

        let record = AspectRecord {
            edge: HasAspect {
                name: write.aspect.to_string(),
                kind: AspectKind::Versioned,
                version: Some(version),
                ts: None,
                latest: Some(true),
            },
            node: AspectNode {
                id: Ulid::new().to_string(),
                payload: write.payload.to_string(),
                created_at: write.created_at,
            },
        };
        insert_aspect(&write_txn, write.urn, &record)?;
        write_txn.commit()?;
        Ok(version)
    }

    fn append_timeseries_aspect(&self, write: TimeSeriesWrite<'_>) -> Result<()> {
        let write_txn = self.db.begin_write()?;
        ensure_node_in(&write_txn, write.label, write.urn, write.created_at)?;
        let record = AspectRecord {
            edge: HasAspect {
                name: write.aspect.to_string(),
                kind: AspectKind::TimeSeries,
                version: None,
                ts: Some(write.timestamp_ms),
                latest: None,
            },
            node: AspectNode {
                id: Ulid::new().to_string(),
                payload: write.payload.to_string(),
                created_at: write.created_at,
            },
        };
        insert_aspect(&write_txn, write.urn, &record)?;
        write_txn.commit()?;
        Ok(())
    }

    fn aspect_records(&self, urn: &str, aspect: &str) -> Result<Vec<AspectRecord>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(ASPECTS)?;
        let mut out = Vec::new();
        for (_, raw) in scan_prefix(&table, &key_prefix(&[urn, aspect]))? {
            out.push(decode_stored(&raw)?);
        }
        Ok(out)
    }

    fn delete_aspect(&self, label: &str, urn: &str, aspect: &str) -> Result<usize> {
        let write_txn = self.db.begin_write()?;
        let removed = {
            let nodes = write_txn.open_table(NODES)?;
            let matches = match nodes.get(urn)? {
                Some(raw) => decode_stored::<NodeRecord>(raw.value())?.label == label,
                None => false,
            };
            if !matches {
                return Ok(0);
            }
            let mut aspects = write_txn.open_table(ASPECTS)?;
            let keys = scan_prefix(&aspects, &key_prefix(&[urn, aspect]))?;
            for (key, _) in &keys {
                aspects.remove(key.as_str())?;
            }
            keys.len()
        };
        write_txn.commit()?;
        Ok(removed)
    }

    fn merge_edge(&self, from_label: &str, to_label: &str, edge: &EdgeRecord) -> Result<()> {
        let write_txn = self.db.begin_write()?;
        require_node_in(&write_txn, from_label, &edge.from)?;
        require_node_in(&write_txn, to_label, &edge.to)?;
        {
            let mut edges = write_txn.open_table(EDGES)?;
            let key = join_key(&[edge.from.as_str(), edge.rel_type.as_str(), edge.to.as_str()]);
            let existing = edges.get(key.as_str())?.map(|raw| raw.value().to_string());
            let mut merged = match existing {
                Some(raw) => decode_stored::<EdgeRecord>(&raw)?,
                None => EdgeRecord {
                    props: Props::new(),
                    ..edge.clone()
                },
            };
            for (name, value) in &edge.props {
                merged.props.insert(name.clone(), value.clone());
            }
            let value = serde_json::to_string(&merged)?;
            edges.insert(key.as_str(), value.as_str())?;

            let mut edges_rev = write_txn.open_table(EDGES_REV)?;
            let rev_key = join_key(&[edge.to.as_str(), edge.rel_type.as_str(), edge.from.as_str()]);
            edges_rev.insert(rev_key.as_str(), "")?;
        }
        write_txn.commit()?;
        Ok(())
    }

    fn edges(&self, urn: &str, direction: EdgeDirection) -> Result<Vec<EdgeRecord>> {
        let read_txn = self.db.begin_read()?;
        let edges = read_txn.open_table(EDGES)?;
        let prefix = key_prefix(&[urn]);
        let mut out = Vec::new();

        if matches!(direction, EdgeDirection::Outgoing | EdgeDirection::Both) {
            for (_, raw) in scan_prefix(&edges, &prefix)? {
                out.push(decode_stored(&raw)?);
            }
        }
        if matches!(direction, EdgeDirection::Incoming | EdgeDirection::Both) {
            let edges_rev = read_txn.open_table(EDGES_REV)?;
            for (key, _) in scan_prefix(&edges_rev, &prefix)? {
                let [to, rel, from] = split_key(&key)[..] else {
                    continue;
                };
                // A self-loop was already listed by the outgoing scan.
                if direction == EdgeDirection::Both && from == to {
                    continue;
                }
                if let Some(raw) = edges.get(join_key(&[from, rel, to]).as_str())? {
                    out.push(decode_stored(raw.value())?);
                }
            }
        }
        Ok(out)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use serde_json::json;
    use tempfile::NamedTempFile;

    fn open_temp_store() -> (RedbGraphStore, NamedTempFile) {
        let file = NamedTempFile::new().unwrap();
        let path = file.path().to_str().unwrap().to_string();
        let store = RedbGraphStore::open(&path).unwrap();
        (store, file)
    }

    fn props(value: serde_json::Value) -> Props {
        value.as_object().cloned().unwrap()
    }

    fn versioned<'a>(urn: &'a str, payload: &'a str, version: Option<u64>) -> VersionedWrite<'a> {
        VersionedWrite {
            label: "Dataset",
            urn,
            aspect: "ownership",
            payload,
            version,
            created_at: 1_000,
        }
    }

    #[test]
    fn merge_node_creates_then_folds_props() {
        let store = RedbGraphStore::open_in_memory().unwrap();
        store
            .merge_node("Dataset", "urn:d", &props(json!({"name": "a", "env": "PROD"})))
            .unwrap();
        store
            .merge_node("Dataset", "urn:d", &props(json!({"name": "b"})))
            .unwrap();

        let node = store.node("urn:d").unwrap().unwrap();
        assert_eq!(node.label, "Dataset");
        assert_eq!(node.props["name"], "b");
        assert_eq!(node.props["env"], "PROD");
    }

    #[test]
    fn merge_node_rejects_label_change() {
        let store = RedbGraphStore::open_in_memory().unwrap();
        store.merge_node("Dataset", "urn:d", &Props::new()).unwrap();
        let err = store
            .merge_node("CorpUser", "urn:d", &Props::new())
            .unwrap_err();
        assert!(err.to_string().contains("label `Dataset`"), "{err}");
    }

    #[test]
    fn versions_increase_and_latest_moves() {
        let store = RedbGraphStore::open_in_memory().unwrap();
        assert_eq!(store.write_versioned_aspect(versioned("urn:d", "{}", None)).unwrap(), 0);
        assert_eq!(store.write_versioned_aspect(versioned("urn:d", "{}", None)).unwrap(), 1);
        assert_eq!(store.write_versioned_aspect(versioned("urn:d", "{}", Some(7))).unwrap(), 7);
        assert_eq!(store.write_versioned_aspect(versioned("urn:d", "{}", None)).unwrap(), 8);

        let records = store.aspect_records("urn:d", "ownership").unwrap();
        assert_eq!(records.len(), 4);
        let latest: Vec<_> = records.iter().filter(|r| r.is_latest()).collect();
        assert_eq!(latest.len(), 1);
        assert_eq!(latest[0].edge.version, Some(8));

        // The entity node was created by the first aspect write.
        let node = store.node("urn:d").unwrap().unwrap();
        assert_eq!(node.props[LAST_UPDATED], 1_000);
    }

    #[test]
    fn explicit_existing_version_is_rejected_without_side_effects() {
        let store = RedbGraphStore::open_in_memory().unwrap();
        store.write_versioned_aspect(versioned("urn:d", "{}", None)).unwrap();
        let err = store
            .write_versioned_aspect(versioned("urn:d", "{\"x\":1}", Some(0)))
            .unwrap_err();
        assert!(err.to_string().contains("version 0 already exists"), "{err}");

        let records = store.aspect_records("urn:d", "ownership").unwrap();
        assert_eq!(records.len(), 1);
        assert!(records[0].is_latest());
    }

    #[test]
    fn exhausted_version_space_is_rejected_without_side_effects() {
        let store = RedbGraphStore::open_in_memory().unwrap();
        assert_eq!(
            store
                .write_versioned_aspect(versioned("urn:d", "{}", Some(u64::MAX)))
                .unwrap(),
            u64::MAX
        );
        let err = store
            .write_versioned_aspect(versioned("urn:d", "{}", None))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(err.to_string().contains("version space exhausted"), "{err}");

        let records = store.aspect_records("urn:d", "ownership").unwrap();
        assert_eq!(records.len(), 1);
        assert!(records[0].is_latest());
        assert_eq!(records[0].edge.version, Some(u64::MAX));
    }

    #[test]
    fn undecodable_stored_record_is_a_store_error() {
        let store = RedbGraphStore::open_in_memory().unwrap();
        let write_txn = store.db.begin_write().unwrap();
        {
            let mut nodes = write_txn.open_table(NODES).unwrap();
            nodes.insert("urn:d", "not json").unwrap();
        }
        write_txn.commit().unwrap();

        let err = store.node("urn:d").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Store);
        assert!(err.to_string().contains("corrupt stored record"), "{err}");
    }

    #[test]
    fn self_loop_is_listed_once_in_both_directions() {
        let store = RedbGraphStore::open_in_memory().unwrap();
        store.merge_node("Dataset", "urn:d", &Props::new()).unwrap();
        let edge = EdgeRecord {
            from: "urn:d".into(),
            rel_type: "DOWNSTREAM_OF".into(),
            to: "urn:d".into(),
            props: Props::new(),
        };
        store.merge_edge("Dataset", "Dataset", &edge).unwrap();

        assert_eq!(store.edges("urn:d", EdgeDirection::Outgoing).unwrap().len(), 1);
        assert_eq!(store.edges("urn:d", EdgeDirection::Incoming).unwrap().len(), 1);
        assert_eq!(store.edges("urn:d", EdgeDirection::Both).unwrap(), vec![edge]);
    }

    #[test]
    fn aspect_scans_do_not_bleed_across_urns_sharing_a_prefix() {
        let store = RedbGraphStore::open_in_memory().unwrap();
        store.write_versioned_aspect(versioned("urn:d", "{}", None)).unwrap();
        store.write_versioned_aspect(versioned("urn:d2", "{}", None)).unwrap();
        assert_eq!(store.aspect_records("urn:d", "ownership").unwrap().len(), 1);
        assert_eq!(store.aspect_records("urn:d", "owner").unwrap().len(), 0);
    }

    #[test]
    fn timeseries_appends_keep_every_point() {
        let store = RedbGraphStore::open_in_memory().unwrap();
        for ts in [30, 10, 20] {
            store
                .append_timeseries_aspect(TimeSeriesWrite {
                    label: "Dataset",
                    urn: "urn:d",
                    aspect: "datasetProfile",
                    payload: "{}",
                    timestamp_ms: ts,
                    created_at: 5,
                })
                .unwrap();
        }
        let records = store.aspect_records("urn:d", "datasetProfile").unwrap();
        let mut stamps: Vec<_> = records.iter().filter_map(|r| r.edge.ts).collect();
        stamps.sort_unstable();
        assert_eq!(stamps, vec![10, 20, 30]);
        assert!(records.iter().all(|r| r.edge.latest.is_none()));
    }

    #[test]
    fn merge_edge_requires_both_endpoints() {
        let store = RedbGraphStore::open_in_memory().unwrap();
        store.merge_node("CorpUser", "urn:u", &Props::new()).unwrap();
        let edge = EdgeRecord {
            from: "urn:u".into(),
            rel_type: "OWNS".into(),
            to: "urn:d".into(),
            props: Props::new(),
        };
        let err = store.merge_edge("CorpUser", "Dataset", &edge).unwrap_err();
        assert!(matches!(err, CatalogError::NotFound(_)), "{err}");
        assert!(store.edges("urn:u", EdgeDirection::Outgoing).unwrap().is_empty());
    }

    #[test]
    fn merge_edge_is_idempotent_and_indexed_both_ways() {
        let store = RedbGraphStore::open_in_memory().unwrap();
        store.merge_node("CorpUser", "urn:u", &Props::new()).unwrap();
        store.merge_node("Dataset", "urn:d", &Props::new()).unwrap();
        let edge = EdgeRecord {
            from: "urn:u".into(),
            rel_type: "OWNS".into(),
            to: "urn:d".into(),
            props: props(json!({"type": "DATAOWNER"})),
        };
        store.merge_edge("CorpUser", "Dataset", &edge).unwrap();
        store.merge_edge("CorpUser", "Dataset", &edge).unwrap();

        let out = store.edges("urn:u", EdgeDirection::Outgoing).unwrap();
        assert_eq!(out, vec![edge.clone()]);
        let inbound = store.edges("urn:d", EdgeDirection::Incoming).unwrap();
        assert_eq!(inbound, vec![edge]);
        assert_eq!(store.edges("urn:d", EdgeDirection::Both).unwrap().len(), 1);
    }

    #[test]
    fn detach_delete_removes_aspects_and_edges() {
        let (store, _tmp) = open_temp_store();
        store.merge_node("CorpUser", "urn:u", &Props::new()).unwrap();
        store.write_versioned_aspect(versioned("urn:d", "{}", None)).unwrap();
        let edge = EdgeRecord {
            from: "urn:u".into(),
            rel_type: "OWNS".into(),
            to: "urn:d".into(),
            props: Props::new(),
        };
        store.merge_edge("CorpUser", "Dataset", &edge).unwrap();

        assert!(!store.detach_delete_node("CorpUser", "urn:d").unwrap());
        assert!(store.detach_delete_node("Dataset", "urn:d").unwrap());
        assert!(store.node("urn:d").unwrap().is_none());
        assert!(store.aspect_records("urn:d", "ownership").unwrap().is_empty());
        assert!(store.edges("urn:u", EdgeDirection::Both).unwrap().is_empty());
        assert!(store.node("urn:u").unwrap().is_some());
    }

    #[test]
    fn delete_aspect_counts_removed_records() {
        let store = RedbGraphStore::open_in_memory().unwrap();
        store.write_versioned_aspect(versioned("urn:d", "{}", None)).unwrap();
        store.write_versioned_aspect(versioned("urn:d", "{}", None)).unwrap();
        assert_eq!(store.delete_aspect("CorpUser", "urn:d", "ownership").unwrap(), 0);
        assert_eq!(store.delete_aspect("Dataset", "urn:d", "ownership").unwrap(), 2);
        assert_eq!(store.delete_aspect("Dataset", "urn:d", "ownership").unwrap(), 0);
    }

    #[test]
    fn data_survives_reopen() {
        let file = NamedTempFile::new().unwrap();
        let path = file.path().to_str().unwrap().to_string();
        {
            let store = RedbGraphStore::open(&path).unwrap();
            store.write_versioned_aspect(versioned("urn:d", "{\"a\":1}", None)).unwrap();
        }
        let store = RedbGraphStore::open(&path).unwrap();
        let records = store.aspect_records("urn:d", "ownership").unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].node.payload, "{\"a\":1}");
    }
}
