//! The generic persistence core.
//!
//! [`GraphWriter`] implements every entity, aspect and relationship operation
//! once, for any type the schema declares. Pairings are checked against the
//! schema before anything touches the store; payloads go through the
//! [`AspectProcessor`]; discovery runs synchronously after each aspect write.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use serde_json::Value as JsonValue;
use tracing::debug;

use crate::aspect::AspectProcessor;
use crate::error::{CatalogError, Result, Target};
use crate::pipeline::{context_from, json_type};
use crate::rules::{DiscoveredRelationship, RelationshipEngine};
use crate::schema::{AspectKind, AspectType, EntityCreation, Schema, KEY_SEPARATOR};
use crate::store::{
    decode_stored, AspectRecord, EdgeDirection, EdgeRecord, GraphStore, Props, TimeSeriesWrite, VersionedWrite,
    LAST_UPDATED, URN,
};

/// A versioned aspect as read back from the store.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VersionedAspect {
    pub version: u64,
    pub payload: JsonValue,
    pub created_at: i64,
    pub latest: bool,
}

/// One point of a time-series aspect.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimeSeriesAspect {
    pub timestamp_ms: i64,
    pub payload: JsonValue,
    pub created_at: i64,
}

/// Which entity an aspect write lands on.
#[derive(Debug, Clone, PartialEq)]
pub enum AspectTarget {
    /// An entity referenced by URN. Without an explicit type the label is
    /// taken from the stored node, then from the aspect's entity-creation
    /// rule, then from the single entity type carrying the aspect.
    Urn {
        urn: String,
        entity_type: Option<String>,
    },
    /// Independent ingestion: derive (and create) the entity from the
    /// aspect's entity-creation rule.
    Params(Props),
}

pub(crate) fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

pub struct GraphWriter {
    schema: Arc<Schema>,
    store: Arc<dyn GraphStore>,
    processor: AspectProcessor,
    rules: RelationshipEngine,
}

impl GraphWriter {
    pub fn new(schema: Arc<Schema>, store: Arc<dyn GraphStore>) -> Self {
        let processor = AspectProcessor::new(Arc::clone(&schema));
        let rules = RelationshipEngine::new(Arc::clone(&schema));
        Self::from_parts(schema, store, processor, rules)
    }

    pub fn from_parts(
        schema: Arc<Schema>,
        store: Arc<dyn GraphStore>,
        processor: AspectProcessor,
        rules: RelationshipEngine,
    ) -> Self {
        Self {
            schema,
            store,
            processor,
            rules,
        }
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn store(&self) -> &dyn GraphStore {
        self.store.as_ref()
    }

    // -----------------------------------------------------------------------
    // Entities
    // -----------------------------------------------------------------------

    /// Merge-or-create the entity. Nulls are stripped, `last_updated` is
    /// always stamped, `urn` and `last_updated` in `props` are ignored.
    pub fn upsert_entity(&self, label: &str, urn: &str, props: Props) -> Result<()> {
        let entity = self.schema.entity(label)?;
        check_urn(label, urn)?;

        let mut clean = strip_nulls(props);
        clean.remove(URN);
        clean.remove(LAST_UPDATED);

        let undeclared: Vec<&str> = clean
            .keys()
            .filter(|k| !entity.properties.contains(k.as_str()))
            .map(String::as_str)
            .collect();
        if !undeclared.is_empty() {
            return Err(CatalogError::validation(
                Target::entity(label, urn),
                format!("undeclared properties: {}", undeclared.join(", ")),
            ));
        }
        check_flat(&clean, || Target::entity(label, urn))?;

        clean.insert(LAST_UPDATED.to_string(), now_ms().into());
        self.store.merge_node(label, urn, &clean)?;
        debug!(label, urn, props = clean.len(), "upserted entity");
        Ok(())
    }

    /// The entity's properties, `urn` included.
    pub fn get_entity(&self, label: &str, urn: &str) -> Result<Props> {
        self.schema.entity(label)?;
        let node = self
            .store
            .node(urn)?
            .filter(|n| n.label == label)
            .ok_or_else(|| CatalogError::NotFound(Target::entity(label, urn)))?;
        let mut props = node.props;
        props.insert(URN.to_string(), JsonValue::String(node.urn));
        Ok(props)
    }

    /// Detach-delete the entity, its aspects and its edges.
    pub fn delete_entity(&self, label: &str, urn: &str) -> Result<()> {
        self.schema.entity(label)?;
        if !self.store.detach_delete_node(label, urn)? {
            return Err(CatalogError::NotFound(Target::entity(label, urn)));
        }
        debug!(label, urn, "deleted entity");
        Ok(())
    }

    /// Create `urn` as a stub `label` entity when it does not exist yet.
    ///
    /// `stub` is filtered down to the entity type's declared properties.
    /// Returns whether the entity was created.
    pub fn ensure_entity(&self, label: &str, urn: &str, stub: &Props) -> Result<bool> {
        let entity = self.schema.entity(label)?;
        if let Some(node) = self.store.node(urn)? {
            if node.label != label {
                return Err(CatalogError::validation(
                    Target::entity(label, urn),
                    format!("node already exists with label `{}`", node.label),
                ));
            }
            return Ok(false);
        }
        let props: Props = stub
            .iter()
            .filter(|(k, v)| entity.properties.contains(k.as_str()) && is_flat(v))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        self.upsert_entity(label, urn, props)?;
        Ok(true)
    }

    /// Validate the required params of `rule`, derive the URN and upsert the
    /// entity. Returns the URN.
    pub fn create_entity_if_needed(&self, rule: &EntityCreation, params: &Props) -> Result<String> {
        let missing: Vec<&str> = rule
            .required_params
            .iter()
            .filter(|p| params.get(p.as_str()).is_none_or(JsonValue::is_null))
            .map(String::as_str)
            .collect();
        if !missing.is_empty() {
            return Err(CatalogError::validation(
                Target::entity_type(&rule.entity_type),
                format!("missing required parameter(s): {}", missing.join(", ")),
            ));
        }

        let fields: Props = rule
            .required_params
            .iter()
            .chain(&rule.optional_params)
            .filter_map(|p| {
                params
                    .get(p)
                    .filter(|v| !v.is_null())
                    .map(|v| (p.clone(), v.clone()))
            })
            .collect();
        let urn = self
            .schema
            .generate_urn(&rule.urn, &fields)
            .map_err(|e| e.within(Target::entity_type(&rule.entity_type)))?;

        let entity = self.schema.entity(&rule.entity_type)?;
        let props: Props = fields
            .into_iter()
            .filter(|(k, v)| entity.properties.contains(k.as_str()) && is_flat(v))
            .collect();
        self.upsert_entity(&rule.entity_type, &urn, props)?;
        Ok(urn)
    }

    // -----------------------------------------------------------------------
    // Aspects
    // -----------------------------------------------------------------------

    /// Resolve the `(label, urn)` an aspect write should land on, creating
    /// the entity first for independent ingestion.
    pub fn resolve_target(&self, aspect: &str, target: &AspectTarget) -> Result<(String, String)> {
        let aspect_type = self.schema.aspect(aspect)?;
        match target {
            AspectTarget::Urn {
                urn,
                entity_type: Some(label),
            } => Ok((label.clone(), urn.clone())),
            AspectTarget::Urn {
                urn,
                entity_type: None,
            } => {
                if let Some(node) = self.store.node(urn)? {
                    return Ok((node.label, urn.clone()));
                }
                if let Some(rule) = &aspect_type.entity_creation {
                    return Ok((rule.entity_type.clone(), urn.clone()));
                }
                let mut carriers = self.schema.carriers_of(aspect);
                match (carriers.next(), carriers.next()) {
                    (Some(only), None) => Ok((only.name.clone(), urn.clone())),
                    _ => Err(CatalogError::validation(
                        Target {
                            entity_type: None,
                            urn: Some(urn.clone()),
                            aspect: Some(aspect.to_string()),
                        },
                        "cannot infer the entity type; pass `entity_type`",
                    )),
                }
            }
            AspectTarget::Params(params) => {
                let rule = aspect_type.entity_creation.as_ref().ok_or_else(|| {
                    CatalogError::validation(
                        Target::aspect_name(aspect),
                        "aspect has no entity-creation rule; pass `urn`",
                    )
                })?;
                let urn = self.create_entity_if_needed(rule, params)?;
                Ok((rule.entity_type.clone(), urn))
            }
        }
    }

    /// Write a new version of a versioned aspect and run discovery.
    ///
    /// Returns the version written: `version` when given, otherwise one past
    /// the current maximum (0 for the first write).
    pub fn upsert_versioned_aspect(
        &self,
        label: &str,
        urn: &str,
        aspect: &str,
        payload: JsonValue,
        version: Option<u64>,
    ) -> Result<u64> {
        self.check_pairing(label, urn, aspect, Some(AspectKind::Versioned))?;
        check_urn(label, urn)?;
        let validated = self.processor.validate(aspect, payload)?;
        let serialized = serde_json::to_string(&validated)?;

        let written = self.store.write_versioned_aspect(VersionedWrite {
            label,
            urn,
            aspect,
            payload: &serialized,
            version,
            created_at: now_ms(),
        })?;
        debug!(label, urn, aspect, version = written, "wrote versioned aspect");

        self.rules.discover(self, urn, label, aspect, &validated)?;
        Ok(written)
    }

    /// Append one time-series point and run discovery. Returns its
    /// timestamp, generated when not supplied.
    pub fn append_timeseries_aspect(
        &self,
        label: &str,
        urn: &str,
        aspect: &str,
        payload: JsonValue,
        timestamp_ms: Option<i64>,
    ) -> Result<i64> {
        self.check_pairing(label, urn, aspect, Some(AspectKind::TimeSeries))?;
        check_urn(label, urn)?;
        let validated = self.processor.validate(aspect, payload)?;
        let serialized = serde_json::to_string(&validated)?;

        let created_at = now_ms();
        let ts = timestamp_ms.unwrap_or(created_at);
        self.store.append_timeseries_aspect(TimeSeriesWrite {
            label,
            urn,
            aspect,
            payload: &serialized,
            timestamp_ms: ts,
            created_at,
        })?;
        debug!(label, urn, aspect, ts, "appended time-series aspect");

        self.rules.discover(self, urn, label, aspect, &validated)?;
        Ok(ts)
    }

    pub fn get_latest_aspect(&self, label: &str, urn: &str, aspect: &str) -> Result<VersionedAspect> {
        self.versioned_records(label, urn, aspect)?
            .into_iter()
            .find(AspectRecord::is_latest)
            .map(versioned_from)
            .transpose()?
            .ok_or_else(|| CatalogError::NotFound(Target::aspect(label, urn, aspect)))
    }

    pub fn get_aspect_version(
        &self,
        label: &str,
        urn: &str,
        aspect: &str,
        version: u64,
    ) -> Result<VersionedAspect> {
        self.versioned_records(label, urn, aspect)?
            .into_iter()
            .find(|r| r.edge.version == Some(version))
            .map(versioned_from)
            .transpose()?
            .ok_or_else(|| CatalogError::NotFound(Target::aspect(label, urn, aspect)))
    }

    /// Every version, oldest first.
    pub fn aspect_history(&self, label: &str, urn: &str, aspect: &str) -> Result<Vec<VersionedAspect>> {
        let mut history = self
            .versioned_records(label, urn, aspect)?
            .into_iter()
            .map(versioned_from)
            .collect::<Result<Vec<_>>>()?;
        history.sort_by_key(|v| v.version);
        Ok(history)
    }

    /// The newest `limit` points, newest first.
    pub fn get_timeseries_aspect(
        &self,
        label: &str,
        urn: &str,
        aspect: &str,
        limit: usize,
    ) -> Result<Vec<TimeSeriesAspect>> {
        self.check_pairing(label, urn, aspect, Some(AspectKind::TimeSeries))?;
        self.require_entity(label, urn)?;
        let mut points = Vec::new();
        for record in self.store.aspect_records(urn, aspect)? {
            let Some(ts) = record.edge.ts else {
                continue;
            };
            points.push(TimeSeriesAspect {
                timestamp_ms: ts,
                payload: decode_stored(&record.node.payload)?,
                created_at: record.node.created_at,
            });
        }
        points.sort_by(|a, b| {
            b.timestamp_ms
                .cmp(&a.timestamp_ms)
                .then(b.created_at.cmp(&a.created_at))
        });
        points.truncate(limit);
        Ok(points)
    }

    /// Remove every record of `aspect` on the entity; returns how many.
    pub fn delete_aspect(&self, label: &str, urn: &str, aspect: &str) -> Result<usize> {
        self.check_pairing(label, urn, aspect, None)?;
        let removed = self.store.delete_aspect(label, urn, aspect)?;
        if removed == 0 {
            return Err(CatalogError::NotFound(Target::aspect(label, urn, aspect)));
        }
        debug!(label, urn, aspect, removed, "deleted aspect");
        Ok(removed)
    }

    // -----------------------------------------------------------------------
    // Relationships
    // -----------------------------------------------------------------------

    /// Merge a `rel_type` edge between two existing entities. Re-invocation
    /// updates the edge's properties and never duplicates it.
    pub fn create_relationship(
        &self,
        from_label: &str,
        from_urn: &str,
        rel_type: &str,
        to_label: &str,
        to_urn: &str,
        props: Props,
    ) -> Result<()> {
        self.schema.entity(from_label)?;
        self.schema.entity(to_label)?;
        check_urn(from_label, from_urn)?;
        check_urn(to_label, to_urn)?;
        if rel_type.trim().is_empty() || rel_type.contains(KEY_SEPARATOR) {
            return Err(CatalogError::validation(
                Target::entity(from_label, from_urn),
                format!("invalid relationship type `{rel_type}`"),
            ));
        }
        let props = strip_nulls(props);
        check_flat(&props, || Target::entity(from_label, from_urn))?;

        let edge = EdgeRecord {
            from: from_urn.to_string(),
            rel_type: rel_type.to_string(),
            to: to_urn.to_string(),
            props,
        };
        self.store.merge_edge(from_label, to_label, &edge)?;
        debug!(from = from_urn, rel = rel_type, to = to_urn, "merged relationship");
        Ok(())
    }

    pub fn relationships(&self, urn: &str, direction: EdgeDirection) -> Result<Vec<EdgeRecord>> {
        self.store.edges(urn, direction)
    }

    /// Run the relationship rules of `aspect` over an already-validated
    /// payload.
    pub fn discover_relationships(
        &self,
        urn: &str,
        entity_type: &str,
        aspect: &str,
        payload: JsonValue,
    ) -> Result<Vec<DiscoveredRelationship>> {
        let payload = context_from(payload, || Target::aspect(entity_type, urn, aspect))?;
        self.rules.discover(self, urn, entity_type, aspect, &payload)
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    /// The aspect must be declared on the entity type, with `kind` when given.
    fn check_pairing(
        &self,
        label: &str,
        urn: &str,
        aspect: &str,
        kind: Option<AspectKind>,
    ) -> Result<&AspectType> {
        let aspect_type = self.schema.aspect(aspect)?;
        let entity = self.schema.entity(label)?;
        let target = || Target::aspect(label, urn, aspect);
        match (entity.aspect_kind(aspect), kind) {
            (None, _) => Err(CatalogError::validation(
                target(),
                format!("aspect `{aspect}` is not declared on entity type `{label}`"),
            )),
            (Some(declared), Some(expected)) if declared != expected => {
                Err(CatalogError::validation(
                    target(),
                    format!("aspect `{aspect}` is {declared} on `{label}`, not {expected}"),
                ))
            }
            _ => Ok(aspect_type),
        }
    }

    fn require_entity(&self, label: &str, urn: &str) -> Result<()> {
        match self.store.node(urn)? {
            Some(node) if node.label == label => Ok(()),
            _ => Err(CatalogError::NotFound(Target::entity(label, urn))),
        }
    }

    fn versioned_records(&self, label: &str, urn: &str, aspect: &str) -> Result<Vec<AspectRecord>> {
        self.check_pairing(label, urn, aspect, Some(AspectKind::Versioned))?;
        self.require_entity(label, urn)?;
        Ok(self
            .store
            .aspect_records(urn, aspect)?
            .into_iter()
            .filter(|r| r.edge.version.is_some())
            .collect())
    }
}

fn versioned_from(record: AspectRecord) -> Result<VersionedAspect> {
    Ok(VersionedAspect {
        version: record.edge.version.unwrap_or_default(),
        latest: record.is_latest(),
        payload: decode_stored(&record.node.payload)?,
        created_at: record.node.created_at,
    })
}

fn check_urn(label: &str, urn: &str) -> Result<()> {
    if urn.trim().is_empty() {
        return Err(CatalogError::validation(
            Target::entity_type(label),
            "URN must not be empty",
        ));
    }
    if urn.contains(KEY_SEPARATOR) {
        return Err(CatalogError::validation(
            Target::entity(label, urn),
            "URN must not contain the 0x1F separator",
        ));
    }
    Ok(())
}

fn strip_nulls(props: Props) -> Props {
    props.into_iter().filter(|(_, v)| !v.is_null()).collect()
}

/// Scalars and arrays of scalars.
fn is_flat(value: &JsonValue) -> bool {
    match value {
        JsonValue::Object(_) => false,
        JsonValue::Array(items) => items
            .iter()
            .all(|v| !matches!(v, JsonValue::Object(_) | JsonValue::Array(_))),
        _ => true,
    }
}

fn check_flat(props: &Props, target: impl Fn() -> Target) -> Result<()> {
    for (name, value) in props {
        if !is_flat(value) {
            return Err(CatalogError::validation(
                target(),
                format!(
                    "property `{name}` must be a scalar or an array of scalars, got {}",
                    json_type(value)
                ),
            ));
        }
    }
    Ok(())
}
