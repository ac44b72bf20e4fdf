//! The per-type operation surface.
//!
//! [`Operations`] is built once from the schema. Every entity type `Dataset`
//! gets `upsertDataset`, `getDataset` and `deleteDataset`; every aspect
//! `ownership` gets `upsertOwnership`, `getOwnership` and `deleteOwnership`.
//! All of them dispatch into the same [`GraphWriter`] code.
//!
//! Typed access goes through the capability traits: [`Operations::entity`],
//! [`Operations::versioned`] and [`Operations::timeseries`] return `None`
//! when the name does not denote that kind of thing. Transport layers use
//! [`Operations::invoke`] with JSON arguments instead.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::{json, Value as JsonValue};

use crate::error::{CatalogError, Result, Target};
use crate::schema::{operation_suffix, AspectKind};
use crate::store::Props;
use crate::writer::{AspectTarget, GraphWriter, TimeSeriesAspect, VersionedAspect};

/// Points returned by `get<Aspect>` on a time-series aspect when the caller
/// gives no limit.
pub const DEFAULT_TIMESERIES_LIMIT: usize = 10;

// ---------------------------------------------------------------------------
// Capabilities
// ---------------------------------------------------------------------------

pub trait EntityOperations {
    fn entity_type(&self) -> &str;
    fn upsert(&self, urn: &str, props: Props) -> Result<()>;
    fn get(&self, urn: &str) -> Result<Props>;
    fn delete(&self, urn: &str) -> Result<()>;
}

/// Result of an aspect write: where it landed and what it was stamped with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AspectWrite<T> {
    pub entity_type: String,
    pub urn: String,
    pub stamp: T,
}

pub trait VersionedAspectWriter {
    fn aspect(&self) -> &str;
    fn upsert(
        &self,
        target: &AspectTarget,
        payload: JsonValue,
        version: Option<u64>,
    ) -> Result<AspectWrite<u64>>;
    fn get(&self, target: &AspectTarget, version: Option<u64>) -> Result<VersionedAspect>;
    fn delete(&self, target: &AspectTarget) -> Result<usize>;
}

pub trait TimeSeriesAspectWriter {
    fn aspect(&self) -> &str;
    fn append(
        &self,
        target: &AspectTarget,
        payload: JsonValue,
        timestamp_ms: Option<i64>,
    ) -> Result<AspectWrite<i64>>;
    fn get(&self, target: &AspectTarget, limit: usize) -> Result<Vec<TimeSeriesAspect>>;
    fn delete(&self, target: &AspectTarget) -> Result<usize>;
}

// ---------------------------------------------------------------------------
// Handles
// ---------------------------------------------------------------------------

pub struct EntityHandle<'a> {
    writer: &'a GraphWriter,
    entity_type: &'a str,
}

impl EntityOperations for EntityHandle<'_> {
    fn entity_type(&self) -> &str {
        self.entity_type
    }

    fn upsert(&self, urn: &str, props: Props) -> Result<()> {
        self.writer.upsert_entity(self.entity_type, urn, props)
    }

    fn get(&self, urn: &str) -> Result<Props> {
        self.writer.get_entity(self.entity_type, urn)
    }

    fn delete(&self, urn: &str) -> Result<()> {
        self.writer.delete_entity(self.entity_type, urn)
    }
}

pub struct VersionedAspectHandle<'a> {
    writer: &'a GraphWriter,
    aspect: &'a str,
}

impl VersionedAspectWriter for VersionedAspectHandle<'_> {
    fn aspect(&self) -> &str {
        self.aspect
    }

    fn upsert(
        &self,
        target: &AspectTarget,
        payload: JsonValue,
        version: Option<u64>,
    ) -> Result<AspectWrite<u64>> {
        let (entity_type, urn) = self.writer.resolve_target(self.aspect, target)?;
        let version =
            self.writer
                .upsert_versioned_aspect(&entity_type, &urn, self.aspect, payload, version)?;
        Ok(AspectWrite {
            entity_type,
            urn,
            stamp: version,
        })
    }

    fn get(&self, target: &AspectTarget, version: Option<u64>) -> Result<VersionedAspect> {
        let (entity_type, urn) = self.resolve_existing(target)?;
        match version {
            Some(v) => self
                .writer
                .get_aspect_version(&entity_type, &urn, self.aspect, v),
            None => self.writer.get_latest_aspect(&entity_type, &urn, self.aspect),
        }
    }

    fn delete(&self, target: &AspectTarget) -> Result<usize> {
        let (entity_type, urn) = self.resolve_existing(target)?;
        self.writer.delete_aspect(&entity_type, &urn, self.aspect)
    }
}

impl VersionedAspectHandle<'_> {
    fn resolve_existing(&self, target: &AspectTarget) -> Result<(String, String)> {
        resolve_existing(self.writer, self.aspect, target)
    }
}

pub struct TimeSeriesAspectHandle<'a> {
    writer: &'a GraphWriter,
    aspect: &'a str,
}

impl TimeSeriesAspectWriter for TimeSeriesAspectHandle<'_> {
    fn aspect(&self) -> &str {
        self.aspect
    }

    fn append(
        &self,
        target: &AspectTarget,
        payload: JsonValue,
        timestamp_ms: Option<i64>,
    ) -> Result<AspectWrite<i64>> {
        let (entity_type, urn) = self.writer.resolve_target(self.aspect, target)?;
        let ts = self.writer.append_timeseries_aspect(
            &entity_type,
            &urn,
            self.aspect,
            payload,
            timestamp_ms,
        )?;
        Ok(AspectWrite {
            entity_type,
            urn,
            stamp: ts,
        })
    }

    fn get(&self, target: &AspectTarget, limit: usize) -> Result<Vec<TimeSeriesAspect>> {
        let (entity_type, urn) = resolve_existing(self.writer, self.aspect, target)?;
        self.writer
            .get_timeseries_aspect(&entity_type, &urn, self.aspect, limit)
    }

    fn delete(&self, target: &AspectTarget) -> Result<usize> {
        let (entity_type, urn) = resolve_existing(self.writer, self.aspect, target)?;
        self.writer.delete_aspect(&entity_type, &urn, self.aspect)
    }
}

/// Reads and deletes never create entities, so `params` targets are
/// resolved to a URN without writing anything.
fn resolve_existing(
    writer: &GraphWriter,
    aspect: &str,
    target: &AspectTarget,
) -> Result<(String, String)> {
    match target {
        AspectTarget::Urn { .. } => writer.resolve_target(aspect, target),
        AspectTarget::Params(params) => {
            let schema = writer.schema();
            let rule = schema.aspect(aspect)?.entity_creation.as_ref().ok_or_else(|| {
                CatalogError::validation(
                    Target::aspect_name(aspect),
                    "aspect has no entity-creation rule; pass `urn`",
                )
            })?;
            let urn = schema.generate_urn(&rule.urn, params).map_err(|e| {
                e.within(Target {
                    entity_type: Some(rule.entity_type.clone()),
                    aspect: Some(aspect.to_string()),
                    ..Target::default()
                })
            })?;
            Ok((rule.entity_type.clone(), urn))
        }
    }
}

// ---------------------------------------------------------------------------
// Dispatch table
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verb {
    Upsert,
    Get,
    Delete,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Subject {
    Entity(String),
    Aspect { name: String, kind: AspectKind },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operation {
    pub verb: Verb,
    pub subject: Subject,
}

pub struct Operations {
    writer: Arc<GraphWriter>,
    table: BTreeMap<String, Operation>,
}

impl Operations {
    pub fn new(writer: Arc<GraphWriter>) -> Self {
        let mut table = BTreeMap::new();
        let schema = writer.schema();
        let subjects = schema
            .entities()
            .map(|e| (e.name.as_str(), Subject::Entity(e.name.clone())))
            .chain(schema.aspects().map(|a| {
                (
                    a.name.as_str(),
                    Subject::Aspect {
                        name: a.name.clone(),
                        kind: a.kind,
                    },
                )
            }));
        for (name, subject) in subjects {
            let suffix = operation_suffix(name);
            for (prefix, verb) in [
                ("upsert", Verb::Upsert),
                ("get", Verb::Get),
                ("delete", Verb::Delete),
            ] {
                table.insert(
                    format!("{prefix}{suffix}"),
                    Operation {
                        verb,
                        subject: subject.clone(),
                    },
                );
            }
        }
        Self { writer, table }
    }

    pub fn writer(&self) -> &GraphWriter {
        &self.writer
    }

    /// A shared handle for collaborators that outlive a borrow.
    pub fn shared_writer(&self) -> Arc<GraphWriter> {
        Arc::clone(&self.writer)
    }

    /// Every generated operation name, sorted.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.table.keys().map(String::as_str)
    }

    pub fn lookup(&self, name: &str) -> Option<&Operation> {
        self.table.get(name)
    }

    pub fn entity(&self, entity_type: &str) -> Option<EntityHandle<'_>> {
        let entity = self.writer.schema().entity(entity_type).ok()?;
        Some(EntityHandle {
            writer: &self.writer,
            entity_type: &entity.name,
        })
    }

    pub fn versioned(&self, aspect: &str) -> Option<VersionedAspectHandle<'_>> {
        let aspect = self.writer.schema().aspect(aspect).ok()?;
        (aspect.kind == AspectKind::Versioned).then_some(VersionedAspectHandle {
            writer: &self.writer,
            aspect: &aspect.name,
        })
    }

    pub fn timeseries(&self, aspect: &str) -> Option<TimeSeriesAspectHandle<'_>> {
        let aspect = self.writer.schema().aspect(aspect).ok()?;
        (aspect.kind == AspectKind::TimeSeries).then_some(TimeSeriesAspectHandle {
            writer: &self.writer,
            aspect: &aspect.name,
        })
    }

    /// Run the named operation with JSON arguments.
    ///
    /// Entity operations take `{urn | params, properties?}`; aspect
    /// operations take `{urn | params, entity_type?, payload?, version?,
    /// timestamp_ms?, limit?}`. Unknown operation names are a schema error,
    /// malformed arguments a validation error.
    pub fn invoke(&self, name: &str, args: JsonValue) -> Result<JsonValue> {
        let operation = self
            .lookup(name)
            .ok_or_else(|| CatalogError::unknown("operation", name))?;
        match &operation.subject {
            Subject::Entity(entity_type) => self.invoke_entity(operation.verb, entity_type, args),
            Subject::Aspect { name: aspect, kind } => {
                self.invoke_aspect(operation.verb, aspect, *kind, args)
            }
        }
    }

    fn invoke_entity(&self, verb: Verb, entity_type: &str, args: JsonValue) -> Result<JsonValue> {
        let args: EntityArgs = parse_args(args)?;
        let handle = self
            .entity(entity_type)
            .ok_or_else(|| CatalogError::unknown("entity type", entity_type))?;
        let urn = match (args.urn, args.params) {
            (Some(urn), _) => urn,
            (None, Some(params)) => self
                .writer
                .schema()
                .entity_urn(entity_type, &params)
                .map_err(|e| e.within(Target::entity_type(entity_type)))?,
            (None, None) => {
                return Err(CatalogError::validation(
                    Target::entity_type(entity_type),
                    "pass `urn` or `params`",
                ))
            }
        };
        match verb {
            Verb::Upsert => {
                handle.upsert(&urn, args.properties)?;
                Ok(json!({ "urn": urn }))
            }
            Verb::Get => Ok(JsonValue::Object(handle.get(&urn)?)),
            Verb::Delete => {
                handle.delete(&urn)?;
                Ok(json!({ "urn": urn, "deleted": true }))
            }
        }
    }

    fn invoke_aspect(
        &self,
        verb: Verb,
        aspect: &str,
        kind: AspectKind,
        args: JsonValue,
    ) -> Result<JsonValue> {
        let args: AspectArgs = parse_args(args)?;
        let target = match (args.urn, args.params) {
            (Some(urn), _) => AspectTarget::Urn {
                urn,
                entity_type: args.entity_type,
            },
            (None, Some(params)) => AspectTarget::Params(params),
            (None, None) => {
                return Err(CatalogError::validation(
                    Target::aspect_name(aspect),
                    "pass `urn` or `params`",
                ))
            }
        };

        match kind {
            AspectKind::Versioned => {
                let handle = self
                    .versioned(aspect)
                    .ok_or_else(|| CatalogError::unknown("aspect", aspect))?;
                match verb {
                    Verb::Upsert => {
                        let written = handle.upsert(&target, args.payload, args.version)?;
                        Ok(json!({
                            "entity_type": written.entity_type,
                            "urn": written.urn,
                            "version": written.stamp,
                        }))
                    }
                    Verb::Get => Ok(serde_json::to_value(handle.get(&target, args.version)?)?),
                    Verb::Delete => Ok(json!({ "deleted": handle.delete(&target)? })),
                }
            }
            AspectKind::TimeSeries => {
                let handle = self
                    .timeseries(aspect)
                    .ok_or_else(|| CatalogError::unknown("aspect", aspect))?;
                match verb {
                    Verb::Upsert => {
                        let written = handle.append(&target, args.payload, args.timestamp_ms)?;
                        Ok(json!({
                            "entity_type": written.entity_type,
                            "urn": written.urn,
                            "timestamp_ms": written.stamp,
                        }))
                    }
                    Verb::Get => {
                        let limit = args.limit.unwrap_or(DEFAULT_TIMESERIES_LIMIT);
                        Ok(serde_json::to_value(handle.get(&target, limit)?)?)
                    }
                    Verb::Delete => Ok(json!({ "deleted": handle.delete(&target)? })),
                }
            }
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct EntityArgs {
    #[serde(default)]
    urn: Option<String>,
    #[serde(default)]
    params: Option<Props>,
    #[serde(default)]
    properties: Props,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct AspectArgs {
    #[serde(default)]
    urn: Option<String>,
    #[serde(default)]
    entity_type: Option<String>,
    #[serde(default)]
    params: Option<Props>,
    #[serde(default)]
    payload: JsonValue,
    #[serde(default)]
    version: Option<u64>,
    #[serde(default)]
    timestamp_ms: Option<i64>,
    #[serde(default)]
    limit: Option<usize>,
}

fn parse_args<T: serde::de::DeserializeOwned>(args: JsonValue) -> Result<T> {
    let args = if args.is_null() { json!({}) } else { args };
    Ok(serde_json::from_value(args)?)
}
