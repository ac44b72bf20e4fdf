//! Relationship discovery from aspect payloads.
//!
//! Rules are keyed by aspect name. After every aspect write the engine runs
//! the rules whose entity type matches the written entity, pulls endpoint
//! values out of the payload, turns them into URNs, makes sure the opposite
//! endpoint exists and merges the edge. Everything it does goes through
//! [`GraphWriter`], whose merge semantics make discovery re-entrant.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value as JsonValue;
use tracing::{debug, warn};

use crate::error::{Result, Target};
use crate::pipeline::{json_type, scalar_to_string, Context};
use crate::schema::Schema;
use crate::store::Props;
use crate::writer::GraphWriter;

// ---------------------------------------------------------------------------
// Rule definitions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// The written entity is the edge source.
    Outgoing,
    /// The written entity is the edge target.
    Incoming,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Direction::Outgoing => "outgoing",
            Direction::Incoming => "incoming",
        })
    }
}

/// Where endpoint values live in the payload.
///
/// `array` names an array field; `field` is then projected out of each
/// element. With only `field`, a single value is read from the payload. Both
/// accept dotted paths.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Extraction {
    #[serde(default)]
    pub array: Option<String>,
    #[serde(default)]
    pub field: Option<String>,
}

/// Derive the opposite endpoint's URN with its entity type's generator.
///
/// The extracted value is passed as `param`; `with` maps further generator
/// params to fields of the array element (or of the payload).
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Resolution {
    pub param: String,
    #[serde(default)]
    pub with: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RelationshipRule {
    /// Entity type the rule fires for. `additional` rules inherit it.
    #[serde(default)]
    pub entity_type: Option<String>,
    pub relationship: String,
    pub direction: Direction,
    pub source_type: String,
    pub target_type: String,
    pub extract: Extraction,
    #[serde(default)]
    pub resolve: Option<Resolution>,
    /// Edge properties copied from the element (or payload).
    #[serde(default)]
    pub properties: Vec<String>,
    /// Connect the parents of compound URNs instead of the URNs themselves.
    #[serde(default)]
    pub lift_to_parent: bool,
    #[serde(default)]
    pub additional: Vec<RelationshipRule>,
}

impl RelationshipRule {
    fn applies_to(&self, entity_type: &str) -> bool {
        self.entity_type.as_deref().is_none_or(|t| t == entity_type)
    }

    /// Entity type of the endpoint found in the payload.
    fn opposite_type(&self) -> &str {
        match self.direction {
            Direction::Outgoing => &self.target_type,
            Direction::Incoming => &self.source_type,
        }
    }

    /// Entity type of the written entity's side once lifted to its parent.
    fn anchor_type(&self) -> &str {
        match self.direction {
            Direction::Outgoing => &self.source_type,
            Direction::Incoming => &self.target_type,
        }
    }
}

/// One edge merged by discovery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredRelationship {
    pub from_type: String,
    pub from: String,
    pub relationship: String,
    pub to_type: String,
    pub to: String,
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct RelationshipEngine {
    schema: Arc<Schema>,
}

/// One extracted endpoint value and the array element it came from.
struct Extracted<'p> {
    value: &'p JsonValue,
    element: Option<&'p Context>,
}

impl RelationshipEngine {
    pub fn new(schema: Arc<Schema>) -> Self {
        Self { schema }
    }

    /// Discover and merge every relationship implied by `payload`, an
    /// already-validated `aspect` record written on `urn`.
    pub fn discover(
        &self,
        writer: &GraphWriter,
        urn: &str,
        entity_type: &str,
        aspect: &str,
        payload: &Props,
    ) -> Result<Vec<DiscoveredRelationship>> {
        let mut found = Vec::new();
        for rule in self.schema.rules_for(aspect) {
            if rule.entity_type.as_deref() == Some(entity_type) {
                self.apply(writer, rule, urn, entity_type, payload, &mut found)
                    .map_err(|e| e.within(Target::aspect(entity_type, urn, aspect)))?;
            }
        }
        if !found.is_empty() {
            debug!(urn, entity_type, aspect, edges = found.len(), "discovered relationships");
        }
        Ok(found)
    }

    fn apply(
        &self,
        writer: &GraphWriter,
        rule: &RelationshipRule,
        urn: &str,
        entity_type: &str,
        payload: &Props,
        found: &mut Vec<DiscoveredRelationship>,
    ) -> Result<()> {
        for extracted in extract(&rule.extract, payload) {
            let Some(raw) = endpoint_value(rule, urn, extracted.value) else {
                continue;
            };
            if let Some(edge) =
                self.connect(writer, rule, urn, entity_type, payload, &extracted, raw)?
            {
                found.push(edge);
            }
        }
        for extra in &rule.additional {
            if extra.applies_to(entity_type) {
                self.apply(writer, extra, urn, entity_type, payload, found)?;
            }
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn connect(
        &self,
        writer: &GraphWriter,
        rule: &RelationshipRule,
        urn: &str,
        entity_type: &str,
        payload: &Props,
        extracted: &Extracted<'_>,
        raw: String,
    ) -> Result<Option<DiscoveredRelationship>> {
        let opposite_type = rule.opposite_type();
        let lookup = |field: &str| {
            extracted
                .element
                .and_then(|e| lookup_path(e, field))
                .or_else(|| lookup_path(payload, field))
                .filter(|v| !v.is_null())
        };

        let mut stub = Props::new();
        let mut opposite = match &rule.resolve {
            Some(resolution) => {
                stub.insert(resolution.param.clone(), JsonValue::String(raw));
                for (param, source) in &resolution.with {
                    if let Some(value) = lookup(source) {
                        stub.insert(param.clone(), value.clone());
                    }
                }
                self.schema.entity_urn(opposite_type, &stub)?
            }
            None => raw,
        };

        let (mut anchor_type, mut anchor) = (entity_type, urn.to_string());
        if rule.lift_to_parent {
            let delimiter = self.schema.compound_delimiter();
            anchor_type = rule.anchor_type();
            anchor = parent_urn(&anchor, delimiter).to_string();
            opposite = parent_urn(&opposite, delimiter).to_string();
            if anchor == opposite {
                return Ok(None);
            }
            writer.ensure_entity(anchor_type, &anchor, &Props::new())?;
        }
        writer.ensure_entity(opposite_type, &opposite, &stub)?;

        let mut props = Props::new();
        for name in &rule.properties {
            if let Some(value) = lookup(name) {
                props.insert(name.clone(), value.clone());
            }
        }

        let edge = match rule.direction {
            Direction::Outgoing => DiscoveredRelationship {
                from_type: anchor_type.to_string(),
                from: anchor,
                relationship: rule.relationship.clone(),
                to_type: opposite_type.to_string(),
                to: opposite,
            },
            Direction::Incoming => DiscoveredRelationship {
                from_type: opposite_type.to_string(),
                from: opposite,
                relationship: rule.relationship.clone(),
                to_type: anchor_type.to_string(),
                to: anchor,
            },
        };
        writer.create_relationship(
            &edge.from_type,
            &edge.from,
            &edge.relationship,
            &edge.to_type,
            &edge.to,
            props,
        )?;
        Ok(Some(edge))
    }
}

// ---------------------------------------------------------------------------
// Payload helpers
// ---------------------------------------------------------------------------

fn extract<'p>(extraction: &Extraction, payload: &'p Props) -> Vec<Extracted<'p>> {
    let mut out = Vec::new();
    match (&extraction.array, &extraction.field) {
        (Some(array), field) => {
            let Some(JsonValue::Array(items)) = lookup_path(payload, array) else {
                return out;
            };
            for item in items {
                match (field, item) {
                    (Some(field), JsonValue::Object(element)) => {
                        if let Some(value) = lookup_path(element, field) {
                            out.push(Extracted {
                                value,
                                element: Some(element),
                            });
                        }
                    }
                    (Some(_), _) => {}
                    (None, JsonValue::Object(element)) => out.push(Extracted {
                        value: item,
                        element: Some(element),
                    }),
                    (None, _) => out.push(Extracted {
                        value: item,
                        element: None,
                    }),
                }
            }
        }
        (None, Some(field)) => {
            if let Some(value) = lookup_path(payload, field) {
                out.push(Extracted {
                    value,
                    element: None,
                });
            }
        }
        (None, None) => {}
    }
    out
}

/// String form of an extracted endpoint; nulls are skipped silently,
/// arrays and objects with a warning.
fn endpoint_value(rule: &RelationshipRule, urn: &str, value: &JsonValue) -> Option<String> {
    if value.is_null() {
        return None;
    }
    match scalar_to_string(value) {
        Some(s) if !s.is_empty() => Some(s),
        Some(_) => None,
        None => {
            warn!(
                urn,
                relationship = %rule.relationship,
                found = json_type(value),
                "skipping non-scalar relationship endpoint"
            );
            None
        }
    }
}

/// Follow a dotted path through nested objects.
fn lookup_path<'p>(obj: &'p Props, path: &str) -> Option<&'p JsonValue> {
    let mut parts = path.split('.');
    let mut current = obj.get(parts.next()?)?;
    for part in parts {
        current = current.as_object()?.get(part)?;
    }
    Some(current)
}

/// `urn:li:dataset:(hive,t,PROD)#user.id` → `urn:li:dataset:(hive,t,PROD)`.
/// URNs without the delimiter are their own parent.
pub fn parent_urn<'u>(urn: &'u str, delimiter: &str) -> &'u str {
    match urn.rsplit_once(delimiter) {
        Some((parent, _)) if !parent.is_empty() => parent,
        _ => urn,
    }
}
