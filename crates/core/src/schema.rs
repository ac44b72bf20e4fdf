//! Schema document loading and validation.
//!
//! A schema document declares entity types, aspect types, URN patterns,
//! relationship rules and utility functions. Loading is all-or-nothing: every
//! dangling or inconsistent reference is collected into one
//! [`CatalogError::Schema`] and no partial schema is ever returned.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use tracing::info;

use crate::error::{CatalogError, Result, SchemaIssues};
use crate::pipeline::{check_steps, Context, Interpreter, PipelineStep};
use crate::rules::{Direction, RelationshipRule};
use crate::urn::{UrnPatternDef, UrnRegistry};
use crate::utility::UtilityRegistry;

pub const DEFAULT_URN_PREFIX: &str = "urn:li";
pub const DEFAULT_COMPOUND_DELIMITER: &str = "#";

/// Bootstrap section naming the rest of the document's shape.
const SCHEMA_KEYS: &str = "schema_keys";
const URN_PREFIX: &str = "urn_prefix";
const COMPOUND_DELIMITER: &str = "compound_delimiter";

/// Reserved byte used to build composite store keys.
pub(crate) const KEY_SEPARATOR: char = '\u{1f}';

// ---------------------------------------------------------------------------
// Document shape
// ---------------------------------------------------------------------------

/// Names of the sections and introspected fields of a schema document.
///
/// The defaults match the canonical layout; a document may override any of
/// them in its `schema_keys` section.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SchemaKeys {
    pub entities: String,
    pub aspects: String,
    pub urns: String,
    pub relationships: String,
    pub utility_functions: String,
    pub properties: String,
    pub fields: String,
    pub entity_creation: String,
    pub required_params: String,
    pub optional_params: String,
}

impl Default for SchemaKeys {
    fn default() -> Self {
        Self {
            entities: "entities".into(),
            aspects: "aspects".into(),
            urns: "urns".into(),
            relationships: "relationships".into(),
            utility_functions: "utility_functions".into(),
            properties: "properties".into(),
            fields: "fields".into(),
            entity_creation: "entity_creation".into(),
            required_params: "required_params".into(),
            optional_params: "optional_params".into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AspectKind {
    #[serde(rename = "versioned")]
    Versioned,
    #[serde(rename = "timeseries")]
    TimeSeries,
}

impl AspectKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "versioned" => Some(AspectKind::Versioned),
            "timeseries" => Some(AspectKind::TimeSeries),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AspectKind::Versioned => "versioned",
            AspectKind::TimeSeries => "timeseries",
        }
    }
}

impl fmt::Display for AspectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct EntityDef {
    urn: String,
    #[serde(default)]
    properties: Vec<String>,
    #[serde(default)]
    aspects: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct AspectDef {
    kind: String,
    #[serde(default)]
    properties: Vec<String>,
    #[serde(default)]
    fields: Vec<PipelineStep>,
    #[serde(default)]
    entity_creation: Option<EntityCreation>,
}

/// Lets an aspect be ingested for an entity that does not exist yet.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EntityCreation {
    pub entity_type: String,
    pub urn: String,
    #[serde(default)]
    pub required_params: Vec<String>,
    #[serde(default)]
    pub optional_params: Vec<String>,
}

// ---------------------------------------------------------------------------
// Validated schema
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct EntityType {
    pub name: String,
    /// Name of the URN generator that derives this type's identifiers.
    pub urn: String,
    pub properties: BTreeSet<String>,
    pub aspects: BTreeMap<String, AspectKind>,
}

impl EntityType {
    pub fn aspect_kind(&self, aspect: &str) -> Option<AspectKind> {
        self.aspects.get(aspect).copied()
    }
}

#[derive(Debug, Clone)]
pub struct AspectType {
    pub name: String,
    pub kind: AspectKind,
    pub properties: Vec<String>,
    pub steps: Vec<PipelineStep>,
    pub entity_creation: Option<EntityCreation>,
}

/// A loaded, fully cross-checked schema with its compiled functions.
#[derive(Debug, Clone)]
pub struct Schema {
    urn_prefix: String,
    compound_delimiter: String,
    entities: BTreeMap<String, EntityType>,
    aspects: BTreeMap<String, AspectType>,
    relationships: BTreeMap<String, Vec<RelationshipRule>>,
    utilities: UtilityRegistry,
    urns: UrnRegistry,
}

impl Schema {
    /// Load a schema from a YAML (or JSON) file. An unreadable file is a
    /// schema error naming the path.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            let mut issues = SchemaIssues::default();
            issues.push(path.display().to_string(), format!("cannot read schema: {e}"));
            CatalogError::Schema(issues)
        })?;
        Self::from_yaml_str(&text)
    }

    pub fn from_yaml_str(text: &str) -> Result<Self> {
        let doc: JsonValue = serde_yaml::from_str(text)?;
        Self::from_value(doc)
    }

    pub fn from_value(doc: JsonValue) -> Result<Self> {
        let mut issues = SchemaIssues::default();
        let JsonValue::Object(mut doc) = doc else {
            issues.push("<document>", "top level must be a mapping");
            return Err(CatalogError::Schema(issues));
        };

        let keys = match doc.remove(SCHEMA_KEYS) {
            None => SchemaKeys::default(),
            Some(raw) => serde_json::from_value(raw).unwrap_or_else(|e| {
                issues.push(SCHEMA_KEYS, e.to_string());
                SchemaKeys::default()
            }),
        };

        let urn_prefix = string_setting(&mut doc, URN_PREFIX, DEFAULT_URN_PREFIX, &mut issues);
        let compound_delimiter = string_setting(
            &mut doc,
            COMPOUND_DELIMITER,
            DEFAULT_COMPOUND_DELIMITER,
            &mut issues,
        );
        if compound_delimiter.is_empty() {
            issues.push(COMPOUND_DELIMITER, "must not be empty");
        }

        let utility_section = take_section(&mut doc, &keys.utility_functions, false, &mut issues);
        let urn_section = take_section(&mut doc, &keys.urns, true, &mut issues);
        let entity_section = take_section(&mut doc, &keys.entities, true, &mut issues);
        let aspect_section = take_section(&mut doc, &keys.aspects, true, &mut issues);
        let rule_section = take_section(&mut doc, &keys.relationships, false, &mut issues);
        for unknown in doc.keys() {
            issues.push(unknown.clone(), "unknown top-level section");
        }

        let utility_defs: BTreeMap<String, JsonValue> = utility_section.into_iter().collect();
        let (utilities, found) = UtilityRegistry::build(&utility_defs, &keys.utility_functions);
        issues.extend(found);

        let urn_defs: BTreeMap<String, UrnPatternDef> = parse_entries(
            normalize_each(urn_section, |e| rename(e, &keys.fields, "fields")),
            &keys.urns,
            &mut issues,
        );
        let (urns, found) = UrnRegistry::build(&urn_prefix, &urn_defs, &utilities, &keys.urns);
        issues.extend(found);

        let entity_defs: BTreeMap<String, EntityDef> = parse_entries(
            normalize_each(entity_section, |e| rename(e, &keys.properties, "properties")),
            &keys.entities,
            &mut issues,
        );
        let aspect_defs: BTreeMap<String, AspectDef> = parse_entries(
            normalize_each(aspect_section, |a| normalize_aspect(a, &keys)),
            &keys.aspects,
            &mut issues,
        );
        let relationships: BTreeMap<String, Vec<RelationshipRule>> =
            parse_entries(rule_section, &keys.relationships, &mut issues);

        let mut aspects = BTreeMap::new();
        for (name, def) in aspect_defs {
            let path = format!("{}.{name}", keys.aspects);
            check_name(&name, &path, &mut issues);
            let Some(kind) = AspectKind::parse(&def.kind) else {
                issues.push(
                    format!("{path}.kind"),
                    format!(
                        "unknown aspect kind `{}` (expected versioned or timeseries)",
                        def.kind
                    ),
                );
                continue;
            };
            check_steps(
                &def.fields,
                &format!("{path}.{}", keys.fields),
                &utilities,
                &|g| urns.contains(g),
                true,
                &mut issues,
            );
            aspects.insert(
                name.clone(),
                AspectType {
                    name,
                    kind,
                    properties: def.properties,
                    steps: def.fields,
                    entity_creation: def.entity_creation,
                },
            );
        }

        let mut entities = BTreeMap::new();
        for (name, def) in entity_defs {
            let path = format!("{}.{name}", keys.entities);
            check_name(&name, &path, &mut issues);
            if !urns.contains(&def.urn) {
                issues.push(
                    format!("{path}.urn"),
                    format!("unknown URN generator `{}`", def.urn),
                );
            }
            let mut carried = BTreeMap::new();
            for (aspect, kind_name) in &def.aspects {
                let aspect_path = format!("{path}.aspects.{aspect}");
                let Some(kind) = AspectKind::parse(kind_name) else {
                    issues.push(aspect_path, format!("unknown aspect kind `{kind_name}`"));
                    continue;
                };
                match aspects.get(aspect) {
                    None => issues.push(aspect_path, format!("undeclared aspect `{aspect}`")),
                    Some(declared) if declared.kind != kind => issues.push(
                        aspect_path,
                        format!("declared as {kind} here but the aspect is {}", declared.kind),
                    ),
                    Some(_) => {
                        carried.insert(aspect.clone(), kind);
                    }
                }
            }
            entities.insert(
                name.clone(),
                EntityType {
                    name,
                    urn: def.urn,
                    properties: def.properties.into_iter().collect(),
                    aspects: carried,
                },
            );
        }

        for aspect in aspects.values() {
            let Some(creation) = &aspect.entity_creation else {
                continue;
            };
            let path = format!(
                "{}.{}.{}",
                keys.aspects, aspect.name, keys.entity_creation
            );
            if !urns.contains(&creation.urn) {
                issues.push(
                    format!("{path}.urn"),
                    format!("unknown URN generator `{}`", creation.urn),
                );
            }
            match entities.get(&creation.entity_type) {
                None => issues.push(
                    format!("{path}.entity_type"),
                    format!("undeclared entity type `{}`", creation.entity_type),
                ),
                Some(entity) if entity.aspect_kind(&aspect.name).is_none() => issues.push(
                    format!("{path}.entity_type"),
                    format!(
                        "entity type `{}` does not carry aspect `{}`",
                        entity.name, aspect.name
                    ),
                ),
                Some(_) => {}
            }
        }

        for (aspect, rules) in &relationships {
            let path = format!("{}.{aspect}", keys.relationships);
            if !aspects.contains_key(aspect) {
                issues.push(path.clone(), format!("undeclared aspect `{aspect}`"));
            }
            for (i, rule) in rules.iter().enumerate() {
                check_rule(rule, aspect, None, &format!("{path}[{i}]"), &entities, &mut issues);
            }
        }

        check_operation_names(&entities, &aspects, &mut issues);

        issues.into_result()?;
        info!(
            entities = entities.len(),
            aspects = aspects.len(),
            urn_generators = urn_defs.len(),
            rules = relationships.values().map(Vec::len).sum::<usize>(),
            "schema loaded"
        );

        Ok(Self {
            urn_prefix,
            compound_delimiter,
            entities,
            aspects,
            relationships,
            utilities,
            urns,
        })
    }

    pub fn urn_prefix(&self) -> &str {
        &self.urn_prefix
    }

    /// Separator between a parent URN and a sub-entity path.
    pub fn compound_delimiter(&self) -> &str {
        &self.compound_delimiter
    }

    pub fn entity(&self, name: &str) -> Result<&EntityType> {
        self.entities
            .get(name)
            .ok_or_else(|| CatalogError::unknown("entity type", name))
    }

    pub fn aspect(&self, name: &str) -> Result<&AspectType> {
        self.aspects
            .get(name)
            .ok_or_else(|| CatalogError::unknown("aspect", name))
    }

    pub fn entities(&self) -> impl Iterator<Item = &EntityType> {
        self.entities.values()
    }

    pub fn aspects(&self) -> impl Iterator<Item = &AspectType> {
        self.aspects.values()
    }

    /// Entity types that declare `aspect`.
    pub fn carriers_of<'a>(&'a self, aspect: &'a str) -> impl Iterator<Item = &'a EntityType> {
        self.entities
            .values()
            .filter(move |e| e.aspects.contains_key(aspect))
    }

    /// Relationship rules triggered by writes of `aspect`.
    pub fn rules_for(&self, aspect: &str) -> &[RelationshipRule] {
        self.relationships
            .get(aspect)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Derive a URN with the named generator.
    pub fn generate_urn(&self, generator: &str, fields: &Context) -> Result<String> {
        self.urns.generate(generator, fields, &self.utilities)
    }

    /// Derive the URN of an `entity_type` record from its key fields.
    pub fn entity_urn(&self, entity_type: &str, fields: &Context) -> Result<String> {
        let entity = self.entity(entity_type)?;
        self.generate_urn(&entity.urn, fields)
    }

    /// Run a pipeline against this schema's compiled functions.
    pub fn run_pipeline(&self, steps: &[PipelineStep], ctx: &mut Context) -> Result<()> {
        Interpreter::new(&self.utilities, &self.urns).run(steps, ctx)
    }
}

/// `ownership` → `Ownership`; used to name generated operations.
pub fn operation_suffix(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

// ---------------------------------------------------------------------------
// Loading helpers
// ---------------------------------------------------------------------------

fn string_setting(
    doc: &mut Map<String, JsonValue>,
    key: &str,
    default: &str,
    issues: &mut SchemaIssues,
) -> String {
    match doc.remove(key) {
        None | Some(JsonValue::Null) => default.to_string(),
        Some(JsonValue::String(s)) => s,
        Some(_) => {
            issues.push(key, "must be a string");
            default.to_string()
        }
    }
}

fn take_section(
    doc: &mut Map<String, JsonValue>,
    name: &str,
    required: bool,
    issues: &mut SchemaIssues,
) -> Map<String, JsonValue> {
    match doc.remove(name) {
        Some(JsonValue::Object(section)) => section,
        None | Some(JsonValue::Null) => {
            if required {
                issues.push(name, "missing required section");
            }
            Map::new()
        }
        Some(_) => {
            issues.push(name, "section must be a mapping");
            Map::new()
        }
    }
}

fn normalize_each(
    section: Map<String, JsonValue>,
    normalize: impl Fn(&mut Map<String, JsonValue>),
) -> Map<String, JsonValue> {
    section
        .into_iter()
        .map(|(name, mut entry)| {
            if let JsonValue::Object(obj) = &mut entry {
                normalize(obj);
            }
            (name, entry)
        })
        .collect()
}

fn normalize_aspect(aspect: &mut Map<String, JsonValue>, keys: &SchemaKeys) {
    rename(aspect, &keys.properties, "properties");
    rename(aspect, &keys.fields, "fields");
    rename(aspect, &keys.entity_creation, "entity_creation");
    if let Some(JsonValue::Object(creation)) = aspect.get_mut("entity_creation") {
        rename(creation, &keys.required_params, "required_params");
        rename(creation, &keys.optional_params, "optional_params");
    }
}

fn rename(obj: &mut Map<String, JsonValue>, from: &str, to: &str) {
    if from == to {
        return;
    }
    if let Some(v) = obj.remove(from) {
        obj.insert(to.to_string(), v);
    }
}

fn parse_entries<T: DeserializeOwned>(
    section: Map<String, JsonValue>,
    section_name: &str,
    issues: &mut SchemaIssues,
) -> BTreeMap<String, T> {
    let mut parsed = BTreeMap::new();
    for (name, raw) in section {
        match serde_json::from_value::<T>(raw) {
            Ok(v) => {
                parsed.insert(name, v);
            }
            Err(e) => issues.push(format!("{section_name}.{name}"), e.to_string()),
        }
    }
    parsed
}

fn check_name(name: &str, path: &str, issues: &mut SchemaIssues) {
    if name.trim().is_empty() {
        issues.push(path, "name must not be empty");
    }
    if name.contains(KEY_SEPARATOR) {
        issues.push(path, "name must not contain the 0x1F separator");
    }
}

/// `inherited` is the entity type of the enclosing rule for `additional`
/// relationships, which may omit their own.
fn check_rule(
    rule: &RelationshipRule,
    aspect: &str,
    inherited: Option<&str>,
    path: &str,
    entities: &BTreeMap<String, EntityType>,
    issues: &mut SchemaIssues,
) {
    let entity_type = match (rule.entity_type.as_deref(), inherited) {
        (Some(t), _) => t,
        (None, Some(t)) => t,
        (None, None) => {
            issues.push(format!("{path}.entity_type"), "missing entity type");
            return;
        }
    };

    match entities.get(entity_type) {
        None => issues.push(
            format!("{path}.entity_type"),
            format!("undeclared entity type `{entity_type}`"),
        ),
        Some(e) if inherited.is_none() && e.aspect_kind(aspect).is_none() => issues.push(
            format!("{path}.entity_type"),
            format!("entity type `{entity_type}` does not carry aspect `{aspect}`"),
        ),
        Some(_) => {}
    }
    for (field, ty) in [("source_type", &rule.source_type), ("target_type", &rule.target_type)] {
        if !entities.contains_key(ty) {
            issues.push(
                format!("{path}.{field}"),
                format!("undeclared entity type `{ty}`"),
            );
        }
    }
    if rule.relationship.trim().is_empty() {
        issues.push(format!("{path}.relationship"), "relationship type must not be empty");
    }
    if rule.extract.array.is_none() && rule.extract.field.is_none() {
        issues.push(format!("{path}.extract"), "needs `array`, `field` or both");
    }
    if !rule.lift_to_parent {
        let (anchor_field, anchor) = match rule.direction {
            Direction::Outgoing => ("source_type", &rule.source_type),
            Direction::Incoming => ("target_type", &rule.target_type),
        };
        if anchor != entity_type {
            issues.push(
                format!("{path}.{anchor_field}"),
                format!(
                    "{} rule on `{entity_type}` must have {anchor_field} `{entity_type}`, found `{anchor}`",
                    rule.direction
                ),
            );
        }
    }
    for (i, extra) in rule.additional.iter().enumerate() {
        check_rule(
            extra,
            aspect,
            Some(entity_type),
            &format!("{path}.additional[{i}]"),
            entities,
            issues,
        );
    }
}

fn check_operation_names(
    entities: &BTreeMap<String, EntityType>,
    aspects: &BTreeMap<String, AspectType>,
    issues: &mut SchemaIssues,
) {
    let mut owners: BTreeMap<String, String> = BTreeMap::new();
    let named = entities
        .keys()
        .map(|n| (n, "entity"))
        .chain(aspects.keys().map(|n| (n, "aspect")));
    for (name, what) in named {
        let suffix = operation_suffix(name);
        if let Some(previous) = owners.insert(suffix.clone(), format!("{what} `{name}`")) {
            issues.push(
                name.clone(),
                format!("operations `upsert{suffix}` etc. clash with {previous}"),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    const MINIMAL: &str = r#"
urns:
  dataset:
    template: "{prefix}:dataset:({platform},{name},{env})"
    fields:
      - default: {env: PROD}
  corpuser:
    template: "{prefix}:corpuser:{username}"
entities:
  Dataset:
    urn: dataset
    properties: [platform, name, env]
    aspects:
      ownership: versioned
      datasetProfile: timeseries
  CorpUser:
    urn: corpuser
    properties: [username]
aspects:
  ownership:
    kind: versioned
    properties: [owners]
  datasetProfile:
    kind: timeseries
    properties: [rowCount]
relationships:
  ownership:
    - entity_type: Dataset
      relationship: OWNS
      direction: incoming
      source_type: CorpUser
      target_type: Dataset
      extract: {array: owners, field: owner}
      resolve: {param: username}
"#;

    fn issues_of(text: &str) -> Vec<String> {
        match Schema::from_yaml_str(text) {
            Err(CatalogError::Schema(issues)) => issues.iter().map(|i| i.to_string()).collect(),
            Err(other) => panic!("expected schema error, got {other}"),
            Ok(_) => panic!("expected schema error, got a schema"),
        }
    }

    #[test]
    fn minimal_schema_loads() {
        let schema = Schema::from_yaml_str(MINIMAL).unwrap();
        assert_eq!(schema.urn_prefix(), DEFAULT_URN_PREFIX);
        assert_eq!(schema.compound_delimiter(), "#");
        let dataset = schema.entity("Dataset").unwrap();
        assert_eq!(dataset.aspect_kind("ownership"), Some(AspectKind::Versioned));
        assert_eq!(
            dataset.aspect_kind("datasetProfile"),
            Some(AspectKind::TimeSeries)
        );
        assert_eq!(schema.rules_for("ownership").len(), 1);
        assert!(schema.rules_for("datasetProfile").is_empty());
        assert_eq!(
            schema.carriers_of("ownership").map(|e| e.name.as_str()).collect::<Vec<_>>(),
            vec!["Dataset"]
        );
    }

    #[test]
    fn unknown_names_are_schema_reference_errors() {
        let schema = Schema::from_yaml_str(MINIMAL).unwrap();
        assert_eq!(schema.aspect("nope").unwrap_err().kind(), ErrorKind::Schema);
        assert_eq!(schema.entity("Nope").unwrap_err().kind(), ErrorKind::Schema);
    }

    #[test]
    fn missing_sections_are_all_reported() {
        let issues = issues_of("urn_prefix: urn:x\n");
        assert_eq!(issues.len(), 3, "{issues:?}");
        assert!(issues.iter().any(|i| i.starts_with("entities:")));
        assert!(issues.iter().any(|i| i.starts_with("aspects:")));
        assert!(issues.iter().any(|i| i.starts_with("urns:")));
    }

    #[test]
    fn every_dangling_reference_is_reported() {
        let text = r#"
urns:
  dataset:
    template: "{prefix}:dataset:{name}"
entities:
  Dataset:
    urn: dataset
    aspects:
      ownership: versioned
      ghostAspect: versioned
      profile: versioned
  Chart:
    urn: chart
aspects:
  ownership:
    kind: versioned
    entity_creation:
      entity_type: Dashboard
      urn: dashboard
  profile:
    kind: timeseries
  broken:
    kind: snapshot
relationships:
  ownership:
    - entity_type: Dataset
      relationship: OWNS
      direction: incoming
      source_type: CorpUser
      target_type: Dataset
      extract: {array: owners, field: owner}
  ghostAspect:
    - entity_type: Dataset
      relationship: X
      direction: outgoing
      source_type: Dataset
      target_type: Dataset
      extract: {field: x}
"#;
        let issues = issues_of(text);
        let has = |needle: &str| issues.iter().any(|i| i.contains(needle));
        assert!(has("aspects.broken.kind"), "{issues:#?}");
        assert!(has("entities.Dataset.aspects.ghostAspect: undeclared aspect"));
        assert!(has("entities.Dataset.aspects.profile: declared as versioned"));
        assert!(has("entities.Chart.urn: unknown URN generator `chart`"));
        assert!(has("aspects.ownership.entity_creation.urn"));
        assert!(has("aspects.ownership.entity_creation.entity_type"));
        assert!(has("relationships.ownership[0].source_type: undeclared entity type `CorpUser`"));
        assert!(has("relationships.ghostAspect: undeclared aspect"));
    }

    #[test]
    fn rule_direction_must_anchor_on_the_entity() {
        let text = MINIMAL.replace("direction: incoming", "direction: outgoing");
        let issues = issues_of(&text);
        assert!(
            issues
                .iter()
                .any(|i| i.contains("relationships.ownership[0].source_type")),
            "{issues:?}"
        );
    }

    #[test]
    fn section_and_field_names_are_configurable() {
        let text = r#"
schema_keys:
  entities: entity_types
  aspects: aspect_types
  urns: identifiers
  properties: props
  entity_creation: create
  required_params: needs
urn_prefix: "urn:acme"
identifiers:
  corpuser:
    template: "{prefix}:user:{username}"
entity_types:
  CorpUser:
    urn: corpuser
    props: [username]
    aspects:
      corpUserInfo: versioned
aspect_types:
  corpUserInfo:
    kind: versioned
    props: [displayName]
    create:
      entity_type: CorpUser
      urn: corpuser
      needs: [username]
"#;
        let schema = Schema::from_yaml_str(text).unwrap();
        assert_eq!(schema.urn_prefix(), "urn:acme");
        assert!(schema.entity("CorpUser").unwrap().properties.contains("username"));
        let info = schema.aspect("corpUserInfo").unwrap();
        assert_eq!(info.properties, vec!["displayName".to_string()]);
        let creation = info.entity_creation.as_ref().unwrap();
        assert_eq!(creation.required_params, vec!["username".to_string()]);
    }

    #[test]
    fn clashing_operation_names_are_rejected() {
        let text = MINIMAL.replace(
            "  datasetProfile:\n    kind: timeseries",
            "  dataset:\n    kind: versioned\n  datasetProfile:\n    kind: timeseries",
        );
        let issues = issues_of(&text);
        assert!(issues.iter().any(|i| i.contains("clash")), "{issues:?}");
    }

    #[test]
    fn unparseable_documents_are_schema_errors() {
        let err = Schema::from_yaml_str("entities: [unclosed").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Schema);
    }

    #[test]
    fn operation_suffix_capitalises() {
        assert_eq!(operation_suffix("ownership"), "Ownership");
        assert_eq!(operation_suffix("Dataset"), "Dataset");
        assert_eq!(operation_suffix(""), "");
    }
}
