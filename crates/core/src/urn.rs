//! URN generation.
//!
//! Each pattern in the schema's URN section is compiled into a
//! [`UrnGenerator`]: a parsed template plus its field-processing pipeline.
//! Generation is a pure function of the input fields. The template is
//! rendered from a `BTreeMap`-ordered context, pipelines may not call
//! timestamp functions, and nothing else reads ambient state.

use std::collections::{BTreeMap, BTreeSet};

use serde::Deserialize;
use serde_json::Value as JsonValue;

use crate::error::{CatalogError, Result, SchemaIssues, Target};
use crate::pipeline::{check_steps, scalar_to_string, Context, Interpreter, PipelineStep};
use crate::utility::UtilityRegistry;

/// Placeholder that always renders as the configured URN prefix.
pub const PREFIX_PLACEHOLDER: &str = "prefix";

/// One `urns.<name>` entry as written in the schema document.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UrnPatternDef {
    pub template: String,
    #[serde(default)]
    pub fields: Vec<PipelineStep>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Field(String),
}

/// A parsed identifier template such as `{prefix}:dataset:({platform},{name},{env})`.
///
/// `{{` and `}}` render literal braces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    segments: Vec<Segment>,
}

impl Template {
    pub fn parse(source: &str) -> std::result::Result<Self, String> {
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut chars = source.chars().peekable();

        while let Some(c) = chars.next() {
            match c {
                '{' if chars.peek() == Some(&'{') => {
                    chars.next();
                    literal.push('{');
                }
                '}' if chars.peek() == Some(&'}') => {
                    chars.next();
                    literal.push('}');
                }
                '{' => {
                    let mut name = String::new();
                    loop {
                        match chars.next() {
                            Some('}') => break,
                            Some('{') | None => {
                                return Err(format!("unclosed placeholder in `{source}`"))
                            }
                            Some(ch) => name.push(ch),
                        }
                    }
                    let name = name.trim().to_string();
                    if name.is_empty() {
                        return Err(format!("empty placeholder in `{source}`"));
                    }
                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }
                    segments.push(Segment::Field(name));
                }
                '}' => return Err(format!("unmatched `}}` in `{source}`")),
                other => literal.push(other),
            }
        }
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }
        if segments.is_empty() {
            return Err("template is empty".to_string());
        }

        Ok(Self { segments })
    }

    /// Placeholder names, in template order, excluding `{prefix}`.
    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|s| match s {
            Segment::Field(f) if f != PREFIX_PLACEHOLDER => Some(f.as_str()),
            _ => None,
        })
    }

    fn render(&self, prefix: &str, ctx: &Context, generator: &str) -> Result<String> {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(l) => out.push_str(l),
                Segment::Field(f) if f == PREFIX_PLACEHOLDER => out.push_str(prefix),
                Segment::Field(f) => {
                    let value = ctx
                        .get(f)
                        .and_then(render_value)
                        .filter(|s| !s.is_empty())
                        .ok_or_else(|| {
                            CatalogError::validation(
                                Target::default(),
                                format!("URN generator `{generator}` is missing field `{f}`"),
                            )
                        })?;
                    out.push_str(&value);
                }
            }
        }
        Ok(out)
    }
}

fn render_value(value: &JsonValue) -> Option<String> {
    match value {
        JsonValue::Null => None,
        JsonValue::Array(items) => {
            let parts: Vec<String> = items
                .iter()
                .filter(|v| !v.is_null())
                .map(|v| scalar_to_string(v).unwrap_or_else(|| v.to_string()))
                .collect();
            Some(parts.join(","))
        }
        JsonValue::Object(_) => Some(value.to_string()),
        scalar => scalar_to_string(scalar),
    }
}

/// A compiled URN pattern.
#[derive(Debug, Clone)]
pub struct UrnGenerator {
    pub name: String,
    pub template: Template,
    pub steps: Vec<PipelineStep>,
}

impl UrnGenerator {
    /// Names of the generators this one calls through `dependent_urn` steps.
    fn dependencies(&self) -> BTreeSet<&str> {
        let mut deps = BTreeSet::new();
        for step in &self.steps {
            step.walk(&mut |s| {
                if let PipelineStep::DependentUrn(d) = s {
                    deps.insert(d.generator.as_str());
                }
            });
        }
        deps
    }
}

/// Every compiled generator of a schema, plus the shared prefix.
#[derive(Debug, Clone, Default)]
pub struct UrnRegistry {
    prefix: String,
    generators: BTreeMap<String, UrnGenerator>,
}

impl UrnRegistry {
    pub fn build(
        prefix: &str,
        defs: &BTreeMap<String, UrnPatternDef>,
        utilities: &UtilityRegistry,
        section: &str,
    ) -> (Self, SchemaIssues) {
        let mut issues = SchemaIssues::default();
        let mut generators = BTreeMap::new();

        for (name, def) in defs {
            let path = format!("{section}.{name}");
            let template = match Template::parse(&def.template) {
                Ok(t) => t,
                Err(msg) => {
                    issues.push(format!("{path}.template"), msg);
                    continue;
                }
            };
            check_steps(
                &def.fields,
                &format!("{path}.fields"),
                utilities,
                &|g| defs.contains_key(g),
                false,
                &mut issues,
            );
            generators.insert(
                name.clone(),
                UrnGenerator {
                    name: name.clone(),
                    template,
                    steps: def.fields.clone(),
                },
            );
        }

        let registry = Self {
            prefix: prefix.to_string(),
            generators,
        };
        for cycle_root in registry.cycles() {
            issues.push(
                format!("{section}.{cycle_root}"),
                "dependent URN references form a cycle",
            );
        }
        (registry, issues)
    }

    pub fn get(&self, name: &str) -> Option<&UrnGenerator> {
        self.generators.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.generators.contains_key(name)
    }

    /// Derive the URN for `fields` with generator `name`.
    pub fn generate(
        &self,
        name: &str,
        fields: &Context,
        utilities: &UtilityRegistry,
    ) -> Result<String> {
        let generator = self
            .generators
            .get(name)
            .ok_or_else(|| CatalogError::unknown("URN generator", name))?;
        let mut ctx = fields.clone();
        Interpreter::new(utilities, self).run(&generator.steps, &mut ctx)?;
        generator.template.render(&self.prefix, &ctx, name)
    }

    /// Generators that can reach themselves through dependent URN steps.
    fn cycles(&self) -> Vec<String> {
        let mut cyclic = Vec::new();
        for start in self.generators.keys() {
            let mut stack: Vec<&str> = self
                .generators
                .get(start)
                .map(|g| g.dependencies().into_iter().collect())
                .unwrap_or_default();
            let mut seen = BTreeSet::new();
            while let Some(next) = stack.pop() {
                if next == start {
                    cyclic.push(start.clone());
                    break;
                }
                if !seen.insert(next) {
                    continue;
                }
                if let Some(g) = self.generators.get(next) {
                    stack.extend(g.dependencies());
                }
            }
        }
        cyclic
    }
}
