//! Field-processing pipelines.
//!
//! URN patterns and aspects both carry an ordered list of steps that run
//! against a mutable context seeded with the caller's fields. The step set is
//! closed; each variant is interpreted explicitly by [`Interpreter::run`].

use std::collections::BTreeMap;

use serde::Deserialize;
use serde_json::{Map, Value as JsonValue};

use crate::error::{CatalogError, Result, SchemaIssues, Target};
use crate::urn::UrnRegistry;
use crate::utility::{UtilityFunction, UtilityRegistry};

pub type Context = Map<String, JsonValue>;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStep {
    /// Set each field that is absent or null.
    Default(Map<String, JsonValue>),
    /// Apply a named utility function.
    Transform(TransformStep),
    /// Generate another URN from the context and store it.
    DependentUrn(DependentUrnStep),
    /// Gather several fields into one array.
    Collect(CollectStep),
    /// Run a rule list chosen by the value of a sentinel field.
    Conditional(ConditionalStep),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TransformStep {
    pub function: String,
    #[serde(default)]
    pub field: Option<String>,
    #[serde(default)]
    pub into: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DependentUrnStep {
    pub generator: String,
    pub into: String,
    /// Target-generator field → context field. Empty means "pass the whole
    /// context through".
    #[serde(default)]
    pub params: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CollectStep {
    pub fields: Vec<String>,
    pub into: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConditionalStep {
    pub on: String,
    #[serde(default)]
    pub rules: BTreeMap<String, Vec<PipelineStep>>,
    #[serde(default)]
    pub otherwise: Vec<PipelineStep>,
}

impl PipelineStep {
    /// Visit this step and every step nested under a conditional.
    pub fn walk<'a>(&'a self, visit: &mut dyn FnMut(&'a PipelineStep)) {
        visit(self);
        if let PipelineStep::Conditional(c) = self {
            for step in c.rules.values().flatten().chain(c.otherwise.iter()) {
                step.walk(visit);
            }
        }
    }
}

/// Executes pipelines against the compiled utility functions and URN
/// generators of one schema.
pub struct Interpreter<'a> {
    pub utilities: &'a UtilityRegistry,
    pub urns: &'a UrnRegistry,
}

impl<'a> Interpreter<'a> {
    pub fn new(utilities: &'a UtilityRegistry, urns: &'a UrnRegistry) -> Self {
        Self { utilities, urns }
    }

    /// Run `steps` in order against `ctx`.
    pub fn run(&self, steps: &[PipelineStep], ctx: &mut Context) -> Result<()> {
        for step in steps {
            self.step(step, ctx)?;
        }
        Ok(())
    }

    fn step(&self, step: &PipelineStep, ctx: &mut Context) -> Result<()> {
        match step {
            PipelineStep::Default(defaults) => {
                for (k, v) in defaults {
                    if ctx.get(k).is_none_or(JsonValue::is_null) {
                        ctx.insert(k.clone(), v.clone());
                    }
                }
            }
            PipelineStep::Transform(t) => self.transform(t, ctx)?,
            PipelineStep::DependentUrn(d) => {
                let seed = if d.params.is_empty() {
                    ctx.clone()
                } else {
                    d.params
                        .iter()
                        .filter_map(|(param, source)| {
                            ctx.get(source).map(|v| (param.clone(), v.clone()))
                        })
                        .collect()
                };
                let urn = self.urns.generate(&d.generator, &seed, self.utilities)?;
                ctx.insert(d.into.clone(), JsonValue::String(urn));
            }
            PipelineStep::Collect(c) => {
                let values: Vec<JsonValue> = c
                    .fields
                    .iter()
                    .filter_map(|f| ctx.get(f))
                    .filter(|v| !v.is_null())
                    .cloned()
                    .collect();
                ctx.insert(c.into.clone(), JsonValue::Array(values));
            }
            PipelineStep::Conditional(c) => {
                let key = ctx.get(&c.on).and_then(scalar_to_string);
                let branch = key
                    .as_deref()
                    .and_then(|k| c.rules.get(k))
                    .unwrap_or(&c.otherwise);
                self.run(branch, ctx)?;
            }
        }
        Ok(())
    }

    fn transform(&self, t: &TransformStep, ctx: &mut Context) -> Result<()> {
        let function = self
            .utilities
            .get(&t.function)
            .ok_or_else(|| CatalogError::unknown("utility function", &t.function))?;

        match function {
            UtilityFunction::Text(op) => {
                let Some(field) = t.field.as_deref() else {
                    return Ok(());
                };
                if let Some(value) = ctx.get(field).filter(|v| !v.is_null()) {
                    let rewritten = op.apply_value(value);
                    let into = t.into.clone().unwrap_or_else(|| field.to_string());
                    ctx.insert(into, rewritten);
                }
            }
            UtilityFunction::Mask(mask) => match t.field.as_deref() {
                Some(field) => {
                    if let Some(value) = ctx.get(field) {
                        let masked = mask.mask(field, value);
                        let into = t.into.clone().unwrap_or_else(|| field.to_string());
                        ctx.insert(into, masked);
                    }
                }
                None => {
                    let masked: Context =
                        ctx.iter().map(|(k, v)| (k.clone(), mask.mask(k, v))).collect();
                    *ctx = masked;
                }
            },
            UtilityFunction::Timestamp { .. } => {
                let Some(target) = t.into.as_deref().or(t.field.as_deref()) else {
                    return Ok(());
                };
                if ctx.get(target).is_none_or(JsonValue::is_null) {
                    if let Some(now) = function.timestamp() {
                        ctx.insert(target.to_string(), JsonValue::from(now));
                    }
                }
            }
        }
        Ok(())
    }
}

/// Load-time checks for one pipeline. `has_generator` answers whether a URN
/// generator name exists; `allow_timestamps` is false for URN pipelines,
/// whose output must not depend on the wall clock.
pub fn check_steps(
    steps: &[PipelineStep],
    path: &str,
    utilities: &UtilityRegistry,
    has_generator: &dyn Fn(&str) -> bool,
    allow_timestamps: bool,
    issues: &mut SchemaIssues,
) {
    for (i, top) in steps.iter().enumerate() {
        let step_path = format!("{path}[{i}]");
        top.walk(&mut |step| match step {
            PipelineStep::Transform(t) => match utilities.get(&t.function) {
                None => issues.push(
                    step_path.clone(),
                    format!("unknown utility function `{}`", t.function),
                ),
                Some(UtilityFunction::Timestamp { .. }) if !allow_timestamps => issues.push(
                    step_path.clone(),
                    format!(
                        "timestamp function `{}` would make URN generation time-dependent",
                        t.function
                    ),
                ),
                Some(UtilityFunction::Timestamp { .. }) if t.field.is_none() && t.into.is_none() => {
                    issues.push(step_path.clone(), "timestamp transform needs `into` or `field`")
                }
                Some(UtilityFunction::Text(_)) if t.field.is_none() => issues.push(
                    step_path.clone(),
                    format!("string function `{}` needs a `field`", t.function),
                ),
                Some(UtilityFunction::Mask(_)) if t.field.is_none() && t.into.is_some() => {
                    issues.push(step_path.clone(), "a whole-context mask cannot use `into`")
                }
                Some(_) => {}
            },
            PipelineStep::DependentUrn(d) if !has_generator(&d.generator) => issues.push(
                step_path.clone(),
                format!("unknown URN generator `{}`", d.generator),
            ),
            _ => {}
        });
    }
}

/// String form of a scalar JSON value; `None` for null, arrays and objects.
pub fn scalar_to_string(value: &JsonValue) -> Option<String> {
    match value {
        JsonValue::String(s) => Some(s.clone()),
        JsonValue::Number(n) => Some(n.to_string()),
        JsonValue::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Convert a payload into a pipeline context; anything but a JSON object is
/// rejected.
pub fn context_from(value: JsonValue, target: impl FnOnce() -> Target) -> Result<Context> {
    match value {
        JsonValue::Object(map) => Ok(map),
        JsonValue::Null => Ok(Context::new()),
        other => Err(CatalogError::validation(
            target(),
            format!("expected a JSON object, got {}", json_type(&other)),
        )),
    }
}

pub fn json_type(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "boolean",
        JsonValue::Number(_) => "number",
        JsonValue::String(_) => "string",
        JsonValue::Array(_) => "array",
        JsonValue::Object(_) => "object",
    }
}
