//! Utility functions compiled from the schema's `utility_functions` section.
//!
//! Three families exist: text processing (normalisation, regex rewrite,
//! split-and-extract), masking of values whose key looks sensitive, and
//! timestamp generation. Everything is compiled once at load time so an
//! unknown operation or a bad regex fails the load, never a write.

use std::collections::BTreeMap;

use chrono::Utc;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value as JsonValue;

use crate::error::SchemaIssues;

const DEFAULT_MASK: &str = "********";

/// Flat shape of one `utility_functions.<name>` entry before compilation.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct UtilityDef {
    kind: String,
    #[serde(default)]
    operation: Option<String>,
    #[serde(default)]
    pattern: Option<String>,
    #[serde(default)]
    replacement: Option<String>,
    #[serde(default)]
    group: Option<usize>,
    #[serde(default)]
    delimiter: Option<String>,
    #[serde(default)]
    index: Option<usize>,
    #[serde(default)]
    key_pattern: Option<String>,
    #[serde(default)]
    milliseconds: bool,
}

/// A text-to-text rewrite.
#[derive(Debug, Clone)]
pub enum TextOp {
    Lowercase,
    Uppercase,
    Trim,
    RegexReplace { regex: Regex, replacement: String },
    /// Keeps capture `group` of the first match; input is returned unchanged
    /// when nothing matches.
    RegexExtract { regex: Regex, group: usize },
    /// `"alice@example.com"` split on `@` at index 0 gives `"alice"`.
    SplitExtract { delimiter: String, index: usize },
}

impl TextOp {
    pub fn apply(&self, input: &str) -> String {
        match self {
            TextOp::Lowercase => input.to_lowercase(),
            TextOp::Uppercase => input.to_uppercase(),
            TextOp::Trim => input.trim().to_string(),
            TextOp::RegexReplace { regex, replacement } => {
                regex.replace_all(input, replacement.as_str()).into_owned()
            }
            TextOp::RegexExtract { regex, group } => regex
                .captures(input)
                .and_then(|caps| caps.get(*group))
                .map(|m| m.as_str().to_string())
                .unwrap_or_else(|| input.to_string()),
            TextOp::SplitExtract { delimiter, index } => input
                .split(delimiter.as_str())
                .nth(*index)
                .unwrap_or(input)
                .to_string(),
        }
    }

    /// Rewrites a string, or every string inside an array. Other values pass
    /// through untouched.
    pub fn apply_value(&self, value: &JsonValue) -> JsonValue {
        match value {
            JsonValue::String(s) => JsonValue::String(self.apply(s)),
            JsonValue::Array(items) => {
                JsonValue::Array(items.iter().map(|v| self.apply_value(v)).collect())
            }
            other => other.clone(),
        }
    }
}

/// Redacts any value stored under a key matching `key_pattern`.
#[derive(Debug, Clone)]
pub struct Mask {
    key_pattern: Regex,
    replacement: String,
}

impl Mask {
    /// Mask `value`, which is stored under `key`. Nested objects are walked
    /// so that `{"conn": {"password": "x"}}` is masked at any depth.
    pub fn mask(&self, key: &str, value: &JsonValue) -> JsonValue {
        if value.is_null() {
            return JsonValue::Null;
        }
        if self.key_pattern.is_match(key) {
            return JsonValue::String(self.replacement.clone());
        }
        match value {
            JsonValue::Object(map) => JsonValue::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), self.mask(k, v)))
                    .collect(),
            ),
            JsonValue::Array(items) => {
                JsonValue::Array(items.iter().map(|v| self.mask(key, v)).collect())
            }
            other => other.clone(),
        }
    }
}

/// A compiled utility function, referenced by name from pipelines.
#[derive(Debug, Clone)]
pub enum UtilityFunction {
    Text(TextOp),
    Mask(Mask),
    Timestamp { milliseconds: bool },
}

impl UtilityFunction {
    pub fn is_timestamp(&self) -> bool {
        matches!(self, UtilityFunction::Timestamp { .. })
    }

    /// Current time as seconds or milliseconds since the epoch. Only valid
    /// for timestamp functions; other families return `None`.
    pub fn timestamp(&self) -> Option<i64> {
        match self {
            UtilityFunction::Timestamp { milliseconds: true } => {
                Some(Utc::now().timestamp_millis())
            }
            UtilityFunction::Timestamp { milliseconds: false } => Some(Utc::now().timestamp()),
            _ => None,
        }
    }
}

/// All compiled utility functions, by name.
#[derive(Debug, Clone, Default)]
pub struct UtilityRegistry {
    functions: BTreeMap<String, UtilityFunction>,
}

impl UtilityRegistry {
    /// Compile every definition. Problems are collected rather than
    /// short-circuited so the caller can report the whole section at once.
    pub fn build(defs: &BTreeMap<String, JsonValue>, section: &str) -> (Self, SchemaIssues) {
        let mut issues = SchemaIssues::default();
        let mut functions = BTreeMap::new();

        for (name, raw) in defs {
            let path = format!("{section}.{name}");
            let def: UtilityDef = match serde_json::from_value(raw.clone()) {
                Ok(d) => d,
                Err(e) => {
                    issues.push(path, e.to_string());
                    continue;
                }
            };
            match compile(&def) {
                Ok(f) => {
                    functions.insert(name.clone(), f);
                }
                Err(msg) => issues.push(path, msg),
            }
        }

        (Self { functions }, issues)
    }

    pub fn get(&self, name: &str) -> Option<&UtilityFunction> {
        self.functions.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }
}

fn compile(def: &UtilityDef) -> std::result::Result<UtilityFunction, String> {
    match def.kind.as_str() {
        "string" => compile_text(def).map(UtilityFunction::Text),
        "mask" => {
            let pattern = def
                .key_pattern
                .as_deref()
                .ok_or("mask functions need `key_pattern`")?;
            let key_pattern = compile_regex(pattern)?;
            Ok(UtilityFunction::Mask(Mask {
                key_pattern,
                replacement: def
                    .replacement
                    .clone()
                    .unwrap_or_else(|| DEFAULT_MASK.to_string()),
            }))
        }
        "timestamp" => Ok(UtilityFunction::Timestamp {
            milliseconds: def.milliseconds,
        }),
        other => Err(format!(
            "unknown function kind `{other}` (expected string, mask or timestamp)"
        )),
    }
}

fn compile_text(def: &UtilityDef) -> std::result::Result<TextOp, String> {
    let operation = def
        .operation
        .as_deref()
        .ok_or("string functions need an `operation`")?;
    match operation {
        "lowercase" => Ok(TextOp::Lowercase),
        "uppercase" => Ok(TextOp::Uppercase),
        "trim" => Ok(TextOp::Trim),
        "regex_replace" => {
            let pattern = def
                .pattern
                .as_deref()
                .ok_or("regex_replace needs `pattern`")?;
            Ok(TextOp::RegexReplace {
                regex: compile_regex(pattern)?,
                replacement: def.replacement.clone().unwrap_or_default(),
            })
        }
        "regex_extract" => {
            let pattern = def
                .pattern
                .as_deref()
                .ok_or("regex_extract needs `pattern`")?;
            let regex = compile_regex(pattern)?;
            let group = def.group.unwrap_or(1);
            if group >= regex.captures_len() {
                return Err(format!(
                    "regex_extract group {group} does not exist in `{pattern}`"
                ));
            }
            Ok(TextOp::RegexExtract { regex, group })
        }
        "split_extract" => {
            let delimiter = def
                .delimiter
                .clone()
                .ok_or("split_extract needs `delimiter`")?;
            if delimiter.is_empty() {
                return Err("split_extract delimiter must not be empty".to_string());
            }
            Ok(TextOp::SplitExtract {
                delimiter,
                index: def.index.unwrap_or(0),
            })
        }
        other => Err(format!("unknown string operation `{other}`")),
    }
}

fn compile_regex(pattern: &str) -> std::result::Result<Regex, String> {
    Regex::new(pattern).map_err(|e| format!("invalid regex `{pattern}`: {e}"))
}
