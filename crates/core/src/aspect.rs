//! Aspect payload validation.

use std::sync::Arc;

use serde_json::Value as JsonValue;

use crate::error::{Result, Target};
use crate::pipeline::context_from;
use crate::schema::Schema;
use crate::store::Props;

/// Runs an aspect's field pipeline over a payload and keeps only the
/// aspect's declared properties.
#[derive(Clone)]
pub struct AspectProcessor {
    schema: Arc<Schema>,
}

impl AspectProcessor {
    pub fn new(schema: Arc<Schema>) -> Self {
        Self { schema }
    }

    /// Validate `payload` as an `aspect` record.
    ///
    /// Undeclared fields are dropped, as are fields that end up `null`. The
    /// result is a fixed point: validating it again returns it unchanged as
    /// long as the aspect's pipeline only fills absent fields.
    pub fn validate(&self, aspect: &str, payload: JsonValue) -> Result<Props> {
        let aspect_type = self.schema.aspect(aspect)?;
        let mut ctx = context_from(payload, || Target::aspect_name(aspect))?;
        self.schema.run_pipeline(&aspect_type.steps, &mut ctx)?;

        let mut filtered = Props::new();
        for name in &aspect_type.properties {
            match ctx.remove(name) {
                None | Some(JsonValue::Null) => {}
                Some(value) => {
                    filtered.insert(name.clone(), value);
                }
            }
        }
        Ok(filtered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use serde_json::json;

    const SCHEMA: &str = r#"
utility_functions:
  lower: {kind: string, operation: lowercase}
  mask_secrets: {kind: mask, key_pattern: "(?i)password|secret"}
  now: {kind: timestamp, milliseconds: true}
urns:
  dataset:
    template: "{prefix}:dataset:({platform},{name},{env})"
entities:
  Dataset:
    urn: dataset
    properties: [platform, name, env]
    aspects:
      datasetProperties: versioned
aspects:
  datasetProperties:
    kind: versioned
    properties: [description, platform, config, created]
    fields:
      - transform: {function: lower, field: platform}
      - transform: {function: mask_secrets, field: config}
      - transform: {function: now, into: created}
"#;

    fn processor() -> AspectProcessor {
        AspectProcessor::new(Arc::new(Schema::from_yaml_str(SCHEMA).unwrap()))
    }

    #[test]
    fn keeps_declared_properties_only() {
        let out = processor()
            .validate(
                "datasetProperties",
                json!({"description": "orders", "platform": "MySQL", "junk": 1, "created": 5}),
            )
            .unwrap();
        assert_eq!(
            JsonValue::Object(out),
            json!({"description": "orders", "platform": "mysql", "created": 5})
        );
    }

    #[test]
    fn applies_masking_and_timestamps() {
        let out = processor()
            .validate(
                "datasetProperties",
                json!({"config": {"user": "etl", "password": "hunter2"}}),
            )
            .unwrap();
        assert_eq!(out["config"], json!({"user": "etl", "password": "********"}));
        assert!(out["created"].as_i64().unwrap() > 0);
    }

    #[test]
    fn validation_is_idempotent() {
        let p = processor();
        let once = p
            .validate(
                "datasetProperties",
                json!({"description": "d", "platform": "Hive", "config": {"secret": "x"}}),
            )
            .unwrap();
        let twice = p
            .validate("datasetProperties", JsonValue::Object(once.clone()))
            .unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn drops_nulls() {
        let out = processor()
            .validate(
                "datasetProperties",
                json!({"description": null, "created": 1}),
            )
            .unwrap();
        assert!(!out.contains_key("description"));
    }

    #[test]
    fn unknown_aspect_is_a_schema_error() {
        let err = processor().validate("nope", json!({})).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Schema);
    }

    #[test]
    fn non_object_payload_is_rejected() {
        let err = processor()
            .validate("datasetProperties", json!([1, 2]))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(err.to_string().contains("expected a JSON object, got array"), "{err}");
    }
}
