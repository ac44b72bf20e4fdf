//! Process-level configuration.

use std::path::PathBuf;

use crate::error::{CatalogError, Result, SchemaIssues};

/// Path of the YAML schema document.
pub const SCHEMA_PATH_ENV: &str = "ASPECTGRAPH_SCHEMA_PATH";
/// Path of the redb file; unset means an in-memory store.
pub const DB_PATH_ENV: &str = "ASPECTGRAPH_DB_PATH";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogConfig {
    pub schema_path: PathBuf,
    pub db_path: Option<PathBuf>,
}

impl CatalogConfig {
    pub fn new(schema_path: impl Into<PathBuf>) -> Self {
        Self {
            schema_path: schema_path.into(),
            db_path: None,
        }
    }

    pub fn with_db_path(mut self, db_path: impl Into<PathBuf>) -> Self {
        self.db_path = Some(db_path.into());
        self
    }

    /// Read [`SCHEMA_PATH_ENV`] (required) and [`DB_PATH_ENV`] (optional).
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let Some(schema_path) = non_empty(SCHEMA_PATH_ENV) else {
            let mut issues = SchemaIssues::default();
            issues.push(SCHEMA_PATH_ENV, "environment variable is not set");
            return Err(CatalogError::Schema(issues));
        };
        Ok(Self {
            schema_path: schema_path.into(),
            db_path: non_empty(DB_PATH_ENV).map(PathBuf::from),
        })
    }
}
