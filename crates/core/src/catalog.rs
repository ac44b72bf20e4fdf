//! Aspectgraph: a schema-driven metadata catalog on an embedded property graph.
//!
//! A YAML schema declares entity types, the aspects they carry (versioned or
//! time-series), URN templates and relationship rules. From it the catalog
//! builds one generic writer plus a per-type operation table: no code is
//! written per entity or aspect.
//!
//! Versioned aspects keep an append-only history with exactly one `latest`
//! version per `(entity, aspect)`. Time-series aspects are append-only points
//! read newest first. Relationships are discovered from aspect payloads and
//! merged idempotently.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use aspectgraph::{Catalog, CatalogConfig};
//! use serde_json::json;
//!
//! let catalog = Catalog::open(
//!     CatalogConfig::new("catalog.yaml").with_db_path("catalog.redb"),
//! )
//! .unwrap();
//!
//! // Write an aspect; owners become CorpUser entities with OWNS edges.
//! let out = catalog
//!     .invoke(
//!         "upsertOwnership",
//!         json!({
//!             "urn": "urn:li:dataset:(mysql,shop.orders,PROD)",
//!             "payload": {"owners": [{"owner": "alice", "type": "DATAOWNER"}]}
//!         }),
//!     )
//!     .unwrap();
//! assert_eq!(out["version"], 0);
//!
//! // Read it back.
//! let latest = catalog
//!     .invoke("getOwnership", json!({"urn": "urn:li:dataset:(mysql,shop.orders,PROD)"}))
//!     .unwrap();
//! ```

use std::path::Path;
use std::sync::Arc;

use serde_json::Value as JsonValue;
use tracing::info;

pub mod aspect;
pub mod config;
pub mod error;
pub mod operations;
pub mod pipeline;
pub mod redb_store;
pub mod rules;
pub mod schema;
pub mod store;
pub mod urn;
pub mod utility;
pub mod writer;

pub use aspect::AspectProcessor;
pub use config::CatalogConfig;
pub use error::{CatalogError, ErrorKind, Result, Target};
pub use operations::{
    EntityOperations, Operations, TimeSeriesAspectWriter, VersionedAspectWriter,
};
pub use redb_store::RedbGraphStore;
pub use rules::{DiscoveredRelationship, RelationshipEngine};
pub use schema::{AspectKind, Schema};
pub use store::{EdgeDirection, EdgeRecord, GraphStore, Props};
pub use writer::{AspectTarget, GraphWriter, TimeSeriesAspect, VersionedAspect};

/// A loaded schema wired to a store.
///
/// Build one per process and hand it (or its [`GraphWriter`]) to whatever
/// needs it. Dropping the catalog closes the store once no other handle to
/// the writer remains.
pub struct Catalog {
    operations: Operations,
}

impl Catalog {
    /// Load the schema and open the store named by `config`.
    pub fn open(config: CatalogConfig) -> Result<Self> {
        let schema = Schema::from_path(&config.schema_path)?;
        let store: Arc<dyn GraphStore> = match &config.db_path {
            Some(path) => Arc::new(RedbGraphStore::open(path)?),
            None => Arc::new(RedbGraphStore::open_in_memory()?),
        };
        Ok(Self::with_store(schema, store))
    }

    /// Shorthand for [`Catalog::open`] with [`CatalogConfig::from_env`].
    pub fn from_env() -> Result<Self> {
        Self::open(CatalogConfig::from_env()?)
    }

    /// A catalog over an in-memory store.
    pub fn open_in_memory(schema: Schema) -> Result<Self> {
        Ok(Self::with_store(
            schema,
            Arc::new(RedbGraphStore::open_in_memory()?),
        ))
    }

    /// A catalog over a redb file; the schema is read from `schema_path`.
    pub fn open_paths(schema_path: impl AsRef<Path>, db_path: impl AsRef<Path>) -> Result<Self> {
        Self::open(
            CatalogConfig::new(schema_path.as_ref()).with_db_path(db_path.as_ref()),
        )
    }

    pub fn with_store(schema: Schema, store: Arc<dyn GraphStore>) -> Self {
        let writer = Arc::new(GraphWriter::new(Arc::new(schema), store));
        let operations = Operations::new(writer);
        info!(
            operations = operations.names().count(),
            "catalog ready"
        );
        Self { operations }
    }

    pub fn schema(&self) -> &Schema {
        self.operations.writer().schema()
    }

    pub fn writer(&self) -> &GraphWriter {
        self.operations.writer()
    }

    pub fn shared_writer(&self) -> Arc<GraphWriter> {
        self.operations.shared_writer()
    }

    pub fn operations(&self) -> &Operations {
        &self.operations
    }

    /// See [`Operations::invoke`].
    pub fn invoke(&self, operation: &str, args: JsonValue) -> Result<JsonValue> {
        self.operations.invoke(operation, args)
    }
}
