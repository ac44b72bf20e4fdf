//! Error types shared by every layer of the catalog.

use std::fmt;

/// Where a failure happened, so callers can diagnose it without re-deriving
/// the entity type, URN or aspect from their own inputs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Target {
    pub entity_type: Option<String>,
    pub urn: Option<String>,
    pub aspect: Option<String>,
}

impl Target {
    pub fn entity(entity_type: &str, urn: &str) -> Self {
        Self {
            entity_type: Some(entity_type.to_string()),
            urn: Some(urn.to_string()),
            aspect: None,
        }
    }

    pub fn aspect(entity_type: &str, urn: &str, aspect: &str) -> Self {
        Self {
            entity_type: Some(entity_type.to_string()),
            urn: Some(urn.to_string()),
            aspect: Some(aspect.to_string()),
        }
    }

    pub fn entity_type(entity_type: &str) -> Self {
        Self {
            entity_type: Some(entity_type.to_string()),
            ..Self::default()
        }
    }

    pub fn aspect_name(aspect: &str) -> Self {
        Self {
            aspect: Some(aspect.to_string()),
            ..Self::default()
        }
    }

    pub fn urn(urn: &str) -> Self {
        Self {
            urn: Some(urn.to_string()),
            ..Self::default()
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if let Some(t) = &self.entity_type {
            parts.push(format!("entity_type={t}"));
        }
        if let Some(u) = &self.urn {
            parts.push(format!("urn={u}"));
        }
        if let Some(a) = &self.aspect {
            parts.push(format!("aspect={a}"));
        }
        if parts.is_empty() {
            write!(f, "<catalog>")
        } else {
            write!(f, "{}", parts.join(" "))
        }
    }
}

/// One problem found while loading a schema document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaIssue {
    /// Dotted location inside the document, e.g. `aspects.ownership.kind`.
    pub path: String,
    pub message: String,
}

impl SchemaIssue {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for SchemaIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

/// Every issue found in one load attempt, in document order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchemaIssues(pub Vec<SchemaIssue>);

impl SchemaIssues {
    pub fn push(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.0.push(SchemaIssue::new(path, message));
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SchemaIssue> {
        self.0.iter()
    }

    pub fn extend(&mut self, other: SchemaIssues) {
        self.0.extend(other.0);
    }

    /// `Ok(())` when nothing was reported, otherwise the whole list as one error.
    pub fn into_result(self) -> Result<()> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(CatalogError::Schema(self))
        }
    }
}

impl fmt::Display for SchemaIssues {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let lines: Vec<String> = self.0.iter().map(|i| i.to_string()).collect();
        write!(f, "{}", lines.join("; "))
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    /// The schema document is missing sections or has dangling references.
    #[error("schema error ({} issue(s)): {0}", .0.len())]
    Schema(SchemaIssues),
    /// A runtime call named an entity type, aspect or generator the schema
    /// does not declare.
    #[error("unknown {kind} `{name}` is not declared in the schema")]
    UnknownReference { kind: &'static str, name: String },
    #[error("validation failed for {target}: {reason}")]
    Validation { target: Target, reason: String },
    #[error("not found: {0}")]
    NotFound(Target),
    #[error("storage error: {0}")]
    Storage(String),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Coarse classification used by callers to decide how to react.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad or missing configuration reference.
    Schema,
    /// Rejected before any write; fix the request and retry.
    Validation,
    NotFound,
    /// Connectivity or transient failure of the backing store.
    Store,
}

impl CatalogError {
    pub fn validation(target: Target, reason: impl Into<String>) -> Self {
        CatalogError::Validation {
            target,
            reason: reason.into(),
        }
    }

    /// Fill the parts of a validation error's target that the failing layer
    /// could not know. Fields already set are kept.
    pub fn within(self, outer: Target) -> Self {
        match self {
            CatalogError::Validation { target, reason } => CatalogError::Validation {
                target: Target {
                    entity_type: target.entity_type.or(outer.entity_type),
                    urn: target.urn.or(outer.urn),
                    aspect: target.aspect.or(outer.aspect),
                },
                reason,
            },
            other => other,
        }
    }

    pub fn unknown(kind: &'static str, name: &str) -> Self {
        CatalogError::UnknownReference {
            kind,
            name: name.to_string(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            CatalogError::Schema(_) | CatalogError::UnknownReference { .. } => ErrorKind::Schema,
            CatalogError::Validation { .. } => ErrorKind::Validation,
            CatalogError::NotFound(_) => ErrorKind::NotFound,
            // Caller payloads and arguments only; stored records decode
            // through `store::decode_stored` into `Storage`.
            CatalogError::Serialization(_) => ErrorKind::Validation,
            CatalogError::Storage(_) | CatalogError::Io(_) => ErrorKind::Store,
        }
    }

    /// Only store failures are worth retrying, and a timed-out versioned
    /// write should be reconciled with a read rather than blindly replayed.
    pub fn is_transient(&self) -> bool {
        self.kind() == ErrorKind::Store
    }
}

impl From<redb::DatabaseError> for CatalogError {
    fn from(e: redb::DatabaseError) -> Self {
        CatalogError::Storage(e.to_string())
    }
}
impl From<redb::TransactionError> for CatalogError {
    fn from(e: redb::TransactionError) -> Self {
        CatalogError::Storage(e.to_string())
    }
}
impl From<redb::TableError> for CatalogError {
    fn from(e: redb::TableError) -> Self {
        CatalogError::Storage(e.to_string())
    }
}
impl From<redb::StorageError> for CatalogError {
    fn from(e: redb::StorageError) -> Self {
        CatalogError::Storage(e.to_string())
    }
}
impl From<redb::CommitError> for CatalogError {
    fn from(e: redb::CommitError) -> Self {
        CatalogError::Storage(e.to_string())
    }
}
impl From<serde_yaml::Error> for CatalogError {
    fn from(e: serde_yaml::Error) -> Self {
        let mut issues = SchemaIssues::default();
        issues.push("<document>", format!("could not parse: {e}"));
        CatalogError::Schema(issues)
    }
}

pub type Result<T> = std::result::Result<T, CatalogError>;
