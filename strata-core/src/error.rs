use crate::Value;
use std::fmt::{self, Display};

/// Closed taxonomy of backend failures.
///
/// Drivers attach a [`BackendError`] to the `anyhow::Error` they return, the
/// repository recovers it by downcasting and never matches on driver types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendErrorKind {
    Constraint,
    Connectivity,
    InvalidOperation,
    Timeout,
    Other,
}

impl Display for BackendErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BackendErrorKind::Constraint => "constraint violation",
            BackendErrorKind::Connectivity => "connectivity",
            BackendErrorKind::InvalidOperation => "invalid operation",
            BackendErrorKind::Timeout => "timeout",
            BackendErrorKind::Other => "backend failure",
        })
    }
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct BackendError {
    pub kind: BackendErrorKind,
    pub message: String,
}

impl BackendError {
    pub fn new(kind: BackendErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Kind of the backend failure carried by `error`, `Other` when untagged.
    pub fn kind_of(error: &anyhow::Error) -> BackendErrorKind {
        error
            .chain()
            .find_map(|e| e.downcast_ref::<BackendError>())
            .map(|e| e.kind)
            .unwrap_or(BackendErrorKind::Other)
    }
}

/// Operation attempted when a failure happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Connect,
    Select,
    Exists,
    Insert,
    Update,
    Delete,
    Save,
    Structured,
    Raw,
    Begin,
    Commit,
    Rollback,
    Dispose,
}

impl Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Operation::Connect => "connect",
            Operation::Select => "select",
            Operation::Exists => "exists",
            Operation::Insert => "insert",
            Operation::Update => "update",
            Operation::Delete => "delete",
            Operation::Save => "save",
            Operation::Structured => "structured command",
            Operation::Raw => "raw statement",
            Operation::Begin => "begin transaction",
            Operation::Commit => "commit",
            Operation::Rollback => "rollback",
            Operation::Dispose => "dispose",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UsageError {
    #[error("the repository provider has been disposed")]
    Disposed,
    #[error("a transaction is already open on this provider")]
    NestedTransaction,
    #[error("no transaction is open on this provider")]
    NoTransaction,
    #[error("selection mismatch: {0}")]
    SelectionMismatch(String),
    #[error("invalid filter: {0}")]
    InvalidFilter(String),
    #[error("unsupported shape: {0}")]
    UnsupportedShape(String),
}

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("cannot resolve the metadata of `{entity}`: {message}")]
    MetadataResolution {
        entity: &'static str,
        message: String,
    },
    #[error("compilation invariant violated: {0}")]
    CompilationInvariant(String),
    #[error("{operation} failed for {target} ({kind})")]
    Execution {
        operation: Operation,
        target: String,
        /// Parameters bound to the failed statement.
        params: Vec<Value>,
        /// Persisted columns of the item being written, by column name.
        item: Option<serde_json::Value>,
        kind: BackendErrorKind,
        #[source]
        source: anyhow::Error,
    },
    #[error(transparent)]
    Usage(#[from] UsageError),
}

impl RepositoryError {
    pub fn metadata(entity: &'static str, message: impl Into<String>) -> Self {
        Self::MetadataResolution {
            entity,
            message: message.into(),
        }
    }

    pub fn execution(operation: Operation, target: impl Into<String>, source: anyhow::Error) -> Self {
        Self::Execution {
            operation,
            target: target.into(),
            params: Vec::new(),
            item: None,
            kind: BackendError::kind_of(&source),
            source,
        }
    }

    /// Attaches the parameters of the failed statement, no effect on other variants.
    pub fn with_params(mut self, values: Vec<Value>) -> Self {
        if let Self::Execution { params, .. } = &mut self {
            *params = values;
        }
        self
    }

    /// Attaches the item being written, no effect on other variants.
    pub fn with_item(mut self, value: Option<serde_json::Value>) -> Self {
        if let Self::Execution { item, .. } = &mut self {
            *item = value;
        }
        self
    }

    pub fn is_usage(&self) -> bool {
        matches!(self, Self::Usage(..))
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::MetadataResolution { .. } => "METADATA_RESOLUTION",
            Self::CompilationInvariant(..) => "COMPILATION_INVARIANT",
            Self::Execution { .. } => "REPOSITORY_EXECUTION",
            Self::Usage(..) => "CONCURRENCY_OR_USAGE",
        }
    }
}

pub type RepositoryResult<T> = std::result::Result<T, RepositoryError>;

/// Normalized error record produced by an audit collaborator.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorRecord {
    pub code: String,
    pub error_type: String,
    pub message: String,
    pub data: serde_json::Value,
    pub diagnostic: String,
}

/// Audit collaborator turning a failure into an [`ErrorRecord`].
pub trait ErrorMapping: Send + Sync {
    fn map(&self, action: &str, error: &RepositoryError) -> ErrorRecord;
}

/// Mapping that keeps the repository's own codes and the full error chain.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultErrorMapping;

impl ErrorMapping for DefaultErrorMapping {
    fn map(&self, action: &str, error: &RepositoryError) -> ErrorRecord {
        let data = match error {
            RepositoryError::Execution {
                operation,
                target,
                params,
                item,
                kind,
                ..
            } => serde_json::json!({
                "action": action,
                "operation": operation.to_string(),
                "target": target,
                "params": params.iter().map(Value::to_json).collect::<Vec<_>>(),
                "item": item,
                "kind": kind.to_string(),
            }),
            _ => serde_json::json!({ "action": action }),
        };
        let mut diagnostic = error.to_string();
        let mut source = std::error::Error::source(error);
        while let Some(cause) = source {
            diagnostic.push_str("\ncaused by: ");
            diagnostic.push_str(&cause.to_string());
            source = cause.source();
        }
        ErrorRecord {
            code: error.code().into(),
            error_type: match error {
                RepositoryError::MetadataResolution { .. } => "MetadataResolutionError",
                RepositoryError::CompilationInvariant(..) => "CompilationInvariantViolation",
                RepositoryError::Execution { .. } => "RepositoryExecutionError",
                RepositoryError::Usage(..) => "ConcurrencyOrUsageError",
            }
            .into(),
            message: error.to_string(),
            data,
            diagnostic,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn backend_kind_survives_context() {
        let error = Err::<(), _>(anyhow::Error::new(BackendError::new(
            BackendErrorKind::Constraint,
            "duplicate key",
        )))
        .context("While running the statement")
        .unwrap_err();
        assert_eq!(BackendError::kind_of(&error), BackendErrorKind::Constraint);
        assert_eq!(
            BackendError::kind_of(&anyhow::Error::msg("boom")),
            BackendErrorKind::Other
        );
    }

    #[test]
    fn default_mapping() {
        let error = RepositoryError::execution(
            Operation::Insert,
            "Product",
            anyhow::Error::new(BackendError::new(BackendErrorKind::Timeout, "slow")),
        )
        .with_params(vec![Value::Varchar(Some("HAM-01".into())), Value::Int64(None)])
        .with_item(Some(serde_json::json!({ "code": "HAM-01" })));
        let record = DefaultErrorMapping.map("product.insert", &error);
        assert_eq!(record.code, "REPOSITORY_EXECUTION");
        assert_eq!(record.error_type, "RepositoryExecutionError");
        assert_eq!(record.data["kind"], "timeout");
        assert_eq!(record.data["params"], serde_json::json!(["HAM-01", null]));
        assert_eq!(record.data["item"]["code"], "HAM-01");

        let record = DefaultErrorMapping.map("raw", &UsageError::Disposed.into());
        assert_eq!(record.data, serde_json::json!({ "action": "raw" }));
        assert!(record.diagnostic.contains("caused by: timeout: slow"));
    }
}
