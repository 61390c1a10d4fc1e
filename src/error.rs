//! Error types for mapping, merging and chain execution

use crate::query::QueryError;
use thiserror::Error;

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, EtlError>;

/// Errors raised while parsing specs or applying them
///
/// Every variant is fatal for the ETL application or chain that raised it.
/// `Rule` and `Step` wrap an inner error with the identity of the rule or
/// chain step that produced it; use [`EtlError::root_cause`] to look through
/// them.
#[derive(Error, Debug)]
pub enum EtlError {
    /// Malformed destination path, or a path that runs into a value of the
    /// wrong shape
    #[error("Invalid path '{path}': {message}")]
    InvalidPath {
        /// Path text (or the rendered prefix that failed)
        path: String,
        /// What went wrong
        message: String,
    },

    /// Upsert between incompatible shapes
    #[error("Cannot upsert {incoming} into {existing} at '{path}'")]
    MergeTypeConflict {
        /// Destination path of the conflicting value
        path: String,
        /// Shape of the value already present
        existing: &'static str,
        /// Shape of the value being merged in
        incoming: &'static str,
    },

    /// Query evaluation failed
    #[error("Expression '{expression}' failed: {source}")]
    ExpressionError {
        /// The rule's source expression
        expression: String,
        /// Underlying evaluator error
        #[source]
        source: QueryError,
    },

    /// Forwarding token with no previous output, or a document that cannot
    /// be resolved
    #[error("Invalid chain reference in step {step}: {message}")]
    InvalidChainReference {
        /// 1-based step number
        step: usize,
        /// Error message
        message: String,
    },

    /// Malformed ETL or chain specification
    #[error("Invalid spec: {message}")]
    InvalidSpec {
        /// Error message
        message: String,
    },

    /// Error raised while applying one mapping rule
    #[error("Mapping rule {index} (dst '{destination}'): {source}")]
    Rule {
        /// 1-based rule number
        index: usize,
        /// Destination path text of the rule
        destination: String,
        /// Inner error
        #[source]
        source: Box<EtlError>,
    },

    /// Error raised while executing one chain step
    #[error("Chain step {index} (etl '{etl}'): {source}")]
    Step {
        /// 1-based step number
        index: usize,
        /// ETL reference of the step
        etl: String,
        /// Inner error
        #[source]
        source: Box<EtlError>,
    },

    /// Document could not be read
    #[error("I/O error on '{reference}': {source}")]
    Io {
        /// Document reference being loaded
        reference: String,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Document is not valid JSON
    #[error("Invalid JSON in '{reference}': {source}")]
    Json {
        /// Document reference being loaded
        reference: String,
        /// Underlying error
        #[source]
        source: serde_json::Error,
    },
}

impl EtlError {
    /// Create an invalid path error
    pub fn invalid_path(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidPath {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create an invalid spec error
    pub fn invalid_spec(message: impl Into<String>) -> Self {
        Self::InvalidSpec {
            message: message.into(),
        }
    }

    /// Create an invalid chain reference error
    pub fn invalid_reference(step: usize, message: impl Into<String>) -> Self {
        Self::InvalidChainReference {
            step,
            message: message.into(),
        }
    }

    /// Innermost error, skipping rule and step wrappers
    pub fn root_cause(&self) -> &EtlError {
        match self {
            EtlError::Rule { source, .. } | EtlError::Step { source, .. } => source.root_cause(),
            other => other,
        }
    }

    /// Short machine-friendly name of the error kind
    pub fn kind(&self) -> &'static str {
        match self {
            EtlError::InvalidPath { .. } => "InvalidPath",
            EtlError::MergeTypeConflict { .. } => "MergeTypeConflict",
            EtlError::ExpressionError { .. } => "ExpressionError",
            EtlError::InvalidChainReference { .. } => "InvalidChainReference",
            EtlError::InvalidSpec { .. } => "InvalidSpec",
            EtlError::Io { .. } => "Io",
            EtlError::Json { .. } => "Json",
            EtlError::Rule { source, .. } | EtlError::Step { source, .. } => source.kind(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_cause_unwraps_wrappers() {
        let inner = EtlError::invalid_path(".a[0]", "cannot index string");
        let err = EtlError::Step {
            index: 2,
            etl: "etl.json".to_string(),
            source: Box::new(EtlError::Rule {
                index: 1,
                destination: ".a[0]".to_string(),
                source: Box::new(inner),
            }),
        };

        assert_eq!(err.kind(), "InvalidPath");
        assert!(matches!(err.root_cause(), EtlError::InvalidPath { .. }));
        let text = err.to_string();
        assert!(text.contains("Chain step 2"));
        assert!(text.contains("Mapping rule 1"));
    }
}
