//! Query evaluation
//!
//! The mapping engine reads source documents only through the
//! [`QueryEvaluator`] trait: one method that evaluates an expression against
//! an input document and a context object and yields a stream of results.
//! [`JqEvaluator`] is the bundled implementation, running jq programs on the
//! `jaq` interpreter. Any other evaluator (or a test fake) can be plugged in
//! instead; plain closures implement the trait too.

mod evaluator;

pub use evaluator::{JqEvaluator, Program};

use serde_json::Value;
use thiserror::Error;

/// Result type for query operations
pub type QueryResult<T> = Result<T, QueryError>;

/// Stream of query results, pulled by the mapping evaluator
pub type ValueStream<'a> = Box<dyn Iterator<Item = QueryResult<Value>> + 'a>;

/// Evaluates query expressions
///
/// `context` is the resolved execution context of the current step; the
/// bundled evaluator exposes it as `$ctx`.
pub trait QueryEvaluator: Send + Sync {
    /// Evaluate `expression` against `input`
    fn evaluate<'a>(
        &'a self,
        expression: &str,
        input: &'a Value,
        context: &'a Value,
    ) -> QueryResult<ValueStream<'a>>;
}

impl<F> QueryEvaluator for F
where
    F: Fn(&str, &Value, &Value) -> QueryResult<Vec<Value>> + Send + Sync,
{
    fn evaluate<'a>(
        &'a self,
        expression: &str,
        input: &'a Value,
        context: &'a Value,
    ) -> QueryResult<ValueStream<'a>> {
        let results = self(expression, input, context)?;
        Ok(Box::new(results.into_iter().map(Ok)))
    }
}

/// Errors produced while parsing or evaluating a query
#[derive(Error, Debug, Clone, PartialEq)]
pub enum QueryError {
    /// Expression text could not be parsed
    #[error("Syntax error at position {position}: {message}")]
    Syntax {
        /// Byte offset in the expression
        position: usize,
        /// Error message
        message: String,
    },

    /// Call to a filter that does not exist with this arity
    #[error("{name}/{arity} is not defined")]
    UnknownFunction {
        /// Filter name
        name: String,
        /// Number of arguments
        arity: usize,
    },

    /// Reference to an unbound variable
    #[error("${name} is not defined")]
    UnknownVariable {
        /// Variable name without the `$`
        name: String,
    },

    /// Error raised while running a program, including `error(...)`
    #[error("{message}")]
    Runtime {
        /// Error message
        message: String,
    },

    /// Failure reported by an external evaluator
    #[error("{message}")]
    Evaluator {
        /// Error message
        message: String,
    },
}

impl QueryError {
    /// Create a syntax error
    pub fn syntax(position: usize, message: impl Into<String>) -> Self {
        Self::Syntax {
            position,
            message: message.into(),
        }
    }

    /// Create a runtime error
    pub fn runtime(message: impl Into<String>) -> Self {
        Self::Runtime {
            message: message.into(),
        }
    }

    /// Create an error for external evaluators
    pub fn evaluator(message: impl Into<String>) -> Self {
        Self::Evaluator {
            message: message.into(),
        }
    }
}
