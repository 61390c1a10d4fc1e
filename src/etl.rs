//! ETL specifications and the runner that applies them
//!
//! An ETL file is either a JSON array of rules, where a lone `{"ctx": {...}}`
//! element contributes context instead of a rule:
//!
//! ```json
//! [
//!   {"ctx": {"suffix": "-prod"}},
//!   {"src": ".name + $ctx.suffix", "dst": ".label"},
//!   {"src": ".tags[]", "dst": ".tags", "mode": "upsert"}
//! ]
//! ```
//!
//! or an object `{"mappings": [...], "ctx": {...}}`.

use crate::context::ExecutionContext;
use crate::error::{EtlError, Result};
use crate::mapping::{self, MappingRule};
use crate::merge::MergeOptions;
use crate::query::QueryEvaluator;
use serde_json::{Map, Value};
use std::str::FromStr;

const CONTEXT_KEY: &str = "ctx";
const MAPPINGS_KEY: &str = "mappings";
const PRELUDE_KEY: &str = "with";

/// Ordered mapping rules plus the spec's own context layer
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EtlSpec {
    /// Rules, applied in order
    pub rules: Vec<MappingRule>,
    /// ETL-level context
    pub context: Map<String, Value>,
}

impl EtlSpec {
    /// Spec with the given rules and no context
    pub fn new(rules: Vec<MappingRule>) -> Self {
        Self {
            rules,
            context: Map::new(),
        }
    }

    /// Replace the spec's context layer
    pub fn with_context(mut self, context: Map<String, Value>) -> Self {
        self.context = context;
        self
    }

    /// Parse either ETL surface form from a JSON value
    pub fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Array(items) => Self::from_array(items),
            Value::Object(object) => Self::from_object(object),
            other => Err(EtlError::invalid_spec(format!(
                "ETL spec must be a JSON array or object, got {}",
                crate::merge::Shape::of(other)
            ))),
        }
    }

    fn from_array(items: &[Value]) -> Result<Self> {
        let mut spec = EtlSpec::default();
        for item in items {
            match item.as_object() {
                Some(block) if block.len() == 1 && block.contains_key(CONTEXT_KEY) => {
                    if let Some(layer) = context_block(&block[CONTEXT_KEY])? {
                        spec.context.extend(layer.clone());
                    }
                }
                Some(block) if block.len() == 1 && block.contains_key(PRELUDE_KEY) => {
                    return Err(unsupported_prelude());
                }
                _ => {
                    let index = spec.rules.len() + 1;
                    spec.rules.push(MappingRule::from_value(item, index)?);
                }
            }
        }
        Ok(spec)
    }

    fn from_object(object: &Map<String, Value>) -> Result<Self> {
        if object.contains_key(PRELUDE_KEY) {
            return Err(unsupported_prelude());
        }

        let rules = match object.get(MAPPINGS_KEY) {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(items)) => items
                .iter()
                .enumerate()
                .map(|(at, item)| MappingRule::from_value(item, at + 1))
                .collect::<Result<_>>()?,
            Some(_) => {
                return Err(EtlError::invalid_spec("'mappings' must be an array of rules"));
            }
        };

        let context = match object.get(CONTEXT_KEY) {
            Some(value) => context_block(value)?.cloned().unwrap_or_default(),
            None => Map::new(),
        };

        Ok(Self { rules, context })
    }
}

impl FromStr for EtlSpec {
    type Err = EtlError;

    fn from_str(text: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(text).map_err(|source| EtlError::Json {
            reference: "<etl spec>".to_string(),
            source,
        })?;
        Self::from_value(&value)
    }
}

/// A context block is an object or `null`
fn context_block(value: &Value) -> Result<Option<&Map<String, Value>>> {
    match value {
        Value::Null => Ok(None),
        Value::Object(layer) => Ok(Some(layer)),
        other => Err(EtlError::invalid_spec(format!(
            "'ctx' must be an object, got {}",
            crate::merge::Shape::of(other)
        ))),
    }
}

fn unsupported_prelude() -> EtlError {
    EtlError::invalid_spec("'with' preludes are not supported")
}

/// Applies ETL specs with a given evaluator and merge options
pub struct EtlRunner<'e> {
    evaluator: &'e dyn QueryEvaluator,
    options: MergeOptions,
}

impl<'e> EtlRunner<'e> {
    /// Runner over `evaluator`
    pub fn new(evaluator: &'e dyn QueryEvaluator, options: MergeOptions) -> Self {
        Self { evaluator, options }
    }

    /// Merge options in effect
    pub fn options(&self) -> &MergeOptions {
        &self.options
    }

    /// Apply every rule of `spec` to a copy of `seed` (or `{}`)
    ///
    /// The seed is never modified. On error the working copy is dropped and
    /// the failing rule is identified by its 1-based index.
    pub fn run(
        &self,
        spec: &EtlSpec,
        source: &Value,
        seed: Option<&Value>,
        context: &ExecutionContext,
    ) -> Result<Value> {
        let mut destination = seed.cloned().unwrap_or_else(|| Value::Object(Map::new()));

        for (at, rule) in spec.rules.iter().enumerate() {
            mapping::apply(
                rule,
                source,
                context.as_value(),
                &mut destination,
                self.evaluator,
                &self.options,
            )
            .map_err(|err| EtlError::Rule {
                index: at + 1,
                destination: rule.destination_path.to_string(),
                source: Box::new(err),
            })?;
        }

        log::debug!("applied {} rule(s)", spec.rules.len());
        Ok(destination)
    }
}
