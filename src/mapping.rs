// Copyright 2024 OctoFHIR Team
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Mapping rules and their application
//!
//! A rule pairs a query expression with a destination path. Applying it
//! evaluates the expression against the source document and writes the
//! results into the destination through the merge engine.

use crate::config::decode_escapes;
use crate::error::{EtlError, Result};
use crate::merge::{MergeMode, MergeOptions, merge};
use crate::path::Path;
use crate::query::{QueryEvaluator, QueryResult};
use serde::Deserialize;
use serde_json::Value;
use std::borrow::Cow;

/// One `src -> dst` mapping
#[derive(Debug, Clone, PartialEq)]
pub struct MappingRule {
    /// Query expression evaluated against the source document
    pub source_expression: String,
    /// Where the results are written
    pub destination_path: Path,
    /// How results combine with what is already there
    pub mode: MergeMode,
    /// Rule-level string delimiter, overriding step and engine settings
    pub delimiter: Option<String>,
}

/// Rule object as written in ETL files
#[derive(Debug, Deserialize)]
struct RawRule {
    src: String,
    dst: String,
    #[serde(default)]
    mode: Option<String>,
    #[serde(default)]
    delimiter: Option<String>,
}

impl MappingRule {
    /// Upsert rule from `source_expression` to `destination_path`
    pub fn new(source_expression: impl Into<String>, destination_path: Path) -> Self {
        Self {
            source_expression: source_expression.into(),
            destination_path,
            mode: MergeMode::default(),
            delimiter: None,
        }
    }

    /// Set the merge mode
    pub fn with_mode(mut self, mode: MergeMode) -> Self {
        self.mode = mode;
        self
    }

    /// Set a rule-level delimiter (used as is, escapes are not decoded)
    pub fn with_delimiter(mut self, delimiter: impl Into<String>) -> Self {
        self.delimiter = Some(delimiter.into());
        self
    }

    /// Parse a rule object `{"src", "dst", "mode"?, "delimiter"?}`
    ///
    /// `index` is the 1-based position used in error messages.
    pub fn from_value(value: &Value, index: usize) -> Result<Self> {
        if !value.is_object() {
            return Err(EtlError::invalid_spec(format!(
                "rule {index}: expected an object with 'src' and 'dst', got {value}"
            )));
        }

        let raw = RawRule::deserialize(value)
            .map_err(|err| EtlError::invalid_spec(format!("rule {index}: {err}")))?;

        let destination_path = Path::parse(&raw.dst).map_err(|err| EtlError::Rule {
            index,
            destination: raw.dst.clone(),
            source: Box::new(err),
        })?;
        let mode = match raw.mode.as_deref() {
            Some(mode) => mode
                .parse()
                .map_err(|err| EtlError::invalid_spec(format!("rule {index}: {err}")))?,
            None => MergeMode::default(),
        };

        Ok(Self {
            source_expression: raw.src,
            destination_path,
            mode,
            delimiter: raw.delimiter.as_deref().map(decode_escapes),
        })
    }
}

/// Evaluate the rule's expression and collect every result
fn evaluate(
    rule: &MappingRule,
    source: &Value,
    context: &Value,
    evaluator: &dyn QueryEvaluator,
) -> Result<Vec<Value>> {
    evaluator
        .evaluate(&rule.source_expression, source, context)
        .and_then(|stream| stream.collect::<QueryResult<Vec<_>>>())
        .map_err(|source| EtlError::ExpressionError {
            expression: rule.source_expression.clone(),
            source,
        })
}

/// Apply one rule to `destination` in place
///
/// Under `Replace` the slot receives `null` for no results, the single
/// result, or an array of all results. Under `Upsert` each result is merged
/// into the slot in order; no results leave the destination untouched.
pub fn apply(
    rule: &MappingRule,
    source: &Value,
    context: &Value,
    destination: &mut Value,
    evaluator: &dyn QueryEvaluator,
    options: &MergeOptions,
) -> Result<()> {
    let results = evaluate(rule, source, context, evaluator)?;
    let options = match &rule.delimiter {
        Some(delimiter) => Cow::Owned(options.with_delimiter(delimiter.clone())),
        None => Cow::Borrowed(options),
    };
    let path = &rule.destination_path;

    log::debug!(
        "{} '{}' -> {} ({} result(s))",
        rule.mode,
        rule.source_expression,
        path,
        results.len()
    );

    match rule.mode {
        MergeMode::Replace => {
            let incoming = match results.len() {
                0 => Value::Null,
                1 => results.into_iter().next().unwrap_or(Value::Null),
                _ => Value::Array(results),
            };
            log::trace!("replace {path} with {incoming}");
            path.ensure_and_set(destination, |existing| {
                merge(existing, incoming, MergeMode::Replace, path, &options)
            })
        }
        MergeMode::Upsert => {
            for incoming in results {
                log::trace!("upsert {incoming} into {path}");
                path.ensure_and_set(destination, |existing| {
                    merge(existing, incoming, MergeMode::Upsert, path, &options)
                })?;
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{JqEvaluator, QueryError};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn rule(src: &str, dst: &str) -> MappingRule {
        MappingRule::new(src, Path::parse(dst).unwrap())
    }

    fn apply_to(rule: &MappingRule, source: Value, destination: &mut Value) -> Result<()> {
        apply(
            rule,
            &source,
            &json!({}),
            destination,
            &JqEvaluator::new(),
            &MergeOptions::default(),
        )
    }

    #[test]
    fn test_replace_classifies_result_count() {
        let mut dst = json!({"t": "old"});
        apply_to(&rule("empty", ".t").with_mode(MergeMode::Replace), json!({}), &mut dst).unwrap();
        assert_eq!(dst, json!({"t": null}));

        apply_to(&rule(".a", ".t").with_mode(MergeMode::Replace), json!({"a": 1}), &mut dst).unwrap();
        assert_eq!(dst, json!({"t": 1}));

        apply_to(&rule(".[]", ".t").with_mode(MergeMode::Replace), json!([1, 2]), &mut dst).unwrap();
        assert_eq!(dst, json!({"t": [1, 2]}));
    }

    #[test]
    fn test_upsert_with_no_results_is_noop() {
        let mut dst = json!({"t": "keep"});
        apply_to(&rule("empty", ".t"), json!({}), &mut dst).unwrap();
        assert_eq!(dst, json!({"t": "keep"}));

        let mut dst = json!({});
        apply_to(&rule(".[]", ".t"), json!([]), &mut dst).unwrap();
        assert_eq!(dst, json!({}));
    }

    #[test]
    fn test_upsert_folds_results_in_order() {
        let mut dst = json!({});
        apply_to(&rule(".[] | .Arn", ".arns"), json!([{"Arn": "a"}, {"Arn": "b"}]), &mut dst)
            .unwrap();
        assert_eq!(dst, json!({"arns": "a\nb"}));
    }

    #[test]
    fn test_rule_delimiter_overrides_options() {
        let mut dst = json!({"t": "start"});
        let r = rule("\"x\", \"y\"", ".t").with_delimiter(" | ");
        apply_to(&r, json!({}), &mut dst).unwrap();
        assert_eq!(dst, json!({"t": "start | x | y"}));
    }

    #[test]
    fn test_context_is_visible_as_variable() {
        let mut dst = json!({});
        apply(
            &rule(".name + $ctx.suffix", ".label"),
            &json!({"name": "n"}),
            &json!({"suffix": "-1"}),
            &mut dst,
            &JqEvaluator::new(),
            &MergeOptions::default(),
        )
        .unwrap();
        assert_eq!(dst, json!({"label": "n-1"}));
    }

    #[test]
    fn test_evaluator_errors_are_wrapped() {
        let failing = |_: &str, _: &Value, _: &Value| -> QueryResult<Vec<Value>> {
            Err(QueryError::evaluator("backend unavailable"))
        };
        let mut dst = json!({});
        let err = apply(
            &rule(".a", ".t"),
            &json!({}),
            &json!({}),
            &mut dst,
            &failing,
            &MergeOptions::default(),
        )
        .unwrap_err();
        match err {
            EtlError::ExpressionError { expression, source } => {
                assert_eq!(expression, ".a");
                assert_eq!(source.to_string(), "backend unavailable");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_from_value() {
        let parsed = MappingRule::from_value(
            &json!({"src": ".a", "dst": ".b", "mode": "Replace", "delimiter": "\\t"}),
            1,
        )
        .unwrap();
        assert_eq!(parsed.mode, MergeMode::Replace);
        assert_eq!(parsed.delimiter.as_deref(), Some("\t"));
        assert_eq!(parsed.destination_path.to_string(), ".b");

        for bad in [
            json!({"dst": ".b"}),
            json!({"src": ".a"}),
            json!({"src": ".a", "dst": ".b", "mode": "append"}),
            json!("not a rule"),
        ] {
            let err = MappingRule::from_value(&bad, 3).unwrap_err();
            assert!(matches!(err, EtlError::InvalidSpec { .. }), "{bad}");
            assert!(err.to_string().contains("rule 3"), "{err}");
        }
    }

    #[test]
    fn test_malformed_destination_is_invalid_path() {
        for dst in [".", ".a[*]", ".a[-1]", "a.b"] {
            let err = MappingRule::from_value(&json!({"src": ".a", "dst": dst}), 2).unwrap_err();
            assert_eq!(err.kind(), "InvalidPath", "{dst}");
            assert!(matches!(err.root_cause(), EtlError::InvalidPath { .. }));
            match &err {
                EtlError::Rule {
                    index, destination, ..
                } => {
                    assert_eq!(*index, 2);
                    assert_eq!(destination, dst);
                }
                other => panic!("unexpected error: {other}"),
            }
        }
    }
}
