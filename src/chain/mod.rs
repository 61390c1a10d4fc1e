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

//! Multi-step chain execution
//!
//! A chain runs ETL specs one after another. Each step reads its source
//! either through a [`DocumentLoader`] or from the previous step's output
//! (`"$prev"`), and may seed its destination the same way. The previous
//! output is passed from step to step explicitly; the orchestrator keeps no
//! state between runs.

pub mod loader;
pub mod spec;

pub use loader::{DocumentLoader, FsDocumentLoader, MemoryDocumentLoader};
pub use spec::{ChainSpec, ChainStep, DocumentRef, FORWARD_TOKEN};

use crate::context::resolve;
use crate::error::{EtlError, Result};
use crate::etl::{EtlRunner, EtlSpec};
use crate::merge::MergeOptions;
use crate::query::QueryEvaluator;
use serde_json::{Map, Value};

/// Outputs of every step of a chain run
#[derive(Debug, Clone, PartialEq)]
pub struct ChainOutcome {
    /// One output per step, in order
    pub outputs: Vec<Value>,
}

impl ChainOutcome {
    /// Output of the last step
    pub fn final_output(&self) -> Option<&Value> {
        self.outputs.last()
    }

    /// Take the last step's output
    pub fn into_final(self) -> Option<Value> {
        self.outputs.into_iter().last()
    }
}

/// Runs chain specs
pub struct ChainOrchestrator<'a> {
    loader: &'a dyn DocumentLoader,
    evaluator: &'a dyn QueryEvaluator,
    options: MergeOptions,
}

impl<'a> ChainOrchestrator<'a> {
    /// Orchestrator resolving documents through `loader`
    pub fn new(
        loader: &'a dyn DocumentLoader,
        evaluator: &'a dyn QueryEvaluator,
        options: MergeOptions,
    ) -> Self {
        Self {
            loader,
            evaluator,
            options,
        }
    }

    /// Execute every step of `spec` in order
    ///
    /// Fails on the first step error; no partial outcome is returned.
    pub fn run(&self, spec: &ChainSpec) -> Result<ChainOutcome> {
        log::info!("running chain of {} step(s)", spec.steps.len());

        let mut previous: Option<Value> = None;
        let mut outputs = Vec::with_capacity(spec.steps.len());

        for (at, step) in spec.steps.iter().enumerate() {
            let index = at + 1;
            let output = self
                .run_step(index, step, &spec.context, previous.as_ref())
                .map_err(|err| EtlError::Step {
                    index,
                    etl: step.etl.clone(),
                    source: Box::new(err),
                })?;
            outputs.push(output.clone());
            previous = Some(output);
        }

        log::info!("chain finished");
        Ok(ChainOutcome { outputs })
    }

    fn run_step(
        &self,
        index: usize,
        step: &ChainStep,
        chain_context: &Map<String, Value>,
        previous: Option<&Value>,
    ) -> Result<Value> {
        log::debug!("step {index}: etl '{}', src '{}'", step.etl, step.source);

        let etl_document = self.loader.load(&step.etl)?.ok_or_else(|| {
            EtlError::invalid_reference(index, format!("ETL spec '{}' not found", step.etl))
        })?;
        let etl = EtlSpec::from_value(&etl_document)?;

        let loaded_source;
        let source = match &step.source {
            DocumentRef::Forward => forwarded(index, "src", previous)?,
            DocumentRef::Named(reference) => {
                loaded_source = self.loader.load(reference)?.ok_or_else(|| {
                    EtlError::invalid_reference(
                        index,
                        format!("source document '{reference}' not found"),
                    )
                })?;
                &loaded_source
            }
        };

        let seed = match &step.destination {
            None => None,
            Some(DocumentRef::Forward) => Some(forwarded(index, "dst", previous)?.clone()),
            Some(DocumentRef::Named(reference)) => self.loader.load(reference)?,
        };

        let context = resolve(Some(chain_context), Some(&etl.context), Some(&step.context));
        let options = match &step.delimiter {
            Some(delimiter) => self.options.with_delimiter(delimiter.clone()),
            None => self.options.clone(),
        };

        EtlRunner::new(self.evaluator, options).run(&etl, source, seed.as_ref(), &context)
    }
}

fn forwarded<'v>(index: usize, field: &str, previous: Option<&'v Value>) -> Result<&'v Value> {
    previous.ok_or_else(|| {
        EtlError::invalid_reference(
            index,
            format!("{field} '{FORWARD_TOKEN}' used but no previous output exists"),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::JqEvaluator;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn orchestrate(loader: &MemoryDocumentLoader, spec: &ChainSpec) -> Result<ChainOutcome> {
        let evaluator = JqEvaluator::new();
        ChainOrchestrator::new(loader, &evaluator, MergeOptions::default()).run(spec)
    }

    #[test]
    fn test_forwarding_threads_previous_output() {
        let loader = MemoryDocumentLoader::new()
            .with_document("in", json!({"n": 2}))
            .with_document("double", json!([{"src": ".n * 2", "dst": ".n"}]));
        let spec = ChainSpec::new(vec![
            ChainStep::new("double", DocumentRef::parse("in")),
            ChainStep::new("double", DocumentRef::Forward),
        ]);

        let outcome = orchestrate(&loader, &spec).unwrap();
        assert_eq!(outcome.outputs, vec![json!({"n": 4}), json!({"n": 8})]);
        assert_eq!(outcome.into_final(), Some(json!({"n": 8})));
    }

    #[test]
    fn test_forward_destination_seeds_from_previous() {
        let loader = MemoryDocumentLoader::new()
            .with_document("in", json!({"a": "x", "b": "y"}))
            .with_document("a", json!([{"src": ".a", "dst": ".out"}]))
            .with_document("b", json!([{"src": ".b", "dst": ".out"}]));
        let spec = ChainSpec::new(vec![
            ChainStep::new("a", DocumentRef::parse("in")),
            ChainStep::new("b", DocumentRef::parse("in")).with_destination(DocumentRef::Forward),
        ]);

        let outcome = orchestrate(&loader, &spec).unwrap();
        assert_eq!(outcome.final_output(), Some(&json!({"out": "x\ny"})));
    }

    #[test]
    fn test_missing_destination_starts_empty() {
        let loader = MemoryDocumentLoader::new()
            .with_document("in", json!({"a": 1}))
            .with_document("etl", json!([{"src": ".a", "dst": ".a"}]));
        let spec = ChainSpec::new(vec![
            ChainStep::new("etl", DocumentRef::parse("in"))
                .with_destination(DocumentRef::parse("nowhere")),
        ]);
        assert_eq!(orchestrate(&loader, &spec).unwrap().outputs, vec![json!({"a": 1})]);
    }

    #[test]
    fn test_forward_in_first_step_is_invalid_reference() {
        let loader = MemoryDocumentLoader::new().with_document("etl", json!([]));
        let spec = ChainSpec::new(vec![ChainStep::new("etl", DocumentRef::Forward)]);

        let err = orchestrate(&loader, &spec).unwrap_err();
        assert!(matches!(err, EtlError::Step { index: 1, .. }));
        assert!(matches!(
            err.root_cause(),
            EtlError::InvalidChainReference { step: 1, .. }
        ));
    }

    #[test]
    fn test_missing_documents_are_invalid_references() {
        let loader = MemoryDocumentLoader::new().with_document("etl", json!([]));
        for step in [
            ChainStep::new("etl", DocumentRef::parse("absent")),
            ChainStep::new("absent", DocumentRef::parse("etl")),
        ] {
            let err = orchestrate(&loader, &ChainSpec::new(vec![step])).unwrap_err();
            assert_eq!(err.kind(), "InvalidChainReference");
        }
    }

    #[test]
    fn test_step_delimiter_and_context() {
        let loader = MemoryDocumentLoader::new()
            .with_document("in", json!({"v": "b"}))
            .with_document("seed", json!({"t": "a"}))
            .with_document(
                "etl",
                json!({"ctx": {"tag": "etl"}, "mappings": [
                    {"src": ".v", "dst": ".t"},
                    {"src": "$ctx.tag", "dst": ".tag"}
                ]}),
            );
        let step_ctx = json!({"tag": "step"}).as_object().cloned().unwrap();
        let spec = ChainSpec::new(vec![
            ChainStep::new("etl", DocumentRef::parse("in"))
                .with_destination(DocumentRef::parse("seed"))
                .with_delimiter(", ")
                .with_context(step_ctx),
        ]);

        let outcome = orchestrate(&loader, &spec).unwrap();
        assert_eq!(outcome.final_output(), Some(&json!({"t": "a, b", "tag": "step"})));
    }
}
