//! ETL engine - the main entry point for applying mappings and chains

use crate::chain::{ChainOrchestrator, ChainOutcome, ChainSpec, DocumentLoader, FsDocumentLoader};
use crate::config::EngineConfig;
use crate::context::resolve;
use crate::error::{EtlError, Result};
use crate::etl::{EtlRunner, EtlSpec};
use crate::query::{JqEvaluator, QueryEvaluator};
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;

/// Main engine bundling configuration with a query evaluator
///
/// # Examples
///
/// ```rust
/// use jtl::{Engine, EtlSpec};
/// use serde_json::json;
///
/// let engine = Engine::new();
/// let spec = EtlSpec::from_value(&json!([
///     {"src": ".items[].name", "dst": ".names"}
/// ])).unwrap();
/// let out = engine
///     .run_etl(&spec, &json!({"items": [{"name": "a"}, {"name": "b"}]}), None)
///     .unwrap();
/// assert_eq!(out, json!({"names": "a\nb"}));
/// ```
#[derive(Clone)]
pub struct Engine {
    config: EngineConfig,
    evaluator: Arc<dyn QueryEvaluator>,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine {
    /// Engine with default configuration and the bundled evaluator
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    /// Engine with `config` and the bundled evaluator
    pub fn with_config(config: EngineConfig) -> Self {
        let evaluator = Arc::new(JqEvaluator::with_config(&config));
        Self { config, evaluator }
    }

    /// Replace the query evaluator
    pub fn with_evaluator(mut self, evaluator: Arc<dyn QueryEvaluator>) -> Self {
        self.evaluator = evaluator;
        self
    }

    /// Active configuration
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Active query evaluator
    pub fn evaluator(&self) -> &dyn QueryEvaluator {
        self.evaluator.as_ref()
    }

    /// Apply a single ETL spec to `source`, starting from `seed` or `{}`
    ///
    /// The spec's own context is the only context layer.
    pub fn run_etl(&self, spec: &EtlSpec, source: &Value, seed: Option<&Value>) -> Result<Value> {
        let context = resolve(None, Some(&spec.context), None);
        EtlRunner::new(self.evaluator(), self.config.merge_options())
            .run(spec, source, seed, &context)
    }

    /// Run a chain, resolving documents through `loader`
    pub fn run_chain(&self, spec: &ChainSpec, loader: &dyn DocumentLoader) -> Result<ChainOutcome> {
        ChainOrchestrator::new(loader, self.evaluator(), self.config.merge_options()).run(spec)
    }

    /// Load a chain file and run it with references relative to its directory
    pub fn run_chain_file(&self, path: impl AsRef<Path>) -> Result<ChainOutcome> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| EtlError::Io {
            reference: path.display().to_string(),
            source,
        })?;
        let document: Value = serde_json::from_str(&text).map_err(|source| EtlError::Json {
            reference: path.display().to_string(),
            source,
        })?;
        let spec = ChainSpec::from_value(&document)?;
        log::debug!("loaded chain '{}'", path.display());

        self.run_chain(&spec, &FsDocumentLoader::for_file(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::MemoryDocumentLoader;
    use crate::query::QueryResult;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_config_delimiter_is_used() {
        let engine = Engine::with_config(EngineConfig::default().with_delimiter(" | "));
        let spec = EtlSpec::from_value(&json!([{"src": "\"x\"", "dst": ".t"}])).unwrap();
        let out = engine
            .run_etl(&spec, &json!({}), Some(&json!({"t": "start"})))
            .unwrap();
        assert_eq!(out, json!({"t": "start | x"}));
    }

    #[test]
    fn test_custom_evaluator() {
        let fake = |expression: &str, _: &Value, _: &Value| -> QueryResult<Vec<Value>> {
            Ok(vec![json!(expression.len())])
        };
        let engine = Engine::new().with_evaluator(Arc::new(fake));
        let spec = EtlSpec::from_value(&json!([{"src": "abc", "dst": ".n"}])).unwrap();
        assert_eq!(engine.run_etl(&spec, &json!(null), None).unwrap(), json!({"n": 3}));
    }

    #[test]
    fn test_run_chain_with_memory_loader() {
        let loader = MemoryDocumentLoader::new()
            .with_document("src", json!({"id": 1}))
            .with_document("etl", json!([{"src": ".id", "dst": ".id"}]));
        let spec: ChainSpec = r#"{"steps": [{"etl": "etl", "src": "src"}]}"#.parse().unwrap();
        let outcome = Engine::new().run_chain(&spec, &loader).unwrap();
        assert_eq!(outcome.final_output(), Some(&json!({"id": 1})));
    }

    #[test]
    fn test_missing_chain_file_is_io_error() {
        let err = Engine::new().run_chain_file("/definitely/not/here.json").unwrap_err();
        assert_eq!(err.kind(), "Io");
    }
}
