//! Bundled jq evaluator
//!
//! Programs are parsed and compiled with `jaq-core` against the standard
//! library of `jaq-std` and `jaq-json`. The step context is bound to the
//! global variable `$ctx`.

use super::{QueryError, QueryEvaluator, QueryResult, ValueStream};
use crate::config::EngineConfig;
use jaq_core::compile::Undefined;
use jaq_core::load::{self, Arena, File, Loader};
use jaq_core::{Compiler, Ctx, Native, RcIter};
use jaq_json::Val;
use lru::LruCache;
use parking_lot::Mutex;
use serde_json::Value;
use std::num::NonZeroUsize;
use std::sync::Arc;

/// Name of the global variable holding the execution context
const CONTEXT_VAR: &str = "$ctx";

/// Compiled jq program
pub type Program = jaq_core::Filter<Native<Val>>;

/// Query evaluator backed by `jaq`
///
/// Compiled programs are kept in an LRU cache keyed by expression text, so a
/// rule evaluated once per chain step is only compiled once.
///
/// # Examples
///
/// ```rust
/// use jtl::query::{JqEvaluator, QueryEvaluator};
/// use serde_json::json;
///
/// let evaluator = JqEvaluator::new();
/// let input = json!({"items": [{"id": 1}, {"id": 2}]});
/// let ids: Vec<_> = evaluator
///     .evaluate(".items[].id", &input, &json!({}))
///     .unwrap()
///     .collect::<Result<_, _>>()
///     .unwrap();
/// assert_eq!(ids, vec![json!(1), json!(2)]);
/// ```
pub struct JqEvaluator {
    cache: Option<Mutex<LruCache<String, Arc<Program>>>>,
}

impl Default for JqEvaluator {
    fn default() -> Self {
        Self::new()
    }
}

impl JqEvaluator {
    /// Evaluator with default settings
    pub fn new() -> Self {
        Self::with_config(&EngineConfig::default())
    }

    /// Evaluator using the cache settings of `config`
    pub fn with_config(config: &EngineConfig) -> Self {
        let cache = NonZeroUsize::new(config.max_cache_size)
            .filter(|_| config.enable_query_cache)
            .map(|size| Mutex::new(LruCache::new(size)));
        Self { cache }
    }

    /// Compile `expression`, consulting the program cache first
    pub fn compile(&self, expression: &str) -> QueryResult<Arc<Program>> {
        let Some(cache) = &self.cache else {
            return compile_program(expression).map(Arc::new);
        };

        if let Some(program) = cache.lock().get(expression) {
            return Ok(Arc::clone(program));
        }

        let program = Arc::new(compile_program(expression)?);
        cache
            .lock()
            .put(expression.to_string(), Arc::clone(&program));
        log::trace!("cached query program for '{expression}'");
        Ok(program)
    }

    /// Number of programs currently cached
    pub fn cached_programs(&self) -> usize {
        self.cache.as_ref().map_or(0, |cache| cache.lock().len())
    }
}

impl QueryEvaluator for JqEvaluator {
    fn evaluate<'a>(
        &'a self,
        expression: &str,
        input: &'a Value,
        context: &'a Value,
    ) -> QueryResult<ValueStream<'a>> {
        let program = self.compile(expression)?;
        let inputs = RcIter::new(core::iter::empty());
        let ctx = Ctx::new([Val::from(context.clone())], &inputs);

        // the first error ends the stream
        let mut outputs = Vec::new();
        for output in program.run((ctx, Val::from(input.clone()))) {
            match output {
                Ok(value) => outputs.push(Ok(Value::from(value))),
                Err(err) => {
                    outputs.push(Err(QueryError::runtime(err.to_string())));
                    break;
                }
            }
        }
        log::trace!("'{expression}' produced {} item(s)", outputs.len());

        Ok(Box::new(outputs.into_iter()))
    }
}

fn compile_program(expression: &str) -> QueryResult<Program> {
    let loader = Loader::new(jaq_std::defs().chain(jaq_json::defs()));
    let arena = Arena::default();
    let file = File {
        code: expression,
        path: (),
    };

    let modules = loader
        .load(&arena, file)
        .map_err(|errors| load_error(expression, errors))?;

    Compiler::default()
        .with_funs(jaq_std::funs().chain(jaq_json::funs()))
        .with_global_vars([CONTEXT_VAR])
        .compile(modules)
        .map_err(|errors| {
            let first = errors.into_iter().flat_map(|(_, undefined)| undefined).next();
            compile_error(expression, first)
        })
}

fn load_error(code: &str, errors: load::Errors<&str, ()>) -> QueryError {
    for (_, error) in errors {
        let first = match error {
            load::Error::Lex(errors) => errors
                .into_iter()
                .next()
                .map(|(expected, found)| (expected.as_str().to_string(), found)),
            load::Error::Parse(errors) => errors
                .into_iter()
                .next()
                .map(|(expected, found)| (expected.as_str().to_string(), found)),
            load::Error::Io(errors) => {
                if let Some((module, message)) = errors.into_iter().next() {
                    return QueryError::evaluator(format!("cannot load '{module}': {message}"));
                }
                None
            }
        };
        if let Some((expected, found)) = first {
            let position = load::span(code, found).start;
            let message = if found.is_empty() {
                format!("expected {expected}, found end of input")
            } else {
                format!("expected {expected}")
            };
            return QueryError::syntax(position, message);
        }
    }
    QueryError::syntax(0, "invalid query")
}

fn compile_error(code: &str, first: Option<(&str, Undefined)>) -> QueryError {
    match first {
        Some((name, Undefined::Filter(arity))) => QueryError::UnknownFunction {
            name: name.to_string(),
            arity,
        },
        Some((name, Undefined::Var)) => QueryError::UnknownVariable {
            name: name.trim_start_matches('$').to_string(),
        },
        Some((name, other)) => QueryError::syntax(
            load::span(code, name).start,
            format!("undefined {} '{name}'", other.as_str()),
        ),
        None => QueryError::syntax(0, "invalid query"),
    }
}
