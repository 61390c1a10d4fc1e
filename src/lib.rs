//! Declarative JSON-to-JSON mapping
//!
//! Mapping rules pair a query expression evaluated against a source document
//! with a destination path in a target document. Results are written through
//! a merge engine that either replaces the destination slot or upserts into
//! it (string concatenation, array append, recursive object merge). ETL
//! specs group rules with context; chains run several specs in sequence,
//! forwarding each step's output to the next.
//!
//! ```rust
//! use jtl::{Engine, EtlSpec};
//! use serde_json::json;
//!
//! let spec: EtlSpec = r#"[
//!     {"ctx": {"env": "prod"}},
//!     {"src": ".user.name", "dst": ".owner"},
//!     {"src": "$ctx.env", "dst": ".labels.env"}
//! ]"#.parse().unwrap();
//!
//! let out = Engine::new()
//!     .run_etl(&spec, &json!({"user": {"name": "ada"}}), None)
//!     .unwrap();
//! assert_eq!(out, json!({"owner": "ada", "labels": {"env": "prod"}}));
//! ```

pub mod chain;
pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod etl;
pub mod mapping;
pub mod merge;
pub mod path;
pub mod query;

pub use chain::{
    ChainOrchestrator, ChainOutcome, ChainSpec, ChainStep, DocumentLoader, DocumentRef,
    FsDocumentLoader, MemoryDocumentLoader,
};
pub use config::EngineConfig;
pub use context::ExecutionContext;
pub use engine::Engine;
pub use error::{EtlError, Result};
pub use etl::{EtlRunner, EtlSpec};
pub use mapping::MappingRule;
pub use merge::{MergeMode, MergeOptions};
pub use path::{Path, PathSegment};
pub use query::{JqEvaluator, QueryError, QueryEvaluator};
