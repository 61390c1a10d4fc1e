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

//! Chain specification model
//!
//! ```json
//! {
//!   "ctx": {"account": "prod"},
//!   "steps": [
//!     {"etl": "normalize.json", "src": "raw.json"},
//!     {"etl": "finding.json", "src": "$prev", "ctx": {"preamble": "..."},
//!      "options": {"delimiter": "\\n\\n"}}
//!   ]
//! }
//! ```

use crate::config::decode_escapes;
use crate::error::{EtlError, Result};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

/// Token that refers to the previous step's output
pub const FORWARD_TOKEN: &str = "$prev";

/// Where a step reads a document from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentRef {
    /// Output of the previous step
    Forward,
    /// Document resolved through the loader
    Named(String),
}

impl DocumentRef {
    /// Classify a reference string
    pub fn parse(reference: &str) -> Self {
        if reference == FORWARD_TOKEN {
            DocumentRef::Forward
        } else {
            DocumentRef::Named(reference.to_string())
        }
    }

    /// Whether this is the forwarding token
    pub fn is_forward(&self) -> bool {
        matches!(self, DocumentRef::Forward)
    }
}

impl fmt::Display for DocumentRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocumentRef::Forward => f.write_str(FORWARD_TOKEN),
            DocumentRef::Named(name) => f.write_str(name),
        }
    }
}

/// One step of a chain
#[derive(Debug, Clone, PartialEq)]
pub struct ChainStep {
    /// Reference of the ETL spec to apply
    pub etl: String,
    /// Source document
    pub source: DocumentRef,
    /// Destination seed; `None` starts from `{}`
    pub destination: Option<DocumentRef>,
    /// Step-level context, highest precedence
    pub context: Map<String, Value>,
    /// Step delimiter, overriding the engine default
    pub delimiter: Option<String>,
}

impl ChainStep {
    /// Step applying `etl` to `source`
    pub fn new(etl: impl Into<String>, source: DocumentRef) -> Self {
        Self {
            etl: etl.into(),
            source,
            destination: None,
            context: Map::new(),
            delimiter: None,
        }
    }

    /// Seed the step's destination from `destination`
    pub fn with_destination(mut self, destination: DocumentRef) -> Self {
        self.destination = Some(destination);
        self
    }

    /// Set step context
    pub fn with_context(mut self, context: Map<String, Value>) -> Self {
        self.context = context;
        self
    }

    /// Set the step delimiter
    pub fn with_delimiter(mut self, delimiter: impl Into<String>) -> Self {
        self.delimiter = Some(delimiter.into());
        self
    }
}

/// Ordered chain steps plus chain-level context
#[derive(Debug, Clone, PartialEq)]
pub struct ChainSpec {
    /// Chain-level context, lowest precedence
    pub context: Map<String, Value>,
    /// Steps, executed in order
    pub steps: Vec<ChainStep>,
}

#[derive(Debug, Deserialize)]
struct RawChain {
    #[serde(default)]
    ctx: Option<Map<String, Value>>,
    steps: Vec<RawStep>,
}

#[derive(Debug, Deserialize)]
struct RawStep {
    etl: String,
    src: String,
    #[serde(default)]
    dst: Option<String>,
    #[serde(default)]
    ctx: Option<Map<String, Value>>,
    #[serde(default)]
    options: Option<RawOptions>,
}

#[derive(Debug, Default, Deserialize)]
struct RawOptions {
    #[serde(default)]
    delimiter: Option<String>,
}

impl ChainSpec {
    /// Chain over `steps` with no chain-level context
    pub fn new(steps: Vec<ChainStep>) -> Self {
        Self {
            context: Map::new(),
            steps,
        }
    }

    /// Set chain-level context
    pub fn with_context(mut self, context: Map<String, Value>) -> Self {
        self.context = context;
        self
    }

    /// Parse `{"ctx"?, "steps": [...]}`
    pub fn from_value(value: &Value) -> Result<Self> {
        if !value.is_object() {
            return Err(EtlError::invalid_spec("chain spec must be a JSON object"));
        }
        let raw = RawChain::deserialize(value)
            .map_err(|err| EtlError::invalid_spec(format!("chain spec: {err}")))?;
        if raw.steps.is_empty() {
            return Err(EtlError::invalid_spec("chain spec: 'steps' must not be empty"));
        }

        let steps = raw
            .steps
            .into_iter()
            .map(|step| ChainStep {
                etl: step.etl,
                source: DocumentRef::parse(&step.src),
                destination: step.dst.as_deref().map(DocumentRef::parse),
                context: step.ctx.unwrap_or_default(),
                delimiter: step
                    .options
                    .unwrap_or_default()
                    .delimiter
                    .as_deref()
                    .map(decode_escapes),
            })
            .collect();

        Ok(Self {
            context: raw.ctx.unwrap_or_default(),
            steps,
        })
    }
}

impl FromStr for ChainSpec {
    type Err = EtlError;

    fn from_str(text: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(text).map_err(|source| EtlError::Json {
            reference: "<chain spec>".to_string(),
            source,
        })?;
        Self::from_value(&value)
    }
}
