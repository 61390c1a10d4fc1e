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

//! Merge engine
//!
//! Decides what a destination slot holds after a mapping rule writes to it.
//! `Replace` overwrites. `Upsert` dispatches on the shapes of the existing
//! and incoming values:
//!
//! | existing        | incoming       | result                                  |
//! |-----------------|----------------|-----------------------------------------|
//! | absent / `null` | any            | incoming                                |
//! | string          | string         | `existing + delimiter + incoming`       |
//! | array           | array          | existing followed by incoming elements  |
//! | array           | anything else  | incoming appended as one element        |
//! | object          | object         | recursive deep merge with these rules   |
//! | number/boolean  | same shape     | incoming (last write wins)              |
//! | anything else   |                | `MergeTypeConflict`                     |
//!
//! String appends always insert the delimiter, empty operands included.

use crate::config::DEFAULT_DELIMITER;
use crate::error::{EtlError, Result};
use crate::path::{Path, PathSegment};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

/// How a rule's result is written into the destination
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MergeMode {
    /// Shape-aware additive merge
    #[default]
    Upsert,
    /// Unconditional overwrite
    Replace,
}

impl FromStr for MergeMode {
    type Err = EtlError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "upsert" => Ok(MergeMode::Upsert),
            "replace" => Ok(MergeMode::Replace),
            _ => Err(EtlError::invalid_spec(format!("Unsupported mode: {s}"))),
        }
    }
}

impl fmt::Display for MergeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MergeMode::Upsert => write!(f, "upsert"),
            MergeMode::Replace => write!(f, "replace"),
        }
    }
}

/// Runtime shape of a JSON value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    /// `null`
    Null,
    /// `true` / `false`
    Boolean,
    /// Any JSON number
    Number,
    /// String
    String,
    /// Array
    Array,
    /// Object
    Object,
}

impl Shape {
    /// Shape of a value
    pub fn of(value: &Value) -> Self {
        match value {
            Value::Null => Shape::Null,
            Value::Bool(_) => Shape::Boolean,
            Value::Number(_) => Shape::Number,
            Value::String(_) => Shape::String,
            Value::Array(_) => Shape::Array,
            Value::Object(_) => Shape::Object,
        }
    }

    /// Lower-case name used in messages
    pub fn name(self) -> &'static str {
        match self {
            Shape::Null => "null",
            Shape::Boolean => "boolean",
            Shape::Number => "number",
            Shape::String => "string",
            Shape::Array => "array",
            Shape::Object => "object",
        }
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Tunables for the merge algebra
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeOptions {
    /// Placed between concatenated strings
    pub delimiter: String,
}

impl MergeOptions {
    /// Options with the given delimiter
    pub fn new(delimiter: impl Into<String>) -> Self {
        Self {
            delimiter: delimiter.into(),
        }
    }

    /// Same options with a different delimiter
    pub fn with_delimiter(&self, delimiter: impl Into<String>) -> Self {
        Self {
            delimiter: delimiter.into(),
        }
    }
}

impl Default for MergeOptions {
    fn default() -> Self {
        Self::new(DEFAULT_DELIMITER)
    }
}

/// Merge `incoming` into the value currently at `path`
///
/// `existing` is `None` when the slot does not exist; an existing `null` is
/// treated the same way.
pub fn merge(
    existing: Option<&Value>,
    incoming: Value,
    mode: MergeMode,
    path: &Path,
    options: &MergeOptions,
) -> Result<Value> {
    match mode {
        MergeMode::Replace => Ok(incoming),
        MergeMode::Upsert => upsert(existing, incoming, path, options),
    }
}

fn upsert(
    existing: Option<&Value>,
    incoming: Value,
    path: &Path,
    options: &MergeOptions,
) -> Result<Value> {
    let Some(existing) = existing.filter(|value| !value.is_null()) else {
        return Ok(incoming);
    };

    match (existing, incoming) {
        (Value::String(current), Value::String(next)) => {
            Ok(Value::String(append_string(current, next, &options.delimiter)))
        }
        (Value::Array(current), Value::Array(next)) => {
            let mut items = Vec::with_capacity(current.len() + next.len());
            items.extend(current.iter().cloned());
            items.extend(next);
            Ok(Value::Array(items))
        }
        (Value::Array(current), next) => {
            let mut items = current.clone();
            items.push(next);
            Ok(Value::Array(items))
        }
        (Value::Object(current), Value::Object(next)) => {
            deep_merge(current, next, path, options).map(Value::Object)
        }
        (current, next) if Shape::of(current) == Shape::of(&next) => Ok(next),
        (current, next) => Err(EtlError::MergeTypeConflict {
            path: path.to_string(),
            existing: Shape::of(current).name(),
            incoming: Shape::of(&next).name(),
        }),
    }
}

fn append_string(current: &str, next: String, delimiter: &str) -> String {
    let mut joined = String::with_capacity(current.len() + delimiter.len() + next.len());
    joined.push_str(current);
    joined.push_str(delimiter);
    joined.push_str(&next);
    joined
}

fn deep_merge(
    current: &Map<String, Value>,
    next: Map<String, Value>,
    path: &Path,
    options: &MergeOptions,
) -> Result<Map<String, Value>> {
    let mut merged = current.clone();
    for (key, value) in next {
        let child = path.child(PathSegment::Field(key.clone()));
        let combined = upsert(merged.get(&key), value, &child, options)?;
        merged.insert(key, combined);
    }
    Ok(merged)
}
