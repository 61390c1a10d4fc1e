//! Destination paths
//!
//! A [`Path`] is a concrete write target inside a JSON document: an ordered,
//! non-empty list of field and index accessors. Paths are parsed from the
//! jq-style text used in mapping rules (`.report.items[0]["display name"]`)
//! and resolve against `serde_json::Value` trees, creating intermediate
//! objects and arrays on demand.

pub mod parser;

use crate::error::{EtlError, Result};
use crate::merge::Shape;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use smallvec::SmallVec;
use std::fmt;
use std::str::FromStr;

/// One accessor in a destination path
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PathSegment {
    /// Object field access (`.name` or `["name"]`)
    Field(String),
    /// Array index access (`[3]`)
    Index(usize),
}

impl PathSegment {
    /// Empty container this accessor can be applied to
    fn empty_container(&self) -> Value {
        match self {
            PathSegment::Field(_) => Value::Object(Map::new()),
            PathSegment::Index(_) => Value::Array(Vec::new()),
        }
    }

    fn is_plain_identifier(name: &str) -> bool {
        let mut chars = name.chars();
        matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
            && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
    }
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathSegment::Field(name) if Self::is_plain_identifier(name) => write!(f, ".{name}"),
            PathSegment::Field(name) => {
                let quoted = serde_json::to_string(name).map_err(|_| fmt::Error)?;
                write!(f, "[{quoted}]")
            }
            PathSegment::Index(index) => write!(f, "[{index}]"),
        }
    }
}

/// A concrete, non-empty destination path
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Path {
    segments: SmallVec<[PathSegment; 4]>,
}

impl Path {
    /// Parse jq-style path text
    ///
    /// # Examples
    ///
    /// ```rust
    /// use jtl::path::{Path, PathSegment};
    ///
    /// let path = Path::parse(".a.b[2][\"c d\"]").unwrap();
    /// assert_eq!(path.segments()[2], PathSegment::Index(2));
    /// assert_eq!(path.to_string(), ".a.b[2][\"c d\"]");
    /// ```
    pub fn parse(text: &str) -> Result<Self> {
        let trimmed = text.trim();
        if !trimmed.starts_with('.') {
            return Err(EtlError::invalid_path(text, "destination path must start with '.'"));
        }
        if trimmed == "." {
            return Err(EtlError::invalid_path(
                text,
                "destination path must name at least one field or index",
            ));
        }

        let segments = parser::parse_segments(trimmed).map_err(|err| {
            EtlError::invalid_path(text, format!("{} (at offset {})", err.message, err.position))
        })?;
        Self::from_segments(segments)
    }

    /// Build a path from already-parsed segments
    pub fn from_segments(segments: impl IntoIterator<Item = PathSegment>) -> Result<Self> {
        let segments: SmallVec<[PathSegment; 4]> = segments.into_iter().collect();
        if segments.is_empty() {
            return Err(EtlError::invalid_path(
                "",
                "destination path must name at least one field or index",
            ));
        }
        Ok(Self { segments })
    }

    /// Path accessors in order
    pub fn segments(&self) -> &[PathSegment] {
        &self.segments
    }

    /// Number of accessors
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    /// Whether the path has no accessors
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Path extended by one more accessor
    pub fn child(&self, segment: PathSegment) -> Path {
        let mut segments = self.segments.clone();
        segments.push(segment);
        Path { segments }
    }

    /// Read the value at this path, if every accessor resolves
    pub fn get<'v>(&self, root: &'v Value) -> Option<&'v Value> {
        self.segments.iter().try_fold(root, |current, segment| match segment {
            PathSegment::Field(name) => current.as_object()?.get(name),
            PathSegment::Index(index) => current.as_array()?.get(*index),
        })
    }

    /// Walk to this path, creating missing intermediates, and store the value
    /// produced by `write`
    ///
    /// `write` receives the value currently at the final slot (`None` when
    /// the field does not exist yet; padded array slots show up as `null`).
    /// Missing or `null` intermediates become an object when the following
    /// accessor is a field and an array when it is an index. Arrays are
    /// padded with `null` up to the requested index.
    pub fn ensure_and_set<F>(&self, root: &mut Value, write: F) -> Result<()>
    where
        F: FnOnce(Option<&Value>) -> Result<Value>,
    {
        let last_depth = self.segments.len() - 1;
        let mut current = root;

        for depth in 0..last_depth {
            current = self.descend(current, depth)?;
        }

        match &self.segments[last_depth] {
            PathSegment::Field(name) => {
                let map = match current {
                    Value::Object(map) => map,
                    other => return Err(self.shape_error(last_depth, other)),
                };
                let value = write(map.get(name))?;
                map.insert(name.clone(), value);
            }
            PathSegment::Index(index) => {
                let items = match current {
                    Value::Array(items) => items,
                    other => return Err(self.shape_error(last_depth, other)),
                };
                if items.len() <= *index {
                    items.resize(*index + 1, Value::Null);
                }
                let value = write(Some(&items[*index]))?;
                items[*index] = value;
            }
        }

        Ok(())
    }

    fn descend<'v>(&self, current: &'v mut Value, depth: usize) -> Result<&'v mut Value> {
        let slot = match &self.segments[depth] {
            PathSegment::Field(name) => match current {
                Value::Object(map) => map.entry(name.clone()).or_insert(Value::Null),
                other => return Err(self.shape_error(depth, other)),
            },
            PathSegment::Index(index) => match current {
                Value::Array(items) => {
                    if items.len() <= *index {
                        items.resize(*index + 1, Value::Null);
                    }
                    &mut items[*index]
                }
                other => return Err(self.shape_error(depth, other)),
            },
        };

        if slot.is_null() {
            *slot = self.segments[depth + 1].empty_container();
        }
        Ok(slot)
    }

    fn shape_error(&self, depth: usize, found: &Value) -> EtlError {
        let prefix = self.prefix(depth);
        let message = match &self.segments[depth] {
            PathSegment::Field(name) => format!(
                "cannot access field '{name}' on {} at '{prefix}'",
                Shape::of(found).name()
            ),
            PathSegment::Index(index) => format!(
                "cannot index {} with [{index}] at '{prefix}'",
                Shape::of(found).name()
            ),
        };
        EtlError::invalid_path(self.to_string(), message)
    }

    /// Rendered path of the container the accessor at `depth` applies to
    fn prefix(&self, depth: usize) -> String {
        if depth == 0 {
            return ".".to_string();
        }
        self.segments[..depth].iter().map(|s| s.to_string()).collect()
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for segment in &self.segments {
            write!(f, "{segment}")?;
        }
        Ok(())
    }
}

impl FromStr for Path {
    type Err = EtlError;

    fn from_str(s: &str) -> Result<Self> {
        Path::parse(s)
    }
}

impl TryFrom<String> for Path {
    type Error = EtlError;

    fn try_from(value: String) -> Result<Self> {
        Path::parse(&value)
    }
}

impl From<Path> for String {
    fn from(path: Path) -> Self {
        path.to_string()
    }
}
