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

//! Document loading for chain steps

use crate::error::{EtlError, Result};
use rustc_hash::FxHashMap;
use serde_json::Value;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Resolves document references (ETL specs, sources, seeds) to JSON values
pub trait DocumentLoader: Send + Sync {
    /// Load `reference`; `Ok(None)` when the document does not exist
    fn load(&self, reference: &str) -> Result<Option<Value>>;
}

/// Loads JSON files relative to a base directory
#[derive(Debug, Clone)]
pub struct FsDocumentLoader {
    base_dir: PathBuf,
}

impl FsDocumentLoader {
    /// Loader resolving relative references against `base_dir`
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    /// Loader for the directory containing `file`
    pub fn for_file(file: impl AsRef<Path>) -> Self {
        let dir = file
            .as_ref()
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        Self::new(dir)
    }

    /// Base directory
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Absolute references are used as is
    pub fn resolve(&self, reference: &str) -> PathBuf {
        let path = Path::new(reference);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }
}

impl DocumentLoader for FsDocumentLoader {
    fn load(&self, reference: &str) -> Result<Option<Value>> {
        let path = self.resolve(reference);
        let text = match std::fs::read_to_string(&path) {
            Ok(text) => text,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                log::debug!("document '{}' not found", path.display());
                return Ok(None);
            }
            Err(source) => {
                return Err(EtlError::Io {
                    reference: path.display().to_string(),
                    source,
                });
            }
        };

        serde_json::from_str(&text)
            .map(Some)
            .map_err(|source| EtlError::Json {
                reference: path.display().to_string(),
                source,
            })
    }
}

/// Keeps named documents in memory
#[derive(Debug, Clone, Default)]
pub struct MemoryDocumentLoader {
    documents: FxHashMap<String, Value>,
}

impl MemoryDocumentLoader {
    /// Empty loader
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `document` under `reference`, replacing any previous one
    pub fn insert(&mut self, reference: impl Into<String>, document: Value) {
        self.documents.insert(reference.into(), document);
    }

    /// Builder form of [`insert`](Self::insert)
    pub fn with_document(mut self, reference: impl Into<String>, document: Value) -> Self {
        self.insert(reference, document);
        self
    }
}

impl DocumentLoader for MemoryDocumentLoader {
    fn load(&self, reference: &str) -> Result<Option<Value>> {
        Ok(self.documents.get(reference).cloned())
    }
}
