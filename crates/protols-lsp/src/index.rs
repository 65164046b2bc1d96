// Protols - Protocol Buffers Language Server
//
// Copyright (c) 2025 Protols contributors.
//
// SPDX-License-Identifier: Apache-2.0
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License in the LICENSE file at the
// root of this repository or at: http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Canonical path / URI index.
//!
//! Every schema file in the workspace is known to the compiler by its
//! canonical path: the Go import path of its package joined with the file's
//! base name, e.g. `github.com/acme/api/v1/user.proto`. The editor only knows
//! URIs. [`WorkspaceIndex`] keeps the two sides in a bijection.
//!
//! # Invariants
//!
//! - No two URIs map to the same canonical path.
//! - No two canonical paths map to the same URI.
//! - Inserting a pair evicts any stale pairing on either side.

use crate::error::IndexError;
use std::collections::HashMap;
use std::path::Path;
use tower_lsp::lsp_types::Url;

/// Bijective map between document URIs and canonical paths.
#[derive(Debug, Default, Clone)]
pub struct WorkspaceIndex {
    paths_by_uri: HashMap<Url, String>,
    uris_by_path: HashMap<String, Url>,
}

impl WorkspaceIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pairs `uri` with `path`, dropping whatever either was paired with.
    pub fn insert(&mut self, uri: Url, path: String) {
        if let Some(old_path) = self.paths_by_uri.remove(&uri) {
            self.uris_by_path.remove(&old_path);
        }
        if let Some(old_uri) = self.uris_by_path.remove(&path) {
            self.paths_by_uri.remove(&old_uri);
        }
        self.paths_by_uri.insert(uri.clone(), path.clone());
        self.uris_by_path.insert(path, uri);
    }

    /// Removes the pair containing `uri`, returning its path.
    pub fn remove_uri(&mut self, uri: &Url) -> Option<String> {
        let path = self.paths_by_uri.remove(uri)?;
        self.uris_by_path.remove(&path);
        Some(path)
    }

    /// Moves the path of `old` over to `new`. The canonical path itself is
    /// unchanged; only its URI is.
    pub fn rename(&mut self, old: &Url, new: Url) -> Result<String, IndexError> {
        let path = self
            .remove_uri(old)
            .ok_or_else(|| IndexError::UnknownUri(old.clone()))?;
        self.insert(new, path.clone());
        Ok(path)
    }

    pub fn path_for(&self, uri: &Url) -> Result<&str, IndexError> {
        self.paths_by_uri
            .get(uri)
            .map(String::as_str)
            .ok_or_else(|| IndexError::UnknownUri(uri.clone()))
    }

    pub fn uri_for(&self, path: &str) -> Result<&Url, IndexError> {
        self.uris_by_path
            .get(path)
            .ok_or_else(|| IndexError::UnknownPath(path.to_string()))
    }

    pub fn contains_path(&self, path: &str) -> bool {
        self.uris_by_path.contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.paths_by_uri.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths_by_uri.is_empty()
    }

    pub fn clear(&mut self) {
        self.paths_by_uri.clear();
        self.uris_by_path.clear();
    }

    /// All indexed canonical paths, sorted.
    pub fn paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self.uris_by_path.keys().cloned().collect();
        paths.sort();
        paths
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Url, &str)> {
        self.paths_by_uri.iter().map(|(u, p)| (u, p.as_str()))
    }
}

/// Finds the import path from `option go_package = "...";`.
///
/// This is a line scan, not a parse, so it works on files that do not
/// compile. Anything after `;` in the value (the Go package name override)
/// is dropped.
pub fn go_package(text: &str) -> Option<&str> {
    for line in text.lines() {
        let rest = line.trim_start();
        let Some(rest) = rest.strip_prefix("option") else {
            continue;
        };
        let Some(rest) = rest.trim_start().strip_prefix("go_package") else {
            continue;
        };
        let Some(rest) = rest.trim_start().strip_prefix('=') else {
            continue;
        };
        let rest = rest.trim_start();
        let quote = rest.chars().next().filter(|c| *c == '"' || *c == '\'')?;
        let value = &rest[1..];
        let end = value.find(quote)?;
        let value = &value[..end];
        let value = value.split(';').next().unwrap_or(value).trim();
        return (!value.is_empty()).then_some(value);
    }
    None
}

/// Canonical path of the schema at `file` with contents `text`.
pub fn canonical_path(file: &Path, text: &str) -> Option<String> {
    let package = go_package(text)?;
    let base = file.file_name()?.to_str()?;
    Some(format!("{}/{}", package.trim_end_matches('/'), base))
}

/// Canonical path for a document URI, derived from its contents.
pub fn canonical_path_for_uri(uri: &Url, text: &str) -> Result<String, IndexError> {
    let file = uri.to_file_path().map_err(|_| IndexError::NotIndexable {
        uri: uri.clone(),
        reason: "not a file URI".to_string(),
    })?;
    canonical_path(&file, text).ok_or_else(|| IndexError::NotIndexable {
        uri: uri.clone(),
        reason: "no go_package option".to_string(),
    })
}
