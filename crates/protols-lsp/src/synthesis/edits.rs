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

//! Learned import path rewrites.
//!
//! When a recovered descriptor declares `github.com/acme/api/v1/foo.proto`
//! but was imported as `acme/api/v1/foo.proto`, the difference between the
//! two directories is kept as a single-hunk [`EditScript`]. A later import
//! of a sibling such as `acme/api/v1/bar.proto` can then be mapped back to
//! the name its descriptor most likely declares before the synthesizer
//! scans the package directory.
//!
//! A differing file name (`pkg/old.proto` imported as `pkg/new.proto`) is
//! kept apart from the directory hunk. It only predicts the declared name
//! of that one file, while the directory hunk still carries over to its
//! siblings.

use serde::{Deserialize, Serialize};

/// Which imports a learned rewrite may be applied to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RewriteScope {
    /// Only imports in the same directory as the import that taught it.
    #[default]
    SameParent,
    /// Any import.
    Global,
}

/// Replace `delete` at byte offset `start` with `insert`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditScript {
    pub start: usize,
    pub delete: String,
    pub insert: String,
}

impl EditScript {
    /// The single hunk turning `from` into `to`: everything between their
    /// longest common prefix and longest common suffix.
    pub fn between(from: &str, to: &str) -> Self {
        let prefix = common_prefix(from, to);
        let suffix = common_suffix(&from[prefix..], &to[prefix..]);
        Self {
            start: prefix,
            delete: from[prefix..from.len() - suffix].to_string(),
            insert: to[prefix..to.len() - suffix].to_string(),
        }
    }

    pub fn is_identity(&self) -> bool {
        self.delete == self.insert
    }

    /// Applies the hunk to `input`, or `None` if `input` does not hold the
    /// deleted text at the hunk's offset.
    pub fn apply(&self, input: &str) -> Option<String> {
        let end = self.start.checked_add(self.delete.len())?;
        if input.get(self.start..end)? != self.delete {
            return None;
        }
        let mut out = String::with_capacity(input.len() + self.insert.len());
        out.push_str(&input[..self.start]);
        out.push_str(&self.insert);
        out.push_str(&input[end..]);
        Some(out)
    }

    /// The hunk turning `to` back into `from`.
    pub fn invert(&self) -> Self {
        Self {
            start: self.start,
            delete: self.insert.clone(),
            insert: self.delete.clone(),
        }
    }
}

fn common_prefix(a: &str, b: &str) -> usize {
    a.char_indices()
        .zip(b.chars())
        .find(|((_, ca), cb)| ca != cb)
        .map_or_else(|| a.len().min(b.len()), |((i, _), _)| i)
}

fn common_suffix(a: &str, b: &str) -> usize {
    a.chars()
        .rev()
        .zip(b.chars().rev())
        .take_while(|(ca, cb)| ca == cb)
        .map(|(c, _)| c.len_utf8())
        .sum()
}

/// Parent directory of an import path, `""` for a bare file name.
pub fn parent(path: &str) -> &str {
    path.rsplit_once('/').map_or("", |(dir, _)| dir)
}

/// File name of an import path.
pub fn file_name(path: &str) -> &str {
    path.rsplit_once('/').map_or(path, |(_, file)| file)
}

fn join(dir: &str, file: &str) -> String {
    if dir.is_empty() {
        file.to_string()
    } else {
        format!("{dir}/{file}")
    }
}

/// A rewrite observed once: a descriptor declared as one name was imported
/// as another.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LearnedRewrite {
    /// Declared directory to requested directory.
    pub script: EditScript,
    /// Declared and requested file names, when they differ.
    pub renamed: Option<(String, String)>,
    /// Directory of the import that taught the rewrite.
    pub origin_parent: String,
}

impl LearnedRewrite {
    pub fn learn(declared: &str, requested: &str) -> Self {
        let (from, to) = (file_name(declared), file_name(requested));
        Self {
            script: EditScript::between(parent(declared), parent(requested)),
            renamed: (from != to).then(|| (from.to_string(), to.to_string())),
            origin_parent: parent(requested).to_string(),
        }
    }

    pub fn is_identity(&self) -> bool {
        self.script.is_identity() && self.renamed.is_none()
    }

    pub fn applies_to(&self, request: &str, scope: RewriteScope) -> bool {
        match scope {
            RewriteScope::Global => true,
            RewriteScope::SameParent => parent(request) == self.origin_parent,
        }
    }

    /// The name a descriptor imported as `request` most likely declares.
    pub fn predict_declared(&self, request: &str) -> Option<String> {
        let dir = self.script.invert().apply(parent(request))?;
        let file = match &self.renamed {
            Some((declared, requested)) if requested == file_name(request) => declared.as_str(),
            _ => file_name(request),
        };
        Some(join(&dir, file))
    }
}
