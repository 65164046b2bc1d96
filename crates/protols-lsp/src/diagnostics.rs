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

//! Per-file diagnostic lists for pull diagnostics.
//!
//! The compiler reports problems through the [`Reporter`] implementation
//! on [`DiagnosticManager`]. Each file's list carries a `resultId` that is
//! replaced on every mutation (add or clear) and only on mutation, so a
//! client that sends back the id it last saw can be told "unchanged"
//! without receiving the list again.
//!
//! # Ordering
//!
//! The cache clears a file's list from the compiler's pre-invalidate hook,
//! which runs before any of that compile's errors are reported. A reader
//! therefore never sees diagnostics from two compiles of one file mixed
//! in a single list.

use crate::constants::DIAGNOSTIC_SOURCE;
use crate::utils::span_to_range;
use dashmap::DashMap;
use protols_compiler::{ErrorKind, ErrorWithPos, Reporter, Severity, SourceSpan};
use std::sync::atomic::{AtomicU64, Ordering};
use tower_lsp::lsp_types::{Diagnostic, DiagnosticSeverity, DiagnosticTag, NumberOrString};
use tracing::debug;

static NEXT_RESULT_ID: AtomicU64 = AtomicU64::new(1);

fn next_result_id() -> String {
    NEXT_RESULT_ID.fetch_add(1, Ordering::Relaxed).to_string()
}

/// One reported problem.
#[derive(Debug, Clone, PartialEq)]
pub struct ProtoDiagnostic {
    pub span: SourceSpan,
    pub severity: DiagnosticSeverity,
    pub kind: ErrorKind,
    pub message: String,
    pub tags: Vec<DiagnosticTag>,
}

impl ProtoDiagnostic {
    fn from_error(err: ErrorWithPos, severity: DiagnosticSeverity) -> Self {
        let tags = match err.kind {
            ErrorKind::UnusedImport => vec![DiagnosticTag::UNNECESSARY],
            _ => Vec::new(),
        };
        Self {
            span: err.span,
            severity,
            kind: err.kind,
            message: err.message,
            tags,
        }
    }

    pub fn to_lsp(&self) -> Diagnostic {
        Diagnostic {
            range: span_to_range(self.span),
            severity: Some(self.severity),
            code: Some(NumberOrString::String(kind_code(self.kind).to_string())),
            source: Some(DIAGNOSTIC_SOURCE.to_string()),
            message: self.message.clone(),
            tags: (!self.tags.is_empty()).then(|| self.tags.clone()),
            ..Default::default()
        }
    }
}

fn kind_code(kind: ErrorKind) -> &'static str {
    match kind {
        ErrorKind::Syntax => "syntax",
        ErrorKind::UnresolvedReference => "unresolved-reference",
        ErrorKind::NotAType => "not-a-type",
        ErrorKind::DuplicateSymbol => "duplicate-symbol",
        ErrorKind::DuplicateNumber => "duplicate-number",
        ErrorKind::UnknownOption => "unknown-option",
        ErrorKind::ImportNotFound => "import-not-found",
        ErrorKind::ImportCycle => "import-cycle",
        ErrorKind::UnusedImport => "unused-import",
    }
}

#[derive(Debug)]
struct DiagnosticList {
    diagnostics: Vec<ProtoDiagnostic>,
    result_id: String,
}

/// Answer to a pull request.
#[derive(Debug, Clone, PartialEq)]
pub struct DiagnosticReport {
    /// Empty when `unchanged` is set.
    pub diagnostics: Vec<ProtoDiagnostic>,
    /// Empty when the path has never had a list.
    pub result_id: String,
    pub unchanged: bool,
}

/// Diagnostic lists keyed by canonical path.
#[derive(Debug, Default)]
pub struct DiagnosticManager {
    lists: DashMap<String, DiagnosticList>,
}

impl DiagnosticManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn handle_error(&self, err: ErrorWithPos) {
        let severity = match err.kind.severity() {
            Severity::Error => DiagnosticSeverity::ERROR,
            Severity::Warning => DiagnosticSeverity::WARNING,
        };
        self.push(err, severity);
    }

    pub fn handle_warning(&self, warning: ErrorWithPos) {
        self.push(warning, DiagnosticSeverity::WARNING);
    }

    fn push(&self, err: ErrorWithPos, severity: DiagnosticSeverity) {
        debug!("diagnostic for {}: {}", err.filename, err.message);
        let path = err.filename.clone();
        let diagnostic = ProtoDiagnostic::from_error(err, severity);
        let mut list = self.lists.entry(path).or_insert_with(|| DiagnosticList {
            diagnostics: Vec::new(),
            result_id: String::new(),
        });
        list.diagnostics.push(diagnostic);
        list.result_id = next_result_id();
    }

    /// Current diagnostics of `path`, or "unchanged" if `prev_result_id`
    /// is the current id.
    pub fn get_diagnostics(&self, path: &str, prev_result_id: Option<&str>) -> DiagnosticReport {
        let Some(list) = self.lists.get(path) else {
            return DiagnosticReport {
                diagnostics: Vec::new(),
                result_id: String::new(),
                unchanged: false,
            };
        };
        if prev_result_id == Some(list.result_id.as_str()) {
            return DiagnosticReport {
                diagnostics: Vec::new(),
                result_id: list.result_id.clone(),
                unchanged: true,
            };
        }
        DiagnosticReport {
            diagnostics: list.diagnostics.clone(),
            result_id: list.result_id.clone(),
            unchanged: false,
        }
    }

    /// Empties the list of `path`, if it has one.
    pub fn clear_diagnostics(&self, path: &str) {
        if let Some(mut list) = self.lists.get_mut(path) {
            list.diagnostics.clear();
            list.result_id = next_result_id();
        }
    }

    /// Forgets `path` entirely, as for a deleted file.
    pub fn remove(&self, path: &str) {
        self.lists.remove(path);
    }

    /// Number of diagnostics currently held for `path`.
    pub fn count(&self, path: &str) -> usize {
        self.lists.get(path).map_or(0, |l| l.diagnostics.len())
    }
}

impl Reporter for DiagnosticManager {
    fn error(&self, err: ErrorWithPos) -> Result<(), ErrorWithPos> {
        self.handle_error(err);
        Ok(())
    }

    fn warning(&self, warning: ErrorWithPos) {
        self.handle_warning(warning);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use protols_compiler::SourcePos;

    fn err(kind: ErrorKind, path: &str) -> ErrorWithPos {
        let span = SourceSpan::new(SourcePos::new(2, 3, 10), SourcePos::new(2, 8, 15));
        ErrorWithPos::new(kind, "boom", path, span)
    }

    #[test]
    fn test_absent_path() {
        let m = DiagnosticManager::new();
        let report = m.get_diagnostics("a.proto", None);
        assert!(report.diagnostics.is_empty());
        assert_eq!(report.result_id, "");
        assert!(!report.unchanged);
    }

    #[test]
    fn test_result_id_changes_on_every_mutation() {
        let m = DiagnosticManager::new();
        m.handle_error(err(ErrorKind::Syntax, "a.proto"));
        let first = m.get_diagnostics("a.proto", None);
        assert_eq!(first.diagnostics.len(), 1);

        m.handle_error(err(ErrorKind::Syntax, "a.proto"));
        let second = m.get_diagnostics("a.proto", None);
        assert_ne!(first.result_id, second.result_id);
        assert_eq!(second.diagnostics.len(), 2);

        m.clear_diagnostics("a.proto");
        let third = m.get_diagnostics("a.proto", None);
        assert!(third.diagnostics.is_empty());
        assert_ne!(second.result_id, third.result_id);
    }

    #[test]
    fn test_result_id_stable_without_mutation() {
        let m = DiagnosticManager::new();
        m.handle_error(err(ErrorKind::Syntax, "a.proto"));
        let a = m.get_diagnostics("a.proto", None);
        let b = m.get_diagnostics("a.proto", None);
        assert_eq!(a.result_id, b.result_id);
    }

    #[test]
    fn test_unchanged_report() {
        let m = DiagnosticManager::new();
        m.handle_error(err(ErrorKind::Syntax, "a.proto"));
        let id = m.get_diagnostics("a.proto", None).result_id;

        let report = m.get_diagnostics("a.proto", Some(&id));
        assert!(report.unchanged);
        assert!(report.diagnostics.is_empty());
        assert_eq!(report.result_id, id);

        let report = m.get_diagnostics("a.proto", Some("stale"));
        assert!(!report.unchanged);
        assert_eq!(report.diagnostics.len(), 1);
    }

    #[test]
    fn test_clear_absent_is_noop() {
        let m = DiagnosticManager::new();
        m.clear_diagnostics("a.proto");
        assert_eq!(m.get_diagnostics("a.proto", None).result_id, "");
    }

    #[test]
    fn test_lists_are_per_file() {
        let m = DiagnosticManager::new();
        m.handle_error(err(ErrorKind::Syntax, "a.proto"));
        m.handle_error(err(ErrorKind::Syntax, "b.proto"));
        m.clear_diagnostics("a.proto");
        assert_eq!(m.count("a.proto"), 0);
        assert_eq!(m.count("b.proto"), 1);
        m.remove("b.proto");
        assert_eq!(m.get_diagnostics("b.proto", None).result_id, "");
    }

    #[test]
    fn test_unused_import_is_tagged() {
        let m = DiagnosticManager::new();
        m.handle_warning(err(ErrorKind::UnusedImport, "a.proto"));
        let report = m.get_diagnostics("a.proto", None);
        let d = &report.diagnostics[0];
        assert_eq!(d.severity, DiagnosticSeverity::WARNING);
        assert_eq!(d.tags, vec![DiagnosticTag::UNNECESSARY]);

        let lsp = d.to_lsp();
        assert_eq!(lsp.source.as_deref(), Some("protols"));
        assert_eq!(lsp.range.start.line, 1);
        assert_eq!(lsp.range.start.character, 2);
        assert_eq!(lsp.tags, Some(vec![DiagnosticTag::UNNECESSARY]));
    }

    #[test]
    fn test_reporter_always_continues() {
        let m = DiagnosticManager::new();
        assert!(Reporter::error(&m, err(ErrorKind::UnresolvedReference, "a.proto")).is_ok());
        let d = &m.get_diagnostics("a.proto", None).diagnostics[0];
        assert_eq!(d.severity, DiagnosticSeverity::ERROR);
        assert!(d.tags.is_empty());
    }
}
