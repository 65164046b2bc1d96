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

//! Cache-level tests: compile flow, diagnostics and workspace events.

#[cfg(test)]
mod fixtures {
    use crate::cache::Cache;
    use crate::config::{ServerConfig, SynthesisConfig};
    use tempfile::TempDir;
    use tower_lsp::lsp_types::Url;

    pub const A: &str = "syntax = \"proto3\";\npackage a;\noption go_package = \"example.com/a\";\nmessage A { int32 x = 1; }\n";

    pub const B: &str = "syntax = \"proto3\";\npackage b;\noption go_package = \"example.com/b\";\nimport \"example.com/a/a.proto\";\nmessage B { a.A ref = 1; }\n";

    pub const BROKEN: &str = "syntax = \"proto3\";\npackage c;\noption go_package = \"example.com/c\";\nmessage C { Missing m = 1; }\n";

    pub const FIXED: &str = "syntax = \"proto3\";\npackage c;\noption go_package = \"example.com/c\";\nmessage C { int32 m = 1; }\n";

    pub fn cache(tmp: &TempDir) -> Cache {
        let config = ServerConfig {
            synthesis: SynthesisConfig {
                enabled: false,
                ..SynthesisConfig::default()
            },
            ..ServerConfig::default()
        };
        Cache::new(vec![tmp.path().to_path_buf()], config)
    }

    pub fn write(tmp: &TempDir, name: &str, text: &str) -> Url {
        let file = tmp.path().join(name);
        if let Some(dir) = file.parent() {
            std::fs::create_dir_all(dir).unwrap();
        }
        std::fs::write(&file, text).unwrap();
        Url::from_file_path(file).unwrap()
    }
}

#[cfg(test)]
mod diagnostics_flow_tests {
    use super::fixtures::*;
    use tempfile::TempDir;
    use tower_lsp::lsp_types::{DiagnosticSeverity, TextDocumentContentChangeEvent};

    // ============ DIAGNOSTIC RESET TESTS ============

    #[test]
    fn test_fix_resets_diagnostics_with_new_result_id() {
        let tmp = TempDir::new().unwrap();
        let cache = cache(&tmp);
        let uri = write(&tmp, "c.proto", BROKEN);

        cache.on_file_opened(&uri, BROKEN).unwrap();
        let first = cache.get_diagnostics(&uri, None).unwrap();
        assert!(!first.diagnostics.is_empty());
        assert!(first
            .diagnostics
            .iter()
            .any(|d| d.severity == DiagnosticSeverity::ERROR));

        let change = TextDocumentContentChangeEvent {
            range: None,
            range_length: None,
            text: FIXED.to_string(),
        };
        cache.on_file_modified(&uri, &[change]).unwrap();
        let second = cache.get_diagnostics(&uri, Some(&first.result_id)).unwrap();
        assert!(!second.unchanged);
        assert!(second.diagnostics.is_empty());
        assert_ne!(second.result_id, first.result_id);
    }

    #[test]
    fn test_current_result_id_is_unchanged() {
        let tmp = TempDir::new().unwrap();
        let cache = cache(&tmp);
        let uri = write(&tmp, "c.proto", BROKEN);
        cache.on_file_opened(&uri, BROKEN).unwrap();

        let report = cache.get_diagnostics(&uri, None).unwrap();
        let again = cache.get_diagnostics(&uri, Some(&report.result_id)).unwrap();
        assert!(again.unchanged);
        assert!(again.diagnostics.is_empty());
        assert_eq!(again.result_id, report.result_id);

        let stale = cache.get_diagnostics(&uri, Some("not-an-id")).unwrap();
        assert!(!stale.unchanged);
        assert_eq!(stale.diagnostics, report.diagnostics);
    }

    #[test]
    fn test_recompiling_broken_file_does_not_accumulate() {
        let tmp = TempDir::new().unwrap();
        let cache = cache(&tmp);
        let uri = write(&tmp, "c.proto", BROKEN);
        cache.on_file_opened(&uri, BROKEN).unwrap();
        let count = cache.diagnostics().count("example.com/c/c.proto");

        cache.compile(&["example.com/c/c.proto".to_string()]);
        cache.compile(&["example.com/c/c.proto".to_string()]);
        assert_eq!(cache.diagnostics().count("example.com/c/c.proto"), count);
    }
}

#[cfg(test)]
mod partial_result_tests {
    use super::fixtures::*;
    use crate::cache::FileResult;
    use crate::error::CacheError;
    use tempfile::TempDir;
    use tower_lsp::lsp_types::Position;

    // ============ PARTIAL RESULT TESTS ============

    #[test]
    fn test_unresolved_reference_yields_partial_result() {
        let tmp = TempDir::new().unwrap();
        write(&tmp, "a.proto", A);
        let cache = cache(&tmp);
        cache.reindex();

        let uri = write(&tmp, "c.proto", BROKEN);
        cache.on_file_opened(&uri, BROKEN).unwrap();

        assert!(matches!(cache.result(&uri).unwrap(), FileResult::Unlinked(_)));
        assert!(cache
            .result_for_path("example.com/a/a.proto")
            .is_some_and(|r| r.is_linked()));
    }

    #[test]
    fn test_syntax_queries_work_on_partial_result() {
        let tmp = TempDir::new().unwrap();
        let cache = cache(&tmp);
        let uri = write(&tmp, "c.proto", BROKEN);
        cache.on_file_opened(&uri, BROKEN).unwrap();

        assert!(!cache.semantic_tokens(&uri, None).unwrap().is_empty());
        let symbols = cache.document_symbols(&uri).unwrap();
        assert_eq!(symbols[0].name, "C");
        assert!(matches!(
            cache.find_descriptor_at(&uri, Position::new(3, 8)),
            Err(CacheError::NotLinked { .. })
        ));
        assert!(cache.inlay_hints(&uri, None).unwrap().is_empty());
    }

    #[test]
    fn test_semantic_queries_degrade_on_link_errors() {
        let tmp = TempDir::new().unwrap();
        let cache = cache(&tmp);
        let uri = write(&tmp, "c.proto", BROKEN);
        cache.on_file_opened(&uri, BROKEN).unwrap();

        for line in 0..5 {
            for character in [0, 8, 9, 14] {
                let at = Position::new(line, character);
                assert_eq!(cache.hover(&uri, at).unwrap(), None);
                assert_eq!(cache.definition(&uri, at).unwrap(), None);
            }
        }
        assert!(!cache.get_diagnostics(&uri, None).unwrap().diagnostics.is_empty());
    }

    #[test]
    fn test_format_skips_syntax_errors() {
        let tmp = TempDir::new().unwrap();
        let cache = cache(&tmp);
        let text = "syntax = \"proto3\";\noption go_package = \"example.com/s\";\nmessage S { int32 x = ; }\n";
        let uri = write(&tmp, "s.proto", text);
        cache.on_file_opened(&uri, text).unwrap();
        assert!(!cache.result(&uri).unwrap().is_linked());
        assert!(cache.format(&uri).unwrap().is_empty());
    }
}

#[cfg(test)]
mod workspace_event_tests {
    use super::fixtures::*;
    use tempfile::TempDir;
    use tower_lsp::lsp_types::{Position, Url};

    // ============ WORKSPACE EVENT TESTS ============

    #[test]
    fn test_definition_across_files() {
        let tmp = TempDir::new().unwrap();
        let a = write(&tmp, "a/a.proto", A);
        let b = write(&tmp, "b/b.proto", B);
        let cache = cache(&tmp);
        cache.reindex();

        let location = cache.definition(&b, Position::new(4, 14)).unwrap().unwrap();
        assert_eq!(location.uri, a);
        assert_eq!(location.range.start, Position::new(3, 8));
        assert_eq!(location.range.end, Position::new(3, 9));
    }

    #[test]
    fn test_import_links_to_file() {
        let tmp = TempDir::new().unwrap();
        let a = write(&tmp, "a/a.proto", A);
        let b = write(&tmp, "b/b.proto", B);
        let cache = cache(&tmp);
        cache.reindex();

        let links = cache.document_links(&b).unwrap();
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].target.as_ref(), Some(&a));
        assert_eq!(links[0].range.start, Position::new(3, 7));
    }

    #[test]
    fn test_delete_recompiles_importers() {
        let tmp = TempDir::new().unwrap();
        let a = write(&tmp, "a/a.proto", A);
        write(&tmp, "b/b.proto", B);
        let cache = cache(&tmp);
        cache.reindex();
        assert_eq!(cache.diagnostics().count("example.com/b/b.proto"), 0);

        std::fs::remove_file(a.to_file_path().unwrap()).unwrap();
        cache.on_files_deleted(&[a.clone()]);

        assert!(cache.path_for_uri(&a).is_err());
        assert!(cache.result_for_path("example.com/a/a.proto").is_none());
        assert!(cache.diagnostics().count("example.com/b/b.proto") > 0);
    }

    #[test]
    fn test_directory_delete() {
        let tmp = TempDir::new().unwrap();
        let a = write(&tmp, "a/a.proto", A);
        let cache = cache(&tmp);
        cache.reindex();

        let dir = Url::from_directory_path(tmp.path().join("a")).unwrap();
        cache.on_files_deleted(&[dir]);
        assert!(cache.path_for_uri(&a).is_err());
        assert_eq!(cache.statistics().indexed, 0);
    }

    #[test]
    fn test_rename_keeps_canonical_path() {
        let tmp = TempDir::new().unwrap();
        let old = write(&tmp, "a/a.proto", A);
        let cache = cache(&tmp);
        cache.reindex();
        let batches = cache.statistics().compile_batches;

        std::fs::create_dir_all(tmp.path().join("moved")).unwrap();
        let new_file = tmp.path().join("moved/a.proto");
        std::fs::rename(old.to_file_path().unwrap(), &new_file).unwrap();
        let new = Url::from_file_path(&new_file).unwrap();
        cache.on_files_renamed(&[(old.clone(), new.clone())]);

        assert!(cache.path_for_uri(&old).is_err());
        assert_eq!(cache.path_for_uri(&new).unwrap(), "example.com/a/a.proto");
        assert_eq!(cache.statistics().compile_batches, batches + 1);
    }

    #[test]
    fn test_created_file_is_indexed() {
        let tmp = TempDir::new().unwrap();
        let cache = cache(&tmp);
        cache.reindex();
        let a = write(&tmp, "a.proto", A);
        cache.on_files_created(&[a.clone()]);
        assert_eq!(cache.path_for_uri(&a).unwrap(), "example.com/a/a.proto");
        assert!(cache.result(&a).unwrap().is_linked());
    }

    #[test]
    fn test_save_with_new_go_package_moves_path() {
        let tmp = TempDir::new().unwrap();
        let cache = cache(&tmp);
        let uri = write(&tmp, "a.proto", A);
        cache.on_file_opened(&uri, A).unwrap();

        let moved = A.replace("example.com/a", "example.com/z");
        std::fs::write(uri.to_file_path().unwrap(), &moved).unwrap();
        cache.on_file_saved(&uri, Some(&moved)).unwrap();

        assert_eq!(cache.path_for_uri(&uri).unwrap(), "example.com/z/a.proto");
        assert!(cache.result_for_path("example.com/a/a.proto").is_none());
        assert!(cache.result(&uri).unwrap().is_linked());
    }
}
