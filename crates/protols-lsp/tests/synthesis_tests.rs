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

//! Descriptor synthesis from generated Go code.
//!
//! Module directories here hold only `.pb.go` files, each embedding the
//! serialized descriptor of the schema it was generated from.

use prost::Message;
use prost_types::{DescriptorProto, FileDescriptorProto};
use protols_compiler::ErrorKind;
use protols_lsp::config::ServerConfig;
use protols_lsp::synthesis::{gosrc, RewriteScope, StaticModuleResolver, Synthesized, Synthesizer};
use protols_lsp::Cache;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;
use tower_lsp::lsp_types::*;

// ============================================================================
// TEST HELPERS
// ============================================================================

/// Writes `<stem>.pb.go` into `dir`, declaring `declared` as its source.
fn generate(dir: &Path, declared: &str, message: &str) {
    let fd = FileDescriptorProto {
        name: Some(declared.to_string()),
        package: Some("acme.v1".to_string()),
        syntax: Some("proto3".to_string()),
        message_type: vec![DescriptorProto {
            name: Some(message.to_string()),
            ..Default::default()
        }],
        ..Default::default()
    };
    let bytes: Vec<String> = fd
        .encode_to_vec()
        .iter()
        .map(|b| format!("{b:#04x}"))
        .collect();
    let text = format!(
        "// Code generated by protoc-gen-go. DO NOT EDIT.\n// versions:\n// \tprotoc-gen-go v1.34.2\n// source: {declared}\n\npackage v1\n\nvar {} = []byte{{\n\t{},\n}}\n",
        gosrc::symbol_name(declared),
        bytes.join(", ")
    );
    let stem = declared
        .rsplit('/')
        .next()
        .and_then(|base| base.strip_suffix(".proto"))
        .unwrap();
    std::fs::create_dir_all(dir).unwrap();
    std::fs::write(dir.join(format!("{stem}.pb.go")), text).unwrap();
}

/// A module `acme.dev/api` whose code was generated with schema names
/// relative to the module root.
fn module(tmp: &TempDir) -> Arc<Synthesizer> {
    let root = tmp.path().join("mod");
    generate(&root.join("v1"), "api/v1/foo.proto", "Foo");
    generate(&root.join("v1"), "api/v1/bar.proto", "Bar");
    Arc::new(Synthesizer::new(
        Arc::new(StaticModuleResolver::default().with_module("acme.dev/api", &root)),
        RewriteScope::default(),
    ))
}

fn descriptor(result: Synthesized) -> FileDescriptorProto {
    match result {
        Synthesized::Descriptor(fd) => fd,
        other => panic!("expected a descriptor, got {other:?}"),
    }
}

// ============================================================================
// REWRITE LEARNING
// ============================================================================

#[test]
fn test_round_trip_renames_and_learns() {
    let tmp = TempDir::new().unwrap();
    let synthesizer = module(&tmp);

    let foo = descriptor(synthesizer.resolve("acme.dev/api/v1/foo.proto").unwrap());
    assert_eq!(foo.name(), "acme.dev/api/v1/foo.proto");
    assert_eq!(foo.message_type[0].name(), "Foo");
    let stats = synthesizer.stats();
    assert_eq!(stats.full_scans, 1);
    assert_eq!(stats.learned_rewrites, 1);

    let bar = descriptor(synthesizer.resolve("acme.dev/api/v1/bar.proto").unwrap());
    assert_eq!(bar.name(), "acme.dev/api/v1/bar.proto");
    let stats = synthesizer.stats();
    assert_eq!(stats.full_scans, 1);
    assert_eq!(stats.targeted_hits, 1);
}

#[test]
fn test_rewrite_scoped_to_parent() {
    let tmp = TempDir::new().unwrap();
    let synthesizer = module(&tmp);
    generate(&tmp.path().join("mod/v2"), "api/v2/baz.proto", "Baz");

    descriptor(synthesizer.resolve("acme.dev/api/v1/foo.proto").unwrap());
    let baz = descriptor(synthesizer.resolve("acme.dev/api/v2/baz.proto").unwrap());
    assert_eq!(baz.name(), "acme.dev/api/v2/baz.proto");
    let stats = synthesizer.stats();
    assert_eq!(stats.targeted_hits, 0);
    assert_eq!(stats.full_scans, 2);
}

#[test]
fn test_global_scope_carries_directory_rewrite() {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().join("mod");
    generate(&root.join("v1"), "api/v1/foo.proto", "Foo");
    generate(&root.join("v2"), "api/v2/baz.proto", "Baz");
    let synthesizer = Synthesizer::new(
        Arc::new(StaticModuleResolver::default().with_module("acme.dev/api", &root)),
        RewriteScope::Global,
    );

    descriptor(synthesizer.resolve("acme.dev/api/v1/foo.proto").unwrap());
    let baz = descriptor(synthesizer.resolve("acme.dev/api/v2/baz.proto").unwrap());
    assert_eq!(baz.name(), "acme.dev/api/v2/baz.proto");
    let stats = synthesizer.stats();
    assert_eq!(stats.full_scans, 1);
    assert_eq!(stats.targeted_hits, 1);
}

// ============================================================================
// RENAMED FILES
// ============================================================================

#[test]
fn test_renamed_file_is_patched_and_learned() {
    let tmp = TempDir::new().unwrap();
    let pkg = tmp.path().join("pkg");
    generate(&pkg, "example.com/pkg/old.proto", "Old");
    let synthesizer = Synthesizer::new(
        Arc::new(StaticModuleResolver::default().with_module("example.com/pkg", &pkg)),
        RewriteScope::default(),
    );

    let fd = descriptor(synthesizer.resolve("example.com/pkg/new.proto").unwrap());
    assert_eq!(fd.name(), "example.com/pkg/new.proto");
    assert_eq!(fd.message_type[0].name(), "Old");
    let stats = synthesizer.stats();
    assert_eq!(stats.full_scans, 1);
    assert_eq!(stats.learned_rewrites, 1);

    // The same import again goes straight to the generated file it maps to.
    descriptor(synthesizer.resolve("example.com/pkg/new.proto").unwrap());
    let stats = synthesizer.stats();
    assert_eq!(stats.full_scans, 1);
    assert_eq!(stats.targeted_hits, 1);
}

#[test]
fn test_sibling_of_renamed_file_tries_rewrite_first() {
    let tmp = TempDir::new().unwrap();
    let pkg = tmp.path().join("pkg");
    generate(&pkg, "example.com/pkg/old.proto", "Old");
    generate(&pkg, "example.com/pkg/other.proto", "Other");
    let synthesizer = Synthesizer::new(
        Arc::new(StaticModuleResolver::default().with_module("example.com/pkg", &pkg)),
        RewriteScope::default(),
    );

    descriptor(synthesizer.resolve("example.com/pkg/new.proto").unwrap());
    assert_eq!(synthesizer.stats().targeted_attempts, 0);

    let other = descriptor(synthesizer.resolve("example.com/pkg/other.proto").unwrap());
    assert_eq!(other.name(), "example.com/pkg/other.proto");
    assert_eq!(other.message_type[0].name(), "Other");
    let stats = synthesizer.stats();
    assert_eq!(stats.targeted_attempts, 1);
    assert_eq!(stats.targeted_hits, 1);
    assert_eq!(stats.full_scans, 1);
}

// ============================================================================
// THROUGH THE CACHE
// ============================================================================

#[test]
fn test_workspace_file_links_against_synthesized_import() {
    let tmp = TempDir::new().unwrap();
    let synthesizer = module(&tmp);
    let workspace = tmp.path().join("ws");
    std::fs::create_dir_all(&workspace).unwrap();
    let text = "syntax = \"proto3\";\npackage svc;\noption go_package = \"example.com/svc\";\nimport \"acme.dev/api/v1/foo.proto\";\nmessage Req { acme.v1.Foo foo = 1; }\n";
    let file = workspace.join("svc.proto");
    std::fs::write(&file, text).unwrap();
    let uri = Url::from_file_path(&file).unwrap();

    let cache = Cache::with_synthesizer(vec![workspace], ServerConfig::default(), Some(synthesizer));
    cache.reindex();

    assert!(cache.result(&uri).unwrap().is_linked());
    assert_eq!(cache.diagnostics().count("example.com/svc/svc.proto"), 0);
    assert_eq!(cache.statistics().synthesis.full_scans, 1);

    let hover = cache.hover(&uri, Position::new(4, 23)).unwrap().unwrap();
    let HoverContents::Markup(markup) = hover.contents else {
        panic!("expected markdown");
    };
    assert!(markup.value.contains("Foo"));
    // Synthesized files have no document to jump to.
    assert_eq!(cache.definition(&uri, Position::new(4, 23)).unwrap(), None);
}

#[test]
fn test_missing_descriptor_is_reported_at_import() {
    let tmp = TempDir::new().unwrap();
    let synthesizer = module(&tmp);
    std::fs::create_dir_all(tmp.path().join("mod/v3")).unwrap();
    let workspace = tmp.path().join("ws");
    std::fs::create_dir_all(&workspace).unwrap();
    let text = "syntax = \"proto3\";\noption go_package = \"example.com/svc\";\nimport \"acme.dev/api/v3/nope.proto\";\n";
    let file = workspace.join("svc.proto");
    std::fs::write(&file, text).unwrap();
    let uri = Url::from_file_path(&file).unwrap();

    let cache = Cache::with_synthesizer(vec![workspace], ServerConfig::default(), Some(synthesizer));
    cache.reindex();

    let report = cache.get_diagnostics(&uri, None).unwrap();
    let missing = report
        .diagnostics
        .iter()
        .find(|d| d.kind == ErrorKind::ImportNotFound)
        .expect("import should be reported");
    assert_eq!(missing.span.start().line(), 3);
    assert!(!cache.result(&uri).unwrap().is_linked());
}
