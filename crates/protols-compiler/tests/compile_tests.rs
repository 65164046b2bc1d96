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

//! End-to-end compiler tests: resolvers, hooks, descriptors and the
//! well-known registry.

use parking_lot::Mutex;
use proptest::prelude::*;
use prost_types::{DescriptorProto, FileDescriptorProto};
use protols_compiler::{
    parse, wellknown, CompileResult, Compiler, CompilerHooks, CompilerOptions, ElementKind,
    ErrorKind, ErrorWithPos, NoHooks, NodeDescriptor, Reporter, ResolveError, Resolver,
    SearchResult,
};
use std::collections::HashMap;
use std::sync::Arc;

// ============================================================================
// Fixtures
// ============================================================================

#[derive(Default)]
struct Files {
    sources: HashMap<String, String>,
    protos: HashMap<String, FileDescriptorProto>,
}

impl Resolver for Files {
    fn find_file_by_path(&self, path: &str) -> Result<SearchResult, ResolveError> {
        if let Some(src) = self.sources.get(path) {
            return Ok(SearchResult::Source(src.clone()));
        }
        if let Some(proto) = self.protos.get(path) {
            return Ok(SearchResult::Proto(proto.clone()));
        }
        wellknown::registry()
            .find_file(path)
            .map(|f| SearchResult::Descriptor(Arc::clone(f.descriptor())))
            .ok_or_else(|| ResolveError::not_found(path))
    }
}

#[derive(Default)]
struct Recorder {
    problems: Mutex<Vec<ErrorWithPos>>,
    events: Mutex<Vec<String>>,
}

impl Reporter for Recorder {
    fn error(&self, err: ErrorWithPos) -> Result<(), ErrorWithPos> {
        self.events.lock().push(format!("error {}", err.filename));
        self.problems.lock().push(err);
        Ok(())
    }

    fn warning(&self, warning: ErrorWithPos) {
        self.events.lock().push(format!("warning {}", warning.filename));
        self.problems.lock().push(warning);
    }
}

impl CompilerHooks for Recorder {
    fn pre_invalidate(&self, path: &str) {
        self.events.lock().push(format!("pre_invalidate {path}"));
    }

    fn post_invalidate(&self, path: &str, _will_recompile: bool) {
        self.events.lock().push(format!("post_invalidate {path}"));
    }

    fn pre_compile(&self, path: &str) {
        self.events.lock().push(format!("pre_compile {path}"));
    }

    fn post_compile(&self, path: &str) {
        self.events.lock().push(format!("post_compile {path}"));
    }
}

fn setup(files: Files) -> (Compiler, Arc<Recorder>) {
    let recorder = Arc::new(Recorder::default());
    let compiler = Compiler::new(
        Arc::new(files),
        recorder.clone(),
        recorder.clone(),
        CompilerOptions {
            max_parallelism: 4,
            validate_options: true,
        },
    );
    (compiler, recorder)
}

fn sources(pairs: &[(&str, &str)]) -> Files {
    Files {
        sources: pairs
            .iter()
            .map(|(p, s)| (p.to_string(), s.to_string()))
            .collect(),
        protos: HashMap::new(),
    }
}

fn compile(compiler: &Compiler, paths: &[&str]) -> CompileResult {
    let paths: Vec<String> = paths.iter().map(|p| p.to_string()).collect();
    compiler.compile(&paths).unwrap()
}

// ============================================================================
// Linking
// ============================================================================

#[test]
fn test_well_known_imports_link() {
    let (compiler, recorder) = setup(sources(&[(
        "svc.proto",
        r#"syntax = "proto3";
package svc;
import "google/protobuf/timestamp.proto";
import "google/protobuf/empty.proto";
message Event { google.protobuf.Timestamp at = 1; }
service S { rpc Ping(google.protobuf.Empty) returns (Event); }
"#,
    )]));
    let result = compile(&compiler, &["svc.proto"]);
    assert!(recorder.problems.lock().is_empty(), "{:?}", recorder.problems.lock());
    let file = result.linked("svc.proto").unwrap();
    let ping = file.descriptor().find_descriptor("svc.S.Ping").unwrap();
    assert_eq!(ping.method().unwrap().input_type, "google.protobuf.Empty");
}

#[test]
fn test_builtin_option_names_are_validated() {
    let (compiler, recorder) = setup(sources(&[(
        "a.proto",
        "syntax = \"proto3\";\noption go_package = \"x\";\noption no_such_option = true;\n",
    )]));
    let result = compile(&compiler, &["a.proto"]);
    assert!(result.unlinked.contains_key("a.proto"));
    let problems = recorder.problems.lock();
    assert_eq!(problems.len(), 1);
    assert_eq!(problems[0].kind, ErrorKind::UnknownOption);
    assert_eq!(problems[0].span.start().line(), 3);
}

#[test]
fn test_custom_option_resolves_to_extension() {
    let (compiler, recorder) = setup(sources(&[
        (
            "opts.proto",
            r#"syntax = "proto3";
package opts;
import "google/protobuf/descriptor.proto";
extend google.protobuf.FieldOptions { string label = 50001; }
"#,
        ),
        (
            "a.proto",
            r#"syntax = "proto3";
package a;
import "opts.proto";
message M { string x = 1 [(opts.label) = "hi"]; }
"#,
        ),
    ]));
    let result = compile(&compiler, &["a.proto"]);
    assert!(recorder.problems.lock().is_empty(), "{:?}", recorder.problems.lock());
    let file = result.linked("a.proto").unwrap();

    let options: Vec<_> = file
        .ast()
        .decls
        .iter()
        .filter_map(|d| match d {
            protols_compiler::ast::FileElement::Message(m) => Some(m),
            _ => None,
        })
        .flat_map(|m| &m.decls)
        .filter_map(|d| match d {
            protols_compiler::ast::MessageElement::Field(f) => f.options.as_ref(),
            _ => None,
        })
        .flat_map(|c| &c.options)
        .collect();
    assert_eq!(options.len(), 1);
    match file.node_descriptor(options[0].id) {
        Some(NodeDescriptor::Option(target)) => {
            assert_eq!(target.options_message, "google.protobuf.FieldOptions");
            assert_eq!(target.parts.len(), 1);
            assert_eq!(target.parts[0].name, "opts.label");
            assert!(target.parts[0].is_extension);
        }
        other => panic!("unexpected mapping {other:?}"),
    }
}

#[test]
fn test_serialized_descriptor_dependency() {
    let mut files = sources(&[(
        "user.proto",
        "syntax = \"proto3\";\nimport \"gen/legacy.proto\";\nmessage User { legacy.Old old = 1; }\n",
    )]);
    files.protos.insert(
        "gen/legacy.proto".to_string(),
        FileDescriptorProto {
            name: Some("gen/legacy.proto".to_string()),
            package: Some("legacy".to_string()),
            syntax: Some("proto3".to_string()),
            message_type: vec![DescriptorProto {
                name: Some("Old".to_string()),
                ..Default::default()
            }],
            ..Default::default()
        },
    );
    let (compiler, recorder) = setup(files);
    let result = compile(&compiler, &["user.proto"]);
    assert!(recorder.problems.lock().is_empty(), "{:?}", recorder.problems.lock());
    let user = result.linked("user.proto").unwrap();
    let old = user.descriptor().find_descriptor("User.old").unwrap();
    assert_eq!(old.field().unwrap().type_name.as_deref(), Some("legacy.Old"));
    // Descriptors are retained but never reported as compiled files.
    assert!(result.linked("gen/legacy.proto").is_none());
}

#[test]
fn test_not_a_type() {
    let (compiler, recorder) = setup(sources(&[(
        "a.proto",
        "syntax = \"proto3\";\nservice S {}\nmessage M { S s = 1; }\n",
    )]));
    compile(&compiler, &["a.proto"]);
    let problems = recorder.problems.lock();
    assert_eq!(problems.len(), 1);
    assert_eq!(problems[0].kind, ErrorKind::NotAType);
}

#[test]
fn test_declarations_point_at_names() {
    let (compiler, _) = setup(sources(&[(
        "a.proto",
        "syntax = \"proto3\";\npackage p;\nmessage Outer {\n  enum Kind { KIND_A = 0; }\n}\n",
    )]));
    let result = compile(&compiler, &["a.proto"]);
    let file = result.linked("a.proto").unwrap();
    let kind = file.descriptor().find_descriptor("p.Outer.Kind").unwrap();
    assert_eq!(kind.kind(), ElementKind::Enum);
    let decl = file.declaration_of(&kind).unwrap();
    assert_eq!(decl.name_span.start().line(), 4);
    assert_eq!(decl.name_span.start().column(), 8);
}

// ============================================================================
// Hooks and invalidation
// ============================================================================

#[test]
fn test_hooks_invalidate_before_reporting() {
    let (compiler, recorder) = setup(sources(&[("a.proto", "message A { Missing m = 1; }")]));
    compile(&compiler, &["a.proto"]);
    compile(&compiler, &["a.proto"]);
    let events = recorder.events.lock();
    let expected = [
        "pre_invalidate a.proto",
        "post_invalidate a.proto",
        "pre_compile a.proto",
        "error a.proto",
        "post_compile a.proto",
    ];
    assert_eq!(&events[..5], &expected);
    // An unlinked file is not retained, so the second compile starts fresh
    // and invalidates again.
    assert_eq!(&events[5..], &expected);
}

#[test]
fn test_recompiling_dependency_drops_dependent() {
    let (compiler, recorder) = setup(sources(&[
        ("a.proto", "import \"b.proto\";\nmessage A { B b = 1; }"),
        ("b.proto", "message B {}"),
    ]));
    compile(&compiler, &["a.proto"]);
    recorder.events.lock().clear();

    let result = compile(&compiler, &["b.proto"]);
    assert_eq!(result.files.len(), 1);
    let events = recorder.events.lock().clone();
    assert!(events.iter().all(|e| !e.ends_with("a.proto")), "{events:?}");

    // a.proto was dropped silently; it comes back, with hooks, on demand.
    recorder.events.lock().clear();
    let result = compile(&compiler, &["a.proto"]);
    assert!(result.linked("a.proto").is_some());
    assert_eq!(recorder.events.lock()[0], "pre_invalidate a.proto");
}

#[test]
fn test_forget_drops_dependents() {
    let (compiler, _) = setup(sources(&[
        ("a.proto", "import \"b.proto\";\nmessage A { B b = 1; }"),
        ("b.proto", "message B {}"),
        ("c.proto", "message C {}"),
    ]));
    compile(&compiler, &["a.proto", "c.proto"]);
    compiler.forget(&["b.proto".to_string()]);
    assert_eq!(compiler.retained_paths(), vec!["c.proto".to_string()]);
}

#[test]
fn test_parallel_batch() {
    let files: Vec<(String, String)> = (0..32)
        .map(|i| {
            let import = if i > 0 {
                format!("import \"f{}.proto\";\n", i - 1)
            } else {
                String::new()
            };
            let field = if i > 0 {
                format!("M{} prev = 1;", i - 1)
            } else {
                String::new()
            };
            (
                format!("f{i}.proto"),
                format!("{import}message M{i} {{ {field} }}"),
            )
        })
        .collect();
    let pairs: Vec<(&str, &str)> = files.iter().map(|(p, s)| (p.as_str(), s.as_str())).collect();
    let (compiler, recorder) = setup(sources(&pairs));
    let all: Vec<&str> = files.iter().map(|(p, _)| p.as_str()).collect();
    let result = compile(&compiler, &all);
    assert!(recorder.problems.lock().is_empty());
    assert_eq!(result.files.len(), 32);
}

#[test]
fn test_no_hooks_compiler() {
    let compiler = Compiler::new(
        Arc::new(sources(&[("a.proto", "message A {}")])),
        Arc::new(Recorder::default()),
        Arc::new(NoHooks),
        CompilerOptions::default(),
    );
    let result = compiler.compile(&["a.proto".to_string()]).unwrap();
    assert_eq!(result.errors, 0);
    assert!(result.linked("a.proto").is_some());
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    #[test]
    fn prop_parser_spans_stay_in_bounds(src in "[a-z0-9 ={};\"\\[\\]()<>,.\n]{0,200}") {
        let (parsed, _) = parse("fuzz.proto", &src);
        let len = parsed.source().len();
        for decl in &parsed.ast().decls {
            let span = decl.as_node().span();
            prop_assert!(span.start().offset() <= span.end().offset());
            prop_assert!(span.end().offset() <= len);
        }
    }
}
