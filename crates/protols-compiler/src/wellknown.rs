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

//! Registry of the standard `google/protobuf/*.proto` schemas.
//!
//! The sources are embedded in the binary and compiled once, on first use.

use crate::compiler::{
    Compiler, CompilerOptions, NoHooks, Reporter, Resolver, SearchResult,
};
use crate::descriptor::{Descriptor, FileDescriptor};
use crate::error::{ErrorWithPos, ResolveError};
use crate::linker::LinkedFile;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use tracing::error;

/// Import path of the schema describing schemas.
pub const DESCRIPTOR_PROTO: &str = "google/protobuf/descriptor.proto";

const SOURCES: [(&str, &str); 8] = [
    (
        "google/protobuf/any.proto",
        include_str!("../wellknown/google/protobuf/any.proto"),
    ),
    (
        "google/protobuf/descriptor.proto",
        include_str!("../wellknown/google/protobuf/descriptor.proto"),
    ),
    (
        "google/protobuf/duration.proto",
        include_str!("../wellknown/google/protobuf/duration.proto"),
    ),
    (
        "google/protobuf/empty.proto",
        include_str!("../wellknown/google/protobuf/empty.proto"),
    ),
    (
        "google/protobuf/field_mask.proto",
        include_str!("../wellknown/google/protobuf/field_mask.proto"),
    ),
    (
        "google/protobuf/struct.proto",
        include_str!("../wellknown/google/protobuf/struct.proto"),
    ),
    (
        "google/protobuf/timestamp.proto",
        include_str!("../wellknown/google/protobuf/timestamp.proto"),
    ),
    (
        "google/protobuf/wrappers.proto",
        include_str!("../wellknown/google/protobuf/wrappers.proto"),
    ),
];

/// Compiled well-known files.
pub struct Registry {
    files: HashMap<String, Arc<LinkedFile>>,
}

impl Registry {
    pub fn find_file(&self, path: &str) -> Option<&Arc<LinkedFile>> {
        self.files.get(path)
    }

    /// Looks up a fully-qualified name, with or without a leading dot.
    pub fn find_descriptor_by_name(&self, name: &str) -> Option<Descriptor> {
        self.files
            .values()
            .find_map(|f| f.descriptor().find_descriptor(name))
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.files.keys().map(String::as_str)
    }

    /// Embedded source text of a well-known file.
    pub fn source(path: &str) -> Option<&'static str> {
        SOURCES.iter().find(|(p, _)| *p == path).map(|(_, s)| *s)
    }
}

struct Embedded;

impl Resolver for Embedded {
    fn find_file_by_path(&self, path: &str) -> Result<SearchResult, ResolveError> {
        Registry::source(path)
            .map(|s| SearchResult::Source(s.to_string()))
            .ok_or_else(|| ResolveError::not_found(path))
    }
}

struct LogErrors;

impl Reporter for LogErrors {
    fn error(&self, err: ErrorWithPos) -> Result<(), ErrorWithPos> {
        error!(%err, "embedded well-known schema failed to compile");
        Ok(())
    }

    fn warning(&self, _warning: ErrorWithPos) {}
}

/// The process-wide registry, compiled on first access.
pub fn registry() -> &'static Registry {
    static REGISTRY: OnceLock<Registry> = OnceLock::new();
    REGISTRY.get_or_init(|| {
        // Option names are not validated here: validating needs this registry.
        let compiler = Compiler::new(
            Arc::new(Embedded),
            Arc::new(LogErrors),
            Arc::new(NoHooks),
            CompilerOptions {
                max_parallelism: 1,
                validate_options: false,
            },
        );
        let paths: Vec<String> = SOURCES.iter().map(|(p, _)| p.to_string()).collect();
        let files = match compiler.compile(&paths) {
            Ok(result) => result
                .files
                .into_iter()
                .map(|f| (f.path().to_string(), f))
                .collect(),
            Err(e) => {
                error!("failed to compile well-known schemas: {e}");
                HashMap::new()
            }
        };
        Registry { files }
    })
}

/// Descriptor of `google/protobuf/descriptor.proto`, used to check
/// built-in option names.
pub fn descriptor_proto_file() -> Option<Arc<FileDescriptor>> {
    registry()
        .find_file(DESCRIPTOR_PROTO)
        .map(|f| Arc::clone(f.descriptor()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::ElementKind;

    #[test]
    fn test_all_embedded_files_compile() {
        let registry = registry();
        for (path, _) in SOURCES {
            assert!(registry.find_file(path).is_some(), "{path} did not compile");
        }
    }

    #[test]
    fn test_find_descriptor_by_name() {
        let ts = registry()
            .find_descriptor_by_name(".google.protobuf.Timestamp")
            .unwrap();
        assert_eq!(ts.kind(), ElementKind::Message);
        assert_eq!(ts.file().name(), "google/protobuf/timestamp.proto");

        let entry = registry()
            .find_descriptor_by_name("google.protobuf.Struct.FieldsEntry")
            .unwrap();
        assert!(entry.is_map_entry());
    }

    #[test]
    fn test_options_schema() {
        let fd = descriptor_proto_file().unwrap();
        let go_package = fd
            .find_descriptor("google.protobuf.FileOptions.go_package")
            .unwrap();
        assert_eq!(go_package.field().unwrap().number, 11);
        assert_eq!(
            registry()
                .find_file("google/protobuf/any.proto")
                .unwrap()
                .descriptor()
                .string_option("go_package"),
            Some("google.golang.org/protobuf/types/known/anypb")
        );
    }
}
