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

//! Descriptor synthesis from Go dependencies.
//!
//! An import such as `github.com/acme/api/v1/user.proto` that matches no
//! workspace file may still be available through the Go module graph:
//!
//! 1. The directory part is looked up as a Go package through a
//!    [`ModuleResolver`].
//! 2. If that directory holds `user.proto`, its source is returned as is.
//! 3. Otherwise the generated `*.pb.go` files of the directory are read
//!    for an embedded descriptor (see [`gosrc`]). A `// source:` header
//!    naming a file with the same base name wins; failing that, the first
//!    generated file whose descriptor symbol is present is used.
//! 4. If the descriptor declares a different name than the one imported,
//!    the name is patched and the difference is learned as a rewrite, so
//!    the next sibling import can go straight to the right generated file.
//!
//! Names under `google/` are never synthesized: they belong to the
//! well-known registry.

mod edits;
pub mod gosrc;
mod modules;

pub use edits::{EditScript, LearnedRewrite, RewriteScope};
pub use modules::{validate_import_path, GoListResolver, ModuleResolver, StaticModuleResolver};

use crate::constants::{GENERATED_GO_SUFFIX, GENERATED_GRPC_SUFFIX, SCHEMA_EXTENSION, WELL_KNOWN_PREFIX};
use crate::error::SynthesisError;
use parking_lot::RwLock;
use prost_types::FileDescriptorProto;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Result of a successful synthesis.
#[derive(Debug, Clone, PartialEq)]
pub enum Synthesized {
    /// The package directory holds the schema source itself.
    Source { path: PathBuf, text: String },
    /// A descriptor recovered from generated code, named as requested.
    Descriptor(FileDescriptorProto),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SynthesisStats {
    /// Directory scans over every generated file.
    pub full_scans: u64,
    /// Generated files read directly because a learned rewrite applied.
    pub targeted_attempts: u64,
    /// Lookups answered by a learned rewrite without a full scan.
    pub targeted_hits: u64,
    pub learned_rewrites: usize,
}

pub struct Synthesizer {
    modules: Arc<dyn ModuleResolver>,
    scope: RewriteScope,
    rewrites: RwLock<Vec<LearnedRewrite>>,
    full_scans: AtomicU64,
    targeted_attempts: AtomicU64,
    targeted_hits: AtomicU64,
}

impl Synthesizer {
    pub fn new(modules: Arc<dyn ModuleResolver>, scope: RewriteScope) -> Self {
        Self {
            modules,
            scope,
            rewrites: RwLock::new(Vec::new()),
            full_scans: AtomicU64::new(0),
            targeted_attempts: AtomicU64::new(0),
            targeted_hits: AtomicU64::new(0),
        }
    }

    pub fn stats(&self) -> SynthesisStats {
        SynthesisStats {
            full_scans: self.full_scans.load(Ordering::Relaxed),
            targeted_attempts: self.targeted_attempts.load(Ordering::Relaxed),
            targeted_hits: self.targeted_hits.load(Ordering::Relaxed),
            learned_rewrites: self.rewrites.read().len(),
        }
    }

    /// Records that a descriptor declared as `declared` was imported as
    /// `requested`.
    pub fn learn(&self, declared: &str, requested: &str) {
        let rule = LearnedRewrite::learn(declared, requested);
        if rule.is_identity() {
            return;
        }
        let mut rewrites = self.rewrites.write();
        if !rewrites.contains(&rule) {
            info!("learned import rewrite {:?} -> {:?}", declared, requested);
            rewrites.push(rule);
        }
    }

    /// Declared names that in-scope rewrites predict for `import`. A
    /// prediction may equal `import` itself when only the directory of a
    /// differently named file was rewritten.
    fn predictions(&self, import: &str) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for rule in self.rewrites.read().iter() {
            if !rule.applies_to(import, self.scope) {
                continue;
            }
            if let Some(declared) = rule.predict_declared(import) {
                if !out.contains(&declared) {
                    out.push(declared);
                }
            }
        }
        out
    }

    pub fn resolve(&self, import: &str) -> Result<Synthesized, SynthesisError> {
        if import.starts_with(WELL_KNOWN_PREFIX) {
            return Err(SynthesisError::Reserved {
                path: import.to_string(),
            });
        }
        let Some((package, file)) = import.rsplit_once('/') else {
            return Err(SynthesisError::InvalidImportPath {
                path: import.to_string(),
                reason: "not a package import".to_string(),
            });
        };
        if Path::new(file).extension().and_then(|e| e.to_str()) != Some(SCHEMA_EXTENSION) {
            return Err(SynthesisError::InvalidImportPath {
                path: import.to_string(),
                reason: "not a schema file".to_string(),
            });
        }
        validate_import_path(package)?;

        let predictions = self.predictions(import);
        let dir = self.find_dir(package, &predictions)?;

        let source = dir.join(file);
        if source.is_file() {
            let text = std::fs::read_to_string(&source).map_err(|e| SynthesisError::Io {
                path: source.clone(),
                source: e,
            })?;
            debug!("{} found as source at {}", import, source.display());
            return Ok(Synthesized::Source { path: source, text });
        }

        for declared in &predictions {
            self.targeted_attempts.fetch_add(1, Ordering::Relaxed);
            if let Some(fd) = targeted(&dir, declared) {
                self.targeted_hits.fetch_add(1, Ordering::Relaxed);
                debug!("{} synthesized from predicted name {}", import, declared);
                return Ok(Synthesized::Descriptor(self.finish(import, fd)));
            }
        }

        self.full_scans.fetch_add(1, Ordering::Relaxed);
        let fd = scan(&dir, file)?;
        Ok(Synthesized::Descriptor(self.finish(import, fd)))
    }

    fn find_dir(&self, package: &str, predictions: &[String]) -> Result<PathBuf, SynthesisError> {
        let err = match self.modules.find_module_dir(package) {
            Ok(dir) => return Ok(dir),
            Err(e) => e,
        };
        for declared in predictions {
            let Some((alt, _)) = declared.rsplit_once('/') else {
                continue;
            };
            if alt == package || validate_import_path(alt).is_err() {
                continue;
            }
            if let Ok(dir) = self.modules.find_module_dir(alt) {
                debug!("{} not found, using {} from a learned rewrite", package, alt);
                return Ok(dir);
            }
        }
        Err(err)
    }

    fn finish(&self, import: &str, mut fd: FileDescriptorProto) -> FileDescriptorProto {
        let declared = fd.name().to_string();
        if declared != import {
            self.learn(&declared, import);
            fd.name = Some(import.to_string());
        }
        fd
    }
}

/// Reads the generated file that protoc-gen-go would have written for
/// `declared`, if its header confirms it.
fn targeted(dir: &Path, declared: &str) -> Option<FileDescriptorProto> {
    let base = declared.rsplit('/').next()?;
    let stem = base.strip_suffix(".proto")?;
    let candidate = dir.join(format!("{stem}{GENERATED_GO_SUFFIX}"));
    let text = std::fs::read_to_string(&candidate).ok()?;
    if gosrc::source_header(&text) != Some(declared) {
        return None;
    }
    let raw = gosrc::extract_raw_desc(&text, &gosrc::symbol_name(declared)).ok()??;
    gosrc::decode_descriptor(&raw).ok()
}

/// Scans every generated file of `dir` for a descriptor of `file`,
/// falling back to the first embedded descriptor found under another name.
fn scan(dir: &Path, file: &str) -> Result<FileDescriptorProto, SynthesisError> {
    let entries = std::fs::read_dir(dir).map_err(|e| SynthesisError::Io {
        path: dir.to_path_buf(),
        source: e,
    })?;
    let mut candidates: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .map(|e| e.path())
        .filter(|p| p.is_file() && is_generated(p))
        .collect();
    candidates.sort();

    let mut fallback: Option<Vec<u8>> = None;
    for path in candidates {
        let text = match std::fs::read_to_string(&path) {
            Ok(t) => t,
            Err(e) => {
                warn!("skipping {}: {}", path.display(), e);
                continue;
            }
        };
        let Some(declared) = gosrc::source_header(&text) else {
            continue;
        };
        let same_name = edits::file_name(declared) == file;
        if !same_name && fallback.is_some() {
            continue;
        }
        match gosrc::extract_raw_desc(&text, &gosrc::symbol_name(declared)) {
            Ok(Some(raw)) if same_name => return gosrc::decode_descriptor(&raw),
            Ok(Some(raw)) => fallback = Some(raw),
            Ok(None) => continue,
            Err(reason) if same_name => {
                return Err(SynthesisError::Literal { path, reason });
            }
            Err(reason) => warn!("skipping {}: {}", path.display(), reason),
        }
    }
    match fallback {
        Some(raw) => {
            debug!("no generated file for {} in {}, using another descriptor", file, dir.display());
            gosrc::decode_descriptor(&raw)
        }
        None => Err(SynthesisError::DescriptorNotFound(dir.to_path_buf())),
    }
}

fn is_generated(path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    name.ends_with(GENERATED_GO_SUFFIX)
        && !name.ends_with(GENERATED_GRPC_SUFFIX)
        && !name.ends_with("_test.go")
}

#[cfg(test)]
mod tests {
    use super::*;
    use prost::Message;
    use tempfile::TempDir;

    fn generated(declared: &str) -> String {
        let fd = FileDescriptorProto {
            name: Some(declared.to_string()),
            package: Some("acme.v1".to_string()),
            ..Default::default()
        };
        let bytes: Vec<String> = fd
            .encode_to_vec()
            .iter()
            .map(|b| format!("{b:#04x}"))
            .collect();
        format!(
            "// Code generated by protoc-gen-go. DO NOT EDIT.\n// source: {declared}\n\npackage v1\n\nvar {} = []byte{{\n\t{},\n}}\n",
            gosrc::symbol_name(declared),
            bytes.join(", ")
        )
    }

    #[test]
    fn test_reserved_and_invalid() {
        let s = Synthesizer::new(Arc::new(StaticModuleResolver::default()), RewriteScope::default());
        assert!(matches!(
            s.resolve("google/protobuf/any.proto"),
            Err(SynthesisError::Reserved { .. })
        ));
        assert!(matches!(
            s.resolve("foo.proto"),
            Err(SynthesisError::InvalidImportPath { .. })
        ));
        assert!(matches!(
            s.resolve("a/b/foo.txt"),
            Err(SynthesisError::InvalidImportPath { .. })
        ));
        assert!(matches!(
            s.resolve("a/../foo.proto"),
            Err(SynthesisError::InvalidImportPath { .. })
        ));
        assert!(matches!(
            s.resolve("a/b/foo.proto"),
            Err(SynthesisError::ModuleNotFound(_))
        ));
    }

    #[test]
    fn test_source_in_package_dir() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("foo.proto"), "syntax = \"proto3\";").unwrap();
        let s = Synthesizer::new(
            Arc::new(StaticModuleResolver::default().with_module("example.com/m", tmp.path())),
            RewriteScope::default(),
        );
        match s.resolve("example.com/m/foo.proto").unwrap() {
            Synthesized::Source { text, .. } => assert_eq!(text, "syntax = \"proto3\";"),
            other => panic!("expected source, got {other:?}"),
        }
        assert_eq!(s.stats().full_scans, 0);
    }

    #[test]
    fn test_scan_matches_base_name() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("a.pb.go"), generated("example.com/m/a.proto")).unwrap();
        std::fs::write(tmp.path().join("b.pb.go"), generated("example.com/m/b.proto")).unwrap();
        std::fs::write(tmp.path().join("b_grpc.pb.go"), "// source: example.com/m/b.proto\n").unwrap();
        let s = Synthesizer::new(
            Arc::new(StaticModuleResolver::default().with_module("example.com/m", tmp.path())),
            RewriteScope::default(),
        );
        match s.resolve("example.com/m/b.proto").unwrap() {
            Synthesized::Descriptor(fd) => assert_eq!(fd.name(), "example.com/m/b.proto"),
            other => panic!("expected descriptor, got {other:?}"),
        }
        assert_eq!(s.stats().learned_rewrites, 0);
    }

    #[test]
    fn test_scan_falls_back_to_other_name() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("old.pb.go"), generated("example.com/m/old.proto")).unwrap();
        let s = Synthesizer::new(
            Arc::new(StaticModuleResolver::default().with_module("example.com/m", tmp.path())),
            RewriteScope::default(),
        );
        match s.resolve("example.com/m/new.proto").unwrap() {
            Synthesized::Descriptor(fd) => assert_eq!(fd.name(), "example.com/m/new.proto"),
            other => panic!("expected descriptor, got {other:?}"),
        }
        assert_eq!(s.stats().learned_rewrites, 1);
    }

    #[test]
    fn test_scan_without_descriptor() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("a.pb.go"), "// source: example.com/m/a.proto
package m
").unwrap();
        std::fs::write(tmp.path().join("b_grpc.pb.go"), generated("example.com/m/b.proto")).unwrap();
        let s = Synthesizer::new(
            Arc::new(StaticModuleResolver::default().with_module("example.com/m", tmp.path())),
            RewriteScope::default(),
        );
        assert!(matches!(
            s.resolve("example.com/m/c.proto"),
            Err(SynthesisError::DescriptorNotFound(_))
        ));
    }

    #[test]
    fn test_is_generated() {
        assert!(is_generated(Path::new("/x/a.pb.go")));
        assert!(!is_generated(Path::new("/x/a_grpc.pb.go")));
        assert!(!is_generated(Path::new("/x/a.go")));
    }
}
