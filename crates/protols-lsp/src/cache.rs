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

//! The compilation cache.
//!
//! This module owns every piece of per-workspace state and is the single
//! entry point the language server talks to.
//!
//! # Responsibilities
//!
//! - Mapping document URIs to canonical import paths
//! - Holding unsaved edits in the overlay
//! - Driving incremental compiles and keeping their results
//! - Answering hover, definition, symbol, token, link, hint, format and
//!   diagnostic queries from those results
//!
//! # Design
//!
//! The compiler keeps linked files between calls and invalidates them
//! itself. The cache listens to that through [`CompilerHooks`]:
//!
//! - **Invalidation** empties the file's diagnostic list, so the next pull
//!   sees a fresh result id even when the recompile reports nothing.
//! - **Pre-compile** marks any partial result of the file as stale, so a
//!   file that no longer parses does not keep an outdated syntax tree.
//!
//! Files that fail to link keep their syntax tree as a partial result.
//! Queries that only need syntax (tokens, symbols, links, formatting) work
//! on those too.
//!
//! # Thread Safety
//!
//! Results sit behind a `parking_lot::RwLock`. A compile holds the write
//! side for its whole duration, so queries see the state before or after
//! a compile, never in between. Edits to the overlay are serialized by a
//! separate mutation lock.

use crate::config::{ServerConfig, SynthesisConfig};
use crate::diagnostics::{DiagnosticManager, DiagnosticReport};
use crate::error::{CacheError, OverlayError};
use crate::index::{canonical_path, canonical_path_for_uri, WorkspaceIndex};
use crate::overlay::{BaseReader, Overlay};
use crate::position::{self, Resolved, SymbolSource};
use crate::resolver::{lookup_name, ResolverChain};
use crate::synthesis::{GoListResolver, ModuleResolver, StaticModuleResolver, SynthesisStats, Synthesizer};
use crate::utils::{end_position, span_to_range};
use crate::{hints, semantic, symbols};
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use protols_compiler::format::format_file;
use protols_compiler::printer::print_descriptor;
use protols_compiler::wellknown;
use protols_compiler::{
    Compiler, CompilerHooks, CompilerOptions, Descriptor, ElementKind, FileDescriptor, LinkedFile,
    ParsedFile, ResolveError, Resolver, SearchResult,
};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tower_lsp::lsp_types::{
    DocumentLink, DocumentSymbol, Hover, HoverContents, InlayHint, Location, MarkupContent,
    MarkupKind, Position, Range, SemanticToken, TextDocumentContentChangeEvent, TextEdit, Url,
};
use tracing::{debug, error, info, warn};
use walkdir::{DirEntry, WalkDir};

/// What the last compile of a file produced.
#[derive(Debug, Clone)]
pub enum FileResult {
    Linked(Arc<LinkedFile>),
    /// Parsed, possibly with errors, but not linked.
    Unlinked(Arc<ParsedFile>),
}

impl FileResult {
    pub fn parsed(&self) -> &ParsedFile {
        match self {
            FileResult::Linked(file) => file.parsed(),
            FileResult::Unlinked(parsed) => parsed,
        }
    }

    pub fn linked(&self) -> Option<&Arc<LinkedFile>> {
        match self {
            FileResult::Linked(file) => Some(file),
            FileResult::Unlinked(_) => None,
        }
    }

    pub fn is_linked(&self) -> bool {
        matches!(self, FileResult::Linked(_))
    }
}

/// Every linked result in the workspace, as seen by the position engine.
struct Workspace<'a>(&'a HashMap<String, FileResult>);

impl SymbolSource for Workspace<'_> {
    fn find_file(&self, path: &str) -> Option<Arc<FileDescriptor>> {
        match self.0.get(path) {
            Some(FileResult::Linked(file)) => Some(Arc::clone(file.descriptor())),
            _ => wellknown::registry()
                .find_file(path)
                .map(|f| Arc::clone(f.descriptor())),
        }
    }

    fn find_descriptor(&self, full_name: &str) -> Option<Descriptor> {
        self.0
            .values()
            .filter_map(FileResult::linked)
            .find_map(|file| file.descriptor().find_descriptor(full_name))
            .or_else(|| wellknown::registry().find_descriptor_by_name(full_name))
    }
}

/// Cache statistics for monitoring.
#[derive(Debug, Clone, Default)]
pub struct CacheStatistics {
    /// Calls into the compiler.
    pub compile_batches: u64,
    /// Files compiled from source across all batches.
    pub files_compiled: u64,
    /// Retained files the compiler invalidated.
    pub invalidations: u64,
    pub linked: usize,
    pub unlinked: usize,
    /// Documents in the URI index.
    pub indexed: usize,
    /// Documents with unsaved content.
    pub overlays: usize,
    pub synthesis: SynthesisStats,
}

/// Compiler lifecycle listener.
struct CacheHooks {
    diagnostics: Arc<DiagnosticManager>,
    invalidating: DashMap<String, Instant>,
    compiling: DashMap<String, Instant>,
    /// Paths whose partial results the running compile replaces.
    stale: Mutex<HashSet<String>>,
    invalidations: AtomicU64,
    compiled: AtomicU64,
}

impl CacheHooks {
    fn new(diagnostics: Arc<DiagnosticManager>) -> Self {
        Self {
            diagnostics,
            invalidating: DashMap::new(),
            compiling: DashMap::new(),
            stale: Mutex::new(HashSet::new()),
            invalidations: AtomicU64::new(0),
            compiled: AtomicU64::new(0),
        }
    }
}

impl CompilerHooks for CacheHooks {
    fn pre_invalidate(&self, path: &str) {
        self.diagnostics.clear_diagnostics(path);
        self.invalidating.insert(path.to_string(), Instant::now());
        self.invalidations.fetch_add(1, Ordering::Relaxed);
    }

    fn post_invalidate(&self, path: &str, will_recompile: bool) {
        if let Some((_, started)) = self.invalidating.remove(path) {
            debug!(
                "invalidated {} in {:?} (recompile: {})",
                path,
                started.elapsed(),
                will_recompile
            );
        }
    }

    fn pre_compile(&self, path: &str) {
        self.stale.lock().insert(path.to_string());
        self.compiling.insert(path.to_string(), Instant::now());
    }

    fn post_compile(&self, path: &str) {
        self.compiled.fetch_add(1, Ordering::Relaxed);
        if let Some((_, started)) = self.compiling.remove(path) {
            debug!("compiled {} in {:?}", path, started.elapsed());
        }
    }
}

/// Per-workspace compilation state.
pub struct Cache {
    roots: Vec<PathBuf>,
    config: ServerConfig,
    index: Arc<RwLock<WorkspaceIndex>>,
    overlay: Arc<Overlay>,
    diagnostics: Arc<DiagnosticManager>,
    synthesizer: Option<Arc<Synthesizer>>,
    resolver: Arc<ResolverChain>,
    hooks: Arc<CacheHooks>,
    compiler: Compiler,
    results: RwLock<HashMap<String, FileResult>>,
    /// Serializes overlay mutations.
    modification: Mutex<()>,
    batches: AtomicU64,
}

fn build_synthesizer(roots: &[PathBuf], config: &SynthesisConfig) -> Option<Arc<Synthesizer>> {
    if !config.enabled {
        return None;
    }
    let modules: Arc<dyn ModuleResolver> = if config.module_dirs.is_empty() {
        let workdir = roots.first()?.clone();
        Arc::new(GoListResolver::new(
            config.go_binary.clone(),
            workdir,
            config.timeout(),
        ))
    } else {
        Arc::new(StaticModuleResolver::new(config.module_dirs.clone()))
    };
    Some(Arc::new(Synthesizer::new(modules, config.rewrite_scope)))
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry.depth() > 0
        && entry
            .file_name()
            .to_str()
            .is_some_and(|name| name.starts_with('.'))
}

fn dir_prefix(uri: &Url) -> String {
    let s = uri.as_str();
    if s.ends_with('/') {
        s.to_string()
    } else {
        format!("{s}/")
    }
}

impl Cache {
    pub fn new(roots: Vec<PathBuf>, config: ServerConfig) -> Self {
        let synthesizer = build_synthesizer(&roots, &config.synthesis);
        Self::with_synthesizer(roots, config, synthesizer)
    }

    /// Creates a cache with an explicit synthesizer, or none.
    pub fn with_synthesizer(
        roots: Vec<PathBuf>,
        config: ServerConfig,
        synthesizer: Option<Arc<Synthesizer>>,
    ) -> Self {
        let index = Arc::new(RwLock::new(WorkspaceIndex::new()));
        let base_index = Arc::clone(&index);
        let base: BaseReader = Arc::new(move |path: &str| {
            let uri = base_index
                .read()
                .uri_for(path)
                .map_err(|e| io::Error::new(io::ErrorKind::NotFound, e.to_string()))?
                .clone();
            let file = uri.to_file_path().map_err(|()| {
                io::Error::new(io::ErrorKind::InvalidInput, format!("{uri} is not a file URI"))
            })?;
            std::fs::read_to_string(file)
        });

        let overlay = Arc::new(Overlay::new(base));
        let diagnostics = Arc::new(DiagnosticManager::new());
        let hooks = Arc::new(CacheHooks::new(Arc::clone(&diagnostics)));
        let resolver = Arc::new(ResolverChain::new(
            Arc::clone(&overlay),
            Arc::clone(&index),
            synthesizer.clone(),
        ));
        let compiler = Compiler::new(
            resolver.clone(),
            diagnostics.clone(),
            hooks.clone(),
            CompilerOptions {
                max_parallelism: config.max_parallelism,
                validate_options: true,
            },
        );

        Self {
            roots,
            config,
            index,
            overlay,
            diagnostics,
            synthesizer,
            resolver,
            hooks,
            compiler,
            results: RwLock::new(HashMap::new()),
            modification: Mutex::new(()),
            batches: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn diagnostics(&self) -> &DiagnosticManager {
        &self.diagnostics
    }

    /// Looks `path` up through the full resolver chain.
    pub fn resolve_import(&self, path: &str) -> Result<SearchResult, ResolveError> {
        self.resolver.find_file_by_path(path)
    }

    pub fn statistics(&self) -> CacheStatistics {
        let (linked, unlinked) = {
            let results = self.results.read();
            let linked = results.values().filter(|r| r.is_linked()).count();
            (linked, results.len() - linked)
        };
        CacheStatistics {
            compile_batches: self.batches.load(Ordering::Relaxed),
            files_compiled: self.hooks.compiled.load(Ordering::Relaxed),
            invalidations: self.hooks.invalidations.load(Ordering::Relaxed),
            linked,
            unlinked,
            indexed: self.index.read().len(),
            overlays: self.overlay.len(),
            synthesis: self
                .synthesizer
                .as_ref()
                .map(|s| s.stats())
                .unwrap_or_default(),
        }
    }

    // ==================== Compilation ====================

    /// Recompiles exactly `paths` and records what each file produced.
    pub fn compile(&self, paths: &[String]) {
        if paths.is_empty() {
            return;
        }
        let mut results = self.results.write();
        self.hooks.stale.lock().clear();
        self.batches.fetch_add(1, Ordering::Relaxed);

        let outcome = self.compiler.compile(paths);
        let stale = std::mem::take(&mut *self.hooks.stale.lock());

        match outcome {
            Ok(result) => {
                let mut produced = HashSet::new();
                for file in &result.files {
                    produced.insert(file.path().to_string());
                    results.insert(file.path().to_string(), FileResult::Linked(Arc::clone(file)));
                }
                for (path, parsed) in result.unlinked {
                    produced.insert(path.clone());
                    results.insert(path, FileResult::Unlinked(parsed));
                }
                for path in stale.difference(&produced) {
                    if matches!(results.get(path), Some(FileResult::Unlinked(_))) {
                        results.remove(path);
                    }
                }
                info!(
                    "compiled {} file(s): {} linked, {} error(s), {} warning(s)",
                    paths.len(),
                    result.files.len(),
                    result.errors,
                    result.warnings
                );
            }
            Err(e) => error!("compile of {:?} aborted: {}", paths, e),
        }
    }

    /// Rebuilds the index from every schema under the workspace roots and
    /// compiles all of them.
    pub fn reindex(&self) {
        let mut discovered = Vec::new();
        for root in &self.roots {
            for entry in WalkDir::new(root).into_iter().filter_entry(|e| !is_hidden(e)) {
                let entry = match entry {
                    Ok(entry) => entry,
                    Err(e) => {
                        warn!("skipping unreadable entry: {}", e);
                        continue;
                    }
                };
                let is_schema = entry.file_type().is_file()
                    && entry.path().extension().and_then(|e| e.to_str())
                        == Some(crate::constants::SCHEMA_EXTENSION);
                if !is_schema {
                    continue;
                }
                let text = match std::fs::read_to_string(entry.path()) {
                    Ok(text) => text,
                    Err(e) => {
                        warn!("cannot read {}: {}", entry.path().display(), e);
                        continue;
                    }
                };
                let Some(path) = canonical_path(entry.path(), &text) else {
                    warn!("{} has no go_package option, skipping", entry.path().display());
                    continue;
                };
                match Url::from_file_path(entry.path()) {
                    Ok(uri) => discovered.push((uri, path)),
                    Err(()) => warn!("cannot build a URI for {}", entry.path().display()),
                }
            }
        }

        // The overlay reads the index under its own lock, so it must not be
        // consulted while the index is held.
        let known: Vec<(Url, String)> = self
            .index
            .read()
            .iter()
            .map(|(uri, path)| (uri.clone(), path.to_string()))
            .collect();
        let open: Vec<(Url, String)> = known
            .into_iter()
            .filter(|(_, path)| self.overlay.contains(path))
            .collect();

        let paths = {
            let mut index = self.index.write();
            index.clear();
            for (uri, path) in discovered.into_iter().chain(open) {
                index.insert(uri, path);
            }
            index.paths()
        };
        self.results.write().retain(|_, result| result.is_linked());

        info!("indexed {} schema file(s)", paths.len());
        self.compile(&paths);
    }

    // ==================== Document events ====================

    fn check_size(&self, uri: &Url, size: usize) -> Result<(), CacheError> {
        let max = self.config.max_document_size;
        if size > max {
            warn!("document {} is too large: {} > {} bytes", uri, size, max);
            return Err(CacheError::DocumentTooLarge {
                uri: uri.clone(),
                size,
                max,
            });
        }
        Ok(())
    }

    pub fn path_for_uri(&self, uri: &Url) -> Result<String, CacheError> {
        Ok(self.index.read().path_for(uri)?.to_string())
    }

    pub fn uri_for_path(&self, path: &str) -> Result<Url, CacheError> {
        Ok(self.index.read().uri_for(path)?.clone())
    }

    /// The path of `uri`, indexing it from `text` if it is not known yet.
    fn path_or_index(&self, uri: &Url, text: &str) -> Result<String, CacheError> {
        let known = self.index.read().path_for(uri).map(str::to_string);
        if let Ok(path) = known {
            return Ok(path);
        }
        let path = canonical_path_for_uri(uri, text)?;
        self.index.write().insert(uri.clone(), path.clone());
        debug!("indexed {} as {}", uri, path);
        Ok(path)
    }

    pub fn on_file_opened(&self, uri: &Url, text: &str) -> Result<(), CacheError> {
        self.check_size(uri, text.len())?;
        let path = {
            let _guard = self.modification.lock();
            let path = self.path_or_index(uri, text)?;
            match self.overlay.create(&path, text) {
                Ok(()) => {}
                Err(OverlayError::AlreadyExists(_)) => self.overlay.replace(&path, text),
                Err(e) => return Err(e.into()),
            }
            path
        };
        self.compile(&[path]);
        Ok(())
    }

    pub fn on_file_closed(&self, uri: &Url) -> Result<(), CacheError> {
        let path = self.path_for_uri(uri)?;
        {
            let _guard = self.modification.lock();
            self.overlay.delete(&path);
        }
        self.compile(&[path]);
        Ok(())
    }

    pub fn on_file_modified(
        &self,
        uri: &Url,
        changes: &[TextDocumentContentChangeEvent],
    ) -> Result<(), CacheError> {
        let path = self.path_for_uri(uri)?;
        {
            let _guard = self.modification.lock();
            self.overlay.update(&path, changes)?;
        }
        self.compile(&[path]);
        Ok(())
    }

    /// Handles a save. If the saved content declares a different
    /// `go_package`, the document moves to its new canonical path.
    pub fn on_file_saved(&self, uri: &Url, text: Option<&str>) -> Result<(), CacheError> {
        let old = self.path_for_uri(uri)?;
        let path = {
            let _guard = self.modification.lock();
            if let Some(text) = text {
                self.overlay.replace(&old, text);
            }
            let content = match text {
                Some(text) => Some(text.to_string()),
                None => self.overlay.content(&old).or_else(|| {
                    uri.to_file_path()
                        .ok()
                        .and_then(|file| std::fs::read_to_string(file).ok())
                }),
            };
            match content.and_then(|c| canonical_path_for_uri(uri, &c).ok()) {
                Some(new) if new != old => {
                    self.remap(uri, &old, &new);
                    new
                }
                _ => old,
            }
        };
        self.compile(&[path]);
        Ok(())
    }

    fn remap(&self, uri: &Url, old: &str, new: &str) {
        info!("{} moved from {} to {}", uri, old, new);
        self.index.write().insert(uri.clone(), new.to_string());
        self.overlay.rename(old, new);
        self.results.write().remove(old);
        self.compiler.forget(&[old.to_string()]);
        self.diagnostics.remove(old);
    }

    /// Indexes a file from disk. Returns its canonical path.
    fn index_from_disk(&self, uri: &Url) -> Option<String> {
        let text = uri
            .to_file_path()
            .ok()
            .and_then(|file| std::fs::read_to_string(file).ok());
        let Some(text) = text else {
            warn!("cannot read {}, not indexing it", uri);
            return None;
        };
        match canonical_path_for_uri(uri, &text) {
            Ok(path) => {
                self.index.write().insert(uri.clone(), path.clone());
                Some(path)
            }
            Err(e) => {
                warn!("not indexing {}: {}", uri, e);
                None
            }
        }
    }

    pub fn on_files_created(&self, uris: &[Url]) {
        let paths: Vec<String> = uris.iter().filter_map(|uri| self.index_from_disk(uri)).collect();
        self.compile(&paths);
    }

    /// Drops deleted files, or every file under a deleted directory, and
    /// recompiles whatever imported them.
    pub fn on_files_deleted(&self, uris: &[Url]) {
        let mut removed = Vec::new();
        {
            let mut index = self.index.write();
            for uri in uris {
                if let Some(path) = index.remove_uri(uri) {
                    removed.push(path);
                    continue;
                }
                let prefix = dir_prefix(uri);
                let beneath: Vec<Url> = index
                    .iter()
                    .filter(|(u, _)| u.as_str().starts_with(&prefix))
                    .map(|(u, _)| u.clone())
                    .collect();
                removed.extend(beneath.iter().filter_map(|u| index.remove_uri(u)));
            }
        }
        if removed.is_empty() {
            return;
        }

        for path in &removed {
            self.overlay.delete(path);
        }
        let importers: Vec<String> = {
            let mut results = self.results.write();
            for path in &removed {
                results.remove(path);
            }
            importers_of(&results, &removed).into_iter().collect()
        };
        self.compiler.forget(&removed);
        for path in &removed {
            self.diagnostics.remove(path);
        }
        info!("removed {} file(s), recompiling {} importer(s)", removed.len(), importers.len());

        let indexed: Vec<String> = {
            let index = self.index.read();
            importers.into_iter().filter(|p| index.contains_path(p)).collect()
        };
        self.compile(&indexed);
    }

    /// Moves files, or every file under a renamed directory, to their new
    /// URIs and recompiles them.
    pub fn on_files_renamed(&self, renames: &[(Url, Url)]) {
        let mut affected = Vec::new();
        for (old, new) in renames {
            let renamed = self.index.write().rename(old, new.clone());
            if let Ok(path) = renamed {
                affected.push(path);
                continue;
            }

            let (from, to) = (dir_prefix(old), dir_prefix(new));
            let moved: Vec<Url> = self
                .index
                .read()
                .iter()
                .filter(|(u, _)| u.as_str().starts_with(&from))
                .map(|(u, _)| u.clone())
                .collect();
            if moved.is_empty() {
                affected.extend(self.index_from_disk(new));
                continue;
            }

            let mut index = self.index.write();
            for uri in moved {
                let target = format!("{}{}", to, &uri.as_str()[from.len()..]);
                match Url::parse(&target) {
                    Ok(target) => affected.extend(index.rename(&uri, target).ok()),
                    Err(e) => warn!("cannot move {} to {}: {}", uri, target, e),
                }
            }
        }
        self.compile(&affected);
    }

    // ==================== Queries ====================

    /// The result of the last compile of `uri`.
    pub fn result(&self, uri: &Url) -> Result<FileResult, CacheError> {
        let path = self.path_for_uri(uri)?;
        self.result_for_path(&path).ok_or(CacheError::NoResult(path))
    }

    pub fn result_for_path(&self, path: &str) -> Option<FileResult> {
        self.results.read().get(path).cloned()
    }

    fn linked(&self, uri: &Url) -> Result<Arc<LinkedFile>, CacheError> {
        match self.result(uri)? {
            FileResult::Linked(file) => Ok(file),
            FileResult::Unlinked(parsed) => Err(CacheError::NotLinked {
                path: parsed.path().to_string(),
            }),
        }
    }

    pub fn get_diagnostics(
        &self,
        uri: &Url,
        prev_result_id: Option<&str>,
    ) -> Result<DiagnosticReport, CacheError> {
        let path = self.path_for_uri(uri)?;
        Ok(self.diagnostics.get_diagnostics(&path, prev_result_id))
    }

    pub fn find_descriptor_at(&self, uri: &Url, position: Position) -> Result<Resolved, CacheError> {
        let file = self.linked(uri)?;
        let results = self.results.read();
        Ok(position::find_descriptor_at(&file, position, &Workspace(&results))?)
    }

    /// Like [`Cache::find_descriptor_at`], but a position with nothing
    /// under it, or in a file that did not link, is `None` rather than an
    /// error.
    fn resolve_at(&self, uri: &Url, position: Position) -> Result<Option<Resolved>, CacheError> {
        match self.find_descriptor_at(uri, position) {
            Ok(resolved) => Ok(Some(resolved)),
            Err(CacheError::Position(e)) => {
                debug!("nothing at {}:{}: {}", position.line, position.character, e);
                Ok(None)
            }
            Err(CacheError::NotLinked { path }) => {
                debug!("{} has errors, no descriptor at {}:{}", path, position.line, position.character);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    pub fn hover(&self, uri: &Url, position: Position) -> Result<Option<Hover>, CacheError> {
        let Some(resolved) = self.resolve_at(uri, position)? else {
            return Ok(None);
        };
        Ok(Some(Hover {
            contents: HoverContents::Markup(MarkupContent {
                kind: MarkupKind::Markdown,
                value: format!("```protobuf\n{}\n```", print_descriptor(&resolved.descriptor)),
            }),
            range: resolved.range.map(span_to_range),
        }))
    }

    pub fn definition(&self, uri: &Url, position: Position) -> Result<Option<Location>, CacheError> {
        let Some(resolved) = self.resolve_at(uri, position)? else {
            return Ok(None);
        };
        Ok(self.declaration_location(&resolved.descriptor))
    }

    /// Where `descriptor` is declared, if that is a workspace file.
    fn declaration_location(&self, descriptor: &Descriptor) -> Option<Location> {
        let path = descriptor.file().name();
        let uri = self.index.read().uri_for(path).ok()?.clone();
        if descriptor.kind() == ElementKind::File {
            return Some(Location {
                uri,
                range: Range::default(),
            });
        }
        let span = match self.results.read().get(path) {
            Some(FileResult::Linked(file)) => file.declaration_of(descriptor).map(|d| d.name_span),
            Some(FileResult::Unlinked(parsed)) => {
                position::find_declaration(parsed.ast(), descriptor.full_name())
            }
            None => None,
        }?;
        Some(Location {
            uri,
            range: span_to_range(span),
        })
    }

    pub fn document_links(&self, uri: &Url) -> Result<Vec<DocumentLink>, CacheError> {
        let result = self.result(uri)?;
        let index = self.index.read();
        Ok(result
            .parsed()
            .ast()
            .imports()
            .filter_map(|import| {
                let target = index.uri_for(&lookup_name(&import.name.value)).ok()?.clone();
                Some(DocumentLink {
                    range: span_to_range(import.name.span),
                    target: Some(target),
                    tooltip: Some(import.name.value.clone()),
                    data: None,
                })
            })
            .collect())
    }

    pub fn semantic_tokens(&self, uri: &Url, range: Option<&Range>) -> Result<Vec<SemanticToken>, CacheError> {
        let result = self.result(uri)?;
        Ok(semantic::semantic_tokens(result.parsed(), range))
    }

    pub fn document_symbols(&self, uri: &Url) -> Result<Vec<DocumentSymbol>, CacheError> {
        let result = self.result(uri)?;
        Ok(symbols::document_symbols(result.parsed().ast()))
    }

    pub fn inlay_hints(&self, uri: &Url, range: Option<&Range>) -> Result<Vec<InlayHint>, CacheError> {
        let FileResult::Linked(file) = self.result(uri)? else {
            return Ok(Vec::new());
        };
        let results = self.results.read();
        Ok(hints::inlay_hints(&file, &Workspace(&results), range))
    }

    /// A single whole-document edit to the canonical layout, or nothing if
    /// the document is already formatted or does not parse.
    pub fn format(&self, uri: &Url) -> Result<Vec<TextEdit>, CacheError> {
        let result = self.result(uri)?;
        let parsed = result.parsed();
        let Some(formatted) = format_file(parsed) else {
            debug!("{} has syntax errors, not formatting", parsed.path());
            return Ok(Vec::new());
        };
        if formatted == parsed.source() {
            return Ok(Vec::new());
        }
        Ok(vec![TextEdit {
            range: Range::new(Position::new(0, 0), end_position(parsed.source())),
            new_text: formatted,
        }])
    }
}

/// Paths in `results` that import any of `removed`.
fn importers_of(results: &HashMap<String, FileResult>, removed: &[String]) -> BTreeSet<String> {
    let removed: HashSet<&str> = removed.iter().map(String::as_str).collect();
    results
        .iter()
        .filter(|(_, result)| match result {
            FileResult::Linked(file) => file
                .descriptor()
                .dependencies()
                .iter()
                .any(|d| removed.contains(d.as_str())),
            FileResult::Unlinked(parsed) => parsed
                .ast()
                .imports()
                .any(|i| removed.contains(lookup_name(&i.name.value).as_ref())),
        })
        .map(|(path, _)| path.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn cache(tmp: &TempDir) -> Cache {
        let config = ServerConfig {
            synthesis: SynthesisConfig {
                enabled: false,
                ..SynthesisConfig::default()
            },
            ..ServerConfig::default()
        };
        Cache::new(vec![tmp.path().to_path_buf()], config)
    }

    fn write(tmp: &TempDir, name: &str, text: &str) -> Url {
        let file = tmp.path().join(name);
        std::fs::write(&file, text).unwrap();
        Url::from_file_path(file).unwrap()
    }

    const A: &str = "syntax = \"proto3\";\npackage a;\noption go_package = \"example.com/a\";\nmessage A { int32 x = 1; }\n";

    #[test]
    fn test_open_indexes_and_links() {
        let tmp = TempDir::new().unwrap();
        let cache = cache(&tmp);
        let uri = write(&tmp, "a.proto", A);
        cache.on_file_opened(&uri, A).unwrap();
        assert_eq!(cache.path_for_uri(&uri).unwrap(), "example.com/a/a.proto");
        assert!(cache.result(&uri).unwrap().is_linked());
        let stats = cache.statistics();
        assert_eq!(stats.linked, 1);
        assert_eq!(stats.overlays, 1);
    }

    #[test]
    fn test_open_without_go_package_fails() {
        let tmp = TempDir::new().unwrap();
        let cache = cache(&tmp);
        let uri = write(&tmp, "x.proto", "syntax = \"proto3\";\n");
        assert!(matches!(
            cache.on_file_opened(&uri, "syntax = \"proto3\";\n"),
            Err(CacheError::Index(_))
        ));
    }

    #[test]
    fn test_document_too_large() {
        let tmp = TempDir::new().unwrap();
        let config = ServerConfig {
            max_document_size: 8,
            ..ServerConfig::default()
        };
        let cache = Cache::with_synthesizer(vec![tmp.path().to_path_buf()], config, None);
        let uri = write(&tmp, "a.proto", A);
        assert!(matches!(
            cache.on_file_opened(&uri, A),
            Err(CacheError::DocumentTooLarge { max: 8, .. })
        ));
    }

    #[test]
    fn test_unknown_uri() {
        let tmp = TempDir::new().unwrap();
        let cache = cache(&tmp);
        let uri = Url::from_file_path(tmp.path().join("none.proto")).unwrap();
        assert!(matches!(cache.hover(&uri, Position::new(0, 0)), Err(CacheError::Index(_))));
    }

    #[test]
    fn test_hover_and_nothing_under_cursor() {
        let tmp = TempDir::new().unwrap();
        let cache = cache(&tmp);
        let uri = write(&tmp, "a.proto", A);
        cache.on_file_opened(&uri, A).unwrap();

        let hover = cache.hover(&uri, Position::new(3, 8)).unwrap().unwrap();
        let HoverContents::Markup(markup) = hover.contents else {
            panic!("expected markup");
        };
        assert!(markup.value.starts_with("```protobuf\n"));
        assert!(markup.value.contains("message A"));

        assert_eq!(cache.hover(&uri, Position::new(3, 40)).unwrap(), None);
    }

    #[test]
    fn test_format_is_whole_document() {
        let tmp = TempDir::new().unwrap();
        let cache = cache(&tmp);
        let messy = "syntax = \"proto3\";\noption go_package = \"example.com/f\";\nmessage   F {int32 x=1;}\n";
        let uri = write(&tmp, "f.proto", messy);
        cache.on_file_opened(&uri, messy).unwrap();
        let edits = cache.format(&uri).unwrap();
        assert_eq!(edits.len(), 1);
        assert_eq!(edits[0].range.start, Position::new(0, 0));
        assert_eq!(edits[0].range.end, Position::new(3, 0));
    }

    #[test]
    fn test_reindex_skips_hidden_and_unpackaged() {
        let tmp = TempDir::new().unwrap();
        write(&tmp, "a.proto", A);
        write(&tmp, "plain.proto", "syntax = \"proto3\";\n");
        std::fs::create_dir_all(tmp.path().join(".git")).unwrap();
        write(&tmp, ".git/hidden.proto", A);
        let cache = cache(&tmp);
        cache.reindex();
        let stats = cache.statistics();
        assert_eq!(stats.indexed, 1);
        assert_eq!(stats.linked, 1);
    }
}
