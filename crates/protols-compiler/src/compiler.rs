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

//! Compile driver.
//!
//! [`Compiler::compile`] loads the requested files and everything they
//! import through a [`Resolver`], parses sources in parallel, links in
//! dependency order and reports problems through a [`Reporter`]. Linked
//! files are retained between calls, so a later compile only redoes the
//! files it is asked for plus whatever had to be dropped because it
//! imported one of them.
//!
//! # Invalidation
//!
//! - A requested path that was retained is invalidated through the
//!   [`CompilerHooks`] and recompiled.
//! - Retained files that (transitively) import it are dropped without
//!   hooks; they are recompiled, with hooks, the next time something needs
//!   them.
//! - A source file compiled without having been retained is invalidated
//!   first, so its previous diagnostics are gone before new ones arrive.

use crate::descriptor::FileDescriptor;
use crate::error::{CompileError, ErrorKind, ErrorWithPos, ResolveError};
use crate::linker::{link, LinkedFile};
use crate::parser::{parse, ParsedFile};
use crate::wellknown;
use parking_lot::Mutex;
use prost_types::FileDescriptorProto;
use rayon::prelude::*;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, warn};

/// What a [`Resolver`] found for an import path. Exactly one form.
#[derive(Debug, Clone)]
pub enum SearchResult {
    /// Schema source text, to be parsed and linked.
    Source(String),
    /// A serialized descriptor, accepted as is once its imports resolve.
    Proto(FileDescriptorProto),
    /// A descriptor built elsewhere, such as the well-known registry.
    Descriptor(Arc<FileDescriptor>),
}

/// Supplies file contents by import path.
pub trait Resolver: Send + Sync {
    fn find_file_by_path(&self, path: &str) -> Result<SearchResult, ResolveError>;
}

/// Receives problems found while compiling.
pub trait Reporter: Send + Sync {
    /// Called for each error. Returning `Err` aborts the compile.
    fn error(&self, err: ErrorWithPos) -> Result<(), ErrorWithPos>;

    fn warning(&self, warning: ErrorWithPos);
}

/// Observation points around invalidation and compilation of source files.
#[allow(unused_variables)]
pub trait CompilerHooks: Send + Sync {
    fn pre_invalidate(&self, path: &str) {}

    /// `will_recompile` is false when the file is only being forgotten.
    fn post_invalidate(&self, path: &str, will_recompile: bool) {}

    fn pre_compile(&self, path: &str) {}

    fn post_compile(&self, path: &str) {}
}

/// Hooks that do nothing.
pub struct NoHooks;

impl CompilerHooks for NoHooks {}

/// Reporter that aborts on the first error.
pub struct FailFast;

impl Reporter for FailFast {
    fn error(&self, err: ErrorWithPos) -> Result<(), ErrorWithPos> {
        Err(err)
    }

    fn warning(&self, warning: ErrorWithPos) {
        debug!(%warning, "compile warning");
    }
}

#[derive(Debug, Clone)]
pub struct CompilerOptions {
    /// Upper bound on parser threads; 0 uses the global rayon pool.
    pub max_parallelism: usize,
    /// Check built-in option names against `google/protobuf/descriptor.proto`.
    pub validate_options: bool,
}

impl Default for CompilerOptions {
    fn default() -> Self {
        Self {
            max_parallelism: 0,
            validate_options: true,
        }
    }
}

/// Outcome of one [`Compiler::compile`] call.
#[derive(Debug, Default)]
pub struct CompileResult {
    /// Every file linked from source during this call, requested or not.
    pub files: Vec<Arc<LinkedFile>>,
    /// Source files that parsed (possibly with errors) but did not link.
    pub unlinked: HashMap<String, Arc<ParsedFile>>,
    pub errors: usize,
    pub warnings: usize,
}

impl CompileResult {
    pub fn linked(&self, path: &str) -> Option<&Arc<LinkedFile>> {
        self.files.iter().find(|f| f.path() == path)
    }
}

struct Retained {
    descriptor: Arc<FileDescriptor>,
    imports: Vec<String>,
}

enum Loaded {
    Source {
        parsed: Arc<ParsedFile>,
        syntax_errors: Vec<ErrorWithPos>,
    },
    Proto(FileDescriptorProto),
    Descriptor(Arc<FileDescriptor>),
    Missing(ResolveError),
}

impl Loaded {
    fn imports(&self) -> Vec<String> {
        match self {
            Loaded::Source { parsed, .. } => parsed
                .ast()
                .imports()
                .map(|i| i.name.value.clone())
                .collect(),
            Loaded::Proto(p) => p.dependency.clone(),
            Loaded::Descriptor(_) | Loaded::Missing(_) => Vec::new(),
        }
    }
}

/// Incremental schema compiler.
pub struct Compiler {
    resolver: Arc<dyn Resolver>,
    reporter: Arc<dyn Reporter>,
    hooks: Arc<dyn CompilerHooks>,
    options: CompilerOptions,
    pool: Option<rayon::ThreadPool>,
    retained: Mutex<HashMap<String, Retained>>,
}

impl Compiler {
    pub fn new(
        resolver: Arc<dyn Resolver>,
        reporter: Arc<dyn Reporter>,
        hooks: Arc<dyn CompilerHooks>,
        options: CompilerOptions,
    ) -> Self {
        let pool = if options.max_parallelism > 0 {
            match rayon::ThreadPoolBuilder::new()
                .num_threads(options.max_parallelism)
                .build()
            {
                Ok(pool) => Some(pool),
                Err(e) => {
                    warn!("failed to create compiler thread pool, using the global pool: {e}");
                    None
                }
            }
        } else {
            None
        };
        Self {
            resolver,
            reporter,
            hooks,
            options,
            pool,
            retained: Mutex::new(HashMap::new()),
        }
    }

    /// Paths currently retained from earlier compiles.
    pub fn retained_paths(&self) -> Vec<String> {
        self.retained.lock().keys().cloned().collect()
    }

    /// Drops `paths` and every retained file that imports them, without
    /// recompiling anything.
    pub fn forget(&self, paths: &[String]) {
        let mut retained = self.retained.lock();
        let mut dropped: HashSet<String> = HashSet::new();
        for path in paths {
            if retained.remove(path).is_some() {
                self.hooks.pre_invalidate(path);
                self.hooks.post_invalidate(path, false);
            }
            dropped.insert(path.clone());
        }
        drop_dependents(&mut retained, dropped);
    }

    /// Compiles `paths` and, as needed, their imports.
    pub fn compile(&self, paths: &[String]) -> Result<CompileResult, CompileError> {
        let mut retained = self.retained.lock();
        let mut invalidated = HashSet::new();

        let mut stale = HashSet::new();
        for path in paths {
            if retained.remove(path).is_some() {
                self.hooks.pre_invalidate(path);
                invalidated.insert(path.clone());
                self.hooks.post_invalidate(path, true);
            }
            stale.insert(path.clone());
        }
        drop_dependents(&mut retained, stale);

        let loaded = self.load(paths, &retained);

        let mut run = Run {
            compiler: self,
            retained: &mut retained,
            loaded,
            built: HashMap::new(),
            missing: HashMap::new(),
            invalidated,
            result: CompileResult::default(),
            builtin_options: if self.options.validate_options {
                wellknown::descriptor_proto_file()
            } else {
                None
            },
        };
        for path in paths {
            run.build(path, &mut Vec::new())?;
        }
        let result = run.result;
        debug!(
            requested = paths.len(),
            linked = result.files.len(),
            unlinked = result.unlinked.len(),
            errors = result.errors,
            "compile finished"
        );
        Ok(result)
    }

    /// Resolves every path reachable from `roots` that is not retained,
    /// one import level at a time, parsing each level in parallel.
    fn load(
        &self,
        roots: &[String],
        retained: &HashMap<String, Retained>,
    ) -> HashMap<String, Loaded> {
        let mut loaded: HashMap<String, Loaded> = HashMap::new();
        let mut frontier: Vec<String> = roots.to_vec();
        frontier.dedup();

        while !frontier.is_empty() {
            let level: Vec<(String, Loaded)> = match &self.pool {
                Some(pool) => pool.install(|| self.load_level(&frontier)),
                None => self.load_level(&frontier),
            };
            let mut next = Vec::new();
            for (path, file) in level {
                for import in file.imports() {
                    if !retained.contains_key(&import)
                        && !loaded.contains_key(&import)
                        && !next.contains(&import)
                        && import != path
                        && !frontier.contains(&import)
                    {
                        next.push(import);
                    }
                }
                loaded.insert(path, file);
            }
            frontier = next;
        }
        loaded
    }

    fn load_level(&self, paths: &[String]) -> Vec<(String, Loaded)> {
        paths
            .par_iter()
            .map(|path| {
                let file = match self.resolver.find_file_by_path(path) {
                    Ok(SearchResult::Source(text)) => {
                        let (parsed, syntax_errors) = parse(path, &text);
                        Loaded::Source {
                            parsed: Arc::new(parsed),
                            syntax_errors,
                        }
                    }
                    Ok(SearchResult::Proto(proto)) => Loaded::Proto(proto),
                    Ok(SearchResult::Descriptor(d)) => Loaded::Descriptor(d),
                    Err(e) => Loaded::Missing(e),
                };
                (path.clone(), file)
            })
            .collect()
    }
}

/// Removes, transitively, every retained file that imports a path in `stale`.
fn drop_dependents(retained: &mut HashMap<String, Retained>, mut stale: HashSet<String>) {
    loop {
        let dependents: Vec<String> = retained
            .iter()
            .filter(|(_, r)| r.imports.iter().any(|i| stale.contains(i)))
            .map(|(p, _)| p.clone())
            .collect();
        if dependents.is_empty() {
            return;
        }
        for path in dependents {
            debug!(path = %path, "dropping retained dependent");
            retained.remove(&path);
            stale.insert(path);
        }
    }
}

/// State of one compile call.
struct Run<'a> {
    compiler: &'a Compiler,
    retained: &'a mut HashMap<String, Retained>,
    loaded: HashMap<String, Loaded>,
    /// Memoized outcome per path; `None` means the file could not be built.
    built: HashMap<String, Option<Arc<FileDescriptor>>>,
    /// Why a path could not be provided, for diagnostics at its importers.
    missing: HashMap<String, String>,
    invalidated: HashSet<String>,
    result: CompileResult,
    builtin_options: Option<Arc<FileDescriptor>>,
}

impl Run<'_> {
    fn report_error(&mut self, err: ErrorWithPos) -> Result<(), CompileError> {
        self.result.errors += 1;
        self.compiler
            .reporter
            .error(err)
            .map_err(CompileError::Aborted)
    }

    fn report_warning(&mut self, warning: ErrorWithPos) {
        self.result.warnings += 1;
        self.compiler.reporter.warning(warning);
    }

    fn build(
        &mut self,
        path: &str,
        stack: &mut Vec<String>,
    ) -> Result<Option<Arc<FileDescriptor>>, CompileError> {
        if let Some(done) = self.built.get(path) {
            return Ok(done.clone());
        }
        if let Some(r) = self.retained.get(path) {
            return Ok(Some(Arc::clone(&r.descriptor)));
        }
        let Some(loaded) = self.loaded.remove(path) else {
            return Ok(None);
        };

        stack.push(path.to_string());
        let outcome = match loaded {
            Loaded::Source {
                parsed,
                syntax_errors,
            } => self.build_source(path, parsed, syntax_errors, stack),
            Loaded::Proto(proto) => self.build_proto(path, proto, stack),
            Loaded::Descriptor(d) => {
                self.retain(path, Arc::clone(&d));
                Ok(Some(d))
            }
            Loaded::Missing(e) => {
                self.missing.insert(path.to_string(), e.to_string());
                Ok(None)
            }
        };
        stack.pop();

        let outcome = outcome?;
        self.built.insert(path.to_string(), outcome.clone());
        Ok(outcome)
    }

    fn retain(&mut self, path: &str, descriptor: Arc<FileDescriptor>) {
        let imports = descriptor.dependencies().to_vec();
        self.retained.insert(
            path.to_string(),
            Retained {
                descriptor,
                imports,
            },
        );
    }

    fn build_proto(
        &mut self,
        path: &str,
        proto: FileDescriptorProto,
        stack: &mut Vec<String>,
    ) -> Result<Option<Arc<FileDescriptor>>, CompileError> {
        let mut deps = Vec::with_capacity(proto.dependency.len());
        for dep in &proto.dependency {
            let built = if stack.contains(dep) {
                None
            } else {
                self.build(dep, stack)?
            };
            match built {
                Some(d) => deps.push(d),
                None => {
                    warn!(path, dep = %dep, "descriptor dependency unavailable");
                    self.missing
                        .insert(path.to_string(), format!("dependency {dep:?} is unavailable"));
                    return Ok(None);
                }
            }
        }
        match FileDescriptor::from_proto(&proto, deps) {
            Ok(fd) => {
                let fd = Arc::new(fd);
                self.retain(path, Arc::clone(&fd));
                Ok(Some(fd))
            }
            Err(e) => {
                warn!(path, "rejected descriptor: {e}");
                self.missing.insert(path.to_string(), e.to_string());
                Ok(None)
            }
        }
    }

    fn build_source(
        &mut self,
        path: &str,
        parsed: Arc<ParsedFile>,
        syntax_errors: Vec<ErrorWithPos>,
        stack: &mut Vec<String>,
    ) -> Result<Option<Arc<FileDescriptor>>, CompileError> {
        let hooks = Arc::clone(&self.compiler.hooks);
        if self.invalidated.insert(path.to_string()) {
            hooks.pre_invalidate(path);
            hooks.post_invalidate(path, true);
        }
        hooks.pre_compile(path);

        let outcome = self.link_source(path, parsed, syntax_errors, stack);
        hooks.post_compile(path);
        outcome
    }

    fn link_source(
        &mut self,
        path: &str,
        parsed: Arc<ParsedFile>,
        syntax_errors: Vec<ErrorWithPos>,
        stack: &mut Vec<String>,
    ) -> Result<Option<Arc<FileDescriptor>>, CompileError> {
        for err in syntax_errors {
            self.report_error(err)?;
        }

        let imports: Vec<(String, _)> = parsed
            .ast()
            .imports()
            .map(|i| (i.name.value.clone(), i.name.span))
            .collect();
        let mut deps = Vec::with_capacity(imports.len());
        let mut complete = true;
        for (import, span) in imports {
            if stack.contains(&import) {
                complete = false;
                self.report_error(ErrorWithPos::new(
                    ErrorKind::ImportCycle,
                    format!("import cycle: {} -> {import}", stack.join(" -> ")),
                    path,
                    span,
                ))?;
                continue;
            }
            match self.build(&import, stack)? {
                Some(d) => deps.push(d),
                None => {
                    complete = false;
                    let reason = self
                        .missing
                        .get(&import)
                        .cloned()
                        .unwrap_or_else(|| "the imported file has errors".to_string());
                    self.report_error(ErrorWithPos::import_not_found(&import, &reason, path, span))?;
                }
            }
        }

        if parsed.has_errors() || !complete {
            self.result
                .unlinked
                .insert(path.to_string(), Arc::clone(&parsed));
            return Ok(None);
        }

        let outcome = link(Arc::clone(&parsed), deps, self.builtin_options.clone());
        for warning in outcome.warnings {
            self.report_warning(warning);
        }
        for err in outcome.errors {
            self.report_error(err)?;
        }
        match outcome.linked {
            Some(linked) => {
                let linked = Arc::new(linked);
                let descriptor = Arc::clone(linked.descriptor());
                self.retain(path, Arc::clone(&descriptor));
                self.result.files.push(linked);
                Ok(Some(descriptor))
            }
            None => {
                self.result.unlinked.insert(path.to_string(), parsed);
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct MapResolver(HashMap<String, String>);

    impl Resolver for MapResolver {
        fn find_file_by_path(&self, path: &str) -> Result<SearchResult, ResolveError> {
            self.0
                .get(path)
                .map(|s| SearchResult::Source(s.clone()))
                .ok_or_else(|| ResolveError::not_found(path))
        }
    }

    #[derive(Default)]
    struct Collect(Mutex<Vec<ErrorWithPos>>);

    impl Reporter for Collect {
        fn error(&self, err: ErrorWithPos) -> Result<(), ErrorWithPos> {
            self.0.lock().push(err);
            Ok(())
        }

        fn warning(&self, warning: ErrorWithPos) {
            self.0.lock().push(warning);
        }
    }

    fn compiler(files: &[(&str, &str)]) -> (Compiler, Arc<Collect>) {
        let resolver = MapResolver(
            files
                .iter()
                .map(|(p, s)| (p.to_string(), s.to_string()))
                .collect(),
        );
        let reporter = Arc::new(Collect::default());
        let c = Compiler::new(
            Arc::new(resolver),
            reporter.clone(),
            Arc::new(NoHooks),
            CompilerOptions {
                max_parallelism: 2,
                validate_options: false,
            },
        );
        (c, reporter)
    }

    #[test]
    fn test_compiles_dependencies_in_order() {
        let (c, reporter) = compiler(&[
            ("a.proto", "import \"b.proto\"; message A { B b = 1; }"),
            ("b.proto", "message B {}"),
        ]);
        let result = c.compile(&["a.proto".to_string()]).unwrap();
        assert!(reporter.0.lock().is_empty());
        assert!(result.linked("a.proto").is_some());
        assert!(result.linked("b.proto").is_some());
        let mut retained = c.retained_paths();
        retained.sort();
        assert_eq!(retained, vec!["a.proto", "b.proto"]);
    }

    #[test]
    fn test_missing_import_reported_at_literal() {
        let (c, reporter) = compiler(&[("a.proto", "import \"nope.proto\";\nmessage A {}")]);
        let result = c.compile(&["a.proto".to_string()]).unwrap();
        assert!(result.unlinked.contains_key("a.proto"));
        let errors = reporter.0.lock();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].kind, ErrorKind::ImportNotFound);
        assert_eq!(errors[0].span.start().line(), 1);
        assert_eq!(errors[0].span.start().column(), 8);
    }

    #[test]
    fn test_import_cycle() {
        let (c, reporter) = compiler(&[
            ("a.proto", "import \"b.proto\";"),
            ("b.proto", "import \"a.proto\";"),
        ]);
        let result = c.compile(&["a.proto".to_string()]).unwrap();
        assert!(result.files.is_empty());
        let errors = reporter.0.lock();
        assert!(errors.iter().any(|e| e.kind == ErrorKind::ImportCycle));
    }

    #[test]
    fn test_recompile_drops_dependents() {
        let (c, _) = compiler(&[
            ("a.proto", "import \"b.proto\"; message A { B b = 1; }"),
            ("b.proto", "message B {}"),
        ]);
        c.compile(&["a.proto".to_string()]).unwrap();
        let result = c.compile(&["b.proto".to_string()]).unwrap();
        assert_eq!(result.files.len(), 1);
        assert_eq!(c.retained_paths(), vec!["b.proto"]);
    }

    #[test]
    fn test_fail_fast_aborts() {
        let resolver = MapResolver(
            [("a.proto".to_string(), "message A { X x = 1; }".to_string())]
                .into_iter()
                .collect(),
        );
        let c = Compiler::new(
            Arc::new(resolver),
            Arc::new(FailFast),
            Arc::new(NoHooks),
            CompilerOptions::default(),
        );
        let err = c.compile(&["a.proto".to_string()]).unwrap_err();
        assert!(matches!(err, CompileError::Aborted(e) if e.kind == ErrorKind::UnresolvedReference));
    }
}
