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

//! Linking: turns a parsed file plus its resolved imports into a
//! [`LinkedFile`].
//!
//! # Phases
//!
//! 1. **Declare** every element, synthesizing `map<K, V>` entry messages,
//!    and record which syntax node declares which element.
//! 2. **Resolve** type references, rpc signatures and extendees with
//!    protobuf scoping (innermost scope outwards, leading dot = absolute).
//! 3. **Options**: resolve option names, built-in fields against
//!    `google/protobuf/descriptor.proto` and extension names against the
//!    visible extensions.
//! 4. **Imports**: warn about imports no symbol was resolved from.
//!
//! Symbols of `import public` files are visible through the importing file
//! and count as uses of that import.

use crate::ast::*;
use crate::descriptor::{
    Descriptor, ElementDetail, ElementId, ElementKind, FieldInfo, FieldType,
    FileDescriptor, FileDescriptorBuilder, Label, MethodInfo, OptionEntry,
};
use crate::error::{ErrorKind, ErrorWithPos};
use crate::parser::ParsedFile;
use crate::span::SourceSpan;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

const MAX_FIELD_NUMBER: u64 = 536_870_911;
const RESERVED_NUMBERS: std::ops::RangeInclusive<u64> = 19_000..=19_999;

/// What a syntax node refers to in the linked descriptor.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeDescriptor {
    /// A declaration. A `map<K, V>` field node maps to its synthetic entry
    /// message.
    Element(ElementId),
    /// An option statement.
    Option(OptionTarget),
    /// One component of an option name.
    OptionNamePart(OptionNamePart),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptionNamePart {
    /// Fully-qualified name of the option field or extension.
    pub name: String,
    pub is_extension: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptionTarget {
    /// Options message the name is resolved against, e.g.
    /// `google.protobuf.FieldOptions`.
    pub options_message: String,
    pub parts: Vec<OptionNamePart>,
}

/// Where an element is declared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Declaration {
    pub node: NodeId,
    pub span: SourceSpan,
    pub name_span: SourceSpan,
}

/// A fully resolved file.
#[derive(Debug)]
pub struct LinkedFile {
    parsed: Arc<ParsedFile>,
    descriptor: Arc<FileDescriptor>,
    node_descriptors: HashMap<NodeId, NodeDescriptor>,
    declarations: HashMap<ElementId, Declaration>,
}

impl LinkedFile {
    pub fn path(&self) -> &str {
        self.parsed.path()
    }

    pub fn parsed(&self) -> &Arc<ParsedFile> {
        &self.parsed
    }

    pub fn ast(&self) -> &FileNode {
        self.parsed.ast()
    }

    pub fn descriptor(&self) -> &Arc<FileDescriptor> {
        &self.descriptor
    }

    pub fn node_descriptor(&self, node: NodeId) -> Option<&NodeDescriptor> {
        self.node_descriptors.get(&node)
    }

    pub fn declaration(&self, element: ElementId) -> Option<&Declaration> {
        self.declarations.get(&element)
    }

    /// Declaration of a descriptor from this file, matched by name so that
    /// handles from an older compile of the same file still resolve.
    pub fn declaration_of(&self, descriptor: &Descriptor) -> Option<&Declaration> {
        if descriptor.kind() == ElementKind::File {
            return self.declarations.get(&ElementId::FILE);
        }
        self.descriptor
            .find(descriptor.full_name())
            .and_then(|id| self.declarations.get(&id))
    }
}

pub(crate) struct LinkOutcome {
    pub linked: Option<LinkedFile>,
    pub errors: Vec<ErrorWithPos>,
    pub warnings: Vec<ErrorWithPos>,
}

/// Links `parsed` against `deps`, which must hold one resolved descriptor
/// per import, in import order.
///
/// `builtin_options` is the descriptor of `google/protobuf/descriptor.proto`
/// used to check built-in option names; `None` skips that check.
pub(crate) fn link(
    parsed: Arc<ParsedFile>,
    deps: Vec<Arc<FileDescriptor>>,
    builtin_options: Option<Arc<FileDescriptor>>,
) -> LinkOutcome {
    let ast = parsed.ast();
    let package = ast.package().map(|p| p.name.value()).unwrap_or_default();
    let syntax = ast
        .syntax
        .as_ref()
        .map(|s| s.value.value.clone())
        .unwrap_or_else(|| "proto2".to_string());

    let mut builder = FileDescriptorBuilder::new(parsed.path(), &package, &syntax);
    let imports: Vec<&ImportNode> = ast.imports().collect();
    builder.dependencies = imports.iter().map(|i| i.name.value.clone()).collect();
    builder.public_dependencies = imports
        .iter()
        .enumerate()
        .filter(|(_, i)| i.is_public())
        .map(|(n, _)| n)
        .collect();

    let mut linker = Linker {
        file: parsed.as_ref(),
        deps: deps.as_slice(),
        builder,
        symbols: HashMap::new(),
        used_imports: vec![false; deps.len()],
        node_descriptors: HashMap::new(),
        declarations: HashMap::new(),
        pending: Vec::new(),
        pending_options: Vec::new(),
        builtin_options,
        errors: Vec::new(),
        warnings: Vec::new(),
    };

    linker.declarations.insert(
        ElementId::FILE,
        Declaration {
            node: ast.id,
            span: ast.span,
            name_span: ast.span,
        },
    );
    linker.node_descriptors.insert(ast.id, NodeDescriptor::Element(ElementId::FILE));

    linker.declare_file(ast);
    linker.register_imported_symbols();
    linker.register_local_symbols();
    linker.resolve_references();
    linker.resolve_options();
    linker.check_unused_imports(&imports);

    let Linker {
        builder,
        node_descriptors,
        declarations,
        errors,
        warnings,
        ..
    } = linker;

    let linked = errors.is_empty().then(|| LinkedFile {
        parsed: Arc::clone(&parsed),
        descriptor: Arc::new(builder.finish(deps.clone())),
        node_descriptors,
        declarations,
    });
    LinkOutcome {
        linked,
        errors,
        warnings,
    }
}

#[derive(Clone)]
enum Symbol {
    Package,
    Local(ElementId),
    Imported { import: usize, descriptor: Descriptor },
}

enum RefTarget {
    FieldType(ElementId),
    MethodInput(ElementId),
    MethodOutput(ElementId),
    Extendee(ElementId),
}

struct PendingRef {
    target: RefTarget,
    name: String,
    scope: String,
    span: SourceSpan,
}

struct PendingOption<'a> {
    node: &'a OptionNode,
    options_message: &'static str,
    scope: String,
    owner: ElementId,
}

struct Linker<'a> {
    file: &'a ParsedFile,
    deps: &'a [Arc<FileDescriptor>],
    builder: FileDescriptorBuilder,
    symbols: HashMap<String, Symbol>,
    used_imports: Vec<bool>,
    node_descriptors: HashMap<NodeId, NodeDescriptor>,
    declarations: HashMap<ElementId, Declaration>,
    pending: Vec<PendingRef>,
    pending_options: Vec<PendingOption<'a>>,
    builtin_options: Option<Arc<FileDescriptor>>,
    errors: Vec<ErrorWithPos>,
    warnings: Vec<ErrorWithPos>,
}

impl<'a> Linker<'a> {
    fn error(&mut self, kind: ErrorKind, message: String, span: SourceSpan) {
        self.errors
            .push(ErrorWithPos::new(kind, message, self.file.path(), span));
    }

    fn scope(&self, id: ElementId) -> String {
        self.builder.scope_of(id).to_string()
    }

    // ------------------------------------------------------------------
    // Phase 1: declarations
    // ------------------------------------------------------------------

    fn declare(
        &mut self,
        kind: ElementKind,
        name: &IdentNode,
        parent: ElementId,
        detail: ElementDetail,
        node: NodeId,
        span: SourceSpan,
    ) -> ElementId {
        let id = match self.builder.add(kind, &name.value, parent, detail) {
            Ok(id) => id,
            Err(id) => {
                let full_name = self.builder.elements[id.0 as usize].full_name.clone();
                self.error(
                    ErrorKind::DuplicateSymbol,
                    format!("{full_name:?} is already defined"),
                    name.span,
                );
                id
            }
        };
        self.node_descriptors.insert(node, NodeDescriptor::Element(id));
        self.declarations.insert(
            id,
            Declaration {
                node,
                span,
                name_span: name.span,
            },
        );
        id
    }

    fn option(&mut self, node: &'a OptionNode, options_message: &'static str, owner: ElementId, scope: String) {
        self.pending_options.push(PendingOption {
            node,
            options_message,
            scope,
            owner,
        });
    }

    fn compact_options(
        &mut self,
        options: &'a Option<CompactOptionsNode>,
        options_message: &'static str,
        owner: ElementId,
        scope: &str,
    ) {
        if let Some(c) = options {
            for o in &c.options {
                self.option(o, options_message, owner, scope.to_string());
            }
        }
    }

    fn declare_file(&mut self, ast: &'a FileNode) {
        let package = self.builder.package.clone();
        for decl in &ast.decls {
            match decl {
                FileElement::Option(o) => {
                    self.option(o, "google.protobuf.FileOptions", ElementId::FILE, package.clone())
                }
                FileElement::Message(m) => {
                    self.message(m, ElementId::FILE);
                }
                FileElement::Enum(e) => self.enumeration(e, ElementId::FILE),
                FileElement::Service(s) => self.service(s),
                FileElement::Extend(x) => self.extend(x, ElementId::FILE),
                FileElement::Package(_) | FileElement::Import(_) | FileElement::Empty(_) => {}
            }
        }
    }

    fn message(&mut self, m: &'a MessageNode, parent: ElementId) -> ElementId {
        let id = self.declare(
            ElementKind::Message,
            &m.name,
            parent,
            ElementDetail::Message { map_entry: false },
            m.id,
            m.span,
        );
        let scope = self.scope(id);
        let mut numbers: Vec<(u64, SourceSpan)> = Vec::new();

        for decl in &m.decls {
            match decl {
                MessageElement::Field(f) => {
                    self.field(f, id, ElementKind::Field, None, &scope);
                    numbers.push((f.tag.value, f.tag.span));
                }
                MessageElement::MapField(mf) => {
                    self.map_field(mf, id, &scope);
                    numbers.push((mf.tag.value, mf.tag.span));
                }
                MessageElement::Oneof(o) => {
                    let oneof = self.declare(ElementKind::Oneof, &o.name, id, ElementDetail::None, o.id, o.span);
                    for od in &o.decls {
                        match od {
                            OneofElement::Field(f) => {
                                self.field(f, id, ElementKind::Field, Some(oneof), &scope);
                                numbers.push((f.tag.value, f.tag.span));
                            }
                            OneofElement::Option(op) => {
                                self.option(op, "google.protobuf.OneofOptions", oneof, scope.clone())
                            }
                            OneofElement::Empty(_) => {}
                        }
                    }
                }
                MessageElement::Message(n) => {
                    self.message(n, id);
                }
                MessageElement::Enum(e) => self.enumeration(e, id),
                MessageElement::Extend(x) => self.extend(x, id),
                MessageElement::Option(o) => {
                    self.option(o, "google.protobuf.MessageOptions", id, scope.clone())
                }
                MessageElement::Extensions(r) => self.compact_options(
                    &r.options,
                    "google.protobuf.ExtensionRangeOptions",
                    id,
                    &scope,
                ),
                MessageElement::Reserved(_) | MessageElement::Empty(_) => {}
            }
        }

        let mut seen = HashSet::new();
        for (number, span) in numbers {
            if !seen.insert(number) {
                self.error(
                    ErrorKind::DuplicateNumber,
                    format!("field number {number} is already used in {scope:?}"),
                    span,
                );
            }
        }
        id
    }

    fn check_number(&mut self, tag: &UintLiteralNode) -> i32 {
        if tag.value == 0 || tag.value > MAX_FIELD_NUMBER {
            self.error(
                ErrorKind::Syntax,
                format!("field number {} is out of range", tag.value),
                tag.span,
            );
        } else if RESERVED_NUMBERS.contains(&tag.value) {
            self.error(
                ErrorKind::Syntax,
                format!(
                    "field number {} is in the range reserved for the protobuf implementation",
                    tag.value
                ),
                tag.span,
            );
        }
        tag.value.min(i32::MAX as u64) as i32
    }

    fn field(
        &mut self,
        f: &'a FieldNode,
        parent: ElementId,
        kind: ElementKind,
        oneof: Option<ElementId>,
        scope: &str,
    ) -> ElementId {
        let number = self.check_number(&f.tag);
        let type_text = f.field_type.value();
        let scalar = FieldType::from_scalar_name(&type_text);
        let info = FieldInfo {
            number,
            label: f.label.as_ref().and_then(|l| Label::from_keyword(&l.value)),
            field_type: scalar.unwrap_or(FieldType::Message),
            type_name: None,
            extendee: None,
            oneof,
        };
        let id = self.declare(kind, &f.name, parent, ElementDetail::Field(info), f.id, f.span);
        if scalar.is_none() {
            self.pending.push(PendingRef {
                target: RefTarget::FieldType(id),
                name: type_text,
                scope: scope.to_string(),
                span: f.field_type.span(),
            });
        }
        self.compact_options(&f.options, "google.protobuf.FieldOptions", id, scope);
        id
    }

    fn map_field(&mut self, mf: &'a MapFieldNode, message: ElementId, scope: &str) {
        let number = self.check_number(&mf.tag);
        let entry_name = format!("{}Entry", camel_case(&mf.name.value));
        let entry = match self.builder.add(
            ElementKind::Message,
            &entry_name,
            message,
            ElementDetail::Message { map_entry: true },
        ) {
            Ok(id) => id,
            Err(id) => {
                self.error(
                    ErrorKind::DuplicateSymbol,
                    format!("map entry {entry_name:?} conflicts with an existing declaration"),
                    mf.name.span,
                );
                id
            }
        };
        self.node_descriptors.insert(mf.id, NodeDescriptor::Element(entry));
        self.declarations.insert(
            entry,
            Declaration {
                node: mf.id,
                span: mf.span,
                name_span: mf.map_type.span,
            },
        );
        let entry_fqn = self.builder.elements[entry.0 as usize].full_name.clone();

        let key = &mf.map_type.key_type;
        let key_type = match FieldType::from_scalar_name(&key.value) {
            Some(t) if !matches!(t, FieldType::Double | FieldType::Float | FieldType::Bytes) => t,
            _ => {
                self.error(
                    ErrorKind::Syntax,
                    format!("{:?} is not a valid map key type", key.value),
                    key.span,
                );
                FieldType::String
            }
        };
        let key_info = FieldInfo {
            number: 1,
            label: Some(Label::Optional),
            field_type: key_type,
            type_name: None,
            extendee: None,
            oneof: None,
        };
        if let Ok(key_id) = self.builder.add(ElementKind::Field, "key", entry, ElementDetail::Field(key_info)) {
            self.declarations.insert(
                key_id,
                Declaration {
                    node: key.id,
                    span: key.span,
                    name_span: key.span,
                },
            );
        }

        let value = &mf.map_type.value_type;
        let value_text = value.value();
        let value_scalar = FieldType::from_scalar_name(&value_text);
        let value_info = FieldInfo {
            number: 2,
            label: Some(Label::Optional),
            field_type: value_scalar.unwrap_or(FieldType::Message),
            type_name: None,
            extendee: None,
            oneof: None,
        };
        if let Ok(value_id) =
            self.builder.add(ElementKind::Field, "value", entry, ElementDetail::Field(value_info))
        {
            let value_node = value.as_node();
            self.declarations.insert(
                value_id,
                Declaration {
                    node: value_node.id(),
                    span: value.span(),
                    name_span: value.span(),
                },
            );
            if value_scalar.is_none() {
                self.pending.push(PendingRef {
                    target: RefTarget::FieldType(value_id),
                    name: value_text,
                    scope: scope.to_string(),
                    span: value.span(),
                });
            }
        }

        let info = FieldInfo {
            number,
            label: Some(Label::Repeated),
            field_type: FieldType::Message,
            type_name: Some(entry_fqn),
            extendee: None,
            oneof: None,
        };
        let field = match self.builder.add(ElementKind::Field, &mf.name.value, message, ElementDetail::Field(info)) {
            Ok(id) => id,
            Err(id) => {
                self.error(
                    ErrorKind::DuplicateSymbol,
                    format!("{:?} is already defined", mf.name.value),
                    mf.name.span,
                );
                id
            }
        };
        self.declarations.insert(
            field,
            Declaration {
                node: mf.id,
                span: mf.span,
                name_span: mf.name.span,
            },
        );
        self.compact_options(&mf.options, "google.protobuf.FieldOptions", field, scope);
    }

    fn enumeration(&mut self, e: &'a EnumNode, parent: ElementId) {
        let id = self.declare(ElementKind::Enum, &e.name, parent, ElementDetail::None, e.id, e.span);
        let scope = self.scope(id);
        for decl in &e.decls {
            match decl {
                EnumElement::Value(v) => {
                    let number = v.value().clamp(i32::MIN as i64, i32::MAX as i64) as i32;
                    let value = self.declare(
                        ElementKind::EnumValue,
                        &v.name,
                        id,
                        ElementDetail::EnumValue { number },
                        v.id,
                        v.span,
                    );
                    self.compact_options(&v.options, "google.protobuf.EnumValueOptions", value, &scope);
                }
                EnumElement::Option(o) => {
                    self.option(o, "google.protobuf.EnumOptions", id, scope.clone())
                }
                EnumElement::Reserved(_) | EnumElement::Empty(_) => {}
            }
        }
    }

    fn service(&mut self, s: &'a ServiceNode) {
        let id = self.declare(ElementKind::Service, &s.name, ElementId::FILE, ElementDetail::None, s.id, s.span);
        let scope = self.scope(id);
        for decl in &s.decls {
            match decl {
                ServiceElement::Rpc(r) => {
                    let info = MethodInfo {
                        input_type: String::new(),
                        output_type: String::new(),
                        client_streaming: r.input.stream.is_some(),
                        server_streaming: r.output.stream.is_some(),
                    };
                    let method = self.declare(ElementKind::Method, &r.name, id, ElementDetail::Method(info), r.id, r.span);
                    self.pending.push(PendingRef {
                        target: RefTarget::MethodInput(method),
                        name: r.input.message_type.value(),
                        scope: scope.clone(),
                        span: r.input.message_type.span(),
                    });
                    self.pending.push(PendingRef {
                        target: RefTarget::MethodOutput(method),
                        name: r.output.message_type.value(),
                        scope: scope.clone(),
                        span: r.output.message_type.span(),
                    });
                    if let RpcBody::Block(b) = &r.body {
                        for o in &b.options {
                            self.option(o, "google.protobuf.MethodOptions", method, scope.clone());
                        }
                    }
                }
                ServiceElement::Option(o) => {
                    self.option(o, "google.protobuf.ServiceOptions", id, scope.clone())
                }
                ServiceElement::Empty(_) => {}
            }
        }
    }

    fn extend(&mut self, x: &'a ExtendNode, parent: ElementId) {
        let scope = self.scope(parent);
        for f in &x.fields {
            let id = self.field(f, parent, ElementKind::Extension, None, &scope);
            self.pending.push(PendingRef {
                target: RefTarget::Extendee(id),
                name: x.extendee.value(),
                scope: scope.clone(),
                span: x.extendee.span(),
            });
        }
    }

    // ------------------------------------------------------------------
    // Symbol table
    // ------------------------------------------------------------------

    fn add_package_symbols(&mut self, package: &str) {
        let mut prefix = String::new();
        for part in package.split('.').filter(|p| !p.is_empty()) {
            if !prefix.is_empty() {
                prefix.push('.');
            }
            prefix.push_str(part);
            self.symbols.entry(prefix.clone()).or_insert(Symbol::Package);
        }
    }

    fn register_imported_symbols(&mut self) {
        let deps = self.deps;
        for (import, dep) in deps.iter().enumerate() {
            let mut visible = vec![Arc::clone(dep)];
            collect_public(dep, &mut visible);
            for file in visible {
                self.add_package_symbols(file.package());
                for (id, element) in file.elements() {
                    if element.kind == ElementKind::File {
                        continue;
                    }
                    self.symbols
                        .entry(element.full_name.clone())
                        .or_insert_with(|| Symbol::Imported {
                            import,
                            descriptor: file.descriptor(id),
                        });
                }
            }
        }
    }

    fn register_local_symbols(&mut self) {
        let package = self.builder.package.clone();
        self.add_package_symbols(&package);
        let mut conflicts = Vec::new();
        for (index, element) in self.builder.elements.iter().enumerate().skip(1) {
            let id = ElementId(index as u32);
            match self.symbols.get(&element.full_name) {
                Some(Symbol::Imported { descriptor, .. }) => {
                    conflicts.push((id, element.full_name.clone(), descriptor.file().name().to_string()));
                }
                _ => {
                    self.symbols.insert(element.full_name.clone(), Symbol::Local(id));
                }
            }
        }
        for (id, full_name, other) in conflicts {
            let span = self
                .declarations
                .get(&id)
                .map(|d| d.name_span)
                .unwrap_or_default();
            self.error(
                ErrorKind::DuplicateSymbol,
                format!("{full_name:?} is already defined in {other:?}"),
                span,
            );
        }
    }

    fn symbol_kind(&self, symbol: &Symbol) -> Option<ElementKind> {
        match symbol {
            Symbol::Package => None,
            Symbol::Local(id) => Some(self.builder.elements[id.0 as usize].kind),
            Symbol::Imported { descriptor, .. } => Some(descriptor.kind()),
        }
    }

    fn symbol_field(&self, symbol: &Symbol) -> Option<FieldInfo> {
        match symbol {
            Symbol::Package => None,
            Symbol::Local(id) => match &self.builder.elements[id.0 as usize].detail {
                ElementDetail::Field(f) => Some(f.clone()),
                _ => None,
            },
            Symbol::Imported { descriptor, .. } => descriptor.field().cloned(),
        }
    }

    /// Resolves `name` as seen from `scope`, skipping package names.
    fn resolve(&mut self, name: &str, scope: &str) -> Option<(String, Symbol)> {
        let found = if let Some(absolute) = name.strip_prefix('.') {
            self.symbols
                .get(absolute)
                .map(|s| (absolute.to_string(), s.clone()))
        } else {
            let mut scope = scope.to_string();
            loop {
                let candidate = if scope.is_empty() {
                    name.to_string()
                } else {
                    format!("{scope}.{name}")
                };
                match self.symbols.get(&candidate) {
                    Some(Symbol::Package) | None => {}
                    Some(s) => break Some((candidate, s.clone())),
                }
                if scope.is_empty() {
                    break None;
                }
                scope = match scope.rfind('.') {
                    Some(i) => scope[..i].to_string(),
                    None => String::new(),
                };
            }
        };
        if let Some((_, Symbol::Imported { import, .. })) = &found {
            self.used_imports[*import] = true;
        }
        found
    }

    // ------------------------------------------------------------------
    // Phase 2: references
    // ------------------------------------------------------------------

    fn resolve_references(&mut self) {
        let pending = std::mem::take(&mut self.pending);
        for r in pending {
            let Some((full_name, symbol)) = self.resolve(&r.name, &r.scope) else {
                self.errors.push(ErrorWithPos::unresolved(&r.name, self.file.path(), r.span));
                continue;
            };
            let kind = self.symbol_kind(&symbol);
            let wants_message = !matches!(r.target, RefTarget::FieldType(_));
            let ok = match kind {
                Some(ElementKind::Message) => true,
                Some(ElementKind::Enum) => !wants_message,
                _ => false,
            };
            if !ok {
                let expected = if wants_message { "a message" } else { "a message or enum" };
                self.error(
                    ErrorKind::NotAType,
                    format!("{:?} resolves to {full_name:?}, which is not {expected}", r.name),
                    r.span,
                );
                continue;
            }

            match r.target {
                RefTarget::FieldType(id) => {
                    if let ElementDetail::Field(f) = &mut self.builder.element_mut(id).detail {
                        f.field_type = if kind == Some(ElementKind::Enum) {
                            FieldType::Enum
                        } else {
                            FieldType::Message
                        };
                        f.type_name = Some(full_name);
                    }
                }
                RefTarget::Extendee(id) => {
                    if let ElementDetail::Field(f) = &mut self.builder.element_mut(id).detail {
                        f.extendee = Some(full_name);
                    }
                }
                RefTarget::MethodInput(id) => {
                    if let ElementDetail::Method(m) = &mut self.builder.element_mut(id).detail {
                        m.input_type = full_name;
                    }
                }
                RefTarget::MethodOutput(id) => {
                    if let ElementDetail::Method(m) = &mut self.builder.element_mut(id).detail {
                        m.output_type = full_name;
                    }
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Phase 3: options
    // ------------------------------------------------------------------

    /// Looks up a non-extension option field. Returns the field's message
    /// type name (if any) when found; `Err` when the field does not exist.
    fn option_field(&mut self, full_name: &str) -> Result<Option<String>, ()> {
        if let Some(symbol) = self.symbols.get(full_name).cloned() {
            if let Some(f) = self.symbol_field(&symbol) {
                return Ok(message_type(&f));
            }
            return Err(());
        }
        match &self.builtin_options {
            Some(builtin) => match builtin.find_descriptor(full_name).as_ref().and_then(Descriptor::field) {
                Some(f) => Ok(message_type(f)),
                None => Err(()),
            },
            // Without the descriptor schema, built-in names cannot be checked.
            None => Ok(None),
        }
    }

    fn resolve_options(&mut self) {
        let pending = std::mem::take(&mut self.pending_options);
        'options: for p in pending {
            let mut current = Some(p.options_message.to_string());
            let mut parts = Vec::new();

            if is_pseudo_option(&p) {
                self.record_option(&p, None);
                continue;
            }

            for part in &p.node.name.parts {
                let text = part.name.value();
                let span = part.span;
                if part.is_extension() {
                    let Some((full_name, symbol)) = self.resolve(&text, &p.scope) else {
                        self.errors.push(ErrorWithPos::unresolved(&text, self.file.path(), span));
                        continue 'options;
                    };
                    let info = match (self.symbol_kind(&symbol), self.symbol_field(&symbol)) {
                        (Some(ElementKind::Extension), Some(info)) => info,
                        _ => {
                            self.error(
                                ErrorKind::UnknownOption,
                                format!("{full_name:?} is not an extension"),
                                span,
                            );
                            continue 'options;
                        }
                    };
                    if let (Some(cur), Some(extendee)) = (&current, &info.extendee) {
                        if cur != extendee {
                            self.error(
                                ErrorKind::UnknownOption,
                                format!("extension {full_name:?} extends {extendee:?}, not {cur:?}"),
                                span,
                            );
                            continue 'options;
                        }
                    }
                    current = message_type(&info);
                    parts.push(OptionNamePart {
                        name: full_name,
                        is_extension: true,
                    });
                } else {
                    let Some(cur) = current.clone() else {
                        self.error(
                            ErrorKind::UnknownOption,
                            format!("cannot set field {text:?} of a non-message option"),
                            span,
                        );
                        continue 'options;
                    };
                    let full_name = format!("{cur}.{text}");
                    match self.option_field(&full_name) {
                        Ok(next) => current = next,
                        Err(()) => {
                            self.error(
                                ErrorKind::UnknownOption,
                                format!("option {text:?} does not exist in {cur:?}"),
                                span,
                            );
                            continue 'options;
                        }
                    }
                    parts.push(OptionNamePart {
                        name: full_name,
                        is_extension: false,
                    });
                }
            }

            self.record_option(&p, Some(parts));
        }
    }

    fn record_option(&mut self, p: &PendingOption<'a>, parts: Option<Vec<OptionNamePart>>) {
        if let Some(parts) = parts {
            for (node, part) in p.node.name.parts.iter().zip(&parts) {
                self.node_descriptors
                    .insert(node.id, NodeDescriptor::OptionNamePart(part.clone()));
            }
            self.node_descriptors.insert(
                p.node.id,
                NodeDescriptor::Option(OptionTarget {
                    options_message: p.options_message.to_string(),
                    parts,
                }),
            );
        }
        let literal = match &p.node.value {
            ValueNode::String(s) => Some(s.value.clone()),
            _ => None,
        };
        self.builder.element_mut(p.owner).options.push(OptionEntry {
            name: p.node.name.text(),
            value: value_text(&p.node.value),
            literal,
        });
    }

    // ------------------------------------------------------------------
    // Phase 4: imports
    // ------------------------------------------------------------------

    fn check_unused_imports(&mut self, imports: &[&ImportNode]) {
        for (index, import) in imports.iter().enumerate() {
            if import.is_public() || self.used_imports.get(index).copied().unwrap_or(true) {
                continue;
            }
            self.warnings.push(ErrorWithPos::unused_import(
                &import.name.value,
                self.file.path(),
                import.name.span,
            ));
        }
    }
}

/// `default` and `json_name` are written like field options but are
/// properties of the field itself.
fn is_pseudo_option(p: &PendingOption<'_>) -> bool {
    let parts = &p.node.name.parts;
    p.options_message == "google.protobuf.FieldOptions"
        && parts.len() == 1
        && !parts[0].is_extension()
        && matches!(parts[0].name.value().as_str(), "default" | "json_name")
}

fn message_type(f: &FieldInfo) -> Option<String> {
    match f.field_type {
        FieldType::Message | FieldType::Group => f.type_name.clone(),
        _ => None,
    }
}

/// Appends the files re-exported by `file` through `import public`,
/// transitively.
fn collect_public(file: &Arc<FileDescriptor>, out: &mut Vec<Arc<FileDescriptor>>) {
    for index in file.public_dependencies() {
        if let Some(dep) = file.dependency_files().get(*index) {
            if out.iter().any(|f| f.name() == dep.name()) {
                continue;
            }
            out.push(Arc::clone(dep));
            collect_public(dep, out);
        }
    }
}

/// `foo_bar` -> `FooBar`, as used for map entry names.
fn camel_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut upper = true;
    for c in name.chars() {
        if c == '_' {
            upper = true;
        } else if upper {
            out.extend(c.to_uppercase());
            upper = false;
        } else {
            out.push(c);
        }
    }
    out
}

/// Renders an option value back to schema text.
pub(crate) fn value_text(value: &ValueNode) -> String {
    match value {
        ValueNode::Ident(i) => i.value.clone(),
        ValueNode::String(s) => s.raw.clone(),
        ValueNode::Uint(u) => u.raw.clone(),
        ValueNode::Float(f) => f.raw.clone(),
        ValueNode::Signed(s) => format!("{}{}", s.sign.rune, value_text(&s.value)),
        ValueNode::MessageLiteral(m) => {
            let fields: Vec<String> = m
                .fields
                .iter()
                .map(|f| {
                    let name = if f.name.is_extension() {
                        format!("[{}]", f.name.name.value())
                    } else {
                        f.name.name.value()
                    };
                    format!("{name}: {}", value_text(&f.value))
                })
                .collect();
            if fields.is_empty() {
                "{}".to_string()
            } else {
                format!("{{ {} }}", fields.join(" "))
            }
        }
        ValueNode::Array(a) => {
            let elements: Vec<String> = a.elements.iter().map(value_text).collect();
            format!("[{}]", elements.join(", "))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    fn link_source(
        path: &str,
        src: &str,
        deps: Vec<Arc<FileDescriptor>>,
    ) -> LinkOutcome {
        let (parsed, errors) = parse(path, src);
        assert!(errors.is_empty(), "syntax errors: {errors:?}");
        link(Arc::new(parsed), deps, None)
    }

    fn linked(path: &str, src: &str, deps: Vec<Arc<FileDescriptor>>) -> LinkedFile {
        let outcome = link_source(path, src, deps);
        assert!(outcome.errors.is_empty(), "link errors: {:?}", outcome.errors);
        outcome.linked.unwrap()
    }

    #[test]
    fn test_nested_scope_resolution() {
        let file = linked(
            "a.proto",
            r#"
syntax = "proto3";
package acme.v1;
message Outer {
  message Inner { int32 x = 1; }
  Inner a = 1;
  Outer.Inner b = 2;
  .acme.v1.Outer.Inner c = 3;
  Kind k = 4;
}
enum Kind { KIND_UNKNOWN = 0; }
"#,
            Vec::new(),
        );
        let fd = file.descriptor();
        for field in ["a", "b", "c"] {
            let d = fd.find_descriptor(&format!("acme.v1.Outer.{field}")).unwrap();
            assert_eq!(
                d.field().unwrap().type_name.as_deref(),
                Some("acme.v1.Outer.Inner")
            );
        }
        let k = fd.find_descriptor("acme.v1.Outer.k").unwrap();
        assert_eq!(k.field().unwrap().field_type, FieldType::Enum);
    }

    #[test]
    fn test_unresolved_type_fails_link() {
        let outcome = link_source("a.proto", "message A { Missing m = 1; }", Vec::new());
        assert!(outcome.linked.is_none());
        assert_eq!(outcome.errors.len(), 1);
        assert_eq!(outcome.errors[0].kind, ErrorKind::UnresolvedReference);
    }

    #[test]
    fn test_map_entry_synthesis() {
        let file = linked(
            "m.proto",
            "package p; message V {} message A { map<string, V> values = 3; }",
            Vec::new(),
        );
        let fd = file.descriptor();
        let entry = fd.find_descriptor("p.A.ValuesEntry").unwrap();
        assert!(entry.is_map_entry());
        let value = entry.field_by_number(2).unwrap();
        assert_eq!(value.field().unwrap().type_name.as_deref(), Some("p.V"));
        let field = fd.find_descriptor("p.A.values").unwrap();
        assert_eq!(field.field().unwrap().label, Some(Label::Repeated));
        assert_eq!(
            field.field().unwrap().type_name.as_deref(),
            Some("p.A.ValuesEntry")
        );
    }

    #[test]
    fn test_unused_import_is_a_warning() {
        let dep = linked("dep.proto", "package d; message D {}", Vec::new());
        let outcome = link_source(
            "a.proto",
            "import \"dep.proto\"; package p; message A {}",
            vec![Arc::clone(dep.descriptor())],
        );
        assert!(outcome.linked.is_some());
        assert_eq!(outcome.warnings.len(), 1);
        assert_eq!(outcome.warnings[0].kind, ErrorKind::UnusedImport);

        let outcome = link_source(
            "b.proto",
            "import \"dep.proto\"; package p; message A { d.D x = 1; }",
            vec![Arc::clone(dep.descriptor())],
        );
        assert!(outcome.warnings.is_empty());
    }

    #[test]
    fn test_public_import_reexports() {
        let base = linked("base.proto", "package b; message B {}", Vec::new());
        let mid = linked(
            "mid.proto",
            "import public \"base.proto\"; package m;",
            vec![Arc::clone(base.descriptor())],
        );
        let outcome = link_source(
            "top.proto",
            "import \"mid.proto\"; package t; message T { b.B x = 1; }",
            vec![Arc::clone(mid.descriptor())],
        );
        assert!(outcome.errors.is_empty(), "{:?}", outcome.errors);
        assert!(outcome.warnings.is_empty());
    }

    #[test]
    fn test_duplicate_field_number() {
        let outcome = link_source("a.proto", "message A { int32 a = 1; int32 b = 1; }", Vec::new());
        assert_eq!(outcome.errors.len(), 1);
        assert_eq!(outcome.errors[0].kind, ErrorKind::DuplicateNumber);
    }

    #[test]
    fn test_extension_option_resolution() {
        let options = linked(
            "google/protobuf/descriptor.proto",
            r#"
syntax = "proto2";
package google.protobuf;
message FieldOptions {
  optional bool deprecated = 3;
  extensions 1000 to max;
}
"#,
            Vec::new(),
        );
        let file = linked(
            "ext.proto",
            r#"
syntax = "proto2";
import "google/protobuf/descriptor.proto";
package p;
message Rules { optional int32 min = 1; }
extend google.protobuf.FieldOptions { optional Rules rules = 5000; }
message A { optional int32 x = 1 [(rules).min = 2, deprecated = true]; }
"#,
            vec![Arc::clone(options.descriptor())],
        );
        let rules = file.descriptor().find_descriptor("p.rules").unwrap();
        assert_eq!(
            rules.field().unwrap().extendee.as_deref(),
            Some("google.protobuf.FieldOptions")
        );
        let x = file.descriptor().find_descriptor("p.A.x").unwrap();
        let names: Vec<&str> = x.element().options.iter().map(|o| o.name.as_str()).collect();
        assert_eq!(names, vec!["(rules).min", "deprecated"]);
    }

    #[test]
    fn test_option_extendee_mismatch() {
        let outcome = link_source(
            "a.proto",
            r#"
package p;
message Target { extensions 100 to 200; }
extend Target { optional int32 flag = 100; }
message A { optional int32 x = 1 [(flag) = 1]; }
"#,
            Vec::new(),
        );
        assert_eq!(outcome.errors.len(), 1, "{:?}", outcome.errors);
        assert_eq!(outcome.errors[0].kind, ErrorKind::UnknownOption);
    }

    #[test]
    fn test_node_descriptors_for_declarations() {
        let file = linked("a.proto", "message A { int32 x = 1; }", Vec::new());
        let FileElement::Message(m) = &file.ast().decls[0] else {
            panic!("expected message");
        };
        let Some(NodeDescriptor::Element(id)) = file.node_descriptor(m.id) else {
            panic!("message node is not mapped");
        };
        assert_eq!(file.descriptor().element(*id).full_name, "A");
        let decl = file.declaration(*id).unwrap();
        assert_eq!(decl.name_span, m.name.span);
    }

    #[test]
    fn test_camel_case() {
        assert_eq!(camel_case("my_map"), "MyMap");
        assert_eq!(camel_case("x"), "X");
        assert_eq!(camel_case("already_Camel_2x"), "AlreadyCamel2x");
    }
}
