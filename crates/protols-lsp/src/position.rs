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

//! Mapping a cursor position to the descriptor it refers to.
//!
//! # Algorithm
//!
//! 1. Walk the syntax tree down to the terminal under the cursor, keeping
//!    the path of ancestors. Terminal containment is end-exclusive: a
//!    cursor on a token's end column belongs to whatever follows.
//! 2. Climb the path to the nearest node the linker associated with a
//!    descriptor.
//! 3. If that node is the terminal itself, its descriptor is the answer.
//!    Otherwise the nodes in between decide which part of the declaration
//!    the cursor is on: an import literal, a field's type reference, a map
//!    field's value type, an rpc's request or response type, an option
//!    name, or a field inside an option's message literal.
//!
//! Names found along the way are resolved against the file and its
//! imports, then the rest of the workspace, then the well-known registry.
//!
//! The result carries an optional range: the exact sub-span the answer
//! came from, when it is narrower than the declaration.

use crate::error::PositionError;
use crate::utils::position_to_cursor;
use protols_compiler::ast::{
    CompoundIdentNode, EnumElement, ExtendNode, FieldNode, FileElement, IdentNode, IdentValueNode,
    MapFieldNode, MessageElement, MessageNode, OneofElement, RpcNode, ServiceElement,
};
use protols_compiler::wellknown;
use protols_compiler::{
    Descriptor, ElementKind, FileDescriptor, FileNode, LinkedFile, NodeDescriptor, NodeRef,
    OptionNamePart, OptionTarget, SourceSpan,
};
use std::collections::HashSet;
use std::sync::Arc;
use tower_lsp::lsp_types::Position;

/// Compiled files outside the one being queried.
pub trait SymbolSource {
    fn find_file(&self, path: &str) -> Option<Arc<FileDescriptor>>;

    fn find_descriptor(&self, full_name: &str) -> Option<Descriptor>;
}

/// A source that knows nothing beyond the queried file and the registry.
pub struct NoSymbols;

impl SymbolSource for NoSymbols {
    fn find_file(&self, _path: &str) -> Option<Arc<FileDescriptor>> {
        None
    }

    fn find_descriptor(&self, _full_name: &str) -> Option<Descriptor> {
        None
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Resolved {
    pub descriptor: Descriptor,
    /// Sub-span of the query's node that the descriptor was resolved from.
    pub range: Option<SourceSpan>,
}

impl Resolved {
    fn new(descriptor: Descriptor, range: Option<SourceSpan>) -> Self {
        Self { descriptor, range }
    }
}

pub fn find_descriptor_at(
    file: &LinkedFile,
    position: Position,
    source: &dyn SymbolSource,
) -> Result<Resolved, PositionError> {
    let (line, column) = position_to_cursor(position);
    let path = locate(file.ast(), line, column).ok_or(PositionError::NoNode {
        line: position.line,
        character: position.character,
    })?;

    let (depth, mapped) = path
        .iter()
        .enumerate()
        .rev()
        .find_map(|(i, node)| file.node_descriptor(node.id()).map(|d| (i, d)))
        .ok_or(PositionError::NoIdentifiableNode {
            line: position.line,
            character: position.character,
        })?;

    let engine = Engine { file, source };
    let leaf = path[path.len() - 1];
    if depth == path.len() - 1 {
        return Ok(Resolved::new(engine.direct(mapped)?, None));
    }
    engine.indirect(path[depth], mapped, &path[depth + 1..], leaf)
}

/// Resolves a fully-qualified name as seen from `file`.
pub fn lookup(file: &LinkedFile, source: &dyn SymbolSource, full_name: &str) -> Option<Descriptor> {
    Engine { file, source }.lookup(full_name)
}

/// Root-to-terminal path to the token under `(line, column)`, 1-based.
fn locate(ast: &FileNode, line: u32, column: u32) -> Option<Vec<NodeRef<'_>>> {
    let mut current = ast.as_node();
    let mut path = vec![current];
    while !current.is_terminal() {
        current = current.children().into_iter().find(|child| {
            if child.is_terminal() {
                child.span().contains_cursor(line, column)
            } else {
                encloses(child.span(), line, column)
            }
        })?;
        path.push(current);
    }
    Some(path)
}

fn encloses(span: SourceSpan, line: u32, column: u32) -> bool {
    let (start, end) = (span.start(), span.end());
    (start.line(), start.column()) <= (line, column) && (line, column) < (end.line(), end.column())
}

fn within(outer: SourceSpan, node: NodeRef<'_>) -> bool {
    let inner = node.span();
    outer.start().offset() <= inner.start().offset() && inner.end().offset() <= outer.end().offset()
}

fn named(descriptor: Descriptor, name: &IdentNode, leaf: NodeRef<'_>) -> Resolved {
    let range = (leaf.id() == name.id).then_some(name.span);
    Resolved::new(descriptor, range)
}

/// Scope that names inside `descriptor`'s declaration are resolved in.
fn scope_of(descriptor: &Descriptor) -> String {
    match descriptor.kind() {
        ElementKind::Message => descriptor.full_name().to_string(),
        _ => match descriptor.parent() {
            Some(parent) if parent.kind() == ElementKind::Message => parent.full_name().to_string(),
            _ => descriptor.file().package().to_string(),
        },
    }
}

struct Engine<'a> {
    file: &'a LinkedFile,
    source: &'a dyn SymbolSource,
}

impl<'a> Engine<'a> {
    /// The queried file followed by everything it imports, transitively.
    fn visible_files(&self) -> Vec<Arc<FileDescriptor>> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        let mut queue = vec![Arc::clone(self.file.descriptor())];
        while let Some(fd) = queue.pop() {
            if !seen.insert(fd.name().to_string()) {
                continue;
            }
            queue.extend(fd.dependency_files().iter().rev().cloned());
            out.push(fd);
        }
        out
    }

    fn lookup(&self, full_name: &str) -> Option<Descriptor> {
        let full_name = full_name.strip_prefix('.').unwrap_or(full_name);
        self.visible_files()
            .iter()
            .find_map(|fd| fd.find_descriptor(full_name))
            .or_else(|| self.source.find_descriptor(full_name))
            .or_else(|| wellknown::registry().find_descriptor_by_name(full_name))
    }

    /// Protobuf scoping: innermost enclosing scope first.
    fn lookup_relative(&self, name: &str, scope: &str) -> Option<Descriptor> {
        if let Some(absolute) = name.strip_prefix('.') {
            return self.lookup(absolute);
        }
        let mut scope = scope;
        loop {
            let candidate = if scope.is_empty() {
                name.to_string()
            } else {
                format!("{scope}.{name}")
            };
            if let Some(found) = self.lookup(&candidate) {
                return Some(found);
            }
            if scope.is_empty() {
                return None;
            }
            scope = scope.rsplit_once('.').map_or("", |(outer, _)| outer);
        }
    }

    fn resolve(&self, full_name: &str) -> Result<Descriptor, PositionError> {
        self.lookup(full_name)
            .ok_or_else(|| PositionError::Unresolved(full_name.to_string()))
    }

    fn find_file(&self, path: &str) -> Option<Arc<FileDescriptor>> {
        self.file
            .descriptor()
            .dependency_files()
            .iter()
            .find(|fd| fd.name() == path)
            .cloned()
            .or_else(|| self.source.find_file(path))
            .or_else(|| {
                wellknown::registry()
                    .find_file(path)
                    .map(|f| Arc::clone(f.descriptor()))
            })
    }

    fn direct(&self, mapped: &NodeDescriptor) -> Result<Descriptor, PositionError> {
        match mapped {
            NodeDescriptor::Element(id) => Ok(self.file.descriptor().descriptor(*id)),
            NodeDescriptor::OptionNamePart(part) => self.option_part(part),
            NodeDescriptor::Option(target) => match target.parts.last() {
                Some(part) => self.resolve(&part.name),
                None => Err(PositionError::Unresolved(target.options_message.clone())),
            },
        }
    }

    fn indirect(
        &self,
        ancestor: NodeRef<'_>,
        mapped: &NodeDescriptor,
        below: &[NodeRef<'_>],
        leaf: NodeRef<'_>,
    ) -> Result<Resolved, PositionError> {
        let id = match mapped {
            NodeDescriptor::OptionNamePart(part) => {
                let range = match ancestor {
                    NodeRef::FieldReference(fr) => Some(fr.name.span()),
                    _ => None,
                };
                return Ok(Resolved::new(self.option_part(part)?, range));
            }
            NodeDescriptor::Option(target) => return self.option_value(target, below, leaf),
            NodeDescriptor::Element(id) => *id,
        };

        let descriptor = self.file.descriptor().descriptor(id);
        match ancestor {
            NodeRef::File(_) => self.in_container(descriptor, None, below, leaf),
            NodeRef::Message(m) => self.in_container(descriptor, Some(m), below, leaf),
            NodeRef::Field(f) => self.in_field(descriptor, f, leaf),
            NodeRef::MapField(mf) => self.in_map_field(descriptor, mf, leaf),
            NodeRef::Rpc(r) => self.in_rpc(descriptor, r, leaf),
            NodeRef::Enum(n) => Ok(named(descriptor, &n.name, leaf)),
            NodeRef::EnumValue(n) => Ok(named(descriptor, &n.name, leaf)),
            NodeRef::Service(n) => Ok(named(descriptor, &n.name, leaf)),
            NodeRef::Oneof(n) => Ok(named(descriptor, &n.name, leaf)),
            _ => Ok(Resolved::new(descriptor, None)),
        }
    }

    /// A file or message: imports, the package, extend blocks, the name.
    fn in_container(
        &self,
        descriptor: Descriptor,
        message: Option<&MessageNode>,
        below: &[NodeRef<'_>],
        leaf: NodeRef<'_>,
    ) -> Result<Resolved, PositionError> {
        match below.first() {
            Some(NodeRef::Import(import)) if leaf.id() == import.name.id => {
                let path = &import.name.value;
                let fd = self
                    .find_file(path)
                    .ok_or_else(|| PositionError::FileNotFound(path.clone()))?;
                return Ok(Resolved::new(fd.root(), Some(import.name.span)));
            }
            Some(NodeRef::Package(package)) if within(package.name.span(), leaf) => {
                return Ok(Resolved::new(descriptor.file().root(), Some(package.name.span())));
            }
            Some(NodeRef::Extend(extend)) if within(extend.extendee.span(), leaf) => {
                return self.extendee(&descriptor, extend);
            }
            _ => {}
        }
        Ok(match message {
            Some(m) => named(descriptor, &m.name, leaf),
            None => Resolved::new(descriptor, None),
        })
    }

    fn extendee(&self, scope: &Descriptor, extend: &ExtendNode) -> Result<Resolved, PositionError> {
        let linked = extend.fields.first().and_then(|f| match self.file.node_descriptor(f.id) {
            Some(NodeDescriptor::Element(id)) => self
                .file
                .descriptor()
                .descriptor(*id)
                .field()
                .and_then(|info| info.extendee.clone()),
            _ => None,
        });
        let name = extend.extendee.value();
        let target = match linked {
            Some(full_name) => self.lookup(&full_name),
            None => self.lookup_relative(&name, &scope_of(scope)),
        };
        target
            .map(|d| Resolved::new(d, Some(extend.extendee.span())))
            .ok_or(PositionError::Unresolved(name))
    }

    fn in_field(
        &self,
        field: Descriptor,
        node: &FieldNode,
        leaf: NodeRef<'_>,
    ) -> Result<Resolved, PositionError> {
        if !within(node.field_type.span(), leaf) {
            return Ok(named(field, &node.name, leaf));
        }
        if let IdentValueNode::Compound(compound) = &node.field_type {
            if let Some(k) = compound.components.iter().position(|c| c.id == leaf.id()) {
                if k + 1 < compound.components.len() {
                    if let Some(found) = self.namespace(compound, k, &scope_of(&field)) {
                        return Ok(found);
                    }
                }
            }
        }
        self.field_type(field, node.field_type.span())
    }

    /// The type a field refers to, or the field itself for scalars.
    fn field_type(&self, field: Descriptor, span: SourceSpan) -> Result<Resolved, PositionError> {
        let type_name = field.field().and_then(|info| info.type_name.clone());
        match type_name {
            Some(name) => Ok(Resolved::new(self.resolve(&name)?, Some(span))),
            None => Ok(Resolved::new(field, Some(span))),
        }
    }

    /// A non-final segment of a dotted type name: the package it names, or
    /// the enclosing type for nested references such as `Outer.Inner`.
    fn namespace(&self, compound: &CompoundIdentNode, k: usize, scope: &str) -> Option<Resolved> {
        let components = &compound.components;
        let n = components.len();
        let package = components[..n - 1]
            .iter()
            .map(|c| c.value.as_str())
            .collect::<Vec<_>>()
            .join(".");
        let own = self.file.descriptor();
        let owner = own
            .dependency_files()
            .iter()
            .chain(std::iter::once(own))
            .find(|fd| fd.package() == package);
        if let Some(fd) = owner {
            let range = components[0].span.join(components[n - 2].span);
            return Some(Resolved::new(fd.root(), Some(range)));
        }

        let prefix = components[..=k]
            .iter()
            .map(|c| c.value.as_str())
            .collect::<Vec<_>>()
            .join(".");
        let name = if compound.leading_dot.is_some() {
            format!(".{prefix}")
        } else {
            prefix
        };
        self.lookup_relative(&name, scope).map(|d| {
            Resolved::new(d, Some(components[0].span.join(components[k].span)))
        })
    }

    /// `entry` is the synthetic map entry message the map field maps to.
    fn in_map_field(
        &self,
        entry: Descriptor,
        node: &MapFieldNode,
        leaf: NodeRef<'_>,
    ) -> Result<Resolved, PositionError> {
        let field = || {
            entry
                .parent()
                .and_then(|message| message.child_by_name(&node.name.value))
        };
        if leaf.id() == node.name.id {
            let target = field().unwrap_or_else(|| entry.clone());
            return Ok(Resolved::new(target, Some(node.name.span)));
        }
        let value_type = node.map_type.value_type.span();
        if within(value_type, leaf) {
            let value = entry
                .field_by_number(2)
                .ok_or_else(|| PositionError::Unresolved(entry.full_name().to_string()))?;
            return self.field_type(value, value_type);
        }
        if within(node.map_type.span, leaf) {
            return Ok(Resolved::new(entry, None));
        }
        Ok(Resolved::new(field().unwrap_or(entry), None))
    }

    fn in_rpc(
        &self,
        method: Descriptor,
        node: &RpcNode,
        leaf: NodeRef<'_>,
    ) -> Result<Resolved, PositionError> {
        let Some(info) = method.method() else {
            return Ok(named(method, &node.name, leaf));
        };
        for (side, type_name) in [(&node.input, &info.input_type), (&node.output, &info.output_type)] {
            let span = side.message_type.span();
            if within(span, leaf) {
                return Ok(Resolved::new(self.resolve(type_name)?, Some(span)));
            }
        }
        Ok(named(method, &node.name, leaf))
    }

    /// Extension names lead to the extension's type; plain names to the
    /// option field.
    fn option_part(&self, part: &OptionNamePart) -> Result<Descriptor, PositionError> {
        let field = self.resolve(&part.name)?;
        if part.is_extension {
            let target = field
                .field()
                .and_then(|info| info.type_name.as_deref())
                .and_then(|name| self.lookup(name));
            if let Some(target) = target {
                return Ok(target);
            }
        }
        Ok(field)
    }

    /// Cursor on an option's value: fields of message literals are followed
    /// by name from the option's type.
    fn option_value(
        &self,
        target: &OptionTarget,
        below: &[NodeRef<'_>],
        leaf: NodeRef<'_>,
    ) -> Result<Resolved, PositionError> {
        let Some(last) = target.parts.last() else {
            return Err(PositionError::Unresolved(target.options_message.clone()));
        };
        let mut current = self.resolve(&last.name)?;
        let scope = self.file.descriptor().package().to_string();
        for node in below {
            let NodeRef::MessageField(field) = node else {
                continue;
            };
            let Some(message) = current
                .field()
                .and_then(|info| info.type_name.as_deref())
                .and_then(|name| self.lookup(name))
            else {
                break;
            };
            let name = field.name.name.value();
            let next = if field.name.is_extension() {
                self.lookup_relative(&name, &scope)
            } else {
                message.child_by_name(&name)
            };
            current = next.ok_or(PositionError::Unresolved(name))?;
            if within(field.name.span, leaf) {
                return Ok(Resolved::new(current, Some(field.name.name.span())));
            }
        }
        Ok(Resolved::new(current, None))
    }
}

/// Name span of the declaration of `full_name` in a file that may not have
/// linked, found from the syntax tree alone.
pub fn find_declaration(ast: &FileNode, full_name: &str) -> Option<SourceSpan> {
    let package = ast.package().map(|p| p.name.value()).unwrap_or_default();
    let mut found = None;
    let mut visit = |name: &str, span: SourceSpan| {
        if found.is_none() && name == full_name {
            found = Some(span);
        }
    };
    let qualify = |scope: &str, name: &str| {
        if scope.is_empty() {
            name.to_string()
        } else {
            format!("{scope}.{name}")
        }
    };

    for decl in &ast.decls {
        match decl {
            FileElement::Message(m) => visit_message(m, &package, &mut visit),
            FileElement::Enum(e) => {
                visit(&qualify(&package, &e.name.value), e.name.span);
                for value in &e.decls {
                    if let EnumElement::Value(v) = value {
                        visit(&qualify(&package, &v.name.value), v.name.span);
                    }
                }
            }
            FileElement::Service(s) => {
                let service = qualify(&package, &s.name.value);
                visit(&service, s.name.span);
                for element in &s.decls {
                    if let ServiceElement::Rpc(r) = element {
                        visit(&qualify(&service, &r.name.value), r.name.span);
                    }
                }
            }
            FileElement::Extend(x) => {
                for f in &x.fields {
                    visit(&qualify(&package, &f.name.value), f.name.span);
                }
            }
            _ => {}
        }
    }
    found
}

fn visit_message(m: &MessageNode, scope: &str, visit: &mut impl FnMut(&str, SourceSpan)) {
    let name = if scope.is_empty() {
        m.name.value.clone()
    } else {
        format!("{scope}.{}", m.name.value)
    };
    visit(&name, m.name.span);
    let member = |n: &str| format!("{name}.{n}");
    for decl in &m.decls {
        match decl {
            MessageElement::Field(f) => visit(&member(&f.name.value), f.name.span),
            MessageElement::MapField(f) => visit(&member(&f.name.value), f.name.span),
            MessageElement::Oneof(o) => {
                visit(&member(&o.name.value), o.name.span);
                for element in &o.decls {
                    if let OneofElement::Field(f) = element {
                        visit(&member(&f.name.value), f.name.span);
                    }
                }
            }
            MessageElement::Message(nested) => visit_message(nested, &name, visit),
            MessageElement::Enum(e) => {
                visit(&member(&e.name.value), e.name.span);
                for value in &e.decls {
                    if let EnumElement::Value(v) = value {
                        visit(&member(&v.name.value), v.name.span);
                    }
                }
            }
            MessageElement::Extend(x) => {
                for f in &x.fields {
                    visit(&member(&f.name.value), f.name.span);
                }
            }
            _ => {}
        }
    }
}
