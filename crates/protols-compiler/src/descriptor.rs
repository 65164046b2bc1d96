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

//! Resolved descriptor model.
//!
//! A [`FileDescriptor`] stores every declaration of one file in an arena of
//! [`Element`]s indexed by [`ElementId`]; element 0 is the file itself.
//! Fully-qualified names follow protobuf scoping: nested declarations are
//! prefixed by their parent, enum values are siblings of their enum, and
//! top-level declarations are prefixed by the package.
//!
//! A [`Descriptor`] is a cheap handle pairing a shared file with one element.
//!
//! Descriptors are produced two ways:
//!
//! - by the linker, from a parsed and resolved source file
//! - by [`FileDescriptor::from_proto`], from a serialized
//!   `google.protobuf.FileDescriptorProto` accepted as is

use prost_types::{
    field_descriptor_proto, DescriptorProto, EnumDescriptorProto, FieldDescriptorProto,
    FileDescriptorProto, ServiceDescriptorProto,
};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Index of an element within its [`FileDescriptor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ElementId(pub u32);

impl ElementId {
    /// The file element.
    pub const FILE: ElementId = ElementId(0);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementKind {
    File,
    Message,
    Field,
    Oneof,
    Enum,
    EnumValue,
    Service,
    Method,
    Extension,
}

impl ElementKind {
    /// Message and enum declarations can be used as field types.
    pub fn is_type(&self) -> bool {
        matches!(self, Self::Message | Self::Enum)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Label {
    Optional,
    Required,
    Repeated,
}

impl Label {
    pub fn from_keyword(kw: &str) -> Option<Self> {
        match kw {
            "optional" => Some(Self::Optional),
            "required" => Some(Self::Required),
            "repeated" => Some(Self::Repeated),
            _ => None,
        }
    }

    pub fn keyword(&self) -> &'static str {
        match self {
            Self::Optional => "optional",
            Self::Required => "required",
            Self::Repeated => "repeated",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldType {
    Double,
    Float,
    Int64,
    Uint64,
    Int32,
    Fixed64,
    Fixed32,
    Bool,
    String,
    Group,
    Message,
    Bytes,
    Uint32,
    Enum,
    Sfixed32,
    Sfixed64,
    Sint32,
    Sint64,
}

const SCALARS: [(&str, FieldType); 15] = [
    ("double", FieldType::Double),
    ("float", FieldType::Float),
    ("int64", FieldType::Int64),
    ("uint64", FieldType::Uint64),
    ("int32", FieldType::Int32),
    ("fixed64", FieldType::Fixed64),
    ("fixed32", FieldType::Fixed32),
    ("bool", FieldType::Bool),
    ("string", FieldType::String),
    ("bytes", FieldType::Bytes),
    ("uint32", FieldType::Uint32),
    ("sfixed32", FieldType::Sfixed32),
    ("sfixed64", FieldType::Sfixed64),
    ("sint32", FieldType::Sint32),
    ("sint64", FieldType::Sint64),
];

impl FieldType {
    /// Parses a scalar type keyword such as `int32`.
    pub fn from_scalar_name(name: &str) -> Option<Self> {
        SCALARS.iter().find(|(n, _)| *n == name).map(|(_, t)| *t)
    }

    /// Keyword for scalar types; `None` for message, enum and group.
    pub fn scalar_name(&self) -> Option<&'static str> {
        SCALARS.iter().find(|(_, t)| t == self).map(|(n, _)| *n)
    }

    pub fn is_scalar(&self) -> bool {
        self.scalar_name().is_some()
    }

    fn from_proto(t: field_descriptor_proto::Type) -> Self {
        use field_descriptor_proto::Type as T;
        match t {
            T::Double => Self::Double,
            T::Float => Self::Float,
            T::Int64 => Self::Int64,
            T::Uint64 => Self::Uint64,
            T::Int32 => Self::Int32,
            T::Fixed64 => Self::Fixed64,
            T::Fixed32 => Self::Fixed32,
            T::Bool => Self::Bool,
            T::String => Self::String,
            T::Group => Self::Group,
            T::Message => Self::Message,
            T::Bytes => Self::Bytes,
            T::Uint32 => Self::Uint32,
            T::Enum => Self::Enum,
            T::Sfixed32 => Self::Sfixed32,
            T::Sfixed64 => Self::Sfixed64,
            T::Sint32 => Self::Sint32,
            T::Sint64 => Self::Sint64,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldInfo {
    pub number: i32,
    pub label: Option<Label>,
    pub field_type: FieldType,
    /// Fully-qualified name of the message or enum type, without a leading dot.
    pub type_name: Option<String>,
    /// Fully-qualified name of the extended message, for extensions.
    pub extendee: Option<String>,
    pub oneof: Option<ElementId>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MethodInfo {
    /// Fully-qualified input type, without a leading dot.
    pub input_type: String,
    /// Fully-qualified output type, without a leading dot.
    pub output_type: String,
    pub client_streaming: bool,
    pub server_streaming: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ElementDetail {
    None,
    Message { map_entry: bool },
    Field(FieldInfo),
    EnumValue { number: i32 },
    Method(MethodInfo),
}

/// An option as written on a declaration, for display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptionEntry {
    pub name: String,
    /// Value as written in source.
    pub value: String,
    /// Decoded value, when the option is a string literal.
    pub literal: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    pub kind: ElementKind,
    pub name: String,
    pub full_name: String,
    pub parent: Option<ElementId>,
    pub children: Vec<ElementId>,
    pub detail: ElementDetail,
    pub options: Vec<OptionEntry>,
}

/// Rejection of a serialized descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DescriptorError {
    #[error("descriptor has no file name")]
    MissingName,
    #[error("dependency {0:?} was not provided")]
    MissingDependency(String),
    #[error("{0:?} is declared more than once")]
    DuplicateSymbol(String),
}

/// All declarations of one schema file.
#[derive(Debug, PartialEq)]
pub struct FileDescriptor {
    name: String,
    package: String,
    syntax: String,
    dependencies: Vec<String>,
    public_dependencies: Vec<usize>,
    deps: Vec<Arc<FileDescriptor>>,
    elements: Vec<Element>,
    by_name: HashMap<String, ElementId>,
}

impl FileDescriptor {
    /// Canonical path of the file.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn package(&self) -> &str {
        &self.package
    }

    /// `proto2` or `proto3`.
    pub fn syntax(&self) -> &str {
        &self.syntax
    }

    /// Import paths in declaration order.
    pub fn dependencies(&self) -> &[String] {
        &self.dependencies
    }

    /// Resolved imports, parallel to [`dependencies`](Self::dependencies).
    pub fn dependency_files(&self) -> &[Arc<FileDescriptor>] {
        &self.deps
    }

    /// Indexes into [`dependencies`](Self::dependencies) of `import public` entries.
    pub fn public_dependencies(&self) -> &[usize] {
        &self.public_dependencies
    }

    pub fn element(&self, id: ElementId) -> &Element {
        &self.elements[id.0 as usize]
    }

    pub fn elements(&self) -> impl Iterator<Item = (ElementId, &Element)> {
        self.elements
            .iter()
            .enumerate()
            .map(|(i, e)| (ElementId(i as u32), e))
    }

    /// Looks up a fully-qualified name declared in this file.
    pub fn find(&self, full_name: &str) -> Option<ElementId> {
        self.by_name
            .get(full_name.strip_prefix('.').unwrap_or(full_name))
            .copied()
    }

    /// Decoded value of a string-valued file option such as `go_package`.
    pub fn string_option(&self, name: &str) -> Option<&str> {
        self.elements[0]
            .options
            .iter()
            .find(|o| o.name == name)
            .and_then(|o| o.literal.as_deref())
    }

    pub fn descriptor(self: &Arc<Self>, id: ElementId) -> Descriptor {
        Descriptor {
            file: Arc::clone(self),
            id,
        }
    }

    pub fn root(self: &Arc<Self>) -> Descriptor {
        self.descriptor(ElementId::FILE)
    }

    pub fn find_descriptor(self: &Arc<Self>, full_name: &str) -> Option<Descriptor> {
        self.find(full_name).map(|id| self.descriptor(id))
    }

    /// Builds a descriptor from its serialized form.
    ///
    /// `deps` must hold the already-built descriptors of every entry of
    /// `proto.dependency`, in order.
    pub fn from_proto(
        proto: &FileDescriptorProto,
        deps: Vec<Arc<FileDescriptor>>,
    ) -> Result<Self, DescriptorError> {
        let name = proto.name();
        if name.is_empty() {
            return Err(DescriptorError::MissingName);
        }
        if let Some(missing) = proto
            .dependency
            .iter()
            .find(|d| !deps.iter().any(|f| f.name() == d.as_str()))
        {
            return Err(DescriptorError::MissingDependency(missing.clone()));
        }
        let syntax = match proto.syntax() {
            "" => "proto2",
            s => s,
        };

        let mut b = FileDescriptorBuilder::new(name, proto.package(), syntax);
        b.dependencies = proto.dependency.clone();
        b.public_dependencies = proto
            .public_dependency
            .iter()
            .filter_map(|i| usize::try_from(*i).ok())
            .collect();
        if let Some(go_package) = proto.options.as_ref().and_then(|o| o.go_package.clone()) {
            b.elements[0].options.push(OptionEntry {
                name: "go_package".to_string(),
                value: format!("{go_package:?}"),
                literal: Some(go_package),
            });
        }

        for m in &proto.message_type {
            add_proto_message(&mut b, ElementId::FILE, m)?;
        }
        for e in &proto.enum_type {
            add_proto_enum(&mut b, ElementId::FILE, e)?;
        }
        for s in &proto.service {
            add_proto_service(&mut b, s)?;
        }
        for x in &proto.extension {
            add_proto_field(&mut b, ElementId::FILE, x, ElementKind::Extension, None)?;
        }
        Ok(b.finish(deps))
    }
}

/// A handle to one element of a shared [`FileDescriptor`].
#[derive(Clone)]
pub struct Descriptor {
    file: Arc<FileDescriptor>,
    id: ElementId,
}

impl Descriptor {
    pub fn file(&self) -> &Arc<FileDescriptor> {
        &self.file
    }

    pub fn id(&self) -> ElementId {
        self.id
    }

    pub fn element(&self) -> &Element {
        self.file.element(self.id)
    }

    pub fn kind(&self) -> ElementKind {
        self.element().kind
    }

    pub fn name(&self) -> &str {
        &self.element().name
    }

    pub fn full_name(&self) -> &str {
        &self.element().full_name
    }

    pub fn parent(&self) -> Option<Descriptor> {
        self.element().parent.map(|p| self.file.descriptor(p))
    }

    pub fn children(&self) -> impl Iterator<Item = Descriptor> + '_ {
        self.element()
            .children
            .iter()
            .map(move |c| self.file.descriptor(*c))
    }

    pub fn field(&self) -> Option<&FieldInfo> {
        match &self.element().detail {
            ElementDetail::Field(f) => Some(f),
            _ => None,
        }
    }

    pub fn method(&self) -> Option<&MethodInfo> {
        match &self.element().detail {
            ElementDetail::Method(m) => Some(m),
            _ => None,
        }
    }

    pub fn is_map_entry(&self) -> bool {
        matches!(
            self.element().detail,
            ElementDetail::Message { map_entry: true }
        )
    }

    /// Child field with the given number.
    pub fn field_by_number(&self, number: i32) -> Option<Descriptor> {
        self.children()
            .find(|c| c.field().is_some_and(|f| f.number == number))
    }

    /// Child element with the given simple name.
    pub fn child_by_name(&self, name: &str) -> Option<Descriptor> {
        self.children().find(|c| c.name() == name)
    }
}

impl PartialEq for Descriptor {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.file.name() == other.file.name()
    }
}

impl Eq for Descriptor {}

impl fmt::Debug for Descriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Descriptor({:?} {} in {})",
            self.kind(),
            self.full_name(),
            self.file.name()
        )
    }
}

// ============================================================================
// Construction
// ============================================================================

/// Incrementally assembles a [`FileDescriptor`].
pub(crate) struct FileDescriptorBuilder {
    pub name: String,
    pub package: String,
    pub syntax: String,
    pub dependencies: Vec<String>,
    pub public_dependencies: Vec<usize>,
    pub elements: Vec<Element>,
    pub by_name: HashMap<String, ElementId>,
}

impl FileDescriptorBuilder {
    pub fn new(name: &str, package: &str, syntax: &str) -> Self {
        let file = Element {
            kind: ElementKind::File,
            name: name.to_string(),
            full_name: name.to_string(),
            parent: None,
            children: Vec::new(),
            detail: ElementDetail::None,
            options: Vec::new(),
        };
        Self {
            name: name.to_string(),
            package: package.to_string(),
            syntax: syntax.to_string(),
            dependencies: Vec::new(),
            public_dependencies: Vec::new(),
            elements: vec![file],
            by_name: HashMap::new(),
        }
    }

    /// Fully-qualified name of the scope that `parent` opens for its children.
    pub fn scope_of(&self, parent: ElementId) -> &str {
        let element = &self.elements[parent.0 as usize];
        match element.kind {
            ElementKind::File => &self.package,
            _ => &element.full_name,
        }
    }

    /// Adds an element and returns its id. Returns `Err` with the new id if
    /// its fully-qualified name was already taken.
    pub fn add(
        &mut self,
        kind: ElementKind,
        name: &str,
        parent: ElementId,
        detail: ElementDetail,
    ) -> Result<ElementId, ElementId> {
        // Enum values and oneof members are scoped like their container's
        // siblings.
        let scope_owner = match kind {
            ElementKind::EnumValue => self.elements[parent.0 as usize]
                .parent
                .unwrap_or(ElementId::FILE),
            _ => parent,
        };
        let scope = self.scope_of(scope_owner);
        let full_name = if scope.is_empty() {
            name.to_string()
        } else {
            format!("{scope}.{name}")
        };

        let id = ElementId(self.elements.len() as u32);
        self.elements.push(Element {
            kind,
            name: name.to_string(),
            full_name: full_name.clone(),
            parent: Some(parent),
            children: Vec::new(),
            detail,
            options: Vec::new(),
        });
        self.elements[parent.0 as usize].children.push(id);

        match self.by_name.entry(full_name) {
            std::collections::hash_map::Entry::Occupied(_) => Err(id),
            std::collections::hash_map::Entry::Vacant(v) => {
                v.insert(id);
                Ok(id)
            }
        }
    }

    pub fn element_mut(&mut self, id: ElementId) -> &mut Element {
        &mut self.elements[id.0 as usize]
    }

    pub fn finish(self, deps: Vec<Arc<FileDescriptor>>) -> FileDescriptor {
        FileDescriptor {
            name: self.name,
            package: self.package,
            syntax: self.syntax,
            dependencies: self.dependencies,
            public_dependencies: self.public_dependencies,
            deps,
            elements: self.elements,
            by_name: self.by_name,
        }
    }
}

fn strip_dot(name: &str) -> String {
    name.strip_prefix('.').unwrap_or(name).to_string()
}

fn added(result: Result<ElementId, ElementId>, b: &FileDescriptorBuilder) -> Result<ElementId, DescriptorError> {
    result.map_err(|id| DescriptorError::DuplicateSymbol(b.elements[id.0 as usize].full_name.clone()))
}

fn add_proto_message(
    b: &mut FileDescriptorBuilder,
    parent: ElementId,
    m: &DescriptorProto,
) -> Result<(), DescriptorError> {
    let map_entry = m.options.as_ref().and_then(|o| o.map_entry).unwrap_or(false);
    let id = b.add(
        ElementKind::Message,
        m.name(),
        parent,
        ElementDetail::Message { map_entry },
    );
    let id = added(id, b)?;

    let mut oneofs = Vec::new();
    for o in &m.oneof_decl {
        let oneof = b.add(ElementKind::Oneof, o.name(), id, ElementDetail::None);
        oneofs.push(added(oneof, b)?);
    }
    for f in &m.field {
        let oneof = f
            .oneof_index
            .and_then(|i| usize::try_from(i).ok())
            .and_then(|i| oneofs.get(i).copied());
        add_proto_field(b, id, f, ElementKind::Field, oneof)?;
    }
    for nested in &m.nested_type {
        add_proto_message(b, id, nested)?;
    }
    for e in &m.enum_type {
        add_proto_enum(b, id, e)?;
    }
    for x in &m.extension {
        add_proto_field(b, id, x, ElementKind::Extension, None)?;
    }
    Ok(())
}

fn add_proto_field(
    b: &mut FileDescriptorBuilder,
    parent: ElementId,
    f: &FieldDescriptorProto,
    kind: ElementKind,
    oneof: Option<ElementId>,
) -> Result<(), DescriptorError> {
    let label = match f.label() {
        field_descriptor_proto::Label::Optional => {
            if f.proto3_optional() || b.syntax == "proto2" {
                Some(Label::Optional)
            } else {
                None
            }
        }
        field_descriptor_proto::Label::Required => Some(Label::Required),
        field_descriptor_proto::Label::Repeated => Some(Label::Repeated),
    };
    let info = FieldInfo {
        number: f.number(),
        label,
        field_type: FieldType::from_proto(f.r#type()),
        type_name: f.type_name.as_deref().map(strip_dot),
        extendee: f.extendee.as_deref().map(strip_dot),
        oneof,
    };
    let id = b.add(kind, f.name(), parent, ElementDetail::Field(info));
    added(id, b)?;
    Ok(())
}

fn add_proto_enum(
    b: &mut FileDescriptorBuilder,
    parent: ElementId,
    e: &EnumDescriptorProto,
) -> Result<(), DescriptorError> {
    let id = b.add(ElementKind::Enum, e.name(), parent, ElementDetail::None);
    let id = added(id, b)?;
    for v in &e.value {
        let value = b.add(
            ElementKind::EnumValue,
            v.name(),
            id,
            ElementDetail::EnumValue { number: v.number() },
        );
        added(value, b)?;
    }
    Ok(())
}

fn add_proto_service(
    b: &mut FileDescriptorBuilder,
    s: &ServiceDescriptorProto,
) -> Result<(), DescriptorError> {
    let id = b.add(ElementKind::Service, s.name(), ElementId::FILE, ElementDetail::None);
    let id = added(id, b)?;
    for m in &s.method {
        let info = MethodInfo {
            input_type: strip_dot(m.input_type()),
            output_type: strip_dot(m.output_type()),
            client_streaming: m.client_streaming(),
            server_streaming: m.server_streaming(),
        };
        let method = b.add(ElementKind::Method, m.name(), id, ElementDetail::Method(info));
        added(method, b)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use prost_types::{
        EnumValueDescriptorProto, FileOptions, MessageOptions, MethodDescriptorProto,
    };

    fn sample_proto() -> FileDescriptorProto {
        FileDescriptorProto {
            name: Some("pkg/sample.proto".to_string()),
            package: Some("sample.v1".to_string()),
            syntax: Some("proto3".to_string()),
            options: Some(FileOptions {
                go_package: Some("example.com/pkg".to_string()),
                ..Default::default()
            }),
            message_type: vec![DescriptorProto {
                name: Some("Req".to_string()),
                field: vec![
                    FieldDescriptorProto {
                        name: Some("id".to_string()),
                        number: Some(1),
                        label: Some(field_descriptor_proto::Label::Optional as i32),
                        r#type: Some(field_descriptor_proto::Type::String as i32),
                        ..Default::default()
                    },
                    FieldDescriptorProto {
                        name: Some("labels".to_string()),
                        number: Some(2),
                        label: Some(field_descriptor_proto::Label::Repeated as i32),
                        r#type: Some(field_descriptor_proto::Type::Message as i32),
                        type_name: Some(".sample.v1.Req.LabelsEntry".to_string()),
                        ..Default::default()
                    },
                ],
                nested_type: vec![DescriptorProto {
                    name: Some("LabelsEntry".to_string()),
                    options: Some(MessageOptions {
                        map_entry: Some(true),
                        ..Default::default()
                    }),
                    ..Default::default()
                }],
                ..Default::default()
            }],
            enum_type: vec![EnumDescriptorProto {
                name: Some("Color".to_string()),
                value: vec![EnumValueDescriptorProto {
                    name: Some("COLOR_RED".to_string()),
                    number: Some(0),
                    ..Default::default()
                }],
                ..Default::default()
            }],
            service: vec![ServiceDescriptorProto {
                name: Some("Svc".to_string()),
                method: vec![MethodDescriptorProto {
                    name: Some("Get".to_string()),
                    input_type: Some(".sample.v1.Req".to_string()),
                    output_type: Some(".sample.v1.Req".to_string()),
                    server_streaming: Some(true),
                    ..Default::default()
                }],
                ..Default::default()
            }],
            ..Default::default()
        }
    }

    #[test]
    fn test_from_proto_names_and_scoping() {
        let fd = Arc::new(FileDescriptor::from_proto(&sample_proto(), Vec::new()).unwrap());
        assert_eq!(fd.name(), "pkg/sample.proto");
        assert_eq!(fd.string_option("go_package"), Some("example.com/pkg"));

        let req = fd.find_descriptor("sample.v1.Req").unwrap();
        assert_eq!(req.kind(), ElementKind::Message);
        let labels = req.child_by_name("labels").unwrap();
        assert_eq!(
            labels.field().unwrap().type_name.as_deref(),
            Some("sample.v1.Req.LabelsEntry")
        );
        assert!(fd.find_descriptor(".sample.v1.Req.LabelsEntry").unwrap().is_map_entry());

        // Enum values live beside their enum.
        assert!(fd.find("sample.v1.COLOR_RED").is_some());
        assert!(fd.find("sample.v1.Color.COLOR_RED").is_none());

        let get = fd.find_descriptor("sample.v1.Svc.Get").unwrap();
        let m = get.method().unwrap();
        assert_eq!(m.input_type, "sample.v1.Req");
        assert!(m.server_streaming);
        assert!(!m.client_streaming);
        assert_eq!(get.parent().unwrap().name(), "Svc");
    }

    #[test]
    fn test_from_proto_requires_dependencies() {
        let mut proto = sample_proto();
        proto.dependency.push("other.proto".to_string());
        assert_eq!(
            FileDescriptor::from_proto(&proto, Vec::new()),
            Err(DescriptorError::MissingDependency("other.proto".to_string()))
        );
    }

    #[test]
    fn test_proto3_implicit_presence_has_no_label() {
        let fd = FileDescriptor::from_proto(&sample_proto(), Vec::new()).unwrap();
        let id = fd.find("sample.v1.Req.id").unwrap();
        let ElementDetail::Field(info) = &fd.element(id).detail else {
            panic!("expected field");
        };
        assert_eq!(info.label, None);
        assert_eq!(info.field_type, FieldType::String);
    }
}
