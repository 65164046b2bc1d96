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

//! Syntax tree for schema sources.
//!
//! The tree is a set of plain node structs owned by a [`FileNode`]. Every
//! node carries a [`NodeId`], unique within one parse, and a [`SourceSpan`].
//! Generic traversal goes through [`NodeRef`], a borrowed sum type over every
//! node kind:
//!
//! - [`NodeRef::children`] yields child nodes in source order
//! - [`NodeRef::is_terminal`] marks the leaves (identifiers, literals,
//!   keywords and punctuation)
//!
//! Consumers match on `NodeRef` exhaustively instead of registering visitor
//! callbacks.

use crate::span::SourceSpan;

/// Identity of a syntax node within one parsed file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u32);

// ============================================================================
// Terminals
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct IdentNode {
    pub id: NodeId,
    pub span: SourceSpan,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct KeywordNode {
    pub id: NodeId,
    pub span: SourceSpan,
    pub value: String,
}

/// A single punctuation character.
#[derive(Debug, Clone, PartialEq)]
pub struct RuneNode {
    pub id: NodeId,
    pub span: SourceSpan,
    pub rune: char,
}

/// A string literal; adjacent literals are merged into one node.
#[derive(Debug, Clone, PartialEq)]
pub struct StringLiteralNode {
    pub id: NodeId,
    pub span: SourceSpan,
    pub value: String,
    pub raw: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UintLiteralNode {
    pub id: NodeId,
    pub span: SourceSpan,
    pub value: u64,
    pub raw: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FloatLiteralNode {
    pub id: NodeId,
    pub span: SourceSpan,
    pub value: f64,
    pub raw: String,
}

// ============================================================================
// Identifiers and values
// ============================================================================

/// A dotted name such as `foo.bar.Baz` or `.foo.Baz`.
#[derive(Debug, Clone, PartialEq)]
pub struct CompoundIdentNode {
    pub id: NodeId,
    pub span: SourceSpan,
    pub leading_dot: Option<RuneNode>,
    pub components: Vec<IdentNode>,
    pub dots: Vec<RuneNode>,
}

impl CompoundIdentNode {
    pub fn value(&self) -> String {
        let joined = self
            .components
            .iter()
            .map(|c| c.value.as_str())
            .collect::<Vec<_>>()
            .join(".");
        if self.leading_dot.is_some() {
            format!(".{joined}")
        } else {
            joined
        }
    }
}

/// A type or package reference: either a single identifier or a dotted one.
#[derive(Debug, Clone, PartialEq)]
pub enum IdentValueNode {
    Ident(IdentNode),
    Compound(CompoundIdentNode),
}

impl IdentValueNode {
    pub fn value(&self) -> String {
        match self {
            Self::Ident(n) => n.value.clone(),
            Self::Compound(n) => n.value(),
        }
    }

    pub fn span(&self) -> SourceSpan {
        match self {
            Self::Ident(n) => n.span,
            Self::Compound(n) => n.span,
        }
    }

    pub fn as_node(&self) -> NodeRef<'_> {
        match self {
            Self::Ident(n) => NodeRef::Ident(n),
            Self::Compound(n) => NodeRef::CompoundIdent(n),
        }
    }
}

/// `-` applied to a numeric literal or `inf`.
#[derive(Debug, Clone, PartialEq)]
pub struct SignedNode {
    pub id: NodeId,
    pub span: SourceSpan,
    pub sign: RuneNode,
    pub value: Box<ValueNode>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ValueNode {
    Ident(IdentNode),
    String(StringLiteralNode),
    Uint(UintLiteralNode),
    Float(FloatLiteralNode),
    Signed(SignedNode),
    MessageLiteral(MessageLiteralNode),
    Array(ArrayLiteralNode),
}

impl ValueNode {
    pub fn as_node(&self) -> NodeRef<'_> {
        match self {
            Self::Ident(n) => NodeRef::Ident(n),
            Self::String(n) => NodeRef::StringLiteral(n),
            Self::Uint(n) => NodeRef::UintLiteral(n),
            Self::Float(n) => NodeRef::FloatLiteral(n),
            Self::Signed(n) => NodeRef::Signed(n),
            Self::MessageLiteral(n) => NodeRef::MessageLiteral(n),
            Self::Array(n) => NodeRef::ArrayLiteral(n),
        }
    }

    pub fn span(&self) -> SourceSpan {
        self.as_node().span()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MessageLiteralNode {
    pub id: NodeId,
    pub span: SourceSpan,
    pub open: RuneNode,
    pub fields: Vec<MessageFieldNode>,
    pub close: Option<RuneNode>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MessageFieldNode {
    pub id: NodeId,
    pub span: SourceSpan,
    pub name: FieldReferenceNode,
    pub sep: Option<RuneNode>,
    pub value: ValueNode,
    pub trailing: Option<RuneNode>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ArrayLiteralNode {
    pub id: NodeId,
    pub span: SourceSpan,
    pub open: RuneNode,
    pub elements: Vec<ValueNode>,
    pub commas: Vec<RuneNode>,
    pub close: Option<RuneNode>,
}

// ============================================================================
// Options
// ============================================================================

/// One component of an option name: `foo` or `(foo.bar)`.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldReferenceNode {
    pub id: NodeId,
    pub span: SourceSpan,
    pub open: Option<RuneNode>,
    pub name: IdentValueNode,
    pub close: Option<RuneNode>,
}

impl FieldReferenceNode {
    pub fn is_extension(&self) -> bool {
        self.open.is_some()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OptionNameNode {
    pub id: NodeId,
    pub span: SourceSpan,
    pub parts: Vec<FieldReferenceNode>,
    pub dots: Vec<RuneNode>,
}

impl OptionNameNode {
    /// The name as written, e.g. `(my.ext).field`.
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .map(|p| {
                if p.is_extension() {
                    format!("({})", p.name.value())
                } else {
                    p.name.value()
                }
            })
            .collect::<Vec<_>>()
            .join(".")
    }
}

/// `option name = value;` or, inside brackets, `name = value`.
#[derive(Debug, Clone, PartialEq)]
pub struct OptionNode {
    pub id: NodeId,
    pub span: SourceSpan,
    pub keyword: Option<KeywordNode>,
    pub name: OptionNameNode,
    pub equals: RuneNode,
    pub value: ValueNode,
    pub semicolon: Option<RuneNode>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompactOptionsNode {
    pub id: NodeId,
    pub span: SourceSpan,
    pub open: RuneNode,
    pub options: Vec<OptionNode>,
    pub commas: Vec<RuneNode>,
    pub close: RuneNode,
}

// ============================================================================
// File-level declarations
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct FileNode {
    pub id: NodeId,
    pub span: SourceSpan,
    pub syntax: Option<SyntaxNode>,
    pub decls: Vec<FileElement>,
}

impl FileNode {
    pub fn imports(&self) -> impl Iterator<Item = &ImportNode> {
        self.decls.iter().filter_map(|d| match d {
            FileElement::Import(i) => Some(i),
            _ => None,
        })
    }

    pub fn package(&self) -> Option<&PackageNode> {
        self.decls.iter().find_map(|d| match d {
            FileElement::Package(p) => Some(p),
            _ => None,
        })
    }

    pub fn as_node(&self) -> NodeRef<'_> {
        NodeRef::File(self)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FileElement {
    Package(PackageNode),
    Import(ImportNode),
    Option(OptionNode),
    Message(MessageNode),
    Enum(EnumNode),
    Service(ServiceNode),
    Extend(ExtendNode),
    Empty(RuneNode),
}

impl FileElement {
    pub fn as_node(&self) -> NodeRef<'_> {
        match self {
            Self::Package(n) => NodeRef::Package(n),
            Self::Import(n) => NodeRef::Import(n),
            Self::Option(n) => NodeRef::Option(n),
            Self::Message(n) => NodeRef::Message(n),
            Self::Enum(n) => NodeRef::Enum(n),
            Self::Service(n) => NodeRef::Service(n),
            Self::Extend(n) => NodeRef::Extend(n),
            Self::Empty(n) => NodeRef::Rune(n),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SyntaxNode {
    pub id: NodeId,
    pub span: SourceSpan,
    pub keyword: KeywordNode,
    pub equals: RuneNode,
    pub value: StringLiteralNode,
    pub semicolon: RuneNode,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PackageNode {
    pub id: NodeId,
    pub span: SourceSpan,
    pub keyword: KeywordNode,
    pub name: IdentValueNode,
    pub semicolon: RuneNode,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImportNode {
    pub id: NodeId,
    pub span: SourceSpan,
    pub keyword: KeywordNode,
    /// `public` or `weak`.
    pub modifier: Option<KeywordNode>,
    pub name: StringLiteralNode,
    pub semicolon: RuneNode,
}

impl ImportNode {
    pub fn is_public(&self) -> bool {
        self.modifier.as_ref().is_some_and(|m| m.value == "public")
    }
}

// ============================================================================
// Messages
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct MessageNode {
    pub id: NodeId,
    pub span: SourceSpan,
    pub keyword: KeywordNode,
    pub name: IdentNode,
    pub open: RuneNode,
    pub decls: Vec<MessageElement>,
    pub close: Option<RuneNode>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MessageElement {
    Field(FieldNode),
    MapField(MapFieldNode),
    Oneof(OneofNode),
    Message(MessageNode),
    Enum(EnumNode),
    Extend(ExtendNode),
    Option(OptionNode),
    Reserved(ReservedNode),
    Extensions(ExtensionRangeNode),
    Empty(RuneNode),
}

impl MessageElement {
    pub fn as_node(&self) -> NodeRef<'_> {
        match self {
            Self::Field(n) => NodeRef::Field(n),
            Self::MapField(n) => NodeRef::MapField(n),
            Self::Oneof(n) => NodeRef::Oneof(n),
            Self::Message(n) => NodeRef::Message(n),
            Self::Enum(n) => NodeRef::Enum(n),
            Self::Extend(n) => NodeRef::Extend(n),
            Self::Option(n) => NodeRef::Option(n),
            Self::Reserved(n) => NodeRef::Reserved(n),
            Self::Extensions(n) => NodeRef::ExtensionRange(n),
            Self::Empty(n) => NodeRef::Rune(n),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldNode {
    pub id: NodeId,
    pub span: SourceSpan,
    /// `optional`, `required` or `repeated`.
    pub label: Option<KeywordNode>,
    pub field_type: IdentValueNode,
    pub name: IdentNode,
    pub equals: RuneNode,
    pub tag: UintLiteralNode,
    pub options: Option<CompactOptionsNode>,
    pub semicolon: RuneNode,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MapTypeNode {
    pub id: NodeId,
    pub span: SourceSpan,
    pub keyword: KeywordNode,
    pub open: RuneNode,
    pub key_type: IdentNode,
    pub comma: RuneNode,
    pub value_type: IdentValueNode,
    pub close: RuneNode,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MapFieldNode {
    pub id: NodeId,
    pub span: SourceSpan,
    pub map_type: MapTypeNode,
    pub name: IdentNode,
    pub equals: RuneNode,
    pub tag: UintLiteralNode,
    pub options: Option<CompactOptionsNode>,
    pub semicolon: RuneNode,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OneofNode {
    pub id: NodeId,
    pub span: SourceSpan,
    pub keyword: KeywordNode,
    pub name: IdentNode,
    pub open: RuneNode,
    pub decls: Vec<OneofElement>,
    pub close: Option<RuneNode>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum OneofElement {
    Field(FieldNode),
    Option(OptionNode),
    Empty(RuneNode),
}

impl OneofElement {
    pub fn as_node(&self) -> NodeRef<'_> {
        match self {
            Self::Field(n) => NodeRef::Field(n),
            Self::Option(n) => NodeRef::Option(n),
            Self::Empty(n) => NodeRef::Rune(n),
        }
    }
}

/// `extend Foo { ... }`
#[derive(Debug, Clone, PartialEq)]
pub struct ExtendNode {
    pub id: NodeId,
    pub span: SourceSpan,
    pub keyword: KeywordNode,
    pub extendee: IdentValueNode,
    pub open: RuneNode,
    pub fields: Vec<FieldNode>,
    pub close: Option<RuneNode>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RangeEnd {
    Number(UintLiteralNode),
    Max(KeywordNode),
}

#[derive(Debug, Clone, PartialEq)]
pub struct RangeNode {
    pub id: NodeId,
    pub span: SourceSpan,
    pub minus: Option<RuneNode>,
    pub start: UintLiteralNode,
    pub to: Option<KeywordNode>,
    pub end_minus: Option<RuneNode>,
    pub end: Option<RangeEnd>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ReservedElement {
    Range(RangeNode),
    Name(StringLiteralNode),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReservedNode {
    pub id: NodeId,
    pub span: SourceSpan,
    pub keyword: KeywordNode,
    pub elements: Vec<ReservedElement>,
    pub commas: Vec<RuneNode>,
    pub semicolon: RuneNode,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExtensionRangeNode {
    pub id: NodeId,
    pub span: SourceSpan,
    pub keyword: KeywordNode,
    pub ranges: Vec<RangeNode>,
    pub commas: Vec<RuneNode>,
    pub options: Option<CompactOptionsNode>,
    pub semicolon: RuneNode,
}

// ============================================================================
// Enums
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct EnumNode {
    pub id: NodeId,
    pub span: SourceSpan,
    pub keyword: KeywordNode,
    pub name: IdentNode,
    pub open: RuneNode,
    pub decls: Vec<EnumElement>,
    pub close: Option<RuneNode>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EnumElement {
    Value(EnumValueNode),
    Option(OptionNode),
    Reserved(ReservedNode),
    Empty(RuneNode),
}

impl EnumElement {
    pub fn as_node(&self) -> NodeRef<'_> {
        match self {
            Self::Value(n) => NodeRef::EnumValue(n),
            Self::Option(n) => NodeRef::Option(n),
            Self::Reserved(n) => NodeRef::Reserved(n),
            Self::Empty(n) => NodeRef::Rune(n),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnumValueNode {
    pub id: NodeId,
    pub span: SourceSpan,
    pub name: IdentNode,
    pub equals: RuneNode,
    pub minus: Option<RuneNode>,
    pub number: UintLiteralNode,
    pub options: Option<CompactOptionsNode>,
    pub semicolon: RuneNode,
}

impl EnumValueNode {
    pub fn value(&self) -> i64 {
        let magnitude = self.number.value as i64;
        if self.minus.is_some() {
            -magnitude
        } else {
            magnitude
        }
    }
}

// ============================================================================
// Services
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct ServiceNode {
    pub id: NodeId,
    pub span: SourceSpan,
    pub keyword: KeywordNode,
    pub name: IdentNode,
    pub open: RuneNode,
    pub decls: Vec<ServiceElement>,
    pub close: Option<RuneNode>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ServiceElement {
    Rpc(RpcNode),
    Option(OptionNode),
    Empty(RuneNode),
}

impl ServiceElement {
    pub fn as_node(&self) -> NodeRef<'_> {
        match self {
            Self::Rpc(n) => NodeRef::Rpc(n),
            Self::Option(n) => NodeRef::Option(n),
            Self::Empty(n) => NodeRef::Rune(n),
        }
    }
}

/// `(stream Foo)` in an rpc signature.
#[derive(Debug, Clone, PartialEq)]
pub struct RpcTypeNode {
    pub id: NodeId,
    pub span: SourceSpan,
    pub open: RuneNode,
    pub stream: Option<KeywordNode>,
    pub message_type: IdentValueNode,
    pub close: RuneNode,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RpcBlock {
    pub open: RuneNode,
    pub options: Vec<OptionNode>,
    pub close: Option<RuneNode>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RpcBody {
    Semicolon(RuneNode),
    Block(RpcBlock),
}

#[derive(Debug, Clone, PartialEq)]
pub struct RpcNode {
    pub id: NodeId,
    pub span: SourceSpan,
    pub keyword: KeywordNode,
    pub name: IdentNode,
    pub input: RpcTypeNode,
    pub returns: KeywordNode,
    pub output: RpcTypeNode,
    pub body: RpcBody,
}

// ============================================================================
// Generic traversal
// ============================================================================

macro_rules! node_refs {
    ($($variant:ident($ty:ty)),* $(,)?) => {
        /// A borrowed reference to any syntax node.
        #[derive(Debug, Clone, Copy)]
        pub enum NodeRef<'a> {
            $($variant(&'a $ty)),*
        }

        impl<'a> NodeRef<'a> {
            pub fn id(&self) -> NodeId {
                match self {
                    $(Self::$variant(n) => n.id),*
                }
            }

            pub fn span(&self) -> SourceSpan {
                match self {
                    $(Self::$variant(n) => n.span),*
                }
            }
        }

        $(
            impl<'a> From<&'a $ty> for NodeRef<'a> {
                fn from(n: &'a $ty) -> Self {
                    Self::$variant(n)
                }
            }
        )*
    };
}

node_refs! {
    File(FileNode),
    Syntax(SyntaxNode),
    Package(PackageNode),
    Import(ImportNode),
    Option(OptionNode),
    OptionName(OptionNameNode),
    FieldReference(FieldReferenceNode),
    CompactOptions(CompactOptionsNode),
    MessageLiteral(MessageLiteralNode),
    MessageField(MessageFieldNode),
    ArrayLiteral(ArrayLiteralNode),
    Signed(SignedNode),
    Message(MessageNode),
    Field(FieldNode),
    MapField(MapFieldNode),
    MapType(MapTypeNode),
    Oneof(OneofNode),
    Enum(EnumNode),
    EnumValue(EnumValueNode),
    Service(ServiceNode),
    Rpc(RpcNode),
    RpcType(RpcTypeNode),
    Extend(ExtendNode),
    Reserved(ReservedNode),
    Range(RangeNode),
    ExtensionRange(ExtensionRangeNode),
    CompoundIdent(CompoundIdentNode),
    Ident(IdentNode),
    StringLiteral(StringLiteralNode),
    UintLiteral(UintLiteralNode),
    FloatLiteral(FloatLiteralNode),
    Keyword(KeywordNode),
    Rune(RuneNode),
}

struct Children<'a>(Vec<NodeRef<'a>>);

impl<'a> Children<'a> {
    fn push(&mut self, n: impl Into<NodeRef<'a>>) {
        self.0.push(n.into());
    }

    fn opt<T>(&mut self, n: &'a Option<T>)
    where
        &'a T: Into<NodeRef<'a>>,
    {
        if let Some(n) = n {
            self.0.push(n.into());
        }
    }

    fn all<T>(&mut self, ns: &'a [T])
    where
        &'a T: Into<NodeRef<'a>>,
    {
        self.0.extend(ns.iter().map(Into::into));
    }
}

impl<'a> NodeRef<'a> {
    /// Leaves of the tree: identifiers, literals, keywords and punctuation.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Ident(_)
                | Self::StringLiteral(_)
                | Self::UintLiteral(_)
                | Self::FloatLiteral(_)
                | Self::Keyword(_)
                | Self::Rune(_)
        )
    }

    /// Direct children in source order.
    pub fn children(&self) -> Vec<NodeRef<'a>> {
        let mut c = Children(Vec::new());
        match *self {
            Self::File(n) => {
                c.opt(&n.syntax);
                c.0.extend(n.decls.iter().map(FileElement::as_node));
            }
            Self::Syntax(n) => {
                c.push(&n.keyword);
                c.push(&n.equals);
                c.push(&n.value);
                c.push(&n.semicolon);
            }
            Self::Package(n) => {
                c.push(&n.keyword);
                c.0.push(n.name.as_node());
                c.push(&n.semicolon);
            }
            Self::Import(n) => {
                c.push(&n.keyword);
                c.opt(&n.modifier);
                c.push(&n.name);
                c.push(&n.semicolon);
            }
            Self::Option(n) => {
                c.opt(&n.keyword);
                c.push(&n.name);
                c.push(&n.equals);
                c.0.push(n.value.as_node());
                c.opt(&n.semicolon);
            }
            Self::OptionName(n) => {
                c.all(&n.parts);
                c.all(&n.dots);
            }
            Self::FieldReference(n) => {
                c.opt(&n.open);
                c.0.push(n.name.as_node());
                c.opt(&n.close);
            }
            Self::CompactOptions(n) => {
                c.push(&n.open);
                c.all(&n.options);
                c.all(&n.commas);
                c.push(&n.close);
            }
            Self::MessageLiteral(n) => {
                c.push(&n.open);
                c.all(&n.fields);
                c.opt(&n.close);
            }
            Self::MessageField(n) => {
                c.push(&n.name);
                c.opt(&n.sep);
                c.0.push(n.value.as_node());
                c.opt(&n.trailing);
            }
            Self::ArrayLiteral(n) => {
                c.push(&n.open);
                c.0.extend(n.elements.iter().map(ValueNode::as_node));
                c.all(&n.commas);
                c.opt(&n.close);
            }
            Self::Signed(n) => {
                c.push(&n.sign);
                c.0.push(n.value.as_node());
            }
            Self::Message(n) => {
                c.push(&n.keyword);
                c.push(&n.name);
                c.push(&n.open);
                c.0.extend(n.decls.iter().map(MessageElement::as_node));
                c.opt(&n.close);
            }
            Self::Field(n) => {
                c.opt(&n.label);
                c.0.push(n.field_type.as_node());
                c.push(&n.name);
                c.push(&n.equals);
                c.push(&n.tag);
                c.opt(&n.options);
                c.push(&n.semicolon);
            }
            Self::MapField(n) => {
                c.push(&n.map_type);
                c.push(&n.name);
                c.push(&n.equals);
                c.push(&n.tag);
                c.opt(&n.options);
                c.push(&n.semicolon);
            }
            Self::MapType(n) => {
                c.push(&n.keyword);
                c.push(&n.open);
                c.push(&n.key_type);
                c.push(&n.comma);
                c.0.push(n.value_type.as_node());
                c.push(&n.close);
            }
            Self::Oneof(n) => {
                c.push(&n.keyword);
                c.push(&n.name);
                c.push(&n.open);
                c.0.extend(n.decls.iter().map(OneofElement::as_node));
                c.opt(&n.close);
            }
            Self::Enum(n) => {
                c.push(&n.keyword);
                c.push(&n.name);
                c.push(&n.open);
                c.0.extend(n.decls.iter().map(EnumElement::as_node));
                c.opt(&n.close);
            }
            Self::EnumValue(n) => {
                c.push(&n.name);
                c.push(&n.equals);
                c.opt(&n.minus);
                c.push(&n.number);
                c.opt(&n.options);
                c.push(&n.semicolon);
            }
            Self::Service(n) => {
                c.push(&n.keyword);
                c.push(&n.name);
                c.push(&n.open);
                c.0.extend(n.decls.iter().map(ServiceElement::as_node));
                c.opt(&n.close);
            }
            Self::Rpc(n) => {
                c.push(&n.keyword);
                c.push(&n.name);
                c.push(&n.input);
                c.push(&n.returns);
                c.push(&n.output);
                match &n.body {
                    RpcBody::Semicolon(s) => c.push(s),
                    RpcBody::Block(b) => {
                        c.push(&b.open);
                        c.all(&b.options);
                        c.opt(&b.close);
                    }
                }
            }
            Self::RpcType(n) => {
                c.push(&n.open);
                c.opt(&n.stream);
                c.0.push(n.message_type.as_node());
                c.push(&n.close);
            }
            Self::Extend(n) => {
                c.push(&n.keyword);
                c.0.push(n.extendee.as_node());
                c.push(&n.open);
                c.all(&n.fields);
                c.opt(&n.close);
            }
            Self::Reserved(n) => {
                c.push(&n.keyword);
                for e in &n.elements {
                    match e {
                        ReservedElement::Range(r) => c.push(r),
                        ReservedElement::Name(s) => c.push(s),
                    }
                }
                c.all(&n.commas);
                c.push(&n.semicolon);
            }
            Self::Range(n) => {
                c.opt(&n.minus);
                c.push(&n.start);
                c.opt(&n.to);
                c.opt(&n.end_minus);
                match &n.end {
                    Some(RangeEnd::Number(v)) => c.push(v),
                    Some(RangeEnd::Max(k)) => c.push(k),
                    None => {}
                }
            }
            Self::ExtensionRange(n) => {
                c.push(&n.keyword);
                c.all(&n.ranges);
                c.all(&n.commas);
                c.opt(&n.options);
                c.push(&n.semicolon);
            }
            Self::CompoundIdent(n) => {
                c.opt(&n.leading_dot);
                c.all(&n.components);
                c.all(&n.dots);
            }
            Self::Ident(_)
            | Self::StringLiteral(_)
            | Self::UintLiteral(_)
            | Self::FloatLiteral(_)
            | Self::Keyword(_)
            | Self::Rune(_) => {}
        }
        let mut children = c.0;
        children.sort_by_key(|n| n.span().start().offset());
        children
    }
}
