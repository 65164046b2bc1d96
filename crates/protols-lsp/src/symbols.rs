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

//! Document symbols for the outline view.
//!
//! Built from the syntax tree, so a file with errors still has an outline:
//!
//! - services, with their methods and each method's request and response
//! - messages, with fields, map fields, oneofs and nested declarations
//! - enums, with their values
//! - extend blocks, named after the extended message, with their fields

use crate::utils::span_to_range;
use protols_compiler::ast::{
    EnumElement, EnumNode, ExtendNode, FieldNode, FileElement, MessageElement, MessageNode,
    OneofElement, RpcNode, RpcTypeNode, ServiceElement, ServiceNode,
};
use protols_compiler::{FileNode, SourceSpan};
use tower_lsp::lsp_types::{DocumentSymbol, SymbolKind};
use tracing::debug;

#[allow(deprecated)]
fn symbol(
    name: String,
    detail: Option<String>,
    kind: SymbolKind,
    span: SourceSpan,
    selection: SourceSpan,
    children: Vec<DocumentSymbol>,
) -> DocumentSymbol {
    DocumentSymbol {
        name,
        detail,
        kind,
        tags: None,
        deprecated: None,
        range: span_to_range(span),
        selection_range: span_to_range(selection),
        children: (!children.is_empty()).then_some(children),
    }
}

pub fn document_symbols(ast: &FileNode) -> Vec<DocumentSymbol> {
    let symbols: Vec<DocumentSymbol> = ast
        .decls
        .iter()
        .filter_map(|decl| match decl {
            FileElement::Service(s) => Some(service(s)),
            FileElement::Message(m) => Some(message(m)),
            FileElement::Enum(e) => Some(enumeration(e)),
            FileElement::Extend(x) => Some(extend(x)),
            _ => None,
        })
        .collect();
    debug!("{} top-level symbols", symbols.len());
    symbols
}

fn service(node: &ServiceNode) -> DocumentSymbol {
    let methods = node
        .decls
        .iter()
        .filter_map(|d| match d {
            ServiceElement::Rpc(r) => Some(rpc(r)),
            _ => None,
        })
        .collect();
    symbol(
        node.name.value.clone(),
        None,
        SymbolKind::INTERFACE,
        node.span,
        node.name.span,
        methods,
    )
}

fn streaming(node: &RpcNode) -> &'static str {
    match (node.input.stream.is_some(), node.output.stream.is_some()) {
        (false, false) => "unary",
        (true, false) => "stream (client)",
        (false, true) => "stream (server)",
        (true, true) => "stream (bidirectional)",
    }
}

fn rpc(node: &RpcNode) -> DocumentSymbol {
    let side = |label: &str, t: &RpcTypeNode| {
        symbol(
            t.message_type.value(),
            Some(label.to_string()),
            SymbolKind::CLASS,
            t.span,
            t.message_type.span(),
            Vec::new(),
        )
    };
    symbol(
        node.name.value.clone(),
        Some(streaming(node).to_string()),
        SymbolKind::METHOD,
        node.span,
        node.name.span,
        vec![side("request", &node.input), side("response", &node.output)],
    )
}

fn field(node: &FieldNode) -> DocumentSymbol {
    let detail = match &node.label {
        Some(label) => format!("{} {}", label.value, node.field_type.value()),
        None => node.field_type.value(),
    };
    symbol(
        node.name.value.clone(),
        Some(detail),
        SymbolKind::FIELD,
        node.span,
        node.name.span,
        Vec::new(),
    )
}

fn message(node: &MessageNode) -> DocumentSymbol {
    let mut children = Vec::new();
    for decl in &node.decls {
        match decl {
            MessageElement::Field(f) => children.push(field(f)),
            MessageElement::MapField(f) => children.push(symbol(
                f.name.value.clone(),
                Some(format!(
                    "map<{}, {}>",
                    f.map_type.key_type.value,
                    f.map_type.value_type.value()
                )),
                SymbolKind::FIELD,
                f.span,
                f.name.span,
                Vec::new(),
            )),
            MessageElement::Oneof(o) => {
                let fields = o
                    .decls
                    .iter()
                    .filter_map(|d| match d {
                        OneofElement::Field(f) => Some(field(f)),
                        _ => None,
                    })
                    .collect();
                children.push(symbol(
                    o.name.value.clone(),
                    Some("oneof".to_string()),
                    SymbolKind::STRUCT,
                    o.span,
                    o.name.span,
                    fields,
                ));
            }
            MessageElement::Message(m) => children.push(message(m)),
            MessageElement::Enum(e) => children.push(enumeration(e)),
            MessageElement::Extend(x) => children.push(extend(x)),
            _ => {}
        }
    }
    symbol(
        node.name.value.clone(),
        None,
        SymbolKind::CLASS,
        node.span,
        node.name.span,
        children,
    )
}

fn enumeration(node: &EnumNode) -> DocumentSymbol {
    let values = node
        .decls
        .iter()
        .filter_map(|d| match d {
            EnumElement::Value(v) => Some(symbol(
                v.name.value.clone(),
                Some(v.value().to_string()),
                SymbolKind::ENUM_MEMBER,
                v.span,
                v.name.span,
                Vec::new(),
            )),
            _ => None,
        })
        .collect();
    symbol(
        node.name.value.clone(),
        None,
        SymbolKind::ENUM,
        node.span,
        node.name.span,
        values,
    )
}

fn extend(node: &ExtendNode) -> DocumentSymbol {
    let fields = node.fields.iter().map(field).collect();
    symbol(
        node.extendee.value(),
        Some("extend".to_string()),
        SymbolKind::CLASS,
        node.span,
        node.extendee.span(),
        fields,
    )
}
