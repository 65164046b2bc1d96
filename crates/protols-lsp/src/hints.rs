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

//! Inlay type hints.
//!
//! - Built-in file options get their value type after the name:
//!   `option go_package string = "...";`
//! - Custom options whose type is a message get the message name before
//!   the value, and so do message-typed fields inside the literal.

use crate::position::{lookup, SymbolSource};
use crate::utils::{pos_to_position, ranges_intersect, span_to_range};
use protols_compiler::ast::{FileElement, MessageLiteralNode, ValueNode};
use protols_compiler::printer::print_descriptor;
use protols_compiler::{
    Descriptor, ElementKind, LinkedFile, NodeDescriptor, NodeRef, SourcePos, SourceSpan,
};
use tower_lsp::lsp_types::{
    InlayHint, InlayHintKind, InlayHintLabel, InlayHintTooltip, MarkupContent, MarkupKind, Range,
};

/// Value types of the built-in file options.
const WELL_KNOWN_FILE_OPTIONS: &[(&str, &str)] = &[
    ("java_package", "string"),
    ("java_outer_classname", "string"),
    ("java_multiple_files", "bool"),
    ("java_generate_equals_and_hash", "bool"),
    ("java_string_check_utf8", "bool"),
    ("optimize_for", "google.protobuf.FileOptions.OptimizeMode"),
    ("go_package", "string"),
    ("cc_generic_services", "bool"),
    ("java_generic_services", "bool"),
    ("py_generic_services", "bool"),
    ("php_generic_services", "bool"),
    ("deprecated", "bool"),
    ("cc_enable_arenas", "bool"),
    ("objc_class_prefix", "string"),
    ("csharp_namespace", "string"),
    ("swift_prefix", "string"),
    ("php_class_prefix", "string"),
    ("php_namespace", "string"),
    ("php_metadata_namespace", "string"),
    ("ruby_package", "string"),
];

fn file_option_type(name: &str) -> Option<&'static str> {
    WELL_KNOWN_FILE_OPTIONS
        .iter()
        .find(|(option, _)| *option == name)
        .map(|(_, ty)| *ty)
}

fn hint(at: SourcePos, label: String, tooltip: Option<&Descriptor>, padding_right: bool) -> InlayHint {
    InlayHint {
        position: pos_to_position(at),
        label: InlayHintLabel::String(label),
        kind: Some(InlayHintKind::TYPE),
        text_edits: None,
        tooltip: tooltip.map(|d| {
            InlayHintTooltip::MarkupContent(MarkupContent {
                kind: MarkupKind::Markdown,
                value: format!("```protobuf\n{}\n```", print_descriptor(d)),
            })
        }),
        padding_left: Some(true),
        padding_right: Some(padding_right),
        data: None,
    }
}

pub fn inlay_hints(file: &LinkedFile, source: &dyn SymbolSource, range: Option<&Range>) -> Vec<InlayHint> {
    let visible = |span: SourceSpan| range.map_or(true, |r| ranges_intersect(r, &span_to_range(span)));
    let mut hints = Vec::new();

    for decl in &file.ast().decls {
        let FileElement::Option(option) = decl else {
            continue;
        };
        let [part] = option.name.parts.as_slice() else {
            continue;
        };
        if part.is_extension() || !visible(option.name.span) {
            continue;
        }
        if let Some(ty) = file_option_type(&part.name.value()) {
            hints.push(hint(option.name.span.end(), ty.to_string(), None, false));
        }
    }

    let mut stack = vec![file.ast().as_node()];
    while let Some(node) = stack.pop() {
        if !visible(node.span()) {
            continue;
        }
        let NodeRef::Option(option) = node else {
            stack.extend(node.children().into_iter().rev().filter(|c| !c.is_terminal()));
            continue;
        };
        let Some(NodeDescriptor::Option(target)) = file.node_descriptor(option.id) else {
            continue;
        };
        let Some(last) = target.parts.last().filter(|p| p.is_extension) else {
            continue;
        };
        let Some(message) = lookup(file, source, &last.name).and_then(|ext| message_type(file, source, &ext))
        else {
            continue;
        };
        hints.push(hint(
            option.value.span().start(),
            message.full_name().to_string(),
            Some(&message),
            true,
        ));
        if let ValueNode::MessageLiteral(literal) = &option.value {
            literal_hints(file, source, literal, &message, &mut hints);
        }
    }
    hints
}

fn message_type(file: &LinkedFile, source: &dyn SymbolSource, field: &Descriptor) -> Option<Descriptor> {
    let name = field.field()?.type_name.as_deref()?;
    lookup(file, source, name).filter(|d| d.kind() == ElementKind::Message)
}

fn literal_hints(
    file: &LinkedFile,
    source: &dyn SymbolSource,
    literal: &MessageLiteralNode,
    message: &Descriptor,
    hints: &mut Vec<InlayHint>,
) {
    for entry in &literal.fields {
        let name = entry.name.name.value();
        let field = if entry.name.is_extension() {
            lookup(file, source, &name)
        } else {
            message.child_by_name(&name)
        };
        let Some(nested) = field.and_then(|f| message_type(file, source, &f)) else {
            continue;
        };
        let values: Vec<&ValueNode> = match &entry.value {
            ValueNode::Array(array) => array.elements.iter().collect(),
            value => vec![value],
        };
        for value in values {
            if let ValueNode::MessageLiteral(inner) = value {
                hints.push(hint(
                    inner.span.start(),
                    nested.full_name().to_string(),
                    Some(&nested),
                    true,
                ));
                literal_hints(file, source, inner, &nested, hints);
            }
        }
    }
}
