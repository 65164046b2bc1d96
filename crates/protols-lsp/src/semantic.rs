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

//! Semantic token classification.
//!
//! Tokens are classified from the syntax tree alone, so files that fail to
//! link are still highlighted. Identifiers take their type from the node
//! that owns them: a message name is a class, a field type a type, an
//! option name a property, and so on. Tokens spanning several lines are
//! not emitted.

use protols_compiler::{NodeId, NodeRef, ParsedFile, SourceSpan};
use tower_lsp::lsp_types::{Range, SemanticToken, SemanticTokenType, SemanticTokensLegend};

/// Token types in legend order.
pub const TOKEN_TYPES: [SemanticTokenType; 22] = [
    SemanticTokenType::NAMESPACE,
    SemanticTokenType::TYPE,
    SemanticTokenType::CLASS,
    SemanticTokenType::ENUM,
    SemanticTokenType::INTERFACE,
    SemanticTokenType::STRUCT,
    SemanticTokenType::TYPE_PARAMETER,
    SemanticTokenType::PARAMETER,
    SemanticTokenType::VARIABLE,
    SemanticTokenType::PROPERTY,
    SemanticTokenType::ENUM_MEMBER,
    SemanticTokenType::EVENT,
    SemanticTokenType::FUNCTION,
    SemanticTokenType::METHOD,
    SemanticTokenType::MACRO,
    SemanticTokenType::KEYWORD,
    SemanticTokenType::MODIFIER,
    SemanticTokenType::COMMENT,
    SemanticTokenType::STRING,
    SemanticTokenType::NUMBER,
    SemanticTokenType::REGEXP,
    SemanticTokenType::OPERATOR,
];

const NAMESPACE: u32 = 0;
const TYPE: u32 = 1;
const CLASS: u32 = 2;
const INTERFACE: u32 = 4;
const PROPERTY: u32 = 9;
const ENUM_MEMBER: u32 = 10;
const FUNCTION: u32 = 12;
const KEYWORD: u32 = 15;
const COMMENT: u32 = 17;
const STRING: u32 = 18;
const NUMBER: u32 = 19;
const OPERATOR: u32 = 21;

pub fn legend() -> SemanticTokensLegend {
    SemanticTokensLegend {
        token_types: TOKEN_TYPES.to_vec(),
        token_modifiers: Vec::new(),
    }
}

/// A token before delta encoding. Line and column are 0-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct RawToken {
    pub line: u32,
    pub column: u32,
    pub length: u32,
    pub token_type: u32,
}

impl RawToken {
    fn from_span(span: SourceSpan, token_type: u32) -> Option<Self> {
        if !span.is_single_line() || span.end().column() <= span.start().column() {
            return None;
        }
        Some(Self {
            line: span.start().line() - 1,
            column: span.start().column() - 1,
            length: span.end().column() - span.start().column(),
            token_type,
        })
    }

    fn in_range(&self, range: &Range) -> bool {
        let start = (range.start.line, range.start.character);
        let end = (range.end.line, range.end.character);
        let token_start = (self.line, self.column);
        let token_end = (self.line, self.column + self.length);
        token_start < end && start < token_end
    }
}

/// Classified tokens of `parsed`, sorted by position.
pub fn classify(parsed: &ParsedFile) -> Vec<RawToken> {
    let mut out = Vec::new();
    walk(parsed.ast().as_node(), &mut Vec::new(), &mut out);
    out.extend(
        parsed
            .comments()
            .iter()
            .filter_map(|c| RawToken::from_span(c.span, COMMENT)),
    );
    out.sort();
    out.dedup_by(|a, b| a.line == b.line && a.column == b.column);
    out
}

/// Delta-encoded tokens of `parsed`, limited to `range` if given.
pub fn semantic_tokens(parsed: &ParsedFile, range: Option<&Range>) -> Vec<SemanticToken> {
    let tokens = classify(parsed);
    encode(tokens.iter().filter(|t| range.map_or(true, |r| t.in_range(r))))
}

fn encode<'a>(tokens: impl Iterator<Item = &'a RawToken>) -> Vec<SemanticToken> {
    let (mut line, mut column) = (0, 0);
    tokens
        .map(|t| {
            let delta_line = t.line - line;
            let delta_start = if delta_line == 0 { t.column - column } else { t.column };
            line = t.line;
            column = t.column;
            SemanticToken {
                delta_line,
                delta_start,
                length: t.length,
                token_type: t.token_type,
                token_modifiers_bitset: 0,
            }
        })
        .collect()
}

fn walk<'a>(node: NodeRef<'a>, ancestors: &mut Vec<NodeRef<'a>>, out: &mut Vec<RawToken>) {
    if node.is_terminal() {
        if let Some(token) = token_type(node, ancestors).and_then(|t| RawToken::from_span(node.span(), t)) {
            out.push(token);
        }
        return;
    }
    ancestors.push(node);
    for child in node.children() {
        walk(child, ancestors, out);
    }
    ancestors.pop();
}

fn token_type(node: NodeRef<'_>, ancestors: &[NodeRef<'_>]) -> Option<u32> {
    match node {
        NodeRef::StringLiteral(_) => Some(STRING),
        NodeRef::UintLiteral(_) | NodeRef::FloatLiteral(_) => Some(NUMBER),
        NodeRef::Keyword(_) => Some(KEYWORD),
        NodeRef::Rune(r) => match r.rune {
            '{' | '}' | ';' | '.' => None,
            _ => Some(OPERATOR),
        },
        NodeRef::Ident(ident) => {
            let mut owners = ancestors.iter().rev();
            let owner = match owners.next()? {
                NodeRef::CompoundIdent(_) => owners.next()?,
                parent => parent,
            };
            identifier_type(*owner, ident.id, &ident.value)
        }
        _ => None,
    }
}

fn identifier_type(owner: NodeRef<'_>, id: NodeId, text: &str) -> Option<u32> {
    match owner {
        NodeRef::Package(_) => Some(NAMESPACE),
        NodeRef::Message(m) if m.name.id == id => Some(CLASS),
        NodeRef::Enum(e) if e.name.id == id => Some(CLASS),
        NodeRef::EnumValue(v) if v.name.id == id => Some(ENUM_MEMBER),
        NodeRef::Field(f) if f.name.id == id => Some(PROPERTY),
        NodeRef::Field(_) => Some(TYPE),
        NodeRef::MapField(f) if f.name.id == id => Some(PROPERTY),
        NodeRef::MapType(_) => Some(TYPE),
        NodeRef::Oneof(o) if o.name.id == id => Some(PROPERTY),
        NodeRef::Service(s) if s.name.id == id => Some(INTERFACE),
        NodeRef::Rpc(r) if r.name.id == id => Some(FUNCTION),
        NodeRef::RpcType(_) | NodeRef::Extend(_) => Some(TYPE),
        NodeRef::FieldReference(_) => Some(PROPERTY),
        NodeRef::Option(_)
        | NodeRef::MessageField(_)
        | NodeRef::ArrayLiteral(_)
        | NodeRef::Signed(_) => match text {
            "true" | "false" | "inf" | "nan" => Some(KEYWORD),
            _ => Some(ENUM_MEMBER),
        },
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use protols_compiler::parse;

    fn tokens(source: &str) -> Vec<(u32, u32, u32, SemanticTokenType)> {
        let (parsed, _) = parse("t.proto", source);
        classify(&parsed)
            .into_iter()
            .map(|t| (t.line, t.column, t.length, TOKEN_TYPES[t.token_type as usize].clone()))
            .collect()
    }

    #[test]
    fn test_legend_indices() {
        assert_eq!(TOKEN_TYPES[CLASS as usize], SemanticTokenType::CLASS);
        assert_eq!(TOKEN_TYPES[PROPERTY as usize], SemanticTokenType::PROPERTY);
        assert_eq!(TOKEN_TYPES[ENUM_MEMBER as usize], SemanticTokenType::ENUM_MEMBER);
        assert_eq!(TOKEN_TYPES[FUNCTION as usize], SemanticTokenType::FUNCTION);
        assert_eq!(TOKEN_TYPES[OPERATOR as usize], SemanticTokenType::OPERATOR);
        assert_eq!(legend().token_types.len(), 22);
    }

    #[test]
    fn test_message_tokens() {
        let t = tokens("message Foo {\n  int32 bar = 1; // note\n}\n");
        assert_eq!(
            t,
            vec![
                (0, 0, 7, SemanticTokenType::KEYWORD),
                (0, 8, 3, SemanticTokenType::CLASS),
                (1, 2, 5, SemanticTokenType::TYPE),
                (1, 8, 3, SemanticTokenType::PROPERTY),
                (1, 12, 1, SemanticTokenType::OPERATOR),
                (1, 14, 1, SemanticTokenType::NUMBER),
                (1, 17, 7, SemanticTokenType::COMMENT),
            ]
        );
    }

    #[test]
    fn test_service_and_package() {
        let t = tokens("package a.b;\nservice S { rpc Do(a.b.Req) returns (Resp); }\n");
        assert!(t.contains(&(0, 8, 1, SemanticTokenType::NAMESPACE)));
        assert!(t.contains(&(0, 10, 1, SemanticTokenType::NAMESPACE)));
        assert!(t.contains(&(1, 8, 1, SemanticTokenType::INTERFACE)));
        assert!(t.contains(&(1, 16, 2, SemanticTokenType::FUNCTION)));
        assert!(t.contains(&(1, 23, 3, SemanticTokenType::TYPE)));
        assert!(t.contains(&(1, 37, 4, SemanticTokenType::TYPE)));
    }

    #[test]
    fn test_options_and_enums() {
        let t = tokens("enum E { A = 0 [deprecated = true]; }\noption optimize_for = SPEED;\n");
        assert!(t.contains(&(0, 5, 1, SemanticTokenType::CLASS)));
        assert!(t.contains(&(0, 9, 1, SemanticTokenType::ENUM_MEMBER)));
        assert!(t.contains(&(0, 16, 10, SemanticTokenType::PROPERTY)));
        assert!(t.contains(&(0, 29, 4, SemanticTokenType::KEYWORD)));
        assert!(t.contains(&(1, 7, 12, SemanticTokenType::PROPERTY)));
        assert!(t.contains(&(1, 22, 5, SemanticTokenType::ENUM_MEMBER)));
    }

    #[test]
    fn test_multiline_comment_skipped() {
        let t = tokens("/* a\n b */\nmessage M {}\n");
        assert!(t.iter().all(|tok| tok.3 != SemanticTokenType::COMMENT));
    }

    #[test]
    fn test_delta_encoding_and_range() {
        let (parsed, _) = parse("t.proto", "message Foo {\n  int32 bar = 1;\n}\n");
        let all = semantic_tokens(&parsed, None);
        assert_eq!(all[0].delta_line, 0);
        assert_eq!(all[1].delta_start, 8);
        assert_eq!(all[2].delta_line, 1);
        assert_eq!(all[2].delta_start, 2);
        assert_eq!(all[3].delta_start, 6);

        let second_line = Range::new(
            tower_lsp::lsp_types::Position::new(1, 0),
            tower_lsp::lsp_types::Position::new(2, 0),
        );
        let ranged = semantic_tokens(&parsed, Some(&second_line));
        assert_eq!(ranged.len(), 4);
        assert_eq!((ranged[0].delta_line, ranged[0].delta_start), (1, 2));
    }
}
