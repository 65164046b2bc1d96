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

//! Recursive-descent parser producing a [`FileNode`].
//!
//! # Error Recovery
//!
//! A malformed declaration is reported and dropped; the parser then skips to
//! the end of the statement (`;`) or past the unbalanced block, and resumes
//! with the next declaration. Unterminated bodies are closed at end of file.
//! The resulting tree therefore contains every declaration that parsed
//! cleanly, which is what position queries need while a file is mid-edit.

use crate::ast::*;
use crate::error::ErrorWithPos;
use crate::lex::{tokenize, Comment, Token, TokenKind};
use crate::span::{SourcePos, SourceSpan};
use std::sync::Arc;

/// Result of parsing one file.
#[derive(Debug, Clone)]
pub struct ParsedFile {
    path: String,
    source: Arc<str>,
    ast: FileNode,
    comments: Vec<Comment>,
    error_count: usize,
}

impl ParsedFile {
    /// Canonical path the file was parsed under.
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn ast(&self) -> &FileNode {
        &self.ast
    }

    pub fn comments(&self) -> &[Comment] {
        &self.comments
    }

    /// Returns true if lexing or parsing reported any error.
    pub fn has_errors(&self) -> bool {
        self.error_count > 0
    }
}

/// Parses `source` as the file at canonical `path`.
///
/// Never fails: syntax errors are returned alongside a best-effort tree.
pub fn parse(path: &str, source: &str) -> (ParsedFile, Vec<ErrorWithPos>) {
    let lexed = tokenize(source, path);
    let mut parser = Parser {
        src: source,
        tokens: lexed.tokens,
        pos: 0,
        filename: path,
        next_id: 0,
        errors: lexed.errors,
    };
    let ast = parser.file();
    let errors = parser.errors;
    let parsed = ParsedFile {
        path: path.to_string(),
        source: Arc::from(source),
        ast,
        comments: lexed.comments,
        error_count: errors.len(),
    };
    (parsed, errors)
}

type PResult<T> = Result<T, ErrorWithPos>;

const LABELS: [&str; 3] = ["optional", "required", "repeated"];

struct Parser<'a> {
    src: &'a str,
    tokens: Vec<Token>,
    pos: usize,
    filename: &'a str,
    next_id: u32,
    errors: Vec<ErrorWithPos>,
}

impl<'a> Parser<'a> {
    // ------------------------------------------------------------------
    // Token cursor
    // ------------------------------------------------------------------

    fn id(&mut self) -> NodeId {
        let id = NodeId(self.next_id);
        self.next_id += 1;
        id
    }

    fn peek(&self) -> &Token {
        self.peek_nth(0)
    }

    fn peek_nth(&self, n: usize) -> &Token {
        // The stream always ends with Eof and the cursor never passes it.
        &self.tokens[(self.pos + n).min(self.tokens.len() - 1)]
    }

    fn advance(&mut self) -> Token {
        let tok = self.peek().clone();
        if tok.kind != TokenKind::Eof {
            self.pos += 1;
        }
        tok
    }

    fn at_eof(&self) -> bool {
        self.peek().kind == TokenKind::Eof
    }

    fn at_punct(&self, c: char) -> bool {
        self.peek().kind == TokenKind::Punct(c)
    }

    fn text(&self, tok: &Token) -> &'a str {
        self.src
            .get(tok.span.start().offset()..tok.span.end().offset())
            .unwrap_or("")
    }

    /// Identifier text of the token `n` ahead, or "" for other tokens.
    fn ident_at(&self, n: usize) -> &'a str {
        let tok = self.peek_nth(n);
        match tok.kind {
            TokenKind::Ident => self.text(tok),
            _ => "",
        }
    }

    fn at_keyword(&self, kw: &str) -> bool {
        self.ident_at(0) == kw
    }

    fn start(&self) -> SourcePos {
        self.peek().span.start()
    }

    fn span_from(&self, start: SourcePos) -> SourceSpan {
        let end = if self.pos == 0 {
            start
        } else {
            self.tokens[self.pos - 1].span.end()
        };
        SourceSpan::new(start, end)
    }

    fn unexpected(&self, expected: &str) -> ErrorWithPos {
        let tok = self.peek();
        let found = match &tok.kind {
            TokenKind::Eof => "end of file".to_string(),
            TokenKind::Punct(c) => format!("'{c}'"),
            TokenKind::Str(_) => "string literal".to_string(),
            TokenKind::Int(_) | TokenKind::Float(_) => format!("number {}", self.text(tok)),
            TokenKind::Ident => format!("identifier {:?}", self.text(tok)),
        };
        ErrorWithPos::syntax(
            format!("expected {expected}, found {found}"),
            self.filename,
            tok.span,
        )
    }

    /// Skips the rest of a broken statement: through the next `;` at depth
    /// zero, or past a balanced `{ ... }` block. Stops before an unmatched
    /// `}` so the enclosing body can close.
    fn recover(&mut self) {
        let mut depth = 0usize;
        loop {
            match self.peek().kind {
                TokenKind::Eof => return,
                TokenKind::Punct(';') if depth == 0 => {
                    self.advance();
                    return;
                }
                TokenKind::Punct('{') => depth += 1,
                TokenKind::Punct('}') => {
                    if depth == 0 {
                        return;
                    }
                    depth -= 1;
                    if depth == 0 {
                        self.advance();
                        return;
                    }
                }
                _ => {}
            }
            self.advance();
        }
    }

    // ------------------------------------------------------------------
    // Terminals
    // ------------------------------------------------------------------

    fn rune(&mut self, c: char) -> PResult<RuneNode> {
        if !self.at_punct(c) {
            return Err(self.unexpected(&format!("'{c}'")));
        }
        let tok = self.advance();
        Ok(RuneNode {
            id: self.id(),
            span: tok.span,
            rune: c,
        })
    }

    fn take_rune(&mut self, c: char) -> Option<RuneNode> {
        if self.at_punct(c) {
            self.rune(c).ok()
        } else {
            None
        }
    }

    fn keyword(&mut self, kw: &str) -> PResult<KeywordNode> {
        if !self.at_keyword(kw) {
            return Err(self.unexpected(&format!("{kw:?}")));
        }
        let tok = self.advance();
        Ok(KeywordNode {
            id: self.id(),
            span: tok.span,
            value: kw.to_string(),
        })
    }

    fn take_keyword(&mut self, kw: &str) -> Option<KeywordNode> {
        if self.at_keyword(kw) {
            self.keyword(kw).ok()
        } else {
            None
        }
    }

    fn ident(&mut self) -> PResult<IdentNode> {
        if self.peek().kind != TokenKind::Ident {
            return Err(self.unexpected("identifier"));
        }
        let tok = self.advance();
        Ok(IdentNode {
            id: self.id(),
            span: tok.span,
            value: self.text(&tok).to_string(),
        })
    }

    /// `.`? ident (`.` ident)*
    fn ident_value(&mut self) -> PResult<IdentValueNode> {
        let start = self.start();
        let leading_dot = self.take_rune('.');
        let first = self.ident()?;
        if leading_dot.is_none() && !self.at_punct('.') {
            return Ok(IdentValueNode::Ident(first));
        }
        let mut components = vec![first];
        let mut dots = Vec::new();
        while self.at_punct('.') && self.peek_nth(1).kind == TokenKind::Ident {
            dots.push(self.rune('.')?);
            components.push(self.ident()?);
        }
        Ok(IdentValueNode::Compound(CompoundIdentNode {
            id: self.id(),
            span: self.span_from(start),
            leading_dot,
            components,
            dots,
        }))
    }

    /// One or more adjacent string literals.
    fn string_lit(&mut self) -> PResult<StringLiteralNode> {
        let start = self.start();
        let mut value = String::new();
        let mut pieces = Vec::new();
        while let TokenKind::Str(s) = &self.peek().kind {
            value.push_str(s);
            let tok = self.advance();
            pieces.push(self.text(&tok));
        }
        if pieces.is_empty() {
            return Err(self.unexpected("string literal"));
        }
        Ok(StringLiteralNode {
            id: self.id(),
            span: self.span_from(start),
            value,
            raw: pieces.join(" "),
        })
    }

    fn uint(&mut self) -> PResult<UintLiteralNode> {
        let TokenKind::Int(value) = self.peek().kind else {
            return Err(self.unexpected("integer"));
        };
        let tok = self.advance();
        Ok(UintLiteralNode {
            id: self.id(),
            span: tok.span,
            value,
            raw: self.text(&tok).to_string(),
        })
    }

    // ------------------------------------------------------------------
    // File
    // ------------------------------------------------------------------

    fn file(&mut self) -> FileNode {
        let start = SourcePos::start();
        let syntax = if self.at_keyword("syntax") || self.at_keyword("edition") {
            match self.syntax() {
                Ok(s) => Some(s),
                Err(e) => {
                    self.errors.push(e);
                    self.recover();
                    None
                }
            }
        } else {
            None
        };

        let mut decls = Vec::new();
        while !self.at_eof() {
            if self.at_punct('}') {
                let e = self.unexpected("declaration");
                self.errors.push(e);
                self.advance();
                continue;
            }
            match self.file_element() {
                Ok(d) => decls.push(d),
                Err(e) => {
                    self.errors.push(e);
                    self.recover();
                }
            }
        }

        let end = self.peek().span.end();
        FileNode {
            id: self.id(),
            span: SourceSpan::new(start, end),
            syntax,
            decls,
        }
    }

    fn syntax(&mut self) -> PResult<SyntaxNode> {
        let start = self.start();
        if self.at_keyword("edition") {
            return Err(ErrorWithPos::syntax(
                "editions are not supported",
                self.filename,
                self.peek().span,
            ));
        }
        let keyword = self.keyword("syntax")?;
        let equals = self.rune('=')?;
        let value = self.string_lit()?;
        if value.value != "proto2" && value.value != "proto3" {
            self.errors.push(ErrorWithPos::syntax(
                format!("unknown syntax {:?}", value.value),
                self.filename,
                value.span,
            ));
        }
        let semicolon = self.rune(';')?;
        Ok(SyntaxNode {
            id: self.id(),
            span: self.span_from(start),
            keyword,
            equals,
            value,
            semicolon,
        })
    }

    fn file_element(&mut self) -> PResult<FileElement> {
        if let Some(empty) = self.take_rune(';') {
            return Ok(FileElement::Empty(empty));
        }
        match self.ident_at(0) {
            "package" => self.package().map(FileElement::Package),
            "import" => self.import().map(FileElement::Import),
            "option" => self.option_decl().map(FileElement::Option),
            "message" => self.message().map(FileElement::Message),
            "enum" => self.enumeration().map(FileElement::Enum),
            "service" => self.service().map(FileElement::Service),
            "extend" => self.extend().map(FileElement::Extend),
            _ => Err(self.unexpected("declaration")),
        }
    }

    fn package(&mut self) -> PResult<PackageNode> {
        let start = self.start();
        let keyword = self.keyword("package")?;
        let name = self.ident_value()?;
        let semicolon = self.rune(';')?;
        Ok(PackageNode {
            id: self.id(),
            span: self.span_from(start),
            keyword,
            name,
            semicolon,
        })
    }

    fn import(&mut self) -> PResult<ImportNode> {
        let start = self.start();
        let keyword = self.keyword("import")?;
        let modifier = match self.ident_at(0) {
            "public" => Some(self.keyword("public")?),
            "weak" => Some(self.keyword("weak")?),
            _ => None,
        };
        let name = self.string_lit()?;
        let semicolon = self.rune(';')?;
        Ok(ImportNode {
            id: self.id(),
            span: self.span_from(start),
            keyword,
            modifier,
            name,
            semicolon,
        })
    }

    // ------------------------------------------------------------------
    // Options
    // ------------------------------------------------------------------

    fn option_decl(&mut self) -> PResult<OptionNode> {
        let start = self.start();
        let keyword = self.keyword("option")?;
        let mut opt = self.option_body(start)?;
        opt.keyword = Some(keyword);
        opt.semicolon = Some(self.rune(';')?);
        opt.span = self.span_from(start);
        Ok(opt)
    }

    /// `name = value` without keyword or terminator.
    fn option_body(&mut self, start: SourcePos) -> PResult<OptionNode> {
        let name = self.option_name()?;
        let equals = self.rune('=')?;
        let value = self.value()?;
        Ok(OptionNode {
            id: self.id(),
            span: self.span_from(start),
            keyword: None,
            name,
            equals,
            value,
            semicolon: None,
        })
    }

    fn option_name(&mut self) -> PResult<OptionNameNode> {
        let start = self.start();
        let mut parts = vec![self.field_reference()?];
        let mut dots = Vec::new();
        while self.at_punct('.') {
            dots.push(self.rune('.')?);
            parts.push(self.field_reference()?);
        }
        Ok(OptionNameNode {
            id: self.id(),
            span: self.span_from(start),
            parts,
            dots,
        })
    }

    fn field_reference(&mut self) -> PResult<FieldReferenceNode> {
        let start = self.start();
        if let Some(open) = self.take_rune('(') {
            let name = self.ident_value()?;
            let close = self.rune(')')?;
            return Ok(FieldReferenceNode {
                id: self.id(),
                span: self.span_from(start),
                open: Some(open),
                name,
                close: Some(close),
            });
        }
        let name = IdentValueNode::Ident(self.ident()?);
        Ok(FieldReferenceNode {
            id: self.id(),
            span: self.span_from(start),
            open: None,
            name,
            close: None,
        })
    }

    fn compact_options(&mut self) -> PResult<Option<CompactOptionsNode>> {
        if !self.at_punct('[') {
            return Ok(None);
        }
        let start = self.start();
        let open = self.rune('[')?;
        let mut options = Vec::new();
        let mut commas = Vec::new();
        loop {
            let opt_start = self.start();
            options.push(self.option_body(opt_start)?);
            match self.take_rune(',') {
                Some(c) => commas.push(c),
                None => break,
            }
        }
        let close = self.rune(']')?;
        Ok(Some(CompactOptionsNode {
            id: self.id(),
            span: self.span_from(start),
            open,
            options,
            commas,
            close,
        }))
    }

    fn value(&mut self) -> PResult<ValueNode> {
        let start = self.start();
        match self.peek().kind.clone() {
            TokenKind::Punct('-') | TokenKind::Punct('+') => {
                let c = if self.at_punct('-') { '-' } else { '+' };
                let sign = self.rune(c)?;
                let inner = self.value()?;
                if !matches!(
                    inner,
                    ValueNode::Uint(_) | ValueNode::Float(_) | ValueNode::Ident(_)
                ) {
                    return Err(ErrorWithPos::syntax(
                        "sign must precede a number",
                        self.filename,
                        sign.span,
                    ));
                }
                Ok(ValueNode::Signed(SignedNode {
                    id: self.id(),
                    span: self.span_from(start),
                    sign,
                    value: Box::new(inner),
                }))
            }
            TokenKind::Str(_) => self.string_lit().map(ValueNode::String),
            TokenKind::Int(_) => self.uint().map(ValueNode::Uint),
            TokenKind::Float(value) => {
                let tok = self.advance();
                Ok(ValueNode::Float(FloatLiteralNode {
                    id: self.id(),
                    span: tok.span,
                    value,
                    raw: self.text(&tok).to_string(),
                }))
            }
            TokenKind::Ident => self.ident().map(ValueNode::Ident),
            TokenKind::Punct('{') => self.message_literal('{', '}').map(ValueNode::MessageLiteral),
            TokenKind::Punct('<') => self.message_literal('<', '>').map(ValueNode::MessageLiteral),
            TokenKind::Punct('[') => self.array_literal().map(ValueNode::Array),
            _ => Err(self.unexpected("value")),
        }
    }

    fn message_literal(&mut self, open_c: char, close_c: char) -> PResult<MessageLiteralNode> {
        let start = self.start();
        let open = self.rune(open_c)?;
        let mut fields = Vec::new();
        while !self.at_punct(close_c) && !self.at_eof() {
            fields.push(self.message_field()?);
        }
        let close = Some(self.rune(close_c)?);
        Ok(MessageLiteralNode {
            id: self.id(),
            span: self.span_from(start),
            open,
            fields,
            close,
        })
    }

    fn message_field(&mut self) -> PResult<MessageFieldNode> {
        let start = self.start();
        let name = if self.at_punct('[') {
            // Extension or Any type URL: `[foo.bar]`, `[type.googleapis.com/foo.Bar]`.
            let open = self.rune('[')?;
            let name_start = self.start();
            let mut text = String::new();
            while !self.at_punct(']') && !self.at_eof() {
                let tok = self.advance();
                text.push_str(self.text(&tok));
            }
            let ident = IdentNode {
                id: self.id(),
                span: self.span_from(name_start),
                value: text,
            };
            let close = self.rune(']')?;
            FieldReferenceNode {
                id: self.id(),
                span: self.span_from(start),
                open: Some(open),
                name: IdentValueNode::Ident(ident),
                close: Some(close),
            }
        } else {
            let ident = self.ident()?;
            FieldReferenceNode {
                id: self.id(),
                span: ident.span,
                open: None,
                name: IdentValueNode::Ident(ident),
                close: None,
            }
        };
        let sep = self.take_rune(':');
        if sep.is_none() && !self.at_punct('{') && !self.at_punct('<') {
            return Err(self.unexpected("':'"));
        }
        let value = self.value()?;
        let trailing = self.take_rune(',').or_else(|| self.take_rune(';'));
        Ok(MessageFieldNode {
            id: self.id(),
            span: self.span_from(start),
            name,
            sep,
            value,
            trailing,
        })
    }

    fn array_literal(&mut self) -> PResult<ArrayLiteralNode> {
        let start = self.start();
        let open = self.rune('[')?;
        let mut elements = Vec::new();
        let mut commas = Vec::new();
        while !self.at_punct(']') && !self.at_eof() {
            elements.push(self.value()?);
            match self.take_rune(',') {
                Some(c) => commas.push(c),
                None => break,
            }
        }
        let close = Some(self.rune(']')?);
        Ok(ArrayLiteralNode {
            id: self.id(),
            span: self.span_from(start),
            open,
            elements,
            commas,
            close,
        })
    }

    // ------------------------------------------------------------------
    // Bodies
    // ------------------------------------------------------------------

    /// Parses `{ element* }`, recovering inside the body. The closing brace
    /// is `None` when the body runs into end of file.
    fn body<T>(
        &mut self,
        mut element: impl FnMut(&mut Self) -> PResult<T>,
    ) -> PResult<(RuneNode, Vec<T>, Option<RuneNode>)> {
        let open = self.rune('{')?;
        let mut decls = Vec::new();
        loop {
            if self.at_eof() {
                let e = self.unexpected("'}'");
                self.errors.push(e);
                return Ok((open, decls, None));
            }
            if let Some(close) = self.take_rune('}') {
                return Ok((open, decls, Some(close)));
            }
            match element(self) {
                Ok(d) => decls.push(d),
                Err(e) => {
                    self.errors.push(e);
                    self.recover();
                }
            }
        }
    }

    fn message(&mut self) -> PResult<MessageNode> {
        let start = self.start();
        let keyword = self.keyword("message")?;
        let name = self.ident()?;
        let (open, decls, close) = self.body(Self::message_element)?;
        Ok(MessageNode {
            id: self.id(),
            span: self.span_from(start),
            keyword,
            name,
            open,
            decls,
            close,
        })
    }

    fn message_element(&mut self) -> PResult<MessageElement> {
        if let Some(empty) = self.take_rune(';') {
            return Ok(MessageElement::Empty(empty));
        }
        match self.ident_at(0) {
            "message" => self.message().map(MessageElement::Message),
            "enum" => self.enumeration().map(MessageElement::Enum),
            "oneof" => self.oneof().map(MessageElement::Oneof),
            "extend" => self.extend().map(MessageElement::Extend),
            "option" => self.option_decl().map(MessageElement::Option),
            "reserved" => self.reserved().map(MessageElement::Reserved),
            "extensions" => self.extension_range().map(MessageElement::Extensions),
            "map" if self.peek_nth(1).kind == TokenKind::Punct('<') => {
                self.map_field().map(MessageElement::MapField)
            }
            _ => self.field().map(MessageElement::Field),
        }
    }

    fn field(&mut self) -> PResult<FieldNode> {
        let start = self.start();
        let label_text = self.ident_at(0);
        let label = if LABELS.contains(&label_text) && self.peek_nth(1).kind == TokenKind::Ident {
            Some(self.keyword(label_text)?)
        } else {
            None
        };
        if self.at_keyword("group") && self.peek_nth(1).kind == TokenKind::Ident {
            return Err(ErrorWithPos::syntax(
                "groups are not supported",
                self.filename,
                self.peek().span,
            ));
        }
        let field_type = self.ident_value()?;
        let name = self.ident()?;
        let equals = self.rune('=')?;
        let tag = self.uint()?;
        let options = self.compact_options()?;
        let semicolon = self.rune(';')?;
        Ok(FieldNode {
            id: self.id(),
            span: self.span_from(start),
            label,
            field_type,
            name,
            equals,
            tag,
            options,
            semicolon,
        })
    }

    fn map_field(&mut self) -> PResult<MapFieldNode> {
        let start = self.start();
        let keyword = self.keyword("map")?;
        let open = self.rune('<')?;
        let key_type = self.ident()?;
        let comma = self.rune(',')?;
        let value_type = self.ident_value()?;
        let close = self.rune('>')?;
        let map_type = MapTypeNode {
            id: self.id(),
            span: self.span_from(start),
            keyword,
            open,
            key_type,
            comma,
            value_type,
            close,
        };
        let name = self.ident()?;
        let equals = self.rune('=')?;
        let tag = self.uint()?;
        let options = self.compact_options()?;
        let semicolon = self.rune(';')?;
        Ok(MapFieldNode {
            id: self.id(),
            span: self.span_from(start),
            map_type,
            name,
            equals,
            tag,
            options,
            semicolon,
        })
    }

    fn oneof(&mut self) -> PResult<OneofNode> {
        let start = self.start();
        let keyword = self.keyword("oneof")?;
        let name = self.ident()?;
        let (open, decls, close) = self.body(|p| {
            if let Some(empty) = p.take_rune(';') {
                return Ok(OneofElement::Empty(empty));
            }
            if p.at_keyword("option") {
                return p.option_decl().map(OneofElement::Option);
            }
            p.field().map(OneofElement::Field)
        })?;
        Ok(OneofNode {
            id: self.id(),
            span: self.span_from(start),
            keyword,
            name,
            open,
            decls,
            close,
        })
    }

    fn extend(&mut self) -> PResult<ExtendNode> {
        let start = self.start();
        let keyword = self.keyword("extend")?;
        let extendee = self.ident_value()?;
        let (open, decls, close) = self.body(|p| {
            if p.at_punct(';') {
                p.advance();
                return Ok(None);
            }
            p.field().map(Some)
        })?;
        Ok(ExtendNode {
            id: self.id(),
            span: self.span_from(start),
            keyword,
            extendee,
            open,
            fields: decls.into_iter().flatten().collect(),
            close,
        })
    }

    fn range(&mut self) -> PResult<RangeNode> {
        let start_pos = self.start();
        let minus = self.take_rune('-');
        let start = self.uint()?;
        let to = self.take_keyword("to");
        let (end_minus, end) = if to.is_some() {
            if let Some(max) = self.take_keyword("max") {
                (None, Some(RangeEnd::Max(max)))
            } else {
                let m = self.take_rune('-');
                (m, Some(RangeEnd::Number(self.uint()?)))
            }
        } else {
            (None, None)
        };
        Ok(RangeNode {
            id: self.id(),
            span: self.span_from(start_pos),
            minus,
            start,
            to,
            end_minus,
            end,
        })
    }

    fn reserved(&mut self) -> PResult<ReservedNode> {
        let start = self.start();
        let keyword = self.keyword("reserved")?;
        let mut elements = Vec::new();
        let mut commas = Vec::new();
        loop {
            let element = if matches!(self.peek().kind, TokenKind::Str(_)) {
                ReservedElement::Name(self.string_lit()?)
            } else {
                ReservedElement::Range(self.range()?)
            };
            elements.push(element);
            match self.take_rune(',') {
                Some(c) => commas.push(c),
                None => break,
            }
        }
        let semicolon = self.rune(';')?;
        Ok(ReservedNode {
            id: self.id(),
            span: self.span_from(start),
            keyword,
            elements,
            commas,
            semicolon,
        })
    }

    fn extension_range(&mut self) -> PResult<ExtensionRangeNode> {
        let start = self.start();
        let keyword = self.keyword("extensions")?;
        let mut ranges = vec![self.range()?];
        let mut commas = Vec::new();
        while let Some(c) = self.take_rune(',') {
            commas.push(c);
            ranges.push(self.range()?);
        }
        let options = self.compact_options()?;
        let semicolon = self.rune(';')?;
        Ok(ExtensionRangeNode {
            id: self.id(),
            span: self.span_from(start),
            keyword,
            ranges,
            commas,
            options,
            semicolon,
        })
    }

    // ------------------------------------------------------------------
    // Enums
    // ------------------------------------------------------------------

    fn enumeration(&mut self) -> PResult<EnumNode> {
        let start = self.start();
        let keyword = self.keyword("enum")?;
        let name = self.ident()?;
        let (open, decls, close) = self.body(|p| {
            if let Some(empty) = p.take_rune(';') {
                return Ok(EnumElement::Empty(empty));
            }
            match p.ident_at(0) {
                "option" if p.peek_nth(1).kind != TokenKind::Punct('=') => {
                    p.option_decl().map(EnumElement::Option)
                }
                "reserved" if p.peek_nth(1).kind != TokenKind::Punct('=') => {
                    p.reserved().map(EnumElement::Reserved)
                }
                _ => p.enum_value().map(EnumElement::Value),
            }
        })?;
        Ok(EnumNode {
            id: self.id(),
            span: self.span_from(start),
            keyword,
            name,
            open,
            decls,
            close,
        })
    }

    fn enum_value(&mut self) -> PResult<EnumValueNode> {
        let start = self.start();
        let name = self.ident()?;
        let equals = self.rune('=')?;
        let minus = self.take_rune('-');
        let number = self.uint()?;
        let options = self.compact_options()?;
        let semicolon = self.rune(';')?;
        Ok(EnumValueNode {
            id: self.id(),
            span: self.span_from(start),
            name,
            equals,
            minus,
            number,
            options,
            semicolon,
        })
    }

    // ------------------------------------------------------------------
    // Services
    // ------------------------------------------------------------------

    fn service(&mut self) -> PResult<ServiceNode> {
        let start = self.start();
        let keyword = self.keyword("service")?;
        let name = self.ident()?;
        let (open, decls, close) = self.body(|p| {
            if let Some(empty) = p.take_rune(';') {
                return Ok(ServiceElement::Empty(empty));
            }
            match p.ident_at(0) {
                "option" => p.option_decl().map(ServiceElement::Option),
                "rpc" => p.rpc().map(ServiceElement::Rpc),
                _ => Err(p.unexpected("\"rpc\" or \"option\"")),
            }
        })?;
        Ok(ServiceNode {
            id: self.id(),
            span: self.span_from(start),
            keyword,
            name,
            open,
            decls,
            close,
        })
    }

    fn rpc(&mut self) -> PResult<RpcNode> {
        let start = self.start();
        let keyword = self.keyword("rpc")?;
        let name = self.ident()?;
        let input = self.rpc_type()?;
        let returns = self.keyword("returns")?;
        let output = self.rpc_type()?;
        let body = if self.at_punct('{') {
            let (open, decls, close) = self.body(|p| {
                if p.at_punct(';') {
                    p.advance();
                    return Ok(None);
                }
                p.option_decl().map(Some)
            })?;
            RpcBody::Block(RpcBlock {
                open,
                options: decls.into_iter().flatten().collect(),
                close,
            })
        } else {
            RpcBody::Semicolon(self.rune(';')?)
        };
        Ok(RpcNode {
            id: self.id(),
            span: self.span_from(start),
            keyword,
            name,
            input,
            returns,
            output,
            body,
        })
    }

    fn rpc_type(&mut self) -> PResult<RpcTypeNode> {
        let start = self.start();
        let open = self.rune('(')?;
        let stream = if self.at_keyword("stream") && self.peek_nth(1).kind != TokenKind::Punct(')')
        {
            Some(self.keyword("stream")?)
        } else {
            None
        };
        let message_type = self.ident_value()?;
        let close = self.rune(')')?;
        Ok(RpcTypeNode {
            id: self.id(),
            span: self.span_from(start),
            open,
            stream,
            message_type,
            close,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_ok(src: &str) -> ParsedFile {
        let (parsed, errors) = parse("test.proto", src);
        assert!(errors.is_empty(), "unexpected errors: {errors:?}");
        parsed
    }

    #[test]
    fn test_parse_full_file() {
        let parsed = parse_ok(
            r#"
syntax = "proto3";
package acme.api.v1;
import public "other.proto";
option go_package = "example.com/acme/api/v1";

message Foo {
  repeated string names = 1 [deprecated = true, (my.ext).x = { a: 1 b: [1, 2] }];
  map<string, Bar> bars = 2;
  oneof choice {
    int32 a = 3;
    .acme.api.v1.Bar b = 4;
  }
  reserved 5 to 10, 20 to max;
  reserved "old";
  enum Kind { KIND_UNSPECIFIED = 0; KIND_NEG = -1; }
}

service Svc {
  rpc Get(stream Foo) returns (Bar) {
    option deprecated = true;
  }
  rpc List(Foo) returns (stream Bar);
}

extend google.protobuf.FieldOptions {
  optional string x = 5000;
}
"#,
        );
        let ast = parsed.ast();
        assert_eq!(ast.package().map(|p| p.name.value()), Some("acme.api.v1".to_string()));
        assert_eq!(ast.imports().count(), 1);
        assert!(ast.imports().all(|i| i.is_public()));
        assert_eq!(ast.decls.len(), 6);

        let FileElement::Message(foo) = &ast.decls[3] else {
            panic!("expected message");
        };
        assert_eq!(foo.name.value, "Foo");
        assert!(matches!(foo.decls[1], MessageElement::MapField(_)));
        let MessageElement::Oneof(oneof) = &foo.decls[2] else {
            panic!("expected oneof");
        };
        let OneofElement::Field(b) = &oneof.decls[1] else {
            panic!("expected field");
        };
        assert_eq!(b.field_type.value(), ".acme.api.v1.Bar");
    }

    #[test]
    fn test_recovers_after_bad_declaration() {
        let (parsed, errors) = parse(
            "test.proto",
            "syntax = \"proto3\";\nmessage A { int32 = 1; string ok = 2; }\nmessage B {}\n",
        );
        assert_eq!(errors.len(), 1);
        assert!(parsed.has_errors());
        let ast = parsed.ast();
        assert_eq!(ast.decls.len(), 2);
        let FileElement::Message(a) = &ast.decls[0] else {
            panic!("expected message");
        };
        assert_eq!(a.decls.len(), 1);
    }

    #[test]
    fn test_unterminated_body_is_closed_at_eof() {
        let (parsed, errors) = parse("test.proto", "message A {\n  string x = 1;\n");
        assert_eq!(errors.len(), 1);
        let FileElement::Message(a) = &parsed.ast().decls[0] else {
            panic!("expected message");
        };
        assert!(a.close.is_none());
        assert_eq!(a.decls.len(), 1);
    }

    #[test]
    fn test_field_spans() {
        let parsed = parse_ok("message A {\n  string name = 1;\n}\n");
        let FileElement::Message(a) = &parsed.ast().decls[0] else {
            panic!("expected message");
        };
        let MessageElement::Field(f) = &a.decls[0] else {
            panic!("expected field");
        };
        assert_eq!(f.name.span.start().line(), 2);
        assert_eq!(f.name.span.start().column(), 10);
        assert_eq!(f.name.span.end().column(), 14);
        assert_eq!(f.span.start().column(), 3);
    }

    #[test]
    fn test_node_ids_are_unique() {
        let parsed = parse_ok("message A { map<string, int32> m = 1; }");
        let mut seen = std::collections::HashSet::new();
        let mut stack = vec![parsed.ast().as_node()];
        while let Some(n) = stack.pop() {
            assert!(seen.insert(n.id()), "duplicate id {:?}", n.id());
            stack.extend(n.children());
        }
        assert!(seen.len() > 10);
    }

    #[test]
    fn test_groups_rejected() {
        let (_, errors) = parse("test.proto", "message A { optional group G = 1 { } }");
        assert!(!errors.is_empty());
    }
}
