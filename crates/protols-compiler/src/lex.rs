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

//! Tokenizer for schema sources.
//!
//! Produces a flat token stream plus the list of comments. Lexical errors are
//! collected rather than returned so that the parser can still run over the
//! rest of the file.

use crate::error::ErrorWithPos;
use crate::span::{SourcePos, SourceSpan};

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum TokenKind {
    Ident,
    Int(u64),
    Float(f64),
    /// Decoded string literal value.
    Str(String),
    Punct(char),
    Eof,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Token {
    pub kind: TokenKind,
    pub span: SourceSpan,
}

/// A `//` or `/* */` comment, with its markers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Comment {
    pub span: SourceSpan,
    pub text: String,
}

impl Comment {
    pub fn is_block(&self) -> bool {
        self.text.starts_with("/*")
    }
}

pub(crate) struct Lexed {
    pub tokens: Vec<Token>,
    pub comments: Vec<Comment>,
    pub errors: Vec<ErrorWithPos>,
}

struct Lexer<'a> {
    src: &'a str,
    filename: &'a str,
    offset: usize,
    line: u32,
    column: u32,
    errors: Vec<ErrorWithPos>,
}

pub(crate) fn tokenize(src: &str, filename: &str) -> Lexed {
    let mut lexer = Lexer {
        src,
        filename,
        offset: 0,
        line: 1,
        column: 1,
        errors: Vec::new(),
    };
    let mut tokens = Vec::new();
    let mut comments = Vec::new();

    loop {
        lexer.skip_whitespace();
        let start = lexer.pos();
        let Some(c) = lexer.peek() else {
            tokens.push(Token {
                kind: TokenKind::Eof,
                span: SourceSpan::point(start),
            });
            break;
        };

        if c == '/' && matches!(lexer.peek_at(1), Some('/') | Some('*')) {
            let text = lexer.comment();
            comments.push(Comment {
                span: SourceSpan::new(start, lexer.pos()),
                text,
            });
            continue;
        }

        let kind = if c.is_ascii_alphabetic() || c == '_' {
            lexer.eat_while(|c| c.is_ascii_alphanumeric() || c == '_');
            TokenKind::Ident
        } else if c.is_ascii_digit()
            || (c == '.' && lexer.peek_at(1).is_some_and(|n| n.is_ascii_digit()))
        {
            lexer.number(start)
        } else if c == '"' || c == '\'' {
            lexer.string(start)
        } else {
            lexer.bump();
            TokenKind::Punct(c)
        };
        tokens.push(Token {
            kind,
            span: SourceSpan::new(start, lexer.pos()),
        });
    }

    Lexed {
        tokens,
        comments,
        errors: lexer.errors,
    }
}

impl<'a> Lexer<'a> {
    fn pos(&self) -> SourcePos {
        SourcePos::new(self.line, self.column, self.offset)
    }

    fn peek(&self) -> Option<char> {
        self.src[self.offset..].chars().next()
    }

    fn peek_at(&self, n: usize) -> Option<char> {
        self.src[self.offset..].chars().nth(n)
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.offset += c.len_utf8();
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += c.len_utf16() as u32;
        }
        Some(c)
    }

    fn eat_while(&mut self, pred: impl Fn(char) -> bool) {
        while let Some(c) = self.peek() {
            if !pred(c) {
                break;
            }
            self.bump();
        }
    }

    fn skip_whitespace(&mut self) {
        self.eat_while(char::is_whitespace);
    }

    fn error(&mut self, message: impl Into<String>, start: SourcePos) {
        let span = SourceSpan::new(start, self.pos());
        self.errors
            .push(ErrorWithPos::syntax(message, self.filename, span));
    }

    fn comment(&mut self) -> String {
        let begin = self.offset;
        let start = self.pos();
        self.bump();
        if self.bump() == Some('/') {
            self.eat_while(|c| c != '\n');
        } else {
            let mut closed = false;
            while let Some(c) = self.bump() {
                if c == '*' && self.peek() == Some('/') {
                    self.bump();
                    closed = true;
                    break;
                }
            }
            if !closed {
                self.error("unterminated block comment", start);
            }
        }
        self.src[begin..self.offset].to_string()
    }

    fn number(&mut self, start: SourcePos) -> TokenKind {
        let begin = self.offset;
        if self.peek() == Some('0') && matches!(self.peek_at(1), Some('x') | Some('X')) {
            self.bump();
            self.bump();
            self.eat_while(|c| c.is_ascii_hexdigit());
            let digits = &self.src[begin + 2..self.offset];
            return match u64::from_str_radix(digits, 16) {
                Ok(v) => TokenKind::Int(v),
                Err(_) => {
                    self.error("invalid hexadecimal literal", start);
                    TokenKind::Int(0)
                }
            };
        }

        let mut is_float = false;
        self.eat_while(|c| c.is_ascii_digit());
        if self.peek() == Some('.') {
            is_float = true;
            self.bump();
            self.eat_while(|c| c.is_ascii_digit());
        }
        if matches!(self.peek(), Some('e') | Some('E')) {
            is_float = true;
            self.bump();
            if matches!(self.peek(), Some('+') | Some('-')) {
                self.bump();
            }
            self.eat_while(|c| c.is_ascii_digit());
        }
        // Trailing identifier characters make the whole thing one bad token.
        if self
            .peek()
            .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        {
            self.eat_while(|c| c.is_ascii_alphanumeric() || c == '_');
            self.error("invalid numeric literal", start);
            return TokenKind::Int(0);
        }

        let text = &self.src[begin..self.offset];
        if is_float {
            match text.parse::<f64>() {
                Ok(v) => TokenKind::Float(v),
                Err(_) => {
                    self.error("invalid float literal", start);
                    TokenKind::Float(0.0)
                }
            }
        } else if text.len() > 1 && text.starts_with('0') {
            match u64::from_str_radix(&text[1..], 8) {
                Ok(v) => TokenKind::Int(v),
                Err(_) => {
                    self.error("invalid octal literal", start);
                    TokenKind::Int(0)
                }
            }
        } else {
            match text.parse::<u64>() {
                Ok(v) => TokenKind::Int(v),
                Err(_) => {
                    self.error("integer literal out of range", start);
                    TokenKind::Int(0)
                }
            }
        }
    }

    fn string(&mut self, start: SourcePos) -> TokenKind {
        let quote = self.bump().unwrap_or('"');
        let mut value = String::new();
        loop {
            match self.peek() {
                None | Some('\n') => {
                    self.error("unterminated string literal", start);
                    break;
                }
                Some(c) if c == quote => {
                    self.bump();
                    break;
                }
                Some('\\') => {
                    self.bump();
                    self.escape(&mut value, start);
                }
                Some(c) => {
                    self.bump();
                    value.push(c);
                }
            }
        }
        TokenKind::Str(value)
    }

    fn escape(&mut self, out: &mut String, start: SourcePos) {
        let Some(c) = self.bump() else {
            self.error("unterminated escape sequence", start);
            return;
        };
        match c {
            'n' => out.push('\n'),
            't' => out.push('\t'),
            'r' => out.push('\r'),
            'a' => out.push('\u{7}'),
            'b' => out.push('\u{8}'),
            'f' => out.push('\u{c}'),
            'v' => out.push('\u{b}'),
            '\\' | '\'' | '"' | '?' => out.push(c),
            'x' | 'X' => {
                let code = self.radix_digits(16, 2);
                out.push(char::from_u32(code).unwrap_or('\u{fffd}'));
            }
            'u' => {
                let code = self.radix_digits(16, 4);
                out.push(char::from_u32(code).unwrap_or('\u{fffd}'));
            }
            'U' => {
                let code = self.radix_digits(16, 8);
                out.push(char::from_u32(code).unwrap_or('\u{fffd}'));
            }
            '0'..='7' => {
                let mut code = c.to_digit(8).unwrap_or(0);
                for _ in 0..2 {
                    match self.peek().and_then(|d| d.to_digit(8)) {
                        Some(d) => {
                            self.bump();
                            code = code * 8 + d;
                        }
                        None => break,
                    }
                }
                out.push(char::from_u32(code).unwrap_or('\u{fffd}'));
            }
            other => {
                self.error(format!("invalid escape sequence \\{other}"), start);
                out.push(other);
            }
        }
    }

    fn radix_digits(&mut self, radix: u32, max: usize) -> u32 {
        let mut code = 0u32;
        for _ in 0..max {
            match self.peek().and_then(|d| d.to_digit(radix)) {
                Some(d) => {
                    self.bump();
                    code = code.wrapping_mul(radix).wrapping_add(d);
                }
                None => break,
            }
        }
        code
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        tokenize(src, "t.proto")
            .tokens
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn test_basic_tokens() {
        assert_eq!(
            kinds("message Foo { int32 x = 0x1F; }"),
            vec![
                TokenKind::Ident,
                TokenKind::Ident,
                TokenKind::Punct('{'),
                TokenKind::Ident,
                TokenKind::Ident,
                TokenKind::Punct('='),
                TokenKind::Int(31),
                TokenKind::Punct(';'),
                TokenKind::Punct('}'),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_string_escapes() {
        let toks = kinds(r#""a\n\x41\101\"""#);
        assert_eq!(toks[0], TokenKind::Str("a\nAA\"".to_string()));
    }

    #[test]
    fn test_comments_collected() {
        let lexed = tokenize("// hello\nsyntax /* x */ = 'proto3';", "t.proto");
        assert_eq!(lexed.comments.len(), 2);
        assert_eq!(lexed.comments[0].text, "// hello");
        assert!(lexed.comments[1].is_block());
        assert!(lexed.errors.is_empty());
    }

    #[test]
    fn test_utf16_columns() {
        let lexed = tokenize("\"é😀\" x", "t.proto");
        let ident = &lexed.tokens[1];
        // quote(1) + é(1) + 😀(2) + quote(1) + space(1) => column 7
        assert_eq!(ident.span.start().column(), 7);
        assert_eq!(ident.span.start().line(), 1);
    }

    #[test]
    fn test_floats_and_errors() {
        assert_eq!(kinds("1.5e3")[0], TokenKind::Float(1500.0));
        let lexed = tokenize("\"open", "t.proto");
        assert_eq!(lexed.errors.len(), 1);
        let lexed = tokenize("12abc", "t.proto");
        assert_eq!(lexed.errors.len(), 1);
    }
}
