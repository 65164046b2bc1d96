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

//! Static extraction of embedded descriptors from generated Go code.
//!
//! `protoc-gen-go` output records the schema it was generated from in a
//! header comment (`// source: example.com/foo/bar.proto`) and embeds the
//! serialized descriptor under `file_<sanitized path>_rawDesc`, either as a
//! `[]byte{0x0a, ...}` composite literal or, in newer releases, as a
//! concatenation of string literals. Nothing is executed: the file is
//! tokenized and the literal is read off the token stream.

use crate::constants::GZIP_MAGIC;
use crate::error::SynthesisError;
use flate2::read::GzDecoder;
use prost::Message;
use prost_types::FileDescriptorProto;
use std::io::Read;

/// Import path from the `// source:` header comment, if any.
pub fn source_header(text: &str) -> Option<&str> {
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let Some(comment) = line.strip_prefix("//") else {
            // Header comments precede the package clause.
            break;
        };
        if let Some(path) = comment.trim().strip_prefix("source:") {
            let path = path.trim();
            if path.ends_with(".proto") {
                return Some(path);
            }
        }
    }
    None
}

/// Go identifier under which the descriptor of `path` is embedded.
pub fn symbol_name(path: &str) -> String {
    let sanitized: String = path
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    format!("file_{sanitized}_rawDesc")
}

/// Bytes of the `var`/`const` declaration named `symbol`.
///
/// Returns `Ok(None)` if `text` does not declare `symbol`, and an error if
/// it does but the value is not a literal this reader understands.
pub fn extract_raw_desc(text: &str, symbol: &str) -> Result<Option<Vec<u8>>, String> {
    if !text.contains(symbol) {
        return Ok(None);
    }
    let tokens = tokenize(text)?;
    let Some(value_start) = find_declaration(&tokens, symbol) else {
        return Ok(None);
    };
    let mut cursor = Cursor {
        tokens: &tokens,
        pos: value_start,
    };
    cursor.value().map(Some)
}

/// Decompresses (when gzip-framed) and decodes a raw descriptor.
pub fn decode_descriptor(raw: &[u8]) -> Result<FileDescriptorProto, SynthesisError> {
    if raw.starts_with(&GZIP_MAGIC) {
        let mut decompressed = Vec::with_capacity(raw.len() * 4);
        GzDecoder::new(raw)
            .read_to_end(&mut decompressed)
            .map_err(SynthesisError::Gzip)?;
        Ok(FileDescriptorProto::decode(decompressed.as_slice())?)
    } else {
        Ok(FileDescriptorProto::decode(raw)?)
    }
}

// ============================================================================
// Tokenizer
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
enum Tok {
    Ident(String),
    Number(String),
    Str(Vec<u8>),
    Char,
    Punct(char),
}

#[derive(Debug, Clone)]
struct Token {
    tok: Tok,
    /// First token on its line.
    line_start: bool,
}

fn tokenize(text: &str) -> Result<Vec<Token>, String> {
    let bytes = text.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;
    let mut line_start = true;
    while i < bytes.len() {
        let b = bytes[i];
        match b {
            b'\n' => {
                line_start = true;
                i += 1;
                continue;
            }
            b' ' | b'\t' | b'\r' => {
                i += 1;
                continue;
            }
            b'/' if bytes.get(i + 1) == Some(&b'/') => {
                while i < bytes.len() && bytes[i] != b'\n' {
                    i += 1;
                }
                continue;
            }
            b'/' if bytes.get(i + 1) == Some(&b'*') => {
                let end = text[i + 2..]
                    .find("*/")
                    .ok_or_else(|| "unterminated block comment".to_string())?;
                if text[i..i + 2 + end].contains('\n') {
                    line_start = true;
                }
                i += end + 4;
                continue;
            }
            _ => {}
        }

        let tok = if b == b'_' || b.is_ascii_alphabetic() || b >= 0x80 {
            let start = i;
            while i < bytes.len()
                && (bytes[i] == b'_' || bytes[i].is_ascii_alphanumeric() || bytes[i] >= 0x80)
            {
                i += 1;
            }
            Tok::Ident(text[start..i].to_string())
        } else if b.is_ascii_digit() {
            let start = i;
            while i < bytes.len()
                && (bytes[i] == b'_' || bytes[i] == b'.' || bytes[i].is_ascii_alphanumeric())
            {
                i += 1;
            }
            Tok::Number(text[start..i].to_string())
        } else if b == b'"' {
            let (value, next) = interpreted_string(text, i)?;
            i = next;
            Tok::Str(value)
        } else if b == b'`' {
            let end = text[i + 1..]
                .find('`')
                .ok_or_else(|| "unterminated raw string".to_string())?;
            let raw = &text[i + 1..i + 1 + end];
            i += end + 2;
            Tok::Str(raw.bytes().filter(|b| *b != b'\r').collect())
        } else if b == b'\'' {
            i += 1;
            while i < bytes.len() && bytes[i] != b'\'' {
                if bytes[i] == b'\\' {
                    i += 1;
                }
                i += 1;
            }
            i += 1;
            Tok::Char
        } else {
            let c = text[i..].chars().next().unwrap_or(' ');
            i += c.len_utf8();
            Tok::Punct(c)
        };
        tokens.push(Token { tok, line_start });
        line_start = false;
    }
    Ok(tokens)
}

/// Decodes the interpreted string literal starting at byte `start`.
/// Returns the bytes and the offset just past the closing quote.
fn interpreted_string(text: &str, start: usize) -> Result<(Vec<u8>, usize), String> {
    let bytes = text.as_bytes();
    let mut out = Vec::new();
    let mut i = start + 1;
    loop {
        let Some(&b) = bytes.get(i) else {
            return Err("unterminated string literal".to_string());
        };
        match b {
            b'"' => return Ok((out, i + 1)),
            b'\n' => return Err("newline in string literal".to_string()),
            b'\\' => {
                let Some(&e) = bytes.get(i + 1) else {
                    return Err("unterminated escape".to_string());
                };
                i += 2;
                match e {
                    b'a' => out.push(0x07),
                    b'b' => out.push(0x08),
                    b'f' => out.push(0x0c),
                    b'n' => out.push(b'\n'),
                    b'r' => out.push(b'\r'),
                    b't' => out.push(b'\t'),
                    b'v' => out.push(0x0b),
                    b'\\' => out.push(b'\\'),
                    b'\'' => out.push(b'\''),
                    b'"' => out.push(b'"'),
                    b'x' => {
                        out.push(parse_radix(text.get(i..i + 2), 16)? as u8);
                        i += 2;
                    }
                    b'0'..=b'7' => {
                        let value = parse_radix(text.get(i - 1..i + 2), 8)?;
                        out.push(u8::try_from(value).map_err(|_| "octal escape out of range")?);
                        i += 2;
                    }
                    b'u' | b'U' => {
                        let width = if e == b'u' { 4 } else { 8 };
                        let value = parse_radix(text.get(i..i + width), 16)?;
                        let c = char::from_u32(value)
                            .ok_or_else(|| format!("invalid code point {value:#x}"))?;
                        let mut buf = [0u8; 4];
                        out.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
                        i += width;
                    }
                    other => return Err(format!("unknown escape \\{}", other as char)),
                }
            }
            _ => {
                out.push(b);
                i += 1;
            }
        }
    }
}

fn parse_radix(digits: Option<&str>, radix: u32) -> Result<u32, String> {
    let digits = digits.ok_or_else(|| "truncated escape".to_string())?;
    u32::from_str_radix(digits, radix).map_err(|e| format!("bad escape {digits:?}: {e}"))
}

// ============================================================================
// Declarations
// ============================================================================

/// Index of the first value token of the declaration of `symbol`.
fn find_declaration(tokens: &[Token], symbol: &str) -> Option<usize> {
    // Depth of parentheses opened by `var (` / `const (` blocks.
    let mut block_depth: Option<usize> = None;
    let mut depth = 0usize;
    for (i, token) in tokens.iter().enumerate() {
        match &token.tok {
            Tok::Punct('(') => {
                depth += 1;
                if block_depth.is_none() && i > 0 && is_decl_keyword(&tokens[i - 1].tok) {
                    block_depth = Some(depth);
                }
            }
            Tok::Punct(')') => {
                if block_depth == Some(depth) {
                    block_depth = None;
                }
                depth = depth.saturating_sub(1);
            }
            Tok::Ident(name) if name == symbol => {
                let declared = (i > 0 && is_decl_keyword(&tokens[i - 1].tok))
                    || (block_depth == Some(depth) && token.line_start);
                if declared {
                    if let Some(value) = after_type_and_equals(tokens, i + 1) {
                        return Some(value);
                    }
                }
            }
            _ => {}
        }
    }
    None
}

fn is_decl_keyword(tok: &Tok) -> bool {
    matches!(tok, Tok::Ident(k) if k == "var" || k == "const")
}

/// Skips an optional `[]byte` or `string` type, then requires `=`.
fn after_type_and_equals(tokens: &[Token], mut i: usize) -> Option<usize> {
    let tok = |i: usize| tokens.get(i).map(|t| &t.tok);
    if tok(i) == Some(&Tok::Punct('[')) && tok(i + 1) == Some(&Tok::Punct(']')) {
        i += 3;
    } else if tok(i) == Some(&Tok::Ident("string".to_string())) {
        i += 1;
    }
    (tok(i) == Some(&Tok::Punct('='))).then_some(i + 1)
}

struct Cursor<'a> {
    tokens: &'a [Token],
    pos: usize,
}

impl Cursor<'_> {
    fn peek(&self) -> Option<&Tok> {
        self.tokens.get(self.pos).map(|t| &t.tok)
    }

    fn next(&mut self) -> Option<&Tok> {
        let t = self.tokens.get(self.pos).map(|t| &t.tok);
        self.pos += 1;
        t
    }

    fn expect(&mut self, c: char) -> Result<(), String> {
        match self.next() {
            Some(Tok::Punct(p)) if *p == c => Ok(()),
            other => Err(format!("expected '{c}', found {other:?}")),
        }
    }

    fn value(&mut self) -> Result<Vec<u8>, String> {
        match self.peek() {
            Some(Tok::Punct('[')) => {
                self.expect('[')?;
                self.expect(']')?;
                match self.next() {
                    Some(Tok::Ident(t)) if t == "byte" || t == "uint8" => {}
                    other => return Err(format!("expected byte slice, found {other:?}")),
                }
                match self.peek() {
                    Some(Tok::Punct('{')) => self.byte_elements(),
                    Some(Tok::Punct('(')) => {
                        self.expect('(')?;
                        let bytes = self.string_chain()?;
                        self.expect(')')?;
                        Ok(bytes)
                    }
                    other => Err(format!("expected '{{' or '(', found {other:?}")),
                }
            }
            Some(Tok::Str(_)) => self.string_chain(),
            other => Err(format!("unsupported descriptor literal starting with {other:?}")),
        }
    }

    fn byte_elements(&mut self) -> Result<Vec<u8>, String> {
        self.expect('{')?;
        let mut out = Vec::new();
        loop {
            match self.next() {
                Some(Tok::Punct('}')) => return Ok(out),
                Some(Tok::Punct(',')) => {}
                Some(Tok::Number(raw)) => out.push(parse_byte(raw)?),
                other => return Err(format!("unexpected {other:?} in byte literal")),
            }
        }
    }

    fn string_chain(&mut self) -> Result<Vec<u8>, String> {
        let mut out = Vec::new();
        loop {
            match self.next() {
                Some(Tok::Str(s)) => out.extend_from_slice(s),
                other => return Err(format!("expected string literal, found {other:?}")),
            }
            if self.peek() == Some(&Tok::Punct('+')) {
                self.pos += 1;
            } else {
                return Ok(out);
            }
        }
    }
}

/// Parses a Go integer literal that must fit in a byte.
fn parse_byte(raw: &str) -> Result<u8, String> {
    let digits = raw.replace('_', "");
    let lower = digits.to_ascii_lowercase();
    let (body, radix) = if let Some(rest) = lower.strip_prefix("0x") {
        (rest.to_string(), 16)
    } else if let Some(rest) = lower.strip_prefix("0o") {
        (rest.to_string(), 8)
    } else if let Some(rest) = lower.strip_prefix("0b") {
        (rest.to_string(), 2)
    } else if lower.len() > 1 && lower.starts_with('0') {
        (lower[1..].to_string(), 8)
    } else {
        (lower, 10)
    };
    u8::from_str_radix(&body, radix).map_err(|e| format!("bad byte literal {raw:?}: {e}"))
}
