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

//! Source formatter.
//!
//! Re-emits a parsed file with two-space indentation and normalized
//! spacing. Top-level statements are grouped: `syntax`, `package`, imports
//! sorted by path, built-in options, custom options, then everything else
//! in source order. Comments stay attached to the statement they precede,
//! or to the line they trail.

use crate::ast::*;
use crate::lex::Comment;
use crate::linker::value_text;
use crate::parser::ParsedFile;
use crate::span::SourceSpan;

const INDENT: &str = "  ";

/// Formatted text of `parsed`, or `None` when the file has syntax errors.
pub fn format_file(parsed: &ParsedFile) -> Option<String> {
    if parsed.has_errors() {
        return None;
    }
    let mut f = Formatter {
        src: parsed.source(),
        comments: parsed.comments(),
        used: vec![false; parsed.comments().len()],
        out: String::new(),
        depth: 0,
    };
    f.file(parsed.ast());
    Some(f.out)
}

#[derive(Clone, Copy)]
enum Stmt<'a> {
    Syntax(&'a SyntaxNode),
    Package(&'a PackageNode),
    Import(&'a ImportNode),
    Option(&'a OptionNode),
    Message(&'a MessageNode),
    Enum(&'a EnumNode),
    Service(&'a ServiceNode),
    Extend(&'a ExtendNode),
    Field(&'a FieldNode),
    MapField(&'a MapFieldNode),
    Oneof(&'a OneofNode),
    Reserved(&'a ReservedNode),
    Extensions(&'a ExtensionRangeNode),
    EnumValue(&'a EnumValueNode),
    Rpc(&'a RpcNode),
}

impl<'a> Stmt<'a> {
    fn span(&self) -> SourceSpan {
        match self {
            Stmt::Syntax(n) => n.span,
            Stmt::Package(n) => n.span,
            Stmt::Import(n) => n.span,
            Stmt::Option(n) => n.span,
            Stmt::Message(n) => n.span,
            Stmt::Enum(n) => n.span,
            Stmt::Service(n) => n.span,
            Stmt::Extend(n) => n.span,
            Stmt::Field(n) => n.span,
            Stmt::MapField(n) => n.span,
            Stmt::Oneof(n) => n.span,
            Stmt::Reserved(n) => n.span,
            Stmt::Extensions(n) => n.span,
            Stmt::EnumValue(n) => n.span,
            Stmt::Rpc(n) => n.span,
        }
    }

    fn from_file(e: &'a FileElement) -> Option<Self> {
        Some(match e {
            FileElement::Package(n) => Stmt::Package(n),
            FileElement::Import(n) => Stmt::Import(n),
            FileElement::Option(n) => Stmt::Option(n),
            FileElement::Message(n) => Stmt::Message(n),
            FileElement::Enum(n) => Stmt::Enum(n),
            FileElement::Service(n) => Stmt::Service(n),
            FileElement::Extend(n) => Stmt::Extend(n),
            FileElement::Empty(_) => return None,
        })
    }

    fn from_message(e: &'a MessageElement) -> Option<Self> {
        Some(match e {
            MessageElement::Field(n) => Stmt::Field(n),
            MessageElement::MapField(n) => Stmt::MapField(n),
            MessageElement::Oneof(n) => Stmt::Oneof(n),
            MessageElement::Message(n) => Stmt::Message(n),
            MessageElement::Enum(n) => Stmt::Enum(n),
            MessageElement::Extend(n) => Stmt::Extend(n),
            MessageElement::Option(n) => Stmt::Option(n),
            MessageElement::Reserved(n) => Stmt::Reserved(n),
            MessageElement::Extensions(n) => Stmt::Extensions(n),
            MessageElement::Empty(_) => return None,
        })
    }

    fn from_enum(e: &'a EnumElement) -> Option<Self> {
        Some(match e {
            EnumElement::Value(n) => Stmt::EnumValue(n),
            EnumElement::Option(n) => Stmt::Option(n),
            EnumElement::Reserved(n) => Stmt::Reserved(n),
            EnumElement::Empty(_) => return None,
        })
    }

    fn from_service(e: &'a ServiceElement) -> Option<Self> {
        Some(match e {
            ServiceElement::Rpc(n) => Stmt::Rpc(n),
            ServiceElement::Option(n) => Stmt::Option(n),
            ServiceElement::Empty(_) => return None,
        })
    }

    fn from_oneof(e: &'a OneofElement) -> Option<Self> {
        Some(match e {
            OneofElement::Field(n) => Stmt::Field(n),
            OneofElement::Option(n) => Stmt::Option(n),
            OneofElement::Empty(_) => return None,
        })
    }

    /// Top-level ordering group.
    fn group(&self) -> u8 {
        match self {
            Stmt::Syntax(_) => 0,
            Stmt::Package(_) => 1,
            Stmt::Import(_) => 2,
            Stmt::Option(o) if !o.name.parts.iter().any(FieldReferenceNode::is_extension) => 3,
            Stmt::Option(_) => 4,
            _ => 5,
        }
    }
}

struct TopItem<'a> {
    stmt: Stmt<'a>,
    leading: Vec<Comment>,
    trailing: Option<Comment>,
}

struct Formatter<'a> {
    src: &'a str,
    comments: &'a [Comment],
    used: Vec<bool>,
    out: String,
    depth: usize,
}

impl<'a> Formatter<'a> {
    fn indent(&mut self) {
        for _ in 0..self.depth {
            self.out.push_str(INDENT);
        }
    }

    /// Unused comments starting in `[from, to)`, marked as used.
    fn comments_between(&mut self, from: usize, to: usize) -> Vec<Comment> {
        let mut taken = Vec::new();
        for (i, c) in self.comments.iter().enumerate() {
            let start = c.span.start().offset();
            if !self.used[i] && start >= from && start < to {
                self.used[i] = true;
                taken.push(c.clone());
            }
        }
        taken
    }

    /// A comment on the same line as the end of `span`, with nothing but
    /// whitespace in between.
    fn trailing_comment(&mut self, span: SourceSpan) -> Option<Comment> {
        let end = span.end();
        for (i, c) in self.comments.iter().enumerate() {
            let start = c.span.start();
            if self.used[i] || start.offset() < end.offset() || start.line() != end.line() {
                continue;
            }
            let between = &self.src[end.offset()..start.offset()];
            if between.trim().is_empty() {
                self.used[i] = true;
                return Some(c.clone());
            }
        }
        None
    }

    fn blank_line_between(&self, from: usize, to: usize) -> bool {
        self.src
            .get(from..to)
            .is_some_and(|gap| gap.matches('\n').count() >= 2)
    }

    fn comment_line(&mut self, c: &Comment) {
        self.indent();
        self.out.push_str(c.text.trim_end());
        self.out.push('\n');
    }

    fn end_line(&mut self, trailing: Option<Comment>) {
        if let Some(c) = trailing {
            self.out.push(' ');
            self.out.push_str(c.text.trim_end());
        }
        self.out.push('\n');
    }

    fn file(&mut self, ast: &'a FileNode) {
        let mut stmts: Vec<Stmt<'a>> = Vec::new();
        if let Some(s) = &ast.syntax {
            stmts.push(Stmt::Syntax(s));
        }
        stmts.extend(ast.decls.iter().filter_map(Stmt::from_file));

        let mut items = Vec::with_capacity(stmts.len());
        let mut prev_end = 0;
        for stmt in stmts {
            let span = stmt.span();
            let leading = self.comments_between(prev_end, span.start().offset());
            let trailing = self.trailing_comment(span);
            prev_end = trailing
                .as_ref()
                .map_or(span.end().offset(), |c| c.span.end().offset());
            items.push(TopItem {
                stmt,
                leading,
                trailing,
            });
        }

        items.sort_by(|a, b| {
            a.stmt.group().cmp(&b.stmt.group()).then_with(|| match (a.stmt, b.stmt) {
                (Stmt::Import(x), Stmt::Import(y)) => x.name.value.cmp(&y.name.value),
                _ => std::cmp::Ordering::Equal,
            })
        });

        let mut prev_group = None;
        for item in items {
            let group = item.stmt.group();
            if prev_group.is_some_and(|g| g != group || group == 5) {
                self.out.push('\n');
            }
            prev_group = Some(group);
            for c in &item.leading {
                self.comment_line(c);
            }
            self.stmt(item.stmt);
            self.end_line(item.trailing);
        }

        let rest = self.comments_between(prev_end, self.src.len());
        if !rest.is_empty() && !self.out.is_empty() {
            self.out.push('\n');
        }
        for c in &rest {
            self.comment_line(c);
        }
    }

    /// Writes the statements of a `{ ... }` body, then its closing brace.
    fn body(&mut self, stmts: Vec<Stmt<'a>>, open: &RuneNode, close: Option<&RuneNode>) {
        let open_end = open.span.end().offset();
        let close_start = close.map_or(self.src.len(), |c| c.span.start().offset());
        let has_comments = self
            .comments
            .iter()
            .enumerate()
            .any(|(i, c)| !self.used[i] && (open_end..close_start).contains(&c.span.start().offset()));
        if stmts.is_empty() && !has_comments {
            self.out.push_str("{}");
            return;
        }

        self.out.push_str("{\n");
        self.depth += 1;
        let mut prev_end = open_end;
        for (i, stmt) in stmts.into_iter().enumerate() {
            let span = stmt.span();
            let leading = self.comments_between(prev_end, span.start().offset());
            let first = leading
                .first()
                .map_or(span.start().offset(), |c| c.span.start().offset());
            if i > 0 && self.blank_line_between(prev_end, first) {
                self.out.push('\n');
            }
            for c in &leading {
                self.comment_line(c);
            }
            self.stmt(stmt);
            let trailing = self.trailing_comment(span);
            prev_end = trailing
                .as_ref()
                .map_or(span.end().offset(), |c| c.span.end().offset());
            self.end_line(trailing);
        }
        for c in self.comments_between(prev_end, close_start) {
            self.comment_line(&c);
        }
        self.depth -= 1;
        self.indent();
        self.out.push('}');
    }

    /// Writes one statement without its final newline.
    fn stmt(&mut self, stmt: Stmt<'a>) {
        self.indent();
        match stmt {
            Stmt::Syntax(s) => self.out.push_str(&format!("syntax = {};", s.value.raw)),
            Stmt::Package(p) => self.out.push_str(&format!("package {};", p.name.value())),
            Stmt::Import(i) => {
                let modifier = i
                    .modifier
                    .as_ref()
                    .map(|m| format!("{} ", m.value))
                    .unwrap_or_default();
                self.out
                    .push_str(&format!("import {modifier}{};", i.name.raw));
            }
            Stmt::Option(o) => self.out.push_str(&format!("option {};", option_text(o))),
            Stmt::Message(m) => {
                self.out.push_str(&format!("message {} ", m.name.value));
                let stmts = m.decls.iter().filter_map(Stmt::from_message).collect();
                self.body(stmts, &m.open, m.close.as_ref());
            }
            Stmt::Enum(e) => {
                self.out.push_str(&format!("enum {} ", e.name.value));
                let stmts = e.decls.iter().filter_map(Stmt::from_enum).collect();
                self.body(stmts, &e.open, e.close.as_ref());
            }
            Stmt::Service(s) => {
                self.out.push_str(&format!("service {} ", s.name.value));
                let stmts = s.decls.iter().filter_map(Stmt::from_service).collect();
                self.body(stmts, &s.open, s.close.as_ref());
            }
            Stmt::Oneof(o) => {
                self.out.push_str(&format!("oneof {} ", o.name.value));
                let stmts = o.decls.iter().filter_map(Stmt::from_oneof).collect();
                self.body(stmts, &o.open, o.close.as_ref());
            }
            Stmt::Extend(x) => {
                self.out.push_str(&format!("extend {} ", x.extendee.value()));
                let stmts = x.fields.iter().map(Stmt::Field).collect();
                self.body(stmts, &x.open, x.close.as_ref());
            }
            Stmt::Field(f) => {
                let label = f
                    .label
                    .as_ref()
                    .map(|l| format!("{} ", l.value))
                    .unwrap_or_default();
                self.out.push_str(&format!(
                    "{label}{} {} = {}{};",
                    f.field_type.value(),
                    f.name.value,
                    f.tag.raw,
                    compact(&f.options)
                ));
            }
            Stmt::MapField(f) => self.out.push_str(&format!(
                "map<{}, {}> {} = {}{};",
                f.map_type.key_type.value,
                f.map_type.value_type.value(),
                f.name.value,
                f.tag.raw,
                compact(&f.options)
            )),
            Stmt::EnumValue(v) => self.out.push_str(&format!(
                "{} = {}{}{};",
                v.name.value,
                if v.minus.is_some() { "-" } else { "" },
                v.number.raw,
                compact(&v.options)
            )),
            Stmt::Reserved(r) => {
                let elements: Vec<String> = r
                    .elements
                    .iter()
                    .map(|e| match e {
                        ReservedElement::Range(range) => range_text(range),
                        ReservedElement::Name(s) => s.raw.clone(),
                    })
                    .collect();
                self.out
                    .push_str(&format!("reserved {};", elements.join(", ")));
            }
            Stmt::Extensions(x) => {
                let ranges: Vec<String> = x.ranges.iter().map(range_text).collect();
                self.out.push_str(&format!(
                    "extensions {}{};",
                    ranges.join(", "),
                    compact(&x.options)
                ));
            }
            Stmt::Rpc(r) => {
                self.out.push_str(&format!(
                    "rpc {}({}) returns ({})",
                    r.name.value,
                    rpc_type(&r.input),
                    rpc_type(&r.output)
                ));
                match &r.body {
                    RpcBody::Semicolon(_) => self.out.push(';'),
                    RpcBody::Block(b) => {
                        self.out.push(' ');
                        let stmts = b.options.iter().map(Stmt::Option).collect();
                        self.body(stmts, &b.open, b.close.as_ref());
                    }
                }
            }
        }
    }
}

fn option_text(o: &OptionNode) -> String {
    format!("{} = {}", o.name.text(), value_text(&o.value))
}

fn compact(options: &Option<CompactOptionsNode>) -> String {
    match options {
        Some(c) if !c.options.is_empty() => {
            let entries: Vec<String> = c.options.iter().map(option_text).collect();
            format!(" [{}]", entries.join(", "))
        }
        _ => String::new(),
    }
}

fn range_text(r: &RangeNode) -> String {
    let mut text = format!(
        "{}{}",
        if r.minus.is_some() { "-" } else { "" },
        r.start.raw
    );
    if let Some(end) = &r.end {
        text.push_str(" to ");
        if r.end_minus.is_some() {
            text.push('-');
        }
        match end {
            RangeEnd::Number(n) => text.push_str(&n.raw),
            RangeEnd::Max(_) => text.push_str("max"),
        }
    }
    text
}

fn rpc_type(t: &RpcTypeNode) -> String {
    match &t.stream {
        Some(_) => format!("stream {}", t.message_type.value()),
        None => t.message_type.value(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    fn format(src: &str) -> String {
        let (parsed, errors) = parse("f.proto", src);
        assert!(errors.is_empty(), "{errors:?}");
        format_file(&parsed).unwrap()
    }

    #[test]
    fn test_orders_top_level_statements() {
        let src = r#"message A {}
import "z.proto";
option (my.opt) = 1;
package p;
import "a.proto";
option go_package = "x/y";
syntax = "proto3";
"#;
        assert_eq!(
            format(src),
            r#"syntax = "proto3";

package p;

import "a.proto";
import "z.proto";

option go_package = "x/y";

option (my.opt) = 1;

message A {}
"#
        );
    }

    #[test]
    fn test_normalizes_spacing_and_keeps_comments() {
        let src = "syntax=\"proto3\";\n// Leading.\nmessage  A{\nint32   x=1 ;  // trailing\n\n  map<string,A> m = 2 [deprecated=true];\n  /* tail */\n}\n";
        assert_eq!(
            format(src),
            "syntax = \"proto3\";\n\n// Leading.\nmessage A {\n  int32 x = 1; // trailing\n\n  map<string, A> m = 2 [deprecated = true];\n  /* tail */\n}\n"
        );
    }

    #[test]
    fn test_service_and_enum() {
        let src = "service S { rpc Get(stream A) returns (B) { option deprecated = true; } }\nenum E { reserved 2 to 5, \"OLD\"; E_UNSPECIFIED = 0; E_NEG = -1; }\n";
        assert_eq!(
            format(src),
            "service S {\n  rpc Get(stream A) returns (B) {\n    option deprecated = true;\n  }\n}\n\nenum E {\n  reserved 2 to 5, \"OLD\";\n  E_UNSPECIFIED = 0;\n  E_NEG = -1;\n}\n"
        );
    }

    #[test]
    fn test_syntax_errors_are_not_formatted() {
        let (parsed, errors) = parse("f.proto", "message {");
        assert!(!errors.is_empty());
        assert!(format_file(&parsed).is_none());
    }
}
