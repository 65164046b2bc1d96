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

//! Renders descriptors back to schema text.
//!
//! Containers are printed one level deep: a message shows its fields,
//! oneofs and options, with nested declarations collapsed to `{ ... }`.

use crate::descriptor::{Descriptor, ElementKind, FieldInfo, FieldType, OptionEntry};
use std::fmt::Write;

const INDENT: &str = "  ";

/// Schema text for `d`.
pub fn print_descriptor(d: &Descriptor) -> String {
    let mut out = String::new();
    match d.kind() {
        ElementKind::File => print_file(d, &mut out),
        ElementKind::Message => print_message(d, &mut out),
        ElementKind::Enum => print_enum(d, "", &mut out),
        ElementKind::Service => print_service(d, &mut out),
        ElementKind::Oneof => print_oneof(d, "", &mut out),
        ElementKind::Field => out.push_str(&field_line(d)),
        ElementKind::Extension => {
            let extendee = d
                .field()
                .and_then(|f| f.extendee.as_deref())
                .map(|e| relative(d, e))
                .unwrap_or_default();
            let _ = write!(out, "extend {extendee} {{\n{INDENT}{}\n}}", field_line(d));
        }
        ElementKind::EnumValue => out.push_str(&enum_value_line(d)),
        ElementKind::Method => out.push_str(&method_line(d)),
    }
    out
}

/// `name` relative to the package of the file `d` belongs to.
fn relative(d: &Descriptor, name: &str) -> String {
    let package = d.file().package();
    if package.is_empty() {
        return name.to_string();
    }
    name.strip_prefix(package)
        .and_then(|rest| rest.strip_prefix('.'))
        .unwrap_or(name)
        .to_string()
}

fn compact_options(options: &[OptionEntry]) -> String {
    if options.is_empty() {
        return String::new();
    }
    let entries: Vec<String> = options
        .iter()
        .map(|o| format!("{} = {}", o.name, o.value))
        .collect();
    format!(" [{}]", entries.join(", "))
}

fn option_lines(options: &[OptionEntry], indent: &str, out: &mut String) {
    for o in options {
        let _ = writeln!(out, "{indent}option {} = {};", o.name, o.value);
    }
}

fn type_text(d: &Descriptor, f: &FieldInfo) -> String {
    if let Some(name) = f.field_type.scalar_name() {
        return name.to_string();
    }
    let Some(type_name) = f.type_name.as_deref() else {
        return "?".to_string();
    };
    if f.field_type == FieldType::Message {
        if let Some(entry) = d.file().find_descriptor(type_name).filter(|e| e.is_map_entry()) {
            let part = |n: i32| {
                entry
                    .field_by_number(n)
                    .and_then(|k| k.field().map(|kf| type_text(&k, kf)))
                    .unwrap_or_else(|| "?".to_string())
            };
            return format!("map<{}, {}>", part(1), part(2));
        }
    }
    relative(d, type_name)
}

fn field_line(d: &Descriptor) -> String {
    let Some(f) = d.field() else {
        return d.name().to_string();
    };
    let ty = type_text(d, f);
    let label = match f.label {
        Some(l) if !ty.starts_with("map<") => format!("{} ", l.keyword()),
        _ => String::new(),
    };
    format!(
        "{label}{ty} {} = {}{};",
        d.name(),
        f.number,
        compact_options(&d.element().options)
    )
}

fn enum_value_line(d: &Descriptor) -> String {
    let number = match d.element().detail {
        crate::descriptor::ElementDetail::EnumValue { number } => number,
        _ => 0,
    };
    format!(
        "{} = {number}{};",
        d.name(),
        compact_options(&d.element().options)
    )
}

fn method_line(d: &Descriptor) -> String {
    let Some(m) = d.method() else {
        return format!("rpc {}", d.name());
    };
    let stream = |s: bool| if s { "stream " } else { "" };
    let mut line = format!(
        "rpc {}({}{}) returns ({}{})",
        d.name(),
        stream(m.client_streaming),
        relative(d, &m.input_type),
        stream(m.server_streaming),
        relative(d, &m.output_type),
    );
    let options = &d.element().options;
    if options.is_empty() {
        line.push(';');
    } else {
        line.push_str(" {\n");
        option_lines(options, &format!("{INDENT}{INDENT}"), &mut line);
        line.push_str(INDENT);
        line.push('}');
    }
    line
}

fn print_file(d: &Descriptor, out: &mut String) {
    let file = d.file();
    let _ = writeln!(out, "syntax = \"{}\";", file.syntax());
    if !file.package().is_empty() {
        let _ = writeln!(out, "package {};", file.package());
    }
    for (i, dep) in file.dependencies().iter().enumerate() {
        let public = if file.public_dependencies().contains(&i) {
            "public "
        } else {
            ""
        };
        let _ = writeln!(out, "import {public}\"{dep}\";");
    }
    option_lines(&d.element().options, "", out);
    let out_len = out.trim_end().len();
    out.truncate(out_len);
}

fn print_message(d: &Descriptor, out: &mut String) {
    let _ = writeln!(out, "message {} {{", d.name());
    option_lines(&d.element().options, INDENT, out);
    let mut printed_oneofs = Vec::new();
    for child in d.children() {
        match child.kind() {
            ElementKind::Field => {
                if let Some(oneof) = child.field().and_then(|f| f.oneof) {
                    if !printed_oneofs.contains(&oneof) {
                        printed_oneofs.push(oneof);
                        print_oneof(&d.file().descriptor(oneof), INDENT, out);
                    }
                    continue;
                }
                let _ = writeln!(out, "{INDENT}{}", field_line(&child));
            }
            ElementKind::Message if child.is_map_entry() => {}
            ElementKind::Message => {
                let _ = writeln!(out, "{INDENT}message {} {{ ... }}", child.name());
            }
            ElementKind::Enum => {
                let _ = writeln!(out, "{INDENT}enum {} {{ ... }}", child.name());
            }
            ElementKind::Extension => {
                let _ = writeln!(out, "{INDENT}extend ... {{ {} }}", field_line(&child));
            }
            _ => {}
        }
    }
    out.push('}');
}

fn print_oneof(d: &Descriptor, indent: &str, out: &mut String) {
    let _ = writeln!(out, "{indent}oneof {} {{", d.name());
    if let Some(message) = d.parent() {
        for child in message.children() {
            if child.field().and_then(|f| f.oneof) == Some(d.id()) {
                let _ = writeln!(out, "{indent}{INDENT}{}", field_line(&child));
            }
        }
    }
    let _ = write!(out, "{indent}}}");
    if !indent.is_empty() {
        out.push('\n');
    }
}

fn print_enum(d: &Descriptor, indent: &str, out: &mut String) {
    let _ = writeln!(out, "{indent}enum {} {{", d.name());
    option_lines(&d.element().options, &format!("{indent}{INDENT}"), out);
    for value in d.children() {
        let _ = writeln!(out, "{indent}{INDENT}{}", enum_value_line(&value));
    }
    let _ = write!(out, "{indent}}}");
}

fn print_service(d: &Descriptor, out: &mut String) {
    let _ = writeln!(out, "service {} {{", d.name());
    option_lines(&d.element().options, INDENT, out);
    for method in d.children() {
        let _ = writeln!(out, "{INDENT}{}", method_line(&method));
    }
    out.push('}');
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::linker::link;
    use crate::parser::parse;
    use std::sync::Arc;

    fn descriptor(src: &str, name: &str) -> Descriptor {
        let (parsed, errors) = parse("p.proto", src);
        assert!(errors.is_empty(), "{errors:?}");
        let outcome = link(Arc::new(parsed), Vec::new(), None);
        assert!(outcome.errors.is_empty(), "{:?}", outcome.errors);
        let linked = outcome.linked.unwrap();
        linked.descriptor().find_descriptor(name).unwrap()
    }

    const SRC: &str = r#"
syntax = "proto3";
package acme;
message Req {
  string id = 1 [deprecated = true];
  map<string, Req> children = 2;
  oneof choice {
    int32 a = 3;
    Color c = 4;
  }
  message Nested {}
}
enum Color { COLOR_UNSPECIFIED = 0; COLOR_RED = 1; }
service Svc {
  rpc Get(Req) returns (stream Req);
}
"#;

    #[test]
    fn test_print_message() {
        let text = print_descriptor(&descriptor(SRC, "acme.Req"));
        assert_eq!(
            text,
            "message Req {\n  string id = 1 [deprecated = true];\n  map<string, Req> children = 2;\n  oneof choice {\n    int32 a = 3;\n    Color c = 4;\n  }\n  message Nested { ... }\n}"
        );
    }

    #[test]
    fn test_print_enum_and_method() {
        assert_eq!(
            print_descriptor(&descriptor(SRC, "acme.Color")),
            "enum Color {\n  COLOR_UNSPECIFIED = 0;\n  COLOR_RED = 1;\n}"
        );
        assert_eq!(
            print_descriptor(&descriptor(SRC, "acme.Svc.Get")),
            "rpc Get(Req) returns (stream Req);"
        );
        assert_eq!(
            print_descriptor(&descriptor(SRC, "acme.COLOR_RED")),
            "COLOR_RED = 1;"
        );
    }

    #[test]
    fn test_print_file() {
        let d = descriptor(SRC, "acme.Req");
        assert_eq!(
            print_descriptor(&d.file().root()),
            "syntax = \"proto3\";\npackage acme;"
        );
    }
}
