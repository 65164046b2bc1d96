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

//! Conversions between compiler spans and LSP positions.
//!
//! Compiler spans are 1-based; LSP positions are 0-based. Both count
//! columns in UTF-16 code units, so only the offset differs.

use crate::constants::LINE_NUMBER_OFFSET;
use protols_compiler::{SourcePos, SourceSpan};
use tower_lsp::lsp_types::{Position, Range};

/// LSP position of a compiler position.
pub fn pos_to_position(pos: SourcePos) -> Position {
    Position::new(
        pos.line().saturating_sub(LINE_NUMBER_OFFSET),
        pos.column().saturating_sub(LINE_NUMBER_OFFSET),
    )
}

/// LSP range of a compiler span.
pub fn span_to_range(span: SourceSpan) -> Range {
    Range::new(pos_to_position(span.start()), pos_to_position(span.end()))
}

/// 1-based `(line, column)` of an LSP position, for span containment tests.
pub fn position_to_cursor(position: Position) -> (u32, u32) {
    (
        position.line + LINE_NUMBER_OFFSET,
        position.character + LINE_NUMBER_OFFSET,
    )
}

/// Position just past the last character of `text`.
pub fn end_position(text: &str) -> Position {
    let line = text.matches('\n').count() as u32;
    let last = text.rsplit('\n').next().unwrap_or("");
    let character = last.encode_utf16().count() as u32;
    Position::new(line, character)
}

/// Whether two ranges overlap or touch.
pub fn ranges_intersect(a: &Range, b: &Range) -> bool {
    a.start <= b.end && b.start <= a.end
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_span_to_range() {
        let span = SourceSpan::new(SourcePos::new(3, 5, 40), SourcePos::new(3, 10, 45));
        assert_eq!(
            span_to_range(span),
            Range::new(Position::new(2, 4), Position::new(2, 9))
        );
    }

    #[test]
    fn test_cursor_round_trip() {
        let (line, col) = position_to_cursor(Position::new(0, 0));
        assert_eq!((line, col), (1, 1));
        assert_eq!(
            pos_to_position(SourcePos::new(line, col, 0)),
            Position::new(0, 0)
        );
    }

    #[test]
    fn test_end_position() {
        assert_eq!(end_position(""), Position::new(0, 0));
        assert_eq!(end_position("abc"), Position::new(0, 3));
        assert_eq!(end_position("abc\n"), Position::new(1, 0));
        assert_eq!(end_position("a\n😀"), Position::new(1, 2));
    }

    #[test]
    fn test_ranges_intersect() {
        let a = Range::new(Position::new(1, 0), Position::new(3, 0));
        let b = Range::new(Position::new(3, 0), Position::new(4, 0));
        let c = Range::new(Position::new(5, 0), Position::new(6, 0));
        assert!(ranges_intersect(&a, &b));
        assert!(!ranges_intersect(&a, &c));
    }
}
