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

//! Source position and span tracking for schema sources.
//!
//! Lines and columns are 1-indexed. Columns count UTF-16 code units so that
//! editor positions can be compared against spans without re-scanning the
//! line. Every position also carries its byte offset into the source text.
//!
//! # Examples
//!
//! ```
//! use protols_compiler::{SourcePos, SourceSpan};
//!
//! let start = SourcePos::new(3, 5, 40);
//! let end = SourcePos::new(3, 10, 45);
//! let span = SourceSpan::new(start, end);
//! assert!(span.is_single_line());
//! assert!(span.contains_cursor(3, 9));
//! assert!(!span.contains_cursor(3, 10));
//! ```

use std::fmt;

/// A position in source code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct SourcePos {
    line: u32,
    column: u32,
    offset: usize,
}

impl SourcePos {
    /// Creates a new source position.
    #[inline]
    pub const fn new(line: u32, column: u32, offset: usize) -> Self {
        Self {
            line,
            column,
            offset,
        }
    }

    /// Position at the start of a file (line 1, column 1).
    #[inline]
    pub const fn start() -> Self {
        Self::new(1, 1, 0)
    }

    /// 1-based line number.
    #[inline]
    pub const fn line(&self) -> u32 {
        self.line
    }

    /// 1-based column, in UTF-16 code units.
    #[inline]
    pub const fn column(&self) -> u32 {
        self.column
    }

    /// Byte offset into the source text.
    #[inline]
    pub const fn offset(&self) -> usize {
        self.offset
    }
}

impl fmt::Display for SourcePos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// A half-open span `[start, end)` in source code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SourceSpan {
    start: SourcePos,
    end: SourcePos,
}

impl SourceSpan {
    /// Creates a span from start (inclusive) to end (exclusive).
    #[inline]
    pub const fn new(start: SourcePos, end: SourcePos) -> Self {
        Self { start, end }
    }

    /// A zero-width span at a single position.
    #[inline]
    pub const fn point(pos: SourcePos) -> Self {
        Self::new(pos, pos)
    }

    /// Start position (inclusive).
    #[inline]
    pub const fn start(&self) -> SourcePos {
        self.start
    }

    /// End position (exclusive).
    #[inline]
    pub const fn end(&self) -> SourcePos {
        self.end
    }

    /// Smallest span covering both `self` and `other`.
    pub fn join(&self, other: SourceSpan) -> SourceSpan {
        let start = if other.start.offset < self.start.offset {
            other.start
        } else {
            self.start
        };
        let end = if other.end.offset > self.end.offset {
            other.end
        } else {
            self.end
        };
        SourceSpan::new(start, end)
    }

    /// Returns true if the span starts and ends on the same line.
    #[inline]
    pub const fn is_single_line(&self) -> bool {
        self.start.line == self.end.line
    }

    /// Returns true if the byte offset falls within the span.
    #[inline]
    pub const fn contains_offset(&self, offset: usize) -> bool {
        offset >= self.start.offset && offset < self.end.offset
    }

    /// Cursor containment for position queries.
    ///
    /// A cursor is inside when its line is within the span's lines and its
    /// column is within `[start.column, end.column)`. A cursor sitting exactly
    /// on the end column belongs to whatever follows.
    #[inline]
    pub const fn contains_cursor(&self, line: u32, column: u32) -> bool {
        self.start.line <= line
            && line <= self.end.line
            && self.start.column <= column
            && column < self.end.column
    }

    /// Returns true if the cursor line lies within the span's lines.
    #[inline]
    pub const fn covers_line(&self, line: u32) -> bool {
        self.start.line <= line && line <= self.end.line
    }
}

impl fmt::Display for SourceSpan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}
