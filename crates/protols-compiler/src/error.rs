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

//! Error types for parsing, linking and import resolution.

use crate::span::SourceSpan;
use std::fmt;
use thiserror::Error;

/// Severity of a reported problem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Severity {
    Error,
    Warning,
}

/// The kind of problem found in a source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Lexical or grammatical violation.
    Syntax,
    /// A type, extendee or option name that does not resolve.
    UnresolvedReference,
    /// A name that resolves, but not to a message or enum.
    NotAType,
    /// Two declarations share a fully-qualified name.
    DuplicateSymbol,
    /// Two fields of one message share a number.
    DuplicateNumber,
    /// An option that does not exist on the options message.
    UnknownOption,
    /// An import that no resolver could satisfy.
    ImportNotFound,
    /// A file that transitively imports itself.
    ImportCycle,
    /// An import whose symbols are never referenced.
    UnusedImport,
}

impl ErrorKind {
    pub fn severity(&self) -> Severity {
        match self {
            Self::UnusedImport => Severity::Warning,
            _ => Severity::Error,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Syntax => write!(f, "syntax error"),
            Self::UnresolvedReference => write!(f, "unresolved reference"),
            Self::NotAType => write!(f, "not a type"),
            Self::DuplicateSymbol => write!(f, "duplicate symbol"),
            Self::DuplicateNumber => write!(f, "duplicate field number"),
            Self::UnknownOption => write!(f, "unknown option"),
            Self::ImportNotFound => write!(f, "import not found"),
            Self::ImportCycle => write!(f, "import cycle"),
            Self::UnusedImport => write!(f, "unused import"),
        }
    }
}

/// A problem attributed to a span of one file.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{filename}:{}: {message}", span.start())]
pub struct ErrorWithPos {
    pub kind: ErrorKind,
    pub message: String,
    /// Canonical path of the file the problem belongs to.
    pub filename: String,
    pub span: SourceSpan,
}

impl ErrorWithPos {
    pub fn new(
        kind: ErrorKind,
        message: impl Into<String>,
        filename: impl Into<String>,
        span: SourceSpan,
    ) -> Self {
        Self {
            kind,
            message: message.into(),
            filename: filename.into(),
            span,
        }
    }

    pub fn syntax(message: impl Into<String>, filename: &str, span: SourceSpan) -> Self {
        Self::new(ErrorKind::Syntax, message, filename, span)
    }

    pub fn unresolved(name: &str, filename: &str, span: SourceSpan) -> Self {
        Self::new(
            ErrorKind::UnresolvedReference,
            format!("{name:?} is not defined"),
            filename,
            span,
        )
    }

    pub fn unused_import(path: &str, filename: &str, span: SourceSpan) -> Self {
        Self::new(
            ErrorKind::UnusedImport,
            format!("import {path:?} not used"),
            filename,
            span,
        )
    }

    pub fn import_not_found(path: &str, reason: &str, filename: &str, span: SourceSpan) -> Self {
        Self::new(
            ErrorKind::ImportNotFound,
            format!("could not resolve import {path:?}: {reason}"),
            filename,
            span,
        )
    }
}

/// Fatal failure of a compile batch.
#[derive(Debug, Error)]
pub enum CompileError {
    /// The reporter asked the compiler to stop.
    #[error("compilation aborted: {0}")]
    Aborted(ErrorWithPos),
}

/// Failure to satisfy an import through a [`Resolver`](crate::Resolver).
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("file not found: {path}")]
    NotFound { path: String },

    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{path}: {reason}")]
    Unavailable { path: String, reason: String },
}

impl ResolveError {
    pub fn not_found(path: impl Into<String>) -> Self {
        Self::NotFound { path: path.into() }
    }
}
