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

//! Schema compiler engine for Protocol Buffers sources.
//!
//! This crate turns `.proto` files into resolved descriptors while keeping
//! the syntax tree around, so that editor tooling can map positions to
//! declarations and back.
//!
//! # Pipeline
//!
//! - [`parse`]: tokenize and parse one file into a [`FileNode`] tree with
//!   node ids and UTF-16 source spans; errors are recovered per statement
//! - [`Compiler`]: load imports through a [`Resolver`], link in dependency
//!   order, report through a [`Reporter`], retain results between calls
//! - [`LinkedFile`]: tree + [`FileDescriptor`] + node/declaration maps
//!
//! # Well-known types
//!
//! [`wellknown::registry`] compiles the embedded `google/protobuf/*.proto`
//! schemas on first use.
//!
//! # Example
//!
//! ```no_run
//! use protols_compiler::{Compiler, CompilerOptions, FailFast, NoHooks, ResolveError, Resolver, SearchResult};
//! use std::sync::Arc;
//!
//! struct One;
//!
//! impl Resolver for One {
//!     fn find_file_by_path(&self, path: &str) -> Result<SearchResult, ResolveError> {
//!         match path {
//!             "a.proto" => Ok(SearchResult::Source("message A {}".into())),
//!             _ => Err(ResolveError::not_found(path)),
//!         }
//!     }
//! }
//!
//! let compiler = Compiler::new(
//!     Arc::new(One),
//!     Arc::new(FailFast),
//!     Arc::new(NoHooks),
//!     CompilerOptions::default(),
//! );
//! let result = compiler.compile(&["a.proto".to_string()]).unwrap();
//! assert!(result.linked("a.proto").is_some());
//! ```

pub mod ast;
mod compiler;
pub mod descriptor;
mod error;
pub mod format;
mod lex;
mod linker;
mod parser;
pub mod printer;
mod span;
pub mod wellknown;

pub use ast::{FileNode, NodeId, NodeRef};
pub use compiler::{
    CompileResult, Compiler, CompilerHooks, CompilerOptions, FailFast, NoHooks, Reporter,
    Resolver, SearchResult,
};
pub use descriptor::{
    Descriptor, DescriptorError, ElementId, ElementKind, FieldType, FileDescriptor, Label,
};
pub use error::{CompileError, ErrorKind, ErrorWithPos, ResolveError, Severity};
pub use lex::Comment;
pub use linker::{Declaration, LinkedFile, NodeDescriptor, OptionNamePart, OptionTarget};
pub use parser::{parse, ParsedFile};
pub use span::{SourcePos, SourceSpan};
