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

//! Protocol Buffers Language Server Protocol (LSP) implementation.
//!
//! Schemas are addressed the way Go code imports them: each file's
//! canonical path is its `go_package` import path joined with its file
//! name. Imports that are not in the workspace are recovered from the Go
//! module graph, either as schema sources shipped with a module or as
//! descriptors embedded in generated `.pb.go` files.
//!
//! # Features
//!
//! - **Diagnostics**: pull-model reports with result ids
//! - **Hover**: the declaration of whatever is under the cursor
//! - **Go to Definition**: across workspace files and imports
//! - **Document Links**: import paths link to the imported file
//! - **Document Symbols**: services, messages, enums and extends
//! - **Semantic Highlighting**: full and ranged
//! - **Inlay Hints**: option value types
//! - **Document Formatting**: canonical layout, one whole-document edit
//!
//! # Architecture
//!
//! - [`cache`]: per-workspace state and the compile loop
//! - [`index`]: URI to canonical path mapping
//! - [`overlay`]: unsaved editor content
//! - [`resolver`]: import lookup chain handed to the compiler
//! - [`synthesis`]: descriptors recovered from generated Go code
//! - [`diagnostics`]: per-file diagnostic lists and result ids
//! - [`position`]: cursor position to descriptor
//! - [`semantic`], [`symbols`], [`hints`]: syntax-driven views
//! - `backend`: the tower-lsp server

mod backend;
pub mod cache;
pub mod config;
pub mod constants;
pub mod diagnostics;
pub mod error;
pub mod hints;
pub mod index;
pub mod overlay;
pub mod position;
pub mod resolver;
pub mod semantic;
pub mod symbols;
pub mod synthesis;
pub mod utils;

#[cfg(test)]
mod tests;

pub use backend::ProtolsLanguageServer;
pub use cache::{Cache, CacheStatistics, FileResult};
pub use config::ServerConfig;
pub use error::CacheError;

/// LSP server version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
