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

//! Error types of the cache and its components.
//!
//! Schema problems (syntax, linking, missing imports) are not errors here:
//! they become diagnostics. These types cover lookups that find nothing
//! and callers that break a contract; both propagate to the protocol
//! handler.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tower_lsp::lsp_types::Url;

/// Canonical path / URI index lookups.
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("no file indexed for URI {0}")]
    UnknownUri(Url),

    #[error("no file indexed for path {0:?}")]
    UnknownPath(String),

    #[error("{uri} cannot be indexed: {reason}")]
    NotIndexable { uri: Url, reason: String },
}

/// Overlay mutations.
#[derive(Debug, Error)]
pub enum OverlayError {
    #[error("overlay entry for {0:?} already exists")]
    AlreadyExists(String),

    #[error("no content changes provided for {0:?}")]
    NoChanges(String),

    #[error("invalid edit range for {path:?}: {reason}")]
    InvalidRange { path: String, reason: String },

    #[error("failed to read base content of {path:?}: {source}")]
    Base {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Recovering a descriptor from generated code.
#[derive(Debug, Error)]
pub enum SynthesisError {
    #[error("{path:?} is reserved for the well-known registry")]
    Reserved { path: String },

    #[error("invalid import path {path:?}: {reason}")]
    InvalidImportPath { path: String, reason: String },

    #[error("no module directory found for {0:?}")]
    ModuleNotFound(String),

    #[error("module lookup for {package:?} timed out after {after:?}")]
    Timeout { package: String, after: Duration },

    #[error("module lookup for {package:?} failed: {reason}")]
    Command { package: String, reason: String },

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("no embedded descriptor found in {0}")]
    DescriptorNotFound(PathBuf),

    #[error("malformed descriptor literal in {path}: {reason}")]
    Literal { path: PathBuf, reason: String },

    #[error("failed to decompress descriptor: {0}")]
    Gzip(#[source] std::io::Error),

    #[error("failed to decode descriptor: {0}")]
    Decode(#[from] prost::DecodeError),
}

/// Position to descriptor resolution.
#[derive(Debug, Error, PartialEq)]
pub enum PositionError {
    #[error("no node found at {line}:{character}")]
    NoNode { line: u32, character: u32 },

    #[error("no identifiable node found at {line}:{character}")]
    NoIdentifiableNode { line: u32, character: u32 },

    #[error("could not find file {0:?}")]
    FileNotFound(String),

    #[error("failed to find descriptor for {0:?}")]
    Unresolved(String),
}

/// Errors surfaced by [`Cache`](crate::cache::Cache) operations.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error(transparent)]
    Index(#[from] IndexError),

    #[error(transparent)]
    Overlay(#[from] OverlayError),

    #[error(transparent)]
    Position(#[from] PositionError),

    #[error("no compiled result for {0:?}")]
    NoResult(String),

    #[error("{path:?} is not linked; semantic queries need a file without errors")]
    NotLinked { path: String },

    #[error("document {uri} is too large: {size} bytes exceeds the maximum of {max} bytes")]
    DocumentTooLarge { uri: Url, size: usize, max: usize },
}
