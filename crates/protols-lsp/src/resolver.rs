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

//! The import resolver handed to the compiler.
//!
//! Lookups fall through, in order:
//!
//! 1. the overlay of unsaved edits
//! 2. `google/...`: the well-known registry only
//! 3. workspace files on disk, through the canonical path index
//! 4. descriptor synthesis from Go dependencies
//! 5. the well-known registry, for anything else it happens to hold
//!
//! `gogoproto/...` imports are looked up as
//! `github.com/gogo/protobuf/gogoproto/...` from step 3 on.

use crate::constants::{GOGOPROTO_MODULE, GOGOPROTO_PREFIX, WELL_KNOWN_PREFIX};
use crate::error::SynthesisError;
use crate::index::WorkspaceIndex;
use crate::overlay::Overlay;
use crate::synthesis::{Synthesized, Synthesizer};
use parking_lot::RwLock;
use protols_compiler::wellknown;
use protols_compiler::{ResolveError, Resolver, SearchResult};
use std::borrow::Cow;
use std::sync::Arc;
use tracing::debug;

pub struct ResolverChain {
    overlay: Arc<Overlay>,
    index: Arc<RwLock<WorkspaceIndex>>,
    synthesizer: Option<Arc<Synthesizer>>,
}

impl ResolverChain {
    pub fn new(
        overlay: Arc<Overlay>,
        index: Arc<RwLock<WorkspaceIndex>>,
        synthesizer: Option<Arc<Synthesizer>>,
    ) -> Self {
        Self {
            overlay,
            index,
            synthesizer,
        }
    }

    fn from_registry(path: &str) -> Option<SearchResult> {
        wellknown::registry()
            .find_file(path)
            .map(|f| SearchResult::Descriptor(Arc::clone(f.descriptor())))
    }

    fn from_workspace(&self, path: &str) -> Option<Result<SearchResult, ResolveError>> {
        let uri = self.index.read().uri_for(path).ok()?.clone();
        let file = uri.to_file_path().ok()?;
        Some(
            std::fs::read_to_string(&file)
                .map(SearchResult::Source)
                .map_err(|source| ResolveError::Io {
                    path: path.to_string(),
                    source,
                }),
        )
    }
}

/// The name `path` is looked up under outside the overlay.
pub(crate) fn lookup_name(path: &str) -> Cow<'_, str> {
    if path.starts_with(GOGOPROTO_PREFIX) {
        Cow::Owned(format!("{GOGOPROTO_MODULE}{path}"))
    } else {
        Cow::Borrowed(path)
    }
}

impl Resolver for ResolverChain {
    fn find_file_by_path(&self, path: &str) -> Result<SearchResult, ResolveError> {
        if let Some(text) = self.overlay.content(path) {
            return Ok(SearchResult::Source(text));
        }

        if path.starts_with(WELL_KNOWN_PREFIX) {
            return Self::from_registry(path).ok_or_else(|| ResolveError::not_found(path));
        }

        let name = lookup_name(path);
        if let Some(found) = self.from_workspace(&name) {
            return found;
        }

        let mut synthesis_error = None;
        if let Some(synthesizer) = &self.synthesizer {
            match synthesizer.resolve(&name) {
                Ok(Synthesized::Source { path: file, text }) => {
                    debug!("{} resolved to module source {}", path, file.display());
                    return Ok(SearchResult::Source(text));
                }
                Ok(Synthesized::Descriptor(mut fd)) => {
                    debug!("{} synthesized from generated code", path);
                    fd.name = Some(path.to_string());
                    return Ok(SearchResult::Proto(fd));
                }
                Err(e) => synthesis_error = Some(e),
            }
        }

        if let Some(found) = Self::from_registry(path) {
            return Ok(found);
        }

        match synthesis_error {
            Some(
                SynthesisError::InvalidImportPath { .. }
                | SynthesisError::ModuleNotFound(_)
                | SynthesisError::Reserved { .. },
            )
            | None => Err(ResolveError::not_found(path)),
            Some(e) => Err(ResolveError::Unavailable {
                path: path.to_string(),
                reason: e.to_string(),
            }),
        }
    }
}
