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

//! Server configuration, read from the client's `initializationOptions`.
//!
//! Every field is optional on the wire; missing fields take the defaults
//! from [`crate::constants`].
//!
//! ```json
//! {
//!   "maxParallelism": 4,
//!   "maxDocumentSize": 16777216,
//!   "synthesis": {
//!     "enabled": true,
//!     "goBinary": "go",
//!     "timeoutMs": 10000,
//!     "rewriteScope": "sameParent",
//!     "moduleDirs": { "github.com/acme/api": "/src/acme/api" }
//!   }
//! }
//! ```

use crate::constants::{
    DEFAULT_GO_BINARY, DEFAULT_MAX_DOCUMENT_SIZE, DEFAULT_MAX_PARALLELISM,
    DEFAULT_SYNTHESIS_TIMEOUT_MS,
};
use crate::synthesis::RewriteScope;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerConfig {
    /// Upper bound on compiler threads; 0 uses the global pool.
    pub max_parallelism: usize,
    /// Documents larger than this are rejected on open.
    pub max_document_size: usize,
    pub synthesis: SynthesisConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            max_parallelism: DEFAULT_MAX_PARALLELISM,
            max_document_size: DEFAULT_MAX_DOCUMENT_SIZE,
            synthesis: SynthesisConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Reads the configuration from `initializationOptions`, falling back
    /// to the defaults when the value is absent or malformed.
    pub fn from_initialization_options(options: Option<serde_json::Value>) -> Self {
        match options {
            None | Some(serde_json::Value::Null) => Self::default(),
            Some(value) => serde_json::from_value(value).unwrap_or_else(|e| {
                warn!("ignoring malformed initializationOptions: {}", e);
                Self::default()
            }),
        }
    }
}

/// Settings for recovering descriptors from generated Go code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SynthesisConfig {
    pub enabled: bool,
    pub go_binary: String,
    pub timeout_ms: u64,
    pub rewrite_scope: RewriteScope,
    /// Module path prefix -> directory. When non-empty these replace
    /// `go list` lookups.
    pub module_dirs: BTreeMap<String, PathBuf>,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            go_binary: DEFAULT_GO_BINARY.to_string(),
            timeout_ms: DEFAULT_SYNTHESIS_TIMEOUT_MS,
            rewrite_scope: RewriteScope::default(),
            module_dirs: BTreeMap::new(),
        }
    }
}

impl SynthesisConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}
