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

//! LSP constants and magic number definitions.
//!
//! # Organization
//!
//! Constants are organized by category:
//! - **Limits**: document size and compile parallelism
//! - **Synthesis**: module resolution and descriptor recovery
//! - **Import Paths**: reserved and rewritten import prefixes
//! - **LSP Protocol**: protocol-specific values and defaults

// ============================================================================
// Limits
// ============================================================================

/// Bytes per megabyte (1024 * 1024).
pub const BYTES_PER_MEGABYTE: usize = 1024 * 1024;

/// Default maximum document size in bytes (16 MB).
///
/// **Rationale**: schema files are small. The largest generated schemas
/// seen in practice (API surface dumps) stay below 2 MB; 16 MB leaves
/// headroom while keeping a runaway buffer from being parsed on every
/// keystroke.
pub const DEFAULT_MAX_DOCUMENT_SIZE: usize = 16 * BYTES_PER_MEGABYTE;

/// Default upper bound on compiler threads.
///
/// **Rationale**: 0 hands parsing to the global rayon pool, which is sized
/// to the number of CPUs. A positive value builds a dedicated pool.
pub const DEFAULT_MAX_PARALLELISM: usize = 0;

// ============================================================================
// Synthesis
// ============================================================================

/// Default timeout for one module-resolution subprocess (in milliseconds).
///
/// **Rationale**: `go list` on a warm module cache answers in well under a
/// second; a cold cache that must download can take much longer. 10 seconds
/// bounds the stall on the compile lock. A timeout counts as a resolution
/// miss.
pub const DEFAULT_SYNTHESIS_TIMEOUT_MS: u64 = 10_000;

/// Default go toolchain binary, looked up on `PATH`.
pub const DEFAULT_GO_BINARY: &str = "go";

/// Environment variables forwarded to the go toolchain.
pub const GO_ENV_VARS: &[&str] = &[
    "GO111MODULE",
    "GOFLAGS",
    "GOINSECURE",
    "GOMOD",
    "GOMODCACHE",
    "GONOPROXY",
    "GONOSUMDB",
    "GOPATH",
    "GOPROXY",
    "GOROOT",
    "GOSUMDB",
    "GOWORK",
    "HOME",
    "PATH",
];

/// Suffix of generated Go files that embed a raw descriptor.
pub const GENERATED_GO_SUFFIX: &str = ".pb.go";

/// Suffix of generated gRPC stubs, which never embed a descriptor.
pub const GENERATED_GRPC_SUFFIX: &str = "_grpc.pb.go";

/// First two bytes of a gzip stream.
pub const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

// ============================================================================
// Import Paths
// ============================================================================

/// Schema file extension, without the dot.
pub const SCHEMA_EXTENSION: &str = "proto";

/// Import prefix of the standard schemas. These come from the embedded
/// registry only, never from the workspace or synthesis.
pub const WELL_KNOWN_PREFIX: &str = "google/";

/// Short import prefix used by gogo/protobuf schemas.
pub const GOGOPROTO_PREFIX: &str = "gogoproto/";

/// Module that `gogoproto/...` imports are rewritten into.
pub const GOGOPROTO_MODULE: &str = "github.com/gogo/protobuf/";

// ============================================================================
// LSP Protocol Constants
// ============================================================================

/// `source` field of published diagnostics.
pub const DIAGNOSTIC_SOURCE: &str = "protols";

/// Glob used for file-operation registrations.
pub const SCHEMA_GLOB: &str = "**/*.proto";

/// Language id sent by clients for schema buffers.
pub const LANGUAGE_ID: &str = "protobuf";

/// Line numbering offset between compiler spans and LSP positions.
///
/// **Usage**: `lsp_line = span_line - LINE_NUMBER_OFFSET`
pub const LINE_NUMBER_OFFSET: u32 = 1;

/// Log filter installed when `RUST_LOG` is not set.
pub const DEFAULT_LOG_FILTER: &str = "protols_lsp=info";
