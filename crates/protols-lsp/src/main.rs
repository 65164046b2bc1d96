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

//! Protocol Buffers language server binary.
//!
//! # Usage
//!
//! ```bash
//! # Run the language server (stdio transport)
//! protols
//!
//! # With debug logging
//! RUST_LOG=protols_lsp=debug protols
//! ```
//!
//! # Editor Integration
//!
//! ## Neovim (nvim-lspconfig)
//!
//! ```lua
//! require('lspconfig.configs').protols = {
//!   default_config = {
//!     cmd = { 'protols' },
//!     filetypes = { 'proto' },
//!     root_dir = function() return vim.fn.getcwd() end,
//!     init_options = { synthesis = { enabled = true, timeoutMs = 10000 } },
//!   },
//! }
//! require('lspconfig').protols.setup {}
//! ```

use protols_lsp::constants::DEFAULT_LOG_FILTER;
use protols_lsp::ProtolsLanguageServer;
use tower_lsp::{LspService, Server};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    // Logs go to stderr; stdout carries the protocol.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    tracing::info!("Starting protols v{}", protols_lsp::VERSION);

    let stdin = tokio::io::stdin();
    let stdout = tokio::io::stdout();

    let (service, socket) = LspService::new(ProtolsLanguageServer::new);

    Server::new(stdin, stdout, socket).serve(service).await;
}
