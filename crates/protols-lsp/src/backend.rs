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

//! LSP backend implementation.
//!
//! The backend translates protocol messages into calls on the [`Cache`].
//! Cache work can block (compiles, `go list`), so every call runs on the
//! blocking thread pool rather than the async runtime.
//!
//! Diagnostics use the pull model: the client asks for them and passes
//! the result id it last saw, and gets "unchanged" back if nothing moved.

use crate::cache::Cache;
use crate::config::ServerConfig;
use crate::constants::{BYTES_PER_MEGABYTE, DIAGNOSTIC_SOURCE, LANGUAGE_ID, SCHEMA_EXTENSION, SCHEMA_GLOB};
use crate::error::CacheError;
use crate::semantic;
use parking_lot::RwLock;
use std::path::PathBuf;
use std::sync::Arc;
use tower_lsp::jsonrpc::{self, ErrorCode, Result};
use tower_lsp::lsp_types::*;
use tower_lsp::{Client, LanguageServer};
use tracing::{debug, error, info, warn};

/// Protobuf language server backend.
pub struct ProtolsLanguageServer {
    client: Client,
    /// Created on `initialize`, once the workspace roots are known.
    cache: RwLock<Option<Arc<Cache>>>,
}

fn to_rpc_error(err: CacheError) -> jsonrpc::Error {
    match err {
        CacheError::Overlay(_) => jsonrpc::Error {
            code: ErrorCode::InternalError,
            message: err.to_string().into(),
            data: None,
        },
        _ => jsonrpc::Error::invalid_params(err.to_string()),
    }
}

fn schema_filters() -> FileOperationRegistrationOptions {
    FileOperationRegistrationOptions {
        filters: vec![
            FileOperationFilter {
                scheme: Some("file".to_string()),
                pattern: FileOperationPattern {
                    glob: SCHEMA_GLOB.to_string(),
                    matches: Some(FileOperationPatternKind::File),
                    options: None,
                },
            },
            FileOperationFilter {
                scheme: Some("file".to_string()),
                pattern: FileOperationPattern {
                    glob: "**".to_string(),
                    matches: Some(FileOperationPatternKind::Folder),
                    options: None,
                },
            },
        ],
    }
}

fn workspace_roots(params: &InitializeParams) -> Vec<PathBuf> {
    let from_folders: Vec<PathBuf> = params
        .workspace_folders
        .iter()
        .flatten()
        .filter_map(|folder| folder.uri.to_file_path().ok())
        .collect();
    if !from_folders.is_empty() {
        return from_folders;
    }
    #[allow(deprecated)]
    let root = params.root_uri.as_ref().and_then(|uri| uri.to_file_path().ok());
    root.into_iter().collect()
}

impl ProtolsLanguageServer {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            cache: RwLock::new(None),
        }
    }

    fn cache(&self) -> Option<Arc<Cache>> {
        self.cache.read().clone()
    }

    /// Runs `f` against the cache on the blocking pool.
    async fn with_cache<T, F>(&self, f: F) -> Option<T>
    where
        F: FnOnce(&Cache) -> T + Send + 'static,
        T: Send + 'static,
    {
        let Some(cache) = self.cache() else {
            warn!("request before initialize");
            return None;
        };
        match tokio::task::spawn_blocking(move || f(&cache)).await {
            Ok(value) => Some(value),
            Err(e) => {
                error!("cache task failed: {}", e);
                None
            }
        }
    }

    /// Runs a query, mapping its error to a JSON-RPC error.
    async fn query<T, F>(&self, f: F) -> Result<Option<T>>
    where
        F: FnOnce(&Cache) -> std::result::Result<Option<T>, CacheError> + Send + 'static,
        T: Send + 'static,
    {
        match self.with_cache(f).await {
            Some(result) => result.map_err(to_rpc_error),
            None => Ok(None),
        }
    }

    async fn report_event_error(&self, uri: &Url, err: CacheError) {
        match &err {
            CacheError::DocumentTooLarge { size, max, .. } => {
                error!("{}", err);
                self.client
                    .show_message(
                        MessageType::ERROR,
                        format!(
                            "Document too large: {} bytes exceeds maximum of {} bytes ({} MB)",
                            size,
                            max,
                            max / BYTES_PER_MEGABYTE
                        ),
                    )
                    .await;
            }
            _ => warn!("{}: {}", uri, err),
        }
    }

    pub fn cache_statistics(&self) -> Option<crate::cache::CacheStatistics> {
        self.cache().map(|c| c.statistics())
    }
}

#[tower_lsp::async_trait]
impl LanguageServer for ProtolsLanguageServer {
    async fn initialize(&self, params: InitializeParams) -> Result<InitializeResult> {
        let config = ServerConfig::from_initialization_options(params.initialization_options.clone());
        let roots = workspace_roots(&params);
        info!("protols initializing with roots {:?}", roots);
        *self.cache.write() = Some(Arc::new(Cache::new(roots, config)));

        Ok(InitializeResult {
            capabilities: ServerCapabilities {
                text_document_sync: Some(TextDocumentSyncCapability::Options(
                    TextDocumentSyncOptions {
                        open_close: Some(true),
                        change: Some(TextDocumentSyncKind::INCREMENTAL),
                        will_save: None,
                        will_save_wait_until: None,
                        save: Some(TextDocumentSyncSaveOptions::SaveOptions(SaveOptions {
                            include_text: Some(true),
                        })),
                    },
                )),
                hover_provider: Some(HoverProviderCapability::Simple(true)),
                definition_provider: Some(OneOf::Left(true)),
                document_symbol_provider: Some(OneOf::Left(true)),
                document_formatting_provider: Some(OneOf::Left(true)),
                document_link_provider: Some(DocumentLinkOptions {
                    resolve_provider: Some(false),
                    work_done_progress_options: Default::default(),
                }),
                inlay_hint_provider: Some(OneOf::Left(true)),
                semantic_tokens_provider: Some(
                    SemanticTokensServerCapabilities::SemanticTokensOptions(SemanticTokensOptions {
                        work_done_progress_options: Default::default(),
                        legend: semantic::legend(),
                        range: Some(true),
                        full: Some(SemanticTokensFullOptions::Bool(true)),
                    }),
                ),
                diagnostic_provider: Some(DiagnosticServerCapabilities::Options(DiagnosticOptions {
                    identifier: Some(DIAGNOSTIC_SOURCE.to_string()),
                    inter_file_dependencies: true,
                    workspace_diagnostics: false,
                    work_done_progress_options: Default::default(),
                })),
                workspace: Some(WorkspaceServerCapabilities {
                    workspace_folders: None,
                    file_operations: Some(WorkspaceFileOperationsServerCapabilities {
                        did_create: Some(schema_filters()),
                        did_rename: Some(schema_filters()),
                        did_delete: Some(schema_filters()),
                        ..Default::default()
                    }),
                }),
                ..Default::default()
            },
            server_info: Some(ServerInfo {
                name: DIAGNOSTIC_SOURCE.to_string(),
                version: Some(crate::VERSION.to_string()),
            }),
        })
    }

    async fn initialized(&self, _params: InitializedParams) {
        info!("protols initialized, indexing workspace");
        self.with_cache(|cache| cache.reindex()).await;
        if let Some(stats) = self.cache_statistics() {
            info!(
                "workspace ready: {} indexed, {} linked, {} unlinked",
                stats.indexed, stats.linked, stats.unlinked
            );
        }
    }

    async fn shutdown(&self) -> Result<()> {
        info!("protols shutting down");
        Ok(())
    }

    async fn did_open(&self, params: DidOpenTextDocumentParams) {
        let doc = params.text_document;
        if doc.language_id != LANGUAGE_ID && !doc.uri.path().ends_with(&format!(".{SCHEMA_EXTENSION}")) {
            debug!("ignoring {} ({})", doc.uri, doc.language_id);
            return;
        }
        info!("document opened: {} ({} bytes)", doc.uri, doc.text.len());
        let uri = doc.uri.clone();
        let result = self
            .with_cache(move |cache| cache.on_file_opened(&doc.uri, &doc.text))
            .await;
        if let Some(Err(e)) = result {
            self.report_event_error(&uri, e).await;
        }
    }

    async fn did_change(&self, params: DidChangeTextDocumentParams) {
        let uri = params.text_document.uri;
        debug!("{} change(s) to {}", params.content_changes.len(), uri);
        let changes = params.content_changes;
        let target = uri.clone();
        let result = self
            .with_cache(move |cache| cache.on_file_modified(&target, &changes))
            .await;
        if let Some(Err(e)) = result {
            self.report_event_error(&uri, e).await;
        }
    }

    async fn did_save(&self, params: DidSaveTextDocumentParams) {
        let uri = params.text_document.uri;
        debug!("document saved: {}", uri);
        let text = params.text;
        let target = uri.clone();
        let result = self
            .with_cache(move |cache| cache.on_file_saved(&target, text.as_deref()))
            .await;
        if let Some(Err(e)) = result {
            self.report_event_error(&uri, e).await;
        }
    }

    async fn did_close(&self, params: DidCloseTextDocumentParams) {
        let uri = params.text_document.uri;
        debug!("document closed: {}", uri);
        let target = uri.clone();
        let result = self.with_cache(move |cache| cache.on_file_closed(&target)).await;
        if let Some(Err(e)) = result {
            self.report_event_error(&uri, e).await;
        }
    }

    async fn did_create_files(&self, params: CreateFilesParams) {
        let uris: Vec<Url> = params
            .files
            .iter()
            .filter_map(|f| Url::parse(&f.uri).ok())
            .collect();
        debug!("{} file(s) created", uris.len());
        self.with_cache(move |cache| cache.on_files_created(&uris)).await;
    }

    async fn did_rename_files(&self, params: RenameFilesParams) {
        let renames: Vec<(Url, Url)> = params
            .files
            .iter()
            .filter_map(|f| Some((Url::parse(&f.old_uri).ok()?, Url::parse(&f.new_uri).ok()?)))
            .collect();
        debug!("{} file(s) renamed", renames.len());
        self.with_cache(move |cache| cache.on_files_renamed(&renames)).await;
    }

    async fn did_delete_files(&self, params: DeleteFilesParams) {
        let uris: Vec<Url> = params
            .files
            .iter()
            .filter_map(|f| Url::parse(&f.uri).ok())
            .collect();
        debug!("{} file(s) deleted", uris.len());
        self.with_cache(move |cache| cache.on_files_deleted(&uris)).await;
    }

    async fn diagnostic(
        &self,
        params: DocumentDiagnosticParams,
    ) -> Result<DocumentDiagnosticReportResult> {
        let uri = params.text_document.uri;
        let previous = params.previous_result_id;
        let report = self
            .with_cache(move |cache| cache.get_diagnostics(&uri, previous.as_deref()))
            .await
            .transpose()
            .map_err(to_rpc_error)?;

        let report = match report {
            Some(report) if report.unchanged => {
                DocumentDiagnosticReport::Unchanged(RelatedUnchangedDocumentDiagnosticReport {
                    related_documents: None,
                    unchanged_document_diagnostic_report: UnchangedDocumentDiagnosticReport {
                        result_id: report.result_id,
                    },
                })
            }
            Some(report) => DocumentDiagnosticReport::Full(RelatedFullDocumentDiagnosticReport {
                related_documents: None,
                full_document_diagnostic_report: FullDocumentDiagnosticReport {
                    result_id: (!report.result_id.is_empty()).then_some(report.result_id),
                    items: report.diagnostics.iter().map(|d| d.to_lsp()).collect(),
                },
            }),
            None => DocumentDiagnosticReport::Full(RelatedFullDocumentDiagnosticReport {
                related_documents: None,
                full_document_diagnostic_report: FullDocumentDiagnosticReport {
                    result_id: None,
                    items: Vec::new(),
                },
            }),
        };
        Ok(DocumentDiagnosticReportResult::Report(report))
    }

    async fn hover(&self, params: HoverParams) -> Result<Option<Hover>> {
        let uri = params.text_document_position_params.text_document.uri;
        let position = params.text_document_position_params.position;
        self.query(move |cache| cache.hover(&uri, position)).await
    }

    async fn goto_definition(
        &self,
        params: GotoDefinitionParams,
    ) -> Result<Option<GotoDefinitionResponse>> {
        let uri = params.text_document_position_params.text_document.uri;
        let position = params.text_document_position_params.position;
        self.query(move |cache| {
            Ok(cache
                .definition(&uri, position)?
                .map(GotoDefinitionResponse::Scalar))
        })
        .await
    }

    async fn document_link(&self, params: DocumentLinkParams) -> Result<Option<Vec<DocumentLink>>> {
        let uri = params.text_document.uri;
        self.query(move |cache| cache.document_links(&uri).map(Some)).await
    }

    async fn document_symbol(
        &self,
        params: DocumentSymbolParams,
    ) -> Result<Option<DocumentSymbolResponse>> {
        let uri = params.text_document.uri;
        self.query(move |cache| {
            Ok(Some(DocumentSymbolResponse::Nested(cache.document_symbols(&uri)?)))
        })
        .await
    }

    async fn semantic_tokens_full(
        &self,
        params: SemanticTokensParams,
    ) -> Result<Option<SemanticTokensResult>> {
        let uri = params.text_document.uri;
        self.query(move |cache| {
            let data = cache.semantic_tokens(&uri, None)?;
            Ok(Some(SemanticTokensResult::Tokens(SemanticTokens {
                result_id: None,
                data,
            })))
        })
        .await
    }

    async fn semantic_tokens_range(
        &self,
        params: SemanticTokensRangeParams,
    ) -> Result<Option<SemanticTokensRangeResult>> {
        let uri = params.text_document.uri;
        let range = params.range;
        self.query(move |cache| {
            let data = cache.semantic_tokens(&uri, Some(&range))?;
            Ok(Some(SemanticTokensRangeResult::Tokens(SemanticTokens {
                result_id: None,
                data,
            })))
        })
        .await
    }

    async fn inlay_hint(&self, params: InlayHintParams) -> Result<Option<Vec<InlayHint>>> {
        let uri = params.text_document.uri;
        let range = params.range;
        self.query(move |cache| cache.inlay_hints(&uri, Some(&range)).map(Some))
            .await
    }

    async fn formatting(&self, params: DocumentFormattingParams) -> Result<Option<Vec<TextEdit>>> {
        let uri = params.text_document.uri;
        self.query(move |cache| cache.format(&uri).map(Some)).await
    }
}
