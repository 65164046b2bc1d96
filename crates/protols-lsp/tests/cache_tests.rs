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

//! Integration tests for the compilation cache.
//!
//! These drive the cache the way the language server does, through its
//! event handlers, and check what the resolver chain and queries see.

use protols_compiler::{ResolveError, SearchResult};
use protols_lsp::config::{ServerConfig, SynthesisConfig};
use protols_lsp::Cache;
use tempfile::TempDir;
use tower_lsp::lsp_types::*;

// ============================================================================
// TEST HELPERS
// ============================================================================

const PING: &str = "syntax = \"proto3\";\npackage ping;\noption go_package = \"example.com/ping\";\nmessage Ping { string id = 1; }\n";

fn cache(tmp: &TempDir) -> Cache {
    let config = ServerConfig {
        synthesis: SynthesisConfig {
            enabled: false,
            ..SynthesisConfig::default()
        },
        ..ServerConfig::default()
    };
    Cache::new(vec![tmp.path().to_path_buf()], config)
}

fn write(tmp: &TempDir, name: &str, text: &str) -> Url {
    let file = tmp.path().join(name);
    if let Some(dir) = file.parent() {
        std::fs::create_dir_all(dir).unwrap();
    }
    std::fs::write(&file, text).unwrap();
    Url::from_file_path(file).unwrap()
}

fn source(result: Result<SearchResult, ResolveError>) -> String {
    match result {
        Ok(SearchResult::Source(text)) => text,
        other => panic!("expected source, got {other:?}"),
    }
}

fn full_change(text: &str) -> TextDocumentContentChangeEvent {
    TextDocumentContentChangeEvent {
        range: None,
        range_length: None,
        text: text.to_string(),
    }
}

// ============================================================================
// OVERLAY PRECEDENCE
// ============================================================================

#[test]
fn test_modified_content_shadows_disk_until_close() {
    let tmp = TempDir::new().unwrap();
    let uri = write(&tmp, "ping.proto", PING);
    let cache = cache(&tmp);
    cache.reindex();
    let path = "example.com/ping/ping.proto";

    cache.on_file_opened(&uri, PING).unwrap();
    let edited = PING.replace("string id = 1;", "string id = 1; int64 at = 2;");
    cache.on_file_modified(&uri, &[full_change(&edited)]).unwrap();
    assert_eq!(source(cache.resolve_import(path)), edited);
    assert_eq!(std::fs::read_to_string(uri.to_file_path().unwrap()).unwrap(), PING);

    cache.on_file_closed(&uri).unwrap();
    assert_eq!(source(cache.resolve_import(path)), PING);
}

#[test]
fn test_incremental_edit_applies_to_disk_content() {
    let tmp = TempDir::new().unwrap();
    let uri = write(&tmp, "ping.proto", PING);
    let cache = cache(&tmp);
    cache.reindex();

    // No open first: the edit starts from what is on disk.
    let rename_field = TextDocumentContentChangeEvent {
        range: Some(Range::new(Position::new(3, 22), Position::new(3, 24))),
        range_length: None,
        text: "key".to_string(),
    };
    cache.on_file_modified(&uri, &[rename_field]).unwrap();
    let text = source(cache.resolve_import("example.com/ping/ping.proto"));
    assert!(text.contains("string key = 1;"));
    assert!(cache.result(&uri).unwrap().is_linked());
}

// ============================================================================
// INDEX
// ============================================================================

#[test]
fn test_index_round_trips_after_reindex() {
    let tmp = TempDir::new().unwrap();
    write(&tmp, "ping/ping.proto", PING);
    write(
        &tmp,
        "pong/pong.proto",
        "syntax = \"proto3\";\noption go_package = \"example.com/pong;pongpb\";\nmessage Pong {}\n",
    );
    write(&tmp, "loose.proto", "syntax = \"proto3\";\nmessage Loose {}\n");
    let cache = cache(&tmp);
    cache.reindex();

    let stats = cache.statistics();
    assert_eq!(stats.indexed, 2);
    for path in ["example.com/ping/ping.proto", "example.com/pong/pong.proto"] {
        let uri = cache.uri_for_path(path).unwrap();
        assert_eq!(cache.path_for_uri(&uri).unwrap(), path);
    }
    assert!(cache.uri_for_path("example.com/pong;pongpb/pong.proto").is_err());
}

#[test]
fn test_reindex_keeps_open_documents() {
    let tmp = TempDir::new().unwrap();
    let cache = cache(&tmp);
    let uri = Url::from_file_path(tmp.path().join("unsaved.proto")).unwrap();
    cache.on_file_opened(&uri, PING).unwrap();

    cache.reindex();
    assert_eq!(
        cache.path_for_uri(&uri).unwrap(),
        "example.com/ping/unsaved.proto"
    );
    assert!(cache.result(&uri).unwrap().is_linked());
}

// ============================================================================
// QUERIES
// ============================================================================

#[test]
fn test_hover_on_well_known_type() {
    let tmp = TempDir::new().unwrap();
    let text = "syntax = \"proto3\";\noption go_package = \"example.com/t\";\nimport \"google/protobuf/timestamp.proto\";\nmessage T { google.protobuf.Timestamp at = 1; }\n";
    let uri = write(&tmp, "t.proto", text);
    let cache = cache(&tmp);
    cache.on_file_opened(&uri, text).unwrap();

    let hover = cache.hover(&uri, Position::new(3, 30)).unwrap().unwrap();
    let HoverContents::Markup(markup) = hover.contents else {
        panic!("expected markdown");
    };
    assert!(markup.value.contains("message Timestamp"));
    // Not a workspace file, so there is nowhere to jump to.
    assert_eq!(cache.definition(&uri, Position::new(3, 30)).unwrap(), None);
}

#[test]
fn test_definition_of_import_is_file_start() {
    let tmp = TempDir::new().unwrap();
    let ping = write(&tmp, "ping/ping.proto", PING);
    let text = "syntax = \"proto3\";\noption go_package = \"example.com/pong\";\nimport \"example.com/ping/ping.proto\";\nmessage Pong { ping.Ping p = 1; }\n";
    let pong = write(&tmp, "pong/pong.proto", text);
    let cache = cache(&tmp);
    cache.reindex();

    let location = cache.definition(&pong, Position::new(2, 12)).unwrap().unwrap();
    assert_eq!(location.uri, ping);
    assert_eq!(location.range, Range::default());
}

#[test]
fn test_semantic_tokens_range_is_subset() {
    let tmp = TempDir::new().unwrap();
    let uri = write(&tmp, "ping.proto", PING);
    let cache = cache(&tmp);
    cache.on_file_opened(&uri, PING).unwrap();

    let full = cache.semantic_tokens(&uri, None).unwrap();
    let last_line = Range::new(Position::new(3, 0), Position::new(4, 0));
    let ranged = cache.semantic_tokens(&uri, Some(&last_line)).unwrap();
    assert!(!ranged.is_empty());
    assert!(ranged.len() < full.len());
    assert_eq!(ranged[0].delta_line, 3);
}

#[test]
fn test_statistics_track_compiles() {
    let tmp = TempDir::new().unwrap();
    let uri = write(&tmp, "ping.proto", PING);
    let cache = cache(&tmp);
    cache.on_file_opened(&uri, PING).unwrap();
    cache.on_file_modified(&uri, &[full_change(PING)]).unwrap();

    let stats = cache.statistics();
    assert_eq!(stats.compile_batches, 2);
    assert_eq!(stats.files_compiled, 2);
    assert_eq!(stats.linked, 1);
    assert_eq!(stats.overlays, 1);
}
