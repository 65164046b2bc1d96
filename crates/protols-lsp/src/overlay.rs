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

//! In-memory store of unsaved edits.
//!
//! While a path has an overlay entry, that entry is the only content the
//! compiler sees for it. Entries are keyed by canonical path and hold a
//! [`Rope`], which doubles as the position mapper for incremental edits:
//! LSP positions count UTF-16 code units, so each edit range is converted
//! through the rope's line and UTF-16 indexes before it is applied.
//!
//! # Lazy base content
//!
//! An entry may be created by an edit before any open notification. In
//! that case the base content is read through the [`BaseReader`] at the
//! time of the first edit, and the edit is applied on top of it.
//!
//! # Atomicity
//!
//! A batch of changes is applied to a copy of the rope and committed only
//! if every change in the batch is valid.

use crate::error::OverlayError;
use parking_lot::Mutex;
use ropey::Rope;
use std::collections::HashMap;
use std::io;
use std::sync::Arc;
use tower_lsp::lsp_types::{Position, TextDocumentContentChangeEvent};
use tracing::debug;

/// Reads the on-disk content of a canonical path.
pub type BaseReader = Arc<dyn Fn(&str) -> io::Result<String> + Send + Sync>;

pub struct Overlay {
    base: BaseReader,
    sources: Mutex<HashMap<String, Rope>>,
}

impl Overlay {
    pub fn new(base: BaseReader) -> Self {
        Self {
            base,
            sources: Mutex::new(HashMap::new()),
        }
    }

    /// Creates the entry for `path`. Fails if one already exists.
    pub fn create(&self, path: &str, text: &str) -> Result<(), OverlayError> {
        let mut sources = self.sources.lock();
        if sources.contains_key(path) {
            return Err(OverlayError::AlreadyExists(path.to_string()));
        }
        sources.insert(path.to_string(), Rope::from_str(text));
        debug!("overlay created for {} ({} bytes)", path, text.len());
        Ok(())
    }

    /// Replaces the entry for `path`, creating it if needed.
    pub fn replace(&self, path: &str, text: &str) {
        self.sources
            .lock()
            .insert(path.to_string(), Rope::from_str(text));
    }

    /// Applies `changes` in order to the entry for `path`.
    ///
    /// A change without a range replaces the whole content. If no entry
    /// exists yet, the base content is read first.
    pub fn update(
        &self,
        path: &str,
        changes: &[TextDocumentContentChangeEvent],
    ) -> Result<(), OverlayError> {
        if changes.is_empty() {
            return Err(OverlayError::NoChanges(path.to_string()));
        }

        let mut sources = self.sources.lock();
        let mut rope = match sources.get(path) {
            Some(rope) => rope.clone(),
            None if changes.iter().all(|c| c.range.is_none()) => Rope::new(),
            None => {
                let text = (self.base)(path).map_err(|source| OverlayError::Base {
                    path: path.to_string(),
                    source,
                })?;
                debug!("overlay for {} initialized from base content", path);
                Rope::from_str(&text)
            }
        };

        for change in changes {
            apply_change(&mut rope, path, change)?;
        }
        sources.insert(path.to_string(), rope);
        Ok(())
    }

    /// Removes the entry for `path`. Returns whether one existed.
    pub fn delete(&self, path: &str) -> bool {
        let removed = self.sources.lock().remove(path).is_some();
        if removed {
            debug!("overlay deleted for {}", path);
        }
        removed
    }

    /// Moves an entry to a new key, keeping its content.
    pub fn rename(&self, from: &str, to: &str) {
        let mut sources = self.sources.lock();
        if let Some(rope) = sources.remove(from) {
            sources.insert(to.to_string(), rope);
        }
    }

    pub fn content(&self, path: &str) -> Option<String> {
        self.sources.lock().get(path).map(Rope::to_string)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.sources.lock().contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.sources.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.lock().is_empty()
    }
}

fn apply_change(
    rope: &mut Rope,
    path: &str,
    change: &TextDocumentContentChangeEvent,
) -> Result<(), OverlayError> {
    let Some(range) = change.range else {
        *rope = Rope::from_str(&change.text);
        return Ok(());
    };
    let start = position_to_char(rope, range.start);
    let end = position_to_char(rope, range.end);
    if start > end {
        return Err(OverlayError::InvalidRange {
            path: path.to_string(),
            reason: format!(
                "start {}:{} is after end {}:{}",
                range.start.line, range.start.character, range.end.line, range.end.character
            ),
        });
    }
    rope.remove(start..end);
    rope.insert(start, &change.text);
    Ok(())
}

/// Char index of an LSP position. Positions past the end of a line clamp
/// to the end of that line; lines past the end clamp to the end of the
/// document.
pub(crate) fn position_to_char(rope: &Rope, pos: Position) -> usize {
    let line = pos.line as usize;
    if line >= rope.len_lines() {
        return rope.len_chars();
    }
    let line_start = rope.line_to_char(line);
    let slice = rope.line(line);
    let mut len_chars = slice.len_chars();
    while len_chars > 0 && matches!(slice.char(len_chars - 1), '\n' | '\r') {
        len_chars -= 1;
    }
    let line_len_cu = slice.char_to_utf16_cu(len_chars);
    let line_start_cu = rope.char_to_utf16_cu(line_start);
    let cu = line_start_cu + (pos.character as usize).min(line_len_cu);
    rope.utf16_cu_to_char(cu)
}
