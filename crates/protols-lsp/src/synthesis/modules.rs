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

//! Go package directory lookup.

use crate::constants::GO_ENV_VARS;
use crate::error::SynthesisError;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::io::Read;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::sync::mpsc;
use std::time::Duration;
use tracing::{debug, warn};

/// Maps a Go package import path to the directory holding its sources.
pub trait ModuleResolver: Send + Sync {
    fn find_module_dir(&self, package: &str) -> Result<PathBuf, SynthesisError>;
}

/// Resolves packages with `go list`, run in the workspace's module.
pub struct GoListResolver {
    go_binary: String,
    workdir: PathBuf,
    timeout: Duration,
    /// `None` records a definite miss. Timeouts are not recorded.
    memo: Mutex<HashMap<String, Option<PathBuf>>>,
}

impl GoListResolver {
    pub fn new(go_binary: impl Into<String>, workdir: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            go_binary: go_binary.into(),
            workdir: workdir.into(),
            timeout,
            memo: Mutex::new(HashMap::new()),
        }
    }

    fn command(&self, package: &str) -> Command {
        let mut cmd = Command::new(&self.go_binary);
        cmd.args(["list", "-f", "{{.Dir}}", package])
            .current_dir(&self.workdir)
            .env_clear()
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null());
        for key in GO_ENV_VARS {
            if let Ok(value) = std::env::var(key) {
                cmd.env(key, value);
            }
        }
        let flags = std::env::var("GOFLAGS").unwrap_or_default();
        cmd.env("GOFLAGS", format!("{flags} -mod=readonly").trim());
        cmd
    }

    fn run(&self, package: &str) -> Result<Option<PathBuf>, SynthesisError> {
        let mut child = self
            .command(package)
            .spawn()
            .map_err(|e| SynthesisError::Command {
                package: package.to_string(),
                reason: e.to_string(),
            })?;
        let Some(mut stdout) = child.stdout.take() else {
            return Err(SynthesisError::Command {
                package: package.to_string(),
                reason: "no stdout".to_string(),
            });
        };

        let (tx, rx) = mpsc::channel();
        std::thread::spawn(move || {
            let mut out = String::new();
            let result = stdout.read_to_string(&mut out).map(|_| out);
            let _ = tx.send(result);
        });

        let output = match rx.recv_timeout(self.timeout) {
            Ok(Ok(out)) => out,
            Ok(Err(e)) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(SynthesisError::Command {
                    package: package.to_string(),
                    reason: e.to_string(),
                });
            }
            Err(_) => {
                warn!("go list {} timed out after {:?}", package, self.timeout);
                let _ = child.kill();
                let _ = child.wait();
                return Err(SynthesisError::Timeout {
                    package: package.to_string(),
                    after: self.timeout,
                });
            }
        };

        let status = child.wait().map_err(|e| SynthesisError::Command {
            package: package.to_string(),
            reason: e.to_string(),
        })?;
        let dir = output.lines().next().unwrap_or("").trim();
        if !status.success() || dir.is_empty() {
            return Ok(None);
        }
        Ok(Some(PathBuf::from(dir)))
    }
}

impl ModuleResolver for GoListResolver {
    fn find_module_dir(&self, package: &str) -> Result<PathBuf, SynthesisError> {
        if let Some(known) = self.memo.lock().get(package) {
            return known
                .clone()
                .ok_or_else(|| SynthesisError::ModuleNotFound(package.to_string()));
        }
        let found = self.run(package)?;
        debug!("go list {} -> {:?}", package, found);
        self.memo.lock().insert(package.to_string(), found.clone());
        found.ok_or_else(|| SynthesisError::ModuleNotFound(package.to_string()))
    }
}

/// Resolves packages under fixed module directories.
#[derive(Debug, Clone, Default)]
pub struct StaticModuleResolver {
    dirs: BTreeMap<String, PathBuf>,
}

impl StaticModuleResolver {
    pub fn new(dirs: BTreeMap<String, PathBuf>) -> Self {
        Self { dirs }
    }

    pub fn with_module(mut self, prefix: impl Into<String>, dir: impl Into<PathBuf>) -> Self {
        self.dirs.insert(prefix.into(), dir.into());
        self
    }
}

impl ModuleResolver for StaticModuleResolver {
    fn find_module_dir(&self, package: &str) -> Result<PathBuf, SynthesisError> {
        let best = self
            .dirs
            .iter()
            .filter_map(|(prefix, dir)| {
                if package == prefix {
                    Some((prefix.len(), dir.clone()))
                } else {
                    package
                        .strip_prefix(prefix.as_str())
                        .and_then(|rest| rest.strip_prefix('/'))
                        .map(|rest| (prefix.len(), dir.join(rest)))
                }
            })
            .max_by_key(|(len, _)| *len);
        match best {
            Some((_, dir)) if dir.is_dir() => Ok(dir),
            _ => Err(SynthesisError::ModuleNotFound(package.to_string())),
        }
    }
}

/// Checks that `path` is a well-formed Go import path.
pub fn validate_import_path(path: &str) -> Result<(), SynthesisError> {
    let invalid = |reason: &str| SynthesisError::InvalidImportPath {
        path: path.to_string(),
        reason: reason.to_string(),
    };
    if path.is_empty() {
        return Err(invalid("empty path"));
    }
    for elem in path.split('/') {
        if elem.is_empty() {
            return Err(invalid("empty path element"));
        }
        if elem == "." || elem == ".." {
            return Err(invalid("relative path element"));
        }
        if elem.ends_with('.') {
            return Err(invalid("trailing dot in path element"));
        }
        if let Some(c) = elem
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '.' | '_' | '~' | '+')))
        {
            return Err(invalid(&format!("invalid char {c:?}")));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_validate_import_path() {
        assert!(validate_import_path("github.com/acme/api/v1").is_ok());
        assert!(validate_import_path("example.com/a_b-c~d+e").is_ok());
        for bad in ["", "/a", "a/", "a//b", "a/./b", "a/../b", "a/b./c", "a b", "a/ü"] {
            assert!(validate_import_path(bad).is_err(), "{bad:?} accepted");
        }
    }

    #[test]
    fn test_static_longest_prefix() {
        let tmp = TempDir::new().unwrap();
        let outer = tmp.path().join("outer");
        let inner = tmp.path().join("inner");
        std::fs::create_dir_all(outer.join("sub")).unwrap();
        std::fs::create_dir_all(inner.join("x")).unwrap();
        let r = StaticModuleResolver::default()
            .with_module("example.com/m", &outer)
            .with_module("example.com/m/sub/deeper", &inner);

        assert_eq!(r.find_module_dir("example.com/m").unwrap(), outer);
        assert_eq!(r.find_module_dir("example.com/m/sub").unwrap(), outer.join("sub"));
        assert_eq!(
            r.find_module_dir("example.com/m/sub/deeper/x").unwrap(),
            inner.join("x")
        );
        assert!(r.find_module_dir("example.com/mm").is_err());
        assert!(r.find_module_dir("example.com/m/missing").is_err());
    }

    #[test]
    fn test_go_list_missing_binary_is_command_error() {
        let tmp = TempDir::new().unwrap();
        let r = GoListResolver::new(
            "protols-test-no-such-go-binary",
            tmp.path(),
            Duration::from_millis(500),
        );
        assert!(matches!(
            r.find_module_dir("example.com/x"),
            Err(SynthesisError::Command { .. })
        ));
    }
}
