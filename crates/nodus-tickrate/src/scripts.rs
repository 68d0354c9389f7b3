//! Task script discovery.

use crate::error::RpcError;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// File extension of task scripts.
pub const SCRIPT_EXTENSION: &str = "lua";

/// The task scripts available for submission.
#[derive(Debug, Clone)]
pub struct ScriptCatalog {
    dir: PathBuf,
    names: Vec<String>,
}

impl ScriptCatalog {
    /// Scan `dir` for `*.lua` files.
    ///
    /// An empty directory is an error; the bot cannot do anything without
    /// at least one script.
    pub fn load(dir: impl Into<PathBuf>) -> Result<Self, RpcError> {
        let dir = dir.into();
        let mut catalog = Self {
            dir,
            names: Vec::new(),
        };
        catalog.reload()?;
        Ok(catalog)
    }

    /// Rescan the directory.
    pub fn reload(&mut self) -> Result<(), RpcError> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            if path.extension().and_then(|e| e.to_str()) != Some(SCRIPT_EXTENSION) {
                continue;
            }
            if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                names.push(name.to_string());
            }
        }
        names.sort();

        if names.is_empty() {
            return Err(RpcError::NoScripts(self.dir.clone()));
        }

        info!(dir = %self.dir.display(), count = names.len(), "Loaded task scripts");
        self.names = names;
        Ok(())
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Script file names, sorted.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.iter().any(|n| n == name)
    }

    /// Path of a script inside the catalog directory.
    pub fn task_path(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    /// Read a script's source, without a leading byte-order mark.
    pub fn task_body(&self, name: &str) -> Result<String, RpcError> {
        if name.contains(['/', '\\']) || name == ".." {
            return Err(RpcError::script(name, "script names cannot contain path separators"));
        }
        let path = self.task_path(name);
        let body = fs::read_to_string(&path)
            .map_err(|e| RpcError::script(name, format!("{}: {}", path.display(), e)))?;
        debug!(script = name, bytes = body.len(), "Read task script");
        Ok(match body.strip_prefix('\u{feff}') {
            Some(stripped) => stripped.to_string(),
            None => body,
        })
    }
}
