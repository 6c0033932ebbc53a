//! Flat file storage for scripts. Names are sanitized to `[A-Za-z0-9._-]` before any
//! operation; that filter is the only thing keeping requests inside `root`.

use crate::error::{ConsoleError, ConsoleResult};
use std::collections::BTreeSet;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Fallback when a submitted name sanitizes to nothing.
pub const DEFAULT_SCRIPT: &str = "app.lua";

const BOOT_TEMPLATE: &str = "-- boot.lua: runs before the console starts\nprint(\"boot ok\")\n";
const CONSOLE_TEMPLATE: &str = "-- console.lua: development console entry point (protected)\nreturn true\n";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileEntry {
    pub name: String,
    pub size: u64,
    pub protected: bool,
}

/// Keep only `[A-Za-z0-9._-]`; empty (or all-dot) results become `DEFAULT_SCRIPT`.
pub fn sanitize_name(raw: &str) -> String {
    let s: String = raw
        .trim()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
        .collect();
    if is_valid_name(&s) {
        s
    } else {
        DEFAULT_SCRIPT.to_string()
    }
}

fn is_valid_name(name: &str) -> bool {
    !name.is_empty()
        && !name.chars().all(|c| c == '.')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
}

pub struct FileStore {
    root: PathBuf,
    protected: BTreeSet<String>,
}

impl FileStore {
    /// Open (and create if needed) the storage directory.
    pub fn open(root: impl Into<PathBuf>, protected: BTreeSet<String>) -> ConsoleResult<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)
            .map_err(|e| ConsoleError::Storage(format!("{}: {}", root.display(), e)))?;
        Ok(Self { root, protected })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn is_protected(&self, name: &str) -> bool {
        self.protected.contains(name)
    }

    fn path_for(&self, name: &str) -> ConsoleResult<PathBuf> {
        if !is_valid_name(name) {
            return Err(ConsoleError::Storage(format!("invalid file name: {:?}", name)));
        }
        Ok(self.root.join(name))
    }

    /// Regular files only, sorted by name.
    pub async fn list(&self) -> ConsoleResult<Vec<FileEntry>> {
        let mut dir = tokio::fs::read_dir(&self.root)
            .await
            .map_err(|e| ConsoleError::Storage(e.to_string()))?;
        let mut entries = Vec::new();
        while let Some(entry) = dir
            .next_entry()
            .await
            .map_err(|e| ConsoleError::Storage(e.to_string()))?
        {
            let meta = match entry.metadata().await {
                Ok(m) if m.is_file() => m,
                _ => continue,
            };
            let name = entry.file_name().to_string_lossy().into_owned();
            entries.push(FileEntry {
                protected: self.is_protected(&name),
                size: meta.len(),
                name,
            });
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    pub async fn exists(&self, name: &str) -> bool {
        match self.path_for(name) {
            Ok(path) => tokio::fs::metadata(path)
                .await
                .map(|m| m.is_file())
                .unwrap_or(false),
            Err(_) => false,
        }
    }

    pub async fn read(&self, name: &str) -> ConsoleResult<Vec<u8>> {
        let path = self.path_for(name)?;
        tokio::fs::read(path).await.map_err(|e| io_error(name, e))
    }

    /// Create or replace; contents are written byte-for-byte.
    pub async fn write(&self, name: &str, contents: &[u8]) -> ConsoleResult<()> {
        let path = self.path_for(name)?;
        tokio::fs::write(path, contents)
            .await
            .map_err(|e| ConsoleError::Storage(e.to_string()))
    }

    pub async fn delete(&self, name: &str) -> ConsoleResult<()> {
        if self.is_protected(name) {
            return Err(ConsoleError::Protected(name.to_string()));
        }
        let path = self.path_for(name)?;
        if !self.exists(name).await {
            return Err(ConsoleError::NotFound(name.to_string()));
        }
        tokio::fs::remove_file(path)
            .await
            .map_err(|e| io_error(name, e))
    }

    /// Write the console's own bootstrap files when missing. Returns the names created.
    pub async fn seed_bootstrap(&self) -> ConsoleResult<Vec<String>> {
        let mut created = Vec::new();
        for (name, body) in [
            (crate::config::BOOT_SCRIPT, BOOT_TEMPLATE),
            (crate::config::CONSOLE_SCRIPT, CONSOLE_TEMPLATE),
        ] {
            if !self.exists(name).await {
                self.write(name, body.as_bytes()).await?;
                created.push(name.to_string());
            }
        }
        Ok(created)
    }
}

fn io_error(name: &str, e: std::io::Error) -> ConsoleError {
    if e.kind() == ErrorKind::NotFound {
        ConsoleError::NotFound(name.to_string())
    } else {
        ConsoleError::Storage(e.to_string())
    }
}
