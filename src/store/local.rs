//! Local directory blob store
//!
//! Each blob is a file under the container root; `/` in blob paths maps to
//! directories. Writes land in a hidden temp file and are renamed into place,
//! so readers never observe a partially written blob.

use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, ErrorKind, Read, Write};
use std::path::{Path, PathBuf};

use bytes::Bytes;

use crate::error::{FloeError, Result};

use super::BlobStore;

/// Blob store backed by a local directory
pub struct LocalBlobStore {
    /// Container root directory
    root: PathBuf,
}

impl LocalBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Container root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a blob path onto the filesystem, rejecting traversal
    fn resolve(&self, path: &str) -> Result<PathBuf> {
        let mut resolved = self.root.clone();
        for segment in path.split('/') {
            if segment.is_empty() || segment == "." || segment == ".." || segment.starts_with('.') {
                return Err(FloeError::Store(format!("invalid blob path: {}", path)));
            }
            resolved.push(segment);
        }
        Ok(resolved)
    }

    /// Recursively collect blob paths below `dir`
    fn walk(&self, dir: &Path, relative: &str, out: &mut Vec<String>) -> Result<()> {
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };

        for entry in entries {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();

            // Skip in-flight temp files
            if name.starts_with('.') {
                continue;
            }

            let child = if relative.is_empty() {
                name
            } else {
                format!("{}/{}", relative, name)
            };

            if entry.file_type()?.is_dir() {
                self.walk(&entry.path(), &child, out)?;
            } else {
                out.push(child);
            }
        }
        Ok(())
    }
}

impl BlobStore for LocalBlobStore {
    fn ensure_container_exists(&self) -> Result<()> {
        fs::create_dir_all(&self.root)?;
        Ok(())
    }

    fn put(&self, path: &str, data: Bytes) -> Result<()> {
        if !self.root.is_dir() {
            return Err(FloeError::Store(format!(
                "container does not exist: {}",
                self.root.display()
            )));
        }

        let target = self.resolve(path)?;
        let parent = target
            .parent()
            .ok_or_else(|| FloeError::Store(format!("invalid blob path: {}", path)))?;
        fs::create_dir_all(parent)?;

        let file_name = target
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let temp = parent.join(format!(".{}.tmp", file_name));

        {
            let mut file = OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(&temp)?;
            file.write_all(&data)?;
            file.sync_all()?;
        }
        fs::rename(&temp, &target)?;

        Ok(())
    }

    fn get(&self, path: &str) -> Result<Box<dyn Read + Send>> {
        let target = self.resolve(path)?;
        match File::open(&target) {
            Ok(file) => Ok(Box::new(BufReader::new(file))),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(FloeError::NotFound(path.to_string())),
            Err(e) => Err(e.into()),
        }
    }

    fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let mut paths = Vec::new();
        self.walk(&self.root, "", &mut paths)?;
        paths.retain(|p| p.starts_with(prefix));
        paths.sort();
        Ok(paths)
    }
}
