use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::StoreResult;
use crate::traits::{validate_key, ObjectStore, WalkControl, WalkQuery};

/// Filesystem-backed store: one file per key in a single flat directory.
///
/// Writes land in a hidden temporary file in the same directory and are then
/// renamed over the target, so a crash never exposes a partially written
/// object. Hidden entries (leading `.`) are never listed.
#[derive(Debug, Clone)]
pub struct LocalObjectStore {
    root: PathBuf,
}

impl LocalObjectStore {
    /// Open (or create) a store rooted at `root`.
    pub fn open(root: impl AsRef<Path>) -> StoreResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    /// Directory holding the objects.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> StoreResult<PathBuf> {
        validate_key(key)?;
        Ok(self.root.join(key))
    }
}

impl ObjectStore for LocalObjectStore {
    fn walk(
        &self,
        query: &WalkQuery,
        visit: &mut dyn FnMut(&str) -> StoreResult<WalkControl>,
    ) -> StoreResult<()> {
        let mut keys = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let Ok(name) = entry.file_name().into_string() else {
                warn!(path = ?entry.path(), "skipping non UTF-8 file name");
                continue;
            };
            if name.starts_with('.') || !query.matches(&name) {
                continue;
            }
            keys.push(name);
        }
        keys.sort_unstable();

        for key in &keys {
            if visit(key)? == WalkControl::Stop {
                break;
            }
        }
        Ok(())
    }

    fn read(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        match fs::read(self.path_for(key)?) {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn write(&self, key: &str, data: &[u8]) -> StoreResult<()> {
        let path = self.path_for(key)?;
        let mut tmp = tempfile::Builder::new()
            .prefix(".obm-")
            .suffix(".tmp")
            .tempfile_in(&self.root)?;
        tmp.write_all(data)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&path).map_err(|e| e.error)?;
        debug!(key, len = data.len(), "object written");
        Ok(())
    }

    fn exists(&self, key: &str) -> StoreResult<bool> {
        Ok(self.path_for(key)?.try_exists()?)
    }

    fn delete(&self, key: &str) -> StoreResult<bool> {
        match fs::remove_file(self.path_for(key)?) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}
