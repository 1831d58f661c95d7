//! Filesystem access used by the settings store and entity discovery.
//!
//! `DiskFs` is the production implementation. `MemoryFs` keeps a tree in memory
//! and stamps every write with a monotonically increasing modification time, so
//! staleness and write conflicts can be reproduced without real timestamps.

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// One child of a listed directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub is_dir: bool,
}

pub trait SettingsFs: Send + Sync + std::fmt::Debug {
    fn read_to_string(&self, path: &Path) -> io::Result<String>;

    /// Replace the whole file.
    fn write(&self, path: &Path, contents: &str) -> io::Result<()>;

    /// Modification stamp of a regular file, `None` if there is no such file.
    fn modified(&self, path: &Path) -> io::Result<Option<SystemTime>>;

    fn is_file(&self, path: &Path) -> bool;

    fn is_dir(&self, path: &Path) -> bool;

    /// Children of a directory, sorted by name.
    fn read_dir(&self, path: &Path) -> io::Result<Vec<DirEntry>>;

    /// Create a single directory; the parent must exist.
    fn create_dir(&self, path: &Path) -> io::Result<()>;

    /// Remove a directory and everything below it.
    fn remove_dir_all(&self, path: &Path) -> io::Result<()>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct DiskFs;

impl SettingsFs for DiskFs {
    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        std::fs::read_to_string(path)
    }

    fn write(&self, path: &Path, contents: &str) -> io::Result<()> {
        let mut tmp_name = path.as_os_str().to_owned();
        tmp_name.push(".tmp");
        let tmp_path = PathBuf::from(tmp_name);
        std::fs::write(&tmp_path, contents)?;
        std::fs::rename(&tmp_path, path)
    }

    fn modified(&self, path: &Path) -> io::Result<Option<SystemTime>> {
        match std::fs::metadata(path) {
            Ok(meta) if meta.is_file() => Ok(Some(meta.modified()?)),
            Ok(_) => Ok(None),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn is_file(&self, path: &Path) -> bool {
        path.is_file()
    }

    fn is_dir(&self, path: &Path) -> bool {
        path.is_dir()
    }

    fn read_dir(&self, path: &Path) -> io::Result<Vec<DirEntry>> {
        let mut entries = Vec::new();
        for entry in std::fs::read_dir(path)? {
            let entry = entry?;
            let name = match entry.file_name().into_string() {
                Ok(name) => name,
                // Not addressable through string ids anyway
                Err(_) => continue,
            };
            entries.push(DirEntry {
                name,
                is_dir: entry.path().is_dir(),
            });
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    fn create_dir(&self, path: &Path) -> io::Result<()> {
        std::fs::create_dir(path)
    }

    fn remove_dir_all(&self, path: &Path) -> io::Result<()> {
        std::fs::remove_dir_all(path)
    }
}

#[derive(Debug)]
enum MemoryEntry {
    Dir,
    File { contents: String, modified: SystemTime },
}

#[derive(Debug, Default)]
struct MemoryTree {
    entries: BTreeMap<PathBuf, MemoryEntry>,
    clock: u64,
    writes: usize,
}

impl MemoryTree {
    fn tick(&mut self) -> SystemTime {
        self.clock += 1;
        UNIX_EPOCH + Duration::from_secs(self.clock)
    }

    fn parent_exists(&self, path: &Path) -> bool {
        match path.parent() {
            None => true,
            Some(parent) if parent.as_os_str().is_empty() => true,
            Some(parent) => matches!(self.entries.get(parent), Some(MemoryEntry::Dir)),
        }
    }
}

/// In-memory filesystem with a deterministic modification clock.
#[derive(Debug, Default)]
pub struct MemoryFs {
    tree: Mutex<MemoryTree>,
}

impl MemoryFs {
    pub fn new() -> Self {
        Self::default()
    }

    fn tree(&self) -> MutexGuard<'_, MemoryTree> {
        self.tree.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Create a file together with any missing parent directories.
    pub fn add_file(&self, path: impl AsRef<Path>, contents: &str) {
        let path = path.as_ref();
        let mut tree = self.tree();
        for ancestor in path.ancestors().skip(1) {
            if ancestor.as_os_str().is_empty() {
                continue;
            }
            tree.entries
                .entry(ancestor.to_path_buf())
                .or_insert(MemoryEntry::Dir);
        }
        let modified = tree.tick();
        tree.entries.insert(
            path.to_path_buf(),
            MemoryEntry::File {
                contents: contents.to_string(),
                modified,
            },
        );
    }

    /// Create a directory together with any missing parents.
    pub fn add_dir(&self, path: impl AsRef<Path>) {
        let mut tree = self.tree();
        for ancestor in path.as_ref().ancestors() {
            if ancestor.as_os_str().is_empty() {
                continue;
            }
            tree.entries
                .entry(ancestor.to_path_buf())
                .or_insert(MemoryEntry::Dir);
        }
    }

    /// Bump the modification stamp without changing the contents.
    pub fn touch(&self, path: impl AsRef<Path>) -> io::Result<()> {
        let mut tree = self.tree();
        let stamp = tree.tick();
        match tree.entries.get_mut(path.as_ref()) {
            Some(MemoryEntry::File { modified, .. }) => {
                *modified = stamp;
                Ok(())
            }
            _ => Err(io::Error::new(io::ErrorKind::NotFound, "no such file")),
        }
    }

    pub fn remove(&self, path: impl AsRef<Path>) {
        self.tree().entries.remove(path.as_ref());
    }

    /// Current contents of a file, if it exists.
    pub fn contents(&self, path: impl AsRef<Path>) -> Option<String> {
        match self.tree().entries.get(path.as_ref()) {
            Some(MemoryEntry::File { contents, .. }) => Some(contents.clone()),
            _ => None,
        }
    }

    /// Number of writes performed through [`SettingsFs::write`].
    pub fn writes(&self) -> usize {
        self.tree().writes
    }
}

impl SettingsFs for MemoryFs {
    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        self.contents(path)
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no such file"))
    }

    fn write(&self, path: &Path, contents: &str) -> io::Result<()> {
        let mut tree = self.tree();
        if !tree.parent_exists(path) {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                "parent directory does not exist",
            ));
        }
        if matches!(tree.entries.get(path), Some(MemoryEntry::Dir)) {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "path is a directory",
            ));
        }
        let modified = tree.tick();
        tree.writes += 1;
        tree.entries.insert(
            path.to_path_buf(),
            MemoryEntry::File {
                contents: contents.to_string(),
                modified,
            },
        );
        Ok(())
    }

    fn modified(&self, path: &Path) -> io::Result<Option<SystemTime>> {
        match self.tree().entries.get(path) {
            Some(MemoryEntry::File { modified, .. }) => Ok(Some(*modified)),
            _ => Ok(None),
        }
    }

    fn is_file(&self, path: &Path) -> bool {
        matches!(self.tree().entries.get(path), Some(MemoryEntry::File { .. }))
    }

    fn is_dir(&self, path: &Path) -> bool {
        matches!(self.tree().entries.get(path), Some(MemoryEntry::Dir))
    }

    fn read_dir(&self, path: &Path) -> io::Result<Vec<DirEntry>> {
        let tree = self.tree();
        if !matches!(tree.entries.get(path), Some(MemoryEntry::Dir)) {
            return Err(io::Error::new(io::ErrorKind::NotFound, "no such directory"));
        }
        let mut entries: Vec<DirEntry> = tree
            .entries
            .iter()
            .filter(|(child, _)| child.parent() == Some(path))
            .filter_map(|(child, entry)| {
                let name = child.file_name()?.to_str()?.to_string();
                Some(DirEntry {
                    name,
                    is_dir: matches!(entry, MemoryEntry::Dir),
                })
            })
            .collect();
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    fn create_dir(&self, path: &Path) -> io::Result<()> {
        let mut tree = self.tree();
        if tree.entries.contains_key(path) {
            return Err(io::Error::new(io::ErrorKind::AlreadyExists, "already exists"));
        }
        if !tree.parent_exists(path) {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                "parent directory does not exist",
            ));
        }
        tree.entries.insert(path.to_path_buf(), MemoryEntry::Dir);
        Ok(())
    }

    fn remove_dir_all(&self, path: &Path) -> io::Result<()> {
        let mut tree = self.tree();
        if !matches!(tree.entries.get(path), Some(MemoryEntry::Dir)) {
            return Err(io::Error::new(io::ErrorKind::NotFound, "no such directory"));
        }
        tree.entries.retain(|entry, _| !entry.starts_with(path));
        Ok(())
    }
}
