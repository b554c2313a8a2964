//! Typed store for the files provisioning owns.
//!
//! Every artifact the pipeline writes (token file, unit, overlay, proxy site,
//! renewal config) goes through [`ConfigStore`]. Writes are whole-file
//! replacements; nothing is appended or merged.

use crate::core::paths::HostPaths;
use crate::util::fs as host_fs;
use anyhow::{Context, Result};
use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::rc::Rc;
use zeroize::Zeroizing;

#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;

pub trait ConfigStore {
    /// Contents of `path`, or `None` if it does not exist.
    fn read(&self, path: &Path) -> Result<Option<Zeroizing<String>>>;

    /// Atomically replace `path` with `contents`, created with `mode`.
    fn replace(&self, path: &Path, contents: &str, mode: u32) -> Result<()>;

    /// Remove `path`. Returns whether anything was removed.
    fn remove(&self, path: &Path) -> Result<bool>;

    /// Point `link` at `target`, replacing whatever `link` was.
    fn link(&self, target: &Path, link: &Path) -> Result<()>;

    fn ensure_dir(&self, path: &Path, mode: u32) -> Result<()>;

    fn exists(&self, path: &Path) -> bool;

    /// Permission bits of `path`, if it exists.
    fn mode(&self, path: &Path) -> Result<Option<u32>>;
}

/// Store backed by the host filesystem, optionally below a staging root.
pub struct FsStore {
    paths: HostPaths,
}

impl FsStore {
    pub fn new(paths: HostPaths) -> Self {
        Self { paths }
    }
}

impl ConfigStore for FsStore {
    fn read(&self, path: &Path) -> Result<Option<Zeroizing<String>>> {
        let physical = self.paths.physical(path);
        match fs::read_to_string(&physical) {
            Ok(content) => Ok(Some(Zeroizing::new(content))),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("read {}", physical.display())),
        }
    }

    fn replace(&self, path: &Path, contents: &str, mode: u32) -> Result<()> {
        let physical = self.paths.physical(path);
        let parent = physical
            .parent()
            .with_context(|| format!("{} has no parent directory", physical.display()))?;
        if !parent.exists() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create dir {}", parent.display()))?;
        }
        let mut tmp = tempfile::Builder::new()
            .prefix(".provision-")
            .tempfile_in(parent)
            .with_context(|| format!("create temp file in {}", parent.display()))?;

        // Permissions are set before any content lands on disk.
        #[cfg(unix)]
        tmp.as_file()
            .set_permissions(fs::Permissions::from_mode(mode))
            .with_context(|| format!("set permissions on temp file for {}", physical.display()))?;

        tmp.write_all(contents.as_bytes())
            .with_context(|| format!("write {}", physical.display()))?;
        tmp.as_file()
            .sync_all()
            .with_context(|| format!("sync {}", physical.display()))?;
        tmp.persist(&physical)
            .map_err(|err| anyhow::anyhow!("persist {}: {}", physical.display(), err))?;
        Ok(())
    }

    fn remove(&self, path: &Path) -> Result<bool> {
        let physical = self.paths.physical(path);
        match fs::remove_file(&physical) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e).with_context(|| format!("remove {}", physical.display())),
        }
    }

    fn link(&self, target: &Path, link: &Path) -> Result<()> {
        let physical = self.paths.physical(link);
        if let Ok(current) = fs::read_link(&physical) {
            if current == target {
                return Ok(());
            }
        }
        if fs::symlink_metadata(&physical).is_ok() {
            fs::remove_file(&physical)
                .with_context(|| format!("remove stale {}", physical.display()))?;
        }
        if let Some(parent) = physical.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create dir {}", parent.display()))?;
        }
        #[cfg(unix)]
        std::os::unix::fs::symlink(target, &physical).with_context(|| {
            format!("link {} -> {}", physical.display(), target.display())
        })?;
        Ok(())
    }

    fn ensure_dir(&self, path: &Path, mode: u32) -> Result<()> {
        host_fs::ensure_dir(&self.paths.physical(path), mode)
    }

    fn exists(&self, path: &Path) -> bool {
        fs::symlink_metadata(self.paths.physical(path)).is_ok()
    }

    fn mode(&self, path: &Path) -> Result<Option<u32>> {
        host_fs::mode(&self.paths.physical(path))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemoryEntry {
    File { contents: String, mode: u32 },
    Link(PathBuf),
}

#[derive(Debug, Default)]
struct MemoryState {
    entries: BTreeMap<PathBuf, MemoryEntry>,
    dirs: BTreeMap<PathBuf, u32>,
    failing: BTreeSet<PathBuf>,
    writes: Vec<PathBuf>,
}

/// In-memory store. Clones share state, so a test can keep a handle while
/// the pipeline owns another.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Rc<RefCell<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a file without recording it as a write.
    pub fn insert(&self, path: impl Into<PathBuf>, contents: &str, mode: u32) {
        self.state.borrow_mut().entries.insert(
            path.into(),
            MemoryEntry::File {
                contents: contents.to_string(),
                mode,
            },
        );
    }

    pub fn get(&self, path: &Path) -> Option<MemoryEntry> {
        self.state.borrow().entries.get(path).cloned()
    }

    pub fn contents(&self, path: &Path) -> Option<String> {
        match self.get(path) {
            Some(MemoryEntry::File { contents, .. }) => Some(contents),
            _ => None,
        }
    }

    /// Make every later `replace` of `path` fail.
    pub fn fail_writes_to(&self, path: impl Into<PathBuf>) {
        self.state.borrow_mut().failing.insert(path.into());
    }

    /// Paths written through `replace`, in order.
    pub fn writes(&self) -> Vec<PathBuf> {
        self.state.borrow().writes.clone()
    }

    /// Every entry, for whole-state comparisons.
    pub fn snapshot(&self) -> BTreeMap<PathBuf, MemoryEntry> {
        self.state.borrow().entries.clone()
    }
}

impl ConfigStore for MemoryStore {
    fn read(&self, path: &Path) -> Result<Option<Zeroizing<String>>> {
        Ok(self.contents(path).map(Zeroizing::new))
    }

    fn replace(&self, path: &Path, contents: &str, mode: u32) -> Result<()> {
        let mut state = self.state.borrow_mut();
        if state.failing.contains(path) {
            anyhow::bail!("write {}: injected failure", path.display());
        }
        state.writes.push(path.to_path_buf());
        state.entries.insert(
            path.to_path_buf(),
            MemoryEntry::File {
                contents: contents.to_string(),
                mode,
            },
        );
        Ok(())
    }

    fn remove(&self, path: &Path) -> Result<bool> {
        Ok(self.state.borrow_mut().entries.remove(path).is_some())
    }

    fn link(&self, target: &Path, link: &Path) -> Result<()> {
        self.state
            .borrow_mut()
            .entries
            .insert(link.to_path_buf(), MemoryEntry::Link(target.to_path_buf()));
        Ok(())
    }

    fn ensure_dir(&self, path: &Path, mode: u32) -> Result<()> {
        self.state.borrow_mut().dirs.insert(path.to_path_buf(), mode);
        Ok(())
    }

    fn exists(&self, path: &Path) -> bool {
        let state = self.state.borrow();
        state.entries.contains_key(path) || state.dirs.contains_key(path)
    }

    fn mode(&self, path: &Path) -> Result<Option<u32>> {
        let state = self.state.borrow();
        Ok(match state.entries.get(path) {
            Some(MemoryEntry::File { mode, .. }) => Some(*mode),
            Some(MemoryEntry::Link(_)) => Some(0o777),
            None => state.dirs.get(path).copied(),
        })
    }
}
