//! Host file system contract.
//!
//! The engine core never touches `std::fs` directly; everything goes through
//! this trait so shader sources, compiled binaries and assets can come from
//! any mounted storage.

use fxhash::FxHashMap;
use std::cell::RefCell;
use std::path::PathBuf;

pub trait Vfs {
    fn read(&self, path: &str) -> Option<Vec<u8>>;
    fn write(&self, path: &str, data: &[u8]) -> bool;
    fn exists(&self, path: &str) -> bool;
    fn remove(&self, path: &str) -> bool;

    fn read_to_string(&self, path: &str) -> Option<String> {
        self.read(path)
            .and_then(|data| String::from_utf8(data).ok())
    }
}

/// In-memory file system, used by tests and tooling.
#[derive(Default)]
pub struct MemoryVfs {
    files: RefCell<FxHashMap<String, Vec<u8>>>,
}

impl MemoryVfs {
    pub fn new() -> MemoryVfs {
        MemoryVfs::default()
    }

    pub fn with_file(self, path: &str, data: &[u8]) -> MemoryVfs {
        self.files
            .borrow_mut()
            .insert(path.to_string(), data.to_vec());
        self
    }
}

impl Vfs for MemoryVfs {
    fn read(&self, path: &str) -> Option<Vec<u8>> {
        self.files.borrow().get(path).cloned()
    }
    fn write(&self, path: &str, data: &[u8]) -> bool {
        self.files
            .borrow_mut()
            .insert(path.to_string(), data.to_vec());
        true
    }
    fn exists(&self, path: &str) -> bool {
        self.files.borrow().contains_key(path)
    }
    fn remove(&self, path: &str) -> bool {
        self.files.borrow_mut().remove(path).is_some()
    }
}

/// File system rooted at a host directory. Leading slashes in virtual paths
/// are relative to the root.
pub struct StdVfs {
    root: PathBuf,
}

impl StdVfs {
    pub fn new(root: impl Into<PathBuf>) -> StdVfs {
        StdVfs { root: root.into() }
    }

    fn resolve(&self, path: &str) -> PathBuf {
        self.root.join(path.trim_start_matches('/'))
    }
}

impl Vfs for StdVfs {
    fn read(&self, path: &str) -> Option<Vec<u8>> {
        std::fs::read(self.resolve(path)).ok()
    }
    fn write(&self, path: &str, data: &[u8]) -> bool {
        let resolved = self.resolve(path);
        if let Some(parent) = resolved.parent() {
            if std::fs::create_dir_all(parent).is_err() {
                return false;
            }
        }
        std::fs::write(resolved, data).is_ok()
    }
    fn exists(&self, path: &str) -> bool {
        self.resolve(path).exists()
    }
    fn remove(&self, path: &str) -> bool {
        std::fs::remove_file(self.resolve(path)).is_ok()
    }
}

/// Joins the parent directory of `file_path` with `relative`, staying in
/// virtual path space.
pub fn sibling_path(file_path: &str, relative: &str) -> String {
    match file_path.rfind('/') {
        Some(pos) => format!("{}/{}", &file_path[..pos], relative),
        None => relative.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_vfs_round_trip() {
        let vfs = MemoryVfs::new();
        assert!(!vfs.exists("/a.txt"));
        vfs.write("/a.txt", b"hello");
        assert!(vfs.exists("/a.txt"));
        assert_eq!(vfs.read_to_string("/a.txt").unwrap(), "hello");
        assert!(vfs.remove("/a.txt"));
        assert!(!vfs.exists("/a.txt"));
    }

    #[test]
    fn sibling() {
        assert_eq!(sibling_path("/shaders/a.hlsl", "b.hlsl"), "/shaders/b.hlsl");
        assert_eq!(sibling_path("a.hlsl", "b.hlsl"), "b.hlsl");
    }
}
