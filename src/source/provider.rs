//! Where source text comes from.
//!
//! The source table only needs two things from the outside world: whether a
//! path names an existing file (and under which canonical name), and the
//! file's contents. [`FileSystem`] answers from disk; [`InMemory`] answers from
//! a map and is what tests and embedders use.

use std::{
    collections::BTreeMap,
    fs, io,
    path::{Component, Path, PathBuf},
};

pub trait SourceProvider {
    /// Canonical path of an existing file, or `None` if there is no such file.
    fn locate(&self, path: &Path) -> Option<PathBuf>;

    fn read(&self, path: &Path) -> io::Result<String>;
}

impl<P: SourceProvider + ?Sized> SourceProvider for &P {
    fn locate(&self, path: &Path) -> Option<PathBuf> {
        (**self).locate(path)
    }

    fn read(&self, path: &Path) -> io::Result<String> {
        (**self).read(path)
    }
}

/// Reads units from disk. Canonical paths come from `fs::canonicalize`, so
/// symlinked or `..`-laden spellings of one file collapse to a single unit.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileSystem;

impl SourceProvider for FileSystem {
    fn locate(&self, path: &Path) -> Option<PathBuf> {
        fs::canonicalize(path).ok().filter(|p| p.is_file())
    }

    fn read(&self, path: &Path) -> io::Result<String> {
        fs::read_to_string(path)
    }
}

/// In-memory file set keyed by absolute, lexically normalized paths.
#[derive(Debug, Clone, Default)]
pub struct InMemory {
    files: BTreeMap<PathBuf, String>,
}

impl InMemory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(mut self, path: impl AsRef<Path>, text: impl Into<String>) -> Self {
        self.insert(path, text);
        self
    }

    pub fn insert(&mut self, path: impl AsRef<Path>, text: impl Into<String>) {
        self.files.insert(normalize(path.as_ref()), text.into());
    }
}

impl SourceProvider for InMemory {
    fn locate(&self, path: &Path) -> Option<PathBuf> {
        let path = normalize(path);
        self.files.contains_key(&path).then_some(path)
    }

    fn read(&self, path: &Path) -> io::Result<String> {
        self.files.get(&normalize(path)).cloned().ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, format!("{} is not loaded", path.display()))
        })
    }
}

/// Resolves `.` and `..` without touching the filesystem. Relative paths are
/// anchored at `/`.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::from("/");
    for component in path.components() {
        match component {
            Component::ParentDir => {
                out.pop();
            }
            Component::Normal(part) => out.push(part),
            Component::CurDir | Component::RootDir | Component::Prefix(_) => {}
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_memory_paths_are_normalized() {
        let files = InMemory::new().with_file("/lib/io.stk", "1");
        assert_eq!(
            files.locate(Path::new("/app/../lib/./io.stk")),
            Some(PathBuf::from("/lib/io.stk"))
        );
        assert!(files.locate(Path::new("/lib/missing.stk")).is_none());
        assert_eq!(files.read(Path::new("lib/io.stk")).unwrap(), "1");
    }
}
