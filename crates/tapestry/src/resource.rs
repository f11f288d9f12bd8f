//! Reading and writing scripts and generated files.
//!
//! Paths are `/`-separated and relative to the collaborator's root.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

pub trait Resources: Send + Sync {
    fn read(&self, path: &str) -> io::Result<String>;

    /// Create or replace `path`, creating missing directories.
    fn write(&self, path: &str, content: &str) -> io::Result<()>;

    fn append(&self, path: &str, content: &str) -> io::Result<()>;

    fn exists(&self, path: &str) -> bool;

    /// Paths of the files in the directory holding `path`, `path` included
    /// when it exists.
    fn siblings(&self, path: &str) -> io::Result<Vec<String>>;
}

/// Directory part of `path`, empty at the root.
pub fn parent_dir(path: &str) -> &str {
    path.rfind('/').map_or("", |i| &path[..i])
}

/// `dir/name`, or `name` when `dir` is empty.
pub fn join(dir: &str, name: &str) -> String {
    if dir.is_empty() {
        name.to_string()
    } else {
        format!("{dir}/{name}")
    }
}

// ============================================================================
// Filesystem
// ============================================================================

/// Resources below a directory of the filesystem. Paths escaping the root
/// are rejected.
pub struct FsResources {
    root: PathBuf,
}

impl FsResources {
    pub fn new(root: impl AsRef<Path>) -> io::Result<Self> {
        Ok(Self {
            root: root.as_ref().canonicalize()?,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> io::Result<PathBuf> {
        let mut resolved = self.root.clone();
        for segment in path.split('/').filter(|s| !s.is_empty() && *s != ".") {
            if segment == ".." || segment.contains('\\') || segment.contains(':') {
                return Err(traversal(path));
            }
            resolved.push(segment);
        }
        self.ensure_within_root(&resolved, path)?;
        Ok(resolved)
    }

    /// Symlinks may still lead outside; check the canonical form of the
    /// longest existing prefix.
    fn ensure_within_root(&self, path: &Path, original: &str) -> io::Result<()> {
        let (existing, missing) = split_existing_parent(path);
        let mut candidate = existing.canonicalize()?;
        for segment in missing {
            candidate.push(segment);
        }
        if candidate.starts_with(&self.root) {
            Ok(())
        } else {
            Err(traversal(original))
        }
    }
}

fn traversal(path: &str) -> io::Error {
    io::Error::new(
        io::ErrorKind::PermissionDenied,
        format!("path escapes the resource root: {path}"),
    )
}

fn split_existing_parent(path: &Path) -> (PathBuf, Vec<String>) {
    let mut cursor = path.to_path_buf();
    let mut missing = Vec::new();
    while !cursor.exists() {
        let Some(name) = cursor.file_name().and_then(|s| s.to_str()) else {
            break;
        };
        missing.push(name.to_string());
        let Some(parent) = cursor.parent() else {
            break;
        };
        cursor = parent.to_path_buf();
    }
    missing.reverse();
    (cursor, missing)
}

impl Resources for FsResources {
    fn read(&self, path: &str) -> io::Result<String> {
        fs::read_to_string(self.resolve(path)?)
    }

    fn write(&self, path: &str, content: &str) -> io::Result<()> {
        let target = self.resolve(path)?;
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(target, content)
    }

    fn append(&self, path: &str, content: &str) -> io::Result<()> {
        use std::io::Write;

        let target = self.resolve(path)?;
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = fs::OpenOptions::new().create(true).append(true).open(target)?;
        file.write_all(content.as_bytes())
    }

    fn exists(&self, path: &str) -> bool {
        self.resolve(path).map(|p| p.is_file()).unwrap_or(false)
    }

    fn siblings(&self, path: &str) -> io::Result<Vec<String>> {
        let dir = parent_dir(path);
        let mut out = Vec::new();
        for entry in fs::read_dir(self.resolve(dir)?)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                out.push(join(dir, name));
            }
        }
        out.sort();
        Ok(out)
    }
}

// ============================================================================
// Memory
// ============================================================================

/// Resources held in memory, for tests and previews.
#[derive(Debug, Default)]
pub struct MemoryResources {
    files: Mutex<BTreeMap<String, String>>,
}

impl MemoryResources {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(self, path: &str, content: &str) -> Self {
        self.files.lock().insert(normalize(path), content.to_string());
        self
    }

    /// Snapshot of every file.
    pub fn files(&self) -> BTreeMap<String, String> {
        self.files.lock().clone()
    }
}

fn normalize(path: &str) -> String {
    path.split('/')
        .filter(|s| !s.is_empty() && *s != ".")
        .collect::<Vec<_>>()
        .join("/")
}

fn not_found(path: &str) -> io::Error {
    io::Error::new(io::ErrorKind::NotFound, format!("no such resource: {path}"))
}

impl Resources for MemoryResources {
    fn read(&self, path: &str) -> io::Result<String> {
        self.files
            .lock()
            .get(&normalize(path))
            .cloned()
            .ok_or_else(|| not_found(path))
    }

    fn write(&self, path: &str, content: &str) -> io::Result<()> {
        self.files.lock().insert(normalize(path), content.to_string());
        Ok(())
    }

    fn append(&self, path: &str, content: &str) -> io::Result<()> {
        self.files
            .lock()
            .entry(normalize(path))
            .or_default()
            .push_str(content);
        Ok(())
    }

    fn exists(&self, path: &str) -> bool {
        self.files.lock().contains_key(&normalize(path))
    }

    fn siblings(&self, path: &str) -> io::Result<Vec<String>> {
        let path = normalize(path);
        let dir = parent_dir(&path);
        Ok(self
            .files
            .lock()
            .keys()
            .filter(|key| parent_dir(key) == dir)
            .cloned()
            .collect())
    }
}
