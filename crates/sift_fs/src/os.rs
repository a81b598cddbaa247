use std::fs;
use std::io::{self, Write};
use std::path::{Component, Path, PathBuf};
use std::time::SystemTime;

use dashmap::DashMap;

use crate::file_system::{FileStat, FileSystem};

/// Real filesystem with optimistic memoization: reads and hashes are cached
/// keyed by path and invalidated when the mtime moves.
#[derive(Debug, Default)]
pub struct OsFileSystem {
  read_cache: DashMap<PathBuf, (SystemTime, Vec<u8>)>,
  hash_cache: DashMap<PathBuf, (SystemTime, String)>,
}

impl OsFileSystem {
  pub fn new() -> Self {
    Self::default()
  }

  fn mtime(path: &Path) -> Option<SystemTime> {
    fs::metadata(path).and_then(|meta| meta.modified()).ok()
  }
}

impl FileSystem for OsFileSystem {
  fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
    let mtime = Self::mtime(path);
    if let (Some(mtime), Some(cached)) = (mtime, self.read_cache.get(path)) {
      if cached.0 == mtime {
        return Ok(cached.1.clone());
      }
    }

    let bytes = fs::read(path)?;
    if let Some(mtime) = mtime {
      self.read_cache.insert(path.to_path_buf(), (mtime, bytes.clone()));
    }
    Ok(bytes)
  }

  fn stat(&self, path: &Path) -> Option<FileStat> {
    let meta = fs::metadata(path).ok()?;
    Some(FileStat {
      is_file: meta.is_file(),
      is_directory: meta.is_dir(),
      is_symlink: false,
    })
  }

  fn lstat(&self, path: &Path) -> Option<FileStat> {
    let meta = fs::symlink_metadata(path).ok()?;
    Some(FileStat {
      is_file: meta.is_file(),
      is_directory: meta.is_dir(),
      is_symlink: meta.file_type().is_symlink(),
    })
  }

  fn realpath(&self, path: &Path) -> Option<PathBuf> {
    fs::canonicalize(path).ok()
  }

  fn hash(&self, path: &Path) -> Option<String> {
    let mtime = Self::mtime(path);
    if let (Some(mtime), Some(cached)) = (mtime, self.hash_cache.get(path)) {
      if cached.0 == mtime {
        return Some(cached.1.clone());
      }
    }

    let digest = sift_utils::hash::sha1_hex(&self.read(path).ok()?);
    if let Some(mtime) = mtime {
      self.hash_cache.insert(path.to_path_buf(), (mtime, digest.clone()));
    }
    Some(digest)
  }

  fn write_file_atomically(&self, path: &Path, data: &[u8]) -> io::Result<()> {
    let parent = path
      .parent()
      .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "path has no parent"))?;
    fs::create_dir_all(parent)?;

    let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
    tmp.write_all(data)?;
    tmp.persist(path).map_err(|err| err.error)?;

    self.read_cache.remove(path);
    self.hash_cache.remove(path);
    Ok(())
  }

  fn should_watch(&self, path: &Path) -> bool {
    // node_modules contents only matter for rebuilds when the package is
    // symlinked into place (a package under local development).
    let mut current = PathBuf::new();
    let mut inside_node_modules = false;
    for component in path.components() {
      current.push(component);
      if inside_node_modules {
        if let Some(stat) = self.lstat(&current) {
          if stat.is_symlink {
            return true;
          }
        }
      }
      if matches!(component, Component::Normal(name) if name == "node_modules") {
        inside_node_modules = true;
      }
    }
    !inside_node_modules
  }
}
