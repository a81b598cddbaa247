use std::io;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStat {
  pub is_file: bool,
  pub is_directory: bool,
  pub is_symlink: bool,
}

impl FileStat {
  pub fn file() -> Self {
    Self { is_file: true, is_directory: false, is_symlink: false }
  }

  pub fn directory() -> Self {
    Self { is_file: false, is_directory: true, is_symlink: false }
  }

  pub fn symlink() -> Self {
    Self { is_file: false, is_directory: false, is_symlink: true }
  }
}

/// The optimistic I/O surface the scanner consumes. Implementations are
/// expected to memoize and reuse results internally; the scanner treats
/// every call as atomic.
pub trait FileSystem: Send + Sync {
  fn read(&self, path: &Path) -> io::Result<Vec<u8>>;

  fn read_to_string(&self, path: &Path) -> io::Result<String> {
    let bytes = self.read(path)?;
    String::from_utf8(bytes)
      .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))
  }

  /// Stat following symlinks; `None` when the path does not exist.
  fn stat(&self, path: &Path) -> Option<FileStat>;

  /// Stat without following a final symlink.
  fn lstat(&self, path: &Path) -> Option<FileStat>;

  /// Canonical path with all symlinks resolved; `None` when it cannot be
  /// computed.
  fn realpath(&self, path: &Path) -> Option<PathBuf>;

  /// SHA-1 hex digest of the file contents; `None` when unreadable.
  fn hash(&self, path: &Path) -> Option<String> {
    self.read(path).ok().map(|bytes| sift_utils::hash::sha1_hex(&bytes))
  }

  /// Durable write via tmp + rename. A crash mid-write must never leave a
  /// partial file at `path`.
  fn write_file_atomically(&self, path: &Path, data: &[u8]) -> io::Result<()>;

  /// Policy gate for the watch set.
  fn should_watch(&self, path: &Path) -> bool;
}
