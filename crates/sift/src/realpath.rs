use std::path::{Path, PathBuf};
use std::sync::Arc;

use rustc_hash::FxHashMap;

use sift_fs::FileSystem;

/// Memoized realpath with a cheap fast path: the expensive realpath lookup
/// only runs when some component of the path is actually a symlink.
pub struct RealpathCache {
  fs: Arc<dyn FileSystem>,
  source_root: PathBuf,
  cache: FxHashMap<PathBuf, PathBuf>,
}

impl RealpathCache {
  pub fn new(fs: Arc<dyn FileSystem>, source_root: PathBuf) -> Self {
    Self { fs, source_root, cache: FxHashMap::default() }
  }

  pub fn realpath(&mut self, abs_path: &Path) -> PathBuf {
    if let Some(cached) = self.cache.get(abs_path) {
      return cached.clone();
    }
    let real = self.compute(abs_path);
    self.cache.insert(abs_path.to_path_buf(), real.clone());
    real
  }

  fn compute(&self, abs_path: &Path) -> PathBuf {
    // Paths outside the source root are treated as already real.
    let Ok(rel) = abs_path.strip_prefix(&self.source_root) else {
      return abs_path.to_path_buf();
    };

    let mut current = self.source_root.clone();
    for component in rel.components() {
      current.push(component);
      if self.fs.lstat(&current).is_some_and(|stat| stat.is_symlink) {
        return self.fs.realpath(abs_path).unwrap_or_else(|| abs_path.to_path_buf());
      }
    }
    abs_path.to_path_buf()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use sift_fs::MemoryFileSystem;

  #[test]
  fn symlinked_components_trigger_full_resolution() {
    let fs = Arc::new(MemoryFileSystem::new());
    fs.add_file("/app/imports/x/index.js", "");
    fs.add_symlink("/app/node_modules/x", "../imports/x");
    fs.add_file("/app/main.js", "");

    let mut cache = RealpathCache::new(fs, PathBuf::from("/app"));
    assert_eq!(
      cache.realpath(Path::new("/app/node_modules/x/index.js")),
      PathBuf::from("/app/imports/x/index.js")
    );
    // No symlink anywhere: the input is its own realpath.
    assert_eq!(cache.realpath(Path::new("/app/main.js")), PathBuf::from("/app/main.js"));
    // Outside the source root nothing is probed.
    assert_eq!(cache.realpath(Path::new("/other/y.js")), PathBuf::from("/other/y.js"));
  }
}
