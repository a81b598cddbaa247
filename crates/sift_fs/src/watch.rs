use std::path::{Path, PathBuf};

use dashmap::DashMap;

/// Files the builder depends on. Change detection over this set triggers
/// incremental rebuilds.
#[derive(Debug, Default)]
pub struct WatchSet {
  files: DashMap<PathBuf, Option<String>>,
}

impl WatchSet {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn add_file(&self, path: impl Into<PathBuf>, hash: Option<String>) {
    self.files.insert(path.into(), hash);
  }

  pub fn contains(&self, path: &Path) -> bool {
    self.files.contains_key(path)
  }

  pub fn len(&self) -> usize {
    self.files.len()
  }

  pub fn is_empty(&self) -> bool {
    self.files.is_empty()
  }
}

#[test]
fn test_watch_set_records_latest_hash() {
  let watch = WatchSet::new();
  watch.add_file("/app/a.js", Some("abc".into()));
  watch.add_file("/app/a.js", Some("def".into()));

  assert!(watch.contains(std::path::Path::new("/app/a.js")));
  assert_eq!(watch.len(), 1);
}
