use std::path::{Component, Path, PathBuf};

use sugar_path::SugarPath;

pub trait PathExt {
  fn expect_to_str(&self) -> &str;

  /// Forward-slash rendition of the path, regardless of host separator.
  fn to_slash_string(&self) -> String;
}

impl PathExt for Path {
  fn expect_to_str(&self) -> &str {
    self.to_str().unwrap_or_else(|| {
      panic!("Failed to convert {:?} to valid utf8 str", self.display());
    })
  }

  fn to_slash_string(&self) -> String {
    self
      .to_slash()
      .unwrap_or_else(|| panic!("Failed to convert {:?} to slash str", self.display()))
      .into_owned()
  }
}

/// Relative path from `base` to `target`, both absolute. Unlike
/// `Path::strip_prefix` this produces `..` components when `target` is not
/// under `base`.
pub fn relative_path(base: &Path, target: &Path) -> PathBuf {
  let base: Vec<Component> = base.components().collect();
  let target: Vec<Component> = target.components().collect();

  let shared = base.iter().zip(target.iter()).take_while(|(a, b)| a == b).count();

  let mut out = PathBuf::new();
  for _ in shared..base.len() {
    out.push("..");
  }
  for comp in &target[shared..] {
    out.push(comp);
  }
  out
}

#[test]
fn test_relative_path() {
  let rel = relative_path(Path::new("/app/client"), Path::new("/app/lib/util.js"));
  assert_eq!(rel, Path::new("../lib/util.js"));

  let rel = relative_path(Path::new("/app"), Path::new("/app/main.js"));
  assert_eq!(rel, Path::new("main.js"));
}
