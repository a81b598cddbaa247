use std::path::PathBuf;

use crate::BundleArch;

/// Configuration for one scanner instance (one per architecture being
/// bundled).
#[derive(Debug, Clone)]
pub struct ScannerOptions {
  /// Empty for an application scan. A package scan reroots module ids
  /// under `node_modules/meteor/<name>/`.
  pub name: Option<String>,
  pub bundle_arch: BundleArch,
  /// Extra extensions tried during resolution, after `.js` and `.json`.
  pub extensions: Vec<String>,
  pub source_root: PathBuf,
  /// `node_modules` directories consulted for bare specifiers, in order.
  pub node_modules_paths: Vec<PathBuf>,
  /// Enables the disk-backed compile cache when set.
  pub cache_dir: Option<PathBuf>,
}

impl ScannerOptions {
  pub fn new(source_root: impl Into<PathBuf>, bundle_arch: BundleArch) -> Self {
    let source_root = source_root.into();
    Self {
      name: None,
      bundle_arch,
      extensions: Vec::new(),
      source_root: source_root.clone(),
      node_modules_paths: vec![source_root.join("node_modules")],
      cache_dir: None,
    }
  }

  /// Name with any leading `local-test:`/`local-test_` prefix removed, as
  /// used for module-id rerooting.
  pub fn stripped_name(&self) -> Option<&str> {
    self.name.as_deref().map(|name| {
      name
        .strip_prefix("local-test:")
        .or_else(|| name.strip_prefix("local-test_"))
        .unwrap_or(name)
    })
  }
}

#[test]
fn test_stripped_name() {
  let mut options = ScannerOptions::new("/app", BundleArch::new("os"));
  assert_eq!(options.stripped_name(), None);

  options.name = Some("local-test:my-package".into());
  assert_eq!(options.stripped_name(), Some("my-package"));

  options.name = Some("my-package".into());
  assert_eq!(options.stripped_name(), Some("my-package"));
}
