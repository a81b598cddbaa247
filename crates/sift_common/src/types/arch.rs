use arcstr::ArcStr;

/// Target architecture tag, e.g. `web.browser`, `web.browser.legacy`,
/// `web.cordova`, `os`, `os.linux.x86_64`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BundleArch(ArcStr);

impl BundleArch {
  pub fn new(value: impl Into<ArcStr>) -> Self {
    Self(value.into())
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }

  /// Whether this arch falls under `tag`. Matching is on dot boundaries, so
  /// `os.linux.x86_64` matches `os` but not `os.linux.x`.
  pub fn matches(&self, tag: &str) -> bool {
    self.0.as_str() == tag
      || (self.0.len() > tag.len()
        && self.0.starts_with(tag)
        && self.0.as_bytes()[tag.len()] == b'.')
  }

  pub fn is_web(&self) -> bool {
    self.matches("web")
  }

  pub fn is_server(&self) -> bool {
    self.matches("os")
  }

  /// Legacy web arches get pre-modern-syntax output from the compiler.
  pub fn is_legacy(&self) -> bool {
    self.matches("web.browser.legacy") || self.matches("web.cordova")
  }
}

impl std::fmt::Display for BundleArch {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(&self.0)
  }
}

impl From<&str> for BundleArch {
  fn from(value: &str) -> Self {
    Self::new(value)
  }
}

#[test]
fn test_arch_matching() {
  let arch = BundleArch::new("os.linux.x86_64");
  assert!(arch.is_server());
  assert!(!arch.is_web());
  assert!(arch.matches("os.linux"));
  assert!(!arch.matches("os.linux.x"));

  assert!(BundleArch::new("web.browser").is_web());
  assert!(!BundleArch::new("web.browser").is_legacy());
  assert!(BundleArch::new("web.browser.legacy").is_legacy());
  assert!(BundleArch::new("web.cordova").is_legacy());
  assert!(!BundleArch::new("weblike").is_web());
}
