/// How a file has been reached so far. The order matters: a file may only be
/// promoted over the lifetime of a scan, never demoted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum ImportedStatus {
  #[default]
  None,
  Dynamic,
  Static,
}

impl ImportedStatus {
  pub fn for_dynamic(dynamic: bool) -> Self {
    if dynamic {
      Self::Dynamic
    } else {
      Self::Static
    }
  }

  /// Least upper bound of two statuses.
  #[must_use]
  pub fn join(self, other: Self) -> Self {
    self.max(other)
  }

  #[inline]
  pub fn is_imported(self) -> bool {
    !matches!(self, Self::None)
  }
}

#[test]
fn test_status_order_and_join() {
  use ImportedStatus::{Dynamic, None, Static};

  assert!(None < Dynamic);
  assert!(Dynamic < Static);
  assert_eq!(Static.join(Dynamic), Static);
  assert_eq!(None.join(Dynamic), Dynamic);
  assert_eq!(Dynamic.join(Dynamic), Dynamic);
  assert!(!None.is_imported());
  assert!(Dynamic.is_imported());
}
