use std::path::PathBuf;

use sift_utils::indexmap::FxIndexMap;

/// One dependency edge, keyed by import specifier on the importing file.
#[derive(Debug, Clone, Default)]
pub struct ImportInfo {
  /// Absolute path of the importer. `None` for seed roots.
  pub parent_path: Option<PathBuf>,
  /// The importer used a dynamic-import construct for this edge.
  pub dynamic: bool,
  /// The importer itself was only reached dynamically; dynamic semantics
  /// propagate transitively through this flag.
  pub parent_was_dynamic: bool,
  /// The extractor may have picked this specifier up from a branch that is
  /// never taken. Unresolved spurious imports must not hard-fail the build.
  pub possibly_spurious: bool,
  /// Implicit helper modules (typically `package.json` manifests consulted
  /// during resolution), mapped to whether they were reached dynamically.
  pub helpers: FxIndexMap<String, bool>,
}

impl ImportInfo {
  /// Merge `incoming` into `list`. Entries are deduplicated by
  /// `parent_path` with the later entry winning; entries without a parent
  /// (seed roots) are appended without deduplication.
  pub fn merge_into(list: &mut Vec<ImportInfo>, incoming: Vec<ImportInfo>) {
    for info in incoming {
      match &info.parent_path {
        None => list.push(info),
        Some(parent) => {
          if let Some(slot) =
            list.iter_mut().find(|i| i.parent_path.as_ref() == Some(parent))
          {
            *slot = info;
          } else {
            list.push(info);
          }
        }
      }
    }
  }
}
