use anyhow::anyhow;
use tracing::warn;

use sift_common::{FileIdx, ModuleAlias, ModuleFile};
use sift_error::BuildResult;
use sift_sourcemap::concat_source_maps;

use super::{fold_path, ImportScanner};

impl ImportScanner {
  /// Seed insertion with the collision policy: an implicit placeholder
  /// yields to an explicit file, and two explicit files with the same
  /// case-folded path are concatenated.
  pub(crate) fn insert_input_file(&mut self, file: ModuleFile) -> BuildResult<()> {
    let key = fold_path(&file.abs_path);
    let Some(&existing_idx) = self.abs_path_to_file.get(&key) else {
      self.insert_file(file);
      return Ok(());
    };

    let existing = &mut self.files[existing_idx];
    if existing.implicit && !file.implicit {
      let previous_status = existing.imported;
      *existing = file;
      existing.promote_imported(previous_status);
      Ok(())
    } else if !existing.implicit && file.implicit {
      // The explicit file was contributed first; the placeholder is moot.
      Ok(())
    } else {
      Self::combine_files(existing, file)
    }
  }

  /// Two plugin contributions for the same path are concatenated with their
  /// source maps merged. Mixing `lazy` or `bare` flags is a plugin bug and
  /// fails the build with both bodies attached for inspection.
  fn combine_files(existing: &mut ModuleFile, fresh: ModuleFile) -> BuildResult<()> {
    if existing.lazy != fresh.lazy || existing.bare != fresh.bare {
      return Err(
        anyhow!(
          "cannot combine files for {}: lazy {} vs {}, bare {} vs {}\n--- first body ---\n{}\n--- second body ---\n{}",
          existing.abs_path.display(),
          existing.lazy,
          fresh.lazy,
          existing.bare,
          fresh.bare,
          existing.data_string,
          fresh.data_string,
        )
        .into(),
      );
    }

    let combined_map = match concat_source_maps(
      &existing.data_string,
      existing.source_map.as_deref(),
      fresh.source_map.as_deref(),
    ) {
      Ok(map) => map,
      Err(err) => {
        warn!(path = %existing.abs_path.display(), %err, "dropping unmergeable source map");
        None
      }
    };

    let body = format!("{}\n\n{}", existing.data_string, fresh.data_string);
    existing.set_data_string(body);
    existing.source_map = combined_map;
    existing.imported = existing.imported.join(fresh.imported);
    existing.implicit = existing.implicit && fresh.implicit;
    existing.deps = None;
    existing.pending_errors.extend(fresh.pending_errors);
    Ok(())
  }

  /// Files sharing a realpath collapse into one container (preferring a
  /// `/node_modules/` id) plus aliases. Statuses are aligned to the group
  /// maximum first so a static alias never points at a dynamic container.
  pub(crate) fn coalesce_realpaths(&mut self) {
    let groups: Vec<Vec<FileIdx>> =
      self.real_path_to_files.values().filter(|group| group.len() > 1).cloned().collect();

    for group in groups {
      let max_status =
        group.iter().map(|&idx| self.files[idx].imported).max().unwrap_or_default();
      for &idx in &group {
        self.files[idx].promote_imported(max_status);
      }

      let container = group
        .iter()
        .copied()
        .find(|&idx| {
          self.files[idx]
            .abs_module_id
            .as_deref()
            .is_some_and(|id| id.starts_with("/node_modules/"))
        })
        .unwrap_or(group[0]);

      let container_id = self.files[container].abs_module_id.clone();
      let container_path = self.files[container].abs_path.clone();
      for &idx in &group {
        if idx != container && self.files[idx].alias.is_none() {
          self.files[idx].alias = Some(ModuleAlias {
            abs_module_id: container_id.clone(),
            path: Some(container_path.clone()),
          });
        }
      }
    }
  }
}
