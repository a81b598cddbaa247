use std::path::Path;

use tracing::debug;

use sift_common::{FileIdx, FileType, ModuleFile, PackageManifest};
use sift_utils::indexmap::FxIndexMap;
use sift_utils::path_ext::relative_path;

use crate::handlers::json_to_common_js;

use super::ImportScanner;

impl ImportScanner {
  /// Load a resolved dependency from disk (or reuse bytes already loaded
  /// through another logical path with the same realpath). `None` means the
  /// file cannot be part of this bundle; the caller just moves on.
  pub(crate) fn read_dep_file(&mut self, abs_path: &Path) -> Option<FileIdx> {
    let abs_module_id = self.policy.abs_module_id(abs_path)?;
    let real = self.realpaths.realpath(abs_path);
    let source_path = relative_path(&self.options.source_root, abs_path);

    // TODO: derive this from the handler that produced the body; the
    // downstream bundler currently distinguishes by content, not by type.
    let mut file = ModuleFile::new(abs_path.to_path_buf(), source_path, FileType::Js);
    file.abs_module_id = Some(abs_module_id.clone());

    let reused = self.real_path_to_files.get(&real).and_then(|group| group.first().copied());

    if let Some(existing_idx) = reused {
      // A symlinked package compiled as application code is reached again
      // through node_modules: same bytes, second logical path.
      let existing = &self.files[existing_idx];
      file.data = existing.data.clone();
      file.data_string = existing.data_string.clone();
      file.hash = existing.hash.clone();
    } else if self.policy.should_use_node(&abs_module_id) {
      // Host-loader delegation; empty deps so the walk stops here.
      file.set_data_string("module.useNode();\n");
      file.deps = Some(FxIndexMap::default());
    } else if abs_path.file_name().is_some_and(|name| name == "package.json") {
      let bytes = match self.fs.read(abs_path) {
        Ok(bytes) => bytes,
        Err(err) => {
          debug!(path = %abs_path.display(), %err, "unreadable package.json");
          return None;
        }
      };
      let manifest = match PackageManifest::parse(abs_path, &bytes) {
        Ok(manifest) => manifest,
        Err(err) => {
          self.report_file_error(&file.source_path, &err);
          return None;
        }
      };
      file.set_data_string(json_to_common_js(&manifest.raw));
      file.json_data = Some(manifest.raw);
    } else if abs_path.extension().is_some_and(|ext| ext == "node") {
      let message = if self.options.bundle_arch.is_web() {
        format!(
          "cannot load native module {} on architecture {}",
          file.source_path.display(),
          self.options.bundle_arch
        )
      } else {
        format!(
          "native module {} must be loaded by the host node runtime",
          file.source_path.display()
        )
      };
      file.set_data_string(format!(
        "throw new Error({});\n",
        serde_json::Value::String(message)
      ));
      file.deps = Some(FxIndexMap::default());
    } else {
      let raw = match self.fs.read_to_string(abs_path) {
        Ok(raw) => raw,
        Err(err) => {
          debug!(path = %abs_path.display(), %err, "unreadable dependency");
          return None;
        }
      };
      let extension = abs_path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
      match self.handlers.handle(abs_path, &extension, &raw) {
        Ok(Some(handled)) => {
          file.set_data_string(handled.data_string);
          file.json_data = handled.json_data;
        }
        Ok(None) => return None,
        Err(err) => {
          self.report_file_error(&file.source_path, &err);
          return None;
        }
      }
    }

    if self.fs.should_watch(abs_path) {
      self.watch_set.add_file(abs_path, self.fs.hash(abs_path));
    }

    file.lazy = true;
    Some(self.insert_file(file))
  }

  /// Emit the manifest consulted during resolution as an implicit helper
  /// file carrying only its resolution-relevant subset.
  pub(crate) fn add_package_json_file(
    &mut self,
    pkg_path: &Path,
    manifest: &PackageManifest,
  ) -> Option<FileIdx> {
    if let Some(idx) = self.lookup(pkg_path) {
      return Some(idx);
    }
    let abs_module_id = self.policy.abs_module_id(pkg_path)?;
    let source_path = relative_path(&self.options.source_root, pkg_path);

    // Synthesized rather than dep-loaded, so the unconditional js type
    // default of read_dep_file does not apply here.
    let mut file = ModuleFile::new(pkg_path.to_path_buf(), source_path, FileType::Json);
    let view = manifest.resolution_view();
    file.set_data_string(json_to_common_js(&view));
    file.json_data = Some(view);
    file.implicit = true;
    file.deps = Some(FxIndexMap::default());
    file.abs_module_id = Some(abs_module_id);

    if self.fs.should_watch(pkg_path) {
      self.watch_set.add_file(pkg_path, self.fs.hash(pkg_path));
    }

    Some(self.insert_file(file))
  }

  /// A direct import of a manifest that was previously emitted as an
  /// implicit stub upgrades it to the full parsed document.
  pub(crate) fn maybe_upgrade_package_json_stub(&mut self, idx: FileIdx, abs_path: &Path) {
    if !self.files[idx].implicit
      || !abs_path.file_name().is_some_and(|name| name == "package.json")
    {
      return;
    }
    let Ok(bytes) = self.fs.read(abs_path) else {
      return;
    };
    let Ok(manifest) = PackageManifest::parse(abs_path, &bytes) else {
      return;
    };
    let file = &mut self.files[idx];
    file.set_data_string(json_to_common_js(&manifest.raw));
    file.json_data = Some(manifest.raw);
    file.implicit = false;
  }
}
