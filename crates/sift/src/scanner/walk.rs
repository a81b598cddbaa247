use std::borrow::Cow;
use std::path::Path;

use tracing::debug;

use sift_common::{FileIdx, FileType, ImportInfo, ImportedStatus, ModuleAlias, ModuleFile};
use sift_error::SourceLocation;
use sift_resolver::{AliasResolution, Resolution};
use sift_utils::indexmap::FxIndexMap;
use sift_utils::path_ext::{relative_path, PathExt};

use super::ImportScanner;

impl ImportScanner {
  /// Recursive walk entry. Re-walks a dynamically reached file when a
  /// static edge arrives later, so the stronger status propagates.
  pub(crate) fn scan_file(&mut self, idx: FileIdx, for_dynamic: bool) {
    {
      let file = &self.files[idx];
      if file.imported == ImportedStatus::Static {
        return;
      }
      if for_dynamic && file.imported == ImportedStatus::Dynamic {
        return;
      }
    }
    self.files[idx].promote_imported(ImportedStatus::for_dynamic(for_dynamic));

    if !self.files[idx].pending_errors.is_empty() {
      // Deferred so uncalled modules do not pollute the diagnostics.
      let pending = std::mem::take(&mut self.files[idx].pending_errors);
      for message in pending {
        self.sink.error(&message.message, message.location);
      }
      self.files[idx].has_errors = true;
      return;
    }

    if self.files[idx].deps.is_none() {
      let extraction =
        self.transcoders.find_imported_module_identifiers(&self.files[idx].data_string);
      match extraction {
        Ok(found) => {
          let parent = self.files[idx].abs_path.clone();
          let mut deps = FxIndexMap::default();
          for (specifier, import) in found {
            // parent_was_dynamic is walk state, not edge state; it is only
            // stamped onto recorded missing-module infos. A later static
            // re-walk of this file must see its edges unprejudiced.
            deps.insert(
              specifier,
              ImportInfo {
                parent_path: Some(parent.clone()),
                dynamic: import.dynamic,
                parent_was_dynamic: false,
                possibly_spurious: import.possibly_spurious,
                helpers: FxIndexMap::default(),
              },
            );
          }
          self.files[idx].deps = Some(deps);
        }
        Err(parse) => {
          let file = self.files[idx].source_path.to_slash_string();
          self.sink.error(
            &parse.message,
            Some(SourceLocation { file, line: parse.line, column: parse.column }),
          );
          self.files[idx].deps = Some(FxIndexMap::default());
          return;
        }
      }
    }

    let parent_path = self.files[idx].abs_path.clone();
    let deps: Vec<(String, ImportInfo)> = self.files[idx]
      .deps
      .as_ref()
      .map(|deps| deps.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
      .unwrap_or_default();

    for (specifier, info) in deps {
      self.process_dep(Some(idx), &parent_path, &specifier, &info, for_dynamic);
    }
  }

  /// One dependency edge, from either a real file (`owner`) or a synthetic
  /// missing-module root (`owner == None`).
  pub(crate) fn process_dep(
    &mut self,
    owner: Option<FileIdx>,
    parent_path: &Path,
    specifier: &str,
    info: &ImportInfo,
    parent_dynamic: bool,
  ) {
    // Dynamic mode only means something on browser arches; the server
    // loads everything eagerly regardless.
    let dynamic = self.options.bundle_arch.is_web()
      && (parent_dynamic || info.parent_was_dynamic || info.dynamic);

    let mut effective: Cow<str> = Cow::from(specifier);
    if self.resolver.is_native(specifier) {
      if self.options.bundle_arch.is_server() {
        // Built-ins are delegated to the host loader on the server.
        return;
      }
      effective = Cow::from(self.resolver.native_stub_id(specifier));
    }

    match self.resolve_specifier(&effective, parent_path) {
      Resolution::Missing => self.record_missing(owner, specifier, info, dynamic),
      Resolution::Alias(alias) => {
        self.record_helpers(owner, specifier, &alias.package_json_map, dynamic);
        self.follow_alias(&alias, dynamic);
      }
      Resolution::Resolved(resolved) => {
        self.record_helpers(owner, specifier, &resolved.package_json_map, dynamic);
        self.scan_resolved(&resolved.abs_path, dynamic);
      }
    }
  }

  /// Unresolved edge. Spurious or not it is recorded; the caller decides
  /// which misses are worth surfacing. The recorded info carries the walk's
  /// dynamicness so a re-entry can reproduce the right flavor.
  fn record_missing(
    &mut self,
    owner: Option<FileIdx>,
    specifier: &str,
    info: &ImportInfo,
    dynamic: bool,
  ) {
    debug!(specifier, spurious = info.possibly_spurious, "unresolved import");
    let mut recorded = info.clone();
    recorded.parent_was_dynamic =
      recorded.parent_was_dynamic || (dynamic && !recorded.dynamic);

    if let Some(owner_idx) = owner {
      ImportInfo::merge_into(
        self.files[owner_idx].missing_modules.entry(specifier.to_string()).or_default(),
        vec![recorded.clone()],
      );
    }
    ImportInfo::merge_into(
      self.all_missing_modules.entry(specifier.to_string()).or_default(),
      vec![recorded],
    );
  }

  /// Emit every `package.json` consulted during resolution as an implicit
  /// helper file and record it on the importing edge.
  fn record_helpers(
    &mut self,
    owner: Option<FileIdx>,
    specifier: &str,
    package_json_map: &sift_resolver::PackageJsonMap,
    dynamic: bool,
  ) {
    for (pkg_path, manifest) in package_json_map {
      let Some(helper_idx) = self.add_package_json_file(pkg_path, manifest) else {
        continue;
      };
      if let Some(owner_idx) = owner {
        if let Some(helper_id) = self.files[helper_idx].abs_module_id.clone() {
          if let Some(dep) =
            self.files[owner_idx].deps.as_mut().and_then(|deps| deps.get_mut(specifier))
          {
            dep.helpers.insert(helper_id.to_string(), dynamic);
          }
        }
      }
      self.scan_file(helper_idx, dynamic);
    }
  }

  fn scan_resolved(&mut self, abs_path: &Path, dynamic: bool) {
    if let Some(dep_idx) = self.lookup(abs_path) {
      self.maybe_upgrade_package_json_stub(dep_idx, abs_path);
      self.scan_file(dep_idx, dynamic);
      return;
    }
    if let Some(new_idx) = self.read_dep_file(abs_path) {
      self.scan_file(new_idx, dynamic);
    }
  }

  /// A browser-field override: the file at the alias source becomes an
  /// aliasing module, and the walk continues into the target.
  fn follow_alias(&mut self, alias: &AliasResolution, dynamic: bool) {
    let record = ModuleAlias {
      abs_module_id: alias.target.as_deref().and_then(|t| self.policy.abs_module_id(t)),
      path: alias.target.clone(),
    };

    let alias_idx = match self.lookup(&alias.source_path) {
      Some(idx) => {
        self.files[idx].alias = Some(record);
        Some(idx)
      }
      None => self.policy.abs_module_id(&alias.source_path).map(|id| {
        let source_path = relative_path(&self.options.source_root, &alias.source_path);
        let mut file =
          ModuleFile::new(alias.source_path.clone(), source_path, FileType::Js);
        file.set_data_string("");
        file.deps = Some(FxIndexMap::default());
        file.implicit = true;
        file.abs_module_id = Some(id);
        file.alias = Some(record);
        self.insert_file(file)
      }),
    };

    if let Some(idx) = alias_idx {
      self.scan_file(idx, dynamic);
    }
    if let Some(target) = &alias.target {
      self.scan_resolved(target, dynamic);
    }
  }
}
