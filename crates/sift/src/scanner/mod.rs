mod load;
mod merge;
#[cfg(test)]
mod tests;
mod walk;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::anyhow;
use oxc_index::IndexVec;
use rustc_hash::FxHashMap;
use sugar_path::SugarPath;
use tracing::debug;

use sift_common::{
  FileIdx, FileType, ImportInfo, InputFile, ModuleFile, ScannerOptions, Transcoders,
};
use sift_error::{BuildResult, MessageSink};
use sift_fs::{FileSystem, WatchSet};
use sift_resolver::{Resolver, ResolverContext, VirtualFileOracle};
use sift_utils::indexmap::FxIndexMap;
use sift_utils::path_ext::{relative_path, PathExt};

use crate::handlers::{CompileCache, HandlerRegistry, ParseCache};
use crate::paths::PathPolicy;
use crate::realpath::RealpathCache;

/// Result of a missing-module re-entry: what the walk added, and what it is
/// still missing that the caller had not seen before.
#[derive(Debug, Default)]
pub struct MissingModuleScan {
  pub newly_added: FxIndexMap<String, Vec<ImportInfo>>,
  pub newly_missing: FxIndexMap<String, Vec<ImportInfo>>,
}

/// Walks the module dependency graph from a seed set of input files,
/// resolving and transcoding every reachable module into a deterministic
/// output file set.
pub struct ImportScanner {
  pub(crate) options: ScannerOptions,
  pub(crate) fs: Arc<dyn FileSystem>,
  pub(crate) resolver: Arc<Resolver>,
  pub(crate) handlers: HandlerRegistry,
  pub(crate) policy: PathPolicy,
  pub(crate) realpaths: RealpathCache,
  pub(crate) watch_set: Arc<WatchSet>,
  pub(crate) sink: Arc<dyn MessageSink>,
  pub(crate) transcoders: Arc<dyn Transcoders>,
  pub(crate) files: IndexVec<FileIdx, ModuleFile>,
  /// Case-folded absolute path -> file. At most one file per key.
  pub(crate) abs_path_to_file: FxHashMap<String, FileIdx>,
  pub(crate) real_path_to_files: FxHashMap<PathBuf, Vec<FileIdx>>,
  pub(crate) all_missing_modules: FxIndexMap<String, Vec<ImportInfo>>,
}

impl ImportScanner {
  pub fn new(
    options: ScannerOptions,
    fs: Arc<dyn FileSystem>,
    watch_set: Arc<WatchSet>,
    sink: Arc<dyn MessageSink>,
    transcoders: Arc<dyn Transcoders>,
  ) -> Self {
    let resolver = Arc::new(Resolver::new(&options, Arc::clone(&fs)));
    Self::with_shared(
      options,
      fs,
      watch_set,
      sink,
      transcoders,
      resolver,
      Arc::new(CompileCache::new()),
      Arc::new(ParseCache::new()),
    )
  }

  /// Variant for callers sharing a resolver and compile caches across
  /// scanner instances (one per architecture).
  #[allow(clippy::too_many_arguments)]
  pub fn with_shared(
    options: ScannerOptions,
    fs: Arc<dyn FileSystem>,
    watch_set: Arc<WatchSet>,
    sink: Arc<dyn MessageSink>,
    transcoders: Arc<dyn Transcoders>,
    resolver: Arc<Resolver>,
    compile_cache: Arc<CompileCache>,
    parse_cache: Arc<ParseCache>,
  ) -> Self {
    let handlers = HandlerRegistry::new(
      &options,
      Arc::clone(&fs),
      Arc::clone(&transcoders),
      compile_cache,
      parse_cache,
    );
    let policy = PathPolicy::new(&options);
    let realpaths = RealpathCache::new(Arc::clone(&fs), options.source_root.clone());

    Self {
      options,
      fs,
      resolver,
      handlers,
      policy,
      realpaths,
      watch_set,
      sink,
      transcoders,
      files: IndexVec::new(),
      abs_path_to_file: FxHashMap::default(),
      real_path_to_files: FxHashMap::default(),
      all_missing_modules: FxIndexMap::default(),
    }
  }

  /// Ingest seed files contributed by upstream compilers.
  pub fn add_input_files(&mut self, files: Vec<InputFile>) -> BuildResult<()> {
    for mut input in files {
      input.source_path = self.normalize_source_path(&input.source_path)?;
      self.apply_target_proxy(&mut input)?;

      let abs_path = self.options.source_root.join(&input.source_path);
      let ty = input.ty.clone().unwrap_or_else(|| {
        input
          .source_path
          .extension()
          .and_then(|ext| ext.to_str())
          .map_or(FileType::Js, FileType::from_extension)
      });

      let mut file = ModuleFile::new(abs_path.clone(), input.source_path.clone(), ty.clone());
      file.lazy = input.lazy;
      file.bare = input.bare;
      file.source_map = input.source_map.take();
      file.pending_errors = std::mem::take(&mut input.pending_errors);
      file.abs_module_id = self.policy.abs_module_id(&abs_path);

      match String::from_utf8(input.data) {
        Err(_) => {
          self.sink.error(
            &format!("{} is not valid UTF-8", input.source_path.display()),
            None,
          );
          file.has_errors = true;
        }
        Ok(raw) => match self.handlers.handle(&abs_path, ty.extension(), &raw) {
          Ok(Some(handled)) => {
            file.set_data_string(handled.data_string);
            file.json_data = handled.json_data;
          }
          Ok(None) => file.set_data_string(raw),
          Err(err) => {
            self.report_file_error(&file.source_path, &err);
            file.set_data_string(raw);
            file.has_errors = true;
          }
        },
      }

      self.insert_input_file(file)?;
    }
    Ok(())
  }

  /// Walk the graph from every eager seed.
  pub fn scan_imports(&mut self) -> BuildResult<()> {
    let roots: Vec<FileIdx> =
      self.files.iter_enumerated().filter(|(_, f)| !f.lazy).map(|(idx, _)| idx).collect();
    debug!(roots = roots.len(), arch = %self.options.bundle_arch, "scanning imports");
    for idx in roots {
      self.scan_file(idx, false);
    }
    Ok(())
  }

  /// Re-entry point for the surrounding install loop: `missing` maps
  /// previously reported specifiers to their import infos, now that new
  /// files may satisfy them.
  pub fn scan_missing_modules(
    &mut self,
    missing: &FxIndexMap<String, Vec<ImportInfo>>,
  ) -> MissingModuleScan {
    let mut scan = MissingModuleScan::default();
    if missing.is_empty() {
      return scan;
    }

    // Misses recorded during this walk land in a fresh map so they can be
    // told apart from what was already known.
    let previous = std::mem::take(&mut self.all_missing_modules);

    for (specifier, infos) in missing {
      // At most two representative infos per specifier, one per flavor.
      let mut static_info: Option<&ImportInfo> = None;
      let mut dynamic_info: Option<&ImportInfo> = None;
      for info in infos {
        if info.dynamic || info.parent_was_dynamic {
          dynamic_info.get_or_insert(info);
        } else {
          static_info.get_or_insert(info);
        }
      }

      for info in [static_info, dynamic_info].into_iter().flatten() {
        let parent_path = info
          .parent_path
          .clone()
          .unwrap_or_else(|| self.options.source_root.join("__entry__"));
        let parent_dynamic = info.dynamic || info.parent_was_dynamic;
        // Synthetic root: no owning file, so nothing of it can ever be
        // emitted.
        self.process_dep(None, &parent_path, specifier, info, parent_dynamic);
      }
    }

    let fresh = std::mem::replace(&mut self.all_missing_modules, previous);

    for (specifier, infos) in missing {
      if !fresh.contains_key(specifier) {
        scan.newly_added.insert(specifier.clone(), infos.clone());
        self.all_missing_modules.shift_remove(specifier);
      }
    }

    for (specifier, infos) in fresh {
      let known_before = self.all_missing_modules.contains_key(&specifier)
        || missing.contains_key(&specifier);
      ImportInfo::merge_into(
        self.all_missing_modules.entry(specifier.clone()).or_default(),
        infos.clone(),
      );
      if !known_before {
        scan.newly_missing.insert(specifier, infos);
      }
    }

    scan
  }

  /// Finalize: collapse realpath duplicates, then emit every installable,
  /// error-free file that is either eager or imported.
  pub fn get_output_files(&mut self) -> Vec<ModuleFile> {
    self.coalesce_realpaths();

    self
      .files
      .iter()
      .filter(|file| {
        file.abs_module_id.is_some()
          && !file.has_errors
          && (!file.lazy || file.imported.is_imported())
      })
      .map(|file| {
        let mut out = file.clone();
        out.serve_path = out
          .abs_module_id
          .as_ref()
          .map(|id| arcstr::ArcStr::from(id.trim_start_matches('/')));
        out
      })
      .collect()
  }

  /// Accumulated unresolved specifiers, for the install loop.
  pub fn all_missing_modules(&self) -> &FxIndexMap<String, Vec<ImportInfo>> {
    &self.all_missing_modules
  }

  pub(crate) fn lookup(&self, abs_path: &Path) -> Option<FileIdx> {
    self.abs_path_to_file.get(&fold_path(abs_path)).copied()
  }

  /// Plain insertion; the caller has already ruled out a collision (or
  /// wants the existing file back).
  pub(crate) fn insert_file(&mut self, file: ModuleFile) -> FileIdx {
    let key = fold_path(&file.abs_path);
    if let Some(&existing) = self.abs_path_to_file.get(&key) {
      return existing;
    }
    let real = self.realpaths.realpath(&file.abs_path);
    let idx = self.files.push(file);
    self.abs_path_to_file.insert(key, idx);
    self.real_path_to_files.entry(real).or_default().push(idx);
    idx
  }

  fn normalize_source_path(&self, path: &Path) -> BuildResult<PathBuf> {
    let normalized = Path::new(".").join(path).normalize();
    if normalized.is_absolute()
      || normalized.components().next() == Some(std::path::Component::ParentDir)
    {
      return Err(
        anyhow!("source path {} escapes the source root", path.display()).into(),
      );
    }
    Ok(normalized)
  }

  /// When a seed declares a target path different from its source path,
  /// move it to the target and leave an implicit re-exporting proxy at the
  /// source location. An explicit file already at the source location is
  /// never overridden.
  fn apply_target_proxy(&mut self, input: &mut InputFile) -> BuildResult<()> {
    let Some(target) = input.target_path.take() else {
      return Ok(());
    };
    let target = self.normalize_source_path(&target)?;
    if target == input.source_path {
      input.target_path = Some(target);
      return Ok(());
    }

    let abs_source = self.options.source_root.join(&input.source_path);
    let abs_target = self.options.source_root.join(&target);

    if let (Some(source_id), Some(target_id)) =
      (self.policy.abs_module_id(&abs_source), self.policy.abs_module_id(&abs_target))
    {
      let existing = self.lookup(&abs_source);
      // An explicit file already at the source location is never
      // overridden by the proxy.
      let replaceable = existing.map_or(true, |idx| self.files[idx].implicit);
      if replaceable {
        let source_dir = Path::new(&*source_id)
          .parent()
          .unwrap_or_else(|| Path::new("/"))
          .to_path_buf();
        let rel = relative_path(&source_dir, Path::new(&*target_id));
        let rel = rel.to_slash_string();
        let relative_id =
          if rel.starts_with("../") { rel } else { format!("./{rel}") };

        // `*+` re-exports both default and named bindings through the
        // module system's live-binding linker.
        let body = format!(
          "module.link({}, {{ \"*\": \"*+\" }});\n",
          serde_json::Value::String(relative_id)
        );

        match existing {
          Some(idx) => {
            let file = &mut self.files[idx];
            file.set_data_string(body);
            file.deps = None;
          }
          None => {
            let mut proxy =
              ModuleFile::new(abs_source, input.source_path.clone(), FileType::Js);
            proxy.set_data_string(body);
            proxy.implicit = true;
            proxy.lazy = input.lazy;
            proxy.abs_module_id = Some(source_id);
            self.insert_file(proxy);
          }
        }
      }
    }

    input.source_path = target.clone();
    input.target_path = Some(target);
    Ok(())
  }

  pub(crate) fn report_file_error(&self, source_path: &Path, err: &anyhow::Error) {
    match err.downcast_ref::<sift_common::JsParseError>() {
      Some(parse) => self.sink.error(
        &parse.message,
        Some(sift_error::SourceLocation {
          file: source_path.to_slash_string(),
          line: parse.line,
          column: parse.column,
        }),
      ),
      None => self.sink.error(
        &format!("{}: {err}", source_path.display()),
        None,
      ),
    }
  }
}

/// Case-folded index key; at most one file may exist per folded path.
pub(crate) fn fold_path(path: &Path) -> String {
  path.to_string_lossy().to_lowercase()
}

/// The resolver's view of the scanner's in-memory files, so unwritten
/// virtual files participate in resolution.
pub(crate) struct ScannerFiles<'a> {
  pub index: &'a FxHashMap<String, FileIdx>,
}

impl VirtualFileOracle for ScannerFiles<'_> {
  fn has_file(&self, path: &Path) -> bool {
    self.index.contains_key(&fold_path(path))
  }
}

impl ImportScanner {
  pub(crate) fn resolve_specifier(
    &self,
    specifier: &str,
    parent_path: &Path,
  ) -> sift_resolver::Resolution {
    let oracle = ScannerFiles { index: &self.abs_path_to_file };
    self.resolver.resolve(specifier, parent_path, &ResolverContext { virtual_files: &oracle })
  }
}
