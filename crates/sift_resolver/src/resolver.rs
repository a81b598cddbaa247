use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use sugar_path::SugarPath;
use tracing::debug;

use sift_common::{BrowserAlias, BundleArch, PackageManifest, ScannerOptions};
use sift_fs::FileSystem;
use sift_utils::indexmap::{FxIndexMap, FxIndexSet};
use sift_utils::path_ext::PathExt;

use crate::builtins;

/// Answers whether a path is backed by one of the scanner's in-memory files
/// (synthesized proxies, compiler output not yet on disk). Threaded through
/// every resolve call so a process-wide resolver can serve many scanners.
pub trait VirtualFileOracle {
  fn has_file(&self, path: &Path) -> bool;
}

/// Oracle for callers without an in-memory file set.
pub struct NoVirtualFiles;

impl VirtualFileOracle for NoVirtualFiles {
  fn has_file(&self, _path: &Path) -> bool {
    false
  }
}

pub struct ResolverContext<'a> {
  pub virtual_files: &'a dyn VirtualFileOracle,
}

pub type PackageJsonMap = FxIndexMap<PathBuf, Arc<PackageManifest>>;

#[derive(Debug, Clone)]
pub struct ResolvedModule {
  pub abs_path: PathBuf,
  /// Every `package.json` whose presence affected this lookup, in
  /// consultation order.
  pub package_json_map: PackageJsonMap,
}

/// A browser-field override. The file at `source_path` becomes an alias;
/// `target` is the module the alias points at, or `None` when the entry
/// disabled the module outright.
#[derive(Debug, Clone)]
pub struct AliasResolution {
  pub source_path: PathBuf,
  pub target: Option<PathBuf>,
  pub package_json_map: PackageJsonMap,
}

#[derive(Debug, Clone)]
pub enum Resolution {
  Resolved(ResolvedModule),
  Alias(AliasResolution),
  Missing,
}

/// Node-style lookup parameterized by target arch, extension order, and the
/// `node_modules` search path. Immutable once built; the per-scanner state
/// arrives through [`ResolverContext`].
pub struct Resolver {
  source_root: PathBuf,
  target_arch: BundleArch,
  extensions: Vec<String>,
  node_modules_paths: Vec<PathBuf>,
  fs: Arc<dyn FileSystem>,
  manifest_cache: DashMap<PathBuf, Option<Arc<PackageManifest>>>,
}

impl Resolver {
  pub fn new(options: &ScannerOptions, fs: Arc<dyn FileSystem>) -> Self {
    let mut extensions = vec![".js".to_string(), ".json".to_string()];
    for ext in &options.extensions {
      let ext = if ext.starts_with('.') { ext.clone() } else { format!(".{ext}") };
      if !extensions.contains(&ext) {
        extensions.push(ext);
      }
    }

    Self {
      source_root: options.source_root.clone(),
      target_arch: options.bundle_arch.clone(),
      extensions,
      node_modules_paths: options.node_modules_paths.clone(),
      fs,
      manifest_cache: DashMap::default(),
    }
  }

  pub fn target_arch(&self) -> &BundleArch {
    &self.target_arch
  }

  pub fn is_native(&self, specifier: &str) -> bool {
    builtins::is_native_module(specifier)
  }

  /// Stub module id substituted for a native import on web arches.
  pub fn native_stub_id(&self, specifier: &str) -> String {
    let id = specifier.strip_prefix("node:").unwrap_or(specifier);
    format!("meteor-node-stubs/deps/{id}.js")
  }

  pub fn resolve(
    &self,
    specifier: &str,
    referrer: &Path,
    ctx: &ResolverContext<'_>,
  ) -> Resolution {
    let referrer_dir = referrer.parent().unwrap_or(&self.source_root);
    let mut consulted = PackageJsonMap::default();

    let found = if is_relative(specifier) {
      self.resolve_path(referrer_dir.join(specifier).normalize(), &mut consulted, ctx)
    } else if let Some(rooted) = specifier.strip_prefix('/') {
      self.resolve_path(self.source_root.join(rooted).normalize(), &mut consulted, ctx)
    } else {
      self.resolve_bare(specifier, referrer_dir, &mut consulted, ctx)
    };

    match found {
      None => {
        debug!(specifier, referrer = %referrer.display(), "resolution missed");
        Resolution::Missing
      }
      Some(abs_path) => self.apply_browser_aliases(abs_path, consulted, ctx),
    }
  }

  /// Try `base` as a file, then with each extension appended, then as a
  /// directory.
  fn resolve_path(
    &self,
    base: PathBuf,
    consulted: &mut PackageJsonMap,
    ctx: &ResolverContext<'_>,
  ) -> Option<PathBuf> {
    if self.is_file(&base, ctx) {
      return Some(base);
    }
    for ext in &self.extensions {
      let candidate = append_extension(&base, ext);
      if self.is_file(&candidate, ctx) {
        return Some(candidate);
      }
    }
    if self.is_directory(&base) {
      return self.resolve_directory(&base, consulted, ctx);
    }
    None
  }

  /// `package.json` `main` (or its web-arch `browser` string override),
  /// falling back to `index.<ext>`.
  fn resolve_directory(
    &self,
    dir: &Path,
    consulted: &mut PackageJsonMap,
    ctx: &ResolverContext<'_>,
  ) -> Option<PathBuf> {
    let manifest_path = dir.join("package.json");
    if let Some(manifest) = self.manifest(&manifest_path) {
      consulted.insert(manifest_path, manifest.clone());

      let main = if self.target_arch.is_web() {
        manifest.browser_main.as_deref().or(manifest.main.as_deref())
      } else {
        manifest.main.as_deref()
      };

      if let Some(main) = main.filter(|main| !matches!(*main, "." | "./")) {
        let target = dir.join(main).normalize();
        if self.is_file(&target, ctx) {
          return Some(target);
        }
        for ext in &self.extensions {
          let candidate = append_extension(&target, ext);
          if self.is_file(&candidate, ctx) {
            return Some(candidate);
          }
        }
        if self.is_directory(&target) {
          if let Some(found) = self.resolve_index(&target, ctx) {
            return Some(found);
          }
        }
      }
    }

    self.resolve_index(dir, ctx)
  }

  fn resolve_index(&self, dir: &Path, ctx: &ResolverContext<'_>) -> Option<PathBuf> {
    for ext in &self.extensions {
      let candidate = dir.join(format!("index{ext}"));
      if self.is_file(&candidate, ctx) {
        return Some(candidate);
      }
    }
    None
  }

  /// Bare specifiers walk the configured `node_modules` directories, then
  /// every ancestor `node_modules` of the referrer.
  fn resolve_bare(
    &self,
    specifier: &str,
    referrer_dir: &Path,
    consulted: &mut PackageJsonMap,
    ctx: &ResolverContext<'_>,
  ) -> Option<PathBuf> {
    for node_modules in self.node_modules_dirs(referrer_dir) {
      let base = node_modules.join(Path::new(specifier));
      if let Some(found) = self.resolve_path(base, consulted, ctx) {
        return Some(found);
      }
    }
    None
  }

  fn node_modules_dirs(&self, referrer_dir: &Path) -> FxIndexSet<PathBuf> {
    let mut dirs: FxIndexSet<PathBuf> = self.node_modules_paths.iter().cloned().collect();
    for ancestor in referrer_dir.ancestors() {
      if ancestor.file_name().is_some_and(|name| name == "node_modules") {
        continue;
      }
      dirs.insert(ancestor.join("node_modules"));
    }
    dirs
  }

  /// On web arches, the owning package's `browser` alias table can redirect
  /// or disable the freshly resolved module. Keys and targets must stay
  /// inside the package; a self-referential alias is discarded.
  fn apply_browser_aliases(
    &self,
    abs_path: PathBuf,
    mut consulted: PackageJsonMap,
    ctx: &ResolverContext<'_>,
  ) -> Resolution {
    if !self.target_arch.is_web() {
      return Resolution::Resolved(ResolvedModule { abs_path, package_json_map: consulted });
    }

    let Some(manifest) = self.owning_manifest(&abs_path, &mut consulted) else {
      return Resolution::Resolved(ResolvedModule { abs_path, package_json_map: consulted });
    };

    let Ok(rel) = abs_path.strip_prefix(&manifest.dir) else {
      return Resolution::Resolved(ResolvedModule { abs_path, package_json_map: consulted });
    };
    let key = format!("./{}", rel.to_slash_string());

    match manifest.browser_aliases.get(&key) {
      None => Resolution::Resolved(ResolvedModule { abs_path, package_json_map: consulted }),
      Some(BrowserAlias::Disabled) => Resolution::Alias(AliasResolution {
        source_path: abs_path,
        target: None,
        package_json_map: consulted,
      }),
      Some(BrowserAlias::Redirect(target)) => {
        if !is_relative(target) {
          // Cross-package aliases are refused.
          debug!(%key, target, "ignoring non-relative browser alias");
          return Resolution::Resolved(ResolvedModule { abs_path, package_json_map: consulted });
        }
        let resolved =
          self.resolve_path(manifest.dir.join(target).normalize(), &mut consulted, ctx);
        match resolved {
          Some(target_path) if target_path == abs_path => {
            // A browser field mapping a module to itself must not create
            // an alias cycle.
            Resolution::Resolved(ResolvedModule { abs_path, package_json_map: consulted })
          }
          Some(target_path) => Resolution::Alias(AliasResolution {
            source_path: abs_path,
            target: Some(target_path),
            package_json_map: consulted,
          }),
          None => {
            debug!(%key, target, "browser alias target missing; keeping original");
            Resolution::Resolved(ResolvedModule { abs_path, package_json_map: consulted })
          }
        }
      }
    }
  }

  /// Nearest `package.json` at or above the file, without climbing out of
  /// the source root.
  fn owning_manifest(
    &self,
    abs_path: &Path,
    consulted: &mut PackageJsonMap,
  ) -> Option<Arc<PackageManifest>> {
    for dir in abs_path.parent()?.ancestors() {
      let manifest_path = dir.join("package.json");
      if let Some(manifest) = self.manifest(&manifest_path) {
        consulted.insert(manifest_path, manifest.clone());
        return Some(manifest);
      }
      if dir == self.source_root {
        break;
      }
    }
    None
  }

  fn manifest(&self, path: &Path) -> Option<Arc<PackageManifest>> {
    if let Some(cached) = self.manifest_cache.get(path) {
      return cached.clone();
    }

    let parsed = self
      .fs
      .stat(path)
      .filter(|stat| stat.is_file)
      .and_then(|_| self.fs.read(path).ok())
      .and_then(|bytes| PackageManifest::parse(path, &bytes).ok())
      .map(Arc::new);

    self.manifest_cache.insert(path.to_path_buf(), parsed.clone());
    parsed
  }

  fn is_file(&self, path: &Path, ctx: &ResolverContext<'_>) -> bool {
    ctx.virtual_files.has_file(path)
      || self.fs.stat(path).is_some_and(|stat| stat.is_file)
  }

  fn is_directory(&self, path: &Path) -> bool {
    self.fs.stat(path).is_some_and(|stat| stat.is_directory)
  }
}

fn is_relative(specifier: &str) -> bool {
  specifier == "." || specifier == ".." || specifier.starts_with("./") || specifier.starts_with("../")
}

fn append_extension(base: &Path, ext: &str) -> PathBuf {
  let mut joined = OsString::from(base.as_os_str());
  joined.push(ext);
  PathBuf::from(joined)
}

/// Process-wide resolver sharing across scanner instances. The key is the
/// whole resolution policy; the mutable per-scanner part travels in the
/// [`ResolverContext`] instead.
#[derive(Default)]
pub struct ResolverCache {
  resolvers: DashMap<ResolverKey, Arc<Resolver>>,
}

#[derive(Hash, PartialEq, Eq)]
struct ResolverKey {
  source_root: PathBuf,
  arch: String,
  extensions: Vec<String>,
  node_modules_paths: Vec<PathBuf>,
}

impl ResolverCache {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn get_or_create(
    &self,
    options: &ScannerOptions,
    fs: &Arc<dyn FileSystem>,
  ) -> Arc<Resolver> {
    let key = ResolverKey {
      source_root: options.source_root.clone(),
      arch: options.bundle_arch.as_str().to_string(),
      extensions: options.extensions.clone(),
      node_modules_paths: options.node_modules_paths.clone(),
    };
    self
      .resolvers
      .entry(key)
      .or_insert_with(|| Arc::new(Resolver::new(options, Arc::clone(fs))))
      .value()
      .clone()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use sift_fs::MemoryFileSystem;

  fn web_resolver(fs: Arc<dyn FileSystem>) -> Resolver {
    Resolver::new(&ScannerOptions::new("/app", BundleArch::new("web.browser")), fs)
  }

  fn resolve(resolver: &Resolver, specifier: &str, referrer: &str) -> Resolution {
    resolver.resolve(
      specifier,
      Path::new(referrer),
      &ResolverContext { virtual_files: &NoVirtualFiles },
    )
  }

  fn resolved_path(resolution: Resolution) -> PathBuf {
    match resolution {
      Resolution::Resolved(module) => module.abs_path,
      other => panic!("expected Resolved, got {other:?}"),
    }
  }

  #[test]
  fn relative_specifiers_try_extensions() {
    let fs = Arc::new(MemoryFileSystem::new());
    fs.add_file("/app/main.js", "");
    fs.add_file("/app/lib/util.js", "");
    let resolver = web_resolver(fs);

    let path = resolved_path(resolve(&resolver, "./lib/util", "/app/main.js"));
    assert_eq!(path, Path::new("/app/lib/util.js"));
  }

  #[test]
  fn directory_resolution_honors_main_then_index() {
    let fs = Arc::new(MemoryFileSystem::new());
    fs.add_file("/app/node_modules/a/package.json", r#"{"main": "./entry.js"}"#);
    fs.add_file("/app/node_modules/a/entry.js", "");
    fs.add_file("/app/node_modules/b/index.js", "");
    fs.add_file("/app/src/main.js", "");
    let resolver = web_resolver(fs);

    let a = resolve(&resolver, "a", "/app/src/main.js");
    match a {
      Resolution::Resolved(module) => {
        assert_eq!(module.abs_path, Path::new("/app/node_modules/a/entry.js"));
        assert!(module
          .package_json_map
          .contains_key(Path::new("/app/node_modules/a/package.json")));
      }
      other => panic!("expected Resolved, got {other:?}"),
    }

    let b = resolved_path(resolve(&resolver, "b", "/app/src/main.js"));
    assert_eq!(b, Path::new("/app/node_modules/b/index.js"));
  }

  #[test]
  fn bare_specifiers_try_configured_paths_then_ancestors() {
    let fs = Arc::new(MemoryFileSystem::new());
    fs.add_file("/app/node_modules/x/index.js", "");
    fs.add_file("/app/node_modules/y/node_modules/x/index.js", "");
    fs.add_file("/app/node_modules/y/node_modules/z/index.js", "");
    fs.add_file("/app/node_modules/y/lib/inner.js", "");
    let resolver = web_resolver(fs);

    // The configured node_modules path is consulted first.
    let x = resolved_path(resolve(&resolver, "x", "/app/node_modules/y/lib/inner.js"));
    assert_eq!(x, Path::new("/app/node_modules/x/index.js"));

    // Packages only present in a nested tree are found by the ancestor walk.
    let z = resolved_path(resolve(&resolver, "z", "/app/node_modules/y/lib/inner.js"));
    assert_eq!(z, Path::new("/app/node_modules/y/node_modules/z/index.js"));
  }

  #[test]
  fn missing_module_resolves_cleanly_to_missing() {
    let fs = Arc::new(MemoryFileSystem::new());
    fs.add_file("/app/main.js", "");
    let resolver = web_resolver(fs);

    assert!(matches!(resolve(&resolver, "react", "/app/main.js"), Resolution::Missing));
    assert!(matches!(resolve(&resolver, "./nope", "/app/main.js"), Resolution::Missing));
  }

  #[test]
  fn virtual_files_participate_in_resolution() {
    let fs = Arc::new(MemoryFileSystem::new());
    fs.add_file("/app/main.js", "");
    let resolver = web_resolver(fs);

    struct OneFile;
    impl VirtualFileOracle for OneFile {
      fn has_file(&self, path: &Path) -> bool {
        path == Path::new("/app/generated.js")
      }
    }

    let resolution = resolver.resolve(
      "./generated",
      Path::new("/app/main.js"),
      &ResolverContext { virtual_files: &OneFile },
    );
    assert_eq!(resolved_path(resolution), Path::new("/app/generated.js"));
  }

  #[test]
  fn browser_field_redirects_within_package() {
    let fs = Arc::new(MemoryFileSystem::new());
    fs.add_file(
      "/app/node_modules/pkg/package.json",
      r#"{"main": "./index.js", "browser": {"./node.js": "./browser.js"}}"#,
    );
    fs.add_file("/app/node_modules/pkg/index.js", "");
    fs.add_file("/app/node_modules/pkg/node.js", "");
    fs.add_file("/app/node_modules/pkg/browser.js", "");
    let resolver = web_resolver(fs.clone());

    match resolve(&resolver, "./node.js", "/app/node_modules/pkg/index.js") {
      Resolution::Alias(alias) => {
        assert_eq!(alias.source_path, Path::new("/app/node_modules/pkg/node.js"));
        assert_eq!(alias.target.as_deref(), Some(Path::new("/app/node_modules/pkg/browser.js")));
      }
      other => panic!("expected Alias, got {other:?}"),
    }

    // Same import on a server arch is untouched.
    let server = Resolver::new(
      &ScannerOptions::new("/app", BundleArch::new("os")),
      fs as Arc<dyn FileSystem>,
    );
    let path = resolved_path(resolve(&server, "./node.js", "/app/node_modules/pkg/index.js"));
    assert_eq!(path, Path::new("/app/node_modules/pkg/node.js"));
  }

  #[test]
  fn browser_field_false_disables_module() {
    let fs = Arc::new(MemoryFileSystem::new());
    fs.add_file(
      "/app/node_modules/pkg/package.json",
      r#"{"browser": {"./tls-shim.js": false}}"#,
    );
    fs.add_file("/app/node_modules/pkg/index.js", "");
    fs.add_file("/app/node_modules/pkg/tls-shim.js", "");
    let resolver = web_resolver(fs);

    match resolve(&resolver, "./tls-shim.js", "/app/node_modules/pkg/index.js") {
      Resolution::Alias(alias) => assert!(alias.target.is_none()),
      other => panic!("expected Alias, got {other:?}"),
    }
  }

  #[test]
  fn self_referential_browser_alias_is_discarded() {
    let fs = Arc::new(MemoryFileSystem::new());
    fs.add_file(
      "/app/node_modules/pkg/package.json",
      r#"{"browser": {"./index.js": "./index.js"}}"#,
    );
    fs.add_file("/app/node_modules/pkg/index.js", "");
    let resolver = web_resolver(fs);

    let path = resolved_path(resolve(&resolver, "./index.js", "/app/node_modules/pkg/main.js"));
    assert_eq!(path, Path::new("/app/node_modules/pkg/index.js"));
  }

  #[test]
  fn cross_package_browser_alias_is_refused() {
    let fs = Arc::new(MemoryFileSystem::new());
    fs.add_file(
      "/app/node_modules/pkg/package.json",
      r#"{"browser": {"./node.js": "other-pkg"}}"#,
    );
    fs.add_file("/app/node_modules/pkg/node.js", "");
    fs.add_file("/app/node_modules/other-pkg/index.js", "");
    let resolver = web_resolver(fs);

    let path = resolved_path(resolve(&resolver, "./node.js", "/app/node_modules/pkg/a.js"));
    assert_eq!(path, Path::new("/app/node_modules/pkg/node.js"));
  }

  #[test]
  fn native_stub_id_shape() {
    let fs = Arc::new(MemoryFileSystem::new());
    let resolver = web_resolver(fs);

    assert!(resolver.is_native("fs"));
    assert_eq!(resolver.native_stub_id("fs"), "meteor-node-stubs/deps/fs.js");
    assert_eq!(resolver.native_stub_id("node:path"), "meteor-node-stubs/deps/path.js");
  }

  #[test]
  fn resolver_cache_shares_by_policy() {
    let fs: Arc<dyn FileSystem> = Arc::new(MemoryFileSystem::new());
    let cache = ResolverCache::new();

    let web = ScannerOptions::new("/app", BundleArch::new("web.browser"));
    let os = ScannerOptions::new("/app", BundleArch::new("os"));

    let a = cache.get_or_create(&web, &fs);
    let b = cache.get_or_create(&web, &fs);
    let c = cache.get_or_create(&os, &fs);

    assert!(Arc::ptr_eq(&a, &b));
    assert!(!Arc::ptr_eq(&a, &c));
  }
}
