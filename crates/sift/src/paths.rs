use std::path::{Path, PathBuf};

use arcstr::ArcStr;

use sift_common::{BundleArch, ScannerOptions};
use sift_utils::path_ext::PathExt;

/// Pure mapping from absolute filesystem paths to absolute module ids for
/// one architecture, plus the server-side native delegation predicate.
#[derive(Debug)]
pub struct PathPolicy {
  source_root: PathBuf,
  node_modules_paths: Vec<PathBuf>,
  bundle_arch: BundleArch,
  /// `node_modules/meteor/<name>` for package scans.
  id_prefix: Option<String>,
}

impl PathPolicy {
  pub fn new(options: &ScannerOptions) -> Self {
    Self {
      source_root: options.source_root.clone(),
      node_modules_paths: options.node_modules_paths.clone(),
      bundle_arch: options.bundle_arch.clone(),
      id_prefix: options.stripped_name().map(|name| format!("node_modules/meteor/{name}")),
    }
  }

  /// The runtime-visible id for `abs_path`, or `None` when the file is not
  /// installable on this arch.
  pub fn abs_module_id(&self, abs_path: &Path) -> Option<ArcStr> {
    let id = if let Some(rel) =
      self.node_modules_paths.iter().find_map(|dir| abs_path.strip_prefix(dir).ok())
    {
      if has_dot_component(rel) {
        return None;
      }
      format!("node_modules/{}", rel.to_slash_string())
    } else if let Ok(rel) = abs_path.strip_prefix(&self.source_root) {
      if !self.arch_allows(rel) {
        return None;
      }
      rel.to_slash_string()
    } else {
      return None;
    };

    let id = match &self.id_prefix {
      Some(prefix) => format!("/{prefix}/{id}"),
      None => format!("/{id}"),
    };
    Some(ArcStr::from(id))
  }

  /// Arch-gated exclusions for files under the app source tree. Only the
  /// server/client filtering stops at a `node_modules` boundary; the
  /// dot-directory and top-level-directory exclusions hold everywhere.
  fn arch_allows(&self, rel: &Path) -> bool {
    let components: Vec<&str> = normal_components(rel);

    if matches!(
      components.first(),
      Some(&"private" | &"packages" | &"programs" | &"cordova-build-override")
    ) {
      return false;
    }
    if components.iter().any(|c| c.starts_with('.')) {
      return false;
    }

    let scope =
      components.iter().position(|c| *c == "node_modules").unwrap_or(components.len());
    for component in &components[..scope] {
      if self.bundle_arch.is_web() && *component == "server" {
        return false;
      }
      if self.bundle_arch.is_server() && *component == "client" {
        return false;
      }
    }
    true
  }

  /// On the server, modules under a non-`meteor` `node_modules` tree are
  /// delegated to the host loader instead of being bundled.
  pub fn should_use_node(&self, abs_module_id: &str) -> bool {
    if !self.bundle_arch.is_server() {
      return false;
    }

    let parts: Vec<&str> = abs_module_id.trim_start_matches('/').split('/').collect();
    let start = if parts.first() == Some(&"node_modules") && parts.get(1) == Some(&"meteor") {
      // Skip the node_modules/meteor/<name> rerooting prefix.
      3
    } else {
      0
    };
    parts[start.min(parts.len())..].contains(&"node_modules")
  }
}

fn normal_components(rel: &Path) -> Vec<&str> {
  rel
    .components()
    .filter_map(|c| match c {
      std::path::Component::Normal(name) => name.to_str(),
      _ => None,
    })
    .collect()
}

fn has_dot_component(rel: &Path) -> bool {
  normal_components(rel).iter().any(|c| c.starts_with('.'))
}

#[cfg(test)]
mod tests {
  use super::*;

  fn policy(arch: &str) -> PathPolicy {
    PathPolicy::new(&ScannerOptions::new("/app", BundleArch::new(arch)))
  }

  #[test]
  fn ids_are_rooted_and_slash_joined() {
    let policy = policy("os");
    assert_eq!(
      policy.abs_module_id(Path::new("/app/lib/util.js")).as_deref(),
      Some("/lib/util.js")
    );
    assert_eq!(
      policy.abs_module_id(Path::new("/app/node_modules/react/index.js")).as_deref(),
      Some("/node_modules/react/index.js")
    );
    assert_eq!(policy.abs_module_id(Path::new("/elsewhere/x.js")), None);
  }

  #[test]
  fn arch_gated_exclusions() {
    let web = policy("web.browser");
    let server = policy("os.linux.x86_64");

    assert_eq!(web.abs_module_id(Path::new("/app/server/secret.js")), None);
    assert!(web.abs_module_id(Path::new("/app/client/ui.js")).is_some());
    assert_eq!(server.abs_module_id(Path::new("/app/client/ui.js")), None);
    assert!(server.abs_module_id(Path::new("/app/server/secret.js")).is_some());

    for excluded in ["private/data.txt", "packages/x/index.js", "programs/p/a.js",
      "cordova-build-override/config.xml", ".git/config.js", "lib/.hidden/x.js"]
    {
      assert_eq!(web.abs_module_id(&Path::new("/app").join(excluded)), None, "{excluded}");
    }

    // node_modules subtrees are exempt from server/client filtering...
    assert!(server
      .abs_module_id(Path::new("/app/node_modules/pkg/client/ui.js"))
      .is_some());
    assert!(web
      .abs_module_id(Path::new("/app/node_modules/pkg/server/main.js"))
      .is_some());

    // ...but not from the dot-directory exclusion.
    assert_eq!(
      web.abs_module_id(Path::new("/app/node_modules/pkg/.hidden/x.js")),
      None
    );
    assert_eq!(
      web.abs_module_id(Path::new("/app/lib/node_modules/pkg/.bin/tool.js")),
      None
    );
  }

  #[test]
  fn package_scans_reroot_ids() {
    let mut options = ScannerOptions::new("/pkg", BundleArch::new("os"));
    options.name = Some("local-test:blaze".into());
    let policy = PathPolicy::new(&options);

    assert_eq!(
      policy.abs_module_id(Path::new("/pkg/lib/view.js")).as_deref(),
      Some("/node_modules/meteor/blaze/lib/view.js")
    );
  }

  #[test]
  fn should_use_node_only_for_foreign_node_modules_on_server() {
    let server = policy("os");
    assert!(server.should_use_node("/node_modules/fibers/fibers.js"));
    assert!(!server.should_use_node("/node_modules/meteor/ddp/server.js"));
    assert!(server.should_use_node("/node_modules/meteor/ddp/node_modules/dep/index.js"));
    assert!(!server.should_use_node("/lib/util.js"));

    let web = policy("web.browser");
    assert!(!web.should_use_node("/node_modules/fibers/fibers.js"));
  }
}
