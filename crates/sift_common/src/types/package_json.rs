use std::path::{Path, PathBuf};

use sift_utils::indexmap::FxIndexMap;

/// One `browser`-field alias table entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrowserAlias {
  /// Redirect to another module within the same package.
  Redirect(String),
  /// `false`: the module is disabled on web arches.
  Disabled,
}

/// Parsed `package.json`, reduced to the fields resolution cares about plus
/// the raw document.
#[derive(Debug, Clone)]
pub struct PackageManifest {
  /// Absolute path of the manifest file.
  pub path: PathBuf,
  /// Package directory (the manifest's parent).
  pub dir: PathBuf,
  pub name: Option<String>,
  pub main: Option<String>,
  /// String-form `browser` field: an alternate entry point for web arches.
  pub browser_main: Option<String>,
  /// Object-form `browser` field: per-module alias table.
  pub browser_aliases: FxIndexMap<String, BrowserAlias>,
  /// The document with root-level `_`-prefixed keys stripped; npm injects
  /// private keys there that vary between installs.
  pub raw: serde_json::Value,
}

impl PackageManifest {
  pub fn parse(path: &Path, bytes: &[u8]) -> anyhow::Result<Self> {
    let mut raw: serde_json::Value = serde_json::from_slice(bytes)?;
    if let serde_json::Value::Object(map) = &mut raw {
      map.retain(|key, _| !key.starts_with('_'));
    }

    let name = raw.get("name").and_then(|v| v.as_str()).map(str::to_string);
    let main = raw.get("main").and_then(|v| v.as_str()).map(str::to_string);

    let mut browser_main = None;
    let mut browser_aliases = FxIndexMap::default();
    match raw.get("browser") {
      Some(serde_json::Value::String(entry)) => browser_main = Some(entry.clone()),
      Some(serde_json::Value::Object(table)) => {
        for (key, value) in table {
          match value {
            serde_json::Value::String(target) => {
              browser_aliases.insert(key.clone(), BrowserAlias::Redirect(target.clone()));
            }
            serde_json::Value::Bool(false) => {
              browser_aliases.insert(key.clone(), BrowserAlias::Disabled);
            }
            _ => {}
          }
        }
      }
      _ => {}
    }

    let dir = path.parent().map(Path::to_path_buf).unwrap_or_default();

    Ok(Self { path: path.to_path_buf(), dir, name, main, browser_main, browser_aliases, raw })
  }

  /// The subset of the manifest that affected resolution. Implicit helper
  /// files carry only this view; a direct import upgrades them to the full
  /// document.
  pub fn resolution_view(&self) -> serde_json::Value {
    let mut view = serde_json::Map::new();
    if let Some(name) = &self.name {
      view.insert("name".into(), serde_json::Value::String(name.clone()));
    }
    if let Some(main) = &self.main {
      view.insert("main".into(), serde_json::Value::String(main.clone()));
    }
    if let Some(browser) = self.raw.get("browser") {
      view.insert("browser".into(), browser.clone());
    }
    serde_json::Value::Object(view)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parse_strips_private_keys_and_reads_browser_table() {
    let manifest = PackageManifest::parse(
      Path::new("/app/node_modules/pkg/package.json"),
      br#"{
        "name": "pkg",
        "main": "./lib/node.js",
        "browser": { "./lib/node.js": "./lib/browser.js", "fs": false },
        "_id": "pkg@1.0.0",
        "_npmVersion": "9.0.0"
      }"#,
    )
    .unwrap();

    assert_eq!(manifest.name.as_deref(), Some("pkg"));
    assert_eq!(manifest.main.as_deref(), Some("./lib/node.js"));
    assert_eq!(
      manifest.browser_aliases.get("./lib/node.js"),
      Some(&BrowserAlias::Redirect("./lib/browser.js".into()))
    );
    assert_eq!(manifest.browser_aliases.get("fs"), Some(&BrowserAlias::Disabled));
    assert!(manifest.raw.get("_id").is_none());
    assert_eq!(manifest.dir, Path::new("/app/node_modules/pkg"));
  }

  #[test]
  fn resolution_view_is_a_subset() {
    let manifest = PackageManifest::parse(
      Path::new("/p/package.json"),
      br#"{"name": "p", "main": "index.js", "version": "1.2.3"}"#,
    )
    .unwrap();

    let view = manifest.resolution_view();
    assert_eq!(view.get("name").and_then(|v| v.as_str()), Some("p"));
    assert!(view.get("version").is_none());
  }
}
