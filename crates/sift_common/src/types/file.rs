use std::path::PathBuf;

use arcstr::ArcStr;
use sift_error::BuildMessage;
use sift_utils::{hash::sha1_hex, indexmap::FxIndexMap};

use crate::{ImportInfo, ImportedStatus};

oxc_index::define_index_type! {
  pub struct FileIdx = u32;
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FileType {
  Js,
  Mjs,
  Json,
  Css,
  Other(String),
}

impl FileType {
  pub fn from_extension(ext: &str) -> Self {
    match ext {
      "js" => Self::Js,
      "mjs" => Self::Mjs,
      "json" => Self::Json,
      "css" => Self::Css,
      other => Self::Other(other.to_string()),
    }
  }

  pub fn extension(&self) -> &str {
    match self {
      Self::Js => "js",
      Self::Mjs => "mjs",
      Self::Json => "json",
      Self::Css => "css",
      Self::Other(ext) => ext,
    }
  }
}

/// Redirects references to this file to another module id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleAlias {
  /// `None` disables the module outright (a browser-field `false` entry).
  pub abs_module_id: Option<ArcStr>,
  pub path: Option<PathBuf>,
}

/// A seed file contributed by an upstream compiler.
#[derive(Debug, Clone, Default)]
pub struct InputFile {
  /// Path relative to the source root.
  pub source_path: PathBuf,
  /// Alternate install path. When it differs from `source_path`, the
  /// scanner moves the file there and leaves an aliasing proxy behind.
  pub target_path: Option<PathBuf>,
  pub data: Vec<u8>,
  pub ty: Option<FileType>,
  pub lazy: bool,
  pub bare: bool,
  pub source_map: Option<String>,
  /// Errors the upstream compiler accumulated for this file. They are only
  /// flushed if the file is actually imported.
  pub pending_errors: Vec<BuildMessage>,
}

/// The unit owned by the scanner.
#[derive(Debug, Clone)]
pub struct ModuleFile {
  /// Absolute filesystem path. May be synthetic for files that never
  /// existed on disk.
  pub abs_path: PathBuf,
  /// Normalized path relative to the source root.
  pub source_path: PathBuf,
  /// Logical serve path: the absolute module id with the leading `/`
  /// stripped. Assigned during output finalization.
  pub serve_path: Option<ArcStr>,
  /// Runtime-visible module identifier, always starting with `/`. `None`
  /// means the file is not installable on this arch and is dropped.
  pub abs_module_id: Option<ArcStr>,
  /// Canonical module body bytes; always mirrors `data_string`.
  pub data: Vec<u8>,
  /// Transcoded module body.
  pub data_string: ArcStr,
  /// SHA-1 hex digest of `data`.
  pub hash: String,
  pub ty: FileType,
  /// Lazy files are only emitted if reached by at least one import.
  pub lazy: bool,
  /// Bare files are not wrapped by the module runtime; merges must not mix
  /// bare with non-bare.
  pub bare: bool,
  /// A placeholder that a later explicit contribution may replace.
  pub implicit: bool,
  pub imported: ImportedStatus,
  /// Extracted dependency edges, keyed by specifier. `None` until the file
  /// is first walked.
  pub deps: Option<FxIndexMap<String, ImportInfo>>,
  /// Specifiers that failed to resolve from this file.
  pub missing_modules: FxIndexMap<String, Vec<ImportInfo>>,
  pub alias: Option<ModuleAlias>,
  /// Parsed body for JSON modules.
  pub json_data: Option<serde_json::Value>,
  /// Sticky: suppresses emission once set.
  pub has_errors: bool,
  /// Raw source map JSON, combined through concatenation on merge.
  pub source_map: Option<String>,
  pub pending_errors: Vec<BuildMessage>,
}

impl ModuleFile {
  pub fn new(abs_path: PathBuf, source_path: PathBuf, ty: FileType) -> Self {
    Self {
      abs_path,
      source_path,
      serve_path: None,
      abs_module_id: None,
      data: Vec::new(),
      data_string: ArcStr::default(),
      hash: sha1_hex(&[]),
      ty,
      lazy: true,
      bare: false,
      implicit: false,
      imported: ImportedStatus::None,
      deps: None,
      missing_modules: FxIndexMap::default(),
      alias: None,
      json_data: None,
      has_errors: false,
      source_map: None,
      pending_errors: Vec::new(),
    }
  }

  /// Install a transcoded body, keeping `data` and `hash` consistent with
  /// it byte-for-byte.
  pub fn set_data_string(&mut self, body: impl Into<ArcStr>) {
    self.data_string = body.into();
    self.data = self.data_string.as_bytes().to_vec();
    self.hash = sha1_hex(&self.data);
  }

  /// Promotion-only status update.
  pub fn promote_imported(&mut self, status: ImportedStatus) {
    self.imported = self.imported.join(status);
  }
}

#[test]
fn test_data_string_consistency() {
  let mut file =
    ModuleFile::new(PathBuf::from("/app/a.js"), PathBuf::from("a.js"), FileType::Js);
  file.set_data_string("module.exports = 1;\n");

  assert_eq!(file.data, file.data_string.as_bytes());
  assert_eq!(file.hash, sha1_hex(file.data_string.as_bytes()));
}
