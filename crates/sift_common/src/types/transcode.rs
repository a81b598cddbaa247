use sift_utils::indexmap::FxIndexMap;

/// Flags handed to the ECMAScript module rewriter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileOptions {
  pub generate_let_declarations: bool,
  pub avoid_modern_syntax: bool,
  pub enforce_strict_mode: bool,
  pub dynamic_import: bool,
}

#[derive(Debug, Clone)]
pub struct CompiledJs {
  pub code: String,
}

/// One specifier found in a module body.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtractedImport {
  pub dynamic: bool,
  pub possibly_spurious: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JsParseError {
  pub message: String,
  pub line: u32,
  pub column: u32,
}

impl std::fmt::Display for JsParseError {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{} ({}:{})", self.message, self.line, self.column)
  }
}

impl std::error::Error for JsParseError {}

/// The transcoders the scanner consumes as opaque pure functions: the
/// module-syntax rewriter, the CSS shim, and the identifier extractor.
pub trait Transcoders: Send + Sync {
  fn compile_js(&self, source: &str, options: &CompileOptions) -> anyhow::Result<CompiledJs>;

  fn css_to_common_js(&self, source: &str, hash: &str) -> String;

  /// Parse `source` and yield every import specifier with its flavor.
  fn find_imported_module_identifiers(
    &self,
    source: &str,
  ) -> Result<FxIndexMap<String, ExtractedImport>, JsParseError>;

  /// Speculative check used for files with unknown extensions.
  fn parses_as_js(&self, source: &str) -> bool;
}
