//! Reference transcoders. The scanner itself consumes these as opaque pure
//! functions; this crate exists so the CLI and the scenario tests have a
//! working set to plug in. The rewriter is line-oriented and deliberately
//! modest next to a real module-syntax compiler, but the bodies it emits use
//! the same `module.link`/`module.export` runtime surface.

mod lexer;
mod rewrite;

use sift_common::{CompileOptions, CompiledJs, ExtractedImport, JsParseError, Transcoders};
use sift_utils::indexmap::FxIndexMap;

pub use crate::lexer::find_imports;
pub use crate::rewrite::compile;

pub fn css_to_common_js(css: &str, _hash: &str) -> String {
  format!(
    "module.exports = require(\"meteor/modules\").addStyles(\n  {}\n);\n",
    serde_json::Value::String(css.to_string())
  )
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ReferenceTranscoders;

impl Transcoders for ReferenceTranscoders {
  fn compile_js(&self, source: &str, options: &CompileOptions) -> anyhow::Result<CompiledJs> {
    compile(source, options)
  }

  fn css_to_common_js(&self, source: &str, hash: &str) -> String {
    css_to_common_js(source, hash)
  }

  fn find_imported_module_identifiers(
    &self,
    source: &str,
  ) -> Result<FxIndexMap<String, ExtractedImport>, JsParseError> {
    find_imports(source)
  }

  fn parses_as_js(&self, source: &str) -> bool {
    lexer::scans_as_js(source)
  }
}

#[test]
fn test_css_body_shape() {
  let body = css_to_common_js("body { color: red; }", "abc");
  assert!(body.starts_with("module.exports = require(\"meteor/modules\").addStyles("));
  assert!(body.contains("body { color: red; }"));
}
