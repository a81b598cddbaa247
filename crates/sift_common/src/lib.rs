mod scanner_options;
mod types;

pub use crate::scanner_options::ScannerOptions;

// Internal file positions are not part of the API surface, so all items are
// exported from the root.
pub use crate::types::{
  arch::BundleArch,
  file::{FileIdx, FileType, InputFile, ModuleAlias, ModuleFile},
  import_info::ImportInfo,
  imported::ImportedStatus,
  package_json::{BrowserAlias, PackageManifest},
  transcode::{CompileOptions, CompiledJs, ExtractedImport, JsParseError, Transcoders},
};
