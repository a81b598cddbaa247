use std::path::{Component, Path, PathBuf};
use std::sync::mpsc::{sync_channel, SyncSender, TrySendError};
use std::sync::Arc;
use std::thread::JoinHandle;

use dashmap::DashMap;
use tracing::{debug, warn};

use sift_common::{BundleArch, CompileOptions, ScannerOptions, Transcoders};
use sift_fs::FileSystem;
use sift_utils::hash::sha1_hex;

/// `module.exports = <pretty JSON>;` body for a parsed JSON document.
/// Serialization is key-sorted, so identical documents yield identical
/// bytes.
pub fn json_to_common_js(value: &serde_json::Value) -> String {
  format!(
    "module.exports = {};\n",
    serde_json::to_string_pretty(value).expect("json value always serializes")
  )
}

/// Compiled-body memoization keyed by `(source hash, arch)`. Explicitly
/// constructed and shared by callers; eviction is not required for
/// correctness.
#[derive(Debug, Default)]
pub struct CompileCache {
  entries: DashMap<(String, String), Arc<str>>,
}

impl CompileCache {
  pub fn new() -> Self {
    Self::default()
  }

  fn get(&self, source_hash: &str, arch: &BundleArch) -> Option<Arc<str>> {
    self
      .entries
      .get(&(source_hash.to_string(), arch.as_str().to_string()))
      .map(|entry| Arc::clone(entry.value()))
  }

  fn insert(&self, source_hash: &str, arch: &BundleArch, code: Arc<str>) {
    self.entries.insert((source_hash.to_string(), arch.as_str().to_string()), code);
  }
}

/// Memoized speculative-parse verdicts, keyed by content hash.
#[derive(Debug, Default)]
pub struct ParseCache {
  entries: DashMap<String, bool>,
}

impl ParseCache {
  pub fn new() -> Self {
    Self::default()
  }
}

/// Bounded background writer for the disk-backed compile cache. The scan
/// never waits on it; the queue dropping an entry only costs a recompile on
/// some future run.
struct CacheWriter {
  tx: Option<SyncSender<(PathBuf, Vec<u8>)>>,
  handle: Option<JoinHandle<()>>,
}

impl CacheWriter {
  fn spawn(fs: Arc<dyn FileSystem>) -> Self {
    let (tx, rx) = sync_channel::<(PathBuf, Vec<u8>)>(64);
    let handle = std::thread::spawn(move || {
      for (path, data) in rx {
        if let Err(err) = fs.write_file_atomically(&path, &data) {
          warn!(path = %path.display(), %err, "compile cache write failed");
        }
      }
    });
    Self { tx: Some(tx), handle: Some(handle) }
  }

  fn enqueue(&self, path: PathBuf, data: Vec<u8>) {
    if let Some(tx) = &self.tx {
      match tx.try_send((path, data)) {
        Ok(()) => {}
        Err(TrySendError::Full((path, _))) => {
          debug!(path = %path.display(), "compile cache queue full, dropping entry");
        }
        Err(TrySendError::Disconnected(_)) => {}
      }
    }
  }
}

impl Drop for CacheWriter {
  fn drop(&mut self) {
    self.tx.take();
    if let Some(handle) = self.handle.take() {
      let _ = handle.join();
    }
  }
}

pub struct HandledSource {
  pub data_string: String,
  pub json_data: Option<serde_json::Value>,
}

impl HandledSource {
  fn plain(data_string: String) -> Self {
    Self { data_string, json_data: None }
  }
}

/// Per-extension transcoders producing CommonJS-style bodies.
pub struct HandlerRegistry {
  arch: BundleArch,
  transcoders: Arc<dyn Transcoders>,
  compile_cache: Arc<CompileCache>,
  parse_cache: Arc<ParseCache>,
  /// `<cache_dir>/<arch>`, when disk persistence is enabled.
  disk_cache_dir: Option<PathBuf>,
  writer: CacheWriter,
  fs: Arc<dyn FileSystem>,
}

impl HandlerRegistry {
  pub fn new(
    options: &ScannerOptions,
    fs: Arc<dyn FileSystem>,
    transcoders: Arc<dyn Transcoders>,
    compile_cache: Arc<CompileCache>,
    parse_cache: Arc<ParseCache>,
  ) -> Self {
    let disk_cache_dir =
      options.cache_dir.as_ref().map(|dir| dir.join(options.bundle_arch.as_str()));
    Self {
      arch: options.bundle_arch.clone(),
      transcoders,
      compile_cache,
      parse_cache,
      disk_cache_dir,
      writer: CacheWriter::spawn(Arc::clone(&fs)),
      fs,
    }
  }

  /// Transcode `source` according to its extension. `Ok(None)` means no
  /// handler applies and the file should not be emitted.
  pub fn handle(
    &self,
    abs_path: &Path,
    extension: &str,
    source: &str,
  ) -> anyhow::Result<Option<HandledSource>> {
    match extension {
      "js" | "mjs" => Ok(Some(self.handle_js(abs_path, source)?)),
      "json" => {
        let parsed: serde_json::Value = serde_json::from_str(source)?;
        Ok(Some(HandledSource {
          data_string: json_to_common_js(&parsed),
          json_data: Some(parsed),
        }))
      }
      "css" => {
        let hash = sha1_hex(source.as_bytes());
        Ok(Some(HandledSource::plain(self.transcoders.css_to_common_js(source, &hash))))
      }
      _ => {
        if self.parses_as_js(source) {
          Ok(Some(self.handle_js(abs_path, source)?))
        } else {
          Ok(None)
        }
      }
    }
  }

  fn handle_js(&self, abs_path: &Path, source: &str) -> anyhow::Result<HandledSource> {
    let source = strip_shebang(source);

    // core-js installs its own runtime; recompiling it is both wasteful and
    // subtly wrong.
    if inside_core_js(abs_path) {
      return Ok(HandledSource::plain(source.to_string()));
    }

    let source_hash = sha1_hex(source.as_bytes());

    if let Some(code) = self.compile_cache.get(&source_hash, &self.arch) {
      return Ok(HandledSource::plain(code.to_string()));
    }

    if let Some(path) = self.disk_cache_path(&source_hash) {
      if let Ok(code) = self.fs.read_to_string(&path) {
        debug!(hash = %source_hash, "compile cache disk hit");
        self.compile_cache.insert(&source_hash, &self.arch, Arc::from(code.as_str()));
        return Ok(HandledSource::plain(code));
      }
    }

    let legacy = self.arch.is_legacy();
    let options = CompileOptions {
      generate_let_declarations: !legacy,
      avoid_modern_syntax: legacy,
      enforce_strict_mode: false,
      dynamic_import: true,
    };
    let compiled = self.transcoders.compile_js(source, &options)?;

    self.compile_cache.insert(&source_hash, &self.arch, Arc::from(compiled.code.as_str()));
    if let Some(path) = self.disk_cache_path(&source_hash) {
      self.writer.enqueue(path, compiled.code.clone().into_bytes());
    }

    Ok(HandledSource::plain(compiled.code))
  }

  fn disk_cache_path(&self, source_hash: &str) -> Option<PathBuf> {
    self.disk_cache_dir.as_ref().map(|dir| dir.join(format!("reify-{source_hash}.js")))
  }

  fn parses_as_js(&self, source: &str) -> bool {
    let hash = sha1_hex(source.as_bytes());
    if let Some(verdict) = self.parse_cache.entries.get(&hash) {
      return *verdict;
    }
    let verdict = self.transcoders.parses_as_js(source);
    self.parse_cache.entries.insert(hash, verdict);
    verdict
  }
}

fn strip_shebang(source: &str) -> &str {
  if source.starts_with("#!") {
    // Keep the newline so line numbers downstream stay aligned.
    source.find('\n').map_or("", |at| &source[at..])
  } else {
    source
  }
}

fn inside_core_js(abs_path: &Path) -> bool {
  let mut previous_was_node_modules = false;
  for component in abs_path.components() {
    if let Component::Normal(name) = component {
      if previous_was_node_modules && name == "core-js" {
        return true;
      }
      previous_was_node_modules = name == "node_modules";
    }
  }
  false
}
