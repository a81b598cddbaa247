use std::path::PathBuf;
use std::sync::Arc;

use sift_common::{
  BundleArch, FileType, ImportedStatus, InputFile, ModuleFile, ScannerOptions,
};
use sift_error::{BuildMessage, DiagnosticLog, MessageSink};
use sift_fs::{FileSystem, MemoryFileSystem, WatchSet};
use sift_transcode::ReferenceTranscoders;
use sift_utils::indexmap::FxIndexMap;

use super::ImportScanner;

struct Harness {
  fs: Arc<MemoryFileSystem>,
  log: Arc<DiagnosticLog>,
  watch: Arc<WatchSet>,
  scanner: ImportScanner,
}

fn harness(arch: &str) -> Harness {
  let fs = Arc::new(MemoryFileSystem::new());
  let log = Arc::new(DiagnosticLog::new());
  let watch = Arc::new(WatchSet::new());
  let scanner = ImportScanner::new(
    ScannerOptions::new("/app", BundleArch::new(arch)),
    fs.clone() as Arc<dyn FileSystem>,
    Arc::clone(&watch),
    log.clone() as Arc<dyn MessageSink>,
    Arc::new(ReferenceTranscoders),
  );
  Harness { fs, log, watch, scanner }
}

fn seed(source_path: &str, data: &str, lazy: bool) -> InputFile {
  InputFile {
    source_path: PathBuf::from(source_path),
    data: data.as_bytes().to_vec(),
    lazy,
    ..InputFile::default()
  }
}

fn find<'a>(files: &'a [ModuleFile], id: &str) -> &'a ModuleFile {
  files
    .iter()
    .find(|f| f.abs_module_id.as_deref() == Some(id))
    .unwrap_or_else(|| panic!("no output file with id {id}"))
}

fn ids(files: &[ModuleFile]) -> Vec<&str> {
  files.iter().filter_map(|f| f.abs_module_id.as_deref()).collect()
}

#[test]
fn static_import_emits_both_files() {
  let mut h = harness("web.browser");
  h.fs.add_file("/app/util.js", "export const x = 1;\n");

  h.scanner
    .add_input_files(vec![seed("main.js", "import \"./util.js\";\n", false)])
    .unwrap();
  h.scanner.scan_imports().unwrap();
  let out = h.scanner.get_output_files();

  assert_eq!(out.len(), 2);
  let main = find(&out, "/main.js");
  assert!(!main.lazy);
  assert_eq!(main.imported, ImportedStatus::Static);
  assert!(main.data_string.contains("module.link(\"./util.js\""));
  assert_eq!(main.serve_path.as_deref(), Some("main.js"));

  let util = find(&out, "/util.js");
  assert!(util.lazy);
  assert_eq!(util.imported, ImportedStatus::Static);
  assert!(util.data_string.contains("module.export"));

  assert!(h.scanner.all_missing_modules().is_empty());
  assert!(h.log.is_empty());
  assert!(h.watch.contains(std::path::Path::new("/app/util.js")));
}

#[test]
fn dynamic_imports_stay_dynamic_on_web() {
  let mut h = harness("web.browser");
  h.fs.add_file("/app/lazy.js", "import \"./deep.js\";\n");
  h.fs.add_file("/app/deep.js", "export const d = 1;\n");

  h.scanner
    .add_input_files(vec![seed("main.js", "import(\"./lazy.js\");\n", false)])
    .unwrap();
  h.scanner.scan_imports().unwrap();
  let out = h.scanner.get_output_files();

  assert_eq!(find(&out, "/lazy.js").imported, ImportedStatus::Dynamic);
  // Dynamic semantics propagate transitively.
  assert_eq!(find(&out, "/deep.js").imported, ImportedStatus::Dynamic);
}

#[test]
fn dynamic_imports_are_eager_on_server() {
  let mut h = harness("os");
  h.fs.add_file("/app/lazy.js", "import \"./deep.js\";\n");
  h.fs.add_file("/app/deep.js", "export const d = 1;\n");

  h.scanner
    .add_input_files(vec![seed("main.js", "import(\"./lazy.js\");\n", false)])
    .unwrap();
  h.scanner.scan_imports().unwrap();
  let out = h.scanner.get_output_files();

  assert_eq!(find(&out, "/lazy.js").imported, ImportedStatus::Static);
  assert_eq!(find(&out, "/deep.js").imported, ImportedStatus::Static);
}

#[test]
fn static_edge_promotes_a_dynamically_reached_file() {
  let mut h = harness("web.browser");
  h.fs.add_file("/app/shared.js", "export const s = 1;\n");
  h.fs.add_file("/app/eager.js", "import \"./shared.js\";\n");

  h.scanner
    .add_input_files(vec![seed(
      "main.js",
      "import(\"./shared.js\");\nimport \"./eager.js\";\n",
      false,
    )])
    .unwrap();
  h.scanner.scan_imports().unwrap();
  let out = h.scanner.get_output_files();

  assert_eq!(find(&out, "/shared.js").imported, ImportedStatus::Static);
}

#[test]
fn static_rescan_promotes_transitive_children() {
  let mut h = harness("web.browser");
  h.fs.add_file("/app/entry2.js", "import \"./lazy.js\";\n");
  h.fs.add_file("/app/lazy.js", "import \"./deep.js\";\n");
  h.fs.add_file("/app/deep.js", "export const d = 1;\n");

  // lazy.js is first reached dynamically, then statically via entry2.js;
  // the promotion must flow through to deep.js.
  h.scanner
    .add_input_files(vec![seed(
      "main.js",
      "import(\"./lazy.js\");\nimport \"./entry2.js\";\n",
      false,
    )])
    .unwrap();
  h.scanner.scan_imports().unwrap();
  let out = h.scanner.get_output_files();

  assert_eq!(find(&out, "/lazy.js").imported, ImportedStatus::Static);
  assert_eq!(find(&out, "/deep.js").imported, ImportedStatus::Static);
}

#[test]
fn symlinked_package_collapses_to_container_and_alias() {
  let mut h = harness("web.browser");
  h.fs.add_file("/app/imports/x/index.js", "export const x = 1;\n");
  h.fs.add_symlink("/app/node_modules/x", "../imports/x");

  h.scanner
    .add_input_files(vec![seed(
      "main.js",
      "import \"x\";\nimport \"./imports/x/index.js\";\n",
      false,
    )])
    .unwrap();
  h.scanner.scan_imports().unwrap();
  let out = h.scanner.get_output_files();

  let container = find(&out, "/node_modules/x/index.js");
  let aliased = find(&out, "/imports/x/index.js");

  assert!(container.alias.is_none());
  assert_eq!(
    aliased.alias.as_ref().and_then(|a| a.abs_module_id.as_deref()),
    Some("/node_modules/x/index.js")
  );
  assert_eq!(container.hash, aliased.hash);
  assert_eq!(container.imported, ImportedStatus::Static);
  assert_eq!(aliased.imported, ImportedStatus::Static);
}

#[test]
fn browser_field_redirect_produces_alias_file() {
  let mut h = harness("web.browser");
  h.fs.add_file(
    "/app/node_modules/pkg/package.json",
    r#"{"name": "pkg", "main": "./index.js", "browser": {"./node.js": "./browser.js"}}"#,
  );
  h.fs.add_file("/app/node_modules/pkg/index.js", "import \"./node.js\";\n");
  h.fs.add_file("/app/node_modules/pkg/node.js", "export const n = 1;\n");
  h.fs.add_file("/app/node_modules/pkg/browser.js", "export const b = 1;\n");

  h.scanner
    .add_input_files(vec![seed("main.js", "import \"pkg\";\n", false)])
    .unwrap();
  h.scanner.scan_imports().unwrap();
  let out = h.scanner.get_output_files();

  let alias_file = find(&out, "/node_modules/pkg/node.js");
  assert_eq!(
    alias_file.alias.as_ref().and_then(|a| a.abs_module_id.as_deref()),
    Some("/node_modules/pkg/browser.js")
  );
  assert_eq!(
    find(&out, "/node_modules/pkg/browser.js").imported,
    ImportedStatus::Static
  );

  // The consulted manifest is emitted as an implicit helper file.
  let helper = find(&out, "/node_modules/pkg/package.json");
  assert!(helper.implicit);
  assert_eq!(helper.ty, FileType::Json);

  // ...and recorded on the importing edge.
  let main = find(&out, "/main.js");
  let dep = main.deps.as_ref().unwrap().get("pkg").unwrap();
  assert!(dep.helpers.contains_key("/node_modules/pkg/package.json"));
}

#[test]
fn missing_module_then_satisfied_by_reentry() {
  let mut h = harness("web.browser");

  h.scanner
    .add_input_files(vec![seed("main.js", "import React from \"react\";\n", false)])
    .unwrap();
  h.scanner.scan_imports().unwrap();

  let missing = h.scanner.all_missing_modules().clone();
  assert_eq!(missing.len(), 1);
  let infos = missing.get("react").unwrap();
  assert_eq!(infos.len(), 1);
  assert_eq!(infos[0].parent_path.as_deref(), Some(std::path::Path::new("/app/main.js")));
  assert!(!infos[0].dynamic);

  // The installer provides the package; the scanner re-enters.
  h.fs.add_file("/app/node_modules/react/package.json", r#"{"main": "./index.js"}"#);
  h.fs.add_file("/app/node_modules/react/index.js", "module.exports = {};\n");

  let scan = h.scanner.scan_missing_modules(&missing);
  assert!(scan.newly_added.contains_key("react"));
  assert!(scan.newly_missing.is_empty());
  assert!(h.scanner.all_missing_modules().is_empty());

  let out = h.scanner.get_output_files();
  assert_eq!(
    find(&out, "/node_modules/react/index.js").imported,
    ImportedStatus::Static
  );
}

#[test]
fn reentry_discovers_newly_missing_transitive_deps() {
  let mut h = harness("web.browser");

  h.scanner
    .add_input_files(vec![seed("main.js", "import \"pkg\";\n", false)])
    .unwrap();
  h.scanner.scan_imports().unwrap();
  let missing = h.scanner.all_missing_modules().clone();
  assert!(missing.contains_key("pkg"));

  // pkg arrives, but it depends on another package that is still absent.
  h.fs.add_file("/app/node_modules/pkg/index.js", "import \"deeper\";\n");

  let scan = h.scanner.scan_missing_modules(&missing);
  assert!(scan.newly_added.contains_key("pkg"));
  assert!(scan.newly_missing.contains_key("deeper"));
  assert!(h.scanner.all_missing_modules().contains_key("deeper"));
  assert!(!h.scanner.all_missing_modules().contains_key("pkg"));
}

#[test]
fn reentry_with_empty_map_is_a_no_op() {
  let mut h = harness("web.browser");
  let scan = h.scanner.scan_missing_modules(&FxIndexMap::default());
  assert!(scan.newly_added.is_empty());
  assert!(scan.newly_missing.is_empty());
}

#[test]
fn scan_is_idempotent_at_fixed_point() {
  let mut h = harness("web.browser");
  h.fs.add_file("/app/util.js", "export const x = 1;\n");

  h.scanner
    .add_input_files(vec![seed("main.js", "import \"./util.js\";\n", false)])
    .unwrap();
  h.scanner.scan_imports().unwrap();
  let first: Vec<(String, String, ImportedStatus)> = h
    .scanner
    .get_output_files()
    .iter()
    .map(|f| (f.abs_module_id.as_deref().unwrap().to_string(), f.hash.clone(), f.imported))
    .collect();

  h.scanner.scan_imports().unwrap();
  let second: Vec<(String, String, ImportedStatus)> = h
    .scanner
    .get_output_files()
    .iter()
    .map(|f| (f.abs_module_id.as_deref().unwrap().to_string(), f.hash.clone(), f.imported))
    .collect();

  assert_eq!(first, second);
}

#[test]
fn client_files_are_excluded_from_server_bundles() {
  let mut h = harness("os.linux.x86_64");
  h.fs.add_file("/app/client/ui.js", "export const ui = 1;\n");

  h.scanner
    .add_input_files(vec![seed("main.js", "import \"./client/ui.js\";\n", false)])
    .unwrap();
  h.scanner.scan_imports().unwrap();
  let out = h.scanner.get_output_files();

  assert_eq!(ids(&out), vec!["/main.js"]);
  // Not installable is different from missing.
  assert!(h.scanner.all_missing_modules().is_empty());
}

#[test]
fn unknown_extension_treated_as_js_when_it_parses() {
  let mut h = harness("web.browser");
  h.fs.add_file("/app/config.conf", "module.exports = 42;\n");
  h.fs.add_file("/app/blob.conf", "\0\0\0");

  h.scanner
    .add_input_files(vec![seed(
      "main.js",
      "import \"./config.conf\";\nimport \"./blob.conf\";\n",
      false,
    )])
    .unwrap();
  h.scanner.scan_imports().unwrap();
  let out = h.scanner.get_output_files();

  assert!(ids(&out).contains(&"/config.conf"));
  assert!(!ids(&out).contains(&"/blob.conf"));
}

#[test]
fn same_source_path_contributions_are_concatenated() {
  let mut h = harness("web.browser");

  h.scanner
    .add_input_files(vec![
      seed("shared.js", "export const a = 1;\n", true),
      seed("shared.js", "export const b = 2;\n", true),
      seed("main.js", "import \"./shared.js\";\n", false),
    ])
    .unwrap();
  h.scanner.scan_imports().unwrap();
  let out = h.scanner.get_output_files();

  let shared = find(&out, "/shared.js");
  assert!(shared.data_string.contains("\n\n"));
  assert!(shared.data_string.contains("a() { return a; }"));
  assert!(shared.data_string.contains("b() { return b; }"));
}

#[test]
fn mismatched_laziness_is_a_fatal_contract_violation() {
  let mut h = harness("web.browser");

  let result = h.scanner.add_input_files(vec![
    seed("shared.js", "export const a = 1;\n", true),
    seed("shared.js", "export const b = 2;\n", false),
  ]);

  let err = result.unwrap_err();
  assert!(err[0].to_string().contains("cannot combine files"));
}

#[test]
fn source_path_outside_root_is_fatal() {
  let mut h = harness("web.browser");
  let result = h.scanner.add_input_files(vec![seed("../outside.js", "", false)]);
  assert!(result.is_err());
}

#[test]
fn dep_loaded_json_keeps_js_type_tag() {
  let mut h = harness("web.browser");
  h.fs.add_file("/app/config.json", r#"{"answer": 42}"#);

  h.scanner
    .add_input_files(vec![seed("main.js", "import \"./config.json\";\n", false)])
    .unwrap();
  h.scanner.scan_imports().unwrap();
  let out = h.scanner.get_output_files();

  let config = find(&out, "/config.json");
  // Dep-loaded files keep the unconditional js tag for now; the bundler
  // distinguishes by content.
  assert_eq!(config.ty, FileType::Js);
  assert!(config.json_data.is_some());
  assert!(config.data_string.starts_with("module.exports = {"));
}

#[test]
fn spurious_requires_record_missing_without_errors() {
  let mut h = harness("web.browser");

  h.scanner
    .add_input_files(vec![seed(
      "main.js",
      "if (false) { require(\"optional-dep\"); }\n",
      false,
    )])
    .unwrap();
  h.scanner.scan_imports().unwrap();

  let missing = h.scanner.all_missing_modules();
  assert!(missing.get("optional-dep").unwrap()[0].possibly_spurious);
  assert!(h.log.is_empty());
}

#[test]
fn pending_compiler_errors_flush_on_first_import() {
  let mut h = harness("web.browser");

  let mut broken = seed("broken.js", "export const broken = 1;\n", true);
  broken.pending_errors =
    vec![BuildMessage { message: "upstream compiler failed".into(), location: None }];

  h.scanner
    .add_input_files(vec![broken, seed("main.js", "import \"./broken.js\";\n", false)])
    .unwrap();

  // Errors are deferred until the file is actually imported.
  assert!(h.log.is_empty());
  h.scanner.scan_imports().unwrap();

  let messages = h.log.take();
  assert_eq!(messages.len(), 1);
  assert_eq!(messages[0].message, "upstream compiler failed");

  let out = h.scanner.get_output_files();
  assert!(!ids(&out).contains(&"/broken.js"));
}

#[test]
fn parse_errors_are_scoped_to_one_file() {
  let mut h = harness("web.browser");
  h.fs.add_file("/app/bad.js", "const s = \"unterminated\n");
  h.fs.add_file("/app/good.js", "export const g = 1;\n");

  h.scanner
    .add_input_files(vec![seed(
      "main.js",
      "import \"./bad.js\";\nimport \"./good.js\";\n",
      false,
    )])
    .unwrap();
  h.scanner.scan_imports().unwrap();

  let messages = h.log.take();
  assert_eq!(messages.len(), 1);
  let location = messages[0].location.as_ref().unwrap();
  assert_eq!(location.file, "bad.js");
  assert_eq!(location.line, 1);

  // The bad file stays in the output with empty deps; the scan went on.
  let out = h.scanner.get_output_files();
  assert!(ids(&out).contains(&"/bad.js"));
  assert!(ids(&out).contains(&"/good.js"));
}

#[test]
fn server_node_modules_are_delegated_to_the_host_loader() {
  let mut h = harness("os");
  h.fs.add_file("/app/node_modules/fibers/index.js", "require(\"./native.node\");\n");

  h.scanner
    .add_input_files(vec![seed("main.js", "import \"fibers\";\n", false)])
    .unwrap();
  h.scanner.scan_imports().unwrap();
  let out = h.scanner.get_output_files();

  let fibers = find(&out, "/node_modules/fibers/index.js");
  assert_eq!(&*fibers.data_string, "module.useNode();\n");
  // The stub has no deps, so nothing behind it was pulled in.
  assert!(h.scanner.all_missing_modules().is_empty());
}

#[test]
fn native_builtins_skip_on_server_and_stub_on_web() {
  let mut h = harness("os");
  h.scanner
    .add_input_files(vec![seed("main.js", "import \"fs\";\n", false)])
    .unwrap();
  h.scanner.scan_imports().unwrap();
  assert!(h.scanner.all_missing_modules().is_empty());

  let mut h = harness("web.browser");
  h.scanner
    .add_input_files(vec![seed("main.js", "import \"fs\";\n", false)])
    .unwrap();
  h.scanner.scan_imports().unwrap();
  // No stub package installed: reported missing under the original id.
  assert!(h.scanner.all_missing_modules().contains_key("fs"));

  h.fs.add_file(
    "/app/node_modules/meteor-node-stubs/deps/fs.js",
    "module.exports = {};\n",
  );
  let missing = h.scanner.all_missing_modules().clone();
  let scan = h.scanner.scan_missing_modules(&missing);
  assert!(scan.newly_added.contains_key("fs"));

  let out = h.scanner.get_output_files();
  assert!(ids(&out).contains(&"/node_modules/meteor-node-stubs/deps/fs.js"));
}

#[test]
fn target_path_seeds_leave_a_reexport_proxy_behind() {
  let mut h = harness("web.browser");

  let mut moved = seed("lib/mod.js", "export const m = 1;\n", true);
  moved.target_path = Some(PathBuf::from("lib/mod.esm.js"));

  h.scanner
    .add_input_files(vec![moved, seed("main.js", "import \"./lib/mod.js\";\n", false)])
    .unwrap();
  h.scanner.scan_imports().unwrap();
  let out = h.scanner.get_output_files();

  let proxy = find(&out, "/lib/mod.js");
  assert!(proxy.implicit);
  assert_eq!(
    &*proxy.data_string,
    "module.link(\"./mod.esm.js\", { \"*\": \"*+\" });\n"
  );
  assert_eq!(find(&out, "/lib/mod.esm.js").imported, ImportedStatus::Static);
}

#[test]
fn lazy_unimported_files_are_not_emitted() {
  let mut h = harness("web.browser");

  h.scanner
    .add_input_files(vec![
      seed("main.js", "export const nothing = 0;\n", false),
      seed("orphan.js", "export const o = 1;\n", true),
    ])
    .unwrap();
  h.scanner.scan_imports().unwrap();
  let out = h.scanner.get_output_files();

  assert_eq!(ids(&out), vec!["/main.js"]);
}
