//! Built-in module names for the node platform, as declared by
//! `require("module").builtinModules` on the latest LTS release.

/// Sorted so membership checks can binary-search.
pub const NODE_BUILTINS: &[&str] = &[
  "assert",
  "assert/strict",
  "async_hooks",
  "buffer",
  "child_process",
  "cluster",
  "console",
  "constants",
  "crypto",
  "dgram",
  "diagnostics_channel",
  "dns",
  "dns/promises",
  "domain",
  "events",
  "fs",
  "fs/promises",
  "http",
  "http2",
  "https",
  "inspector",
  "module",
  "net",
  "os",
  "path",
  "path/posix",
  "path/win32",
  "perf_hooks",
  "process",
  "punycode",
  "querystring",
  "readline",
  "repl",
  "stream",
  "stream/consumers",
  "stream/promises",
  "stream/web",
  "string_decoder",
  "timers",
  "timers/promises",
  "tls",
  "trace_events",
  "tty",
  "url",
  "util",
  "util/types",
  "v8",
  "vm",
  "wasi",
  "worker_threads",
  "zlib",
];

/// Whether `specifier` names a node built-in, with or without the `node:`
/// scheme prefix.
pub fn is_native_module(specifier: &str) -> bool {
  let id = specifier.strip_prefix("node:").unwrap_or(specifier);
  NODE_BUILTINS.binary_search(&id).is_ok()
}

#[test]
fn test_builtins_are_sorted_and_matched() {
  let mut sorted = NODE_BUILTINS.to_vec();
  sorted.sort_unstable();
  assert_eq!(sorted, NODE_BUILTINS);

  assert!(is_native_module("fs"));
  assert!(is_native_module("node:fs"));
  assert!(is_native_module("fs/promises"));
  assert!(!is_native_module("react"));
}
