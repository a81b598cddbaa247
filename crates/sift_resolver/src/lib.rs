// A node-style resolver specialized to the scanner: it consults the
// scanner's in-memory file set through a per-call oracle and records every
// package.json whose presence affected a lookup.

mod builtins;
mod resolver;

pub use crate::builtins::{is_native_module, NODE_BUILTINS};
pub use crate::resolver::{
  AliasResolution, NoVirtualFiles, PackageJsonMap, Resolution, ResolvedModule, Resolver,
  ResolverCache, ResolverContext, VirtualFileOracle,
};
