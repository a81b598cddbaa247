mod handlers;
mod paths;
mod realpath;
mod scanner;

pub use crate::handlers::{json_to_common_js, CompileCache, HandlerRegistry, ParseCache};
pub use crate::paths::PathPolicy;
pub use crate::realpath::RealpathCache;
pub use crate::scanner::{ImportScanner, MissingModuleScan};
pub use sift_common::*;
