pub mod hash;
pub mod indexmap;
pub mod path_ext;
