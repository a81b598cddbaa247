pub mod arch;
pub mod file;
pub mod import_info;
pub mod imported;
pub mod package_json;
pub mod transcode;
