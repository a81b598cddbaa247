use std::path::PathBuf;

use clap::Args;

#[derive(Args)]
pub struct InputArgs {
  /// Root of the application source tree.
  #[clap(long, default_value = ".")]
  pub source_root: PathBuf,

  /// Seed files, relative to the source root.
  #[clap(required = true)]
  pub entry: Vec<PathBuf>,

  /// Target architecture tag (web.browser, web.browser.legacy, os, ...).
  #[clap(long, default_value = "web.browser")]
  pub arch: String,

  /// Package scan name; module ids are rerooted under it.
  #[clap(long)]
  pub name: Option<String>,

  /// Extra extensions tried during resolution.
  #[clap(long, action = clap::ArgAction::Append)]
  pub extension: Vec<String>,

  /// Additional node_modules directories, in lookup order.
  #[clap(long, action = clap::ArgAction::Append)]
  pub node_modules: Vec<PathBuf>,
}

#[derive(Args)]
pub struct OutputArgs {
  /// Directory for the disk-backed compile cache.
  #[clap(long)]
  pub cache_dir: Option<PathBuf>,

  /// Print the body of every emitted file.
  #[clap(long)]
  pub print_bodies: bool,

  #[clap(long, short = 'v')]
  pub verbose: bool,
}
