mod args;

use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use ansi_term::Colour;
use args::{InputArgs, OutputArgs};
use clap::Parser;

use sift::{BundleArch, ImportScanner, InputFile, ModuleFile, ScannerOptions};
use sift_error::{DiagnosticLog, MessageSink};
use sift_fs::{FileSystem, OsFileSystem, WatchSet};
use sift_transcode::ReferenceTranscoders;

#[derive(Parser)]
#[command(version, about = "Walk a module dependency graph and print the output file set")]
struct Commands {
  #[clap(flatten)]
  input: InputArgs,

  #[clap(flatten)]
  output: OutputArgs,
}

fn print_output_files(files: &[ModuleFile], print_bodies: bool) {
  let dim = Colour::White.dimmed();
  let color = Colour::Cyan;

  let mut left = 0;
  for file in files {
    if let Some(id) = &file.abs_module_id {
      left = left.max(id.len());
    }
  }

  for file in files {
    let Some(id) = &file.abs_module_id else { continue };
    let status = match file.imported {
      sift::ImportedStatus::Static => "static",
      sift::ImportedStatus::Dynamic => "dynamic",
      sift::ImportedStatus::None => "eager",
    };
    let size = format!("{:.2}", file.data.len() as f64 / 1024.0);
    println!(
      "{}{:pad$} {}{}{} kB",
      color.paint(&**id),
      "",
      dim.paint(format!("{status:>7}")),
      dim.paint(" │ size: "),
      size,
      pad = left - id.len(),
    );
    if print_bodies {
      println!("{}", dim.paint(&*file.data_string));
    }
  }
}

fn main() -> ExitCode {
  let commands = Commands::parse();
  let InputArgs { source_root, entry, arch, name, extension, node_modules } = commands.input;

  let filter = if commands.output.verbose { "debug" } else { "warn" };
  tracing_subscriber::fmt()
    .with_env_filter(
      tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
    )
    .init();

  let source_root = match source_root.canonicalize() {
    Ok(root) => root,
    Err(err) => {
      eprintln!("{} {}: {err}", Colour::Red.paint("Error:"), source_root.display());
      return ExitCode::FAILURE;
    }
  };

  let mut options = ScannerOptions::new(source_root.clone(), BundleArch::new(arch.as_str()));
  options.name = name;
  options.extensions = extension;
  options.node_modules_paths.extend(node_modules);
  options.cache_dir = commands.output.cache_dir;

  let fs: Arc<dyn FileSystem> = Arc::new(OsFileSystem::new());
  let log = Arc::new(DiagnosticLog::new());
  let watch_set = Arc::new(WatchSet::new());

  let mut scanner = ImportScanner::new(
    options,
    Arc::clone(&fs),
    Arc::clone(&watch_set),
    log.clone() as Arc<dyn MessageSink>,
    Arc::new(ReferenceTranscoders),
  );

  let mut seeds = Vec::with_capacity(entry.len());
  for path in &entry {
    let abs = source_root.join(path);
    match fs.read(&abs) {
      Ok(data) => seeds.push(InputFile {
        source_path: path.clone(),
        data,
        ..InputFile::default()
      }),
      Err(err) => {
        eprintln!("{} {}: {err}", Colour::Red.paint("Error:"), abs.display());
        return ExitCode::FAILURE;
      }
    }
  }

  let scanned = scanner
    .add_input_files(seeds)
    .and_then(|()| scanner.scan_imports());
  if let Err(errors) = scanned {
    for error in &*errors {
      eprintln!("{} {error}", Colour::Red.paint("Error:"));
    }
    return ExitCode::FAILURE;
  }

  let files = scanner.get_output_files();
  print_output_files(&files, commands.output.print_bodies);

  let missing = scanner.all_missing_modules();
  if !missing.is_empty() {
    println!();
    for (specifier, infos) in missing {
      let spurious = infos.iter().all(|info| info.possibly_spurious);
      let label = if spurious { " (possibly spurious)" } else { "" };
      println!("{} {specifier}{label}", Colour::Yellow.paint("Missing:"));
    }
  }

  let messages = log.take();
  if !messages.is_empty() {
    println!();
    for message in &messages {
      eprintln!("{} {message}", Colour::Red.paint("Error:"));
    }
    return ExitCode::FAILURE;
  }

  println!(
    "\n{} {} files, {} watched",
    Colour::Green.paint("✔"),
    files.len(),
    watch_set.len()
  );
  ExitCode::SUCCESS
}
