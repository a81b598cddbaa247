use std::io;
use std::path::{Component, Path, PathBuf};

use dashmap::DashMap;

use crate::file_system::{FileStat, FileSystem};

#[derive(Debug, Clone)]
enum Node {
  File(Vec<u8>),
  Directory,
  Symlink(PathBuf),
}

/// In-memory tree with symlink support. Used by tests and by callers that
/// assemble virtual source trees.
#[derive(Debug, Default)]
pub struct MemoryFileSystem {
  nodes: DashMap<PathBuf, Node>,
}

impl MemoryFileSystem {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn add_file(&self, path: impl Into<PathBuf>, contents: impl Into<Vec<u8>>) {
    let path = path.into();
    self.add_parent_dirs(&path);
    self.nodes.insert(path, Node::File(contents.into()));
  }

  pub fn add_dir(&self, path: impl Into<PathBuf>) {
    let path = path.into();
    self.add_parent_dirs(&path);
    self.nodes.insert(path, Node::Directory);
  }

  /// `target` may be absolute or relative to the link's parent directory.
  pub fn add_symlink(&self, path: impl Into<PathBuf>, target: impl Into<PathBuf>) {
    let path = path.into();
    self.add_parent_dirs(&path);
    self.nodes.insert(path, Node::Symlink(target.into()));
  }

  fn add_parent_dirs(&self, path: &Path) {
    let mut current = PathBuf::new();
    let components: Vec<Component> = path.components().collect();
    for component in &components[..components.len().saturating_sub(1)] {
      current.push(component);
      if matches!(component, Component::Normal(_)) {
        self.nodes.entry(current.clone()).or_insert(Node::Directory);
      }
    }
  }

  /// Resolve every symlink along `path`. `None` on dangling links or
  /// cycles.
  fn canonicalize(&self, path: &Path) -> Option<PathBuf> {
    let mut resolved = PathBuf::new();
    let mut budget = 64u32;
    self.canonicalize_into(path, &mut resolved, &mut budget)?;
    Some(resolved)
  }

  fn canonicalize_into(
    &self,
    path: &Path,
    resolved: &mut PathBuf,
    budget: &mut u32,
  ) -> Option<()> {
    for component in path.components() {
      match component {
        Component::RootDir | Component::Prefix(_) => {
          resolved.push(component);
        }
        Component::CurDir => {}
        Component::ParentDir => {
          resolved.pop();
        }
        Component::Normal(name) => {
          resolved.push(name);
          while let Some(Node::Symlink(target)) =
            self.nodes.get(&*resolved).map(|node| node.value().clone())
          {
            *budget = budget.checked_sub(1)?;
            resolved.pop();
            if target.is_absolute() {
              let mut fresh = PathBuf::new();
              self.canonicalize_into(&target, &mut fresh, budget)?;
              *resolved = fresh;
            } else {
              let base = std::mem::take(resolved);
              self.canonicalize_into(&base.join(&target), resolved, budget)?;
            }
          }
        }
      }
    }
    Some(())
  }

  fn lookup(&self, path: &Path) -> Option<Node> {
    let real = self.canonicalize(path)?;
    self.nodes.get(&real).map(|node| node.value().clone())
  }
}

impl FileSystem for MemoryFileSystem {
  fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
    match self.lookup(path) {
      Some(Node::File(contents)) => Ok(contents),
      Some(_) => Err(io::Error::new(io::ErrorKind::InvalidInput, "not a file")),
      None => Err(io::Error::new(io::ErrorKind::NotFound, "no such file")),
    }
  }

  fn stat(&self, path: &Path) -> Option<FileStat> {
    match self.lookup(path)? {
      Node::File(_) => Some(FileStat::file()),
      Node::Directory => Some(FileStat::directory()),
      // canonicalize already chased links; a surviving symlink is dangling.
      Node::Symlink(_) => None,
    }
  }

  fn lstat(&self, path: &Path) -> Option<FileStat> {
    let parent = path.parent()?;
    let name = path.file_name()?;
    let real_parent = self.canonicalize(parent)?;
    match self.nodes.get(&real_parent.join(name))?.value() {
      Node::File(_) => Some(FileStat::file()),
      Node::Directory => Some(FileStat::directory()),
      Node::Symlink(_) => Some(FileStat::symlink()),
    }
  }

  fn realpath(&self, path: &Path) -> Option<PathBuf> {
    let real = self.canonicalize(path)?;
    self.nodes.contains_key(&real).then_some(real)
  }

  fn write_file_atomically(&self, path: &Path, data: &[u8]) -> io::Result<()> {
    self.add_file(path, data);
    Ok(())
  }

  fn should_watch(&self, _path: &Path) -> bool {
    true
  }
}
