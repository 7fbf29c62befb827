//! Random-access byte sources indexed by file number within a container.

use crate::container::ContainerItem;
use crate::error::{Error, Result};
use crate::protos::tlc;

use std::fs;
use std::io::{Cursor, Read, Seek};
use std::path::{Path, PathBuf};

/// A reader that can also seek, the capability every [`Pool`] entry needs to
/// support both sequential rsync-style copies and random-access rediff reads.
pub trait ReadSeek: Read + Seek + Send {}
impl<T: Read + Seek + Send> ReadSeek for T {}

/// A random-access byte source indexed by file number within a container.
///
/// Implementations: [`FsPool`] (backed by a real directory tree) and [`MemPool`]
/// (backed by in-memory buffers, used heavily by unit tests). Zip- and
/// HTTP-backed pools are external collaborators that would implement this same
/// trait; this crate does not ship them.
pub trait Pool: Send + Sync {
  fn container(&self) -> &tlc::Container;

  fn len(&self, file_index: usize) -> Result<u64> {
    Ok(self.container().get_file(file_index)?.size as u64)
  }

  /// Open a random-access reader over the whole file at `file_index`.
  fn open(&self, file_index: usize) -> Result<Box<dyn ReadSeek>>;
}

/// A [`Pool`] backed by a directory on disk.
pub struct FsPool {
  container: tlc::Container,
  root: PathBuf,
}

impl FsPool {
  #[must_use]
  pub fn new(container: tlc::Container, root: PathBuf) -> Self {
    Self { container, root }
  }

  /// Walk `root` and build a pool over it in one step.
  pub fn walk(root: &Path) -> Result<Self> {
    let container = tlc::Container::walk(root, |_| true)?;
    Ok(Self::new(container, root.to_owned()))
  }
}

impl Pool for FsPool {
  fn container(&self) -> &tlc::Container {
    &self.container
  }

  fn open(&self, file_index: usize) -> Result<Box<dyn ReadSeek>> {
    let file = self.container.get_file(file_index)?;
    let path = file.get_path(&self.root)?;
    Ok(Box::new(fs::File::open(path)?))
  }
}

/// A [`Pool`] backed by in-memory buffers, one per file in container order.
///
/// Primarily used by tests that want to exercise diff/rediff/apply without
/// touching the filesystem.
pub struct MemPool {
  container: tlc::Container,
  data: Vec<Vec<u8>>,
}

impl MemPool {
  /// `data` must have one entry per file in `container.files`, same order.
  #[must_use]
  pub fn new(container: tlc::Container, data: Vec<Vec<u8>>) -> Self {
    debug_assert_eq!(container.files.len(), data.len());
    Self { container, data }
  }
}

impl Pool for MemPool {
  fn container(&self) -> &tlc::Container {
    &self.container
  }

  fn open(&self, file_index: usize) -> Result<Box<dyn ReadSeek>> {
    let bytes = self
      .data
      .get(file_index)
      .ok_or_else(|| Error::corrupt(format!("invalid file index: {file_index}")))?;
    Ok(Box::new(Cursor::new(bytes.clone())))
  }
}
