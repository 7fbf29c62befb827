use crate::common::BLOCK_SIZE;
use crate::error::{Error, Result};
use crate::protos::{pwr, tlc};

use std::fs;
use std::path::{Path, PathBuf};

/// <https://github.com/itchio/wharf/blob/189a01902d172b3297051fab12d5d4db2c620e1d/pwr/constants.go#L30>
const MIN_MODE: u32 = 0o644;
const MAX_MODE: u32 = 0o777;

/// Clamp the given mode between the minimum and maximum
///
/// Clamping the mode ensures that it is valid
#[inline]
#[must_use]
pub fn mask_mode(mode: u32) -> u32 {
  (mode & MAX_MODE) | MIN_MODE
}

fn set_permissions(path: &Path, mode: u32) -> Result<()> {
  #[cfg(unix)]
  {
    use std::os::unix::fs::PermissionsExt;

    if !fs::exists(path)? {
      return Ok(());
    }

    // Apply the mode mask to set at least the mask permissions
    let mode = mask_mode(mode);

    let mut permissions = fs::metadata(path)?.permissions();

    if permissions.mode() != mode {
      permissions.set_mode(mode);
      fs::set_permissions(path, permissions)?;
    }
  }

  #[cfg(not(unix))]
  {
    let _ = (path, mode);
  }

  Ok(())
}

fn symlink(path: &Path, destination: &str) -> Result<()> {
  if fs::exists(path)? {
    fs::remove_file(path)?;
  }

  #[cfg(unix)]
  {
    std::os::unix::fs::symlink(destination, path)?;
  }

  #[cfg(windows)]
  {
    let metadata = fs::metadata(destination)?;

    if metadata.is_dir() {
      std::os::windows::fs::symlink_dir(destination, path)?;
    } else {
      std::os::windows::fs::symlink_file(destination, path)?;
    }
  }

  Ok(())
}

impl std::fmt::Display for pwr::CompressionSettings {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{:?}-q{}", self.algorithm(), self.quality)
  }
}

/// Reject path components that would escape `base` (`..`, absolute roots, prefixes).
fn path_safe_push(base: &mut PathBuf, extension: &Path) -> Result<()> {
  for comp in extension.components() {
    match comp {
      std::path::Component::Normal(p) => base.push(p),
      std::path::Component::CurDir => (),

      // Any other component is not safe!
      _ => return Err(Error::corrupt(format!("unsafe path component: {comp:?}"))),
    }
  }

  Ok(())
}

pub trait ContainerItem {
  fn mode(&self) -> u32;
  fn path(&self) -> &str;

  fn get_path(&self, build_folder: &Path) -> Result<PathBuf> {
    let mut base = build_folder.to_owned();
    path_safe_push(&mut base, Path::new(self.path()))?;
    Ok(base)
  }
}

impl ContainerItem for tlc::Dir {
  fn mode(&self) -> u32 {
    self.mode
  }

  fn path(&self) -> &str {
    &self.path
  }
}

impl ContainerItem for tlc::File {
  fn mode(&self) -> u32 {
    self.mode
  }

  fn path(&self) -> &str {
    &self.path
  }
}

impl ContainerItem for tlc::Symlink {
  fn mode(&self) -> u32 {
    self.mode
  }

  fn path(&self) -> &str {
    &self.path
  }
}

impl tlc::File {
  /// Get the number of blocks that the file occupies.
  ///
  /// If the file is empty, still count one block for its empty hash.
  #[inline]
  #[must_use]
  pub fn block_count(&self) -> u64 {
    (self.size as u64).div_ceil(BLOCK_SIZE).max(1)
  }
}

impl tlc::Container {
  pub fn dump_stdout(&self) {
    println!("{}", self.size);

    for file in &self.files {
      println!("{file:?}");
    }
    for dir in &self.dirs {
      println!("{dir:?}");
    }
    for sym in &self.symlinks {
      println!("{sym:?}");
    }
  }

  pub fn print_summary(&self, label: &str) {
    println!(
      "{label}: {} files, {} dirs, {} symlinks, total size: {} bytes",
      self.files.len(),
      self.dirs.len(),
      self.symlinks.len(),
      self.size,
    );
  }

  /// Get the number of blocks every file in this container combined occupies.
  ///
  /// If a file is empty, still count one block for its empty hash.
  #[inline]
  #[must_use]
  pub fn file_blocks(&self) -> u64 {
    self.files.iter().fold(0, |acc, f| acc + f.block_count())
  }

  /// Get the number of bytes every file in this container combined occupies.
  #[inline]
  #[must_use]
  pub fn file_bytes(&self) -> u64 {
    self.files.iter().fold(0, |acc, f| acc + f.size as u64)
  }

  pub fn get_file(&self, index: usize) -> Result<&tlc::File> {
    self
      .files
      .get(index)
      .ok_or_else(|| Error::corrupt(format!("invalid file index: {index}")))
  }

  /// Find the index of the file at `path`, if one exists.
  ///
  /// Containers are small enough (a handful of thousand entries at most) that a
  /// linear scan is simpler than maintaining a path index alongside the protobuf
  /// message; rediff's analysis pass is the only caller and runs this once per
  /// touched file.
  #[must_use]
  pub fn find_file_by_path(&self, path: &str) -> Option<usize> {
    self.files.iter().position(|f| f.path == path)
  }

  pub fn create_directories(&self, build_folder: &Path) -> Result<()> {
    fs::create_dir_all(build_folder)?;

    for dir in &self.dirs {
      let dir_path = dir.get_path(build_folder)?;
      fs::create_dir_all(&dir_path)?;
    }

    Ok(())
  }

  pub fn create_files(&self, build_folder: &Path) -> Result<()> {
    for file in &self.files {
      let file_path = file.get_path(build_folder)?;

      // The file handle is dropped right after creating it.
      // If the file already exists, it is left untouched.
      fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&file_path)?;
    }

    Ok(())
  }

  pub fn create_symlinks(&self, build_folder: &Path) -> Result<()> {
    for sym in &self.symlinks {
      let sym_path = sym.get_path(build_folder)?;
      symlink(&sym_path, &sym.dest)?;
    }

    Ok(())
  }

  pub fn apply_permissions(&self, build_folder: &Path) -> Result<()> {
    for file in &self.files {
      set_permissions(&file.get_path(build_folder)?, file.mode())?;
    }

    for dir in &self.dirs {
      set_permissions(&dir.get_path(build_folder)?, dir.mode())?;
    }

    for sym in &self.symlinks {
      set_permissions(&sym.get_path(build_folder)?, sym.mode())?;
    }

    Ok(())
  }

  pub fn create(&self, build_folder: &Path) -> Result<()> {
    self.create_directories(build_folder)?;
    self.create_files(build_folder)?;
    self.create_symlinks(build_folder)?;
    self.apply_permissions(build_folder)
  }

  /// Walk a directory tree and build a [`tlc::Container`] describing it.
  ///
  /// Entries are sorted lexicographically by path, matching the wire format's
  /// ordering requirement. A `filter` predicate can reject paths (relative to
  /// `root`) before they're added to the container.
  pub fn walk(root: &Path, filter: impl Fn(&Path) -> bool) -> Result<tlc::Container> {
    let mut dirs = Vec::new();
    let mut symlinks = Vec::new();
    let mut files = Vec::new();
    let mut total_size: i64 = 0;

    for entry in walkdir::WalkDir::new(root).min_depth(1).sort_by_file_name() {
      let entry = entry.map_err(|e| Error::Io(e.into_io_error().unwrap_or_else(|| {
        std::io::Error::other("walkdir entry error")
      })))?;

      let relative = entry.path().strip_prefix(root).unwrap_or(entry.path());
      if !filter(relative) {
        continue;
      }

      let path = relative.to_string_lossy().replace('\\', "/");
      let metadata = entry.metadata().map_err(|e| {
        Error::corrupt(format!("couldn't read metadata for \"{path}\": {e}"))
      })?;

      #[cfg(unix)]
      let mode = {
        use std::os::unix::fs::PermissionsExt;
        mask_mode(metadata.permissions().mode())
      };
      #[cfg(not(unix))]
      let mode: u32 = MIN_MODE;

      if entry.file_type().is_symlink() {
        let dest = fs::read_link(entry.path())?.to_string_lossy().into_owned();
        symlinks.push(tlc::Symlink { path, mode, dest });
      } else if entry.file_type().is_dir() {
        dirs.push(tlc::Dir { path, mode });
      } else {
        let size = metadata.len() as i64;
        total_size += size;
        files.push(tlc::File { path, mode, size });
      }
    }

    Ok(tlc::Container {
      size: total_size,
      dirs,
      symlinks,
      files,
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn block_count_rounds_up_and_floors_at_one() {
    let empty = tlc::File { path: "e".into(), mode: 0o644, size: 0 };
    assert_eq!(empty.block_count(), 1);

    let exact = tlc::File { path: "x".into(), mode: 0o644, size: BLOCK_SIZE as i64 };
    assert_eq!(exact.block_count(), 1);

    let one_over = tlc::File { path: "o".into(), mode: 0o644, size: BLOCK_SIZE as i64 + 1 };
    assert_eq!(one_over.block_count(), 2);
  }

  #[test]
  fn path_safe_push_rejects_parent_escapes() {
    let mut base = PathBuf::from("/tmp/build");
    assert!(path_safe_push(&mut base, Path::new("../../etc/passwd")).is_err());
  }

  #[test]
  fn walk_builds_sorted_container() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("b.txt"), b"hello").unwrap();
    fs::write(dir.path().join("a.txt"), b"world!").unwrap();
    fs::create_dir(dir.path().join("sub")).unwrap();

    let container = tlc::Container::walk(dir.path(), |_| true).unwrap();
    let paths: Vec<_> = container.files.iter().map(|f| f.path.as_str()).collect();
    assert_eq!(paths, vec!["a.txt", "b.txt"]);
    assert_eq!(container.size, 11);
  }
}
