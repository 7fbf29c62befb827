use super::Signature;
use crate::common::BLOCK_SIZE;
use crate::error::Result;
use crate::hasher::{BlockHasher, BlockHasherStatus};
use crate::pool::Pool;
use crate::progress::{ByteProgress, Consumer};
use crate::protos::tlc;

use std::io::Read;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntegrityIssues {
  /// Contains the indexes of the broken files in the new container
  ///
  /// This slice must NOT contain duplicates!
  pub files: Box<[usize]>,
}

impl IntegrityIssues {
  #[must_use]
  pub fn are_files_intact(&self) -> bool {
    self.files.is_empty()
  }

  #[must_use]
  pub fn bytes_to_fix(&self, container: &tlc::Container) -> u64 {
    self
      .files
      .iter()
      .fold(0, |acc, &i| acc + container.files[i].size as u64)
  }
}

/// Check if the provided file is intact or broken
fn check_file_integrity<R: Read>(
  pool: &dyn Pool,
  file_index: usize,
  file_size: u64,
  hasher: &mut crate::hasher::FileBlockHasher<R>,
  buffer: &mut [u8],
  progress_callback: &mut impl FnMut(u64),
) -> Result<bool> {
  let mut file = match pool.open(file_index) {
    Ok(file) => file,
    Err(_) => {
      progress_callback(file_size);
      return Ok(false);
    }
  };

  if pool.len(file_index)? != file_size {
    progress_callback(file_size);
    return Ok(false);
  }

  let mut total_read_bytes: u64 = 0;

  loop {
    let read_bytes = file.read(buffer)?;

    if read_bytes == 0 {
      break;
    }

    progress_callback(read_bytes as u64);
    total_read_bytes += read_bytes as u64;

    let status = hasher.update(&buffer[..read_bytes])?;

    if let BlockHasherStatus::HashMismatch { .. } = status {
      progress_callback(file_size - total_read_bytes);
      return Ok(false);
    }
  }

  let status = hasher.finalize_block()?;
  if let BlockHasherStatus::HashMismatch { .. } = status {
    return Ok(false);
  }

  Ok(true)
}

impl Signature<'_> {
  /// Verify the integrity of all files in the container
  ///
  /// This function iterates over every file in the container and checks if
  /// it exists and is not corrupted.
  ///
  /// Files that are missing, have mismatched sizes, or contain corrupted
  /// blocks are collected and returned in the [`IntegrityIssues`] structure.
  ///
  /// This function does NOT check if the folders and symlinks in the container
  /// exist on the disk or if the modes (permissions) of the files, folders
  /// and symlinks are correct.
  ///
  /// # Arguments
  ///
  /// * `pool` - Random-access source for the candidate (possibly broken) files
  ///
  /// * `consumer` - Receives progress fraction and per-file label updates as
  ///   files are checked
  ///
  /// # Errors
  ///
  /// If there is an I/O failure while reading files or metadata.
  pub fn verify_files(
    &'_ mut self,
    pool: &dyn Pool,
    consumer: &mut dyn Consumer,
  ) -> Result<IntegrityIssues> {
    let mut broken_files: Vec<usize> = Vec::new();

    let mut hasher = BlockHasher::new(&mut self.block_hash_iter);

    // The length of the buffer doesn't need to be BLOCK_SIZE, any value is valid
    let mut buffer = vec![0u8; BLOCK_SIZE as usize];
    let mut progress = ByteProgress::new(consumer, self.container_new.size as u64);

    for (file_index, container_file) in self.container_new.files.iter().enumerate() {
      let mut file_hasher = hasher.new_file_hasher(container_file.block_count())?;
      progress.label(&container_file.path);
      let mut progress_callback = |n: u64| progress.add(n);

      let is_intact = check_file_integrity(
        pool,
        file_index,
        container_file.size as u64,
        &mut file_hasher,
        &mut buffer,
        &mut progress_callback,
      )?;

      if !is_intact {
        broken_files.push(file_index);
      }
    }

    Ok(IntegrityIssues {
      files: broken_files.into_boxed_slice(),
    })
  }
}
