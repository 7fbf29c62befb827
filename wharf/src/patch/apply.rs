mod bsdiff;
mod rsync;

use super::{Patch, SyncHeader, SyncHeaderKind};
use crate::error::{Error, Result};
use crate::hasher::BlockHasher;
use crate::pool::{Pool, ReadSeek};
use crate::progress::{ByteProgress, Consumer};
use crate::protos::pwr;
use crate::signature::BlockHashIter;

use std::io::{Read, Seek, Write};
use std::path::Path;

const MAX_OPEN_FILES_PATCH: std::num::NonZeroUsize = std::num::NonZeroUsize::new(16).unwrap();

/// Whether the file to be patched was actually patched or was skipped
/// because it was an exact copy of an old file.
enum PatchFileStatus {
  Patched,
  Skipped,
}

impl<R: Read> SyncHeader<'_, R> {
  /// Apply all the patch operations in the given header and
  /// write them into `writer`
  #[allow(clippy::too_many_arguments)]
  fn patch_file(
    &mut self,
    writer: &mut impl Write,
    new_file_size: u64,
    old_files_cache: &mut lru::LruCache<usize, Box<dyn ReadSeek>>,
    old_pool: &dyn Pool,
    add_buffer: &mut Vec<u8>,
    progress_callback: &mut impl FnMut(u64),
  ) -> Result<PatchFileStatus> {
    match self.kind {
      SyncHeaderKind::Rsync { ref mut op_iter } => {
        // Rsync operations can be used to determine literal copies of
        // files into the new container.
        //
        // For that reason, check if the *first* operation represents a literal copy
        let first = match op_iter.next() {
          Some(op) => op?,
          // Even if the file is empty, it is represented with an empty Data message.
          None => {
            return Err(Error::corrupt(
              "expected the first SyncOp for this file, got none",
            ));
          }
        };

        if first.is_literal_copy(new_file_size, old_pool.container()) {
          // IMPORTANT! To not break the iterator, call next() one more time
          // This way, the last message (HeyYouDidIt) for this file is read.
          match op_iter.next() {
            None => (),
            _ => {
              return Err(Error::corrupt(
                "another SyncOp was found after detecting a literal copy",
              ));
            }
          }

          progress_callback(new_file_size);
          return Ok(PatchFileStatus::Skipped);
        }

        // Finally, apply all the rsync operations
        // Don't forget the first one, which was obtained independently!
        for op in std::iter::once(Ok(first)).chain(op_iter) {
          let op = op?;
          op.apply(writer, old_files_cache, old_pool, progress_callback)?;
        }
      }

      SyncHeaderKind::Bsdiff {
        target_index,
        ref mut op_iter,
      } => {
        let old_file = old_files_cache
          .try_get_or_insert_mut(target_index as usize, || old_pool.open(target_index as usize))?;

        // Rewind the old file to the start because the file might
        // have been in the cache and seeked before
        old_file.rewind()?;

        bsdiff::apply_bsdiff(op_iter, writer, old_file.as_mut(), add_buffer, progress_callback)?;
      }
    }

    Ok(PatchFileStatus::Patched)
  }
}

impl pwr::SyncOp {
  /// Whether this single, first operation of a file is a byte-for-byte copy
  /// of an old file of the same size: a full-file `BlockRange` spanning
  /// every block of the old file, starting at block zero.
  fn is_literal_copy(&self, new_file_size: u64, container_old: &crate::protos::tlc::Container) -> bool {
    self.r#type() == pwr::sync_op::Type::BlockRange
      && self.block_index == 0
      && container_old
        .files
        .get(self.file_index as usize)
        .is_some_and(|f| {
          f.size as u64 == new_file_size && self.block_span as u64 == f.block_count()
        })
  }
}

/// Configuration for an apply pass.
///
/// Currently carries no knobs beyond what [`Patch::apply`] already takes
/// directly; kept as a struct to match the builder-style shape of
/// [`crate::patch::diff::DiffContext`] and [`crate::patch::rediff::RediffContext`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ApplyContext;

impl ApplyContext {
  #[must_use]
  pub fn new() -> Self {
    Self
  }

  /// Run [`Patch::apply`] with this context.
  ///
  /// # Errors
  ///
  /// See [`Patch::apply`].
  pub fn apply(
    &self,
    patch: &mut Patch<'_>,
    old_pool: &dyn Pool,
    new_build_folder: &Path,
    hash_iter: Option<&mut BlockHashIter<impl Read>>,
    consumer: &mut dyn Consumer,
  ) -> Result<()> {
    patch.apply(old_pool, new_build_folder, hash_iter, consumer)
  }
}

impl Patch<'_> {
  /// Apply the patch operations to produce the new build.
  ///
  /// This creates all files, directories, and symlinks in `new_build_folder`,
  /// then applies each sync operation (rsync or bsdiff) using data from
  /// `old_pool`. Written data is hashed on the fly and verified against
  /// `hash_iter` (if provided). Progress and file-label updates are reported
  /// through `consumer` as the patch is applied.
  ///
  /// # Errors
  ///
  /// If there is an I/O failure while reading files or metadata, or if hash
  /// verification of the generated files fails
  pub fn apply(
    &mut self,
    old_pool: &dyn Pool,
    new_build_folder: &Path,
    hash_iter: Option<&mut BlockHashIter<impl Read>>,
    consumer: &mut dyn Consumer,
  ) -> Result<()> {
    self.container_new.create(new_build_folder)?;

    // Cache of open file descriptors for the old files, keyed by old file index
    let mut old_files_cache: lru::LruCache<usize, Box<dyn ReadSeek>> =
      lru::LruCache::new(MAX_OPEN_FILES_PATCH);

    // Reused across bsdiff add operations to avoid repeated allocation
    let mut add_buffer: Vec<u8> = Vec::new();

    let mut hasher = hash_iter.map(BlockHasher::new);
    let mut progress = ByteProgress::new(consumer, self.container_new.size as u64);

    while let Some(header) = self.sync_op_iter.next_header() {
      let mut header = header?;

      let new_container_file = self.container_new.get_file(header.file_index as usize)?;
      let new_file_size = new_container_file.size as u64;
      let new_path = new_container_file.get_path(new_build_folder)?;
      let mut new_file = std::fs::File::create(&new_path)?;

      progress.label(&new_container_file.path);
      let mut progress_callback = |n: u64| progress.add(n);

      match &mut hasher {
        Some(h) => {
          let mut file_hasher = h.new_file_hasher(new_container_file.block_count())?;
          let mut hash_writer = crate::hasher::writer::HashWriter::new(&mut new_file, &mut file_hasher);

          header.patch_file(
            &mut hash_writer,
            new_file_size,
            &mut old_files_cache,
            old_pool,
            &mut add_buffer,
            &mut progress_callback,
          )?;

          // If the file doesn't finish with a full block, hash it anyways!
          hash_writer.finalize_block()?;
        }
        None => {
          header.patch_file(
            &mut new_file,
            new_file_size,
            &mut old_files_cache,
            old_pool,
            &mut add_buffer,
            &mut progress_callback,
          )?;
        }
      }
    }

    Ok(())
  }
}
