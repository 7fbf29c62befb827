//! First pass over an existing patch: which new files are trivial pass-through
//! copies, and which are candidates for bsdiff optimization against which
//! target file.

use crate::common::BLOCK_SIZE;
use crate::error::Result;
use crate::patch::{Patch, SyncHeaderKind};
use crate::protos::{bsdiff, pwr, tlc};

use std::collections::HashMap;

/// A new file's fully-decoded op stream, read once into memory so both the
/// analysis pass and the pass-through writer can use it without re-parsing
/// the input patch.
#[derive(Debug, Clone)]
pub enum FileOps {
  Rsync(Vec<pwr::SyncOp>),
  Bsdiff {
    target_index: i64,
    controls: Vec<bsdiff::Control>,
  },
}

/// Whether a new file can be left alone, or should be (re-)optimized against
/// some target file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileTouch {
  /// A single full-length `BlockRange` against an equally sized target file:
  /// copying it through unchanged can never make the patch worse.
  Untouched,
  /// Worth attempting a bsdiff pass against `target_index`.
  Touched { target_index: usize },
  /// Touched, but no sensible target file association exists (e.g. a
  /// brand-new file with no old counterpart); left as rsync ops.
  TouchedNoTarget,
}

/// Decode every sync header/op of `patch` into memory, in new-file order.
///
/// This consumes the patch's streaming iterator once; the resulting `FileOps`
/// list is then used both for analysis and, for untouched/unassociated files,
/// to re-emit their op stream unchanged.
pub fn read_patch_ops(patch: &mut Patch<'_>) -> Result<Vec<FileOps>> {
  let mut out = Vec::new();

  while let Some(header) = patch.sync_op_iter.next_header() {
    let header = header?;

    match header.kind {
      SyncHeaderKind::Rsync { op_iter } => {
        let ops = op_iter.collect::<Result<Vec<_>>>()?;
        out.push(FileOps::Rsync(ops));
      }
      SyncHeaderKind::Bsdiff {
        target_index,
        op_iter,
      } => {
        let controls = op_iter.collect::<Result<Vec<_>>>()?;
        out.push(FileOps::Bsdiff {
          target_index,
          controls,
        });
      }
    }
  }

  Ok(out)
}

/// Determine, for every new file, whether it's untouched or a rediff
/// candidate, and if so against which target file.
///
/// Target association: prefer the old file at the same path. Failing that,
/// the old file referenced by the largest total byte volume of `BlockRange`
/// ops; ties are broken by the lowest file index.
#[must_use]
pub fn analyze(container_old: &tlc::Container, container_new: &tlc::Container, ops: &[FileOps]) -> Vec<FileTouch> {
  ops
    .iter()
    .enumerate()
    .map(|(new_index, file_ops)| {
      let new_file = &container_new.files[new_index];

      match file_ops {
        FileOps::Bsdiff { target_index, .. } => FileTouch::Touched {
          target_index: *target_index as usize,
        },
        FileOps::Rsync(sync_ops) => {
          if is_untouched(sync_ops, new_file, container_old) {
            return FileTouch::Untouched;
          }

          if let Some(same_path) = container_old.find_file_by_path(&new_file.path) {
            return FileTouch::Touched {
              target_index: same_path,
            };
          }

          match associate_by_volume(sync_ops) {
            Some(target_index) => FileTouch::Touched { target_index },
            None => FileTouch::TouchedNoTarget,
          }
        }
      }
    })
    .collect()
}

fn is_untouched(sync_ops: &[pwr::SyncOp], new_file: &tlc::File, container_old: &tlc::Container) -> bool {
  let [op] = sync_ops else { return false };

  op.r#type() == pwr::sync_op::Type::BlockRange
    && op.block_index == 0
    && container_old
      .files
      .get(op.file_index as usize)
      .is_some_and(|old_file| {
        old_file.size as u64 == new_file.size as u64
          && op.block_span as u64 == old_file.block_count()
      })
}

fn associate_by_volume(sync_ops: &[pwr::SyncOp]) -> Option<usize> {
  let mut volume_by_file: HashMap<usize, u64> = HashMap::new();

  for op in sync_ops {
    if op.r#type() == pwr::sync_op::Type::BlockRange {
      *volume_by_file.entry(op.file_index as usize).or_insert(0) +=
        op.block_span as u64 * BLOCK_SIZE;
    }
  }

  // Largest volume wins; on a tie, the lowest index. `Reverse(index)` makes
  // `max_by_key` prefer the smallest index when volumes are equal.
  volume_by_file
    .into_iter()
    .max_by_key(|&(index, volume)| (volume, std::cmp::Reverse(index)))
    .map(|(index, _)| index)
}
