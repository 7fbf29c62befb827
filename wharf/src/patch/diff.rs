//! Rsync-style diff engine: finds which blocks of the new files already exist
//! somewhere in the old build, and emits literal data for the rest.

use crate::codec::Registry;
use crate::common::{BLOCK_SIZE, MAGIC_PATCH};
use crate::error::Result;
use crate::hash::{WeakHash, strong_hash};
use crate::pool::Pool;
use crate::progress::{ByteProgress, Consumer};
use crate::protos::{encode_protobuf, pwr, tlc};
use crate::signature::index::SignatureIndex;

use std::io::{Read, Write};

/// Coalesced contiguous block matches are merged into a single `BlockRange`;
/// a match this short still has to pay the overhead of a rsync header, so
/// tiny matches are worth less than they look.
struct PendingRange {
  file_index: i64,
  start_block: u64,
  block_span: u64,
}

/// Configuration for a diff pass: output compression settings.
///
/// Kept as a plain builder-style struct (rather than free function arguments)
/// to mirror [`crate::patch::rediff::RediffContext`] and leave room for
/// future per-call knobs without breaking callers.
#[derive(Debug, Clone)]
pub struct DiffContext {
  pub compression: pwr::CompressionSettings,
}

impl DiffContext {
  #[must_use]
  pub fn new(compression: pwr::CompressionSettings) -> Self {
    Self { compression }
  }

  /// Run [`diff`] using this context's compression settings.
  ///
  /// # Errors
  ///
  /// See [`diff`].
  pub fn diff(
    &self,
    writer: &mut impl Write,
    old_pool: &dyn Pool,
    new_pool: &dyn Pool,
    old_index: &SignatureIndex,
    codecs: &Registry,
    consumer: &mut dyn Consumer,
  ) -> Result<()> {
    diff(writer, old_pool, new_pool, old_index, self.compression.clone(), codecs, consumer)
  }
}

/// Diff `new_pool` against `old_pool`, using `old_index` (built from the old
/// build's signature) to find reusable blocks, and write a patch to `writer`.
///
/// Each new file is scanned through a rolling window of at most `BLOCK_SIZE`
/// bytes: at every byte boundary the window's weak hash is looked up, and a
/// hit is confirmed by strong hash and length via [`SignatureIndex::find`]
/// before being referenced as a `BlockRange` into the matching old file.
/// Everything that never matches is literally embedded as `Data`.
pub fn diff(
  writer: &mut impl Write,
  old_pool: &dyn Pool,
  new_pool: &dyn Pool,
  old_index: &SignatureIndex,
  compression: pwr::CompressionSettings,
  codecs: &Registry,
  consumer: &mut dyn Consumer,
) -> Result<()> {
  writer.write_all(&MAGIC_PATCH.to_le_bytes())?;

  let algorithm = compression.algorithm();
  let quality = compression.quality;

  let header = pwr::PatchHeader {
    compression: Some(compression),
  };
  encode_protobuf(&header, writer)?;

  let mut out = codecs.wrap_writer(algorithm, Box::new(&mut *writer), quality)?;

  encode_protobuf(old_pool.container(), &mut out)?;
  encode_protobuf(new_pool.container(), &mut out)?;

  let block_size = BLOCK_SIZE as usize;
  let mut progress = ByteProgress::new(consumer, new_pool.container().size as u64);

  for new_index in 0..new_pool.container().files.len() {
    let mut reader = new_pool.open(new_index)?;
    let mut data = Vec::new();
    reader.read_to_end(&mut data)?;

    progress.label(&new_pool.container().files[new_index].path);

    let sync_header = pwr::SyncHeader {
      r#type: pwr::sync_header::Type::Rsync as i32,
      file_index: new_index as i64,
    };
    encode_protobuf(&sync_header, &mut out)?;

    let mut literal: Vec<u8> = Vec::new();
    let mut pending: Option<PendingRange> = None;

    let len = data.len();
    let mut pos = 0usize;
    let mut window_len = block_size.min(len);
    let mut weak = WeakHash::new();
    if window_len > 0 {
      weak.init(&data[pos..pos + window_len]);
    }

    // Scan the file through a rolling window of at most BLOCK_SIZE bytes,
    // checking a weak+strong hash match at every byte boundary and only
    // re-initializing the window (instead of rotating it) when it moves past
    // a match or shrinks at the file's tail.
    while pos < len {
      let window = &data[pos..pos + window_len];
      let strong = strong_hash(window);
      let found = old_index.find(weak.digest(), window_len as u64, &strong);

      match found {
        Some(locator) => {
          progress.add(window_len as u64);

          if !literal.is_empty() {
            flush_literal(&mut out, new_index as i64, &mut literal)?;
          }

          match &mut pending {
            Some(range)
              if range.file_index == locator.file_index as i64
                && range.start_block + range.block_span == locator.block_index =>
            {
              range.block_span += 1;
            }
            _ => {
              if let Some(range) = pending.take() {
                flush_range(&mut out, new_index as i64, &range)?;
              }
              pending = Some(PendingRange {
                file_index: locator.file_index as i64,
                start_block: locator.block_index,
                block_span: 1,
              });
            }
          }

          pos += window_len;
          window_len = block_size.min(len - pos);
          if window_len > 0 {
            weak.init(&data[pos..pos + window_len]);
          }
        }
        None => {
          progress.add(1);

          if let Some(range) = pending.take() {
            flush_range(&mut out, new_index as i64, &range)?;
          }
          literal.push(data[pos]);

          let old_byte = data[pos];
          pos += 1;
          if pos >= len {
            window_len = 0;
          } else if pos + window_len <= len {
            let new_byte = data[pos + window_len - 1];
            weak.rotate(old_byte, new_byte);
          } else {
            window_len = len - pos;
            weak.init(&data[pos..pos + window_len]);
          }
        }
      }
    }

    if let Some(range) = pending.take() {
      flush_range(&mut out, new_index as i64, &range)?;
    }
    if !literal.is_empty() {
      flush_literal(&mut out, new_index as i64, &mut literal)?;
    }

    write_hey_you_did_it(&mut out)?;
  }

  out.flush()?;
  Ok(())
}

fn flush_range(
  out: &mut impl Write,
  file_index: i64,
  range: &PendingRange,
) -> Result<()> {
  let op = pwr::SyncOp {
    r#type: pwr::sync_op::Type::BlockRange as i32,
    file_index: range.file_index,
    block_index: range.start_block as i64,
    block_span: range.block_span as i64,
    data: Vec::new(),
  };
  let _ = file_index;
  encode_protobuf(&op, out)
}

fn flush_literal(out: &mut impl Write, file_index: i64, literal: &mut Vec<u8>) -> Result<()> {
  let op = pwr::SyncOp {
    r#type: pwr::sync_op::Type::Data as i32,
    file_index,
    block_index: 0,
    block_span: 0,
    data: std::mem::take(literal),
  };
  encode_protobuf(&op, out)
}

/// Write the closing `HeyYouDidIt` rsync sentinel for a file's sync ops.
pub(crate) fn write_hey_you_did_it(out: &mut impl Write) -> Result<()> {
  let op = pwr::SyncOp {
    r#type: pwr::sync_op::Type::HeyYouDidIt as i32,
    ..Default::default()
  };
  encode_protobuf(&op, out)
}
