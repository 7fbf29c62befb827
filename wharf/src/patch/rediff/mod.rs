//! Patch-optimization engine: re-expresses an existing patch's rsync-style
//! block references as a tighter bsdiff-style byte diff, without needing the
//! original build that produced it.

pub mod analysis;
pub mod optimize;
mod worker;

use super::Patch;
use crate::cancel::CancellationToken;
use crate::codec::Registry;
use crate::error::Result;
use crate::pool::Pool;
use crate::progress::Consumer;
use crate::protos::pwr;

use std::io::Write;

/// Default cap on how large a target file's suffix array construction is
/// allowed to get before rediff gives up and leaves the file untouched.
///
/// The `suffix_array` crate keeps one `u32` per input byte alongside working
/// buffers, so this bounds peak per-file memory to roughly five times the
/// file's size.
pub const DEFAULT_MAX_TARGET_FILE_SIZE: u64 = 512 * 1024 * 1024;

/// Configuration for a rediff pass: worker count, memory ceiling, output
/// compression, and a cooperative cancellation signal.
pub struct RediffContext {
  pub workers: usize,
  pub max_target_file_size: u64,
  pub compression: pwr::CompressionSettings,
  pub cancel: CancellationToken,
}

impl RediffContext {
  /// A sequential (single-threaded) context with no compression and no size cap.
  #[must_use]
  pub fn new(compression: pwr::CompressionSettings) -> Self {
    Self {
      workers: 0,
      max_target_file_size: DEFAULT_MAX_TARGET_FILE_SIZE,
      compression,
      cancel: CancellationToken::new(),
    }
  }

  #[must_use]
  pub fn with_workers(mut self, workers: usize) -> Self {
    self.workers = workers;
    self
  }

  #[must_use]
  pub fn with_max_target_file_size(mut self, max_target_file_size: u64) -> Self {
    self.max_target_file_size = max_target_file_size;
    self
  }

  /// Optimize `patch` against `old_pool`/`new_pool`, writing the result to `writer`.
  ///
  /// `patch` must have been parsed against the same two containers as
  /// `old_pool`/`new_pool`; its operation stream is fully consumed by this call.
  ///
  /// # Errors
  ///
  /// Returns [`crate::error::Error::Cancelled`] if `self.cancel` is signalled
  /// before the pass completes, or an I/O/corruption error from reading the
  /// input patch or writing the output.
  pub fn rediff(
    &self,
    patch: &mut Patch<'_>,
    old_pool: &dyn Pool,
    new_pool: &dyn Pool,
    writer: &mut impl Write,
    codecs: &Registry,
    consumer: &mut dyn Consumer,
  ) -> Result<()> {
    worker::rediff(
      patch,
      old_pool,
      new_pool,
      writer,
      self.compression.clone(),
      codecs,
      self.workers,
      self.max_target_file_size,
      &self.cancel,
      consumer,
    )
  }
}
