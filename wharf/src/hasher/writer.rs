use super::{BlockHasherStatus, FileBlockHasher};
use crate::error::{Error, Result};

use std::io::{self, Read, Write};

/// Wraps a writer, transparently hashing everything written through it and
/// checking each finished block against the expected signature hash.
///
/// A mismatch surfaces as an [`io::Error`] from [`Write::write`], so existing
/// `io::copy`-based callers propagate it without any special casing.
pub struct HashWriter<'h, 'hasher, 'hasher_reader, R, W> {
  writer: &'h mut W,
  hasher: &'h mut FileBlockHasher<'hasher, 'hasher_reader, R>,
}

impl<'h, 'hasher, 'hasher_reader, R, W> HashWriter<'h, 'hasher, 'hasher_reader, R, W> {
  pub fn new(writer: &'h mut W, hasher: &'h mut FileBlockHasher<'hasher, 'hasher_reader, R>) -> Self {
    Self { writer, hasher }
  }
}

impl<R: Read, W> HashWriter<'_, '_, '_, R, W> {
  pub fn finalize_block(&mut self) -> Result<()> {
    status_to_result(self.hasher.finalize_block()?)
  }
}

fn status_to_result(status: BlockHasherStatus) -> Result<()> {
  match status {
    BlockHasherStatus::Ok => Ok(()),
    BlockHasherStatus::HashMismatch { expected, found } => Err(Error::corrupt(format!(
      "block hash mismatch while applying: expected {expected:x?}, found {found:x?}"
    ))),
  }
}

impl<R: Read, W: Write> Write for HashWriter<'_, '_, '_, R, W> {
  fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
    status_to_result(self.hasher.update(buf).map_err(io::Error::other)?).map_err(io::Error::other)?;
    self.writer.write(buf)
  }

  fn flush(&mut self) -> io::Result<()> {
    self.writer.flush()
  }

  fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
    status_to_result(self.hasher.update(buf).map_err(io::Error::other)?).map_err(io::Error::other)?;
    self.writer.write_all(buf)
  }
}
