use crate::error::Result;
use crate::patch::BsdiffOpIter;
use crate::pool::ReadSeek;

use std::io::{Read, Write};

/// Read a block from `src`, add corresponding bytes from `add`, and write the result to `dst`
fn add_bytes(
  src: &mut impl Read,
  dst: &mut impl Write,
  add: &[u8],
  add_buffer: &mut [u8],
) -> Result<()> {
  assert_eq!(add.len(), add_buffer.len());

  src.read_exact(add_buffer)?;

  for i in 0..add.len() {
    add_buffer[i] = add_buffer[i].wrapping_add(add[i]);
  }

  dst.write_all(add_buffer)?;
  Ok(())
}

/// Apply all `op_iter` bsdiff operations to regenerate the new file
/// into `writer` from `old_file`
pub fn apply_bsdiff(
  op_iter: &mut BsdiffOpIter<impl Read>,
  writer: &mut impl Write,
  old_file: &mut dyn ReadSeek,
  add_buffer: &mut Vec<u8>,
  progress_callback: &mut impl FnMut(u64),
) -> Result<()> {
  for control in op_iter {
    let control = control?;

    // First, add the diff bytes
    if !control.add.is_empty() {
      add_buffer.resize(control.add.len(), 0);
      add_bytes(old_file, writer, &control.add, add_buffer)?;
      progress_callback(control.add.len() as u64);
    }

    // Then, copy the extra bytes
    if !control.copy.is_empty() {
      writer.write_all(&control.copy)?;
      progress_callback(control.copy.len() as u64);
    }

    // Lastly, seek into the correct position in the old file
    if control.seek != 0 {
      old_file.seek_relative(control.seek)?;
    }
  }

  Ok(())
}
