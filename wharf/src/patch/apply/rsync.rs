use crate::common::BLOCK_SIZE;
use crate::error::Result;
use crate::pool::{Pool, ReadSeek};
use crate::protos::pwr;

use std::io::{self, Read, Seek, Write};

/// Copy blocks of bytes from `src` into `dst`
fn copy_range(
  src: &mut (impl Read + Seek + ?Sized),
  dst: &mut impl Write,
  block_index: u64,
  block_span: u64,
) -> Result<u64> {
  let start_pos = block_index * BLOCK_SIZE;
  let len = block_span * BLOCK_SIZE;

  src.seek(io::SeekFrom::Start(start_pos))?;

  let mut limited = src.take(len);
  Ok(io::copy(&mut limited, dst)?)
}

impl pwr::SyncOp {
  /// Apply the `op` rsync operation into the writer
  pub fn apply(
    &self,
    writer: &mut impl Write,
    old_files_cache: &mut lru::LruCache<usize, Box<dyn ReadSeek>>,
    old_pool: &dyn Pool,
    progress_callback: &mut impl FnMut(u64),
  ) -> Result<()> {
    match self.r#type() {
      // If the type is BlockRange, copy the range from the old file to the new one
      pwr::sync_op::Type::BlockRange => {
        let old_file = old_files_cache
          .try_get_or_insert_mut(self.file_index as usize, || {
            old_pool.open(self.file_index as usize)
          })?;

        let written_bytes = copy_range(
          old_file.as_mut(),
          writer,
          self.block_index as u64,
          self.block_span as u64,
        )?;

        progress_callback(written_bytes);
      }
      // If the type is Data, just copy the data from the patch to the new file
      pwr::sync_op::Type::Data => {
        writer.write_all(&self.data)?;
        progress_callback(self.data.len() as u64);
      }
      // If the type is HeyYouDidIt, then the iterator would have returned None
      pwr::sync_op::Type::HeyYouDidIt => unreachable!(),
    }

    Ok(())
  }
}
