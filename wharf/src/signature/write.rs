use crate::codec::Registry;
use crate::common::{BLOCK_SIZE, MAGIC_SIGNATURE};
use crate::error::Result;
use crate::hash::{WeakHash, strong_hash};
use crate::pool::Pool;
use crate::progress::{ByteProgress, Consumer};
use crate::protos::{encode_protobuf, pwr};

use std::io::Write;

/// Compute and encode a wharf signature for every file in `pool`.
///
/// Writes the magic bytes, the header, and then the compressed container
/// followed by one [`pwr::BlockHash`] per block of every file, in container
/// order. An empty file still contributes exactly one hash, of its (empty)
/// single block, mirroring [`crate::container::tlc::File::block_count`].
pub fn write_signature(
  writer: &mut impl Write,
  pool: &dyn Pool,
  compression: pwr::CompressionSettings,
  codecs: &Registry,
  consumer: &mut dyn Consumer,
) -> Result<()> {
  writer.write_all(&MAGIC_SIGNATURE.to_le_bytes())?;

  let algorithm = compression.algorithm();
  let quality = compression.quality;

  let header = pwr::SignatureHeader {
    compression: Some(compression),
  };
  encode_protobuf(&header, writer)?;

  let mut compressed = codecs.wrap_writer(algorithm, Box::new(&mut *writer), quality)?;

  encode_protobuf(pool.container(), &mut compressed)?;

  let mut block = vec![0u8; BLOCK_SIZE as usize];
  let mut progress = ByteProgress::new(consumer, pool.container().size as u64);

  for file_index in 0..pool.container().files.len() {
    let mut file = pool.open(file_index)?;
    let total_blocks = pool.container().files[file_index].block_count();
    progress.label(&pool.container().files[file_index].path);

    for _ in 0..total_blocks {
      let filled = read_block(&mut file, &mut block)?;
      let data = &block[..filled];

      let mut weak = WeakHash::new();
      weak.init(data);

      let hash = pwr::BlockHash {
        weak_hash: weak.digest(),
        strong_hash: strong_hash(data).to_vec(),
      };
      encode_protobuf(&hash, &mut compressed)?;
      progress.add(filled as u64);
    }
  }

  compressed.flush()?;
  Ok(())
}

/// Fill `buffer` from `reader`, stopping at EOF, and return how many bytes were read.
fn read_block(reader: &mut impl std::io::Read, buffer: &mut [u8]) -> Result<usize> {
  let mut filled = 0;
  while filled < buffer.len() {
    let n = reader.read(&mut buffer[filled..])?;
    if n == 0 {
      break;
    }
    filled += n;
  }
  Ok(filled)
}
