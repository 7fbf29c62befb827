use super::{BlockHashIter, Signature};
use crate::codec::Registry;
use crate::common::{MAGIC_SIGNATURE, check_magic_bytes};
use crate::error::Result;
use crate::protos::{decode_protobuf, pwr, tlc};

use std::io::{BufRead, Read};

impl<R> BlockHashIter<R>
where
  R: Read,
{
  pub fn skip_blocks(&mut self, blocks_to_skip: u64) -> Result<()> {
    for _ in 0..blocks_to_skip {
      crate::protos::skip_protobuf(&mut self.reader)?;
    }

    self.blocks_read += blocks_to_skip;

    Ok(())
  }
}

impl<R> Iterator for BlockHashIter<R>
where
  R: Read,
{
  type Item = Result<pwr::BlockHash>;

  fn next(&mut self) -> Option<Self::Item> {
    if self.blocks_read == self.total_blocks {
      return None;
    }

    self.blocks_read += 1;
    Some(decode_protobuf::<pwr::BlockHash>(&mut self.reader))
  }
}

impl<'a> Signature<'a> {
  /// Dump the signature contents to standard output
  ///
  /// This prints the header, container metadata, and all block hash operations
  /// for inspection by a human reader. The internal block hash iterator is
  /// consumed during this call.
  pub fn dump_stdout(&mut self) -> Result<()> {
    println!("{:?}", self.header);

    println!("\n--- START CONTAINER INFO ---\n");
    self.container_new.dump_stdout();
    println!("\n--- END CONTAINER INFO ---");

    println!("--- START HASH BLOCKS ---\n");
    for op in self.block_hash_iter.by_ref() {
      println!("{:?}", op?);
    }

    println!("\n--- END HASH BLOCKS ---");

    Ok(())
  }

  /// Decode a binary wharf signature assuming the magic bytes
  /// have already been consumed from the input stream
  ///
  /// For more information, see [`Signature::read`].
  pub fn read_without_magic(reader: &'a mut impl BufRead, codecs: &Registry) -> Result<Self> {
    let header = decode_protobuf::<pwr::SignatureHeader>(reader)?;

    let algorithm = header
      .compression
      .unwrap_or_default()
      .algorithm();

    let decompressed = codecs.wrap_reader(algorithm, Box::new(reader))?;
    let mut decompressed: Box<dyn BufRead + 'a> = decompressed;

    let container_new = decode_protobuf::<tlc::Container>(&mut decompressed)?;

    let block_hash_iter = BlockHashIter::from_parts(decompressed, container_new.file_blocks());

    Ok(Signature {
      header,
      container_new,
      block_hash_iter,
    })
  }

  /// Decode a binary wharf signature
  ///
  /// If the magic bytes have already been read, use [`Signature::read_without_magic`].
  ///
  /// # References
  ///
  /// <https://docs.itch.zone/wharf/master/file-formats/signatures.html>
  pub fn read(reader: &'a mut impl BufRead, codecs: &Registry) -> Result<Self> {
    check_magic_bytes(reader, MAGIC_SIGNATURE)?;
    Self::read_without_magic(reader, codecs)
  }
}
