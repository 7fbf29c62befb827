pub mod writer;

use crate::common::BLOCK_SIZE;
use crate::error::{Error, Result};
use crate::signature::BlockHashIter;

use md5::{Digest, Md5};
use std::io::Read;

pub const MD5_HASH_LENGTH: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockHasherStatus {
  Ok,
  HashMismatch {
    expected: Vec<u8>,
    found: [u8; MD5_HASH_LENGTH],
  },
}

pub struct BlockHasher<'a, R> {
  hash_iter: &'a mut BlockHashIter<R>,
  hasher: Md5,
  hash_buffer: [u8; MD5_HASH_LENGTH],

  last_file_remaining_blocks: u64,
}

impl<'a, R> BlockHasher<'a, R> {
  pub fn new(hash_iter: &'a mut BlockHashIter<R>) -> Self {
    Self {
      hash_iter,
      hasher: Md5::new(),
      hash_buffer: [0u8; MD5_HASH_LENGTH],

      last_file_remaining_blocks: 0,
    }
  }
}

impl<'a, R> BlockHasher<'a, R>
where
  R: Read,
{
  pub fn new_file_hasher(&mut self, total_blocks: u64) -> Result<FileBlockHasher<'_, 'a, R>> {
    // Reset the hasher, allowing it to hash another file
    self.hasher.reset();

    // Skip the blocks of the previous file that have not been hashed,
    // to advance the iterator into the correct position
    self.hash_iter.skip_blocks(self.last_file_remaining_blocks)?;

    self.last_file_remaining_blocks = total_blocks;

    Ok(FileBlockHasher {
      block_hasher: self,
      first_block: true,
      written_bytes: 0,
    })
  }
}

pub struct FileBlockHasher<'hasher, 'hasher_reader, R> {
  block_hasher: &'hasher mut BlockHasher<'hasher_reader, R>,

  first_block: bool,
  written_bytes: usize,
}

impl<R: Read> FileBlockHasher<'_, '_, R> {
  /// Feed more bytes of the current file to the hasher
  pub fn update(&mut self, buf: &[u8]) -> Result<BlockHasherStatus> {
    let mut offset: usize = 0;

    while offset < buf.len() {
      if self.block_hasher.last_file_remaining_blocks == 0 {
        return Err(Error::corrupt("hashed more data than the file declares"));
      }

      let block_remaining = BLOCK_SIZE as usize - self.written_bytes;
      let to_take = block_remaining.min(buf.len() - offset);
      let slice = &buf[offset..offset + to_take];

      self.block_hasher.hasher.update(slice);

      offset += to_take;
      self.written_bytes += to_take;

      if self.written_bytes == BLOCK_SIZE as usize {
        let status = self.finalize_block()?;
        if matches!(status, BlockHasherStatus::HashMismatch { .. }) {
          return Ok(status);
        }
      }
    }

    Ok(BlockHasherStatus::Ok)
  }

  /// Finalize the current data in the hasher and check the current block
  ///
  /// Doesn't hash the block if it's empty, unless it's the first one: wharf
  /// still saves a hash for an empty file.
  pub fn finalize_block(&mut self) -> Result<BlockHasherStatus> {
    if self.written_bytes == 0 && !self.first_block {
      return Ok(BlockHasherStatus::Ok);
    }

    self.first_block = false;
    self.written_bytes = 0;

    let digest = self.block_hasher.hasher.finalize_reset();
    self.block_hasher.hash_buffer.copy_from_slice(&digest);

    let next_hash = self
      .block_hasher
      .hash_iter
      .next()
      .ok_or_else(|| Error::corrupt("expected a block hash from the iterator, got EOF"))??;

    self.block_hasher.last_file_remaining_blocks -= 1;

    if self.block_hasher.hash_buffer[..] != next_hash.strong_hash[..] {
      return Ok(BlockHasherStatus::HashMismatch {
        expected: next_hash.strong_hash,
        found: self.block_hasher.hash_buffer,
      });
    }

    Ok(BlockHasherStatus::Ok)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::protos::{encode_protobuf, pwr};

  fn hash_iter_of(hashes: &[pwr::BlockHash]) -> BlockHashIter<std::io::Cursor<Vec<u8>>> {
    let mut buf = Vec::new();
    for h in hashes {
      encode_protobuf(h, &mut buf).unwrap();
    }
    BlockHashIter::from_parts(std::io::Cursor::new(buf), hashes.len() as u64)
  }

  fn block_hash(data: &[u8]) -> pwr::BlockHash {
    pwr::BlockHash {
      weak_hash: 0,
      strong_hash: crate::hash::strong_hash(data).to_vec(),
    }
  }

  #[test]
  fn matching_block_hash_is_ok() {
    let data = b"hello wharf!";
    let mut iter = hash_iter_of(&[block_hash(data)]);
    let mut hasher = BlockHasher::new(&mut iter);
    let mut file_hasher = hasher.new_file_hasher(1).unwrap();

    assert_eq!(file_hasher.update(data).unwrap(), BlockHasherStatus::Ok);
    assert_eq!(file_hasher.finalize_block().unwrap(), BlockHasherStatus::Ok);
  }

  #[test]
  fn mismatched_block_hash_is_reported() {
    let mut iter = hash_iter_of(&[block_hash(b"expected contents")]);
    let mut hasher = BlockHasher::new(&mut iter);
    let mut file_hasher = hasher.new_file_hasher(1).unwrap();

    file_hasher.update(b"different contents!").unwrap();
    let status = file_hasher.finalize_block().unwrap();
    assert!(matches!(status, BlockHasherStatus::HashMismatch { .. }));
  }

  #[test]
  fn empty_file_still_gets_one_hash() {
    let mut iter = hash_iter_of(&[block_hash(b"")]);
    let mut hasher = BlockHasher::new(&mut iter);
    let mut file_hasher = hasher.new_file_hasher(1).unwrap();

    assert_eq!(file_hasher.finalize_block().unwrap(), BlockHasherStatus::Ok);
  }
}
