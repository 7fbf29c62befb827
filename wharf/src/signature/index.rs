//! Maps weak hashes to candidate blocks, letting the diff engine narrow a byte
//! offset in the new file down to a handful of strong-hash checks instead of
//! scanning the whole old container.

use crate::common::BLOCK_SIZE;
use crate::protos::{pwr, tlc};

use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockLocator {
  pub file_index: usize,
  pub block_index: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct IndexedBlock {
  locator: BlockLocator,
  length: u64,
  strong_hash: Vec<u8>,
}

/// An index of every block hash in a signature, keyed by weak hash.
///
/// Multiple blocks (even across different files) commonly share a weak hash;
/// callers must always confirm a candidate with its strong hash (and, crucially,
/// its length) before treating it as a real match.
pub struct SignatureIndex {
  by_weak_hash: HashMap<u32, Vec<IndexedBlock>>,
}

impl SignatureIndex {
  /// Build an index from a container and the block hashes for each of its
  /// files, in the same order [`crate::signature::write::write_signature`] emits
  /// them: file by file, block by block.
  #[must_use]
  pub fn build(container: &tlc::Container, hashes: &[pwr::BlockHash]) -> Self {
    let mut by_weak_hash: HashMap<u32, Vec<IndexedBlock>> = HashMap::new();
    let mut hash_cursor = hashes.iter();

    for (file_index, file) in container.files.iter().enumerate() {
      let total_blocks = file.block_count();
      let mut remaining = file.size as u64;

      for block_index in 0..total_blocks {
        let Some(hash) = hash_cursor.next() else {
          break;
        };
        let length = remaining.min(BLOCK_SIZE);
        remaining = remaining.saturating_sub(length);

        by_weak_hash
          .entry(hash.weak_hash)
          .or_default()
          .push(IndexedBlock {
            locator: BlockLocator {
              file_index,
              block_index,
            },
            length,
            strong_hash: hash.strong_hash.clone(),
          });
      }
    }

    Self { by_weak_hash }
  }

  /// Confirm a weak-hash candidate against its strong hash and byte length,
  /// returning the first block (in build order) that matches both.
  ///
  /// A weak hash collision between blocks of different lengths is never a
  /// real match: the diff engine always compares a window of a known length
  /// against the index, and two blocks can share both a weak and (much more
  /// rarely) a strong hash while covering a different number of bytes only at
  /// the tail of a file, where the last block is shorter than [`BLOCK_SIZE`].
  #[must_use]
  pub fn find(&self, weak_hash: u32, length: u64, strong_hash: &[u8]) -> Option<BlockLocator> {
    self
      .by_weak_hash
      .get(&weak_hash)?
      .iter()
      .find(|candidate| candidate.length == length && candidate.strong_hash == strong_hash)
      .map(|candidate| candidate.locator)
  }

  /// All candidate locations sharing a weak hash, regardless of length, for
  /// callers that want to inspect every collision themselves.
  #[must_use]
  pub fn candidate_locations(&self, weak_hash: u32) -> Vec<BlockLocator> {
    self
      .by_weak_hash
      .get(&weak_hash)
      .map(|blocks| blocks.iter().map(|b| b.locator).collect())
      .unwrap_or_default()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn file(path: &str, size: i64) -> tlc::File {
    tlc::File {
      path: path.into(),
      mode: 0o644,
      size,
    }
  }

  fn hash(weak: u32, strong: &[u8]) -> pwr::BlockHash {
    pwr::BlockHash {
      weak_hash: weak,
      strong_hash: strong.to_vec(),
    }
  }

  #[test]
  fn finds_exact_match() {
    let container = tlc::Container {
      size: 4,
      dirs: vec![],
      symlinks: vec![],
      files: vec![file("a.bin", 4)],
    };
    let index = SignatureIndex::build(&container, &[hash(42, b"abcd1234abcd1234")]);

    let found = index.find(42, 4, b"abcd1234abcd1234").unwrap();
    assert_eq!(found, BlockLocator { file_index: 0, block_index: 0 });
  }

  #[test]
  fn short_block_length_mismatch_is_not_a_match() {
    // The indexed block is a 4-byte tail block of a tiny file; a weak+strong
    // hash collision against a *10-byte* window must not count as a match.
    let container = tlc::Container {
      size: 4,
      dirs: vec![],
      symlinks: vec![],
      files: vec![file("tail.bin", 4)],
    };
    let index = SignatureIndex::build(&container, &[hash(7, b"collidingcolliding")]);

    assert!(index.find(7, 4, b"collidingcolliding").is_some());
    assert!(index.find(7, 10, b"collidingcolliding").is_none());
  }

  #[test]
  fn unknown_weak_hash_has_no_candidates() {
    let container = tlc::Container {
      size: 0,
      dirs: vec![],
      symlinks: vec![],
      files: vec![],
    };
    let index = SignatureIndex::build(&container, &[]);
    assert!(index.find(1, 1, b"x").is_none());
  }
}
