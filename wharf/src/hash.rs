//! Block hashing primitives used by the signature and diff engines.

use md5::{Digest, Md5};

const MOD_ADLER: u32 = 65521;

/// Adler32-style rolling hash over a fixed-size window.
///
/// Supports O(1) sliding-window updates (remove the oldest byte, add a new one),
/// which is what lets the diff engine scan a source file byte-by-byte instead of
/// re-hashing every candidate window from scratch.
#[derive(Debug, Clone, Copy)]
pub struct WeakHash {
  a: u32,
  b: u32,
  window_size: u32,
}

impl WeakHash {
  #[must_use]
  pub fn new() -> Self {
    Self {
      a: 1,
      b: 0,
      window_size: 0,
    }
  }

  /// Compute the hash over an initial block of data, replacing any prior state.
  pub fn init(&mut self, data: &[u8]) {
    self.window_size = data.len() as u32;

    // Accumulate in u64 to defer modular reduction to a single pair of
    // operations at the end, rather than reducing on every byte.
    let mut a: u64 = 1;
    let mut b: u64 = 0;
    for &byte in data {
      a += u64::from(byte);
      b += a;
    }
    self.a = (a % u64::from(MOD_ADLER)) as u32;
    self.b = (b % u64::from(MOD_ADLER)) as u32;
  }

  /// Slide the window: remove `old_byte` from the front, add `new_byte` at the back.
  pub fn rotate(&mut self, old_byte: u8, new_byte: u8) {
    let old = u32::from(old_byte);
    let new = u32::from(new_byte);

    self.a = (self.a + MOD_ADLER - old + new) % MOD_ADLER;
    self.b =
      (self.b + MOD_ADLER - 1 + self.a - (old * self.window_size) % MOD_ADLER) % MOD_ADLER;
  }

  #[must_use]
  pub fn digest(&self) -> u32 {
    (self.b << 16) | self.a
  }
}

impl Default for WeakHash {
  fn default() -> Self {
    Self::new()
  }
}

/// Compute the 128-bit strong hash of a block, used to confirm a weak-hash candidate.
#[must_use]
pub fn strong_hash(data: &[u8]) -> [u8; 16] {
  let mut hasher = Md5::new();
  hasher.update(data);
  hasher.finalize().into()
}
