use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// The error type returned by every fallible operation in this crate.
#[derive(Error, Debug)]
pub enum Error {
  #[error("I/O error: {0}")]
  Io(#[from] std::io::Error),

  /// A patch, signature, or container stream is malformed.
  #[error("corrupt wharf stream: {0}")]
  Corrupt(String),

  /// The stream's magic bytes don't match any known wharf binary format.
  #[error("unrecognized or unsupported wharf binary version")]
  VersionMismatch,

  #[error("unknown compression algorithm tag: {0}")]
  UnknownCompression(i32),

  #[error("size mismatch for \"{path}\": expected {expected} bytes, found {found}")]
  SizeMismatch {
    path: String,
    expected: u64,
    found: u64,
  },

  #[error(
    "block {block_index} of \"{path}\" doesn't match its expected hash\n  expected: {expected:x?}\n  found: {found:x?}"
  )]
  HashMismatch {
    path: String,
    block_index: u64,
    expected: Vec<u8>,
    found: Vec<u8>,
  },

  #[error("operation was cancelled")]
  Cancelled,

  #[error("unsupported: {0}")]
  Unsupported(String),
}

impl Error {
  #[must_use]
  pub fn corrupt(msg: impl Into<String>) -> Self {
    Error::Corrupt(msg.into())
  }

  #[must_use]
  pub fn unsupported(msg: impl Into<String>) -> Self {
    Error::Unsupported(msg.into())
  }
}
