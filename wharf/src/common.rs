use crate::error::{Error, Result};

use std::io::Read;

/// Fixed block size used by the signature engine and the rsync-style matcher.
///
/// <https://github.com/itchio/wharf/blob/189a01902d172b3297051fab12d5d4db2c620e1d/pwr/constants.go#L9>
pub const BLOCK_SIZE: u64 = 64 * 1024;

/// <https://github.com/itchio/wharf/blob/189a01902d172b3297051fab12d5d4db2c620e1d/pwr/constants.go#L14>
pub const MAGIC_PATCH: u32 = 0x0FEF_5F00;

/// <https://github.com/itchio/wharf/blob/189a01902d172b3297051fab12d5d4db2c620e1d/pwr/constants.go#L17>
pub const MAGIC_SIGNATURE: u32 = MAGIC_PATCH + 1;

/// Read the next 4 bytes of the reader and return its little endian u32 representation
pub fn read_magic_bytes(reader: &mut impl Read) -> Result<u32> {
  let mut magic_bytes = [0u8; 4];
  reader.read_exact(&mut magic_bytes)?;

  Ok(u32::from_le_bytes(magic_bytes))
}

/// Verify that the next four bytes of the reader match the expected magic number
pub fn check_magic_bytes(reader: &mut impl Read, expected_magic: u32) -> Result<()> {
  if read_magic_bytes(reader)? == expected_magic {
    Ok(())
  } else {
    Err(Error::VersionMismatch)
  }
}
