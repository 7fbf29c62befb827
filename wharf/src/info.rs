//! Identify an arbitrary wharf binary stream by its magic bytes.

use crate::codec::Registry;
use crate::common::{MAGIC_PATCH, MAGIC_SIGNATURE, read_magic_bytes};
use crate::error::{Error, Result};
use crate::patch::Patch;
use crate::signature::Signature;

use std::io::BufRead;

/// Either a patch or a signature, identified from an unknown stream's magic bytes.
pub enum WharfBinary<'a> {
  Signature(Signature<'a>),
  Patch(Patch<'a>),
}

/// Identify a wharf binary based on its magic bytes and decode it.
///
/// # Errors
///
/// Returns [`Error::VersionMismatch`] if the magic bytes don't match any
/// known wharf binary format, or a decoding error otherwise.
pub fn identify<'a>(reader: &'a mut impl BufRead, codecs: &Registry) -> Result<WharfBinary<'a>> {
  use WharfBinary as WB;

  let magic = read_magic_bytes(reader)?;
  match magic {
    MAGIC_SIGNATURE => Ok(WB::Signature(Signature::read_without_magic(reader, codecs)?)),
    MAGIC_PATCH => Ok(WB::Patch(Patch::read_without_magic(reader, codecs)?)),
    _ => Err(Error::VersionMismatch),
  }
}
