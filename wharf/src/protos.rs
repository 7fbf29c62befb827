/// Generated from `proto/bsdiff.proto`.
///
/// <https://github.com/itchio/wharf/blob/5e5efc838cdbaee7915246d5102af78a3a31e74d/bsdiff/bsdiff.proto>
///
/// More information about bsdiff wharf patches:
/// <https://web.archive.org/web/20211123032456/https://twitter.com/fasterthanlime/status/790617515009437701>
pub mod bsdiff {
  include!(concat!(env!("OUT_DIR"), "/bsdiff.rs"));
}
/// Generated from `proto/pwr.proto`.
///
/// <https://github.com/itchio/wharf/blob/5e5efc838cdbaee7915246d5102af78a3a31e74d/pwr/pwr.proto>
pub mod pwr {
  include!(concat!(env!("OUT_DIR"), "/pwr.rs"));
}
/// Generated from `proto/tlc.proto`.
///
/// <https://github.com/itchio/lake/blob/d93a9d33bb65f76200e07d9606e1e251fd09cb07/tlc/tlc.proto>
pub mod tlc {
  include!(concat!(env!("OUT_DIR"), "/tlc.rs"));
}

use crate::error::{Error, Result};

use std::io::Read;

/// <https://protobuf.dev/programming-guides/encoding/#varints>
const PROTOBUF_VARINT_MAX_LENGTH: usize = 10;

/// Read a Protobuf length delimiter encoded as a variable-width integer and consume its bytes
///
/// <https://protobuf.dev/programming-guides/encoding/#length-types>
///
/// <https://protobuf.dev/programming-guides/encoding/#varints>
fn read_length_delimiter(reader: &mut impl Read) -> Result<usize> {
  // A Protobuf varint must be 10 bytes or less
  let mut varint = [0u8; PROTOBUF_VARINT_MAX_LENGTH];

  let mut len = 0;
  for current_byte in &mut varint {
    let mut byte = [0u8; 1];
    reader.read_exact(&mut byte)?;
    len += 1;

    *current_byte = byte[0];

    // The most significant bit indicates whether there are more bytes in the varint
    if (byte[0] & 0x80) == 0 {
      break;
    }
  }

  prost::decode_length_delimiter(&varint[..len])
    .map_err(|e| Error::corrupt(format!("invalid length delimiter: {e}")))
}

/// Decode a length-delimited Protobuf message, advancing the reader past it.
pub(crate) fn decode_protobuf<T: prost::Message + Default>(reader: &mut impl Read) -> Result<T> {
  let length = read_length_delimiter(reader)?;

  let mut bytes = vec![0u8; length];
  reader.read_exact(&mut bytes)?;

  T::decode(bytes.as_slice()).map_err(|e| Error::corrupt(format!("bad protobuf message: {e}")))
}

/// Skip the next length-delimited Protobuf message, advancing the reader past it.
pub(crate) fn skip_protobuf(reader: &mut impl Read) -> Result<()> {
  let length = read_length_delimiter(reader)?;

  std::io::copy(&mut reader.take(length as u64), &mut std::io::sink())?;
  Ok(())
}

/// Encode a message with its length delimiter and write it to `writer`.
pub(crate) fn encode_protobuf<T: prost::Message>(
  message: &T,
  writer: &mut impl std::io::Write,
) -> Result<()> {
  let mut buf = Vec::with_capacity(message.encoded_len() + PROTOBUF_VARINT_MAX_LENGTH);
  prost::encode_length_delimiter(message.encoded_len(), &mut buf)
    .map_err(|e| Error::corrupt(format!("message too large to encode: {e}")))?;
  message.encode(&mut buf).map_err(|e| Error::Io(std::io::Error::other(e)))?;
  writer.write_all(&buf)?;
  Ok(())
}
