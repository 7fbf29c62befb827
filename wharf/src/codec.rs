//! Compression codec registry used by the wire format.
//!
//! The registry is an explicit value: callers build (or accept the `Default`)
//! registry and pass it into every diff/apply/rediff/signature call, instead
//! of relying on process-wide state.

use crate::error::{Error, Result};
use crate::protos::pwr::CompressionAlgorithm;

use std::collections::HashMap;
use std::io::{BufRead, BufReader, Read, Write};
use std::sync::Arc;

/// A compression algorithm implementation pluggable into the [`Registry`].
pub trait Codec: Send + Sync {
  fn wrap_reader<'a>(&self, reader: Box<dyn BufRead + 'a>) -> Result<Box<dyn BufRead + 'a>>;
  fn wrap_writer<'a>(
    &self,
    writer: Box<dyn Write + 'a>,
    quality: i32,
  ) -> Result<Box<dyn Write + 'a>>;
}

struct NoneCodec;

impl Codec for NoneCodec {
  fn wrap_reader<'a>(&self, reader: Box<dyn BufRead + 'a>) -> Result<Box<dyn BufRead + 'a>> {
    Ok(reader)
  }

  fn wrap_writer<'a>(
    &self,
    writer: Box<dyn Write + 'a>,
    _quality: i32,
  ) -> Result<Box<dyn Write + 'a>> {
    Ok(writer)
  }
}

#[cfg(feature = "brotli")]
struct BrotliCodec;

#[cfg(feature = "brotli")]
impl Codec for BrotliCodec {
  fn wrap_reader<'a>(&self, reader: Box<dyn BufRead + 'a>) -> Result<Box<dyn BufRead + 'a>> {
    // Set the buffer size to zero to allow Brotli to select the correct size
    Ok(Box::new(BufReader::new(brotli::Decompressor::new(
      reader, 0,
    ))))
  }

  fn wrap_writer<'a>(
    &self,
    writer: Box<dyn Write + 'a>,
    quality: i32,
  ) -> Result<Box<dyn Write + 'a>> {
    Ok(Box::new(brotli::CompressorWriter::new(
      writer,
      4096,
      quality.clamp(0, 11) as u32,
      22,
    )))
  }
}

#[cfg(feature = "gzip")]
struct GzipCodec;

#[cfg(feature = "gzip")]
impl Codec for GzipCodec {
  fn wrap_reader<'a>(&self, reader: Box<dyn BufRead + 'a>) -> Result<Box<dyn BufRead + 'a>> {
    Ok(Box::new(BufReader::new(flate2::bufread::GzDecoder::new(
      reader,
    ))))
  }

  fn wrap_writer<'a>(
    &self,
    writer: Box<dyn Write + 'a>,
    quality: i32,
  ) -> Result<Box<dyn Write + 'a>> {
    let level = flate2::Compression::new(quality.clamp(0, 9) as u32);
    Ok(Box::new(flate2::write::GzEncoder::new(writer, level)))
  }
}

#[cfg(feature = "zstd")]
struct ZstdCodec;

#[cfg(feature = "zstd")]
impl Codec for ZstdCodec {
  fn wrap_reader<'a>(&self, reader: Box<dyn BufRead + 'a>) -> Result<Box<dyn BufRead + 'a>> {
    Ok(Box::new(BufReader::new(
      zstd::Decoder::with_buffer(reader)
        .map_err(|e| Error::corrupt(format!("couldn't create zstd decoder: {e}")))?,
    )))
  }

  fn wrap_writer<'a>(
    &self,
    writer: Box<dyn Write + 'a>,
    quality: i32,
  ) -> Result<Box<dyn Write + 'a>> {
    Ok(Box::new(
      zstd::Encoder::new(writer, quality)
        .map_err(|e| Error::corrupt(format!("couldn't create zstd encoder: {e}")))?
        .auto_finish(),
    ))
  }
}

/// An explicit mapping from [`CompressionAlgorithm`] to its codec implementation.
///
/// `Registry::default()` is populated with every built-in algorithm whose Cargo
/// feature is enabled; tests commonly build a bare `Registry::new()` and register
/// only [`CompressionAlgorithm::None`] to exercise the pipeline without linking a
/// compression library.
#[derive(Clone)]
pub struct Registry {
  codecs: HashMap<i32, Arc<dyn Codec>>,
}

impl Registry {
  #[must_use]
  pub fn new() -> Self {
    Self {
      codecs: HashMap::new(),
    }
  }

  pub fn register(&mut self, algorithm: CompressionAlgorithm, codec: Arc<dyn Codec>) {
    self.codecs.insert(algorithm as i32, codec);
  }

  fn lookup(&self, algorithm: CompressionAlgorithm) -> Result<&Arc<dyn Codec>> {
    self
      .codecs
      .get(&(algorithm as i32))
      .ok_or(Error::UnknownCompression(algorithm as i32))
  }

  pub fn wrap_reader<'a>(
    &self,
    algorithm: CompressionAlgorithm,
    reader: Box<dyn BufRead + 'a>,
  ) -> Result<Box<dyn BufRead + 'a>> {
    self.lookup(algorithm)?.wrap_reader(reader)
  }

  pub fn wrap_writer<'a>(
    &self,
    algorithm: CompressionAlgorithm,
    writer: Box<dyn Write + 'a>,
    quality: i32,
  ) -> Result<Box<dyn Write + 'a>> {
    self.lookup(algorithm)?.wrap_writer(writer, quality)
  }
}

impl Default for Registry {
  fn default() -> Self {
    let mut registry = Self::new();
    registry.register(CompressionAlgorithm::None, Arc::new(NoneCodec));

    #[cfg(feature = "brotli")]
    registry.register(CompressionAlgorithm::Brotli, Arc::new(BrotliCodec));

    #[cfg(feature = "gzip")]
    registry.register(CompressionAlgorithm::Gzip, Arc::new(GzipCodec));

    #[cfg(feature = "zstd")]
    registry.register(CompressionAlgorithm::Zstd, Arc::new(ZstdCodec));

    registry
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn none_codec_is_always_registered() {
    let registry = Registry::default();
    let data = b"hello wharf".to_vec();
    let reader: Box<dyn BufRead> = Box::new(data.as_slice());
    let mut wrapped = registry.wrap_reader(CompressionAlgorithm::None, reader).unwrap();
    let mut out = Vec::new();
    wrapped.read_to_end(&mut out).unwrap();
    assert_eq!(out, data);
  }

  #[test]
  fn unregistered_algorithm_is_an_error() {
    let registry = Registry::new();
    let reader: Box<dyn BufRead> = Box::new(&b""[..]);
    let err = registry.wrap_reader(CompressionAlgorithm::Zstd, reader).unwrap_err();
    assert!(matches!(err, Error::UnknownCompression(_)));
  }
}
