//! URL-scheme file opener contract.
//!
//! Out of scope as a feature: this crate ships no HTTP client and no
//! `itchfs://`-style remote handler. What it does define is the thin trait
//! boundary a caller would implement those against, plus a registry that
//! resolves a plain filesystem path to [`FsPool`] and rejects any other
//! scheme unless a handler has been registered for it.

use crate::error::{Error, Result};
use crate::pool::{FsPool, Pool};

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

/// Resolves a scheme-prefixed location (`"file:///…"`, `"itchfs://…"`, …) to
/// a [`Pool`]. External collaborators (an HTTP range-read pool, a remote
/// filesystem handler) implement this; this crate only ships the `file`
/// scheme via [`FsPool`].
pub trait UrlOpener: Send + Sync {
  fn open(&self, location: &str) -> Result<Box<dyn Pool>>;
}

struct FileOpener;

impl UrlOpener for FileOpener {
  fn open(&self, location: &str) -> Result<Box<dyn Pool>> {
    let path = location.strip_prefix("file://").unwrap_or(location);
    Ok(Box::new(FsPool::walk(Path::new(path))?))
  }
}

/// A scheme-keyed registry of [`UrlOpener`] handlers.
///
/// `HandlerRegistry::default()` only resolves the `file` scheme (and a bare
/// path with no scheme prefix, treated the same way). Any other scheme is
/// rejected with [`Error::Unsupported`] unless a handler is registered for it.
pub struct HandlerRegistry {
  handlers: HashMap<String, Arc<dyn UrlOpener>>,
}

impl HandlerRegistry {
  #[must_use]
  pub fn new() -> Self {
    Self {
      handlers: HashMap::new(),
    }
  }

  pub fn register(&mut self, scheme: impl Into<String>, handler: Arc<dyn UrlOpener>) {
    self.handlers.insert(scheme.into(), handler);
  }

  /// Resolve `location` to a [`Pool`] using the handler registered for its scheme.
  ///
  /// # Errors
  ///
  /// Returns [`Error::Unsupported`] if `location`'s scheme has no registered
  /// handler, or whatever error the handler itself returns.
  pub fn open(&self, location: &str) -> Result<Box<dyn Pool>> {
    let scheme = scheme_of(location);

    self
      .handlers
      .get(scheme)
      .ok_or_else(|| Error::unsupported(format!("no handler registered for scheme \"{scheme}\"")))?
      .open(location)
  }
}

impl Default for HandlerRegistry {
  fn default() -> Self {
    let mut registry = Self::new();
    registry.register("file", Arc::new(FileOpener));
    registry
  }
}

fn scheme_of(location: &str) -> &str {
  match location.split_once("://") {
    Some((scheme, _)) => scheme,
    None => "file",
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn bare_path_resolves_as_file_scheme() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("a.txt"), b"hi").unwrap();

    let registry = HandlerRegistry::default();
    let pool = registry.open(dir.path().to_str().unwrap()).unwrap();
    assert_eq!(pool.container().files.len(), 1);
  }

  #[test]
  fn unregistered_scheme_is_unsupported() {
    let registry = HandlerRegistry::default();
    let err = registry.open("itchfs://some/remote/path").unwrap_err();
    assert!(matches!(err, Error::Unsupported(_)));
  }
}
