//! A minimal cooperative cancellation signal shared across rediff workers.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// A cheap, cloneable flag that the rediff worker pool polls between files.
///
/// Deliberately just an `Arc<AtomicBool>` rather than a channel or a more
/// elaborate cancellation primitive: workers only need to observe a single
/// one-way transition, and checking it costs a single relaxed load.
#[derive(Clone, Default)]
pub struct CancellationToken {
  cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
  #[must_use]
  pub fn new() -> Self {
    Self::default()
  }

  pub fn cancel(&self) {
    self.cancelled.store(true, Ordering::Relaxed);
  }

  #[must_use]
  pub fn is_cancelled(&self) -> bool {
    self.cancelled.load(Ordering::Relaxed)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn starts_uncancelled_and_latches_once_cancelled() {
    let token = CancellationToken::new();
    assert!(!token.is_cancelled());

    let clone = token.clone();
    clone.cancel();

    assert!(token.is_cancelled());
  }
}
