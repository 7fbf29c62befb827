//! Progress and log sink contract used by the diff/rediff/apply/validate
//! passes.

/// Domain-level sink for progress updates and log messages.
///
/// Every long-running pass in this crate reports through a `&mut dyn
/// Consumer` rather than printing directly, so embedding applications (and
/// the `wharf-cli` binary) can choose how that's surfaced. [`NullConsumer`]
/// discards everything; [`TracingConsumer`] is the default, forwarding to
/// `tracing`.
pub trait Consumer {
  /// Overall progress as a fraction in `[0.0, 1.0]`.
  fn progress(&mut self, fraction: f64);

  /// A short label describing the current stage (e.g. a file path).
  fn progress_label(&mut self, label: &str);

  fn info(&mut self, message: &str);
  fn debug(&mut self, message: &str);
  fn warn(&mut self, message: &str);
}

/// A [`Consumer`] that discards every call. Used by library callers that
/// don't care about progress reporting, and by tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullConsumer;

impl Consumer for NullConsumer {
  fn progress(&mut self, _fraction: f64) {}
  fn progress_label(&mut self, _label: &str) {}
  fn info(&mut self, _message: &str) {}
  fn debug(&mut self, _message: &str) {}
  fn warn(&mut self, _message: &str) {}
}

/// The default [`Consumer`]: forwards progress labels and log messages to
/// `tracing`, and logs progress fraction updates at `debug` level.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingConsumer;

impl Consumer for TracingConsumer {
  fn progress(&mut self, fraction: f64) {
    tracing::debug!(fraction, "progress");
  }

  fn progress_label(&mut self, label: &str) {
    tracing::info!("{label}");
  }

  fn info(&mut self, message: &str) {
    tracing::info!("{message}");
  }

  fn debug(&mut self, message: &str) {
    tracing::debug!("{message}");
  }

  fn warn(&mut self, message: &str) {
    tracing::warn!("{message}");
  }
}

/// Turns cumulative byte counts into fractional [`Consumer::progress`] calls.
///
/// The diff/apply/rediff/signature passes only know, at their hot-loop level,
/// how many bytes they've just processed; this tracks the running total
/// against a known size and forwards a `[0.0, 1.0]` fraction plus file-label
/// changes to whatever [`Consumer`] the caller supplied.
pub struct ByteProgress<'a> {
  consumer: &'a mut dyn Consumer,
  total: u64,
  processed: u64,
}

impl<'a> ByteProgress<'a> {
  #[must_use]
  pub fn new(consumer: &'a mut dyn Consumer, total: u64) -> Self {
    Self {
      consumer,
      total,
      processed: 0,
    }
  }

  /// Report that the pass has moved on to a new file.
  pub fn label(&mut self, label: &str) {
    self.consumer.progress_label(label);
  }

  /// Report that `bytes` more have been processed since the last call.
  pub fn add(&mut self, bytes: u64) {
    self.processed = self.processed.saturating_add(bytes);
    let fraction = if self.total == 0 {
      1.0
    } else {
      (self.processed as f64 / self.total as f64).min(1.0)
    };
    self.consumer.progress(fraction);
  }
}
