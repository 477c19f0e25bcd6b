//! Cooperative cancellation of a running job.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Notify;

/// Shared cancellation flag.
///
/// The scheduler checks it before dispatching each operation; running
/// processes wait on [`CancelToken::cancelled`] and are killed when it fires.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
  inner: Arc<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
  flag: AtomicBool,
  notify: Notify,
}

impl CancelToken {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn cancel(&self) {
    self.inner.flag.store(true, Ordering::SeqCst);
    self.inner.notify.notify_waiters();
  }

  pub fn is_cancelled(&self) -> bool {
    self.inner.flag.load(Ordering::SeqCst)
  }

  /// Resolves once [`cancel`](Self::cancel) has been called.
  pub async fn cancelled(&self) {
    loop {
      let notified = self.inner.notify.notified();
      if self.is_cancelled() {
        return;
      }
      notified.await;
    }
  }
}
