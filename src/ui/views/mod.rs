mod activity_detail;
mod activity_log;
mod failed_reminders;
mod reminder_detail;
mod reminder_list;

pub use activity_detail::ActivityDetailView;
pub use activity_log::ActivityLogView;
pub use failed_reminders::FailedReminderListView;
pub use reminder_detail::ReminderDetailView;
pub use reminder_list::ReminderListView;

use std::future::Future;
use tokio::sync::mpsc;

/// Carries status messages of spawned writes back to the view that
/// started them. A write that finishes after its view is gone sends into
/// a closed channel and the message is dropped.
pub(crate) struct OutcomeChannel {
  tx: mpsc::UnboundedSender<String>,
  rx: mpsc::UnboundedReceiver<String>,
  last: Option<String>,
}

impl OutcomeChannel {
  pub fn new() -> Self {
    let (tx, rx) = mpsc::unbounded_channel();
    Self { tx, rx, last: None }
  }

  /// Run `write` in the background; a `Some` result becomes the status.
  pub fn spawn<F>(&self, write: F)
  where
    F: Future<Output = Option<String>> + Send + 'static,
  {
    let tx = self.tx.clone();
    tokio::spawn(async move {
      if let Some(message) = write.await {
        let _ = tx.send(message);
      }
    });
  }

  pub fn set(&mut self, message: impl Into<String>) {
    self.last = Some(message.into());
  }

  /// Take finished outcomes; returns true when the status changed.
  pub fn drain(&mut self) -> bool {
    let mut changed = false;
    while let Ok(message) = self.rx.try_recv() {
      self.last = Some(message);
      changed = true;
    }
    changed
  }

  pub fn last(&self) -> Option<&str> {
    self.last.as_deref()
  }
}
