use crossterm::event::{Event as CrosstermEvent, EventStream, KeyEvent, KeyEventKind};
use futures::StreamExt;
use std::time::Duration;
use tokio::sync::mpsc;

/// Application events
#[derive(Debug)]
pub enum Event {
  /// Terminal key press
  Key(KeyEvent),
  /// Terminal was resized; redraw
  Resize,
  /// Periodic tick for query polling and sync-state refresh
  Tick,
}

/// Merges terminal input and a tick timer into one stream of events
pub struct EventHandler {
  rx: mpsc::UnboundedReceiver<Event>,
}

impl EventHandler {
  pub fn new(tick_rate: Duration) -> Self {
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
      let mut input = EventStream::new();
      let mut ticks = tokio::time::interval(tick_rate);

      loop {
        let event = tokio::select! {
          _ = ticks.tick() => Event::Tick,
          maybe = input.next() => match maybe {
            Some(Ok(CrosstermEvent::Key(key))) if key.kind == KeyEventKind::Press => Event::Key(key),
            Some(Ok(CrosstermEvent::Resize(_, _))) => Event::Resize,
            Some(Ok(_)) => continue,
            Some(Err(e)) => {
              tracing::warn!(error = %e, "terminal input error");
              continue;
            }
            None => break,
          },
        };

        if tx.send(event).is_err() {
          break;
        }
      }
    });

    Self { rx }
  }

  /// Receive the next event
  pub async fn next(&mut self) -> Option<Event> {
    self.rx.recv().await
  }
}
