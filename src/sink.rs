//! Asynchronous error surfacing for the feed worker.

use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::warn;

use crate::error::WatchError;

/// Bounded queue of worker faults. Sending never blocks the worker: when the
/// queue is full the newest error is dropped and counted.
#[derive(Debug)]
pub(crate) struct ErrorSink {
    tx: mpsc::Sender<WatchError>,
    dropped: AtomicU64,
}

impl ErrorSink {
    pub(crate) fn new(capacity: usize) -> (Self, mpsc::Receiver<WatchError>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let sink = Self {
            tx,
            dropped: AtomicU64::new(0),
        };
        (sink, rx)
    }

    pub(crate) fn emit(&self, error: WatchError) {
        warn!(error = %error, "watch fault");
        match self.tx.try_send(error) {
            Ok(()) => {}
            Err(TrySendError::Full(error)) => {
                let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                warn!(error = %error, dropped, "error channel full, dropping error");
            }
            // Nobody is listening any more.
            Err(TrySendError::Closed(_)) => {}
        }
    }

    pub(crate) fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_emit_delivers_in_order() {
        let (sink, mut rx) = ErrorSink::new(4);
        sink.emit(WatchError::MissingFullDocument("app.a".into()));
        sink.emit(WatchError::MissingFullDocument("app.b".into()));

        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        assert!(first.to_string().contains("app.a"));
        assert!(second.to_string().contains("app.b"));
        assert_eq!(sink.dropped(), 0);
    }

    #[tokio::test]
    async fn test_full_queue_drops_newest() {
        let (sink, mut rx) = ErrorSink::new(1);
        sink.emit(WatchError::MissingFullDocument("app.kept".into()));
        sink.emit(WatchError::MissingFullDocument("app.lost".into()));
        sink.emit(WatchError::MissingFullDocument("app.lost".into()));

        assert_eq!(sink.dropped(), 2);
        let kept = rx.recv().await.unwrap();
        assert!(kept.to_string().contains("app.kept"));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_closed_receiver_is_ignored() {
        let (sink, rx) = ErrorSink::new(1);
        drop(rx);
        sink.emit(WatchError::MissingFullDocument("app.gone".into()));
        assert_eq!(sink.dropped(), 0);
    }
}
