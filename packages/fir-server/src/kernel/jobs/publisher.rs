//! Single-subscriber progress channel for one orchestrator invocation.

use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::mpsc;

use super::events::{CrawlEvent, LogKind};

/// Ordered push channel from an orchestrator invocation to its one
/// subscriber (the open event-stream connection).
///
/// Guarantees: events arrive in send order; nothing is delivered after a
/// terminal event; a vanished subscriber turns sends into no-ops instead
/// of failing the run.
pub struct ProgressPublisher {
    tx: mpsc::Sender<CrawlEvent>,
    closed: AtomicBool,
}

impl ProgressPublisher {
    /// Create a publisher and the receiving side handed to the subscriber.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<CrawlEvent>) {
        let (tx, rx) = mpsc::channel(capacity);
        (
            Self {
                tx,
                closed: AtomicBool::new(false),
            },
            rx,
        )
    }

    /// Push an event. Closes the channel after a terminal event; drops
    /// everything once closed or once the subscriber has disconnected.
    pub async fn send(&self, event: CrawlEvent) {
        if self.closed.load(Ordering::Acquire) {
            tracing::debug!(event = event.name(), "dropping event after terminal");
            return;
        }
        let terminal = event.is_terminal();
        if self.tx.send(event).await.is_err() {
            // Subscriber went away; stop emitting for this invocation.
            self.closed.store(true, Ordering::Release);
            return;
        }
        if terminal {
            self.closed.store(true, Ordering::Release);
        }
    }

    /// Emit a human-readable progress line, mirrored to the service log.
    pub async fn log(&self, kind: LogKind, msg: impl Into<String>) {
        let msg = msg.into();
        match kind {
            LogKind::Error => tracing::warn!(msg = %msg, "crawl"),
            _ => tracing::info!(msg = %msg, "crawl"),
        }
        self.send(CrawlEvent::Log { msg, kind }).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[tokio::test]
    async fn events_arrive_in_send_order() {
        let (publisher, mut rx) = ProgressPublisher::channel(16);
        publisher.log(LogKind::Info, "one").await;
        publisher.log(LogKind::Info, "two").await;
        drop(publisher);

        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        assert_eq!(first.data()["msg"], "one");
        assert_eq!(second.data()["msg"], "two");
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn nothing_is_delivered_after_a_terminal_event() {
        let (publisher, mut rx) = ProgressPublisher::channel(16);
        publisher
            .send(CrawlEvent::Complete { total: 1, downloaded: 0 })
            .await;
        publisher.log(LogKind::Info, "late").await;
        publisher
            .send(CrawlEvent::Paused { job_id: Uuid::new_v4() })
            .await;
        drop(publisher);

        assert_eq!(rx.recv().await.unwrap().name(), "complete");
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn disconnected_subscriber_does_not_fail_the_run() {
        let (publisher, rx) = ProgressPublisher::channel(16);
        drop(rx);
        publisher.log(LogKind::Info, "into the void").await;
        publisher.log(LogKind::Info, "still fine").await;
    }
}
