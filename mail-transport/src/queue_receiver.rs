//! Queue receiver: polls a Maildir-with-metadata queue at a configured
//! interval and dispatches drained messages to a bounded worker pool.
//! Grounded on `original_source/salmon/server.py`'s `QueueReceiver`.

use std::sync::Arc;
use std::time::Duration;

use mail_core::MailRequest;
use mail_queue::{Queue, QueueWithMetadata};
use mail_router::{RouterError, Router};
use tokio::task::JoinHandle;

use crate::config::QueueConfig;

pub struct QueueReceiver {
    queue: Arc<QueueWithMetadata>,
    router: Arc<Router>,
    undeliverable: Option<Arc<Queue>>,
    poll_interval: Duration,
    workers: usize,
    one_shot: bool,
}

impl QueueReceiver {
    pub fn new(queue: Arc<QueueWithMetadata>, router: Arc<Router>, undeliverable: Option<Arc<Queue>>, config: &QueueConfig) -> Self {
        QueueReceiver {
            queue,
            router,
            undeliverable,
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            workers: config.workers.max(1),
            one_shot: config.one_shot,
        }
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move { self.run().await })
    }

    async fn run(self) {
        loop {
            let drained = self.drain_once().await;
            if self.one_shot && !drained {
                tracing::info!("queue receiver: queue drained, exiting (one-shot mode)");
                break;
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    /// Pops and processes messages until the queue is empty, running up to
    /// `workers` concurrently. Returns whether anything was processed.
    async fn drain_once(&self) -> bool {
        let mut drained_any = false;
        let mut in_flight = Vec::with_capacity(self.workers);

        loop {
            let popped = self.queue.pop();
            let Ok(Some((key, data, envelope))) = popped else {
                break;
            };
            drained_any = true;

            let router = self.router.clone();
            let queue = self.queue.clone();
            let undeliverable = self.undeliverable.clone();
            in_flight.push(tokio::task::spawn_blocking(move || {
                process_message(&queue, &router, undeliverable.as_deref(), key, data, envelope.peer, envelope.from, envelope.to);
            }));

            if in_flight.len() >= self.workers {
                for handle in in_flight.drain(..) {
                    let _ = handle.await;
                }
            }
        }

        for handle in in_flight.drain(..) {
            let _ = handle.await;
        }
        drained_any
    }
}

/// Delivers one popped message and reconciles the metadata sidecar:
/// successes and failures alike consume their recipient, since there is
/// no remote peer to retry against -- failures are instead pushed onto
/// the undeliverable queue, per the base spec's queue-receiver semantics.
fn process_message(queue: &QueueWithMetadata, router: &Router, undeliverable: Option<&Queue>, key: String, data: Vec<u8>, peer: Option<String>, from: String, to: Vec<String>) {
    let message = match MailRequest::new(peer, from, to.clone(), data.clone()) {
        Ok(m) => m,
        Err(e) => {
            tracing::warn!(error = %e, %key, "queued message failed to parse, routing to undeliverable");
            push_undeliverable(undeliverable, &data);
            for recipient in &to {
                let _ = queue.remove(&key, recipient);
            }
            return;
        }
    };

    for (recipient, result) in to.iter().zip(router.deliver(&message)) {
        match result {
            Ok(()) => {}
            Err(RouterError::Smtp(e)) => {
                tracing::warn!(%key, recipient, code = e.code, message = %e.message, "handler rejected queued message");
                push_undeliverable(undeliverable, &data);
            }
            Err(e) => {
                tracing::error!(%key, recipient, error = %e, "queued message delivery failed");
                push_undeliverable(undeliverable, &data);
            }
        }
        if let Err(e) = queue.remove(&key, recipient) {
            tracing::error!(%key, recipient, error = %e, "failed to acknowledge recipient after delivery");
        }
    }
}

fn push_undeliverable(undeliverable: Option<&Queue>, data: &[u8]) {
    if let Some(queue) = undeliverable {
        if let Err(e) = queue.push(data) {
            tracing::error!(error = %e, "failed to push to undeliverable queue");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mail_router::{Route, Transition};
    use std::sync::Arc as StdArc;

    fn temp_metadata_queue() -> (tempfile::TempDir, Arc<QueueWithMetadata>) {
        let dir = tempfile::tempdir().unwrap();
        let queue = Queue::new(dir.path(), false, 0, None).unwrap();
        (dir, Arc::new(QueueWithMetadata::new(queue).unwrap()))
    }

    #[tokio::test]
    async fn one_shot_drains_then_stops() {
        let (_dir, queue) = temp_metadata_queue();
        queue.push(b"Subject: hi\r\n\r\nbody\r\n", None, "a@x".to_owned(), vec!["b@y".to_owned()]).unwrap();

        let router = Arc::new(Router::new());
        router
            .register(
                Route::new("m", "START", "(user)@(host)").capture("user", ".+").capture("host", ".+").stateless(),
                StdArc::new(|_msg, _caps| Ok(Transition::Stay)),
            )
            .unwrap();

        let config = QueueConfig {
            one_shot: true,
            poll_interval_ms: 1,
            workers: 2,
            ..QueueConfig::default()
        };
        let receiver = QueueReceiver::new(queue.clone(), router, None, &config);
        receiver.spawn().await.unwrap();

        assert!(queue.is_empty().unwrap());
    }
}
