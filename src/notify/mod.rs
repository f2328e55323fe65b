//! Fire-and-forget submission notifications
//!
//! The workflow only ever calls [`NotificationOutbox::enqueue`], which never
//! blocks and never fails: when the bounded queue is full (or the worker is
//! gone) the notification is dropped and counted. A [`NotificationWorker`]
//! thread renders queued notifications and hands them to a [`Mailer`];
//! delivery failures are logged and otherwise invisible to the workflow.

pub mod message;

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use metrics::counter;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use thiserror::Error;

use crate::core::config::NotificationConfig;
use crate::schema::template::NotificationTemplates;

pub use message::{Message, Notification, NotificationKind};

/// Delivery failure reported by a mailer
#[derive(Debug, Error)]
#[error("Mail delivery failed: {0}")]
pub struct MailError(pub String);

/// Outbound mail transport
pub trait Mailer: Send {
    fn send(&self, message: &Message) -> Result<(), MailError>;
}

/// Mailer that only logs what would be sent
#[derive(Debug, Default, Clone, Copy)]
pub struct LogMailer;

impl Mailer for LogMailer {
    fn send(&self, message: &Message) -> Result<(), MailError> {
        tracing::info!(
            to = %message.recipients.join(", "),
            cc = %message.cc.join(", "),
            from = %message.sender,
            subject = %message.subject,
            "notification sent"
        );
        Ok(())
    }
}

/// Queue statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OutboxStats {
    pub enqueued: u64,
    pub dropped: u64,
}

#[derive(Debug, Default)]
struct Counters {
    enqueued: AtomicU64,
    dropped: AtomicU64,
}

/// Sending side of the notification queue; cheap to clone
#[derive(Debug, Clone)]
pub struct NotificationOutbox {
    sender: Sender<Notification>,
    counters: Arc<Counters>,
}

impl NotificationOutbox {
    /// Create an outbox with room for `capacity` pending notifications
    pub fn new(capacity: usize) -> (Self, NotificationReceiver) {
        let (sender, receiver) = bounded(capacity.max(1));
        let outbox = Self {
            sender,
            counters: Arc::new(Counters::default()),
        };
        (outbox, NotificationReceiver { receiver })
    }

    /// Queue a notification; never blocks, never fails
    pub fn enqueue(&self, notification: Notification) {
        if notification.recipients.is_empty() {
            tracing::debug!(
                request_id = %notification.request_id,
                "notification has no recipients; skipped"
            );
            return;
        }
        match self.sender.try_send(notification) {
            Ok(()) => {
                self.counters.enqueued.fetch_add(1, Ordering::Relaxed);
            }
            Err(TrySendError::Full(n)) | Err(TrySendError::Disconnected(n)) => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                counter!("subdesk_notifications_dropped_total").increment(1);
                tracing::warn!(
                    request_id = %n.request_id,
                    kind = n.kind.as_str(),
                    "notification queue unavailable; notification dropped"
                );
            }
        }
    }

    pub fn stats(&self) -> OutboxStats {
        OutboxStats {
            enqueued: self.counters.enqueued.load(Ordering::Relaxed),
            dropped: self.counters.dropped.load(Ordering::Relaxed),
        }
    }
}

/// Receiving side of the notification queue
pub struct NotificationReceiver {
    receiver: Receiver<Notification>,
}

impl NotificationReceiver {
    /// Blocking receive; `None` once every outbox is dropped and the queue is empty
    pub fn recv(&self) -> Option<Notification> {
        self.receiver.recv().ok()
    }

    pub fn try_recv(&self) -> Option<Notification> {
        self.receiver.try_recv().ok()
    }

    /// Everything currently queued, without blocking
    pub fn drain(&self) -> Vec<Notification> {
        self.receiver.try_iter().collect()
    }

    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }
}

/// Turns notifications into messages
pub struct MessageBuilder {
    templates: NotificationTemplates,
    sender: String,
    cc: Vec<String>,
}

impl MessageBuilder {
    pub fn new(templates: NotificationTemplates, config: &NotificationConfig) -> Self {
        Self {
            templates,
            sender: config.sender.clone(),
            cc: config.cc.clone(),
        }
    }

    pub fn build(
        &self,
        notification: &Notification,
    ) -> Result<Message, crate::schema::template::TemplateError> {
        let rendered = self.templates.render(notification)?;
        Ok(Message {
            recipients: notification.recipients.clone(),
            subject: rendered.subject,
            body: rendered.body,
            sender: self.sender.clone(),
            cc: self.cc.clone(),
        })
    }
}

/// Delivery totals reported when the worker stops
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerStats {
    pub delivered: u64,
    pub failed: u64,
}

/// Background thread delivering queued notifications
pub struct NotificationWorker {
    handle: JoinHandle<WorkerStats>,
}

impl NotificationWorker {
    /// Start delivering; the thread exits once every outbox is dropped
    pub fn spawn(
        receiver: NotificationReceiver,
        builder: MessageBuilder,
        mailer: Box<dyn Mailer>,
    ) -> std::io::Result<Self> {
        let handle = std::thread::Builder::new()
            .name("subdesk-notify".to_string())
            .spawn(move || {
                let mut stats = WorkerStats::default();
                while let Some(notification) = receiver.recv() {
                    let result = builder
                        .build(&notification)
                        .map_err(|e| MailError(e.to_string()))
                        .and_then(|message| mailer.send(&message));
                    match result {
                        Ok(()) => stats.delivered += 1,
                        Err(e) => {
                            stats.failed += 1;
                            tracing::warn!(
                                request_id = %notification.request_id,
                                error = %e,
                                "notification delivery failed"
                            );
                        }
                    }
                }
                tracing::debug!(
                    delivered = stats.delivered,
                    failed = stats.failed,
                    "notification worker stopped"
                );
                stats
            })?;
        Ok(Self { handle })
    }

    /// Wait for the worker to drain the queue and stop
    pub fn join(self) -> WorkerStats {
        self.handle.join().unwrap_or_else(|_| {
            tracing::error!("notification worker panicked");
            WorkerStats::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::identity::{EntityId, EntityPrefix};
    use std::sync::Mutex;

    fn notification() -> Notification {
        Notification {
            kind: NotificationKind::Accepted,
            request_id: EntityId::new(EntityPrefix::Req),
            record_title: "Dataset A".to_string(),
            community_title: "Hydrology".to_string(),
            request_link: "https://x/communities/hydro/requests/1".to_string(),
            actor: "curator".to_string(),
            recipients: vec!["cur@example.org".to_string()],
        }
    }

    struct CapturingMailer(Arc<Mutex<Vec<Message>>>);

    impl Mailer for CapturingMailer {
        fn send(&self, message: &Message) -> Result<(), MailError> {
            self.0.lock().unwrap().push(message.clone());
            Ok(())
        }
    }

    #[test]
    fn test_full_queue_drops_without_blocking() {
        let (outbox, receiver) = NotificationOutbox::new(1);
        outbox.enqueue(notification());
        outbox.enqueue(notification());

        assert_eq!(
            outbox.stats(),
            OutboxStats {
                enqueued: 1,
                dropped: 1
            }
        );
        assert_eq!(receiver.drain().len(), 1);
    }

    #[test]
    fn test_disconnected_queue_drops() {
        let (outbox, receiver) = NotificationOutbox::new(4);
        drop(receiver);
        outbox.enqueue(notification());
        assert_eq!(outbox.stats().dropped, 1);
    }

    #[test]
    fn test_no_recipients_is_skipped() {
        let (outbox, receiver) = NotificationOutbox::new(4);
        let mut n = notification();
        n.recipients.clear();
        outbox.enqueue(n);
        assert!(receiver.is_empty());
        assert_eq!(outbox.stats(), OutboxStats::default());
    }

    #[test]
    fn test_worker_delivers_and_stops() {
        let (outbox, receiver) = NotificationOutbox::new(8);
        let sent = Arc::new(Mutex::new(Vec::new()));

        let mut config = NotificationConfig::with_defaults();
        config.sender = "repo@example.org".to_string();
        config.cc = vec!["audit@example.org".to_string()];
        let builder = MessageBuilder::new(NotificationTemplates::new("Repo").unwrap(), &config);

        let worker = NotificationWorker::spawn(
            receiver,
            builder,
            Box::new(CapturingMailer(Arc::clone(&sent))),
        )
        .unwrap();

        outbox.enqueue(notification());
        drop(outbox);
        let stats = worker.join();

        assert_eq!(stats.delivered, 1);
        let sent = sent.lock().unwrap();
        assert_eq!(sent[0].sender, "repo@example.org");
        assert_eq!(sent[0].cc, vec!["audit@example.org".to_string()]);
        assert_eq!(sent[0].subject, "[Repo] Submission Accepted: Dataset A");
    }
}
