//! Best-effort notification of issued tokens.

use chrono::{DateTime, Utc};
use tokio::sync::mpsc::{self, Receiver, Sender, error::TrySendError};
use tokio::task::JoinHandle;

use super::Purpose;
use crate::crypto::fingerprint;

const FINGERPRINT_LENGTH: usize = 16;

/// Emitted once per successful issuance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Created {
    pub purpose: Purpose,
    pub subject: String,
    pub token: String,
    pub issued_at: DateTime<Utc>,
}

/// Send-only side of the created events buffer.
///
/// Publishing never waits: events are dropped when the buffer is full or the
/// consumer is gone.
#[derive(Debug, Clone, Default)]
pub struct EventSink {
    sender: Option<Sender<Created>>,
}

impl EventSink {
    /// Create a bounded sink and its receiving end.
    pub fn channel(capacity: usize) -> (Self, Receiver<Created>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (Self::new(sender), receiver)
    }

    /// Wrap an existing sender.
    pub fn new(sender: Sender<Created>) -> Self {
        Self {
            sender: Some(sender),
        }
    }

    /// Sink discarding every event.
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn publish(&self, event: Created) {
        let Some(sender) = &self.sender else {
            return;
        };

        if let Err(err) = sender.try_send(event) {
            let reason = match err {
                TrySendError::Full(_) => "full",
                TrySendError::Closed(_) => "closed",
            };
            tracing::debug!(reason, "token created event dropped");
            metrics::counter!("token_events_dropped_total", "reason" => reason)
                .increment(1);
        }
    }
}

/// Log every created event until all senders are dropped.
pub fn spawn_audit_consumer(mut receiver: Receiver<Created>) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(created) = receiver.recv().await {
            let digest = fingerprint(&created.token);
            tracing::info!(
                purpose = %created.purpose,
                subject = created.subject.as_str(),
                token = &digest[..FINGERPRINT_LENGTH],
                issued_at = %created.issued_at,
                "token created"
            );
        }

        tracing::debug!("token created events consumer stopped");
    })
}
