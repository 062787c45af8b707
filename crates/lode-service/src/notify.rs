//! Notifier port
//!
//! Outbound chat messages to the admin channel and to individual users.
//! Delivery is fire-and-forget: a failed send is logged and swallowed, and
//! must never fail the economic operation that triggered it.

use async_trait::async_trait;
use parking_lot::Mutex;

/// Notification send failure
#[derive(Clone, Debug, thiserror::Error)]
#[error("Notification send failed: {0}")]
pub struct NotifyError(pub String);

/// Fire-and-forget message dispatch
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Send `text` to a user id or admin channel id
    async fn send_message(&self, target: &str, text: &str) -> Result<(), NotifyError>;
}

/// Notifier that drops every message (deployments without a chat hookup)
#[derive(Default)]
pub struct NullNotifier;

#[async_trait]
impl Notifier for NullNotifier {
    async fn send_message(&self, _target: &str, _text: &str) -> Result<(), NotifyError> {
        Ok(())
    }
}

/// Notifier that records every message, for tests and local inspection
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<(String, String)>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// All (target, text) pairs sent so far
    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().clone()
    }

    /// Messages sent to one target
    pub fn sent_to(&self, target: &str) -> Vec<String> {
        self.sent
            .lock()
            .iter()
            .filter(|(t, _)| t == target)
            .map(|(_, text)| text.clone())
            .collect()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send_message(&self, target: &str, text: &str) -> Result<(), NotifyError> {
        self.sent.lock().push((target.to_string(), text.to_string()));
        Ok(())
    }
}
