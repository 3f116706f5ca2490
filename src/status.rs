//! Status sink for user-facing feedback
//!
//! The daemon's stand-in for the form's status line. Every flow reports
//! outcomes here as a short text with a green/red hint; subscribed
//! front-ends receive each update, and the latest one is retained so a
//! front-end connecting late can still query it.

use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;

/// Display hint for a status line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusColor {
    /// Progress and confirmations
    Green,
    /// Failures and degraded operation
    Red,
}

/// One user-facing status line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusUpdate {
    pub text: String,
    pub color: StatusColor,
}

/// Cloneable handle for publishing status lines
#[derive(Clone)]
pub struct StatusSink {
    tx: broadcast::Sender<StatusUpdate>,
    latest: Arc<RwLock<Option<StatusUpdate>>>,
}

impl StatusSink {
    /// Create a sink with the given subscriber buffer capacity
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self {
            tx,
            latest: Arc::new(RwLock::new(None)),
        }
    }

    /// Publish a status line, retaining it as the latest one
    pub fn set(&self, text: impl Into<String>, color: StatusColor) {
        let update = StatusUpdate {
            text: text.into(),
            color,
        };
        debug!(text = %update.text, ?color, "status");
        if let Ok(mut latest) = self.latest.write() {
            *latest = Some(update.clone());
        }
        // No subscribers is fine; the line is still retained
        let _ = self.tx.send(update);
    }

    /// Subscribe to future status updates
    pub fn subscribe(&self) -> broadcast::Receiver<StatusUpdate> {
        self.tx.subscribe()
    }

    /// Latest published status line, if any
    pub fn latest(&self) -> Option<StatusUpdate> {
        self.latest.read().ok().and_then(|latest| latest.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latest_is_retained() {
        let sink = StatusSink::new(4);
        assert_eq!(sink.latest(), None);

        sink.set("Listening...", StatusColor::Green);
        let latest = sink.latest().unwrap();
        assert_eq!(latest.text, "Listening...");
        assert_eq!(latest.color, StatusColor::Green);

        sink.set("Failed to save data.", StatusColor::Red);
        assert_eq!(sink.latest().unwrap().color, StatusColor::Red);
    }

    #[test]
    fn test_subscriber_receives_updates() {
        let sink = StatusSink::new(4);
        let mut rx = sink.subscribe();

        sink.set("Processing audio...", StatusColor::Green);

        let update = tokio_test::block_on(rx.recv()).unwrap();
        assert_eq!(update.text, "Processing audio...");
    }

    #[test]
    fn test_color_serialization() {
        let update = StatusUpdate {
            text: "Error: no-speech".to_string(),
            color: StatusColor::Red,
        };
        let json = serde_json::to_string(&update).unwrap();
        assert!(json.contains("\"red\""));

        let back: StatusUpdate = serde_json::from_str(&json).unwrap();
        assert_eq!(back, update);
    }
}
