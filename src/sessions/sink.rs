//! Session sinks: the push channel a registry entry writes events to.

use crate::types::now_rfc3339;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::mpsc;

/// Event delivered to a waiting client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    Connected {
        #[serde(rename = "sessionId")]
        session_id: String,
        timestamp: String,
    },
    PlanUpdate {
        plan: Value,
        timestamp: String,
    },
    Error {
        message: String,
        timestamp: String,
    },
}

impl SessionEvent {
    pub fn connected(session_id: &str) -> Self {
        SessionEvent::Connected {
            session_id: session_id.to_string(),
            timestamp: now_rfc3339(),
        }
    }

    pub fn plan_update(plan: Value) -> Self {
        SessionEvent::PlanUpdate {
            plan,
            timestamp: now_rfc3339(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        SessionEvent::Error {
            message: message.into(),
            timestamp: now_rfc3339(),
        }
    }

    pub fn event_type(&self) -> &'static str {
        match self {
            SessionEvent::Connected { .. } => "connected",
            SessionEvent::PlanUpdate { .. } => "plan_update",
            SessionEvent::Error { .. } => "error",
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SinkError {
    #[error("client disconnected")]
    Disconnected,
}

/// Transport-level write target owned by one registry entry
///
/// `write` must not block. Writes after `close` are dropped and return `Ok`;
/// `close` is idempotent.
pub trait SessionSink: Send + Sync {
    fn write(&self, event: &SessionEvent) -> Result<(), SinkError>;
    fn close(&self);
}

/// Sink backed by an unbounded tokio channel; the receiver feeds the transport.
pub struct ChannelSink {
    sender: Mutex<Option<mpsc::UnboundedSender<SessionEvent>>>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<SessionEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                sender: Mutex::new(Some(tx)),
            },
            rx,
        )
    }

    pub fn is_closed(&self) -> bool {
        self.sender.lock().is_none()
    }
}

impl SessionSink for ChannelSink {
    fn write(&self, event: &SessionEvent) -> Result<(), SinkError> {
        match self.sender.lock().as_ref() {
            Some(tx) => tx.send(event.clone()).map_err(|_| SinkError::Disconnected),
            None => Ok(()),
        }
    }

    fn close(&self) {
        // Dropping the sender ends the receiving stream.
        self.sender.lock().take();
    }
}
