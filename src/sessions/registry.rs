//! In-memory registry of waiting client sessions.
//!
//! Each session id maps to at most one live sink. The map is guarded by one
//! mutex held for each read-modify-write; sink writes happen inside it and
//! must not block.

use crate::error::ApiError;
use crate::sessions::policy::{SessionStatus, SweepPolicy};
use crate::sessions::sink::{SessionEvent, SessionSink};
use crate::types::now_millis;
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Identifies one transport connection for a session id.
pub type ConnectionId = u64;

const STUCK_TIMEOUT_MESSAGE: &str = "generation timed out";

struct SessionEntry {
    sink: Arc<dyn SessionSink>,
    connection_id: ConnectionId,
    status: SessionStatus,
    last_activity_ms: u64,
    created_at_ms: u64,
    user_id: Option<String>,
}

impl SessionEntry {
    fn snapshot(&self, session_id: &str) -> SessionSnapshot {
        SessionSnapshot {
            session_id: session_id.to_string(),
            connection_id: self.connection_id,
            status: self.status,
            last_activity_ms: self.last_activity_ms,
            created_at_ms: self.created_at_ms,
            user_id: self.user_id.clone(),
        }
    }
}

/// Read-only view of a registered session
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionSnapshot {
    pub session_id: String,
    pub connection_id: ConnectionId,
    pub status: SessionStatus,
    pub last_activity_ms: u64,
    pub created_at_ms: u64,
    pub user_id: Option<String>,
}

/// Sessions removed by one sweep pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Generating sessions failed with a timeout
    pub timed_out: Vec<String>,
    /// Sessions removed after the idle timeout
    pub expired: Vec<String>,
}

impl SweepReport {
    pub fn removed(&self) -> usize {
        self.timed_out.len() + self.expired.len()
    }
}

struct RegistryInner {
    sessions: Mutex<HashMap<String, SessionEntry>>,
    next_connection: AtomicU64,
    policy: SweepPolicy,
}

/// Session registry; cloning yields another handle to the same map.
#[derive(Clone)]
pub struct SessionRegistry {
    inner: Arc<RegistryInner>,
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new(SweepPolicy::default())
    }
}

/// `plan_update` payloads carrying `"type": "error"` mark the session failed.
fn payload_is_error(payload: &Value) -> bool {
    payload.get("type").and_then(Value::as_str) == Some("error")
}

impl SessionRegistry {
    pub fn new(policy: SweepPolicy) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                sessions: Mutex::new(HashMap::new()),
                next_connection: AtomicU64::new(1),
                policy,
            }),
        }
    }

    pub fn policy(&self) -> &SweepPolicy {
        &self.inner.policy
    }

    /// Attach a sink to `session_id`
    ///
    /// Any previous sink for the id is closed and replaced. A `connected` event
    /// is written immediately. If that write fails the transport is already
    /// gone, nothing is stored and `SessionClosed` is returned.
    pub fn register(
        &self,
        session_id: &str,
        sink: Arc<dyn SessionSink>,
        user_id: Option<String>,
    ) -> Result<ConnectionId, ApiError> {
        if session_id.trim().is_empty() {
            return Err(ApiError::InvalidInput(
                "session id cannot be empty".to_string(),
            ));
        }
        let connection_id = self.inner.next_connection.fetch_add(1, Ordering::Relaxed);
        let now = now_millis();

        let mut sessions = self.inner.sessions.lock();
        if let Some(previous) = sessions.remove(session_id) {
            previous.sink.close();
            debug!(
                session_id = %session_id,
                replaced = previous.connection_id,
                "Replaced existing session connection"
            );
        }

        if let Err(err) = sink.write(&SessionEvent::connected(session_id)) {
            sink.close();
            warn!(session_id = %session_id, error = %err, "Session dropped before acknowledgement");
            return Err(ApiError::SessionClosed(session_id.to_string()));
        }

        sessions.insert(
            session_id.to_string(),
            SessionEntry {
                sink,
                connection_id,
                status: SessionStatus::Waiting,
                last_activity_ms: now,
                created_at_ms: now,
                user_id,
            },
        );
        info!(
            session_id = %session_id,
            connection_id,
            active = sessions.len(),
            "Session registered"
        );
        Ok(connection_id)
    }

    /// Deliver a plan update. Returns `false` when the session is unknown or expired.
    pub fn dispatch(&self, session_id: &str, payload: Value) -> bool {
        let status = if payload_is_error(&payload) {
            SessionStatus::Error
        } else {
            SessionStatus::Completed
        };
        self.deliver(session_id, SessionEvent::plan_update(payload), status)
    }

    /// Deliver an error event. Returns `false` when the session is unknown.
    pub fn fail(&self, session_id: &str, reason: &str) -> bool {
        self.deliver(session_id, SessionEvent::error(reason), SessionStatus::Error)
    }

    fn deliver(&self, session_id: &str, event: SessionEvent, status: SessionStatus) -> bool {
        let mut sessions = self.inner.sessions.lock();
        let Some(entry) = sessions.get_mut(session_id) else {
            debug!(
                session_id = %session_id,
                event = event.event_type(),
                "No session for event"
            );
            return false;
        };

        match entry.sink.write(&event) {
            Ok(()) => {
                entry.status = status;
                entry.last_activity_ms = now_millis();
                info!(
                    session_id = %session_id,
                    event = event.event_type(),
                    status = status.as_str(),
                    "Delivered session event"
                );
            }
            Err(err) => {
                if let Some(entry) = sessions.remove(session_id) {
                    entry.sink.close();
                }
                warn!(
                    session_id = %session_id,
                    event = event.event_type(),
                    error = %err,
                    "Session transport gone, removed"
                );
            }
        }
        true
    }

    /// Record that the producer has started working on this session.
    pub fn mark_generating(&self, session_id: &str) -> bool {
        let mut sessions = self.inner.sessions.lock();
        match sessions.get_mut(session_id) {
            Some(entry) => {
                entry.status = SessionStatus::Generating;
                entry.last_activity_ms = now_millis();
                debug!(session_id = %session_id, "Session generating");
                true
            }
            None => false,
        }
    }

    pub fn status(&self, session_id: &str) -> Option<SessionSnapshot> {
        self.inner
            .sessions
            .lock()
            .get(session_id)
            .map(|entry| entry.snapshot(session_id))
    }

    /// Close the sink and forget the session. Unknown ids are ignored.
    pub fn remove(&self, session_id: &str) {
        if let Some(entry) = self.inner.sessions.lock().remove(session_id) {
            entry.sink.close();
            debug!(session_id = %session_id, "Session removed");
        }
    }

    /// The transport for `connection_id` went away
    ///
    /// Removes the session only if it is still bound to that connection, so a
    /// stale disconnect never evicts a newer registration under the same id.
    pub fn disconnect(&self, session_id: &str, connection_id: ConnectionId) -> bool {
        let mut sessions = self.inner.sessions.lock();
        let current = sessions
            .get(session_id)
            .map(|entry| entry.connection_id == connection_id)
            .unwrap_or(false);
        if !current {
            return false;
        }
        if let Some(entry) = sessions.remove(session_id) {
            entry.sink.close();
        }
        debug!(session_id = %session_id, connection_id, "Session disconnected");
        true
    }

    pub fn active_count(&self) -> usize {
        self.inner.sessions.lock().len()
    }

    /// Close every sink and clear the registry. Used on shutdown.
    pub fn close_all(&self) -> usize {
        let drained: Vec<(String, SessionEntry)> = self.inner.sessions.lock().drain().collect();
        for (_, entry) in &drained {
            entry.sink.close();
        }
        if !drained.is_empty() {
            info!(closed = drained.len(), "Closed all sessions");
        }
        drained.len()
    }

    /// Apply the sweep policy as of `now_ms`
    ///
    /// Each session is handled on its own; a failing write only removes that
    /// session.
    pub fn sweep_at(&self, now_ms: u64) -> SweepReport {
        let policy = self.inner.policy;
        let mut report = SweepReport::default();
        let mut sessions = self.inner.sessions.lock();

        let mut doomed = Vec::new();
        for (session_id, entry) in sessions.iter() {
            let idle_ms = now_ms.saturating_sub(entry.last_activity_ms);
            if entry.status == SessionStatus::Generating && idle_ms > policy.stuck_timeout_ms {
                if let Err(err) = entry.sink.write(&SessionEvent::error(STUCK_TIMEOUT_MESSAGE)) {
                    debug!(session_id = %session_id, error = %err, "Timeout notice not delivered");
                }
                report.timed_out.push(session_id.clone());
                doomed.push(session_id.clone());
            } else if idle_ms > policy.idle_timeout_ms {
                report.expired.push(session_id.clone());
                doomed.push(session_id.clone());
            }
        }

        for session_id in &doomed {
            if let Some(entry) = sessions.remove(session_id) {
                entry.sink.close();
            }
        }
        drop(sessions);

        report.timed_out.sort();
        report.expired.sort();
        if report.removed() > 0 {
            info!(
                timed_out = report.timed_out.len(),
                expired = report.expired.len(),
                "Swept sessions"
            );
        }
        report
    }

    pub fn sweep(&self) -> SweepReport {
        self.sweep_at(now_millis())
    }
}
