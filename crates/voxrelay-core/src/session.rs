//! Session model — one live conversation and its generation epoch.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::channel::SessionChannel;

/// Lifecycle status of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Initializing,
    Connected,
    Processing,
    Error,
    Disconnected,
}

/// One conversation.
///
/// `epoch` identifies the only generation allowed to emit output. Every
/// supersession or new generation bumps it, so a stale stream sees the
/// mismatch at its next check regardless of how far its cancellation got.
#[derive(Debug)]
pub struct Session {
    pub id: String,
    pub prompt: String,
    pub status: SessionStatus,
    pub created_at: DateTime<Utc>,
    pub last_activity: Instant,
    pub is_processing: bool,
    pub epoch: u64,
    pub channel: Option<SessionChannel>,
}

/// Shared handle to a session. Never hold the guard across an `.await`.
pub type SessionHandle = Arc<Mutex<Session>>;

impl Session {
    pub fn new(id: String, prompt: String) -> Self {
        Self {
            id,
            prompt,
            status: SessionStatus::Initializing,
            created_at: Utc::now(),
            last_activity: Instant::now(),
            is_processing: false,
            epoch: 0,
            channel: None,
        }
    }

    pub fn into_handle(self) -> SessionHandle {
        Arc::new(Mutex::new(self))
    }

    /// Refresh the activity timestamp.
    pub fn touch(&mut self) {
        self.last_activity = Instant::now();
    }

    /// Whether the session has been inactive longer than `threshold` at `now`.
    pub fn is_idle(&self, now: Instant, threshold: Duration) -> bool {
        now.saturating_duration_since(self.last_activity) > threshold
    }

    /// Evicted sessions are terminal; no further writes apply to them.
    pub fn is_disconnected(&self) -> bool {
        self.status == SessionStatus::Disconnected
    }

    /// Invalidate the current epoch and return the new one.
    pub fn bump_epoch(&mut self) -> u64 {
        self.epoch += 1;
        self.epoch
    }

    /// True while `epoch` is current, the session is alive, and its channel is open.
    pub fn accepts_output(&self, epoch: u64) -> bool {
        !self.is_disconnected()
            && self.epoch == epoch
            && self.channel.as_ref().is_some_and(SessionChannel::is_open)
    }

    /// Whether `channel` is the one currently attached.
    pub fn is_attached(&self, channel: &SessionChannel) -> bool {
        self.channel.as_ref().is_some_and(|c| c.same_channel(channel))
    }

    /// Mark terminal and close the attached channel, if any.
    pub fn disconnect(&mut self) {
        self.status = SessionStatus::Disconnected;
        self.is_processing = false;
        if let Some(channel) = self.channel.take() {
            channel.close();
        }
    }
}

/// Lock a session, recovering the guard if a previous holder panicked.
pub fn lock(handle: &SessionHandle) -> MutexGuard<'_, Session> {
    handle.lock().unwrap_or_else(PoisonError::into_inner)
}
