//! Process-wide session table.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use voxrelay_core::channel::SessionChannel;
use voxrelay_core::session::{self, Session, SessionHandle, SessionStatus};

/// Sessions keyed by id.
///
/// The map lock only guards membership; each session's fields sit behind
/// their own mutex, so no lock spans sessions.
#[derive(Clone, Default)]
pub struct SessionRegistry {
    sessions: Arc<RwLock<HashMap<String, SessionHandle>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a session for `prompt` and return its id.
    pub async fn create(&self, prompt: String) -> String {
        let id = Uuid::new_v4().to_string();
        let handle = Session::new(id.clone(), prompt).into_handle();
        self.sessions.write().await.insert(id.clone(), handle);
        id
    }

    pub async fn get(&self, id: &str) -> Option<SessionHandle> {
        self.sessions.read().await.get(id).cloned()
    }

    pub async fn contains(&self, id: &str) -> bool {
        self.sessions.read().await.contains_key(id)
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    /// Attach a live channel. Returns the session handle, or `None` if the id is unknown.
    ///
    /// A previously attached channel is closed and replaced, and the epoch is
    /// bumped so whatever that connection was generating goes silent.
    pub async fn attach_channel(&self, id: &str, channel: SessionChannel) -> Option<SessionHandle> {
        let handle = self.get(id).await?;
        {
            let mut s = session::lock(&handle);
            if s.is_disconnected() {
                return None;
            }
            if let Some(previous) = s.channel.replace(channel) {
                debug!(session_id = %id, "Replacing previously attached channel");
                previous.close();
                s.bump_epoch();
                s.is_processing = false;
            }
            s.status = SessionStatus::Connected;
            s.touch();
        }
        Some(handle)
    }

    /// Refresh a session's activity timestamp. Unknown ids are ignored.
    pub async fn touch(&self, id: &str) {
        if let Some(handle) = self.get(id).await {
            session::lock(&handle).touch();
        }
    }

    /// Remove a session, closing its channel. Removing an absent id is a no-op.
    pub async fn remove(&self, id: &str) -> bool {
        evict(&mut *self.sessions.write().await, id)
    }

    /// [`remove`](Self::remove), unless a channel other than `channel` is attached.
    ///
    /// A connection tearing down after a newer one took over the session
    /// leaves the session in place.
    pub async fn remove_if_owned(&self, id: &str, channel: &SessionChannel) -> bool {
        let mut sessions = self.sessions.write().await;
        let Some(handle) = sessions.get(id) else {
            return false;
        };
        {
            let s = session::lock(handle);
            if s.channel.is_some() && !s.is_attached(channel) {
                debug!(session_id = %id, "Session taken over by a newer channel, keeping it");
                return false;
            }
        }
        evict(&mut sessions, id)
    }

    /// Evict every session idle for longer than `threshold` as of `now`.
    ///
    /// Each session is checked and marked disconnected under its own lock
    /// while the map write lock is held, so an eviction never interleaves
    /// with a coordinator write to the same session.
    pub async fn sweep_idle(&self, now: Instant, threshold: Duration) -> Vec<String> {
        let mut sessions = self.sessions.write().await;
        let mut evicted = Vec::new();

        sessions.retain(|id, handle| {
            let mut s = session::lock(handle);
            if !s.is_idle(now, threshold) {
                return true;
            }
            info!(session_id = %id, "Removing inactive session");
            s.disconnect();
            evicted.push(id.clone());
            false
        });

        evicted
    }

    /// Disconnect and drop every session (shutdown).
    pub async fn clear(&self) {
        let mut sessions = self.sessions.write().await;
        for handle in sessions.values() {
            session::lock(handle).disconnect();
        }
        sessions.clear();
    }
}

fn evict(sessions: &mut HashMap<String, SessionHandle>, id: &str) -> bool {
    match sessions.remove(id) {
        Some(handle) => {
            session::lock(&handle).disconnect();
            debug!(session_id = %id, "Session removed");
            true
        }
        None => false,
    }
}
