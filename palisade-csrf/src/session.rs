//! Session token storage.
//!
//! The host application owns sessions; Palisade only needs to read and
//! write one value per session. Rotation writes go through the store's
//! lock, so concurrent requests on one session resolve last-write-wins
//! without lost updates.

use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::debug;

/// Idle lifetime of a session in [`MemorySessionStore`]
pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(3600);

/// Sessions kept by [`MemorySessionStore`] before the oldest is evicted
pub const DEFAULT_MAX_SESSIONS: usize = 100_000;

/// Session store trait for different storage backends
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Read a value from a session
    async fn get(&self, session_id: &str, key: &str) -> Result<Option<String>>;

    /// Write a value into a session, creating the session if needed
    async fn set(&self, session_id: &str, key: &str, value: String) -> Result<()>;

    /// Remove a value from a session
    async fn remove(&self, session_id: &str, key: &str) -> Result<()>;
}

#[derive(Debug, Clone)]
struct StoredSession {
    data: HashMap<String, String>,
    expires_at: DateTime<Utc>,
    last_write: u64,
}

impl StoredSession {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

/// In-memory session store.
///
/// Each write pushes the session's expiry `ttl` into the future; expired
/// sessions read as empty and are evicted whenever a new session is
/// created. At most `max_sessions` are kept, the least recently written
/// one making room for a newcomer.
#[derive(Clone)]
pub struct MemorySessionStore {
    sessions: Arc<RwLock<HashMap<String, StoredSession>>>,
    writes: Arc<AtomicU64>,
    ttl: Duration,
    max_sessions: usize,
}

impl Default for MemorySessionStore {
    fn default() -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            writes: Arc::new(AtomicU64::new(0)),
            ttl: DEFAULT_SESSION_TTL,
            max_sessions: DEFAULT_MAX_SESSIONS,
        }
    }
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the idle lifetime of a session
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Set the number of sessions kept at once
    pub fn with_max_sessions(mut self, max_sessions: usize) -> Self {
        self.max_sessions = max_sessions.max(1);
        self
    }

    /// Number of live sessions holding at least one value
    pub async fn len(&self) -> usize {
        let now = Utc::now();
        self.sessions
            .read()
            .await
            .values()
            .filter(|session| !session.is_expired(now))
            .count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Drop every expired session, returning how many were removed
    pub async fn cleanup_expired(&self) -> usize {
        let now = Utc::now();
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, session| !session.is_expired(now));
        before - sessions.len()
    }

    fn expiry(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        chrono::Duration::from_std(self.ttl)
            .ok()
            .and_then(|ttl| now.checked_add_signed(ttl))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    fn make_room(&self, sessions: &mut HashMap<String, StoredSession>, now: DateTime<Utc>) {
        sessions.retain(|_, session| !session.is_expired(now));
        while sessions.len() >= self.max_sessions {
            let oldest = sessions
                .iter()
                .min_by_key(|(_, session)| session.last_write)
                .map(|(id, _)| id.clone());
            match oldest {
                Some(id) => {
                    debug!(session = %id, "Evicting session at capacity");
                    sessions.remove(&id);
                }
                None => break,
            }
        }
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn get(&self, session_id: &str, key: &str) -> Result<Option<String>> {
        let now = Utc::now();
        Ok(self
            .sessions
            .read()
            .await
            .get(session_id)
            .filter(|session| !session.is_expired(now))
            .and_then(|session| session.data.get(key))
            .cloned())
    }

    async fn set(&self, session_id: &str, key: &str, value: String) -> Result<()> {
        let now = Utc::now();
        let expires_at = self.expiry(now);
        let mut sessions = self.sessions.write().await;
        let last_write = self.writes.fetch_add(1, Ordering::Relaxed);

        match sessions.get_mut(session_id) {
            Some(session) if !session.is_expired(now) => {
                session.expires_at = expires_at;
                session.last_write = last_write;
                session.data.insert(key.to_string(), value);
            }
            _ => {
                sessions.remove(session_id);
                self.make_room(&mut sessions, now);
                sessions.insert(
                    session_id.to_string(),
                    StoredSession {
                        data: HashMap::from([(key.to_string(), value)]),
                        expires_at,
                        last_write,
                    },
                );
            }
        }
        Ok(())
    }

    async fn remove(&self, session_id: &str, key: &str) -> Result<()> {
        let mut sessions = self.sessions.write().await;
        if let Some(session) = sessions.get_mut(session_id) {
            session.data.remove(key);
            if session.data.is_empty() {
                sessions.remove(session_id);
            }
        }
        Ok(())
    }
}

/// One session of a [`SessionStore`]
#[derive(Clone)]
pub struct SessionHandle {
    store: Arc<dyn SessionStore>,
    id: String,
}

impl SessionHandle {
    pub fn new(store: Arc<dyn SessionStore>, id: impl Into<String>) -> Self {
        Self {
            store,
            id: id.into(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub async fn get(&self, key: &str) -> Result<Option<String>> {
        self.store.get(&self.id, key).await
    }

    pub async fn set(&self, key: &str, value: String) -> Result<()> {
        self.store.set(&self.id, key, value).await
    }

    pub async fn remove(&self, key: &str) -> Result<()> {
        self.store.remove(&self.id, key).await
    }
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle").field("id", &self.id).finish()
    }
}

/// Generate a new unique session ID.
pub fn generate_session_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
