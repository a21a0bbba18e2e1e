//! In-memory, cookie-correlated browser sessions.
//!
//! Each browser gets a random session id. The cookie carries
//! `<id>.<hex HMAC-SHA256(secret, id)>` so forged or altered ids are rejected
//! before the map is consulted. Records live only in process memory and are
//! dropped on logout or after the idle timeout.

use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::collections::HashMap;

use crate::config::SessionConfig;

type HmacSha256 = Hmac<Sha256>;

// ── Session data ────────────────────────────────────────────────────

/// Profile attributes returned by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub picture: Option<String>,
}

impl UserProfile {
    /// Name to greet the user with.
    pub fn display_name(&self) -> &str {
        self.name
            .as_deref()
            .or(self.email.as_deref())
            .unwrap_or("traveler")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: ChatRole,
    pub content: String,
}

impl ChatTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

/// OAuth bearer token granted by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessToken {
    pub secret: String,
    pub expires_at: Option<DateTime<Utc>>,
}

impl AccessToken {
    pub fn new(secret: impl Into<String>, expires_at: Option<DateTime<Utc>>) -> Self {
        Self {
            secret: secret.into(),
            expires_at,
        }
    }

    /// A token without an expiry is treated as valid until the provider rejects it.
    pub fn is_expired(&self, now: DateTime<Utc>, leeway: Duration) -> bool {
        self.expires_at.is_some_and(|exp| exp <= now + leeway)
    }
}

/// Login handshake state kept between `/login/google` and its callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingLogin {
    pub state: String,
    pub verifier: String,
}

#[derive(Debug, Clone)]
pub struct Session {
    pub user: Option<UserProfile>,
    /// Alternating user/assistant turns, in arrival order.
    pub chat_history: Vec<ChatTurn>,
    pub token: Option<AccessToken>,
    pub pending_login: Option<PendingLogin>,
    pub last_seen: DateTime<Utc>,
}

impl Session {
    fn new(now: DateTime<Utc>) -> Self {
        Self {
            user: None,
            chat_history: Vec::new(),
            token: None,
            pending_login: None,
            last_seen: now,
        }
    }

    /// Append one completed exchange. Both turns go in together so the
    /// history never holds an unanswered user turn.
    pub fn push_exchange(&mut self, message: impl Into<String>, reply: impl Into<String>) {
        self.chat_history.push(ChatTurn::user(message));
        self.chat_history.push(ChatTurn::assistant(reply));
    }

    /// Forget the identity but keep the record (used when the token goes bad).
    pub fn sign_out(&mut self) {
        self.user = None;
        self.token = None;
    }
}

// ── Store ───────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("session secret key is empty")]
    EmptySecret,
    #[error("invalid session secret key: {0}")]
    InvalidKey(String),
    #[error("session.{0} is out of range")]
    InvalidTimeout(&'static str),
}

/// Sessions that never finish signing in are dropped after this long.
pub const DEFAULT_LOGIN_TIMEOUT_SECS: u64 = 10 * 60;
/// Upper bound on live sessions held in memory.
pub const DEFAULT_MAX_SESSIONS: usize = 10_000;

pub struct SessionStore {
    sessions: Mutex<HashMap<String, Session>>,
    mac: HmacSha256,
    idle_timeout: Duration,
    login_timeout: Duration,
    max_sessions: usize,
    cookie_name: String,
    secure_cookie: bool,
}

fn new_session_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

/// Seconds as a chrono duration, `None` when it does not fit.
fn checked_seconds(secs: u64) -> Option<Duration> {
    i64::try_from(secs).ok().and_then(Duration::try_seconds)
}

impl SessionStore {
    pub fn new(
        secret: &str,
        cookie_name: impl Into<String>,
        idle_timeout: Duration,
        secure_cookie: bool,
    ) -> Result<Self, SessionError> {
        if secret.trim().is_empty() {
            return Err(SessionError::EmptySecret);
        }
        let mac = HmacSha256::new_from_slice(secret.as_bytes())
            .map_err(|e| SessionError::InvalidKey(e.to_string()))?;
        Ok(Self {
            sessions: Mutex::new(HashMap::new()),
            mac,
            idle_timeout,
            login_timeout: idle_timeout.min(Duration::minutes(10)),
            max_sessions: DEFAULT_MAX_SESSIONS,
            cookie_name: cookie_name.into(),
            secure_cookie,
        })
    }

    /// Cap the number of live sessions and how long a session without a
    /// token may linger.
    pub fn with_limits(mut self, max_sessions: usize, login_timeout: Duration) -> Self {
        self.max_sessions = max_sessions.max(1);
        self.login_timeout = login_timeout.min(self.idle_timeout);
        self
    }

    pub fn from_config(config: &SessionConfig) -> Result<Self, SessionError> {
        let secret = config.secret_key.as_deref().unwrap_or_default();
        let idle = checked_seconds(config.idle_timeout_secs)
            .ok_or(SessionError::InvalidTimeout("idle_timeout_secs"))?;
        let login = checked_seconds(config.login_timeout_secs)
            .ok_or(SessionError::InvalidTimeout("login_timeout_secs"))?;
        Ok(
            Self::new(secret, config.cookie_name.clone(), idle, config.secure_cookie)?
                .with_limits(config.max_sessions, login),
        )
    }

    pub fn cookie_name(&self) -> &str {
        &self.cookie_name
    }

    /// Signed-in sessions live for the idle timeout; anything else only for
    /// the login timeout.
    fn is_expired(&self, session: &Session, now: DateTime<Utc>) -> bool {
        let limit = if session.token.is_some() {
            self.idle_timeout
        } else {
            self.login_timeout
        };
        now.signed_duration_since(session.last_seen) > limit
    }

    fn purge_locked(&self, sessions: &mut HashMap<String, Session>, now: DateTime<Utc>) -> usize {
        let before = sessions.len();
        sessions.retain(|_, s| !self.is_expired(s, now));
        before - sessions.len()
    }

    /// Start a fresh, empty session and return its id. At capacity the least
    /// recently used session goes first, anonymous ones before signed-in ones.
    pub fn create(&self) -> String {
        let now = Utc::now();
        let id = new_session_id();
        let mut guard = self.sessions.lock();
        self.purge_locked(&mut guard, now);

        let mut evicted = 0usize;
        while guard.len() >= self.max_sessions {
            let Some(victim) = guard
                .iter()
                .min_by_key(|(_, s)| (s.token.is_some(), s.last_seen))
                .map(|(id, _)| id.clone())
            else {
                break;
            };
            guard.remove(&victim);
            evicted += 1;
        }
        if evicted > 0 {
            tracing::warn!("session limit ({}) reached, evicted {evicted}", self.max_sessions);
        }

        guard.insert(id.clone(), Session::new(now));
        tracing::debug!("session created");
        id
    }

    /// Snapshot a live session, refreshing its idle timer. Expired sessions are
    /// removed and reported as absent.
    pub fn get(&self, id: &str) -> Option<Session> {
        let now = Utc::now();
        let mut guard = self.sessions.lock();
        let expired = guard.get(id).map(|s| self.is_expired(s, now))?;
        if expired {
            guard.remove(id);
            tracing::debug!("session expired");
            return None;
        }
        let session = guard.get_mut(id)?;
        session.last_seen = now;
        Some(session.clone())
    }

    /// Mutate a live session in place. Returns `None` if it no longer exists.
    pub fn update<R>(&self, id: &str, f: impl FnOnce(&mut Session) -> R) -> Option<R> {
        let mut guard = self.sessions.lock();
        let session = guard.get_mut(id)?;
        session.last_seen = Utc::now();
        Some(f(session))
    }

    /// Move a live session to a new id. The old id stops working.
    pub fn rotate(&self, id: &str) -> Option<String> {
        let now = Utc::now();
        let mut guard = self.sessions.lock();
        let mut session = guard.remove(id)?;
        if self.is_expired(&session, now) {
            return None;
        }
        session.last_seen = now;
        let new_id = new_session_id();
        guard.insert(new_id.clone(), session);
        Some(new_id)
    }

    /// Drop every bit of state held for this session.
    pub fn destroy(&self, id: &str) -> bool {
        self.sessions.lock().remove(id).is_some()
    }

    pub fn purge_expired(&self) -> usize {
        let purged = self.purge_locked(&mut self.sessions.lock(), Utc::now());
        if purged > 0 {
            tracing::debug!("purged {purged} expired session(s)");
        }
        purged
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // ── Cookie encoding ──────────────────────────────────────────────

    /// Signed cookie value for `id`.
    pub fn sign(&self, id: &str) -> String {
        let mut mac = self.mac.clone();
        mac.update(id.as_bytes());
        format!("{id}.{}", hex::encode(mac.finalize().into_bytes()))
    }

    /// Recover the session id from a cookie value, rejecting bad signatures.
    pub fn verify(&self, cookie_value: &str) -> Option<String> {
        let (id, sig) = cookie_value.rsplit_once('.')?;
        if id.is_empty() {
            return None;
        }
        let sig = hex::decode(sig).ok()?;
        let mut mac = self.mac.clone();
        mac.update(id.as_bytes());
        mac.verify_slice(&sig).ok()?;
        Some(id.to_string())
    }

    /// `Set-Cookie` value that binds the browser to `id`.
    pub fn set_cookie_header(&self, id: &str) -> String {
        let secure = if self.secure_cookie { "; Secure" } else { "" };
        format!(
            "{}={}; Path=/; HttpOnly; SameSite=Lax{secure}",
            self.cookie_name,
            self.sign(id)
        )
    }

    /// `Set-Cookie` value that removes the session cookie.
    pub fn clear_cookie_header(&self) -> String {
        let secure = if self.secure_cookie { "; Secure" } else { "" };
        format!(
            "{}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0{secure}",
            self.cookie_name
        )
    }
}
