//! Pending-choice store
//!
//! A session holds what the bot learned about a link until the user presses
//! one of the option buttons. Consumption removes the entry, so a second press
//! on the same keyboard is indistinguishable from an expired session.

use crate::config::RelaySettings;
use crate::media::{Selector, SourceUrl};
use moka::future::Cache;
use std::fmt;
use std::time::{Duration, Instant};
use tracing::debug;

/// Separator between selector and session id inside a callback token
pub const TOKEN_SEPARATOR: char = '|';

/// Telegram limit for `callback_data`
pub const MAX_TOKEN_BYTES: usize = 64;

/// Identity of a pending session, derived from the message holding the link
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionId(String);

impl SessionId {
    /// Build the id of the message `message_id` in chat `chat_id`
    #[must_use]
    pub fn from_message(chat_id: i64, message_id: i32) -> Self {
        Self(format!("{chat_id}:{message_id}"))
    }

    /// Accept an id read back from a callback token
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        if raw.is_empty() || raw.contains(TOKEN_SEPARATOR) {
            return None;
        }
        Some(Self(raw.to_string()))
    }

    /// The id as text
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A button press: which session and which output form
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Choice {
    /// Session the keyboard belongs to
    pub session_id: SessionId,
    /// Chosen output form
    pub selector: Selector,
}

impl Choice {
    /// Create a choice
    #[must_use]
    pub const fn new(session_id: SessionId, selector: Selector) -> Self {
        Self {
            session_id,
            selector,
        }
    }

    /// Callback token `"{selector}|{session_id}"`
    #[must_use]
    pub fn encode(&self) -> String {
        format!(
            "{}{TOKEN_SEPARATOR}{}",
            self.selector.wire(),
            self.session_id
        )
    }

    /// Parse a callback token; anything but two non-empty, valid fields is
    /// rejected
    #[must_use]
    pub fn parse(data: &str) -> Option<Self> {
        let mut parts = data.split(TOKEN_SEPARATOR);
        let selector = parts.next().filter(|s| !s.is_empty())?;
        let session = parts.next()?;
        if parts.next().is_some() {
            return None;
        }
        Some(Self {
            selector: selector.parse().ok()?,
            session_id: SessionId::parse(session)?,
        })
    }
}

/// One pending user choice
#[derive(Debug, Clone)]
pub struct Session {
    /// Session identity
    pub id: SessionId,
    /// Validated source link
    pub source: SourceUrl,
    /// Title, when the resolver learned one
    pub title: Option<String>,
    /// Offered selectors, audio-only last
    pub options: Vec<Selector>,
    /// Creation time, for expiry
    pub created_at: Instant,
}

impl Session {
    /// Create a session stamped with the current time
    #[must_use]
    pub fn new(
        id: SessionId,
        source: SourceUrl,
        title: Option<String>,
        options: Vec<Selector>,
    ) -> Self {
        Self {
            id,
            source,
            title,
            options,
            created_at: Instant::now(),
        }
    }

    /// Whether `selector` was offered for this session
    #[must_use]
    pub fn offers(&self, selector: Selector) -> bool {
        self.options.contains(&selector)
    }
}

/// Bounded TTL store of pending sessions
#[derive(Clone)]
pub struct SessionStore {
    cache: Cache<SessionId, Session>,
    /// Ids consumed by a press that started a job
    claimed: Cache<SessionId, ()>,
    ttl: Duration,
}

impl SessionStore {
    /// Creates a store whose entries live at most `ttl`
    ///
    /// # Examples
    ///
    /// ```
    /// use clip_relay_core::SessionStore;
    /// use std::time::Duration;
    ///
    /// let store = SessionStore::new(Duration::from_secs(3600), 10_000);
    /// assert_eq!(store.len(), 0);
    /// ```
    #[must_use]
    pub fn new(ttl: Duration, max_capacity: u64) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_capacity)
            .time_to_live(ttl)
            .build();
        let claimed = Cache::builder()
            .max_capacity(max_capacity)
            .time_to_live(ttl)
            .build();
        Self {
            cache,
            claimed,
            ttl,
        }
    }

    /// Store sized by settings
    #[must_use]
    pub fn from_settings(settings: &RelaySettings) -> Self {
        Self::new(settings.session_ttl(), settings.session_max_capacity)
    }

    /// Insert a session, replacing any entry with the same id
    pub async fn create(&self, session: Session) -> SessionId {
        let id = session.id.clone();
        self.claimed.invalidate(&id).await;
        self.cache.insert(id.clone(), session).await;
        debug!(session_id = %id, "Session created");
        id
    }

    /// Remove and return the session. Among concurrent callers on the same id
    /// exactly one gets `Some`.
    pub async fn consume(&self, id: &SessionId) -> Option<Session> {
        let session = self.cache.remove(id).await?;
        if session.created_at.elapsed() >= self.ttl {
            debug!(session_id = %id, "Session expired before consumption");
            return None;
        }
        self.claimed.insert(id.clone(), ()).await;
        Some(session)
    }

    /// Whether `id` was consumed by an earlier press rather than evicted
    #[must_use]
    pub fn was_claimed(&self, id: &SessionId) -> bool {
        self.claimed.contains_key(id)
    }

    /// Approximate number of pending sessions
    #[must_use]
    pub fn len(&self) -> u64 {
        self.cache.entry_count()
    }

    /// Whether the store is (approximately) empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
