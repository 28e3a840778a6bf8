use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// The authenticated identity of the current user for this run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub avatar: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

impl Session {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: None,
            avatar: None,
            email: None,
        }
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn with_avatar(mut self, avatar: impl Into<String>) -> Self {
        self.avatar = Some(avatar.into());
        self
    }

    /// Name shown next to messages this session authors.
    ///
    /// Falls back to the email address, then to `"You"`.
    pub fn label(&self) -> String {
        non_empty(self.display_name.as_deref())
            .or_else(|| non_empty(self.email.as_deref()))
            .unwrap_or("You")
            .to_string()
    }

    /// Short greeting name: display name, else the local part of the email.
    pub fn greeting_name(&self) -> String {
        if let Some(name) = non_empty(self.display_name.as_deref()) {
            return name.to_string();
        }
        match non_empty(self.email.as_deref()) {
            Some(email) => email.split('@').next().unwrap_or(email).to_string(),
            None => "user".to_string(),
        }
    }

    pub fn has_avatar(&self) -> bool {
        non_empty(self.avatar.as_deref()).is_some()
    }
}

fn non_empty(s: Option<&str>) -> Option<&str> {
    s.map(str::trim).filter(|s| !s.is_empty())
}

// ---------------------------------------------------------------------------
// Profile
// ---------------------------------------------------------------------------

/// Durable, user-editable descriptive record, distinct from the [`Session`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub name: String,
    #[serde(default)]
    pub bio: String,
    #[serde(default)]
    pub interests: Vec<String>,
    #[serde(default)]
    pub avatar: Option<String>,
}

// ---------------------------------------------------------------------------
// ConversationId
// ---------------------------------------------------------------------------

/// Opaque key selecting which message stream to subscribe to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationId(String);

impl ConversationId {
    pub const GLOBAL: &'static str = "global";

    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The single shared stream everyone lands in by default.
    pub fn global() -> Self {
        Self(Self::GLOBAL.to_string())
    }

    /// Deterministic key for a pairwise conversation.
    ///
    /// Both participants derive the same id regardless of argument order.
    pub fn direct(a: &str, b: &str) -> Self {
        let mut pair = [a, b];
        pair.sort_unstable();
        Self(format!("dm_{}_{}", pair[0], pair[1]))
    }

    pub fn is_global(&self) -> bool {
        self.0 == Self::GLOBAL
    }

    pub fn is_direct(&self) -> bool {
        self.0.starts_with("dm_")
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ConversationId {
    fn default() -> Self {
        Self::global()
    }
}

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ConversationId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// An immutable chat message as delivered by the message store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub author_id: String,
    pub author_name: String,
    pub body: String,
    /// Store-assigned ordering timestamp.
    pub sent_at: DateTime<Utc>,
}

impl Message {
    /// The body cut to at most `max_chars` characters.
    pub fn preview(&self, max_chars: usize) -> &str {
        truncate_chars(&self.body, max_chars)
    }

    /// Sort key: timestamp first, id as tie-breaker.
    pub fn order_key(&self) -> (DateTime<Utc>, &str) {
        (self.sent_at, self.id.as_str())
    }
}

/// Sort messages ascending by timestamp and keep only the newest `max`.
pub fn order_and_window(mut messages: Vec<Message>, max: usize) -> Vec<Message> {
    messages.sort_by(|a, b| a.order_key().cmp(&b.order_key()));
    if messages.len() > max {
        messages.drain(0..messages.len() - max);
    }
    messages
}

/// An outgoing message before the store assigns id and timestamp.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageDraft {
    pub author_id: String,
    pub author_name: String,
    pub body: String,
}

/// Slice `s` to at most `max_chars` characters without splitting a code point.
pub fn truncate_chars(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
