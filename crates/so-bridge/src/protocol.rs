use serde::{Deserialize, Deserializer, Serialize, Serializer};
use zeroize::Zeroize;

use so_core::types::{ConversationId, Session};

/// Names of the bus topics; one per [`BusEvent`] variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Topic {
    SignIn,
    SignUp,
    Google,
    Forgot,
    Logout,
    AuthChanged,
    LoggedIn,
    LoggedOut,
    SendMessage,
    AppendMessage,
    ChatOpen,
    JoinConversation,
}

impl Topic {
    pub const ALL: [Topic; 12] = [
        Topic::SignIn,
        Topic::SignUp,
        Topic::Google,
        Topic::Forgot,
        Topic::Logout,
        Topic::AuthChanged,
        Topic::LoggedIn,
        Topic::LoggedOut,
        Topic::SendMessage,
        Topic::AppendMessage,
        Topic::ChatOpen,
        Topic::JoinConversation,
    ];

    /// Wire name, identical to the serialized `type` tag.
    pub fn as_str(self) -> &'static str {
        match self {
            Topic::SignIn => "signin",
            Topic::SignUp => "signup",
            Topic::Google => "google",
            Topic::Forgot => "forgot",
            Topic::Logout => "logout",
            Topic::AuthChanged => "authChanged",
            Topic::LoggedIn => "loggedIn",
            Topic::LoggedOut => "loggedOut",
            Topic::SendMessage => "sendMessage",
            Topic::AppendMessage => "appendMessage",
            Topic::ChatOpen => "chatOpen",
            Topic::JoinConversation => "joinConversation",
        }
    }
}

impl std::fmt::Display for Topic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything that travels over the [`EventBus`](crate::event_bus::EventBus).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum BusEvent {
    // UI -> auth
    #[serde(rename = "signin")]
    SignIn { identifier: String, secret: Secret },
    #[serde(rename = "signup")]
    SignUp {
        name: String,
        identifier: String,
        secret: Secret,
    },
    #[serde(rename = "google")]
    Google {},
    #[serde(rename = "forgot")]
    Forgot { identifier: String },
    #[serde(rename = "logout")]
    Logout {},

    // auth -> UI
    #[serde(rename = "authChanged")]
    AuthChanged { user: Option<Session> },
    #[serde(rename = "loggedIn")]
    LoggedIn { user: Session },
    #[serde(rename = "loggedOut")]
    LoggedOut {},

    // chat
    #[serde(rename = "sendMessage", rename_all = "camelCase")]
    SendMessage {
        conversation_id: ConversationId,
        text: String,
    },
    #[serde(rename = "appendMessage", rename_all = "camelCase")]
    AppendMessage { from_id: String, text: String },
    #[serde(rename = "chatOpen", rename_all = "camelCase")]
    ChatOpen { conversation_id: ConversationId },
    #[serde(rename = "joinConversation", rename_all = "camelCase")]
    JoinConversation {
        conversation_id: ConversationId,
        peer: String,
    },
}

impl BusEvent {
    pub fn topic(&self) -> Topic {
        match self {
            BusEvent::SignIn { .. } => Topic::SignIn,
            BusEvent::SignUp { .. } => Topic::SignUp,
            BusEvent::Google {} => Topic::Google,
            BusEvent::Forgot { .. } => Topic::Forgot,
            BusEvent::Logout {} => Topic::Logout,
            BusEvent::AuthChanged { .. } => Topic::AuthChanged,
            BusEvent::LoggedIn { .. } => Topic::LoggedIn,
            BusEvent::LoggedOut {} => Topic::LoggedOut,
            BusEvent::SendMessage { .. } => Topic::SendMessage,
            BusEvent::AppendMessage { .. } => Topic::AppendMessage,
            BusEvent::ChatOpen { .. } => Topic::ChatOpen,
            BusEvent::JoinConversation { .. } => Topic::JoinConversation,
        }
    }
}

/// A password travelling through the bus.
///
/// Redacted in `Debug` and in serialized output, wiped from memory on drop.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Drop for Secret {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

impl std::fmt::Debug for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Secret(***)")
    }
}

impl From<&str> for Secret {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl Serialize for Secret {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str("***")
    }
}

impl<'de> Deserialize<'de> for Secret {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(Secret)
    }
}
