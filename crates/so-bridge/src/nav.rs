use serde::{Deserialize, Serialize};

use so_core::profile_store::StoredUser;

/// What the navigation bar shows.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum NavState {
    /// Login and sign-up entry points.
    #[default]
    Guest,
    /// Avatar (or initial) and a logout entry point.
    #[serde(rename_all = "camelCase")]
    SignedIn {
        display_name: String,
        initial: String,
        avatar: Option<String>,
    },
}

impl NavState {
    /// Derive the navigation state from the stored record.
    ///
    /// Signed in only while a session is stored; a profile alone does not
    /// count.
    pub fn from_record(record: &StoredUser) -> Self {
        let Some(session) = &record.session else {
            return NavState::Guest;
        };
        let display_name = record
            .display_name()
            .unwrap_or_else(|| session.greeting_name());
        let initial = display_name
            .chars()
            .next()
            .map(|c| c.to_uppercase().collect())
            .unwrap_or_else(|| "?".to_string());
        NavState::SignedIn {
            display_name,
            initial,
            avatar: record.avatar(),
        }
    }

    pub fn is_signed_in(&self) -> bool {
        matches!(self, NavState::SignedIn { .. })
    }
}
