use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::error::StorageError;
use crate::storage::{get_json, set_json, KeyValueStore};
use crate::types::{Profile, Session};

/// Well-known key of the stored user record.
pub const USER_KEY: &str = "socially_user";

/// The single persisted user record.
///
/// Two sections, each with one writer: the auth bridge owns `session`, the
/// profile editor owns `profile`. A writer replaces its whole section; there
/// is no field-level merge.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredUser {
    #[serde(default)]
    pub session: Option<Session>,
    #[serde(default)]
    pub profile: Option<Profile>,
}

impl StoredUser {
    /// Name to show in navigation: profile name, then session display name,
    /// then email.
    pub fn display_name(&self) -> Option<String> {
        let from_profile = self
            .profile
            .as_ref()
            .map(|p| p.name.trim())
            .filter(|n| !n.is_empty());
        let from_session = self.session.as_ref().and_then(|s| {
            s.display_name
                .as_deref()
                .or(s.email.as_deref())
                .map(str::trim)
                .filter(|n| !n.is_empty())
        });
        from_profile.or(from_session).map(str::to_string)
    }

    /// Avatar to show in navigation: the profile's, else the session's.
    pub fn avatar(&self) -> Option<String> {
        self.profile
            .as_ref()
            .and_then(|p| p.avatar.clone())
            .or_else(|| self.session.as_ref().and_then(|s| s.avatar.clone()))
            .filter(|a| !a.is_empty())
    }
}

/// Persisted user record surviving reloads.
#[derive(Clone)]
pub struct ProfileStore {
    kv: Rc<dyn KeyValueStore>,
}

impl ProfileStore {
    pub fn new(kv: Rc<dyn KeyValueStore>) -> Self {
        Self { kv }
    }

    /// The record, or an empty one when nothing is stored.
    pub fn load(&self) -> Result<StoredUser, StorageError> {
        Ok(get_json(self.kv.as_ref(), USER_KEY)?.unwrap_or_default())
    }

    pub fn session(&self) -> Result<Option<Session>, StorageError> {
        Ok(self.load()?.session)
    }

    pub fn profile(&self) -> Result<Option<Profile>, StorageError> {
        Ok(self.load()?.profile)
    }

    /// Replace the session section with `session`.
    pub fn mirror_session(&self, session: &Session) -> Result<(), StorageError> {
        let mut record = self.load()?;
        record.session = Some(session.clone());
        self.write(&record)
    }

    /// Drop the session section; the profile survives sign-out.
    pub fn clear_session(&self) -> Result<(), StorageError> {
        let mut record = self.load()?;
        if record.session.take().is_none() {
            return Ok(());
        }
        self.write(&record)
    }

    /// Replace the profile section with `profile`.
    pub fn save_profile(&self, profile: &Profile) -> Result<(), StorageError> {
        let mut record = self.load()?;
        record.profile = Some(profile.clone());
        self.write(&record)
    }

    /// The raw key-value store, for components that keep their own keys.
    pub fn kv(&self) -> Rc<dyn KeyValueStore> {
        Rc::clone(&self.kv)
    }

    fn write(&self, record: &StoredUser) -> Result<(), StorageError> {
        if record.session.is_none() && record.profile.is_none() {
            return self.kv.remove(USER_KEY);
        }
        set_json(self.kv.as_ref(), USER_KEY, record)
    }
}

impl std::fmt::Debug for ProfileStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProfileStore").finish_non_exhaustive()
    }
}
