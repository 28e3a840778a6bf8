use std::rc::Rc;
use std::time::Duration;

use so_core::backend::{IdentityProvider, MessageStore};
use so_core::config::{BackendKind, Config, FirebaseConfig};
use so_core::storage::KeyValueStore;
use so_integrations::firebase::{FirebaseError, FirebaseIdentity, FirestoreStore};

use crate::demo::{DemoIdentity, LocalMessageStore};
use crate::spawner::Spawner;

/// The identity provider and message store pair the app runs against.
#[derive(Clone)]
pub struct Backend {
    kind: BackendKind,
    identity: Rc<dyn IdentityProvider>,
    messages: Rc<dyn MessageStore>,
    poller: Option<(FirestoreStore, Duration)>,
}

impl Backend {
    /// Offline pair; chat history lives in `kv`.
    pub fn demo(kv: Rc<dyn KeyValueStore>) -> Self {
        Self {
            kind: BackendKind::Demo,
            identity: Rc::new(DemoIdentity::new()),
            messages: Rc::new(LocalMessageStore::with_storage(kv)),
            poller: None,
        }
    }

    /// Firebase Authentication and Cloud Firestore over REST.
    ///
    /// Refresh tokens are kept in `kv` so a restarted client stays
    /// authorised.
    pub fn firebase(config: &FirebaseConfig, kv: Rc<dyn KeyValueStore>) -> Result<Self, FirebaseError> {
        let api_key = config
            .api_key()
            .ok_or_else(|| FirebaseError::MissingApiKey(config.api_key_env.clone()))?;
        Self::firebase_with_key(config, api_key, kv)
    }

    /// Like [`firebase`](Self::firebase) with the API key supplied by the
    /// host; the browser has no environment to read it from.
    pub fn firebase_with_key(
        config: &FirebaseConfig,
        api_key: String,
        kv: Rc<dyn KeyValueStore>,
    ) -> Result<Self, FirebaseError> {
        let identity = Rc::new(FirebaseIdentity::new(config, api_key.clone())?.with_storage(kv));
        let tokens: Rc<dyn IdentityProvider> = identity.clone();
        let store = FirestoreStore::new(config, api_key, tokens)?;
        Ok(Self {
            kind: BackendKind::Firebase,
            identity,
            messages: Rc::new(store.clone()),
            poller: Some((store, Duration::from_millis(config.poll_interval_ms))),
        })
    }

    pub fn from_config(config: &Config, kv: Rc<dyn KeyValueStore>) -> Result<Self, FirebaseError> {
        match config.backend.kind {
            BackendKind::Demo => Ok(Self::demo(kv)),
            BackendKind::Firebase => Self::firebase(&config.firebase, kv),
        }
    }

    /// Assemble from arbitrary parts.
    pub fn custom(
        kind: BackendKind,
        identity: Rc<dyn IdentityProvider>,
        messages: Rc<dyn MessageStore>,
    ) -> Self {
        Self {
            kind,
            identity,
            messages,
            poller: None,
        }
    }

    pub fn kind(&self) -> BackendKind {
        self.kind
    }

    pub fn identity(&self) -> Rc<dyn IdentityProvider> {
        Rc::clone(&self.identity)
    }

    pub fn messages(&self) -> Rc<dyn MessageStore> {
        Rc::clone(&self.messages)
    }

    /// Start background work the backend needs; currently the Firestore
    /// poll loop.
    pub fn start(&self, spawner: &Spawner) {
        if let Some((store, interval)) = &self.poller {
            let store = store.clone();
            let interval = *interval;
            let sleep = spawner.sleeper();
            tracing::info!(interval_ms = interval.as_millis() as u64, "starting firestore poller");
            spawner.spawn(async move { store.watch_loop(interval, sleep).await });
        }
    }
}

impl std::fmt::Debug for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Backend")
            .field("kind", &self.kind)
            .field("identity", &self.identity.name())
            .field("messages", &self.messages.name())
            .finish()
    }
}
