use std::rc::Rc;

use so_core::config::Config;
use so_core::profile_store::ProfileStore;
use so_core::storage::KeyValueStore;
use so_core::types::ConversationId;
use so_integrations::firebase::FirebaseError;

use crate::auth::AuthBridge;
use crate::backend::Backend;
use crate::event_bus::EventBus;
use crate::feed::LiveMessageFeed;
use crate::notifications::ToastQueue;
use crate::spawner::Spawner;

/// Every long-lived component, wired together once at startup.
#[derive(Clone)]
pub struct AppContext {
    pub config: Rc<Config>,
    pub bus: EventBus,
    pub store: ProfileStore,
    pub toasts: ToastQueue,
    pub auth: AuthBridge,
    pub feed: LiveMessageFeed,
    pub backend: Backend,
    pub spawner: Spawner,
}

impl AppContext {
    /// Wire the components, restore a stored session and start the backend.
    pub fn new(config: Config, backend: Backend, kv: Rc<dyn KeyValueStore>, spawner: Spawner) -> Self {
        let bus = EventBus::new();
        let store = ProfileStore::new(kv);
        let toasts = ToastQueue::new(config.toasts.clone());

        let auth = AuthBridge::new(backend.identity(), store.clone(), bus.clone(), toasts.clone());
        auth.restore();
        auth.attach(&bus, &spawner);

        let feed = LiveMessageFeed::new(
            backend.messages(),
            auth.clone(),
            toasts.clone(),
            config.chat.clone(),
        );
        feed.attach(&bus, &spawner);

        backend.start(&spawner);
        tracing::info!(backend = ?backend, "app context ready");

        Self {
            config: Rc::new(config),
            bus,
            store,
            toasts,
            auth,
            feed,
            backend,
            spawner,
        }
    }

    /// Build the backend named by `config` and wire everything around it.
    pub fn from_config(
        config: Config,
        kv: Rc<dyn KeyValueStore>,
        spawner: Spawner,
    ) -> Result<Self, FirebaseError> {
        let backend = Backend::from_config(&config, Rc::clone(&kv))?;
        Ok(Self::new(config, backend, kv, spawner))
    }

    pub fn default_conversation(&self) -> ConversationId {
        ConversationId::new(self.config.chat.default_conversation.clone())
    }
}

impl std::fmt::Debug for AppContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppContext")
            .field("backend", &self.backend)
            .field("auth", &self.auth)
            .field("feed", &self.feed)
            .finish_non_exhaustive()
    }
}
