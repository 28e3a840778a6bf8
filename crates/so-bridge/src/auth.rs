use std::cell::{Cell, RefCell};
use std::rc::Rc;

use so_core::backend::IdentityProvider;
use so_core::error::AuthError;
use so_core::profile_store::ProfileStore;
use so_core::types::Session;

use crate::event_bus::{EventBus, SubscriptionToken};
use crate::notifications::ToastQueue;
use crate::protocol::{BusEvent, Topic};
use crate::spawner::Spawner;

type SessionListener = Rc<dyn Fn(Option<&Session>)>;

/// Handle returned by [`AuthBridge::on_session_changed`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListenerId(u64);

struct AuthInner {
    provider: Rc<dyn IdentityProvider>,
    store: ProfileStore,
    bus: EventBus,
    toasts: ToastQueue,
    current: RefCell<Option<Session>>,
    listeners: RefCell<Vec<(u64, SessionListener)>>,
    next_listener: Cell<u64>,
}

/// Single source of truth for "who is signed in".
///
/// Wraps the identity provider; every successful sign-in mirrors the session
/// into the profile store and announces it on the bus exactly once, and
/// sign-out clears both.
#[derive(Clone)]
pub struct AuthBridge {
    inner: Rc<AuthInner>,
}

impl AuthBridge {
    pub fn new(
        provider: Rc<dyn IdentityProvider>,
        store: ProfileStore,
        bus: EventBus,
        toasts: ToastQueue,
    ) -> Self {
        Self {
            inner: Rc::new(AuthInner {
                provider,
                store,
                bus,
                toasts,
                current: RefCell::new(None),
                listeners: RefCell::new(Vec::new()),
                next_listener: Cell::new(0),
            }),
        }
    }

    /// Load the mirrored session from the store without announcing it.
    ///
    /// Called once at startup so a reload keeps the user signed in.
    pub fn restore(&self) -> Option<Session> {
        let session = match self.inner.store.session() {
            Ok(session) => session,
            Err(e) => {
                tracing::warn!(error = %e, "could not read stored session");
                None
            }
        };
        if let Some(s) = &session {
            tracing::info!(user = %s.id, "restored session");
        }
        *self.inner.current.borrow_mut() = session.clone();
        session
    }

    pub fn current_session(&self) -> Option<Session> {
        self.inner.current.borrow().clone()
    }

    pub fn is_signed_in(&self) -> bool {
        self.inner.current.borrow().is_some()
    }

    pub fn provider_name(&self) -> &'static str {
        self.inner.provider.name()
    }

    pub async fn sign_in_with_provider(&self) -> Result<Session, AuthError> {
        let result = self.inner.provider.sign_in_with_provider().await;
        self.finish("provider", result)
    }

    pub async fn sign_in_with_credentials(
        &self,
        identifier: &str,
        secret: &str,
    ) -> Result<Session, AuthError> {
        let result = self
            .inner
            .provider
            .sign_in_with_credentials(identifier, secret)
            .await;
        self.finish("credentials", result)
    }

    /// Create an account and sign in as it.
    pub async fn register(
        &self,
        name: &str,
        identifier: &str,
        secret: &str,
    ) -> Result<Session, AuthError> {
        let result = self.inner.provider.register(name, identifier, secret).await;
        self.finish("register", result)
    }

    pub async fn send_password_reset(&self, identifier: &str) -> Result<(), AuthError> {
        let result = self.inner.provider.send_password_reset(identifier).await;
        match &result {
            Ok(()) => tracing::info!("password reset requested"),
            Err(e) => tracing::warn!(error = %e, "password reset failed"),
        }
        result
    }

    /// End the session.
    ///
    /// Local state is cleared even when the provider call fails; the
    /// provider error is still returned.
    pub async fn sign_out(&self) -> Result<(), AuthError> {
        let result = self.inner.provider.sign_out().await;
        if let Err(e) = &result {
            tracing::warn!(error = %e, "provider sign-out failed");
        }
        let was_signed_in = self.inner.current.borrow_mut().take().is_some();
        if let Err(e) = self.inner.store.clear_session() {
            tracing::warn!(error = %e, "could not clear stored session");
        }
        if was_signed_in {
            tracing::info!("signed out");
        }
        self.notify(None);
        self.inner.bus.publish(BusEvent::AuthChanged { user: None });
        self.inner.bus.publish(BusEvent::LoggedOut {});
        result
    }

    pub async fn id_token(&self, force_refresh: bool) -> Result<String, AuthError> {
        if !self.is_signed_in() {
            return Err(AuthError::NoSession);
        }
        self.inner.provider.id_token(force_refresh).await
    }

    /// Observe session changes without going through the bus.
    pub fn on_session_changed(&self, listener: impl Fn(Option<&Session>) + 'static) -> ListenerId {
        let id = self.inner.next_listener.get();
        self.inner.next_listener.set(id + 1);
        self.inner
            .listeners
            .borrow_mut()
            .push((id, Rc::new(listener)));
        ListenerId(id)
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut listeners = self.inner.listeners.borrow_mut();
        let before = listeners.len();
        listeners.retain(|(i, _)| *i != id.0);
        before != listeners.len()
    }

    /// Serve the UI -> auth topics of `bus`.
    ///
    /// Each request runs on `spawner`; failures are raised as error toasts
    /// since a bus publisher cannot receive a result.
    pub fn attach(&self, bus: &EventBus, spawner: &Spawner) -> Vec<SubscriptionToken> {
        const REQUESTS: [Topic; 5] = [
            Topic::SignIn,
            Topic::SignUp,
            Topic::Google,
            Topic::Forgot,
            Topic::Logout,
        ];
        REQUESTS
            .into_iter()
            .map(|topic| {
                let weak = Rc::downgrade(&self.inner);
                let spawner = spawner.clone();
                bus.subscribe(topic, move |event| {
                    if let Some(inner) = weak.upgrade() {
                        let bridge = AuthBridge { inner };
                        let event = event.clone();
                        spawner.spawn(async move { bridge.serve(event).await });
                    }
                    Ok(())
                })
            })
            .collect()
    }

    async fn serve(&self, event: BusEvent) {
        let result = match &event {
            BusEvent::SignIn { identifier, secret } => self
                .sign_in_with_credentials(identifier, secret.expose())
                .await
                .map(drop),
            BusEvent::SignUp {
                name,
                identifier,
                secret,
            } => self.register(name, identifier, secret.expose()).await.map(drop),
            BusEvent::Google {} => self.sign_in_with_provider().await.map(drop),
            BusEvent::Forgot { identifier } => {
                let result = self.send_password_reset(identifier).await;
                if result.is_ok() {
                    self.inner.toasts.info("Reset link sent. Check your email.");
                }
                result
            }
            BusEvent::Logout {} => self.sign_out().await,
            _ => Ok(()),
        };
        if let Err(e) = result {
            self.inner.toasts.error(e.to_string());
        }
    }

    fn finish(
        &self,
        method: &'static str,
        result: Result<Session, AuthError>,
    ) -> Result<Session, AuthError> {
        match result {
            Ok(session) => {
                tracing::info!(user = %session.id, method, "signed in");
                self.complete_sign_in(&session);
                Ok(session)
            }
            Err(e) => {
                tracing::warn!(error = %e, method, "sign-in failed");
                Err(e)
            }
        }
    }

    fn complete_sign_in(&self, session: &Session) {
        *self.inner.current.borrow_mut() = Some(session.clone());
        if let Err(e) = self.inner.store.mirror_session(session) {
            tracing::warn!(error = %e, "could not persist session");
        }
        self.inner
            .toasts
            .success(format!("Welcome, {}", session.greeting_name()));
        self.notify(Some(session));
        self.inner.bus.publish(BusEvent::AuthChanged {
            user: Some(session.clone()),
        });
        self.inner.bus.publish(BusEvent::LoggedIn {
            user: session.clone(),
        });
    }

    fn notify(&self, session: Option<&Session>) {
        let listeners: Vec<SessionListener> = self
            .inner
            .listeners
            .borrow()
            .iter()
            .map(|(_, l)| Rc::clone(l))
            .collect();
        for listener in listeners {
            listener(session);
        }
    }
}

impl std::fmt::Debug for AuthBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthBridge")
            .field("provider", &self.inner.provider.name())
            .field("current", &self.inner.current.borrow())
            .finish_non_exhaustive()
    }
}
