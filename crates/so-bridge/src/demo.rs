//! Offline backends: an identity provider that accepts any credentials and
//! an in-process message store stashed in the key-value store.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::rc::{Rc, Weak};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use so_core::backend::{DetachHandle, IdentityProvider, MessageStore, SnapshotSink, StreamSubscription};
use so_core::error::{AuthError, StreamError};
use so_core::storage::{get_json, set_json, KeyValueStore};
use so_core::types::{order_and_window, ConversationId, Message, MessageDraft, Session};

/// Key under which [`LocalMessageStore`] keeps its conversations.
pub const LOCAL_CHAT_KEY: &str = "local_chat";

/// Messages kept per conversation in the local stash.
const STASH_LIMIT: usize = 1_000;

// ---------------------------------------------------------------------------
// DemoIdentity
// ---------------------------------------------------------------------------

/// Accepts any non-empty credentials.
///
/// The display name is the part of the identifier before `@`; provider
/// sign-in yields a fixed `GoogleUser` identity.
#[derive(Debug, Default)]
pub struct DemoIdentity {
    current: RefCell<Option<Session>>,
}

impl DemoIdentity {
    pub fn new() -> Self {
        Self::default()
    }

    fn session_for(identifier: &str, display_name: Option<&str>) -> Session {
        let identifier = identifier.trim();
        let local = identifier.split('@').next().unwrap_or(identifier);
        let mut session = Session::new(format!("demo-{}", identifier.to_lowercase()))
            .with_display_name(display_name.unwrap_or(local));
        if identifier.contains('@') {
            session = session.with_email(identifier);
        }
        session
    }

    fn set(&self, session: &Session) {
        *self.current.borrow_mut() = Some(session.clone());
    }
}

#[async_trait(?Send)]
impl IdentityProvider for DemoIdentity {
    fn name(&self) -> &'static str {
        "demo"
    }

    async fn sign_in_with_provider(&self) -> Result<Session, AuthError> {
        let session = Session::new("demo-google")
            .with_display_name("GoogleUser")
            .with_email("google.user@example.com");
        self.set(&session);
        Ok(session)
    }

    async fn sign_in_with_credentials(
        &self,
        identifier: &str,
        secret: &str,
    ) -> Result<Session, AuthError> {
        if identifier.trim().is_empty() || secret.is_empty() {
            return Err(AuthError::InvalidCredentials);
        }
        let session = Self::session_for(identifier, None);
        self.set(&session);
        Ok(session)
    }

    async fn register(&self, name: &str, identifier: &str, secret: &str) -> Result<Session, AuthError> {
        if identifier.trim().is_empty() || secret.is_empty() {
            return Err(AuthError::InvalidCredentials);
        }
        let name = name.trim();
        let session = Self::session_for(identifier, (!name.is_empty()).then_some(name));
        self.set(&session);
        Ok(session)
    }

    async fn send_password_reset(&self, _identifier: &str) -> Result<(), AuthError> {
        Ok(())
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        self.current.borrow_mut().take();
        Ok(())
    }

    async fn id_token(&self, _force_refresh: bool) -> Result<String, AuthError> {
        match self.current.borrow().as_ref() {
            Some(s) => Ok(format!("demo-token-{}", s.id)),
            None => Err(AuthError::NoSession),
        }
    }
}

// ---------------------------------------------------------------------------
// LocalMessageStore
// ---------------------------------------------------------------------------

struct Watcher {
    id: u64,
    conversation: ConversationId,
    max: usize,
    sink: SnapshotSink,
    active: Rc<Cell<bool>>,
}

struct LocalInner {
    kv: Option<Rc<dyn KeyValueStore>>,
    conversations: RefCell<BTreeMap<ConversationId, Vec<Message>>>,
    watchers: RefCell<Vec<Watcher>>,
    next_watcher: Cell<u64>,
    last_ts: Cell<Option<DateTime<Utc>>>,
}

/// In-process message store.
///
/// Appends are delivered synchronously to every subscriber of the
/// conversation, and subscribing delivers the current snapshot at once.
/// With a backing key-value store the history survives reloads.
#[derive(Clone)]
pub struct LocalMessageStore {
    inner: Rc<LocalInner>,
}

impl LocalMessageStore {
    /// A store that forgets everything on drop.
    pub fn in_memory() -> Self {
        Self::build(None, BTreeMap::new())
    }

    /// A store persisted under [`LOCAL_CHAT_KEY`].
    pub fn with_storage(kv: Rc<dyn KeyValueStore>) -> Self {
        let conversations = match get_json(kv.as_ref(), LOCAL_CHAT_KEY) {
            Ok(stash) => stash.unwrap_or_default(),
            Err(e) => {
                tracing::warn!(error = %e, "could not read local chat stash");
                BTreeMap::new()
            }
        };
        Self::build(Some(kv), conversations)
    }

    fn build(
        kv: Option<Rc<dyn KeyValueStore>>,
        conversations: BTreeMap<ConversationId, Vec<Message>>,
    ) -> Self {
        let last_ts = conversations
            .values()
            .flat_map(|msgs| msgs.iter().map(|m| m.sent_at))
            .max();
        Self {
            inner: Rc::new(LocalInner {
                kv,
                conversations: RefCell::new(conversations),
                watchers: RefCell::new(Vec::new()),
                next_watcher: Cell::new(0),
                last_ts: Cell::new(last_ts),
            }),
        }
    }

    /// Every stored message of `conversation`, oldest first.
    pub fn history(&self, conversation: &ConversationId) -> Vec<Message> {
        self.inner
            .conversations
            .borrow()
            .get(conversation)
            .cloned()
            .unwrap_or_default()
    }

    pub fn watcher_count(&self) -> usize {
        self.inner.watchers.borrow().len()
    }

    /// Strictly increasing timestamps, even for appends within one tick.
    fn next_timestamp(&self) -> DateTime<Utc> {
        let now = Utc::now();
        let ts = match self.inner.last_ts.get() {
            Some(last) if now <= last => last + Duration::milliseconds(1),
            _ => now,
        };
        self.inner.last_ts.set(Some(ts));
        ts
    }

    fn persist(&self, conversations: &BTreeMap<ConversationId, Vec<Message>>) -> Result<(), StreamError> {
        let Some(kv) = &self.inner.kv else {
            return Ok(());
        };
        set_json(kv.as_ref(), LOCAL_CHAT_KEY, conversations)
            .map_err(|e| StreamError::Write(e.to_string()))
    }

    fn snapshot(&self, conversation: &ConversationId, max: usize) -> Vec<Message> {
        order_and_window(self.history(conversation), max)
    }

    fn fan_out(&self, conversation: &ConversationId) {
        let targets: Vec<(usize, SnapshotSink, Rc<Cell<bool>>)> = self
            .inner
            .watchers
            .borrow()
            .iter()
            .filter(|w| w.conversation == *conversation)
            .map(|w| (w.max, Rc::clone(&w.sink), Rc::clone(&w.active)))
            .collect();
        for (max, sink, active) in targets {
            if active.get() {
                sink(Ok(self.snapshot(conversation, max)));
            }
        }
    }
}

fn remove_watcher(inner: &Weak<LocalInner>, id: u64) {
    if let Some(inner) = inner.upgrade() {
        inner.watchers.borrow_mut().retain(|w| w.id != id);
    }
}

#[async_trait(?Send)]
impl MessageStore for LocalMessageStore {
    fn name(&self) -> &'static str {
        "local"
    }

    async fn append(&self, conversation: &ConversationId, draft: MessageDraft) -> Result<(), StreamError> {
        let message = Message {
            id: Uuid::new_v4().to_string(),
            author_id: draft.author_id,
            author_name: draft.author_name,
            body: draft.body,
            sent_at: self.next_timestamp(),
        };
        // Stage the change; memory is only updated once it is stored.
        let mut staged = self.inner.conversations.borrow().clone();
        let list = staged.entry(conversation.clone()).or_default();
        list.push(message);
        if list.len() > STASH_LIMIT {
            let excess = list.len() - STASH_LIMIT;
            list.drain(0..excess);
        }
        self.persist(&staged)?;
        *self.inner.conversations.borrow_mut() = staged;
        tracing::debug!(conversation = %conversation, "local append");
        self.fan_out(conversation);
        Ok(())
    }

    fn subscribe(
        &self,
        conversation: &ConversationId,
        max: usize,
        sink: SnapshotSink,
    ) -> Result<Box<dyn StreamSubscription>, StreamError> {
        let id = self.inner.next_watcher.get();
        self.inner.next_watcher.set(id + 1);
        let active = Rc::new(Cell::new(true));
        self.inner.watchers.borrow_mut().push(Watcher {
            id,
            conversation: conversation.clone(),
            max,
            sink: Rc::clone(&sink),
            active: Rc::clone(&active),
        });

        sink(Ok(self.snapshot(conversation, max)));

        let weak = Rc::downgrade(&self.inner);
        Ok(Box::new(DetachHandle::new(active, move || {
            remove_watcher(&weak, id)
        })))
    }
}

impl std::fmt::Debug for LocalMessageStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalMessageStore")
            .field("conversations", &self.inner.conversations.borrow().len())
            .field("watchers", &self.inner.watchers.borrow().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::executor::block_on;
    use so_core::storage::MemoryStorage;

    fn draft(author: &str, body: &str) -> MessageDraft {
        MessageDraft {
            author_id: author.into(),
            author_name: author.into(),
            body: body.into(),
        }
    }

    fn collecting_sink() -> (SnapshotSink, Rc<RefCell<Vec<Vec<Message>>>>) {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let seen2 = Rc::clone(&seen);
        let sink: SnapshotSink = Rc::new(move |result| {
            if let Ok(msgs) = result {
                seen2.borrow_mut().push(msgs);
            }
        });
        (sink, seen)
    }

    #[test]
    fn demo_identity_derives_name_from_email() {
        let id = DemoIdentity::new();
        let session = block_on(id.sign_in_with_credentials("aida@example.com", "pw")).unwrap();
        assert_eq!(session.display_name.as_deref(), Some("aida"));
        assert_eq!(session.email.as_deref(), Some("aida@example.com"));
        assert!(block_on(id.id_token(false)).unwrap().starts_with("demo-token-"));

        block_on(id.sign_out()).unwrap();
        assert_eq!(block_on(id.id_token(false)), Err(AuthError::NoSession));
    }

    #[test]
    fn demo_identity_rejects_empty_credentials() {
        let id = DemoIdentity::new();
        assert_eq!(
            block_on(id.sign_in_with_credentials("", "pw")),
            Err(AuthError::InvalidCredentials)
        );
    }

    #[test]
    fn demo_provider_sign_in_is_google_user() {
        let session = block_on(DemoIdentity::new().sign_in_with_provider()).unwrap();
        assert_eq!(session.display_name.as_deref(), Some("GoogleUser"));
        assert!(!session.has_avatar());
    }

    #[test]
    fn subscribe_delivers_current_snapshot_then_updates() {
        let store = LocalMessageStore::in_memory();
        let global = ConversationId::global();
        block_on(store.append(&global, draft("a", "one"))).unwrap();

        let (sink, seen) = collecting_sink();
        let _sub = store.subscribe(&global, 10, sink).unwrap();
        assert_eq!(seen.borrow().len(), 1);
        assert_eq!(seen.borrow()[0][0].body, "one");

        block_on(store.append(&global, draft("b", "two"))).unwrap();
        assert_eq!(seen.borrow().len(), 2);
        let last = &seen.borrow()[1];
        assert_eq!(last.iter().map(|m| m.body.as_str()).collect::<Vec<_>>(), vec!["one", "two"]);
        assert!(last[0].sent_at < last[1].sent_at);
    }

    #[test]
    fn conversations_are_isolated() {
        let store = LocalMessageStore::in_memory();
        let (sink, seen) = collecting_sink();
        let _sub = store.subscribe(&ConversationId::direct("a", "b"), 10, sink).unwrap();
        block_on(store.append(&ConversationId::global(), draft("a", "hi"))).unwrap();
        assert_eq!(seen.borrow().len(), 1);
        assert!(seen.borrow()[0].is_empty());
    }

    #[test]
    fn detach_stops_delivery() {
        let store = LocalMessageStore::in_memory();
        let global = ConversationId::global();
        let (sink, seen) = collecting_sink();
        let mut sub = store.subscribe(&global, 10, sink).unwrap();
        assert_eq!(store.watcher_count(), 1);
        sub.detach();
        assert_eq!(store.watcher_count(), 0);
        block_on(store.append(&global, draft("a", "hi"))).unwrap();
        assert_eq!(seen.borrow().len(), 1);
    }

    #[test]
    fn snapshot_is_windowed() {
        let store = LocalMessageStore::in_memory();
        let global = ConversationId::global();
        for i in 0..5 {
            block_on(store.append(&global, draft("a", &i.to_string()))).unwrap();
        }
        let (sink, seen) = collecting_sink();
        let _sub = store.subscribe(&global, 2, sink).unwrap();
        let bodies: Vec<_> = seen.borrow()[0].iter().map(|m| m.body.clone()).collect();
        assert_eq!(bodies, vec!["3", "4"]);
    }

    #[test]
    fn history_survives_reload() {
        let kv: Rc<dyn KeyValueStore> = Rc::new(MemoryStorage::new());
        let store = LocalMessageStore::with_storage(Rc::clone(&kv));
        block_on(store.append(&ConversationId::global(), draft("a", "kept"))).unwrap();
        drop(store);

        let reloaded = LocalMessageStore::with_storage(kv);
        let history = reloaded.history(&ConversationId::global());
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].body, "kept");
    }

    /// Reads succeed, every write is refused.
    struct FullStorage;

    impl KeyValueStore for FullStorage {
        fn get(&self, _key: &str) -> Result<Option<String>, so_core::error::StorageError> {
            Ok(None)
        }

        fn set(&self, _key: &str, _value: &str) -> Result<(), so_core::error::StorageError> {
            Err(so_core::error::StorageError::Unavailable("quota exceeded".into()))
        }

        fn remove(&self, _key: &str) -> Result<(), so_core::error::StorageError> {
            Ok(())
        }
    }

    #[test]
    fn failed_write_leaves_nothing_behind() {
        let store = LocalMessageStore::with_storage(Rc::new(FullStorage));
        let global = ConversationId::global();
        let (sink, seen) = collecting_sink();
        let _sub = store.subscribe(&global, 10, sink).unwrap();

        let err = block_on(store.append(&global, draft("a", "not sent"))).unwrap_err();
        assert!(matches!(err, StreamError::Write(_)));
        assert!(store.history(&global).is_empty());
        // only the initial snapshot was delivered
        assert_eq!(seen.borrow().len(), 1);

        let (sink, seen) = collecting_sink();
        let _again = store.subscribe(&global, 10, sink).unwrap();
        assert!(seen.borrow()[0].is_empty());
    }
}
