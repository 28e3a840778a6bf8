#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use futures::executor::LocalPool;
use futures::task::LocalSpawnExt;

use so_bridge::backend::Backend;
use so_bridge::controller::UiController;
use so_bridge::{AppContext, Spawner};
use so_bridge::demo::DemoIdentity;
use so_core::backend::{DetachHandle, IdentityProvider, MessageStore, SnapshotSink, StreamSubscription};
use so_core::config::Config;
use so_core::error::{AuthError, StreamError};
use so_core::storage::{KeyValueStore, MemoryStorage};
use so_core::types::{ConversationId, Message, MessageDraft, Session};

/// Spawner that queues work on `pool`; timers complete immediately.
pub fn pool_spawner(pool: &LocalPool) -> Spawner {
    let handle = pool.spawner();
    Spawner::new(
        move |task| {
            handle.spawn_local(task).expect("pool accepts tasks");
        },
        |_| Box::pin(futures::future::ready(())),
    )
}

pub struct Harness {
    pub pool: LocalPool,
    pub kv: Rc<dyn KeyValueStore>,
    pub ctx: AppContext,
    pub ui: UiController<&'static str>,
}

impl Harness {
    pub fn demo() -> Self {
        Self::with_storage(Rc::new(MemoryStorage::new()))
    }

    /// A fresh app over existing storage, as after a page reload.
    pub fn with_storage(kv: Rc<dyn KeyValueStore>) -> Self {
        let backend = Backend::demo(Rc::clone(&kv));
        Self::with_backend(kv, backend)
    }

    pub fn with_backend(kv: Rc<dyn KeyValueStore>, backend: Backend) -> Self {
        let pool = LocalPool::new();
        let spawner = pool_spawner(&pool);
        let ctx = AppContext::new(Config::default(), backend, Rc::clone(&kv), spawner);
        let ui = UiController::new(ctx.clone());
        Self { pool, kv, ctx, ui }
    }

    pub fn run<F: std::future::Future>(&mut self, fut: F) -> F::Output {
        self.pool.run_until(fut)
    }

    pub fn settle(&mut self) {
        self.pool.run_until_stalled();
    }
}

pub fn msg(id: &str, author: &str, body: &str, secs: i64) -> Message {
    Message {
        id: id.to_string(),
        author_id: author.to_string(),
        author_name: author.to_string(),
        body: body.to_string(),
        sent_at: Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap(),
    }
}

/// Message store whose snapshots are pushed by the test.
#[derive(Default)]
pub struct ManualStore {
    pub sinks: RefCell<Vec<(ConversationId, SnapshotSink, Rc<Cell<bool>>)>>,
    pub appended: RefCell<Vec<(ConversationId, MessageDraft)>>,
    pub fail_appends: Cell<bool>,
}

impl ManualStore {
    /// Push a snapshot through the `index`-th subscription ever made,
    /// whether or not it is still attached.
    pub fn deliver(&self, index: usize, messages: Vec<Message>) {
        let sink = Rc::clone(&self.sinks.borrow()[index].1);
        sink(Ok(messages));
    }

    pub fn fail(&self, index: usize, error: StreamError) {
        let sink = Rc::clone(&self.sinks.borrow()[index].1);
        sink(Err(error));
    }

    pub fn active(&self) -> Vec<ConversationId> {
        self.sinks
            .borrow()
            .iter()
            .filter(|(_, _, active)| active.get())
            .map(|(c, _, _)| c.clone())
            .collect()
    }
}

#[async_trait(?Send)]
impl MessageStore for ManualStore {
    fn name(&self) -> &'static str {
        "manual"
    }

    async fn append(&self, conversation: &ConversationId, draft: MessageDraft) -> Result<(), StreamError> {
        if self.fail_appends.get() {
            return Err(StreamError::Write("offline".into()));
        }
        self.appended.borrow_mut().push((conversation.clone(), draft));
        Ok(())
    }

    fn subscribe(
        &self,
        conversation: &ConversationId,
        _max: usize,
        sink: SnapshotSink,
    ) -> Result<Box<dyn StreamSubscription>, StreamError> {
        let active = Rc::new(Cell::new(true));
        self.sinks
            .borrow_mut()
            .push((conversation.clone(), sink, Rc::clone(&active)));
        Ok(Box::new(DetachHandle::new(active, || {})))
    }
}

/// Demo identity that records which provider calls were made.
#[derive(Default)]
pub struct CountingIdentity {
    inner: DemoIdentity,
    pub calls: RefCell<Vec<&'static str>>,
}

#[async_trait(?Send)]
impl IdentityProvider for CountingIdentity {
    fn name(&self) -> &'static str {
        "counting"
    }

    async fn sign_in_with_provider(&self) -> Result<Session, AuthError> {
        self.calls.borrow_mut().push("provider");
        self.inner.sign_in_with_provider().await
    }

    async fn sign_in_with_credentials(&self, identifier: &str, secret: &str) -> Result<Session, AuthError> {
        self.calls.borrow_mut().push("credentials");
        self.inner.sign_in_with_credentials(identifier, secret).await
    }

    async fn register(&self, name: &str, identifier: &str, secret: &str) -> Result<Session, AuthError> {
        self.calls.borrow_mut().push("register");
        self.inner.register(name, identifier, secret).await
    }

    async fn send_password_reset(&self, identifier: &str) -> Result<(), AuthError> {
        self.calls.borrow_mut().push("reset");
        self.inner.send_password_reset(identifier).await
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        self.calls.borrow_mut().push("sign_out");
        self.inner.sign_out().await
    }

    async fn id_token(&self, force_refresh: bool) -> Result<String, AuthError> {
        self.inner.id_token(force_refresh).await
    }
}
