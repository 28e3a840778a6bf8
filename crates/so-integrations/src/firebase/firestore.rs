//! Cloud Firestore message store over the REST API.
//!
//! The REST surface has no push listener, so subscriptions are served by a
//! poll loop ([`FirestoreStore::watch_loop`]) that re-runs each watched
//! query and delivers a snapshot only when the id/timestamp list changed.

use std::cell::{Cell, RefCell};
use std::future::Future;
use std::pin::Pin;
use std::rc::{Rc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use uuid::Uuid;

use so_core::backend::{DetachHandle, IdentityProvider, MessageStore, SnapshotSink, StreamSubscription};
use so_core::config::FirebaseConfig;
use so_core::error::{AuthError, StreamError};
use so_core::types::{order_and_window, ConversationId, Message, MessageDraft};

use super::{check, trim_base, FirebaseError, Result};

/// Collection path holding the messages of `conversation`, relative to the
/// database's `documents` root.
///
/// This is a resource name, not a URL: the id is used verbatim. Only
/// request paths built from it are percent-encoded.
pub fn collection_path(conversation: &ConversationId) -> String {
    if conversation.is_global() {
        "messages".to_string()
    } else {
        format!("conversations/{}/messages", conversation.as_str())
    }
}

type Fingerprint = Vec<(String, DateTime<Utc>)>;

struct Watch {
    id: u64,
    conversation: ConversationId,
    max: usize,
    sink: SnapshotSink,
    active: Rc<Cell<bool>>,
    last_seen: Option<Fingerprint>,
    failing: bool,
}

struct FsInner {
    http: reqwest::Client,
    api_key: String,
    base: String,
    project_id: String,
    tokens: Rc<dyn IdentityProvider>,
    watches: RefCell<Vec<Watch>>,
    next_watch: Cell<u64>,
    wake_tx: flume::Sender<()>,
    wake_rx: flume::Receiver<()>,
    stopped: Cell<bool>,
}

/// Firestore-backed [`MessageStore`].
#[derive(Clone)]
pub struct FirestoreStore {
    inner: Rc<FsInner>,
}

impl FirestoreStore {
    /// `tokens` supplies the bearer token; requests go out unauthenticated
    /// while no one is signed in.
    pub fn new(
        config: &FirebaseConfig,
        api_key: impl Into<String>,
        tokens: Rc<dyn IdentityProvider>,
    ) -> Result<Self> {
        if config.project_id.trim().is_empty() {
            return Err(FirebaseError::MissingProject);
        }
        let (wake_tx, wake_rx) = flume::unbounded();
        Ok(Self {
            inner: Rc::new(FsInner {
                http: reqwest::Client::new(),
                api_key: api_key.into(),
                base: trim_base(&config.firestore_base_url),
                project_id: config.project_id.trim().to_string(),
                tokens,
                watches: RefCell::new(Vec::new()),
                next_watch: Cell::new(0),
                wake_tx,
                wake_rx,
                stopped: Cell::new(false),
            }),
        })
    }

    fn database(&self) -> String {
        format!("projects/{}/databases/(default)", self.inner.project_id)
    }

    fn documents_url(&self) -> String {
        format!("{}/v1/{}/documents", self.inner.base, self.database())
    }

    async fn post(&self, url: String, body: Value) -> Result<reqwest::Response> {
        let mut req = self
            .inner
            .http
            .post(url)
            .query(&[("key", self.inner.api_key.as_str())])
            .json(&body);
        match self.inner.tokens.id_token(false).await {
            Ok(token) => req = req.bearer_auth(token),
            Err(AuthError::NoSession) => {}
            Err(e) => tracing::debug!(error = %e, "no bearer token for firestore"),
        }
        check(req.send().await?).await
    }

    /// Insert one message document with a server-assigned `ts`.
    pub async fn commit(&self, conversation: &ConversationId, draft: &MessageDraft) -> Result<String> {
        let doc_id = Uuid::new_v4().simple().to_string();
        let name = format!(
            "{}/documents/{}/{}",
            self.database(),
            collection_path(conversation),
            doc_id
        );
        let body = json!({
            "writes": [{
                "update": {
                    "name": name,
                    "fields": {
                        "text": { "stringValue": draft.body },
                        "fromUid": { "stringValue": draft.author_id },
                        "displayName": { "stringValue": draft.author_name },
                    }
                },
                "updateTransforms": [{
                    "fieldPath": "ts",
                    "setToServerValue": "REQUEST_TIME"
                }]
            }]
        });
        self.post(format!("{}:commit", self.documents_url()), body)
            .await?;
        Ok(doc_id)
    }

    /// The newest `max` messages of `conversation`, oldest first.
    pub async fn query(&self, conversation: &ConversationId, max: usize) -> Result<Vec<Message>> {
        let parent = if conversation.is_global() {
            self.documents_url()
        } else {
            format!(
                "{}/conversations/{}",
                self.documents_url(),
                urlencoding::encode(conversation.as_str())
            )
        };
        let body = json!({
            "structuredQuery": {
                "from": [{ "collectionId": "messages" }],
                "orderBy": [{ "field": { "fieldPath": "ts" }, "direction": "DESCENDING" }],
                "limit": max,
            }
        });
        let rows: Vec<Value> = self
            .post(format!("{parent}:runQuery"), body)
            .await?
            .json()
            .await?;

        let mut messages = Vec::with_capacity(rows.len());
        for row in rows {
            if let Some(doc) = row.get("document") {
                messages.push(decode_message(doc)?);
            }
        }
        messages.reverse();
        Ok(order_and_window(messages, max))
    }

    /// Re-run every active watch once, delivering changed snapshots.
    ///
    /// Returns the number of snapshots (or errors) delivered.
    pub async fn poll_once(&self) -> usize {
        let targets: Vec<(u64, ConversationId, usize)> = self
            .inner
            .watches
            .borrow()
            .iter()
            .filter(|w| w.active.get())
            .map(|w| (w.id, w.conversation.clone(), w.max))
            .collect();

        let mut delivered = 0;
        for (id, conversation, max) in targets {
            let result = self.query(&conversation, max).await;
            let delivery = {
                let mut watches = self.inner.watches.borrow_mut();
                let Some(watch) = watches.iter_mut().find(|w| w.id == id) else {
                    continue;
                };
                match result {
                    Ok(messages) => {
                        let fingerprint: Fingerprint =
                            messages.iter().map(|m| (m.id.clone(), m.sent_at)).collect();
                        watch.failing = false;
                        if watch.last_seen.as_ref() == Some(&fingerprint) {
                            None
                        } else {
                            watch.last_seen = Some(fingerprint);
                            Some((Rc::clone(&watch.sink), Rc::clone(&watch.active), Ok(messages)))
                        }
                    }
                    Err(e) => {
                        tracing::warn!(conversation = %conversation, error = %e, "firestore poll failed");
                        if watch.failing {
                            None
                        } else {
                            watch.failing = true;
                            Some((
                                Rc::clone(&watch.sink),
                                Rc::clone(&watch.active),
                                Err(e.into_subscribe()),
                            ))
                        }
                    }
                }
            };
            if let Some((sink, active, result)) = delivery {
                if active.get() {
                    sink(result);
                    delivered += 1;
                }
            }
        }
        delivered
    }

    /// Poll forever at `interval`, waking early on new subscriptions and
    /// local writes, until [`stop`](Self::stop) is called.
    pub fn watch_loop<S>(&self, interval: Duration, sleep: S) -> impl Future<Output = ()> + 'static
    where
        S: Fn(Duration) -> Pin<Box<dyn Future<Output = ()>>> + 'static,
    {
        let store = self.clone();
        async move {
            let wake = store.inner.wake_rx.clone();
            while !store.inner.stopped.get() {
                store.poll_once().await;
                let woke = Box::pin(wake.recv_async());
                futures::future::select(sleep(interval), woke).await;
                while wake.try_recv().is_ok() {}
            }
            tracing::debug!("firestore poll loop stopped");
        }
    }

    pub fn stop(&self) {
        self.inner.stopped.set(true);
        self.wake();
    }

    pub fn watch_count(&self) -> usize {
        self.inner.watches.borrow().len()
    }

    fn wake(&self) {
        let _ = self.inner.wake_tx.send(());
    }
}

fn remove_watch(inner: &Weak<FsInner>, id: u64) {
    if let Some(inner) = inner.upgrade() {
        inner.watches.borrow_mut().retain(|w| w.id != id);
    }
}

fn string_field<'a>(fields: &'a Value, name: &str) -> Option<&'a str> {
    fields.get(name)?.get("stringValue")?.as_str()
}

fn timestamp(value: Option<&Value>) -> Option<DateTime<Utc>> {
    let raw = value?.as_str()?;
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

/// Turn one Firestore document into a [`Message`].
fn decode_message(doc: &Value) -> Result<Message> {
    let name = doc
        .get("name")
        .and_then(Value::as_str)
        .ok_or_else(|| FirebaseError::Decode("document without name".to_string()))?;
    let id = name.rsplit('/').next().unwrap_or(name).to_string();
    let fields = doc.get("fields").cloned().unwrap_or_else(|| json!({}));

    let sent_at = timestamp(fields.get("ts").and_then(|ts| ts.get("timestampValue")))
        .or_else(|| timestamp(doc.get("createTime")))
        .ok_or_else(|| FirebaseError::Decode(format!("document {id} has no timestamp")))?;

    Ok(Message {
        author_id: string_field(&fields, "fromUid").unwrap_or_default().to_string(),
        author_name: string_field(&fields, "displayName").unwrap_or_default().to_string(),
        body: string_field(&fields, "text").unwrap_or_default().to_string(),
        id,
        sent_at,
    })
}

#[async_trait(?Send)]
impl MessageStore for FirestoreStore {
    fn name(&self) -> &'static str {
        "firestore"
    }

    async fn append(
        &self,
        conversation: &ConversationId,
        draft: MessageDraft,
    ) -> std::result::Result<(), StreamError> {
        let doc_id = self
            .commit(conversation, &draft)
            .await
            .map_err(FirebaseError::into_write)?;
        tracing::debug!(conversation = %conversation, doc = %doc_id, "message committed");
        self.wake();
        Ok(())
    }

    fn subscribe(
        &self,
        conversation: &ConversationId,
        max: usize,
        sink: SnapshotSink,
    ) -> std::result::Result<Box<dyn StreamSubscription>, StreamError> {
        if self.inner.stopped.get() {
            return Err(StreamError::Subscribe("poller stopped".to_string()));
        }
        let id = self.inner.next_watch.get();
        self.inner.next_watch.set(id + 1);
        let active = Rc::new(Cell::new(true));
        self.inner.watches.borrow_mut().push(Watch {
            id,
            conversation: conversation.clone(),
            max,
            sink,
            active: Rc::clone(&active),
            last_seen: None,
            failing: false,
        });
        self.wake();

        let weak = Rc::downgrade(&self.inner);
        Ok(Box::new(DetachHandle::new(active, move || {
            remove_watch(&weak, id)
        })))
    }
}

impl std::fmt::Debug for FirestoreStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FirestoreStore")
            .field("project_id", &self.inner.project_id)
            .field("watches", &self.inner.watches.borrow().len())
            .finish_non_exhaustive()
    }
}
