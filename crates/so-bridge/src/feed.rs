use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::{Rc, Weak};

use chrono::Utc;
use uuid::Uuid;

use so_core::backend::{MessageStore, SnapshotSink, StreamSubscription};
use so_core::config::ChatConfig;
use so_core::error::{AppError, StreamError};
use so_core::types::{order_and_window, truncate_chars, ConversationId, Message, MessageDraft};

use crate::auth::AuthBridge;
use crate::event_bus::{EventBus, SubscriptionToken};
use crate::notifications::ToastQueue;
use crate::protocol::{BusEvent, Topic};
use crate::spawner::Spawner;

/// One rendered line of the feed.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedEntry {
    pub message: Message,
    /// Authored by the current session.
    pub from_self: bool,
    /// Shown locally but not yet confirmed by a snapshot.
    pub pending: bool,
}

/// Everything the chat view needs to draw itself.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeedView {
    pub conversation: Option<ConversationId>,
    pub entries: Vec<FeedEntry>,
}

impl FeedView {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// Blank input; nothing was sent.
    Ignored,
    Sent,
}

type RenderListener = Rc<dyn Fn(&FeedView)>;

/// An optimistic line awaiting its confirmed copy.
struct PendingSend {
    message: Message,
    /// Confirmed messages with the same author and body at the time of
    /// sending; these can never confirm this entry.
    earlier: HashSet<String>,
}

impl PendingSend {
    fn matches(&self, m: &Message) -> bool {
        m.author_id == self.message.author_id
            && m.body == self.message.body
            && !self.earlier.contains(&m.id)
    }
}

#[derive(Default)]
struct FeedState {
    conversation: Option<ConversationId>,
    generation: u64,
    subscription: Option<Box<dyn StreamSubscription>>,
    confirmed: Vec<Message>,
    pending: Vec<PendingSend>,
}

struct FeedInner {
    store: Rc<dyn MessageStore>,
    auth: AuthBridge,
    toasts: ToastQueue,
    settings: ChatConfig,
    state: RefCell<FeedState>,
    renderers: RefCell<Vec<RenderListener>>,
}

/// Live view of one conversation.
///
/// At most one store subscription is active. Every snapshot replaces the
/// confirmed list wholesale; snapshots from a conversation that has since
/// been replaced are discarded via a generation counter.
#[derive(Clone)]
pub struct LiveMessageFeed {
    inner: Rc<FeedInner>,
}

impl LiveMessageFeed {
    pub fn new(
        store: Rc<dyn MessageStore>,
        auth: AuthBridge,
        toasts: ToastQueue,
        settings: ChatConfig,
    ) -> Self {
        Self {
            inner: Rc::new(FeedInner {
                store,
                auth,
                toasts,
                settings,
                state: RefCell::new(FeedState::default()),
                renderers: RefCell::new(Vec::new()),
            }),
        }
    }

    pub fn conversation(&self) -> Option<ConversationId> {
        self.inner.state.borrow().conversation.clone()
    }

    pub fn is_subscribed(&self) -> bool {
        self.inner
            .state
            .borrow()
            .subscription
            .as_ref()
            .is_some_and(|s| s.is_active())
    }

    /// Switch the feed to `conversation`, detaching any previous stream.
    pub fn open_conversation(&self, conversation: ConversationId) -> Result<(), StreamError> {
        let (previous, generation) = {
            let mut state = self.inner.state.borrow_mut();
            let previous = state.subscription.take();
            state.generation += 1;
            state.conversation = Some(conversation.clone());
            state.confirmed.clear();
            state.pending.clear();
            (previous, state.generation)
        };
        if let Some(mut previous) = previous {
            previous.detach();
        }
        tracing::info!(conversation = %conversation, generation, "opening conversation");
        self.render();

        let weak = Rc::downgrade(&self.inner);
        let sink: SnapshotSink = Rc::new(move |result| {
            if let Some(inner) = weak.upgrade() {
                LiveMessageFeed { inner }.on_snapshot(generation, result);
            }
        });

        match self
            .inner
            .store
            .subscribe(&conversation, self.inner.settings.max_messages, sink)
        {
            Ok(mut subscription) => {
                let mut state = self.inner.state.borrow_mut();
                if state.generation == generation {
                    state.subscription = Some(subscription);
                } else {
                    drop(state);
                    subscription.detach();
                }
                Ok(())
            }
            Err(e) => {
                tracing::warn!(conversation = %conversation, error = %e, "subscribe failed");
                self.inner.toasts.warning("Could not load messages");
                Err(e)
            }
        }
    }

    /// Detach and forget the current conversation.
    pub fn close(&self) {
        let previous = {
            let mut state = self.inner.state.borrow_mut();
            state.generation += 1;
            state.conversation = None;
            state.confirmed.clear();
            state.pending.clear();
            state.subscription.take()
        };
        if let Some(mut previous) = previous {
            previous.detach();
            tracing::debug!("feed closed");
        }
        self.render();
    }

    /// Send to the current conversation, or the default one if none is open.
    pub async fn send_message(&self, text: &str) -> Result<SendOutcome, AppError> {
        let conversation = self
            .conversation()
            .unwrap_or_else(|| ConversationId::new(self.inner.settings.default_conversation.clone()));
        self.send_message_to(&conversation, text).await
    }

    pub async fn send_message_to(
        &self,
        conversation: &ConversationId,
        text: &str,
    ) -> Result<SendOutcome, AppError> {
        let body = text.trim();
        if body.is_empty() {
            return Ok(SendOutcome::Ignored);
        }
        let Some(session) = self.inner.auth.current_session() else {
            self.inner.toasts.warning("Please sign in to chat");
            return Err(AppError::NotAuthenticated);
        };

        let max = self.inner.settings.max_body_chars;
        let truncated = truncate_chars(body, max);
        if truncated.len() < body.len() {
            tracing::debug!(max, "message body truncated");
        }
        let draft = MessageDraft {
            author_id: session.id.clone(),
            author_name: session.label(),
            body: truncated.to_string(),
        };

        let pending_id = (self.inner.settings.optimistic_append
            && self.conversation().as_ref() == Some(conversation))
        .then(|| self.push_pending(&draft));

        match self.inner.store.append(conversation, draft).await {
            Ok(()) => Ok(SendOutcome::Sent),
            Err(e) => {
                tracing::warn!(conversation = %conversation, error = %e, "send failed");
                if let Some(id) = pending_id {
                    self.inner.state.borrow_mut().pending.retain(|p| p.message.id != id);
                    self.render();
                }
                self.inner.toasts.warning("Message not sent");
                Err(e.into())
            }
        }
    }

    /// Show an externally supplied line until the next snapshot confirms it.
    pub fn append_external(&self, from_id: &str, text: &str) {
        let text = text.trim();
        if text.is_empty() {
            return;
        }
        self.push_pending(&MessageDraft {
            author_id: from_id.to_string(),
            author_name: from_id.to_string(),
            body: truncate_chars(text, self.inner.settings.max_body_chars).to_string(),
        });
    }

    pub fn view(&self) -> FeedView {
        let session_id = self.inner.auth.current_session().map(|s| s.id);
        let is_self = |m: &Message| session_id.as_deref() == Some(m.author_id.as_str());
        let state = self.inner.state.borrow();
        let confirmed = state.confirmed.iter().map(|m| FeedEntry {
            message: m.clone(),
            from_self: is_self(m),
            pending: false,
        });
        let pending = state.pending.iter().map(|p| FeedEntry {
            message: p.message.clone(),
            from_self: is_self(&p.message),
            pending: true,
        });
        FeedView {
            conversation: state.conversation.clone(),
            entries: confirmed.chain(pending).collect(),
        }
    }

    pub fn on_render(&self, listener: impl Fn(&FeedView) + 'static) {
        self.inner.renderers.borrow_mut().push(Rc::new(listener));
    }

    /// Wire the feed to the chat topics of `bus`.
    pub fn attach(&self, bus: &EventBus, spawner: &Spawner) -> Vec<SubscriptionToken> {
        let mut tokens = Vec::new();

        let weak = Rc::downgrade(&self.inner);
        let spawner = spawner.clone();
        tokens.push(bus.subscribe(Topic::SendMessage, move |event| {
            let (BusEvent::SendMessage { conversation_id, text }, Some(feed)) = (event, upgrade(&weak)) else {
                return Ok(());
            };
            let conversation = conversation_id.clone();
            let text = text.clone();
            spawner.spawn(async move {
                // failures are already logged and toasted
                let _ = feed.send_message_to(&conversation, &text).await;
            });
            Ok(())
        }));

        let weak = Rc::downgrade(&self.inner);
        tokens.push(bus.subscribe(Topic::ChatOpen, move |event| {
            if let (BusEvent::ChatOpen { conversation_id }, Some(feed)) = (event, upgrade(&weak)) {
                feed.open_conversation(conversation_id.clone())?;
            }
            Ok(())
        }));

        let weak = Rc::downgrade(&self.inner);
        tokens.push(bus.subscribe(Topic::JoinConversation, move |event| {
            if let (BusEvent::JoinConversation { conversation_id, .. }, Some(feed)) = (event, upgrade(&weak)) {
                let already_open = feed.conversation().as_ref() == Some(conversation_id) && feed.is_subscribed();
                if !already_open {
                    feed.open_conversation(conversation_id.clone())?;
                }
            }
            Ok(())
        }));

        let weak = Rc::downgrade(&self.inner);
        tokens.push(bus.subscribe(Topic::AppendMessage, move |event| {
            if let (BusEvent::AppendMessage { from_id, text }, Some(feed)) = (event, upgrade(&weak)) {
                feed.append_external(from_id, text);
            }
            Ok(())
        }));

        let weak = Rc::downgrade(&self.inner);
        tokens.push(bus.subscribe(Topic::AuthChanged, move |_| {
            if let Some(feed) = upgrade(&weak) {
                feed.render();
            }
            Ok(())
        }));

        let weak = Rc::downgrade(&self.inner);
        tokens.push(bus.subscribe(Topic::LoggedOut, move |_| {
            if let Some(feed) = upgrade(&weak) {
                feed.close();
            }
            Ok(())
        }));

        tokens
    }

    fn push_pending(&self, draft: &MessageDraft) -> String {
        let id = format!("pending-{}", Uuid::new_v4());
        {
            let mut state = self.inner.state.borrow_mut();
            let earlier = state
                .confirmed
                .iter()
                .filter(|m| m.author_id == draft.author_id && m.body == draft.body)
                .map(|m| m.id.clone())
                .collect();
            state.pending.push(PendingSend {
                message: Message {
                    id: id.clone(),
                    author_id: draft.author_id.clone(),
                    author_name: draft.author_name.clone(),
                    body: draft.body.clone(),
                    sent_at: Utc::now(),
                },
                earlier,
            });
        }
        self.render();
        id
    }

    fn on_snapshot(&self, generation: u64, result: Result<Vec<Message>, StreamError>) {
        let messages = match result {
            Ok(messages) => messages,
            Err(e) => {
                if self.inner.state.borrow().generation == generation {
                    tracing::warn!(error = %e, "stream error");
                    self.inner.toasts.warning("Could not load messages");
                }
                return;
            }
        };

        let newest = {
            let mut state = self.inner.state.borrow_mut();
            if state.generation != generation {
                tracing::debug!(generation, current = state.generation, "discarding stale snapshot");
                return;
            }
            let ordered = order_and_window(messages, self.inner.settings.max_messages);
            // Each confirmed message settles at most one pending entry.
            let mut claimed: HashSet<&str> = HashSet::new();
            state.pending.retain(|p| {
                match ordered
                    .iter()
                    .find(|m| p.matches(m) && !claimed.contains(m.id.as_str()))
                {
                    Some(m) => {
                        claimed.insert(m.id.as_str());
                        false
                    }
                    None => true,
                }
            });
            state.confirmed = ordered;
            state.confirmed.last().cloned()
        };

        if let Some(newest) = newest {
            let session_id = self.inner.auth.current_session().map(|s| s.id);
            if session_id.as_deref() != Some(newest.author_id.as_str()) {
                let author = if newest.author_name.trim().is_empty() {
                    "New message"
                } else {
                    newest.author_name.as_str()
                };
                self.inner.toasts.info(format!(
                    "{author}: {}",
                    newest.preview(self.inner.settings.preview_chars)
                ));
            }
        }

        self.render();
    }

    fn render(&self) {
        let view = self.view();
        let renderers: Vec<RenderListener> = self.inner.renderers.borrow().clone();
        for render in renderers {
            render(&view);
        }
    }
}

fn upgrade(weak: &Weak<FeedInner>) -> Option<LiveMessageFeed> {
    weak.upgrade().map(|inner| LiveMessageFeed { inner })
}

impl std::fmt::Debug for LiveMessageFeed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.borrow();
        f.debug_struct("LiveMessageFeed")
            .field("conversation", &state.conversation)
            .field("generation", &state.generation)
            .field("confirmed", &state.confirmed.len())
            .field("pending", &state.pending.len())
            .finish()
    }
}
