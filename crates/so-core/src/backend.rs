//! Boundaries to the external collaborators: the identity provider and the
//! real-time message store.
//!
//! Both are consumed as opaque async calls. Futures are not `Send`: the
//! front end runs on a single cooperative thread (the browser UI thread, or a
//! `LocalSet` natively).

use std::cell::Cell;
use std::rc::Rc;

use async_trait::async_trait;

use crate::error::{AuthError, StreamError};
use crate::types::{ConversationId, Message, MessageDraft, Session};

// ---------------------------------------------------------------------------
// Identity provider
// ---------------------------------------------------------------------------

#[async_trait(?Send)]
pub trait IdentityProvider {
    /// Short backend name for logs.
    fn name(&self) -> &'static str;

    /// Interactive provider sign-in (Google).
    async fn sign_in_with_provider(&self) -> Result<Session, AuthError>;

    async fn sign_in_with_credentials(
        &self,
        identifier: &str,
        secret: &str,
    ) -> Result<Session, AuthError>;

    async fn register(&self, name: &str, identifier: &str, secret: &str)
        -> Result<Session, AuthError>;

    async fn send_password_reset(&self, identifier: &str) -> Result<(), AuthError>;

    async fn sign_out(&self) -> Result<(), AuthError>;

    /// Bearer token for the current session.
    async fn id_token(&self, force_refresh: bool) -> Result<String, AuthError>;
}

// ---------------------------------------------------------------------------
// Message store
// ---------------------------------------------------------------------------

/// Receives the full ordered snapshot of a conversation on every change, or
/// the error that prevented reading it.
pub type SnapshotSink = Rc<dyn Fn(Result<Vec<Message>, StreamError>)>;

/// A live subscription to one conversation.
///
/// Detaching is idempotent; dropping the handle detaches it.
pub trait StreamSubscription {
    fn detach(&mut self);
    fn is_active(&self) -> bool;
}

#[async_trait(?Send)]
pub trait MessageStore {
    fn name(&self) -> &'static str;

    /// Submit a message; the store assigns id and ordering timestamp.
    async fn append(
        &self,
        conversation: &ConversationId,
        draft: MessageDraft,
    ) -> Result<(), StreamError>;

    /// Start delivering snapshots of the newest `max` messages of
    /// `conversation` to `sink` until the returned handle is detached.
    fn subscribe(
        &self,
        conversation: &ConversationId,
        max: usize,
        sink: SnapshotSink,
    ) -> Result<Box<dyn StreamSubscription>, StreamError>;
}

/// Generic [`StreamSubscription`] backed by a shared active flag.
///
/// Stores keep a clone of the flag next to the sink and skip delivery once
/// it is cleared; `on_detach` lets them release their own bookkeeping.
pub struct DetachHandle {
    active: Rc<Cell<bool>>,
    on_detach: Option<Box<dyn FnOnce()>>,
}

impl DetachHandle {
    pub fn new(active: Rc<Cell<bool>>, on_detach: impl FnOnce() + 'static) -> Self {
        Self {
            active,
            on_detach: Some(Box::new(on_detach)),
        }
    }
}

impl StreamSubscription for DetachHandle {
    fn detach(&mut self) {
        if self.active.replace(false) {
            if let Some(f) = self.on_detach.take() {
                f();
            }
        }
    }

    fn is_active(&self) -> bool {
        self.active.get()
    }
}

impl Drop for DetachHandle {
    fn drop(&mut self) {
        self.detach();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detach_runs_cleanup_once() {
        let active = Rc::new(Cell::new(true));
        let calls = Rc::new(Cell::new(0));
        let calls2 = Rc::clone(&calls);
        let mut handle = DetachHandle::new(Rc::clone(&active), move || calls2.set(calls2.get() + 1));

        assert!(handle.is_active());
        handle.detach();
        handle.detach();
        drop(handle);

        assert!(!active.get());
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn drop_detaches() {
        let active = Rc::new(Cell::new(true));
        drop(DetachHandle::new(Rc::clone(&active), || {}));
        assert!(!active.get());
    }
}
