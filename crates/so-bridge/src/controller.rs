//! Navigation, auth modal and chat panel behaviour, independent of how the
//! host draws them.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use serde::{Deserialize, Serialize};

use so_core::error::{AppError, ValidationError};
use so_core::profile::ProfileDraft;
use so_core::profile_store::StoredUser;
use so_core::types::{ConversationId, Profile, Session};

use crate::context::AppContext;
use crate::modal::{AuthTab, KeyAction, ModalController, ModalState, Redirect, SubmitOutcome};
use crate::nav::NavState;
use crate::protocol::{BusEvent, Topic};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatPanelState {
    #[default]
    Closed,
    Open,
    Minimized,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatOpenOutcome {
    /// No session; the sign-in modal was opened instead.
    SignInRequired,
    Opened(ConversationId),
}

/// Everything a host needs to redraw the chrome.
#[derive(Debug, Clone, PartialEq)]
pub struct UiSnapshot {
    pub nav: NavState,
    pub modal: ModalState,
    pub modal_error: Option<String>,
    pub modal_notice: Option<String>,
    pub chat: ChatPanelState,
    pub conversation: Option<ConversationId>,
}

type UiListener = Rc<dyn Fn(&UiSnapshot)>;

struct UiInner<F> {
    ctx: AppContext,
    modal: RefCell<ModalController<F>>,
    chat: Cell<ChatPanelState>,
    listeners: RefCell<Vec<UiListener>>,
}

/// Drives navigation state, the auth modal and the chat panel.
///
/// `F` is the host's focus target (a DOM element in the browser).
pub struct UiController<F> {
    inner: Rc<UiInner<F>>,
}

impl<F> Clone for UiController<F> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<F: Clone + PartialEq + 'static> UiController<F> {
    pub fn new(ctx: AppContext) -> Self {
        let controller = Self {
            inner: Rc::new(UiInner {
                ctx,
                modal: RefCell::new(ModalController::new()),
                chat: Cell::new(ChatPanelState::Closed),
                listeners: RefCell::new(Vec::new()),
            }),
        };

        let weak = Rc::downgrade(&controller.inner);
        controller.inner.ctx.bus.subscribe(Topic::AuthChanged, move |_| {
            if let Some(ui) = upgrade(&weak) {
                ui.notify();
            }
            Ok(())
        });
        let weak = Rc::downgrade(&controller.inner);
        controller.inner.ctx.bus.subscribe(Topic::LoggedOut, move |_| {
            if let Some(ui) = upgrade(&weak) {
                ui.inner.chat.set(ChatPanelState::Closed);
                ui.notify();
            }
            Ok(())
        });
        let weak = Rc::downgrade(&controller.inner);
        controller.inner.ctx.bus.subscribe(Topic::ChatOpen, move |_| {
            if let Some(ui) = upgrade(&weak) {
                ui.notify();
            }
            Ok(())
        });

        controller
    }

    pub fn context(&self) -> &AppContext {
        &self.inner.ctx
    }

    pub fn record(&self) -> StoredUser {
        self.inner.ctx.store.load().unwrap_or_else(|e| {
            tracing::warn!(error = %e, "could not read stored user");
            StoredUser::default()
        })
    }

    pub fn nav(&self) -> NavState {
        NavState::from_record(&self.record())
    }

    pub fn snapshot(&self) -> UiSnapshot {
        let modal = self.inner.modal.borrow();
        UiSnapshot {
            nav: self.nav(),
            modal: modal.state(),
            modal_error: modal.error().map(str::to_string),
            modal_notice: modal.notice().map(str::to_string),
            chat: self.inner.chat.get(),
            conversation: self.inner.ctx.feed.conversation(),
        }
    }

    pub fn on_change(&self, listener: impl Fn(&UiSnapshot) + 'static) {
        self.inner.listeners.borrow_mut().push(Rc::new(listener));
    }

    // -- auth modal ---------------------------------------------------------

    pub fn open_modal(&self, tab: AuthTab, previously_focused: Option<F>) {
        self.inner.modal.borrow_mut().open(tab, previously_focused);
        self.notify();
    }

    pub fn switch_tab(&self, tab: AuthTab) {
        if self.inner.modal.borrow_mut().switch_tab(tab) {
            self.notify();
        }
    }

    /// Register the rendered form's focus targets; returns the initial one.
    pub fn modal_rendered(&self, focusables: Vec<F>) -> Option<F> {
        self.inner.modal.borrow_mut().set_focusables(focusables)
    }

    pub fn close_modal(&self) -> Option<F> {
        let restore = self.inner.modal.borrow_mut().close();
        self.notify();
        restore
    }

    pub fn handle_modal_key(&self, key: &str, shift: bool, active: Option<&F>) -> KeyAction<F> {
        let action = self.inner.modal.borrow_mut().handle_key(key, shift, active);
        if matches!(action, KeyAction::Close { .. }) {
            self.notify();
        }
        action
    }

    pub async fn sign_in(&self, identifier: &str, secret: &str) -> SubmitOutcome<F> {
        let result = self.try_sign_in(identifier.trim(), secret).await;
        self.finish_submit(result)
    }

    pub async fn sign_up(&self, name: &str, identifier: &str, secret: &str) -> SubmitOutcome<F> {
        let result = self.try_sign_up(name.trim(), identifier.trim(), secret).await;
        self.finish_submit(result)
    }

    pub async fn sign_in_with_google(&self) -> SubmitOutcome<F> {
        let result = self
            .inner
            .ctx
            .auth
            .sign_in_with_provider()
            .await
            .map(|s| self.redirect_after_sign_in(&s))
            .map_err(AppError::from);
        self.finish_submit(result)
    }

    /// Request a reset link; the outcome is shown inline in the modal.
    pub async fn forgot_password(&self, identifier: &str) -> Result<(), AppError> {
        let identifier = identifier.trim();
        let result = match require(identifier, "email") {
            Ok(()) => self
                .inner
                .ctx
                .auth
                .send_password_reset(identifier)
                .await
                .map_err(AppError::from),
            Err(e) => Err(AppError::from(e)),
        };
        {
            let mut modal = self.inner.modal.borrow_mut();
            match &result {
                Ok(()) => modal.show_notice("Reset link sent. Check your email."),
                Err(e) => modal.show_error(e.to_string()),
            }
        }
        self.notify();
        result
    }

    /// Ask the auth bridge to end the session.
    pub fn log_out(&self) {
        self.inner.ctx.bus.publish(BusEvent::Logout {});
    }

    // -- chat panel ---------------------------------------------------------

    pub fn chat_state(&self) -> ChatPanelState {
        self.inner.chat.get()
    }

    /// Open the chat on the current conversation, or the default one.
    ///
    /// Without a session the sign-in modal opens instead and nothing is
    /// published.
    pub fn open_chat(&self, previously_focused: Option<F>) -> ChatOpenOutcome {
        if self.require_session(previously_focused).is_none() {
            return ChatOpenOutcome::SignInRequired;
        }
        let conversation = self
            .inner
            .ctx
            .feed
            .conversation()
            .unwrap_or_else(|| self.inner.ctx.default_conversation());
        self.inner.chat.set(ChatPanelState::Open);
        self.inner.ctx.bus.publish(BusEvent::ChatOpen {
            conversation_id: conversation.clone(),
        });
        self.notify();
        ChatOpenOutcome::Opened(conversation)
    }

    /// Open a one-to-one conversation with `peer`.
    pub fn start_direct_chat(&self, peer: &str, previously_focused: Option<F>) -> ChatOpenOutcome {
        let Some(session) = self.require_session(previously_focused) else {
            return ChatOpenOutcome::SignInRequired;
        };
        let conversation = ConversationId::direct(&session.id, peer);
        self.inner.chat.set(ChatPanelState::Open);
        self.inner.ctx.bus.publish(BusEvent::ChatOpen {
            conversation_id: conversation.clone(),
        });
        self.inner.ctx.bus.publish(BusEvent::JoinConversation {
            conversation_id: conversation.clone(),
            peer: peer.to_string(),
        });
        self.notify();
        ChatOpenOutcome::Opened(conversation)
    }

    pub fn toggle_minimized(&self) {
        let next = match self.inner.chat.get() {
            ChatPanelState::Open => ChatPanelState::Minimized,
            ChatPanelState::Minimized => ChatPanelState::Open,
            ChatPanelState::Closed => return,
        };
        self.inner.chat.set(next);
        self.notify();
    }

    pub fn close_chat(&self) {
        if self.inner.chat.replace(ChatPanelState::Closed) != ChatPanelState::Closed {
            self.inner.ctx.feed.close();
            self.notify();
        }
    }

    /// Publish the composer text; blank input publishes nothing.
    pub fn submit_chat(&self, text: &str) -> bool {
        if text.trim().is_empty() {
            return false;
        }
        let conversation = self
            .inner
            .ctx
            .feed
            .conversation()
            .unwrap_or_else(|| self.inner.ctx.default_conversation());
        self.inner.ctx.bus.publish(BusEvent::SendMessage {
            conversation_id: conversation,
            text: text.to_string(),
        });
        true
    }

    // -- profile ------------------------------------------------------------

    /// Validate and store the profile section, then refresh the nav.
    pub fn save_profile(&self, draft: ProfileDraft) -> Result<Profile, AppError> {
        let profile = draft.into_profile()?;
        self.inner.ctx.store.save_profile(&profile)?;
        tracing::info!(name = %profile.name, "profile saved");
        self.inner.ctx.toasts.success("Profile saved");
        self.notify();
        Ok(profile)
    }

    // -- internals ----------------------------------------------------------

    async fn try_sign_in(&self, identifier: &str, secret: &str) -> Result<Redirect, AppError> {
        require(identifier, "email")?;
        require(secret, "password")?;
        let session = self
            .inner
            .ctx
            .auth
            .sign_in_with_credentials(identifier, secret)
            .await?;
        Ok(self.redirect_after_sign_in(&session))
    }

    async fn try_sign_up(&self, name: &str, identifier: &str, secret: &str) -> Result<Redirect, AppError> {
        require(name, "name")?;
        require(identifier, "email")?;
        require(secret, "password")?;
        self.inner.ctx.auth.register(name, identifier, secret).await?;
        Ok(Redirect::Profile)
    }

    /// Straight to chat when an avatar is already known, otherwise to the
    /// profile editor to finish setting up.
    fn redirect_after_sign_in(&self, session: &Session) -> Redirect {
        if session.has_avatar() || self.record().avatar().is_some() {
            Redirect::Chat
        } else {
            Redirect::Profile
        }
    }

    fn finish_submit(&self, result: Result<Redirect, AppError>) -> SubmitOutcome<F> {
        if let Err(e) = &result {
            tracing::debug!(kind = e.kind(), error = %e, "auth form rejected");
        }
        let outcome = self.inner.modal.borrow_mut().finish_submit(&result);
        self.notify();
        outcome
    }

    fn require_session(&self, previously_focused: Option<F>) -> Option<Session> {
        let session = self.inner.ctx.auth.current_session();
        if session.is_none() {
            tracing::debug!("chat requested without a session");
            self.open_modal(AuthTab::SignIn, previously_focused);
        }
        session
    }

    fn notify(&self) {
        let snapshot = self.snapshot();
        let listeners: Vec<UiListener> = self.inner.listeners.borrow().clone();
        for listener in listeners {
            listener(&snapshot);
        }
    }
}

fn upgrade<F>(weak: &Weak<UiInner<F>>) -> Option<UiController<F>> {
    weak.upgrade().map(|inner| UiController { inner })
}

fn require(value: &str, field: &'static str) -> Result<(), ValidationError> {
    if value.is_empty() {
        Err(ValidationError::EmptyField(field))
    } else {
        Ok(())
    }
}
