//! Authentication modal state machine and its focus trap.
//!
//! Both are generic over the focus target `T` so the browser can plug in DOM
//! elements and tests can use plain strings.

use serde::{Deserialize, Serialize};

use so_core::error::AppError;

/// Which form the modal shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthTab {
    SignIn,
    SignUp,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModalState {
    #[default]
    Closed,
    SignIn,
    SignUp,
}

impl ModalState {
    pub fn is_open(self) -> bool {
        self != ModalState::Closed
    }

    pub fn tab(self) -> Option<AuthTab> {
        match self {
            ModalState::Closed => None,
            ModalState::SignIn => Some(AuthTab::SignIn),
            ModalState::SignUp => Some(AuthTab::SignUp),
        }
    }
}

impl From<AuthTab> for ModalState {
    fn from(tab: AuthTab) -> Self {
        match tab {
            AuthTab::SignIn => ModalState::SignIn,
            AuthTab::SignUp => ModalState::SignUp,
        }
    }
}

/// Where to go after a successful submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Redirect {
    Chat,
    Profile,
}

/// Cycles keyboard focus within an ordered list of focusable targets.
#[derive(Debug, Clone, PartialEq)]
pub struct FocusTrap<T> {
    focusables: Vec<T>,
}

impl<T: Clone + PartialEq> FocusTrap<T> {
    pub fn new(focusables: Vec<T>) -> Self {
        Self { focusables }
    }

    pub fn first(&self) -> Option<&T> {
        self.focusables.first()
    }

    pub fn is_empty(&self) -> bool {
        self.focusables.is_empty()
    }

    /// Target for Tab (or Shift+Tab when `backwards`) from `active`.
    ///
    /// Tab on the last target wraps to the first, Shift+Tab on the first
    /// wraps to the last. Focus outside the trap enters at the first target
    /// (the last one when going backwards).
    pub fn next(&self, active: Option<&T>, backwards: bool) -> Option<T> {
        let len = self.focusables.len();
        if len == 0 {
            return None;
        }
        let current = active.and_then(|a| self.focusables.iter().position(|f| f == a));
        let index = match (current, backwards) {
            (None, false) => 0,
            (None, true) => len - 1,
            (Some(0), true) => len - 1,
            (Some(i), true) => i - 1,
            (Some(i), false) if i + 1 >= len => 0,
            (Some(i), false) => i + 1,
        };
        self.focusables.get(index).cloned()
    }
}

impl<T> Default for FocusTrap<T> {
    fn default() -> Self {
        Self {
            focusables: Vec::new(),
        }
    }
}

/// What the host should do with a keypress inside the modal.
#[derive(Debug, Clone, PartialEq)]
pub enum KeyAction<T> {
    /// Move focus to the target and suppress the default.
    Focus(T),
    /// The modal closed; return focus to the target if any.
    Close { restore: Option<T> },
    Ignore,
}

/// Result of applying a submission to the modal.
#[derive(Debug, Clone, PartialEq)]
pub enum SubmitOutcome<T> {
    /// The modal stays open showing the inline error.
    Failed,
    Succeeded {
        redirect: Redirect,
        restore: Option<T>,
    },
}

/// The authentication modal.
#[derive(Debug, Clone)]
pub struct ModalController<T> {
    state: ModalState,
    restore: Option<T>,
    trap: FocusTrap<T>,
    error: Option<String>,
    notice: Option<String>,
}

impl<T> Default for ModalController<T> {
    fn default() -> Self {
        Self {
            state: ModalState::Closed,
            restore: None,
            trap: FocusTrap::default(),
            error: None,
            notice: None,
        }
    }
}

impl<T: Clone + PartialEq> ModalController<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> ModalState {
        self.state
    }

    pub fn is_open(&self) -> bool {
        self.state.is_open()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn notice(&self) -> Option<&str> {
        self.notice.as_deref()
    }

    /// Open on `tab`, remembering `previously_focused` for [`close`](Self::close).
    ///
    /// Re-opening while open only switches tabs and keeps the original
    /// restore target.
    pub fn open(&mut self, tab: AuthTab, previously_focused: Option<T>) {
        if !self.is_open() {
            self.restore = previously_focused;
        }
        self.state = tab.into();
        self.trap = FocusTrap::default();
        self.error = None;
        self.notice = None;
    }

    /// Show the other form; ignored while closed.
    pub fn switch_tab(&mut self, tab: AuthTab) -> bool {
        if !self.is_open() {
            return false;
        }
        self.state = tab.into();
        self.trap = FocusTrap::default();
        self.error = None;
        self.notice = None;
        true
    }

    /// Install the focus targets of the rendered form; returns the one that
    /// should receive initial focus.
    pub fn set_focusables(&mut self, focusables: Vec<T>) -> Option<T> {
        if !self.is_open() {
            return None;
        }
        self.trap = FocusTrap::new(focusables);
        self.trap.first().cloned()
    }

    /// Close and hand back the target to restore focus to.
    pub fn close(&mut self) -> Option<T> {
        if !self.is_open() {
            return None;
        }
        self.state = ModalState::Closed;
        self.trap = FocusTrap::default();
        self.error = None;
        self.notice = None;
        self.restore.take()
    }

    pub fn handle_key(&mut self, key: &str, shift: bool, active: Option<&T>) -> KeyAction<T> {
        if !self.is_open() {
            return KeyAction::Ignore;
        }
        match key {
            "Escape" => KeyAction::Close {
                restore: self.close(),
            },
            "Tab" => self
                .trap
                .next(active, shift)
                .map_or(KeyAction::Ignore, KeyAction::Focus),
            _ => KeyAction::Ignore,
        }
    }

    pub fn show_error(&mut self, message: impl Into<String>) {
        self.notice = None;
        self.error = Some(message.into());
    }

    pub fn show_notice(&mut self, message: impl Into<String>) {
        self.error = None;
        self.notice = Some(message.into());
    }

    /// Close on success, show the inline error on failure.
    pub fn finish_submit(&mut self, result: &Result<Redirect, AppError>) -> SubmitOutcome<T> {
        match result {
            Ok(redirect) => SubmitOutcome::Succeeded {
                redirect: *redirect,
                restore: self.close(),
            },
            Err(e) => {
                self.show_error(e.to_string());
                SubmitOutcome::Failed
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use so_core::error::{AuthError, ValidationError};

    fn targets() -> Vec<&'static str> {
        vec!["email", "password", "submit"]
    }

    #[test]
    fn tab_wraps_last_to_first() {
        let trap = FocusTrap::new(targets());
        assert_eq!(trap.next(Some(&"submit"), false), Some("email"));
        assert_eq!(trap.next(Some(&"email"), false), Some("password"));
    }

    #[test]
    fn shift_tab_wraps_first_to_last() {
        let trap = FocusTrap::new(targets());
        assert_eq!(trap.next(Some(&"email"), true), Some("submit"));
        assert_eq!(trap.next(Some(&"submit"), true), Some("password"));
    }

    #[test]
    fn focus_outside_enters_at_edges() {
        let trap = FocusTrap::new(targets());
        assert_eq!(trap.next(Some(&"elsewhere"), false), Some("email"));
        assert_eq!(trap.next(None, true), Some("submit"));
        assert_eq!(FocusTrap::<&str>::default().next(None, false), None);
    }

    #[test]
    fn open_focuses_first_and_close_restores() {
        let mut modal = ModalController::new();
        modal.open(AuthTab::SignIn, Some("nav-login"));
        assert_eq!(modal.set_focusables(targets()), Some("email"));
        assert_eq!(modal.state(), ModalState::SignIn);

        assert_eq!(modal.close(), Some("nav-login"));
        assert_eq!(modal.state(), ModalState::Closed);
        assert_eq!(modal.close(), None);
        assert_eq!(modal.set_focusables(targets()), None);
    }

    #[test]
    fn reopen_keeps_original_restore_target() {
        let mut modal = ModalController::new();
        modal.open(AuthTab::SignIn, Some("nav-login"));
        modal.open(AuthTab::SignUp, Some("email"));
        assert_eq!(modal.state(), ModalState::SignUp);
        assert_eq!(modal.close(), Some("nav-login"));
    }

    #[test]
    fn escape_closes() {
        let mut modal = ModalController::new();
        modal.open(AuthTab::SignUp, Some("chat-button"));
        modal.set_focusables(targets());
        assert_eq!(
            modal.handle_key("Escape", false, Some(&"email")),
            KeyAction::Close {
                restore: Some("chat-button")
            }
        );
        assert!(!modal.is_open());
        assert_eq!(modal.handle_key("Tab", false, None), KeyAction::Ignore);
    }

    #[test]
    fn tab_keys_cycle_while_open() {
        let mut modal = ModalController::new();
        modal.open(AuthTab::SignIn, None);
        modal.set_focusables(targets());
        assert_eq!(modal.handle_key("Tab", false, Some(&"submit")), KeyAction::Focus("email"));
        assert_eq!(modal.handle_key("Tab", true, Some(&"email")), KeyAction::Focus("submit"));
        assert_eq!(modal.handle_key("Enter", false, Some(&"email")), KeyAction::Ignore);
    }

    #[test]
    fn switch_tab_only_when_open() {
        let mut modal = ModalController::<&str>::new();
        assert!(!modal.switch_tab(AuthTab::SignUp));
        assert_eq!(modal.state(), ModalState::Closed);

        modal.open(AuthTab::SignIn, None);
        modal.show_error("bad");
        assert!(modal.switch_tab(AuthTab::SignUp));
        assert_eq!(modal.state(), ModalState::SignUp);
        assert_eq!(modal.error(), None);
    }

    #[test]
    fn failed_submit_keeps_modal_open_with_error() {
        let mut modal = ModalController::new();
        modal.open(AuthTab::SignIn, Some("nav"));
        let result = Err(AppError::AuthFailure(AuthError::InvalidCredentials));
        assert_eq!(modal.finish_submit(&result), SubmitOutcome::Failed);
        assert!(modal.is_open());
        assert!(modal.error().is_some());

        let result = Err(AppError::ValidationFailure(ValidationError::EmptyField("email")));
        modal.finish_submit(&result);
        assert_eq!(modal.error(), Some("email is required"));
    }

    #[test]
    fn successful_submit_closes() {
        let mut modal = ModalController::new();
        modal.open(AuthTab::SignIn, Some("nav"));
        assert_eq!(
            modal.finish_submit(&Ok(Redirect::Chat)),
            SubmitOutcome::Succeeded {
                redirect: Redirect::Chat,
                restore: Some("nav")
            }
        );
        assert!(!modal.is_open());
    }
}
