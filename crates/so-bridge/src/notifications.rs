use std::cell::RefCell;
use std::rc::Rc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use so_core::config::ToastConfig;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ToastLevel {
    Info,
    Success,
    Warning,
    Error,
}

/// A transient, non-blocking notification.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Toast {
    pub id: Uuid,
    pub level: ToastLevel,
    pub message: String,
    pub created_at: DateTime<Utc>,
    /// `None` means the toast stays until dismissed.
    pub duration_ms: Option<u64>,
}

impl Toast {
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.duration_ms
            .map(|ms| self.created_at + Duration::milliseconds(ms as i64))
    }
}

type Listener = Rc<dyn Fn(&[Toast])>;

struct QueueState {
    toasts: Vec<Toast>,
    config: ToastConfig,
    listeners: Vec<Listener>,
}

/// The visible toast stack.
///
/// Shared by clone. Mutations notify every `on_change` listener with the
/// full current list; the UI re-renders from that, the terminal prints the
/// newest entry.
#[derive(Clone)]
pub struct ToastQueue {
    state: Rc<RefCell<QueueState>>,
}

impl ToastQueue {
    pub fn new(config: ToastConfig) -> Self {
        Self {
            state: Rc::new(RefCell::new(QueueState {
                toasts: Vec::new(),
                config,
                listeners: Vec::new(),
            })),
        }
    }

    pub fn push(&self, level: ToastLevel, message: impl Into<String>) -> Uuid {
        let message = message.into();
        let id = Uuid::new_v4();
        {
            let mut state = self.state.borrow_mut();
            let duration_ms = match level {
                ToastLevel::Info => Some(state.config.info_ms),
                ToastLevel::Success => Some(state.config.success_ms),
                ToastLevel::Warning => Some(state.config.warning_ms),
                ToastLevel::Error => None,
            };
            tracing::debug!(?level, %message, "toast");
            state.toasts.push(Toast {
                id,
                level,
                message,
                created_at: Utc::now(),
                duration_ms,
            });
            let max = state.config.max_visible.max(1);
            while state.toasts.len() > max {
                state.toasts.remove(0);
            }
        }
        self.notify();
        id
    }

    pub fn info(&self, message: impl Into<String>) -> Uuid {
        self.push(ToastLevel::Info, message)
    }

    pub fn success(&self, message: impl Into<String>) -> Uuid {
        self.push(ToastLevel::Success, message)
    }

    pub fn warning(&self, message: impl Into<String>) -> Uuid {
        self.push(ToastLevel::Warning, message)
    }

    pub fn error(&self, message: impl Into<String>) -> Uuid {
        self.push(ToastLevel::Error, message)
    }

    pub fn dismiss(&self, id: &Uuid) -> bool {
        let removed = {
            let mut state = self.state.borrow_mut();
            let before = state.toasts.len();
            state.toasts.retain(|t| t.id != *id);
            before != state.toasts.len()
        };
        if removed {
            self.notify();
        }
        removed
    }

    /// Drop every toast whose duration has elapsed at `now`.
    pub fn expire(&self, now: DateTime<Utc>) -> usize {
        let removed = {
            let mut state = self.state.borrow_mut();
            let before = state.toasts.len();
            state
                .toasts
                .retain(|t| t.expires_at().map_or(true, |at| at > now));
            before - state.toasts.len()
        };
        if removed > 0 {
            self.notify();
        }
        removed
    }

    pub fn clear(&self) {
        self.state.borrow_mut().toasts.clear();
        self.notify();
    }

    pub fn list(&self) -> Vec<Toast> {
        self.state.borrow().toasts.clone()
    }

    pub fn latest(&self) -> Option<Toast> {
        self.state.borrow().toasts.last().cloned()
    }

    pub fn len(&self) -> usize {
        self.state.borrow().toasts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn on_change(&self, listener: impl Fn(&[Toast]) + 'static) {
        self.state.borrow_mut().listeners.push(Rc::new(listener));
    }

    fn notify(&self) {
        let (listeners, toasts) = {
            let state = self.state.borrow();
            (state.listeners.clone(), state.toasts.clone())
        };
        for listener in listeners {
            listener(&toasts);
        }
    }
}

impl Default for ToastQueue {
    fn default() -> Self {
        Self::new(ToastConfig::default())
    }
}

impl std::fmt::Debug for ToastQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToastQueue")
            .field("toasts", &self.state.borrow().toasts)
            .finish_non_exhaustive()
    }
}
