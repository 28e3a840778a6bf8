use std::time::Duration;

use chrono::Utc;
use leptos::prelude::*;

use so_bridge::notifications::ToastLevel;

/// How often timed toasts are checked for expiry.
const SWEEP_INTERVAL: Duration = Duration::from_millis(500);

pub fn level_class(level: ToastLevel) -> &'static str {
    match level {
        ToastLevel::Info => "toast toast-info",
        ToastLevel::Success => "toast toast-success",
        ToastLevel::Warning => "toast toast-warning",
        ToastLevel::Error => "toast toast-error",
    }
}

#[component]
pub fn ToastStack() -> impl IntoView {
    let state = crate::state::use_app_state();

    let sweep = set_interval_with_handle(
        move || {
            state.context().toasts.expire(Utc::now());
        },
        SWEEP_INTERVAL,
    );
    if let Ok(handle) = sweep {
        on_cleanup(move || handle.clear());
    }

    view! {
        <div class="toast-stack" role="status" aria-live="polite">
            <For
                each=move || state.toasts.get()
                key=|toast| toast.id
                let:toast
            >
                {
                    let id = toast.id;
                    view! {
                        <div class=level_class(toast.level)>
                            <span class="toast-message">{toast.message.clone()}</span>
                            <button
                                class="toast-dismiss"
                                aria-label="Dismiss"
                                on:click=move |_| {
                                    state.context().toasts.dismiss(&id);
                                }
                            >
                                "×"
                            </button>
                        </div>
                    }
                }
            </For>
        </div>
    }
}
